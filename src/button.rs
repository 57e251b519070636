//! Physical button identities
//!
//! The device has exactly three footswitches. The set is closed: nothing at
//! runtime can add a fourth, and every mapping is keyed by one of these.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// One of the three physical buttons
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ButtonId {
    Next,
    Previous,
    Custom,
}

impl ButtonId {
    /// All buttons, in the order the control loop samples them
    pub const ALL: [ButtonId; 3] = [ButtonId::Next, ButtonId::Previous, ButtonId::Custom];

    /// Name used by the admin form and the JSON API
    pub fn as_str(&self) -> &'static str {
        match self {
            ButtonId::Next => "next",
            ButtonId::Previous => "previous",
            ButtonId::Custom => "custom",
        }
    }

    /// Human label for the admin page
    pub fn label(&self) -> &'static str {
        match self {
            ButtonId::Next => "Next",
            ButtonId::Previous => "Previous",
            ButtonId::Custom => "Custom",
        }
    }

    /// Slot index into fixed-size per-button arrays
    pub(crate) fn index(&self) -> usize {
        match self {
            ButtonId::Next => 0,
            ButtonId::Previous => 1,
            ButtonId::Custom => 2,
        }
    }
}

impl fmt::Display for ButtonId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A button name outside the fixed set
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown button '{0}' (expected next, previous or custom)")]
pub struct UnknownButton(pub String);

impl FromStr for ButtonId {
    type Err = UnknownButton;

    /// Case-insensitive, surrounding whitespace ignored
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "next" => Ok(ButtonId::Next),
            "previous" => Ok(ButtonId::Previous),
            "custom" => Ok(ButtonId::Custom),
            _ => Err(UnknownButton(s.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_known_names() {
        assert_eq!("next".parse::<ButtonId>(), Ok(ButtonId::Next));
        assert_eq!("Previous".parse::<ButtonId>(), Ok(ButtonId::Previous));
        assert_eq!(" CUSTOM ".parse::<ButtonId>(), Ok(ButtonId::Custom));
    }

    #[test]
    fn test_parse_unknown_name() {
        let err = "stomp".parse::<ButtonId>().unwrap_err();
        assert_eq!(err, UnknownButton("stomp".to_string()));
    }

    #[test]
    fn test_display_matches_parse() {
        for button in ButtonId::ALL {
            assert_eq!(button.to_string().parse::<ButtonId>(), Ok(button));
        }
    }

    #[test]
    fn test_indices_are_distinct() {
        let indices: Vec<usize> = ButtonId::ALL.iter().map(|b| b.index()).collect();
        assert_eq!(indices, vec![0, 1, 2]);
    }
}
