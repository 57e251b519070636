//! Outgoing message payloads and their validation
//!
//! An [`OutgoingMessage`] can only be built through validation, so anything
//! that reaches the mapping store (and from there the transport) is a run of
//! complete MIDI messages. Admin input arrives as hex text ("C0 01") and goes
//! through [`OutgoingMessage::from_hex`].

use serde::{Serialize, Serializer};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

use crate::midi::{self, FrameError};

/// Rejected admin input. The store is never touched when one of these is
/// returned.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("message is empty")]
    Empty,

    #[error("'{token}' is not valid hex: {reason}")]
    InvalidHex { token: String, reason: String },

    #[error("byte {offset} (0x{byte:02X}) is a data byte where a status byte was expected")]
    MissingStatus { offset: usize, byte: u8 },

    #[error("byte {offset} (0x{status:02X}) is not a defined MIDI status")]
    UndefinedStatus { offset: usize, status: u8 },

    #[error("message 0x{status:02X} at byte {offset} needs {expected} bytes, got {actual}")]
    Truncated {
        offset: usize,
        status: u8,
        expected: usize,
        actual: usize,
    },

    #[error("data byte {offset} (0x{byte:02X}) is out of range (must be below 0x80)")]
    DataOutOfRange { offset: usize, byte: u8 },

    #[error("SysEx starting at byte {offset} is missing its closing F7")]
    UnterminatedSysEx { offset: usize },
}

impl From<FrameError> for ValidationError {
    fn from(err: FrameError) -> Self {
        match err {
            FrameError::MissingStatus { offset, byte } => ValidationError::MissingStatus { offset, byte },
            FrameError::UndefinedStatus { offset, status } => {
                ValidationError::UndefinedStatus { offset, status }
            }
            FrameError::Truncated { offset, status, expected, actual } => {
                ValidationError::Truncated { offset, status, expected, actual }
            }
            FrameError::DataOutOfRange { offset, byte } => ValidationError::DataOutOfRange { offset, byte },
            FrameError::UnterminatedSysEx { offset } => ValidationError::UnterminatedSysEx { offset },
        }
    }
}

/// A validated, immutable payload handed to the MIDI transport as-is.
///
/// Cloning is cheap (shared buffer), which keeps store reads short.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct OutgoingMessage(Arc<[u8]>);

impl OutgoingMessage {
    /// Validate raw bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ValidationError> {
        if bytes.is_empty() {
            return Err(ValidationError::Empty);
        }
        midi::split_messages(bytes)?;
        Ok(Self(Arc::from(bytes)))
    }

    /// Parse whitespace-separated hex text ("C0 01", "c001", "F0 7E 7F F7")
    pub fn from_hex(text: &str) -> Result<Self, ValidationError> {
        Self::from_bytes(&parse_hex(text)?)
    }

    /// Program Change; always well-formed, values are masked to 7 bits
    pub fn program_change(channel: u8, program: u8) -> Self {
        Self(Arc::from([0xC0 | (channel & 0x0F), program & 0x7F].as_slice()))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Canonical hex text, e.g. "C0 01"
    pub fn to_hex(&self) -> String {
        midi::format_hex(&self.0)
    }

    /// Decoded form for logs, e.g. "ProgramChange ch:1 p:1"
    pub fn describe(&self) -> String {
        midi::describe(&self.0)
    }
}

impl fmt::Debug for OutgoingMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "OutgoingMessage({})", self.to_hex())
    }
}

impl fmt::Display for OutgoingMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl Serialize for OutgoingMessage {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

/// Decode hex text into bytes without any MIDI check.
///
/// Tokens are split on whitespace and each must hold an even number of hex
/// digits, so a lone nibble like "C" is refused instead of being padded.
pub fn parse_hex(text: &str) -> Result<Vec<u8>, ValidationError> {
    let mut bytes = Vec::new();
    for token in text.split_whitespace() {
        let decoded = hex::decode(token).map_err(|e| ValidationError::InvalidHex {
            token: token.to_string(),
            reason: e.to_string(),
        })?;
        bytes.extend(decoded);
    }
    if bytes.is_empty() {
        return Err(ValidationError::Empty);
    }
    Ok(bytes)
}
