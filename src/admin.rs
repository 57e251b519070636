//! Administrative mutator
//!
//! Entry point for runtime remapping. Runs on whatever task serves the admin
//! request and only ever touches the mapping store, so the control loop never
//! waits on it for longer than one store write.

use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

use crate::button::ButtonId;
use crate::mapping::{MappingSnapshot, MappingStore};
use crate::message::{OutgoingMessage, ValidationError};

/// Outcome of [`AdminMutator::handle_update`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateResult {
    /// The entry was replaced
    Updated {
        button: ButtonId,
        message: OutgoingMessage,
        revision: u64,
    },
    /// The hex text was malformed; nothing changed
    Rejected {
        button: ButtonId,
        error: ValidationError,
    },
    /// The button name is not one of next/previous/custom; nothing changed
    UnknownButton { name: String },
}

impl UpdateResult {
    pub fn is_updated(&self) -> bool {
        matches!(self, UpdateResult::Updated { .. })
    }

    /// Status line for the admin page
    pub fn display_message(&self) -> String {
        match self {
            UpdateResult::Updated { .. } => "Hex values updated!".to_string(),
            UpdateResult::Rejected { button, error } => {
                format!("Invalid value for {}: {}", button.label(), error)
            }
            UpdateResult::UnknownButton { name } => {
                format!("Unknown button '{}', nothing changed", name)
            }
        }
    }
}

/// Summary of an update suitable for JSON responses and broadcasts
#[derive(Debug, Clone, Serialize)]
pub struct AppliedUpdate {
    pub button: ButtonId,
    pub hex: OutgoingMessage,
    pub revision: u64,
}

/// Validates operator input and writes it into the shared store
#[derive(Clone)]
pub struct AdminMutator {
    store: Arc<MappingStore>,
}

impl AdminMutator {
    pub fn new(store: Arc<MappingStore>) -> Self {
        Self { store }
    }

    /// Apply one "button name + hex text" submission
    pub fn handle_update(&self, button_name: &str, hex_text: &str) -> UpdateResult {
        let button = match button_name.parse::<ButtonId>() {
            Ok(button) => button,
            Err(e) => {
                warn!("Ignoring mapping update: {}", e);
                return UpdateResult::UnknownButton {
                    name: button_name.to_string(),
                };
            }
        };

        match OutgoingMessage::from_hex(hex_text) {
            Ok(message) => {
                let revision = self.store.replace(button, message.clone());
                UpdateResult::Updated {
                    button,
                    message,
                    revision,
                }
            }
            Err(error) => {
                info!("Rejected mapping for {}: {:?} ({})", button, hex_text, error);
                UpdateResult::Rejected { button, error }
            }
        }
    }

    /// Current mapping for display
    pub fn current(&self) -> MappingSnapshot {
        self.store.snapshot()
    }
}
