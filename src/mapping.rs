//! Button-to-message mapping shared by the control loop and the admin surface
//!
//! The control loop reads an entry every time a press fires; the admin
//! handlers replace entries whenever an operator submits the form. Both go
//! through [`MappingStore`], which keeps the whole mapping behind one
//! `parking_lot::RwLock`:
//!
//! - an entry is replaced by swapping in a new `OutgoingMessage` (shared,
//!   immutable buffer), so a reader clones either the old or the new value
//!   and never sees a half-written one;
//! - the write section is a single assignment, so readers wait at most that
//!   long; `parking_lot`'s fairness keeps a stream of readers from starving a
//!   writer and vice versa.

use parking_lot::RwLock;
use serde::Serialize;
use tracing::{debug, info};

use crate::button::ButtonId;
use crate::message::{OutgoingMessage, ValidationError};

/// Initial payloads: Program Change 1 / 0 / 127 on channel 1
pub const DEFAULT_NEXT_HEX: &str = "C0 01";
pub const DEFAULT_PREVIOUS_HEX: &str = "C0 00";
pub const DEFAULT_CUSTOM_HEX: &str = "C0 7F";

#[derive(Debug, Clone)]
struct Entries {
    messages: [OutgoingMessage; 3],
    revision: u64,
}

/// Point-in-time copy of the whole mapping (for display)
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MappingSnapshot {
    pub next: OutgoingMessage,
    pub previous: OutgoingMessage,
    pub custom: OutgoingMessage,
    /// Number of committed updates since startup
    pub revision: u64,
}

impl MappingSnapshot {
    pub fn get(&self, button: ButtonId) -> &OutgoingMessage {
        match button {
            ButtonId::Next => &self.next,
            ButtonId::Previous => &self.previous,
            ButtonId::Custom => &self.custom,
        }
    }
}

/// Concurrency-safe mapping from [`ButtonId`] to [`OutgoingMessage`]
pub struct MappingStore {
    entries: RwLock<Entries>,
}

impl MappingStore {
    /// Create a store with one message per button
    pub fn new(next: OutgoingMessage, previous: OutgoingMessage, custom: OutgoingMessage) -> Self {
        Self {
            entries: RwLock::new(Entries {
                messages: [next, previous, custom],
                revision: 0,
            }),
        }
    }

    /// Create a store from hex text for each button
    pub fn from_hex(next: &str, previous: &str, custom: &str) -> Result<Self, ValidationError> {
        Ok(Self::new(
            OutgoingMessage::from_hex(next)?,
            OutgoingMessage::from_hex(previous)?,
            OutgoingMessage::from_hex(custom)?,
        ))
    }

    /// Current message for a button. Always a complete, committed value.
    pub fn get(&self, button: ButtonId) -> OutgoingMessage {
        self.entries.read().messages[button.index()].clone()
    }

    /// Replace a button's message with already-validated bytes.
    ///
    /// Returns the new revision.
    pub fn replace(&self, button: ButtonId, message: OutgoingMessage) -> u64 {
        let revision = {
            let mut entries = self.entries.write();
            entries.messages[button.index()] = message.clone();
            entries.revision += 1;
            entries.revision
        };
        info!("Mapping updated: {} -> {} (rev {})", button, message, revision);
        revision
    }

    /// Validate raw bytes and replace the entry; the prior entry is kept on error
    pub fn set(&self, button: ButtonId, bytes: &[u8]) -> Result<OutgoingMessage, ValidationError> {
        let message = OutgoingMessage::from_bytes(bytes)?;
        self.replace(button, message.clone());
        Ok(message)
    }

    /// Parse hex text and replace the entry; the prior entry is kept on error
    pub fn set_hex(&self, button: ButtonId, hex_text: &str) -> Result<OutgoingMessage, ValidationError> {
        let message = OutgoingMessage::from_hex(hex_text).inspect_err(|e| {
            debug!("Rejected mapping for {}: {:?} ({})", button, hex_text, e);
        })?;
        self.replace(button, message.clone());
        Ok(message)
    }

    /// Copy of every entry, taken under one lock
    pub fn snapshot(&self) -> MappingSnapshot {
        let entries = self.entries.read();
        let [next, previous, custom] = entries.messages.clone();
        MappingSnapshot {
            next,
            previous,
            custom,
            revision: entries.revision,
        }
    }

    pub fn revision(&self) -> u64 {
        self.entries.read().revision
    }
}

impl Default for MappingStore {
    fn default() -> Self {
        Self::new(
            OutgoingMessage::program_change(0, 1),
            OutgoingMessage::program_change(0, 0),
            OutgoingMessage::program_change(0, 127),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_defaults() {
        let store = MappingStore::default();
        assert_eq!(store.get(ButtonId::Next).as_bytes(), &[0xC0, 0x01]);
        assert_eq!(store.get(ButtonId::Previous).as_bytes(), &[0xC0, 0x00]);
        assert_eq!(store.get(ButtonId::Custom).as_bytes(), &[0xC0, 0x7F]);
        assert_eq!(store.revision(), 0);

        let from_text =
            MappingStore::from_hex(DEFAULT_NEXT_HEX, DEFAULT_PREVIOUS_HEX, DEFAULT_CUSTOM_HEX).unwrap();
        assert_eq!(from_text.snapshot(), store.snapshot());
    }

    #[test]
    fn test_get_after_set_sees_new_value() {
        let store = MappingStore::default();
        store.set_hex(ButtonId::Custom, "C0 10").unwrap();

        assert_eq!(store.get(ButtonId::Custom).as_bytes(), &[0xC0, 0x10]);
        assert_eq!(store.get(ButtonId::Next).as_bytes(), &[0xC0, 0x01]);
        assert_eq!(store.revision(), 1);
    }

    #[test]
    fn test_set_raw_bytes() {
        let store = MappingStore::default();
        let msg = store.set(ButtonId::Next, &[0xB0, 0x07, 0x64]).unwrap();
        assert_eq!(msg.to_hex(), "B0 07 64");
        assert_eq!(store.get(ButtonId::Next), msg);
    }

    #[test]
    fn test_malformed_input_leaves_entry_untouched() {
        let store = MappingStore::default();
        store.set_hex(ButtonId::Custom, "C0 22").unwrap();

        for bad in ["C0", "ZZ 01", "G1 01", "", "C 0"] {
            assert!(store.set_hex(ButtonId::Custom, bad).is_err(), "{:?} accepted", bad);
        }
        assert!(store.set(ButtonId::Custom, &[0x90, 0x40]).is_err());

        assert_eq!(store.get(ButtonId::Custom).as_bytes(), &[0xC0, 0x22]);
        assert_eq!(store.revision(), 1);
    }

    #[test]
    fn test_snapshot_is_consistent() {
        let store = MappingStore::default();
        store.set_hex(ButtonId::Previous, "C0 05").unwrap();

        let snap = store.snapshot();
        assert_eq!(snap.get(ButtonId::Previous).to_hex(), "C0 05");
        assert_eq!(snap.next.to_hex(), "C0 01");
        assert_eq!(snap.revision, 1);
    }

    #[test]
    fn test_concurrent_readers_never_see_partial_values() {
        // Two payloads of different lengths so a torn read would show up as a
        // byte sequence that is neither.
        let short = OutgoingMessage::from_hex("C0 10").unwrap();
        let long = OutgoingMessage::from_hex("F0 7E 7F 06 01 02 03 04 F7").unwrap();

        let store = Arc::new(MappingStore::new(short.clone(), short.clone(), short.clone()));
        let done = Arc::new(AtomicBool::new(false));

        let writers: Vec<_> = (0..2)
            .map(|w| {
                let store = store.clone();
                let (short, long) = (short.clone(), long.clone());
                thread::spawn(move || {
                    for i in 0..5_000 {
                        let msg = if (i + w) % 2 == 0 { &long } else { &short };
                        store.set(ButtonId::Custom, msg.as_bytes()).unwrap();
                    }
                })
            })
            .collect();

        let readers: Vec<_> = (0..4)
            .map(|_| {
                let store = store.clone();
                let done = done.clone();
                let (short, long) = (short.clone(), long.clone());
                thread::spawn(move || {
                    let mut reads = 0u64;
                    while !done.load(Ordering::Relaxed) || reads == 0 {
                        let seen = store.get(ButtonId::Custom);
                        assert!(seen == short || seen == long, "torn read: {:?}", seen);
                        reads += 1;
                    }
                    reads
                })
            })
            .collect();

        for w in writers {
            w.join().unwrap();
        }
        done.store(true, Ordering::Relaxed);
        for r in readers {
            assert!(r.join().unwrap() > 0);
        }
        assert_eq!(store.revision(), 10_000);
    }

    proptest! {
        #[test]
        fn prop_rejected_updates_never_change_state(
            updates in proptest::collection::vec(
                (0usize..3, proptest::collection::vec(any::<u8>(), 0..6)),
                1..40,
            )
        ) {
            let store = MappingStore::default();
            let mut model = [
                store.get(ButtonId::Next),
                store.get(ButtonId::Previous),
                store.get(ButtonId::Custom),
            ];

            for (slot, bytes) in updates {
                let button = ButtonId::ALL[slot];
                match store.set(button, &bytes) {
                    Ok(msg) => model[slot] = msg,
                    Err(_) => {}
                }
                for b in ButtonId::ALL {
                    prop_assert_eq!(&store.get(b), &model[b.index()]);
                }
            }
        }
    }
}
