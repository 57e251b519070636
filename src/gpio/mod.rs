//! GPIO collaborator
//!
//! The control loop only needs "read the level of the line wired to this
//! button". [`PinReader`] is that seam; the Raspberry Pi backend reads real
//! lines through `rppal`, and [`SimulatedPins`] lets the admin API (or tests)
//! drive virtual lines when no hardware is attached.

#[cfg(target_os = "linux")]
mod rpi;

#[cfg(target_os = "linux")]
pub use rpi::RpiPins;

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

use crate::button::ButtonId;
use crate::config::{GpioBackend, GpioConfig};
use crate::debounce::Level;

/// GPIO backend failures. Only raised at startup; reads never fail.
#[derive(Debug, Error)]
pub enum GpioError {
    #[error("failed to open GPIO peripheral: {0}")]
    Open(String),

    #[error("failed to claim BCM pin {pin}: {reason}")]
    Pin { pin: u8, reason: String },

    #[error("the Raspberry Pi GPIO backend is only available on Linux")]
    Unsupported,
}

/// Reads the logical level of each button line
pub trait PinReader {
    /// Current level of the line wired to `button`.
    ///
    /// A disconnected or stuck line simply reads a constant level.
    fn read_level(&mut self, button: ButtonId) -> Level;

    /// Human-readable backend name for logs
    fn describe(&self) -> String;
}

impl<P: PinReader + ?Sized> PinReader for Box<P> {
    fn read_level(&mut self, button: ButtonId) -> Level {
        (**self).read_level(button)
    }

    fn describe(&self) -> String {
        (**self).describe()
    }
}

/// Virtual button lines.
///
/// Each line counts its current holders, so overlapping presses of the same
/// button keep it active until the last one releases. Clones share state.
#[derive(Debug, Clone, Default)]
pub struct SimulatedPins {
    holders: Arc<[AtomicU32; 3]>,
}

impl SimulatedPins {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drive the line active (adds one holder)
    pub fn press(&self, button: ButtonId) {
        self.holders[button.index()].fetch_add(1, Ordering::SeqCst);
        debug!("Simulated {} pressed", button);
    }

    /// Drop one holder; the line goes inactive when none remain
    pub fn release(&self, button: ButtonId) {
        let _ = self.holders[button.index()].fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| {
            Some(n.saturating_sub(1))
        });
        debug!("Simulated {} released", button);
    }

    pub fn is_pressed(&self, button: ButtonId) -> bool {
        self.holders[button.index()].load(Ordering::SeqCst) > 0
    }
}

impl PinReader for SimulatedPins {
    fn read_level(&mut self, button: ButtonId) -> Level {
        if self.is_pressed(button) {
            Level::Active
        } else {
            Level::Inactive
        }
    }

    fn describe(&self) -> String {
        "simulated".to_string()
    }
}

/// Open the configured backend.
///
/// Returns the reader handed to the control loop and, for the simulated
/// backend, a handle the admin API uses to press virtual buttons.
pub fn open(config: &GpioConfig) -> Result<(Box<dyn PinReader + Send>, Option<SimulatedPins>), GpioError> {
    match config.backend {
        GpioBackend::Simulated => {
            let pins = SimulatedPins::new();
            Ok((Box::new(pins.clone()), Some(pins)))
        }
        #[cfg(target_os = "linux")]
        GpioBackend::Rpi => {
            let pins = RpiPins::open(
                [config.next_pin, config.previous_pin, config.custom_pin],
                config.active_low,
            )?;
            Ok((Box::new(pins), None))
        }
        #[cfg(not(target_os = "linux"))]
        GpioBackend::Rpi => Err(GpioError::Unsupported),
    }
}
