//! Raspberry Pi GPIO backend (BCM numbering, via rppal)

use rppal::gpio::{Gpio, InputPin};
use tracing::info;

use super::{GpioError, PinReader};
use crate::button::ButtonId;
use crate::debounce::Level;

/// Three input lines, one per button.
///
/// The pins are returned to their original mode when this is dropped.
pub struct RpiPins {
    lines: [InputPin; 3],
    bcm: [u8; 3],
    active_low: bool,
}

impl RpiPins {
    /// Claim the pins for Next, Previous and Custom (in that order).
    ///
    /// Active-low lines get the internal pull-up, active-high the pull-down.
    pub fn open(bcm: [u8; 3], active_low: bool) -> Result<Self, GpioError> {
        let gpio = Gpio::new().map_err(|e| GpioError::Open(e.to_string()))?;

        let claim = |pin: u8| -> Result<InputPin, GpioError> {
            let pin_handle = gpio.get(pin).map_err(|e| GpioError::Pin {
                pin,
                reason: e.to_string(),
            })?;
            Ok(if active_low {
                pin_handle.into_input_pullup()
            } else {
                pin_handle.into_input_pulldown()
            })
        };

        let lines = [claim(bcm[0])?, claim(bcm[1])?, claim(bcm[2])?];
        info!(
            "GPIO lines claimed: next={} previous={} custom={} ({})",
            bcm[0],
            bcm[1],
            bcm[2],
            if active_low { "active-low, pull-up" } else { "active-high, pull-down" }
        );

        Ok(Self { lines, bcm, active_low })
    }
}

impl PinReader for RpiPins {
    fn read_level(&mut self, button: ButtonId) -> Level {
        let low = self.lines[button.index()].is_low();
        if low == self.active_low {
            Level::Active
        } else {
            Level::Inactive
        }
    }

    fn describe(&self) -> String {
        format!("rpi (BCM {}/{}/{})", self.bcm[0], self.bcm[1], self.bcm[2])
    }
}

impl Drop for RpiPins {
    fn drop(&mut self) {
        info!("GPIO lines released");
    }
}
