//! Bounded preset counter
//!
//! Tracks the preset index the downstream device should be on. Stepping past
//! either end is a no-op on the value, reported once per attempt.

use tracing::{debug, info};

/// MIDI program numbers are 7-bit
pub const DEFAULT_MAX_PRESETS: u32 = 127;

/// Preset index in `[0, max_presets - 1]`
#[derive(Debug, Clone)]
pub struct PresetCounter {
    value: u32,
    max_presets: u32,
}

impl PresetCounter {
    /// Counter starting at 0. `max_presets` is raised to 1 if given as 0.
    pub fn new(max_presets: u32) -> Self {
        Self::with_initial(max_presets, 0)
    }

    /// Counter starting at `initial`, clamped into range
    pub fn with_initial(max_presets: u32, initial: u32) -> Self {
        let max_presets = max_presets.max(1);
        Self {
            value: initial.min(max_presets - 1),
            max_presets,
        }
    }

    pub fn value(&self) -> u32 {
        self.value
    }

    pub fn max_presets(&self) -> u32 {
        self.max_presets
    }

    pub fn is_at_last(&self) -> bool {
        self.value == self.max_presets - 1
    }

    pub fn is_at_first(&self) -> bool {
        self.value == 0
    }

    /// Step forward, saturating at the last preset
    pub fn advance(&mut self) -> u32 {
        if self.is_at_last() {
            info!("Already at the last preset ({})", self.value);
        } else {
            self.value += 1;
            debug!("Preset -> {}", self.value);
        }
        self.value
    }

    /// Step back, saturating at preset 0
    pub fn retreat(&mut self) -> u32 {
        if self.is_at_first() {
            info!("Already at the first preset");
        } else {
            self.value -= 1;
            debug!("Preset -> {}", self.value);
        }
        self.value
    }
}

impl Default for PresetCounter {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_PRESETS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_advance_and_retreat() {
        let mut counter = PresetCounter::new(4);
        assert_eq!(counter.advance(), 1);
        assert_eq!(counter.advance(), 2);
        assert_eq!(counter.retreat(), 1);
        assert_eq!(counter.value(), 1);
    }

    #[test]
    fn test_saturates_at_top() {
        let mut counter = PresetCounter::with_initial(3, 2);
        assert!(counter.is_at_last());
        assert_eq!(counter.advance(), 2);
        assert_eq!(counter.advance(), 2);
    }

    #[test]
    fn test_saturates_at_bottom() {
        let mut counter = PresetCounter::default();
        assert_eq!(counter.retreat(), 0);
        assert_eq!(counter.retreat(), 0);
        assert_eq!(counter.max_presets(), 127);
    }

    #[test]
    fn test_single_preset_never_moves() {
        let mut counter = PresetCounter::new(1);
        assert_eq!(counter.advance(), 0);
        assert_eq!(counter.retreat(), 0);
    }

    #[test]
    fn test_degenerate_bounds_are_clamped() {
        let counter = PresetCounter::with_initial(0, 10);
        assert_eq!(counter.max_presets(), 1);
        assert_eq!(counter.value(), 0);

        let counter = PresetCounter::with_initial(8, 50);
        assert_eq!(counter.value(), 7);
    }

    proptest! {
        #[test]
        fn prop_never_leaves_bounds(
            max in 1u32..200,
            steps in proptest::collection::vec(any::<bool>(), 0..500),
        ) {
            let mut counter = PresetCounter::new(max);
            let mut model: i64 = 0;
            for forward in steps {
                let value = if forward { counter.advance() } else { counter.retreat() };
                model = if forward { (model + 1).min(max as i64 - 1) } else { (model - 1).max(0) };
                prop_assert!(value < max);
                prop_assert_eq!(value as i64, model);
            }
        }
    }
}
