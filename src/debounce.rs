//! Per-line debounce
//!
//! Suppression is level-based with a cooldown deadline, not edge detection:
//! a line that reads active fires once, then stays quiet until the cooldown
//! expires. A button that is still held at that point fires again, once per
//! elapsed cooldown window. Footswitch users rely on this to scroll through
//! presets by holding NEXT.

use std::time::{Duration, Instant};
use tracing::trace;

use crate::button::ButtonId;

/// Default cooldown between two accepted presses on the same line
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(200);

/// Logical line level, after active-low/active-high translation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Active,
    Inactive,
}

/// An accepted press on one line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PressEvent {
    pub button: ButtonId,
    pub at: Instant,
}

/// Debounce state for one physical line
#[derive(Debug, Clone)]
pub struct DebounceState {
    last_level: Level,
    cooldown_until: Option<Instant>,
}

impl DebounceState {
    pub fn new() -> Self {
        Self {
            last_level: Level::Inactive,
            cooldown_until: None,
        }
    }

    /// Feed one raw sample. Returns true when a press is accepted.
    pub fn update(&mut self, level: Level, now: Instant, cooldown: Duration) -> bool {
        self.last_level = level;
        if level != Level::Active {
            return false;
        }

        match self.cooldown_until {
            Some(deadline) if now < deadline => false,
            _ => {
                self.cooldown_until = Some(now + cooldown);
                true
            }
        }
    }

    pub fn last_level(&self) -> Level {
        self.last_level
    }

    /// Deadline before which the line cannot fire again, if one is pending
    pub fn cooldown_until(&self) -> Option<Instant> {
        self.cooldown_until
    }
}

impl Default for DebounceState {
    fn default() -> Self {
        Self::new()
    }
}

/// A button line with its debounce state
#[derive(Debug, Clone)]
pub struct DebouncedButton {
    button: ButtonId,
    cooldown: Duration,
    state: DebounceState,
}

impl DebouncedButton {
    pub fn new(button: ButtonId, cooldown: Duration) -> Self {
        Self {
            button,
            cooldown,
            state: DebounceState::new(),
        }
    }

    pub fn button(&self) -> ButtonId {
        self.button
    }

    pub fn state(&self) -> &DebounceState {
        &self.state
    }

    /// Apply one sample taken at `now`
    pub fn sample(&mut self, level: Level, now: Instant) -> Option<PressEvent> {
        if self.state.update(level, now, self.cooldown) {
            Some(PressEvent {
                button: self.button,
                at: now,
            })
        } else {
            if level == Level::Active {
                trace!("{} held, still in cooldown", self.button);
            }
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const TICK: Duration = Duration::from_millis(50);

    fn run(levels: &[Level], start: Instant) -> Vec<Instant> {
        let mut line = DebouncedButton::new(ButtonId::Next, DEFAULT_DEBOUNCE);
        levels
            .iter()
            .enumerate()
            .filter_map(|(i, &level)| line.sample(level, start + TICK * i as u32))
            .map(|e| e.at)
            .collect()
    }

    #[test]
    fn test_inactive_never_fires() {
        let start = Instant::now();
        assert!(run(&[Level::Inactive; 20], start).is_empty());
    }

    #[test]
    fn test_first_press_fires_immediately() {
        let start = Instant::now();
        let mut line = DebouncedButton::new(ButtonId::Custom, DEFAULT_DEBOUNCE);

        let event = line.sample(Level::Active, start).unwrap();
        assert_eq!(event.button, ButtonId::Custom);
        assert_eq!(event.at, start);
        assert_eq!(line.state().cooldown_until(), Some(start + DEFAULT_DEBOUNCE));
    }

    #[test]
    fn test_bounces_inside_window_are_suppressed() {
        let start = Instant::now();
        // Chatter: active / inactive / active within 200ms
        let levels = [Level::Active, Level::Inactive, Level::Active, Level::Active];
        assert_eq!(run(&levels, start), vec![start]);
    }

    #[test]
    fn test_held_button_refires_once_per_window() {
        let start = Instant::now();
        // Held for 1s sampled every 50ms: fires at 0, 200, 400, 600, 800, 1000
        let fired = run(&[Level::Active; 21], start);
        let expected: Vec<Instant> = (0..=5).map(|k| start + DEFAULT_DEBOUNCE * k).collect();
        assert_eq!(fired, expected);
    }

    #[test]
    fn test_release_does_not_reset_cooldown() {
        let start = Instant::now();
        let mut line = DebouncedButton::new(ButtonId::Next, DEFAULT_DEBOUNCE);

        assert!(line.sample(Level::Active, start).is_some());
        assert!(line.sample(Level::Inactive, start + TICK).is_none());
        assert!(line.sample(Level::Active, start + TICK * 2).is_none());
        assert!(line.sample(Level::Active, start + DEFAULT_DEBOUNCE).is_some());
        assert_eq!(line.state().last_level(), Level::Active);
    }

    proptest! {
        #[test]
        fn prop_at_most_one_press_per_window(
            samples in proptest::collection::vec((any::<bool>(), 1u64..120), 1..200)
        ) {
            let cooldown = DEFAULT_DEBOUNCE;
            let mut line = DebouncedButton::new(ButtonId::Previous, cooldown);
            let mut now = Instant::now();
            let mut fired: Vec<Instant> = Vec::new();

            for (active, step_ms) in samples {
                now += Duration::from_millis(step_ms);
                let level = if active { Level::Active } else { Level::Inactive };
                if let Some(event) = line.sample(level, now) {
                    fired.push(event.at);
                }
            }

            for pair in fired.windows(2) {
                prop_assert!(pair[1].duration_since(pair[0]) >= cooldown);
            }
        }

        #[test]
        fn prop_held_line_fires_once_per_elapsed_window(ticks in 1u32..400) {
            let start = Instant::now();
            let mut line = DebouncedButton::new(ButtonId::Next, DEFAULT_DEBOUNCE);
            let count = (0..ticks)
                .filter(|&i| line.sample(Level::Active, start + TICK * i).is_some())
                .count() as u32;

            // 200ms cooldown sampled every 50ms: one press every 4 ticks
            prop_assert_eq!(count, (ticks + 3) / 4);
        }
    }
}
