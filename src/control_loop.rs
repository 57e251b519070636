//! Button polling loop
//!
//! Runs on its own OS thread. Every tick it samples the three lines in
//! NEXT, PREVIOUS, CUSTOM order, and for each accepted press steps the preset
//! counter, reads the current payload from the mapping store and hands it to
//! the transport. Between ticks it waits on the shutdown channel for one poll
//! interval, so a shutdown request ends the loop within one tick.

use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender, TrySendError};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, trace, warn};

use crate::button::ButtonId;
use crate::debounce::{DebouncedButton, PressEvent, DEFAULT_DEBOUNCE};
use crate::gpio::PinReader;
use crate::mapping::MappingStore;
use crate::message::OutgoingMessage;
use crate::preset::PresetCounter;
use crate::transport::MidiTransport;

/// Default delay between two polls
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Poll cadence and debounce window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoopTiming {
    pub poll_interval: Duration,
    pub debounce: Duration,
}

impl Default for LoopTiming {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            debounce: DEFAULT_DEBOUNCE,
        }
    }
}

/// Requests loop shutdown. Dropping every handle also stops the loop.
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    tx: Sender<()>,
}

impl ShutdownHandle {
    pub fn trigger(&self) {
        match self.tx.try_send(()) {
            Ok(()) | Err(TrySendError::Full(())) => {}
            Err(TrySendError::Disconnected(())) => debug!("Control loop already stopped"),
        }
    }
}

/// Loop side of the shutdown channel
#[derive(Debug)]
pub struct ShutdownSignal {
    rx: Receiver<()>,
}

impl ShutdownSignal {
    /// Wait up to `timeout`; true if shutdown was requested
    pub fn wait(&self, timeout: Duration) -> bool {
        match self.rx.recv_timeout(timeout) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => true,
            Err(RecvTimeoutError::Timeout) => false,
        }
    }

    /// Non-blocking check
    pub fn is_requested(&self) -> bool {
        self.wait(Duration::ZERO)
    }
}

/// Create a connected shutdown handle/signal pair
pub fn shutdown_channel() -> (ShutdownHandle, ShutdownSignal) {
    let (tx, rx) = channel::bounded(1);
    (ShutdownHandle { tx }, ShutdownSignal { rx })
}

/// What happened for one accepted press
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dispatch {
    pub button: ButtonId,
    /// Payload read from the mapping store
    pub message: OutgoingMessage,
    /// Preset counter value after the press
    pub preset: u32,
    /// False when the transport reported an error
    pub delivered: bool,
}

/// Totals reported when the loop stops
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoopStats {
    pub ticks: u64,
    pub presses: u64,
    pub send_failures: u64,
}

/// Owns the GPIO reader, the transport, the preset counter and the per-line
/// debounce state. Only the mapping store is shared.
pub struct ControlLoop<P, T> {
    pins: P,
    transport: T,
    store: Arc<MappingStore>,
    counter: PresetCounter,
    lines: [DebouncedButton; 3],
    poll_interval: Duration,
    stats: LoopStats,
}

impl<P: PinReader, T: MidiTransport> ControlLoop<P, T> {
    pub fn new(
        pins: P,
        transport: T,
        store: Arc<MappingStore>,
        counter: PresetCounter,
        timing: LoopTiming,
    ) -> Self {
        Self {
            pins,
            transport,
            store,
            counter,
            lines: ButtonId::ALL.map(|button| DebouncedButton::new(button, timing.debounce)),
            poll_interval: timing.poll_interval,
            stats: LoopStats::default(),
        }
    }

    /// Current preset index
    pub fn preset(&self) -> u32 {
        self.counter.value()
    }

    pub fn stats(&self) -> LoopStats {
        self.stats
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Sample every line once at `now` and dispatch accepted presses in
    /// NEXT, PREVIOUS, CUSTOM order
    pub fn tick(&mut self, now: Instant) -> Vec<Dispatch> {
        self.stats.ticks += 1;

        let mut presses = Vec::new();
        for line in self.lines.iter_mut() {
            let level = self.pins.read_level(line.button());
            if let Some(press) = line.sample(level, now) {
                presses.push(press);
            }
        }

        if !presses.is_empty() {
            trace!("Tick {}: {} press(es)", self.stats.ticks, presses.len());
        }
        presses.into_iter().map(|press| self.dispatch(press)).collect()
    }

    fn dispatch(&mut self, press: PressEvent) -> Dispatch {
        self.stats.presses += 1;

        let preset = match press.button {
            ButtonId::Next => self.counter.advance(),
            ButtonId::Previous => self.counter.retreat(),
            ButtonId::Custom => self.counter.value(),
        };

        // Read at dispatch time so an admin update made before this press is
        // what gets sent.
        let message = self.store.get(press.button);

        let delivered = match self.transport.send(message.as_bytes()) {
            Ok(()) => {
                info!(
                    "{} pressed -> sent {} ({}), preset {}",
                    press.button.label(),
                    message,
                    message.describe(),
                    preset
                );
                true
            }
            Err(e) => {
                self.stats.send_failures += 1;
                warn!("Error while sending MIDI message {}: {}", message, e);
                false
            }
        };

        Dispatch {
            button: press.button,
            message,
            preset,
            delivered,
        }
    }

    /// Poll until shutdown is requested, then release the GPIO lines.
    pub fn run(mut self, shutdown: ShutdownSignal) -> LoopStats {
        info!(
            "Control loop started (gpio: {}, midi: {}, poll every {:?})",
            self.pins.describe(),
            self.transport.describe(),
            self.poll_interval
        );

        while !shutdown.is_requested() {
            self.tick(Instant::now());
            if shutdown.wait(self.poll_interval) {
                break;
            }
        }

        let stats = self.stats;
        info!(
            "Control loop stopped after {} ticks ({} presses, {} send failures, preset {})",
            stats.ticks,
            stats.presses,
            stats.send_failures,
            self.counter.value()
        );
        drop(self.pins);
        stats
    }
}
