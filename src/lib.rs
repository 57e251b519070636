//! Preset gateway
//!
//! Turns three momentary foot-switch lines into MIDI messages for a
//! downstream device. The payload sent for each button can be changed at
//! runtime from a small web page without restarting the loop.

pub mod admin;
pub mod api;
pub mod button;
pub mod config;
pub mod control_loop;
pub mod debounce;
pub mod gpio;
pub mod mapping;
pub mod message;
pub mod midi;
pub mod preset;
pub mod transport;
