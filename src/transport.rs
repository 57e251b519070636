//! MIDI transport collaborator
//!
//! The control loop hands every payload to a [`MidiTransport`]. Failures are
//! returned as [`TransportError`] and never stop the loop.

use midir::{MidiOutput, MidiOutputConnection};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::midi::{describe, find_output_port, format_hex};

/// Outgoing send failure
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("MIDI output unavailable: {0}")]
    Unavailable(String),

    #[error("output port matching '{0}' not found")]
    PortNotFound(String),

    #[error("failed to connect to '{port}': {reason}")]
    Connect { port: String, reason: String },

    #[error("send failed: {0}")]
    Send(String),
}

/// Sends raw byte sequences to an outgoing port
pub trait MidiTransport {
    fn send(&mut self, bytes: &[u8]) -> Result<(), TransportError>;

    /// Name shown in logs
    fn describe(&self) -> String;
}

impl<T: MidiTransport + ?Sized> MidiTransport for Box<T> {
    fn send(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        (**self).send(bytes)
    }

    fn describe(&self) -> String {
        (**self).describe()
    }
}

/// midir output that keeps the port open between sends.
///
/// If the port is missing or a send fails, the connection is dropped and the
/// next send makes one fresh attempt to reopen it.
pub struct MidirTransport {
    port_pattern: String,
    connection: Option<MidiOutputConnection>,
    port_name: Option<String>,
}

impl MidirTransport {
    /// Create a transport for the first output port whose name contains
    /// `port_pattern` (case-insensitive). Does not connect yet.
    pub fn new(port_pattern: impl Into<String>) -> Self {
        Self {
            port_pattern: port_pattern.into(),
            connection: None,
            port_name: None,
        }
    }

    /// Try to open the port now
    pub fn connect(&mut self) -> Result<(), TransportError> {
        self.connection = None;

        let midi_out = MidiOutput::new("Preset-GW-Output")
            .map_err(|e| TransportError::Unavailable(e.to_string()))?;

        let (port, name) = find_output_port(&midi_out, &self.port_pattern)
            .ok_or_else(|| TransportError::PortNotFound(self.port_pattern.clone()))?;

        let connection = midi_out
            .connect(&port, "preset-gw")
            .map_err(|e| TransportError::Connect {
                port: name.clone(),
                reason: e.to_string(),
            })?;

        info!("MIDI output connected: {}", name);
        self.connection = Some(connection);
        self.port_name = Some(name);
        Ok(())
    }

    pub fn is_connected(&self) -> bool {
        self.connection.is_some()
    }
}

impl MidiTransport for MidirTransport {
    fn send(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        if self.connection.is_none() {
            debug!("MIDI output not open, reconnecting to '{}'", self.port_pattern);
            self.connect()?;
        }

        let Some(connection) = self.connection.as_mut() else {
            return Err(TransportError::PortNotFound(self.port_pattern.clone()));
        };

        if let Err(e) = connection.send(bytes) {
            warn!("MIDI output '{}' failed, will reopen on next send", self.port_pattern);
            self.connection = None;
            return Err(TransportError::Send(e.to_string()));
        }
        Ok(())
    }

    fn describe(&self) -> String {
        match &self.port_name {
            Some(name) => format!("midir '{}'", name),
            None => format!("midir '{}' (not connected)", self.port_pattern),
        }
    }
}

/// Dry-run transport: logs every payload instead of sending it
#[derive(Debug, Default)]
pub struct LogTransport {
    sent: u64,
}

impl LogTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Payloads logged so far
    pub fn sent(&self) -> u64 {
        self.sent
    }
}

impl MidiTransport for LogTransport {
    fn send(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        self.sent += 1;
        info!("[dry-run #{}] {} => {}", self.sent, format_hex(bytes), describe(bytes));
        Ok(())
    }

    fn describe(&self) -> String {
        "dry-run log".to_string()
    }
}
