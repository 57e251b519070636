//! MIDI utilities and message types
//!
//! Decodes raw byte payloads into readable messages for logging and for the
//! well-formedness check applied to admin input. Also hosts output port
//! discovery for the midir transport.

use anyhow::{Context, Result};
use midir::{MidiOutput, MidiOutputPort};
use std::fmt;
use tracing::debug;

/// Decoded MIDI message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MidiMessage {
    /// Note Off: channel (0-15), note (0-127), velocity (0-127)
    NoteOff { channel: u8, note: u8, velocity: u8 },

    /// Note On: channel (0-15), note (0-127), velocity (0-127)
    NoteOn { channel: u8, note: u8, velocity: u8 },

    /// Polyphonic Key Pressure: channel (0-15), note (0-127), pressure (0-127)
    PolyPressure { channel: u8, note: u8, pressure: u8 },

    /// Control Change: channel (0-15), cc (0-127), value (0-127)
    ControlChange { channel: u8, cc: u8, value: u8 },

    /// Program Change: channel (0-15), program (0-127)
    ProgramChange { channel: u8, program: u8 },

    /// Channel Pressure: channel (0-15), pressure (0-127)
    ChannelPressure { channel: u8, pressure: u8 },

    /// Pitch Bend: channel (0-15), value (0-16383, 14-bit)
    PitchBend { channel: u8, value: u16 },

    /// System Exclusive payload, without the F0/F7 framing
    SysEx { data: Vec<u8> },

    /// Any other system message (time code, song position, realtime...)
    System { status: u8, data: Vec<u8> },
}

/// Number of bytes a message starting with `status` occupies, status included.
///
/// Returns `None` for data bytes (< 0x80), for SysEx (variable length), for a
/// stray end-of-exclusive 0xF7 and for the undefined statuses 0xF4, 0xF5, 0xF9
/// and 0xFD.
pub fn expected_len(status: u8) -> Option<usize> {
    match status {
        0x80..=0xBF | 0xE0..=0xEF => Some(3),
        0xC0..=0xDF => Some(2),
        0xF1 | 0xF3 => Some(2),
        0xF2 => Some(3),
        0xF6 | 0xF8 | 0xFA | 0xFB | 0xFC | 0xFE | 0xFF => Some(1),
        _ => None,
    }
}

/// Why a byte sequence is not a run of complete MIDI messages
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameError {
    /// A data byte where a status byte was expected
    MissingStatus { offset: usize, byte: u8 },
    /// A status byte that MIDI leaves undefined
    UndefinedStatus { offset: usize, status: u8 },
    /// The message ends before all its data bytes arrived
    Truncated { offset: usize, status: u8, expected: usize, actual: usize },
    /// A data byte with the high bit set
    DataOutOfRange { offset: usize, byte: u8 },
    /// SysEx without a closing F7
    UnterminatedSysEx { offset: usize },
}

/// Split a payload into complete messages.
///
/// Running status is not accepted: every message must carry its own status
/// byte, since each payload is sent on its own.
pub fn split_messages(data: &[u8]) -> Result<Vec<&[u8]>, FrameError> {
    let mut messages = Vec::new();
    let mut offset = 0;

    while offset < data.len() {
        let status = data[offset];
        if status < 0x80 {
            return Err(FrameError::MissingStatus { offset, byte: status });
        }

        let len = if status == 0xF0 {
            let end = data[offset..]
                .iter()
                .position(|&b| b == 0xF7)
                .ok_or(FrameError::UnterminatedSysEx { offset })?;
            end + 1
        } else {
            let expected = expected_len(status)
                .ok_or(FrameError::UndefinedStatus { offset, status })?;
            let actual = data.len() - offset;
            if actual < expected {
                return Err(FrameError::Truncated { offset, status, expected, actual });
            }
            expected
        };

        let message = &data[offset..offset + len];
        let body = if status == 0xF0 { &message[1..len - 1] } else { &message[1..] };
        if let Some(pos) = body.iter().position(|&b| b >= 0x80) {
            return Err(FrameError::DataOutOfRange {
                offset: offset + 1 + pos,
                byte: body[pos],
            });
        }

        messages.push(message);
        offset += len;
    }

    Ok(messages)
}

impl MidiMessage {
    /// Parse a single complete MIDI message from raw bytes
    pub fn parse(data: &[u8]) -> Option<Self> {
        let (&status, rest) = data.split_first()?;

        if status == 0xF0 {
            let end = rest.iter().position(|&b| b == 0xF7)?;
            return Some(MidiMessage::SysEx { data: rest[..end].to_vec() });
        }

        let needed = expected_len(status)?;
        if data.len() < needed {
            return None;
        }
        let d1 = rest.first().copied().unwrap_or(0) & 0x7F;
        let d2 = rest.get(1).copied().unwrap_or(0) & 0x7F;
        let channel = status & 0x0F;

        let message = match status & 0xF0 {
            0x80 => MidiMessage::NoteOff { channel, note: d1, velocity: d2 },
            // Note On with velocity 0 is a Note Off
            0x90 if d2 == 0 => MidiMessage::NoteOff { channel, note: d1, velocity: 0 },
            0x90 => MidiMessage::NoteOn { channel, note: d1, velocity: d2 },
            0xA0 => MidiMessage::PolyPressure { channel, note: d1, pressure: d2 },
            0xB0 => MidiMessage::ControlChange { channel, cc: d1, value: d2 },
            0xC0 => MidiMessage::ProgramChange { channel, program: d1 },
            0xD0 => MidiMessage::ChannelPressure { channel, pressure: d1 },
            0xE0 => MidiMessage::PitchBend {
                channel,
                value: ((d2 as u16) << 7) | d1 as u16,
            },
            _ => MidiMessage::System {
                status,
                data: rest[..needed - 1].to_vec(),
            },
        };
        Some(message)
    }

    /// Encode the message to MIDI bytes
    pub fn encode(&self) -> Vec<u8> {
        match *self {
            MidiMessage::NoteOff { channel, note, velocity } => {
                vec![0x80 | (channel & 0x0F), note & 0x7F, velocity & 0x7F]
            }
            MidiMessage::NoteOn { channel, note, velocity } => {
                vec![0x90 | (channel & 0x0F), note & 0x7F, velocity & 0x7F]
            }
            MidiMessage::PolyPressure { channel, note, pressure } => {
                vec![0xA0 | (channel & 0x0F), note & 0x7F, pressure & 0x7F]
            }
            MidiMessage::ControlChange { channel, cc, value } => {
                vec![0xB0 | (channel & 0x0F), cc & 0x7F, value & 0x7F]
            }
            MidiMessage::ProgramChange { channel, program } => {
                vec![0xC0 | (channel & 0x0F), program & 0x7F]
            }
            MidiMessage::ChannelPressure { channel, pressure } => {
                vec![0xD0 | (channel & 0x0F), pressure & 0x7F]
            }
            MidiMessage::PitchBend { channel, value } => {
                let lsb = (value & 0x7F) as u8;
                let msb = ((value >> 7) & 0x7F) as u8;
                vec![0xE0 | (channel & 0x0F), lsb, msb]
            }
            MidiMessage::SysEx { ref data } => {
                let mut result = Vec::with_capacity(data.len() + 2);
                result.push(0xF0);
                result.extend_from_slice(data);
                result.push(0xF7);
                result
            }
            MidiMessage::System { status, ref data } => {
                let mut result = vec![status];
                result.extend_from_slice(data);
                result
            }
        }
    }
}

impl fmt::Display for MidiMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            MidiMessage::NoteOff { channel, note, velocity } => {
                write!(f, "NoteOff ch:{} n:{} v:{}", channel + 1, note, velocity)
            }
            MidiMessage::NoteOn { channel, note, velocity } => {
                write!(f, "NoteOn ch:{} n:{} v:{}", channel + 1, note, velocity)
            }
            MidiMessage::PolyPressure { channel, note, pressure } => {
                write!(f, "PolyPressure ch:{} n:{} p:{}", channel + 1, note, pressure)
            }
            MidiMessage::ControlChange { channel, cc, value } => {
                write!(f, "CC ch:{} cc:{} v:{}", channel + 1, cc, value)
            }
            MidiMessage::ProgramChange { channel, program } => {
                write!(f, "ProgramChange ch:{} p:{}", channel + 1, program)
            }
            MidiMessage::ChannelPressure { channel, pressure } => {
                write!(f, "ChannelPressure ch:{} p:{}", channel + 1, pressure)
            }
            MidiMessage::PitchBend { channel, value } => {
                write!(f, "PitchBend ch:{} v:{}", channel + 1, value)
            }
            MidiMessage::SysEx { ref data } => write!(f, "SysEx {} bytes", data.len()),
            MidiMessage::System { status, .. } => write!(f, "System 0x{:02X}", status),
        }
    }
}

/// Readable description of a payload that may hold several messages
pub fn describe(data: &[u8]) -> String {
    match split_messages(data) {
        Ok(messages) => messages
            .into_iter()
            .filter_map(MidiMessage::parse)
            .map(|m| m.to_string())
            .collect::<Vec<_>>()
            .join(", "),
        Err(_) => "unparsed".to_string(),
    }
}

/// Format MIDI bytes as uppercase, space-separated hex ("C0 01")
pub fn format_hex(data: &[u8]) -> String {
    data.iter()
        .map(|b| format!("{:02X}", b))
        .collect::<Vec<_>>()
        .join(" ")
}

/// List available MIDI output port names
pub fn list_output_ports() -> Result<Vec<String>> {
    let midi_out = MidiOutput::new("Preset-GW-Scanner").context("Failed to create MIDI output")?;

    let mut port_names = Vec::new();
    for port in midi_out.ports() {
        if let Ok(name) = midi_out.port_name(&port) {
            port_names.push(name);
        }
    }

    Ok(port_names)
}

/// Find an output port by case-insensitive substring match
pub fn find_output_port(midi_out: &MidiOutput, pattern: &str) -> Option<(MidiOutputPort, String)> {
    let pattern = pattern.to_lowercase();
    for port in midi_out.ports() {
        if let Ok(name) = midi_out.port_name(&port) {
            if name.to_lowercase().contains(&pattern) {
                debug!("Found port '{}' matching pattern '{}'", name, pattern);
                return Some((port, name));
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_program_change_parsing() {
        let msg = MidiMessage::parse(&[0xC0, 0x01]).unwrap();
        assert_eq!(msg, MidiMessage::ProgramChange { channel: 0, program: 1 });
        assert_eq!(msg.to_string(), "ProgramChange ch:1 p:1");
    }

    #[test]
    fn test_note_on_velocity_zero() {
        let msg = MidiMessage::parse(&[0x90, 60, 0]).unwrap();
        assert_eq!(msg, MidiMessage::NoteOff { channel: 0, note: 60, velocity: 0 });
    }

    #[test]
    fn test_pitch_bend() {
        let msg = MidiMessage::parse(&[0xE0, 0x00, 0x40]).unwrap();
        assert_eq!(msg, MidiMessage::PitchBend { channel: 0, value: 8192 });
        assert_eq!(msg.encode(), vec![0xE0, 0x00, 0x40]);
    }

    #[test]
    fn test_truncated_message_does_not_parse() {
        assert_eq!(MidiMessage::parse(&[0xC0]), None);
        assert_eq!(MidiMessage::parse(&[0xB0, 7]), None);
    }

    #[test]
    fn test_split_several_messages() {
        let data = [0xC0, 0x05, 0xB0, 0x07, 0x64, 0xF8];
        let messages = split_messages(&data).unwrap();
        assert_eq!(messages, vec![&data[0..2], &data[2..5], &data[5..6]]);
    }

    #[test]
    fn test_split_sysex() {
        let data = [0xF0, 0x7E, 0x01, 0xF7, 0xC1, 0x02];
        let messages = split_messages(&data).unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(MidiMessage::parse(messages[0]), Some(MidiMessage::SysEx { data: vec![0x7E, 0x01] }));
    }

    #[test]
    fn test_split_rejects_malformed() {
        assert_eq!(
            split_messages(&[0xC0]),
            Err(FrameError::Truncated { offset: 0, status: 0xC0, expected: 2, actual: 1 })
        );
        assert_eq!(
            split_messages(&[0x01, 0x02]),
            Err(FrameError::MissingStatus { offset: 0, byte: 0x01 })
        );
        assert_eq!(
            split_messages(&[0xC0, 0x80]),
            Err(FrameError::DataOutOfRange { offset: 1, byte: 0x80 })
        );
        assert_eq!(
            split_messages(&[0xF0, 0x01]),
            Err(FrameError::UnterminatedSysEx { offset: 0 })
        );
        assert_eq!(
            split_messages(&[0xF4]),
            Err(FrameError::UndefinedStatus { offset: 0, status: 0xF4 })
        );
    }

    #[test]
    fn test_describe_and_format() {
        assert_eq!(format_hex(&[0xC0, 0x7F]), "C0 7F");
        assert_eq!(describe(&[0xC0, 0x7F]), "ProgramChange ch:1 p:127");
        assert_eq!(describe(&[0xC0]), "unparsed");
    }
}
