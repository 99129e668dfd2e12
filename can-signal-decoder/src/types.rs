//! Core types for the CAN signal decoder library
//!
//! This module defines the frames the decoder consumes, the decoded messages it
//! emits, and the error taxonomy shared by the catalog, decoder and transports.

use chrono::Utc;
use std::fmt;

/// Largest payload a frame may carry (CAN-FD)
pub const MAX_PAYLOAD_LEN: usize = 64;

/// Raw CAN frame as delivered by a transport
///
/// Frames are immutable once received; the decoder only borrows them.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    /// CAN message ID (11-bit or 29-bit)
    pub arbitration_id: u32,
    /// Payload bytes (0-8 bytes for classic CAN, up to 64 for CAN-FD)
    pub data: Vec<u8>,
    /// Reception time in seconds
    pub timestamp: f64,
}

impl Frame {
    /// Build a frame, rejecting payloads longer than [`MAX_PAYLOAD_LEN`]
    pub fn new(arbitration_id: u32, data: &[u8], timestamp: f64) -> Option<Self> {
        if data.len() > MAX_PAYLOAD_LEN {
            return None;
        }
        Some(Self {
            arbitration_id,
            data: data.to_vec(),
            timestamp,
        })
    }

    /// Build a frame stamped with the current wall-clock time
    pub fn now(arbitration_id: u32, data: &[u8]) -> Option<Self> {
        Self::new(arbitration_id, data, wall_clock_seconds())
    }

    /// Payload length in bits
    pub fn payload_bits(&self) -> usize {
        self.data.len() * 8
    }
}

/// Current wall-clock time as fractional seconds since the Unix epoch
pub fn wall_clock_seconds() -> f64 {
    Utc::now().timestamp_micros() as f64 / 1_000_000.0
}

/// A message decoded from a single frame
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedMessage {
    /// Timestamp copied from the frame
    pub timestamp: f64,
    /// Message name from the schema
    pub message_name: String,
    /// Signal name and physical value, in definition order
    pub signals: Vec<(String, f64)>,
}

impl DecodedMessage {
    /// Physical value of a signal, if it was decoded
    pub fn signal(&self, name: &str) -> Option<f64> {
        self.signals
            .iter()
            .find(|(signal, _)| signal == name)
            .map(|(_, value)| *value)
    }
}

impl fmt::Display for DecodedMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} @ {:.6}:", self.message_name, self.timestamp)?;
        for (name, value) in &self.signals {
            write!(f, " {}={}", name, value)?;
        }
        Ok(())
    }
}

/// Errors raised while building the catalog from schema sources
#[derive(Debug, thiserror::Error)]
pub enum SchemaLoadError {
    #[error("Failed to read schema source {source_name}: {error}")]
    Io {
        source_name: String,
        #[source]
        error: std::io::Error,
    },

    #[error("Failed to parse schema source {source_name}: {reason}")]
    Parse { source_name: String, reason: String },

    #[error("CAN ID 0x{id:X} defined in both {first_source} and {second_source}")]
    DuplicateId {
        id: u32,
        first_source: String,
        second_source: String,
    },

    #[error("Message name '{name}' defined in both {first_source} and {second_source}")]
    DuplicateName {
        name: String,
        first_source: String,
        second_source: String,
    },

    #[error("Invalid message '{message}' in {source_name}: {reason}")]
    InvalidMessage {
        source_name: String,
        message: String,
        reason: String,
    },

    #[error("Invalid signal '{message}.{signal}' in {source_name}: {reason}")]
    InvalidSignal {
        source_name: String,
        message: String,
        signal: String,
        reason: String,
    },
}

/// Per-signal decoding failure
///
/// Only the affected signal is dropped; the rest of the frame still decodes.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    #[error(
        "bit range exceeds payload: signal '{signal}' needs bits {start_bit}..{end} but payload has {payload_bits}",
        end = .start_bit + .bit_length
    )]
    BitRangeExceedsPayload {
        signal: String,
        start_bit: usize,
        bit_length: usize,
        payload_bits: usize,
    },
}

impl DecodeError {
    /// Name of the signal that failed
    pub fn signal(&self) -> &str {
        match self {
            DecodeError::BitRangeExceedsPayload { signal, .. } => signal,
        }
    }
}

/// Errors reported by bus transports
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("Failed to connect to {channel}: {reason}")]
    Connect { channel: String, reason: String },

    #[error("Read error: {0}")]
    Read(String),

    #[error("Transport not connected")]
    NotConnected,

    #[error("Transport not supported in this build: {0}")]
    Unsupported(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors that end the ingest pipeline
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("Connection failed: {0}")]
    Connection(#[source] TransportError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_rejects_oversized_payload() {
        assert!(Frame::new(0x100, &[0u8; 64], 0.0).is_some());
        assert!(Frame::new(0x100, &[0u8; 65], 0.0).is_none());
    }

    #[test]
    fn test_decoded_message_lookup_and_display() {
        let msg = DecodedMessage {
            timestamp: 1.5,
            message_name: "EngineData".to_string(),
            signals: vec![("EngineSpeed".to_string(), 800.0), ("EngineTemp".to_string(), 90.0)],
        };
        assert_eq!(msg.signal("EngineTemp"), Some(90.0));
        assert_eq!(msg.signal("Missing"), None);
        assert_eq!(
            msg.to_string(),
            "EngineData @ 1.500000: EngineSpeed=800 EngineTemp=90"
        );
    }

    #[test]
    fn test_decode_error_message() {
        let err = DecodeError::BitRangeExceedsPayload {
            signal: "Speed".to_string(),
            start_bit: 8,
            bit_length: 16,
            payload_bits: 16,
        };
        assert_eq!(err.signal(), "Speed");
        assert!(err.to_string().starts_with("bit range exceeds payload"));
        assert!(err.to_string().contains("8..24"));
    }
}
