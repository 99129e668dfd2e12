//! Message Decoding Engine
//!
//! Extracts signal values from raw CAN frames based on message definitions
//! from the catalog. Handles bit extraction, endianness, multiplexing,
//! and physical value conversion.

use crate::signals::database::{ByteOrder, MessageDefinition, SignalDefinition, ValueType};
use crate::types::{DecodeError, DecodedMessage, Frame};

/// Result of decoding one frame against its message definition
///
/// `skipped` lists the signals that could not be read from this payload; the
/// message still carries every signal that could.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodeOutcome {
    pub message: DecodedMessage,
    pub skipped: Vec<DecodeError>,
}

impl DecodeOutcome {
    pub fn is_complete(&self) -> bool {
        self.skipped.is_empty()
    }
}

/// Which multiplexed signal group is active for a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MuxSelector {
    /// Message has no multiplexor; every signal applies
    Unmultiplexed,
    /// Multiplexor decoded to this raw value
    Selected(u64),
    /// Multiplexor could not be read; multiplexed signals are skipped
    Unavailable,
}

impl MuxSelector {
    /// Whether a signal belongs to the active group
    pub fn admits(&self, signal: &SignalDefinition) -> bool {
        match (signal.multiplexor_value, self) {
            (None, _) => true,
            (Some(wanted), MuxSelector::Selected(active)) => wanted == *active,
            (Some(_), _) => false,
        }
    }
}

/// Message decoder - extracts signals from CAN frames
pub struct MessageDecoder;

impl MessageDecoder {
    /// Decode a CAN frame against a message definition
    ///
    /// Decoding runs in two phases: the multiplexor (if any) is read first to
    /// pick the active signal group, then every admitted signal is extracted.
    pub fn decode_message(frame: &Frame, message_def: &MessageDefinition) -> DecodeOutcome {
        let mut skipped = Vec::new();

        let selector = match message_def.multiplexor_signal() {
            None => MuxSelector::Unmultiplexed,
            Some(mux_signal) => match Self::extract_raw(&frame.data, mux_signal) {
                Ok(raw) => MuxSelector::Selected(raw),
                Err(err) => {
                    skipped.push(err);
                    MuxSelector::Unavailable
                }
            },
        };

        let mut signals = Vec::with_capacity(message_def.signals.len());
        for signal in message_def.signals.iter().filter(|s| selector.admits(s)) {
            if selector == MuxSelector::Unavailable
                && message_def.multiplexor.as_deref() == Some(signal.name.as_str())
            {
                // Already reported above
                continue;
            }
            match Self::decode_signal(&frame.data, signal) {
                Ok(value) => signals.push((signal.name.clone(), value)),
                Err(err) => skipped.push(err),
            }
        }

        DecodeOutcome {
            message: DecodedMessage {
                timestamp: frame.timestamp,
                message_name: message_def.name.clone(),
                signals,
            },
            skipped,
        }
    }

    /// Decode a single signal to its physical value
    pub fn decode_signal(data: &[u8], signal: &SignalDefinition) -> Result<f64, DecodeError> {
        let raw_value = Self::extract_signal_value(data, signal)?;
        Ok(Self::physical_value(raw_value, signal))
    }

    /// Apply scale and offset; no clamping to min/max
    fn physical_value(raw_value: i128, signal: &SignalDefinition) -> f64 {
        raw_value as f64 * signal.scale + signal.offset
    }

    /// Extract the raw integer value of a signal, sign-extended when signed
    ///
    /// Unsigned 64-bit values do not fit an i64, so the raw value is widened.
    fn extract_signal_value(data: &[u8], signal: &SignalDefinition) -> Result<i128, DecodeError> {
        let raw = Self::extract_raw(data, signal)?;
        Ok(match signal.value_type {
            ValueType::Unsigned => raw as i128,
            ValueType::Signed => Self::sign_extend(raw, signal.bit_length as usize) as i128,
        })
    }

    /// Extract the unsigned bit pattern of a signal from frame data
    fn extract_raw(data: &[u8], signal: &SignalDefinition) -> Result<u64, DecodeError> {
        let start_bit = signal.start_bit as usize;
        let length = signal.bit_length as usize;
        let payload_bits = data.len() * 8;

        if start_bit + length > payload_bits {
            return Err(DecodeError::BitRangeExceedsPayload {
                signal: signal.name.clone(),
                start_bit,
                bit_length: length,
                payload_bits,
            });
        }

        Ok(match signal.byte_order {
            ByteOrder::LittleEndian => Self::extract_little_endian(data, start_bit, length),
            ByteOrder::BigEndian => Self::extract_big_endian(data, start_bit, length),
        })
    }

    /// Extract signal with little-endian (Intel) byte order
    ///
    /// - Start bit points to the LSB (least significant bit)
    /// - Bits are numbered from LSB to MSB within each byte
    /// - Byte 0 is the first byte in the CAN frame
    fn extract_little_endian(data: &[u8], start_bit: usize, length: usize) -> u64 {
        let mut result: u64 = 0;

        for i in 0..length {
            let bit_pos = start_bit + i;
            let bit_value = (data[bit_pos / 8] >> (bit_pos % 8)) & 0x01;
            result |= (bit_value as u64) << i;
        }

        result
    }

    /// Extract signal with big-endian (Motorola) byte order
    ///
    /// - Start bit points to the MSB of the signal
    /// - Bit numbering: bit 0 = MSB of byte 0, bit 7 = LSB of byte 0
    /// - Signal grows towards higher bit numbers
    fn extract_big_endian(data: &[u8], start_bit: usize, length: usize) -> u64 {
        let mut result: u64 = 0;

        for i in 0..length {
            let bit_pos = start_bit + i;
            let bit_value = (data[bit_pos / 8] >> (7 - bit_pos % 8)) & 0x01;
            result |= (bit_value as u64) << (length - 1 - i);
        }

        result
    }

    /// Sign-extend a value from N bits to 64 bits (two's complement)
    fn sign_extend(value: u64, bit_length: usize) -> i64 {
        if bit_length >= 64 {
            return value as i64;
        }

        let sign_bit = 1u64 << (bit_length - 1);
        if (value & sign_bit) != 0 {
            let mask = !0u64 << bit_length;
            (value | mask) as i64
        } else {
            value as i64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signals::database::tests::message;

    fn frame(data: &[u8]) -> Frame {
        Frame::new(0x100, data, 12.5).unwrap()
    }

    fn signal(name: &str, start_bit: u16, bit_length: u16) -> SignalDefinition {
        SignalDefinition::new(name, start_bit, bit_length)
    }

    fn signed(mut sig: SignalDefinition) -> SignalDefinition {
        sig.value_type = ValueType::Signed;
        sig
    }

    fn big_endian(mut sig: SignalDefinition) -> SignalDefinition {
        sig.byte_order = ByteOrder::BigEndian;
        sig
    }

    fn scaled(mut sig: SignalDefinition, scale: f64, offset: f64) -> SignalDefinition {
        sig.scale = scale;
        sig.offset = offset;
        sig
    }

    #[test]
    fn test_extract_little_endian_simple() {
        let data = vec![0xAB, 0xCD, 0xEF, 0x12];
        assert_eq!(MessageDecoder::extract_little_endian(&data, 0, 8), 0xAB);
    }

    #[test]
    fn test_extract_little_endian_cross_byte() {
        let data = vec![0xAB, 0xCD, 0xEF, 0x12];
        assert_eq!(MessageDecoder::extract_little_endian(&data, 0, 16), 0xCDAB);
        assert_eq!(MessageDecoder::extract_little_endian(&data, 4, 8), 0xDA);
    }

    #[test]
    fn test_extract_big_endian() {
        let data = vec![0xAB, 0xCD, 0xEF, 0x12];
        assert_eq!(MessageDecoder::extract_big_endian(&data, 0, 8), 0xAB);
        assert_eq!(MessageDecoder::extract_big_endian(&data, 0, 16), 0xABCD);
        assert_eq!(MessageDecoder::extract_big_endian(&data, 4, 8), 0xBC);
        assert_eq!(MessageDecoder::extract_big_endian(&data, 8, 4), 0xC);
    }

    #[test]
    fn test_sign_extend() {
        assert_eq!(MessageDecoder::sign_extend(0x7F, 8), 127);
        assert_eq!(MessageDecoder::sign_extend(0xFF, 8), -1);
        assert_eq!(MessageDecoder::sign_extend(0x8000, 16), -32768);
        assert_eq!(MessageDecoder::sign_extend(0b1, 1), -1);
        assert_eq!(MessageDecoder::sign_extend(u64::MAX, 64), -1);
    }

    #[test]
    fn test_unsigned_scaling_is_exact() {
        let sig = scaled(signal("Voltage", 0, 12), 0.25, -10.0);
        for raw in [0u64, 1, 7, 2048, 4095] {
            let data = raw.to_le_bytes();
            let value = MessageDecoder::decode_signal(&data, &sig).unwrap();
            assert_eq!(value, raw as f64 * 0.25 + -10.0);
        }
    }

    #[test]
    fn test_signed_extremes() {
        for length in [2u16, 8, 13, 32, 63, 64] {
            let sig = scaled(signed(signal("Torque", 0, length)), 0.5, 3.0);
            let all_ones = if length == 64 { u64::MAX } else { (1u64 << length) - 1 };
            let min_pattern = 1u64 << (length - 1);

            let value = MessageDecoder::decode_signal(&all_ones.to_le_bytes(), &sig).unwrap();
            assert_eq!(value, -1.0 * 0.5 + 3.0, "all ones, {} bits", length);

            let value = MessageDecoder::decode_signal(&min_pattern.to_le_bytes(), &sig).unwrap();
            let expected = -(2f64.powi(length as i32 - 1)) * 0.5 + 3.0;
            assert_eq!(value, expected, "sign bit only, {} bits", length);
        }
    }

    #[test]
    fn test_unsigned_64_bit_signal() {
        let sig = signal("Serial", 0, 64);
        let value = MessageDecoder::decode_signal(&[0xFF; 8], &sig).unwrap();
        assert_eq!(value, u64::MAX as f64);
    }

    #[test]
    fn test_scaled_byte() {
        let sig = scaled(signal("Temp", 0, 8), 0.1, 0.0);
        let value = MessageDecoder::decode_signal(&[0xC8], &sig).unwrap();
        assert_eq!(value, 200.0 * 0.1);
        assert!((value - 20.0).abs() < 1e-9);
    }

    #[test]
    fn test_big_endian_signed_signal() {
        // 16-bit Motorola signal in bytes 2-3
        let sig = scaled(big_endian(signed(signal("Current", 16, 16))), 0.1, 0.0);
        let value = MessageDecoder::decode_signal(&[0, 0, 0xFF, 0x38, 0, 0, 0, 0], &sig).unwrap();
        assert_eq!(value, -200.0 * 0.1);
    }

    #[test]
    fn test_two_signals() {
        let def = message(
            0x100,
            "Pair",
            vec![signal("first", 0, 8), signal("second", 8, 8)],
        );
        let outcome =
            MessageDecoder::decode_message(&frame(&[0x0A, 0x14, 0, 0, 0, 0, 0, 0]), &def);

        assert!(outcome.is_complete());
        assert_eq!(outcome.message.message_name, "Pair");
        assert_eq!(outcome.message.timestamp, 12.5);
        assert_eq!(
            outcome.message.signals,
            vec![("first".to_string(), 10.0), ("second".to_string(), 20.0)]
        );
    }

    #[test]
    fn test_short_payload_keeps_other_signals() {
        let def = message(
            0x100,
            "Partial",
            vec![signal("head", 0, 8), signal("tail", 48, 16), signal("middle", 8, 8)],
        );
        let outcome = MessageDecoder::decode_message(&frame(&[0x01, 0x02, 0x03]), &def);

        assert_eq!(
            outcome.message.signals,
            vec![("head".to_string(), 1.0), ("middle".to_string(), 2.0)]
        );
        assert_eq!(outcome.skipped.len(), 1);
        assert_eq!(
            outcome.skipped[0],
            DecodeError::BitRangeExceedsPayload {
                signal: "tail".to_string(),
                start_bit: 48,
                bit_length: 16,
                payload_bits: 24,
            }
        );
    }

    #[test]
    fn test_empty_payload() {
        let def = message(0x100, "Nothing", vec![signal("a", 0, 1)]);
        let outcome = MessageDecoder::decode_message(&frame(&[]), &def);
        assert!(outcome.message.signals.is_empty());
        assert_eq!(outcome.skipped.len(), 1);
    }

    fn multiplexed_message() -> MessageDefinition {
        let mut sig_a = signal("SignalA", 8, 16);
        sig_a.multiplexor_value = Some(0);
        let mut sig_b = scaled(signal("SignalB", 8, 16), 0.1, 0.0);
        sig_b.multiplexor_value = Some(1);

        let mut def = message(
            0x200,
            "MultiplexedMsg",
            vec![signal("Mode", 0, 8), sig_a, sig_b, signal("Counter", 24, 8)],
        );
        def.multiplexor = Some("Mode".to_string());
        def
    }

    #[test]
    fn test_multiplexed_selection() {
        let def = multiplexed_message();

        let outcome = MessageDecoder::decode_message(&frame(&[0, 0x10, 0x00, 7]), &def);
        assert!(outcome.is_complete());
        assert_eq!(outcome.message.signal("Mode"), Some(0.0));
        assert_eq!(outcome.message.signal("SignalA"), Some(16.0));
        assert_eq!(outcome.message.signal("SignalB"), None);
        assert_eq!(outcome.message.signal("Counter"), Some(7.0));

        let outcome = MessageDecoder::decode_message(&frame(&[1, 0x10, 0x00, 7]), &def);
        assert_eq!(outcome.message.signal("SignalA"), None);
        assert_eq!(outcome.message.signal("SignalB"), Some(16.0 * 0.1));

        // No group registered for mode 2: only plain signals remain
        let outcome = MessageDecoder::decode_message(&frame(&[2, 0x10, 0x00, 7]), &def);
        assert!(outcome.is_complete());
        assert_eq!(outcome.message.signals.len(), 2);
    }

    #[test]
    fn test_unreadable_multiplexor_skips_group() {
        let def = multiplexed_message();
        let outcome = MessageDecoder::decode_message(&frame(&[]), &def);

        assert!(outcome.message.signals.is_empty());
        let skipped: Vec<&str> = outcome.skipped.iter().map(|e| e.signal()).collect();
        assert_eq!(skipped, vec!["Mode", "Counter"]);
    }

    #[test]
    fn test_mux_selector_admits() {
        let plain = signal("plain", 0, 8);
        let mut grouped = signal("grouped", 8, 8);
        grouped.multiplexor_value = Some(3);

        assert!(MuxSelector::Unavailable.admits(&plain));
        assert!(!MuxSelector::Unavailable.admits(&grouped));
        assert!(MuxSelector::Selected(3).admits(&grouped));
        assert!(!MuxSelector::Selected(4).admits(&grouped));
        assert!(MuxSelector::Unmultiplexed.admits(&plain));
    }
}
