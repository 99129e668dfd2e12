//! DBC file parser
//!
//! Parses Vector DBC files and converts them into schema sources for the catalog.

use crate::signals::database::{
    ByteOrder, MessageDefinition, SchemaSource, SignalDefinition, ValueType,
};
use crate::types::SchemaLoadError;
use std::path::Path;

/// DBC sets bit 31 of the ID to flag 29-bit identifiers
const EXTENDED_ID_FLAG_MASK: u32 = 0x1FFF_FFFF;

/// Pseudo-message CANdb++ uses to hold signals not mapped to any frame
const INDEPENDENT_SIGNALS_MSG_ID: u32 = 0xC000_0000;
const INDEPENDENT_SIGNALS_MSG_NAME: &str = "VECTOR__INDEPENDENT_SIG_MSG";

/// Parse a DBC file into a schema source named after the file
pub fn parse_dbc_file(path: &Path) -> Result<SchemaSource, SchemaLoadError> {
    log::info!("Parsing DBC file: {:?}", path);

    let source_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("unknown.dbc")
        .to_string();

    let bytes = std::fs::read(path).map_err(|error| SchemaLoadError::Io {
        source_name: source_name.clone(),
        error,
    })?;

    // Try UTF-8 first, then fall back to Latin-1 (compatible with Windows-1252)
    let content = match String::from_utf8(bytes) {
        Ok(text) => text,
        Err(err) => {
            log::warn!("DBC file {} is not UTF-8, trying Latin-1 encoding", source_name);
            err.into_bytes().iter().map(|&b| b as char).collect()
        }
    };

    parse_dbc_str(&source_name, &content)
}

/// Parse DBC text held in memory
pub fn parse_dbc_str(source_name: &str, content: &str) -> Result<SchemaSource, SchemaLoadError> {
    let dbc = can_dbc::DBC::from_slice(content.as_bytes()).map_err(|e| {
        SchemaLoadError::Parse {
            source_name: source_name.to_string(),
            reason: format!("{:?}", e),
        }
    })?;

    let messages = dbc
        .messages()
        .iter()
        .filter(|dbc_msg| {
            let pseudo = is_independent_signals_msg(dbc_msg);
            if pseudo {
                log::debug!(
                    "Skipping {} in {} ({} unmapped signals)",
                    dbc_msg.message_name(),
                    source_name,
                    dbc_msg.signals().len()
                );
            }
            !pseudo
        })
        .map(|dbc_msg| convert_message(dbc_msg, source_name))
        .collect::<Result<Vec<_>, _>>()?;

    log::info!("Parsed {} messages from {}", messages.len(), source_name);

    Ok(SchemaSource::new(source_name, messages))
}

fn is_independent_signals_msg(dbc_msg: &can_dbc::Message) -> bool {
    dbc_msg.message_id().0 == INDEPENDENT_SIGNALS_MSG_ID
        || dbc_msg.message_name() == INDEPENDENT_SIGNALS_MSG_NAME
}

/// Convert a can-dbc message to our MessageDefinition
fn convert_message(
    dbc_msg: &can_dbc::Message,
    source: &str,
) -> Result<MessageDefinition, SchemaLoadError> {
    // The top-level switch wins over an extended-multiplexing sub-switch
    let find_mux = |top_level: bool| {
        dbc_msg.signals().iter().find(|sig| match sig.multiplexer_indicator() {
            can_dbc::MultiplexIndicator::Multiplexor => top_level,
            can_dbc::MultiplexIndicator::MultiplexorAndMultiplexedSignal(_) => !top_level,
            _ => false,
        })
    };
    let multiplexor = find_mux(true)
        .or_else(|| find_mux(false))
        .map(|sig| sig.name().to_string());

    let signals = dbc_msg
        .signals()
        .iter()
        .map(|dbc_sig| convert_signal(dbc_sig, dbc_msg.message_name(), source))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(MessageDefinition {
        arbitration_id: dbc_msg.message_id().0 & EXTENDED_ID_FLAG_MASK,
        name: dbc_msg.message_name().to_string(),
        expected_length: *dbc_msg.message_size() as usize,
        sender: match dbc_msg.transmitter() {
            can_dbc::Transmitter::NodeName(name) => Some(name.to_string()),
            _ => None,
        },
        signals,
        multiplexor,
        source: source.to_string(),
    })
}

/// Convert a can-dbc signal to our SignalDefinition
fn convert_signal(
    dbc_sig: &can_dbc::Signal,
    message_name: &str,
    source: &str,
) -> Result<SignalDefinition, SchemaLoadError> {
    let bit_length = u16::try_from(*dbc_sig.signal_size()).map_err(|_| {
        SchemaLoadError::InvalidSignal {
            source_name: source.to_string(),
            message: message_name.to_string(),
            signal: dbc_sig.name().to_string(),
            reason: format!("signal size {} out of range", dbc_sig.signal_size()),
        }
    })?;
    let dbc_start = u16::try_from(*dbc_sig.start_bit()).map_err(|_| {
        SchemaLoadError::InvalidSignal {
            source_name: source.to_string(),
            message: message_name.to_string(),
            signal: dbc_sig.name().to_string(),
            reason: format!("start bit {} out of range", dbc_sig.start_bit()),
        }
    })?;

    let (byte_order, start_bit) = match *dbc_sig.byte_order() {
        can_dbc::ByteOrder::LittleEndian => (ByteOrder::LittleEndian, dbc_start),
        can_dbc::ByteOrder::BigEndian => (ByteOrder::BigEndian, motorola_msb_position(dbc_start)),
    };

    let value_type = match *dbc_sig.value_type() {
        can_dbc::ValueType::Signed => ValueType::Signed,
        can_dbc::ValueType::Unsigned => ValueType::Unsigned,
    };

    let multiplexor_value = match *dbc_sig.multiplexer_indicator() {
        can_dbc::MultiplexIndicator::MultiplexedSignal(switch_value)
        | can_dbc::MultiplexIndicator::MultiplexorAndMultiplexedSignal(switch_value) => {
            Some(switch_value)
        }
        _ => None,
    };

    Ok(SignalDefinition {
        name: dbc_sig.name().to_string(),
        start_bit,
        bit_length,
        byte_order,
        value_type,
        scale: *dbc_sig.factor(),
        offset: *dbc_sig.offset(),
        min: *dbc_sig.min(),
        max: *dbc_sig.max(),
        unit: if dbc_sig.unit().is_empty() {
            None
        } else {
            Some(dbc_sig.unit().to_string())
        },
        multiplexor_value,
    })
}

/// Map a DBC Motorola start bit to sequential MSB-first numbering
///
/// DBC names the MSB of a big-endian signal by its sawtooth position (bit 0 is
/// the LSB of byte 0). The decoder walks bits MSB-first, where bit 0 is the MSB
/// of byte 0.
pub(crate) fn motorola_msb_position(dbc_start_bit: u16) -> u16 {
    (dbc_start_bit / 8) * 8 + (7 - dbc_start_bit % 8)
}
