//! Message catalog
//!
//! Merges message definitions from one or more schema sources into a single,
//! read-only catalog keyed by CAN ID.

use crate::types::SchemaLoadError;
use std::collections::hash_map::Entry;
use std::collections::{HashMap, HashSet};

/// Largest message payload in bytes (CAN-FD)
pub const MAX_MESSAGE_LEN: usize = 64;

/// Widest signal the decoder can extract
pub const MAX_SIGNAL_BITS: u16 = 64;

/// A complete CAN message definition
#[derive(Debug, Clone, PartialEq)]
pub struct MessageDefinition {
    /// CAN message ID
    pub arbitration_id: u32,
    /// Message name
    pub name: String,
    /// Declared payload size in bytes
    pub expected_length: usize,
    /// Sender ECU name (optional)
    pub sender: Option<String>,
    /// All signals in this message, in definition order
    pub signals: Vec<SignalDefinition>,
    /// Name of the multiplexor signal, if the message is multiplexed
    pub multiplexor: Option<String>,
    /// Schema source this definition came from
    pub source: String,
}

impl MessageDefinition {
    /// Find a signal by name
    pub fn signal(&self, name: &str) -> Option<&SignalDefinition> {
        self.signals.iter().find(|s| s.name == name)
    }

    /// The multiplexor signal definition, if any
    pub fn multiplexor_signal(&self) -> Option<&SignalDefinition> {
        self.multiplexor.as_deref().and_then(|name| self.signal(name))
    }

    pub fn is_multiplexed(&self) -> bool {
        self.multiplexor.is_some()
    }
}

/// A CAN signal definition
#[derive(Debug, Clone, PartialEq)]
pub struct SignalDefinition {
    /// Signal name
    pub name: String,
    /// Start bit in the payload
    ///
    /// Little-endian signals: position of the LSB, where bit 0 is the LSB of
    /// byte 0. Big-endian signals: position of the MSB in sequential MSB-first
    /// numbering, where bit 0 is the MSB of byte 0.
    pub start_bit: u16,
    /// Length in bits (1..=64)
    pub bit_length: u16,
    pub byte_order: ByteOrder,
    pub value_type: ValueType,
    /// Scale factor to convert raw value to physical value
    pub scale: f64,
    /// Offset to add after scaling
    pub offset: f64,
    /// Minimum physical value (informational)
    pub min: f64,
    /// Maximum physical value (informational)
    pub max: f64,
    /// Engineering unit (e.g., "km/h", "°C", "V")
    pub unit: Option<String>,
    /// Multiplexor value selecting this signal (None if not multiplexed)
    pub multiplexor_value: Option<u64>,
}

impl SignalDefinition {
    /// Unsigned, little-endian, unscaled signal; adjust fields as needed
    pub fn new(name: impl Into<String>, start_bit: u16, bit_length: u16) -> Self {
        Self {
            name: name.into(),
            start_bit,
            bit_length,
            byte_order: ByteOrder::LittleEndian,
            value_type: ValueType::Unsigned,
            scale: 1.0,
            offset: 0.0,
            min: 0.0,
            max: 0.0,
            unit: None,
            multiplexor_value: None,
        }
    }

    /// First bit past the end of the signal
    pub fn end_bit(&self) -> usize {
        self.start_bit as usize + self.bit_length as usize
    }
}

/// Byte order for signal extraction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ByteOrder {
    /// Little-endian (Intel format)
    LittleEndian,
    /// Big-endian (Motorola format)
    BigEndian,
}

/// Value type for signal interpretation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueType {
    Signed,
    Unsigned,
}

/// Parsed output of one schema file
#[derive(Debug, Clone, Default)]
pub struct SchemaSource {
    /// Name used in error messages (usually the file name)
    pub name: String,
    pub messages: Vec<MessageDefinition>,
}

impl SchemaSource {
    pub fn new(name: impl Into<String>, messages: Vec<MessageDefinition>) -> Self {
        Self {
            name: name.into(),
            messages,
        }
    }
}

/// Read-only collection of message definitions
#[derive(Debug, Default)]
pub struct Catalog {
    /// Key: CAN ID
    messages: HashMap<u32, MessageDefinition>,
    /// Key: message name, Value: CAN ID
    names: HashMap<String, u32>,
}

impl Catalog {
    /// Merge schema sources in order
    ///
    /// Fails on the first CAN ID or message name that is defined twice, and on
    /// any definition the decoder could not evaluate safely.
    pub fn load<I>(sources: I) -> Result<Self, SchemaLoadError>
    where
        I: IntoIterator<Item = SchemaSource>,
    {
        let mut catalog = Catalog::default();

        for source in sources {
            let count = source.messages.len();
            for mut message in source.messages {
                message.source = source.name.clone();
                validate_message(&message)?;
                catalog.insert(message)?;
            }
            log::info!("Loaded {} messages from {}", count, source.name);
        }

        Ok(catalog)
    }

    fn insert(&mut self, message: MessageDefinition) -> Result<(), SchemaLoadError> {
        if let Some(existing) = self.messages.get(&message.arbitration_id) {
            return Err(SchemaLoadError::DuplicateId {
                id: message.arbitration_id,
                first_source: existing.source.clone(),
                second_source: message.source,
            });
        }

        match self.names.entry(message.name.clone()) {
            Entry::Occupied(entry) => {
                let first_source = self
                    .messages
                    .get(entry.get())
                    .map(|m| m.source.clone())
                    .unwrap_or_default();
                Err(SchemaLoadError::DuplicateName {
                    name: message.name,
                    first_source,
                    second_source: message.source,
                })
            }
            Entry::Vacant(entry) => {
                entry.insert(message.arbitration_id);
                self.messages.insert(message.arbitration_id, message);
                Ok(())
            }
        }
    }

    /// Message definition for a CAN ID
    pub fn lookup(&self, arbitration_id: u32) -> Option<&MessageDefinition> {
        self.messages.get(&arbitration_id)
    }

    pub fn message_by_name(&self, name: &str) -> Option<&MessageDefinition> {
        self.names.get(name).and_then(|id| self.messages.get(id))
    }

    /// All CAN IDs in the catalog, sorted
    pub fn ids(&self) -> Vec<u32> {
        let mut ids: Vec<u32> = self.messages.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn stats(&self) -> CatalogStats {
        CatalogStats {
            num_messages: self.messages.len(),
            num_signals: self.messages.values().map(|m| m.signals.len()).sum(),
            num_multiplexed: self.messages.values().filter(|m| m.is_multiplexed()).count(),
        }
    }
}

/// Catalog statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CatalogStats {
    pub num_messages: usize,
    pub num_signals: usize,
    /// Messages with a multiplexor signal
    pub num_multiplexed: usize,
}

fn validate_message(message: &MessageDefinition) -> Result<(), SchemaLoadError> {
    let invalid_message = |reason: String| SchemaLoadError::InvalidMessage {
        source_name: message.source.clone(),
        message: message.name.clone(),
        reason,
    };

    if message.expected_length > MAX_MESSAGE_LEN {
        return Err(invalid_message(format!(
            "length {} exceeds {} bytes",
            message.expected_length, MAX_MESSAGE_LEN
        )));
    }

    let mut seen = HashSet::with_capacity(message.signals.len());
    for signal in &message.signals {
        if !seen.insert(signal.name.as_str()) {
            return Err(invalid_message(format!("duplicate signal '{}'", signal.name)));
        }
        validate_signal(message, signal)?;
    }

    match &message.multiplexor {
        Some(name) if message.signal(name).is_none() => {
            return Err(invalid_message(format!(
                "multiplexor '{}' is not a signal of this message",
                name
            )));
        }
        None => {
            if let Some(signal) = message.signals.iter().find(|s| s.multiplexor_value.is_some()) {
                return Err(invalid_message(format!(
                    "signal '{}' is multiplexed but the message has no multiplexor",
                    signal.name
                )));
            }
        }
        _ => {}
    }

    Ok(())
}

fn validate_signal(
    message: &MessageDefinition,
    signal: &SignalDefinition,
) -> Result<(), SchemaLoadError> {
    let invalid = |reason: String| SchemaLoadError::InvalidSignal {
        source_name: message.source.clone(),
        message: message.name.clone(),
        signal: signal.name.clone(),
        reason,
    };

    if signal.bit_length == 0 || signal.bit_length > MAX_SIGNAL_BITS {
        return Err(invalid(format!(
            "bit length {} outside 1..={}",
            signal.bit_length, MAX_SIGNAL_BITS
        )));
    }
    if signal.scale == 0.0 || !signal.scale.is_finite() {
        return Err(invalid(format!("scale {} must be finite and nonzero", signal.scale)));
    }
    if !signal.offset.is_finite() {
        return Err(invalid(format!("offset {} must be finite", signal.offset)));
    }
    let payload_bits = message.expected_length * 8;
    if signal.end_bit() > payload_bits {
        return Err(invalid(format!(
            "bits {}..{} exceed the {}-bit payload",
            signal.start_bit,
            signal.end_bit(),
            payload_bits
        )));
    }

    Ok(())
}
