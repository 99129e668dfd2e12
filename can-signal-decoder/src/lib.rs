//! CAN Signal Decoder Library
//!
//! Decodes live CAN traffic into named physical signals using DBC definitions
//! and keeps the latest value of every signal in a Prometheus registry.
//!
//! # Architecture
//!
//! - [`Catalog`]: read-only message definitions merged from DBC files
//! - [`decode`]: pure function from (catalog, frame) to decoded signals
//! - [`MetricRegistry`]: one gauge family per message, labelled by signal
//! - [`Pipeline`]: transport → decode → registry loop with cooperative shutdown
//!
//! The library does NOT:
//! - Serve HTTP (the application exposes [`MetricRegistry::encode_text`])
//! - Reconnect a lost bus
//! - Clamp values to the ranges declared in the schema
//!
//! # Example Usage
//!
//! ```no_run
//! use can_signal_decoder::{
//!     Decoder, MetricRegistry, Pipeline, PipelineConfig, ShutdownSignal, VirtualBus,
//! };
//! use std::path::Path;
//! use std::sync::Arc;
//!
//! let decoder = Decoder::from_dbc_files([Path::new("powertrain.dbc")]).unwrap();
//! let catalog = Arc::new(decoder.into_catalog());
//! let registry = Arc::new(MetricRegistry::new());
//!
//! let (bus, _producer) = VirtualBus::new("vcan0");
//! let mut pipeline = Pipeline::new(bus, catalog, registry.clone(), PipelineConfig::new());
//!
//! let shutdown = ShutdownSignal::new();
//! let stats = pipeline.run(&shutdown).unwrap();
//! println!("{:?}", stats);
//! print!("{}", registry.encode_text().unwrap());
//! ```

// Public modules
pub mod config;
pub mod decoder;
pub mod message_decoder;
pub mod pipeline;
pub mod registry;
pub mod signals;
pub mod transport;
pub mod types;

// Re-export main types for convenience
pub use config::PipelineConfig;
pub use decoder::{decode, format_frame, Decoder};
pub use message_decoder::{DecodeOutcome, MuxSelector};
pub use pipeline::{Pipeline, PipelineState, PipelineStats, ShutdownSignal};
pub use registry::{GaugeSample, MetricRegistry, RegistryError};
pub use signals::{
    ByteOrder, Catalog, CatalogStats, MessageDefinition, SchemaSource, SignalDefinition,
    ValueType,
};
pub use transport::{open_transport, Transport, TransportKind, VirtualBus, VirtualBusHandle};
pub use types::{
    DecodeError, DecodedMessage, Frame, PipelineError, SchemaLoadError, TransportError,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_library_basics() {
        let catalog = Catalog::load(Vec::<SchemaSource>::new()).unwrap();
        let decoder = Decoder::new(catalog);
        assert_eq!(decoder.catalog_stats().num_messages, 0);
        assert!(decoder.decode(&Frame::new(0x100, &[1, 2], 0.0).unwrap()).is_none());
    }
}
