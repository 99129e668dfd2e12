//! Signal definitions, the message catalog and the DBC schema source
//!
//! This module contains the DBC parser and the catalog that merges its output.

pub mod database;
pub mod dbc;

// Re-export key types for convenience
pub use database::{
    ByteOrder, Catalog, CatalogStats, MessageDefinition, SchemaSource, SignalDefinition,
    ValueType,
};
