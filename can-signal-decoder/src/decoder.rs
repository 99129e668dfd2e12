//! Main decoder API
//!
//! This module provides the primary interface for the decoder library.
//! The Decoder struct owns the catalog loaded from DBC files and decodes live
//! frames against it.

use crate::message_decoder::{DecodeOutcome, MessageDecoder};
use crate::signals::{Catalog, CatalogStats, SchemaSource};
use crate::types::{Frame, SchemaLoadError};
use std::path::Path;

/// Decode a frame against a catalog
///
/// Returns `None` when the catalog has no definition for the frame's ID;
/// unmapped traffic is expected and is not an error.
pub fn decode(catalog: &Catalog, frame: &Frame) -> Option<DecodeOutcome> {
    let message_def = catalog.lookup(frame.arbitration_id)?;
    Some(MessageDecoder::decode_message(frame, message_def))
}

/// Render a frame as `ID: 0123 | Data: 0A 14 | Timestamp: 1.000000`
pub fn format_frame(frame: &Frame) -> String {
    let data = frame
        .data
        .iter()
        .map(|b| format!("{:02X}", b))
        .collect::<Vec<_>>()
        .join(" ");
    format!(
        "ID: {:04X} | Data: {} | Timestamp: {:.6}",
        frame.arbitration_id, data, frame.timestamp
    )
}

/// The main decoder struct - owns the catalog shared by all decode calls
#[derive(Debug)]
pub struct Decoder {
    catalog: Catalog,
}

impl Decoder {
    /// Wrap an already loaded catalog
    pub fn new(catalog: Catalog) -> Self {
        Self { catalog }
    }

    /// Load and merge DBC files in order
    ///
    /// # Example
    /// ```no_run
    /// use can_signal_decoder::Decoder;
    /// use std::path::Path;
    ///
    /// let decoder = Decoder::from_dbc_files([
    ///     Path::new("powertrain.dbc"),
    ///     Path::new("body.dbc"),
    /// ])
    /// .unwrap();
    /// println!("{:?}", decoder.catalog_stats());
    /// ```
    pub fn from_dbc_files<I, P>(paths: I) -> Result<Self, SchemaLoadError>
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        let sources = paths
            .into_iter()
            .map(|path| crate::signals::dbc::parse_dbc_file(path.as_ref()))
            .collect::<Result<Vec<SchemaSource>, _>>()?;

        let catalog = Catalog::load(sources)?;
        log::info!("Catalog ready: {} messages", catalog.len());
        Ok(Self::new(catalog))
    }

    /// Decode one frame; `None` for IDs without a definition
    pub fn decode(&self, frame: &Frame) -> Option<DecodeOutcome> {
        decode(&self.catalog, frame)
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// Hand the catalog over, e.g. to share it with a pipeline
    pub fn into_catalog(self) -> Catalog {
        self.catalog
    }

    /// Get statistics about the loaded catalog
    pub fn catalog_stats(&self) -> CatalogStats {
        self.catalog.stats()
    }
}
