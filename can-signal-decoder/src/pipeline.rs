//! Ingest pipeline
//!
//! Pulls frames from a transport, decodes them against the catalog and
//! publishes the results to the metric registry until shutdown is requested.
//!
//! ```text
//! Disconnected --connect ok--> Running --shutdown--> Draining --> Stopped
//! ```
//!
//! Connect failure leaves the pipeline Disconnected and is returned to the
//! caller. Read errors and undecodable signals are logged and the loop goes on.

use crate::config::PipelineConfig;
use crate::decoder::{decode, format_frame};
use crate::registry::MetricRegistry;
use crate::signals::Catalog;
use crate::transport::Transport;
use crate::types::{Frame, PipelineError};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Lifecycle of a [`Pipeline`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Disconnected,
    Running,
    Draining,
    Stopped,
}

/// Cooperative cancellation flag shared between the ingest loop and whoever
/// stops it
#[derive(Debug, Clone, Default)]
pub struct ShutdownSignal(Arc<AtomicBool>);

impl ShutdownSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request shutdown; the loop notices within one receive timeout
    pub fn trigger(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_triggered(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Counters kept by the ingest loop
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineStats {
    pub frames_received: u64,
    /// Frames matched to a definition and published
    pub messages_decoded: u64,
    /// Frames whose ID is not in the catalog
    pub unknown_frames: u64,
    /// Frames dropped by the message filter
    pub filtered_frames: u64,
    /// Signals skipped because they could not be read from their frame
    pub signal_errors: u64,
    pub read_errors: u64,
}

/// The ingest → decode → publish loop
pub struct Pipeline<T: Transport> {
    transport: T,
    catalog: Arc<Catalog>,
    registry: Arc<MetricRegistry>,
    config: PipelineConfig,
    state: PipelineState,
    stats: PipelineStats,
}

impl<T: Transport> Pipeline<T> {
    pub fn new(
        transport: T,
        catalog: Arc<Catalog>,
        registry: Arc<MetricRegistry>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            transport,
            catalog,
            registry,
            config,
            state: PipelineState::Disconnected,
            stats: PipelineStats::default(),
        }
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    pub fn stats(&self) -> PipelineStats {
        self.stats
    }

    /// Connect, then ingest until `shutdown` is triggered
    ///
    /// Returns the final counters once the transport has been shut down.
    pub fn run(&mut self, shutdown: &ShutdownSignal) -> Result<PipelineStats, PipelineError> {
        self.connect()?;

        while !shutdown.is_triggered() {
            self.poll_once();
        }

        self.drain();
        Ok(self.stats)
    }

    fn connect(&mut self) -> Result<(), PipelineError> {
        match self.transport.connect() {
            Ok(()) => {
                self.state = PipelineState::Running;
                log::info!("Pipeline running");
                Ok(())
            }
            Err(e) => {
                log::error!("Connection failed: {}", e);
                self.state = PipelineState::Disconnected;
                Err(PipelineError::Connection(e))
            }
        }
    }

    /// One bounded receive and whatever it delivers
    fn poll_once(&mut self) {
        match self.transport.receive(self.config.receive_timeout()) {
            Ok(Some(frame)) => self.handle_frame(&frame),
            Ok(None) => {}
            Err(e) => {
                self.stats.read_errors += 1;
                log::error!("Read error: {}", e);
            }
        }
    }

    fn handle_frame(&mut self, frame: &Frame) {
        self.stats.frames_received += 1;

        if self.config.log_frames {
            log::debug!("{}", format_frame(frame));
        }

        if !self.config.should_process_message(frame.arbitration_id) {
            self.stats.filtered_frames += 1;
            return;
        }

        let Some(outcome) = decode(&self.catalog, frame) else {
            self.stats.unknown_frames += 1;
            log::debug!("No definition for CAN ID 0x{:X}", frame.arbitration_id);
            return;
        };

        for err in &outcome.skipped {
            self.stats.signal_errors += 1;
            log::warn!(
                "{} (0x{:X}): skipped signal {}: {}",
                outcome.message.message_name,
                frame.arbitration_id,
                err.signal(),
                err
            );
        }

        log::trace!("Decoded {}", outcome.message);
        self.registry.observe(&outcome.message);
        self.stats.messages_decoded += 1;
    }

    fn drain(&mut self) {
        self.state = PipelineState::Draining;
        log::info!("Shutting down transport");
        self.transport.shutdown();
        self.state = PipelineState::Stopped;
        log::info!(
            "Pipeline stopped: {} frames, {} decoded, {} unknown, {} filtered, {} signal errors, {} read errors",
            self.stats.frames_received,
            self.stats.messages_decoded,
            self.stats.unknown_frames,
            self.stats.filtered_frames,
            self.stats.signal_errors,
            self.stats.read_errors
        );
    }
}
