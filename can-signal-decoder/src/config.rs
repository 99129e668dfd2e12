//! Pipeline configuration types
//!
//! This module defines the minimal configuration needed by the ingest pipeline.
//! Process-level settings (interface names, ports, schema paths) belong to the
//! application layer.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for the ingest pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Upper bound on a single blocking read; also bounds shutdown latency
    #[serde(default = "default_receive_timeout_ms")]
    pub receive_timeout_ms: u64,

    /// Log every received frame at debug level
    #[serde(default)]
    pub log_frames: bool,

    /// Optional: only decode these specific CAN message IDs
    #[serde(default)]
    pub message_filter: Option<Vec<u32>>,
}

/// Shortest read timeout handed to a transport (SocketCAN treats 0 as no timeout)
pub const MIN_RECEIVE_TIMEOUT_MS: u64 = 1;

fn default_receive_timeout_ms() -> u64 {
    1000
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            receive_timeout_ms: default_receive_timeout_ms(),
            log_frames: false,
            message_filter: None,
        }
    }
}

impl PipelineConfig {
    /// Create a new pipeline configuration with default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder method: set the read timeout
    pub fn with_receive_timeout(mut self, timeout: Duration) -> Self {
        self.receive_timeout_ms = (timeout.as_millis().min(u64::MAX as u128) as u64)
            .max(MIN_RECEIVE_TIMEOUT_MS);
        self
    }

    /// Builder method: enable per-frame logging
    pub fn with_frame_logging(mut self, enabled: bool) -> Self {
        self.log_frames = enabled;
        self
    }

    /// Builder method: set message filter
    pub fn with_message_filter(mut self, messages: Vec<u32>) -> Self {
        self.message_filter = Some(messages);
        self
    }

    /// Read timeout, never below [`MIN_RECEIVE_TIMEOUT_MS`]
    pub fn receive_timeout(&self) -> Duration {
        Duration::from_millis(self.receive_timeout_ms.max(MIN_RECEIVE_TIMEOUT_MS))
    }

    /// Check if a message ID should be processed
    pub fn should_process_message(&self, can_id: u32) -> bool {
        match &self.message_filter {
            Some(messages) => messages.contains(&can_id),
            None => true,
        }
    }
}
