//! Metric registry
//!
//! One Prometheus gauge family per decoded message name, labelled by signal.
//! Families are created lazily on first observation. A single mutex covers the
//! name map and the Prometheus registry, so creation, updates and exposition
//! never interleave.

use crate::types::DecodedMessage;
use prometheus::core::Collector;
use prometheus::{Encoder, GaugeVec, Opts, Registry, TextEncoder};
use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};

/// Label carrying the signal name
pub const SIGNAL_LABEL: &str = "signal";

/// Content type of [`MetricRegistry::encode_text`] output
pub const EXPOSITION_CONTENT_TYPE: &str = prometheus::TEXT_FORMAT;

/// Errors raised while rendering the registry
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("Failed to encode metrics: {0}")]
    Encode(#[from] prometheus::Error),

    #[error("Encoded metrics are not UTF-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
}

/// One (message, signal, value) triple as currently exposed
#[derive(Debug, Clone, PartialEq)]
pub struct GaugeSample {
    pub message: String,
    pub signal: String,
    pub value: f64,
}

struct Inner {
    registry: Registry,
    /// Key: message name as decoded (before metric-name sanitizing)
    gauges: HashMap<String, GaugeVec>,
    /// Message names whose gauge could not be created or registered
    rejected: HashSet<String>,
}

/// Concurrency-safe map from message name to its labelled gauge set
pub struct MetricRegistry {
    inner: Mutex<Inner>,
}

impl MetricRegistry {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                registry: Registry::new(),
                gauges: HashMap::new(),
                rejected: HashSet::new(),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // Gauges are only inserted once complete, so poisoning is harmless
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Publish the signals of a decoded message, last write wins
    ///
    /// Never fails: metric naming or registration problems are logged once
    /// and the message is dropped from then on.
    pub fn observe(&self, decoded: &DecodedMessage) {
        let mut inner = self.lock();

        if let Some(gauge) = inner.gauges.get(&decoded.message_name) {
            set_all(gauge, decoded);
            return;
        }
        if inner.rejected.contains(&decoded.message_name) {
            return;
        }

        let gauge = match new_gauge(&decoded.message_name) {
            Ok(gauge) => gauge,
            Err(e) => {
                log::error!(
                    "Cannot create gauge for message '{}', not exporting it: {}",
                    decoded.message_name,
                    e
                );
                inner.rejected.insert(decoded.message_name.clone());
                return;
            }
        };

        // Values go in before the family becomes reachable, so readers never
        // see a gauge without labels.
        set_all(&gauge, decoded);

        if let Err(e) = inner.registry.register(Box::new(gauge.clone())) {
            log::error!(
                "Cannot register gauge for message '{}' as '{}', not exporting it: {}",
                decoded.message_name,
                metric_name(&decoded.message_name),
                e
            );
            inner.rejected.insert(decoded.message_name.clone());
            return;
        }

        log::debug!(
            "Created gauge '{}' for message '{}'",
            metric_name(&decoded.message_name),
            decoded.message_name
        );
        inner.gauges.insert(decoded.message_name.clone(), gauge);
    }

    /// Number of gauge families (one per observed message name)
    pub fn len(&self) -> usize {
        self.lock().gauges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Current value of one (message, signal) pair
    pub fn value(&self, message: &str, signal: &str) -> Option<f64> {
        let inner = self.lock();
        let gauge = inner.gauges.get(message)?;
        collect_samples(message, gauge)
            .into_iter()
            .find(|sample| sample.signal == signal)
            .map(|sample| sample.value)
    }

    /// Consistent copy of every exposed value, sorted by message then signal
    pub fn snapshot(&self) -> Vec<GaugeSample> {
        let inner = self.lock();
        let mut samples: Vec<GaugeSample> = inner
            .gauges
            .iter()
            .flat_map(|(message, gauge)| collect_samples(message, gauge))
            .collect();
        samples.sort_by(|a, b| (&a.message, &a.signal).cmp(&(&b.message, &b.signal)));
        samples
    }

    /// Render the Prometheus text exposition format
    pub fn encode_text(&self) -> Result<String, RegistryError> {
        let families = self.lock().registry.gather();
        let mut buf = Vec::new();
        TextEncoder::new().encode(&families, &mut buf)?;
        Ok(String::from_utf8(buf)?)
    }
}

impl Default for MetricRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn new_gauge(message_name: &str) -> prometheus::Result<GaugeVec> {
    let opts = Opts::new(
        metric_name(message_name),
        format!("Signals decoded from CAN message {}", message_name),
    );
    GaugeVec::new(opts, &[SIGNAL_LABEL])
}

fn set_all(gauge: &GaugeVec, decoded: &DecodedMessage) {
    for (signal, value) in &decoded.signals {
        match gauge.get_metric_with_label_values(&[signal.as_str()]) {
            Ok(metric) => metric.set(*value),
            Err(e) => log::error!(
                "Cannot set {}.{}: {}",
                decoded.message_name,
                signal,
                e
            ),
        }
    }
}

fn collect_samples(message: &str, gauge: &GaugeVec) -> Vec<GaugeSample> {
    gauge
        .collect()
        .iter()
        .flat_map(|family| family.get_metric())
        .filter_map(|metric| {
            let signal = metric
                .get_label()
                .iter()
                .find(|label| label.get_name() == SIGNAL_LABEL)?
                .get_value()
                .to_string();
            Some(GaugeSample {
                message: message.to_string(),
                signal,
                value: metric.get_gauge().get_value(),
            })
        })
        .collect()
}

/// Map a message name onto the Prometheus metric name grammar
///
/// `[a-zA-Z_:][a-zA-Z0-9_:]*`; anything else becomes `_`.
pub fn metric_name(message_name: &str) -> String {
    let mut name: String = message_name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' || c == ':' { c } else { '_' })
        .collect();
    if name.chars().next().map_or(true, |c| c.is_ascii_digit()) {
        name.insert(0, '_');
    }
    name
}
