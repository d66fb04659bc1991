//! Prometheus metrics for soft AP observability.
//!
//! The state machine records through the [`ApMetrics`] trait so the
//! metrics backend stays an external collaborator. The shipped backend
//! registers with a `prometheus::Registry`; [`NullMetrics`] is for tests
//! and embedders that do their own accounting.

use prometheus::{Encoder, IntCounter, IntCounterVec, IntGaugeVec, Opts, Registry, TextEncoder};
use thiserror::Error;

use softapd_core::{FailureReason, OperatingMode, ReportedChannel};

/// Errors from metrics registration or encoding.
#[derive(Debug, Error)]
pub enum MetricsError {
    /// Failed to register a metric with the registry.
    #[error("failed to register metric: {0}")]
    RegistrationFailed(#[from] prometheus::Error),

    /// Failed to encode metrics output.
    #[error("failed to encode metrics: {0}")]
    EncodingFailed(String),
}

/// Metrics boundary consumed by the lifecycle state machine.
pub trait ApMetrics: Send + Sync {
    /// Records the outcome of a start attempt.
    fn start_result(&self, success: bool, reason: Option<FailureReason>);

    /// Records an accepted change to the associated-client count.
    fn clients_changed(&self, count: usize, mode: OperatingMode);

    /// Records an interface up/down transition.
    fn up_changed(&self, up: bool, mode: OperatingMode);

    /// Records a driver-reported channel switch.
    fn channel_switched(&self, channel: ReportedChannel, mode: OperatingMode);

    /// Records a reported channel that contradicts the requested band.
    fn band_preference_violation(&self);
}

/// Metrics sink that records nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullMetrics;

impl ApMetrics for NullMetrics {
    fn start_result(&self, _success: bool, _reason: Option<FailureReason>) {}
    fn clients_changed(&self, _count: usize, _mode: OperatingMode) {}
    fn up_changed(&self, _up: bool, _mode: OperatingMode) {}
    fn channel_switched(&self, _channel: ReportedChannel, _mode: OperatingMode) {}
    fn band_preference_violation(&self) {}
}

/// Prometheus-backed [`ApMetrics`].
///
/// All metrics use interior mutability and the struct is cheap to clone.
#[derive(Clone)]
pub struct PrometheusApMetrics {
    /// Start attempts by result and failure reason.
    starts_total: IntCounterVec,

    /// Currently associated clients, labeled by mode.
    connected_clients: IntGaugeVec,

    /// Interface up/down transitions by direction and mode.
    up_transitions_total: IntCounterVec,

    /// Channel switches by mode.
    channel_switches_total: IntCounterVec,

    /// Reported channels violating the requested band preference.
    band_preference_violations_total: IntCounter,
}

impl PrometheusApMetrics {
    /// Creates the metrics and registers them with the given registry.
    ///
    /// # Errors
    ///
    /// Returns an error if any metric fails to register (e.g. duplicate
    /// name).
    pub fn new(registry: &Registry) -> Result<Self, MetricsError> {
        let starts_total = IntCounterVec::new(
            Opts::new("softapd_starts_total", "Soft AP start attempts"),
            &["result", "reason"],
        )?;
        registry.register(Box::new(starts_total.clone()))?;

        let connected_clients = IntGaugeVec::new(
            Opts::new(
                "softapd_connected_clients",
                "Currently associated clients",
            ),
            &["mode"],
        )?;
        registry.register(Box::new(connected_clients.clone()))?;

        let up_transitions_total = IntCounterVec::new(
            Opts::new(
                "softapd_interface_up_transitions_total",
                "Interface up/down transitions",
            ),
            &["direction", "mode"],
        )?;
        registry.register(Box::new(up_transitions_total.clone()))?;

        let channel_switches_total = IntCounterVec::new(
            Opts::new("softapd_channel_switches_total", "AP channel switches"),
            &["mode"],
        )?;
        registry.register(Box::new(channel_switches_total.clone()))?;

        let band_preference_violations_total = IntCounter::new(
            "softapd_band_preference_violations_total",
            "Reported channels contradicting the requested band",
        )?;
        registry.register(Box::new(band_preference_violations_total.clone()))?;

        Ok(Self {
            starts_total,
            connected_clients,
            up_transitions_total,
            channel_switches_total,
            band_preference_violations_total,
        })
    }
}

impl ApMetrics for PrometheusApMetrics {
    fn start_result(&self, success: bool, reason: Option<FailureReason>) {
        let result = if success { "success" } else { "failure" };
        let reason = reason.map_or("none", |r| r.as_str());
        self.starts_total.with_label_values(&[result, reason]).inc();
    }

    fn clients_changed(&self, count: usize, mode: OperatingMode) {
        #[allow(clippy::cast_possible_wrap)]
        self.connected_clients
            .with_label_values(&[mode.as_str()])
            .set(count as i64);
    }

    fn up_changed(&self, up: bool, mode: OperatingMode) {
        let direction = if up { "up" } else { "down" };
        self.up_transitions_total
            .with_label_values(&[direction, mode.as_str()])
            .inc();
    }

    fn channel_switched(&self, _channel: ReportedChannel, mode: OperatingMode) {
        self.channel_switches_total
            .with_label_values(&[mode.as_str()])
            .inc();
    }

    fn band_preference_violation(&self) {
        self.band_preference_violations_total.inc();
    }
}

/// Encodes every metric in the registry in Prometheus text format.
///
/// # Errors
///
/// Returns an error when encoding fails or produces invalid UTF-8.
pub fn encode_text(registry: &Registry) -> Result<String, MetricsError> {
    let mut buffer = Vec::new();
    let encoder = TextEncoder::new();
    encoder
        .encode(&registry.gather(), &mut buffer)
        .map_err(|e| MetricsError::EncodingFailed(e.to_string()))?;
    String::from_utf8(buffer).map_err(|e| MetricsError::EncodingFailed(e.to_string()))
}
