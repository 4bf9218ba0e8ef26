//! # Application State Management
//!
//! Shared state handed to every HTTP handler and WebSocket actor via
//! `web::Data<AppState>`: the configuration, the session registry, the two
//! pipelines, and a metrics block updated by the middleware and the
//! dispatch layer.
//!
//! All mutable pieces sit behind `Arc` so cloning the state is cheap; the
//! config and metrics additionally take an `RwLock` so many readers can
//! snapshot them while updates stay exclusive.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Instant;

use crate::config::AppConfig;
use crate::pipeline::ReplyPipeline;
use crate::session::{AudioIngest, SessionRegistry};

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration
    pub config: Arc<RwLock<AppConfig>>,

    /// Call sessions and the broadcast bus
    pub registry: Arc<SessionRegistry>,

    /// Serialized audio admission into the transcription pipeline
    pub ingest: Arc<AudioIngest>,

    /// Operator-to-caller reply pipeline
    pub reply: Arc<ReplyPipeline>,

    /// Relay counters
    pub metrics: Arc<RwLock<RelayMetrics>>,

    /// When the server started
    pub start_time: Instant,
}

/// Counters covering both the HTTP surface and the relay core.
#[derive(Debug, Default)]
pub struct RelayMetrics {
    /// HTTP requests served (health/metrics endpoints and WS upgrades)
    pub request_count: u64,

    /// HTTP requests that ended in a client or server error
    pub error_count: u64,

    /// Per-endpoint HTTP statistics
    pub endpoint_metrics: HashMap<String, EndpointMetric>,

    /// Currently open WebSocket connections
    pub active_connections: u32,

    /// Audio chunks accepted into the transcription pipeline
    pub chunks_processed: u64,

    /// Chunks dropped below the noise threshold
    pub chunks_dropped: u64,

    /// Transcripts or translations rejected as spam
    pub spam_rejected: u64,

    /// Pipeline runs that failed on an upstream service
    pub upstream_errors: u64,

    /// Validation errors answered on WebSocket connections
    pub validation_errors: u64,

    /// Operator replies delivered to callers
    pub replies_delivered: u64,
}

/// Per-endpoint HTTP statistics.
#[derive(Debug, Default, Clone)]
pub struct EndpointMetric {
    pub request_count: u64,
    pub total_duration_ms: u64,
    pub error_count: u64,
}

impl EndpointMetric {
    pub fn average_duration_ms(&self) -> f64 {
        if self.request_count > 0 {
            self.total_duration_ms as f64 / self.request_count as f64
        } else {
            0.0
        }
    }

    pub fn error_rate(&self) -> f64 {
        if self.request_count > 0 {
            self.error_count as f64 / self.request_count as f64
        } else {
            0.0
        }
    }
}

impl AppState {
    pub fn new(
        config: AppConfig,
        registry: Arc<SessionRegistry>,
        ingest: Arc<AudioIngest>,
        reply: Arc<ReplyPipeline>,
    ) -> Self {
        Self {
            config: Arc::new(RwLock::new(config)),
            registry,
            ingest,
            reply,
            metrics: Arc::new(RwLock::new(RelayMetrics::default())),
            start_time: Instant::now(),
        }
    }

    /// Copy of the current configuration; cloning releases the lock.
    pub fn get_config(&self) -> AppConfig {
        self.config.read().unwrap().clone()
    }

    pub fn increment_request_count(&self) {
        self.metrics.write().unwrap().request_count += 1;
    }

    pub fn increment_error_count(&self) {
        self.metrics.write().unwrap().error_count += 1;
    }

    pub fn record_endpoint_request(&self, endpoint: &str, duration_ms: u64, is_error: bool) {
        let mut metrics = self.metrics.write().unwrap();
        let endpoint_metric = metrics.endpoint_metrics.entry(endpoint.to_string()).or_default();
        endpoint_metric.request_count += 1;
        endpoint_metric.total_duration_ms += duration_ms;
        if is_error {
            endpoint_metric.error_count += 1;
        }
    }

    pub fn connection_opened(&self) {
        self.metrics.write().unwrap().active_connections += 1;
    }

    pub fn connection_closed(&self) {
        let mut metrics = self.metrics.write().unwrap();
        if metrics.active_connections > 0 {
            metrics.active_connections -= 1;
        }
    }

    pub fn record_chunk_processed(&self) {
        self.metrics.write().unwrap().chunks_processed += 1;
    }

    pub fn record_chunk_dropped(&self) {
        self.metrics.write().unwrap().chunks_dropped += 1;
    }

    pub fn record_spam_rejected(&self) {
        self.metrics.write().unwrap().spam_rejected += 1;
    }

    pub fn record_upstream_error(&self) {
        self.metrics.write().unwrap().upstream_errors += 1;
    }

    pub fn record_validation_error(&self) {
        self.metrics.write().unwrap().validation_errors += 1;
    }

    pub fn record_reply_delivered(&self) {
        self.metrics.write().unwrap().replies_delivered += 1;
    }

    /// Consistent copy of the metrics for the reporting endpoints.
    pub fn get_metrics_snapshot(&self) -> RelayMetrics {
        let metrics = self.metrics.read().unwrap();
        RelayMetrics {
            request_count: metrics.request_count,
            error_count: metrics.error_count,
            endpoint_metrics: metrics.endpoint_metrics.clone(),
            active_connections: metrics.active_connections,
            chunks_processed: metrics.chunks_processed,
            chunks_dropped: metrics.chunks_dropped,
            spam_rejected: metrics.spam_rejected,
            upstream_errors: metrics.upstream_errors,
            validation_errors: metrics.validation_errors,
            replies_delivered: metrics.replies_delivered,
        }
    }

    pub fn get_uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}
