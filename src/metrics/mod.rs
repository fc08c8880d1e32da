use lazy_static::lazy_static;
/// Prometheus Metrics
/// Application monitoring and observability
use prometheus::{
    CounterVec, Encoder, GaugeVec, Histogram, HistogramOpts, HistogramVec, Opts, Registry,
    TextEncoder,
};
use std::time::Instant;

lazy_static! {
    /// Global metrics registry
    pub static ref REGISTRY: Registry = Registry::new();

    // === Request Metrics ===

    /// Total HTTP requests
    pub static ref HTTP_REQUESTS_TOTAL: CounterVec = CounterVec::new(
        Opts::new("http_requests_total", "Total HTTP requests"),
        &["method", "endpoint", "status"]
    ).unwrap();

    /// HTTP request duration
    pub static ref HTTP_REQUEST_DURATION: HistogramVec = HistogramVec::new(
        HistogramOpts::new("http_request_duration_seconds", "HTTP request duration in seconds")
            .buckets(vec![0.001, 0.01, 0.05, 0.1, 0.5, 1.0, 2.0, 5.0, 10.0]),
        &["method", "endpoint"]
    ).unwrap();

    /// Active connections
    pub static ref ACTIVE_CONNECTIONS: GaugeVec = GaugeVec::new(
        Opts::new("active_connections", "Number of active HTTP connections"),
        &["endpoint"]
    ).unwrap();

    // === Evaluation Metrics ===

    /// Transactions evaluated
    pub static ref EVALUATIONS_TOTAL: CounterVec = CounterVec::new(
        Opts::new("evaluations_total", "Total transactions evaluated"),
        &["transaction_type"]
    ).unwrap();

    /// Decisions rendered, by final action
    pub static ref DECISIONS_TOTAL: CounterVec = CounterVec::new(
        Opts::new("decisions_total", "Total decisions rendered"),
        &["action"]
    ).unwrap();

    /// End-to-end evaluation duration
    pub static ref EVALUATION_DURATION: Histogram = Histogram::with_opts(
        HistogramOpts::new("evaluation_duration_seconds", "End-to-end risk evaluation duration")
            .buckets(vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.2, 0.5, 1.0])
    ).unwrap();

    /// Per-detector duration
    pub static ref DETECTOR_DURATION: HistogramVec = HistogramVec::new(
        HistogramOpts::new("detector_duration_seconds", "Per-detector evaluation duration")
            .buckets(vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.2]),
        &["detector"]
    ).unwrap();

    /// Detector failures (caught and replaced with a neutral fallback)
    pub static ref DETECTOR_FAILURES_TOTAL: CounterVec = CounterVec::new(
        Opts::new("detector_failures_total", "Total detector failures, fallback applied"),
        &["detector"]
    ).unwrap();

    /// Fan-out deadline misses
    pub static ref DEADLINE_MISSES_TOTAL: CounterVec = CounterVec::new(
        Opts::new("deadline_misses_total", "Total detector deadline misses"),
        &["detector"]
    ).unwrap();

    // === Cache Metrics ===

    /// Cache operations
    pub static ref CACHE_OPS_TOTAL: CounterVec = CounterVec::new(
        Opts::new("cache_ops_total", "Total cache operations"),
        &["op"]
    ).unwrap();

    /// Cache errors
    pub static ref CACHE_ERRORS_TOTAL: CounterVec = CounterVec::new(
        Opts::new("cache_errors_total", "Total cache operation errors"),
        &["op"]
    ).unwrap();

    // === Blacklist / Auth Metrics ===

    /// Blacklist short-circuit hits
    pub static ref BLACKLIST_HITS_TOTAL: CounterVec = CounterVec::new(
        Opts::new("blacklist_hits_total", "Total blacklist short-circuit hits"),
        &["list"]
    ).unwrap();

    /// Rejected auth attempts
    pub static ref AUTH_REJECTIONS_TOTAL: CounterVec = CounterVec::new(
        Opts::new("auth_rejections_total", "Total rejected API key auth attempts"),
        &["reason"]
    ).unwrap();

    // === Circuit Breaker Metrics ===

    /// Circuit breaker state
    pub static ref CIRCUIT_BREAKER_STATE: GaugeVec = GaugeVec::new(
        Opts::new("circuit_breaker_state", "Circuit breaker state (0=closed, 1=open, 2=half-open)"),
        &["service"]
    ).unwrap();

    /// Circuit breaker trips
    pub static ref CIRCUIT_BREAKER_TRIPS: CounterVec = CounterVec::new(
        Opts::new("circuit_breaker_trips_total", "Total circuit breaker trips"),
        &["service"]
    ).unwrap();
}

/// Initialize metrics registry
pub fn init_metrics() {
    REGISTRY
        .register(Box::new(HTTP_REQUESTS_TOTAL.clone()))
        .unwrap();
    REGISTRY
        .register(Box::new(HTTP_REQUEST_DURATION.clone()))
        .unwrap();
    REGISTRY
        .register(Box::new(ACTIVE_CONNECTIONS.clone()))
        .unwrap();

    REGISTRY
        .register(Box::new(EVALUATIONS_TOTAL.clone()))
        .unwrap();
    REGISTRY.register(Box::new(DECISIONS_TOTAL.clone())).unwrap();
    REGISTRY
        .register(Box::new(EVALUATION_DURATION.clone()))
        .unwrap();
    REGISTRY.register(Box::new(DETECTOR_DURATION.clone())).unwrap();
    REGISTRY
        .register(Box::new(DETECTOR_FAILURES_TOTAL.clone()))
        .unwrap();
    REGISTRY
        .register(Box::new(DEADLINE_MISSES_TOTAL.clone()))
        .unwrap();

    REGISTRY.register(Box::new(CACHE_OPS_TOTAL.clone())).unwrap();
    REGISTRY.register(Box::new(CACHE_ERRORS_TOTAL.clone())).unwrap();

    REGISTRY
        .register(Box::new(BLACKLIST_HITS_TOTAL.clone()))
        .unwrap();
    REGISTRY
        .register(Box::new(AUTH_REJECTIONS_TOTAL.clone()))
        .unwrap();

    REGISTRY
        .register(Box::new(CIRCUIT_BREAKER_STATE.clone()))
        .unwrap();
    REGISTRY
        .register(Box::new(CIRCUIT_BREAKER_TRIPS.clone()))
        .unwrap();
}

/// Get metrics in Prometheus format
pub fn gather_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = vec![];
    encoder.encode(&metric_families, &mut buffer).unwrap();
    String::from_utf8(buffer).unwrap()
}

/// Timer helper for measuring durations
pub struct Timer {
    start: Instant,
}

impl Timer {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub fn elapsed_secs(&self) -> f64 {
        self.start.elapsed().as_secs_f64()
    }

    pub fn observe_and_reset(&mut self, histogram: &Histogram) -> f64 {
        let duration = self.elapsed_secs();
        histogram.observe(duration);
        self.start = Instant::now();
        duration
    }
}

impl Default for Timer {
    fn default() -> Self {
        Self::new()
    }
}
