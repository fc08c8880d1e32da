use crate::metrics;
/// Metrics API routes
/// Exposes Prometheus metrics endpoint
use actix_web::{web, HttpResponse};
use std::sync::Arc;

use crate::cache::CounterCache;

/// GET /metrics - Prometheus metrics endpoint
pub async fn get_metrics() -> HttpResponse {
    let metrics_output = metrics::gather_metrics();
    HttpResponse::Ok()
        .content_type("text/plain; version=0.0.4")
        .body(metrics_output)
}

/// GET /healthz - cache connectivity check.
///
/// The engine has exactly one external dependency on the read path: the
/// counter cache. Everything else (detectors, catalog, signing) is
/// in-process and can't be "down" independently of the process itself.
pub async fn health_check(cache: web::Data<Arc<dyn CounterCache>>) -> HttpResponse {
    match cache.exists("healthz:probe").await {
        Ok(_) => HttpResponse::Ok().json(serde_json::json!({
            "status": "healthy",
            "version": env!("CARGO_PKG_VERSION"),
            "cache": "reachable",
        })),
        Err(e) => HttpResponse::ServiceUnavailable().json(serde_json::json!({
            "status": "degraded",
            "version": env!("CARGO_PKG_VERSION"),
            "cache": "unreachable",
            "error": e.to_string(),
        })),
    }
}
