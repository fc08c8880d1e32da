/// REST API server exposing the risk-evaluation endpoint.
use actix_web::{middleware, web, App, HttpResponse, HttpServer};
use serde::Deserialize;
use std::sync::Arc;

use crate::api::metrics_routes::{get_metrics, health_check};
use crate::cache::CounterCache;
use crate::core::config::EngineConfig;
use crate::domain::request::{EnrichmentContext, TransactionRequest};
use crate::domain::EnrichedRequest;
use crate::metrics::{self, Timer};
use crate::middleware::{ApiKeyAuth, RateLimiter, RateLimiterConfig, RequestId};
use crate::orchestrator::Orchestrator;

/// Shared server state.
pub struct ApiState {
    pub orchestrator: Arc<Orchestrator>,
}

pub async fn start_server(
    orchestrator: Arc<Orchestrator>,
    cache: Arc<dyn CounterCache>,
    cfg: EngineConfig,
) -> std::io::Result<()> {
    let state = web::Data::new(ApiState { orchestrator });
    let cache_data = web::Data::new(cache);

    let rate_limiter = RateLimiter::with_config(RateLimiterConfig {
        requests_per_minute: cfg.rate_limit_per_minute,
        burst_size: (cfg.rate_limit_per_minute / 6).max(1),
    });
    let auth = if cfg.enable_auth {
        ApiKeyAuth::new(cfg.api_keys.clone())
    } else {
        ApiKeyAuth::new(vec![])
    };
    let bind_addr = cfg.bind_addr.clone();

    HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .app_data(cache_data.clone())
            .wrap(middleware::Logger::default())
            .wrap(middleware::Compress::default())
            .wrap(RequestId::new())
            .wrap(rate_limiter.clone())
            .wrap(auth.clone())
            .route("/healthz", web::get().to(health_check))
            .route("/metrics", web::get().to(get_metrics))
            .route("/v1/evaluate", web::post().to(evaluate))
    })
    .bind(&bind_addr)?
    .run()
    .await
}

/// Body accepted by `POST /v1/evaluate`. Decryption, bearer-token session
/// auth and GeoIP/BIN enrichment all happen upstream of this boundary; this
/// struct is exactly the `EnrichedRequest` the orchestrator needs, split
/// into its two halves because `EnrichedRequest` itself is constructed, not
/// deserialized.
#[derive(Debug, Deserialize)]
pub struct EvaluateRequestBody {
    pub request: TransactionRequest,
    pub enrichment: EnrichmentContext,
}

async fn evaluate(state: web::Data<ApiState>, body: web::Json<EvaluateRequestBody>) -> HttpResponse {
    let body = body.into_inner();
    let transaction_type = format!("{:?}", body.request.transaction_type);
    let enriched = EnrichedRequest::new(body.request, body.enrichment);

    let mut timer = Timer::new();
    let evaluation = state.orchestrator.evaluate(enriched).await;
    timer.observe_and_reset(&metrics::EVALUATION_DURATION);

    metrics::EVALUATIONS_TOTAL
        .with_label_values(&[&transaction_type])
        .inc();
    metrics::DECISIONS_TOTAL
        .with_label_values(&[&format!("{:?}", evaluation.action)])
        .inc();

    HttpResponse::Ok().json(evaluation)
}
