use std::sync::Arc;
use tracing::info;

use wallet_risk_engine::audit;
use wallet_risk_engine::cache::CounterCache;
use wallet_risk_engine::catalog;
use wallet_risk_engine::core::config::EngineConfig;
use wallet_risk_engine::detectors::external_reputation::UnavailableProvider;
use wallet_risk_engine::metrics;
use wallet_risk_engine::orchestrator::Orchestrator;
use wallet_risk_engine::{api, storage};

/// A fixed sample of representative reason codes, one per exact entry family
/// and one per parameterized prefix, checked against the catalog at
/// start-up. A code with no catalog entry is a configuration error, not a
/// runtime one: it must fail fast here rather than surface as an unlabeled
/// `0`-weight contribution in production.
fn catalog_sample_codes() -> Vec<String> {
    [
        "BLACKLIST_USER_HIT",
        "VELOCITY_HIGH_TX_COUNT_10MIN",
        "DEVICE_EMULATOR_DECLARED",
        "COUNTRY_MISMATCH_DUAL",
        "BEHAVIOR_HOUR_ATYPICAL",
        "P2P_RAPID_DRAIN",
        "RATE_LIMIT_IP_EXTREME",
        "IMPOSSIBLE_IP_JUMP_5MIN",
        "SESSION_REPLAY_ATTACK",
        "FORM_FILL_TOO_FAST",
        "ACCOUNT_AGE_BRACKET_LOW",
        "HIGH_RISK_COUNTRY_MX",
        "NEW_COUNTRY_BR",
        "KNOWN_COUNTRY_REDUCTION_MX",
        "TRUST_REDUCTION_5PTS",
        "SMURFING_DAILY_VOL_250",
        "RAPID_BIN_PROBE_411111",
        "CARD_TESTING_PATTERN_411111",
        "UNUSUAL_HOUR_3",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    info!("Wallet risk engine starting");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    metrics::init_metrics();
    info!("Metrics initialized");

    catalog::Catalog::validate_completeness(&catalog_sample_codes())
        .map_err(|e| anyhow::anyhow!("catalog validation failed: {e}"))?;
    info!("Reason catalog validated");

    let cfg = EngineConfig::from_env()?;
    info!("Configuration loaded (weights sum to {})", cfg.weights.sum());

    let cache: Arc<dyn CounterCache> = match storage::RedisCounterCache::new(&cfg.redis_url).await {
        Ok(redis) => {
            info!("Redis cache connected at {}", cfg.redis_url);
            Arc::new(redis)
        }
        Err(e) => {
            return Err(anyhow::anyhow!(
                "failed to connect to Redis at {}: {e}",
                cfg.redis_url
            ));
        }
    };

    let reputation = Arc::new(UnavailableProvider);
    let audit: Arc<dyn audit::AuditSink> = Arc::new(audit::EncryptedAuditSink::new(&cfg.hmac_secret));

    let orchestrator = Arc::new(Orchestrator::new(
        Arc::clone(&cache),
        cfg.clone(),
        reputation,
        audit,
    ));

    if cfg.enable_auth && !cfg.api_keys.is_empty() {
        info!("API authentication enabled ({} keys)", cfg.api_keys.len());
    } else {
        tracing::warn!("API authentication disabled - not recommended for production!");
    }
    info!(
        "Rate limiting: {} requests/minute (unauthenticated)",
        cfg.rate_limit_per_minute
    );

    info!("Starting REST API server on {}", cfg.bind_addr);
    api::start_server(orchestrator, cache, cfg).await?;

    Ok(())
}
