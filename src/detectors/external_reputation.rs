/// External Reputation Port (C15)
///
/// Bounded by a single timeout rather than a failure-count breaker: this
/// port's fallback is a cached value, not a retry, so there's nothing a
/// breaker's open state would protect that the cache lookup doesn't already
/// cover.
use std::time::Duration;

use async_trait::async_trait;

use crate::cache::CounterCache;
use crate::core::errors::{EngineError, EngineResult};
use crate::detectors::fallback;
use crate::storage::redis_cache::keys;

const CACHE_TTL: Duration = Duration::from_secs(30 * 60);

#[async_trait]
pub trait ReputationProvider: Send + Sync {
    async fn score(&self, user_id: &str, device_id: &str, ip: &str) -> EngineResult<f64>;
}

pub async fn evaluate(
    provider: &dyn ReputationProvider,
    cache: &dyn CounterCache,
    user_id: &str,
    device_id: &str,
    ip: &str,
    timeout: Duration,
) -> f64 {
    let cache_key = keys::external_reputation(user_id, device_id);

    match tokio::time::timeout(timeout, provider.score(user_id, device_id, ip)).await {
        Ok(Ok(score)) => {
            let _ = cache.set_ex(&cache_key, &score.to_string(), CACHE_TTL).await;
            score.clamp(0.0, 100.0)
        }
        _ => match cache.get(&cache_key).await {
            Ok(Some(raw)) => raw.parse().unwrap_or(fallback::EXTERNAL),
            _ => fallback::EXTERNAL,
        },
    }
}

/// Stub used where no concrete reputation vendor is wired up; always times
/// out so the cache-fallback path is what actually answers.
pub struct UnavailableProvider;

#[async_trait]
impl ReputationProvider for UnavailableProvider {
    async fn score(&self, _user_id: &str, _device_id: &str, _ip: &str) -> EngineResult<f64> {
        Err(EngineError::Detector {
            name: "external_reputation",
            source: "no provider configured".to_string(),
        })
    }
}
