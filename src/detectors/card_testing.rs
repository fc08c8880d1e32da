/// Card-Testing (C13)
///
/// The amounts list is consulted before the current amount is pushed onto
/// it, so "prior amounts" never includes the transaction being scored.
use std::time::Duration;

use crate::cache::CounterCache;
use crate::core::errors::EngineResult;
use crate::storage::redis_cache::keys;

const AMOUNTS_CAP: usize = 10;
const AMOUNTS_TTL: Duration = Duration::from_secs(3600);
const RATE_TTL: Duration = Duration::from_secs(600);
const RATE_THRESHOLD: i64 = 5;
const MICRO_AMOUNT_CEILING: f64 = 10.0;
const LARGE_AMOUNT_FLOOR: f64 = 200.0;
const MICRO_AMOUNT_MIN_COUNT: usize = 3;

#[derive(Debug, Clone, Default)]
pub struct CardTestingResult {
    pub score: f64,
    pub reason_codes: Vec<String>,
}

pub async fn evaluate(
    cache: &dyn CounterCache,
    device_id: &str,
    bin: &str,
    amount: f64,
) -> EngineResult<CardTestingResult> {
    let mut score = 0.0;
    let mut codes = Vec::new();

    let prior_amounts = cache.lrange_all(&keys::card_test_amounts(device_id, bin)).await?;

    let rate = cache.incr(&keys::card_test_rate(bin), RATE_TTL).await?;
    if rate >= RATE_THRESHOLD {
        score += 35.0;
        codes.push(format!("RAPID_BIN_PROBE_{rate}_IN_10MIN"));
    }

    if amount >= LARGE_AMOUNT_FLOOR {
        let micro_count = prior_amounts
            .iter()
            .filter_map(|a| a.parse::<f64>().ok())
            .filter(|a| *a <= MICRO_AMOUNT_CEILING)
            .count();
        if micro_count >= MICRO_AMOUNT_MIN_COUNT {
            score += 40.0;
            codes.push(format!("CARD_TESTING_PATTERN_{micro_count}_PROBES"));
        }
    }

    cache
        .lpush_capped(
            &keys::card_test_amounts(device_id, bin),
            &amount.to_string(),
            AMOUNTS_CAP,
            AMOUNTS_TTL,
        )
        .await?;

    Ok(CardTestingResult {
        score: score.clamp(0.0, 100.0),
        reason_codes: codes,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCache;

    #[tokio::test]
    async fn rapid_probing_fires_at_five() {
        let cache = MemoryCache::new();
        let mut last = CardTestingResult::default();
        for _ in 0..5 {
            last = evaluate(&cache, "dev-1", "411111", 1.0).await.unwrap();
        }
        assert!(last.reason_codes.iter().any(|c| c.starts_with("RAPID_BIN_PROBE_")));
    }

    #[tokio::test]
    async fn micro_then_large_is_classic_card_testing() {
        let cache = MemoryCache::new();
        for _ in 0..3 {
            evaluate(&cache, "dev-1", "411111", 1.0).await.unwrap();
        }
        let result = evaluate(&cache, "dev-1", "411111", 500.0).await.unwrap();
        assert!(result.reason_codes.iter().any(|c| c.starts_with("CARD_TESTING_PATTERN_")));
    }
}
