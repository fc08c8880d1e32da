/// Velocity / Top-up Engine (C3)
///
/// Mutates three counters in one atomic script, because two near-
/// simultaneous requests must never both observe "first write" state and
/// skip the TTL set on their own key.
use std::time::Duration;

use crate::cache::CounterCache;
use crate::core::errors::EngineResult;

#[derive(Debug, Clone)]
pub struct VelocityResult {
    pub score: f64,
    pub reason_codes: Vec<String>,
    pub count_10m: i64,
    pub daily_total: f64,
    pub distinct_bins: i64,
}

const WINDOW_TTL: Duration = Duration::from_secs(600);
const DAILY_TTL: Duration = Duration::from_secs(86400);

pub async fn evaluate(
    cache: &dyn CounterCache,
    uid: &str,
    bin: &str,
    amount: f64,
) -> EngineResult<VelocityResult> {
    let counters = cache.velocity_tick(uid, bin, amount, WINDOW_TTL, DAILY_TTL).await?;

    let mut score = 0.0;
    let mut reason_codes = Vec::new();

    if counters.count_10m > 3 {
        score += 40.0;
        reason_codes.push("VELOCITY_HIGH_TX_COUNT_10MIN".to_string());
    }
    if counters.distinct_bins > 2 {
        score += 50.0;
        reason_codes.push("VELOCITY_MULTIPLE_BINS_24H".to_string());
    }
    if counters.daily_total > 500.0 {
        score += 30.0;
        reason_codes.push("VELOCITY_DAILY_LIMIT_EXCEEDED".to_string());
    }

    Ok(VelocityResult {
        score: score.min(100.0),
        reason_codes,
        count_10m: counters.count_10m,
        daily_total: counters.daily_total,
        distinct_bins: counters.distinct_bins,
    })
}
