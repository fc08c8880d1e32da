/// Time-Pattern Scorer (C14)
///
/// A 24-bit activity bitmap per user. The bit for the current hour and the
/// lifetime counter are both written unconditionally at the end, regardless
/// of whether the hour was flagged as unusual.
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::cache::CounterCache;
use crate::core::errors::EngineResult;
use crate::storage::redis_cache::keys;

const BITMAP_TTL: Duration = Duration::from_secs(365 * 24 * 3600);
const COUNT_TTL: Duration = Duration::from_secs(365 * 24 * 3600);
const MATURE_TX_COUNT: i64 = 10;

#[derive(Debug, Clone, Default)]
pub struct TimePatternResult {
    pub score: f64,
    pub reason_codes: Vec<String>,
}

pub async fn evaluate(cache: &dyn CounterCache, uid: &str, ts: DateTime<Utc>) -> EngineResult<TimePatternResult> {
    use chrono::Timelike;
    let hour = ts.hour();

    let bitmap_key = keys::timepattern_bitmap(uid);
    let count_key = keys::timepattern_tx_count(uid);

    let already_active = cache.bit_get(&bitmap_key, hour).await?;
    let lifetime_count = cache
        .get(&count_key)
        .await?
        .and_then(|v| v.parse::<i64>().ok())
        .unwrap_or(0);

    let mut score = 0.0;
    let mut codes = Vec::new();
    if lifetime_count >= MATURE_TX_COUNT && !already_active {
        score += 15.0;
        codes.push(format!("UNUSUAL_HOUR_{hour}H_NEVER_ACTIVE"));
    }

    cache.bit_set(&bitmap_key, hour, true, BITMAP_TTL).await?;
    cache.incr(&count_key, COUNT_TTL).await?;

    Ok(TimePatternResult {
        score: score.clamp(0.0, 100.0),
        reason_codes: codes,
    })
}
