/// IP History (C10)
///
/// Always rewrites the stored record, even when no penalty fires, so the
/// next request has a fresh comparison point regardless of this one's
/// outcome.
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::cache::CounterCache;
use crate::core::errors::EngineResult;
use crate::storage::redis_cache::keys;

const RECORD_TTL: Duration = Duration::from_secs(24 * 3600);
const IMPOSSIBLE_JUMP_MINUTES: i64 = 5;
const SUSPICIOUS_JUMP_MINUTES: i64 = 30;

#[derive(Debug, Clone, Default)]
pub struct IpHistoryResult {
    pub score: f64,
    pub reason_codes: Vec<String>,
    pub override_block: bool,
}

struct Record {
    ip: String,
    country: String,
    ts: DateTime<Utc>,
}

fn parse(raw: &str) -> Option<Record> {
    let mut parts = raw.splitn(3, '|');
    let ip = parts.next()?.to_string();
    let country = parts.next()?.to_string();
    let ts: i64 = parts.next()?.parse().ok()?;
    Some(Record {
        ip,
        country,
        ts: DateTime::from_timestamp(ts, 0)?,
    })
}

pub async fn evaluate(
    cache: &dyn CounterCache,
    uid: &str,
    ip: &str,
    country: &str,
    now: DateTime<Utc>,
) -> EngineResult<IpHistoryResult> {
    let key = keys::ip_history(uid);
    let mut score = 0.0;
    let mut codes = Vec::new();
    let mut override_block = false;

    if let Some(prev) = cache.get(&key).await?.and_then(|raw| parse(&raw)) {
        if prev.country != country {
            let elapsed_min = (now - prev.ts).num_seconds() as f64 / 60.0;
            if elapsed_min < IMPOSSIBLE_JUMP_MINUTES as f64 {
                override_block = true;
                score += 50.0;
                codes.push("IMPOSSIBLE_IP_JUMP_5MIN".to_string());
            } else if elapsed_min < SUSPICIOUS_JUMP_MINUTES as f64 {
                score += 25.0;
                codes.push("IP_COUNTRY_CHANGE_30MIN".to_string());
            }
        }
    }

    cache
        .set_ex(&key, &format!("{ip}|{country}|{}", now.timestamp()), RECORD_TTL)
        .await?;

    Ok(IpHistoryResult {
        score: score.clamp(0.0, 100.0),
        reason_codes: codes,
        override_block,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCache;
    use chrono::Duration as ChronoDuration;

    #[tokio::test]
    async fn impossible_jump_triggers_override_block() {
        let cache = MemoryCache::new();
        let t0 = Utc::now();
        evaluate(&cache, "u1", "1.1.1.1", "MX", t0).await.unwrap();
        let result = evaluate(&cache, "u1", "2.2.2.2", "RU", t0 + ChronoDuration::minutes(2))
            .await
            .unwrap();
        assert!(result.override_block);
        assert_eq!(result.score, 50.0);
    }

    #[tokio::test]
    async fn same_country_never_penalized() {
        let cache = MemoryCache::new();
        let t0 = Utc::now();
        evaluate(&cache, "u1", "1.1.1.1", "MX", t0).await.unwrap();
        let result = evaluate(&cache, "u1", "1.1.1.2", "MX", t0 + ChronoDuration::minutes(1))
            .await
            .unwrap();
        assert_eq!(result.score, 0.0);
    }
}
