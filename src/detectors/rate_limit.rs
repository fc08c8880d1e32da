/// Rate-Limit Scorer (C9)
///
/// Two independent sliding windows (IP, user), each tiered by the first
/// threshold it clears rather than stacking every tier it exceeds.
use std::time::Duration;

use crate::cache::CounterCache;
use crate::core::errors::EngineResult;
use crate::storage::redis_cache::keys;

const IP_WINDOW: Duration = Duration::from_secs(60);
const USER_WINDOW: Duration = Duration::from_secs(300);
const CAP: f64 = 60.0;

#[derive(Debug, Clone, Default)]
pub struct RateLimitResult {
    pub score: f64,
    pub reason_codes: Vec<String>,
}

fn tier(count: i64, extreme: i64, extreme_pts: f64, high: i64, high_pts: f64, elevated: i64, elevated_pts: f64) -> Option<(f64, &'static str)> {
    if count >= extreme {
        Some((extreme_pts, "EXTREME"))
    } else if count >= high {
        Some((high_pts, "HIGH"))
    } else if count >= elevated {
        Some((elevated_pts, "ELEVATED"))
    } else {
        None
    }
}

pub async fn evaluate(cache: &dyn CounterCache, uid: &str, ip: &str) -> EngineResult<RateLimitResult> {
    let mut score = 0.0;
    let mut codes = Vec::new();

    let ip_count = cache.incr(&keys::rate_ip(ip), IP_WINDOW).await?;
    if let Some((pts, tier_name)) = tier(ip_count, 11, 45.0, 7, 25.0, 4, 10.0) {
        score += pts;
        codes.push(format!("RATE_LIMIT_IP_{tier_name}"));
    }

    let user_count = cache.incr(&keys::rate_user(uid), USER_WINDOW).await?;
    if let Some((pts, tier_name)) = tier(user_count, 20, 40.0, 10, 20.0, 5, 8.0) {
        score += pts;
        codes.push(format!("RATE_LIMIT_USER_{tier_name}"));
    }

    Ok(RateLimitResult {
        score: score.min(CAP),
        reason_codes: codes,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCache;

    #[tokio::test]
    async fn ip_extreme_tier_fires_at_eleven() {
        let cache = MemoryCache::new();
        let mut last = RateLimitResult::default();
        for _ in 0..11 {
            last = evaluate(&cache, "u1", "9.9.9.9").await.unwrap();
        }
        assert!(last.reason_codes.contains(&"RATE_LIMIT_IP_EXTREME".to_string()));
    }

    #[tokio::test]
    async fn score_is_capped_at_sixty() {
        let cache = MemoryCache::new();
        let mut last = RateLimitResult::default();
        for _ in 0..25 {
            last = evaluate(&cache, "u1", "9.9.9.9").await.unwrap();
        }
        assert!(last.score <= CAP);
    }
}
