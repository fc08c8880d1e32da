/// Session Guard (C12)
///
/// The entire guarantee rests on `SET key value NX` being a single atomic
/// cache operation; anything that reads-then-writes in two steps reopens
/// the race this detector exists to close.
use std::time::Duration;

use crate::cache::CounterCache;
use crate::core::errors::EngineResult;
use crate::storage::redis_cache::keys;

const SESSION_TTL: Duration = Duration::from_secs(3600);

#[derive(Debug, Clone, Default)]
pub struct SessionGuardResult {
    pub score: f64,
    pub reason_codes: Vec<String>,
    pub override_block: bool,
}

pub async fn evaluate(cache: &dyn CounterCache, session_id: &str, user_id: &str) -> EngineResult<SessionGuardResult> {
    let key = keys::session(session_id);

    if cache.set_nx(&key, user_id, SESSION_TTL).await? {
        return Ok(SessionGuardResult::default());
    }

    let owner = cache.get(&key).await?;
    match owner {
        Some(ref stored) if stored == user_id => Ok(SessionGuardResult {
            score: 40.0,
            reason_codes: vec!["SESSION_REPLAY_ATTACK".to_string()],
            override_block: false,
        }),
        _ => Ok(SessionGuardResult {
            score: 0.0,
            reason_codes: vec!["SESSION_HIJACK_DETECTED".to_string()],
            override_block: true,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCache;

    #[tokio::test]
    async fn first_use_is_clean() {
        let cache = MemoryCache::new();
        let result = evaluate(&cache, "sess-1", "user-1").await.unwrap();
        assert_eq!(result.score, 0.0);
        assert!(result.reason_codes.is_empty());
    }

    #[tokio::test]
    async fn same_user_replays_the_session() {
        let cache = MemoryCache::new();
        evaluate(&cache, "sess-1", "user-1").await.unwrap();
        let result = evaluate(&cache, "sess-1", "user-1").await.unwrap();
        assert_eq!(result.reason_codes, vec!["SESSION_REPLAY_ATTACK"]);
        assert!(!result.override_block);
    }

    #[tokio::test]
    async fn different_user_is_a_hijack() {
        let cache = MemoryCache::new();
        evaluate(&cache, "sess-1", "user-1").await.unwrap();
        let result = evaluate(&cache, "sess-1", "user-2").await.unwrap();
        assert_eq!(result.reason_codes, vec!["SESSION_HIJACK_DETECTED"]);
        assert!(result.override_block);
    }
}
