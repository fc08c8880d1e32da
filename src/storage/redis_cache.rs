/// Redis-backed `CounterCache` (C1)
///
/// High-performance distributed counters for the fraud engine's rolling
/// per-user/per-device state. Conditional-TTL semantics ("set the TTL only
/// if this call created the key") are implemented with small Lua scripts so
/// that concurrent evaluations observe each compound mutation as one unit.
use async_trait::async_trait;
use redis::{aio::ConnectionManager, AsyncCommands, Client, Script};
use std::time::Duration;

use crate::cache::{CounterCache, VelocityCounters};
use crate::core::errors::{EngineError, EngineResult};

fn cache_err(op: &str, e: redis::RedisError) -> EngineError {
    EngineError::Cache(format!("{op}: {e}"))
}

lazy_static::lazy_static! {
    static ref INCR_WITH_TTL: Script = Script::new(
        r"
        local v = redis.call('INCR', KEYS[1])
        if v == 1 then redis.call('EXPIRE', KEYS[1], ARGV[1]) end
        return v
        "
    );

    static ref INCRBYFLOAT_WITH_TTL: Script = Script::new(
        r"
        local v = redis.call('INCRBYFLOAT', KEYS[1], ARGV[1])
        if tonumber(redis.call('TTL', KEYS[1])) == -1 then
            redis.call('EXPIRE', KEYS[1], ARGV[2])
        end
        return v
        "
    );

    static ref SADD_WITH_TTL: Script = Script::new(
        r"
        redis.call('SADD', KEYS[1], ARGV[1])
        if tonumber(redis.call('TTL', KEYS[1])) == -1 then
            redis.call('EXPIRE', KEYS[1], ARGV[2])
        end
        return redis.call('SCARD', KEYS[1])
        "
    );

    static ref VELOCITY_TICK: Script = Script::new(
        r"
        local count = redis.call('INCR', KEYS[1])
        if count == 1 then redis.call('EXPIRE', KEYS[1], ARGV[2]) end

        local total = redis.call('INCRBYFLOAT', KEYS[2], ARGV[1])
        if tonumber(redis.call('TTL', KEYS[2])) == -1 then
            redis.call('EXPIRE', KEYS[2], ARGV[3])
        end

        redis.call('SADD', KEYS[3], ARGV[4])
        if tonumber(redis.call('TTL', KEYS[3])) == -1 then
            redis.call('EXPIRE', KEYS[3], ARGV[3])
        end
        local bins = redis.call('SCARD', KEYS[3])

        return {count, total, bins}
        "
    );

    static ref BIT_SET_WITH_TTL: Script = Script::new(
        r"
        redis.call('BITFIELD', KEYS[1], 'SET', 'u1', ARGV[1], ARGV[2])
        if tonumber(redis.call('TTL', KEYS[1])) == -1 then
            redis.call('EXPIRE', KEYS[1], ARGV[3])
        end
        return 1
        "
    );
}

#[derive(Clone)]
pub struct RedisCounterCache {
    conn: ConnectionManager,
}

impl RedisCounterCache {
    pub async fn new(redis_url: &str) -> EngineResult<Self> {
        let client = Client::open(redis_url)
            .map_err(|e| EngineError::Config(format!("invalid redis url: {e}")))?;
        let conn = ConnectionManager::new(client)
            .await
            .map_err(|e| EngineError::Cache(format!("redis connect failed: {e}")))?;
        Ok(Self { conn })
    }

    pub async fn health_check(&self) -> EngineResult<bool> {
        let mut conn = self.conn.clone();
        let pong: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(|e| cache_err("PING", e))?;
        Ok(pong == "PONG")
    }
}

#[async_trait]
impl CounterCache for RedisCounterCache {
    async fn incr(&self, key: &str, ttl: Duration) -> EngineResult<i64> {
        let mut conn = self.conn.clone();
        INCR_WITH_TTL
            .key(key)
            .arg(ttl.as_secs())
            .invoke_async(&mut conn)
            .await
            .map_err(|e| cache_err("INCR", e))
    }

    async fn incr_by_float(&self, key: &str, amount: f64, ttl: Duration) -> EngineResult<f64> {
        let mut conn = self.conn.clone();
        let v: f64 = INCRBYFLOAT_WITH_TTL
            .key(key)
            .arg(amount)
            .arg(ttl.as_secs())
            .invoke_async(&mut conn)
            .await
            .map_err(|e| cache_err("INCRBYFLOAT", e))?;
        Ok(v)
    }

    async fn sadd(&self, key: &str, member: &str, ttl: Duration) -> EngineResult<i64> {
        let mut conn = self.conn.clone();
        SADD_WITH_TTL
            .key(key)
            .arg(member)
            .arg(ttl.as_secs())
            .invoke_async(&mut conn)
            .await
            .map_err(|e| cache_err("SADD", e))
    }

    async fn scard(&self, key: &str) -> EngineResult<i64> {
        let mut conn = self.conn.clone();
        conn.scard(key).await.map_err(|e| cache_err("SCARD", e))
    }

    async fn sismember(&self, key: &str, member: &str) -> EngineResult<bool> {
        let mut conn = self.conn.clone();
        conn.sismember(key, member)
            .await
            .map_err(|e| cache_err("SISMEMBER", e))
    }

    async fn mget(&self, keys: &[String]) -> EngineResult<Vec<Option<String>>> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        let mut conn = self.conn.clone();
        conn.mget(keys).await.map_err(|e| cache_err("MGET", e))
    }

    async fn set_nx(&self, key: &str, value: &str, ttl: Duration) -> EngineResult<bool> {
        let mut conn = self.conn.clone();
        let result: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("NX")
            .arg("EX")
            .arg(ttl.as_secs())
            .query_async(&mut conn)
            .await
            .map_err(|e| cache_err("SET NX", e))?;
        Ok(result.is_some())
    }

    async fn get(&self, key: &str) -> EngineResult<Option<String>> {
        let mut conn = self.conn.clone();
        conn.get(key).await.map_err(|e| cache_err("GET", e))
    }

    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> EngineResult<()> {
        let mut conn = self.conn.clone();
        conn.set_ex::<_, _, ()>(key, value, ttl.as_secs())
            .await
            .map_err(|e| cache_err("SETEX", e))
    }

    async fn delete(&self, key: &str) -> EngineResult<()> {
        let mut conn = self.conn.clone();
        conn.del::<_, ()>(key).await.map_err(|e| cache_err("DEL", e))
    }

    async fn exists(&self, key: &str) -> EngineResult<bool> {
        let mut conn = self.conn.clone();
        conn.exists(key).await.map_err(|e| cache_err("EXISTS", e))
    }

    async fn expire(&self, key: &str, ttl: Duration) -> EngineResult<()> {
        let mut conn = self.conn.clone();
        conn.expire::<_, ()>(key, ttl.as_secs() as i64)
            .await
            .map_err(|e| cache_err("EXPIRE", e))
    }

    async fn ttl(&self, key: &str) -> EngineResult<i64> {
        let mut conn = self.conn.clone();
        conn.ttl(key).await.map_err(|e| cache_err("TTL", e))
    }

    async fn bit_get(&self, key: &str, offset: u32) -> EngineResult<bool> {
        let mut conn = self.conn.clone();
        let result: Vec<i64> = redis::cmd("BITFIELD")
            .arg(key)
            .arg("GET")
            .arg("u1")
            .arg(offset)
            .query_async(&mut conn)
            .await
            .map_err(|e| cache_err("BITFIELD GET", e))?;
        Ok(result.first().copied().unwrap_or(0) != 0)
    }

    async fn bit_set(
        &self,
        key: &str,
        offset: u32,
        value: bool,
        ttl: Duration,
    ) -> EngineResult<()> {
        let mut conn = self.conn.clone();
        BIT_SET_WITH_TTL
            .key(key)
            .arg(offset)
            .arg(if value { 1 } else { 0 })
            .arg(ttl.as_secs())
            .invoke_async::<_, ()>(&mut conn)
            .await
            .map_err(|e| cache_err("BITFIELD SET", e))
    }

    async fn lpush_capped(
        &self,
        key: &str,
        value: &str,
        cap: usize,
        ttl: Duration,
    ) -> EngineResult<()> {
        let mut conn = self.conn.clone();
        redis::pipe()
            .atomic()
            .lpush(key, value)
            .ltrim(key, 0, cap as isize - 1)
            .expire(key, ttl.as_secs() as i64)
            .query_async::<_, ()>(&mut conn)
            .await
            .map_err(|e| cache_err("LPUSH/LTRIM", e))
    }

    async fn lrange_all(&self, key: &str) -> EngineResult<Vec<String>> {
        let mut conn = self.conn.clone();
        conn.lrange(key, 0, -1)
            .await
            .map_err(|e| cache_err("LRANGE", e))
    }

    async fn velocity_tick(
        &self,
        uid: &str,
        bin: &str,
        amount: f64,
        window_ttl: Duration,
        daily_ttl: Duration,
    ) -> EngineResult<VelocityCounters> {
        let mut conn = self.conn.clone();
        let (count_10m, daily_total, distinct_bins): (i64, f64, i64) = VELOCITY_TICK
            .key(keys::velocity_10m(uid))
            .key(keys::limit_24h(uid))
            .key(keys::cards_24h(uid))
            .arg(amount)
            .arg(window_ttl.as_secs())
            .arg(daily_ttl.as_secs())
            .arg(bin)
            .invoke_async(&mut conn)
            .await
            .map_err(|e| cache_err("velocity_tick", e))?;
        Ok(VelocityCounters {
            count_10m,
            daily_total,
            distinct_bins,
        })
    }
}

/// Cache key builders, one per §3's key table.
pub mod keys {
    pub fn velocity_10m(uid: &str) -> String {
        format!("velocity:{uid}:10m")
    }
    pub fn limit_24h(uid: &str) -> String {
        format!("limit:{uid}:24h")
    }
    pub fn cards_24h(uid: &str) -> String {
        format!("cards:{uid}:24h")
    }
    pub fn known_devices(uid: &str) -> String {
        format!("device:user:{uid}:known_devices")
    }
    pub fn device_users_24h(did: &str) -> String {
        format!("device:{did}:users_24h")
    }
    pub fn device_cards_10min(did: &str) -> String {
        format!("device:{did}:cards_10min")
    }
    pub fn geo_last_tx(uid: &str) -> String {
        format!("geo:user:{uid}:last_tx")
    }
    pub fn geo_country_history(uid: &str) -> String {
        format!("geo:user:{uid}:country_history")
    }
    pub fn geo_traveler_mode(uid: &str) -> String {
        format!("geo:user:{uid}:traveler_mode")
    }
    pub fn p2p_fanout(uid: &str, window: &str) -> String {
        format!("p2p:fanout:{window}:{uid}")
    }
    pub fn p2p_fanin(uid: &str, window: &str) -> String {
        format!("p2p:fanin:{window}:{uid}")
    }
    pub fn p2p_daily_vol(uid: &str) -> String {
        format!("p2p:daily_vol:{uid}")
    }
    pub fn p2p_accum_risk(uid: &str) -> String {
        format!("p2p:accum_risk:{uid}")
    }
    pub fn p2p_drain(uid: &str) -> String {
        format!("p2p:drain:{uid}")
    }
    pub fn p2p_account_created(uid: &str) -> String {
        format!("p2p:account_created:{uid}")
    }
    pub fn rate_ip(ip: &str) -> String {
        format!("rate:ip:{ip}")
    }
    pub fn rate_user(uid: &str) -> String {
        format!("rate:user:{uid}")
    }
    pub fn ip_history(uid: &str) -> String {
        format!("ip_history:user:{uid}")
    }
    pub fn session(sid: &str) -> String {
        format!("session:{sid}")
    }
    pub fn card_test_amounts(did: &str, bin: &str) -> String {
        format!("card_test:{did}:{bin}:amounts")
    }
    pub fn card_test_rate(bin: &str) -> String {
        format!("card_test:{bin}:rate_10min")
    }
    pub fn timepattern_bitmap(uid: &str) -> String {
        format!("timepattern:user:{uid}:bitmap")
    }
    pub fn timepattern_tx_count(uid: &str) -> String {
        format!("timepattern:user:{uid}:tx_count")
    }
    pub fn trust_profile(uid: &str) -> String {
        format!("trust:user:{uid}")
    }
    pub fn behavior_profile(uid: &str) -> String {
        format!("behavior:user:{uid}:profile")
    }
    pub fn behavior_login_ts(uid: &str) -> String {
        format!("behavior:user:{uid}:last_login_ts")
    }
    pub fn behavior_recipient_count(uid: &str, recipient: &str) -> String {
        format!("behavior:user:{uid}:recipient:{recipient}:count")
    }
    pub fn blacklist(kind: &str, value: &str) -> String {
        format!("blacklist:{kind}:{value}")
    }
    pub fn external_reputation(uid: &str, did: &str) -> String {
        format!("external:rep:{uid}:{did}")
    }
}

#[cfg(test)]
mod tests {
    use super::keys;

    #[test]
    fn key_builders_match_the_namespacing_table() {
        assert_eq!(keys::velocity_10m("u1"), "velocity:u1:10m");
        assert_eq!(keys::limit_24h("u1"), "limit:u1:24h");
        assert_eq!(keys::session("s1"), "session:s1");
        assert_eq!(
            keys::external_reputation("u1", "d1"),
            "external:rep:u1:d1"
        );
    }
}
