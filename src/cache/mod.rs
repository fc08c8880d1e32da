/// Rolling Counter Cache (C1)
///
/// Sole mutable state shared across evaluations: TTL-bounded counters, sets,
/// bitmaps and small lists. Every detector that needs cross-request memory
/// goes through this port rather than touching a backend directly, so the
/// production Redis adapter and the in-memory test mock are interchangeable.
use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use dashmap::DashMap;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use crate::core::errors::EngineResult;

/// Result of the atomic three-key velocity mutation (C3). The three
/// component keys must be observed as one by any concurrent reader; see
/// `CounterCache::velocity_tick`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VelocityCounters {
    pub count_10m: i64,
    pub daily_total: f64,
    pub distinct_bins: i64,
}

#[async_trait]
pub trait CounterCache: Send + Sync {
    /// INCR with conditional TTL: the TTL is set only the first time the key
    /// is created, never refreshed on subsequent increments.
    async fn incr(&self, key: &str, ttl: Duration) -> EngineResult<i64>;

    /// INCRBYFLOAT with conditional TTL.
    async fn incr_by_float(&self, key: &str, amount: f64, ttl: Duration) -> EngineResult<f64>;

    /// SADD with conditional TTL, returns the set's cardinality after the add.
    async fn sadd(&self, key: &str, member: &str, ttl: Duration) -> EngineResult<i64>;

    async fn scard(&self, key: &str) -> EngineResult<i64>;

    async fn sismember(&self, key: &str, member: &str) -> EngineResult<bool>;

    async fn mget(&self, keys: &[String]) -> EngineResult<Vec<Option<String>>>;

    /// SET-NX with TTL. Returns true iff this call created the key.
    async fn set_nx(&self, key: &str, value: &str, ttl: Duration) -> EngineResult<bool>;

    async fn get(&self, key: &str) -> EngineResult<Option<String>>;

    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> EngineResult<()>;

    async fn delete(&self, key: &str) -> EngineResult<()>;

    async fn exists(&self, key: &str) -> EngineResult<bool>;

    async fn expire(&self, key: &str, ttl: Duration) -> EngineResult<()>;

    async fn ttl(&self, key: &str) -> EngineResult<i64>;

    /// BITFIELD GET of a single bit.
    async fn bit_get(&self, key: &str, offset: u32) -> EngineResult<bool>;

    /// BITFIELD SET of a single bit, with conditional TTL.
    async fn bit_set(&self, key: &str, offset: u32, value: bool, ttl: Duration) -> EngineResult<()>;

    /// LPUSH capped at `cap` entries (oldest dropped via LTRIM), refreshing TTL.
    async fn lpush_capped(
        &self,
        key: &str,
        value: &str,
        cap: usize,
        ttl: Duration,
    ) -> EngineResult<()>;

    /// LRANGE 0..-1, newest first.
    async fn lrange_all(&self, key: &str) -> EngineResult<Vec<String>>;

    /// Atomic multi-counter mutation for the velocity/top-up engine (C3):
    /// increments `velocity:{uid}:10m`, adds `amount` to `limit:{uid}:24h`,
    /// and adds `bin` to `cards:{uid}:24h`, each with conditional TTL,
    /// observed as a single unit by any concurrent reader.
    async fn velocity_tick(
        &self,
        uid: &str,
        bin: &str,
        amount: f64,
        window_ttl: Duration,
        daily_ttl: Duration,
    ) -> EngineResult<VelocityCounters>;
}

#[derive(Clone, Debug)]
enum Slot {
    Str(String),
    Counter(i64),
    Float(f64),
    Set(Vec<String>),
    List(VecDeque<String>),
    Bitmap(u32),
}

#[derive(Clone, Debug)]
struct Entry {
    value: Slot,
    expires_at: Option<DateTime<Utc>>,
}

impl Entry {
    fn is_expired(&self) -> bool {
        matches!(self.expires_at, Some(exp) if Utc::now() > exp)
    }
}

/// In-memory `CounterCache` used by detector unit tests and by the property
/// tests in `tests/`. Generalizes the teacher's DashMap-backed
/// `ResponseCache` into something that also models sets, bitmaps and lists.
#[derive(Clone, Default)]
pub struct MemoryCache {
    store: Arc<DashMap<String, Entry>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self {
            store: Arc::new(DashMap::new()),
        }
    }

    fn expiry(ttl: Duration) -> DateTime<Utc> {
        Utc::now() + ChronoDuration::from_std(ttl).unwrap_or(ChronoDuration::seconds(0))
    }

    fn get_live(&self, key: &str) -> Option<Entry> {
        let expired = self.store.get(key).map(|e| e.is_expired()).unwrap_or(false);
        if expired {
            self.store.remove(key);
            return None;
        }
        self.store.get(key).map(|e| e.clone())
    }
}

#[async_trait]
impl CounterCache for MemoryCache {
    async fn incr(&self, key: &str, ttl: Duration) -> EngineResult<i64> {
        let mut set_ttl = false;
        let mut entry = self.store.entry(key.to_string()).or_insert_with(|| {
            set_ttl = true;
            Entry {
                value: Slot::Counter(0),
                expires_at: Some(Self::expiry(ttl)),
            }
        });
        if entry.is_expired() {
            entry.value = Slot::Counter(0);
            entry.expires_at = Some(Self::expiry(ttl));
        }
        let next = match &entry.value {
            Slot::Counter(n) => n + 1,
            _ => 1,
        };
        entry.value = Slot::Counter(next);
        Ok(next)
    }

    async fn incr_by_float(&self, key: &str, amount: f64, ttl: Duration) -> EngineResult<f64> {
        let mut entry = self.store.entry(key.to_string()).or_insert_with(|| Entry {
            value: Slot::Float(0.0),
            expires_at: Some(Self::expiry(ttl)),
        });
        if entry.is_expired() {
            entry.value = Slot::Float(0.0);
            entry.expires_at = Some(Self::expiry(ttl));
        }
        let next = match &entry.value {
            Slot::Float(f) => f + amount,
            Slot::Counter(n) => *n as f64 + amount,
            _ => amount,
        };
        entry.value = Slot::Float(next);
        Ok(next)
    }

    async fn sadd(&self, key: &str, member: &str, ttl: Duration) -> EngineResult<i64> {
        let mut entry = self.store.entry(key.to_string()).or_insert_with(|| Entry {
            value: Slot::Set(Vec::new()),
            expires_at: Some(Self::expiry(ttl)),
        });
        if entry.is_expired() {
            entry.value = Slot::Set(Vec::new());
            entry.expires_at = Some(Self::expiry(ttl));
        }
        if let Slot::Set(members) = &mut entry.value {
            if !members.iter().any(|m| m == member) {
                members.push(member.to_string());
            }
            Ok(members.len() as i64)
        } else {
            Ok(0)
        }
    }

    async fn scard(&self, key: &str) -> EngineResult<i64> {
        Ok(match self.get_live(key) {
            Some(Entry { value: Slot::Set(m), .. }) => m.len() as i64,
            _ => 0,
        })
    }

    async fn sismember(&self, key: &str, member: &str) -> EngineResult<bool> {
        Ok(match self.get_live(key) {
            Some(Entry { value: Slot::Set(m), .. }) => m.iter().any(|x| x == member),
            _ => false,
        })
    }

    async fn mget(&self, keys: &[String]) -> EngineResult<Vec<Option<String>>> {
        let mut out = Vec::with_capacity(keys.len());
        for key in keys {
            out.push(self.get(key).await?);
        }
        Ok(out)
    }

    async fn set_nx(&self, key: &str, value: &str, ttl: Duration) -> EngineResult<bool> {
        if self.get_live(key).is_some() {
            return Ok(false);
        }
        self.store.insert(
            key.to_string(),
            Entry {
                value: Slot::Str(value.to_string()),
                expires_at: Some(Self::expiry(ttl)),
            },
        );
        Ok(true)
    }

    async fn get(&self, key: &str) -> EngineResult<Option<String>> {
        Ok(match self.get_live(key) {
            Some(Entry { value: Slot::Str(s), .. }) => Some(s),
            Some(Entry { value: Slot::Counter(n), .. }) => Some(n.to_string()),
            Some(Entry { value: Slot::Float(f), .. }) => Some(f.to_string()),
            _ => None,
        })
    }

    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> EngineResult<()> {
        self.store.insert(
            key.to_string(),
            Entry {
                value: Slot::Str(value.to_string()),
                expires_at: Some(Self::expiry(ttl)),
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> EngineResult<()> {
        self.store.remove(key);
        Ok(())
    }

    async fn exists(&self, key: &str) -> EngineResult<bool> {
        Ok(self.get_live(key).is_some())
    }

    async fn expire(&self, key: &str, ttl: Duration) -> EngineResult<()> {
        if let Some(mut entry) = self.store.get_mut(key) {
            entry.expires_at = Some(Self::expiry(ttl));
        }
        Ok(())
    }

    async fn ttl(&self, key: &str) -> EngineResult<i64> {
        Ok(match self.get_live(key) {
            Some(Entry { expires_at: Some(exp), .. }) => {
                (exp - Utc::now()).num_seconds().max(0)
            }
            Some(Entry { expires_at: None, .. }) => -1,
            None => -2,
        })
    }

    async fn bit_get(&self, key: &str, offset: u32) -> EngineResult<bool> {
        Ok(match self.get_live(key) {
            Some(Entry { value: Slot::Bitmap(bits), .. }) => bits & (1 << offset) != 0,
            _ => false,
        })
    }

    async fn bit_set(
        &self,
        key: &str,
        offset: u32,
        value: bool,
        ttl: Duration,
    ) -> EngineResult<()> {
        let mut entry = self.store.entry(key.to_string()).or_insert_with(|| Entry {
            value: Slot::Bitmap(0),
            expires_at: Some(Self::expiry(ttl)),
        });
        if entry.is_expired() {
            entry.value = Slot::Bitmap(0);
            entry.expires_at = Some(Self::expiry(ttl));
        }
        if let Slot::Bitmap(bits) = &mut entry.value {
            if value {
                *bits |= 1 << offset;
            } else {
                *bits &= !(1 << offset);
            }
        }
        Ok(())
    }

    async fn lpush_capped(
        &self,
        key: &str,
        value: &str,
        cap: usize,
        ttl: Duration,
    ) -> EngineResult<()> {
        let mut entry = self.store.entry(key.to_string()).or_insert_with(|| Entry {
            value: Slot::List(VecDeque::new()),
            expires_at: Some(Self::expiry(ttl)),
        });
        entry.expires_at = Some(Self::expiry(ttl));
        if let Slot::List(list) = &mut entry.value {
            list.push_front(value.to_string());
            while list.len() > cap {
                list.pop_back();
            }
        }
        Ok(())
    }

    async fn lrange_all(&self, key: &str) -> EngineResult<Vec<String>> {
        Ok(match self.get_live(key) {
            Some(Entry { value: Slot::List(list), .. }) => list.into_iter().collect(),
            _ => Vec::new(),
        })
    }

    async fn velocity_tick(
        &self,
        uid: &str,
        bin: &str,
        amount: f64,
        window_ttl: Duration,
        daily_ttl: Duration,
    ) -> EngineResult<VelocityCounters> {
        let count_10m = self.incr(&format!("velocity:{uid}:10m"), window_ttl).await?;
        let daily_total = self
            .incr_by_float(&format!("limit:{uid}:24h"), amount, daily_ttl)
            .await?;
        let distinct_bins = self
            .sadd(&format!("cards:{uid}:24h"), bin, daily_ttl)
            .await?;
        Ok(VelocityCounters {
            count_10m,
            daily_total,
            distinct_bins,
        })
    }
}
