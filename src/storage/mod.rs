/// Storage layer: the production `CounterCache` adapter.
pub mod redis_cache;

pub use redis_cache::RedisCounterCache;
