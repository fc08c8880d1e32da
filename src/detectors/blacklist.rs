/// Blacklist Service (C2)
///
/// Single batched cache read over {user, device, ip, BIN}. Any present key
/// is a hit carrying its stored reason. A cache error is treated as a miss:
/// the blacklist is precautionary, never the engine's sole defense.
use crate::cache::CounterCache;
use crate::domain::EnrichedRequest;
use crate::storage::redis_cache::keys;

#[derive(Debug, Clone)]
pub struct BlacklistHit {
    pub reason_code: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default)]
pub struct BlacklistResult {
    pub hit: Option<BlacklistHit>,
}

pub async fn check(cache: &dyn CounterCache, req: &EnrichedRequest) -> BlacklistResult {
    let checks = [
        ("USER", keys::blacklist("user", &req.request.user_id.to_string())),
        ("DEVICE", keys::blacklist("device", &req.request.device_id)),
        ("IP", keys::blacklist("ip", &req.request.ip_address)),
        ("BIN", keys::blacklist("bin", &req.request.card_bin)),
    ];

    let key_list: Vec<String> = checks.iter().map(|(_, k)| k.clone()).collect();
    let values = match cache.mget(&key_list).await {
        Ok(v) => v,
        Err(_) => return BlacklistResult::default(),
    };

    for ((kind, _), value) in checks.iter().zip(values.into_iter()) {
        if let Some(reason) = value {
            return BlacklistResult {
                hit: Some(BlacklistHit {
                    reason_code: format!("BLACKLIST_{kind}_HIT"),
                    reason,
                }),
            };
        }
    }

    BlacklistResult::default()
}

/// Analyst-driven add/remove operations, each carrying a free-text reason.
pub async fn add(
    cache: &dyn CounterCache,
    kind: &str,
    value: &str,
    reason: &str,
) -> crate::core::errors::EngineResult<()> {
    cache
        .set_ex(&keys::blacklist(kind, value), reason, std::time::Duration::from_secs(365 * 24 * 3600))
        .await
}

/// Reversal of a false-positive listing. Logs the reversal at the call site.
pub async fn remove(
    cache: &dyn CounterCache,
    kind: &str,
    value: &str,
) -> crate::core::errors::EngineResult<()> {
    cache.delete(&keys::blacklist(kind, value)).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCache;
    use crate::domain::request::*;
    use chrono::Utc;
    use uuid::Uuid;

    fn sample_request() -> EnrichedRequest {
        EnrichedRequest::new(
            TransactionRequest {
                user_id: Uuid::new_v4(),
                device_id: "D-EVIL".to_string(),
                card_bin: "411111".to_string(),
                amount: 10.0,
                currency: "MXN".to_string(),
                ip_address: "1.2.3.4".to_string(),
                latitude: 19.4,
                longitude: -99.1,
                transaction_type: TransactionType::TopUp,
                recipient_id: None,
                session_id: Uuid::new_v4(),
                timestamp: Utc::now(),
                user_agent: "Mozilla/5.0".to_string(),
                sdk_version: "1.0.0".to_string(),
                device: DeviceContext {
                    os: DeviceOs::Android,
                    model: "Pixel".to_string(),
                    rooted: false,
                    emulator: false,
                    network_type: NetworkType::Wifi,
                    battery_level: 50,
                },
                history: UserHistoryHints {
                    account_age_days: 400,
                    avg_monthly_amount: 1000.0,
                    tx_count_30d: 10,
                    failed_tx_7d: 0,
                    time_since_last_tx_minutes: None,
                    kyc_level: KycLevel::Full,
                    session_duration_seconds: 120,
                    form_fill_time_seconds: 20,
                    card_last4: "1111".to_string(),
                    is_international_card: false,
                    merchant_category: None,
                },
            },
            EnrichmentContext {
                ip_country: "MX".to_string(),
                bin_country: "MX".to_string(),
                is_vpn: false,
                ip_city: None,
                card_type: None,
                card_brand: None,
            },
        )
    }

    #[tokio::test]
    async fn blacklisted_device_is_a_hit() {
        let cache = MemoryCache::new();
        add(&cache, "device", "D-EVIL", "confirmed_fraud").await.unwrap();
        let result = check(&cache, &sample_request()).await;
        assert_eq!(result.hit.unwrap().reason_code, "BLACKLIST_DEVICE_HIT");
    }

    #[tokio::test]
    async fn clean_request_misses() {
        let cache = MemoryCache::new();
        let result = check(&cache, &sample_request()).await;
        assert!(result.hit.is_none());
    }
}
