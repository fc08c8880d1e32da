/// Device/KYC Evaluator (C4)
///
/// User-agent and declared-device-flag scoring, plus multi-account and
/// card-churn checks against the device's cache footprint. The two
/// OS/user-agent contradiction checks below are independent and stack: a
/// request can be penalized for both the SDK-vs-UA mismatch and the
/// declared-OS-vs-UA mismatch in the same evaluation (see DESIGN.md).
use std::time::Duration;

use crate::cache::CounterCache;
use crate::core::errors::EngineResult;
use crate::domain::request::{DeviceOs, EnrichedRequest, NetworkType};
use crate::storage::redis_cache::keys;

const EMULATOR_UA_KEYWORDS: &[&str] = &[
    "bluestacks",
    "nox",
    "ldplayer",
    "memu",
    "genymotion",
    "emulator",
    "headless",
    "selenium",
    "puppeteer",
    "playwright",
    "phantomjs",
    "webdriver",
];

const MIN_PLAUSIBLE_UA_LEN: usize = 15;
const KNOWN_DEVICE_TTL: Duration = Duration::from_secs(90 * 24 * 3600);
const DEVICE_USERS_TTL: Duration = Duration::from_secs(24 * 3600);
const DEVICE_CARDS_TTL: Duration = Duration::from_secs(600);

#[derive(Debug, Clone, Default)]
pub struct DeviceResult {
    pub score: f64,
    pub reason_codes: Vec<String>,
}

pub async fn evaluate(
    cache: &dyn CounterCache,
    req: &EnrichedRequest,
) -> EngineResult<DeviceResult> {
    let r = &req.request;

    if r.device.emulator {
        return Ok(DeviceResult {
            score: 90.0,
            reason_codes: vec!["DEVICE_EMULATOR_DECLARED".to_string()],
        });
    }

    let ua = r.user_agent.to_lowercase();
    if EMULATOR_UA_KEYWORDS.iter().any(|kw| ua.contains(kw)) {
        return Ok(DeviceResult {
            score: 90.0,
            reason_codes: vec!["DEVICE_UA_EMULATOR_SIGNATURE".to_string()],
        });
    }

    let mut score = 0.0;
    let mut codes = Vec::new();

    if r.device.rooted {
        score += 50.0;
        codes.push("DEVICE_ROOTED".to_string());
    }

    let sdk = r.sdk_version.to_lowercase();
    let sdk_android_ua_iphone = ua.contains("iphone") && sdk.starts_with("android");
    let sdk_ios_ua_android = ua.contains("android") && sdk.starts_with("ios");
    if sdk_android_ua_iphone || sdk_ios_ua_android {
        score += 45.0;
        codes.push("DEVICE_OS_UA_SDK_MISMATCH".to_string());
    }

    if ua.len() < MIN_PLAUSIBLE_UA_LEN {
        score += 35.0;
        codes.push("DEVICE_UA_TOO_SHORT".to_string());
    }

    let declared_os_contradicts_ua = match r.device.os {
        DeviceOs::Android => ua.contains("iphone"),
        DeviceOs::Ios => ua.contains("android"),
        DeviceOs::Other => false,
    };
    if declared_os_contradicts_ua {
        score += 40.0;
        codes.push("DEVICE_OS_UA_MISMATCH".to_string());
    }

    let on_mobile_os = matches!(r.device.os, DeviceOs::Android | DeviceOs::Ios);
    if r.device.battery_level == 100 && on_mobile_os {
        score += 20.0;
        codes.push("DEVICE_BATTERY_FULL_MOBILE".to_string());
    }

    if matches!(r.device.network_type, NetworkType::Vpn) {
        score += 15.0;
        codes.push("DEVICE_NETWORK_VPN_DECLARED".to_string());
    }

    if r.history.session_duration_seconds < 5 {
        score += 25.0;
        codes.push("DEVICE_SESSION_TOO_SHORT".to_string());
    }

    let uid = r.user_id.to_string();
    let known = cache
        .sismember(&keys::known_devices(&uid), &r.device_id)
        .await?;
    if !known {
        score += 20.0;
        codes.push("DEVICE_UNKNOWN_DEVICE".to_string());
    }
    cache
        .sadd(&keys::known_devices(&uid), &r.device_id, KNOWN_DEVICE_TTL)
        .await?;

    let users_on_device = cache
        .sadd(&keys::device_users_24h(&r.device_id), &uid, DEVICE_USERS_TTL)
        .await?;
    if users_on_device >= 3 {
        score += 65.0;
        codes.push("DEVICE_MULTI_ACCOUNT_3PLUS".to_string());
    } else if users_on_device == 2 {
        score += 20.0;
        codes.push("DEVICE_MULTI_ACCOUNT_2".to_string());
    }

    let bins_on_device = cache
        .sadd(&keys::device_cards_10min(&r.device_id), &r.card_bin, DEVICE_CARDS_TTL)
        .await?;
    if bins_on_device >= 3 {
        score += 70.0;
        codes.push("DEVICE_CARD_CHURN_10MIN".to_string());
    }

    Ok(DeviceResult {
        score: score.clamp(0.0, 100.0),
        reason_codes: codes,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCache;
    use crate::domain::request::*;
    use chrono::Utc;
    use uuid::Uuid;

    fn base_request() -> TransactionRequest {
        TransactionRequest {
            user_id: Uuid::new_v4(),
            device_id: "dev-1".to_string(),
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
            user_agent: "Mozilla/5.0 (Linux; Android 13)".to_string(),
            sdk_version: "android-2.3.0".to_string(),
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
        }
    }

    fn wrap(request: TransactionRequest) -> EnrichedRequest {
        EnrichedRequest::new(
            request,
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
    async fn declared_emulator_short_circuits_to_90() {
        let cache = MemoryCache::new();
        let mut req = base_request();
        req.device.emulator = true;
        let result = evaluate(&cache, &wrap(req)).await.unwrap();
        assert_eq!(result.score, 90.0);
        assert_eq!(result.reason_codes, vec!["DEVICE_EMULATOR_DECLARED"]);
    }

    #[tokio::test]
    async fn both_ua_mismatch_checks_stack() {
        let cache = MemoryCache::new();
        let mut req = base_request();
        req.device.os = DeviceOs::Android;
        req.user_agent = "Mozilla/5.0 (iPhone; CPU iPhone OS 16_0)".to_string();
        req.sdk_version = "android-2.3.0".to_string();
        let result = evaluate(&cache, &wrap(req)).await.unwrap();
        assert!(result.reason_codes.contains(&"DEVICE_OS_UA_SDK_MISMATCH".to_string()));
        assert!(result.reason_codes.contains(&"DEVICE_OS_UA_MISMATCH".to_string()));
        assert_eq!(result.score, 85.0);
    }

    #[tokio::test]
    async fn third_user_on_device_triggers_multi_account() {
        let cache = MemoryCache::new();
        for _ in 0..3 {
            let mut req = base_request();
            req.device_id = "shared-device".to_string();
            evaluate(&cache, &wrap(req)).await.unwrap();
        }
        let mut req = base_request();
        req.device_id = "shared-device".to_string();
        let result = evaluate(&cache, &wrap(req)).await.unwrap();
        assert!(result.reason_codes.contains(&"DEVICE_MULTI_ACCOUNT_3PLUS".to_string()));
    }
}
