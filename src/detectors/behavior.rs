/// Behavior Engine (C6)
///
/// Scores deviation from a per-user profile that a background writer (C19)
/// maintains outside the request path. A missing or immature profile isn't
/// treated as suspicious on its own; it narrows evaluation to the two
/// critical checks (profile-change, login-timing) and returns early,
/// skipping every baseline-dependent comparison.
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::cache::CounterCache;
use crate::core::errors::EngineResult;
use crate::domain::request::{EnrichedRequest, TransactionType};
use crate::storage::redis_cache::keys;

const LEARNING_PERIOD_DAYS: u32 = 30;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BehaviorProfile {
    pub avg_amount: f64,
    pub std_amount: f64,
    pub typical_hours: Vec<u8>,
    pub primary_currency: String,
    pub account_age_days: u32,
    pub last_profile_change_ts: Option<DateTime<Utc>>,
    pub last_login_ts: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default)]
pub struct BehaviorResult {
    pub score: f64,
    pub reason_codes: Vec<String>,
    pub learning_period: bool,
}

async fn load_profile(cache: &dyn CounterCache, uid: &str) -> EngineResult<Option<BehaviorProfile>> {
    let raw = cache.get(&keys::behavior_profile(uid)).await?;
    Ok(raw.and_then(|r| serde_json::from_str(&r).ok()))
}

fn is_payday(ts: DateTime<Utc>) -> bool {
    use chrono::Datelike;
    matches!(ts.day(), 1 | 15 | 16 | 30 | 31)
}

pub async fn evaluate(cache: &dyn CounterCache, req: &EnrichedRequest) -> EngineResult<BehaviorResult> {
    let r = &req.request;
    let uid = r.user_id.to_string();

    let profile = load_profile(cache, &uid).await?;

    let immature = match &profile {
        None => true,
        Some(p) => p.account_age_days < LEARNING_PERIOD_DAYS,
    };

    let mut score = 0.0;
    let mut codes = Vec::new();

    if immature {
        score -= 5.0;
        codes.push("BEHAVIOR_LEARNING_PERIOD".to_string());
        if let Some(p) = &profile {
            if let Some(changed) = p.last_profile_change_ts {
                if r.timestamp - changed < chrono::Duration::hours(24) {
                    score += 25.0;
                    codes.push("PROFILE_CHANGED_LAST_24H".to_string());
                }
            }
        }
        apply_login_check(cache, &uid, r.timestamp, &mut score, &mut codes).await?;
        return Ok(BehaviorResult {
            score: score.clamp(-25.0, 100.0),
            reason_codes: codes,
            learning_period: true,
        });
    }

    let profile = profile.expect("checked immature above");

    if let Some(changed) = profile.last_profile_change_ts {
        if r.timestamp - changed < chrono::Duration::hours(24) {
            score += 25.0;
            codes.push("PROFILE_CHANGED_LAST_24H".to_string());
        }
    }

    apply_login_check(cache, &uid, r.timestamp, &mut score, &mut codes).await?;

    use chrono::Timelike;
    let hour = r.timestamp.hour() as u8;
    if !profile.typical_hours.contains(&hour) {
        score += 15.0;
        codes.push("BEHAVIOR_HOUR_ATYPICAL".to_string());
    }

    if profile.avg_amount > 0.0 {
        let ratio = r.amount / profile.avg_amount;
        if ratio > 10.0 {
            score += 35.0;
            codes.push("AMOUNT_10X_AVERAGE".to_string());
        } else if ratio > 3.0 {
            if is_payday(r.timestamp) {
                score -= 10.0;
                codes.push("AMOUNT_3X_AVERAGE_PAYDAY_REDUCTION".to_string());
            } else {
                score += 20.0;
                codes.push("AMOUNT_3X_AVERAGE".to_string());
            }
        }
    }

    if r.currency != profile.primary_currency {
        score += 12.0;
        codes.push("CURRENCY_MISMATCH".to_string());
    }

    if profile.account_age_days < 7 {
        score += 10.0;
        codes.push("ACCOUNT_AGE_UNDER_7D".to_string());
    }

    apply_recipient_check(cache, req, &mut score, &mut codes).await?;

    Ok(BehaviorResult {
        score: score.clamp(-25.0, 100.0),
        reason_codes: codes,
        learning_period: false,
    })
}

async fn apply_login_check(
    cache: &dyn CounterCache,
    uid: &str,
    now: DateTime<Utc>,
    score: &mut f64,
    codes: &mut Vec<String>,
) -> EngineResult<()> {
    if let Some(raw) = cache.get(&keys::behavior_login_ts(uid)).await? {
        if let Ok(ts) = raw.parse::<i64>() {
            if let Some(login_ts) = DateTime::from_timestamp(ts, 0) {
                if now - login_ts < chrono::Duration::seconds(30) {
                    *score += 15.0;
                    codes.push("LOGIN_JUST_BEFORE_TX".to_string());
                }
            }
        }
    }
    Ok(())
}

async fn apply_recipient_check(
    cache: &dyn CounterCache,
    req: &EnrichedRequest,
    score: &mut f64,
    codes: &mut Vec<String>,
) -> EngineResult<()> {
    let r = &req.request;
    if r.transaction_type != TransactionType::P2pSend {
        return Ok(());
    }
    let Some(recipient) = r.recipient_id else {
        return Ok(());
    };
    let uid = r.user_id.to_string();
    let count: i64 = cache
        .get(&keys::behavior_recipient_count(&uid, &recipient.to_string()))
        .await?
        .and_then(|v| v.parse().ok())
        .unwrap_or(0);
    if count == 0 {
        *score += 10.0;
        codes.push("NEW_RECIPIENT_NO_HISTORY".to_string());
    } else if count >= 3 {
        *score -= 12.0;
        codes.push("FAMILIAR_RECIPIENT_REDUCTION".to_string());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCache;
    use crate::domain::request::*;
    use std::time::Duration;
    use uuid::Uuid;

    fn base_request(ts: DateTime<Utc>) -> EnrichedRequest {
        EnrichedRequest::new(
            TransactionRequest {
                user_id: Uuid::new_v4(),
                device_id: "dev".to_string(),
                card_bin: "411111".to_string(),
                amount: 500.0,
                currency: "MXN".to_string(),
                ip_address: "1.2.3.4".to_string(),
                latitude: 19.4,
                longitude: -99.1,
                transaction_type: TransactionType::Payment,
                recipient_id: None,
                session_id: Uuid::new_v4(),
                timestamp: ts,
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
    async fn no_profile_enters_learning_period() {
        let cache = MemoryCache::new();
        let req = base_request(Utc::now());
        let result = evaluate(&cache, &req).await.unwrap();
        assert!(result.learning_period);
        assert!(result.reason_codes.contains(&"BEHAVIOR_LEARNING_PERIOD".to_string()));
        assert_eq!(result.score, -5.0);
    }

    #[tokio::test]
    async fn immature_profile_with_recent_change_still_flags_it_during_learning() {
        let cache = MemoryCache::new();
        let now = Utc::now();
        let req = base_request(now);
        let uid = req.request.user_id.to_string();
        let profile = BehaviorProfile {
            avg_amount: 40.0,
            std_amount: 5.0,
            typical_hours: (0..24).collect(),
            primary_currency: "MXN".to_string(),
            account_age_days: 5,
            last_profile_change_ts: Some(now - chrono::Duration::hours(1)),
            last_login_ts: None,
        };
        cache
            .set_ex(
                &keys::behavior_profile(&uid),
                &serde_json::to_string(&profile).unwrap(),
                Duration::from_secs(3600),
            )
            .await
            .unwrap();

        let result = evaluate(&cache, &req).await.unwrap();

        assert!(result.learning_period);
        assert!(result.reason_codes.contains(&"PROFILE_CHANGED_LAST_24H".to_string()));
        assert_eq!(result.score, 20.0);
    }

    #[tokio::test]
    async fn large_amount_vs_average_scores_high() {
        let cache = MemoryCache::new();
        let req = base_request(Utc::now());
        let uid = req.request.user_id.to_string();
        let profile = BehaviorProfile {
            avg_amount: 40.0,
            std_amount: 5.0,
            typical_hours: (0..24).collect(),
            primary_currency: "MXN".to_string(),
            account_age_days: 400,
            last_profile_change_ts: None,
            last_login_ts: None,
        };
        cache
            .set_ex(
                &keys::behavior_profile(&uid),
                &serde_json::to_string(&profile).unwrap(),
                Duration::from_secs(3600),
            )
            .await
            .unwrap();
        let result = evaluate(&cache, &req).await.unwrap();
        assert!(result.reason_codes.contains(&"AMOUNT_10X_AVERAGE".to_string()));
    }
}
