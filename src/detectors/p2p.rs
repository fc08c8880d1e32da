/// P2P Analyzer (C8)
///
/// Only runs for P2P_SEND transactions; the orchestrator leaves this
/// detector's slot as `None` for every other transaction type rather than
/// running it and discarding the result. Fan-out/fan-in counters update
/// after scoring, not before, so a burst can't inflate its own signal.
use std::time::Duration;

use uuid::Uuid;

use crate::cache::CounterCache;
use crate::core::errors::EngineResult;
use crate::domain::request::EnrichedRequest;
use crate::storage::redis_cache::keys;

const NEW_RECIPIENT_HOURS: i64 = 48;
const NEW_RECIPIENT_HOLD_AMOUNT: f64 = 200.0;
const HIGH_ACCUM_RISK: f64 = 60.0;
const SMURFING_AMOUNT_CEILING: f64 = 1000.0;
const SMURFING_PROJECTED_FLOOR: f64 = 9000.0;
const DRAIN_WINDOW_HOURS: i64 = 2;
const DRAIN_PCT_THRESHOLD: f64 = 80.0;
const EWMA_ALPHA: f64 = 0.3;

const ONE_HOUR: Duration = Duration::from_secs(3600);
const ONE_DAY: Duration = Duration::from_secs(86400);

#[derive(Debug, Clone, Default)]
pub struct P2pResult {
    pub score: f64,
    pub reason_codes: Vec<String>,
    pub preventive_hold: bool,
    pub mule_pattern: bool,
    pub smurfing: bool,
}

struct DrainRecord {
    received: f64,
    drained: f64,
    ts: chrono::DateTime<chrono::Utc>,
}

fn parse_drain(raw: &str) -> Option<DrainRecord> {
    let mut parts = raw.splitn(3, '|');
    let received: f64 = parts.next()?.parse().ok()?;
    let drained: f64 = parts.next()?.parse().ok()?;
    let ts: i64 = parts.next()?.parse().ok()?;
    Some(DrainRecord {
        received,
        drained,
        ts: chrono::DateTime::from_timestamp(ts, 0)?,
    })
}

pub async fn evaluate(cache: &dyn CounterCache, req: &EnrichedRequest) -> EngineResult<P2pResult> {
    let r = &req.request;
    let uid = r.user_id.to_string();
    let Some(recipient) = r.recipient_id else {
        return Ok(P2pResult::default());
    };
    let recipient = recipient.to_string();

    let mut score = 0.0;
    let mut codes = Vec::new();
    let mut preventive_hold = false;
    let mut mule_pattern = false;
    let mut smurfing = false;

    let recipient_age_h = match cache.get(&keys::p2p_account_created(&recipient)).await? {
        Some(raw) => raw
            .parse::<i64>()
            .ok()
            .and_then(|secs| chrono::DateTime::from_timestamp(secs, 0))
            .map(|created: chrono::DateTime<chrono::Utc>| (r.timestamp - created).num_hours()),
        None => None,
    };
    if let Some(age_h) = recipient_age_h {
        if age_h < NEW_RECIPIENT_HOURS {
            score += 20.0;
            codes.push("P2P_NEW_RECIPIENT_ACCOUNT".to_string());
            if r.amount > NEW_RECIPIENT_HOLD_AMOUNT {
                preventive_hold = true;
            }
        }
    }

    let accum_risk: f64 = cache
        .get(&keys::p2p_accum_risk(&recipient))
        .await?
        .and_then(|v| v.parse().ok())
        .unwrap_or(0.0);
    if accum_risk > HIGH_ACCUM_RISK {
        score += 15.0;
        codes.push("P2P_RECIPIENT_HIGH_RISK".to_string());
    }

    let fanout_1h = cache.scard(&keys::p2p_fanout(&uid, "1h")).await?;
    if fanout_1h > 5 {
        score += 30.0;
        codes.push("P2P_FANOUT_1H_HIGH".to_string());
    }
    let fanout_24h = cache.scard(&keys::p2p_fanout(&uid, "24h")).await?;
    if fanout_24h > 15 {
        score += 15.0;
        codes.push("P2P_FANOUT_24H_HIGH".to_string());
    }

    let fanin_1h = cache.scard(&keys::p2p_fanin(&recipient, "1h")).await?;
    if fanin_1h > 5 {
        score += 25.0;
        codes.push("P2P_FANIN_1H_HIGH".to_string());
        mule_pattern = true;
    }
    let fanin_24h = cache.scard(&keys::p2p_fanin(&recipient, "24h")).await?;
    if fanin_24h > 10 {
        score += 12.0;
        codes.push("P2P_FANIN_24H_HIGH".to_string());
    }

    let daily_before: f64 = cache
        .get(&keys::p2p_daily_vol(&uid))
        .await?
        .and_then(|v| v.parse().ok())
        .unwrap_or(0.0);
    let projected_daily = daily_before + r.amount;
    if r.amount < SMURFING_AMOUNT_CEILING && projected_daily > SMURFING_PROJECTED_FLOOR {
        score += 35.0;
        codes.push(format!("SMURFING_DAILY_VOL_{}", projected_daily.round() as i64));
        smurfing = true;
    }

    if let Some(raw) = cache.get(&keys::p2p_drain(&recipient)).await? {
        if let Some(record) = parse_drain(&raw) {
            let elapsed_h = (r.timestamp - record.ts).num_hours();
            if elapsed_h < DRAIN_WINDOW_HOURS && record.received > 0.0 {
                let drained_pct = (record.drained / record.received) * 100.0;
                if drained_pct > DRAIN_PCT_THRESHOLD {
                    score += 40.0;
                    codes.push("P2P_RAPID_DRAIN".to_string());
                    mule_pattern = true;
                    preventive_hold = true;
                }
            }
        }
    }

    cache.sadd(&keys::p2p_fanout(&uid, "1h"), &recipient, ONE_HOUR).await?;
    cache.sadd(&keys::p2p_fanout(&uid, "24h"), &recipient, ONE_DAY).await?;
    cache.sadd(&keys::p2p_fanin(&recipient, "1h"), &uid, ONE_HOUR).await?;
    cache.sadd(&keys::p2p_fanin(&recipient, "24h"), &uid, ONE_DAY).await?;
    cache
        .incr_by_float(&keys::p2p_daily_vol(&uid), r.amount, ONE_DAY)
        .await?;

    Ok(P2pResult {
        score: score.clamp(0.0, 100.0),
        reason_codes: codes,
        preventive_hold,
        mule_pattern,
        smurfing,
    })
}

/// Called from the withdrawal/outbound path, not from this detector's own
/// evaluation. Mirrors the traveler-mode setter in the geo module: an
/// external actor seeds state this detector only reads.
pub async fn record_drain_event(
    cache: &dyn CounterCache,
    uid: &str,
    received_amount: f64,
    drained_amount: f64,
) -> EngineResult<()> {
    let now = chrono::Utc::now();
    cache
        .set_ex(
            &keys::p2p_drain(uid),
            &format!("{received_amount}|{drained_amount}|{}", now.timestamp()),
            ONE_DAY,
        )
        .await
}

pub async fn register_account(cache: &dyn CounterCache, uid: &Uuid) -> EngineResult<()> {
    cache
        .set_ex(
            &keys::p2p_account_created(&uid.to_string()),
            &chrono::Utc::now().timestamp().to_string(),
            Duration::from_secs(3650 * 24 * 3600),
        )
        .await
}

/// EWMA maintenance, fired by the post-decision writer (C19), not by this
/// detector's read path.
pub async fn update_accum_risk(cache: &dyn CounterCache, uid: &str, observed: f64) -> EngineResult<()> {
    let previous: f64 = cache
        .get(&keys::p2p_accum_risk(uid))
        .await?
        .and_then(|v| v.parse().ok())
        .unwrap_or(0.0);
    let updated = EWMA_ALPHA * observed + (1.0 - EWMA_ALPHA) * previous;
    cache
        .set_ex(&keys::p2p_accum_risk(uid), &updated.to_string(), ONE_DAY * 30)
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCache;
    use crate::domain::request::*;
    use chrono::Utc;
    use uuid::Uuid;

    fn p2p_request(amount: f64, recipient: Uuid) -> EnrichedRequest {
        EnrichedRequest::new(
            TransactionRequest {
                user_id: Uuid::new_v4(),
                device_id: "dev".to_string(),
                card_bin: "411111".to_string(),
                amount,
                currency: "MXN".to_string(),
                ip_address: "1.2.3.4".to_string(),
                latitude: 19.4,
                longitude: -99.1,
                transaction_type: TransactionType::P2pSend,
                recipient_id: Some(recipient),
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
    async fn non_p2p_returns_default() {
        let cache = MemoryCache::new();
        let mut req = p2p_request(10.0, Uuid::new_v4());
        req.request.transaction_type = TransactionType::Payment;
        req.request.recipient_id = None;
        let result = evaluate(&cache, &req).await.unwrap();
        assert_eq!(result.score, 0.0);
    }

    #[tokio::test]
    async fn smurfing_pattern_detected() {
        let cache = MemoryCache::new();
        let recipient = Uuid::new_v4();
        let req1 = p2p_request(900.0, recipient);
        let uid = req1.request.user_id.to_string();
        cache
            .set_ex(&keys::p2p_daily_vol(&uid), "8200", Duration::from_secs(86400))
            .await
            .unwrap();
        let result = evaluate(&cache, &req1).await.unwrap();
        assert!(result.smurfing);
        assert!(result.reason_codes.iter().any(|c| c.starts_with("SMURFING_DAILY_VOL_")));
    }
}
