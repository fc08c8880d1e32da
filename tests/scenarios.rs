//! End-to-end scenario tests driving the orchestrator exactly as the HTTP
//! boundary would, against an in-memory cache.
use std::sync::Arc;
use std::time::Duration;

use chrono::{Duration as ChronoDuration, Utc};
use uuid::Uuid;

use wallet_risk_engine::audit::InMemoryAuditSink;
use wallet_risk_engine::cache::{CounterCache, MemoryCache};
use wallet_risk_engine::core::config::EngineConfig;
use wallet_risk_engine::detectors::external_reputation::UnavailableProvider;
use wallet_risk_engine::detectors::{blacklist, card_testing};
use wallet_risk_engine::domain::request::*;
use wallet_risk_engine::orchestrator::Orchestrator;
use wallet_risk_engine::storage::redis_cache::keys;

fn cfg() -> EngineConfig {
    EngineConfig {
        bind_addr: "127.0.0.1:0".to_string(),
        redis_url: String::new(),
        hmac_secret: "scenario-secret".to_string(),
        weights: Default::default(),
        fan_out_deadline_ms: 200,
        external_reputation_timeout_ms: 80,
        cache_op_timeout_ms: 500,
        fatf_high_risk_countries: vec!["RU".to_string(), "KP".to_string()],
        api_keys: vec![],
        enable_auth: false,
        rate_limit_per_minute: 6000,
    }
}

fn orchestrator(cache: Arc<dyn CounterCache>) -> Orchestrator {
    Orchestrator::new(
        cache,
        cfg(),
        Arc::new(UnavailableProvider),
        Arc::new(InMemoryAuditSink::new()),
    )
}

fn base_request() -> TransactionRequest {
    TransactionRequest {
        user_id: Uuid::new_v4(),
        device_id: "dev-1".to_string(),
        card_bin: "411111".to_string(),
        amount: 120.0,
        currency: "MXN".to_string(),
        ip_address: "189.1.2.3".to_string(),
        latitude: 19.43,
        longitude: -99.13,
        transaction_type: TransactionType::TopUp,
        recipient_id: None,
        session_id: Uuid::new_v4(),
        timestamp: Utc::now(),
        user_agent: "Mozilla/5.0 (Linux; Android 13) AppleWebKit/537.36".to_string(),
        sdk_version: "1.0.0".to_string(),
        device: DeviceContext {
            os: DeviceOs::Android,
            model: "Pixel 7".to_string(),
            rooted: false,
            emulator: false,
            network_type: NetworkType::Wifi,
            battery_level: 80,
        },
        history: UserHistoryHints {
            account_age_days: 400,
            avg_monthly_amount: 1000.0,
            tx_count_30d: 500,
            failed_tx_7d: 0,
            time_since_last_tx_minutes: None,
            kyc_level: KycLevel::Full,
            session_duration_seconds: 180,
            form_fill_time_seconds: 25,
            card_last4: "1111".to_string(),
            is_international_card: false,
            merchant_category: None,
        },
    }
}

fn base_enrichment() -> EnrichmentContext {
    EnrichmentContext {
        ip_country: "MX".to_string(),
        bin_country: "MX".to_string(),
        is_vpn: false,
        ip_city: None,
        card_type: None,
        card_brand: None,
    }
}

/// S1. Clean approve: known-country, full-KYC, high-history user with a
/// modest top-up is approved with a low score and no alarming codes.
#[tokio::test]
async fn s1_clean_approve() {
    let cache: Arc<dyn CounterCache> = Arc::new(MemoryCache::new());
    // Establish MX as a known country for this user before the scored request.
    let req = EnrichedRequest::new(base_request(), base_enrichment());
    let warmup = orchestrator(Arc::clone(&cache));
    warmup.evaluate(req.clone()).await;

    let mut second = base_request();
    second.user_id = req.request.user_id;
    second.timestamp = Utc::now() + ChronoDuration::hours(1);
    let evaluation = orchestrator(cache)
        .evaluate(EnrichedRequest::new(second, base_enrichment()))
        .await;

    assert_eq!(evaluation.action, ActionDecision::Approve);
    assert!(evaluation.risk_score <= 30);
    assert!(evaluation
        .reason_codes
        .iter()
        .any(|c| c.starts_with("KNOWN_COUNTRY_REDUCTION_")));
    assert!(!evaluation
        .reason_codes
        .iter()
        .any(|c| c.ends_with("_HIGH") || c.ends_with("_DETECTED")));
}

/// S2. A device pre-seeded in the blacklist short-circuits to a permanent
/// block regardless of every other signal.
#[tokio::test]
async fn s2_blacklisted_device() {
    let cache: Arc<dyn CounterCache> = Arc::new(MemoryCache::new());
    blacklist::add(&*cache, "device", "D-EVIL", "confirmed_fraud")
        .await
        .unwrap();

    let mut request = base_request();
    request.device_id = "D-EVIL".to_string();
    let evaluation = orchestrator(cache)
        .evaluate(EnrichedRequest::new(request, base_enrichment()))
        .await;

    assert_eq!(evaluation.action, ActionDecision::BlockPerm);
    assert_eq!(evaluation.risk_score, 100);
    assert_eq!(evaluation.reason_codes, vec!["BLACKLIST_DEVICE_HIT"]);
    assert!(!evaluation.signature.is_empty());
}

/// S3. A GPS/IP jump that's physically impossible within the elapsed time
/// forces the impossible-travel override floor.
#[tokio::test]
async fn s3_impossible_travel() {
    let cache: Arc<dyn CounterCache> = Arc::new(MemoryCache::new());
    let user_id = Uuid::new_v4();
    let t0 = Utc::now() - ChronoDuration::hours(10);

    let mut first = base_request();
    first.user_id = user_id;
    first.latitude = 19.43;
    first.longitude = -99.13;
    first.timestamp = t0;
    orchestrator(Arc::clone(&cache))
        .evaluate(EnrichedRequest::new(first, base_enrichment()))
        .await;

    let mut second = base_request();
    second.user_id = user_id;
    second.latitude = 55.75;
    second.longitude = 37.62;
    second.timestamp = t0 + ChronoDuration::minutes(30);
    second.amount = 80.0;
    second.currency = "USD".to_string();
    let mut enrichment = base_enrichment();
    enrichment.ip_country = "RU".to_string();
    enrichment.bin_country = "RU".to_string();

    let evaluation = orchestrator(cache)
        .evaluate(EnrichedRequest::new(second, enrichment))
        .await;

    assert!(evaluation
        .reason_codes
        .contains(&"IMPOSSIBLE_TRAVEL_DETECTED".to_string()));
    assert!(evaluation
        .reason_codes
        .contains(&"OVERRIDE_IMPOSSIBLE_TRAVEL".to_string()));
    assert!(evaluation.risk_score >= 76);
    assert!(matches!(
        evaluation.action,
        ActionDecision::BlockReview | ActionDecision::BlockPerm
    ));
}

/// S4. Three micro-amount probes on the same device/BIN pair followed by a
/// large charge is the classic card-testing shape.
#[tokio::test]
async fn s4_card_testing_pattern() {
    let cache: Arc<dyn CounterCache> = Arc::new(MemoryCache::new());
    for _ in 0..3 {
        card_testing::evaluate(&*cache, "dev-probe", "411111", 2.0)
            .await
            .unwrap();
    }

    let mut request = base_request();
    request.device_id = "dev-probe".to_string();
    request.amount = 499.0;
    let evaluation = orchestrator(cache)
        .evaluate(EnrichedRequest::new(request, base_enrichment()))
        .await;

    assert!(evaluation
        .reason_codes
        .iter()
        .any(|c| c.starts_with("CARD_TESTING_PATTERN_")));
    assert!(matches!(
        evaluation.action,
        ActionDecision::ChallengeHard | ActionDecision::BlockReview | ActionDecision::BlockPerm
    ));
}

/// S5. A P2P send that would push the sender's projected daily volume past
/// the smurfing floor is flagged even though the single transfer is small.
#[tokio::test]
async fn s5_smurfing() {
    let cache: Arc<dyn CounterCache> = Arc::new(MemoryCache::new());
    let sender = Uuid::new_v4();
    let recipient = Uuid::new_v4();
    cache
        .set_ex(&keys::p2p_daily_vol(&sender.to_string()), "8400", Duration::from_secs(86400))
        .await
        .unwrap();

    let mut request = base_request();
    request.user_id = sender;
    request.transaction_type = TransactionType::P2pSend;
    request.recipient_id = Some(recipient);
    request.amount = 800.0;

    let evaluation = orchestrator(cache)
        .evaluate(EnrichedRequest::new(request, base_enrichment()))
        .await;

    assert!(evaluation
        .reason_codes
        .iter()
        .any(|c| c.starts_with("SMURFING_DAILY_VOL_")));
}

/// S6. A second request on the same session ID under a different user ID
/// is a hijack, not a replay, and blocks permanently.
#[tokio::test]
async fn s6_session_hijack() {
    let cache: Arc<dyn CounterCache> = Arc::new(MemoryCache::new());
    let session_id = Uuid::new_v4();

    let mut first = base_request();
    first.session_id = session_id;
    let first_eval = orchestrator(Arc::clone(&cache))
        .evaluate(EnrichedRequest::new(first, base_enrichment()))
        .await;
    assert_eq!(first_eval.action, ActionDecision::Approve);

    let mut second = base_request();
    second.session_id = session_id;
    second.user_id = Uuid::new_v4();
    let second_eval = orchestrator(cache)
        .evaluate(EnrichedRequest::new(second, base_enrichment()))
        .await;

    assert_eq!(second_eval.action, ActionDecision::BlockPerm);
    assert_eq!(second_eval.risk_score, 100);
    assert!(second_eval
        .reason_codes
        .contains(&"SESSION_HIJACK_DETECTED".to_string()));
}
