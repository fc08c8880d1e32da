//! Property-based checks of the universal invariants that don't need
//! access to orchestrator-private helpers (see `orchestrator::tests` for
//! the decision-mapping monotonicity property, which does).
use std::sync::Arc;

use chrono::Utc;
use proptest::prelude::*;
use uuid::Uuid;

use wallet_risk_engine::audit::InMemoryAuditSink;
use wallet_risk_engine::cache::{CounterCache, MemoryCache};
use wallet_risk_engine::core::config::EngineConfig;
use wallet_risk_engine::detectors::blacklist;
use wallet_risk_engine::detectors::external_reputation::UnavailableProvider;
use wallet_risk_engine::domain::request::*;
use wallet_risk_engine::orchestrator::Orchestrator;
use wallet_risk_engine::signing;

fn cfg() -> EngineConfig {
    EngineConfig {
        bind_addr: "127.0.0.1:0".to_string(),
        redis_url: String::new(),
        hmac_secret: "property-secret".to_string(),
        weights: Default::default(),
        fan_out_deadline_ms: 200,
        external_reputation_timeout_ms: 80,
        cache_op_timeout_ms: 500,
        fatf_high_risk_countries: vec!["RU".to_string()],
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

fn request_with(amount: f64, account_age_days: i32, form_fill_time_seconds: i32, rooted: bool) -> EnrichedRequest {
    EnrichedRequest::new(
        TransactionRequest {
            user_id: Uuid::new_v4(),
            device_id: format!("dev-{}", Uuid::new_v4()),
            card_bin: "411111".to_string(),
            amount,
            currency: "MXN".to_string(),
            ip_address: "189.1.2.3".to_string(),
            latitude: 19.43,
            longitude: -99.13,
            transaction_type: TransactionType::TopUp,
            recipient_id: None,
            session_id: Uuid::new_v4(),
            timestamp: Utc::now(),
            user_agent: "Mozilla/5.0 (Linux; Android 13)".to_string(),
            sdk_version: "1.0.0".to_string(),
            device: DeviceContext {
                os: DeviceOs::Android,
                model: "Pixel".to_string(),
                rooted,
                emulator: false,
                network_type: NetworkType::Wifi,
                battery_level: 50,
            },
            history: UserHistoryHints {
                account_age_days,
                avg_monthly_amount: 1000.0,
                tx_count_30d: 10,
                failed_tx_7d: 0,
                time_since_last_tx_minutes: None,
                kyc_level: KycLevel::Full,
                session_duration_seconds: 120,
                form_fill_time_seconds,
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

proptest! {
    /// Invariant 1: the engine never emits a risk score outside [0, 100],
    /// across an arbitrary spread of amounts, account ages and fill times.
    #[test]
    fn risk_score_is_always_bounded(
        amount in 0.01f64..100_000.0,
        account_age_days in 0i32..10_000,
        form_fill_time_seconds in 0i32..3600,
        rooted in any::<bool>(),
    ) {
        let rt = tokio::runtime::Runtime::new().unwrap();
        let cache: Arc<dyn CounterCache> = Arc::new(MemoryCache::new());
        let evaluation = rt.block_on(
            orchestrator(cache).evaluate(request_with(amount, account_age_days, form_fill_time_seconds, rooted)),
        );
        prop_assert!(evaluation.risk_score <= 100);
    }

    /// Invariant 2: the signature is exactly the HMAC over (tx_id, action,
    /// score); it verifies under the issuing secret and never under another.
    #[test]
    fn signature_verifies_only_under_its_own_secret(
        risk_score in 0u8..=100,
        other_secret in "[a-zA-Z0-9]{1,32}",
    ) {
        let id = Uuid::new_v4();
        let sig = signing::sign("property-secret", id, ActionDecision::ChallengeSoft, risk_score);
        prop_assert!(signing::verify("property-secret", id, ActionDecision::ChallengeSoft, risk_score, &sig));
        if other_secret != "property-secret" {
            prop_assert!(!signing::verify(&other_secret, id, ActionDecision::ChallengeSoft, risk_score, &sig));
        }
    }
}

/// Invariant 4: a blacklisted device forces BLOCK_PERM and score 100 no
/// matter what the rest of the request looks like.
#[tokio::test]
async fn blacklist_short_circuit_dominates_arbitrary_inputs() {
    for (amount, account_age_days, form_fill_time_seconds, rooted) in [
        (1.0, 400, 20, false),
        (50_000.0, 0, 1, true),
        (0.5, 9_999, 3_000, false),
    ] {
        let cache: Arc<dyn CounterCache> = Arc::new(MemoryCache::new());
        let req = request_with(amount, account_age_days, form_fill_time_seconds, rooted);
        blacklist::add(&*cache, "device", &req.request.device_id, "confirmed_fraud")
            .await
            .unwrap();

        let evaluation = orchestrator(cache).evaluate(req).await;
        assert_eq!(evaluation.action, ActionDecision::BlockPerm);
        assert_eq!(evaluation.risk_score, 100);
    }
}
