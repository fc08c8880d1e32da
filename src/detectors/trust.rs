/// Trust Score (C7)
///
/// Unlike the other detectors this one only ever reduces the aggregate
/// score: a missing profile means "no trust signal available", not "treat
/// as suspicious", so cache failure yields a neutral zero rather than a
/// penalty.
///
/// The individual per-signal reductions collapse into a single
/// `TRUST_REDUCTION_{n}PTS` code rather than one code per signal. The source
/// emitted a separate code per condition, which meant the breakdown could
/// show five tiny trust line items competing for attention with the one or
/// two signals that actually explain a block decision; this re-expression
/// keeps the per-signal math internal and surfaces only the total (see
/// DESIGN.md).
use serde::{Deserialize, Serialize};

use crate::cache::CounterCache;
use crate::core::errors::EngineResult;
use crate::domain::request::{EnrichedRequest, KycLevel};
use crate::storage::redis_cache::keys;

const FLOOR: f64 = -25.0;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrustProfile {
    pub account_age_days: u32,
    pub kyc_level: KycLevel,
    pub mfa_active: bool,
    pub incident_free_months: u32,
    pub frequent_devices: Vec<String>,
    pub frequent_countries: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct TrustResult {
    pub score: f64,
    pub reason_codes: Vec<String>,
}

pub async fn evaluate(cache: &dyn CounterCache, req: &EnrichedRequest) -> EngineResult<TrustResult> {
    let r = &req.request;
    let uid = r.user_id.to_string();

    let raw = match cache.get(&keys::trust_profile(&uid)).await {
        Ok(v) => v,
        Err(_) => return Ok(TrustResult::default()),
    };
    let Some(profile) = raw.and_then(|r| serde_json::from_str::<TrustProfile>(&r).ok()) else {
        return Ok(TrustResult::default());
    };

    let mut score = 0.0;

    if profile.incident_free_months >= 6 {
        score -= 15.0;
    } else if profile.incident_free_months >= 2 {
        score -= 8.0;
    }

    match profile.kyc_level {
        KycLevel::Full => score -= 7.0,
        KycLevel::Basic => score -= 3.0,
        KycLevel::None => {}
    }

    if profile.mfa_active {
        score -= 5.0;
    }

    if profile.frequent_devices.iter().any(|d| d == &r.device_id) {
        score -= 5.0;
    }

    if profile
        .frequent_countries
        .iter()
        .any(|c| c == &req.enrichment.ip_country)
    {
        score -= 3.0;
    }

    score = score.max(FLOOR);

    let codes = if score < 0.0 {
        vec![format!("TRUST_REDUCTION_{}PTS", score.abs().round() as i64)]
    } else {
        Vec::new()
    };

    Ok(TrustResult {
        score,
        reason_codes: codes,
    })
}
