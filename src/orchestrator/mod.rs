/// Orchestrator (C16)
///
/// The single place that owns request/response scope. Every detector is a
/// side-effect-free read (aside from the counters each one mutates as part
/// of its own algorithm); only this module decides the action, and only the
/// post-dispatch writers below mutate anything after that decision is made.
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::instrument;
use uuid::Uuid;

use crate::audit::AuditSink;
use crate::cache::CounterCache;
use crate::catalog::{build_breakdown, dedup_preserve_order, distribute_to_contributions};
use crate::core::config::EngineConfig;
use crate::core::errors::{EngineError, EngineResult};
use crate::detectors::{
    behavior, blacklist, card_testing, device, external_reputation, fallback, geo,
    gps_ip_mismatch, ip_history, p2p, rate_limit, session_guard, time_pattern, trust, velocity,
    DetectorOutcome,
};
use crate::domain::evaluation::{APPROVE_MESSAGE, CHALLENGE_MESSAGE, DECLINE_MESSAGE};
use crate::domain::request::{ActionDecision, ChallengeType, EnrichedRequest, TransactionType};
use crate::domain::Evaluation;

pub struct Orchestrator {
    cache: Arc<dyn CounterCache>,
    cfg: EngineConfig,
    reputation: Arc<dyn external_reputation::ReputationProvider>,
    audit: Arc<dyn AuditSink>,
}

impl Orchestrator {
    pub fn new(
        cache: Arc<dyn CounterCache>,
        cfg: EngineConfig,
        reputation: Arc<dyn external_reputation::ReputationProvider>,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        Self {
            cache,
            cfg,
            reputation,
            audit,
        }
    }

    #[instrument(skip_all, fields(transaction_type = ?req.request.transaction_type))]
    pub async fn evaluate(&self, req: EnrichedRequest) -> Evaluation {
        let start = Instant::now();
        let transaction_id = Uuid::new_v4();

        let blacklist_hit = blacklist::check(&*self.cache, &req).await;
        if let Some(hit) = blacklist_hit.hit {
            return self
                .finalize(
                    transaction_id,
                    start,
                    &req,
                    100.0,
                    ActionDecision::BlockPerm,
                    None,
                    vec![hit.reason_code.clone()],
                    distribute_to_contributions(100, &[hit.reason_code]),
                )
                .await;
        }

        let uid = req.request.user_id.to_string();
        let did = req.request.device_id.clone();
        let bin = req.request.card_bin.clone();
        let ip = req.request.ip_address.clone();
        let sid = req.request.session_id.to_string();
        let amount = req.request.amount;
        let ip_country = req.enrichment.ip_country.clone();
        let now = req.request.timestamp;

        let rate_res = rate_limit::evaluate(&*self.cache, &uid, &ip)
            .await
            .unwrap_or_default();

        let deadline = Duration::from_millis(self.cfg.fan_out_deadline_ms);
        let ext_timeout = Duration::from_millis(self.cfg.external_reputation_timeout_ms);
        let is_p2p = req.request.transaction_type == TransactionType::P2pSend
            && req.request.recipient_id.is_some();

        let (
            velocity_out,
            device_out,
            geo_out,
            behavior_out,
            trust_out,
            ip_history_out,
            session_out,
            card_out,
            time_out,
            p2p_out,
            external_score,
        ) = tokio::join!(
            with_deadline(velocity::evaluate(&*self.cache, &uid, &bin, amount), deadline, "velocity"),
            with_deadline(device::evaluate(&*self.cache, &req), deadline, "device"),
            with_deadline(geo::evaluate(&*self.cache, &self.cfg, &req), deadline, "geo"),
            with_deadline(behavior::evaluate(&*self.cache, &req), deadline, "behavior"),
            with_deadline(trust::evaluate(&*self.cache, &req), deadline, "trust"),
            with_deadline(ip_history::evaluate(&*self.cache, &uid, &ip, &ip_country, now), deadline, "ip_history"),
            with_deadline(session_guard::evaluate(&*self.cache, &sid, &uid), deadline, "session_guard"),
            with_deadline(card_testing::evaluate(&*self.cache, &did, &bin, amount), deadline, "card_testing"),
            with_deadline(time_pattern::evaluate(&*self.cache, &uid, now), deadline, "time_pattern"),
            async {
                if is_p2p {
                    Some(with_deadline(p2p::evaluate(&*self.cache, &req), deadline, "p2p").await)
                } else {
                    None
                }
            },
            external_reputation::evaluate(&*self.reputation, &*self.cache, &uid, &did, &ip, ext_timeout),
        );

        let velocity_res = velocity_out.ok_or(fallback_velocity());
        let (velocity_res, _) = velocity_res;
        let (device_res, _) = device_out.ok_or(fallback_device());
        let (geo_res, _) = geo_out.ok_or(fallback_geo());
        let (behavior_res, _) = behavior_out.ok_or(fallback_behavior());
        let (trust_res, _) = trust_out.ok_or(Default::default());
        let (ip_history_res, _) = ip_history_out.ok_or(Default::default());
        let (session_res, _) = session_out.ok_or(Default::default());
        let (card_res, _) = card_out.ok_or(Default::default());
        let (time_res, _) = time_out.ok_or(Default::default());
        let p2p_res = p2p_out.map(|o| o.ok_or(Default::default()).0);
        let gps_ip_res = gps_ip_mismatch::evaluate(req.request.latitude, req.request.longitude, &ip_country);

        let mut contributions: Vec<(String, i32)> = Vec::new();
        let mut all_codes: Vec<String> = Vec::new();

        let w = self.cfg.weights;
        let score_w = velocity_res.score * w.velocity
            + device_res.score * w.device
            + geo_res.score * w.geo
            + behavior_res.score * w.behavior
            + external_score * w.external;

        let weighted_codes: Vec<String> = velocity_res
            .reason_codes
            .iter()
            .chain(device_res.reason_codes.iter())
            .chain(geo_res.reason_codes.iter())
            .chain(behavior_res.reason_codes.iter())
            .cloned()
            .collect();
        contributions.extend(distribute_to_contributions(score_w.round() as i32, &weighted_codes));
        all_codes.extend(weighted_codes);

        let mut score = score_w;

        if let Some(ref p2p_res) = p2p_res {
            let p2p_total = 0.30 * p2p_res.score;
            score += p2p_total;
            contributions.extend(distribute_to_contributions(
                p2p_total.round() as i32,
                &p2p_res.reason_codes,
            ));
            all_codes.extend(p2p_res.reason_codes.clone());
        }

        score += trust_res.score;
        if let Some(code) = trust_res.reason_codes.first() {
            contributions.push((code.clone(), trust_res.score.round() as i32));
            all_codes.push(code.clone());
        }
        score = score.clamp(0.0, 100.0);

        let h = &req.request.history;
        if h.account_age_days < 30 {
            apply(&mut score, &mut contributions, &mut all_codes, "ACCOUNT_AGE_BRACKET_LOW", 15.0);
        }
        if h.avg_monthly_amount > 0.0 && amount > h.avg_monthly_amount {
            apply(&mut score, &mut contributions, &mut all_codes, "AMOUNT_ABOVE_HISTORICAL_AVG", 15.0);
        }
        if h.failed_tx_7d >= 3 {
            apply(&mut score, &mut contributions, &mut all_codes, "FAILED_TX_RECENT_HIGH", 15.0);
        }
        if matches!(h.kyc_level, crate::domain::request::KycLevel::None) && amount >= 500.0 {
            apply(&mut score, &mut contributions, &mut all_codes, "NO_KYC_HIGH_AMOUNT", 25.0);
        }
        if h.is_international_card {
            apply(&mut score, &mut contributions, &mut all_codes, "INTERNATIONAL_CARD_USED", 10.0);
        }

        if !rate_res.reason_codes.is_empty() {
            let before = score;
            score = (score + rate_res.score).clamp(0.0, 100.0);
            let actual = (score - before).round() as i32;
            contributions.extend(distribute_to_contributions(actual, &rate_res.reason_codes));
            all_codes.extend(rate_res.reason_codes.clone());
        }

        let fft = h.form_fill_time_seconds;
        if fft < 3 {
            apply(&mut score, &mut contributions, &mut all_codes, "FORM_FILL_TOO_FAST", 30.0);
        } else if fft <= 8 {
            apply(&mut score, &mut contributions, &mut all_codes, "FORM_FILL_FAST", 15.0);
        } else if fft > 900 {
            apply(&mut score, &mut contributions, &mut all_codes, "FORM_FILL_SUSPICIOUSLY_SLOW", 10.0);
        }

        for code in &gps_ip_res.reason_codes {
            apply(&mut score, &mut contributions, &mut all_codes, code, gps_ip_res.score);
        }

        if ip_history_res.override_block {
            override_to(&mut score, &mut contributions, &mut all_codes, "IMPOSSIBLE_IP_JUMP_5MIN", 100.0);
        } else {
            for code in &ip_history_res.reason_codes {
                apply(&mut score, &mut contributions, &mut all_codes, code, ip_history_res.score);
            }
        }

        if session_res.override_block {
            override_to(&mut score, &mut contributions, &mut all_codes, "SESSION_HIJACK_DETECTED", 100.0);
        } else if !session_res.reason_codes.is_empty() {
            apply(&mut score, &mut contributions, &mut all_codes, "SESSION_REPLAY_ATTACK", session_res.score);
        }

        for code in &card_res.reason_codes {
            let points = crate::catalog::Catalog::lookup(code).map(|e| e.reference_points as f64).unwrap_or(0.0);
            apply(&mut score, &mut contributions, &mut all_codes, code, points);
        }

        if let Some(code) = time_res.reason_codes.first() {
            apply(&mut score, &mut contributions, &mut all_codes, code, time_res.score * w.behavior);
        }

        if device_res.score >= 80.0 {
            all_codes.push("DEVICE_TIER_EMULATOR_ROOT".to_string());
            contributions.push(("DEVICE_TIER_EMULATOR_ROOT".to_string(), 0));
        } else if device_res.score >= 60.0 {
            all_codes.push("DEVICE_TIER_SUSPICIOUS".to_string());
            contributions.push(("DEVICE_TIER_SUSPICIOUS".to_string(), 0));
        }
        if velocity_res.score >= 40.0 {
            all_codes.push("VELOCITY_TIER_HIGH".to_string());
            contributions.push(("VELOCITY_TIER_HIGH".to_string(), 0));
        }

        if geo_res.impossible_travel_detected && score < 76.0 {
            override_to(&mut score, &mut contributions, &mut all_codes, "OVERRIDE_IMPOSSIBLE_TRAVEL", 76.0);
        }
        if let Some(ref p2p_res) = p2p_res {
            if p2p_res.mule_pattern && score < 91.0 {
                override_to(&mut score, &mut contributions, &mut all_codes, "OVERRIDE_CONFIRMED_MULE", 91.0);
            }
        }

        let risk_score = score.round().clamp(0.0, 100.0) as u8;
        let (mut action, mut challenge) = decide(risk_score);
        if let Some(ref p2p_res) = p2p_res {
            if p2p_res.preventive_hold && risk_score <= 30 && action == ActionDecision::Approve {
                action = ActionDecision::ChallengeHard;
                challenge = Some(ChallengeType::ThreeDs);
            }
        }

        let reason_codes = dedup_preserve_order(all_codes);

        self.dispatch_post_processing(&req, &p2p_res);

        self.finalize(
            transaction_id,
            start,
            &req,
            risk_score as f64,
            action,
            challenge,
            reason_codes,
            contributions,
        )
        .await
    }

    async fn finalize(
        &self,
        transaction_id: Uuid,
        start: Instant,
        req: &EnrichedRequest,
        risk_score_f: f64,
        action: ActionDecision,
        challenge_type: Option<ChallengeType>,
        reason_codes: Vec<String>,
        contributions: Vec<(String, i32)>,
    ) -> Evaluation {
        let risk_score = risk_score_f.round().clamp(0.0, 100.0) as u8;
        let score_breakdown = build_breakdown(&contributions);
        let user_message = match action {
            ActionDecision::Approve => APPROVE_MESSAGE,
            ActionDecision::ChallengeSoft | ActionDecision::ChallengeHard => CHALLENGE_MESSAGE,
            ActionDecision::BlockReview | ActionDecision::BlockPerm => DECLINE_MESSAGE,
        }
        .to_string();
        let signature = crate::signing::sign(&self.cfg.hmac_secret, transaction_id, action, risk_score);

        let evaluation = Evaluation {
            transaction_id,
            action,
            risk_score,
            challenge_type,
            reason_codes,
            score_breakdown,
            user_message,
            response_time_ms: start.elapsed().as_millis() as u64,
            signature,
        };

        let audit = Arc::clone(&self.audit);
        let req_clone = req.clone();
        let eval_clone = evaluation.clone();
        tokio::spawn(async move {
            audit.persist(&req_clone, &eval_clone).await;
        });

        evaluation
    }

    fn dispatch_post_processing(&self, req: &EnrichedRequest, p2p_res: &Option<p2p::P2pResult>) {
        let cache = Arc::clone(&self.cache);
        let recipient = req.request.recipient_id;
        let uid = req.request.user_id;
        let p2p_score = p2p_res.as_ref().map(|r| r.score);
        tokio::spawn(async move {
            if let (Some(recipient), Some(score)) = (recipient, p2p_score) {
                let _ = p2p::update_accum_risk(&*cache, &recipient.to_string(), score).await;
                let _ = cache
                    .incr(
                        &crate::storage::redis_cache::keys::behavior_recipient_count(
                            &uid.to_string(),
                            &recipient.to_string(),
                        ),
                        Duration::from_secs(365 * 24 * 3600),
                    )
                    .await;
            }
        });
    }
}

async fn with_deadline<T>(
    fut: impl std::future::Future<Output = EngineResult<T>>,
    deadline: Duration,
    name: &'static str,
) -> DetectorOutcome<T> {
    match tokio::time::timeout(deadline, fut).await {
        Ok(Ok(v)) => DetectorOutcome::Ok(v),
        Ok(Err(e)) => DetectorOutcome::Failed(e),
        Err(_) => DetectorOutcome::Failed(EngineError::Timeout(name)),
    }
}

fn fallback_velocity() -> velocity::VelocityResult {
    velocity::VelocityResult {
        score: fallback::VELOCITY,
        reason_codes: vec![],
        count_10m: 0,
        daily_total: 0.0,
        distinct_bins: 0,
    }
}

fn fallback_device() -> device::DeviceResult {
    device::DeviceResult {
        score: fallback::DEVICE,
        reason_codes: vec![],
    }
}

fn fallback_geo() -> geo::GeoResult {
    geo::GeoResult {
        score: fallback::GEO,
        reason_codes: vec![],
        impossible_travel_detected: false,
    }
}

fn fallback_behavior() -> behavior::BehaviorResult {
    behavior::BehaviorResult {
        score: fallback::BEHAVIOR,
        reason_codes: vec![],
        learning_period: false,
    }
}

fn apply(score: &mut f64, contributions: &mut Vec<(String, i32)>, all_codes: &mut Vec<String>, code: &str, delta: f64) {
    let before = *score;
    *score = (*score + delta).clamp(0.0, 100.0);
    let actual = (*score - before).round() as i32;
    contributions.push((code.to_string(), actual));
    all_codes.push(code.to_string());
}

fn override_to(score: &mut f64, contributions: &mut Vec<(String, i32)>, all_codes: &mut Vec<String>, code: &str, floor: f64) {
    let before = *score;
    *score = floor.max(*score);
    let delta = (*score - before).round() as i32;
    contributions.push((code.to_string(), delta));
    all_codes.push(code.to_string());
}

fn decide(risk_score: u8) -> (ActionDecision, Option<ChallengeType>) {
    match risk_score {
        0..=30 => (ActionDecision::Approve, None),
        31..=60 => (ActionDecision::ChallengeSoft, Some(ChallengeType::SmsOtp)),
        61..=75 => (ActionDecision::ChallengeHard, Some(ChallengeType::ThreeDs)),
        76..=90 => (ActionDecision::BlockReview, None),
        _ => (ActionDecision::BlockPerm, None),
    }
}
