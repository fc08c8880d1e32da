pub mod behavior;
pub mod blacklist;
pub mod card_testing;
pub mod device;
pub mod external_reputation;
pub mod geo;
pub mod gps_ip_mismatch;
pub mod ip_history;
pub mod p2p;
pub mod rate_limit;
pub mod session_guard;
pub mod time_pattern;
pub mod trust;
pub mod velocity;

use crate::core::errors::EngineError;

/// A detector's outcome, tagged rather than relying on positional order in
/// a joined future list. A detector that misses the fan-out deadline is
/// represented the same way as one that errored: `Failed`.
#[derive(Debug, Clone)]
pub enum DetectorOutcome<T> {
    Ok(T),
    Failed(EngineError),
}

impl<T> DetectorOutcome<T> {
    pub fn ok_or(self, fallback: T) -> (T, bool) {
        match self {
            DetectorOutcome::Ok(v) => (v, true),
            DetectorOutcome::Failed(_) => (fallback, false),
        }
    }
}

/// Every detector's result for one evaluation, zipped by field identity.
/// `p2p` is `None` for non-P2P_SEND transactions rather than run and
/// discarded.
pub struct DetectorResults {
    pub velocity: DetectorOutcome<velocity::VelocityResult>,
    pub device: DetectorOutcome<device::DeviceResult>,
    pub geo: DetectorOutcome<geo::GeoResult>,
    pub behavior: DetectorOutcome<behavior::BehaviorResult>,
    pub trust: DetectorOutcome<trust::TrustResult>,
    pub external_reputation: DetectorOutcome<f64>,
    pub p2p: Option<DetectorOutcome<p2p::P2pResult>>,
    pub ip_history: DetectorOutcome<ip_history::IpHistoryResult>,
    pub gps_ip_mismatch: DetectorOutcome<gps_ip_mismatch::GpsIpMismatchResult>,
    pub session_guard: DetectorOutcome<session_guard::SessionGuardResult>,
    pub card_testing: DetectorOutcome<card_testing::CardTestingResult>,
    pub time_pattern: DetectorOutcome<time_pattern::TimePatternResult>,
}

/// Neutral-to-moderate fallback constants used when a detector errors or
/// misses the fan-out deadline (§7).
pub mod fallback {
    pub const DEVICE: f64 = 30.0;
    pub const EXTERNAL: f64 = 15.0;
    pub const VELOCITY: f64 = 20.0;
    pub const GEO: f64 = 20.0;
    pub const BEHAVIOR: f64 = 10.0;
    pub const TRUST: f64 = 0.0;
}

pub fn clamp_score(score: f64) -> f64 {
    score.clamp(0.0, 100.0)
}
