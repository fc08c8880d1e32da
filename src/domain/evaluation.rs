use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::request::{ActionDecision, ChallengeType};

/// One line of the analyst-facing score breakdown. `points` is the code's
/// *actual* contribution to the final score for this specific evaluation,
/// not its catalog reference weight.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BreakdownEntry {
    pub code: String,
    pub points: i32,
    pub category: String,
    pub description: String,
}

/// The engine's signed verdict for one transaction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Evaluation {
    pub transaction_id: Uuid,
    pub action: ActionDecision,
    pub risk_score: u8,
    pub challenge_type: Option<ChallengeType>,
    pub reason_codes: Vec<String>,
    pub score_breakdown: Vec<BreakdownEntry>,
    pub user_message: String,
    pub response_time_ms: u64,
    pub signature: String,
}

pub const DECLINE_MESSAGE: &str = "Operation declined by security policies";
pub const APPROVE_MESSAGE: &str = "Transaction approved";
pub const CHALLENGE_MESSAGE: &str = "Additional verification required to continue";
