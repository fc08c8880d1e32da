pub mod evaluation;
pub mod request;

pub use evaluation::{BreakdownEntry, Evaluation};
pub use request::{
    ActionDecision, ChallengeType, DeviceOs, EnrichedRequest, EnrichmentContext, KycLevel,
    NetworkType, TransactionRequest, TransactionType,
};
