use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionType {
    TopUp,
    P2pSend,
    Withdrawal,
    Payment,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KycLevel {
    None,
    Basic,
    Full,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeviceOs {
    Android,
    Ios,
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NetworkType {
    Wifi,
    Cellular,
    Vpn,
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActionDecision {
    Approve,
    ChallengeSoft,
    ChallengeHard,
    BlockReview,
    BlockPerm,
}

/// The original carries four challenge variants (SMS_OTP, THREEDS, BIOMETRIC,
/// FACE_SCAN) but only the first two are ever reached by the decision table;
/// the other two are dead code left over from an abandoned face-match
/// integration. Carried here as two, not four (see DESIGN.md).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChallengeType {
    SmsOtp,
    ThreeDs,
}

/// Declared device context, reported by the client SDK and never verified
/// server-side beyond cross-checking it against the user-agent string.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceContext {
    pub os: DeviceOs,
    pub model: String,
    pub rooted: bool,
    pub emulator: bool,
    pub network_type: NetworkType,
    pub battery_level: u8,
}

/// Client-supplied history hints that accompany the transaction so detectors
/// don't need a synchronous round-trip to a profile store for every field.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserHistoryHints {
    pub account_age_days: u32,
    pub avg_monthly_amount: f64,
    pub tx_count_30d: u32,
    pub failed_tx_7d: u32,
    pub time_since_last_tx_minutes: Option<u64>,
    pub kyc_level: KycLevel,
    pub session_duration_seconds: u64,
    pub form_fill_time_seconds: u64,
    pub card_last4: String,
    pub is_international_card: bool,
    pub merchant_category: Option<String>,
}

/// The validated, immutable transaction as submitted. Nothing downstream of
/// the boundary ever mutates this; enrichment fields live on a separate
/// `EnrichmentContext` grafted on by construction, not by field assignment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionRequest {
    pub user_id: Uuid,
    pub device_id: String,
    pub card_bin: String,
    pub amount: f64,
    pub currency: String,
    pub ip_address: String,
    pub latitude: f64,
    pub longitude: f64,
    pub transaction_type: TransactionType,
    pub recipient_id: Option<Uuid>,
    pub session_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub user_agent: String,
    pub sdk_version: String,
    pub device: DeviceContext,
    pub history: UserHistoryHints,
}

/// Fields resolved by the enrichment stage (GeoIP/BIN lookups, VPN
/// detection) before the core ever sees the request. Re-expressed as an
/// explicit value rather than grafted onto the request object.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrichmentContext {
    pub ip_country: String,
    pub bin_country: String,
    pub is_vpn: bool,
    pub ip_city: Option<String>,
    pub card_type: Option<String>,
    pub card_brand: Option<String>,
}

/// `TransactionRequest` plus its `EnrichmentContext`, constructed once by the
/// boundary and passed to the core by value. Never mutated afterward.
#[derive(Debug, Clone)]
pub struct EnrichedRequest {
    pub request: TransactionRequest,
    pub enrichment: EnrichmentContext,
}

impl EnrichedRequest {
    pub fn new(request: TransactionRequest, enrichment: EnrichmentContext) -> Self {
        Self { request, enrichment }
    }
}
