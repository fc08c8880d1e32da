/// Verdict signing.
///
/// Signs only the fields a verifier actually needs to trust: the
/// transaction id, the action and the risk score. The breakdown and
/// message are explanatory, not part of the contract the signature backs.
use hmac::{Hmac, Mac};
use serde_json::{Map, Value};
use sha2::Sha256;
use uuid::Uuid;

use crate::domain::request::ActionDecision;

type HmacSha256 = Hmac<Sha256>;

/// `serde_json::Map` is BTreeMap-backed unless the `preserve_order` feature
/// is enabled, which this crate does not enable, so the object below always
/// serializes with its keys in sorted order.
fn canonical_payload(transaction_id: Uuid, action: ActionDecision, risk_score: u8) -> String {
    let mut map = Map::new();
    map.insert(
        "transaction_id".to_string(),
        Value::String(transaction_id.to_string()),
    );
    map.insert(
        "action".to_string(),
        Value::String(serde_json::to_value(action).unwrap().as_str().unwrap().to_string()),
    );
    map.insert("risk_score".to_string(), Value::Number(risk_score.into()));
    serde_json::to_string(&Value::Object(map)).expect("canonical payload always serializes")
}

pub fn sign(secret: &str, transaction_id: Uuid, action: ActionDecision, risk_score: u8) -> String {
    let payload = canonical_payload(transaction_id, action, risk_score);
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts any key length");
    mac.update(payload.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

pub fn verify(secret: &str, transaction_id: Uuid, action: ActionDecision, risk_score: u8, signature: &str) -> bool {
    sign(secret, transaction_id, action, risk_score) == signature
}
