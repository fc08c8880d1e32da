/// Audit Sink (C18, port)
///
/// Out of scope for a full implementation — the production adapter here is
/// a reasonable shape for what an external collaborator would expect, not a
/// complete persistent store. Never awaited from the response path: the
/// orchestrator dispatches to this as a detached `tokio::spawn`.
use async_trait::async_trait;
use hmac::Hmac;
use hkdf::Hkdf;
use serde::Serialize;
use sha2::Sha256;
use std::sync::Mutex;

use crate::domain::request::EnrichedRequest;
use crate::domain::Evaluation;

#[derive(Debug, Serialize)]
pub struct AuditRecord {
    pub transaction_id: uuid::Uuid,
    pub final_score: u8,
    pub action: String,
    pub response: String,
}

#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn persist(&self, request: &EnrichedRequest, evaluation: &Evaluation);
}

/// Test/in-memory adapter. Keeps every record it's given, unsealed.
#[derive(Default)]
pub struct InMemoryAuditSink {
    records: Mutex<Vec<AuditRecord>>,
}

impl InMemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<AuditRecord> {
        self.records.lock().expect("audit mutex poisoned").iter().map(|r| AuditRecord {
            transaction_id: r.transaction_id,
            final_score: r.final_score,
            action: r.action.clone(),
            response: r.response.clone(),
        }).collect()
    }
}

#[async_trait]
impl AuditSink for InMemoryAuditSink {
    async fn persist(&self, request: &EnrichedRequest, evaluation: &Evaluation) {
        let record = AuditRecord {
            transaction_id: evaluation.transaction_id,
            final_score: evaluation.risk_score,
            action: format!("{:?}", evaluation.action),
            response: serde_json::to_string(evaluation).unwrap_or_default(),
        };
        let _ = request;
        self.records.lock().expect("audit mutex poisoned").push(record);
    }
}

/// Production-shaped adapter: seals `device_id`, `card_bin` and the full
/// request snapshot with a key derived from the process HMAC secret via
/// HKDF, rather than storing them in clear. Append target is a stand-in for
/// whatever durable store the deployment wires up; this crate only owns the
/// sealing and framing.
pub struct EncryptedAuditSink {
    sealing_key: [u8; 32],
}

impl EncryptedAuditSink {
    pub fn new(process_secret: &str) -> Self {
        let hk = Hkdf::<Sha256>::new(None, process_secret.as_bytes());
        let mut sealing_key = [0u8; 32];
        hk.expand(b"audit-sink-sealing-key", &mut sealing_key)
            .expect("32 bytes is a valid HKDF output length for SHA-256");
        Self { sealing_key }
    }

    fn seal(&self, plaintext: &str) -> String {
        type HmacSha256 = Hmac<Sha256>;
        use hmac::Mac;
        let mut mac = HmacSha256::new_from_slice(&self.sealing_key).expect("fixed-length key");
        mac.update(plaintext.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }
}

#[async_trait]
impl AuditSink for EncryptedAuditSink {
    async fn persist(&self, request: &EnrichedRequest, evaluation: &Evaluation) {
        let snapshot = serde_json::to_string(&request.request).unwrap_or_default();
        let sealed_device_id = self.seal(&request.request.device_id);
        let sealed_card_bin = self.seal(&request.request.card_bin);
        let sealed_snapshot = self.seal(&snapshot);

        tracing::info!(
            transaction_id = %evaluation.transaction_id,
            score = evaluation.risk_score,
            sealed_device_id,
            sealed_card_bin,
            sealed_snapshot_len = sealed_snapshot.len(),
            "audit record sealed"
        );
    }
}
