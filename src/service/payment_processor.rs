// service/payment_processor.rs
//
// Boundary to the external payment processor. Outbound calls carry an
// Idempotency-Key derived from the hold id and the action name, so a retry
// after a timeout can never double-charge or double-pay. Inbound webhooks
// are signature-checked here and normalized into internal events; dedup
// happens against the processor_events inbox table.
use hmac::{Hmac, Mac};
use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::Sha512;
use subtle::ConstantTimeEq;
use uuid::Uuid;

use crate::{config::Config, service::error::ServiceError};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    ReleaseSucceeded,
    RefundSucceeded,
    HoldFailed,
    Unknown,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::ReleaseSucceeded => "release_succeeded",
            EventKind::RefundSucceeded => "refund_succeeded",
            EventKind::HoldFailed => "hold_failed",
            EventKind::Unknown => "unknown",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NormalizedEvent {
    pub event_id: String,
    pub processor_reference: String,
    pub kind: EventKind,
}

#[derive(Debug, Clone)]
pub struct PaymentProcessorService {
    client: reqwest::Client,
    base_url: String,
    secret_key: String,
    webhook_secret: String,
}

impl PaymentProcessorService {
    pub fn new(config: &Config) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: config.processor_base_url.clone(),
            secret_key: config.processor_secret_key.clone(),
            webhook_secret: config.processor_webhook_secret.clone(),
        }
    }

    /// Key a retried call to the same outcome as the first attempt.
    pub fn idempotency_key(hold_id: Uuid, action: &str) -> String {
        format!("{}:{}", hold_id, action)
    }

    /// Reference generated for a new hold, recorded on the escrow row and
    /// unique-indexed there as a second line of defense against double
    /// capture.
    pub fn new_hold_reference(hold_id: Uuid) -> String {
        let suffix: u32 = rand::thread_rng().gen_range(100_000..1_000_000);
        format!("hold_{}_{}", hold_id.simple(), suffix)
    }

    /// Place a hold on the payer's funds. Returns the processor's reference
    /// for the hold.
    pub async fn hold_funds(
        &self,
        hold_id: Uuid,
        amount_cents: i64,
        payer_ref: Uuid,
    ) -> Result<String, ServiceError> {
        let reference = Self::new_hold_reference(hold_id);
        let payload = serde_json::json!({
            "amount": amount_cents,
            "currency": "USD",
            "payer": payer_ref,
            "reference": reference,
        });

        let response = self
            .client
            .post(format!("{}/holds", self.base_url))
            .header("Authorization", format!("Bearer {}", self.secret_key))
            .header("Idempotency-Key", Self::idempotency_key(hold_id, "hold"))
            .json(&payload)
            .send()
            .await
            .map_err(|e| ServiceError::CaptureFailed(e.to_string()))?;

        let body: Value = response
            .json()
            .await
            .map_err(|e| ServiceError::CaptureFailed(e.to_string()))?;

        if body["status"].as_str() == Some("held") {
            let reference = body["data"]["reference"]
                .as_str()
                .unwrap_or(&reference)
                .to_string();
            Ok(reference)
        } else {
            let message = body["message"].as_str().unwrap_or("hold was declined");
            Err(ServiceError::CaptureFailed(message.to_string()))
        }
    }

    /// Split a held amount into the platform fee and the contractor payout
    /// and disburse both sides.
    pub async fn release_split(
        &self,
        hold_id: Uuid,
        processor_reference: &str,
        fee_cents: i64,
        payout_cents: i64,
        payee_ref: Uuid,
    ) -> Result<(), ServiceError> {
        let payload = serde_json::json!({
            "reference": processor_reference,
            "platform_fee": fee_cents,
            "payout": payout_cents,
            "payee": payee_ref,
        });

        let response = self
            .client
            .post(format!("{}/holds/release", self.base_url))
            .header("Authorization", format!("Bearer {}", self.secret_key))
            .header("Idempotency-Key", Self::idempotency_key(hold_id, "release"))
            .json(&payload)
            .send()
            .await
            .map_err(|e| ServiceError::ProcessorUnavailable(e.to_string()))?;

        let body: Value = response
            .json()
            .await
            .map_err(|e| ServiceError::ProcessorUnavailable(e.to_string()))?;

        if body["status"].as_str() == Some("released") {
            Ok(())
        } else {
            let message = body["message"].as_str().unwrap_or("release was declined");
            Err(ServiceError::ProcessorUnavailable(message.to_string()))
        }
    }

    /// Return the full held amount to the payer.
    pub async fn reverse(
        &self,
        hold_id: Uuid,
        processor_reference: &str,
    ) -> Result<(), ServiceError> {
        let payload = serde_json::json!({ "reference": processor_reference });

        let response = self
            .client
            .post(format!("{}/holds/reverse", self.base_url))
            .header("Authorization", format!("Bearer {}", self.secret_key))
            .header("Idempotency-Key", Self::idempotency_key(hold_id, "reverse"))
            .json(&payload)
            .send()
            .await
            .map_err(|e| ServiceError::ProcessorUnavailable(e.to_string()))?;

        let body: Value = response
            .json()
            .await
            .map_err(|e| ServiceError::ProcessorUnavailable(e.to_string()))?;

        if body["status"].as_str() == Some("reversed") {
            Ok(())
        } else {
            let message = body["message"].as_str().unwrap_or("reversal was declined");
            Err(ServiceError::ProcessorUnavailable(message.to_string()))
        }
    }

    /// HMAC-SHA512 over the raw payload, compared in constant time.
    pub fn verify_signature(&self, payload: &Value, signature: &str) -> bool {
        verify_processor_signature(payload, signature, &self.webhook_secret)
    }

    /// Map a raw webhook payload into an internal event.
    pub fn normalize_event(&self, payload: &Value) -> Result<NormalizedEvent, ServiceError> {
        let event_id = payload["id"]
            .as_str()
            .ok_or_else(|| ServiceError::Validation("Missing event id in webhook payload".to_string()))?;

        let event_type = payload["event"]
            .as_str()
            .ok_or_else(|| ServiceError::Validation("Missing event type in webhook payload".to_string()))?;

        let processor_reference = payload["data"]["reference"]
            .as_str()
            .ok_or_else(|| ServiceError::Validation("Missing reference in webhook payload".to_string()))?;

        let kind = match event_type {
            "hold.release.succeeded" => EventKind::ReleaseSucceeded,
            "hold.reverse.succeeded" => EventKind::RefundSucceeded,
            "hold.failed" => EventKind::HoldFailed,
            _ => EventKind::Unknown,
        };

        Ok(NormalizedEvent {
            event_id: event_id.to_string(),
            processor_reference: processor_reference.to_string(),
            kind,
        })
    }
}

pub fn verify_processor_signature(payload: &Value, signature: &str, secret: &str) -> bool {
    let payload_string = payload.to_string();

    let mut mac = Hmac::<Sha512>::new_from_slice(secret.as_bytes())
        .expect("HMAC can take key of any size");
    mac.update(payload_string.as_bytes());

    let expected_signature = mac.finalize().into_bytes();
    let expected_signature_hex = hex::encode(expected_signature);

    // Compare signatures in constant time to prevent timing attacks
    ConstantTimeEq::ct_eq(
        signature.as_bytes(),
        expected_signature_hex.as_bytes(),
    )
    .into()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sign(payload: &Value, secret: &str) -> String {
        let mut mac = Hmac::<Sha512>::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(payload.to_string().as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }

    #[test]
    fn accepts_a_correctly_signed_payload() {
        let payload = serde_json::json!({"id": "evt_1", "event": "hold.release.succeeded"});
        let signature = sign(&payload, "secret");
        assert!(verify_processor_signature(&payload, &signature, "secret"));
    }

    #[test]
    fn rejects_a_tampered_payload() {
        let payload = serde_json::json!({"id": "evt_1", "event": "hold.release.succeeded"});
        let signature = sign(&payload, "secret");
        let tampered = serde_json::json!({"id": "evt_1", "event": "hold.reverse.succeeded"});
        assert!(!verify_processor_signature(&tampered, &signature, "secret"));
    }

    #[test]
    fn rejects_a_signature_from_the_wrong_secret() {
        let payload = serde_json::json!({"id": "evt_1"});
        let signature = sign(&payload, "other-secret");
        assert!(!verify_processor_signature(&payload, &signature, "secret"));
    }

    #[test]
    fn idempotency_key_is_stable_per_hold_and_action() {
        let hold_id = Uuid::new_v4();
        assert_eq!(
            PaymentProcessorService::idempotency_key(hold_id, "release"),
            PaymentProcessorService::idempotency_key(hold_id, "release"),
        );
        assert_ne!(
            PaymentProcessorService::idempotency_key(hold_id, "release"),
            PaymentProcessorService::idempotency_key(hold_id, "reverse"),
        );
    }

    #[test]
    fn normalizes_known_and_unknown_events() {
        let config = Config {
            database_url: String::new(),
            jwt_secret: String::new(),
            jwt_maxage: 60,
            port: 8000,
            processor_base_url: String::new(),
            processor_secret_key: String::new(),
            processor_webhook_secret: "secret".to_string(),
            platform_fee_bps: 1_000,
            offer_ttl_hours: 72,
            offer_sweep_interval_secs: 3_600,
        };
        let service = PaymentProcessorService::new(&config);

        let payload = serde_json::json!({
            "id": "evt_42",
            "event": "hold.release.succeeded",
            "data": { "reference": "hold_abc_123456" }
        });
        let event = service.normalize_event(&payload).unwrap();
        assert_eq!(event.event_id, "evt_42");
        assert_eq!(event.processor_reference, "hold_abc_123456");
        assert_eq!(event.kind, EventKind::ReleaseSucceeded);

        let odd = serde_json::json!({
            "id": "evt_43",
            "event": "payout.settled",
            "data": { "reference": "hold_abc_123456" }
        });
        assert_eq!(service.normalize_event(&odd).unwrap().kind, EventKind::Unknown);

        let missing = serde_json::json!({"event": "hold.failed"});
        assert!(service.normalize_event(&missing).is_err());
    }
}
