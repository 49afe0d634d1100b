// service/webhook_verifier.rs
use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

use crate::{
    dtos::webhookdtos::{WebhookEnvelopeDto, WebhookEvent},
    service::error::ServiceError,
};

pub const SIGNATURE_HEADER: &str = "X-CC-Webhook-Signature";

type HmacSha256 = Hmac<Sha256>;

/// Authenticates processor notifications with the shared webhook secret.
#[derive(Clone)]
pub struct WebhookVerifier {
    secret: String,
}

impl std::fmt::Debug for WebhookVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebhookVerifier")
            .field("secret", &"<redacted>")
            .finish()
    }
}

impl WebhookVerifier {
    pub fn new(secret: impl Into<String>) -> Self {
        Self { secret: secret.into() }
    }

    /// Hex HMAC-SHA256 of the raw body, as the processor computes it.
    pub fn sign(&self, payload: &[u8]) -> String {
        let mut mac = self.mac();
        mac.update(payload);
        hex::encode(mac.finalize().into_bytes())
    }

    /// Checks `signature` over the exact bytes received, then parses them.
    /// Any mismatch or unparsable body is reported as `InvalidSignature`.
    pub fn verify(&self, payload: &[u8], signature: &str) -> Result<WebhookEvent, ServiceError> {
        let provided = hex::decode(signature.trim()).map_err(|_| ServiceError::InvalidSignature)?;

        let mut mac = self.mac();
        mac.update(payload);
        let expected = mac.finalize().into_bytes();

        // ct_eq returns false for slices of different length
        let matches: bool = expected.as_slice().ct_eq(provided.as_slice()).into();
        if !matches {
            return Err(ServiceError::InvalidSignature);
        }

        let envelope: WebhookEnvelopeDto = serde_json::from_slice(payload).map_err(|e| {
            tracing::warn!("Signed webhook payload could not be parsed: {}", e);
            ServiceError::InvalidSignature
        })?;

        tracing::debug!(
            "Verified webhook delivery {:?} scheduled for {:?}, event {}",
            envelope.id,
            envelope.scheduled_for,
            envelope.event.id
        );

        Ok(envelope.event)
    }

    fn mac(&self) -> HmacSha256 {
        HmacSha256::new_from_slice(self.secret.as_bytes())
            .expect("HMAC can take key of any size")
    }
}
