use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// Event kinds that mean "payment settled" for the pipeline.
pub const SETTLED_EVENT_TYPES: [&str; 2] = ["charge:confirmed", "checkout:completed"];

/// Outer body the processor posts to the webhook.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookEnvelopeDto {
    /// Delivery id, numeric or string depending on the API version.
    #[serde(default)]
    pub id: Option<Value>,
    #[serde(default)]
    pub scheduled_for: Option<String>,
    pub event: WebhookEvent,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookEvent {
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub data: WebhookEventData,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WebhookEventData {
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub metadata: Map<String, Value>,
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: serde::Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

impl WebhookEvent {
    pub fn is_payment_settled(&self) -> bool {
        SETTLED_EVENT_TYPES.contains(&self.event_type.as_str())
    }

    /// Payer identifier placed in the charge metadata at checkout.
    pub fn payer_id(&self) -> Option<Uuid> {
        self.metadata_uuid("user_id")
    }

    /// Referral applied at checkout, if any.
    pub fn checkout_referral(&self) -> Option<Uuid> {
        self.metadata_uuid("referral_id")
    }

    fn metadata_uuid(&self, key: &str) -> Option<Uuid> {
        match self.data.metadata.get(key)? {
            Value::String(s) => Uuid::parse_str(s.trim()).ok(),
            _ => None,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct WebhookResponseDto {
    pub status: String,
}

impl WebhookResponseDto {
    pub fn new(status: impl Into<String>) -> Self {
        Self { status: status.into() }
    }
}
