//! models/webhook_model.rs
//! Eventos push del proveedor de voz.

use serde::{Deserialize, Serialize};

/// Evento push del proveedor. Acepta camelCase y snake_case.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoiceWebhookEvent {
    #[serde(alias = "recipient_id")]
    pub recipient_id: String,
    #[serde(alias = "campaign_id")]
    pub campaign_id: String,
    #[serde(default, alias = "business_id")]
    pub business_id: Option<String>,
    pub status: String,
    #[serde(default, alias = "conversation_id")]
    pub conversation_id: Option<String>,
    #[serde(default, alias = "duration_secs")]
    pub duration_secs: Option<i64>,
    #[serde(default, alias = "termination_reason")]
    pub termination_reason: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct WebhookAck {
    pub success: bool,
    pub campaign_id: String,
    pub recipient_id: String,
    pub recipient_status: String,
    pub applied: bool,
}
