//! models/provider_model.rs
//! Payloads y respuestas del proveedor de llamadas de voz.

use serde::{Deserialize, Serialize};

use crate::models::recipient_model::DynamicVariables;

/// Triple de correlación que viaja con cada llamada y vuelve en los webhooks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorrelationMetadata {
    pub business_id: String,
    pub campaign_id: String,
    pub recipient_id: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchRecipientPayload {
    pub id: String,
    pub phone_number: String,
    pub dynamic_variables: DynamicVariables,
    pub metadata: CorrelationMetadata,
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchSubmission {
    pub call_name: String,
    pub agent_id: String,
    pub agent_phone_number_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scheduled_time_unix: Option<i64>,
    pub call_type: String,
    pub recipients: Vec<BatchRecipientPayload>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SubmittedBatch {
    pub id: String,
    #[serde(default)]
    pub status: Option<String>,
}

/// Llamada individual según el poll del proveedor.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RemoteRecipient {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub phone_number: Option<String>,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub conversation_id: Option<String>,
    #[serde(default)]
    pub duration_secs: Option<i64>,
    #[serde(default)]
    pub termination_reason: Option<String>,
}

/// Progreso de un batch. `status` es sólo orientativo.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BatchProgress {
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub total_calls_scheduled: i64,
    #[serde(default)]
    pub total_calls_dispatched: i64,
    #[serde(default)]
    pub total_calls_finished: i64,
    #[serde(default)]
    pub recipients: Vec<RemoteRecipient>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptTurn {
    pub role: String,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub time_in_call_secs: Option<i64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConversationDetail {
    pub conversation_id: String,
    pub transcript: Vec<TranscriptTurn>,
    pub duration_secs: Option<i64>,
    pub termination_reason: Option<String>,
    pub sentiment: Option<String>,
}
