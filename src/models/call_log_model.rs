//! models/call_log_model.rs
//! Registro de llamada que consume la app de conversaciones.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::provider_model::TranscriptTurn;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallLogRecord {
    pub id: String,
    pub business_id: String,
    pub campaign_id: String,
    pub recipient_id: String,
    pub conversation_id: String,
    pub phone_number: String,
    pub call_type: String,
    pub status: String, // "completed", "failed"
    pub transcript: Vec<TranscriptTurn>,
    pub duration_secs: Option<i64>,
    pub termination_reason: Option<String>,
    pub sentiment: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Datos para el upsert por `conversation_id`.
#[derive(Debug, Clone)]
pub struct NewCallLog {
    pub business_id: String,
    pub campaign_id: String,
    pub recipient_id: String,
    pub conversation_id: String,
    pub phone_number: String,
    pub call_type: String,
    pub status: String,
    pub transcript: Vec<TranscriptTurn>,
    pub duration_secs: Option<i64>,
    pub termination_reason: Option<String>,
    pub sentiment: Option<String>,
}
