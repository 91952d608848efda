//! models/campaign_model.rs
//! Campaña, su estado agregado y los cuerpos de la API de campañas.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::models::recipient_model::{Recipient, RecipientStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CampaignStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
    Cancelled,
}

impl CampaignStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            CampaignStatus::Pending => "PENDING",
            CampaignStatus::InProgress => "IN_PROGRESS",
            CampaignStatus::Completed => "COMPLETED",
            CampaignStatus::Failed => "FAILED",
            CampaignStatus::Cancelled => "CANCELLED",
        }
    }

    /// COMPLETED, FAILED y CANCELLED no admiten más transiciones.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            CampaignStatus::Completed | CampaignStatus::Failed | CampaignStatus::Cancelled
        )
    }

    /// Campañas que se reconcilian contra el proveedor en cada lectura.
    pub fn is_active(self) -> bool {
        !self.is_terminal()
    }

    /// Transición permitida: nunca salir de un terminal ni volver a PENDING.
    pub fn can_move_to(self, next: CampaignStatus) -> bool {
        if self == next {
            return true;
        }
        match self {
            CampaignStatus::Pending => true,
            CampaignStatus::InProgress => next != CampaignStatus::Pending,
            _ => false,
        }
    }
}

impl fmt::Display for CampaignStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CampaignStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(CampaignStatus::Pending),
            "IN_PROGRESS" => Ok(CampaignStatus::InProgress),
            "COMPLETED" => Ok(CampaignStatus::Completed),
            "FAILED" => Ok(CampaignStatus::Failed),
            "CANCELLED" => Ok(CampaignStatus::Cancelled),
            other => Err(anyhow::anyhow!("Estado de campaña desconocido: {}", other)),
        }
    }
}

/// Etiqueta analítica del tipo de llamada (heurística, no afecta al envío).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallType {
    BillingReminder,
    AppointmentReminder,
    GeneralOutreach,
}

impl CallType {
    pub fn as_str(self) -> &'static str {
        match self {
            CallType::BillingReminder => "billing_reminder",
            CallType::AppointmentReminder => "appointment_reminder",
            CallType::GeneralOutreach => "general_outreach",
        }
    }
}

impl FromStr for CallType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "billing_reminder" => Ok(CallType::BillingReminder),
            "appointment_reminder" => Ok(CallType::AppointmentReminder),
            "general_outreach" => Ok(CallType::GeneralOutreach),
            other => Err(anyhow::anyhow!("Tipo de llamada desconocido: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Campaign {
    pub id: String,
    pub business_id: String,
    pub assistant_id: String,
    pub phone_number_id: String,
    pub name: String,
    pub status: CampaignStatus,
    pub call_type: CallType,
    pub total_recipients: i64,
    pub recipients: Vec<Recipient>,
    pub provider_batch_id: Option<String>,
    pub error_message: Option<String>,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub completed_calls: i64,
    pub successful_calls: i64,
    pub failed_calls: i64,
    pub last_synced_at: Option<DateTime<Utc>>,
    /// Versión para escrituras condicionales.
    #[serde(skip_serializing)]
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Campaign {
    pub fn count_recipients(&self, status: RecipientStatus) -> i64 {
        self.recipients.iter().filter(|r| r.status == status).count() as i64
    }
}

/// Planilla ya parseada: columnas y filas (celda -> valor JSON).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Roster {
    #[serde(default)]
    pub columns: Vec<String>,
    pub rows: Vec<Map<String, Value>>,
}

/// Request para crear (y enviar) una campaña
#[derive(Debug, Clone, Deserialize)]
pub struct CreateCampaignRequest {
    pub name: String,
    pub assistant_id: String,
    pub phone_number_id: String,
    pub roster: Roster,
    /// campo -> nombre de columna (ej. "phone" -> "Telefono")
    pub column_mapping: Option<HashMap<String, String>>,
    /// ISO 3166 alpha-2; si falta se usa el país por defecto del servicio
    pub default_country: Option<String>,
    pub scheduled_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CreateCampaignResponse {
    pub success: bool,
    pub message: String,
    pub campaign: Campaign,
    pub call_type: CallType,
    pub dropped_invalid_phones: usize,
    pub skipped_do_not_call: usize,
    pub skipped_duplicates: usize,
}

/// Vista resumida para listados (sin destinatarios).
#[derive(Debug, Clone, Serialize)]
pub struct CampaignSummary {
    pub id: String,
    pub name: String,
    pub assistant_id: String,
    pub phone_number_id: String,
    pub status: CampaignStatus,
    pub call_type: CallType,
    pub total_recipients: i64,
    pub completed_calls: i64,
    pub successful_calls: i64,
    pub failed_calls: i64,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl From<&Campaign> for CampaignSummary {
    fn from(c: &Campaign) -> Self {
        CampaignSummary {
            id: c.id.clone(),
            name: c.name.clone(),
            assistant_id: c.assistant_id.clone(),
            phone_number_id: c.phone_number_id.clone(),
            status: c.status,
            call_type: c.call_type,
            total_recipients: c.total_recipients,
            completed_calls: c.completed_calls,
            successful_calls: c.successful_calls,
            failed_calls: c.failed_calls,
            scheduled_at: c.scheduled_at,
            started_at: c.started_at,
            completed_at: c.completed_at,
            created_at: c.created_at,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ListCampaignsResponse {
    pub total: u64,
    pub page: u64,
    pub page_size: u64,
    pub items: Vec<CampaignSummary>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CancelCampaignResponse {
    pub success: bool,
    pub message: String,
    pub campaign: Campaign,
    pub remote_cancelled: bool,
    /// Presente si el cancel remoto falló (llamadas en curso pueden terminar).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}
