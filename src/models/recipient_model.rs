//! models/recipient_model.rs
//! Destinatarios de una campaña y sus variables dinámicas.

use serde::{Deserialize, Serialize};

/// Estado de un destinatario dentro de la campaña.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecipientStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
}

impl RecipientStatus {
    /// Orden de avance: pending < in_progress < (completed | failed).
    pub fn rank(self) -> u8 {
        match self {
            RecipientStatus::Pending => 0,
            RecipientStatus::InProgress => 1,
            RecipientStatus::Completed | RecipientStatus::Failed => 2,
        }
    }

    pub fn is_terminal(self) -> bool {
        self.rank() == 2
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RecipientStatus::Pending => "pending",
            RecipientStatus::InProgress => "in_progress",
            RecipientStatus::Completed => "completed",
            RecipientStatus::Failed => "failed",
        }
    }

    /// Traduce el estado de llamada que reporta el proveedor (poll o webhook).
    /// Devuelve `None` si el valor no es reconocido.
    pub fn from_provider(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "pending" | "scheduled" | "queued" => Some(RecipientStatus::Pending),
            "initiated" | "dispatched" | "in_progress" | "ringing" | "processing" => {
                Some(RecipientStatus::InProgress)
            }
            "completed" | "done" | "finished" | "success" => Some(RecipientStatus::Completed),
            "failed" | "no_answer" | "busy" | "error" | "cancelled" | "canceled" => {
                Some(RecipientStatus::Failed)
            }
            _ => None,
        }
    }
}

/// Origen del último cambio de estado de un destinatario.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusSource {
    #[default]
    Local,
    Poll,
    Webhook,
}

/// Variables de plantilla que se envían al proveedor por destinatario.
/// Conjunto cerrado de campos opcionales, más dos ranuras libres.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DynamicVariables {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub customer_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub debt_amount: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub currency: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub due_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub product_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub product_price: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub campaign_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub appointment_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub custom_1: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub custom_2: Option<String>,
}

impl DynamicVariables {
    /// Nombres de campo aceptados en el mapeo de columnas.
    pub const FIELDS: [&'static str; 10] = [
        "customer_name",
        "debt_amount",
        "currency",
        "due_date",
        "product_name",
        "product_price",
        "campaign_name",
        "appointment_date",
        "custom_1",
        "custom_2",
    ];

    fn slot_mut(&mut self, field: &str) -> Option<&mut Option<String>> {
        match field {
            "customer_name" => Some(&mut self.customer_name),
            "debt_amount" => Some(&mut self.debt_amount),
            "currency" => Some(&mut self.currency),
            "due_date" => Some(&mut self.due_date),
            "product_name" => Some(&mut self.product_name),
            "product_price" => Some(&mut self.product_price),
            "campaign_name" => Some(&mut self.campaign_name),
            "appointment_date" => Some(&mut self.appointment_date),
            "custom_1" => Some(&mut self.custom_1),
            "custom_2" => Some(&mut self.custom_2),
            _ => None,
        }
    }

    /// Asigna un campo conocido. Devuelve `false` si el campo no existe.
    pub fn set(&mut self, field: &str, value: String) -> bool {
        match self.slot_mut(field) {
            Some(slot) => {
                *slot = Some(value);
                true
            }
            None => false,
        }
    }
}

/// Destinatario embebido en la campaña (serializado como JSON en la fila).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recipient {
    /// `recipient_<n>`, clave de correlación con el proveedor y los webhooks.
    pub id: String,
    pub phone_e164: String,
    pub status: RecipientStatus,
    #[serde(default)]
    pub status_source: StatusSource,
    #[serde(default)]
    pub dynamic_variables: DynamicVariables,
    #[serde(default)]
    pub conversation_id: Option<String>,
    #[serde(default)]
    pub call_log_id: Option<String>,
    #[serde(default)]
    pub duration_secs: Option<i64>,
    #[serde(default)]
    pub termination_reason: Option<String>,
}

impl Recipient {
    pub fn new(id: String, phone_e164: String, dynamic_variables: DynamicVariables) -> Self {
        Recipient {
            id,
            phone_e164,
            status: RecipientStatus::Pending,
            status_source: StatusSource::Local,
            dynamic_variables,
            conversation_id: None,
            call_log_id: None,
            duration_secs: None,
            termination_reason: None,
        }
    }

    /// Terminó la llamada pero todavía no tiene CallLog asociado.
    pub fn needs_backfill(&self) -> bool {
        self.status.is_terminal() && self.call_log_id.is_none() && self.conversation_id.is_some()
    }
}
