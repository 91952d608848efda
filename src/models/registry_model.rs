//! models/registry_model.rs
//! Registros de colaboradores (asistentes, números, plan) que se consultan antes del envío.

use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct AssistantRecord {
    pub id: String,
    pub business_id: String,
    pub name: String,
    pub direction: String, // "inbound", "outbound"
    pub provider_agent_id: Option<String>,
    pub is_active: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct PhoneNumberRecord {
    pub id: String,
    pub business_id: String,
    pub number: String,
    pub provider_phone_number_id: Option<String>,
    pub is_active: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EntitlementDecision {
    pub has_access: bool,
    pub reason_code: Option<String>,
    pub required_plan: Option<String>,
}

impl EntitlementDecision {
    pub fn granted() -> Self {
        EntitlementDecision {
            has_access: true,
            reason_code: None,
            required_plan: None,
        }
    }

    pub fn denied(reason_code: &str, required_plan: Option<&str>) -> Self {
        EntitlementDecision {
            has_access: false,
            reason_code: Some(reason_code.to_string()),
            required_plan: required_plan.map(str::to_string),
        }
    }
}
