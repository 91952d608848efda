//! errors.rs
//! Errores tipados del orquestador de campañas.

use actix_web::http::StatusCode;
use thiserror::Error;

use crate::models::campaign_model::{Campaign, CampaignStatus};

/// Errores del cliente HTTP del proveedor de voz.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("El proveedor no respondió a tiempo")]
    Timeout,

    #[error("Recurso no encontrado en el proveedor: {0}")]
    NotFound(String),

    #[error("El proveedor respondió {status}: {body}")]
    Http { status: u16, body: String },

    #[error("Error de transporte con el proveedor: {0}")]
    Transport(String),

    #[error("Respuesta del proveedor inválida: {0}")]
    Decode(String),
}

impl From<reqwest::Error> for ProviderError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            ProviderError::Timeout
        } else if e.is_decode() {
            ProviderError::Decode(e.to_string())
        } else {
            ProviderError::Transport(e.to_string())
        }
    }
}

/// El registro de no-llamar no está disponible. Nunca equivale a "sin bloqueos".
#[derive(Debug, Error)]
#[error("Registro de no-llamar no disponible: {0}")]
pub struct DncUnavailable(pub String);

/// Fallo de reconciliación: se registra y se reintenta en la próxima lectura.
#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error("Reconciliación excedió {0} s")]
    Timeout(u64),

    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

#[derive(Debug, Error)]
pub enum CampaignError {
    #[error("{message}")]
    Validation {
        reason_code: &'static str,
        message: String,
    },

    #[error("La cuenta no tiene acceso a llamadas salientes ({reason_code})")]
    EntitlementDenied {
        reason_code: String,
        required_plan: Option<String>,
    },

    #[error(transparent)]
    ComplianceUnavailable(#[from] DncUnavailable),

    #[error("El proveedor rechazó la campaña: {detail}")]
    Submission {
        campaign: Box<Campaign>,
        detail: String,
    },

    #[error("Campaña no encontrada: {0}")]
    NotFound(String),

    #[error("No se puede operar sobre una campaña en estado {0}")]
    InvalidState(CampaignStatus),

    #[error("Firma de webhook inválida")]
    Unauthorized,

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl CampaignError {
    pub fn validation(reason_code: &'static str, message: impl Into<String>) -> Self {
        CampaignError::Validation {
            reason_code,
            message: message.into(),
        }
    }

    pub fn reason_code(&self) -> String {
        match self {
            CampaignError::Validation { reason_code, .. } => reason_code.to_string(),
            CampaignError::EntitlementDenied { reason_code, .. } => reason_code.clone(),
            CampaignError::ComplianceUnavailable(_) => "COMPLIANCE_UNAVAILABLE".to_string(),
            CampaignError::Submission { .. } => "SUBMISSION_FAILED".to_string(),
            CampaignError::NotFound(_) => "CAMPAIGN_NOT_FOUND".to_string(),
            CampaignError::InvalidState(_) => "INVALID_CAMPAIGN_STATE".to_string(),
            CampaignError::Unauthorized => "INVALID_SIGNATURE".to_string(),
            CampaignError::Internal(_) => "INTERNAL_ERROR".to_string(),
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            CampaignError::Validation { .. } => StatusCode::BAD_REQUEST,
            CampaignError::EntitlementDenied { .. } => StatusCode::FORBIDDEN,
            CampaignError::ComplianceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            CampaignError::Submission { .. } => StatusCode::BAD_GATEWAY,
            CampaignError::NotFound(_) => StatusCode::NOT_FOUND,
            CampaignError::InvalidState(_) => StatusCode::CONFLICT,
            CampaignError::Unauthorized => StatusCode::UNAUTHORIZED,
            CampaignError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}
