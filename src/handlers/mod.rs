//! handlers/mod.rs
use actix_web::HttpResponse;
use serde_json::json;

use crate::errors::CampaignError;

pub mod campaign_handler;
pub mod webhook_handler;

const INTERNAL_MESSAGE: &str = "Error interno del servidor";

/// Toda respuesta de error lleva `reason_code` (máquina) y `error` (humano).
pub fn error_response(err: &CampaignError) -> HttpResponse {
    let status = err.status_code();
    if status.is_server_error() {
        log::error!("Error {}: {:?}", status.as_u16(), err);
    }

    // Los internos no exponen su causa; queda en el log
    let message = match err {
        CampaignError::Internal(_) => INTERNAL_MESSAGE.to_string(),
        other => other.to_string(),
    };
    let mut body = json!({
        "success": false,
        "reason_code": err.reason_code(),
        "error": message,
    });
    match err {
        CampaignError::EntitlementDenied { required_plan, .. } => {
            body["required_plan"] = json!(required_plan);
        }
        CampaignError::Submission { campaign, .. } => {
            body["campaign"] = json!(campaign);
        }
        _ => {}
    }
    HttpResponse::build(status).json(body)
}
