//! handlers/webhook_handler.rs
//! Webhook del proveedor de voz (estado por destinatario).

use actix_web::{web, HttpRequest, HttpResponse};
use chrono::Utc;

use crate::config::app_config::AppConfig;
use crate::errors::CampaignError;
use crate::handlers::error_response;
use crate::models::webhook_model::VoiceWebhookEvent;
use crate::services::campaign_service::CampaignService;
use crate::services::webhook_signature;

pub const SIGNATURE_HEADER: &str = "X-Webhook-Signature";

/// POST /api/webhooks/voice
pub async fn voice_webhook_endpoint(
    req: HttpRequest,
    body: web::Bytes,
    config: web::Data<AppConfig>,
    campaign_service: web::Data<CampaignService>,
) -> HttpResponse {
    if let Some(secret) = config.webhook_secret.as_deref() {
        let header = req
            .headers()
            .get(SIGNATURE_HEADER)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default();
        let valid = webhook_signature::verify(
            secret,
            header,
            &body,
            Utc::now().timestamp(),
            config.webhook_tolerance_secs,
        );
        if !valid {
            log::warn!("(voice_webhook_endpoint) Webhook rechazado: firma inválida");
            return error_response(&CampaignError::Unauthorized);
        }
    }

    let event: VoiceWebhookEvent = match serde_json::from_slice(&body) {
        Ok(ev) => ev,
        Err(e) => {
            return error_response(&CampaignError::validation(
                "INVALID_PAYLOAD",
                format!("Webhook inválido: {}", e),
            ))
        }
    };

    match campaign_service.handle_webhook(event).await {
        Ok(ack) => HttpResponse::Ok().json(ack),
        Err(e) => error_response(&e),
    }
}
