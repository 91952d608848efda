//! app.rs
use crate::handlers::{campaign_handler, webhook_handler};
use actix_web::{web, HttpResponse};

pub fn init_app(cfg: &mut web::ServiceConfig) {
    cfg.route("/health", web::get().to(|| async { HttpResponse::Ok().body("ok") }))
        .service(
            web::scope("/api")
                .service(
                    web::scope("/businesses/{business_id}/campaigns")
                        .route(
                            "",
                            web::post().to(campaign_handler::create_campaign_endpoint),
                        )
                        .route(
                            "",
                            web::get().to(campaign_handler::list_campaigns_endpoint),
                        )
                        .route(
                            "/{campaign_id}",
                            web::get().to(campaign_handler::get_campaign_endpoint),
                        )
                        .route(
                            "/{campaign_id}/cancel",
                            web::post().to(campaign_handler::cancel_campaign_endpoint),
                        ),
                )
                .service(
                    web::scope("/webhooks")
                        .route("/voice", web::post().to(webhook_handler::voice_webhook_endpoint)),
                ),
        );
}
