//! handlers/campaign_handler.rs
use actix_web::{web, HttpResponse};
use serde::Deserialize;

use crate::handlers::error_response;
use crate::models::campaign_model::CreateCampaignRequest;
use crate::services::campaign_service::CampaignService;

#[derive(Deserialize)]
pub struct PaginationQuery {
    page: Option<u64>,
    page_size: Option<u64>,
}

/// POST /api/businesses/{business_id}/campaigns
pub async fn create_campaign_endpoint(
    campaign_service: web::Data<CampaignService>,
    path: web::Path<String>,
    body: web::Json<CreateCampaignRequest>,
) -> HttpResponse {
    let business_id = path.into_inner();
    log::info!("Entrando a create_campaign_endpoint business_id={}", business_id);

    match campaign_service
        .create_campaign(&business_id, body.into_inner())
        .await
    {
        Ok(resp) => HttpResponse::Created().json(resp),
        Err(e) => error_response(&e),
    }
}

/// GET /api/businesses/{business_id}/campaigns
pub async fn list_campaigns_endpoint(
    campaign_service: web::Data<CampaignService>,
    path: web::Path<String>,
    query: web::Query<PaginationQuery>,
) -> HttpResponse {
    let business_id = path.into_inner();
    let page = query.page.unwrap_or(1);
    let page_size = query.page_size.unwrap_or(10);

    match campaign_service
        .list_campaigns(&business_id, page, page_size)
        .await
    {
        Ok(list) => HttpResponse::Ok().json(list),
        Err(e) => error_response(&e),
    }
}

/// GET /api/businesses/{business_id}/campaigns/{campaign_id}
pub async fn get_campaign_endpoint(
    campaign_service: web::Data<CampaignService>,
    path: web::Path<(String, String)>,
) -> HttpResponse {
    let (business_id, campaign_id) = path.into_inner();

    match campaign_service.get_campaign(&business_id, &campaign_id).await {
        Ok(campaign) => HttpResponse::Ok().json(campaign),
        Err(e) => error_response(&e),
    }
}

/// POST /api/businesses/{business_id}/campaigns/{campaign_id}/cancel
pub async fn cancel_campaign_endpoint(
    campaign_service: web::Data<CampaignService>,
    path: web::Path<(String, String)>,
) -> HttpResponse {
    let (business_id, campaign_id) = path.into_inner();

    match campaign_service
        .cancel_campaign(&business_id, &campaign_id)
        .await
    {
        Ok(resp) => HttpResponse::Ok().json(resp),
        Err(e) => error_response(&e),
    }
}
