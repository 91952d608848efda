//! services/campaign_service.rs
//! Orquestador de campañas salientes: creación, listado, detalle, cancelación y webhooks.

use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use crate::config::app_config::AppConfig;
use crate::errors::CampaignError;
use crate::models::campaign_model::{
    Campaign, CampaignStatus, CampaignSummary, CancelCampaignResponse, CreateCampaignRequest,
    CreateCampaignResponse, ListCampaignsResponse,
};
use crate::models::registry_model::{AssistantRecord, PhoneNumberRecord};
use crate::models::webhook_model::{VoiceWebhookEvent, WebhookAck};
use crate::services::call_log_service::{CallLogStore, CallRecordBackfill};
use crate::services::campaign_store::CampaignStore;
use crate::services::campaign_submitter::{build_submission, classify_call_type, CampaignSubmitter};
use crate::services::cancellation::CancellationHandler;
use crate::services::dnc_guard::{DncGuard, DncStore};
use crate::services::phone_normalizer::dialing_for;
use crate::services::recipient_builder::{assign_ids, RecipientBuilder};
use crate::services::reconciliation::{ReconcileMode, ReconciliationEngine};
use crate::services::registry_service::{AssistantRegistry, EntitlementResolver, PhoneNumberRegistry};
use crate::services::voice_provider::VoiceProvider;

const MAX_PAGE_SIZE: u64 = 100;
const MAX_PAGE: u64 = 100_000;

/// Colaboradores externos del orquestador.
#[derive(Clone)]
pub struct Collaborators {
    pub provider: Arc<dyn VoiceProvider>,
    pub dnc_store: Arc<dyn DncStore>,
    pub assistants: Arc<dyn AssistantRegistry>,
    pub phone_numbers: Arc<dyn PhoneNumberRegistry>,
    pub entitlements: Arc<dyn EntitlementResolver>,
    pub call_logs: Arc<dyn CallLogStore>,
}

#[derive(Clone)]
pub struct CampaignService {
    store: CampaignStore,
    assistants: Arc<dyn AssistantRegistry>,
    phone_numbers: Arc<dyn PhoneNumberRegistry>,
    entitlements: Arc<dyn EntitlementResolver>,
    dnc_guard: DncGuard,
    submitter: CampaignSubmitter,
    reconciler: ReconciliationEngine,
    cancellation: CancellationHandler,
    default_country: String,
}

impl CampaignService {
    pub fn new(store: CampaignStore, deps: Collaborators, config: &AppConfig) -> Self {
        let backfill = CallRecordBackfill::new(deps.provider.clone(), deps.call_logs.clone());
        Self {
            assistants: deps.assistants,
            phone_numbers: deps.phone_numbers,
            entitlements: deps.entitlements,
            dnc_guard: DncGuard::new(deps.dnc_store),
            submitter: CampaignSubmitter::new(deps.provider.clone(), store.clone()),
            reconciler: ReconciliationEngine::new(
                deps.provider.clone(),
                store.clone(),
                backfill,
                config.reconcile_concurrency,
                config.reconcile_timeout,
            ),
            cancellation: CancellationHandler::new(deps.provider, store.clone()),
            store,
            default_country: config.default_country.clone(),
        }
    }

    async fn validate_assistant(
        &self,
        business_id: &str,
        assistant_id: &str,
    ) -> Result<AssistantRecord, CampaignError> {
        let assistant = self
            .assistants
            .find_assistant(business_id, assistant_id)
            .await?
            .ok_or_else(|| {
                CampaignError::validation(
                    "ASSISTANT_NOT_FOUND",
                    format!("No existe el asistente {}", assistant_id),
                )
            })?;
        if !assistant.is_active {
            return Err(CampaignError::validation(
                "ASSISTANT_INACTIVE",
                format!("El asistente '{}' no está activo", assistant.name),
            ));
        }
        if assistant.provider_agent_id.is_none() {
            return Err(CampaignError::validation(
                "ASSISTANT_NOT_CONFIGURED",
                format!("El asistente '{}' no está configurado en el proveedor de voz", assistant.name),
            ));
        }
        Ok(assistant)
    }

    async fn validate_phone_number(
        &self,
        business_id: &str,
        phone_number_id: &str,
    ) -> Result<PhoneNumberRecord, CampaignError> {
        let number = self
            .phone_numbers
            .find_phone_number(business_id, phone_number_id)
            .await?
            .ok_or_else(|| {
                CampaignError::validation(
                    "PHONE_NUMBER_NOT_FOUND",
                    format!("No existe el número {}", phone_number_id),
                )
            })?;
        if !number.is_active {
            return Err(CampaignError::validation(
                "PHONE_NUMBER_INACTIVE",
                format!("El número {} no está activo", number.number),
            ));
        }
        if number.provider_phone_number_id.is_none() {
            return Err(CampaignError::validation(
                "PHONE_NUMBER_NOT_CONFIGURED",
                format!("El número {} no está configurado en el proveedor de voz", number.number),
            ));
        }
        Ok(number)
    }

    /// Crea la campaña y la envía al proveedor.
    ///
    /// Validación, plan y no-llamar abortan antes de persistir nada. Si el
    /// proveedor rechaza el envío, la campaña queda guardada como FAILED.
    pub async fn create_campaign(
        &self,
        business_id: &str,
        req: CreateCampaignRequest,
    ) -> Result<CreateCampaignResponse, CampaignError> {
        let name = req.name.trim().to_string();
        if name.is_empty() {
            return Err(CampaignError::validation(
                "MISSING_NAME",
                "La campaña necesita un nombre",
            ));
        }

        let assistant = self.validate_assistant(business_id, &req.assistant_id).await?;
        let phone_number = self
            .validate_phone_number(business_id, &req.phone_number_id)
            .await?;

        let access = self.entitlements.resolve_outbound_access(business_id).await?;
        if !access.has_access {
            log::warn!(
                "(create_campaign) business_id={} sin acceso saliente: {:?}",
                business_id,
                access.reason_code
            );
            return Err(CampaignError::EntitlementDenied {
                reason_code: access
                    .reason_code
                    .unwrap_or_else(|| "OUTBOUND_NOT_ALLOWED".to_string()),
                required_plan: access.required_plan,
            });
        }

        let country = req
            .default_country
            .as_deref()
            .map(|c| c.trim().to_ascii_uppercase())
            .unwrap_or_else(|| self.default_country.clone());
        if dialing_for(&country).is_none() {
            return Err(CampaignError::validation(
                "UNSUPPORTED_COUNTRY",
                format!("País por defecto no soportado: {}", country),
            ));
        }

        let built = RecipientBuilder::new(req.column_mapping.as_ref(), &country, &name)
            .build(&req.roster)?;
        let screened = self.dnc_guard.screen(business_id, built.drafts).await?;
        let skipped_do_not_call = screened.blocked.len();

        let recipients = assign_ids(screened.allowed);
        let call_type = classify_call_type(&assistant.direction, &recipients);
        let now = Utc::now();

        let mut campaign = Campaign {
            id: Uuid::new_v4().to_string(),
            business_id: business_id.to_string(),
            assistant_id: assistant.id.clone(),
            phone_number_id: phone_number.id.clone(),
            name,
            status: CampaignStatus::Pending,
            call_type,
            total_recipients: recipients.len() as i64,
            recipients,
            provider_batch_id: None,
            error_message: None,
            scheduled_at: req.scheduled_at,
            started_at: None,
            completed_at: None,
            completed_calls: 0,
            successful_calls: 0,
            failed_calls: 0,
            last_synced_at: None,
            version: 0,
            created_at: now,
            updated_at: now,
        };
        self.store.insert(&campaign).await?;
        log::info!(
            "(create_campaign) Campaña {} creada: {} destinatarios ({} inválidos, {} no-llamar, {} duplicados)",
            campaign.id,
            campaign.total_recipients,
            built.dropped_invalid,
            skipped_do_not_call,
            built.skipped_duplicates
        );

        let payload = build_submission(&campaign, &assistant, &phone_number)?;
        self.submitter.submit(&mut campaign, &payload).await?;

        Ok(CreateCampaignResponse {
            success: true,
            message: "Campaña creada y enviada".to_string(),
            call_type,
            dropped_invalid_phones: built.dropped_invalid,
            skipped_do_not_call,
            skipped_duplicates: built.skipped_duplicates,
            campaign,
        })
    }

    /// Lista campañas; las activas se reconcilian (sólo contadores) antes de responder.
    pub async fn list_campaigns(
        &self,
        business_id: &str,
        page: u64,
        page_size: u64,
    ) -> Result<ListCampaignsResponse, CampaignError> {
        let page = page.clamp(1, MAX_PAGE);
        let page_size = page_size.clamp(1, MAX_PAGE_SIZE);
        let (total, campaigns) = self.store.list(business_id, page, page_size).await?;
        let campaigns = self
            .reconciler
            .reconcile_many(campaigns, ReconcileMode::Summary)
            .await;

        Ok(ListCampaignsResponse {
            total,
            page,
            page_size,
            items: campaigns.iter().map(CampaignSummary::from).collect(),
        })
    }

    /// Detalle con reconciliación por destinatario y backfill de CallLogs.
    pub async fn get_campaign(
        &self,
        business_id: &str,
        campaign_id: &str,
    ) -> Result<Campaign, CampaignError> {
        let campaign = self
            .store
            .get(business_id, campaign_id)
            .await?
            .ok_or_else(|| CampaignError::NotFound(campaign_id.to_string()))?;
        Ok(self.reconciler.reconcile(campaign, ReconcileMode::Detail).await)
    }

    pub async fn cancel_campaign(
        &self,
        business_id: &str,
        campaign_id: &str,
    ) -> Result<CancelCampaignResponse, CampaignError> {
        let outcome = self.cancellation.cancel(business_id, campaign_id).await?;
        let message = if outcome.warning.is_some() {
            "Campaña cancelada localmente; el cancel remoto falló".to_string()
        } else {
            "Campaña cancelada".to_string()
        };
        Ok(CancelCampaignResponse {
            success: true,
            message,
            campaign: outcome.campaign,
            remote_cancelled: outcome.remote_cancelled,
            warning: outcome.warning,
        })
    }

    pub async fn handle_webhook(&self, event: VoiceWebhookEvent) -> Result<WebhookAck, CampaignError> {
        let (campaign, recipient, applied) = self.reconciler.apply_webhook(&event).await?;
        Ok(WebhookAck {
            success: true,
            campaign_id: campaign.id,
            recipient_id: recipient.id,
            recipient_status: recipient.status.as_str().to_string(),
            applied,
        })
    }
}
