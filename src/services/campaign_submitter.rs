//! services/campaign_submitter.rs
//! Arma el payload del batch, lo envía al proveedor y registra el resultado.

use std::sync::Arc;

use chrono::Utc;

use crate::errors::CampaignError;
use crate::models::campaign_model::{CallType, Campaign, CampaignStatus};
use crate::models::provider_model::{BatchRecipientPayload, BatchSubmission, CorrelationMetadata};
use crate::models::recipient_model::Recipient;
use crate::models::registry_model::{AssistantRecord, PhoneNumberRecord};
use crate::services::campaign_store::CampaignStore;
use crate::services::reconciliation::transition;
use crate::services::voice_provider::VoiceProvider;

/// Etiqueta analítica; no cambia nada del envío.
pub fn classify_call_type(assistant_direction: &str, recipients: &[Recipient]) -> CallType {
    let has = |pick: fn(&Recipient) -> bool| recipients.iter().any(pick);

    if has(|r| r.dynamic_variables.debt_amount.is_some()) {
        CallType::BillingReminder
    } else if has(|r| r.dynamic_variables.appointment_date.is_some()) {
        CallType::AppointmentReminder
    } else if !assistant_direction.eq_ignore_ascii_case("outbound") {
        CallType::GeneralOutreach
    } else {
        CallType::BillingReminder
    }
}

/// Una entrada por destinatario, con el triple de correlación en `metadata`.
pub fn build_submission(
    campaign: &Campaign,
    assistant: &AssistantRecord,
    phone_number: &PhoneNumberRecord,
) -> Result<BatchSubmission, CampaignError> {
    let agent_id = assistant.provider_agent_id.clone().ok_or_else(|| {
        CampaignError::validation(
            "ASSISTANT_NOT_CONFIGURED",
            "El asistente no está configurado en el proveedor de voz",
        )
    })?;
    let agent_phone_number_id = phone_number.provider_phone_number_id.clone().ok_or_else(|| {
        CampaignError::validation(
            "PHONE_NUMBER_NOT_CONFIGURED",
            "El número no está configurado en el proveedor de voz",
        )
    })?;

    let recipients = campaign
        .recipients
        .iter()
        .map(|r| BatchRecipientPayload {
            id: r.id.clone(),
            phone_number: r.phone_e164.clone(),
            dynamic_variables: r.dynamic_variables.clone(),
            metadata: CorrelationMetadata {
                business_id: campaign.business_id.clone(),
                campaign_id: campaign.id.clone(),
                recipient_id: r.id.clone(),
            },
        })
        .collect();

    Ok(BatchSubmission {
        call_name: campaign.name.clone(),
        agent_id,
        agent_phone_number_id,
        scheduled_time_unix: campaign
            .scheduled_at
            .filter(|at| *at > Utc::now())
            .map(|at| at.timestamp()),
        call_type: campaign.call_type.as_str().to_string(),
        recipients,
    })
}

/// Intentos de escritura condicional al registrar el resultado del envío.
const SUBMIT_WRITE_ATTEMPTS: usize = 3;

/// Resultado del envío, a reaplicar si otra escritura ganó la carrera.
#[derive(Debug, Clone)]
enum SubmitOutcome {
    Accepted { batch_id: String, scheduled: bool },
    Rejected(String),
}

impl SubmitOutcome {
    fn apply(&self, campaign: &mut Campaign) {
        match self {
            SubmitOutcome::Accepted { batch_id, scheduled } => {
                campaign.provider_batch_id = Some(batch_id.clone());
                if !scheduled {
                    transition(campaign, CampaignStatus::InProgress);
                }
            }
            SubmitOutcome::Rejected(detail) => {
                campaign.error_message = Some(detail.clone());
                transition(campaign, CampaignStatus::Failed);
            }
        }
    }
}

#[derive(Clone)]
pub struct CampaignSubmitter {
    provider: Arc<dyn VoiceProvider>,
    store: CampaignStore,
}

impl CampaignSubmitter {
    pub fn new(provider: Arc<dyn VoiceProvider>, store: CampaignStore) -> Self {
        CampaignSubmitter { provider, store }
    }

    /// Envía el batch. En éxito guarda el ID del proveedor y pasa a IN_PROGRESS
    /// (o queda PENDING si está programada). En fallo la campaña queda FAILED
    /// con el detalle del proveedor; no se borra.
    pub async fn submit(
        &self,
        campaign: &mut Campaign,
        payload: &BatchSubmission,
    ) -> Result<(), CampaignError> {
        log::info!(
            "(CampaignSubmitter::submit) Campaña {} -> {} destinatarios, tipo={}",
            campaign.id,
            payload.recipients.len(),
            payload.call_type
        );

        match self.provider.submit_batch(payload).await {
            Ok(batch) => {
                let outcome = SubmitOutcome::Accepted {
                    batch_id: batch.id.clone(),
                    scheduled: payload.scheduled_time_unix.is_some(),
                };
                self.record(campaign, &outcome).await?;
                log::info!(
                    "(CampaignSubmitter::submit) Campaña {} enviada, batch={} ({}) status={}",
                    campaign.id,
                    batch.id,
                    batch.status.as_deref().unwrap_or("-"),
                    campaign.status
                );
                Ok(())
            }
            Err(e) => {
                let detail = e.to_string();
                log::error!(
                    "(CampaignSubmitter::submit) El proveedor rechazó la campaña {}: {}",
                    campaign.id,
                    detail
                );
                self.record(campaign, &SubmitOutcome::Rejected(detail.clone()))
                    .await?;
                Err(CampaignError::Submission {
                    campaign: Box::new(campaign.clone()),
                    detail,
                })
            }
        }
    }

    /// Guarda el resultado del envío. Si otro escritor (un webhook temprano)
    /// cambió la versión, recarga y reaplica sobre lo que quedó en la base.
    async fn record(&self, campaign: &mut Campaign, outcome: &SubmitOutcome) -> Result<(), CampaignError> {
        for attempt in 1..=SUBMIT_WRITE_ATTEMPTS {
            outcome.apply(campaign);
            if self.store.save(campaign).await? {
                return Ok(());
            }
            log::warn!(
                "(CampaignSubmitter::record) Conflicto al registrar envío de {} (intento {}), recargando",
                campaign.id,
                attempt
            );
            *campaign = self
                .store
                .get_by_id(&campaign.id)
                .await?
                .ok_or_else(|| CampaignError::NotFound(campaign.id.clone()))?;
        }

        Err(CampaignError::Internal(anyhow::anyhow!(
            "No se pudo registrar el envío de la campaña {} tras {} intentos",
            campaign.id,
            SUBMIT_WRITE_ATTEMPTS
        )))
    }
}
