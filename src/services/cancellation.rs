//! services/cancellation.rs
//! Cancelación: remota best-effort, local siempre.

use std::sync::Arc;

use crate::errors::CampaignError;
use crate::models::campaign_model::{Campaign, CampaignStatus};
use crate::services::campaign_store::CampaignStore;
use crate::services::reconciliation::transition;
use crate::services::voice_provider::VoiceProvider;

const CANCEL_WRITE_ATTEMPTS: usize = 3;

#[derive(Debug, Clone)]
pub struct CancellationOutcome {
    pub campaign: Campaign,
    pub remote_cancelled: bool,
    pub warning: Option<String>,
}

#[derive(Clone)]
pub struct CancellationHandler {
    provider: Arc<dyn VoiceProvider>,
    store: CampaignStore,
}

impl CancellationHandler {
    pub fn new(provider: Arc<dyn VoiceProvider>, store: CampaignStore) -> Self {
        CancellationHandler { provider, store }
    }

    async fn load_active(&self, business_id: &str, campaign_id: &str) -> Result<Campaign, CampaignError> {
        let campaign = self
            .store
            .get(business_id, campaign_id)
            .await?
            .ok_or_else(|| CampaignError::NotFound(campaign_id.to_string()))?;
        if !campaign.status.is_active() {
            return Err(CampaignError::InvalidState(campaign.status));
        }
        Ok(campaign)
    }

    /// Sólo desde PENDING o IN_PROGRESS. Si el cancel remoto falla, la campaña
    /// queda CANCELLED igual y se devuelve una advertencia.
    pub async fn cancel(
        &self,
        business_id: &str,
        campaign_id: &str,
    ) -> Result<CancellationOutcome, CampaignError> {
        let mut campaign = self.load_active(business_id, campaign_id).await?;

        let (remote_cancelled, warning) = match campaign.provider_batch_id.as_deref() {
            Some(batch_id) => match self.provider.cancel_batch(batch_id).await {
                Ok(()) => (true, None),
                Err(e) => {
                    log::warn!(
                        "(cancel) Cancel remoto de campaña {} (batch={}) falló: {}",
                        campaign.id,
                        batch_id,
                        e
                    );
                    (
                        false,
                        Some(format!(
                            "Campaña cancelada localmente, pero el cancel en el proveedor falló ({}); las llamadas en curso pueden completarse",
                            e
                        )),
                    )
                }
            },
            // Nunca llegó al proveedor: no hay nada remoto que cancelar.
            None => (true, None),
        };

        for attempt in 1..=CANCEL_WRITE_ATTEMPTS {
            transition(&mut campaign, CampaignStatus::Cancelled);
            if self.store.save(&mut campaign).await? {
                log::info!("(cancel) Campaña {} cancelada", campaign.id);
                return Ok(CancellationOutcome {
                    campaign,
                    remote_cancelled,
                    warning,
                });
            }
            log::warn!(
                "(cancel) Conflicto al cancelar {} (intento {}), recargando",
                campaign_id,
                attempt
            );
            campaign = self.load_active(business_id, campaign_id).await?;
        }

        Err(CampaignError::Internal(anyhow::anyhow!(
            "No se pudo cancelar la campaña {} tras {} intentos",
            campaign_id,
            CANCEL_WRITE_ATTEMPTS
        )))
    }
}
