//! services/reconciliation.rs
//! Reconciliación de campañas contra el proveedor (poll) y los webhooks (push).
//!
//! La base local, el poll y el webhook son consistentes cada uno por su lado;
//! el merge es monótono: nada vuelve a un estado anterior. Precedencias:
//! terminal > no terminal, y a igual avance webhook > poll. El primer
//! terminal observado queda fijo.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::stream::{self, StreamExt};

use crate::errors::{CampaignError, ReconcileError};
use crate::models::campaign_model::{Campaign, CampaignStatus};
use crate::models::provider_model::{BatchProgress, RemoteRecipient};
use crate::models::recipient_model::{Recipient, RecipientStatus, StatusSource};
use crate::models::webhook_model::VoiceWebhookEvent;
use crate::services::call_log_service::{BackfillOutcome, CallRecordBackfill};
use crate::services::campaign_store::CampaignStore;
use crate::services::voice_provider::VoiceProvider;

/// Intentos de escritura condicional ante conflictos de versión (webhooks).
const WEBHOOK_WRITE_ATTEMPTS: usize = 3;

/// Lo que una fuente remota (poll o webhook) dice de un destinatario.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteObservation {
    pub status: RecipientStatus,
    pub conversation_id: Option<String>,
    pub duration_secs: Option<i64>,
    pub termination_reason: Option<String>,
}

impl RemoteObservation {
    /// `None` si el proveedor reporta un estado que no reconocemos.
    pub fn from_poll(remote: &RemoteRecipient) -> Option<Self> {
        Some(RemoteObservation {
            status: RecipientStatus::from_provider(&remote.status)?,
            conversation_id: remote.conversation_id.clone(),
            duration_secs: remote.duration_secs,
            termination_reason: remote.termination_reason.clone(),
        })
    }

    pub fn from_webhook(event: &VoiceWebhookEvent) -> Option<Self> {
        Some(RemoteObservation {
            status: RecipientStatus::from_provider(&event.status)?,
            conversation_id: event.conversation_id.clone(),
            duration_secs: event.duration_secs,
            termination_reason: event.termination_reason.clone(),
        })
    }
}

fn source_priority(source: StatusSource) -> u8 {
    match source {
        StatusSource::Local => 0,
        StatusSource::Poll => 1,
        StatusSource::Webhook => 2,
    }
}

fn apply_observation(target: &mut Recipient, obs: &RemoteObservation, source: StatusSource) {
    // Un terminal es definitivo: completed nunca pasa a failed ni al revés.
    let settled = target.status.is_terminal();
    let forward = obs.status.rank() > target.status.rank();
    let same_rank_wins = !settled
        && obs.status.rank() == target.status.rank()
        && source_priority(source) >= source_priority(target.status_source);

    if forward || same_rank_wins {
        target.status = obs.status;
        target.status_source = source;
        if obs.conversation_id.is_some() {
            target.conversation_id = obs.conversation_id.clone();
        }
        if obs.duration_secs.is_some() {
            target.duration_secs = obs.duration_secs;
        }
        if obs.termination_reason.is_some() {
            target.termination_reason = obs.termination_reason.clone();
        }
    } else {
        // Sin cambio de estado, pero se completan datos que falten.
        if target.conversation_id.is_none() {
            target.conversation_id = obs.conversation_id.clone();
        }
        if target.duration_secs.is_none() {
            target.duration_secs = obs.duration_secs;
        }
        if target.termination_reason.is_none() {
            target.termination_reason = obs.termination_reason.clone();
        }
    }
}

/// Merge puro `(local, poll, webhook) -> destinatario`. El resultado no
/// depende del orden en que llegaron poll y webhook.
pub fn merge_recipient(
    local: &Recipient,
    poll: Option<&RemoteObservation>,
    webhook: Option<&RemoteObservation>,
) -> Recipient {
    let mut merged = local.clone();
    if let Some(w) = webhook {
        apply_observation(&mut merged, w, StatusSource::Webhook);
    }
    if let Some(p) = poll {
        apply_observation(&mut merged, p, StatusSource::Poll);
    }
    merged
}

/// Deriva el estado de la campaña a partir de los contadores remotos.
///
/// Sólo `finished == scheduled && scheduled > 0` completa la campaña; el
/// `status` del proveedor es orientativo (puede decir "completed" antes de
/// que terminen todas las llamadas despachadas).
pub fn derive_campaign_status(current: CampaignStatus, progress: &BatchProgress) -> CampaignStatus {
    if current.is_terminal() {
        return current;
    }
    let provider_status = progress.status.trim().to_ascii_lowercase();
    let scheduled = progress.total_calls_scheduled;
    let finished = progress.total_calls_finished;

    let next = if scheduled > 0 && finished == scheduled {
        CampaignStatus::Completed
    } else if provider_status == "cancelled" || provider_status == "canceled" {
        CampaignStatus::Cancelled
    } else if provider_status == "failed" && finished == 0 {
        CampaignStatus::Failed
    } else if progress.total_calls_dispatched > 0 || finished > 0 {
        CampaignStatus::InProgress
    } else {
        current
    };

    if current.can_move_to(next) {
        next
    } else {
        current
    }
}

/// Recalcula los contadores como proyección de la señal "finished" del
/// proveedor y de los destinatarios terminados. Nunca decrecen.
pub fn project_counters(campaign: &mut Campaign, remote_finished: Option<i64>) {
    let completed = campaign.count_recipients(RecipientStatus::Completed);
    let failed = campaign.count_recipients(RecipientStatus::Failed);
    let finished = remote_finished
        .unwrap_or(0)
        .max(completed + failed)
        .min(campaign.total_recipients);

    campaign.completed_calls = campaign.completed_calls.max(finished);
    campaign.successful_calls = campaign.successful_calls.max(completed);
    campaign.failed_calls = campaign.failed_calls.max(failed);
}

/// Aplica un nuevo estado de campaña y sus marcas de tiempo.
pub fn transition(campaign: &mut Campaign, next: CampaignStatus) {
    if campaign.status == next || !campaign.status.can_move_to(next) {
        return;
    }
    let now = Utc::now();
    if next == CampaignStatus::InProgress && campaign.started_at.is_none() {
        campaign.started_at = Some(now);
    }
    if next.is_terminal() && campaign.completed_at.is_none() {
        campaign.completed_at = Some(now);
    }
    campaign.status = next;
}

fn merge_remote_recipients(campaign: &mut Campaign, remote: &[RemoteRecipient]) {
    let by_id: HashMap<&str, &RemoteRecipient> = remote
        .iter()
        .filter_map(|r| r.id.as_deref().map(|id| (id, r)))
        .collect();
    let by_phone: HashMap<&str, &RemoteRecipient> = remote
        .iter()
        .filter_map(|r| r.phone_number.as_deref().map(|p| (p, r)))
        .collect();

    for recipient in campaign.recipients.iter_mut() {
        let remote = by_id
            .get(recipient.id.as_str())
            .or_else(|| by_phone.get(recipient.phone_e164.as_str()));
        if let Some(obs) = remote.and_then(|r| RemoteObservation::from_poll(r)) {
            *recipient = merge_recipient(recipient, Some(&obs), None);
        }
    }
}

fn has_changes(before: &Campaign, after: &Campaign) -> bool {
    before.status != after.status
        || before.completed_calls != after.completed_calls
        || before.successful_calls != after.successful_calls
        || before.failed_calls != after.failed_calls
        || before.recipients != after.recipients
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileMode {
    /// Listado: sólo contadores y estado de campaña.
    Summary,
    /// Detalle: además merge por destinatario y backfill de CallLogs.
    Detail,
}

#[derive(Clone)]
pub struct ReconciliationEngine {
    provider: Arc<dyn VoiceProvider>,
    store: CampaignStore,
    backfill: CallRecordBackfill,
    concurrency: usize,
    timeout: Duration,
}

impl ReconciliationEngine {
    pub fn new(
        provider: Arc<dyn VoiceProvider>,
        store: CampaignStore,
        backfill: CallRecordBackfill,
        concurrency: usize,
        timeout: Duration,
    ) -> Self {
        ReconciliationEngine {
            provider,
            store,
            backfill,
            concurrency: concurrency.max(1),
            timeout,
        }
    }

    /// Nunca falla: ante error devuelve el último estado local conocido.
    pub async fn reconcile(&self, campaign: Campaign, mode: ReconcileMode) -> Campaign {
        if !campaign.status.is_active() || campaign.provider_batch_id.is_none() {
            return campaign;
        }
        match self.try_reconcile(&campaign, mode).await {
            Ok(updated) => updated,
            Err(e) => {
                log::warn!(
                    "(reconcile) Campaña {} sin reconciliar, se reintenta en la próxima lectura: {}",
                    campaign.id,
                    e
                );
                campaign
            }
        }
    }

    /// Reconcilia varias campañas en paralelo (acotado), conservando el orden.
    /// El fallo de una no afecta a las demás.
    pub async fn reconcile_many(&self, campaigns: Vec<Campaign>, mode: ReconcileMode) -> Vec<Campaign> {
        stream::iter(campaigns)
            .map(|c| self.reconcile(c, mode))
            .buffered(self.concurrency)
            .collect()
            .await
    }

    async fn try_reconcile(
        &self,
        campaign: &Campaign,
        mode: ReconcileMode,
    ) -> Result<Campaign, ReconcileError> {
        let batch_id = match campaign.provider_batch_id.as_deref() {
            Some(id) => id,
            None => return Ok(campaign.clone()),
        };

        let progress = tokio::time::timeout(self.timeout, self.provider.get_batch(batch_id))
            .await
            .map_err(|_| ReconcileError::Timeout(self.timeout.as_secs()))??;

        log::info!(
            "(try_reconcile) Campaña {} -> proveedor status='{}' scheduled={} dispatched={} finished={}",
            campaign.id,
            progress.status,
            progress.total_calls_scheduled,
            progress.total_calls_dispatched,
            progress.total_calls_finished
        );

        let mut updated = campaign.clone();
        if mode == ReconcileMode::Detail {
            merge_remote_recipients(&mut updated, &progress.recipients);
        }

        let next = derive_campaign_status(updated.status, &progress);
        transition(&mut updated, next);

        if mode == ReconcileMode::Detail {
            let linked = tokio::time::timeout(
                self.timeout,
                self.backfill.backfill_campaign(&mut updated, self.concurrency),
            )
            .await;
            if linked.is_err() {
                log::warn!(
                    "(try_reconcile) Backfill de campaña {} excedió el timeout",
                    campaign.id
                );
            }
        }

        project_counters(&mut updated, Some(progress.total_calls_finished));

        if !has_changes(campaign, &updated) {
            return Ok(updated);
        }

        updated.last_synced_at = Some(Utc::now());
        if self.store.save(&mut updated).await? {
            return Ok(updated);
        }
        // Otro escritor ganó: devolvemos lo que quedó en la base.
        Ok(self
            .store
            .get_by_id(&campaign.id)
            .await?
            .unwrap_or_else(|| campaign.clone()))
    }

    /// Aplica un webhook sobre el destinatario correlacionado. Devuelve la
    /// campaña resultante y si hubo cambio.
    pub async fn apply_webhook(
        &self,
        event: &VoiceWebhookEvent,
    ) -> Result<(Campaign, Recipient, bool), CampaignError> {
        let obs = RemoteObservation::from_webhook(event).ok_or_else(|| {
            CampaignError::validation(
                "UNKNOWN_CALL_STATUS",
                format!("Estado de llamada desconocido: '{}'", event.status),
            )
        })?;

        for attempt in 1..=WEBHOOK_WRITE_ATTEMPTS {
            let mut campaign = self
                .store
                .get_by_id(&event.campaign_id)
                .await?
                .filter(|c| {
                    event
                        .business_id
                        .as_deref()
                        .map_or(true, |b| b == c.business_id)
                })
                .ok_or_else(|| CampaignError::NotFound(event.campaign_id.clone()))?;

            let idx = campaign
                .recipients
                .iter()
                .position(|r| r.id == event.recipient_id)
                .ok_or_else(|| {
                    CampaignError::NotFound(format!(
                        "{}/{}",
                        event.campaign_id, event.recipient_id
                    ))
                })?;

            let local = campaign.recipients[idx].clone();
            let mut merged = merge_recipient(&local, None, Some(&obs));
            if merged == local {
                return Ok((campaign, local, false));
            }

            if merged.needs_backfill() {
                match self.backfill.backfill(&campaign, &merged).await {
                    Ok(BackfillOutcome::Linked(id)) => merged.call_log_id = Some(id),
                    Ok(_) => {}
                    Err(e) => log::warn!(
                        "(apply_webhook) Backfill de {}/{} falló, queda para la próxima pasada: {}",
                        campaign.id,
                        merged.id,
                        e
                    ),
                }
            }

            campaign.recipients[idx] = merged.clone();
            if campaign.status == CampaignStatus::Pending && merged.status.rank() > 0 {
                transition(&mut campaign, CampaignStatus::InProgress);
            }
            project_counters(&mut campaign, None);

            if self.store.save(&mut campaign).await? {
                log::info!(
                    "(apply_webhook) {}/{} -> {}",
                    campaign.id,
                    merged.id,
                    merged.status.as_str()
                );
                return Ok((campaign, merged, true));
            }
            log::warn!(
                "(apply_webhook) Conflicto al guardar {} (intento {}), reintentando",
                campaign.id,
                attempt
            );
        }

        Err(CampaignError::Internal(anyhow::anyhow!(
            "No se pudo aplicar el webhook a {} tras {} intentos",
            event.campaign_id,
            WEBHOOK_WRITE_ATTEMPTS
        )))
    }
}
