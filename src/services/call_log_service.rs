//! services/call_log_service.rs
//! Backfill idempotente de CallLogs cuando termina la llamada de un destinatario.

use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use futures::stream::{self, StreamExt};
use sqlx::{Pool, Sqlite};
use uuid::Uuid;

use crate::errors::{ProviderError, ReconcileError};
use crate::models::call_log_model::{CallLogRecord, NewCallLog};
use crate::models::campaign_model::Campaign;
use crate::models::provider_model::TranscriptTurn;
use crate::models::recipient_model::Recipient;
use crate::services::voice_provider::VoiceProvider;

#[async_trait]
pub trait CallLogStore: Send + Sync {
    /// Inserta o actualiza por `conversation_id`. Devuelve el ID del CallLog.
    async fn upsert(&self, log: &NewCallLog) -> Result<String>;

    async fn find_by_conversation(&self, conversation_id: &str) -> Result<Option<CallLogRecord>>;
}

#[derive(Clone, Debug)]
pub struct SqliteCallLogStore {
    db_pool: Pool<Sqlite>,
}

impl SqliteCallLogStore {
    pub fn new(db_pool: Pool<Sqlite>) -> Self {
        SqliteCallLogStore { db_pool }
    }
}

#[derive(sqlx::FromRow)]
struct CallLogRow {
    id: String,
    business_id: String,
    campaign_id: String,
    recipient_id: String,
    conversation_id: String,
    phone_number: String,
    call_type: String,
    status: String,
    transcript: String,
    duration_secs: Option<i64>,
    termination_reason: Option<String>,
    sentiment: Option<String>,
    created_at: String,
    updated_at: String,
}

#[async_trait]
impl CallLogStore for SqliteCallLogStore {
    async fn upsert(&self, log: &NewCallLog) -> Result<String> {
        let now = Utc::now().to_rfc3339();
        let transcript = serde_json::to_string(&log.transcript)?;

        // En conflicto se conserva el id original: correr dos veces no duplica.
        let id: String = sqlx::query_scalar(
            r#"
            INSERT INTO call_logs (
                id, business_id, campaign_id, recipient_id, conversation_id,
                phone_number, call_type, status, transcript,
                duration_secs, termination_reason, sentiment,
                created_at, updated_at
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?13)
            ON CONFLICT(conversation_id) DO UPDATE SET
                status = excluded.status,
                transcript = excluded.transcript,
                duration_secs = COALESCE(excluded.duration_secs, call_logs.duration_secs),
                termination_reason = COALESCE(excluded.termination_reason, call_logs.termination_reason),
                sentiment = COALESCE(excluded.sentiment, call_logs.sentiment),
                updated_at = excluded.updated_at
            RETURNING id
            "#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(&log.business_id)
        .bind(&log.campaign_id)
        .bind(&log.recipient_id)
        .bind(&log.conversation_id)
        .bind(&log.phone_number)
        .bind(&log.call_type)
        .bind(&log.status)
        .bind(transcript)
        .bind(log.duration_secs)
        .bind(&log.termination_reason)
        .bind(&log.sentiment)
        .bind(now)
        .fetch_one(&self.db_pool)
        .await
        .context("Fallo en upsert de call_log")?;

        Ok(id)
    }

    async fn find_by_conversation(&self, conversation_id: &str) -> Result<Option<CallLogRecord>> {
        let row = sqlx::query_as::<_, CallLogRow>(
            r#"
            SELECT id, business_id, campaign_id, recipient_id, conversation_id,
                   phone_number, call_type, status, transcript,
                   duration_secs, termination_reason, sentiment,
                   created_at, updated_at
            FROM call_logs
            WHERE conversation_id = ?1
            "#,
        )
        .bind(conversation_id)
        .fetch_optional(&self.db_pool)
        .await
        .context("Fallo al consultar call_log")?;

        row.map(|r| -> Result<CallLogRecord> {
            let transcript: Vec<TranscriptTurn> = serde_json::from_str(&r.transcript)?;
            Ok(CallLogRecord {
                id: r.id,
                business_id: r.business_id,
                campaign_id: r.campaign_id,
                recipient_id: r.recipient_id,
                conversation_id: r.conversation_id,
                phone_number: r.phone_number,
                call_type: r.call_type,
                status: r.status,
                transcript,
                duration_secs: r.duration_secs,
                termination_reason: r.termination_reason,
                sentiment: r.sentiment,
                created_at: r.created_at.parse()?,
                updated_at: r.updated_at.parse()?,
            })
        })
        .transpose()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackfillOutcome {
    Linked(String),
    /// El proveedor todavía no tiene el detalle (404); se reintenta en la próxima pasada.
    NotYetAvailable,
    Skipped,
}

#[derive(Clone)]
pub struct CallRecordBackfill {
    provider: Arc<dyn VoiceProvider>,
    call_logs: Arc<dyn CallLogStore>,
}

impl CallRecordBackfill {
    pub fn new(provider: Arc<dyn VoiceProvider>, call_logs: Arc<dyn CallLogStore>) -> Self {
        CallRecordBackfill {
            provider,
            call_logs,
        }
    }

    pub async fn backfill(
        &self,
        campaign: &Campaign,
        recipient: &Recipient,
    ) -> Result<BackfillOutcome, ReconcileError> {
        let conversation_id = match (&recipient.conversation_id, recipient.status.is_terminal()) {
            (Some(id), true) => id,
            _ => return Ok(BackfillOutcome::Skipped),
        };

        // Otra pasada (o un webhook) ya lo creó
        if let Some(existing) = self.call_logs.find_by_conversation(conversation_id).await? {
            return Ok(BackfillOutcome::Linked(existing.id));
        }

        let detail = match self.provider.get_conversation(conversation_id).await {
            Ok(d) => d,
            Err(ProviderError::NotFound(_)) => {
                log::info!(
                    "(backfill) Conversación {} aún no disponible, se reintenta luego",
                    conversation_id
                );
                return Ok(BackfillOutcome::NotYetAvailable);
            }
            Err(e) => return Err(e.into()),
        };

        let call_log_id = self
            .call_logs
            .upsert(&NewCallLog {
                business_id: campaign.business_id.clone(),
                campaign_id: campaign.id.clone(),
                recipient_id: recipient.id.clone(),
                conversation_id: conversation_id.clone(),
                phone_number: recipient.phone_e164.clone(),
                call_type: campaign.call_type.as_str().to_string(),
                status: recipient.status.as_str().to_string(),
                transcript: detail.transcript,
                duration_secs: detail.duration_secs.or(recipient.duration_secs),
                termination_reason: detail
                    .termination_reason
                    .or_else(|| recipient.termination_reason.clone()),
                sentiment: detail.sentiment,
            })
            .await?;

        log::info!(
            "(backfill) CallLog {} vinculado a {}/{}",
            call_log_id,
            campaign.id,
            recipient.id
        );
        Ok(BackfillOutcome::Linked(call_log_id))
    }

    /// Vincula CallLogs a todos los destinatarios terminados que no lo tengan.
    /// Los errores se registran y no interrumpen al resto. Devuelve cuántos se vincularon.
    pub async fn backfill_campaign(&self, campaign: &mut Campaign, concurrency: usize) -> usize {
        let pending: Vec<(usize, Recipient)> = campaign
            .recipients
            .iter()
            .enumerate()
            .filter(|(_, r)| r.needs_backfill())
            .map(|(i, r)| (i, r.clone()))
            .collect();
        if pending.is_empty() {
            return 0;
        }

        let snapshot: &Campaign = campaign;
        let results: Vec<(usize, Result<BackfillOutcome, ReconcileError>)> =
            stream::iter(pending)
                .map(|(i, recipient)| async move { (i, self.backfill(snapshot, &recipient).await) })
                .buffer_unordered(concurrency.max(1))
                .collect()
                .await;

        let mut linked = 0;
        for (i, result) in results {
            match result {
                Ok(BackfillOutcome::Linked(id)) => {
                    campaign.recipients[i].call_log_id = Some(id);
                    linked += 1;
                }
                Ok(_) => {}
                Err(e) => log::warn!(
                    "(backfill_campaign) Falló backfill de {}/{}: {}",
                    campaign.id,
                    campaign.recipients[i].id,
                    e
                ),
            }
        }
        linked
    }
}
