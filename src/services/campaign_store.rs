//! services/campaign_store.rs
//! Persistencia de campañas en SQLite con escritura condicional por versión.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::{Pool, Sqlite};

use crate::models::campaign_model::Campaign;

/// Registro local y autoritativo de campañas. Las campañas nunca se borran.
#[derive(Clone, Debug)]
pub struct CampaignStore {
    db_pool: Pool<Sqlite>,
}

#[derive(sqlx::FromRow)]
struct CampaignRow {
    id: String,
    business_id: String,
    assistant_id: String,
    phone_number_id: String,
    name: String,
    status: String,
    call_type: String,
    total_recipients: i64,
    recipients: String,
    provider_batch_id: Option<String>,
    error_message: Option<String>,
    scheduled_at: Option<String>,
    started_at: Option<String>,
    completed_at: Option<String>,
    completed_calls: i64,
    successful_calls: i64,
    failed_calls: i64,
    last_synced_at: Option<String>,
    version: i64,
    created_at: String,
    updated_at: String,
}

const CAMPAIGN_COLUMNS: &str = r#"
    id, business_id, assistant_id, phone_number_id, name, status, call_type,
    total_recipients, recipients, provider_batch_id, error_message,
    scheduled_at, started_at, completed_at,
    completed_calls, successful_calls, failed_calls,
    last_synced_at, version, created_at, updated_at
"#;

fn parse_ts(value: Option<String>) -> Result<Option<DateTime<Utc>>> {
    value
        .map(|v| v.parse::<DateTime<Utc>>().with_context(|| format!("Fecha inválida: {}", v)))
        .transpose()
}

fn fmt_ts(value: Option<DateTime<Utc>>) -> Option<String> {
    value.map(|v| v.to_rfc3339())
}

impl TryFrom<CampaignRow> for Campaign {
    type Error = anyhow::Error;

    fn try_from(row: CampaignRow) -> Result<Self> {
        let recipients = serde_json::from_str(&row.recipients)
            .with_context(|| format!("Destinatarios corruptos en campaña {}", row.id))?;
        Ok(Campaign {
            status: row.status.parse()?,
            call_type: row.call_type.parse()?,
            recipients,
            scheduled_at: parse_ts(row.scheduled_at)?,
            started_at: parse_ts(row.started_at)?,
            completed_at: parse_ts(row.completed_at)?,
            last_synced_at: parse_ts(row.last_synced_at)?,
            created_at: row.created_at.parse()?,
            updated_at: row.updated_at.parse()?,
            id: row.id,
            business_id: row.business_id,
            assistant_id: row.assistant_id,
            phone_number_id: row.phone_number_id,
            name: row.name,
            total_recipients: row.total_recipients,
            provider_batch_id: row.provider_batch_id,
            error_message: row.error_message,
            completed_calls: row.completed_calls,
            successful_calls: row.successful_calls,
            failed_calls: row.failed_calls,
            version: row.version,
        })
    }
}

impl CampaignStore {
    pub fn new(db_pool: Pool<Sqlite>) -> Self {
        CampaignStore { db_pool }
    }

    /// Corre migraciones con sqlx
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.db_pool)
            .await
            .context("Fallo en migraciones de 'campaigns'")?;
        Ok(())
    }

    pub async fn insert(&self, campaign: &Campaign) -> Result<()> {
        let recipients = serde_json::to_string(&campaign.recipients)?;
        sqlx::query(
            r#"
            INSERT INTO campaigns (
                id, business_id, assistant_id, phone_number_id, name, status, call_type,
                total_recipients, recipients, provider_batch_id, error_message,
                scheduled_at, started_at, completed_at,
                completed_calls, successful_calls, failed_calls,
                last_synced_at, version, created_at, updated_at
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14,
                    ?15, ?16, ?17, ?18, ?19, ?20, ?21)
            "#,
        )
        .bind(&campaign.id)
        .bind(&campaign.business_id)
        .bind(&campaign.assistant_id)
        .bind(&campaign.phone_number_id)
        .bind(&campaign.name)
        .bind(campaign.status.as_str())
        .bind(campaign.call_type.as_str())
        .bind(campaign.total_recipients)
        .bind(recipients)
        .bind(&campaign.provider_batch_id)
        .bind(&campaign.error_message)
        .bind(fmt_ts(campaign.scheduled_at))
        .bind(fmt_ts(campaign.started_at))
        .bind(fmt_ts(campaign.completed_at))
        .bind(campaign.completed_calls)
        .bind(campaign.successful_calls)
        .bind(campaign.failed_calls)
        .bind(fmt_ts(campaign.last_synced_at))
        .bind(campaign.version)
        .bind(campaign.created_at.to_rfc3339())
        .bind(campaign.updated_at.to_rfc3339())
        .execute(&self.db_pool)
        .await
        .context("Fallo al insertar campaña")?;

        Ok(())
    }

    /// Campaña de un negocio (scoping por tenant).
    pub async fn get(&self, business_id: &str, campaign_id: &str) -> Result<Option<Campaign>> {
        let sql = format!(
            "SELECT {CAMPAIGN_COLUMNS} FROM campaigns WHERE id = ?1 AND business_id = ?2"
        );
        let row = sqlx::query_as::<_, CampaignRow>(&sql)
            .bind(campaign_id)
            .bind(business_id)
            .fetch_optional(&self.db_pool)
            .await
            .context("Fallo al consultar campaña")?;
        row.map(Campaign::try_from).transpose()
    }

    /// Sin scoping: para webhooks, que sólo traen el ID de campaña.
    pub async fn get_by_id(&self, campaign_id: &str) -> Result<Option<Campaign>> {
        let sql = format!("SELECT {CAMPAIGN_COLUMNS} FROM campaigns WHERE id = ?1");
        let row = sqlx::query_as::<_, CampaignRow>(&sql)
            .bind(campaign_id)
            .fetch_optional(&self.db_pool)
            .await
            .context("Fallo al consultar campaña")?;
        row.map(Campaign::try_from).transpose()
    }

    /// Lista campañas con paginación (más nuevas primero). Devuelve (total, items).
    pub async fn list(
        &self,
        business_id: &str,
        page: u64,
        page_size: u64,
    ) -> Result<(u64, Vec<Campaign>)> {
        let page = page.max(1);
        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM campaigns WHERE business_id = ?1")
            .bind(business_id)
            .fetch_one(&self.db_pool)
            .await?;

        // Una página fuera de rango de SQLite simplemente está vacía
        let offset = match (page - 1)
            .checked_mul(page_size)
            .and_then(|o| i64::try_from(o).ok())
        {
            Some(offset) => offset,
            None => return Ok((total as u64, Vec::new())),
        };
        let limit = i64::try_from(page_size).unwrap_or(i64::MAX);

        let sql = format!(
            r#"
            SELECT {CAMPAIGN_COLUMNS}
            FROM campaigns
            WHERE business_id = ?1
            ORDER BY created_at DESC
            LIMIT ?2 OFFSET ?3
            "#
        );
        let rows = sqlx::query_as::<_, CampaignRow>(&sql)
            .bind(business_id)
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.db_pool)
            .await
            .context("Fallo al listar campañas")?;

        let items = rows
            .into_iter()
            .map(Campaign::try_from)
            .collect::<Result<Vec<_>>>()?;
        Ok((total as u64, items))
    }

    /// Escritura condicional del registro completo: sólo aplica si nadie más
    /// escribió desde que se leyó (`version`). Devuelve `false` si perdió la carrera.
    pub async fn save(&self, campaign: &mut Campaign) -> Result<bool> {
        let now = Utc::now();
        let recipients = serde_json::to_string(&campaign.recipients)?;
        let result = sqlx::query(
            r#"
            UPDATE campaigns
            SET status = ?1,
                recipients = ?2,
                provider_batch_id = ?3,
                error_message = ?4,
                started_at = ?5,
                completed_at = ?6,
                completed_calls = ?7,
                successful_calls = ?8,
                failed_calls = ?9,
                last_synced_at = ?10,
                updated_at = ?11,
                version = version + 1
            WHERE id = ?12 AND version = ?13
            "#,
        )
        .bind(campaign.status.as_str())
        .bind(recipients)
        .bind(&campaign.provider_batch_id)
        .bind(&campaign.error_message)
        .bind(fmt_ts(campaign.started_at))
        .bind(fmt_ts(campaign.completed_at))
        .bind(campaign.completed_calls)
        .bind(campaign.successful_calls)
        .bind(campaign.failed_calls)
        .bind(fmt_ts(campaign.last_synced_at))
        .bind(now.to_rfc3339())
        .bind(&campaign.id)
        .bind(campaign.version)
        .execute(&self.db_pool)
        .await
        .context("Fallo al actualizar campaña")?;

        if result.rows_affected() == 0 {
            log::warn!(
                "(CampaignStore::save) Conflicto de versión en campaña {} (version={})",
                campaign.id,
                campaign.version
            );
            return Ok(false);
        }
        campaign.version += 1;
        campaign.updated_at = now;
        Ok(true)
    }
}
