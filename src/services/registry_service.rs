//! services/registry_service.rs
//! Consultas de sólo lectura a asistentes, números y plan del negocio.

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::{Pool, Sqlite};

use crate::models::registry_model::{AssistantRecord, EntitlementDecision, PhoneNumberRecord};

#[async_trait]
pub trait AssistantRegistry: Send + Sync {
    async fn find_assistant(
        &self,
        business_id: &str,
        assistant_id: &str,
    ) -> Result<Option<AssistantRecord>>;
}

#[async_trait]
pub trait PhoneNumberRegistry: Send + Sync {
    async fn find_phone_number(
        &self,
        business_id: &str,
        phone_number_id: &str,
    ) -> Result<Option<PhoneNumberRecord>>;
}

#[async_trait]
pub trait EntitlementResolver: Send + Sync {
    async fn resolve_outbound_access(&self, business_id: &str) -> Result<EntitlementDecision>;
}

/// Plan mínimo que habilita campañas salientes.
const OUTBOUND_PLAN: &str = "pro";

#[derive(Clone, Debug)]
pub struct SqliteRegistry {
    db_pool: Pool<Sqlite>,
}

impl SqliteRegistry {
    pub fn new(db_pool: Pool<Sqlite>) -> Self {
        SqliteRegistry { db_pool }
    }
}

#[derive(sqlx::FromRow)]
struct AssistantRow {
    id: String,
    business_id: String,
    name: String,
    direction: String,
    provider_agent_id: Option<String>,
    is_active: i64,
}

#[derive(sqlx::FromRow)]
struct PhoneNumberRow {
    id: String,
    business_id: String,
    number: String,
    provider_phone_number_id: Option<String>,
    is_active: i64,
}

#[derive(sqlx::FromRow)]
struct PlanRow {
    status: String,
    outbound_enabled: i64,
}

#[async_trait]
impl AssistantRegistry for SqliteRegistry {
    async fn find_assistant(
        &self,
        business_id: &str,
        assistant_id: &str,
    ) -> Result<Option<AssistantRecord>> {
        let row = sqlx::query_as::<_, AssistantRow>(
            r#"
            SELECT id, business_id, name, direction, provider_agent_id, is_active
            FROM assistants
            WHERE id = ?1 AND business_id = ?2
            "#,
        )
        .bind(assistant_id)
        .bind(business_id)
        .fetch_optional(&self.db_pool)
        .await
        .context("Fallo al consultar asistente")?;

        Ok(row.map(|r| AssistantRecord {
            id: r.id,
            business_id: r.business_id,
            name: r.name,
            direction: r.direction,
            provider_agent_id: r.provider_agent_id,
            is_active: r.is_active != 0,
        }))
    }
}

#[async_trait]
impl PhoneNumberRegistry for SqliteRegistry {
    async fn find_phone_number(
        &self,
        business_id: &str,
        phone_number_id: &str,
    ) -> Result<Option<PhoneNumberRecord>> {
        let row = sqlx::query_as::<_, PhoneNumberRow>(
            r#"
            SELECT id, business_id, number, provider_phone_number_id, is_active
            FROM phone_numbers
            WHERE id = ?1 AND business_id = ?2
            "#,
        )
        .bind(phone_number_id)
        .bind(business_id)
        .fetch_optional(&self.db_pool)
        .await
        .context("Fallo al consultar número de teléfono")?;

        Ok(row.map(|r| PhoneNumberRecord {
            id: r.id,
            business_id: r.business_id,
            number: r.number,
            provider_phone_number_id: r.provider_phone_number_id,
            is_active: r.is_active != 0,
        }))
    }
}

#[async_trait]
impl EntitlementResolver for SqliteRegistry {
    async fn resolve_outbound_access(&self, business_id: &str) -> Result<EntitlementDecision> {
        let row = sqlx::query_as::<_, PlanRow>(
            "SELECT status, outbound_enabled FROM business_plans WHERE business_id = ?1",
        )
        .bind(business_id)
        .fetch_optional(&self.db_pool)
        .await
        .context("Fallo al consultar plan del negocio")?;

        let decision = match row {
            None => EntitlementDecision::denied("NO_SUBSCRIPTION", Some(OUTBOUND_PLAN)),
            Some(plan) if plan.status != "active" => {
                EntitlementDecision::denied("SUBSCRIPTION_INACTIVE", None)
            }
            Some(plan) if plan.outbound_enabled == 0 => {
                EntitlementDecision::denied("PLAN_UPGRADE_REQUIRED", Some(OUTBOUND_PLAN))
            }
            Some(_) => EntitlementDecision::granted(),
        };
        Ok(decision)
    }
}
