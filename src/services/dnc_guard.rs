//! services/dnc_guard.rs
//! Filtro de no-llamar. Falla cerrado: sin registro no hay llamadas.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use sqlx::{Pool, QueryBuilder, Row, Sqlite};

use crate::errors::{CampaignError, DncUnavailable};
use crate::services::recipient_builder::RecipientDraft;

/// Máximo de parámetros por consulta IN (...)
const DNC_QUERY_CHUNK: usize = 500;

#[async_trait]
pub trait DncStore: Send + Sync {
    /// Devuelve el subconjunto de `phones` bloqueado para el negocio.
    /// Un `Err` significa "no se sabe", nunca "ninguno bloqueado".
    async fn find_blocked(
        &self,
        business_id: &str,
        phones: &[String],
    ) -> Result<Vec<String>, DncUnavailable>;
}

/// Algo con un teléfono E.164 que se puede filtrar.
pub trait PhoneTarget {
    fn phone_e164(&self) -> &str;
}

impl PhoneTarget for RecipientDraft {
    fn phone_e164(&self) -> &str {
        &self.phone_e164
    }
}

#[derive(Debug, Clone)]
pub struct DncPartition<T> {
    pub allowed: Vec<T>,
    pub blocked: Vec<T>,
}

#[derive(Clone)]
pub struct DncGuard {
    store: Arc<dyn DncStore>,
}

impl DncGuard {
    pub fn new(store: Arc<dyn DncStore>) -> Self {
        DncGuard { store }
    }

    /// Separa permitidos y bloqueados. `allowed.len() + blocked.len() == input.len()`.
    pub async fn partition<T: PhoneTarget>(
        &self,
        business_id: &str,
        items: Vec<T>,
    ) -> Result<DncPartition<T>, DncUnavailable> {
        let phones: Vec<String> = items.iter().map(|i| i.phone_e164().to_string()).collect();
        let blocked: HashSet<String> = self
            .store
            .find_blocked(business_id, &phones)
            .await?
            .into_iter()
            .collect();

        let (blocked, allowed): (Vec<T>, Vec<T>) = items
            .into_iter()
            .partition(|i| blocked.contains(i.phone_e164()));
        Ok(DncPartition { allowed, blocked })
    }

    /// Como `partition`, pero rechaza la campaña si todo quedó bloqueado.
    pub async fn screen<T: PhoneTarget>(
        &self,
        business_id: &str,
        items: Vec<T>,
    ) -> Result<DncPartition<T>, CampaignError> {
        let total = items.len();
        let partition = self.partition(business_id, items).await.map_err(|e| {
            log::error!(
                "(DncGuard::screen) Registro no disponible para business_id={}: {}",
                business_id,
                e
            );
            CampaignError::ComplianceUnavailable(e)
        })?;

        if partition.allowed.is_empty() {
            return Err(CampaignError::validation(
                "ALL_RECIPIENTS_BLOCKED",
                format!(
                    "Los {} destinatarios están en la lista de no-llamar",
                    total
                ),
            ));
        }
        if !partition.blocked.is_empty() {
            log::warn!(
                "(DncGuard::screen) business_id={} -> {} de {} destinatarios bloqueados por no-llamar",
                business_id,
                partition.blocked.len(),
                total
            );
        }
        Ok(partition)
    }
}

#[derive(Clone, Debug)]
pub struct SqliteDncStore {
    db_pool: Pool<Sqlite>,
}

impl SqliteDncStore {
    pub fn new(db_pool: Pool<Sqlite>) -> Self {
        SqliteDncStore { db_pool }
    }
}

#[async_trait]
impl DncStore for SqliteDncStore {
    async fn find_blocked(
        &self,
        business_id: &str,
        phones: &[String],
    ) -> Result<Vec<String>, DncUnavailable> {
        let mut blocked = Vec::new();
        for chunk in phones.chunks(DNC_QUERY_CHUNK) {
            let mut qb: QueryBuilder<Sqlite> =
                QueryBuilder::new("SELECT phone_e164 FROM do_not_call WHERE business_id = ");
            qb.push_bind(business_id);
            qb.push(" AND phone_e164 IN (");
            let mut separated = qb.separated(", ");
            for phone in chunk {
                separated.push_bind(phone.as_str());
            }
            separated.push_unseparated(")");

            let rows = qb
                .build()
                .fetch_all(&self.db_pool)
                .await
                .map_err(|e| DncUnavailable(e.to_string()))?;
            for row in rows {
                let phone: String = row
                    .try_get("phone_e164")
                    .map_err(|e| DncUnavailable(e.to_string()))?;
                blocked.push(phone);
            }
        }
        Ok(blocked)
    }
}
