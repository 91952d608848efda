//! tests/support.rs
//! Fakes de colaboradores y base SQLite en memoria.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{json, Map, Value};
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{Pool, Sqlite};

use crate::config::app_config::AppConfig;
use crate::errors::{DncUnavailable, ProviderError};
use crate::models::campaign_model::{CallType, Campaign, CampaignStatus, CreateCampaignRequest, Roster};
use crate::models::provider_model::{
    BatchProgress, BatchSubmission, ConversationDetail, RemoteRecipient, SubmittedBatch,
};
use crate::models::recipient_model::{DynamicVariables, Recipient};
use crate::models::registry_model::{AssistantRecord, EntitlementDecision, PhoneNumberRecord};
use crate::services::call_log_service::SqliteCallLogStore;
use crate::services::campaign_service::{CampaignService, Collaborators};
use crate::services::campaign_store::CampaignStore;
use crate::services::dnc_guard::DncStore;
use crate::services::registry_service::{AssistantRegistry, EntitlementResolver, PhoneNumberRegistry};
use crate::services::voice_provider::VoiceProvider;

pub const BUSINESS: &str = "biz_1";

/// Una sola conexión que no expira: cada conexión a `:memory:` es otra base.
pub async fn test_pool() -> Pool<Sqlite> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect("sqlite::memory:")
        .await
        .expect("No se pudo abrir SQLite en memoria");
    CampaignStore::new(pool.clone())
        .run_migrations()
        .await
        .expect("Migraciones fallaron");
    pool
}

pub fn test_config() -> AppConfig {
    AppConfig {
        reconcile_timeout: Duration::from_millis(500),
        ..AppConfig::default()
    }
}

pub fn row(phone: Value, extra: &[(&str, Value)]) -> Map<String, Value> {
    let mut m = Map::new();
    m.insert("phone".to_string(), phone);
    for (k, v) in extra {
        m.insert(k.to_string(), v.clone());
    }
    m
}

pub fn roster(rows: Vec<Map<String, Value>>) -> Roster {
    Roster {
        columns: vec![],
        rows,
    }
}

pub fn create_request(phones: &[&str]) -> CreateCampaignRequest {
    CreateCampaignRequest {
        name: "Cobranza marzo".to_string(),
        assistant_id: "asst_1".to_string(),
        phone_number_id: "pn_1".to_string(),
        roster: roster(
            phones
                .iter()
                .map(|p| row(json!(p), &[("customer_name", json!("Ayşe"))]))
                .collect(),
        ),
        column_mapping: None,
        default_country: Some("TR".to_string()),
        scheduled_at: None,
    }
}

pub fn remote(id: &str, status: &str, conversation_id: Option<&str>) -> RemoteRecipient {
    RemoteRecipient {
        id: Some(id.to_string()),
        phone_number: None,
        status: status.to_string(),
        conversation_id: conversation_id.map(str::to_string),
        duration_secs: None,
        termination_reason: None,
    }
}

pub fn progress(status: &str, scheduled: i64, dispatched: i64, finished: i64) -> BatchProgress {
    BatchProgress {
        status: status.to_string(),
        total_calls_scheduled: scheduled,
        total_calls_dispatched: dispatched,
        total_calls_finished: finished,
        recipients: vec![],
    }
}

#[derive(Default)]
pub struct FakeProvider {
    pub submit_error: Mutex<Option<String>>,
    pub progress: Mutex<Option<BatchProgress>>,
    pub get_batch_delay: Mutex<Option<Duration>>,
    pub cancel_fails: AtomicBool,
    pub cancel_calls: AtomicUsize,
    pub conversations: Mutex<HashMap<String, ConversationDetail>>,
    pub conversation_calls: AtomicUsize,
    pub submitted: Mutex<Vec<BatchSubmission>>,
    /// Si está, escribe la campaña mientras el envío está en vuelo (webhook temprano).
    pub concurrent_writer: Mutex<Option<CampaignStore>>,
}

impl FakeProvider {
    pub fn set_progress(&self, p: BatchProgress) {
        *self.progress.lock().unwrap() = Some(p);
    }

    pub fn add_conversation(&self, conversation_id: &str, duration: i64) {
        self.conversations.lock().unwrap().insert(
            conversation_id.to_string(),
            ConversationDetail {
                conversation_id: conversation_id.to_string(),
                transcript: vec![],
                duration_secs: Some(duration),
                termination_reason: Some("client_hangup".to_string()),
                sentiment: Some("positive".to_string()),
            },
        );
    }
}

#[async_trait]
impl VoiceProvider for FakeProvider {
    async fn submit_batch(&self, payload: &BatchSubmission) -> Result<SubmittedBatch, ProviderError> {
        self.submitted.lock().unwrap().push(payload.clone());
        let writer = self.concurrent_writer.lock().unwrap().clone();
        if let Some(store) = writer {
            let campaign_id = &payload.recipients[0].metadata.campaign_id;
            let mut campaign = store.get_by_id(campaign_id).await.unwrap().unwrap();
            assert!(store.save(&mut campaign).await.unwrap());
        }
        if let Some(body) = self.submit_error.lock().unwrap().clone() {
            return Err(ProviderError::Http { status: 422, body });
        }
        Ok(SubmittedBatch {
            id: "batch_1".to_string(),
            status: Some("pending".to_string()),
        })
    }

    async fn get_batch(&self, _batch_id: &str) -> Result<BatchProgress, ProviderError> {
        let delay = *self.get_batch_delay.lock().unwrap();
        if let Some(d) = delay {
            tokio::time::sleep(d).await;
        }
        self.progress
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| ProviderError::Transport("connection refused".to_string()))
    }

    async fn cancel_batch(&self, _batch_id: &str) -> Result<(), ProviderError> {
        self.cancel_calls.fetch_add(1, Ordering::SeqCst);
        if self.cancel_fails.load(Ordering::SeqCst) {
            return Err(ProviderError::Transport("network unreachable".to_string()));
        }
        Ok(())
    }

    async fn get_conversation(
        &self,
        conversation_id: &str,
    ) -> Result<ConversationDetail, ProviderError> {
        self.conversation_calls.fetch_add(1, Ordering::SeqCst);
        self.conversations
            .lock()
            .unwrap()
            .get(conversation_id)
            .cloned()
            .ok_or_else(|| ProviderError::NotFound(conversation_id.to_string()))
    }
}

#[derive(Default)]
pub struct FakeDnc {
    pub blocked: Vec<String>,
    pub unavailable: bool,
}

#[async_trait]
impl DncStore for FakeDnc {
    async fn find_blocked(
        &self,
        _business_id: &str,
        phones: &[String],
    ) -> Result<Vec<String>, DncUnavailable> {
        if self.unavailable {
            return Err(DncUnavailable("timeout".to_string()));
        }
        Ok(phones
            .iter()
            .filter(|p| self.blocked.contains(p))
            .cloned()
            .collect())
    }
}

pub struct FakeRegistry {
    pub provider_agent_id: Option<String>,
    pub decision: EntitlementDecision,
}

impl Default for FakeRegistry {
    fn default() -> Self {
        FakeRegistry {
            provider_agent_id: Some("agent_xyz".to_string()),
            decision: EntitlementDecision::granted(),
        }
    }
}

#[async_trait]
impl AssistantRegistry for FakeRegistry {
    async fn find_assistant(
        &self,
        business_id: &str,
        assistant_id: &str,
    ) -> anyhow::Result<Option<AssistantRecord>> {
        Ok((assistant_id == "asst_1").then(|| AssistantRecord {
            id: assistant_id.to_string(),
            business_id: business_id.to_string(),
            name: "Cobranza".to_string(),
            direction: "outbound".to_string(),
            provider_agent_id: self.provider_agent_id.clone(),
            is_active: true,
        }))
    }
}

#[async_trait]
impl PhoneNumberRegistry for FakeRegistry {
    async fn find_phone_number(
        &self,
        business_id: &str,
        phone_number_id: &str,
    ) -> anyhow::Result<Option<PhoneNumberRecord>> {
        Ok((phone_number_id == "pn_1").then(|| PhoneNumberRecord {
            id: phone_number_id.to_string(),
            business_id: business_id.to_string(),
            number: "+908501112233".to_string(),
            provider_phone_number_id: Some("phnum_abc".to_string()),
            is_active: true,
        }))
    }
}

#[async_trait]
impl EntitlementResolver for FakeRegistry {
    async fn resolve_outbound_access(&self, _business_id: &str) -> anyhow::Result<EntitlementDecision> {
        Ok(self.decision.clone())
    }
}

pub struct Harness {
    pub pool: Pool<Sqlite>,
    pub provider: Arc<FakeProvider>,
    pub service: CampaignService,
}

pub async fn harness_with(dnc: FakeDnc, registry: FakeRegistry) -> Harness {
    let pool = test_pool().await;
    let provider = Arc::new(FakeProvider::default());
    let registry = Arc::new(registry);
    let collaborators = Collaborators {
        provider: provider.clone(),
        dnc_store: Arc::new(dnc),
        assistants: registry.clone(),
        phone_numbers: registry.clone(),
        entitlements: registry,
        call_logs: Arc::new(SqliteCallLogStore::new(pool.clone())),
    };
    let service = CampaignService::new(CampaignStore::new(pool.clone()), collaborators, &test_config());
    Harness {
        pool,
        provider,
        service,
    }
}

pub async fn harness() -> Harness {
    harness_with(FakeDnc::default(), FakeRegistry::default()).await
}

pub async fn count_call_logs(pool: &Pool<Sqlite>) -> i64 {
    sqlx::query_scalar("SELECT COUNT(*) FROM call_logs")
        .fetch_one(pool)
        .await
        .unwrap()
}

pub fn campaign_fixture(status: CampaignStatus, recipients: Vec<Recipient>) -> Campaign {
    let now = Utc::now();
    Campaign {
        id: "camp_1".to_string(),
        business_id: BUSINESS.to_string(),
        assistant_id: "asst_1".to_string(),
        phone_number_id: "pn_1".to_string(),
        name: "Cobranza marzo".to_string(),
        status,
        call_type: CallType::BillingReminder,
        total_recipients: recipients.len() as i64,
        recipients,
        provider_batch_id: Some("batch_1".to_string()),
        error_message: None,
        scheduled_at: None,
        started_at: None,
        completed_at: None,
        completed_calls: 0,
        successful_calls: 0,
        failed_calls: 0,
        last_synced_at: None,
        version: 0,
        created_at: now,
        updated_at: now,
    }
}

pub fn recipients(n: usize) -> Vec<Recipient> {
    (1..=n)
        .map(|i| {
            Recipient::new(
                format!("recipient_{}", i),
                format!("+90533123450{}", i),
                DynamicVariables::default(),
            )
        })
        .collect()
}
