//! services/voice_provider.rs
//! Cliente del proveedor externo de llamadas (batch calling + conversaciones).

use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde::Deserialize;

use crate::config::app_config::ProviderConfig;
use crate::errors::ProviderError;
use crate::models::provider_model::{
    BatchProgress, BatchSubmission, ConversationDetail, SubmittedBatch, TranscriptTurn,
};

#[async_trait]
pub trait VoiceProvider: Send + Sync {
    async fn submit_batch(&self, payload: &BatchSubmission) -> Result<SubmittedBatch, ProviderError>;

    async fn get_batch(&self, batch_id: &str) -> Result<BatchProgress, ProviderError>;

    async fn cancel_batch(&self, batch_id: &str) -> Result<(), ProviderError>;

    /// `ProviderError::NotFound` si la conversación todavía no está disponible.
    async fn get_conversation(
        &self,
        conversation_id: &str,
    ) -> Result<ConversationDetail, ProviderError>;
}

#[derive(Debug, Deserialize)]
struct RawConversation {
    conversation_id: String,
    #[serde(default)]
    transcript: Vec<TranscriptTurn>,
    #[serde(default)]
    metadata: RawConversationMetadata,
    #[serde(default)]
    analysis: Option<RawAnalysis>,
}

#[derive(Debug, Default, Deserialize)]
struct RawConversationMetadata {
    #[serde(default)]
    call_duration_secs: Option<i64>,
    #[serde(default)]
    termination_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawAnalysis {
    #[serde(default)]
    sentiment: Option<String>,
    #[serde(default)]
    call_successful: Option<String>,
}

impl From<RawConversation> for ConversationDetail {
    fn from(raw: RawConversation) -> Self {
        let sentiment = raw
            .analysis
            .and_then(|a| a.sentiment.or(a.call_successful));
        ConversationDetail {
            conversation_id: raw.conversation_id,
            transcript: raw.transcript,
            duration_secs: raw.metadata.call_duration_secs,
            termination_reason: raw.metadata.termination_reason,
            sentiment,
        }
    }
}

#[derive(Clone)]
pub struct HttpVoiceProvider {
    http_client: Client,
    base_url: String,
    api_key: String,
}

impl HttpVoiceProvider {
    pub fn new(config: &ProviderConfig) -> anyhow::Result<Self> {
        let http_client = Client::builder().timeout(config.timeout).build()?;
        Ok(Self {
            http_client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/v1/convai{}", self.base_url, path)
    }

    /// 404 -> NotFound, otro no-2xx -> Http con el cuerpo del proveedor.
    async fn check(resp: Response, what: &str) -> Result<Response, ProviderError> {
        let status = resp.status();
        if status == StatusCode::NOT_FOUND {
            return Err(ProviderError::NotFound(what.to_string()));
        }
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ProviderError::Http {
                status: status.as_u16(),
                body,
            });
        }
        Ok(resp)
    }
}

#[async_trait]
impl VoiceProvider for HttpVoiceProvider {
    async fn submit_batch(&self, payload: &BatchSubmission) -> Result<SubmittedBatch, ProviderError> {
        log::info!(
            "(submit_batch) Enviando batch '{}' con {} destinatarios",
            payload.call_name,
            payload.recipients.len()
        );
        let resp = self
            .http_client
            .post(self.url("/batch-calling/submit"))
            .header("xi-api-key", &self.api_key)
            .json(payload)
            .send()
            .await?;
        let resp = Self::check(resp, "batch-calling/submit").await?;
        Ok(resp.json::<SubmittedBatch>().await?)
    }

    async fn get_batch(&self, batch_id: &str) -> Result<BatchProgress, ProviderError> {
        let resp = self
            .http_client
            .get(self.url(&format!(
                "/batch-calling/{}",
                urlencoding::encode(batch_id)
            )))
            .header("xi-api-key", &self.api_key)
            .send()
            .await?;
        let resp = Self::check(resp, batch_id).await?;
        Ok(resp.json::<BatchProgress>().await?)
    }

    async fn cancel_batch(&self, batch_id: &str) -> Result<(), ProviderError> {
        let resp = self
            .http_client
            .post(self.url(&format!(
                "/batch-calling/{}/cancel",
                urlencoding::encode(batch_id)
            )))
            .header("xi-api-key", &self.api_key)
            .send()
            .await?;
        Self::check(resp, batch_id).await?;
        Ok(())
    }

    async fn get_conversation(
        &self,
        conversation_id: &str,
    ) -> Result<ConversationDetail, ProviderError> {
        let resp = self
            .http_client
            .get(self.url(&format!(
                "/conversations/{}",
                urlencoding::encode(conversation_id)
            )))
            .header("xi-api-key", &self.api_key)
            .send()
            .await?;
        let resp = Self::check(resp, conversation_id).await?;
        let raw = resp.json::<RawConversation>().await?;
        Ok(raw.into())
    }
}
