use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use shared::{
    domain::{ConversationId, ServiceId, UserId},
    error::ApiError,
    protocol::{
        MessagePage, MessageRecord, ResolveConversationRequest, ResolveConversationResponse,
        SendMessageRequest, SendMessageResponse,
    },
};

/// The REST surface the conversation client depends on. Narrow by design so
/// tests can substitute a double without a network.
#[async_trait]
pub trait ConversationBackend: Send + Sync {
    /// Create-or-fetch the conversation for a (provider, service) pair.
    /// Idempotent server-side: the same pair always yields the same id.
    async fn resolve_conversation(
        &self,
        provider_id: &UserId,
        service_id: &ServiceId,
    ) -> Result<ConversationId>;

    /// One page of history, ascending. `cursor = None` requests the latest
    /// page; an opaque cursor from a previous page requests older messages.
    async fn fetch_messages(
        &self,
        conversation_id: &ConversationId,
        limit: u32,
        cursor: Option<&str>,
    ) -> Result<MessagePage>;

    async fn post_message(
        &self,
        conversation_id: &ConversationId,
        text: &str,
    ) -> Result<MessageRecord>;

    async fn mark_read(&self, conversation_id: &ConversationId) -> Result<()>;
}

#[derive(Debug, Clone)]
pub struct BackendConfig {
    pub base_url: String,
    pub bearer_token: String,
}

/// `ConversationBackend` over the marketplace REST API: JSON over HTTPS,
/// bearer-token authenticated.
pub struct HttpBackend {
    http: Client,
    config: BackendConfig,
}

impl HttpBackend {
    pub fn new(config: BackendConfig) -> Self {
        Self {
            http: Client::new(),
            config,
        }
    }

    /// Decodes the backend's structured error body when present so failures
    /// carry the server-side error code, not just an HTTP status.
    async fn check(response: reqwest::Response) -> Result<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        if let Ok(body) = response.json::<ApiError>().await {
            return Err(anyhow!(body).context(format!("server rejected request ({status})")));
        }
        Err(anyhow!("server returned {status}"))
    }
}

#[async_trait]
impl ConversationBackend for HttpBackend {
    async fn resolve_conversation(
        &self,
        provider_id: &UserId,
        service_id: &ServiceId,
    ) -> Result<ConversationId> {
        let url = format!(
            "{}/conversations/with-service/{provider_id}",
            self.config.base_url
        );
        let response = self
            .http
            .post(url)
            .bearer_auth(&self.config.bearer_token)
            .json(&ResolveConversationRequest {
                service_id: service_id.clone(),
            })
            .send()
            .await
            .context("conversation resolution request failed")?;
        let body: ResolveConversationResponse = Self::check(response)
            .await?
            .json()
            .await
            .context("invalid conversation resolution response")?;
        Ok(body.conversation.id)
    }

    async fn fetch_messages(
        &self,
        conversation_id: &ConversationId,
        limit: u32,
        cursor: Option<&str>,
    ) -> Result<MessagePage> {
        let url = format!("{}/messages/{conversation_id}", self.config.base_url);
        let mut request = self
            .http
            .get(url)
            .bearer_auth(&self.config.bearer_token)
            .query(&[("limit", limit.to_string())]);
        if let Some(cursor) = cursor {
            request = request.query(&[("cursor", cursor)]);
        }
        let response = request
            .send()
            .await
            .context("message history request failed")?;
        let page: MessagePage = Self::check(response)
            .await?
            .json()
            .await
            .context("invalid message history response")?;
        Ok(page)
    }

    async fn post_message(
        &self,
        conversation_id: &ConversationId,
        text: &str,
    ) -> Result<MessageRecord> {
        let url = format!("{}/messages/{conversation_id}", self.config.base_url);
        let response = self
            .http
            .post(url)
            .bearer_auth(&self.config.bearer_token)
            .json(&SendMessageRequest {
                text: text.to_string(),
            })
            .send()
            .await
            .context("send message request failed")?;
        let body: SendMessageResponse = Self::check(response)
            .await?
            .json()
            .await
            .context("invalid send message response")?;
        Ok(body.message)
    }

    async fn mark_read(&self, conversation_id: &ConversationId) -> Result<()> {
        let url = format!("{}/messages/{conversation_id}/read", self.config.base_url);
        let response = self
            .http
            .post(url)
            .bearer_auth(&self.config.bearer_token)
            .send()
            .await
            .context("mark read request failed")?;
        // Response body is ignored; only the status matters.
        Self::check(response).await?;
        Ok(())
    }
}
