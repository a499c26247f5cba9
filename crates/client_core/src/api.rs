use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use shared::{
    domain::{ConversationId, UserId},
    error::ApiError,
    protocol::{
        ConversationSummary, HistoryEntry, InitiateConversationRequest,
        InitiateConversationResponse, SemanticSearchHit,
    },
};
use url::Url;

use crate::{config::ClientSettings, error::TransportError, session::Session};

/// Request/response side of the chat service.
#[async_trait]
pub trait ChatApi: Send + Sync {
    async fn list_conversations(&self) -> Result<Vec<ConversationSummary>, TransportError>;
    async fn fetch_history(
        &self,
        conversation_id: &ConversationId,
    ) -> Result<Vec<HistoryEntry>, TransportError>;
    async fn initiate_conversation(
        &self,
        request: &InitiateConversationRequest,
    ) -> Result<ConversationId, TransportError>;
    async fn mark_read(&self, conversation_id: &ConversationId) -> Result<(), TransportError>;
    async fn friends_without_conversation(&self) -> Result<Vec<UserId>, TransportError>;
    async fn friends(&self) -> Result<Vec<UserId>, TransportError>;
    async fn semantic_search(
        &self,
        conversation_id: &ConversationId,
        query: &str,
    ) -> Result<Vec<SemanticSearchHit>, TransportError>;
}

pub struct HttpChatApi {
    http: Client,
    base: Url,
    session: Session,
}

impl HttpChatApi {
    pub fn new(settings: &ClientSettings, session: Session) -> Result<Self, TransportError> {
        let mut builder = Client::builder();
        if let Some(timeout) = settings.request_timeout() {
            builder = builder.timeout(timeout);
        }
        let http = builder.build().map_err(TransportError::Client)?;
        let base = Url::parse(settings.server_url.trim())?;
        Ok(Self {
            http,
            base,
            session,
        })
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, TransportError> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| {
                TransportError::Unavailable(format!("server_url cannot be a base: {}", self.base))
            })?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        request.bearer_auth(self.session.token().expose())
    }

    async fn send(request: RequestBuilder, path: &str) -> Result<Response, TransportError> {
        let response = request
            .send()
            .await
            .map_err(|source| TransportError::Request {
                path: path.to_string(),
                source,
            })?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        Err(TransportError::Status {
            path: path.to_string(),
            status: status.as_u16(),
            error: ApiError::from_response(status.as_u16(), &body),
        })
    }

    async fn decode<T: DeserializeOwned>(response: Response, path: &str) -> Result<T, TransportError> {
        response
            .json()
            .await
            .map_err(|source| TransportError::Decode {
                path: path.to_string(),
                source,
            })
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        segments: &[&str],
        query: &[(&str, &str)],
    ) -> Result<T, TransportError> {
        let url = self.endpoint(segments)?;
        let path = url.path().to_string();
        let request = self.authorized(self.http.get(url).query(query));
        let response = Self::send(request, &path).await?;
        Self::decode(response, &path).await
    }
}

#[async_trait]
impl ChatApi for HttpChatApi {
    async fn list_conversations(&self) -> Result<Vec<ConversationSummary>, TransportError> {
        self.get_json(&["chat", "conversations", "list"], &[]).await
    }

    async fn fetch_history(
        &self,
        conversation_id: &ConversationId,
    ) -> Result<Vec<HistoryEntry>, TransportError> {
        self.get_json(&["chat", "history", conversation_id.as_str()], &[])
            .await
    }

    async fn initiate_conversation(
        &self,
        request: &InitiateConversationRequest,
    ) -> Result<ConversationId, TransportError> {
        let url = self.endpoint(&["chat", "conversations", "initiate"])?;
        let path = url.path().to_string();
        let response =
            Self::send(self.authorized(self.http.post(url).json(request)), &path).await?;
        let body: InitiateConversationResponse = Self::decode(response, &path).await?;
        Ok(body.conversation_id)
    }

    async fn mark_read(&self, conversation_id: &ConversationId) -> Result<(), TransportError> {
        let url = self.endpoint(&["chat", "conversations", conversation_id.as_str(), "read"])?;
        let path = url.path().to_string();
        Self::send(self.authorized(self.http.post(url)), &path).await?;
        Ok(())
    }

    async fn friends_without_conversation(&self) -> Result<Vec<UserId>, TransportError> {
        self.get_json(&["friends", "no-conversation"], &[]).await
    }

    async fn friends(&self) -> Result<Vec<UserId>, TransportError> {
        self.get_json(&["friends", "list"], &[]).await
    }

    async fn semantic_search(
        &self,
        conversation_id: &ConversationId,
        query: &str,
    ) -> Result<Vec<SemanticSearchHit>, TransportError> {
        self.get_json(
            &["chat", "search", "semantic"],
            &[("query", query), ("conversation_id", conversation_id.as_str())],
        )
        .await
    }
}

#[cfg(test)]
#[path = "tests/api_tests.rs"]
mod tests;
