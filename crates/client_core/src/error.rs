use shared::error::ApiError;
use thiserror::Error;

/// Local precondition failures. These are raised before any request is issued.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("group name must not be empty")]
    EmptyGroupName,
    #[error("a group needs at least one selected member")]
    NoGroupMembers,
    #[error("peer identifier must not be empty")]
    EmptyPeer,
    #[error("message content must not be empty")]
    EmptyMessage,
    #[error("no conversation is selected")]
    NoActiveConversation,
    #[error("search query must not be empty")]
    EmptyQuery,
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("failed to build http client: {0}")]
    Client(#[source] reqwest::Error),
    #[error("invalid endpoint url: {0}")]
    Url(#[from] url::ParseError),
    #[error("request to {path} failed: {source}")]
    Request {
        path: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("{path} returned {status}: {error}")]
    Status {
        path: String,
        status: u16,
        error: ApiError,
    },
    #[error("failed to decode response from {path}: {source}")]
    Decode {
        path: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("chat api unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("server_url must start with http:// or https://, got '{0}'")]
    InvalidServerUrl(String),
    #[error("invalid live channel url: {0}")]
    Url(#[from] url::ParseError),
    #[error("failed to connect live channel at {server_url}: {source}")]
    Connect {
        server_url: String,
        #[source]
        source: Box<tokio_tungstenite::tungstenite::Error>,
    },
    #[error("live channel is closed")]
    Closed,
}

#[derive(Debug, Error)]
pub enum ClientError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error(transparent)]
    Channel(#[from] ChannelError),
}
