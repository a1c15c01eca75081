//! Messaging API client.
//!
//! [`MessagingApi`] is the seam between the messaging core and the network;
//! [`HttpMessagingApi`] is the reqwest implementation used in production.

use std::time::Duration;

use async_trait::async_trait;
use parley_shared::api::auth::{LoginRequest, LoginResponse, RegisterRequest, RegisterResponse};
use parley_shared::api::message::{
    MessageHistoryQuery, MessageHistoryResponse, PartnersQuery, PartnersResponse,
    SendMessageRequest, SendMessageResponse, ServerMessage,
};
use parley_shared::api::user::{PublicKeyQuery, PublicKeyResponse};
use parley_shared::api::ErrorResponse;
use parley_shared::ids::Username;
use reqwest::{Client, StatusCode};

/// Failure talking to the Messaging API.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ApiError {
    /// The request never completed (DNS, connect, timeout, TLS).
    #[error("{0}")]
    Transport(String),

    /// The server answered with a non-success status.
    #[error("{message}")]
    Status { status: u16, message: String },

    /// The server answered 2xx with a body we could not read.
    #[error("unexpected response from server: {0}")]
    Decode(String),
}

impl From<reqwest::Error> for ApiError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            Self::Decode(e.to_string())
        } else if e.is_timeout() {
            Self::Transport("request timed out".into())
        } else if e.is_connect() {
            Self::Transport("could not connect to server".into())
        } else {
            Self::Transport("network request failed".into())
        }
    }
}

/// The subset of the Messaging API the client consumes.
#[async_trait]
pub trait MessagingApi: Send + Sync {
    async fn register(&self, request: &RegisterRequest) -> Result<RegisterResponse, ApiError>;

    async fn login(&self, request: &LoginRequest) -> Result<LoginResponse, ApiError>;

    async fn send_message(
        &self,
        request: &SendMessageRequest,
    ) -> Result<SendMessageResponse, ApiError>;

    /// Full history between `username` and `partner`, in whatever order the server keeps.
    async fn fetch_messages(
        &self,
        username: &Username,
        partner: &Username,
    ) -> Result<Vec<ServerMessage>, ApiError>;

    async fn fetch_partners(&self, username: &Username) -> Result<Vec<String>, ApiError>;

    /// The registered public key of `username`, or `None` if the server has none.
    async fn fetch_public_key(&self, username: &Username) -> Result<Option<String>, ApiError>;
}

/// Parse a user-safe error message from a non-success HTTP response.
async fn error_from_response(resp: reqwest::Response, context: &str) -> ApiError {
    let status = resp.status();
    let message = match resp.json::<ErrorResponse>().await {
        Ok(body) if !body.error.is_empty() => body.error,
        _ => format!("{context} (HTTP {status})"),
    };
    ApiError::Status {
        status: status.as_u16(),
        message,
    }
}

pub struct HttpMessagingApi {
    api_base_url: String,
    http_client: Client,
}

impl std::fmt::Debug for HttpMessagingApi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpMessagingApi")
            .field("api_base_url", &self.api_base_url)
            .finish_non_exhaustive()
    }
}

impl HttpMessagingApi {
    pub fn new(api_base_url: impl Into<String>, timeout: Duration) -> Result<Self, ApiError> {
        let http_client = Client::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(5))
            .build()
            .map_err(|e| ApiError::Transport(format!("failed to create HTTP client: {e}")))?;

        Ok(Self {
            api_base_url: api_base_url.into().trim_end_matches('/').to_string(),
            http_client,
        })
    }

    fn api_url(&self, path: &str) -> String {
        format!("{}{path}", self.api_base_url)
    }
}

#[async_trait]
impl MessagingApi for HttpMessagingApi {
    async fn register(&self, request: &RegisterRequest) -> Result<RegisterResponse, ApiError> {
        let resp = self
            .http_client
            .post(self.api_url("/api/register"))
            .json(request)
            .send()
            .await?;

        if !resp.status().is_success() {
            return Err(error_from_response(resp, "registration failed").await);
        }
        // The status text is informational; an empty or non-JSON body is still success.
        Ok(resp.json().await.unwrap_or_default())
    }

    async fn login(&self, request: &LoginRequest) -> Result<LoginResponse, ApiError> {
        let resp = self
            .http_client
            .post(self.api_url("/api/login"))
            .json(request)
            .send()
            .await?;

        if !resp.status().is_success() {
            return Err(error_from_response(resp, "login failed").await);
        }
        Ok(resp.json().await?)
    }

    async fn send_message(
        &self,
        request: &SendMessageRequest,
    ) -> Result<SendMessageResponse, ApiError> {
        let resp = self
            .http_client
            .post(self.api_url("/api/messages/send"))
            .json(request)
            .send()
            .await?;

        if !resp.status().is_success() {
            return Err(error_from_response(resp, "failed to send message").await);
        }
        let body: SendMessageResponse = resp.json().await.unwrap_or_default();
        if let Some(error) = body.error.clone() {
            return Err(ApiError::Status {
                status: StatusCode::OK.as_u16(),
                message: error,
            });
        }
        Ok(body)
    }

    async fn fetch_messages(
        &self,
        username: &Username,
        partner: &Username,
    ) -> Result<Vec<ServerMessage>, ApiError> {
        let resp = self
            .http_client
            .get(self.api_url("/api/messages"))
            .query(&MessageHistoryQuery {
                username: username.to_string(),
                partner: partner.to_string(),
            })
            .send()
            .await?;

        if !resp.status().is_success() {
            return Err(error_from_response(resp, "failed to fetch messages").await);
        }
        let data: MessageHistoryResponse = resp.json().await?;
        Ok(data.messages)
    }

    async fn fetch_partners(&self, username: &Username) -> Result<Vec<String>, ApiError> {
        let resp = self
            .http_client
            .get(self.api_url("/api/messages/partners"))
            .query(&PartnersQuery {
                username: username.to_string(),
            })
            .send()
            .await?;

        if !resp.status().is_success() {
            return Err(error_from_response(resp, "failed to fetch chat partners").await);
        }
        let data: PartnersResponse = resp.json().await?;
        Ok(data.partners)
    }

    async fn fetch_public_key(&self, username: &Username) -> Result<Option<String>, ApiError> {
        let resp = self
            .http_client
            .get(self.api_url("/api/users/public_key"))
            .query(&PublicKeyQuery {
                username: username.to_string(),
            })
            .send()
            .await?;

        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !resp.status().is_success() {
            return Err(error_from_response(resp, "failed to fetch public key").await);
        }
        let data: PublicKeyResponse = resp.json().await?;
        if data.public_key.trim().is_empty() {
            return Ok(None);
        }
        Ok(Some(data.public_key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_url_joins_without_double_slash() {
        let api = HttpMessagingApi::new("http://localhost:5000/", Duration::from_secs(1)).unwrap();
        assert_eq!(api.api_url("/api/login"), "http://localhost:5000/api/login");
    }

    #[test]
    fn status_error_displays_server_message() {
        let err = ApiError::Status {
            status: 400,
            message: "Receiver does not exist".into(),
        };
        assert_eq!(err.to_string(), "Receiver does not exist");
    }

    #[tokio::test]
    async fn unreachable_server_is_transport_error() {
        // Port 9 (discard) on localhost is essentially never listening.
        let api = HttpMessagingApi::new("http://127.0.0.1:9", Duration::from_secs(2)).unwrap();
        let alice = Username::parse("alice").unwrap();
        let err = api.fetch_partners(&alice).await.unwrap_err();
        assert!(matches!(err, ApiError::Transport(_)));
    }
}
