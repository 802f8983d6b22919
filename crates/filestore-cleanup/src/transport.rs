use crate::envelope;
use crate::error::{ApiError, ApiResult};
use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{BoxStream, StreamExt};
use serde::Deserialize;
use std::time::Duration;

/// Path prefix of every control API command.
pub const API_PREFIX: &str = "/api/v0/";

/// Open response body of a streamed command, yielded chunk by chunk.
pub type ByteStream = BoxStream<'static, ApiResult<Bytes>>;

/// Request/response access to the node's control API.
///
/// `command` is the path below [`API_PREFIX`] including any query string,
/// already percent-encoded by the caller.
#[async_trait]
pub trait ApiTransport: Send + Sync {
    /// Sends `command` and buffers the whole response. Bodies carrying an
    /// error envelope fail with [`ApiError::Api`]. `None` waits indefinitely.
    async fn request(&self, timeout: Option<Duration>, command: &str) -> ApiResult<String>;

    /// Sends `command` without a deadline and hands back the open body.
    async fn stream(&self, command: &str) -> ApiResult<ByteStream>;
}

/// Builds `<command>?arg=<value>` with `value` percent-encoded.
pub fn command_with_arg(command: &str, arg: &str) -> String {
    format!("{}?arg={}", command, urlencoding::encode(arg))
}

/// Response of the `version` command.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct VersionInfo {
    #[serde(rename = "Version")]
    pub version: String,
    #[serde(rename = "Commit")]
    pub commit: String,
    #[serde(rename = "Repo")]
    pub repo: String,
    #[serde(rename = "System")]
    pub system: String,
    #[serde(rename = "Golang")]
    pub golang: String,
}

/// Checks that the node answers, honoring `timeout`.
pub async fn probe<T: ApiTransport + ?Sized>(
    transport: &T,
    timeout: Option<Duration>,
) -> ApiResult<VersionInfo> {
    let body = transport.request(timeout, "version").await?;
    // An unrecognised payload still proves the node is reachable.
    Ok(serde_json::from_str(&body).unwrap_or_default())
}

/// [`ApiTransport`] over HTTP. Every command is a POST.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    base: String,
}

impl HttpTransport {
    pub fn new(endpoint: &str) -> ApiResult<Self> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| ApiError::InvalidEndpoint(e.to_string()))?;
        Ok(Self::with_client(client, endpoint))
    }

    pub fn with_client(client: reqwest::Client, endpoint: &str) -> Self {
        Self {
            client,
            base: endpoint.trim_end_matches('/').to_string(),
        }
    }

    pub fn url(&self, command: &str) -> String {
        format!("{}{}{}", self.base, API_PREFIX, command)
    }

    fn map_send_error(command: &str, timeout: Option<Duration>, err: reqwest::Error) -> ApiError {
        match timeout {
            Some(after) if err.is_timeout() => ApiError::Timeout {
                command: command.to_string(),
                after,
            },
            _ if err.is_builder() => ApiError::InvalidEndpoint(err.to_string()),
            _ => ApiError::transport(command, err),
        }
    }
}

#[async_trait]
impl ApiTransport for HttpTransport {
    async fn request(&self, timeout: Option<Duration>, command: &str) -> ApiResult<String> {
        let mut request = self.client.post(self.url(command));
        if let Some(timeout) = timeout {
            request = request.timeout(timeout);
        }

        tracing::debug!("POST {}", command);
        let response = request
            .send()
            .await
            .map_err(|e| Self::map_send_error(command, timeout, e))?;
        let body = response
            .bytes()
            .await
            .map_err(|e| Self::map_send_error(command, timeout, e))?;

        let text = String::from_utf8_lossy(&body).into_owned();
        match envelope::classify(&body) {
            Some(message) => Err(ApiError::Api {
                command: command.to_string(),
                message,
                body: text,
            }),
            None => Ok(text),
        }
    }

    async fn stream(&self, command: &str) -> ApiResult<ByteStream> {
        tracing::debug!("POST {} (streamed)", command);
        let response = self
            .client
            .post(self.url(command))
            .send()
            .await
            .map_err(|e| Self::map_send_error(command, None, e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.bytes().await.unwrap_or_default();
            return Err(match envelope::classify(&body) {
                Some(message) => ApiError::Api {
                    command: command.to_string(),
                    message,
                    body: String::from_utf8_lossy(&body).into_owned(),
                },
                None => ApiError::Status {
                    command: command.to_string(),
                    status: status.as_u16(),
                },
            });
        }

        let command = command.to_string();
        Ok(response
            .bytes_stream()
            .map(move |chunk| chunk.map_err(|e| ApiError::transport(command.clone(), e)))
            .boxed())
    }
}
