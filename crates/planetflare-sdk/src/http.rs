use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;

use crate::error::{ErrorResponse, Result, SdkError};

pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

#[derive(Clone, Debug)]
pub struct HttpConfig {
    pub timeout_secs: u64,
    pub user_agent: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            user_agent: format!("planetflare-sdk/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl HttpConfig {
    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }
}

/// JSON over HTTP, with publisher error bodies turned into `SdkError::Publisher`
pub struct HttpClient {
    client: Client,
}

impl HttpClient {
    pub fn new(config: HttpConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| SdkError::Http(format!("Failed to build client: {}", e)))?;

        Ok(Self { client })
    }

    pub async fn get_json<R: DeserializeOwned>(&self, url: &str) -> Result<R> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| SdkError::Http(format!("GET request failed: {}", e)))?;
        Self::decode(response).await
    }

    pub async fn post_json<T: Serialize, R: DeserializeOwned>(&self, url: &str, body: &T) -> Result<R> {
        let response = self
            .client
            .post(url)
            .json(body)
            .send()
            .await
            .map_err(|e| SdkError::Http(format!("POST request failed: {}", e)))?;
        Self::decode(response).await
    }

    async fn decode<R: DeserializeOwned>(response: Response) -> Result<R> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ErrorResponse>(&body)
                .map(|e| e.error)
                .unwrap_or(body);
            tracing::debug!(status = status.as_u16(), %message, "publisher returned an error");
            return Err(SdkError::Publisher {
                status: status.as_u16(),
                message,
            });
        }

        response
            .json()
            .await
            .map_err(|e| SdkError::Http(format!("JSON parse failed: {}", e)))
    }
}
