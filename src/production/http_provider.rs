//! Reqwest-based credential provider

use std::time::{Duration, Instant};

use reqwest::header::RETRY_AFTER;
use reqwest::{Client, Url};
use serde::Deserialize;

use crate::traits::{CredentialProvider, IssuedToken, ProviderError, RegistrationToken};

const TIMEOUT_SECONDS: u64 = 25;

#[derive(Debug, Deserialize)]
struct RemovalTokenResponse {
    token: RegistrationToken,
}

pub struct ReqwestCredentialProvider {
    client: Client,
    base_url: Url,
    auth_token: Option<String>,
}

impl ReqwestCredentialProvider {
    pub fn new(base_url: &str, auth_token: Option<String>) -> Result<Self, ProviderError> {
        let mut base_url =
            Url::parse(base_url).map_err(|e| ProviderError::InvalidUrl(e.to_string()))?;
        // Url::join replaces the last segment unless the base ends with a slash
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(TIMEOUT_SECONDS))
            .user_agent(concat!("runner-rotator/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ProviderError::NetworkError(e.to_string()))?;

        tracing::debug!("Initialized credential provider client with {}s timeout", TIMEOUT_SECONDS);
        Ok(Self {
            client,
            base_url,
            auth_token,
        })
    }

    fn endpoint(&self, name: &str) -> Result<Url, ProviderError> {
        self.base_url
            .join(name)
            .map_err(|e| ProviderError::InvalidUrl(e.to_string()))
    }

    fn apply_auth(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.auth_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn post<T: serde::de::DeserializeOwned>(&self, name: &str) -> Result<T, ProviderError> {
        let url = self.endpoint(name)?;
        tracing::info!("Requesting {} from: {}", name, url);

        let start = Instant::now();
        let request = self
            .client
            .post(url.clone())
            .header("Accept", "application/json");
        let request = self.apply_auth(request);

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                tracing::warn!("Provider timeout: {}", url);
                ProviderError::Timeout
            } else if e.is_connect() || e.is_request() {
                tracing::warn!("Network error: {}", e);
                ProviderError::NetworkError(e.to_string())
            } else {
                tracing::error!("Unexpected error: {}", e);
                ProviderError::NetworkError(e.to_string())
            }
        })?;

        let duration_ms = start.elapsed().as_millis() as u64;
        let status = response.status().as_u16();
        tracing::info!("Provider response: status={}, duration={}ms", status, duration_ms);

        if !(200..300).contains(&status) {
            let retry_after = parse_retry_after(response.headers().get(RETRY_AFTER));
            tracing::warn!(status, retry_after = ?retry_after, "HTTP error response");
            return Err(ProviderError::HttpError {
                status,
                retry_after,
            });
        }

        response
            .json::<T>()
            .await
            .map_err(|e| ProviderError::Decode(e.to_string()))
    }
}

/// Integer-seconds form of `Retry-After`. The HTTP-date form is ignored.
fn parse_retry_after(value: Option<&reqwest::header::HeaderValue>) -> Option<u64> {
    value
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.trim().parse::<u64>().ok())
}

#[async_trait::async_trait]
impl CredentialProvider for ReqwestCredentialProvider {
    async fn issue_token(&self) -> Result<IssuedToken, ProviderError> {
        let issued: IssuedToken = self.post("registration-token").await?;
        if issued.token.is_empty() {
            return Err(ProviderError::Decode("empty token in response".to_string()));
        }
        tracing::info!(
            token = %issued.token,
            expires_at = %issued.expires_at.to_rfc3339(),
            "Issued registration token"
        );
        Ok(issued)
    }

    async fn removal_token(&self) -> Result<RegistrationToken, ProviderError> {
        let response: RemovalTokenResponse = self.post("remove-token").await?;
        if response.token.is_empty() {
            return Err(ProviderError::Decode("empty removal token in response".to_string()));
        }
        Ok(response.token)
    }
}
