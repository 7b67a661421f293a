//! Main client for the StakeKit API.

use crate::api::*;
use crate::config::{ClientConfig, RetryConfig, DEFAULT_FALLBACK_URL, DEFAULT_PRIMARY_URL, DEFAULT_TIMEOUT};
use crate::error::{SdkError, SdkResult};
use crate::transport::HttpTransport;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

/// Main client for interacting with the StakeKit API.
#[derive(Debug, Clone)]
pub struct StakeKitClient {
    config: Arc<ClientConfig>,
    pub(crate) http: HttpTransport,
}

impl StakeKitClient {
    /// Create a new client builder.
    pub fn builder() -> StakeKitClientBuilder {
        StakeKitClientBuilder::new()
    }

    /// Create a client from configuration.
    pub fn from_config(config: ClientConfig) -> SdkResult<Self> {
        let config = Arc::new(config);
        let http = HttpTransport::new(config.clone())?;

        Ok(Self { config, http })
    }

    /// Configuration the client was built with.
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Raw transport, for endpoints without a typed wrapper.
    pub fn http(&self) -> &HttpTransport {
        &self.http
    }

    /// Get the networks API.
    pub fn networks(&self) -> NetworksApi<'_> {
        NetworksApi::new(self)
    }

    /// Get the tokens API.
    pub fn tokens(&self) -> TokensApi<'_> {
        TokensApi::new(self)
    }

    /// Get the providers (protocols) API.
    pub fn providers(&self) -> ProvidersApi<'_> {
        ProvidersApi::new(self)
    }

    /// Get the yields API.
    pub fn yields(&self) -> YieldsApi<'_> {
        YieldsApi::new(self)
    }
}

/// Builder for creating a StakeKitClient.
pub struct StakeKitClientBuilder {
    primary_url: String,
    fallback_url: String,
    api_key: Option<String>,
    timeout: Duration,
    retry_config: RetryConfig,
}

impl StakeKitClientBuilder {
    /// Create a new builder.
    pub fn new() -> Self {
        Self {
            primary_url: DEFAULT_PRIMARY_URL.to_string(),
            fallback_url: DEFAULT_FALLBACK_URL.to_string(),
            api_key: None,
            timeout: DEFAULT_TIMEOUT,
            retry_config: RetryConfig::default(),
        }
    }

    /// Set the primary host base URL.
    pub fn primary_url(mut self, url: impl Into<String>) -> Self {
        self.primary_url = url.into();
        self
    }

    /// Set the fallback host base URL.
    pub fn fallback_url(mut self, url: impl Into<String>) -> Self {
        self.fallback_url = url.into();
        self
    }

    /// Set the API key.
    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Set the request timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the retry configuration.
    pub fn retry_config(mut self, config: RetryConfig) -> Self {
        self.retry_config = config;
        self
    }

    /// Build the client.
    pub fn build(self) -> SdkResult<StakeKitClient> {
        let api_key = self
            .api_key
            .filter(|key| !key.is_empty())
            .ok_or_else(|| SdkError::Config("api_key is required".to_string()))?;

        let config = ClientConfig {
            primary_url: Url::parse(&self.primary_url)?,
            fallback_url: Url::parse(&self.fallback_url)?,
            api_key,
            timeout: self.timeout,
            retry_config: self.retry_config,
        };

        StakeKitClient::from_config(config)
    }
}

impl Default for StakeKitClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}
