//! Client for the external build service that turns sketch source into an
//! Intel HEX image.

use crate::config::GatewayConfig;
use async_trait::async_trait;
use pinwire_shared::{BuildRequest, BuildResponse};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("build service unreachable: {0}")]
    Transport(String),
    #[error("build service answered HTTP {0}")]
    Status(u16),
    #[error("build service response could not be decoded: {0}")]
    InvalidResponse(String),
}

/// Something that can compile a sketch. The session manager only talks to
/// the build service through this trait.
#[async_trait]
pub trait BuildGateway: Send + Sync + 'static {
    async fn build(&self, request: BuildRequest) -> Result<BuildResponse, GatewayError>;
}

/// POSTs `{"sketch": ...}` as JSON and expects `{"hex"?, "stderr"?}` back.
#[derive(Debug, Clone)]
pub struct HttpBuildGateway {
    client: reqwest::Client,
    url: String,
}

impl HttpBuildGateway {
    pub fn new(config: &GatewayConfig) -> Result<Self, GatewayError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| GatewayError::Transport(e.to_string()))?;
        Ok(Self {
            client,
            url: config.url.clone(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl BuildGateway for HttpBuildGateway {
    async fn build(&self, request: BuildRequest) -> Result<BuildResponse, GatewayError> {
        tracing::debug!(url = %self.url, bytes = request.sketch.len(), "Submitting sketch for build");
        let response = self
            .client
            .post(&self.url)
            .json(&request)
            .send()
            .await
            .map_err(|e| GatewayError::Transport(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(GatewayError::Status(status.as_u16()));
        }
        response
            .json::<BuildResponse>()
            .await
            .map_err(|e| GatewayError::InvalidResponse(e.to_string()))
    }
}
