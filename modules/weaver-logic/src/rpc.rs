//! Transport seam for server-context logic invoked from the client.

use std::sync::Arc;

use async_trait::async_trait;

use weaver_common::{Config, WeaverError};

use crate::chain::{execute_chain, ExecuteRequest, ExecuteResponse};
use crate::resolver::ModuleResolver;

/// Posts a signal chain to the execute endpoint and returns the response.
/// [`HttpTransport`] is the production implementation; tests and
/// same-process setups use [`InProcessTransport`].
#[async_trait]
pub trait RpcTransport: Send + Sync {
    async fn execute(&self, request: ExecuteRequest) -> Result<ExecuteResponse, WeaverError>;
}

/// Posts chains as JSON to `POST /weaver/execute` over HTTP.
pub struct HttpTransport {
    client: reqwest::Client,
    url: String,
}

impl HttpTransport {
    pub fn new(url: impl Into<String>) -> Self {
        Self { client: reqwest::Client::new(), url: url.into() }
    }

    /// Endpoint from runtime configuration (`WEAVER_RPC_URL`).
    pub fn from_config(config: &Config) -> Self {
        Self::new(config.rpc_url.clone())
    }
}

#[async_trait]
impl RpcTransport for HttpTransport {
    async fn execute(&self, request: ExecuteRequest) -> Result<ExecuteResponse, WeaverError> {
        let response = self
            .client
            .post(&self.url)
            .json(&request)
            .send()
            .await
            .map_err(|e| WeaverError::Transport(e.to_string()))?;
        let status = response.status();
        // Failures still carry an `{error}` body; surface it over the bare
        // status code when present.
        let body: ExecuteResponse = response
            .json()
            .await
            .map_err(|e| WeaverError::Transport(e.to_string()))?;
        if !status.is_success() && body.error.is_none() {
            return Err(WeaverError::Transport(format!(
                "execute endpoint returned {status}"
            )));
        }
        Ok(body)
    }
}

/// Executes chains directly against a server-side resolver, no HTTP.
pub struct InProcessTransport {
    resolver: Arc<dyn ModuleResolver>,
}

impl InProcessTransport {
    pub fn new(resolver: Arc<dyn ModuleResolver>) -> Self {
        Self { resolver }
    }
}

#[async_trait]
impl RpcTransport for InProcessTransport {
    async fn execute(&self, request: ExecuteRequest) -> Result<ExecuteResponse, WeaverError> {
        Ok(execute_chain(request, self.resolver.clone()).await)
    }
}
