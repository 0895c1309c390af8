// External collaborators: AI analysis, remediation and hash lookup.
// 外部协作者接口，网络客户端不在本库内实现

use crate::config::RetryPolicy;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::future::Future;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProviderError {
    #[error("rate limited by provider")]
    RateLimited,

    #[error("network error: {0}")]
    Network(String),

    #[error("provider not configured: {0}")]
    NotConfigured(String),

    #[error("invalid provider response: {0}")]
    InvalidResponse(String),

    #[error("{0}")]
    Other(String),
}

impl ProviderError {
    /// Rate limiting and transport failures are worth another attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ProviderError::RateLimited | ProviderError::Network(_))
    }
}

/// Text-generation backend used for semantic analysis and fix suggestions.
#[async_trait]
pub trait AnalysisProvider: Send + Sync {
    fn name(&self) -> &str {
        "custom"
    }

    fn model(&self) -> &str {
        "default"
    }

    /// Generate a completion for `prompt`; `json` asks for a JSON-only answer.
    async fn generate(&self, prompt: &str, json: bool) -> Result<String, ProviderError>;
}

#[async_trait]
pub trait RemediationProvider: Send + Sync {
    async fn suggest_fix(&self, description: &str, snippet: &str) -> Result<String, ProviderError>;
}

/// Engine verdict counts for a known file hash.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionStats {
    pub malicious: u32,
    pub suspicious: u32,
    pub undetected: u32,
    pub harmless: u32,
}

#[async_trait]
pub trait HashLookupProvider: Send + Sync {
    /// `Ok(None)` when the hash is unknown to the service.
    async fn lookup(&self, sha256_hex: &str) -> Result<Option<DetectionStats>, ProviderError>;

    /// Human-facing report link for a hash, if the service has one.
    fn report_link(&self, sha256_hex: &str) -> Option<String> {
        let _ = sha256_hex;
        None
    }
}

/// Run `op` under `policy`, retrying retryable errors with exponential backoff.
pub async fn with_retry<T, F, Fut>(
    policy: &RetryPolicy,
    what: &str,
    verbose: bool,
    mut op: F,
) -> Result<T, ProviderError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ProviderError>>,
{
    let attempts = policy.max_attempts.max(1);
    let mut retry = 0;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_retryable() && retry + 1 < attempts => {
                let delay = policy.delay_for(retry);
                if verbose {
                    warn!("{}: {}. Retrying in {:?}", what, e, delay);
                } else {
                    debug!("{}: {}. Retrying in {:?}", what, e, delay);
                }
                tokio::time::sleep(delay).await;
                retry += 1;
            }
            Err(e) => return Err(e),
        }
    }
}
