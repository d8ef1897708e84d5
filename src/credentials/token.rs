//! Identity tokens for calls to cloud-hosted peers
//!
//! Under the platform-identity strategy every outbound call carries a bearer
//! token minted by the metadata server for the target host. Tokens are cached
//! per source until shortly before they expire.

use super::expiry::{refresh_deadline, Clock, SystemClock};
use crate::deploy::EnvSource;
use async_trait::async_trait;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::debug;

/// Variable overriding the metadata server host (used by emulators)
pub const METADATA_HOST_VAR: &str = "GCE_METADATA_HOST";

/// Default metadata server host
pub const DEFAULT_METADATA_HOST: &str = "metadata.google.internal";

const IDENTITY_PATH: &str = "/computeMetadata/v1/instance/service-accounts/default/identity";

/// Errors that can occur while obtaining a token
#[derive(Debug, Error)]
pub enum TokenError {
    #[error("token request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("metadata server returned an empty token")]
    Empty,
}

/// A bearer credential and the time it stops being valid
#[derive(Clone, PartialEq, Eq)]
pub struct BearerToken {
    value: String,
    expires_at: Option<DateTime<Utc>>,
}

impl BearerToken {
    pub fn new(value: impl Into<String>, expires_at: Option<DateTime<Utc>>) -> Self {
        Self {
            value: value.into(),
            expires_at,
        }
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.expires_at
    }

    /// Value of the `authorization` metadata entry
    pub fn header_value(&self) -> String {
        format!("Bearer {}", self.value)
    }
}

impl std::fmt::Debug for BearerToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BearerToken")
            .field("expires_at", &self.expires_at)
            .finish_non_exhaustive()
    }
}

/// Supplies bearer credentials for authenticating to a peer
#[async_trait]
pub trait TokenSource: Send + Sync {
    async fn token(&self) -> Result<BearerToken, TokenError>;
}

/// Always returns the same token
#[derive(Debug, Clone)]
pub struct StaticTokenSource {
    token: BearerToken,
}

impl StaticTokenSource {
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            token: BearerToken::new(value, None),
        }
    }
}

#[async_trait]
impl TokenSource for StaticTokenSource {
    async fn token(&self) -> Result<BearerToken, TokenError> {
        Ok(self.token.clone())
    }
}

/// Identity tokens from the managed-cloud metadata server, cached until expiry
pub struct MetadataTokenSource {
    audience: String,
    url: String,
    client: reqwest::Client,
    clock: Arc<dyn Clock>,
    cached: Mutex<Option<(BearerToken, DateTime<Utc>)>>,
}

impl MetadataTokenSource {
    /// Token source for `audience` against the default metadata server
    pub fn new(audience: impl Into<String>) -> Self {
        Self::with_host(audience, DEFAULT_METADATA_HOST)
    }

    /// Token source for `audience`, honoring `GCE_METADATA_HOST`
    pub fn from_env(env: &impl EnvSource, audience: impl Into<String>) -> Self {
        let host = env
            .get(METADATA_HOST_VAR)
            .filter(|h| !h.is_empty())
            .unwrap_or_else(|| DEFAULT_METADATA_HOST.to_string());
        Self::with_host(audience, &host)
    }

    /// Token source for `audience` against the metadata server at `host`
    pub fn with_host(audience: impl Into<String>, host: &str) -> Self {
        Self {
            audience: audience.into(),
            url: format!("http://{}{}", host, IDENTITY_PATH),
            client: reqwest::Client::new(),
            clock: Arc::new(SystemClock),
            cached: Mutex::new(None),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn audience(&self) -> &str {
        &self.audience
    }

    async fn fetch(&self) -> Result<BearerToken, TokenError> {
        let body = self
            .client
            .get(&self.url)
            .header("Metadata-Flavor", "Google")
            .query(&[("audience", self.audience.as_str())])
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;

        let value = body.trim();
        if value.is_empty() {
            return Err(TokenError::Empty);
        }

        Ok(BearerToken::new(value, jwt_expiry(value)))
    }
}

#[async_trait]
impl TokenSource for MetadataTokenSource {
    async fn token(&self) -> Result<BearerToken, TokenError> {
        // Held across the fetch so concurrent callers share one request
        let mut cached = self.cached.lock().await;
        let now = self.clock.now();

        if let Some((token, refresh_at)) = cached.as_ref() {
            if !self.clock.refresh_due(*refresh_at) {
                return Ok(token.clone());
            }
        }

        let token = self.fetch().await?;
        let refresh_at = refresh_deadline(token.expires_at(), now);
        debug!(audience = %self.audience, refresh_at = %refresh_at, "Fetched identity token");

        *cached = Some((token.clone(), refresh_at));
        Ok(token)
    }
}

#[derive(Deserialize)]
struct Claims {
    exp: Option<i64>,
}

/// Read the `exp` claim of a JWT without verifying it
pub fn jwt_expiry(token: &str) -> Option<DateTime<Utc>> {
    let payload = token.split('.').nth(1)?;
    let bytes = URL_SAFE_NO_PAD.decode(payload.trim_end_matches('=')).ok()?;
    let claims: Claims = serde_json::from_slice(&bytes).ok()?;
    DateTime::from_timestamp(claims.exp?, 0)
}
