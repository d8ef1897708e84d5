//! Outbound gRPC channels
//!
//! A [`Connection`] owns a lazily-connected tonic channel and, under the
//! platform-identity strategy, the token source that authenticates calls on it.
//!
//! ```ignore
//! let mut conn = Connection::open(&config, &ProcessEnv, OpenOptions::new("orders:50051"))?;
//! let reply = conn
//!     .call(request, |channel, req| async move {
//!         OrdersClient::new(channel).get_order(req).await
//!     })
//!     .await?;
//! conn.close()?;
//! ```

use crate::credentials::{
    client_credentials, ClientCredentials, CredentialError, MetadataTokenSource, TokenSource,
};
use crate::deploy::{DeployConfig, EnvSource};
use crate::telemetry::report_rpc;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tonic::codegen::http::Uri;
use tonic::metadata::MetadataValue;
use tonic::transport::{Channel, Endpoint};
use tonic::{Request, Response, Status};
use tracing::info;

/// Hard deadline applied to every wrapped call
pub const CALL_TIMEOUT: Duration = Duration::from_secs(15);

/// Errors that can occur while opening or closing a connection
#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("failed to build credentials: {0}")]
    Credentials(#[from] CredentialError),

    #[error("invalid endpoint {uri}: {source}")]
    InvalidEndpoint {
        uri: String,
        #[source]
        source: tonic::transport::Error,
    },

    #[error("invalid authority override {0}")]
    InvalidAuthority(String),

    #[error("failed to apply TLS config: {0}")]
    Tls(#[source] tonic::transport::Error),

    #[error("connection to {0} is already closed")]
    AlreadyClosed(String),
}

/// What to dial and how to identify it
#[derive(Debug, Clone)]
pub struct OpenOptions {
    host: String,
    service_name: Option<String>,
    authority: Option<String>,
    audience: Option<String>,
}

impl OpenOptions {
    /// Dial `host` (`name:port`, or a full `scheme://` URI)
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            service_name: None,
            authority: None,
            audience: None,
        }
    }

    /// Service whose cert/key/CA triple authenticates this client (peer-pinned)
    pub fn service(mut self, service_name: impl Into<String>) -> Self {
        self.service_name = Some(service_name.into());
        self
    }

    /// Authority and TLS server name, when they differ from the wire host
    pub fn authority(mut self, authority: impl Into<String>) -> Self {
        self.authority = Some(authority.into());
        self
    }

    /// Audience of identity tokens, defaults to the host
    pub fn audience(mut self, audience: impl Into<String>) -> Self {
        self.audience = Some(audience.into());
        self
    }
}

/// Resolved connection parameters, before any channel is built
#[derive(Debug, Clone)]
pub struct ConnectionPlan {
    pub uri: String,
    pub origin: Option<String>,
    pub credentials: ClientCredentials,
    /// Set when calls must carry an identity token for this audience
    pub token_audience: Option<String>,
}

impl ConnectionPlan {
    pub fn resolve(
        config: &DeployConfig,
        env: &impl EnvSource,
        options: &OpenOptions,
    ) -> Result<Self, ConnectionError> {
        let tls_host = options.authority.as_deref().unwrap_or(&options.host);
        let credentials =
            client_credentials(config, env, tls_host, options.service_name.as_deref())?;

        let scheme = if credentials.is_encrypted() {
            "https"
        } else {
            "http"
        };
        let uri = with_scheme(scheme, &options.host);
        let origin = options
            .authority
            .as_deref()
            .map(|authority| with_scheme(scheme, authority));

        let token_audience = credentials.uses_identity_token().then(|| {
            options
                .audience
                .clone()
                .unwrap_or_else(|| options.host.clone())
        });

        Ok(Self {
            uri,
            origin,
            credentials,
            token_audience,
        })
    }

    /// Build the endpoint; no network I/O happens until the first call
    fn endpoint(&self) -> Result<Endpoint, ConnectionError> {
        let mut endpoint =
            Endpoint::from_shared(self.uri.clone()).map_err(|source| {
                ConnectionError::InvalidEndpoint {
                    uri: self.uri.clone(),
                    source,
                }
            })?;

        if let Some(origin) = &self.origin {
            let origin = origin
                .parse::<Uri>()
                .map_err(|_| ConnectionError::InvalidAuthority(origin.clone()))?;
            endpoint = endpoint.origin(origin);
        }

        if let Some(tls) = self.credentials.tls_config() {
            endpoint = endpoint.tls_config(tls).map_err(ConnectionError::Tls)?;
        }

        Ok(endpoint)
    }
}

fn with_scheme(scheme: &str, host: &str) -> String {
    if host.contains("://") {
        host.to_string()
    } else {
        format!("{}://{}", scheme, host)
    }
}

/// An open channel plus its optional token source
pub struct Connection {
    target: String,
    channel: Option<Channel>,
    token_source: Option<Arc<dyn TokenSource>>,
}

impl Connection {
    /// Open a channel to `options.host` with credentials for the deployment mode
    ///
    /// Must be called from within a tokio runtime.
    pub fn open(
        config: &DeployConfig,
        env: &impl EnvSource,
        options: OpenOptions,
    ) -> Result<Self, ConnectionError> {
        let plan = ConnectionPlan::resolve(config, env, &options)?;
        let channel = plan.endpoint()?.connect_lazy();

        let token_source = plan.token_audience.as_ref().map(|audience| {
            Arc::new(MetadataTokenSource::from_env(env, audience.clone())) as Arc<dyn TokenSource>
        });

        info!(
            target_uri = %plan.uri,
            mode = %config.mode(),
            encrypted = plan.credentials.is_encrypted(),
            identity_token = token_source.is_some(),
            "Opened gRPC channel"
        );

        Ok(Self {
            target: plan.uri,
            channel: Some(channel),
            token_source,
        })
    }

    /// Wrap an existing channel, e.g. one built over an in-memory transport
    pub fn from_channel(target: impl Into<String>, channel: Channel) -> Self {
        Self {
            target: target.into(),
            channel: Some(channel),
            token_source: None,
        }
    }

    /// Replace the token source attached to calls on this connection
    pub fn with_token_source(mut self, token_source: Arc<dyn TokenSource>) -> Self {
        self.token_source = Some(token_source);
        self
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn token_source(&self) -> Option<&Arc<dyn TokenSource>> {
        self.token_source.as_ref()
    }

    pub fn is_closed(&self) -> bool {
        self.channel.is_none()
    }

    /// Clone of the underlying channel, for building generated clients
    pub fn channel(&self) -> Result<Channel, ConnectionError> {
        self.channel
            .clone()
            .ok_or_else(|| ConnectionError::AlreadyClosed(self.target.clone()))
    }

    /// End this handle's use of the channel
    ///
    /// Clones previously returned by [`Connection::channel`] stay usable and
    /// keep the transport open until they are dropped. Closing twice is a
    /// caller lifecycle bug.
    pub fn close(&mut self) -> Result<(), ConnectionError> {
        match self.channel.take() {
            Some(channel) => {
                drop(channel);
                info!(target_uri = %self.target, "Closed gRPC channel");
                Ok(())
            }
            None => Err(ConnectionError::AlreadyClosed(self.target.clone())),
        }
    }

    /// Perform one call on this connection through [`call`]
    pub async fn call<Req, Resp, F, Fut>(&self, request: Req, rpc: F) -> Result<Resp, Status>
    where
        F: FnOnce(Channel, Request<Req>) -> Fut,
        Fut: Future<Output = Result<Response<Resp>, Status>>,
    {
        let channel = self
            .channel
            .clone()
            .ok_or_else(|| Status::failed_precondition("connection is closed"))?;

        let result = call(request, self.token_source.as_deref(), |req| rpc(channel, req)).await;
        report_rpc(&self.target, &result);
        result
    }
}

/// Run one outbound call under the 15 second deadline
///
/// When a token source is given, a bearer token is fetched and attached as
/// the `authorization` metadata entry. Errors from the call are returned
/// unchanged; nothing is retried. Dropping the returned future cancels the call,
/// so a caller deadline composes by wrapping this future in its own timeout.
pub async fn call<Req, Resp, F, Fut>(
    request: Req,
    token_source: Option<&dyn TokenSource>,
    rpc: F,
) -> Result<Resp, Status>
where
    F: FnOnce(Request<Req>) -> Fut,
    Fut: Future<Output = Result<Response<Resp>, Status>>,
{
    let mut request = Request::new(request);
    request.set_timeout(CALL_TIMEOUT);

    let attempt = async move {
        if let Some(source) = token_source {
            let token = source.token().await.map_err(|e| {
                Status::unauthenticated(format!("failed to obtain identity token: {}", e))
            })?;
            let value = MetadataValue::try_from(token.header_value())
                .map_err(|_| Status::unauthenticated("identity token is not valid metadata"))?;
            request.metadata_mut().insert("authorization", value);
        }

        rpc(request).await.map(Response::into_inner)
    };

    match tokio::time::timeout(CALL_TIMEOUT, attempt).await {
        Ok(result) => result,
        Err(_) => Err(Status::deadline_exceeded(format!(
            "call did not complete within {}s",
            CALL_TIMEOUT.as_secs()
        ))),
    }
}
