//! A ready-made client on top of `hyper-util`'s pooled HTTP client.
//!
//! [`HawkClient::with_config`] builds two independent transports, one for long-running calls
//! and one for short-running calls. Each is a `hyper-util` client wrapped in the
//! [`Authenticated`](crate::auth::Authenticated) middleware and, if configured, a timeout.
//! Neither transport has a timeout by default.
//!
//! # Example
//!
//! ```no_run
//! use hawk_client::auth::{AuthContext, AuthOptions, Authenticate};
//! use hawk_client::{BoxError, ClientConfig, HawkClient};
//! use http::request::Parts;
//! use http_body_util::BodyExt;
//!
//! struct Scheme;
//!
//! impl Authenticate for Scheme {
//!     type Credential = String;
//!
//!     fn authenticate(
//!         &self,
//!         req: &mut Parts,
//!         cx: &AuthContext<'_, String>,
//!     ) -> Result<(), BoxError> {
//!         let value = format!("Hawk id=\"{}\"", cx.credential());
//!         req.headers.insert("authorization", value.parse()?);
//!         Ok(())
//!     }
//! }
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), BoxError> {
//! let client = HawkClient::with_config(
//!     Scheme,
//!     AuthOptions::new(String::from("dh37fgj492je")),
//!     &ClientConfig::default(),
//! );
//!
//! let res = client
//!     .get("http://localhost:8080/signalr/poll", |_| {}, true)
//!     .await?;
//! let body = res.into_body().collect().await?.to_bytes();
//! # let _ = body;
//! # Ok(())
//! # }
//! ```

use crate::auth::{AuthLayer, AuthOptions, Authenticate};
use crate::error::BoxError;
use crate::executor::RequestExecutor;
use crate::request::OutgoingRequest;
use bytes::Bytes;
use http::Response;
use http_body_util::Full;
use hyper::body::Incoming;
use hyper_util::client::legacy::Client;
use hyper_util::rt::{TokioExecutor, TokioTimer};
use std::time::Duration;
use tower::timeout::Timeout;
use tower::util::BoxCloneService;
use tower_layer::Layer;

/// The transport type used by [`HawkClient`].
pub type Transport = BoxCloneService<OutgoingRequest, Response<Incoming>, BoxError>;

/// A [`RequestExecutor`] backed by two pooled `hyper-util` clients.
pub type HawkClient = RequestExecutor<Transport>;

/// Configuration for one transport.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Upper bound for a whole call, `None` for no bound.
    pub timeout: Option<Duration>,
    /// How long idle pooled connections are kept, `None` to keep them forever.
    pub pool_idle_timeout: Option<Duration>,
    /// Maximum idle connections kept per host.
    pub pool_max_idle_per_host: usize,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            timeout: None,
            pool_idle_timeout: Some(Duration::from_secs(90)),
            pool_max_idle_per_host: usize::MAX,
        }
    }
}

/// Configuration for [`HawkClient::with_config`].
#[derive(Debug, Clone, Default)]
pub struct ClientConfig {
    /// The transport for streaming and long-polling calls.
    pub long_running: TransportConfig,
    /// The transport for every other call.
    pub short_running: TransportConfig,
}

impl HawkClient {
    /// Build a client that authenticates every request with `scheme`.
    pub fn with_config<A>(
        scheme: A,
        options: AuthOptions<A::Credential>,
        config: &ClientConfig,
    ) -> Self
    where
        A: Authenticate,
    {
        let auth = AuthLayer::new(scheme, options);
        RequestExecutor::new(
            transport(&auth, &config.long_running),
            transport(&auth, &config.short_running),
        )
    }
}

fn transport<A>(auth: &AuthLayer<A>, config: &TransportConfig) -> Transport
where
    A: Authenticate,
{
    let client = Client::builder(TokioExecutor::new())
        .pool_timer(TokioTimer::new())
        .pool_idle_timeout(config.pool_idle_timeout)
        .pool_max_idle_per_host(config.pool_max_idle_per_host)
        .build_http::<Full<Bytes>>();

    let svc = auth.layer(client);
    match config.timeout {
        Some(timeout) => BoxCloneService::new(Timeout::new(svc, timeout)),
        None => BoxCloneService::new(svc),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transports_are_unbounded_by_default() {
        let config = ClientConfig::default();
        assert_eq!(config.long_running.timeout, None);
        assert_eq!(config.short_running.timeout, None);
    }
}
