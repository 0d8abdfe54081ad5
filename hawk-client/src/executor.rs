//! Executes single HTTP calls with guaranteed response cleanup.
//!
//! Every call goes through the same pipeline regardless of its method:
//!
//! 1. build the outgoing request, encoding the form payload if there is one,
//! 2. create a fresh cancellation token and [`DisposalGuard`] for the call,
//! 3. run the caller's `prepare` callback, which may attach headers or pick up the call's
//!    [`CancelHook`],
//! 4. send it through the long-running or short-running transport,
//! 5. arm the guard with the response body, then classify the status.
//!
//! Cancellation can race with the response arriving. That race is settled entirely by the
//! guard: a body that shows up after the call was aborted is released on the spot and the
//! call completes as [`Error::Canceled`].

use crate::auth::FormPayload;
use crate::body::{GuardedBody, SharedGuard};
use crate::cancel::CancelHook;
use crate::error::{BoxError, Error, StatusError};
use crate::form::{self, FormData};
use crate::guard::{DisposalGuard, SetOutcome};
use crate::request::{ExecuteRequest, OutgoingRequest, PrepareRequest};
use http::header::{HeaderValue, CONTENT_TYPE};
use http::{Method, Request, Response, Uri};
use http_body::Body;
use http_body_util::Full;
use std::sync::Arc;
use tower::ServiceExt;
use tower_service::Service;

/// Sends requests through one of two transports and hands back guarded responses.
///
/// The transports are shared by every call and hold no per-call state; each call gets its
/// own cancellation token and guard.
#[derive(Debug, Clone)]
pub struct RequestExecutor<S> {
    long_running: S,
    short_running: S,
}

impl<S> RequestExecutor<S> {
    /// Create an executor from a transport for long-running calls (streaming, long-polling)
    /// and one for short-running calls.
    pub fn new(long_running: S, short_running: S) -> Self {
        Self {
            long_running,
            short_running,
        }
    }

    /// The transport used for calls with the given long-running flag.
    pub fn transport(&self, long_running: bool) -> &S {
        if long_running {
            &self.long_running
        } else {
            &self.short_running
        }
    }
}

impl<S, B> RequestExecutor<S>
where
    S: Service<OutgoingRequest, Response = Response<B>> + Clone,
    S::Error: Into<BoxError>,
    B: Body + Send + 'static,
{
    /// Send a `GET` request to `url`.
    pub async fn get<F>(
        &self,
        url: impl Into<String>,
        prepare: F,
        is_long_running: bool,
    ) -> Result<Response<GuardedBody<B>>, Error>
    where
        F: FnOnce(&mut PrepareRequest<'_>) + Send + 'static,
    {
        let request = ExecuteRequest::get(url)
            .long_running(is_long_running)
            .prepare(prepare);
        self.execute(request).await
    }

    /// Send a `POST` request to `url` with `payload` as its form body.
    pub async fn post<F>(
        &self,
        url: impl Into<String>,
        prepare: F,
        payload: Option<FormData>,
        is_long_running: bool,
    ) -> Result<Response<GuardedBody<B>>, Error>
    where
        F: FnOnce(&mut PrepareRequest<'_>) + Send + 'static,
    {
        let request = ExecuteRequest::post(url, payload)
            .long_running(is_long_running)
            .prepare(prepare);
        self.execute(request).await
    }

    /// Execute a call.
    ///
    /// Only responses with a `2xx` status are returned. Any other status is turned into
    /// [`Error::Status`] after the response body has been released.
    pub async fn execute(
        &self,
        request: ExecuteRequest,
    ) -> Result<Response<GuardedBody<B>>, Error> {
        let ExecuteRequest {
            method,
            url,
            payload,
            long_running,
            prepare,
            cancellation,
        } = request;

        let prepare = prepare.ok_or(Error::InvalidArgument("prepare_request"))?;
        let uri = url
            .parse::<Uri>()
            .map_err(|_| Error::InvalidArgument("url"))?;
        let mut req = build_request(method, uri, payload.as_ref());

        let token = cancellation.child_token();
        let guard: SharedGuard<B> = Arc::new(DisposalGuard::new());
        let hook = CancelHook::new(token.clone(), guard.clone());

        prepare(&mut PrepareRequest::new(&mut req, hook));

        let method = req.method().clone();
        let uri = req.uri().clone();

        if token.is_cancelled() {
            guard.dispose();
            tracing::debug!(%method, %uri, "request canceled before it was sent");
            return Err(Error::Canceled);
        }

        tracing::debug!(%method, %uri, long_running, "sending request");
        let transport = self.transport(long_running).clone();
        let response = tokio::select! {
            biased;
            _ = token.cancelled() => {
                guard.dispose();
                tracing::debug!(%method, %uri, "request canceled while in flight");
                return Err(Error::Canceled);
            }
            result = transport.oneshot(req) => match result {
                Ok(response) => response,
                Err(err) => {
                    let err = Error::from_transport(err.into());
                    tracing::debug!(%method, %uri, error = %err, "request failed");
                    return Err(err);
                }
            },
        };

        let (parts, body) = response.into_parts();

        // armed before the status check, failed responses are released through the guard too
        if guard.set(Box::pin(body)) != SetOutcome::Armed {
            tracing::debug!(%method, %uri, "response arrived after the request was canceled");
            return Err(Error::Canceled);
        }

        if !parts.status.is_success() {
            guard.dispose();
            tracing::debug!(%method, %uri, status = %parts.status, "unsuccessful response");
            return Err(Error::Status(StatusError::new(&parts)));
        }

        tracing::debug!(%method, %uri, status = %parts.status, "response received");
        Ok(Response::from_parts(parts, GuardedBody::new(guard, token)))
    }
}

fn build_request(method: Method, uri: Uri, payload: Option<&FormData>) -> OutgoingRequest {
    let body = payload.map(form::encode).unwrap_or_default();

    let mut req = Request::new(Full::new(body.clone()));
    *req.method_mut() = method;
    *req.uri_mut() = uri;

    if payload.is_some() {
        req.headers_mut()
            .insert(CONTENT_TYPE, HeaderValue::from_static(form::CONTENT_TYPE));
        req.extensions_mut().insert(FormPayload(body));
    }

    req
}
