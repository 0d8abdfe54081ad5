//! Per-call request context and the decoration view passed to `prepare` callbacks.

use crate::cancel::CancelHook;
use crate::form::FormData;
use bytes::Bytes;
use http::header::{self, HeaderMap, HeaderValue};
use http::{Extensions, Method, Request, Uri};
use http_body_util::Full;
use std::fmt;
use tokio_util::sync::CancellationToken;

/// The request type sent to transports.
pub type OutgoingRequest = Request<Full<Bytes>>;

pub(crate) type PrepareFn = Box<dyn FnOnce(&mut PrepareRequest<'_>) + Send>;

/// Everything needed to execute one call.
///
/// # Example
///
/// ```
/// use hawk_client::request::ExecuteRequest;
/// use hawk_client::form::FormData;
///
/// let payload = [("transport", "longPolling")].into_iter().collect::<FormData>();
///
/// let request = ExecuteRequest::post("http://localhost/signalr/send", payload)
///     .long_running(false)
///     .prepare(|req| {
///         req.set_user_agent("chat-client/1.0");
///     });
/// # let _ = request;
/// ```
pub struct ExecuteRequest {
    pub(crate) method: Method,
    pub(crate) url: String,
    pub(crate) payload: Option<FormData>,
    pub(crate) long_running: bool,
    pub(crate) prepare: Option<PrepareFn>,
    pub(crate) cancellation: CancellationToken,
}

impl ExecuteRequest {
    /// A call with an arbitrary method.
    pub fn new<U>(method: Method, url: U) -> Self
    where
        U: Into<String>,
    {
        Self {
            method,
            url: url.into(),
            payload: None,
            long_running: false,
            prepare: None,
            cancellation: CancellationToken::new(),
        }
    }

    /// A `GET` call.
    pub fn get<U>(url: U) -> Self
    where
        U: Into<String>,
    {
        Self::new(Method::GET, url)
    }

    /// A `POST` call carrying `payload` as a form body.
    pub fn post<U>(url: U, payload: impl Into<Option<FormData>>) -> Self
    where
        U: Into<String>,
    {
        Self::new(Method::POST, url).payload(payload)
    }

    /// Set the form payload. `None` sends an empty body.
    pub fn payload(mut self, payload: impl Into<Option<FormData>>) -> Self {
        self.payload = payload.into();
        self
    }

    /// Route the call to the long-running transport (streaming or long-polling requests).
    pub fn long_running(mut self, long_running: bool) -> Self {
        self.long_running = long_running;
        self
    }

    /// Set the decoration callback, run once right before the request is sent.
    ///
    /// The executor refuses to run a call without one.
    pub fn prepare<F>(mut self, prepare: F) -> Self
    where
        F: FnOnce(&mut PrepareRequest<'_>) + Send + 'static,
    {
        self.prepare = Some(Box::new(prepare));
        self
    }

    /// Tie the call to an external cancellation token.
    ///
    /// The call gets its own child token, so cancelling `token` aborts the call but aborting
    /// the call never cancels `token`. The token keeps governing the call after a response was
    /// handed out: once it fires, the [`GuardedBody`](crate::body::GuardedBody) is released and
    /// reading it yields [`Error::Canceled`](crate::Error::Canceled).
    pub fn cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }

    /// The request method.
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// The target URL as given.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Whether the call goes to the long-running transport.
    pub fn is_long_running(&self) -> bool {
        self.long_running
    }
}

impl fmt::Debug for ExecuteRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecuteRequest")
            .field("method", &self.method)
            .field("url", &self.url)
            .field("payload", &self.payload)
            .field("long_running", &self.long_running)
            .field("prepare", &self.prepare.is_some())
            .finish()
    }
}

/// Mutable view over an outgoing request, handed to the `prepare` callback.
///
/// This is where authentication headers get attached and where the call's [`CancelHook`] can
/// be picked up and registered with an external abort mechanism.
pub struct PrepareRequest<'a> {
    request: &'a mut OutgoingRequest,
    cancel_hook: CancelHook,
}

impl<'a> PrepareRequest<'a> {
    pub(crate) fn new(request: &'a mut OutgoingRequest, cancel_hook: CancelHook) -> Self {
        Self {
            request,
            cancel_hook,
        }
    }

    /// The request method.
    pub fn method(&self) -> &Method {
        self.request.method()
    }

    /// The request URI.
    pub fn uri(&self) -> &Uri {
        self.request.uri()
    }

    /// Mutable access to the request URI.
    pub fn uri_mut(&mut self) -> &mut Uri {
        self.request.uri_mut()
    }

    /// The request headers.
    pub fn headers(&self) -> &HeaderMap {
        self.request.headers()
    }

    /// Mutable access to the request headers.
    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        self.request.headers_mut()
    }

    /// Mutable access to the request extensions.
    pub fn extensions_mut(&mut self) -> &mut Extensions {
        self.request.extensions_mut()
    }

    /// Set the `User-Agent` header.
    pub fn set_user_agent(&mut self, user_agent: &'static str) {
        self.headers_mut()
            .insert(header::USER_AGENT, HeaderValue::from_static(user_agent));
    }

    /// Set the `Accept` header.
    pub fn set_accept(&mut self, accept: &'static str) {
        self.headers_mut()
            .insert(header::ACCEPT, HeaderValue::from_static(accept));
    }

    /// The hook that aborts this call.
    pub fn cancel_hook(&self) -> CancelHook {
        self.cancel_hook.clone()
    }
}

impl fmt::Debug for PrepareRequest<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PrepareRequest")
            .field("method", self.request.method())
            .field("uri", self.request.uri())
            .field("headers", self.request.headers())
            .finish()
    }
}
