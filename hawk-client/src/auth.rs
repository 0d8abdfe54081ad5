//! Pluggable request authentication.
//!
//! The transport knows nothing about the authentication scheme. A scheme implements
//! [`Authenticate`] and is applied to every outgoing request by the [`Authenticated`]
//! middleware, which also supplies it with the inputs it needs at send time:
//!
//! - the active credential, produced by a callback so credentials can rotate,
//! - the encoded form payload, when the request's payload is eligible for hashing,
//! - an optional normalized representation of the request.
//!
//! When response validation is switched on, the scheme also gets to inspect the response
//! head and can reject it.
//!
//! # Example
//!
//! ```
//! use hawk_client::auth::{AuthContext, AuthLayer, AuthOptions, Authenticate};
//! use hawk_client::BoxError;
//! use http::{request::Parts, HeaderValue, Request, Response};
//! use std::convert::Infallible;
//! use tower::{ServiceBuilder, ServiceExt};
//!
//! struct StaticId;
//!
//! impl Authenticate for StaticId {
//!     type Credential = &'static str;
//!
//!     fn authenticate(
//!         &self,
//!         request: &mut Parts,
//!         cx: &AuthContext<'_, Self::Credential>,
//!     ) -> Result<(), BoxError> {
//!         let value = HeaderValue::from_str(&format!("Hawk id=\"{}\"", cx.credential()))?;
//!         request.headers.insert(http::header::AUTHORIZATION, value);
//!         Ok(())
//!     }
//! }
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), BoxError> {
//! let svc = ServiceBuilder::new()
//!     .layer(AuthLayer::new(StaticId, AuthOptions::new("dh37fgj492je")))
//!     .service_fn(|req: Request<()>| async move {
//!         let auth = req.headers()[http::header::AUTHORIZATION].clone();
//!         Ok::<_, Infallible>(Response::new(auth))
//!     });
//!
//! let res = svc.oneshot(Request::new(())).await?;
//! assert_eq!(res.body(), "Hawk id=\"dh37fgj492je\"");
//! # Ok(())
//! # }
//! ```

use crate::error::BoxError;
use bytes::Bytes;
use http::{request, response, Request, Response};
use pin_project_lite::pin_project;
use std::{
    fmt,
    future::Future,
    pin::Pin,
    sync::Arc,
    task::{Context, Poll},
};
use tower_layer::Layer;
use tower_service::Service;

/// An authentication scheme.
pub trait Authenticate: Send + Sync + 'static {
    /// The credential the scheme signs with.
    type Credential: Send + Sync + 'static;

    /// Decorate an outgoing request, or refuse to send it by returning an error.
    fn authenticate(
        &self,
        request: &mut request::Parts,
        cx: &AuthContext<'_, Self::Credential>,
    ) -> Result<(), BoxError>;

    /// Validate a response head. Only called when response validation is enabled.
    fn validate_response(
        &self,
        response: &response::Parts,
        credential: &Self::Credential,
    ) -> Result<(), BoxError> {
        let _ = (response, credential);
        Ok(())
    }
}

/// Send-time inputs for [`Authenticate::authenticate`].
#[derive(Debug)]
pub struct AuthContext<'a, C> {
    credential: &'a C,
    payload: Option<&'a Bytes>,
    normalized: Option<String>,
}

impl<'a, C> AuthContext<'a, C> {
    /// The credential returned by the credentials callback for this request.
    pub fn credential(&self) -> &'a C {
        self.credential
    }

    /// The encoded payload, if the request carries one and it is eligible for hashing.
    pub fn payload(&self) -> Option<&'a Bytes> {
        self.payload
    }

    /// The output of the normalization callback.
    pub fn normalized(&self) -> Option<&str> {
        self.normalized.as_deref()
    }
}

/// The encoded body of a request, attached as a request extension so authentication schemes
/// can hash it without consuming the body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormPayload(pub Bytes);

/// Error returned when a scheme refuses a request or rejects a response.
#[derive(Debug)]
pub struct Rejected {
    reason: BoxError,
}

impl Rejected {
    /// Create a new `Rejected` error.
    pub fn new(reason: impl Into<BoxError>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

impl fmt::Display for Rejected {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.reason.fmt(f)
    }
}

impl std::error::Error for Rejected {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&*self.reason)
    }
}

/// Options controlling how a scheme is applied.
///
/// The defaults match a client that always signs with one fixed credential: response
/// validation off, every payload hashed, no normalization.
pub struct AuthOptions<C> {
    credentials: Arc<dyn Fn() -> C + Send + Sync>,
    response_validation: bool,
    payload_hashable: Arc<dyn Fn(&request::Parts) -> bool + Send + Sync>,
    normalize: Arc<dyn Fn(&request::Parts) -> Option<String> + Send + Sync>,
}

impl<C> AuthOptions<C> {
    /// Sign every request with `credential`.
    pub fn new(credential: C) -> Self
    where
        C: Clone + Send + Sync + 'static,
    {
        Self::from_fn(move || credential.clone())
    }

    /// Ask `credentials` for the active credential each time a request is sent.
    pub fn from_fn<F>(credentials: F) -> Self
    where
        F: Fn() -> C + Send + Sync + 'static,
    {
        Self {
            credentials: Arc::new(credentials),
            response_validation: false,
            payload_hashable: Arc::new(|_| true),
            normalize: Arc::new(|_| None),
        }
    }

    /// Replace the credentials callback.
    pub fn credentials_fn<F>(mut self, credentials: F) -> Self
    where
        F: Fn() -> C + Send + Sync + 'static,
    {
        self.credentials = Arc::new(credentials);
        self
    }

    /// Turn response validation on or off.
    pub fn enable_response_validation(mut self, enable: bool) -> Self {
        self.response_validation = enable;
        self
    }

    /// Decide per request whether its payload is handed to the scheme.
    pub fn payload_hashable_fn<F>(mut self, hashable: F) -> Self
    where
        F: Fn(&request::Parts) -> bool + Send + Sync + 'static,
    {
        self.payload_hashable = Arc::new(hashable);
        self
    }

    /// Produce a normalized representation of each request for the scheme.
    pub fn normalize_fn<F>(mut self, normalize: F) -> Self
    where
        F: Fn(&request::Parts) -> Option<String> + Send + Sync + 'static,
    {
        self.normalize = Arc::new(normalize);
        self
    }

    /// Returns `true` if responses are validated.
    pub fn response_validation(&self) -> bool {
        self.response_validation
    }
}

impl<C> Clone for AuthOptions<C> {
    fn clone(&self) -> Self {
        Self {
            credentials: self.credentials.clone(),
            response_validation: self.response_validation,
            payload_hashable: self.payload_hashable.clone(),
            normalize: self.normalize.clone(),
        }
    }
}

impl<C> fmt::Debug for AuthOptions<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthOptions")
            .field("response_validation", &self.response_validation)
            .finish()
    }
}

/// Layer that applies [`Authenticated`].
pub struct AuthLayer<A: Authenticate> {
    scheme: Arc<A>,
    options: AuthOptions<A::Credential>,
}

impl<A: Authenticate> AuthLayer<A> {
    /// Create a new [`AuthLayer`].
    pub fn new(scheme: A, options: AuthOptions<A::Credential>) -> Self {
        Self {
            scheme: Arc::new(scheme),
            options,
        }
    }
}

impl<A: Authenticate> Clone for AuthLayer<A> {
    fn clone(&self) -> Self {
        Self {
            scheme: self.scheme.clone(),
            options: self.options.clone(),
        }
    }
}

impl<A: Authenticate> fmt::Debug for AuthLayer<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthLayer")
            .field("options", &self.options)
            .finish()
    }
}

impl<S, A: Authenticate> Layer<S> for AuthLayer<A> {
    type Service = Authenticated<S, A>;

    fn layer(&self, inner: S) -> Self::Service {
        Authenticated {
            inner,
            scheme: self.scheme.clone(),
            options: self.options.clone(),
        }
    }
}

/// Middleware that authenticates every request with a scheme before passing it on.
///
/// Errors from the inner service and rejections from the scheme are both returned as
/// [`BoxError`]; rejections downcast to [`Rejected`].
pub struct Authenticated<S, A: Authenticate> {
    inner: S,
    scheme: Arc<A>,
    options: AuthOptions<A::Credential>,
}

impl<S, A: Authenticate> Authenticated<S, A> {
    /// Create a new [`Authenticated`] middleware.
    pub fn new(inner: S, scheme: A, options: AuthOptions<A::Credential>) -> Self {
        AuthLayer::new(scheme, options).layer(inner)
    }

    /// Gets a reference to the underlying service.
    pub fn get_ref(&self) -> &S {
        &self.inner
    }

    /// Gets a mutable reference to the underlying service.
    pub fn get_mut(&mut self) -> &mut S {
        &mut self.inner
    }

    /// Consumes `self`, returning the underlying service.
    pub fn into_inner(self) -> S {
        self.inner
    }
}

impl<S: Clone, A: Authenticate> Clone for Authenticated<S, A> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            scheme: self.scheme.clone(),
            options: self.options.clone(),
        }
    }
}

impl<S: fmt::Debug, A: Authenticate> fmt::Debug for Authenticated<S, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Authenticated")
            .field("inner", &self.inner)
            .field("options", &self.options)
            .finish()
    }
}

impl<S, A, ReqBody, ResBody> Service<Request<ReqBody>> for Authenticated<S, A>
where
    S: Service<Request<ReqBody>, Response = Response<ResBody>>,
    S::Error: Into<BoxError>,
    A: Authenticate,
{
    type Response = Response<ResBody>;
    type Error = BoxError;
    type Future = ResponseFuture<S::Future, A>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx).map_err(Into::into)
    }

    fn call(&mut self, req: Request<ReqBody>) -> Self::Future {
        let (mut parts, body) = req.into_parts();

        let credential = (self.options.credentials)();
        let payload = if (self.options.payload_hashable)(&parts) {
            parts.extensions.get::<FormPayload>().cloned()
        } else {
            None
        };
        let cx = AuthContext {
            credential: &credential,
            payload: payload.as_ref().map(|payload| &payload.0),
            normalized: (self.options.normalize)(&parts),
        };

        if let Err(err) = self.scheme.authenticate(&mut parts, &cx) {
            tracing::debug!(uri = %parts.uri, "authentication scheme refused request");
            return ResponseFuture {
                kind: Kind::Rejected {
                    error: Some(Box::new(Rejected::new(err))),
                },
            };
        }

        let validation = if self.options.response_validation {
            Some(Validation {
                scheme: self.scheme.clone(),
                credential,
            })
        } else {
            None
        };

        ResponseFuture {
            kind: Kind::Inner {
                future: self.inner.call(Request::from_parts(parts, body)),
                validation,
            },
        }
    }
}

struct Validation<A: Authenticate> {
    scheme: Arc<A>,
    credential: A::Credential,
}

pin_project! {
    /// Response future for [`Authenticated`].
    pub struct ResponseFuture<F, A: Authenticate> {
        #[pin]
        kind: Kind<F, A>,
    }
}

pin_project! {
    #[project = KindProj]
    enum Kind<F, A: Authenticate> {
        Rejected {
            error: Option<BoxError>,
        },
        Inner {
            #[pin]
            future: F,
            validation: Option<Validation<A>>,
        },
    }
}

impl<F, A, B, E> Future for ResponseFuture<F, A>
where
    F: Future<Output = Result<Response<B>, E>>,
    E: Into<BoxError>,
    A: Authenticate,
{
    type Output = Result<Response<B>, BoxError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match self.project().kind.project() {
            KindProj::Rejected { error } => {
                Poll::Ready(Err(error.take().expect("future polled after completion")))
            }
            KindProj::Inner { future, validation } => {
                let response = match futures_util::ready!(future.poll(cx)) {
                    Ok(response) => response,
                    Err(err) => return Poll::Ready(Err(err.into())),
                };

                let validation = match validation.take() {
                    Some(validation) => validation,
                    None => return Poll::Ready(Ok(response)),
                };

                let (parts, body) = response.into_parts();
                if let Err(err) = validation
                    .scheme
                    .validate_response(&parts, &validation.credential)
                {
                    tracing::debug!(
                        status = %parts.status,
                        "authentication scheme rejected response"
                    );
                    return Poll::Ready(Err(Box::new(Rejected::new(err))));
                }
                Poll::Ready(Ok(Response::from_parts(parts, body)))
            }
        }
    }
}

impl<F, A: Authenticate> fmt::Debug for ResponseFuture<F, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResponseFuture").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::{header, HeaderValue, StatusCode};
    use std::convert::Infallible;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tower::{service_fn, ServiceExt};

    #[derive(Clone, Debug)]
    struct Credential {
        id: &'static str,
    }

    /// Writes what it was given into headers so tests can observe it.
    struct Recording;

    impl Authenticate for Recording {
        type Credential = Credential;

        fn authenticate(
            &self,
            request: &mut request::Parts,
            cx: &AuthContext<'_, Credential>,
        ) -> Result<(), BoxError> {
            if cx.credential().id.is_empty() {
                return Err("missing credential id".into());
            }
            request.headers.insert(
                header::AUTHORIZATION,
                HeaderValue::from_str(&format!("Hawk id=\"{}\"", cx.credential().id))?,
            );
            if let Some(payload) = cx.payload() {
                request
                    .headers
                    .insert("x-payload", HeaderValue::from_bytes(payload)?);
            }
            if let Some(normalized) = cx.normalized() {
                request
                    .headers
                    .insert("x-normalized", HeaderValue::from_str(normalized)?);
            }
            Ok(())
        }

        fn validate_response(
            &self,
            response: &response::Parts,
            _credential: &Credential,
        ) -> Result<(), BoxError> {
            if response.headers.contains_key("server-authorization") {
                Ok(())
            } else {
                Err("missing Server-Authorization".into())
            }
        }
    }

    async fn echo_headers(req: Request<()>) -> Result<Response<http::HeaderMap>, Infallible> {
        Ok(Response::new(req.headers().clone()))
    }

    fn request_with_payload(payload: &'static str) -> Request<()> {
        let mut req = Request::new(());
        req.extensions_mut()
            .insert(FormPayload(Bytes::from_static(payload.as_bytes())));
        req
    }

    #[tokio::test]
    async fn signs_with_callback_credential() {
        let calls = Arc::new(AtomicUsize::new(0));
        let options = {
            let calls = calls.clone();
            AuthOptions::from_fn(move || {
                calls.fetch_add(1, Ordering::SeqCst);
                Credential { id: "dh37fgj492je" }
            })
        };
        let svc = Authenticated::new(service_fn(echo_headers), Recording, options);

        let res = svc.clone().oneshot(Request::new(())).await.unwrap();
        svc.oneshot(Request::new(())).await.unwrap();

        assert_eq!(res.body()[header::AUTHORIZATION], "Hawk id=\"dh37fgj492je\"");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn payload_is_passed_when_hashable() {
        let svc = Authenticated::new(
            service_fn(echo_headers),
            Recording,
            AuthOptions::new(Credential { id: "id" }),
        );

        let res = svc.oneshot(request_with_payload("a=1")).await.unwrap();
        assert_eq!(res.body()["x-payload"], "a=1");
        assert!(!res.body().contains_key("x-normalized"));
    }

    #[tokio::test]
    async fn payload_hashability_and_normalization_are_configurable() {
        let options = AuthOptions::new(Credential { id: "id" })
            .payload_hashable_fn(|_| false)
            .normalize_fn(|parts| Some(parts.method.to_string()));
        let svc = Authenticated::new(service_fn(echo_headers), Recording, options);

        let res = svc.oneshot(request_with_payload("a=1")).await.unwrap();
        assert!(!res.body().contains_key("x-payload"));
        assert_eq!(res.body()["x-normalized"], "GET");
    }

    #[tokio::test]
    async fn refused_request_never_reaches_inner_service() {
        let reached = Arc::new(AtomicUsize::new(0));
        let inner = {
            let reached = reached.clone();
            service_fn(move |req: Request<()>| {
                reached.fetch_add(1, Ordering::SeqCst);
                echo_headers(req)
            })
        };
        let svc = Authenticated::new(inner, Recording, AuthOptions::new(Credential { id: "" }));

        let err = svc.oneshot(Request::new(())).await.unwrap_err();
        assert!(err.is::<Rejected>());
        assert_eq!(err.to_string(), "missing credential id");
        assert_eq!(reached.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn response_validation_is_off_by_default() {
        let svc = Authenticated::new(
            service_fn(|_req: Request<()>| async {
                Ok::<_, Infallible>(Response::new(()))
            }),
            Recording,
            AuthOptions::new(Credential { id: "id" }),
        );

        let res = svc.oneshot(Request::new(())).await.unwrap();
        assert_eq!(res.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn response_validation_rejects_unsigned_responses() {
        let options = AuthOptions::new(Credential { id: "id" }).enable_response_validation(true);
        let svc = Authenticated::new(
            service_fn(|req: Request<()>| async move {
                let mut res = Response::new(());
                if req.uri().path() == "/signed" {
                    res.headers_mut()
                        .insert("server-authorization", HeaderValue::from_static("Hawk mac=\"x\""));
                }
                Ok::<_, Infallible>(res)
            }),
            Recording,
            options,
        );

        let signed = Request::get("/signed").body(()).unwrap();
        assert!(svc.clone().oneshot(signed).await.is_ok());

        let unsigned = Request::get("/unsigned").body(()).unwrap();
        let err = svc.oneshot(unsigned).await.unwrap_err();
        assert!(err.is::<Rejected>());
    }
}
