//! Error types returned by the request executor.

use http::{HeaderMap, StatusCode, Version};
use std::fmt;

/// Alias for a type-erased error type.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Errors that can happen when executing a request.
///
/// Every variant is an ordinary value handed back to the caller; nothing is retried or
/// swallowed by the executor.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A required argument was missing or malformed. Raised before any network activity.
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),

    /// The underlying transport failed to produce a response (network, DNS, TLS, timeout).
    #[error("transport error: {0}")]
    Transport(#[source] BoxError),

    /// The server answered with a non-success status.
    #[error(transparent)]
    Status(StatusError),

    /// The authentication scheme refused to sign the request or rejected the response.
    #[error("authentication rejected: {0}")]
    Rejected(#[source] BoxError),

    /// The call was canceled before or while it was in flight.
    #[error("request canceled")]
    Canceled,
}

impl Error {
    /// Returns `true` if the call was canceled through its cancel hook or cancellation token.
    pub fn is_canceled(&self) -> bool {
        matches!(self, Error::Canceled)
    }

    /// Returns `true` if the server answered with a non-success status.
    pub fn is_status(&self) -> bool {
        matches!(self, Error::Status(_))
    }

    /// Returns `true` if the transport failed to produce a response.
    pub fn is_transport(&self) -> bool {
        matches!(self, Error::Transport(_))
    }

    /// The response status, if this is a status error.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Error::Status(err) => Some(err.status()),
            _ => None,
        }
    }

    pub(crate) fn from_transport(err: BoxError) -> Self {
        match err.downcast::<crate::auth::Rejected>() {
            Ok(rejected) => Error::Rejected(rejected),
            Err(err) => Error::Transport(err),
        }
    }
}

/// Metadata of a response whose status did not indicate success.
///
/// The response body has already been released by the time this error is observed.
#[derive(Debug, Clone)]
pub struct StatusError {
    status: StatusCode,
    version: Version,
    headers: HeaderMap,
}

impl StatusError {
    pub(crate) fn new(parts: &http::response::Parts) -> Self {
        Self {
            status: parts.status,
            version: parts.version,
            headers: parts.headers.clone(),
        }
    }

    /// The response status code.
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// The HTTP version of the response.
    pub fn version(&self) -> Version {
        self.version
    }

    /// The response headers.
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }
}

impl fmt::Display for StatusError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unsuccessful response status: {}", self.status)
    }
}

impl std::error::Error for StatusError {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::Rejected;

    #[test]
    fn rejected_errors_are_recognized() {
        let err: BoxError = Box::new(Rejected::new("bad mac"));
        assert!(matches!(Error::from_transport(err), Error::Rejected(_)));

        let err: BoxError = "connection reset".into();
        assert!(Error::from_transport(err).is_transport());
    }

    #[test]
    fn status_error_exposes_metadata() {
        let (parts, ()) = http::Response::builder()
            .status(StatusCode::SERVICE_UNAVAILABLE)
            .header("retry-after", "5")
            .body(())
            .unwrap()
            .into_parts();

        let err = Error::Status(StatusError::new(&parts));
        assert_eq!(err.status(), Some(StatusCode::SERVICE_UNAVAILABLE));
        assert_eq!(
            err.to_string(),
            "unsuccessful response status: 503 Service Unavailable"
        );
        match err {
            Error::Status(err) => assert_eq!(err.headers()["retry-after"], "5"),
            _ => unreachable!(),
        }
    }
}
