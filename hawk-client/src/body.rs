//! Response bodies owned by a [`DisposalGuard`].

use crate::error::{BoxError, Error};
use crate::guard::DisposalGuard;
use http_body::{Body, Frame, SizeHint};
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio_util::sync::{CancellationToken, WaitForCancellationFutureOwned};

pub(crate) type SharedGuard<B> = Arc<DisposalGuard<Pin<Box<B>>>>;

/// The body of a successful response.
///
/// The underlying transport body is held by the call's guard, not by this value. Reading goes
/// through the guard, and the body is released exactly once: when this value is dropped, when
/// [`dispose`](GuardedBody::dispose) is called, when the call's
/// [`CancelHook`](crate::cancel::CancelHook) is invoked, or when the caller's cancellation
/// token fires, whichever comes first. A fired token is noticed by a pending read, so a
/// reader parked on a long-running stream is woken and the stream released.
///
/// Polling a body whose guard was disposed yields an [`Error::Canceled`] error.
pub struct GuardedBody<B> {
    guard: SharedGuard<B>,
    token: CancellationToken,
    canceled: Pin<Box<WaitForCancellationFutureOwned>>,
}

impl<B> GuardedBody<B> {
    pub(crate) fn new(guard: SharedGuard<B>, token: CancellationToken) -> Self {
        Self {
            guard,
            canceled: Box::pin(token.clone().cancelled_owned()),
            token,
        }
    }

    /// Release the underlying body now.
    pub fn dispose(&self) {
        self.guard.dispose();
    }

    /// Returns `true` if the underlying body has been released.
    pub fn is_disposed(&self) -> bool {
        self.guard.is_disposed()
    }
}

impl<B> Body for GuardedBody<B>
where
    B: Body,
    B::Error: Into<BoxError>,
{
    type Data = B::Data;
    type Error = BoxError;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        let this = self.get_mut();

        if this.canceled.as_mut().poll(cx).is_ready() {
            if !this.guard.is_disposed() {
                tracing::debug!("response body canceled through its cancellation token");
            }
            this.guard.dispose();
            return Poll::Ready(Some(Err(Error::Canceled.into())));
        }

        match this
            .guard
            .with_resource(|body| body.as_mut().poll_frame(cx))
        {
            Some(Poll::Ready(frame)) => Poll::Ready(frame.map(|frame| frame.map_err(Into::into))),
            Some(Poll::Pending) => Poll::Pending,
            None => Poll::Ready(Some(Err(Error::Canceled.into()))),
        }
    }

    fn is_end_stream(&self) -> bool {
        // a disposed or canceled body still reports its cancellation on the next poll
        if self.token.is_cancelled() {
            return false;
        }
        self.guard
            .with_resource(|body| body.is_end_stream())
            .unwrap_or(false)
    }

    fn size_hint(&self) -> SizeHint {
        self.guard
            .with_resource(|body| body.size_hint())
            .unwrap_or_default()
    }
}

impl<B> Drop for GuardedBody<B> {
    fn drop(&mut self) {
        self.guard.dispose();
    }
}

impl<B> fmt::Debug for GuardedBody<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GuardedBody")
            .field("guard", &self.guard)
            .field("canceled", &self.token.is_cancelled())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::guard::SetOutcome;
    use crate::test_helpers::{CountingBody, ReleaseCounter};
    use http_body_util::BodyExt;

    fn armed(body: CountingBody) -> GuardedBody<CountingBody> {
        armed_with_token(body, CancellationToken::new())
    }

    fn armed_with_token(
        body: CountingBody,
        token: CancellationToken,
    ) -> GuardedBody<CountingBody> {
        let guard = Arc::new(DisposalGuard::new());
        assert_eq!(guard.set(Box::pin(body)), SetOutcome::Armed);
        GuardedBody::new(guard, token)
    }

    #[tokio::test]
    async fn reads_through_the_guard_and_releases_on_drop() {
        let counter = ReleaseCounter::new();
        let body = armed(CountingBody::new("ok", &counter));

        let bytes = body.collect().await.unwrap().to_bytes();
        assert_eq!(bytes, "ok");
        assert_eq!(counter.released(), 1);
    }

    #[tokio::test]
    async fn disposed_body_reports_cancellation() {
        let counter = ReleaseCounter::new();
        let body = armed(CountingBody::new("never read", &counter));

        body.dispose();
        body.dispose();
        assert!(body.is_disposed());
        assert_eq!(counter.released(), 1);

        let err = body.collect().await.unwrap_err();
        assert!(err.downcast_ref::<Error>().unwrap().is_canceled());
        assert_eq!(counter.released(), 1);
    }

    #[tokio::test]
    async fn canceled_token_releases_body_on_next_read() {
        let counter = ReleaseCounter::new();
        let token = CancellationToken::new();
        let body = armed_with_token(CountingBody::new("stream", &counter), token.clone());

        token.cancel();
        assert!(!body.is_end_stream());

        let err = body.collect().await.unwrap_err();
        assert!(err.downcast_ref::<Error>().unwrap().is_canceled());
        assert_eq!(counter.released(), 1);
    }

    #[tokio::test]
    async fn canceled_token_wakes_a_pending_read() {
        let counter = ReleaseCounter::new();
        let token = CancellationToken::new();
        let body = armed_with_token(CountingBody::pending(&counter), token.clone());

        let (result, ()) = tokio::join!(body.collect(), async {
            tokio::task::yield_now().await;
            token.cancel();
        });

        let err = result.unwrap_err();
        assert!(err.downcast_ref::<Error>().unwrap().is_canceled());
        assert_eq!(counter.released(), 1);
    }
}
