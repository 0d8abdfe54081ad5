use bytes::Bytes;
use http_body::{Frame, SizeHint};
use http_body_util::Full;
use std::{
    convert::Infallible,
    pin::Pin,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    task::{Context, Poll},
};

/// Counts how many [`CountingBody`] values have been dropped.
#[derive(Debug, Clone, Default)]
pub(crate) struct ReleaseCounter(Arc<AtomicUsize>);

impl ReleaseCounter {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn released(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }
}

/// A response body standing in for a transport stream, recording its release.
#[derive(Debug)]
pub(crate) struct CountingBody {
    // `None` for a stream that never produces a frame
    inner: Option<Full<Bytes>>,
    counter: ReleaseCounter,
}

impl CountingBody {
    pub(crate) fn new(data: impl Into<Bytes>, counter: &ReleaseCounter) -> Self {
        Self {
            inner: Some(Full::new(data.into())),
            counter: counter.clone(),
        }
    }

    /// A body that stays pending forever, like an idle long poll.
    pub(crate) fn pending(counter: &ReleaseCounter) -> Self {
        Self {
            inner: None,
            counter: counter.clone(),
        }
    }
}

impl Drop for CountingBody {
    fn drop(&mut self) {
        self.counter.0.fetch_add(1, Ordering::SeqCst);
    }
}

impl http_body::Body for CountingBody {
    type Data = Bytes;
    type Error = Infallible;

    fn poll_frame(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        match &mut self.inner {
            Some(inner) => Pin::new(inner).poll_frame(cx),
            None => Poll::Pending,
        }
    }

    fn is_end_stream(&self) -> bool {
        self.inner.as_ref().map_or(false, |inner| inner.is_end_stream())
    }

    fn size_hint(&self) -> SizeHint {
        self.inner
            .as_ref()
            .map_or_else(SizeHint::default, |inner| inner.size_hint())
    }
}
