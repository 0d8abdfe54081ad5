//! The per-call abort handle handed to request decoration callbacks.

use crate::guard::Dispose;
use std::fmt;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Aborts one in-flight call.
///
/// Invoking the hook cancels the call's cancellation token, which makes the executor abandon
/// the transport call, and disposes the call's [`DisposalGuard`], which releases the response
/// if one has already been armed. It can be invoked before the request is sent, while it is in
/// flight, or after the response was handed out.
///
/// Hooks are cheap to clone and can be moved to other tasks, which is how an external abort
/// mechanism (for example a connection's "stop" action) gets wired to a request.
///
/// [`DisposalGuard`]: crate::guard::DisposalGuard
#[derive(Clone)]
pub struct CancelHook {
    token: CancellationToken,
    guard: Arc<dyn Dispose + Send + Sync>,
}

impl CancelHook {
    pub(crate) fn new(token: CancellationToken, guard: Arc<dyn Dispose + Send + Sync>) -> Self {
        Self { token, guard }
    }

    /// Abort the call. Calling this more than once has no further effect.
    pub fn abort(&self) {
        if !self.token.is_cancelled() {
            tracing::debug!("request aborted through its cancel hook");
        }
        self.token.cancel();
        self.guard.dispose();
    }

    /// Returns `true` if the call has been aborted, either through this hook or because the
    /// caller's cancellation token fired.
    pub fn is_aborted(&self) -> bool {
        self.token.is_cancelled()
    }

    /// The token the executor watches for this call.
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }
}

impl fmt::Debug for CancelHook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancelHook")
            .field("aborted", &self.is_aborted())
            .finish()
    }
}
