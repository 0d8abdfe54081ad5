//! A one-shot disposal guard for resources that arrive at an unknown time.
//!
//! A [`DisposalGuard`] starts out empty. The code that eventually produces the resource calls
//! [`DisposalGuard::set`], and whoever wants the resource gone calls
//! [`DisposalGuard::dispose`]. The two calls may race from different tasks or threads; the
//! resource is released exactly once no matter which one wins:
//!
//! - `set` first: the resource is stored and released by the later `dispose`.
//! - `dispose` first: the guard becomes disposed and a late `set` releases the resource
//!   immediately instead of storing it.
//!
//! Releasing a resource means dropping it.
//!
//! # Example
//!
//! ```
//! use hawk_client::guard::{DisposalGuard, SetOutcome};
//!
//! let guard = DisposalGuard::new();
//! guard.dispose();
//!
//! // the resource arrived after the guard was disposed, so it's dropped right away
//! assert_eq!(guard.set(String::from("late response")), SetOutcome::Released);
//! assert!(guard.is_disposed());
//! ```

use crate::error::Error;
use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

const EMPTY: u8 = 0;
const ARMED: u8 = 1;
const DISPOSED: u8 = 2;

/// Something that can be told to release whatever it holds.
///
/// This is the object safe face of [`DisposalGuard`], used where the resource type must not
/// leak into a signature (for example [`CancelHook`](crate::cancel::CancelHook)).
pub trait Dispose {
    /// Release the held resource, if any. Must be idempotent.
    fn dispose(&self);
}

/// What happened to a resource handed to [`DisposalGuard::set`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetOutcome {
    /// The guard was empty and now holds the resource.
    Armed,
    /// The guard had already been disposed, so the resource was released immediately.
    Released,
    /// The guard already held a resource. The new one was released and the held one kept.
    ///
    /// This is a contract violation and panics in builds with debug assertions enabled.
    AlreadyArmed,
}

/// Thread safe one-shot guard around a single disposable resource.
///
/// The state transition is decided by a compare-and-swap on a tri-state cell
/// (`empty`, `armed`, `disposed`). The resource itself sits in a slot that is only touched
/// by whichever side won the transition, so no resource is ever both stored and dropped.
/// The slot's lock is only held to move the resource in or out, never while it is in use.
pub struct DisposalGuard<R> {
    state: AtomicU8,
    slot: Mutex<Option<R>>,
}

impl<R> DisposalGuard<R> {
    /// Create a new, empty guard.
    pub fn new() -> Self {
        Self {
            state: AtomicU8::new(EMPTY),
            slot: Mutex::new(None),
        }
    }

    /// Arm the guard with `resource`.
    ///
    /// If the guard was already disposed the resource is dropped before this returns.
    pub fn set(&self, resource: R) -> SetOutcome {
        {
            let mut slot = self.slot();
            // an armed guard may have lent its resource out through `with_resource`
            if slot.is_some() || self.is_armed() {
                drop(slot);
                return self.reject_second_set(resource);
            }
            *slot = Some(resource);
        }

        match self
            .state
            .compare_exchange(EMPTY, ARMED, Ordering::AcqRel, Ordering::Acquire)
        {
            Ok(_) => {
                tracing::trace!("disposal guard armed");
                SetOutcome::Armed
            }
            Err(DISPOSED) => {
                // `dispose` won the race and saw an empty guard, so the resource we just
                // parked is ours to release.
                let late = self.slot().take();
                drop(late);
                tracing::trace!("disposal guard already disposed, released late resource");
                SetOutcome::Released
            }
            Err(_) => {
                // armed by a concurrent `set`
                let extra = self.slot().take();
                match extra {
                    Some(extra) => self.reject_second_set(extra),
                    None => SetOutcome::AlreadyArmed,
                }
            }
        }
    }

    /// Arm the guard with a resource that might be absent.
    ///
    /// Fails with [`Error::InvalidArgument`] and leaves the guard untouched when `resource`
    /// is `None`.
    pub fn try_set(&self, resource: Option<R>) -> Result<SetOutcome, Error> {
        match resource {
            Some(resource) => Ok(self.set(resource)),
            None => Err(Error::InvalidArgument("resource")),
        }
    }

    /// Dispose the guard, releasing the armed resource if there is one.
    ///
    /// Calling this more than once is fine; the resource is released at most once.
    pub fn dispose(&self) {
        match self.state.swap(DISPOSED, Ordering::AcqRel) {
            ARMED => match self.slot().take() {
                Some(resource) => {
                    drop(resource);
                    tracing::trace!("disposal guard disposed, released armed resource");
                }
                None => tracing::trace!("disposal guard disposed while its resource is in use"),
            },
            EMPTY => tracing::trace!("disposal guard disposed before being armed"),
            _ => {}
        }
    }

    /// Returns `true` once [`dispose`](Self::dispose) has been called.
    pub fn is_disposed(&self) -> bool {
        self.state.load(Ordering::Acquire) == DISPOSED
    }

    /// Returns `true` if the guard currently holds a resource.
    pub fn is_armed(&self) -> bool {
        self.state.load(Ordering::Acquire) == ARMED
    }

    /// Run `f` against the armed resource.
    ///
    /// Returns `None` if the guard is empty or has been disposed, or if another
    /// `with_resource` call currently has the resource.
    ///
    /// The resource is taken out of the slot while `f` runs, so a concurrent
    /// [`dispose`](Self::dispose) never waits for `f`. If the guard is disposed in the
    /// meantime, the resource is released as soon as `f` returns.
    pub fn with_resource<T, F>(&self, f: F) -> Option<T>
    where
        F: FnOnce(&mut R) -> T,
    {
        if !self.is_armed() {
            return None;
        }
        let mut resource = self.slot().take()?;
        let output = f(&mut resource);

        let mut slot = self.slot();
        if self.is_armed() {
            *slot = Some(resource);
        } else {
            drop(slot);
            drop(resource);
            tracing::trace!("disposal guard disposed during use, released resource");
        }
        Some(output)
    }

    fn slot(&self) -> MutexGuard<'_, Option<R>> {
        // a panic while holding the lock can't leave the `Option` half written
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn reject_second_set(&self, resource: R) -> SetOutcome {
        drop(resource);
        tracing::error!("disposal guard armed twice, released the second resource");
        if cfg!(debug_assertions) {
            panic!(
                "multiple calls to `DisposalGuard::set` without calling `DisposalGuard::dispose`"
            );
        }
        SetOutcome::AlreadyArmed
    }
}

impl<R> Dispose for DisposalGuard<R> {
    fn dispose(&self) {
        DisposalGuard::dispose(self)
    }
}

impl<R> Default for DisposalGuard<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R> fmt::Debug for DisposalGuard<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match self.state.load(Ordering::Acquire) {
            EMPTY => "Empty",
            ARMED => "Armed",
            _ => "Disposed",
        };
        f.debug_struct("DisposalGuard").field("state", &state).finish()
    }
}
