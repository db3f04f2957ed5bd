//! Request lifecycle tracking
//!
//! A [`PromiseTracker`] wraps any fallible async operation and exposes an
//! idle/loading/success/error status for it, together with the last result
//! and the last error. Operations run through [`retry`](crate::retry::retry).

use std::fmt::Display;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::reactive::ReactiveCell;
use crate::retry::{self, RetryPolicy};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RequestState {
    #[default]
    Idle,
    Loading,
    Success,
    Error,
}

impl RequestState {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestState::Idle => "idle",
            RequestState::Loading => "loading",
            RequestState::Success => "success",
            RequestState::Error => "error",
        }
    }

    pub fn is_loading(&self) -> bool {
        matches!(self, RequestState::Loading)
    }
}

struct Outcome<R, E> {
    data: Option<R>,
    error: Option<Arc<E>>,
}

/// Shared handle: clones observe and drive the same lifecycle.
pub struct PromiseTracker<R, E> {
    state: ReactiveCell<RequestState>,
    outcome: Arc<Mutex<Outcome<R, E>>>,
    policy: RetryPolicy,
    throw_errors: bool,
}

impl<R, E> Clone for PromiseTracker<R, E> {
    fn clone(&self) -> Self {
        Self {
            state: self.state.clone(),
            outcome: Arc::clone(&self.outcome),
            policy: self.policy,
            throw_errors: self.throw_errors,
        }
    }
}

impl<R, E> PromiseTracker<R, E>
where
    R: Clone,
    E: Display,
{
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            state: ReactiveCell::new(RequestState::Idle),
            outcome: Arc::new(Mutex::new(Outcome {
                data: None,
                error: None,
            })),
            policy,
            throw_errors: false,
        }
    }

    /// Hand the terminal error back to the caller of [`retry`](Self::retry)
    /// in addition to recording it.
    pub fn throw_errors(mut self, throw: bool) -> Self {
        self.throw_errors = throw;
        self
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    pub fn state(&self) -> RequestState {
        self.state.get()
    }

    pub fn state_cell(&self) -> &ReactiveCell<RequestState> {
        &self.state
    }

    pub fn data(&self) -> Option<R> {
        self.lock().data.clone()
    }

    pub fn error(&self) -> Option<Arc<E>> {
        self.lock().error.clone()
    }

    /// Start `op`.
    ///
    /// The tracker moves to `Loading` and forgets the previous error before
    /// this returns; the returned future does the actual work. Overlapping
    /// calls are not serialised, the last one to settle wins.
    pub fn retry<F, Fut>(
        &self,
        op: F,
    ) -> impl Future<Output = Result<Option<R>, Arc<E>>> + 'static
    where
        F: FnMut() -> Fut + 'static,
        Fut: Future<Output = Result<R, E>> + 'static,
        R: 'static,
        E: 'static,
    {
        self.lock().error = None;
        self.state.set(RequestState::Loading);
        tracing::debug!(state = "loading", "request started");

        let tracker = self.clone();
        async move {
            match retry::retry(tracker.policy, op).await {
                Ok(value) => {
                    tracker.lock().data = Some(value.clone());
                    tracker.state.set(RequestState::Success);
                    tracing::debug!(state = "success", "request settled");
                    Ok(Some(value))
                }
                Err(e) => {
                    tracing::warn!(error = %e, "request failed after retries");
                    let error = Arc::new(e);
                    tracker.lock().error = Some(Arc::clone(&error));
                    tracker.state.set(RequestState::Error);
                    if tracker.throw_errors {
                        Err(error)
                    } else {
                        Ok(None)
                    }
                }
            }
        }
    }

    pub fn reset(&self) {
        {
            let mut outcome = self.lock();
            outcome.data = None;
            outcome.error = None;
        }
        self.state.set(RequestState::Idle);
    }

    fn lock(&self) -> MutexGuard<'_, Outcome<R, E>> {
        self.outcome.lock().unwrap_or_else(|e| e.into_inner())
    }
}
