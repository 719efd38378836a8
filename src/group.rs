//! Structured task groups.
//!
//! A [`TaskGroup`] binds a set of tokio tasks to one cancellation scope. Every
//! task receives the scope's token, errors are collected rather than
//! short-circuited, and [`TaskGroup::wait`] returns only after every task,
//! including ones spawned while waiting, has finished.

use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};

use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{error, warn};

use crate::error::{Error, ErrorSet, Result};

/// What a finished task does to the rest of its group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Policy {
    /// Cancel the scope whenever the task returns, successfully or not.
    CancelOnExit,
    /// Cancel the scope only if the task returns an error.
    CancelOnError,
    /// Never cancel the scope. Errors and panics are logged instead of being
    /// collected, so the task cannot fail its group.
    Isolated,
}

#[derive(Debug, Clone)]
pub struct TaskGroup {
    token: CancellationToken,
    tracker: TaskTracker,
    errors: Arc<Mutex<Vec<Error>>>,
}

impl TaskGroup {
    /// Create a group whose scope is cancelled together with `parent`.
    pub fn new(parent: &CancellationToken) -> Self {
        Self {
            token: parent.child_token(),
            tracker: TaskTracker::new(),
            errors: Arc::default(),
        }
    }

    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Spawn `task` into the group. `name` identifies the task if it dies
    /// without producing a result.
    pub fn spawn<F, Fut>(&self, name: &'static str, policy: Policy, task: F)
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        let fut = task(self.token.clone());
        let mut outcome = Outcome {
            name,
            policy,
            token: self.token.clone(),
            errors: Arc::clone(&self.errors),
            finished: false,
        };

        self.tracker.spawn(async move {
            let result = fut.await;
            outcome.finish(result);
        });
    }

    /// Wait for every task in the group and return the errors they raised.
    pub async fn wait(&self) -> ErrorSet {
        self.tracker.close();
        self.tracker.wait().await;

        let errors = std::mem::take(
            &mut *self.errors.lock().unwrap_or_else(PoisonError::into_inner),
        );
        ErrorSet::from(errors)
    }
}

/// Records a task's result. If the task is dropped before finishing (it
/// panicked or the runtime shut down) the drop records that instead and
/// cancels the scope.
struct Outcome {
    name: &'static str,
    policy: Policy,
    token: CancellationToken,
    errors: Arc<Mutex<Vec<Error>>>,
    finished: bool,
}

impl Outcome {
    fn finish(&mut self, result: Result<()>) {
        self.finished = true;

        match (self.policy, result) {
            (Policy::CancelOnExit, Ok(())) => self.token.cancel(),
            (_, Ok(())) => {}
            (Policy::Isolated, Err(e)) => warn!(task = self.name, error = %e, "isolated task failed"),
            (_, Err(e)) => {
                self.record(e);
                self.token.cancel();
            }
        }
    }

    fn record(&self, err: Error) {
        self.errors
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(err);
    }
}

impl Drop for Outcome {
    fn drop(&mut self) {
        if self.finished {
            return;
        }

        error!(task = self.name, "task exited without returning");
        if self.policy != Policy::Isolated {
            self.record(Error::TaskPanicked(self.name));
            self.token.cancel();
        }
    }
}
