//! Side effects that may only happen once a unit of work has committed.

use store::UnitOfWork;

use crate::error::CheckoutError;

type Hook = Box<dyn FnOnce() + Send>;

/// Deferred actions collected while a unit of work is open.
///
/// Call [`PostCommitHooks::run`] after a successful commit. On any other
/// path the list is simply dropped and nothing runs.
#[derive(Default)]
pub struct PostCommitHooks {
    hooks: Vec<Hook>,
}

impl PostCommitHooks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues `hook` to run after commit.
    pub fn defer(&mut self, hook: impl FnOnce() + Send + 'static) {
        self.hooks.push(Box::new(hook));
    }

    pub fn len(&self) -> usize {
        self.hooks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }

    /// Runs every queued hook in registration order.
    pub fn run(self) {
        for hook in self.hooks {
            hook();
        }
    }
}

impl std::fmt::Debug for PostCommitHooks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PostCommitHooks")
            .field("pending", &self.hooks.len())
            .finish()
    }
}

/// Rolls `tx` back and hands `err` back to the caller.
///
/// A failing rollback is logged; the error that caused the abort is the one
/// worth reporting.
pub(crate) async fn abort<U: UnitOfWork>(tx: U, err: CheckoutError) -> CheckoutError {
    if let Err(rollback_err) = tx.rollback().await {
        tracing::warn!(error = %rollback_err, cause = %err, "rollback failed");
    }
    err
}
