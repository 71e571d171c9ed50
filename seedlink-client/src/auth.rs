//! Optional authentication hook for the dormant `AUTH <value>\r` step.
//!
//! No wire challenge format is documented upstream, so this step only runs
//! when a caller opts in by installing callbacks; the Negotiator never
//! assumes it is present.

use std::sync::Arc;

/// Supplies the `AUTH` value and is notified of the outcome.
///
/// `value_fn` is called once, synchronously, to produce the string sent as
/// `AUTH <value>\r`; `finish_fn` is called with whether the server accepted
/// it.
#[derive(Clone)]
pub struct AuthCallbacks {
    value_fn: Arc<dyn Fn() -> String + Send + Sync>,
    finish_fn: Arc<dyn Fn(bool) + Send + Sync>,
}

impl AuthCallbacks {
    pub fn new(
        value_fn: impl Fn() -> String + Send + Sync + 'static,
        finish_fn: impl Fn(bool) + Send + Sync + 'static,
    ) -> Self {
        Self {
            value_fn: Arc::new(value_fn),
            finish_fn: Arc::new(finish_fn),
        }
    }

    pub fn value(&self) -> String {
        (self.value_fn)()
    }

    pub fn finish(&self, accepted: bool) {
        (self.finish_fn)(accepted)
    }
}

impl std::fmt::Debug for AuthCallbacks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthCallbacks").finish_non_exhaustive()
    }
}
