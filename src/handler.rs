//! Handler capability contracts.
//!
//! The command-side aggregate, the projection bodies, and the external
//! effect bodies are named collaborators outside this crate's scope; only
//! their result contract is modeled here. Both capabilities are plain
//! single-method traits so that event-name variants are discriminated by
//! the `event_name` tag at the call site rather than by inheritance.

use async_trait::async_trait;

use crate::model::IntegrationEvent;

/// Outcome of a single handler invocation.
#[derive(Debug, Clone)]
pub enum HandlerOutcome {
    Success,
    Failure { error: String },
}

impl HandlerOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, HandlerOutcome::Success)
    }

    /// Error string for this outcome, using the sentinel `"None"` when the
    /// side succeeded (per the failure protocol's joined-error format).
    pub fn error_or_none(&self) -> String {
        match self {
            HandlerOutcome::Success => "None".to_string(),
            HandlerOutcome::Failure { error } => error.clone(),
        }
    }
}

/// Updates a read-model table derived from an integration event.
#[async_trait]
pub trait ProjectionHandler: Send + Sync {
    async fn handle(&self, event: &IntegrationEvent) -> HandlerOutcome;
}

/// Triggers a side effect observable outside the system (publishing to a
/// broker, calling an API) in response to an integration event.
#[async_trait]
pub trait ExternalEffectHandler: Send + Sync {
    async fn handle(&self, event: &IntegrationEvent) -> HandlerOutcome;
}

#[cfg(test)]
pub(crate) mod test_support {
    //! Handler stand-ins shared by processor and worker unit tests.

    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// A handler whose outcome is scripted in advance, one entry per call.
    /// Falls back to repeating the last entry once the script is exhausted.
    pub struct ScriptedHandler {
        script: Mutex<Vec<HandlerOutcome>>,
        calls: AtomicUsize,
    }

    impl ScriptedHandler {
        pub fn new(script: Vec<HandlerOutcome>) -> Self {
            Self {
                script: Mutex::new(script),
                calls: AtomicUsize::new(0),
            }
        }

        pub fn always(outcome: HandlerOutcome) -> Self {
            Self::new(vec![outcome])
        }

        pub fn call_count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        fn next_outcome(&self) -> HandlerOutcome {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let script = self.script.lock().expect("script mutex poisoned");
            if script.len() == 1 {
                script[0].clone()
            } else {
                script
                    .get(self.calls.load(Ordering::SeqCst) - 1)
                    .cloned()
                    .unwrap_or(HandlerOutcome::Success)
            }
        }
    }

    #[async_trait]
    impl ProjectionHandler for ScriptedHandler {
        async fn handle(&self, _event: &IntegrationEvent) -> HandlerOutcome {
            self.next_outcome()
        }
    }

    #[async_trait]
    impl ExternalEffectHandler for ScriptedHandler {
        async fn handle(&self, _event: &IntegrationEvent) -> HandlerOutcome {
            self.next_outcome()
        }
    }
}
