use crate::action::{Action, ActionContext, ActionFailure};
use crate::types::{ActionResult, Values};
use std::time::Duration;
use tokio::time::Instant;

/// Invokes a single action's handler and reports the outcome as data
#[derive(Debug, Clone, Default)]
pub struct Executor {
    default_timeout: Option<Duration>,
}

impl Executor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a deadline to every context that does not already have a tighter one
    pub fn with_default_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.default_timeout = timeout;
        self
    }

    /// Run the handler with already resolved inputs.
    ///
    /// Handler failures are returned as a failed [`ActionResult`], never
    /// propagated. Nothing is retried.
    pub async fn invoke(&self, action: &Action, ctx: &ActionContext, inputs: Values) -> ActionResult {
        let start = Instant::now();

        let Some(handler) = action.handler.as_ref() else {
            tracing::error!("Action {} has no implementation", action.name);
            return ActionResult::failed(&action.name, "action implementation is missing", start.elapsed());
        };

        let ctx = match self.default_timeout {
            Some(timeout) => ctx.clone().with_timeout(timeout),
            None => ctx.clone(),
        };

        if ctx.is_cancelled() {
            tracing::warn!("Skipping action {}: context already cancelled", action.name);
            return ActionResult::failed(&action.name, ActionFailure::Cancelled.to_string(), start.elapsed());
        }

        tracing::info!("Executing action {}", action.name);

        let result = handler.invoke(&ctx, inputs).await;
        let duration = start.elapsed();

        match result {
            Ok(outputs) => {
                tracing::info!(
                    "Action {} completed in {:?} with {} outputs",
                    action.name,
                    duration,
                    outputs.len()
                );
                ActionResult::succeeded(&action.name, outputs, duration)
            }
            Err(failure) => {
                tracing::warn!("Action {} failed after {:?}: {}", action.name, duration, failure);
                ActionResult::failed(&action.name, failure.to_string(), duration)
            }
        }
    }
}
