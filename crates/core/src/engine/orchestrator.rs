// Sequence orchestration: validation, level-by-level execution and caching

use crate::action::{Action, ActionContext};
use crate::cache::Cache;
use crate::config::{FailurePolicy, OperatorConfig};
use crate::engine::executor::Executor;
use crate::error::OperatorResult;
use crate::recipe::Recipe;
use crate::registry::Registry;
use crate::types::{
    ActionCall, ActionMetadata, ActionResult, Category, ExecutionId, ExecutionResult, Values,
};
use chrono::Utc;
use futures::stream::{self, StreamExt};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// Front door for callers that want to run actions rather than manage them.
///
/// The operator validates a sequence against its [`Registry`], groups it into
/// dependency levels, runs each level concurrently and waits for the whole
/// level before starting the next one. Successful outputs are merged and fed
/// forward as inputs to later levels.
pub struct Operator {
    registry: Arc<Registry>,
    cache: Cache,
    executor: Executor,
    config: OperatorConfig,
}

impl Operator {
    pub fn new(registry: Arc<Registry>, config: OperatorConfig) -> Self {
        let executor = Executor::new().with_default_timeout(config.execution.default_timeout());
        let cache = Cache::new(&config.cache);

        Self {
            registry,
            cache,
            executor,
            config,
        }
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub fn cache(&self) -> &Cache {
        &self.cache
    }

    pub fn config(&self) -> &OperatorConfig {
        &self.config
    }

    /// Metadata of every action matching `query`, or of all actions when the
    /// query is empty
    pub fn discover_actions(&self, query: &str) -> Vec<ActionMetadata> {
        if query.trim().is_empty() {
            return self.registry.metadata();
        }
        self.registry
            .search(query.trim())
            .iter()
            .map(|action| action.metadata())
            .collect()
    }

    pub fn available_actions(&self, category: Option<Category>) -> Vec<ActionMetadata> {
        let actions = match category {
            Some(category) => self.registry.list_by_category(category),
            None => self.registry.list(),
        };
        actions.iter().map(|action| action.metadata()).collect()
    }

    pub fn get_action(&self, name: &str) -> OperatorResult<Arc<Action>> {
        self.registry.get(name)
    }

    pub fn validate_sequence(&self, calls: &[ActionCall]) -> OperatorResult<()> {
        self.registry.validate_sequence(calls)
    }

    /// Run one action, answering from the cache when possible
    pub async fn execute_action(
        &self,
        ctx: &ActionContext,
        name: &str,
        inputs: Values,
    ) -> OperatorResult<ActionResult> {
        let call = ActionCall {
            action: name.to_string(),
            inputs,
        };
        let (action, inputs) = self.registry.resolve(&call)?;
        Ok(self.invoke(&action, ctx, inputs).await)
    }

    /// Validate and run a whole sequence.
    ///
    /// Only structural problems (unknown actions, cycles, conflicts) are
    /// returned as errors, and in that case nothing runs. Everything that
    /// goes wrong during execution is reported in the [`ExecutionResult`].
    pub async fn execute_sequence(
        &self,
        ctx: &ActionContext,
        calls: Vec<ActionCall>,
    ) -> OperatorResult<ExecutionResult> {
        let groups = self.registry.parallel_groups(&calls)?;
        let policy = self.config.execution.failure_policy;

        let id = ExecutionId::new();
        let started_at = Utc::now();
        let start = Instant::now();

        tracing::info!(
            "Starting sequence execution: id={}, actions={}, levels={}",
            id,
            calls.len(),
            groups.len()
        );

        let mut results: Vec<ActionResult> = Vec::with_capacity(calls.len());
        let mut skipped: Vec<String> = Vec::new();
        let mut blocked: HashSet<String> = HashSet::new();
        let mut outputs = Values::new();
        let mut halted = false;

        for (level, group) in groups.into_iter().enumerate() {
            if !halted && ctx.is_cancelled() {
                tracing::warn!("Sequence execution cancelled: id={}, level={}", id, level);
                halted = true;
            }
            if halted {
                skipped.extend(group.into_iter().map(|call| call.action));
                continue;
            }

            let mut runnable = Vec::with_capacity(group.len());
            for call in group {
                if policy == FailurePolicy::ContinueIndependent {
                    if let Some(dependency) = self.blocking_dependency(&call, &blocked) {
                        tracing::info!(
                            "Skipping action {}: dependency {} did not succeed",
                            call.action,
                            dependency
                        );
                        blocked.insert(call.action.clone());
                        skipped.push(call.action);
                        continue;
                    }
                }
                runnable.push(enrich(call, &outputs));
            }

            tracing::debug!("Executing level {} with {} actions", level, runnable.len());

            let limit = match self.config.execution.max_parallelism {
                0 => runnable.len().max(1),
                n => n,
            };
            let level_results: Vec<ActionResult> = stream::iter(runnable)
                .map(|call| self.run_call(ctx, call))
                .buffered(limit)
                .collect()
                .await;

            for result in level_results {
                if result.success {
                    for (key, value) in &result.outputs {
                        outputs.insert(key.clone(), value.clone());
                    }
                } else {
                    blocked.insert(result.action.clone());
                    if policy == FailurePolicy::Abort {
                        halted = true;
                    }
                }
                results.push(result);
            }
        }

        let success = skipped.is_empty() && results.iter().all(|r| r.success);
        let total_duration = start.elapsed();

        if success {
            tracing::info!(
                "Sequence execution completed: id={}, duration={:?}",
                id,
                total_duration
            );
        } else {
            tracing::warn!(
                "Sequence execution finished with failures: id={}, failed={}, skipped={}",
                id,
                results.iter().filter(|r| !r.success).count(),
                skipped.len()
            );
        }

        Ok(ExecutionResult {
            id,
            success,
            actions: results,
            skipped,
            total_duration,
            outputs,
            started_at,
            completed_at: Utc::now(),
        })
    }

    /// Turn a recipe into a validated sequence without running it
    pub fn plan_recipe(&self, recipe: &Recipe, inputs: &Values) -> OperatorResult<Vec<ActionCall>> {
        let calls = recipe.plan(inputs)?;
        self.registry.validate_sequence(&calls)?;

        tracing::info!("Planned recipe {} into {} actions", recipe.name, calls.len());
        Ok(calls)
    }

    pub async fn run_recipe(
        &self,
        ctx: &ActionContext,
        recipe: &Recipe,
        inputs: &Values,
    ) -> OperatorResult<ExecutionResult> {
        let calls = self.plan_recipe(recipe, inputs)?;
        self.execute_sequence(ctx, calls).await
    }

    /// Resolve and run a call inside a sequence; resolution errors become a
    /// failed result for that call
    async fn run_call(&self, ctx: &ActionContext, call: ActionCall) -> ActionResult {
        match self.registry.resolve(&call) {
            Ok((action, inputs)) => self.invoke(&action, ctx, inputs).await,
            Err(e) => {
                tracing::warn!("Action {} rejected: {}", call.action, e);
                ActionResult::failed(&call.action, e.to_string(), Duration::ZERO)
            }
        }
    }

    async fn invoke(&self, action: &Action, ctx: &ActionContext, inputs: Values) -> ActionResult {
        let caching = self.config.cache.enabled;

        if caching {
            if let Some(outputs) = self.cache.get(&action.name, &inputs) {
                tracing::debug!("Cache hit for action {}", action.name);
                return ActionResult::succeeded(&action.name, outputs, Duration::ZERO);
            }
        }

        let result = self.executor.invoke(action, ctx, inputs.clone()).await;

        if caching && result.success {
            self.cache.set(
                &action.name,
                &inputs,
                result.outputs.clone(),
                self.cache.default_ttl(),
            );
        }
        result
    }

    fn blocking_dependency(&self, call: &ActionCall, blocked: &HashSet<String>) -> Option<String> {
        let action = self.registry.get(&call.action).ok()?;
        action
            .dependencies
            .iter()
            .find(|dependency| blocked.contains(dependency.as_str()))
            .cloned()
    }
}

/// Fill inputs the call did not supply from outputs of earlier levels
fn enrich(mut call: ActionCall, outputs: &Values) -> ActionCall {
    for (key, value) in outputs {
        call.inputs
            .entry(key.clone())
            .or_insert_with(|| value.clone());
    }
    call
}
