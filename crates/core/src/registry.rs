// Registry of available actions and the dependency graph derived from them

use crate::action::{Action, ActionContext};
use crate::engine::executor::Executor;
use crate::engine::graph::DependencyGraph;
use crate::error::{OperatorError, OperatorResult};
use crate::types::{ActionCall, ActionMetadata, ActionResult, Category, Values};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Default)]
struct RegistryState {
    actions: HashMap<String, Arc<Action>>,
    graph: DependencyGraph,
}

/// Source of truth for which actions exist and how they relate.
///
/// Reads (lookups, search, validation, ordering) share the lock; only
/// [`register`](Self::register) takes it exclusively. Actions are immutable
/// once registered and are never removed.
#[derive(Default)]
pub struct Registry {
    state: RwLock<RegistryState>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an action and add one graph edge per declared dependency
    pub fn register(&self, action: Action) -> OperatorResult<()> {
        action.validate()?;

        let mut state = self.state.write();
        if state.actions.contains_key(&action.name) {
            return Err(OperatorError::DuplicateAction {
                name: action.name.clone(),
            });
        }

        state.graph.add_node(&action.name);
        for dependency in &action.dependencies {
            state.graph.add_edge(dependency, &action.name);
        }

        tracing::info!(
            "Registered action {} ({} dependencies, {} conflicts)",
            action.name,
            action.dependencies.len(),
            action.conflicts.len()
        );
        state.actions.insert(action.name.clone(), Arc::new(action));

        Ok(())
    }

    pub fn get(&self, name: &str) -> OperatorResult<Arc<Action>> {
        self.state
            .read()
            .actions
            .get(name)
            .cloned()
            .ok_or_else(|| OperatorError::not_found(name))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.state.read().actions.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.state.read().actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All registered actions, sorted by name
    pub fn list(&self) -> Vec<Arc<Action>> {
        self.collect(|_| true)
    }

    pub fn list_by_category(&self, category: Category) -> Vec<Arc<Action>> {
        self.collect(|action| action.category == category)
    }

    /// Case-insensitive substring search over name, description and tags
    pub fn search(&self, query: &str) -> Vec<Arc<Action>> {
        let query = query.to_lowercase();
        self.collect(|action| action.matches_query(&query))
    }

    /// Implementation-free view of every action, sorted by name
    pub fn metadata(&self) -> Vec<ActionMetadata> {
        self.list().iter().map(|action| action.metadata()).collect()
    }

    /// Check that `calls` can run together: every action exists, the
    /// dependencies among them are acyclic and no two of them conflict.
    ///
    /// Dependencies on actions outside `calls` are not checked.
    pub fn validate_sequence(&self, calls: &[ActionCall]) -> OperatorResult<()> {
        let state = self.state.read();
        Self::validate_calls(&state, calls)
    }

    /// `calls` reordered so every action follows its in-set dependencies.
    ///
    /// Independent actions are ordered by name. When the same action is
    /// called more than once only one call is kept, the last one submitted.
    pub fn execution_order(&self, calls: &[ActionCall]) -> OperatorResult<Vec<ActionCall>> {
        let state = self.state.read();
        Self::validate_calls(&state, calls)?;

        let names = call_names(calls);
        let order = state.graph.subgraph(&names).topological_sort()?;
        let by_name = index_calls(calls);

        Ok(order
            .iter()
            .map(|name| by_name[name.as_str()].clone())
            .collect())
    }

    /// `calls` grouped into levels that may each run concurrently
    pub fn parallel_groups(&self, calls: &[ActionCall]) -> OperatorResult<Vec<Vec<ActionCall>>> {
        let state = self.state.read();
        Self::validate_calls(&state, calls)?;

        let groups = state.graph.parallel_groups(&call_names(calls))?;
        let by_name = index_calls(calls);

        Ok(groups
            .iter()
            .map(|group| {
                group
                    .iter()
                    .map(|name| by_name[name.as_str()].clone())
                    .collect()
            })
            .collect())
    }

    /// Transitive prerequisites of `name` in the registration graph
    pub fn dependencies_of(&self, name: &str) -> OperatorResult<Vec<String>> {
        let state = self.state.read();
        if !state.actions.contains_key(name) {
            return Err(OperatorError::not_found(name));
        }
        Ok(state.graph.dependencies(name))
    }

    /// Transitive dependents of `name` in the registration graph
    pub fn dependents_of(&self, name: &str) -> OperatorResult<Vec<String>> {
        let state = self.state.read();
        if !state.actions.contains_key(name) {
            return Err(OperatorError::not_found(name));
        }
        Ok(state.graph.dependents(name))
    }

    /// Look up the action for `call`, validate its inputs and apply defaults
    pub fn resolve(&self, call: &ActionCall) -> OperatorResult<(Arc<Action>, Values)> {
        let action = self.get(&call.action)?;
        action.validate_inputs(&call.inputs)?;
        let inputs = action.apply_defaults(&call.inputs);
        Ok((action, inputs))
    }

    /// Execute a single action with no default deadline and no caching;
    /// [`Operator`](crate::engine::Operator) adds both.
    ///
    /// Only lookup and input validation failures are returned as errors; a
    /// failing handler yields `Ok` with an unsuccessful [`ActionResult`].
    pub async fn execute(&self, ctx: &ActionContext, call: ActionCall) -> OperatorResult<ActionResult> {
        let (action, inputs) = self.resolve(&call)?;
        Ok(Executor::new().invoke(&action, ctx, inputs).await)
    }

    fn collect(&self, filter: impl Fn(&Action) -> bool) -> Vec<Arc<Action>> {
        let state = self.state.read();
        let mut actions: Vec<Arc<Action>> = state
            .actions
            .values()
            .filter(|action| filter(action))
            .cloned()
            .collect();
        actions.sort_by(|a, b| a.name.cmp(&b.name));
        actions
    }

    fn validate_calls(state: &RegistryState, calls: &[ActionCall]) -> OperatorResult<()> {
        let mut actions = Vec::with_capacity(calls.len());
        for call in calls {
            let action = state
                .actions
                .get(&call.action)
                .ok_or_else(|| OperatorError::not_found(&call.action))?;
            actions.push(action.as_ref());
        }

        state.graph.validate_sequence(&call_names(calls))?;

        for (position, action) in actions.iter().enumerate() {
            for earlier in &actions[..position] {
                if action.conflicts_with(&earlier.name) || earlier.conflicts_with(&action.name) {
                    return Err(OperatorError::Conflict {
                        action: action.name.clone(),
                        conflicts_with: earlier.name.clone(),
                    });
                }
            }
        }

        tracing::debug!("Validated sequence of {} actions", calls.len());
        Ok(())
    }
}

fn call_names(calls: &[ActionCall]) -> Vec<&str> {
    calls.iter().map(|call| call.action.as_str()).collect()
}

fn index_calls(calls: &[ActionCall]) -> HashMap<&str, &ActionCall> {
    let mut by_name = HashMap::with_capacity(calls.len());
    for call in calls {
        if by_name.insert(call.action.as_str(), call).is_some() {
            tracing::warn!(
                "Action {} appears more than once in the sequence; keeping the last call",
                call.action
            );
        }
    }
    by_name
}
