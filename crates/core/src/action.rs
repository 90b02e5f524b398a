// Action definitions, handler capability and input validation

use crate::error::{OperatorError, OperatorResult};
use crate::types::{ActionMetadata, Category, Input, Output, Tier, Values};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Failure reported by an action handler.
///
/// Handler failures never surface as engine errors; the executor turns them
/// into a failed [`ActionResult`](crate::types::ActionResult).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ActionFailure {
    #[error("{0}")]
    Failed(String),

    #[error("action cancelled")]
    Cancelled,
}

impl ActionFailure {
    pub fn new(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }
}

impl From<anyhow::Error> for ActionFailure {
    fn from(err: anyhow::Error) -> Self {
        Self::Failed(format!("{:#}", err))
    }
}

/// Cancellable, optionally deadline-bearing context handed to handlers.
///
/// Cancellation is cooperative: handlers are expected to check
/// [`is_cancelled`](Self::is_cancelled) or await [`cancelled`](Self::cancelled).
#[derive(Debug, Clone, Default)]
pub struct ActionContext {
    token: CancellationToken,
    deadline: Option<Instant>,
}

impl ActionContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_token(token: CancellationToken) -> Self {
        Self {
            token,
            deadline: None,
        }
    }

    /// Tighten the deadline to at most `timeout` from now. A timeout too
    /// large to represent leaves the context without a new deadline.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        let Some(deadline) = Instant::now().checked_add(timeout) else {
            return self;
        };
        self.deadline = Some(match self.deadline {
            Some(existing) if existing < deadline => existing,
            _ => deadline,
        });
        self
    }

    /// Child context: cancelled with its parent, cancellable on its own
    pub fn child(&self) -> Self {
        Self {
            token: self.token.child_token(),
            deadline: self.deadline,
        }
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Time left before the deadline, `None` without one
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|deadline| deadline.saturating_duration_since(Instant::now()))
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled() || self.deadline.is_some_and(|d| Instant::now() >= d)
    }

    /// Resolves once the context is cancelled or its deadline passes
    pub async fn cancelled(&self) {
        match self.deadline {
            Some(deadline) => {
                tokio::select! {
                    _ = self.token.cancelled() => {}
                    _ = tokio::time::sleep_until(deadline) => {}
                }
            }
            None => self.token.cancelled().await,
        }
    }
}

/// Executable behaviour of an action
#[async_trait::async_trait]
pub trait ActionHandler: Send + Sync {
    async fn invoke(&self, ctx: &ActionContext, inputs: Values) -> Result<Values, ActionFailure>;
}

/// Adapts an async closure into an [`ActionHandler`]
pub struct FnHandler<F> {
    func: F,
}

impl<F, Fut> FnHandler<F>
where
    F: Fn(ActionContext, Values) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Values, ActionFailure>> + Send + 'static,
{
    pub fn new(func: F) -> Self {
        Self { func }
    }
}

#[async_trait::async_trait]
impl<F, Fut> ActionHandler for FnHandler<F>
where
    F: Fn(ActionContext, Values) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Values, ActionFailure>> + Send + 'static,
{
    async fn invoke(&self, ctx: &ActionContext, inputs: Values) -> Result<Values, ActionFailure> {
        (self.func)(ctx.clone(), inputs).await
    }
}

/// A single atomic operation
#[derive(Clone, Serialize, Deserialize)]
pub struct Action {
    pub name: String,
    pub description: String,
    pub category: Category,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub tier: Tier,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimated_time: Option<Duration>,

    #[serde(default)]
    pub inputs: Vec<Input>,
    #[serde(default)]
    pub outputs: Vec<Output>,

    /// Actions that must run before this one
    #[serde(default)]
    pub dependencies: Vec<String>,
    /// Actions that may never appear in the same sequence as this one
    #[serde(default)]
    pub conflicts: Vec<String>,

    #[serde(skip)]
    pub handler: Option<Arc<dyn ActionHandler>>,
}

impl std::fmt::Debug for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Action")
            .field("name", &self.name)
            .field("category", &self.category)
            .field("tier", &self.tier)
            .field("tags", &self.tags)
            .field("inputs", &self.inputs)
            .field("dependencies", &self.dependencies)
            .field("conflicts", &self.conflicts)
            .field("has_handler", &self.handler.is_some())
            .finish()
    }
}

impl Action {
    pub fn builder(name: impl Into<String>) -> ActionBuilder {
        ActionBuilder::new(name)
    }

    /// Check that the definition is complete enough to register
    pub fn validate(&self) -> OperatorResult<()> {
        if self.name.is_empty() {
            return Err(OperatorError::invalid_action("action name is required"));
        }
        if self.description.is_empty() {
            return Err(OperatorError::invalid_action(format!(
                "action '{}': description is required",
                self.name
            )));
        }
        if self.handler.is_none() {
            return Err(OperatorError::invalid_action(format!(
                "action '{}': implementation is required",
                self.name
            )));
        }
        Ok(())
    }

    /// Check supplied inputs against the declared ones.
    ///
    /// Undeclared inputs are passed through unchecked. Option lists only
    /// constrain string values.
    pub fn validate_inputs(&self, supplied: &Values) -> OperatorResult<()> {
        for input in &self.inputs {
            let value = match supplied.get(&input.name) {
                Some(value) => value,
                None if input.required => {
                    return Err(OperatorError::MissingInput {
                        action: self.name.clone(),
                        input: input.name.clone(),
                    });
                }
                None => continue,
            };

            if input.options.is_empty() {
                continue;
            }
            if let Some(text) = value.as_str() {
                if !input.options.iter().any(|option| option == text) {
                    return Err(OperatorError::InvalidInput {
                        action: self.name.clone(),
                        input: input.name.clone(),
                        reason: format!("must be one of: {}", input.options.join(", ")),
                    });
                }
            }
        }
        Ok(())
    }

    /// Copy of `supplied` with declared defaults filled in for absent inputs
    pub fn apply_defaults(&self, supplied: &Values) -> Values {
        let mut resolved = supplied.clone();
        for input in &self.inputs {
            if let Some(default) = &input.default {
                resolved
                    .entry(input.name.clone())
                    .or_insert_with(|| default.clone());
            }
        }
        resolved
    }

    pub fn metadata(&self) -> ActionMetadata {
        ActionMetadata {
            name: self.name.clone(),
            description: self.description.clone(),
            category: self.category,
            tags: self.tags.clone(),
            tier: self.tier,
            estimated_time: self.estimated_time,
        }
    }

    /// Case-insensitive substring match on name, description and tags.
    /// `query` must already be lowercase.
    pub(crate) fn matches_query(&self, query: &str) -> bool {
        self.name.to_lowercase().contains(query)
            || self.description.to_lowercase().contains(query)
            || self.tags.iter().any(|tag| tag.to_lowercase().contains(query))
    }

    pub(crate) fn conflicts_with(&self, other: &str) -> bool {
        self.conflicts.iter().any(|c| c == other)
    }
}

/// Fluent constructor for [`Action`]
pub struct ActionBuilder {
    name: String,
    description: String,
    category: Option<Category>,
    tier: Tier,
    tags: Vec<String>,
    estimated_time: Option<Duration>,
    inputs: Vec<Input>,
    outputs: Vec<Output>,
    dependencies: Vec<String>,
    conflicts: Vec<String>,
    handler: Option<Arc<dyn ActionHandler>>,
}

impl ActionBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            category: None,
            tier: Tier::default(),
            tags: Vec::new(),
            estimated_time: None,
            inputs: Vec::new(),
            outputs: Vec::new(),
            dependencies: Vec::new(),
            conflicts: Vec::new(),
            handler: None,
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn category(mut self, category: Category) -> Self {
        self.category = Some(category);
        self
    }

    pub fn tier(mut self, tier: Tier) -> Self {
        self.tier = tier;
        self
    }

    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    pub fn estimated_time(mut self, estimate: Duration) -> Self {
        self.estimated_time = Some(estimate);
        self
    }

    pub fn input(mut self, input: Input) -> Self {
        self.inputs.push(input);
        self
    }

    pub fn output(mut self, output: Output) -> Self {
        self.outputs.push(output);
        self
    }

    pub fn depends_on(mut self, action: impl Into<String>) -> Self {
        self.dependencies.push(action.into());
        self
    }

    pub fn conflicts_with(mut self, action: impl Into<String>) -> Self {
        self.conflicts.push(action.into());
        self
    }

    pub fn handler(mut self, handler: impl ActionHandler + 'static) -> Self {
        self.handler = Some(Arc::new(handler));
        self
    }

    /// Shorthand for `handler(FnHandler::new(func))`
    pub fn handler_fn<F, Fut>(self, func: F) -> Self
    where
        F: Fn(ActionContext, Values) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Values, ActionFailure>> + Send + 'static,
    {
        self.handler(FnHandler::new(func))
    }

    /// Assemble the action. Only the category is checked here; the full
    /// [`Action::validate`] runs at registration.
    pub fn build(self) -> OperatorResult<Action> {
        let category = self.category.ok_or_else(|| {
            OperatorError::invalid_action(format!("action '{}': category is required", self.name))
        })?;

        Ok(Action {
            name: self.name,
            description: self.description,
            category,
            tags: self.tags,
            tier: self.tier,
            estimated_time: self.estimated_time,
            inputs: self.inputs,
            outputs: self.outputs,
            dependencies: self.dependencies,
            conflicts: self.conflicts,
            handler: self.handler,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::InputType;
    use serde_json::json;

    fn noop() -> impl ActionHandler {
        FnHandler::new(|_ctx: ActionContext, _inputs: Values| async {
            Ok::<_, ActionFailure>(Values::new())
        })
    }

    fn setup_db() -> Action {
        Action::builder("setup_db")
            .description("Provision a database")
            .category(Category::Setup)
            .input(Input::new("name", InputType::String).required())
            .input(
                Input::new("engine", InputType::String)
                    .options(["postgres", "sqlite"])
                    .default_value("sqlite"),
            )
            .input(Input::new("port", InputType::Int).default_value(5432))
            .handler(noop())
            .build()
            .unwrap()
    }

    #[test]
    fn test_validate_requires_core_fields() {
        assert!(setup_db().validate().is_ok());

        let mut action = setup_db();
        action.name.clear();
        assert!(matches!(
            action.validate(),
            Err(OperatorError::InvalidAction { .. })
        ));

        let mut action = setup_db();
        action.description.clear();
        assert!(matches!(
            action.validate(),
            Err(OperatorError::InvalidAction { .. })
        ));

        let mut action = setup_db();
        action.handler = None;
        let err = action.validate().unwrap_err();
        assert!(err.to_string().contains("implementation is required"));
    }

    #[test]
    fn test_builder_requires_category() {
        let result = Action::builder("x").description("x").handler(noop()).build();
        assert!(matches!(result, Err(OperatorError::InvalidAction { .. })));
    }

    #[test]
    fn test_validate_inputs_missing_required() {
        let action = setup_db();
        let err = action.validate_inputs(&Values::new()).unwrap_err();
        assert_eq!(
            err,
            OperatorError::MissingInput {
                action: "setup_db".to_string(),
                input: "name".to_string(),
            }
        );
    }

    #[test]
    fn test_validate_inputs_enforces_options() {
        let action = setup_db();
        let mut inputs = Values::new();
        inputs.insert("name".to_string(), json!("app_db"));
        inputs.insert("engine".to_string(), json!("mysql"));

        match action.validate_inputs(&inputs).unwrap_err() {
            OperatorError::InvalidInput { input, reason, .. } => {
                assert_eq!(input, "engine");
                assert_eq!(reason, "must be one of: postgres, sqlite");
            }
            other => panic!("unexpected error: {other}"),
        }

        inputs.insert("engine".to_string(), json!("postgres"));
        assert!(action.validate_inputs(&inputs).is_ok());

        // Option lists only constrain strings
        inputs.insert("engine".to_string(), json!(3));
        assert!(action.validate_inputs(&inputs).is_ok());
    }

    #[test]
    fn test_validate_inputs_passes_undeclared_through() {
        let action = setup_db();
        let mut inputs = Values::new();
        inputs.insert("name".to_string(), json!("app_db"));
        inputs.insert("extra".to_string(), json!({"anything": true}));
        assert!(action.validate_inputs(&inputs).is_ok());
    }

    #[test]
    fn test_apply_defaults_does_not_mutate_supplied() {
        let action = setup_db();
        let mut supplied = Values::new();
        supplied.insert("name".to_string(), json!("app_db"));
        supplied.insert("engine".to_string(), json!("postgres"));

        let resolved = action.apply_defaults(&supplied);

        assert_eq!(supplied.len(), 2);
        assert_eq!(resolved.len(), 3);
        assert_eq!(resolved["engine"], json!("postgres"));
        assert_eq!(resolved["port"], json!(5432));
    }

    #[test]
    fn test_matches_query() {
        let mut action = setup_db();
        action.tags = vec!["Database".to_string()];
        assert!(action.matches_query("setup"));
        assert!(action.matches_query("provision"));
        assert!(action.matches_query("datab"));
        assert!(!action.matches_query("deploy"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_context_deadline() {
        let ctx = ActionContext::new().with_timeout(Duration::from_secs(10));
        assert!(!ctx.is_cancelled());
        assert_eq!(ctx.remaining(), Some(Duration::from_secs(10)));

        // A looser timeout never extends the deadline
        let ctx = ctx.with_timeout(Duration::from_secs(60));
        assert_eq!(ctx.remaining(), Some(Duration::from_secs(10)));

        ctx.cancelled().await;
        assert!(ctx.is_cancelled());
    }

    #[tokio::test(start_paused = true)]
    async fn test_unrepresentable_timeout_adds_no_deadline() {
        let huge = Duration::from_secs(i64::MAX as u64);

        let ctx = ActionContext::new().with_timeout(huge);
        assert!(ctx.deadline().is_none());
        assert!(!ctx.is_cancelled());

        // An existing deadline is kept
        let ctx = ActionContext::new()
            .with_timeout(Duration::from_secs(5))
            .with_timeout(huge);
        assert_eq!(ctx.remaining(), Some(Duration::from_secs(5)));
    }

    #[tokio::test]
    async fn test_child_context_follows_parent() {
        let parent = ActionContext::new();
        let child = parent.child();
        assert!(!child.is_cancelled());

        parent.cancel();
        child.cancelled().await;
        assert!(child.is_cancelled());
    }
}
