//! Error types for the orchestration engine.

/// Result type for engine operations.
pub type OperatorResult<T> = Result<T, OperatorError>;

/// Structural errors raised before any action runs.
///
/// Failures inside an action's own handler are never reported through this
/// type; they come back as a failed [`ActionResult`](crate::types::ActionResult).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OperatorError {
    /// Malformed action definition.
    #[error("InvalidAction: {reason}")]
    InvalidAction { reason: String },

    /// An action with this name is already registered.
    #[error("InvalidAction [action: {name}]: action '{name}' already registered")]
    DuplicateAction { name: String },

    /// Lookup or execution against an unregistered name.
    #[error("ActionNotFound [action: {name}]: action '{name}' not found in registry")]
    ActionNotFound { name: String },

    /// A required input was not supplied.
    #[error("MissingInput [action: {action}]: required input '{input}' not provided")]
    MissingInput { action: String, input: String },

    /// A supplied input was rejected.
    #[error("InvalidInput [action: {action}]: invalid input '{input}': {reason}")]
    InvalidInput {
        action: String,
        input: String,
        reason: String,
    },

    /// The scoped dependency graph contains a cycle.
    #[error("CyclicDependency: cyclic dependency detected: [{}]", .cycle.join(", "))]
    CyclicDependency { cycle: Vec<String> },

    /// Two mutually exclusive actions appear in the same sequence.
    #[error("ConflictDetected [action: {action}]: action '{action}' conflicts with '{conflicts_with}'")]
    Conflict {
        action: String,
        conflicts_with: String,
    },

    /// Topological sort produced fewer nodes than the graph holds.
    #[error("unable to create topological sort: ordered {sorted} of {nodes} nodes")]
    GraphInconsistent { sorted: usize, nodes: usize },

    /// A recipe could not be parsed or instantiated.
    #[error("Recipe error: {0}")]
    Recipe(String),
}

impl OperatorError {
    pub(crate) fn invalid_action(reason: impl Into<String>) -> Self {
        Self::InvalidAction {
            reason: reason.into(),
        }
    }

    pub(crate) fn not_found(name: impl Into<String>) -> Self {
        Self::ActionNotFound { name: name.into() }
    }

    /// Name of the action the error is about, when there is exactly one.
    pub fn action(&self) -> Option<&str> {
        match self {
            Self::DuplicateAction { name } | Self::ActionNotFound { name } => Some(name),
            Self::MissingInput { action, .. }
            | Self::InvalidInput { action, .. }
            | Self::Conflict { action, .. } => Some(action),
            _ => None,
        }
    }
}
