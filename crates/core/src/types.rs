use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use uuid::Uuid;

/// Named values passed into and out of actions
pub type Values = HashMap<String, serde_json::Value>;

/// Unique identifier for a sequence execution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ExecutionId(pub Uuid);

impl ExecutionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ExecutionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ExecutionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Performance tier of an action (informational)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    /// Under 30 seconds, optimized implementation
    #[default]
    Fast,
    /// 30 seconds to 5 minutes, may need interpretation
    Flexible,
}

/// Kind of work an action performs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    /// Create new projects or files
    Create,
    /// Set up infrastructure or services
    Setup,
    /// Add features to existing projects
    Add,
    /// Deploy applications
    Deploy,
    /// Utility actions
    Util,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Setup => "setup",
            Self::Add => "add",
            Self::Deploy => "deploy",
            Self::Util => "util",
        }
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Category {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "create" => Ok(Self::Create),
            "setup" => Ok(Self::Setup),
            "add" => Ok(Self::Add),
            "deploy" => Ok(Self::Deploy),
            "util" | "utility" => Ok(Self::Util),
            other => Err(format!("unknown action category '{}'", other)),
        }
    }
}

/// Type of an input or output value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputType {
    String,
    Bool,
    Int,
    Float,
    Array,
    Object,
}

/// Declared input parameter of an action
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Input {
    pub name: String,
    #[serde(rename = "type")]
    pub input_type: InputType,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<serde_json::Value>,
    /// Allowed values for string inputs; empty means unconstrained
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<String>,
}

impl Input {
    pub fn new(name: impl Into<String>, input_type: InputType) -> Self {
        Self {
            name: name.into(),
            input_type,
            description: String::new(),
            required: false,
            default: None,
            options: Vec::new(),
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn default_value(mut self, value: impl Into<serde_json::Value>) -> Self {
        self.default = Some(value.into());
        self
    }

    pub fn options<I, S>(mut self, options: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.options = options.into_iter().map(Into::into).collect();
        self
    }
}

/// Declared output of an action (descriptive only)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Output {
    pub name: String,
    #[serde(rename = "type")]
    pub output_type: InputType,
    #[serde(default)]
    pub description: String,
}

impl Output {
    pub fn new(name: impl Into<String>, output_type: InputType) -> Self {
        Self {
            name: name.into(),
            output_type,
            description: String::new(),
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

/// Request to execute an action with specific inputs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionCall {
    pub action: String,
    #[serde(default)]
    pub inputs: Values,
}

impl ActionCall {
    pub fn new(action: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            inputs: Values::new(),
        }
    }

    pub fn with_input(mut self, name: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.inputs.insert(name.into(), value.into());
        self
    }
}

/// Outcome of executing a single action
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionResult {
    pub action: String,
    pub success: bool,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub outputs: Values,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub duration: Duration,
}

impl ActionResult {
    pub fn succeeded(action: impl Into<String>, outputs: Values, duration: Duration) -> Self {
        Self {
            action: action.into(),
            success: true,
            outputs,
            error: None,
            duration,
        }
    }

    pub fn failed(action: impl Into<String>, error: impl Into<String>, duration: Duration) -> Self {
        Self {
            action: action.into(),
            success: false,
            outputs: Values::new(),
            error: Some(error.into()),
            duration,
        }
    }
}

/// Outcome of executing a sequence of actions
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub id: ExecutionId,
    pub success: bool,
    /// Results in the order the actions ran
    pub actions: Vec<ActionResult>,
    /// Actions that never ran because an earlier action failed
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub skipped: Vec<String>,
    pub total_duration: Duration,
    /// Outputs of all successful actions; later results overwrite earlier keys
    pub outputs: Values,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
}

impl ExecutionResult {
    /// Result for the named action, if it ran
    pub fn result(&self, action: &str) -> Option<&ActionResult> {
        self.actions.iter().find(|r| r.action == action)
    }

    /// Results of the actions that failed
    pub fn failures(&self) -> impl Iterator<Item = &ActionResult> {
        self.actions.iter().filter(|r| !r.success)
    }
}

/// Lightweight, implementation-free description of an action for discovery
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionMetadata {
    pub name: String,
    pub description: String,
    pub category: Category,
    pub tags: Vec<String>,
    pub tier: Tier,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimated_time: Option<Duration>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_round_trips_through_str() {
        for category in [
            Category::Create,
            Category::Setup,
            Category::Add,
            Category::Deploy,
            Category::Util,
        ] {
            assert_eq!(category.as_str().parse::<Category>().unwrap(), category);
        }
        assert_eq!("Utility".parse::<Category>().unwrap(), Category::Util);
        assert!("teardown".parse::<Category>().is_err());
    }

    #[test]
    fn test_action_result_success_and_error_are_exclusive() {
        let ok = ActionResult::succeeded("a", Values::new(), Duration::ZERO);
        assert!(ok.success);
        assert!(ok.error.is_none());

        let failed = ActionResult::failed("a", "boom", Duration::ZERO);
        assert!(!failed.success);
        assert_eq!(failed.error.as_deref(), Some("boom"));
        assert!(failed.outputs.is_empty());
    }

    #[test]
    fn test_input_serializes_with_type_key() {
        let input = Input::new("db", InputType::String)
            .required()
            .options(["postgres", "sqlite"]);
        let json = serde_json::to_value(&input).unwrap();

        assert_eq!(json["type"], "string");
        assert_eq!(json["required"], true);
        assert_eq!(json["options"][1], "sqlite");
        assert!(json.get("default").is_none());
    }
}
