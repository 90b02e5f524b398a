// Recipes: named, parameterised action sequences stored as TOML

use crate::error::{OperatorError, OperatorResult};
use crate::types::{ActionCall, Values};
use anyhow::Context;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;

/// A recipe file.
///
/// ```toml
/// name = "saas-starter"
/// desc = "Web app with database"
/// steps = ["create_web_app name={{app}}", "setup_{{db}} name={{app}}_db"]
///
/// [inputs]
/// app = "string = my-app"
/// db = "postgres|sqlite = sqlite"
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recipe {
    pub name: String,
    pub desc: String,
    /// Input name to definition, `"type = default"` or `"a|b|c = default"`
    #[serde(default)]
    pub inputs: BTreeMap<String, String>,
    pub steps: Vec<String>,
}

/// Input kind declared by a recipe
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecipeInputType {
    String,
    Number,
    Bool,
    Enum,
    /// Any other declared type name, not checked
    Other(String),
}

impl RecipeInputType {
    fn from_name(name: &str) -> Self {
        match name {
            "" | "string" => Self::String,
            "number" | "int" | "float" => Self::Number,
            "bool" | "boolean" => Self::Bool,
            other => Self::Other(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedInput {
    pub name: String,
    pub input_type: RecipeInputType,
    pub options: Vec<String>,
    pub default: Option<String>,
}

impl ParsedInput {
    /// Parse a definition such as `"string = my-app"` or `"jwt|clerk = jwt"`
    pub fn parse(name: &str, definition: &str) -> Self {
        let (type_def, default) = match definition.split_once('=') {
            Some((type_def, default)) => (type_def.trim(), default.trim()),
            None => (definition.trim(), ""),
        };
        let default = (!default.is_empty()).then(|| default.to_string());

        if type_def.contains('|') {
            return Self {
                name: name.to_string(),
                input_type: RecipeInputType::Enum,
                options: type_def.split('|').map(|o| o.trim().to_string()).collect(),
                default,
            };
        }

        Self {
            name: name.to_string(),
            input_type: RecipeInputType::from_name(type_def),
            options: Vec::new(),
            default,
        }
    }

    fn check(&self, value: &str) -> OperatorResult<()> {
        match &self.input_type {
            RecipeInputType::Enum if !self.options.iter().any(|o| o == value) => {
                Err(OperatorError::Recipe(format!(
                    "input '{}' must be one of: {}",
                    self.name,
                    self.options.join(", ")
                )))
            }
            RecipeInputType::Number if value.parse::<f64>().is_err() => Err(OperatorError::Recipe(
                format!("input '{}' must be a number, got '{}'", self.name, value),
            )),
            RecipeInputType::Bool if value.parse::<bool>().is_err() => Err(OperatorError::Recipe(
                format!("input '{}' must be true or false, got '{}'", self.name, value),
            )),
            _ => Ok(()),
        }
    }
}

impl Recipe {
    /// Read and validate a recipe file
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read recipe file {}", path.display()))?;
        let recipe = Self::from_toml_str(&content)
            .with_context(|| format!("Invalid recipe in {}", path.display()))?;

        tracing::debug!("Loaded recipe {} from {}", recipe.name, path.display());
        Ok(recipe)
    }

    pub fn from_toml_str(content: &str) -> OperatorResult<Self> {
        let recipe: Self = toml::from_str(content)
            .map_err(|e| OperatorError::Recipe(format!("failed to parse recipe: {}", e)))?;
        recipe.validate()?;
        Ok(recipe)
    }

    pub fn validate(&self) -> OperatorResult<()> {
        if self.name.trim().is_empty() {
            return Err(OperatorError::Recipe("recipe missing 'name' field".to_string()));
        }
        if self.desc.trim().is_empty() {
            return Err(OperatorError::Recipe(format!(
                "recipe '{}' missing 'desc' field",
                self.name
            )));
        }
        if self.steps.is_empty() {
            return Err(OperatorError::Recipe(format!("recipe '{}' has no steps", self.name)));
        }
        Ok(())
    }

    /// Parsed definitions of all declared inputs, ordered by name
    pub fn parsed_inputs(&self) -> Vec<ParsedInput> {
        self.inputs
            .iter()
            .map(|(name, definition)| ParsedInput::parse(name, definition))
            .collect()
    }

    /// Resolve every declared input to a string value.
    ///
    /// A missing input without a default is only an error when some step
    /// references it. Undeclared inputs are ignored.
    pub fn validate_inputs(&self, provided: &Values) -> OperatorResult<BTreeMap<String, String>> {
        let mut resolved = BTreeMap::new();

        for input in self.parsed_inputs() {
            let value = match provided.get(&input.name) {
                Some(Value::String(s)) => s.clone(),
                Some(other) => other.to_string(),
                None => match &input.default {
                    Some(default) => default.clone(),
                    None if self.uses_input(&input.name) => {
                        return Err(OperatorError::Recipe(format!(
                            "required input '{}' not provided",
                            input.name
                        )));
                    }
                    None => continue,
                },
            };

            input.check(&value)?;
            resolved.insert(input.name, value);
        }

        Ok(resolved)
    }

    /// Turn the recipe into action calls, in step order
    pub fn plan(&self, provided: &Values) -> OperatorResult<Vec<ActionCall>> {
        let variables = self.validate_inputs(provided)?;

        self.steps
            .iter()
            .enumerate()
            .map(|(i, step)| {
                let step = replace_variables(step, &variables);
                if let Some(unresolved) = extract_variables(&step).first() {
                    return Err(OperatorError::Recipe(format!(
                        "step {} references undefined input '{}'",
                        i + 1,
                        unresolved
                    )));
                }
                parse_step(&step)
                    .ok_or_else(|| OperatorError::Recipe(format!("step {} is empty", i + 1)))
            })
            .collect()
    }

    fn uses_input(&self, name: &str) -> bool {
        self.steps
            .iter()
            .any(|step| extract_variables(step).iter().any(|used| used == name))
    }
}

/// Replace `{{name}}` placeholders with their values.
///
/// Whitespace inside the braces is ignored, so `{{ name }}` matches too.
/// Placeholders without a value are left as they are.
pub fn replace_variables(text: &str, variables: &BTreeMap<String, String>) -> String {
    let mut result = String::with_capacity(text.len());
    let mut rest = text;

    while let Some(open) = rest.find("{{") {
        let Some(close) = rest[open + 2..].find("}}").map(|i| open + 2 + i) else {
            break;
        };
        result.push_str(&rest[..open]);
        match variables.get(rest[open + 2..close].trim()) {
            Some(value) => result.push_str(value),
            None => result.push_str(&rest[open..close + 2]),
        }
        rest = &rest[close + 2..];
    }

    result.push_str(rest);
    result
}

/// Placeholder names still present in a string, sorted and deduplicated
pub fn extract_variables(text: &str) -> Vec<String> {
    let mut names = Vec::new();
    let mut chars = text.chars().peekable();
    let mut current = String::new();
    let mut in_placeholder = false;

    while let Some(c) = chars.next() {
        if c == '{' && chars.peek() == Some(&'{') {
            chars.next();
            in_placeholder = true;
            current.clear();
        } else if c == '}' && chars.peek() == Some(&'}') && in_placeholder {
            chars.next();
            if !current.trim().is_empty() {
                names.push(current.trim().to_string());
            }
            in_placeholder = false;
            current.clear();
        } else if in_placeholder {
            current.push(c);
        }
    }

    names.sort();
    names.dedup();
    names
}

/// Parse `"action key=value key2=value2"` into a call.
///
/// Tokens without `=` are ignored. Returns `None` for a blank step.
pub fn parse_step(step: &str) -> Option<ActionCall> {
    let mut parts = step.split_whitespace();
    let mut call = ActionCall::new(parts.next()?);

    for part in parts {
        if let Some((key, value)) = part.split_once('=') {
            call.inputs
                .insert(key.to_string(), Value::String(value.to_string()));
        }
    }

    Some(call)
}
