// JSON schema export of action inputs, for tool catalogs built on the registry

use crate::action::Action;
use crate::types::{Input, InputType};
use serde_json::{json, Map, Value};

impl InputType {
    /// JSON schema type name
    pub fn schema_type(&self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Bool => "boolean",
            Self::Int => "integer",
            Self::Float => "number",
            Self::Array => "array",
            Self::Object => "object",
        }
    }
}

impl Action {
    /// Object schema describing this action's declared inputs
    pub fn input_schema(&self) -> Value {
        let properties: Map<String, Value> = self
            .inputs
            .iter()
            .map(|input| (input.name.clone(), input_property(input)))
            .collect();
        let required: Vec<&str> = self
            .inputs
            .iter()
            .filter(|input| input.required)
            .map(|input| input.name.as_str())
            .collect();

        json_schema_object(Value::Object(properties), required)
    }
}

fn input_property(input: &Input) -> Value {
    let mut property = match input.input_type {
        InputType::String => json_schema_string(&input.description),
        InputType::Array => json_schema_array(json!({}), &input.description),
        other => json!({
            "type": other.schema_type(),
            "description": input.description,
        }),
    };
    if !input.options.is_empty() {
        property["enum"] = json!(input.options);
    }
    if let Some(default) = &input.default {
        property["default"] = default.clone();
    }
    property
}

pub fn json_schema_object(properties: Value, required: Vec<&str>) -> Value {
    json!({
        "type": "object",
        "properties": properties,
        "required": required
    })
}

pub fn json_schema_string(description: &str) -> Value {
    json!({
        "type": "string",
        "description": description
    })
}

pub fn json_schema_array(items: Value, description: &str) -> Value {
    json!({
        "type": "array",
        "items": items,
        "description": description
    })
}
