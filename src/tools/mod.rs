//! Tool abstraction: named capabilities with declared parameter shapes.

pub mod registry;

pub use registry::ToolRegistry;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::ToolError;

/// Declared type of a tool parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKind {
    String,
    Number,
    Boolean,
    Array,
    Object,
}

impl ParamKind {
    fn matches(&self, value: &Value) -> bool {
        match self {
            Self::String => value.is_string(),
            Self::Number => value.is_number(),
            Self::Boolean => value.is_boolean(),
            Self::Array => value.is_array(),
            Self::Object => value.is_object(),
        }
    }
}

/// One declared parameter.
#[derive(Debug, Clone)]
pub struct ParameterField {
    pub name: String,
    pub kind: ParamKind,
    pub required: bool,
    pub description: String,
}

/// Declared parameter shape for a tool.
#[derive(Debug, Clone, Default)]
pub struct ParameterSchema {
    fields: Vec<ParameterField>,
}

impl ParameterSchema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn required(mut self, name: impl Into<String>, kind: ParamKind) -> Self {
        self.fields.push(ParameterField {
            name: name.into(),
            kind,
            required: true,
            description: String::new(),
        });
        self
    }

    pub fn optional(mut self, name: impl Into<String>, kind: ParamKind) -> Self {
        self.fields.push(ParameterField {
            name: name.into(),
            kind,
            required: false,
            description: String::new(),
        });
        self
    }

    pub fn fields(&self) -> &[ParameterField] {
        &self.fields
    }

    /// Validate `params` against the declared shape.
    ///
    /// Params must be a JSON object; required fields must be present and
    /// every present field must match its declared type.
    pub fn validate(&self, params: &Value) -> Result<(), String> {
        let object = params
            .as_object()
            .ok_or_else(|| "parameters must be a JSON object".to_string())?;

        for field in &self.fields {
            match object.get(&field.name) {
                Some(value) => {
                    if !field.kind.matches(value) {
                        return Err(format!(
                            "field `{}` has wrong type, expected {:?}",
                            field.name, field.kind
                        ));
                    }
                }
                None if field.required => {
                    return Err(format!("missing required field `{}`", field.name));
                }
                None => {}
            }
        }
        Ok(())
    }
}

/// A named capability invocable by workers.
///
/// `execute` is only called with parameters that passed schema validation.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    fn schema(&self) -> ParameterSchema;

    async fn execute(&self, params: Value) -> Result<Value, ToolError>;
}
