//! Plugin contract types for DevTerm
//!
//! This module defines the capability set every tool plugin implements
//! ([`ToolPlugin`]), the JSON-shaped values that cross the plugin boundary
//! ([`PluginInput`], [`PluginResult`], [`PluginSchema`]) and the
//! not-yet-instantiated form of a plugin held by the manager
//! ([`PluginDescriptor`]).

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{PluginError, Result};

/// Input handed to [`ToolPlugin::execute`]: an open-ended JSON object.
///
/// Plugins are expected to tolerate missing keys by substituting a default.
pub type PluginInput = Map<String, Value>;

/// Default description for plugins that do not provide one.
pub const DEFAULT_DESCRIPTION: &str = "A DevTerm tool plugin";

/// Default grouping label for plugins that do not provide one.
pub const DEFAULT_CATEGORY: &str = "Custom";

/// The result of a plugin execution.
///
/// Always carries `success`. Everything else is plugin-defined and flattened
/// into the same JSON object; by convention text plugins add `output` and
/// failures add `error`.
///
/// ```json
/// { "success": true, "output": "HELLO WORLD" }
/// { "success": false, "error": "'text' must be a string" }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PluginResult {
    /// Whether the plugin considers the call successful.
    pub success: bool,

    /// Additional plugin-defined fields.
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl PluginResult {
    /// A successful result carrying a text `output` field.
    pub fn output(text: impl Into<String>) -> Self {
        Self::success().with_field("output", Value::String(text.into()))
    }

    /// A successful result with no extra fields.
    pub fn success() -> Self {
        Self {
            success: true,
            fields: Map::new(),
        }
    }

    /// A failure result carrying an `error` message.
    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            fields: Map::new(),
        }
        .with_field("error", Value::String(error.into()))
    }

    /// Attach an additional field, replacing any previous value under `key`.
    pub fn with_field(mut self, key: impl Into<String>, value: Value) -> Self {
        self.fields.insert(key.into(), value);
        self
    }

    /// The `output` field, if present and a string.
    pub fn output_text(&self) -> Option<&str> {
        self.fields.get("output").and_then(Value::as_str)
    }

    /// The `error` field, if present and a string.
    pub fn error(&self) -> Option<&str> {
        self.fields.get("error").and_then(Value::as_str)
    }

    /// The whole result as a JSON value.
    pub fn to_value(&self) -> Value {
        let mut object = Map::with_capacity(self.fields.len() + 1);
        object.insert("success".to_string(), Value::Bool(self.success));
        for (key, value) in &self.fields {
            object.insert(key.clone(), value.clone());
        }
        Value::Object(object)
    }
}

impl fmt::Display for PluginResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_value())
    }
}

/// One accepted input in a [`PluginSchema`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaInput {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub label: String,
}

/// One produced output in a [`PluginSchema`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaOutput {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
}

/// Structural description of a plugin's inputs and outputs.
///
/// Descriptive only: the host never validates input against it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginSchema {
    #[serde(default)]
    pub inputs: Vec<SchemaInput>,
    #[serde(default)]
    pub outputs: Vec<SchemaOutput>,
}

impl PluginSchema {
    /// Schema shared by the text transforms: one `text` string in, one
    /// `output` string out.
    pub fn text_transform() -> Self {
        Self {
            inputs: vec![SchemaInput {
                name: "text".to_string(),
                kind: "string".to_string(),
                label: "Input Text".to_string(),
            }],
            outputs: vec![SchemaOutput {
                name: "output".to_string(),
                kind: "string".to_string(),
            }],
        }
    }
}

/// Identity of a live plugin as reported by `list_plugins`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginInfo {
    pub name: String,
    pub description: String,
    pub category: String,
}

/// The capability set every tool plugin implements.
///
/// Identity fields are fixed per plugin type and must be stable across calls.
/// `name` is the registry key, so it must be unique among the plugins one
/// manager holds.
///
/// Both `execute` and `schema` may fail. The manager contains execution
/// failures (errors and panics) into a failure [`PluginResult`]; schema
/// failures are returned to the caller as-is.
pub trait ToolPlugin: Send + Sync {
    /// Unique plugin name, used as the registry key.
    fn name(&self) -> &str;

    /// Human-readable description.
    fn description(&self) -> &str {
        DEFAULT_DESCRIPTION
    }

    /// Grouping label.
    fn category(&self) -> &str {
        DEFAULT_CATEGORY
    }

    /// Run the plugin against `input`.
    fn execute(&self, input: &PluginInput) -> Result<PluginResult>;

    /// Describe accepted inputs and produced outputs.
    fn schema(&self) -> Result<PluginSchema>;

    /// Identity triple for listings.
    fn info(&self) -> PluginInfo {
        PluginInfo {
            name: self.name().to_string(),
            description: self.description().to_string(),
            category: self.category().to_string(),
        }
    }
}

/// Read a string argument, defaulting to `""` when the key is absent or null.
///
/// A present value of any other JSON type is an execution error.
pub fn text_arg<'a>(input: &'a PluginInput, key: &str) -> Result<&'a str> {
    match input.get(key) {
        None | Some(Value::Null) => Ok(""),
        Some(Value::String(s)) => Ok(s.as_str()),
        Some(other) => Err(PluginError::Execution(format!(
            "'{}' must be a string, got {}",
            key,
            json_type_name(other)
        ))),
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Constructor for a plugin definition.
pub type PluginFactory = Arc<dyn Fn() -> Result<Box<dyn ToolPlugin>> + Send + Sync>;

/// Where a definition came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PluginOrigin {
    /// Declared by a candidate file under the discovery root.
    File(PathBuf),
    /// Registered from code.
    Registered,
}

impl fmt::Display for PluginOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PluginOrigin::File(path) => write!(f, "{}", path.display()),
            PluginOrigin::Registered => write!(f, "<registered>"),
        }
    }
}

/// A discovered but not yet instantiated plugin: a name bound to a factory.
#[derive(Clone)]
pub struct PluginDescriptor {
    name: String,
    origin: PluginOrigin,
    factory: PluginFactory,
}

impl PluginDescriptor {
    /// Create a descriptor from a fallible factory.
    pub fn new<F>(name: impl Into<String>, factory: F) -> Self
    where
        F: Fn() -> Result<Box<dyn ToolPlugin>> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            origin: PluginOrigin::Registered,
            factory: Arc::new(factory),
        }
    }

    /// Create a descriptor that builds `T::default()`.
    pub fn of<T>(name: impl Into<String>) -> Self
    where
        T: ToolPlugin + Default + 'static,
    {
        Self::new(name, || Ok(Box::new(T::default()) as Box<dyn ToolPlugin>))
    }

    /// Record the file this definition was discovered in.
    pub fn with_origin(mut self, origin: PluginOrigin) -> Self {
        self.origin = origin;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn origin(&self) -> &PluginOrigin {
        &self.origin
    }

    /// Run the factory. Panics are not caught here.
    pub fn instantiate(&self) -> Result<Box<dyn ToolPlugin>> {
        (self.factory)()
    }

    #[cfg_attr(not(feature = "native"), allow(dead_code))]
    pub(crate) fn factory(&self) -> PluginFactory {
        Arc::clone(&self.factory)
    }
}

impl fmt::Debug for PluginDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginDescriptor")
            .field("name", &self.name)
            .field("origin", &self.origin)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct Echo;

    impl ToolPlugin for Echo {
        fn name(&self) -> &str {
            "echo"
        }

        fn execute(&self, input: &PluginInput) -> Result<PluginResult> {
            Ok(PluginResult::output(text_arg(input, "text")?))
        }

        fn schema(&self) -> Result<PluginSchema> {
            Ok(PluginSchema::text_transform())
        }
    }

    fn input(value: Value) -> PluginInput {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_result_output_serialization() {
        let result = PluginResult::output("HELLO");
        assert_eq!(
            serde_json::to_value(&result).unwrap(),
            json!({"success": true, "output": "HELLO"})
        );
        assert_eq!(result.to_value(), json!({"success": true, "output": "HELLO"}));
    }

    #[test]
    fn test_result_failure_fields() {
        let result = PluginResult::failure("boom");
        assert!(!result.success);
        assert_eq!(result.error(), Some("boom"));
        assert_eq!(result.output_text(), None);
    }

    #[test]
    fn test_result_deserializes_extra_fields() {
        let result: PluginResult =
            serde_json::from_value(json!({"success": true, "output": "x", "count": 3})).unwrap();
        assert!(result.success);
        assert_eq!(result.output_text(), Some("x"));
        assert_eq!(result.fields.get("count"), Some(&json!(3)));
    }

    #[test]
    fn test_result_display_is_json() {
        let shown = PluginResult::output("cba").to_string();
        let parsed: Value = serde_json::from_str(&shown).unwrap();
        assert_eq!(parsed, json!({"success": true, "output": "cba"}));
    }

    #[test]
    fn test_schema_uses_type_key() {
        let schema = PluginSchema::text_transform();
        assert_eq!(
            serde_json::to_value(&schema).unwrap(),
            json!({
                "inputs": [{"name": "text", "type": "string", "label": "Input Text"}],
                "outputs": [{"name": "output", "type": "string"}]
            })
        );
    }

    #[test]
    fn test_default_identity() {
        let plugin = Echo;
        assert_eq!(plugin.description(), DEFAULT_DESCRIPTION);
        assert_eq!(plugin.category(), DEFAULT_CATEGORY);
        assert_eq!(
            plugin.info(),
            PluginInfo {
                name: "echo".to_string(),
                description: DEFAULT_DESCRIPTION.to_string(),
                category: DEFAULT_CATEGORY.to_string(),
            }
        );
    }

    #[test]
    fn test_text_arg_defaults_and_rejects() {
        assert_eq!(text_arg(&input(json!({})), "text").unwrap(), "");
        assert_eq!(text_arg(&input(json!({"text": null})), "text").unwrap(), "");
        assert_eq!(text_arg(&input(json!({"text": "hi"})), "text").unwrap(), "hi");

        let err = text_arg(&input(json!({"text": 5})), "text").unwrap_err();
        assert!(err.to_string().contains("must be a string, got number"));
    }

    #[test]
    fn test_descriptor_instantiates() {
        let descriptor = PluginDescriptor::new("echo", || Ok(Box::new(Echo) as Box<dyn ToolPlugin>));
        assert_eq!(descriptor.name(), "echo");
        assert_eq!(descriptor.origin(), &PluginOrigin::Registered);

        let plugin = descriptor.instantiate().unwrap();
        let result = plugin.execute(&input(json!({"text": "hi"}))).unwrap();
        assert_eq!(result.output_text(), Some("hi"));
    }

    #[test]
    fn test_descriptor_origin_display() {
        let descriptor = PluginDescriptor::new("echo", || Ok(Box::new(Echo) as Box<dyn ToolPlugin>))
            .with_origin(PluginOrigin::File(PathBuf::from("plugins/echo.json")));
        assert_eq!(descriptor.origin().to_string(), "plugins/echo.json");
        assert!(format!("{:?}", descriptor).contains("echo"));
    }
}
