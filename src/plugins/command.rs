//! Command plugins declared by JSON manifests.
//!
//! A command plugin wraps a shell command template. Placeholders of the form
//! `{{key}}` are replaced by the shell-quoted value of `input[key]`, the
//! command runs through the platform shell and its stdout becomes the
//! `output` field of the result.

use std::collections::HashMap;
use std::process::Command;
use std::sync::OnceLock;

use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::error::{PluginError, Result};

use super::types::{
    PluginInput, PluginResult, PluginSchema, SchemaInput, SchemaOutput, ToolPlugin,
    DEFAULT_CATEGORY, DEFAULT_DESCRIPTION,
};

/// One plugin declared in a manifest file.
///
/// ```json
/// {
///   "name": "shout",
///   "description": "Echo text back",
///   "category": "Text",
///   "command": "echo {{text}}",
///   "inputs": [{ "name": "text", "type": "string", "label": "Input Text" }],
///   "outputs": [{ "name": "output", "type": "string" }]
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandPluginDef {
    /// Plugin name. Alphanumeric, `-` and `_`, 1-64 characters.
    pub name: String,

    #[serde(default = "default_description")]
    pub description: String,

    #[serde(default = "default_category")]
    pub category: String,

    /// Shell command template with `{{key}}` placeholders.
    /// Must not contain shell chaining operators (&&, ||, ;, |, backticks).
    pub command: String,

    /// Optional working directory for command execution.
    #[serde(default)]
    pub working_dir: Option<String>,

    /// Extra environment variables for the command.
    #[serde(default)]
    pub env: HashMap<String, String>,

    #[serde(default)]
    pub inputs: Vec<SchemaInput>,

    #[serde(default)]
    pub outputs: Vec<SchemaOutput>,
}

fn default_description() -> String {
    DEFAULT_DESCRIPTION.to_string()
}

fn default_category() -> String {
    DEFAULT_CATEGORY.to_string()
}

/// A live command plugin.
#[derive(Debug, Clone)]
pub struct CommandPlugin {
    def: CommandPluginDef,
}

impl CommandPlugin {
    pub fn new(def: CommandPluginDef) -> Self {
        Self { def }
    }

    pub fn definition(&self) -> &CommandPluginDef {
        &self.def
    }

    /// The command line `execute` would run for `input`.
    pub fn render(&self, input: &PluginInput) -> String {
        placeholder_re()
            .replace_all(&self.def.command, |caps: &Captures<'_>| {
                shell_quote(&value_as_text(input.get(&caps[1])))
            })
            .into_owned()
    }
}

impl ToolPlugin for CommandPlugin {
    fn name(&self) -> &str {
        &self.def.name
    }

    fn description(&self) -> &str {
        &self.def.description
    }

    fn category(&self) -> &str {
        &self.def.category
    }

    fn execute(&self, input: &PluginInput) -> Result<PluginResult> {
        let rendered = self.render(input);
        debug!(plugin = %self.def.name, command = %rendered, "Running command plugin");

        let mut command = shell_command(&rendered);
        if let Some(dir) = &self.def.working_dir {
            command.current_dir(dir);
        }
        command.envs(&self.def.env);

        let output = command.output().map_err(|e| {
            PluginError::Execution(format!("failed to spawn '{}': {}", self.def.name, e))
        })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(PluginError::Execution(format!(
                "'{}' exited with {}: {}",
                self.def.name,
                output.status,
                stderr.trim()
            )));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        Ok(PluginResult::output(stdout.trim_end_matches(['\n', '\r'])))
    }

    fn schema(&self) -> Result<PluginSchema> {
        Ok(PluginSchema {
            inputs: self.def.inputs.clone(),
            outputs: self.def.outputs.clone(),
        })
    }
}

fn placeholder_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\{\{\s*([A-Za-z0-9_]+)\s*\}\}").expect("placeholder pattern is valid")
    })
}

fn value_as_text(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

#[cfg(not(windows))]
fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}

#[cfg(windows)]
fn shell_quote(value: &str) -> String {
    format!("\"{}\"", value.replace('"', "\"\""))
}

#[cfg(not(windows))]
fn shell_command(line: &str) -> Command {
    let mut command = Command::new("sh");
    command.arg("-c").arg(line);
    command
}

#[cfg(windows)]
fn shell_command(line: &str) -> Command {
    let mut command = Command::new("cmd");
    command.arg("/C").arg(line);
    command
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn def(command: &str) -> CommandPluginDef {
        serde_json::from_value(json!({ "name": "cmd", "command": command })).unwrap()
    }

    fn input(value: Value) -> PluginInput {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_def_defaults() {
        let def = def("echo hi");
        assert_eq!(def.description, DEFAULT_DESCRIPTION);
        assert_eq!(def.category, DEFAULT_CATEGORY);
        assert!(def.inputs.is_empty());
        assert!(def.env.is_empty());
    }

    #[cfg(not(windows))]
    #[test]
    fn test_render_quotes_values() {
        let plugin = CommandPlugin::new(def("echo {{text}} {{ missing }} {{n}}"));
        let rendered = plugin.render(&input(json!({"text": "it's here", "n": 3})));
        assert_eq!(rendered, r"echo 'it'\''s here' '' '3'");
    }

    #[cfg(not(windows))]
    #[test]
    fn test_execute_echo() {
        let plugin = CommandPlugin::new(def("echo {{text}}"));
        let result = plugin.execute(&input(json!({"text": "hello world"}))).unwrap();
        assert!(result.success);
        assert_eq!(result.output_text(), Some("hello world"));
    }

    #[cfg(not(windows))]
    #[test]
    fn test_execute_does_not_expand_input() {
        let plugin = CommandPlugin::new(def("echo {{text}}"));
        let result = plugin.execute(&input(json!({"text": "$HOME"}))).unwrap();
        assert_eq!(result.output_text(), Some("$HOME"));
    }

    #[cfg(not(windows))]
    #[test]
    fn test_execute_nonzero_exit_is_error() {
        let plugin = CommandPlugin::new(def("exit 3"));
        let err = plugin.execute(&PluginInput::new()).unwrap_err();
        assert!(matches!(err, PluginError::Execution(_)));
        assert!(err.to_string().contains("'cmd' exited"));
    }

    #[cfg(not(windows))]
    #[test]
    fn test_execute_uses_env() {
        let mut def = def("printenv DEVTERM_GREETING");
        def.env
            .insert("DEVTERM_GREETING".to_string(), "hi there".to_string());
        let result = CommandPlugin::new(def).execute(&PluginInput::new()).unwrap();
        assert_eq!(result.output_text(), Some("hi there"));
    }

    #[test]
    fn test_schema_from_manifest() {
        let def: CommandPluginDef = serde_json::from_value(json!({
            "name": "shout",
            "command": "echo {{text}}",
            "inputs": [{"name": "text", "type": "string", "label": "Input Text"}],
            "outputs": [{"name": "output", "type": "string"}]
        }))
        .unwrap();
        let schema = CommandPlugin::new(def).schema().unwrap();
        assert_eq!(schema, PluginSchema::text_transform());
    }
}
