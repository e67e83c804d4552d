//! Built-in text plugins.
//!
//! These are registered straight into the manager's live table and never
//! go through discovery.

use crate::error::Result;

use super::types::{text_arg, PluginInput, PluginResult, PluginSchema, ToolPlugin};

/// Convert text to uppercase.
#[derive(Debug, Default, Clone, Copy)]
pub struct UppercasePlugin;

impl ToolPlugin for UppercasePlugin {
    fn name(&self) -> &str {
        "uppercase"
    }

    fn description(&self) -> &str {
        "Convert text to uppercase"
    }

    fn category(&self) -> &str {
        "Text"
    }

    fn execute(&self, input: &PluginInput) -> Result<PluginResult> {
        let text = text_arg(input, "text")?;
        Ok(PluginResult::output(text.to_uppercase()))
    }

    fn schema(&self) -> Result<PluginSchema> {
        Ok(PluginSchema::text_transform())
    }
}

/// Reverse text by character.
#[derive(Debug, Default, Clone, Copy)]
pub struct ReversePlugin;

impl ToolPlugin for ReversePlugin {
    fn name(&self) -> &str {
        "reverse"
    }

    fn description(&self) -> &str {
        "Reverse text"
    }

    fn category(&self) -> &str {
        "Text"
    }

    fn execute(&self, input: &PluginInput) -> Result<PluginResult> {
        let text = text_arg(input, "text")?;
        Ok(PluginResult::output(text.chars().rev().collect::<String>()))
    }

    fn schema(&self) -> Result<PluginSchema> {
        Ok(PluginSchema::text_transform())
    }
}

/// Count words, characters and lines.
#[derive(Debug, Default, Clone, Copy)]
pub struct WordCountPlugin;

impl ToolPlugin for WordCountPlugin {
    fn name(&self) -> &str {
        "wordcount"
    }

    fn description(&self) -> &str {
        "Count words, characters, and lines"
    }

    fn category(&self) -> &str {
        "Text"
    }

    fn execute(&self, input: &PluginInput) -> Result<PluginResult> {
        let text = text_arg(input, "text")?;
        let words = text.split_whitespace().count();
        let chars = text.chars().count();
        let lines = count_lines(text);
        Ok(PluginResult::output(format!(
            "Words: {}\nCharacters: {}\nLines: {}",
            words, chars, lines
        )))
    }

    fn schema(&self) -> Result<PluginSchema> {
        Ok(PluginSchema::text_transform())
    }
}

/// Count lines the way text editors do across platforms.
///
/// Breaks on `\n`, `\r`, `\r\n`, vertical tab, form feed, the ASCII
/// separators `\x1c`..`\x1e`, NEL and the Unicode line and paragraph
/// separators. A trailing break does not open another line.
fn count_lines(text: &str) -> usize {
    let mut lines = 0;
    let mut open = false;
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '\r' => {
                chars.next_if_eq(&'\n');
                lines += 1;
                open = false;
            }
            '\n' | '\x0b' | '\x0c' | '\x1c' | '\x1d' | '\x1e' | '\u{85}' | '\u{2028}'
            | '\u{2029}' => {
                lines += 1;
                open = false;
            }
            _ => open = true,
        }
    }

    if open {
        lines += 1;
    }
    lines
}

/// All built-in plugins, in registration order.
pub fn builtin_plugins() -> Vec<Box<dyn ToolPlugin>> {
    vec![
        Box::new(UppercasePlugin),
        Box::new(ReversePlugin),
        Box::new(WordCountPlugin),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    fn text(value: &str) -> PluginInput {
        json!({ "text": value }).as_object().cloned().unwrap()
    }

    #[test]
    fn test_uppercase() {
        let result = UppercasePlugin.execute(&text("hello world")).unwrap();
        assert_eq!(
            serde_json::to_value(&result).unwrap(),
            json!({"success": true, "output": "HELLO WORLD"})
        );
    }

    #[test]
    fn test_uppercase_missing_text_is_empty() {
        let result = UppercasePlugin.execute(&PluginInput::new()).unwrap();
        assert!(result.success);
        assert_eq!(result.output_text(), Some(""));
    }

    #[test]
    fn test_reverse() {
        let result = ReversePlugin.execute(&text("abc")).unwrap();
        assert_eq!(
            serde_json::to_value(&result).unwrap(),
            json!({"success": true, "output": "cba"})
        );
    }

    #[test]
    fn test_reverse_multibyte() {
        let result = ReversePlugin.execute(&text("héllo")).unwrap();
        assert_eq!(result.output_text(), Some("olléh"));
    }

    #[test]
    fn test_wordcount() {
        let result = WordCountPlugin
            .execute(&text("Hello world from DevTerm"))
            .unwrap();
        let output = result.output_text().unwrap();
        assert!(output.contains("Words: 4"));
        assert!(output.contains("Characters: 24"));
        assert!(output.contains("Lines: 1"));
    }

    #[test]
    fn test_wordcount_multiline() {
        let result = WordCountPlugin.execute(&text("one two\nthree\n")).unwrap();
        assert_eq!(
            result.output_text(),
            Some("Words: 3\nCharacters: 14\nLines: 2")
        );
    }

    #[test]
    fn test_wordcount_empty() {
        let result = WordCountPlugin.execute(&text("")).unwrap();
        assert_eq!(
            result.output_text(),
            Some("Words: 0\nCharacters: 0\nLines: 0")
        );
    }

    #[test]
    fn test_wordcount_carriage_return() {
        let result = WordCountPlugin.execute(&text("a\rb")).unwrap();
        assert_eq!(
            result.output_text(),
            Some("Words: 2\nCharacters: 3\nLines: 2")
        );
    }

    #[test]
    fn test_count_lines_boundaries() {
        assert_eq!(count_lines("a\r\nb\r\n"), 2);
        assert_eq!(count_lines("\n\n"), 2);
        assert_eq!(count_lines("a\u{2028}b\u{2029}c"), 3);
        assert_eq!(count_lines("a\x0bb\x0cc\x1ed\u{85}e"), 5);
        assert_eq!(count_lines("no break"), 1);
        assert_eq!(count_lines(""), 0);
    }

    #[test]
    fn test_non_string_text_fails() {
        let input = json!({"text": ["a"]}).as_object().cloned().unwrap();
        assert!(UppercasePlugin.execute(&input).is_err());
    }

    #[test]
    fn test_builtin_identities() {
        let names: Vec<String> = builtin_plugins()
            .iter()
            .map(|p| p.name().to_string())
            .collect();
        assert_eq!(names, vec!["uppercase", "reverse", "wordcount"]);
        for plugin in builtin_plugins() {
            assert_eq!(plugin.category(), "Text");
            let schema = serde_json::to_value(plugin.schema().unwrap()).unwrap();
            assert_eq!(schema["inputs"][0]["name"], Value::from("text"));
        }
    }
}
