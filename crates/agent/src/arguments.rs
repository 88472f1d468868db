//! Turning a free-text thought into JSON tool arguments.

use moonagent_core::ToolInfo;
use serde_json::Value;

/// Derives the JSON arguments for `tool` from the thought that selected it.
pub trait ArgumentExtractor: Send + Sync {
    /// Always returns a JSON object encoded as a string.
    fn extract(&self, thought: &str, tool: &ToolInfo) -> String;
}

/// The default extractor.
///
/// 1. The first balanced `{...}` in the thought that parses as a JSON object.
/// 2. If the tool takes exactly one string parameter, the first quoted
///    string in the thought.
/// 3. Otherwise `{}`.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonArgumentExtractor;

impl ArgumentExtractor for JsonArgumentExtractor {
    fn extract(&self, thought: &str, tool: &ToolInfo) -> String {
        if let Some(object) = first_json_object(thought) {
            return object.to_string();
        }
        if let (Some(param), Some(text)) = (lone_string_parameter(tool), first_quoted(thought)) {
            let mut args = serde_json::Map::new();
            args.insert(param, Value::String(text));
            return Value::Object(args).to_string();
        }
        "{}".to_string()
    }
}

fn first_json_object(text: &str) -> Option<Value> {
    let mut from = 0;
    while let Some(offset) = text[from..].find('{') {
        let start = from + offset;
        if let Some(len) = balanced_len(&text[start..]) {
            if let Ok(value @ Value::Object(_)) = serde_json::from_str(&text[start..start + len]) {
                return Some(value);
            }
        }
        from = start + 1;
    }
    None
}

/// Byte length of the brace-balanced prefix of `s`, which starts with `{`.
/// Braces inside JSON strings are ignored.
fn balanced_len(s: &str) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (i, c) in s.char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return Some(i + 1);
                }
            }
            _ => {}
        }
    }
    None
}

fn lone_string_parameter(tool: &ToolInfo) -> Option<String> {
    let properties = tool.parameters.get("properties")?.as_object()?;
    let mut strings = properties
        .iter()
        .filter(|(_, schema)| schema.get("type").and_then(Value::as_str) == Some("string"));
    let (name, _) = strings.next()?;
    if strings.next().is_some() || properties.len() != 1 {
        return None;
    }
    Some(name.clone())
}

const QUOTES: &[(char, char)] = &[('"', '"'), ('“', '”'), ('「', '」')];

fn first_quoted(text: &str) -> Option<String> {
    QUOTES
        .iter()
        .filter_map(|&(open, close)| {
            let start = text.find(open)? + open.len_utf8();
            let end = text[start..].find(close)?;
            Some((start, &text[start..start + end]))
        })
        .filter(|(_, inner)| !inner.trim().is_empty())
        .min_by_key(|(start, _)| *start)
        .map(|(_, inner)| inner.to_string())
}
