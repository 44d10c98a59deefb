//! Parsing helpers for model-produced JSON text.

use serde_json::Value;

/// Strips markdown code fences and surrounding prose from model output.
pub fn extract_json(content: &str) -> &str {
    if let Some(start) = content.find("```json") {
        let after_marker = &content[start + 7..];
        if let Some(end) = after_marker.find("```") {
            return after_marker[..end].trim();
        }
    }

    if let Some(start) = content.find("```") {
        let after_marker = &content[start + 3..];
        let content_start = after_marker.find('\n').map(|i| i + 1).unwrap_or(0);
        let after_newline = &after_marker[content_start..];
        if let Some(end) = after_newline.find("```") {
            return after_newline[..end].trim();
        }
    }

    let trimmed = content.trim();
    let start = trimmed.find(['{', '[']).unwrap_or(0);
    let end = trimmed
        .rfind(['}', ']'])
        .map(|i| i + 1)
        .unwrap_or(trimmed.len());

    if start < end {
        &trimmed[start..end]
    } else {
        trimmed
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Container {
    Object,
    Array,
}

fn closers(stack: &[Container]) -> String {
    stack
        .iter()
        .rev()
        .map(|c| match c {
            Container::Object => '}',
            Container::Array => ']',
        })
        .collect()
}

/// Parses the prefix of a JSON document that is still being streamed.
///
/// Open containers are closed, a string value cut mid-way is terminated, and
/// anything that cannot stand on its own yet (a key without a value, a
/// literal or number without its delimiter) is dropped. Returns `None` when
/// not even an opening bracket has arrived.
pub fn parse_partial(text: &str) -> Option<Value> {
    let start = text.find(['{', '['])?;
    let text = &text[start..];

    let mut stack: Vec<Container> = Vec::new();
    // (cut index, closers) of the latest position where the prefix is a
    // well-formed document once closed.
    let mut last_good: Option<(usize, String)> = None;

    let mut in_string = false;
    let mut string_is_key = false;
    let mut escaped = false;
    let mut in_primitive = false;
    let mut expecting_key = false;

    for (i, c) in text.char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
                if !string_is_key {
                    last_good = Some((i + 1, closers(&stack)));
                }
            }
            continue;
        }

        if in_primitive {
            if matches!(c, ',' | '}' | ']') || c.is_whitespace() {
                in_primitive = false;
                last_good = Some((i, closers(&stack)));
            } else {
                continue;
            }
        }

        match c {
            '{' => {
                stack.push(Container::Object);
                expecting_key = true;
                last_good = Some((i + 1, closers(&stack)));
            }
            '[' => {
                stack.push(Container::Array);
                expecting_key = false;
                last_good = Some((i + 1, closers(&stack)));
            }
            '}' | ']' => {
                stack.pop();
                expecting_key = false;
                last_good = Some((i + 1, closers(&stack)));
                if stack.is_empty() {
                    break;
                }
            }
            '"' => {
                in_string = true;
                string_is_key = expecting_key && stack.last() == Some(&Container::Object);
            }
            ':' => expecting_key = false,
            ',' => expecting_key = stack.last() == Some(&Container::Object),
            c if c.is_whitespace() => {}
            _ => in_primitive = true,
        }
    }

    if in_string && !string_is_key {
        let body = trim_dangling_escape(text);
        let candidate = format!("{body}\"{}", closers(&stack));
        if let Ok(value) = serde_json::from_str(&candidate) {
            return Some(value);
        }
    }

    let (cut, closing) = last_good?;
    serde_json::from_str(&format!("{}{}", &text[..cut], closing)).ok()
}

/// Removes an escape sequence cut off at the end of an open string.
fn trim_dangling_escape(text: &str) -> &str {
    let Some(pos) = text.rfind('\\') else {
        return text;
    };
    let preceding = text[..pos].chars().rev().take_while(|c| *c == '\\').count();
    if preceding % 2 == 1 {
        // the backslash is itself escaped
        return text;
    }
    let tail = &text[pos + 1..];
    let complete = match tail.chars().next() {
        None => false,
        Some('u') => tail.len() >= 5,
        Some(_) => true,
    };
    if complete {
        text
    } else {
        &text[..pos]
    }
}
