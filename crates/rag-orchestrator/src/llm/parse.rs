//! Lenient parsing of JSON embedded in LLM output.
//!
//! Handles the usual quirks: markdown fences, leading/trailing prose and
//! truncated objects where only some fields survived.

/// Strip markdown code fences and surrounding whitespace.
pub fn strip_code_fences(raw: &str) -> &str {
    let trimmed = raw.trim();
    let without_open = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```sql"))
        .or_else(|| trimmed.strip_prefix("```"))
        .unwrap_or(trimmed);
    without_open
        .strip_suffix("```")
        .unwrap_or(without_open)
        .trim()
}

/// The outermost `{...}` span, or the cleaned input if there is none.
pub fn json_object_span(raw: &str) -> &str {
    let cleaned = strip_code_fences(raw);
    match (cleaned.find('{'), cleaned.rfind('}')) {
        (Some(start), Some(end)) if end > start => &cleaned[start..=end],
        _ => cleaned,
    }
}

/// Extract a JSON string field value by scanning for `"field":"value"`.
pub fn extract_json_string(json: &str, field: &str) -> Option<String> {
    let pattern = format!("\"{}\"", field);
    let pos = json.find(&pattern)?;
    let after_key = &json[pos + pattern.len()..];
    let after_colon = after_key.trim_start().strip_prefix(':')?;
    let trimmed = after_colon.trim_start();

    let content = trimmed.strip_prefix('"')?;

    // Find the closing quote, handling escaped quotes
    let mut escaped = false;
    for (i, ch) in content.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        if ch == '\\' {
            escaped = true;
            continue;
        }
        if ch == '"' {
            return if i > 0 {
                Some(content[..i].replace("\\\"", "\"").replace("\\n", "\n"))
            } else {
                None
            };
        }
    }
    None
}

/// Extract a JSON number field by scanning for `"field": 0.8`.
pub fn extract_json_number(json: &str, field: &str) -> Option<f64> {
    let pattern = format!("\"{}\"", field);
    let pos = json.find(&pattern)?;
    let after_key = &json[pos + pattern.len()..];
    let after_colon = after_key.trim_start().strip_prefix(':')?.trim_start();
    let end = after_colon
        .find(|c: char| !(c.is_ascii_digit() || c == '.' || c == '-' || c == 'e' || c == 'E'))
        .unwrap_or(after_colon.len());
    after_colon[..end].parse().ok()
}

/// Extract a JSON string array field `"field": [...]`.
///
/// The bracketed span is parsed with serde first. Truncated or mixed arrays
/// fall back to the complete string literals found in the span. Blank items
/// are dropped either way.
pub fn extract_json_array(json: &str, field: &str) -> Option<Vec<String>> {
    let pattern = format!("\"{}\"", field);
    let pos = json.find(&pattern)?;
    let after_key = &json[pos + pattern.len()..];
    let after_colon = after_key.trim_start().strip_prefix(':')?.trim_start();
    let body = after_colon.strip_prefix('[')?;

    let span = match closing_bracket(body) {
        Some(end) => &after_colon[..end + 2],
        None => after_colon,
    };

    let items = match serde_json::from_str::<Vec<String>>(span) {
        Ok(items) => items,
        Err(_) => string_literals(span),
    };
    Some(
        items
            .into_iter()
            .map(|item| item.trim().to_string())
            .filter(|item| !item.is_empty())
            .collect(),
    )
}

/// Byte offset of the `]` closing an array body, ignoring brackets inside
/// string literals.
fn closing_bracket(body: &str) -> Option<usize> {
    let mut in_string = false;
    let mut escaped = false;
    let mut depth = 0usize;
    for (i, ch) in body.char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '[' => depth += 1,
            ']' if depth == 0 => return Some(i),
            ']' => depth -= 1,
            _ => {}
        }
    }
    None
}

/// Every complete `"..."` literal in `span`, unescaped. An unterminated
/// trailing literal is ignored.
fn string_literals(span: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut start: Option<usize> = None;
    let mut escaped = false;
    for (i, ch) in span.char_indices() {
        match start {
            None if ch == '"' => start = Some(i),
            None => {}
            Some(_) if escaped => escaped = false,
            Some(_) if ch == '\\' => escaped = true,
            Some(open) if ch == '"' => {
                if let Ok(text) = serde_json::from_str::<String>(&span[open..=i]) {
                    out.push(text);
                }
                start = None;
            }
            Some(_) => {}
        }
    }
    out
}
