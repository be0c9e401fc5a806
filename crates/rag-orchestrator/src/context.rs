//! Context assembly for answer synthesis.
//!
//! Results are laid out one per line as `[backend score=0.90] content`, in
//! backend-name order and then in the order each backend returned them.
//! Error entries never reach the context.

use std::sync::LazyLock;

use crate::state::{Backend, QueryState, SearchResult};

static CONTEXT_LINE_RE: LazyLock<regex::Regex> = LazyLock::new(|| {
    regex::Regex::new(r"^\[(\w+) score=(-?[0-9]*\.?[0-9]+)\] (.+)$").expect("context line regex is valid")
});

/// Default character budget for assembled context.
pub const DEFAULT_MAX_CONTEXT_CHARS: usize = 12_000;

pub fn format_line(backend: Backend, result: &SearchResult) -> String {
    let content = result.content.split_whitespace().collect::<Vec<_>>().join(" ");
    let mut line = format!("[{} score={:.2}] {}", backend, result.score, content);
    if let Some(urls) = result.url.as_ref().filter(|u| !u.is_empty()) {
        line.push_str(&format!(" (source: {})", urls.join(", ")));
    }
    line
}

/// Merge every usable result in `state` into one context block of at most
/// `max_chars` characters. Whole lines are kept; the first line is cut when
/// it alone exceeds the budget.
pub fn render_context(state: &QueryState, max_chars: usize) -> String {
    let mut out = String::new();
    let mut used = 0usize;

    for (backend, result) in state.results() {
        if result.content.trim().is_empty() {
            continue;
        }
        let line = format_line(backend, result);
        let len = line.chars().count();
        let sep = if out.is_empty() { 0 } else { 1 };

        if used + sep + len > max_chars {
            if out.is_empty() {
                out = line.chars().take(max_chars).collect();
            }
            break;
        }

        if sep == 1 {
            out.push('\n');
        }
        out.push_str(&line);
        used += sep + len;
    }

    out
}

/// A context line split back into its parts.
#[derive(Debug, Clone, PartialEq)]
pub struct ContextLine<'a> {
    pub backend: &'a str,
    pub score: f32,
    pub content: &'a str,
}

pub fn parse_line(line: &str) -> Option<ContextLine<'_>> {
    let caps = CONTEXT_LINE_RE.captures(line.trim())?;
    Some(ContextLine {
        backend: caps.get(1)?.as_str(),
        score: caps.get(2)?.as_str().parse().ok()?,
        content: caps.get(3)?.as_str(),
    })
}
