//! Query string value templates.
//!
//! A value such as `"{{ now }}"` or `"v{{now}}"` is rendered on every request,
//! which lets callers add a changing parameter that defeats caches in front of
//! the checked site. `now` is the only function: the current Unix time in
//! nanoseconds.

use crate::error::RedirectCheckError;
use lazy_static::lazy_static;
use regex::Regex;
use std::time::{SystemTime, UNIX_EPOCH};

lazy_static! {
    /// `{{ name }}` placeholder, with optional inner spaces
    static ref PLACEHOLDER: Regex =
        Regex::new(r"\{\{\s*([A-Za-z_][A-Za-z0-9_]*)\s*\}\}").unwrap();
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Now,
}

/// A parsed query value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryTemplate {
    segments: Vec<Segment>,
}

impl QueryTemplate {
    /// Parse a template, rejecting unknown functions and unbalanced braces.
    pub fn parse(source: &str) -> Result<Self, RedirectCheckError> {
        let mut segments = Vec::new();
        let mut last = 0;

        for caps in PLACEHOLDER.captures_iter(source) {
            let Some(whole) = caps.get(0) else {
                continue;
            };
            push_literal(&mut segments, &source[last..whole.start()])?;

            match &caps[1] {
                "now" => segments.push(Segment::Now),
                other => {
                    return Err(RedirectCheckError::config(format!(
                        "Unknown function '{}' in query template '{}'",
                        other, source
                    )))
                }
            }
            last = whole.end();
        }
        push_literal(&mut segments, &source[last..])?;

        Ok(Self { segments })
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Now => {
                    let nanos = SystemTime::now()
                        .duration_since(UNIX_EPOCH)
                        .map(|d| d.as_nanos())
                        .unwrap_or_default();
                    out.push_str(&nanos.to_string());
                }
            }
        }
        out
    }
}

fn push_literal(segments: &mut Vec<Segment>, text: &str) -> Result<(), RedirectCheckError> {
    if text.contains("{{") || text.contains("}}") {
        return Err(RedirectCheckError::config(format!(
            "Malformed placeholder in query template near '{}'",
            text
        )));
    }
    if !text.is_empty() {
        segments.push(Segment::Literal(text.to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_value_is_static() {
        let t = QueryTemplate::parse("world").unwrap();
        assert_eq!(t.segments, vec![Segment::Literal("world".to_string())]);
        assert_eq!(t.render(), "world");
    }

    #[test]
    fn test_now_renders_timestamp() {
        let t = QueryTemplate::parse("{{ now }}").unwrap();
        assert_eq!(t.segments, vec![Segment::Now]);
        let value = t.render();
        assert!(!value.is_empty());
        assert!(value.parse::<u128>().unwrap() > 0);
    }

    #[test]
    fn test_now_with_literals() {
        let t = QueryTemplate::parse("v{{now}}-x").unwrap();
        let value = t.render();
        assert!(value.starts_with('v'));
        assert!(value.ends_with("-x"));
    }

    #[test]
    fn test_rejects_unknown_function() {
        assert!(QueryTemplate::parse("{{ today }}").is_err());
    }

    #[test]
    fn test_rejects_unclosed_placeholder() {
        assert!(QueryTemplate::parse("{{ now").is_err());
        assert!(QueryTemplate::parse("now }}").is_err());
    }
}
