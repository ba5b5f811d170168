//! Message template rendering
//!
//! Pure variable substitution for campaign subjects and bodies. Variables use
//! `{{variable_name}}` syntax and come from the recipient's substitution map.
//! Unresolved placeholders render as empty strings so template syntax never
//! leaks into a delivered message, and values substituted into HTML bodies
//! are escaped because batch columns are recipient-controlled input.

use lazy_static::lazy_static;
use regex::{Captures, Regex};
use std::collections::HashMap;

lazy_static! {
    static ref PLACEHOLDER: Regex =
        Regex::new(r"\{\{\s*([A-Za-z0-9_.\-]+)\s*\}\}").expect("placeholder regex");
}

/// Render an HTML body template; substituted values are HTML-escaped.
pub fn render_html(template: &str, substitutions: &HashMap<String, String>) -> String {
    render_with(template, substitutions, true)
}

/// Render a subject line; values are inserted verbatim (header context).
pub fn render_subject(template: &str, substitutions: &HashMap<String, String>) -> String {
    render_with(template, substitutions, false)
}

fn render_with(template: &str, substitutions: &HashMap<String, String>, escape: bool) -> String {
    PLACEHOLDER
        .replace_all(template, |caps: &Captures| {
            match substitutions.get(&caps[1]) {
                Some(value) if escape => html_escape(value),
                Some(value) => value.clone(),
                None => String::new(),
            }
        })
        .into_owned()
}

fn html_escape(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}
