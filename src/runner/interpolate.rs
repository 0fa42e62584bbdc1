//! Loop item substitution
//!
//! Replaces the `{{ item }}` placeholder in action parameters with the
//! current loop value. No other template syntax is evaluated.

use regex::Regex;
use std::sync::OnceLock;

fn item_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\{\{\s*item\s*\}\}").expect("static regex"))
}

/// Substitute every `{{ item }}` placeholder in `s` with `item`
pub fn substitute_item(s: &str, item: &str) -> String {
    item_pattern().replace_all(s, regex::NoExpand(item)).into_owned()
}

/// Check whether a string contains the loop placeholder
pub fn has_item_placeholder(s: &str) -> bool {
    item_pattern().is_match(s)
}
