//! Accessibility-tree denoiser.
//!
//! The portal's formatted dump mixes human-readable labels with resource
//! IDs, developer identifiers, and layout bounds. Inference prompts only
//! need the readable part, so this pass keeps header lines and text-bearing
//! elements, strips the rest, and caps the output.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;

/// Quoted strings matching these prefixes are resource IDs / class names.
static NOISE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(com\.|android\.|androidx\.|org\.)").unwrap());

/// Internal developer identifiers: camelCase, PascalCase compounds,
/// snake_case, and colon-separated PascalCase labels.
static INTERNAL_ID: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-z]+[A-Z]|^[A-Z][a-z]+[A-Z]|^[a-z]+_[a-z]|^[A-Z]\w+:[A-Z]").unwrap()
});

/// Leading element prefix, e.g. `24. Button: `.
static ELEMENT_PREFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d+\.\s*\w+:\s*)").unwrap());

/// Trailing bounds suffix, e.g. ` - (389,1990,1017,2053)`.
static BOUNDS_SUFFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s*-\s*\(\d+,\d+,\d+,\d+\)\s*$").unwrap());

static QUOTED: LazyLock<Regex> = LazyLock::new(|| Regex::new(r#""([^"]*)""#).unwrap());

/// Action buttons that carry no semantic value.
const GENERIC_ACTIONS: &[&str] = &["more options", "more actions", "action menu"];

/// Compress a formatted accessibility dump to header lines plus
/// text-bearing elements, at most `max_lines` lines.
pub fn denoise_formatted_text(formatted_text: &str, max_lines: usize) -> String {
    if formatted_text.is_empty() {
        return String::new();
    }

    let mut compressed: Vec<String> = Vec::new();
    let mut seen_text: HashSet<Vec<String>> = HashSet::new();

    for line in formatted_text.trim().lines() {
        // phone state header lines (app name, keyboard, focused element)
        if line.starts_with("**") || line.starts_with('•') {
            compressed.push(line.to_string());
            continue;
        }

        // schema description line
        if line.starts_with("Current Clickable UI elements") {
            continue;
        }

        let quoted: Vec<String> = QUOTED
            .captures_iter(line)
            .map(|c| c[1].to_string())
            .collect();
        if quoted.is_empty() {
            continue;
        }

        let readable: Vec<String> = quoted
            .into_iter()
            .filter(|q| !q.is_empty() && !NOISE.is_match(q) && !INTERNAL_ID.is_match(q))
            .collect();
        if readable.is_empty() {
            continue;
        }

        if readable.len() == 1 && GENERIC_ACTIONS.contains(&readable[0].to_lowercase().as_str()) {
            continue;
        }

        if !seen_text.insert(readable.clone()) {
            continue;
        }

        let cleaned = match ELEMENT_PREFIX.captures(line) {
            Some(caps) => {
                let readable_str = readable
                    .iter()
                    .map(|r| format!("\"{r}\""))
                    .collect::<Vec<_>>()
                    .join(", ");
                format!("{}{readable_str}", &caps[1])
            }
            None => line.to_string(),
        };

        let cleaned = BOUNDS_SUFFIX.replace(&cleaned, "").trim().to_string();
        if !cleaned.is_empty() {
            compressed.push(cleaned);
        }
    }

    compressed.truncate(max_lines);
    compressed.join("\n")
}
