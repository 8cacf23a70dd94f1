//! Placeholder substitution from earlier probe output.
//!
//! A command probe that passes registers its trimmed output under its name.
//! Later probes reference it as `{{ .name }}`, `{{ name }}` or
//! `{{ index . "name" }}`.

use crate::error::{FaultlineError, Result};
use regex::{Captures, Regex};
use std::collections::HashMap;
use std::sync::OnceLock;

fn placeholder() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r#"\{\{\s*(?:index\s+\.\s+"([^"]+)"|\.?([A-Za-z0-9_.\-]+))\s*\}\}"#)
            .expect("valid placeholder pattern")
    })
}

/// True if `text` contains at least one placeholder.
pub fn is_templated(text: &str) -> bool {
    placeholder().is_match(text)
}

/// Replace every placeholder in `text` with its registered artifact.
pub fn render(text: &str, artifacts: &HashMap<String, String>) -> Result<String> {
    if !is_templated(text) {
        return Ok(text.to_string());
    }

    let mut missing = None;
    let rendered = placeholder().replace_all(text, |caps: &Captures<'_>| {
        let key = caps
            .get(1)
            .or_else(|| caps.get(2))
            .map(|m| m.as_str())
            .unwrap_or_default();
        match artifacts.get(key) {
            Some(value) => value.clone(),
            None => {
                missing.get_or_insert_with(|| key.to_string());
                String::new()
            }
        }
    });

    if let Some(key) = missing {
        return Err(FaultlineError::Execution(format!(
            "failed to parse the templated command, no output registered for probe '{}'",
            key
        )));
    }
    Ok(rendered.into_owned())
}
