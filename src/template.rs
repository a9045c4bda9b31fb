//! Placeholder substitution for title and description templates.
//!
//! Templates use `$name` or `${name}` placeholders. The placeholder set is
//! fixed (stream name, title, uploader name, date parts, first file path);
//! a template referencing anything else is a configuration mistake and is
//! rejected rather than silently passed through.

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::{Captures, Regex};

use crate::{Error, Result};

static PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$(?:\{(\w+)\}|(\w+))").expect("valid placeholder regex"));

/// Substitute `$name` / `${name}` placeholders from `vars`.
///
/// Returns [`Error::Template`] if the template references a placeholder not
/// present in `vars`.
pub fn substitute(template: &str, vars: &HashMap<&str, String>) -> Result<String> {
    let mut missing: Option<String> = None;
    let result = PLACEHOLDER.replace_all(template, |caps: &Captures<'_>| {
        let key = caps
            .get(1)
            .or_else(|| caps.get(2))
            .map(|m| m.as_str())
            .unwrap_or_default();
        match vars.get(key) {
            Some(value) => value.clone(),
            None => {
                if missing.is_none() {
                    missing = Some(key.to_string());
                }
                String::new()
            }
        }
    });
    match missing {
        Some(key) => Err(Error::template(format!("unknown placeholder ${{{key}}}"))),
        None => Ok(result.into_owned()),
    }
}
