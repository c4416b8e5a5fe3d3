//! Environment variable encoding for remote command lines.
//!
//! Raw `KEY=VALUE` entries are validated, single-quote escaped, sorted by key
//! and flattened into one prefix string that is interpolated in front of
//! `salt-call`.

use std::collections::BTreeMap;

use crate::error::SaltError;

const KEY_PLACEHOLDER: &str = "{key}";
const VALUE_PLACEHOLDER: &str = "{value}";

/// Sequence that closes a single-quoted token, emits a double-quoted `'`,
/// and reopens the quote.
const ESCAPED_QUOTE: &str = r#"'"'"'"#;

/// Splits a raw `KEY=VALUE` entry on the first `=`.
///
/// The value may be empty and may itself contain `=`. A missing separator or
/// an empty key is rejected.
pub fn parse_env_var(raw: &str) -> Result<(&str, &str), SaltError> {
    match raw.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key, value)),
        _ => Err(SaltError::Validation(format!(
            "environment variable not in format 'key=value': {}",
            raw
        ))),
    }
}

/// Escapes a value for inclusion inside a single-quoted shell token.
pub fn escape_value(value: &str) -> String {
    value.replace('\'', ESCAPED_QUOTE)
}

/// Format applied to every `(key, value)` pair.
///
/// The template must contain both `{key}` and `{value}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvVarFormat(String);

impl EnvVarFormat {
    /// Validates and wraps a format template.
    pub fn parse(template: &str) -> Result<Self, SaltError> {
        for placeholder in [KEY_PLACEHOLDER, VALUE_PLACEHOLDER] {
            if !template.contains(placeholder) {
                return Err(SaltError::Validation(format!(
                    "env_var_format '{}' must contain the {} placeholder",
                    template, placeholder
                )));
            }
        }
        Ok(Self(template.to_string()))
    }

    /// Renders one pair. The value must already be escaped.
    pub fn render(&self, key: &str, escaped_value: &str) -> String {
        // Substitute the value last so a `{key}` inside a value is left alone.
        self.0
            .replace(KEY_PLACEHOLDER, key)
            .replace(VALUE_PLACEHOLDER, escaped_value)
    }
}

impl Default for EnvVarFormat {
    fn default() -> Self {
        Self("{key}='{value}' ".to_string())
    }
}

/// Result of [`encode`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EncodedEnv {
    /// Unique keys in lexicographic order.
    pub keys: Vec<String>,
    /// Concatenation of every rendered pair, in key order.
    pub encoded: String,
}

/// Encodes raw `KEY=VALUE` entries into a deterministic command prefix.
///
/// A later entry for the same key replaces an earlier one.
pub fn encode(raw_vars: &[String], format: &EnvVarFormat) -> Result<EncodedEnv, SaltError> {
    let mut vars = BTreeMap::new();
    for raw in raw_vars {
        let (key, value) = parse_env_var(raw)?;
        vars.insert(key, escape_value(value));
    }

    let encoded = vars
        .iter()
        .map(|(key, value)| format.render(key, value))
        .collect::<String>();
    let keys = vars.into_keys().map(str::to_string).collect();

    Ok(EncodedEnv { keys, encoded })
}
