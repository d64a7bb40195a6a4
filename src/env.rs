//! Environment variable substitution for configuration files
//!
//! Credentials usually live in the DSN, so the config file refers to them
//! as `${VAR}` instead of embedding them. `${VAR:-fallback}` supplies a
//! value for unset variables.

use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use std::env;

use crate::config::ConfigError;

/// `${NAME}` or `${NAME:-fallback}`
static ENV_VAR_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)(?::-([^}]*))?\}").expect("valid env var pattern")
});

/// Replace every variable reference in `input`.
///
/// Unset variables without a fallback are collected and reported together.
pub fn substitute_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut missing: Vec<String> = Vec::new();

    let output = ENV_VAR_PATTERN.replace_all(input, |caps: &Captures| {
        let name = &caps[1];
        match (env::var(name), caps.get(2)) {
            (Ok(value), _) => value,
            (Err(_), Some(fallback)) => fallback.as_str().to_string(),
            (Err(_), None) => {
                if !missing.iter().any(|m| m == name) {
                    missing.push(name.to_string());
                }
                String::new()
            }
        }
    });

    if !missing.is_empty() {
        return Err(ConfigError::ValidationError(format!(
            "Missing environment variables: {}",
            missing.join(", ")
        )));
    }

    Ok(output.into_owned())
}
