//! Secret references in configuration values.
//!
//! - `env::VAR` reads `$VAR`
//! - `pass::entry` runs `pass show entry` and keeps the first line
//! - anything else is taken literally

use std::process::Command;

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SecretError {
    #[error("environment variable `{0}` is not set")]
    MissingEnv(String),

    #[error("failed to run `pass show {entry}`: {reason}")]
    Spawn { entry: String, reason: String },

    #[error("`pass show {entry}` failed ({status}): {stderr}")]
    PassFailed {
        entry: String,
        status: String,
        stderr: String,
    },

    #[error("`pass show {0}` printed nothing")]
    Empty(String),
}

/// Expands a possibly prefixed value into the secret it names.
pub fn resolve(value: &str) -> Result<String, SecretError> {
    if let Some(var) = value.strip_prefix("env::") {
        std::env::var(var).map_err(|_| SecretError::MissingEnv(var.to_string()))
    } else if let Some(entry) = value.strip_prefix("pass::") {
        from_pass(entry)
    } else {
        Ok(value.to_string())
    }
}

fn from_pass(entry: &str) -> Result<String, SecretError> {
    let output = Command::new("pass")
        .arg("show")
        .arg(entry)
        .output()
        .map_err(|e| SecretError::Spawn {
            entry: entry.to_string(),
            reason: e.to_string(),
        })?;

    if !output.status.success() {
        return Err(SecretError::PassFailed {
            entry: entry.to_string(),
            status: output.status.to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }

    String::from_utf8_lossy(&output.stdout)
        .lines()
        .next()
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .ok_or_else(|| SecretError::Empty(entry.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn literal_values_pass_through() {
        assert_eq!(resolve("client.apps.example").unwrap(), "client.apps.example");
        assert_eq!(resolve("").unwrap(), "");
    }

    #[test]
    fn env_reference_reads_variable() {
        unsafe {
            std::env::set_var("_AICAL_TEST_SECRET", "s3cret");
        }
        assert_eq!(resolve("env::_AICAL_TEST_SECRET").unwrap(), "s3cret");
        unsafe {
            std::env::remove_var("_AICAL_TEST_SECRET");
        }
    }

    #[test]
    fn env_reference_to_unset_variable_fails() {
        assert_eq!(
            resolve("env::_AICAL_SURELY_UNSET_98765"),
            Err(SecretError::MissingEnv("_AICAL_SURELY_UNSET_98765".into()))
        );
    }

    #[test]
    fn pass_reference_to_missing_entry_fails() {
        assert!(resolve("pass::aical/does/not/exist/98765").is_err());
    }
}
