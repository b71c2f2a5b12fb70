//! Environment variable interpolation for job config files.
//!
//! Job arguments (bucket names, prefixes, manifest pointers) are usually
//! injected by the scheduler through the environment. Supported syntax:
//! - `$VAR` or `${VAR}` - substitute with env var value, error if missing
//! - `${VAR:-default}` - use default if VAR is unset OR empty
//! - `${VAR-default}` - use default only if VAR is unset (empty is OK)
//! - `$$` - escape sequence for literal `$`

use regex::{Captures, Regex};
use std::env;
use std::sync::LazyLock;

static ENV_VAR_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?x)
        (?P<escape>\$\$)
        |
        \$\{
            (?P<braced>[A-Za-z_][A-Za-z0-9_]*)
            (?:(?P<op>:?-)(?P<default>[^}]*))?
        \}
        |
        \$(?P<bare>[A-Za-z_][A-Za-z0-9_]*)
        ",
    )
    .expect("Invalid regex pattern")
});

/// Result of environment variable interpolation.
#[derive(Debug)]
pub struct InterpolationResult {
    /// The interpolated text.
    pub text: String,
    /// Any errors encountered during interpolation.
    pub errors: Vec<String>,
}

impl InterpolationResult {
    /// Returns true if there were no errors.
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }
}

/// How a `${VAR...}` reference falls back when the variable is missing.
enum Fallback<'a> {
    /// No default: a missing variable is an error.
    Required,
    /// `${VAR-default}`: used only when unset.
    WhenUnset(&'a str),
    /// `${VAR:-default}`: used when unset or empty.
    WhenUnsetOrEmpty(&'a str),
}

impl<'a> Fallback<'a> {
    fn from_captures(caps: &Captures<'a>) -> Self {
        let default = caps.name("default").map_or("", |m| m.as_str());
        match caps.name("op").map(|m| m.as_str()) {
            Some(":-") => Fallback::WhenUnsetOrEmpty(default),
            Some(_) => Fallback::WhenUnset(default),
            None => Fallback::Required,
        }
    }
}

fn resolve(name: &str, fallback: Fallback<'_>) -> Result<String, String> {
    match (env::var(name), fallback) {
        (Ok(value), _) if value.contains('\n') || value.contains('\r') => Err(format!(
            "environment variable '{name}' contains newlines, which is not allowed"
        )),
        (Ok(value), Fallback::WhenUnsetOrEmpty(default)) if value.is_empty() => {
            Ok(default.to_string())
        }
        (Ok(value), _) => Ok(value),
        (Err(_), Fallback::WhenUnset(default) | Fallback::WhenUnsetOrEmpty(default)) => {
            Ok(default.to_string())
        }
        (Err(_), Fallback::Required) => Err(format!("environment variable '{name}' is not set")),
    }
}

/// Interpolate environment variables in the given text.
///
/// All errors are accumulated so every missing variable is reported at once.
pub fn interpolate(input: &str) -> InterpolationResult {
    let mut errors = Vec::new();

    let text = ENV_VAR_PATTERN
        .replace_all(input, |caps: &Captures| {
            if caps.name("escape").is_some() {
                return "$".to_string();
            }

            let (name, fallback) = match (caps.name("braced"), caps.name("bare")) {
                (Some(name), _) => (name.as_str(), Fallback::from_captures(caps)),
                (None, Some(name)) => (name.as_str(), Fallback::Required),
                (None, None) => return caps[0].to_string(),
            };

            resolve(name, fallback).unwrap_or_else(|message| {
                errors.push(message);
                caps[0].to_string()
            })
        })
        .into_owned();

    InterpolationResult { text, errors }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn with_env_vars<F, R>(vars: &[(&str, Option<&str>)], f: F) -> R
    where
        F: FnOnce() -> R,
    {
        let originals: Vec<_> = vars.iter().map(|(k, _)| (*k, env::var(k).ok())).collect();

        // SAFETY: every test uses its own variable names and restores them afterwards
        for (key, value) in vars {
            match value {
                Some(v) => unsafe { env::set_var(key, v) },
                None => unsafe { env::remove_var(key) },
            }
        }

        let result = f();

        // SAFETY: restoring original environment state
        for (key, original) in originals {
            match original {
                Some(v) => unsafe { env::set_var(key, v) },
                None => unsafe { env::remove_var(key) },
            }
        }

        result
    }

    #[test]
    fn test_bare_and_braced_substitution() {
        with_env_vars(&[("THAW_TEST_BUCKET", Some("s3://exports"))], || {
            let result = interpolate("bucket: $THAW_TEST_BUCKET\nagain: ${THAW_TEST_BUCKET}");
            assert!(result.is_ok());
            assert_eq!(result.text, "bucket: s3://exports\nagain: s3://exports");
        });
    }

    #[test]
    fn test_missing_variables_are_all_reported() {
        with_env_vars(
            &[("THAW_TEST_MISSING_A", None), ("THAW_TEST_MISSING_B", None)],
            || {
                let result = interpolate("a: $THAW_TEST_MISSING_A\nb: ${THAW_TEST_MISSING_B}");
                assert_eq!(result.errors.len(), 2);
                assert!(result.errors[0].contains("THAW_TEST_MISSING_A"));
                assert!(result.errors[1].contains("not set"));
                assert!(result.text.contains("$THAW_TEST_MISSING_A"));
            },
        );
    }

    #[test]
    fn test_default_when_unset() {
        with_env_vars(&[("THAW_TEST_UNSET", None)], || {
            let result = interpolate("dir: ${THAW_TEST_UNSET:-thawtempdir}");
            assert!(result.is_ok());
            assert_eq!(result.text, "dir: thawtempdir");
        });
    }

    #[test]
    fn test_empty_value_respects_operator() {
        with_env_vars(&[("THAW_TEST_EMPTY", Some(""))], || {
            let colon = interpolate("v: ${THAW_TEST_EMPTY:-fallback}");
            assert_eq!(colon.text, "v: fallback");

            let plain = interpolate("v: ${THAW_TEST_EMPTY-fallback}");
            assert_eq!(plain.text, "v: ");
        });
    }

    #[test]
    fn test_newline_values_rejected() {
        with_env_vars(&[("THAW_TEST_NEWLINE", Some("a\nb: c"))], || {
            let result = interpolate("v: $THAW_TEST_NEWLINE");
            assert!(!result.is_ok());
            assert!(result.errors[0].contains("newlines"));
        });
    }

    #[test]
    fn test_escape_sequence() {
        let result = interpolate("price: $$100");
        assert!(result.is_ok());
        assert_eq!(result.text, "price: $100");
    }
}
