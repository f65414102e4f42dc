// ABOUTME: Declared environment variables with value indirection.
// ABOUTME: Values are literal or looked up from the operator's environment.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EnvValue {
    Literal(String),
    FromEnv {
        #[serde(rename = "env")]
        var: String,
        #[serde(default)]
        default: Option<String>,
    },
}

impl EnvValue {
    pub fn resolve(&self) -> Result<String> {
        match self {
            EnvValue::Literal(s) => Ok(s.clone()),
            EnvValue::FromEnv { var, default } => match std::env::var(var) {
                Ok(val) => Ok(val),
                Err(_) => default
                    .clone()
                    .ok_or_else(|| Error::MissingEnvVar(var.clone())),
            },
        }
    }
}

/// A user-declared variable on an application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvVarDeclaration {
    pub key: String,
    pub value: EnvValue,
    /// Available while the image is built.
    #[serde(default = "default_true")]
    pub is_buildtime: bool,
    /// Available to the running container.
    #[serde(default = "default_true")]
    pub is_runtime: bool,
    /// Never interpolate `$VAR` references in the value.
    #[serde(default)]
    pub is_literal: bool,
    #[serde(default)]
    pub is_multiline: bool,
}

fn default_true() -> bool {
    true
}

impl EnvVarDeclaration {
    pub fn literal(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: EnvValue::Literal(value.into()),
            is_buildtime: true,
            is_runtime: true,
            is_literal: false,
            is_multiline: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn literal_resolves_to_itself() {
        let value = EnvValue::Literal("abc".to_string());
        assert_eq!(value.resolve().unwrap(), "abc");
    }

    #[test]
    fn from_env_uses_process_environment() {
        temp_env::with_var("SKIFF_TEST_TOKEN", Some("s3cret"), || {
            let value = EnvValue::FromEnv {
                var: "SKIFF_TEST_TOKEN".to_string(),
                default: None,
            };
            assert_eq!(value.resolve().unwrap(), "s3cret");
        });
    }

    #[test]
    fn from_env_falls_back_to_default() {
        temp_env::with_var_unset("SKIFF_TEST_MISSING", || {
            let value = EnvValue::FromEnv {
                var: "SKIFF_TEST_MISSING".to_string(),
                default: Some("fallback".to_string()),
            };
            assert_eq!(value.resolve().unwrap(), "fallback");

            let value = EnvValue::FromEnv {
                var: "SKIFF_TEST_MISSING".to_string(),
                default: None,
            };
            assert!(matches!(value.resolve(), Err(Error::MissingEnvVar(_))));
        });
    }

    #[test]
    fn declaration_flags_default_to_both_phases() {
        let decl: EnvVarDeclaration =
            serde_yaml::from_str("key: API_URL\nvalue: https://api\n").unwrap();
        assert!(decl.is_buildtime);
        assert!(decl.is_runtime);
        assert!(!decl.is_literal);
    }
}
