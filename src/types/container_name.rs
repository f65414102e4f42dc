// ABOUTME: Container name validation for docker-compatible names.
// ABOUTME: Names must start alphanumeric and contain only [a-zA-Z0-9_.-].

use std::fmt;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ContainerNameError {
    #[error("container name cannot be empty")]
    Empty,

    #[error("container name exceeds maximum length of 128 characters")]
    TooLong,

    #[error("container name must start with a letter or digit")]
    InvalidStart,

    #[error("invalid character in container name: '{0}'")]
    InvalidChar(char),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ContainerName(String);

impl ContainerName {
    pub fn new(value: &str) -> Result<Self, ContainerNameError> {
        let first = value.chars().next().ok_or(ContainerNameError::Empty)?;

        if value.len() > 128 {
            return Err(ContainerNameError::TooLong);
        }

        if !first.is_ascii_alphanumeric() {
            return Err(ContainerNameError::InvalidStart);
        }

        if let Some(c) = value
            .chars()
            .find(|c| !c.is_ascii_alphanumeric() && !matches!(c, '_' | '.' | '-'))
        {
            return Err(ContainerNameError::InvalidChar(c));
        }

        Ok(Self(value.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContainerName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_versioned_names() {
        assert!(ContainerName::new("app1-0f3a9c").is_ok());
        assert!(ContainerName::new("api_v2.blue").is_ok());
    }

    #[test]
    fn rejects_shell_metacharacters() {
        assert!(matches!(
            ContainerName::new("app;rm"),
            Err(ContainerNameError::InvalidChar(';'))
        ));
        assert!(matches!(
            ContainerName::new("-app"),
            Err(ContainerNameError::InvalidStart)
        ));
    }
}
