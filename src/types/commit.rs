// ABOUTME: Git commit selector for a deployment request.
// ABOUTME: Either HEAD of the configured branch or an exact hexadecimal sha.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CommitError {
    #[error("commit cannot be empty")]
    Empty,

    #[error("commit sha must be 7 to 40 hexadecimal characters, got '{0}'")]
    InvalidSha(String),
}

/// Which revision a deployment should build.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub enum Commit {
    /// Tip of the configured branch, resolved at run time.
    #[default]
    Head,
    /// An exact commit.
    Sha(String),
}

impl Commit {
    pub fn sha(value: &str) -> Result<Self, CommitError> {
        let value = value.trim();
        if value.is_empty() {
            return Err(CommitError::Empty);
        }
        if !(7..=40).contains(&value.len()) || !value.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(CommitError::InvalidSha(value.to_string()));
        }
        Ok(Commit::Sha(value.to_ascii_lowercase()))
    }

    pub fn is_head(&self) -> bool {
        matches!(self, Commit::Head)
    }

    /// The resolved sha, if any.
    pub fn as_sha(&self) -> Option<&str> {
        match self {
            Commit::Head => None,
            Commit::Sha(sha) => Some(sha),
        }
    }

    /// Value used in image tags: the sha, or `HEAD` before resolution.
    pub fn tag(&self) -> &str {
        self.as_sha().unwrap_or("HEAD")
    }
}

impl FromStr for Commit {
    type Err = CommitError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.trim().eq_ignore_ascii_case("head") {
            Ok(Commit::Head)
        } else {
            Commit::sha(s)
        }
    }
}

impl fmt::Display for Commit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

impl Serialize for Commit {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.tag())
    }
}

impl<'de> Deserialize<'de> for Commit {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
