// ABOUTME: Application-wide error types for skiff.
// ABOUTME: Uses thiserror for ergonomic error handling.

use std::path::PathBuf;
use thiserror::Error;

use crate::deploy::DeployError;

#[derive(Debug, Error)]
pub enum Error {
    #[error("file already exists: {0}")]
    AlreadyExists(PathBuf),

    #[error("configuration file not found in {0}")]
    ConfigNotFound(PathBuf),

    #[error("unknown server: {0}")]
    UnknownServer(String),

    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("SSH error: {0}")]
    Ssh(#[from] crate::ssh::Error),

    #[error("deployment {deployment} ended as {status}")]
    Unfinished { deployment: String, status: String },

    #[error(transparent)]
    Deploy(Box<DeployError>),
}

impl From<DeployError> for Error {
    fn from(err: DeployError) -> Self {
        Error::Deploy(Box::new(err))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
