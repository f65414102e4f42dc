// ABOUTME: Container image reference parsing and construction.
// ABOUTME: Handles repo, repo:tag, registry/repo:tag@digest and sha256- tag pins.

use std::fmt;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ParseImageRefError {
    #[error("image reference cannot be empty")]
    Empty,

    #[error("invalid character in image reference: {0}")]
    InvalidChar(char),

    #[error("invalid image reference format: {0}")]
    InvalidFormat(String),
}

/// Tag prefix registries use to express a pinned digest as a tag.
const DIGEST_TAG_PREFIX: &str = "sha256-";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageRef {
    registry: Option<String>,
    name: String,
    tag: Option<String>,
    digest: Option<String>,
}

impl ImageRef {
    pub fn parse(input: &str) -> Result<Self, ParseImageRefError> {
        let input = input.trim();
        if input.is_empty() {
            return Err(ParseImageRefError::Empty);
        }

        if let Some(c) = input
            .chars()
            .find(|c| !c.is_ascii_alphanumeric() && !matches!(c, '/' | ':' | '.' | '-' | '_' | '@'))
        {
            return Err(ParseImageRefError::InvalidChar(c));
        }

        let (without_digest, digest) = match input.split_once('@') {
            Some((before, after)) => (before, Some(after.to_string())),
            None => (input, None),
        };

        // A colon followed by a slash belongs to a registry port, not a tag.
        let (without_tag, tag) = match without_digest.rsplit_once(':') {
            Some((before, after)) if !after.contains('/') => (before, Some(after.to_string())),
            _ => (without_digest, None),
        };

        let (registry, name) = Self::parse_registry_and_name(without_tag)?;

        let tag = match (&tag, &digest) {
            (None, None) => Some("latest".to_string()),
            _ => tag,
        };

        Ok(Self {
            registry,
            name,
            tag,
            digest,
        })
    }

    /// Build a reference from a repository and a separately configured tag.
    ///
    /// A tag of the form `sha256-<hex>` is a digest pin and is rendered as
    /// `<repo>@sha256:<hex>`; anything else becomes `<repo>:<tag>`.
    pub fn from_repository_and_tag(
        repository: &str,
        tag: Option<&str>,
    ) -> Result<Self, ParseImageRefError> {
        let base = Self::parse(repository)?;
        if base.digest.is_some() {
            return Ok(base);
        }
        let Some(tag) = tag.map(str::trim).filter(|t| !t.is_empty()) else {
            return Ok(base);
        };

        let mut image = base.without_version();
        match tag.strip_prefix(DIGEST_TAG_PREFIX) {
            Some(hex) if !hex.is_empty() && hex.chars().all(|c| c.is_ascii_hexdigit()) => {
                image.digest = Some(format!("sha256:{hex}"));
            }
            _ => {
                Self::parse(&format!("{}:{tag}", image.repository()))?;
                image.tag = Some(tag.to_string());
            }
        }
        Ok(image)
    }

    fn parse_registry_and_name(
        input: &str,
    ) -> Result<(Option<String>, String), ParseImageRefError> {
        // A leading component is a registry if it has a dot, a port, or is localhost.
        match input.split_once('/') {
            None if !input.is_empty() => Ok((None, input.to_string())),
            Some((first, rest))
                if !rest.is_empty()
                    && (first.contains('.') || first.contains(':') || first == "localhost") =>
            {
                Ok((Some(first.to_string()), rest.to_string()))
            }
            Some((first, rest)) if !first.is_empty() && !rest.is_empty() => {
                Ok((None, input.to_string()))
            }
            _ => Err(ParseImageRefError::InvalidFormat(input.to_string())),
        }
    }

    /// Same repository, with the given tag and no digest.
    pub fn with_tag(&self, tag: &str) -> Self {
        Self {
            registry: self.registry.clone(),
            name: self.name.clone(),
            tag: Some(tag.to_string()),
            digest: None,
        }
    }

    fn without_version(&self) -> Self {
        Self {
            registry: self.registry.clone(),
            name: self.name.clone(),
            tag: None,
            digest: None,
        }
    }

    /// `registry/name` without tag or digest.
    pub fn repository(&self) -> String {
        match &self.registry {
            Some(registry) => format!("{registry}/{}", self.name),
            None => self.name.clone(),
        }
    }

    pub fn registry(&self) -> Option<&str> {
        self.registry.as_deref()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn tag(&self) -> Option<&str> {
        self.tag.as_deref()
    }

    pub fn digest(&self) -> Option<&str> {
        self.digest.as_deref()
    }
}

impl fmt::Display for ImageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.repository())?;
        if let Some(ref tag) = self.tag {
            write!(f, ":{tag}")?;
        }
        if let Some(ref digest) = self.digest {
            write!(f, "@{digest}")?;
        }
        Ok(())
    }
}
