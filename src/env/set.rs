// ABOUTME: Ordered environment variable set with layered precedence.
// ABOUTME: User declarations beat platform discovery values, which beat build-tool defaults.

use super::EnvError;
use super::escape::{escape_literal, escape_scalar};

/// Where a variable came from. Higher layers win on key collisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum VarOrigin {
    /// Defaults inferred by the build-plan tool. Build-time file only.
    Detected,
    /// Platform-injected values such as the public URL.
    Discovery,
    /// Declared on the application.
    User,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvVar {
    pub key: String,
    pub value: String,
    pub is_buildtime: bool,
    pub is_runtime: bool,
    /// Rendered with non-interpolating quotes.
    pub is_literal: bool,
    pub is_multiline: bool,
    pub origin: VarOrigin,
}

impl EnvVar {
    pub fn new(key: impl Into<String>, value: impl Into<String>, origin: VarOrigin) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            is_buildtime: true,
            is_runtime: true,
            is_literal: false,
            is_multiline: false,
            origin,
        }
    }

    pub fn build_only(mut self) -> Self {
        self.is_runtime = false;
        self
    }

    pub fn runtime_only(mut self) -> Self {
        self.is_buildtime = false;
        self
    }

    pub fn literal(mut self) -> Self {
        self.is_literal = true;
        self
    }

    pub fn uses_literal_quoting(&self) -> bool {
        self.is_literal || self.is_multiline || self.value.contains('\n')
    }

    /// `KEY=<escaped value>` as written to env files.
    pub fn render(&self) -> String {
        let value = if self.uses_literal_quoting() {
            escape_literal(&self.value)
        } else {
            escape_scalar(&self.value)
        };
        format!("{}={value}", self.key)
    }
}

/// Names usable as shell variables and Dockerfile `ARG`s.
pub fn validate_key(key: &str) -> Result<(), EnvError> {
    let mut chars = key.chars();
    let valid = matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_');
    if valid {
        Ok(())
    } else {
        Err(EnvError::InvalidKey(key.to_string()))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvironmentVariableSet {
    vars: Vec<EnvVar>,
}

impl EnvironmentVariableSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert honoring precedence: an existing entry from a higher or equal
    /// layer keeps its value; a lower one is replaced in place.
    pub fn insert(&mut self, var: EnvVar) {
        match self.vars.iter_mut().find(|v| v.key == var.key) {
            Some(existing) if existing.origin > var.origin => {}
            Some(existing) if existing.origin == var.origin => {}
            Some(existing) => *existing = var,
            None => self.vars.push(var),
        }
    }

    pub fn extend<I: IntoIterator<Item = EnvVar>>(&mut self, vars: I) {
        for var in vars {
            self.insert(var);
        }
    }

    pub fn get(&self, key: &str) -> Option<&EnvVar> {
        self.vars.iter().find(|v| v.key == key)
    }

    pub fn value(&self, key: &str) -> Option<&str> {
        self.get(key).map(|v| v.value.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = &EnvVar> {
        self.vars.iter()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.vars.iter().map(|v| v.key.as_str())
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    pub fn filter(&self, predicate: impl Fn(&EnvVar) -> bool) -> Self {
        Self {
            vars: self.vars.iter().filter(|v| predicate(v)).cloned().collect(),
        }
    }

    pub fn build_time(&self) -> Self {
        self.filter(|v| v.is_buildtime)
    }

    pub fn runtime(&self) -> Self {
        self.filter(|v| v.is_runtime && v.origin != VarOrigin::Detected)
    }

    /// `key=value` pairs sorted by key, the canonical form for hashing.
    pub fn sorted_pairs(&self) -> Vec<String> {
        let mut pairs: Vec<String> = self
            .vars
            .iter()
            .map(|v| format!("{}={}", v.key, v.value))
            .collect();
        pairs.sort();
        pairs
    }

    /// Env-file rendering, one `KEY=value` line per variable.
    pub fn to_env_file(&self) -> String {
        let mut out = String::new();
        for var in &self.vars {
            out.push_str(&var.render());
            out.push('\n');
        }
        out
    }
}

impl FromIterator<EnvVar> for EnvironmentVariableSet {
    fn from_iter<I: IntoIterator<Item = EnvVar>>(iter: I) -> Self {
        let mut set = Self::new();
        set.extend(iter);
        set
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_values_override_lower_layers_regardless_of_order() {
        let mut set = EnvironmentVariableSet::new();
        set.insert(EnvVar::new("PORT", "8080", VarOrigin::Detected));
        set.insert(EnvVar::new("PORT", "3000", VarOrigin::User));
        set.insert(EnvVar::new("PORT", "80", VarOrigin::Discovery));
        assert_eq!(set.value("PORT"), Some("3000"));
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn first_declaration_wins_within_a_layer() {
        let set: EnvironmentVariableSet = [
            EnvVar::new("A", "1", VarOrigin::User),
            EnvVar::new("A", "2", VarOrigin::User),
        ]
        .into_iter()
        .collect();
        assert_eq!(set.value("A"), Some("1"));
    }

    #[test]
    fn detected_defaults_never_reach_runtime() {
        let set: EnvironmentVariableSet = [
            EnvVar::new("NIXPACKS_NODE_VERSION", "20", VarOrigin::Detected),
            EnvVar::new("TOKEN", "x", VarOrigin::User).build_only(),
            EnvVar::new("SKIFF_CONTAINER_NAME", "api-1", VarOrigin::Discovery).runtime_only(),
        ]
        .into_iter()
        .collect();

        let runtime: Vec<_> = set.runtime().keys().map(str::to_string).collect();
        assert_eq!(runtime, vec!["SKIFF_CONTAINER_NAME"]);

        let build: Vec<_> = set.build_time().keys().map(str::to_string).collect();
        assert_eq!(build, vec!["NIXPACKS_NODE_VERSION", "TOKEN"]);
    }

    #[test]
    fn env_file_quotes_by_kind() {
        let set: EnvironmentVariableSet = [
            EnvVar::new("URL", "https://$HOST", VarOrigin::User),
            EnvVar::new("PASS", "it's $raw", VarOrigin::User).literal(),
        ]
        .into_iter()
        .collect();
        assert_eq!(
            set.to_env_file(),
            "URL=\"https://$HOST\"\nPASS='it'\\''s $raw'\n"
        );
    }

    #[test]
    fn key_validation() {
        assert!(validate_key("DATABASE_URL").is_ok());
        assert!(validate_key("_x1").is_ok());
        assert!(validate_key("1ABC").is_err());
        assert!(validate_key("A B").is_err());
        assert!(validate_key("A;rm").is_err());
        assert!(validate_key("").is_err());
    }
}
