// ABOUTME: Computes the build-time and runtime variable sets for one run.
// ABOUTME: Resolves declarations, adds discovery values, and attaches the secrets hash.

use secrecy::SecretString;

use super::secrets::{SECRETS_HASH_VAR, SecretsHash};
use super::set::validate_key;
use super::{EnvError, EnvVar, EnvironmentVariableSet, VarOrigin};
use crate::config::{ApplicationConfig, EnvVarDeclaration};

/// Inputs for platform-injected discovery variables.
#[derive(Debug, Clone, Copy)]
pub struct Discovery<'a> {
    pub app: &'a ApplicationConfig,
    pub branch: &'a str,
    pub pull_request_id: u32,
    /// Known only once the rollout has minted it; runtime only.
    pub container_name: Option<&'a str>,
}

/// Public URL of a pull-request preview: `https://api.x` becomes `https://pr-7.api.x`.
pub fn preview_url(domain: &str, pull_request_id: u32) -> String {
    match domain.split_once("://") {
        Some((scheme, host)) => format!("{scheme}://pr-{pull_request_id}.{host}"),
        None => format!("pr-{pull_request_id}.{domain}"),
    }
}

fn fqdn(url: &str) -> &str {
    let host = url.split_once("://").map(|(_, h)| h).unwrap_or(url);
    host.split(['/', ':']).next().unwrap_or(host)
}

pub fn discovery_vars(discovery: &Discovery<'_>) -> Vec<EnvVar> {
    let mut vars = vec![
        EnvVar::new(
            "SKIFF_RESOURCE_UUID",
            discovery.app.uuid.as_str(),
            VarOrigin::Discovery,
        ),
        EnvVar::new("SKIFF_BRANCH", discovery.branch, VarOrigin::Discovery),
    ];

    let urls: Vec<String> = discovery
        .app
        .domains
        .iter()
        .map(|d| match discovery.pull_request_id {
            0 => d.clone(),
            pr => preview_url(d, pr),
        })
        .collect();
    if !urls.is_empty() {
        let fqdns: Vec<&str> = urls.iter().map(|u| fqdn(u)).collect();
        vars.push(EnvVar::new("SKIFF_URL", urls.join(","), VarOrigin::Discovery));
        vars.push(EnvVar::new("SKIFF_FQDN", fqdns.join(","), VarOrigin::Discovery));
    }

    if let Some(name) = discovery.container_name {
        vars.push(EnvVar::new("SKIFF_CONTAINER_NAME", name, VarOrigin::Discovery).runtime_only());
    }
    vars
}

/// Resolve declared variables against the operator environment.
pub fn resolve_declarations(declarations: &[EnvVarDeclaration]) -> Result<Vec<EnvVar>, EnvError> {
    declarations
        .iter()
        .map(|decl| {
            validate_key(&decl.key)?;
            let value = decl.value.resolve().map_err(|source| EnvError::Resolve {
                key: decl.key.clone(),
                source: Box::new(source),
            })?;
            Ok(EnvVar {
                key: decl.key.clone(),
                value,
                is_buildtime: decl.is_buildtime,
                is_runtime: decl.is_runtime,
                is_literal: decl.is_literal,
                is_multiline: decl.is_multiline,
                origin: VarOrigin::User,
            })
        })
        .collect()
}

/// The build-time set and its hash.
#[derive(Debug, Clone)]
pub struct BuildTimeEnv {
    vars: EnvironmentVariableSet,
    hash: SecretsHash,
}

impl BuildTimeEnv {
    pub fn hash(&self) -> &SecretsHash {
        &self.hash
    }

    /// Variables without the hash.
    pub fn vars(&self) -> &EnvironmentVariableSet {
        &self.vars
    }

    /// Variables with the hash appended, as written to the build env file.
    pub fn with_hash(&self) -> EnvironmentVariableSet {
        let mut set = self.vars.clone();
        set.insert(EnvVar::new(SECRETS_HASH_VAR, self.hash.as_str(), VarOrigin::User).build_only());
        set
    }

    pub fn keys(&self) -> Vec<String> {
        self.vars.keys().map(str::to_string).collect()
    }
}

pub struct EnvironmentMaterializer {
    key: SecretString,
}

impl EnvironmentMaterializer {
    pub fn new(key: SecretString) -> Self {
        Self { key }
    }

    /// User > discovery > detected, build-time flagged only, then hashed.
    pub fn build_time(
        &self,
        user: &[EnvVar],
        discovery: &[EnvVar],
        detected: &[EnvVar],
        source_commit: Option<&str>,
    ) -> Result<BuildTimeEnv, EnvError> {
        let mut set = EnvironmentVariableSet::new();
        set.extend(user.iter().cloned());
        set.extend(discovery.iter().cloned());
        set.extend(detected.iter().cloned());
        if let Some(commit) = source_commit {
            set.insert(EnvVar::new("SOURCE_COMMIT", commit, VarOrigin::Discovery).build_only());
        }
        let vars = set.build_time();
        let hash = SecretsHash::compute(&vars, &self.key)
            .ok_or(EnvError::SecretsKey)?;
        Ok(BuildTimeEnv { vars, hash })
    }

    /// User > discovery, runtime flagged only. Detected defaults never apply.
    pub fn runtime(&self, user: &[EnvVar], discovery: &[EnvVar]) -> EnvironmentVariableSet {
        let mut set = EnvironmentVariableSet::new();
        set.extend(user.iter().cloned());
        set.extend(discovery.iter().cloned());
        set.runtime()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EnvValue;

    fn app() -> ApplicationConfig {
        let mut app = ApplicationConfig::template();
        app.domains = vec!["https://api.example.com".to_string()];
        app
    }

    fn materializer() -> EnvironmentMaterializer {
        EnvironmentMaterializer::new(SecretString::from("k"))
    }

    #[test]
    fn discovery_derives_url_and_fqdn() {
        let app = app();
        let vars = discovery_vars(&Discovery {
            app: &app,
            branch: "main",
            pull_request_id: 0,
            container_name: Some("my-app-1"),
        });
        let set: EnvironmentVariableSet = vars.into_iter().collect();
        assert_eq!(set.value("SKIFF_URL"), Some("https://api.example.com"));
        assert_eq!(set.value("SKIFF_FQDN"), Some("api.example.com"));
        assert!(!set.get("SKIFF_CONTAINER_NAME").unwrap().is_buildtime);
    }

    #[test]
    fn previews_get_prefixed_domains() {
        assert_eq!(
            preview_url("https://api.example.com", 12),
            "https://pr-12.api.example.com"
        );
    }

    #[test]
    fn user_declaration_beats_discovery() {
        let app = app();
        let user = resolve_declarations(&[EnvVarDeclaration::literal("SKIFF_URL", "custom")]).unwrap();
        let discovery = discovery_vars(&Discovery {
            app: &app,
            branch: "main",
            pull_request_id: 0,
            container_name: None,
        });
        let runtime = materializer().runtime(&user, &discovery);
        assert_eq!(runtime.value("SKIFF_URL"), Some("custom"));
    }

    #[test]
    fn build_time_set_excludes_runtime_only_values() {
        let mut runtime_only = EnvVarDeclaration::literal("DB_PASSWORD", "x");
        runtime_only.is_buildtime = false;
        let user = resolve_declarations(&[runtime_only, EnvVarDeclaration::literal("NODE_ENV", "production")]).unwrap();
        let detected = vec![EnvVar::new("NODE_ENV", "development", VarOrigin::Detected).build_only()];

        let env = materializer().build_time(&user, &[], &detected, Some("abc1234")).unwrap();
        assert_eq!(env.vars().value("NODE_ENV"), Some("production"));
        assert!(env.vars().get("DB_PASSWORD").is_none());
        assert_eq!(env.vars().value("SOURCE_COMMIT"), Some("abc1234"));
        assert_eq!(
            env.with_hash().value(SECRETS_HASH_VAR),
            Some(env.hash().as_str())
        );
    }

    #[test]
    fn unresolvable_declaration_names_the_key() {
        temp_env::with_var_unset("SKIFF_TEST_ABSENT", || {
            let decl = EnvVarDeclaration {
                value: EnvValue::FromEnv {
                    var: "SKIFF_TEST_ABSENT".to_string(),
                    default: None,
                },
                ..EnvVarDeclaration::literal("TOKEN", "")
            };
            let err = resolve_declarations(&[decl]).unwrap_err();
            assert!(err.to_string().contains("TOKEN"));
        });
    }

    #[test]
    fn invalid_keys_are_rejected() {
        assert!(matches!(
            resolve_declarations(&[EnvVarDeclaration::literal("BAD KEY", "x")]),
            Err(EnvError::InvalidKey(_))
        ));
    }
}
