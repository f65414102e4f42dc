// ABOUTME: Property and integration tests for env file rendering and the build secrets hash.
// ABOUTME: Quoting must round-trip through the remote write, and the hash must only move when build-time content moves.

use proptest::prelude::*;
use secrecy::SecretString;
use skiff::env::*;
use skiff::executor::{decode_payload, write_file};

fn materializer(key: &str) -> EnvironmentMaterializer {
    EnvironmentMaterializer::new(SecretString::from(key.to_string()))
}

fn user(pairs: &[(&str, &str)]) -> Vec<EnvVar> {
    pairs
        .iter()
        .map(|(k, v)| EnvVar::new(*k, *v, VarOrigin::User))
        .collect()
}

proptest! {
    #[test]
    fn scalar_quoting_round_trips(value in "[ -~]*") {
        prop_assert_eq!(unescape_scalar(&escape_scalar(&value)), Some(value));
    }

    #[test]
    fn literal_quoting_round_trips(value in "[ -~\n]*") {
        prop_assert_eq!(unescape_literal(&escape_literal(&value)), Some(value));
    }

    #[test]
    fn rendered_lines_parse_back(key in "[A-Z][A-Z0-9_]{0,15}", value in "[ -~]*") {
        let line = EnvVar::new(key.clone(), value.clone(), VarOrigin::User).render();
        let quoted = line.strip_prefix(&format!("{key}=")).unwrap();
        prop_assert_eq!(unescape_scalar(quoted), Some(value));
    }

    #[test]
    fn literal_values_survive_the_remote_write(
        key in "[A-Z][A-Z0-9_]{0,15}",
        value in "[ -~\n]*",
    ) {
        let var = EnvVar::new(key.clone(), value.clone(), VarOrigin::User).literal();
        let contents: String = [var].into_iter().collect::<EnvironmentVariableSet>().to_env_file();

        let command = write_file("/artifacts/d1/.env", &contents);
        let payload = command
            .strip_prefix("echo '")
            .and_then(|rest| rest.split_once('\''))
            .map(|(encoded, _)| encoded)
            .unwrap();
        let decoded = decode_payload(payload).unwrap();
        prop_assert_eq!(&decoded, &contents);

        let line = decoded.strip_suffix('\n').unwrap();
        let quoted = line.strip_prefix(&format!("{key}=")).unwrap();
        prop_assert_eq!(unescape_literal(quoted), Some(value));
    }

    #[test]
    fn hash_ignores_declaration_order(
        pairs in proptest::collection::btree_map("[A-Z]{1,8}", "[a-z0-9]{0,12}", 1..8)
    ) {
        let forward: Vec<EnvVar> = pairs
            .iter()
            .map(|(k, v)| EnvVar::new(k.clone(), v.clone(), VarOrigin::User))
            .collect();
        let mut backward = forward.clone();
        backward.reverse();

        let m = materializer("platform-key");
        let a = m.build_time(&forward, &[], &[], None).unwrap();
        let b = m.build_time(&backward, &[], &[], None).unwrap();
        prop_assert_eq!(a.hash(), b.hash());
    }
}

#[test]
fn hash_follows_build_time_content_only() {
    let m = materializer("platform-key");
    let base = m
        .build_time(&user(&[("API_URL", "https://api")]), &[], &[], None)
        .unwrap();

    let changed = m
        .build_time(&user(&[("API_URL", "https://api2")]), &[], &[], None)
        .unwrap();
    assert_ne!(base.hash(), changed.hash());

    let mut with_runtime = user(&[("API_URL", "https://api")]);
    with_runtime.push(EnvVar::new("SESSION_SECRET", "s3cret", VarOrigin::User).runtime_only());
    let runtime_only = m.build_time(&with_runtime, &[], &[], None).unwrap();
    assert_eq!(base.hash(), runtime_only.hash());
}

#[test]
fn hash_depends_on_the_platform_key() {
    let vars = user(&[("API_URL", "https://api")]);
    let a = materializer("key-a").build_time(&vars, &[], &[], None).unwrap();
    let b = materializer("key-b").build_time(&vars, &[], &[], None).unwrap();
    assert_ne!(a.hash(), b.hash());
    assert_eq!(a.hash().as_str().len(), 64);
}

#[test]
fn build_env_file_carries_the_hash_but_keys_do_not() {
    let env = materializer("platform-key")
        .build_time(&user(&[("API_URL", "https://api")]), &[], &[], Some("abc1234"))
        .unwrap();

    let file = env.with_hash().to_env_file();
    assert!(file.contains(&format!("{SECRETS_HASH_VAR}=\"{}\"", env.hash())));
    assert!(file.contains("SOURCE_COMMIT=\"abc1234\""));
    assert!(!env.keys().contains(&SECRETS_HASH_VAR.to_string()));
}

#[test]
fn detected_defaults_lose_to_user_values_and_never_reach_runtime() {
    let m = materializer("platform-key");
    let detected = vec![
        EnvVar::new("NODE_ENV", "production", VarOrigin::Detected).build_only(),
        EnvVar::new("NIXPACKS_NODE_VERSION", "20", VarOrigin::Detected).build_only(),
    ];
    let user = user(&[("NODE_ENV", "staging")]);

    let build = m.build_time(&user, &[], &detected, None).unwrap();
    assert_eq!(build.vars().value("NODE_ENV"), Some("staging"));
    assert_eq!(build.vars().value("NIXPACKS_NODE_VERSION"), Some("20"));

    let runtime = m.runtime(&user, &[]);
    assert_eq!(runtime.value("NODE_ENV"), Some("staging"));
    assert!(runtime.get("NIXPACKS_NODE_VERSION").is_none());
}

#[test]
fn multiline_values_use_literal_quoting() {
    let var = EnvVar::new("CERT", "line one\nline $two", VarOrigin::User);
    assert_eq!(var.render(), "CERT='line one\nline $two'");

    let var = EnvVar::new("GREETING", "hello $USER", VarOrigin::User);
    assert_eq!(var.render(), "GREETING=\"hello $USER\"");
}
