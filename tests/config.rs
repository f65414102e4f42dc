// ABOUTME: Integration tests for configuration parsing and validation.
// ABOUTME: Tests manifest discovery, YAML defaults, env indirection, and the secrets key.

use secrecy::ExposeSecret;
use skiff::config::*;
use skiff::error::Error;
use std::fs;
use std::time::Duration;

const MANIFEST: &str = r#"
application:
  uuid: api-7
  name: api
  build_pack: dockerfile
  source:
    repository: https://github.com/acme/api.git
    branch: release
    base_directory: /services/api
  dockerfile:
    location: /docker/Dockerfile.prod
    target: runtime
  ports_exposes: [8080]
  registry:
    image: ghcr.io/acme/api
    tag: stable
  healthcheck:
    enabled: true
    path: /healthz
    interval: 10s
    retries: 6
  restart: on-failure:5
  env:
    - key: DATABASE_URL
      value: { env: SKIFF_TEST_DATABASE_URL }
      is_buildtime: false
    - key: APP_NAME
      value: api
servers:
  - name: edge
    host: 10.0.0.5
    user: deploy
  - deploy@10.0.0.6:2222
build_server: builder@10.0.0.9
settings:
  run_timeout: 30m
  log_tail: 50
  secrets_key: from-file
"#;

mod discovery {
    use super::*;

    #[test]
    fn finds_skiff_yml() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("skiff.yml"), MANIFEST).unwrap();
        let manifest = Manifest::discover(dir.path()).unwrap();
        assert_eq!(manifest.application.name, "api");
    }

    #[test]
    fn finds_alternate_locations() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("skiff.yaml"), MANIFEST).unwrap();
        assert!(Manifest::discover(dir.path()).is_ok());

        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join(".skiff")).unwrap();
        fs::write(dir.path().join(".skiff/config.yml"), MANIFEST).unwrap();
        assert!(Manifest::discover(dir.path()).is_ok());
    }

    #[test]
    fn missing_file_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            Manifest::discover(dir.path()),
            Err(Error::ConfigNotFound(_))
        ));
    }

    #[test]
    fn malformed_yaml_is_a_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("skiff.yml"), "application: [").unwrap();
        assert!(matches!(
            Manifest::discover(dir.path()),
            Err(Error::Yaml(_))
        ));
    }
}

mod parsing {
    use super::*;

    #[test]
    fn full_manifest() {
        let manifest = Manifest::from_yaml(MANIFEST).unwrap();
        let app = &manifest.application;

        assert_eq!(app.build_pack, BuildPack::Dockerfile);
        assert_eq!(app.dockerfile.target.as_deref(), Some("runtime"));
        assert_eq!(app.base_directory(), "/services/api");
        assert_eq!(app.registry.as_ref().unwrap().tag.as_deref(), Some("stable"));
        assert_eq!(app.healthcheck.interval, Duration::from_secs(10));
        assert_eq!(app.healthcheck.retries, 6);
        assert_eq!(app.healthcheck.timeout, Duration::from_secs(5));
        assert_eq!(
            app.restart,
            RestartPolicy::OnFailure {
                max_retries: Some(5)
            }
        );

        assert_eq!(manifest.servers.len(), 2);
        assert_eq!(manifest.primary_server().reference(), "edge");
        let second = manifest.server("10.0.0.6").unwrap();
        assert_eq!(second.port, 2222);
        assert_eq!(second.user.as_deref(), Some("deploy"));
        assert_eq!(manifest.build_server.as_ref().unwrap().host, "10.0.0.9");

        assert_eq!(manifest.settings.run_timeout, Duration::from_secs(1800));
        assert_eq!(manifest.settings.log_tail, 50);
        assert_eq!(manifest.settings.helper_image, "ghcr.io/skiff-sh/helper:1");
    }

    #[test]
    fn env_declarations_keep_their_flags() {
        let manifest = Manifest::from_yaml(MANIFEST).unwrap();
        let env = &manifest.application.env;
        assert_eq!(env.len(), 2);
        assert!(!env[0].is_buildtime);
        assert!(env[0].is_runtime);
        assert_eq!(env[1].value, EnvValue::Literal("api".to_string()));
    }

    #[test]
    fn env_indirection_reads_the_operator_environment() {
        let manifest = Manifest::from_yaml(MANIFEST).unwrap();
        let database = &manifest.application.env[0].value;

        temp_env::with_var("SKIFF_TEST_DATABASE_URL", Some("postgres://db/api"), || {
            assert_eq!(database.resolve().unwrap(), "postgres://db/api");
        });
        temp_env::with_var_unset("SKIFF_TEST_DATABASE_URL", || {
            assert!(matches!(database.resolve(), Err(Error::MissingEnvVar(_))));
        });
    }

    #[test]
    fn dockerimage_without_image_is_rejected() {
        let yaml = MANIFEST.replace("build_pack: dockerfile", "build_pack: dockerimage");
        assert!(matches!(
            Manifest::from_yaml(&yaml),
            Err(Error::InvalidConfig(_))
        ));
    }

    #[test]
    fn duplicate_server_references_are_rejected() {
        let yaml = MANIFEST.replace(
            "  - deploy@10.0.0.6:2222\n",
            "  - name: edge\n    host: 10.0.0.7\n",
        );
        assert!(matches!(
            Manifest::from_yaml(&yaml),
            Err(Error::InvalidConfig(_))
        ));
    }

    #[test]
    fn build_server_requires_a_registry() {
        let yaml = MANIFEST
            .replace("  registry:\n    image: ghcr.io/acme/api\n    tag: stable\n", "")
            .replace("  - deploy@10.0.0.6:2222\n", "");
        assert!(matches!(
            Manifest::from_yaml(&yaml),
            Err(Error::InvalidConfig(_))
        ));
    }

    #[test]
    fn invalid_custom_container_name_is_rejected() {
        let yaml = MANIFEST.replace(
            "  ports_exposes: [8080]\n",
            "  ports_exposes: [8080]\n  custom_container_name: \"api; rm -rf /\"\n",
        );
        assert!(matches!(
            Manifest::from_yaml(&yaml),
            Err(Error::InvalidConfig(_))
        ));
    }
}

mod secrets_key {
    use super::*;

    #[test]
    fn manifest_value_is_used() {
        let manifest = Manifest::from_yaml(MANIFEST).unwrap();
        let key = manifest.settings.resolve_secrets_key().unwrap();
        assert_eq!(key.expose_secret(), "from-file");
    }

    #[test]
    fn environment_is_the_fallback() {
        let yaml = MANIFEST.replace("  secrets_key: from-file\n", "");
        let manifest = Manifest::from_yaml(&yaml).unwrap();

        temp_env::with_var(SECRETS_KEY_ENV, Some("from-env"), || {
            let key = manifest.settings.resolve_secrets_key().unwrap();
            assert_eq!(key.expose_secret(), "from-env");
        });
        temp_env::with_var_unset(SECRETS_KEY_ENV, || {
            assert!(manifest.settings.resolve_secrets_key().is_err());
        });
    }
}

mod init {
    use super::*;

    #[test]
    fn writes_a_loadable_manifest() {
        let dir = tempfile::tempdir().unwrap();
        init_config(
            dir.path(),
            Some("shop"),
            Some("https://github.com/acme/shop.git"),
            Some("deploy@10.1.2.3:2200"),
            false,
        )
        .unwrap();

        let manifest = Manifest::discover(dir.path()).unwrap();
        assert_eq!(manifest.application.name, "shop");
        assert_eq!(
            manifest.application.source.as_ref().unwrap().repository,
            "https://github.com/acme/shop.git"
        );
        let server = manifest.primary_server();
        assert_eq!(server.host, "10.1.2.3");
        assert_eq!(server.port, 2200);
    }

    #[test]
    fn refuses_to_overwrite_without_force() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(CONFIG_FILENAME), "existing").unwrap();

        assert!(matches!(
            init_config(dir.path(), None, None, None, false),
            Err(Error::AlreadyExists(_))
        ));
        init_config(dir.path(), None, None, None, true).unwrap();
        assert!(Manifest::discover(dir.path()).is_ok());
    }
}
