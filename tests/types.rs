// ABOUTME: Integration tests for type-safe identifiers and validated types.
// ABOUTME: Tests image references, commit selectors, identifiers and container names.

use skiff::types::*;

mod image_ref_tests {
    use super::*;

    #[test]
    fn parse_simple_name() {
        let img = ImageRef::parse("nginx").unwrap();
        assert_eq!(img.name(), "nginx");
        assert_eq!(img.tag(), Some("latest"));
        assert!(img.registry().is_none());
        assert!(img.digest().is_none());
    }

    #[test]
    fn parse_with_org() {
        let img = ImageRef::parse("ghcr.io/org/repo:latest").unwrap();
        assert_eq!(img.registry(), Some("ghcr.io"));
        assert_eq!(img.name(), "org/repo");
        assert_eq!(img.tag(), Some("latest"));
    }

    #[test]
    fn registry_port_is_not_a_tag() {
        let img = ImageRef::parse("localhost:5000/api").unwrap();
        assert_eq!(img.registry(), Some("localhost:5000"));
        assert_eq!(img.name(), "api");
        assert_eq!(img.tag(), Some("latest"));
    }

    #[test]
    fn parse_full_reference() {
        let img = ImageRef::parse("ghcr.io/org/repo:v1@sha256:abc123").unwrap();
        assert_eq!(img.tag(), Some("v1"));
        assert_eq!(img.digest(), Some("sha256:abc123"));
        assert_eq!(img.to_string(), "ghcr.io/org/repo:v1@sha256:abc123");
    }

    #[test]
    fn parse_rejects_empty_and_shell_characters() {
        assert!(matches!(ImageRef::parse(""), Err(ParseImageRefError::Empty)));
        assert!(matches!(
            ImageRef::parse("nginx;rm"),
            Err(ParseImageRefError::InvalidChar(';'))
        ));
    }

    #[test]
    fn configured_tag_replaces_the_default() {
        let img = ImageRef::from_repository_and_tag("ghcr.io/acme/api", Some("1.4.2")).unwrap();
        assert_eq!(img.to_string(), "ghcr.io/acme/api:1.4.2");
    }

    #[test]
    fn digest_tag_is_pinned_by_digest() {
        let img =
            ImageRef::from_repository_and_tag("ghcr.io/acme/api", Some("sha256-0a1b2c")).unwrap();
        assert_eq!(img.to_string(), "ghcr.io/acme/api@sha256:0a1b2c");
        assert!(img.tag().is_none());
    }

    #[test]
    fn with_tag_drops_the_digest() {
        let img = ImageRef::parse("ghcr.io/acme/api@sha256:abc").unwrap();
        assert_eq!(img.with_tag("pr-7").to_string(), "ghcr.io/acme/api:pr-7");
    }
}

mod commit_tests {
    use super::*;

    #[test]
    fn head_is_the_default() {
        assert_eq!(Commit::default(), Commit::Head);
        assert!(Commit::Head.is_head());
        assert_eq!(Commit::Head.tag(), "HEAD");
    }

    #[test]
    fn sha_is_normalized_to_lowercase() {
        let commit = Commit::sha("  ABCDEF1234  ").unwrap();
        assert_eq!(commit.as_sha(), Some("abcdef1234"));
        assert_eq!(commit.tag(), "abcdef1234");
    }

    #[test]
    fn sha_length_and_alphabet_are_checked() {
        assert!(matches!(Commit::sha(""), Err(CommitError::Empty)));
        assert!(matches!(
            Commit::sha("abc12"),
            Err(CommitError::InvalidSha(_))
        ));
        assert!(matches!(
            Commit::sha("not-a-sha"),
            Err(CommitError::InvalidSha(_))
        ));
        assert!(Commit::sha(&"a".repeat(41)).is_err());
    }

    #[test]
    fn from_str_accepts_head_in_any_case() {
        assert_eq!("HEAD".parse::<Commit>().unwrap(), Commit::Head);
        assert_eq!("head".parse::<Commit>().unwrap(), Commit::Head);
        assert_eq!(
            "deadbeef".parse::<Commit>().unwrap(),
            Commit::Sha("deadbeef".to_string())
        );
    }
}

mod id_tests {
    use super::*;

    #[test]
    fn generated_ids_are_unique() {
        let a = DeploymentUuid::generate();
        let b = DeploymentUuid::generate();
        assert_ne!(a, b);
        assert!(!a.as_str().is_empty());
    }

    #[test]
    fn ids_serialize_as_plain_strings() {
        let id = ApplicationUuid::new("app-1");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"app-1\"");
        let back: ApplicationUuid = serde_json::from_str("\"app-1\"").unwrap();
        assert_eq!(back, id);
    }
}

mod container_name_tests {
    use super::*;

    #[test]
    fn valid_names() {
        assert!(ContainerName::new("my-app-d3adb33f").is_ok());
        assert!(ContainerName::new("web_1.blue").is_ok());
    }

    #[test]
    fn invalid_names() {
        assert!(matches!(ContainerName::new(""), Err(ContainerNameError::Empty)));
        assert!(matches!(
            ContainerName::new("_app"),
            Err(ContainerNameError::InvalidStart)
        ));
        assert!(matches!(
            ContainerName::new("app name"),
            Err(ContainerNameError::InvalidChar(' '))
        ));
        assert!(matches!(
            ContainerName::new(&"a".repeat(129)),
            Err(ContainerNameError::TooLong)
        ));
    }
}
