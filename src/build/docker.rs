// ABOUTME: Docker command lines for building, probing, and publishing images.
// ABOUTME: Build-time values reach docker through a sourced env file, never the command line.

use crate::env::{SECRETS_HASH_VAR, SecretStrategy};
use crate::executor::shell_quote;
use crate::types::ImageRef;

/// One `docker build` invocation.
#[derive(Debug, Clone)]
pub struct DockerBuild<'a> {
    pub dockerfile: &'a str,
    pub context: &'a str,
    pub image: &'a ImageRef,
    pub env_file: &'a str,
    pub strategy: SecretStrategy,
    /// Build-time keys, without the secrets hash.
    pub keys: &'a [String],
    pub target: Option<&'a str>,
}

impl DockerBuild<'_> {
    pub fn render(&self) -> String {
        let mut cmd = format!("set -a && . {} && set +a && ", shell_quote(self.env_file));
        match self.strategy {
            SecretStrategy::BuildArgs => {
                cmd.push_str("docker build --network host");
                for key in self.keys {
                    cmd.push_str(&format!(" --build-arg {key}"));
                }
            }
            SecretStrategy::SecretMounts => {
                cmd.push_str("DOCKER_BUILDKIT=1 docker buildx build --load --network host");
                for key in self.keys {
                    cmd.push_str(&format!(" --secret id={key},env={key}"));
                }
            }
        }
        cmd.push_str(&format!(" --build-arg {SECRETS_HASH_VAR}"));
        if let Some(target) = self.target {
            cmd.push_str(&format!(" --target {}", shell_quote(target)));
        }
        cmd.push_str(&format!(
            " -f {} -t {} {}",
            shell_quote(self.dockerfile),
            shell_quote(&self.image.to_string()),
            shell_quote(self.context)
        ));
        cmd
    }
}

/// Prints the image id when the image exists locally, nothing otherwise.
pub fn local_image_probe(image: &ImageRef) -> String {
    format!("docker images -q {} 2>/dev/null", shell_quote(&image.to_string()))
}

/// Succeeds when the registry knows the image.
pub fn registry_image_probe(image: &ImageRef) -> String {
    format!(
        "docker manifest inspect {} >/dev/null 2>&1 && echo found || true",
        shell_quote(&image.to_string())
    )
}

/// Prints the image's HEALTHCHECK as JSON, `null` when it has none.
pub fn healthcheck_probe(image: &ImageRef) -> String {
    format!(
        "docker image inspect --format '{{{{json .Config.Healthcheck}}}}' {} 2>/dev/null || true",
        shell_quote(&image.to_string())
    )
}

/// Whether [`healthcheck_probe`] output describes an active HEALTHCHECK.
pub fn declares_healthcheck(output: &str) -> bool {
    let Ok(value) = serde_json::from_str::<serde_json::Value>(output.trim()) else {
        return false;
    };
    match value.get("Test").and_then(serde_json::Value::as_array) {
        Some(test) => test
            .first()
            .and_then(serde_json::Value::as_str)
            .is_some_and(|kind| kind != "NONE"),
        None => false,
    }
}

pub fn pull(image: &ImageRef) -> String {
    format!("docker pull {}", shell_quote(&image.to_string()))
}

pub fn push(image: &ImageRef) -> String {
    format!("docker push {}", shell_quote(&image.to_string()))
}

pub fn tag(source: &ImageRef, target: &ImageRef) -> String {
    format!(
        "docker tag {} {}",
        shell_quote(&source.to_string()),
        shell_quote(&target.to_string())
    )
}

pub fn remove_image(image: &ImageRef) -> String {
    format!("docker rmi -f {} >/dev/null 2>&1 || true", shell_quote(&image.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build(strategy: SecretStrategy) -> String {
        let image = ImageRef::parse("my-app:abc1234").unwrap();
        let keys = vec!["API_URL".to_string(), "TOKEN".to_string()];
        DockerBuild {
            dockerfile: "/artifacts/d1/Dockerfile",
            context: "/artifacts/d1",
            image: &image,
            env_file: "/artifacts/d1-build.env",
            strategy,
            keys: &keys,
            target: None,
        }
        .render()
    }

    #[test]
    fn build_args_reference_keys_only() {
        let cmd = build(SecretStrategy::BuildArgs);
        assert!(cmd.starts_with("set -a && . '/artifacts/d1-build.env' && set +a && docker build"));
        assert!(cmd.contains("--build-arg API_URL --build-arg TOKEN --build-arg SKIFF_BUILD_SECRETS_HASH"));
        assert!(cmd.ends_with("-f '/artifacts/d1/Dockerfile' -t 'my-app:abc1234' '/artifacts/d1'"));
    }

    #[test]
    fn secret_mounts_use_buildx() {
        let cmd = build(SecretStrategy::SecretMounts);
        assert!(cmd.contains("docker buildx build --load"));
        assert!(cmd.contains("--secret id=TOKEN,env=TOKEN"));
        assert!(!cmd.contains("--build-arg TOKEN"));
        assert!(cmd.contains("--build-arg SKIFF_BUILD_SECRETS_HASH"));
    }

    #[test]
    fn inspected_healthcheck() {
        assert!(declares_healthcheck(
            r#"{"Test":["CMD-SHELL","curl -f http://localhost/ || exit 1"],"Interval":30000000000}"#
        ));
        assert!(!declares_healthcheck("null"));
        assert!(!declares_healthcheck(""));
        assert!(!declares_healthcheck(r#"{"Test":["NONE"]}"#));

        let probe = healthcheck_probe(&ImageRef::parse("my-app:abc1234").unwrap());
        assert!(probe.contains("'{{json .Config.Healthcheck}}' 'my-app:abc1234'"));
    }
}
