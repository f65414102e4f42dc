// ABOUTME: Remote builder capability probing.
// ABOUTME: Decides between build arguments and secret mounts for build-time variables.

use std::fmt;

/// Prints the engine version, e.g. `24.0.7`.
pub const VERSION_PROBE: &str = "docker version --format '{{.Server.Version}}'";
/// Succeeds only when BuildKit's buildx plugin is installed.
pub const BUILDX_PROBE: &str = "docker buildx version";

/// First engine release with BuildKit secret mounts.
const SECRET_MOUNT_MIN_VERSION: (u32, u32) = (18, 9);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BuilderCapabilities {
    pub version: Option<(u32, u32)>,
    pub buildx: bool,
}

impl BuilderCapabilities {
    /// Interpret the two probe outputs. Unparseable versions count as unknown.
    pub fn from_probe(version_output: Option<&str>, buildx_available: bool) -> Self {
        Self {
            version: version_output.and_then(parse_version),
            buildx: buildx_available,
        }
    }

    pub fn supports_secret_mounts(&self) -> bool {
        self.buildx
            && self
                .version
                .is_some_and(|v| v >= SECRET_MOUNT_MIN_VERSION)
    }
}

fn parse_version(output: &str) -> Option<(u32, u32)> {
    let line = output.lines().next()?.trim().trim_start_matches('v');
    let mut parts = line.split('.');
    let major = parts.next()?.parse().ok()?;
    let minor: String = parts
        .next()?
        .chars()
        .take_while(|c| c.is_ascii_digit())
        .collect();
    Some((major, minor.parse().ok()?))
}

/// How build-time variables reach the build.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecretStrategy {
    /// `ARG` declarations plus `--build-arg`.
    BuildArgs,
    /// Per-instruction `--mount=type=secret`, never persisted to a layer.
    SecretMounts,
}

impl SecretStrategy {
    /// Secret mounts only when requested and the builder can do them.
    pub fn choose(requested: bool, capabilities: &BuilderCapabilities) -> (Self, Option<String>) {
        match (requested, capabilities.supports_secret_mounts()) {
            (false, _) => (SecretStrategy::BuildArgs, None),
            (true, true) => (SecretStrategy::SecretMounts, None),
            (true, false) => (
                SecretStrategy::BuildArgs,
                Some(format!(
                    "builder does not support secret mounts ({capabilities}); using build arguments"
                )),
            ),
        }
    }
}

impl fmt::Display for BuilderCapabilities {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.version {
            Some((major, minor)) => write!(f, "docker {major}.{minor}")?,
            None => f.write_str("docker version unknown")?,
        }
        if self.buildx {
            f.write_str(", buildx")
        } else {
            f.write_str(", no buildx")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn modern_engine_with_buildx_supports_mounts() {
        let caps = BuilderCapabilities::from_probe(Some("24.0.7\n"), true);
        assert_eq!(caps.version, Some((24, 0)));
        assert!(caps.supports_secret_mounts());
    }

    #[test]
    fn old_engine_or_missing_buildx_falls_back() {
        assert!(!BuilderCapabilities::from_probe(Some("18.06.1-ce"), true).supports_secret_mounts());
        assert!(BuilderCapabilities::from_probe(Some("18.09.0"), true).supports_secret_mounts());
        assert!(!BuilderCapabilities::from_probe(Some("26.1.0"), false).supports_secret_mounts());
        assert!(!BuilderCapabilities::from_probe(Some("garbage"), true).supports_secret_mounts());
        assert!(!BuilderCapabilities::from_probe(None, true).supports_secret_mounts());
    }

    #[test]
    fn fallback_explains_itself() {
        let caps = BuilderCapabilities::from_probe(Some("17.12.0"), true);
        let (strategy, warning) = SecretStrategy::choose(true, &caps);
        assert_eq!(strategy, SecretStrategy::BuildArgs);
        assert!(warning.unwrap().contains("docker 17.12"));

        let (strategy, warning) = SecretStrategy::choose(false, &caps);
        assert_eq!(strategy, SecretStrategy::BuildArgs);
        assert!(warning.is_none());
    }
}
