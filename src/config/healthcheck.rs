// ABOUTME: Container health check configuration.
// ABOUTME: HTTP probe parameters plus the polling budget used during rollout.

use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthcheckConfig {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default = "default_scheme")]
    pub scheme: String,

    #[serde(default = "default_host")]
    pub host: String,

    /// Probed port; defaults to the first exposed port.
    #[serde(default)]
    pub port: Option<u16>,

    #[serde(default = "default_path")]
    pub path: String,

    #[serde(default = "default_interval", with = "humantime_serde")]
    pub interval: Duration,

    #[serde(default = "default_timeout", with = "humantime_serde")]
    pub timeout: Duration,

    #[serde(default = "default_retries")]
    pub retries: u32,

    #[serde(default = "default_start_period", with = "humantime_serde")]
    pub start_period: Duration,
}

fn default_scheme() -> String {
    "http".to_string()
}

fn default_host() -> String {
    "localhost".to_string()
}

fn default_path() -> String {
    "/".to_string()
}

fn default_interval() -> Duration {
    Duration::from_secs(5)
}

fn default_timeout() -> Duration {
    Duration::from_secs(5)
}

fn default_retries() -> u32 {
    10
}

fn default_start_period() -> Duration {
    Duration::from_secs(5)
}

impl Default for HealthcheckConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            scheme: default_scheme(),
            host: default_host(),
            port: None,
            path: default_path(),
            interval: default_interval(),
            timeout: default_timeout(),
            retries: default_retries(),
            start_period: default_start_period(),
        }
    }
}

impl HealthcheckConfig {
    /// In-container probe command for the compose `healthcheck.test`.
    pub fn probe_command(&self, fallback_port: u16) -> String {
        let url = format!(
            "{}://{}:{}{}",
            self.scheme,
            self.host,
            self.port.unwrap_or(fallback_port),
            self.path
        );
        format!(
            "curl -s -X GET -f {url} > /dev/null || wget -q -O- {url} > /dev/null || exit 1"
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn probe_uses_fallback_port() {
        let hc = HealthcheckConfig {
            path: "/health".to_string(),
            ..Default::default()
        };
        let cmd = hc.probe_command(3000);
        assert!(cmd.contains("http://localhost:3000/health"));
        assert!(cmd.ends_with("exit 1"));
    }

    #[test]
    fn durations_parse_humantime() {
        let hc: HealthcheckConfig =
            serde_yaml::from_str("enabled: true\ninterval: 2s\nstart_period: 1m\n").unwrap();
        assert_eq!(hc.interval, Duration::from_secs(2));
        assert_eq!(hc.start_period, Duration::from_secs(60));
        assert_eq!(hc.retries, 10);
    }
}
