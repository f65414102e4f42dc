// ABOUTME: Rollout strategy selection from application and destination settings.
// ABOUTME: Zero-downtime unless a precondition forces stop-then-start.

use crate::build::BuildStrategy;
use crate::config::{ApplicationConfig, Topology};

/// How the new version replaces the old one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RolloutStrategy {
    /// Start the new container alongside the old one, retire the old one once healthy.
    ZeroDowntime,
    /// Stop the old container first; brief downtime.
    StopThenStart { reason: &'static str },
    /// `docker compose up` of a user compose file; compose replaces services itself.
    ComposeUp,
    /// `docker stack deploy`; the orchestrator handles replacement.
    Swarm,
}

impl RolloutStrategy {
    pub fn for_run(
        app: &ApplicationConfig,
        topology: Topology,
        build: BuildStrategy,
        pull_request_id: u32,
    ) -> Self {
        if topology == Topology::Swarm {
            return RolloutStrategy::Swarm;
        }
        if build == BuildStrategy::Compose {
            return RolloutStrategy::ComposeUp;
        }

        let reason = if !app.ports_mappings.is_empty() {
            Some("host port bindings")
        } else if app.consistent_container_name || app.custom_container_name.is_some() {
            Some("fixed container name")
        } else if pull_request_id != 0 {
            Some("pull request deployment")
        } else if app.static_ip.is_some() {
            Some("static IP assignment")
        } else {
            None
        };

        match reason {
            Some(reason) => RolloutStrategy::StopThenStart { reason },
            None => RolloutStrategy::ZeroDowntime,
        }
    }

    pub fn is_zero_downtime(&self) -> bool {
        matches!(self, RolloutStrategy::ZeroDowntime)
    }
}

/// Name of the container a run starts.
///
/// Unique per deployment unless a fixed name is configured; previews get one
/// stable name per pull request.
pub fn container_name(
    app: &ApplicationConfig,
    deployment: &str,
    pull_request_id: u32,
) -> String {
    if pull_request_id != 0 {
        return format!("{}-pr-{pull_request_id}", app.uuid);
    }
    if let Some(custom) = app.custom_container_name.as_deref().filter(|c| !c.is_empty()) {
        return custom.to_string();
    }
    if app.consistent_container_name {
        return app.uuid.to_string();
    }
    let suffix: String = deployment.chars().take(8).collect();
    format!("{}-{suffix}", app.uuid)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn app() -> ApplicationConfig {
        ApplicationConfig::template()
    }

    #[test]
    fn zero_downtime_by_default() {
        let strategy =
            RolloutStrategy::for_run(&app(), Topology::Standalone, BuildStrategy::Nixpacks, 0);
        assert!(strategy.is_zero_downtime());
    }

    #[test]
    fn host_ports_force_stop_then_start() {
        let mut app = app();
        app.ports_mappings = vec!["8080:3000".to_string()];
        assert_eq!(
            RolloutStrategy::for_run(&app, Topology::Standalone, BuildStrategy::Dockerfile, 0),
            RolloutStrategy::StopThenStart {
                reason: "host port bindings"
            }
        );
    }

    #[test]
    fn every_precondition_is_checked() {
        let mut fixed = app();
        fixed.consistent_container_name = true;
        let mut ip = app();
        ip.static_ip = Some("10.0.9.9".to_string());

        for (app, pr) in [(fixed, 0), (app(), 4), (ip, 0)] {
            let strategy =
                RolloutStrategy::for_run(&app, Topology::Standalone, BuildStrategy::Static, pr);
            assert!(!strategy.is_zero_downtime());
        }
    }

    #[test]
    fn swarm_and_compose_have_their_own_paths() {
        assert_eq!(
            RolloutStrategy::for_run(&app(), Topology::Swarm, BuildStrategy::Compose, 0),
            RolloutStrategy::Swarm
        );
        assert_eq!(
            RolloutStrategy::for_run(&app(), Topology::Standalone, BuildStrategy::Compose, 0),
            RolloutStrategy::ComposeUp
        );
    }

    #[test]
    fn container_names() {
        let mut app = app();
        assert_eq!(container_name(&app, "0123456789abcdef", 0), "my-app-01234567");
        assert_eq!(container_name(&app, "0123456789abcdef", 12), "my-app-pr-12");
        app.consistent_container_name = true;
        assert_eq!(container_name(&app, "0123456789abcdef", 0), "my-app");
        app.custom_container_name = Some("api".to_string());
        assert_eq!(container_name(&app, "0123456789abcdef", 0), "api");
    }
}
