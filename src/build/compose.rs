// ABOUTME: Compose descriptor generation for the deployed container.
// ABOUTME: Single-service files for built images, and platform decoration of user compose files.

use serde::Serialize;
use serde_yaml::{Mapping, Value};
use std::collections::BTreeMap;
use std::time::Duration;

use crate::config::{ApplicationConfig, ServerConfig};

use super::BuildContext;
use super::labels::all_labels;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComposeFile {
    pub services: BTreeMap<String, ComposeService>,
    pub networks: BTreeMap<String, ComposeNetwork>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComposeService {
    pub image: String,
    pub container_name: String,
    pub restart: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub env_file: Vec<String>,
    pub labels: BTreeMap<String, String>,
    pub networks: BTreeMap<String, ServiceNetwork>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub expose: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub ports: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub healthcheck: Option<ComposeHealthcheck>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mem_limit: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cpus: Option<String>,
    pub stop_grace_period: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ServiceNetwork {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ipv4_address: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub aliases: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComposeNetwork {
    pub external: bool,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComposeHealthcheck {
    pub test: Vec<String>,
    pub interval: String,
    pub timeout: String,
    pub retries: u32,
    pub start_period: String,
}

fn seconds(d: Duration) -> String {
    format!("{}s", d.as_secs())
}

fn external_network(server: &ServerConfig) -> BTreeMap<String, ComposeNetwork> {
    BTreeMap::from([(
        server.network.clone(),
        ComposeNetwork {
            external: true,
            name: server.network.clone(),
        },
    )])
}

/// Descriptor for a single built or pulled image.
///
/// `custom_healthcheck` means the image defines its own HEALTHCHECK, which
/// then takes precedence over the configured probe.
pub fn generate(
    app: &ApplicationConfig,
    ctx: &BuildContext,
    image: &str,
    custom_healthcheck: bool,
) -> ComposeFile {
    let server = &ctx.deploy_server;
    let healthcheck = (app.healthcheck.enabled && !custom_healthcheck).then(|| ComposeHealthcheck {
        test: vec![
            "CMD-SHELL".to_string(),
            app.healthcheck.probe_command(app.exposed_port()),
        ],
        interval: seconds(app.healthcheck.interval),
        timeout: seconds(app.healthcheck.timeout),
        retries: app.healthcheck.retries,
        start_period: seconds(app.healthcheck.start_period),
    });

    let network = ServiceNetwork {
        ipv4_address: app.static_ip.clone(),
        aliases: vec![app.uuid.to_string()],
    };

    let service = ComposeService {
        image: image.to_string(),
        container_name: ctx.container_name.clone(),
        restart: app.restart.to_string(),
        env_file: vec![".env".to_string()],
        labels: all_labels(app, server.proxy, ctx.deployment.as_str(), ctx.pull_request_id),
        networks: BTreeMap::from([(server.network.clone(), network)]),
        expose: app.ports_exposes.iter().map(u16::to_string).collect(),
        ports: app.ports_mappings.clone(),
        healthcheck,
        mem_limit: app.limits.memory.clone(),
        cpus: app.limits.cpus.clone(),
        stop_grace_period: seconds(app.stop.timeout),
    };

    ComposeFile {
        services: BTreeMap::from([(app.uuid.to_string(), service)]),
        networks: external_network(server),
    }
}

impl ComposeFile {
    pub fn to_yaml(&self) -> Result<String, serde_yaml::Error> {
        serde_yaml::to_string(self)
    }
}

/// Attach platform labels, the destination network, and the env file to every
/// service of a user compose file.
pub fn decorate_user_compose(
    original: &str,
    app: &ApplicationConfig,
    ctx: &BuildContext,
) -> Result<String, serde_yaml::Error> {
    let mut doc: Value = serde_yaml::from_str(original)?;
    let server = &ctx.deploy_server;
    let labels = all_labels(app, server.proxy, ctx.deployment.as_str(), ctx.pull_request_id);

    if let Some(services) = doc.get_mut("services").and_then(Value::as_mapping_mut) {
        for (_, service) in services.iter_mut() {
            let Some(service) = service.as_mapping_mut() else {
                continue;
            };
            merge_labels(service, &labels);
            attach_network(service, &server.network);
            attach_env_file(service);
        }
    }

    let root = doc.as_mapping_mut().ok_or_else(|| {
        <serde_yaml::Error as serde::de::Error>::custom("compose file must be a mapping")
    })?;
    let networks = root
        .entry(Value::from("networks"))
        .or_insert_with(|| Value::Mapping(Mapping::new()));
    if let Some(networks) = networks.as_mapping_mut() {
        let mut external = Mapping::new();
        external.insert(Value::from("external"), Value::from(true));
        external.insert(Value::from("name"), Value::from(server.network.clone()));
        networks.insert(Value::from(server.network.clone()), Value::Mapping(external));
    }

    serde_yaml::to_string(&doc)
}

fn merge_labels(service: &mut Mapping, labels: &BTreeMap<String, String>) {
    let entry = service
        .entry(Value::from("labels"))
        .or_insert_with(|| Value::Mapping(Mapping::new()));
    match entry {
        Value::Sequence(list) => {
            for (key, value) in labels {
                let prefix = format!("{key}=");
                let present = list
                    .iter()
                    .any(|l| l.as_str().is_some_and(|s| s.starts_with(&prefix)));
                if !present {
                    list.push(Value::from(format!("{key}={value}")));
                }
            }
        }
        Value::Mapping(map) => {
            for (key, value) in labels {
                let key = Value::from(key.clone());
                if !map.contains_key(&key) {
                    map.insert(key, Value::from(value.clone()));
                }
            }
        }
        other => {
            *other = Value::Mapping(
                labels
                    .iter()
                    .map(|(k, v)| (Value::from(k.clone()), Value::from(v.clone())))
                    .collect(),
            );
        }
    }
}

fn attach_network(service: &mut Mapping, network: &str) {
    let entry = service
        .entry(Value::from("networks"))
        .or_insert_with(|| Value::Sequence(Vec::new()));
    match entry {
        Value::Sequence(list) => {
            if !list.iter().any(|n| n.as_str() == Some(network)) {
                list.push(Value::from(network));
            }
        }
        Value::Mapping(map) => {
            let key = Value::from(network);
            if !map.contains_key(&key) {
                map.insert(key, Value::Null);
            }
        }
        other => *other = Value::Sequence(vec![Value::from(network)]),
    }
}

/// The runtime `.env` is written after the build, so the entry is marked
/// optional for `docker compose build` to load the project without it.
fn attach_env_file(service: &mut Mapping) {
    let entry = service
        .entry(Value::from("env_file"))
        .or_insert_with(|| Value::Sequence(Vec::new()));
    let replacement = match entry {
        Value::Sequence(list) => {
            if !list.iter().any(references_runtime_env) {
                list.push(optional_runtime_env());
            }
            None
        }
        Value::String(existing) => {
            let existing = Value::from(existing.clone());
            if references_runtime_env(&existing) {
                Some(Value::Sequence(vec![existing]))
            } else {
                Some(Value::Sequence(vec![existing, optional_runtime_env()]))
            }
        }
        _ => Some(Value::Sequence(vec![optional_runtime_env()])),
    };
    if let Some(value) = replacement {
        *entry = value;
    }
}

fn references_runtime_env(entry: &Value) -> bool {
    match entry {
        Value::String(path) => path == ".env",
        Value::Mapping(map) => map
            .get("path")
            .and_then(Value::as_str)
            .is_some_and(|path| path == ".env"),
        _ => false,
    }
}

fn optional_runtime_env() -> Value {
    let mut entry = Mapping::new();
    entry.insert(Value::from("path"), Value::from(".env"));
    entry.insert(Value::from("required"), Value::from(false));
    Value::Mapping(entry)
}
