// ABOUTME: Container labels: platform bookkeeping plus reverse proxy routing.
// ABOUTME: Traefik and Caddy labels are derived from the application's domains.

use std::collections::BTreeMap;

use crate::config::{ApplicationConfig, ProxyType};
use crate::env::preview_url;

pub const LABEL_MANAGED: &str = "skiff.managed";
pub const LABEL_APPLICATION: &str = "skiff.applicationId";
pub const LABEL_PULL_REQUEST: &str = "skiff.pullRequestId";
pub const LABEL_DEPLOYMENT: &str = "skiff.deploymentId";

/// Labels used to find this application's containers later.
pub fn platform_labels(
    app: &ApplicationConfig,
    deployment: &str,
    pull_request_id: u32,
) -> BTreeMap<String, String> {
    BTreeMap::from([
        (LABEL_MANAGED.to_string(), "true".to_string()),
        (LABEL_APPLICATION.to_string(), app.uuid.to_string()),
        (LABEL_PULL_REQUEST.to_string(), pull_request_id.to_string()),
        (LABEL_DEPLOYMENT.to_string(), deployment.to_string()),
    ])
}

struct Route<'a> {
    scheme: &'a str,
    host: &'a str,
    path: &'a str,
}

fn parse_route(url: &str) -> Route<'_> {
    let (scheme, rest) = url.split_once("://").unwrap_or(("http", url));
    let (host, path) = match rest.find('/') {
        Some(i) => (&rest[..i], &rest[i..]),
        None => (rest, ""),
    };
    Route { scheme, host, path }
}

/// Routing labels for the proxy in front of the destination.
pub fn proxy_labels(
    proxy: ProxyType,
    app: &ApplicationConfig,
    pull_request_id: u32,
) -> BTreeMap<String, String> {
    let mut labels = BTreeMap::new();
    let urls: Vec<String> = app
        .domains
        .iter()
        .map(|d| match pull_request_id {
            0 => d.clone(),
            pr => preview_url(d, pr),
        })
        .collect();
    if urls.is_empty() {
        return labels;
    }
    let port = app.exposed_port();

    match proxy {
        ProxyType::Traefik => {
            labels.insert("traefik.enable".to_string(), "true".to_string());
            for (i, url) in urls.iter().enumerate() {
                let route = parse_route(url);
                let router = match pull_request_id {
                    0 => format!("{}-{i}", app.uuid),
                    pr => format!("{}-pr-{pr}-{i}", app.uuid),
                };
                let mut rule = format!("Host(`{}`)", route.host);
                if !route.path.is_empty() && route.path != "/" {
                    rule.push_str(&format!(" && PathPrefix(`{}`)", route.path));
                }
                let prefix = format!("traefik.http.routers.{router}");
                labels.insert(format!("{prefix}.rule"), rule);
                labels.insert(format!("{prefix}.service"), router.clone());
                if route.scheme == "https" {
                    labels.insert(format!("{prefix}.entryPoints"), "https".to_string());
                    labels.insert(format!("{prefix}.tls"), "true".to_string());
                    labels.insert(
                        format!("{prefix}.tls.certresolver"),
                        "letsencrypt".to_string(),
                    );
                } else {
                    labels.insert(format!("{prefix}.entryPoints"), "http".to_string());
                }
                labels.insert(
                    format!("traefik.http.services.{router}.loadbalancer.server.port"),
                    port.to_string(),
                );
            }
        }
        ProxyType::Caddy => {
            for (i, url) in urls.iter().enumerate() {
                let route = parse_route(url);
                let address = format!("{}://{}", route.scheme, route.host);
                labels.insert(format!("caddy_{i}"), address);
                let handle = if route.path.is_empty() || route.path == "/" {
                    format!("caddy_{i}.reverse_proxy")
                } else {
                    format!("caddy_{i}.handle_path.{}*.reverse_proxy", route.path)
                };
                labels.insert(handle, format!("{{{{upstreams {port}}}}}"));
            }
        }
        ProxyType::None => {}
    }
    labels
}

/// Everything a container of this application carries. User labels win.
pub fn all_labels(
    app: &ApplicationConfig,
    proxy: ProxyType,
    deployment: &str,
    pull_request_id: u32,
) -> BTreeMap<String, String> {
    let mut labels = platform_labels(app, deployment, pull_request_id);
    labels.extend(proxy_labels(proxy, app, pull_request_id));
    labels.extend(app.labels.clone());
    labels
}
