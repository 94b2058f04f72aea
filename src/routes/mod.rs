//! Route resolution.
//!
//! Reads the reverse proxy's HTTP router table and works out which container
//! each router points at, yielding the external URLs a container is reachable
//! under.  Proxy service names rarely equal container names (compose adds
//! project prefixes, users add suffixes), so matching goes through an alias
//! index and a chain of fallbacks.

use std::collections::{HashMap, HashSet};
use std::sync::LazyLock;

use async_trait::async_trait;
use log::{debug, info};
use regex::Regex;

use crate::error::Result;
use crate::types::{ContainerRecord, RouteRecord};

pub mod traefik;
pub use traefik::TraefikClient;

const COMPOSE_SERVICE_LABEL: &str = "com.docker.compose.service";
const STACK_SERVICE_LABEL: &str = "com.docker.stack.service.name";
const TRAEFIK_SERVICE_PREFIX: &str = "traefik.http.services.";

/// Hostname suffixes of names that only resolve on the local network.
const LOCAL_SUFFIXES: &[&str] = &[".local", ".lan", ".home.arpa"];

static HOST_RULE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\bHost\(([^)]*)\)").expect("valid host rule regex"));

/// Source of the proxy's routing table.
#[async_trait]
pub trait RouteTable: Send + Sync {
    /// Every HTTP router the proxy currently knows.
    ///
    /// Errors when the table cannot be read; discovery must not continue on a
    /// partial routing picture.
    async fn routers(&self) -> Result<Vec<RouteRecord>>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteInfo {
    pub url: String,
    pub host: String,
}

/// Container name to its candidate routes, in first-seen order.
pub type RouteMap = HashMap<String, Vec<RouteInfo>>;

/// Every name a container may be referred to by, mapped to its real name.
#[derive(Debug, Default)]
pub struct ServiceIndex {
    aliases: HashMap<String, String>,
}

impl ServiceIndex {
    pub fn build(containers: &[ContainerRecord]) -> Self {
        let mut aliases = HashMap::new();

        for container in containers {
            let Some(name) = container.name.as_deref() else {
                continue;
            };

            let labels = &container.labels;
            let traefik_services = labels
                .keys()
                .filter_map(|label| label.strip_prefix(TRAEFIK_SERVICE_PREFIX))
                .filter_map(|rest| rest.split('.').next());

            let keys = std::iter::once(name)
                .chain(labels.get(COMPOSE_SERVICE_LABEL).map(String::as_str))
                .chain(labels.get(STACK_SERVICE_LABEL).map(String::as_str))
                .chain(traefik_services);

            for key in keys.filter(|k| !k.is_empty()) {
                aliases.insert(key.to_string(), name.to_string());
            }
        }

        Self { aliases }
    }

    pub fn get(&self, alias: &str) -> Option<&str> {
        self.aliases.get(alias).map(String::as_str)
    }

    /// Container backing the proxy service `service`, if any strategy finds one.
    pub fn resolve(&self, service: &str) -> Option<String> {
        STRATEGIES
            .iter()
            .find_map(|strategy| strategy(service, self))
    }
}

type Strategy = fn(&str, &ServiceIndex) -> Option<String>;

/// Tried in order; the first match wins.
const STRATEGIES: &[Strategy] = &[exact_match, split_match];

fn exact_match(service: &str, index: &ServiceIndex) -> Option<String> {
    index.get(service).map(str::to_string)
}

/// Drops `-` separated segments from either end, one more per round, so that
/// `media-jellyfin` finds `jellyfin` and `jellyfin-web` finds `jellyfin`.
fn split_match(service: &str, index: &ServiceIndex) -> Option<String> {
    let parts: Vec<&str> = service.split('-').filter(|p| !p.is_empty()).collect();

    for i in 1..parts.len() {
        let left = parts[i..].join("-");
        if let Some(name) = index.get(&left) {
            return Some(name.to_string());
        }

        let right = parts[..parts.len() - i].join("-");
        if let Some(name) = index.get(&right) {
            return Some(name.to_string());
        }
    }

    None
}

/// Service name without the `@provider` qualifier.
pub fn service_name(service: &str) -> &str {
    service.split('@').next().unwrap_or(service)
}

/// Hostnames from every `Host(...)` predicate of a router rule.
pub fn parse_hosts(rule: &str) -> Vec<String> {
    HOST_RULE
        .captures_iter(rule)
        .filter_map(|caps| caps.get(1))
        .flat_map(|args| args.as_str().split(','))
        .map(|host| {
            host.chars()
                .filter(|c| !matches!(c, '`' | '\'' | '"') && !c.is_whitespace())
                .collect::<String>()
        })
        .filter(|host| !host.is_empty())
        .collect()
}

fn candidate_url(host: &str, tls: bool) -> String {
    if host.contains("://") {
        host.to_string()
    } else if tls {
        format!("https://{}", host)
    } else {
        format!("http://{}", host)
    }
}

pub fn is_local_host(host: &str) -> bool {
    let host = host.split_once("://").map_or(host, |(_, rest)| rest);
    let host = host.split(['/', ':']).next().unwrap_or(host);
    let host = host.trim_end_matches('.').to_ascii_lowercase();
    LOCAL_SUFFIXES.iter().any(|suffix| host.ends_with(suffix))
}

/// Candidate URLs best first: local-network names lose to public ones,
/// otherwise first-seen order is kept.
pub fn ranked_urls(routes: &[RouteInfo]) -> Vec<&str> {
    let mut ranked: Vec<&RouteInfo> = routes.iter().collect();
    ranked.sort_by_key(|route| is_local_host(&route.host));
    ranked.into_iter().map(|route| route.url.as_str()).collect()
}

pub fn best_url(routes: &[RouteInfo]) -> Option<&str> {
    ranked_urls(routes).into_iter().next()
}

/// Groups routers by the container they resolve to.  Routers that match no
/// container, or carry no host, are dropped.
pub fn collect_routes(routers: &[RouteRecord], index: &ServiceIndex) -> RouteMap {
    let mut routes: RouteMap = HashMap::new();

    for router in routers {
        let service = service_name(&router.service);
        let Some(container) = index.resolve(service) else {
            debug!("No container for proxy service {}", router.service);
            continue;
        };

        let hosts = parse_hosts(&router.rule);
        if hosts.is_empty() {
            continue;
        }

        let existing = routes.entry(container).or_default();
        let mut seen: HashSet<String> = existing.iter().map(|r| r.host.clone()).collect();

        for host in hosts {
            if seen.insert(host.clone()) {
                existing.push(RouteInfo {
                    url: candidate_url(&host, router.tls),
                    host,
                });
            }
        }
    }

    routes
}

/// Candidate routes per container.  Without a route table nothing is fetched
/// and the map is empty.
pub async fn resolve_routes(
    table: Option<&dyn RouteTable>,
    containers: &[ContainerRecord],
) -> Result<RouteMap> {
    let Some(table) = table else {
        return Ok(RouteMap::new());
    };

    let routers = table.routers().await?;
    let index = ServiceIndex::build(containers);
    let routes = collect_routes(&routers, &index);
    info!(
        "Found {} candidate hosts for {} containers in {} proxy routers",
        routes.values().map(Vec::len).sum::<usize>(),
        routes.len(),
        routers.len()
    );
    Ok(routes)
}
