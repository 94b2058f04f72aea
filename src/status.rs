//! Liveness per app.
//!
//! Container apps report their runtime state verbatim.  Apps with probe
//! settings, and configured apps without a container, are checked with one HTTP
//! request each; whatever goes wrong with that request only ever turns into
//! `exited` for that app.

use std::collections::HashMap;
use std::time::Duration;

use futures_util::future::join_all;
use log::{debug, warn};
use reqwest::redirect::Policy;
use reqwest::{Client, Method};

use crate::config::{AppConfig, Config, RequestConfig};
use crate::error::Result;
use crate::registry::config_app_id;
use crate::types::{AppStatus, ContainerRecord};

pub const PROBE_TIMEOUT: Duration = Duration::from_secs(5);
pub const RUNNING: &str = "running";
pub const EXITED: &str = "exited";
const DEFAULT_METHOD: &str = "HEAD";
const MAX_REDIRECTS: usize = 10;

/// `running` if the status is acceptable: listed in `codes` when given,
/// otherwise any 2xx.
pub fn classify(status: u16, codes: Option<&[u16]>) -> &'static str {
    let ok = match codes {
        Some(codes) => codes.contains(&status),
        None => (200..300).contains(&status),
    };
    if ok {
        RUNNING
    } else {
        EXITED
    }
}

pub struct HttpProber {
    client: Client,
}

impl HttpProber {
    pub fn new() -> Result<Self> {
        Self::with_timeout(PROBE_TIMEOUT)
    }

    pub fn with_timeout(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .redirect(Policy::limited(MAX_REDIRECTS))
            .build()?;
        Ok(Self { client })
    }

    pub async fn probe(&self, url: &str, request: Option<&RequestConfig>) -> &'static str {
        let method = request
            .and_then(|r| r.method.as_deref())
            .unwrap_or(DEFAULT_METHOD)
            .to_ascii_uppercase();
        let Ok(method) = Method::from_bytes(method.as_bytes()) else {
            warn!("Invalid probe method {:?} for {}", method, url);
            return EXITED;
        };

        match self.client.request(method, url).send().await {
            Ok(response) => {
                let status = response.status().as_u16();
                let codes = request.and_then(|r| r.status_codes.as_deref());
                let state = classify(status, codes);
                debug!("Probe {} answered {} -> {}", url, status, state);
                state
            }
            Err(e) => {
                debug!("Probe {} failed: {}", url, e);
                EXITED
            }
        }
    }
}

enum Check<'a> {
    Probe {
        id: String,
        url: String,
        request: Option<&'a RequestConfig>,
    },
    State {
        id: String,
        state: String,
    },
}

/// How the status of a configured entry is found, if it is one that needs
/// more than its container's state.
fn plan_entry<'a>(entry: &'a AppConfig, containers: &[ContainerRecord]) -> Option<Check<'a>> {
    if entry.request.is_none() && (entry.container.is_some() || entry.url.is_none()) {
        return None;
    }
    let id = config_app_id(entry)?;

    let container = entry
        .container
        .as_deref()
        .and_then(|name| containers.iter().find(|c| c.name.as_deref() == Some(name)));

    let url = entry
        .url
        .clone()
        .filter(|url| !url.is_empty())
        .or_else(|| container.and_then(ContainerRecord::port_fallback));

    match (url, container) {
        (Some(url), _) => Some(Check::Probe {
            id,
            url,
            request: entry.request.as_ref(),
        }),
        (None, Some(container)) => Some(Check::State {
            id,
            state: container.state.clone(),
        }),
        (None, None) => None,
    }
}

/// One status per app id.  Configured checks replace the container state of
/// the same id.
pub async fn collect_statuses(
    config: &Config,
    containers: &[ContainerRecord],
    prober: &HttpProber,
) -> Vec<AppStatus> {
    let mut statuses: Vec<AppStatus> = Vec::new();
    let mut positions: HashMap<String, usize> = HashMap::new();
    let mut upsert = |status: AppStatus| match positions.get(&status.id).copied() {
        Some(at) => statuses[at] = status,
        None => {
            positions.insert(status.id.clone(), statuses.len());
            statuses.push(status);
        }
    };

    for container in containers {
        let Some(name) = container.name.as_deref() else {
            continue;
        };
        if config.is_ignored(name) {
            continue;
        }
        let probed = config
            .app_for_container(name)
            .is_some_and(|entry| entry.request.is_some());
        if !probed {
            upsert(AppStatus {
                id: name.to_string(),
                state: container.state.clone(),
            });
        }
    }

    let checks: Vec<Check<'_>> = config
        .apps
        .iter()
        .filter_map(|entry| plan_entry(entry, containers))
        .collect();

    let results = join_all(checks.into_iter().map(|check| async move {
        match check {
            Check::Probe { id, url, request } => AppStatus {
                state: prober.probe(&url, request).await.to_string(),
                id,
            },
            Check::State { id, state } => AppStatus { id, state },
        }
    }))
    .await;

    for status in results {
        upsert(status);
    }
    statuses
}
