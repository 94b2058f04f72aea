//! Data structures shared by the discovery and status pipelines.
//!
//! [`ContainerRecord`] and [`RouteRecord`] are read-only snapshots of external
//! state taken at the start of a run.  [`App`] and [`AppStatus`] are produced
//! fresh by every run and serialised as-is for the rendering layer.

use std::collections::HashMap;

use serde::{Deserialize, Deserializer, Serialize};

/// One container as reported by the container runtime.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContainerRecord {
    /// Container name without the leading `/`.  Containers the runtime reports
    /// without any name are kept with `None` and skipped by discovery.
    pub name: Option<String>,
    pub labels: HashMap<String, String>,
    /// Full image reference, e.g. `ghcr.io/org/app:1.2`.
    pub image: Option<String>,
    /// Raw lifecycle state (`running`, `exited`, `paused`, ...).
    pub state: String,
    pub ports: Vec<PublishedPort>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PublishedPort {
    pub ip: Option<String>,
    pub private_port: u16,
    pub public_port: Option<u16>,
}

impl ContainerRecord {
    /// Bare image name: last path segment with tag and digest removed.
    ///
    /// `ghcr.io/linuxserver/jellyfin:10.8` becomes `jellyfin`.
    pub fn image_name(&self) -> Option<String> {
        let image = self.image.as_deref()?;
        let last = image.rsplit('/').next().unwrap_or(image);
        let name = last.split(['@', ':']).next().unwrap_or(last);
        (!name.is_empty()).then(|| name.to_string())
    }

    /// Direct address of the first published port, bypassing any reverse proxy.
    pub fn port_fallback(&self) -> Option<String> {
        let port = self.ports.iter().find(|p| p.public_port.is_some())?;
        let host = match port.ip.as_deref() {
            Some(ip) if !ip.is_empty() && ip != "0.0.0.0" && ip != "::" => ip,
            _ => "localhost",
        };
        let public = port.public_port?;
        if host.contains(':') {
            Some(format!("http://[{}]:{}", host, public))
        } else {
            Some(format!("http://{}:{}", host, public))
        }
    }
}

/// One HTTP router from the reverse proxy's routing table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct RouteRecord {
    /// Backend service, possibly qualified with a provider (`web@docker`).
    pub service: String,
    #[serde(default)]
    pub rule: String,
    /// Traefik reports TLS as an object; any non-null, non-false value counts.
    #[serde(default, deserialize_with = "truthy")]
    pub tls: bool,
}

fn truthy<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(match value {
        serde_json::Value::Null => false,
        serde_json::Value::Bool(b) => b,
        serde_json::Value::Number(n) => n.as_f64().is_some_and(|n| n != 0.0),
        serde_json::Value::String(s) => !s.is_empty(),
        serde_json::Value::Array(_) | serde_json::Value::Object(_) => true,
    })
}

/// A dashboard entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct App {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub container: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    pub name: String,
    /// Icon filename under the icon directory; `None` when nothing resolved.
    pub icon: Option<String>,
    pub url: String,
}

/// Liveness of one app at the time of a status run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AppStatus {
    pub id: String,
    pub state: String,
}

/// An app before the merge step; every field may still be missing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PartialApp {
    pub id: Option<String>,
    pub container: Option<String>,
    pub image: Option<String>,
    pub name: Option<String>,
    pub icon: Option<String>,
    pub url: Option<String>,
}

impl PartialApp {
    /// Field-by-field overlay; set fields of `over` win.
    pub fn overlay(self, over: PartialApp) -> PartialApp {
        PartialApp {
            id: over.id.or(self.id),
            container: over.container.or(self.container),
            image: over.image.or(self.image),
            name: over.name.or(self.name),
            icon: over.icon.or(self.icon),
            url: over.url.or(self.url),
        }
    }
}
