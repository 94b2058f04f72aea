use figment::{
    providers::{Env, Format, Json, Serialized, Toml, Yaml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{Error, Result};

pub const DEFAULT_CONFIG_PATH: &str = "config/config.yml";
pub const DEFAULT_ICON_DIR: &str = "public/icons";
pub const DEFAULT_ICON_SOURCE: &str =
    "https://raw.githubusercontent.com/homarr-labs/dashboard-icons/refs/heads/main";

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub apps: Vec<AppConfig>,
    /// Container names that never show up on the dashboard.
    #[serde(default)]
    pub ignore: Vec<String>,
    #[serde(default)]
    pub traefik: TraefikConfig,
    #[serde(default)]
    pub icons: IconConfig,
    #[serde(default)]
    pub docker: DockerConfig,
}

/// A dashboard entry declared by hand, either standalone or overriding a container.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct AppConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub container: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request: Option<RequestConfig>,
}

/// HTTP probe settings. Its presence switches an app to HTTP status checks.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct RequestConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_codes: Option<Vec<u16>>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct TraefikConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct IconConfig {
    pub dir: String,
    pub source: String,
}

impl Default for IconConfig {
    fn default() -> Self {
        Self {
            dir: DEFAULT_ICON_DIR.into(),
            source: DEFAULT_ICON_SOURCE.into(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct DockerConfig {
    /// `unix:///path/to/socket` or `tcp://host:port`; falls back to `DOCKER_HOST`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
}

impl Config {
    /// Layered load: defaults, then the config file (YAML, or TOML/JSON by
    /// extension), then `PORTDECK_` environment variables.
    ///
    /// A missing file is not an error; the dashboard then shows discovered
    /// containers only.
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let figment = Figment::from(Serialized::defaults(Config::default()));
        let figment = match path.extension().and_then(|e| e.to_str()) {
            Some("toml") => figment.merge(Toml::file(path)),
            Some("json") => figment.merge(Json::file(path)),
            _ => figment.merge(Yaml::file(path)),
        };

        let config: Config = figment
            .merge(Env::prefixed("PORTDECK_").split("__").ignore(&["config"]))
            .extract()
            .map_err(|e| anyhow::anyhow!("Failed to load configuration: {}", e))?;

        config.validate()?;
        Ok(config)
    }

    /// Catches entries no discovery run could make sense of.
    pub fn validate(&self) -> Result<()> {
        for (index, app) in self.apps.iter().enumerate() {
            if app.container.as_deref().is_some_and(|c| c.trim().is_empty()) {
                return Err(Error::InvalidConfig(format!(
                    "apps[{}].container must not be empty",
                    index
                )));
            }

            let Some(request) = &app.request else {
                continue;
            };
            if request.method.as_deref().is_some_and(|m| m.trim().is_empty()) {
                return Err(Error::InvalidConfig(format!(
                    "apps[{}].request.method must not be empty",
                    index
                )));
            }
            if let Some(code) = request
                .status_codes
                .iter()
                .flatten()
                .find(|code| !(100..=599).contains(*code))
            {
                return Err(Error::InvalidConfig(format!(
                    "apps[{}].request.status_codes contains invalid status {}",
                    index, code
                )));
            }
        }
        Ok(())
    }

    pub fn is_ignored(&self, container: &str) -> bool {
        self.ignore.iter().any(|name| name == container)
    }

    pub fn app_for_container(&self, container: &str) -> Option<&AppConfig> {
        self.apps
            .iter()
            .find(|app| app.container.as_deref() == Some(container))
    }
}
