use std::time::Duration;

use async_trait::async_trait;
use log::debug;
use reqwest::{Client, Url};

use super::RouteTable;
use crate::error::{Error, Result};
use crate::types::RouteRecord;

const ROUTERS_PATH: &str = "/api/http/routers";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Reads HTTP routers from the Traefik API.
pub struct TraefikClient {
    routers_url: Url,
    client: Client,
}

impl TraefikClient {
    pub fn new(base: &str) -> Result<Self> {
        let routers_url = Url::parse(&format!("{}{}", base.trim_end_matches('/'), ROUTERS_PATH))
            .map_err(|e| Error::InvalidConfig(format!("traefik url '{}': {}", base, e)))?;
        let client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            routers_url,
            client,
        })
    }
}

#[async_trait]
impl RouteTable for TraefikClient {
    async fn routers(&self) -> Result<Vec<RouteRecord>> {
        debug!("Fetching routers from {}", self.routers_url);
        let response = self.client.get(self.routers_url.clone()).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::RouteTable {
                status: status.as_u16(),
            });
        }

        let body = response.text().await?;
        let payload: serde_json::Value = serde_json::from_str(&body)
            .map_err(|e| Error::RouteTablePayload(format!("{}: {}", e, body)))?;

        let serde_json::Value::Array(items) = payload else {
            return Err(Error::RouteTablePayload(payload.to_string()));
        };

        // Routers without a string `service` are not ours to resolve.
        Ok(items
            .into_iter()
            .filter_map(|item| serde_json::from_value(item).ok())
            .collect())
    }
}
