use std::time::Duration;

use async_trait::async_trait;
use log::debug;
use reqwest::Client;

use crate::error::Result;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// Remote icon collection laid out as `<base>/<extension>/<filename>`.
#[async_trait]
pub trait IconCatalog: Send + Sync {
    /// Raw icon bytes, or `None` when the catalog does not have the file.
    async fn fetch(&self, extension: &str, filename: &str) -> Result<Option<Vec<u8>>>;
}

pub struct HttpCatalog {
    base: String,
    client: Client,
}

impl HttpCatalog {
    pub fn new(base: &str) -> Result<Self> {
        let client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            base: base.trim_end_matches('/').to_string(),
            client,
        })
    }
}

#[async_trait]
impl IconCatalog for HttpCatalog {
    async fn fetch(&self, extension: &str, filename: &str) -> Result<Option<Vec<u8>>> {
        let url = format!("{}/{}/{}", self.base, extension, filename);
        let response = self.client.get(&url).send().await?;

        if !response.status().is_success() {
            debug!("Icon catalog has no {} ({})", url, response.status());
            return Ok(None);
        }

        Ok(Some(response.bytes().await?.to_vec()))
    }
}
