//! Entry points used by the serving layer.

use std::sync::Arc;

use futures_util::future::join_all;
use log::info;

use crate::config::Config;
use crate::error::Result;
use crate::icons::{HttpCatalog, IconHub, IconLedger, IconResolver, IconUpdate, Subscription};
use crate::registry::build_registry;
use crate::routes::{resolve_routes, RouteTable, TraefikClient};
use crate::runtime::{ContainerRuntime, DockerRuntime};
use crate::status::{collect_statuses, HttpProber};
use crate::types::{App, AppStatus, ContainerRecord};

pub struct Dashboard {
    config: Config,
    runtime: Arc<dyn ContainerRuntime>,
    routes: Option<Arc<dyn RouteTable>>,
    icons: Arc<IconResolver>,
    prober: HttpProber,
    hub: IconHub,
}

impl Dashboard {
    /// Wires up Docker, Traefik (when configured) and the remote icon catalog.
    pub fn from_config(config: Config) -> Result<Self> {
        let runtime = DockerRuntime::connect(config.docker.host.as_deref())?;
        let routes = match config.traefik.url.as_deref() {
            Some(url) => Some(Arc::new(TraefikClient::new(url)?) as Arc<dyn RouteTable>),
            None => None,
        };
        let catalog = HttpCatalog::new(&config.icons.source)?;
        let icons = IconResolver::new(&config.icons.dir, Arc::new(catalog), IconLedger::new());

        Ok(Self::new(
            config,
            Arc::new(runtime),
            routes,
            icons,
            HttpProber::new()?,
        ))
    }

    pub fn new(
        config: Config,
        runtime: Arc<dyn ContainerRuntime>,
        routes: Option<Arc<dyn RouteTable>>,
        icons: IconResolver,
        prober: HttpProber,
    ) -> Self {
        Self {
            config,
            runtime,
            routes,
            icons: Arc::new(icons),
            prober,
            hub: IconHub::new(),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Apps without icons, straight from containers, routes and configuration.
    async fn registry(&self) -> Result<Vec<App>> {
        let containers = self.runtime.list_containers(true).await?;
        let routes = resolve_routes(self.routes.as_deref(), &containers).await?;
        let apps = build_registry(&self.config, &containers, &routes)?;
        info!(
            "Discovered {} apps from {} containers and {} configured entries",
            apps.len(),
            containers.len(),
            self.config.apps.len()
        );
        Ok(apps)
    }

    /// The full app list with icons resolved, sorted by display name.
    pub async fn discover_apps(&self) -> Result<Vec<App>> {
        let apps = self.registry().await?;
        Ok(self.icons.assign(apps).await)
    }

    /// Returns at once with explicit or already cached icons only; the rest is
    /// resolved in the background and pushed to icon subscribers.
    pub async fn discover_apps_deferred(&self) -> Result<Vec<App>> {
        let apps = self.registry().await?;

        let cached = join_all(apps.iter().map(|app| self.icons.resolve_cached(app))).await;
        let listed = apps
            .iter()
            .cloned()
            .zip(cached)
            .map(|(app, icon)| App { icon, ..app })
            .collect();

        let icons = Arc::clone(&self.icons);
        let run = self.hub.begin();
        tokio::spawn(async move {
            icons.stream(&apps, &run).await;
        });

        Ok(listed)
    }

    pub async fn get_statuses(&self) -> Result<Vec<AppStatus>> {
        let containers: Vec<ContainerRecord> = self.runtime.list_containers(true).await?;
        Ok(collect_statuses(&self.config, &containers, &self.prober).await)
    }

    /// Icon progress of deferred discoveries.  The terminal event comes when
    /// no deferred run is left in flight.  Dropping the handle unsubscribes.
    pub fn subscribe_icons<U, D>(&self, on_update: U, on_done: D) -> Subscription
    where
        U: Fn(&IconUpdate) + Send + Sync + 'static,
        D: Fn() + Send + Sync + 'static,
    {
        self.hub.subscribe(on_update, on_done)
    }
}
