//! End-to-end tests for the Dashboard facade with in-memory collaborators.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use portdeck::config::{AppConfig, Config, RequestConfig};
use portdeck::icons::{IconCatalog, IconLedger, IconResolver, IconUpdate};
use portdeck::routes::RouteTable;
use portdeck::runtime::ContainerRuntime;
use portdeck::status::HttpProber;
use portdeck::types::{ContainerRecord, RouteRecord};
use portdeck::{Dashboard, Error, Result};
use tempfile::TempDir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::mpsc;

struct StaticRuntime(Vec<ContainerRecord>);

#[async_trait]
impl ContainerRuntime for StaticRuntime {
    async fn list_containers(&self, include_stopped: bool) -> Result<Vec<ContainerRecord>> {
        assert!(include_stopped, "stopped containers must be listed too");
        Ok(self.0.clone())
    }
}

struct DownRuntime;

#[async_trait]
impl ContainerRuntime for DownRuntime {
    async fn list_containers(&self, _: bool) -> Result<Vec<ContainerRecord>> {
        Err(Error::Runtime("connection refused".into()))
    }
}

struct StaticRoutes(Vec<RouteRecord>);

#[async_trait]
impl RouteTable for StaticRoutes {
    async fn routers(&self) -> Result<Vec<RouteRecord>> {
        Ok(self.0.clone())
    }
}

struct DownRoutes;

#[async_trait]
impl RouteTable for DownRoutes {
    async fn routers(&self) -> Result<Vec<RouteRecord>> {
        Err(Error::RouteTablePayload("\"maintenance\"".into()))
    }
}

/// Hands out one container listing per call, in order.
struct SequenceRuntime(Mutex<VecDeque<Vec<ContainerRecord>>>);

#[async_trait]
impl ContainerRuntime for SequenceRuntime {
    async fn list_containers(&self, _: bool) -> Result<Vec<ContainerRecord>> {
        Ok(self.0.lock().unwrap().pop_front().unwrap_or_default())
    }
}

#[derive(Default)]
struct Catalog {
    files: HashMap<String, Vec<u8>>,
    delays: HashMap<String, Duration>,
    fetches: AtomicUsize,
}

#[async_trait]
impl IconCatalog for Catalog {
    async fn fetch(&self, _: &str, filename: &str) -> Result<Option<Vec<u8>>> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delays.get(filename) {
            tokio::time::sleep(*delay).await;
        }
        Ok(self.files.get(filename).cloned())
    }
}

fn container(name: &str, state: &str) -> ContainerRecord {
    ContainerRecord {
        name: Some(name.to_string()),
        image: Some(format!("{}:latest", name)),
        state: state.to_string(),
        ..Default::default()
    }
}

fn router(service: &str, rule: &str, tls: bool) -> RouteRecord {
    RouteRecord {
        service: service.to_string(),
        rule: rule.to_string(),
        tls,
    }
}

fn dashboard(
    config: Config,
    runtime: impl ContainerRuntime + 'static,
    routes: Option<Arc<dyn RouteTable>>,
    catalog: Arc<Catalog>,
    dir: &TempDir,
) -> Dashboard {
    let icons = IconResolver::new(dir.path(), catalog, IconLedger::new());
    Dashboard::new(
        config,
        Arc::new(runtime),
        routes,
        icons,
        HttpProber::new().unwrap(),
    )
}

/// Answers every request with `status` and closes the connection.  The
/// library's own mock server is compiled for unit tests only.
async fn status_server(status: u16) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        while let Ok((mut stream, _)) = listener.accept().await {
            tokio::spawn(async move {
                let mut buf = [0u8; 2048];
                let _ = stream.read(&mut buf).await;
                let response = format!(
                    "HTTP/1.1 {} Mock\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
                    status
                );
                let _ = stream.write_all(response.as_bytes()).await;
                let _ = stream.shutdown().await;
            });
        }
    });
    format!("http://{}", addr)
}

#[tokio::test]
async fn test_container_discovered_through_proxy_route() {
    let dir = tempfile::tempdir().unwrap();
    let routes = StaticRoutes(vec![router(
        "web-app@docker",
        "Host(`app.example.com`)",
        true,
    )]);
    let dashboard = dashboard(
        Config::default(),
        StaticRuntime(vec![container("web-app", "running")]),
        Some(Arc::new(routes)),
        Arc::new(Catalog::default()),
        &dir,
    );

    let apps = dashboard.discover_apps().await.unwrap();
    assert_eq!(apps.len(), 1);
    assert_eq!(apps[0].id, "web-app");
    assert_eq!(apps[0].url, "https://app.example.com");
    assert_eq!(apps[0].name, "Web App");
    assert_eq!(apps[0].icon, None);
}

#[tokio::test]
async fn test_public_host_beats_local_host() {
    let dir = tempfile::tempdir().unwrap();
    let routes = StaticRoutes(vec![router(
        "nas-secure@docker",
        "Host(`nas.local`) || Host(`nas.example.com`)",
        false,
    )]);
    let dashboard = dashboard(
        Config::default(),
        StaticRuntime(vec![container("nas", "running")]),
        Some(Arc::new(routes)),
        Arc::new(Catalog::default()),
        &dir,
    );

    let apps = dashboard.discover_apps().await.unwrap();
    assert_eq!(apps[0].url, "http://nas.example.com");
}

#[tokio::test]
async fn test_unmatched_routes_give_no_url() {
    let dir = tempfile::tempdir().unwrap();
    let routes = StaticRoutes(vec![
        router("api@docker", "Host(`api.example.com`)", true),
        router("dashboard@internal", "Host(`traefik.example.com`)", true),
    ]);
    let dashboard = dashboard(
        Config::default(),
        StaticRuntime(vec![container("web", "running")]),
        Some(Arc::new(routes)),
        Arc::new(Catalog::default()),
        &dir,
    );

    assert!(dashboard.discover_apps().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_config_and_containers_merge() {
    let dir = tempfile::tempdir().unwrap();
    let config = Config {
        apps: vec![
            AppConfig {
                container: Some("jellyfin".into()),
                name: Some("Movies".into()),
                ..Default::default()
            },
            AppConfig {
                name: Some("Router".into()),
                url: Some("http://192.168.1.1".into()),
                icon: Some("router.svg".into()),
                ..Default::default()
            },
        ],
        ignore: vec!["watchtower".into()],
        ..Default::default()
    };
    let routes = StaticRoutes(vec![
        router("jellyfin@docker", "Host(`tv.example.com`)", true),
        router("watchtower@docker", "Host(`wt.example.com`)", true),
    ]);
    let catalog = Arc::new(Catalog {
        files: HashMap::from([
            ("jellyfin.svg".to_string(), b"<svg/>".to_vec()),
            ("router.svg".to_string(), b"<svg/>".to_vec()),
        ]),
        ..Default::default()
    });
    let dashboard = dashboard(
        config,
        StaticRuntime(vec![
            container("jellyfin", "running"),
            container("watchtower", "running"),
        ]),
        Some(Arc::new(routes)),
        catalog,
        &dir,
    );

    let apps = dashboard.discover_apps().await.unwrap();
    let summary: Vec<(&str, &str, &str, Option<&str>)> = apps
        .iter()
        .map(|a| (a.id.as_str(), a.name.as_str(), a.url.as_str(), a.icon.as_deref()))
        .collect();
    assert_eq!(
        summary,
        vec![
            ("jellyfin", "Movies", "https://tv.example.com", Some("jellyfin.svg")),
            ("router", "Router", "http://192.168.1.1", Some("router.svg")),
        ]
    );
    assert!(dir.path().join("jellyfin.svg").is_file());
    assert!(dir.path().join("router.svg").is_file());
}

#[tokio::test]
async fn test_failed_icons_not_refetched_across_runs() {
    let dir = tempfile::tempdir().unwrap();
    let catalog = Arc::new(Catalog::default());
    let config = Config {
        apps: vec![AppConfig {
            name: Some("Printer".into()),
            url: Some("http://printer".into()),
            icon: Some("printer.png".into()),
            ..Default::default()
        }],
        ..Default::default()
    };
    let dashboard = dashboard(
        config,
        StaticRuntime(vec![]),
        None,
        Arc::clone(&catalog),
        &dir,
    );

    let first = dashboard.discover_apps().await.unwrap();
    let second = dashboard.discover_apps().await.unwrap();
    assert_eq!(first, second);
    assert_eq!(first[0].icon.as_deref(), Some("printer.png"));
    assert_eq!(catalog.fetches.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_configuration_errors_abort_discovery() {
    let dir = tempfile::tempdir().unwrap();
    let config = Config {
        apps: vec![AppConfig {
            container: Some("ghost".into()),
            url: Some("http://ghost".into()),
            ..Default::default()
        }],
        ..Default::default()
    };
    let dashboard = dashboard(
        config,
        StaticRuntime(vec![container("web", "running")]),
        None,
        Arc::new(Catalog::default()),
        &dir,
    );

    let err = dashboard.discover_apps().await.unwrap_err();
    assert_eq!(
        err.to_string(),
        "configured app \"ghost\" not found among containers"
    );
}

#[tokio::test]
async fn test_upstream_failures_abort_discovery() {
    let dir = tempfile::tempdir().unwrap();
    let no_runtime = dashboard(
        Config::default(),
        DownRuntime,
        None,
        Arc::new(Catalog::default()),
        &dir,
    );
    assert!(matches!(
        no_runtime.discover_apps().await,
        Err(Error::Runtime(_))
    ));
    assert!(matches!(
        no_runtime.get_statuses().await,
        Err(Error::Runtime(_))
    ));

    let no_routes = dashboard(
        Config::default(),
        StaticRuntime(vec![container("web", "running")]),
        Some(Arc::new(DownRoutes)),
        Arc::new(Catalog::default()),
        &dir,
    );
    assert!(matches!(
        no_routes.discover_apps().await,
        Err(Error::RouteTablePayload(_))
    ));
}

#[tokio::test]
async fn test_statuses_mix_container_state_and_probes() {
    let dir = tempfile::tempdir().unwrap();
    let router_url = status_server(401).await;
    let nas_url = status_server(401).await;
    let config = Config {
        apps: vec![
            AppConfig {
                name: Some("Router".into()),
                url: Some(router_url),
                request: Some(RequestConfig {
                    method: None,
                    status_codes: Some(vec![200, 401]),
                }),
                ..Default::default()
            },
            AppConfig {
                name: Some("NAS".into()),
                url: Some(nas_url),
                ..Default::default()
            },
        ],
        ..Default::default()
    };
    let dashboard = dashboard(
        config,
        StaticRuntime(vec![
            container("web", "running"),
            container("backup", "exited"),
        ]),
        None,
        Arc::new(Catalog::default()),
        &dir,
    );

    let statuses = dashboard.get_statuses().await.unwrap();
    let states: HashMap<&str, &str> = statuses
        .iter()
        .map(|s| (s.id.as_str(), s.state.as_str()))
        .collect();
    assert_eq!(statuses.len(), 4);
    assert_eq!(states["web"], "running");
    assert_eq!(states["backup"], "exited");
    assert_eq!(states["router"], "running");
    assert_eq!(states["nas"], "exited");
}

#[tokio::test]
async fn test_deferred_discovery_streams_icons() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("grafana.svg"), b"cached").unwrap();
    let catalog = Arc::new(Catalog {
        files: HashMap::from([("jellyfin.png".to_string(), b"png".to_vec())]),
        ..Default::default()
    });
    let routes = StaticRoutes(vec![
        router("grafana@docker", "Host(`grafana.example.com`)", true),
        router("jellyfin@docker", "Host(`tv.example.com`)", true),
        router("mystery@docker", "Host(`mystery.example.com`)", true),
    ]);
    let dashboard = dashboard(
        Config::default(),
        StaticRuntime(vec![
            container("grafana", "running"),
            container("jellyfin", "running"),
            container("mystery", "running"),
        ]),
        Some(Arc::new(routes)),
        catalog,
        &dir,
    );

    let (tx, mut rx) = mpsc::unbounded_channel();
    let done_tx = tx.clone();
    let _subscription = dashboard.subscribe_icons(
        move |update| {
            let _ = tx.send(Some(update.clone()));
        },
        move || {
            let _ = done_tx.send(None);
        },
    );

    let apps = dashboard.discover_apps_deferred().await.unwrap();
    let icons: Vec<Option<&str>> = apps.iter().map(|a| a.icon.as_deref()).collect();
    assert_eq!(icons, vec![Some("grafana.svg"), None, None]);

    let mut updates = Vec::new();
    loop {
        let event = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("icon stream finishes");
        match event {
            Some(Some(update)) => updates.push(update),
            _ => break,
        }
    }
    updates.sort_by(|a, b| a.id.cmp(&b.id));
    assert_eq!(
        updates,
        vec![
            IconUpdate {
                id: "grafana".into(),
                icon: "grafana.svg".into(),
            },
            IconUpdate {
                id: "jellyfin".into(),
                icon: "jellyfin.png".into(),
            },
        ]
    );
}

#[tokio::test]
async fn test_unsubscribed_client_gets_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let routes = StaticRoutes(vec![router("web@docker", "Host(`web.example.com`)", true)]);
    std::fs::write(dir.path().join("web.svg"), b"cached").unwrap();
    let dashboard = dashboard(
        Config::default(),
        StaticRuntime(vec![container("web", "running")]),
        Some(Arc::new(routes)),
        Arc::new(Catalog::default()),
        &dir,
    );

    let gone = Arc::new(Mutex::new(0usize));
    let counter = Arc::clone(&gone);
    let subscription = dashboard.subscribe_icons(
        move |_| {
            *counter.lock().unwrap() += 1;
        },
        || {},
    );
    subscription.unsubscribe();

    let (tx, mut rx) = mpsc::unbounded_channel();
    let _stays = dashboard.subscribe_icons(|_| {}, move || {
        let _ = tx.send(());
    });

    dashboard.discover_apps_deferred().await.unwrap();
    tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("icon stream finishes");
    assert_eq!(*gone.lock().unwrap(), 0);
}

#[tokio::test]
async fn test_overlapping_deferred_runs_deliver_all_updates() {
    let dir = tempfile::tempdir().unwrap();
    let catalog = Arc::new(Catalog {
        files: HashMap::from([
            ("slow.svg".to_string(), b"slow".to_vec()),
            ("fast.svg".to_string(), b"fast".to_vec()),
        ]),
        delays: HashMap::from([
            ("slow.svg".to_string(), Duration::from_millis(300)),
            ("fast.svg".to_string(), Duration::from_millis(10)),
        ]),
        ..Default::default()
    });
    let routes = StaticRoutes(vec![
        router("slow@docker", "Host(`slow.example.com`)", true),
        router("fast@docker", "Host(`fast.example.com`)", true),
    ]);
    let runtime = SequenceRuntime(Mutex::new(VecDeque::from([
        vec![container("slow", "running")],
        vec![container("fast", "running")],
    ])));
    let dashboard = dashboard(
        Config::default(),
        runtime,
        Some(Arc::new(routes)),
        catalog,
        &dir,
    );

    let (tx, mut rx) = mpsc::unbounded_channel();
    let done_tx = tx.clone();
    let _subscription = dashboard.subscribe_icons(
        move |update| {
            let _ = tx.send(format!("update {}", update.id));
        },
        move || {
            let _ = done_tx.send("done".to_string());
        },
    );

    dashboard.discover_apps_deferred().await.unwrap();
    dashboard.discover_apps_deferred().await.unwrap();

    let mut events = Vec::new();
    while let Ok(Some(event)) = tokio::time::timeout(Duration::from_secs(5), rx.recv()).await {
        let finished = event == "done";
        events.push(event);
        if finished {
            break;
        }
    }

    assert_eq!(events.last().map(String::as_str), Some("done"));
    assert_eq!(events.iter().filter(|e| *e == "done").count(), 1);
    assert!(events.contains(&"update slow".to_string()));
    assert!(events.contains(&"update fast".to_string()));
}
