//! Icon resolution and the on-disk icon cache.
//!
//! Icons live as plain files in one directory and are referenced by filename
//! only.  Missing files are fetched from a remote catalog at most once per
//! filename for the lifetime of the [`IconLedger`], so icons that simply do not
//! exist upstream are not requested again on every refresh.

use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures_util::future::join_all;
use log::{debug, info, warn};
use parking_lot::Mutex;
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::OnceCell;

use crate::types::App;

pub mod catalog;
pub mod hub;

pub use catalog::{HttpCatalog, IconCatalog};
pub use hub::{IconHub, IconRun, IconUpdate, Subscription};

/// Tried in this order for every candidate name.
pub const ICON_EXTENSIONS: &[&str] = &["svg", "webp", "png"];

/// Outcome of the single remote attempt for one filename, shared with every
/// resolution that asks for it while or after it runs.
type Attempt = Arc<OnceCell<bool>>;

/// Filenames a remote fetch was already attempted for.
#[derive(Debug, Clone, Default)]
pub struct IconLedger {
    attempts: Arc<Mutex<HashMap<String, Attempt>>>,
}

impl IconLedger {
    pub fn new() -> Self {
        Self::default()
    }

    fn attempt(&self, filename: &str) -> Attempt {
        Arc::clone(self.attempts.lock().entry(filename.to_string()).or_default())
    }

    pub fn contains(&self, filename: &str) -> bool {
        self.attempts.lock().contains_key(filename)
    }

    pub fn len(&self) -> usize {
        self.attempts.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

pub struct IconResolver {
    dir: PathBuf,
    catalog: Arc<dyn IconCatalog>,
    ledger: IconLedger,
}

impl IconResolver {
    pub fn new(dir: impl Into<PathBuf>, catalog: Arc<dyn IconCatalog>, ledger: IconLedger) -> Self {
        Self {
            dir: dir.into(),
            catalog,
            ledger,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn ledger(&self) -> &IconLedger {
        &self.ledger
    }

    /// Icon filename for `app`.
    ///
    /// An explicit icon is always kept, fetched or not.  Container apps without
    /// one try names derived from image and container, local files first.
    pub async fn resolve(&self, app: &App) -> Option<String> {
        if let Some(icon) = &app.icon {
            self.ensure(icon).await;
            return Some(icon.clone());
        }

        let candidates = candidates(app);
        if let Some(local) = self.find_local(&candidates).await {
            return Some(local);
        }

        for filename in candidates {
            if self.fetch(&filename).await {
                return Some(filename);
            }
        }

        debug!("No icon found for {}", app.id);
        None
    }

    /// Like [`IconResolver::resolve`] but never touches the network.
    pub async fn resolve_cached(&self, app: &App) -> Option<String> {
        if app.icon.is_some() {
            return app.icon.clone();
        }
        self.find_local(&candidates(app)).await
    }

    /// Makes sure `filename` exists locally, downloading it if needed.
    pub async fn ensure(&self, filename: &str) -> bool {
        self.exists_locally(filename).await || self.fetch(filename).await
    }

    /// Resolves every app concurrently and fills in `icon`.
    pub async fn assign(&self, apps: Vec<App>) -> Vec<App> {
        let icons = join_all(apps.iter().map(|app| self.resolve(app))).await;
        apps.into_iter()
            .zip(icons)
            .map(|(app, icon)| App { icon, ..app })
            .collect()
    }

    /// Resolves every app concurrently, publishing each icon to `run` as it
    /// lands.  Subscribers are told the run is over when `run` is dropped.
    pub async fn stream(&self, apps: &[App], run: &IconRun) {
        join_all(apps.iter().map(|app| async move {
            if let Some(icon) = self.resolve(app).await {
                run.publish(&IconUpdate {
                    id: app.id.clone(),
                    icon,
                });
            }
        }))
        .await;
    }

    async fn find_local(&self, candidates: &[String]) -> Option<String> {
        for filename in candidates {
            if self.exists_locally(filename).await {
                return Some(filename.clone());
            }
        }
        None
    }

    async fn exists_locally(&self, filename: &str) -> bool {
        if !is_plain_filename(filename) {
            return false;
        }
        fs::metadata(self.dir.join(filename))
            .await
            .map(|meta| meta.is_file())
            .unwrap_or(false)
    }

    /// One remote attempt per filename and ledger.  Callers arriving while
    /// the attempt runs wait for its outcome; later ones get it at once.
    async fn fetch(&self, filename: &str) -> bool {
        let Some(extension) = extension(filename) else {
            warn!("Icon \"{}\" has no usable extension, not fetching", filename);
            return false;
        };

        let attempt = self.ledger.attempt(filename);
        let mut downloaded_here = false;
        let fetched = *attempt
            .get_or_init(|| {
                downloaded_here = true;
                self.download(extension, filename)
            })
            .await;

        if downloaded_here {
            return fetched;
        }
        debug!("Icon {} already attempted, reusing outcome", filename);
        fetched && self.exists_locally(filename).await
    }

    async fn download(&self, extension: &str, filename: &str) -> bool {
        match self.catalog.fetch(extension, filename).await {
            Ok(Some(bytes)) => self.write(filename, &bytes).await,
            Ok(None) => false,
            Err(e) => {
                warn!("Failed to download icon {}: {}", filename, e);
                false
            }
        }
    }

    async fn write(&self, filename: &str, bytes: &[u8]) -> bool {
        if let Err(e) = fs::create_dir_all(&self.dir).await {
            warn!("Cannot create icon directory {:?}: {}", self.dir, e);
            return false;
        }

        let path = self.dir.join(filename);
        let mut file = match OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await
        {
            Ok(file) => file,
            // another resolution finished first
            Err(e) if e.kind() == ErrorKind::AlreadyExists => return true,
            Err(e) => {
                warn!("Cannot create icon {:?}: {}", path, e);
                return false;
            }
        };

        let written = match file.write_all(bytes).await {
            Ok(()) => file.flush().await,
            Err(e) => Err(e),
        };
        if let Err(e) = written {
            warn!("Failed to write icon {:?}: {}", path, e);
            drop(file);
            let _ = fs::remove_file(&path).await;
            return false;
        }

        info!("Downloaded icon {}", filename);
        true
    }
}

/// Candidate filenames for a container app: image name, then container name,
/// each with every extension.
pub fn candidates(app: &App) -> Vec<String> {
    if app.container.is_none() {
        return Vec::new();
    }

    let mut keys: Vec<String> = Vec::new();
    for key in [app.image.as_deref(), app.container.as_deref()]
        .into_iter()
        .flatten()
        .map(str::to_lowercase)
    {
        if !key.is_empty() && !keys.contains(&key) {
            keys.push(key);
        }
    }

    keys.iter()
        .flat_map(|key| ICON_EXTENSIONS.iter().map(move |ext| format!("{}.{}", key, ext)))
        .collect()
}

/// No path components, so the file stays inside the icon directory.
fn is_plain_filename(filename: &str) -> bool {
    !filename.is_empty()
        && !filename.contains(['/', '\\'])
        && filename != "."
        && filename != ".."
}

fn extension(filename: &str) -> Option<&str> {
    if !is_plain_filename(filename) {
        return None;
    }
    let (stem, ext) = filename.rsplit_once('.')?;
    (!stem.is_empty() && !ext.is_empty()).then_some(ext)
}
