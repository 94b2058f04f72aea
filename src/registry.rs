//! Builds the dashboard's app list from containers and configured entries.
//!
//! Every container and every config entry becomes a [`PartialApp`] keyed by its
//! app id.  Entries sharing an id are overlaid (configuration wins field by
//! field) and only then turned into [`App`]s; anything still lacking a URL at
//! that point is left off the dashboard.

use std::cmp::Ordering;
use std::collections::HashMap;

use feruca::Collator;
use log::{debug, warn};

use crate::config::{AppConfig, Config};
use crate::error::{Error, Result};
use crate::routes::{best_url, RouteMap};
use crate::types::{App, ContainerRecord, PartialApp};

/// `home-assistant_dev` becomes `Home Assistant Dev`.
pub fn display_name(container: &str) -> String {
    container
        .split(['-', '_', ' '])
        .filter(|part| !part.is_empty())
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Lower-case ASCII id from a display name: `My NAS (old)` becomes `my-nas-old`.
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    for c in name.to_lowercase().chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c);
        } else if !slug.ends_with('-') {
            slug.push('-');
        }
    }
    slug.trim_matches('-').to_string()
}

/// Id a configured entry is known by: its container, else its name's slug.
pub fn config_app_id(entry: &AppConfig) -> Option<String> {
    entry
        .container
        .clone()
        .or_else(|| entry.name.as_deref().map(slugify))
        .filter(|id| !id.is_empty())
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value.as_ref().filter(|v| !v.trim().is_empty()).cloned()
}

pub fn discovered_partial(container: &ContainerRecord, routes: &RouteMap) -> Option<PartialApp> {
    let name = container.name.as_ref()?;
    let url = routes
        .get(name)
        .and_then(|candidates| best_url(candidates))
        .map(str::to_string);

    Some(PartialApp {
        id: Some(name.clone()),
        container: Some(name.clone()),
        image: container.image_name(),
        name: Some(display_name(name)),
        icon: None,
        url,
    })
}

pub fn configured_partial(entry: &AppConfig) -> PartialApp {
    PartialApp {
        id: config_app_id(entry),
        container: non_empty(&entry.container),
        image: None,
        name: non_empty(&entry.name),
        icon: non_empty(&entry.icon),
        url: non_empty(&entry.url),
    }
}

/// Combines what was discovered with what was configured for one id.
///
/// `None` when no URL is known, or no name or id can be worked out.
pub fn merge(discovered: Option<PartialApp>, configured: Option<PartialApp>) -> Option<App> {
    let partial = match (discovered, configured) {
        (Some(discovered), Some(configured)) => discovered.overlay(configured),
        (Some(partial), None) | (None, Some(partial)) => partial,
        (None, None) => return None,
    };

    let name = partial
        .name
        .or_else(|| partial.container.as_deref().map(display_name))
        .filter(|name| !name.is_empty())?;
    let id = partial
        .id
        .or_else(|| partial.container.clone())
        .unwrap_or_else(|| slugify(&name));
    if id.is_empty() {
        return None;
    }
    let url = partial.url.filter(|url| !url.is_empty())?;

    Some(App {
        id,
        container: partial.container,
        image: partial.image,
        name,
        icon: partial.icon,
        url,
    })
}

/// Orders apps by display name with the Unicode collation algorithm (CLDR
/// root), so accents and case sort the way people read them.  Exact text
/// breaks remaining ties.
pub fn sort_by_name(apps: &mut [App]) {
    let mut collator = Collator::default();
    apps.sort_by(|a, b| compare_names(&mut collator, &a.name, &b.name));
}

fn compare_names(collator: &mut Collator, a: &str, b: &str) -> Ordering {
    collator.collate(a, b).then_with(|| a.cmp(b))
}

/// Checks configured entries against the container inventory.
fn check_entries(config: &Config, containers: &[ContainerRecord]) -> Result<()> {
    for (index, entry) in config.apps.iter().enumerate() {
        match entry.container.as_deref() {
            Some(reference) => {
                let known = containers
                    .iter()
                    .any(|c| c.name.as_deref() == Some(reference));
                if !known {
                    return Err(Error::UnknownContainer(reference.to_string()));
                }
            }
            None => {
                let Some(name) = non_empty(&entry.name) else {
                    return Err(Error::MissingName { index });
                };
                if non_empty(&entry.url).is_none() {
                    return Err(Error::MissingUrl { name });
                }
            }
        }
    }
    Ok(())
}

/// The merged, sorted app list without icons resolved.
pub fn build_registry(
    config: &Config,
    containers: &[ContainerRecord],
    routes: &RouteMap,
) -> Result<Vec<App>> {
    check_entries(config, containers)?;

    let mut order: Vec<String> = Vec::new();
    let mut slots: HashMap<String, (Option<PartialApp>, Option<PartialApp>)> = HashMap::new();

    for container in containers {
        let Some(name) = container.name.as_deref() else {
            continue;
        };
        if config.is_ignored(name) {
            debug!("Ignoring container {}", name);
            continue;
        }
        if let Some(partial) = discovered_partial(container, routes) {
            order.push(name.to_string());
            slots.insert(name.to_string(), (Some(partial), None));
        }
    }

    for entry in &config.apps {
        let configured = configured_partial(entry);
        let Some(id) = configured.id.clone() else {
            continue;
        };

        let slot = slots.entry(id.clone()).or_insert_with(|| {
            order.push(id.clone());
            (None, None)
        });
        slot.1 = match slot.1.take() {
            Some(earlier) => {
                warn!("Multiple configured apps share id {}, later entry wins", id);
                Some(earlier.overlay(configured))
            }
            None => Some(configured),
        };
    }

    let mut apps: Vec<App> = order
        .into_iter()
        .filter_map(|id| {
            let (discovered, configured) = slots.remove(&id)?;
            let app = merge(discovered, configured);
            if app.is_none() {
                debug!("No URL for {}, leaving it off the dashboard", id);
            }
            app
        })
        .collect();

    sort_by_name(&mut apps);
    Ok(apps)
}
