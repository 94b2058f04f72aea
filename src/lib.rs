//! portdeck - service discovery and health aggregation for a home dashboard
//!
//! Builds the list of apps shown on the dashboard and reports whether they are up:
//! - Lists containers from the Docker runtime
//! - Resolves external URLs from the Traefik router table
//! - Merges in hand-configured apps and overrides
//! - Finds icons locally or in a remote catalog, fetching each at most once
//! - Reports liveness from container state or an HTTP probe

pub mod config;
pub mod dashboard;
pub mod error;
pub mod icons;
pub mod registry;
pub mod routes;
pub mod runtime;
pub mod status;
pub mod types;

#[cfg(test)]
mod test_support;

pub use dashboard::Dashboard;
pub use error::{Error, Result};
