//! Errors that abort a discovery or status run.
//!
//! Anything that means "we cannot know the truth" (bad configuration, the
//! container runtime or the route table being gone) ends up here. Failures that
//! only concern one app (a probe timing out, an icon that cannot be fetched) are
//! absorbed where they happen and never become an [`Error`].

use thiserror::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum Error {
    /// A configured app references a container that the runtime does not know.
    #[error("configured app \"{0}\" not found among containers")]
    UnknownContainer(String),

    /// A config-only app has neither a display name nor a container to derive one from.
    #[error("configured app #{index} needs a `name` or a `container`")]
    MissingName { index: usize },

    /// A config-only app has no URL.
    #[error("configured app \"{name}\" needs a `url`")]
    MissingUrl { name: String },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// The route table endpoint answered with a non-success status.
    #[error("route table returned {status}")]
    RouteTable { status: u16 },

    /// The route table endpoint answered with something that is not a list of routers.
    #[error("unexpected route table response: {0}")]
    RouteTablePayload(String),

    #[error("container runtime unavailable: {0}")]
    Runtime(#[source] Box<dyn std::error::Error + Send + Sync>),

    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),
}

impl From<bollard::errors::Error> for Error {
    fn from(e: bollard::errors::Error) -> Self {
        Error::Runtime(Box::new(e))
    }
}
