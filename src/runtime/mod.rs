use crate::error::Result;
use crate::types::ContainerRecord;
use async_trait::async_trait;

pub mod docker;
pub use docker::DockerRuntime;

#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Snapshot of the containers the runtime knows about.
    /// A transport failure aborts the discovery or status run that asked.
    async fn list_containers(&self, include_stopped: bool) -> Result<Vec<ContainerRecord>>;
}
