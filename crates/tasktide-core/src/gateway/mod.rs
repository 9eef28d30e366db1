//! Persistence backends behind one interface.
//!
//! The store talks to a [`TaskBackend`] and never knows whether tasks live on
//! a remote record service or in a JSON document on disk. The implementation
//! is chosen once, when the backend is opened from configuration.

pub mod local;
pub mod remote;

use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use tracing::info;

use crate::config::{BackendKind, Config};
use crate::error::Result;
use crate::task::{NewTask, Task, TaskId};

pub use local::LocalGateway;
pub use remote::{RemoteGateway, RemoteSettings};

#[async_trait]
pub trait TaskBackend: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &'static str;

    /// Every task, ordered by ascending due date.
    async fn list(&self) -> Result<Vec<Task>>;

    /// `Ok(None)` when the id is unknown; errors are reserved for real failures.
    async fn get(&self, id: &TaskId) -> Result<Option<Task>>;

    /// Persists a new pending task and returns it with its assigned id.
    async fn create(&self, task: &NewTask) -> Result<Task>;

    /// Persists every mutable field of `task`, keyed by its id.
    async fn update(&self, task: &Task) -> Result<Task>;

    async fn delete(&self, id: &TaskId) -> Result<()>;
}

/// Stable so tasks sharing a due date keep the order the backend gave them.
pub fn sort_by_due_date(tasks: &mut [Task]) {
    tasks.sort_by_key(|task| task.due_date);
}

#[tracing::instrument(skip(cfg))]
pub fn open_backend(cfg: &Config) -> anyhow::Result<Arc<dyn TaskBackend>> {
    let kind = cfg.backend_kind()?;
    info!(backend = ?kind, "opening task backend");

    match kind {
        BackendKind::Local => {
            let dir = crate::config::resolve_data_dir(cfg)?;
            let gateway = LocalGateway::open(&dir)
                .with_context(|| format!("failed to open task document in {}", dir.display()))?;
            Ok(Arc::new(gateway))
        }
        BackendKind::Remote => {
            let settings = RemoteSettings::from_config(cfg)?;
            let gateway =
                RemoteGateway::new(settings).context("failed to build remote task gateway")?;
            Ok(Arc::new(gateway))
        }
    }
}
