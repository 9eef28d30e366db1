//! The authoritative task collection.
//!
//! Mutations never patch local state: each one goes to the backend and, on
//! success, re-reads the whole collection. Observers see every status change
//! (`Loading`, `Ready`, `Failed`) with a full snapshot.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::NaiveDate;
use parking_lot::{Mutex, RwLock};
use tracing::{debug, info, instrument, warn};

use crate::error::{Error, Result};
use crate::gateway::TaskBackend;
use crate::task::{NewTask, Status, Task, TaskId};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LoadStatus {
    #[default]
    Idle,
    Loading,
    Ready,
    Failed,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct StoreSnapshot {
    pub status: LoadStatus,
    pub tasks: Vec<Task>,
    /// Message from the most recent failed refresh; cleared by the next success.
    pub error: Option<String>,
}

impl StoreSnapshot {
    pub fn is_loading(&self) -> bool {
        self.status == LoadStatus::Loading
    }

    pub fn find(&self, id: &TaskId) -> Option<&Task> {
        self.tasks.iter().find(|task| &task.id == id)
    }
}

/// Result of a mutation that reached the backend.
///
/// `SavedNotRefreshed` means the write landed but the follow-up read failed,
/// so the visible collection may not show it yet.
#[derive(Debug, Clone, PartialEq)]
pub enum Mutation<T> {
    Refreshed(T),
    SavedNotRefreshed { value: T, refresh_error: String },
}

impl<T> Mutation<T> {
    pub fn value(&self) -> &T {
        match self {
            Self::Refreshed(value) | Self::SavedNotRefreshed { value, .. } => value,
        }
    }

    pub fn into_value(self) -> T {
        match self {
            Self::Refreshed(value) | Self::SavedNotRefreshed { value, .. } => value,
        }
    }

    pub fn is_refreshed(&self) -> bool {
        matches!(self, Self::Refreshed(_))
    }

    pub fn refresh_error(&self) -> Option<&str> {
        match self {
            Self::Refreshed(_) => None,
            Self::SavedNotRefreshed { refresh_error, .. } => Some(refresh_error),
        }
    }
}

type Observer = Box<dyn Fn(&StoreSnapshot) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverId(u64);

pub struct TaskStore {
    backend: Arc<dyn TaskBackend>,
    state: RwLock<StoreSnapshot>,
    observers: Mutex<Vec<(ObserverId, Arc<Observer>)>>,
    next_observer: AtomicU64,
}

impl fmt::Debug for TaskStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskStore")
            .field("backend", &self.backend.name())
            .field("state", &*self.state.read())
            .finish_non_exhaustive()
    }
}

impl TaskStore {
    pub fn new(backend: Arc<dyn TaskBackend>) -> Self {
        Self {
            backend,
            state: RwLock::new(StoreSnapshot::default()),
            observers: Mutex::new(Vec::new()),
            next_observer: AtomicU64::new(1),
        }
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    pub fn snapshot(&self) -> StoreSnapshot {
        self.state.read().clone()
    }

    pub fn status(&self) -> LoadStatus {
        self.state.read().status
    }

    pub fn tasks(&self) -> Vec<Task> {
        self.state.read().tasks.clone()
    }

    pub fn find(&self, id: &TaskId) -> Option<Task> {
        self.state.read().find(id).cloned()
    }

    pub fn subscribe(&self, observer: impl Fn(&StoreSnapshot) + Send + Sync + 'static) -> ObserverId {
        let id = ObserverId(self.next_observer.fetch_add(1, Ordering::Relaxed));
        self.observers.lock().push((id, Arc::new(Box::new(observer))));
        id
    }

    pub fn unsubscribe(&self, id: ObserverId) {
        self.observers.lock().retain(|(existing, _)| *existing != id);
    }

    /// Observers run outside every store lock so they may read the store.
    fn transition(&self, apply: impl FnOnce(&mut StoreSnapshot)) {
        let snapshot = {
            let mut state = self.state.write();
            apply(&mut state);
            debug!(status = ?state.status, count = state.tasks.len(), "store transition");
            state.clone()
        };

        let observers: Vec<Arc<Observer>> = self
            .observers
            .lock()
            .iter()
            .map(|(_, observer)| Arc::clone(observer))
            .collect();
        for observer in observers {
            observer(&snapshot);
        }
    }

    /// Replaces the collection on success. On failure the last known tasks
    /// stay visible and only the status and error change.
    #[instrument(skip(self), fields(backend = self.backend.name()))]
    pub async fn refresh(&self) -> Result<()> {
        self.transition(|state| {
            state.status = LoadStatus::Loading;
            state.error = None;
        });

        match self.backend.list().await {
            Ok(tasks) => {
                debug!(count = tasks.len(), "refresh succeeded");
                self.transition(|state| {
                    state.status = LoadStatus::Ready;
                    state.tasks = tasks;
                    state.error = None;
                });
                Ok(())
            }
            Err(err) => {
                warn!(error = %err, "refresh failed; keeping last known tasks");
                let message = err.to_string();
                self.transition(|state| {
                    state.status = LoadStatus::Failed;
                    state.error = Some(message);
                });
                Err(err)
            }
        }
    }

    /// Passes straight through to the backend; the collection is untouched.
    #[instrument(skip(self), fields(id = %id))]
    pub async fn fetch(&self, id: &TaskId) -> Result<Option<Task>> {
        self.backend.get(id).await
    }

    async fn refresh_after<T>(&self, value: T) -> Mutation<T> {
        match self.refresh().await {
            Ok(()) => Mutation::Refreshed(value),
            Err(err) => Mutation::SavedNotRefreshed {
                value,
                refresh_error: err.to_string(),
            },
        }
    }

    #[instrument(skip(self, task), fields(title_len = task.title.len()))]
    pub async fn create(&self, task: &NewTask) -> Result<Mutation<Task>> {
        let created = self.backend.create(task).await?;
        info!(id = %created.id, "task created");
        Ok(self.refresh_after(created).await)
    }

    #[instrument(skip(self, task), fields(id = %task.id))]
    pub async fn update(&self, task: &Task) -> Result<Mutation<Task>> {
        let updated = self.backend.update(task).await?;
        info!(id = %updated.id, "task updated");
        Ok(self.refresh_after(updated).await)
    }

    #[instrument(skip(self), fields(id = %id))]
    pub async fn delete(&self, id: &TaskId) -> Result<Mutation<()>> {
        self.backend.delete(id).await?;
        info!(id = %id, "task deleted");
        Ok(self.refresh_after(()).await)
    }

    #[instrument(skip(self), fields(id = %id))]
    pub async fn set_status(&self, id: &TaskId, status: Status) -> Result<Mutation<Task>> {
        let mut task = self.find(id).ok_or_else(|| Error::TaskNotFound(id.clone()))?;
        task.status = status;
        self.update(&task).await
    }

    #[instrument(skip(self), fields(id = %id))]
    pub async fn set_due_date(&self, id: &TaskId, due_date: NaiveDate) -> Result<Mutation<Task>> {
        let mut task = self.find(id).ok_or_else(|| Error::TaskNotFound(id.clone()))?;
        task.due_date = due_date;
        self.update(&task).await
    }
}
