use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::{debug, info, instrument};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::task::{NewTask, Task, TaskId};

use super::{TaskBackend, sort_by_due_date};

pub const DOCUMENT_FILE: &str = "tasks.json";

#[derive(Debug, Default, Serialize, Deserialize)]
struct TaskDocument {
    #[serde(default)]
    tasks: Vec<Task>,
}

/// Durable fallback: the whole collection lives in one JSON document that is
/// read once on open and rewritten after every mutation.
#[derive(Debug)]
pub struct LocalGateway {
    path: PathBuf,
    tasks: Mutex<Vec<Task>>,
}

impl LocalGateway {
    #[instrument(skip(data_dir))]
    pub fn open(data_dir: &Path) -> Result<Self> {
        fs::create_dir_all(data_dir)?;
        let path = data_dir.join(DOCUMENT_FILE);

        let tasks = if path.exists() {
            let raw = fs::read_to_string(&path)?;
            if raw.trim().is_empty() {
                Vec::new()
            } else {
                serde_json::from_str::<TaskDocument>(&raw)?.tasks
            }
        } else {
            Vec::new()
        };

        info!(
            document = %path.display(),
            count = tasks.len(),
            "opened local task document"
        );

        Ok(Self {
            path,
            tasks: Mutex::new(tasks),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Runs `change` on a copy and only adopts it once the copy is on disk.
    fn commit<T>(&self, change: impl FnOnce(&mut Vec<Task>) -> Result<T>) -> Result<T> {
        let mut tasks = self.tasks.lock();
        let mut next = tasks.clone();
        let out = change(&mut next)?;
        save_document_atomic(&self.path, &next)?;
        *tasks = next;
        Ok(out)
    }
}

#[async_trait]
impl TaskBackend for LocalGateway {
    fn name(&self) -> &'static str {
        "local"
    }

    #[instrument(skip(self))]
    async fn list(&self) -> Result<Vec<Task>> {
        let mut tasks = self.tasks.lock().clone();
        sort_by_due_date(&mut tasks);
        Ok(tasks)
    }

    #[instrument(skip(self), fields(id = %id))]
    async fn get(&self, id: &TaskId) -> Result<Option<Task>> {
        Ok(self.tasks.lock().iter().find(|task| &task.id == id).cloned())
    }

    #[instrument(skip(self, task), fields(title_len = task.title.len()))]
    async fn create(&self, task: &NewTask) -> Result<Task> {
        let created = task
            .clone()
            .into_task(TaskId::new(Uuid::new_v4().to_string()), Utc::now());
        self.commit(|tasks| {
            tasks.push(created.clone());
            Ok(())
        })?;
        info!(id = %created.id, "created local task");
        Ok(created)
    }

    #[instrument(skip(self, task), fields(id = %task.id))]
    async fn update(&self, task: &Task) -> Result<Task> {
        let updated = self.commit(|tasks| {
            let slot = tasks
                .iter_mut()
                .find(|existing| existing.id == task.id)
                .ok_or_else(|| Error::TaskNotFound(task.id.clone()))?;
            *slot = Task {
                created_at: slot.created_at,
                updated_at: Utc::now(),
                ..task.clone()
            };
            Ok(slot.clone())
        })?;
        info!(id = %updated.id, "updated local task");
        Ok(updated)
    }

    #[instrument(skip(self), fields(id = %id))]
    async fn delete(&self, id: &TaskId) -> Result<()> {
        self.commit(|tasks| {
            let idx = tasks
                .iter()
                .position(|task| &task.id == id)
                .ok_or_else(|| Error::TaskNotFound(id.clone()))?;
            tasks.remove(idx);
            Ok(())
        })?;
        info!(id = %id, "deleted local task");
        Ok(())
    }
}

#[instrument(skip(path, tasks))]
fn save_document_atomic(path: &Path, tasks: &[Task]) -> Result<()> {
    debug!(file = %path.display(), count = tasks.len(), "saving task document atomically");

    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let mut temp = NamedTempFile::new_in(dir)?;
    let document = serde_json::json!({ "tasks": tasks });
    serde_json::to_writer_pretty(&mut temp, &document)?;
    writeln!(temp)?;
    temp.flush()?;

    temp.persist(path).map_err(|err| Error::Persist {
        path: path.to_path_buf(),
        source: err.error,
    })?;

    Ok(())
}
