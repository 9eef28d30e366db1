//! List-view orchestration on top of [`TaskStore`].
//!
//! Every method takes `&self` so several operations can be in flight on one
//! cooperative event loop at once. Internal state sits behind a mutex that is
//! never held across an `.await`.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, NaiveDate, Utc};
use parking_lot::Mutex;
use tracing::{debug, info, instrument, warn};

use crate::error::{Error, Result};
use crate::lock::MutationLocks;
use crate::store::{Mutation, TaskStore};
use crate::task::{Status, Task, TaskId};
use crate::validate::{DraftEdit, FieldErrors, TaskDraft, validate};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum StatusFilter {
    #[default]
    All,
    Pending,
    Completed,
}

impl StatusFilter {
    pub fn as_key(self) -> &'static str {
        match self {
            Self::All => "all",
            Self::Pending => "pending",
            Self::Completed => "completed",
        }
    }

    pub fn from_key(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "all" => Some(Self::All),
            "pending" => Some(Self::Pending),
            "completed" | "done" => Some(Self::Completed),
            _ => None,
        }
    }

    pub fn matches(self, task: &Task) -> bool {
        match self {
            Self::All => true,
            Self::Pending => task.status == Status::Pending,
            Self::Completed => task.status == Status::Completed,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Modal {
    #[default]
    Closed,
    Add,
    Edit(TaskId),
}

impl Modal {
    pub fn is_open(&self) -> bool {
        !matches!(self, Self::Closed)
    }
}

/// One line of the list view.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskRow {
    pub task: Task,
    pub overdue: bool,
    /// A toggle or delete for this task is in flight.
    pub busy: bool,
}

#[derive(Debug, Default)]
struct ListState {
    filter: StatusFilter,
    modal: Modal,
    draft: Option<TaskDraft>,
    errors: FieldErrors,
    pending_delete: Option<Task>,
    /// Bumped whenever the form is opened or closed.
    generation: u64,
}

impl ListState {
    fn open_modal(&mut self, modal: Modal, draft: TaskDraft) {
        self.modal = modal;
        self.draft = Some(draft);
        self.errors = FieldErrors::default();
        self.generation = self.generation.wrapping_add(1);
    }

    fn close_modal(&mut self) {
        self.modal = Modal::Closed;
        self.draft = None;
        self.errors = FieldErrors::default();
        self.generation = self.generation.wrapping_add(1);
    }
}

struct SubmitGuard<'a>(&'a AtomicBool);

impl Drop for SubmitGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

enum SubmitTarget {
    Create(TaskDraft),
    Update(TaskId, TaskDraft),
}

#[derive(Debug)]
pub struct TaskListController {
    store: Arc<TaskStore>,
    locks: MutationLocks,
    state: Mutex<ListState>,
    submitting: AtomicBool,
}

impl TaskListController {
    pub fn new(store: Arc<TaskStore>) -> Self {
        Self {
            store,
            locks: MutationLocks::new(),
            state: Mutex::new(ListState::default()),
            submitting: AtomicBool::new(false),
        }
    }

    pub fn store(&self) -> &Arc<TaskStore> {
        &self.store
    }

    pub fn filter(&self) -> StatusFilter {
        self.state.lock().filter
    }

    pub fn set_filter(&self, filter: StatusFilter) {
        debug!(filter = filter.as_key(), "filter changed");
        self.state.lock().filter = filter;
    }

    /// Recomputed from the store on every call.
    pub fn filtered_tasks(&self) -> Vec<Task> {
        let filter = self.filter();
        self.store
            .tasks()
            .into_iter()
            .filter(|task| filter.matches(task))
            .collect()
    }

    pub fn rows(&self, now: DateTime<Utc>) -> Vec<TaskRow> {
        self.filtered_tasks()
            .into_iter()
            .map(|task| TaskRow {
                overdue: task.is_overdue(now),
                busy: self.locks.is_locked(&task.id),
                task,
            })
            .collect()
    }

    pub fn is_busy(&self, id: &TaskId) -> bool {
        self.locks.is_locked(id)
    }

    pub fn is_submitting(&self) -> bool {
        self.submitting.load(Ordering::Acquire)
    }

    // ----- modal -----

    pub fn modal(&self) -> Modal {
        self.state.lock().modal.clone()
    }

    pub fn draft(&self) -> Option<TaskDraft> {
        self.state.lock().draft.clone()
    }

    pub fn errors(&self) -> FieldErrors {
        self.state.lock().errors.clone()
    }

    /// The new draft is due the day after `today`.
    pub fn open_add(&self, today: NaiveDate) {
        let due = today.succ_opt().unwrap_or(today);
        self.state.lock().open_modal(Modal::Add, TaskDraft::blank(due));
    }

    pub fn open_edit(&self, id: &TaskId) -> Result<()> {
        let task = self
            .store
            .find(id)
            .ok_or_else(|| Error::TaskNotFound(id.clone()))?;
        self.open_edit_task(&task);
        Ok(())
    }

    pub fn open_edit_task(&self, task: &Task) {
        self.state
            .lock()
            .open_modal(Modal::Edit(task.id.clone()), TaskDraft::from_task(task));
    }

    /// Discards the draft and its errors.
    pub fn close(&self) {
        self.state.lock().close_modal();
    }

    /// Editing a field clears that field's error.
    pub fn edit_draft(&self, edit: DraftEdit) -> Result<()> {
        let mut state = self.state.lock();
        let draft = state.draft.as_mut().ok_or(Error::NoOpenModal)?;
        if let Some(field) = draft.apply(edit) {
            state.errors.clear(field);
        }
        Ok(())
    }

    /// Validates, then creates or updates. Invalid drafts never reach the
    /// backend. The modal closes only when the save succeeds and the form that
    /// was submitted is still the one open; on failure the draft stays as it was.
    #[instrument(skip(self))]
    pub async fn submit(&self) -> Result<Mutation<Task>> {
        if self
            .submitting
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(Error::SubmitInFlight);
        }
        let _guard = SubmitGuard(&self.submitting);

        let (target, generation) = {
            let mut state = self.state.lock();
            let draft = state.draft.clone().ok_or(Error::NoOpenModal)?;
            let errors = validate(&draft);
            if !errors.is_empty() {
                debug!(%errors, "draft rejected by validation");
                state.errors = errors.clone();
                return Err(Error::Invalid(errors));
            }
            state.errors = FieldErrors::default();
            let target = match &state.modal {
                Modal::Closed => return Err(Error::NoOpenModal),
                Modal::Add => SubmitTarget::Create(draft),
                Modal::Edit(id) => SubmitTarget::Update(id.clone(), draft),
            };
            (target, state.generation)
        };

        let outcome = match target {
            SubmitTarget::Create(draft) => {
                let new = draft
                    .to_new_task()
                    .ok_or_else(|| Error::Invalid(validate(&draft)))?;
                self.store.create(&new).await
            }
            SubmitTarget::Update(id, draft) => {
                let base = self
                    .store
                    .find(&id)
                    .ok_or_else(|| Error::TaskNotFound(id.clone()))?;
                let merged = draft
                    .merge_into(&base)
                    .ok_or_else(|| Error::Invalid(validate(&draft)))?;
                self.store.update(&merged).await
            }
        };

        match outcome {
            Ok(mutation) => {
                info!(id = %mutation.value().id, "task saved from form");
                let mut state = self.state.lock();
                if state.generation == generation {
                    state.close_modal();
                } else {
                    debug!("form changed while saving; leaving it open");
                }
                Ok(mutation)
            }
            Err(err) => {
                warn!(error = %err, "saving task failed; form left open");
                Err(err)
            }
        }
    }

    // ----- per-task mutations -----

    #[instrument(skip(self), fields(id = %id))]
    pub async fn toggle_status(&self, id: &TaskId) -> Result<Mutation<Task>> {
        let _lock = self
            .locks
            .try_acquire(id)
            .ok_or_else(|| Error::Busy(id.clone()))?;
        let task = self
            .store
            .find(id)
            .ok_or_else(|| Error::TaskNotFound(id.clone()))?;
        self.store.set_status(id, task.status.toggled()).await
    }

    pub fn pending_delete(&self) -> Option<Task> {
        self.state.lock().pending_delete.clone()
    }

    /// First phase of a delete. Nothing is sent to the backend.
    pub fn request_delete(&self, id: &TaskId) -> Result<Task> {
        let task = self
            .store
            .find(id)
            .ok_or_else(|| Error::TaskNotFound(id.clone()))?;
        self.state.lock().pending_delete = Some(task.clone());
        Ok(task)
    }

    pub fn cancel_delete(&self) -> Option<Task> {
        self.state.lock().pending_delete.take()
    }

    /// The candidate is cleared only once the delete succeeds, so a failed
    /// attempt can be confirmed again.
    #[instrument(skip(self))]
    pub async fn confirm_delete(&self) -> Result<Mutation<()>> {
        let candidate = self.pending_delete().ok_or(Error::NoPendingDelete)?;
        let id = candidate.id;
        let _lock = self
            .locks
            .try_acquire(&id)
            .ok_or_else(|| Error::Busy(id.clone()))?;

        let mutation = self.store.delete(&id).await?;

        let mut state = self.state.lock();
        if state.pending_delete.as_ref().is_some_and(|task| task.id == id) {
            state.pending_delete = None;
        }
        Ok(mutation)
    }
}
