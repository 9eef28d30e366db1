#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::{NaiveDate, TimeZone, Utc};
use parking_lot::Mutex;
use tokio::sync::Notify;

use tasktide_core::error::{Error, Result};
use tasktide_core::gateway::TaskBackend;
use tasktide_core::task::{NewTask, Priority, Status, Task, TaskId};

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    List,
    Get(TaskId),
    Create(String),
    Update(Task),
    Delete(TaskId),
}

/// In-memory backend whose failures and timing are driven by the test.
#[derive(Default)]
pub struct ScriptedBackend {
    tasks: Mutex<Vec<Task>>,
    calls: Mutex<Vec<Call>>,
    gates: Mutex<HashMap<TaskId, Arc<Notify>>>,
    create_gate: Mutex<Option<Arc<Notify>>>,
    next_id: AtomicU64,
    fail_list: AtomicBool,
    fail_writes: AtomicBool,
}

impl ScriptedBackend {
    pub fn with_tasks(tasks: Vec<Task>) -> Arc<Self> {
        let backend = Self {
            next_id: AtomicU64::new(100),
            ..Self::default()
        };
        *backend.tasks.lock() = tasks;
        Arc::new(backend)
    }

    pub fn tasks(&self) -> Vec<Task> {
        self.tasks.lock().clone()
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().clone()
    }

    pub fn list_calls(&self) -> usize {
        self.calls().iter().filter(|call| **call == Call::List).count()
    }

    pub fn write_calls(&self) -> usize {
        self.calls()
            .iter()
            .filter(|call| matches!(call, Call::Create(_) | Call::Update(_) | Call::Delete(_)))
            .count()
    }

    pub fn fail_list(&self, fail: bool) {
        self.fail_list.store(fail, Ordering::SeqCst);
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// The next update or delete for `id` waits until the returned gate is
    /// notified.
    pub fn hold(&self, id: &TaskId) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        self.gates.lock().insert(id.clone(), Arc::clone(&gate));
        gate
    }

    pub fn hold_creates(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.create_gate.lock() = Some(Arc::clone(&gate));
        gate
    }

    async fn wait_for_gate(&self, id: &TaskId) {
        let gate = self.gates.lock().remove(id);
        if let Some(gate) = gate {
            gate.notified().await;
        }
    }

    fn check_writes(&self) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(Error::Rejected("write refused".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl TaskBackend for ScriptedBackend {
    fn name(&self) -> &'static str {
        "scripted"
    }

    async fn list(&self) -> Result<Vec<Task>> {
        self.calls.lock().push(Call::List);
        if self.fail_list.load(Ordering::SeqCst) {
            return Err(Error::Rejected("list unavailable".to_string()));
        }
        let mut tasks = self.tasks();
        tasks.sort_by_key(|task| task.due_date);
        Ok(tasks)
    }

    async fn get(&self, id: &TaskId) -> Result<Option<Task>> {
        self.calls.lock().push(Call::Get(id.clone()));
        Ok(self.tasks.lock().iter().find(|task| &task.id == id).cloned())
    }

    async fn create(&self, task: &NewTask) -> Result<Task> {
        self.calls.lock().push(Call::Create(task.title.clone()));
        let gate = self.create_gate.lock().take();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        self.check_writes()?;
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let created = task.clone().into_task(TaskId::new(id.to_string()), Utc::now());
        self.tasks.lock().push(created.clone());
        Ok(created)
    }

    async fn update(&self, task: &Task) -> Result<Task> {
        self.calls.lock().push(Call::Update(task.clone()));
        self.wait_for_gate(&task.id).await;
        self.check_writes()?;
        let mut tasks = self.tasks.lock();
        let slot = tasks
            .iter_mut()
            .find(|existing| existing.id == task.id)
            .ok_or_else(|| Error::TaskNotFound(task.id.clone()))?;
        *slot = task.clone();
        Ok(slot.clone())
    }

    async fn delete(&self, id: &TaskId) -> Result<()> {
        self.calls.lock().push(Call::Delete(id.clone()));
        self.wait_for_gate(id).await;
        self.check_writes()?;
        let mut tasks = self.tasks.lock();
        let before = tasks.len();
        tasks.retain(|task| &task.id != id);
        if tasks.len() == before {
            return Err(Error::TaskNotFound(id.clone()));
        }
        Ok(())
    }
}

pub fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
}

pub fn task(id: &str, title: &str, due: NaiveDate, status: Status, priority: Priority) -> Task {
    let stamp = Utc
        .with_ymd_and_hms(2024, 1, 1, 12, 0, 0)
        .single()
        .expect("valid timestamp");
    Task {
        id: TaskId::from(id),
        title: title.to_string(),
        description: String::new(),
        priority,
        status,
        due_date: due,
        created_at: stamp,
        updated_at: stamp,
    }
}

pub fn pending(id: &str, due: NaiveDate) -> Task {
    task(id, &format!("task {id}"), due, Status::Pending, Priority::Medium)
}
