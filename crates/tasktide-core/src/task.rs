use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::datetime::{format_due_date, to_local_date};

pub const MAX_TITLE_CHARS: usize = 100;
pub const MAX_DESCRIPTION_CHARS: usize = 500;

/// Backend-assigned identifier. Opaque to everything but the gateway that minted it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(String);

impl TaskId {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for TaskId {
    fn from(raw: &str) -> Self {
        Self(raw.to_string())
    }
}

impl From<String> for TaskId {
    fn from(raw: String) -> Self {
        Self(raw)
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
}

impl Priority {
    pub fn all() -> [Self; 3] {
        [Self::Low, Self::Medium, Self::High]
    }

    pub fn as_key(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }

    pub fn from_key(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "low" | "l" => Some(Self::Low),
            "medium" | "med" | "m" => Some(Self::Medium),
            "high" | "h" => Some(Self::High),
            _ => None,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Low => "Low",
            Self::Medium => "Medium",
            Self::High => "High",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    #[default]
    Pending,
    Completed,
}

impl Status {
    pub fn as_key(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Completed => "completed",
        }
    }

    pub fn from_key(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "pending" => Some(Self::Pending),
            "completed" => Some(Self::Completed),
            _ => None,
        }
    }

    /// The only two states; toggling always lands on the other one.
    pub fn toggled(self) -> Self {
        match self {
            Self::Pending => Self::Completed,
            Self::Completed => Self::Pending,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,

    pub title: String,

    #[serde(default)]
    pub description: String,

    #[serde(default)]
    pub priority: Priority,

    #[serde(default)]
    pub status: Status,

    pub due_date: NaiveDate,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,
}

impl Task {
    pub fn is_completed(&self) -> bool {
        self.status == Status::Completed
    }

    /// A pending task is overdue once the last instant of its due day has passed.
    ///
    /// Due dates carry no time of day, so "end of due day is before now" and
    /// "start of due day is before start of today" select the same tasks.
    /// Completed tasks are never overdue.
    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        if self.is_completed() {
            return false;
        }
        self.due_date < to_local_date(now)
    }

    pub fn formatted_due_date(&self) -> String {
        format_due_date(self.due_date)
    }
}

/// Fields a caller supplies when creating a task; the backend fills in the rest.
/// New tasks always start pending.
#[derive(Debug, Clone, PartialEq)]
pub struct NewTask {
    pub title: String,
    pub description: String,
    pub priority: Priority,
    pub due_date: NaiveDate,
}

impl NewTask {
    pub fn new(title: impl Into<String>, due_date: NaiveDate) -> Self {
        Self {
            title: title.into(),
            description: String::new(),
            priority: Priority::default(),
            due_date,
        }
    }

    /// Materialize a record the way a store would after assigning identity.
    pub fn into_task(self, id: TaskId, now: DateTime<Utc>) -> Task {
        Task {
            id,
            title: self.title,
            description: self.description,
            priority: self.priority,
            status: Status::Pending,
            due_date: self.due_date,
            created_at: now,
            updated_at: now,
        }
    }
}
