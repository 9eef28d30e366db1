use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::task::{Status, Task};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TaskStats {
    pub completed: usize,
    pub pending: usize,
    pub overdue: usize,
}

impl TaskStats {
    /// Overdue uses the same rule as the list view, see [`Task::is_overdue`].
    pub fn compute(tasks: &[Task], now: DateTime<Utc>) -> Self {
        tasks.iter().fold(Self::default(), |mut stats, task| {
            match task.status {
                Status::Completed => stats.completed += 1,
                Status::Pending => stats.pending += 1,
            }
            if task.is_overdue(now) {
                stats.overdue += 1;
            }
            stats
        })
    }

    pub fn total(&self) -> usize {
        self.completed + self.pending
    }
}
