//! Editable task drafts and the rules a draft must satisfy before it is saved.

use std::collections::BTreeMap;
use std::fmt;

use chrono::NaiveDate;

use crate::task::{MAX_DESCRIPTION_CHARS, MAX_TITLE_CHARS, NewTask, Priority, Status, Task, TaskId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Field {
    Title,
    Description,
    DueDate,
}

impl Field {
    pub fn as_key(self) -> &'static str {
        match self {
            Self::Title => "title",
            Self::Description => "description",
            Self::DueDate => "dueDate",
        }
    }
}

/// Field name to message. Empty means the draft may be submitted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldErrors(BTreeMap<Field, String>);

impl FieldErrors {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn get(&self, field: Field) -> Option<&str> {
        self.0.get(&field).map(String::as_str)
    }

    pub fn clear(&mut self, field: Field) {
        self.0.remove(&field);
    }

    pub fn iter(&self) -> impl Iterator<Item = (Field, &str)> {
        self.0.iter().map(|(field, msg)| (*field, msg.as_str()))
    }

    fn insert(&mut self, field: Field, message: &str) {
        self.0.insert(field, message.to_string());
    }
}

impl fmt::Display for FieldErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .iter()
            .map(|(field, msg)| format!("{}: {msg}", field.as_key()))
            .collect();
        f.write_str(&parts.join("; "))
    }
}

/// In-progress copy of a task while the add/edit form is open.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskDraft {
    /// `Some` when editing an existing task.
    pub id: Option<TaskId>,
    pub title: String,
    pub description: String,
    pub priority: Priority,
    pub status: Status,
    pub due_date: Option<NaiveDate>,
}

impl TaskDraft {
    pub fn blank(due_date: NaiveDate) -> Self {
        Self {
            id: None,
            title: String::new(),
            description: String::new(),
            priority: Priority::default(),
            status: Status::default(),
            due_date: Some(due_date),
        }
    }

    pub fn from_task(task: &Task) -> Self {
        Self {
            id: Some(task.id.clone()),
            title: task.title.clone(),
            description: task.description.clone(),
            priority: task.priority,
            status: task.status,
            due_date: Some(task.due_date),
        }
    }

    /// Applies one edit and reports which field it touched.
    pub fn apply(&mut self, edit: DraftEdit) -> Option<Field> {
        match edit {
            DraftEdit::Title(title) => {
                self.title = title;
                Some(Field::Title)
            }
            DraftEdit::Description(description) => {
                self.description = description;
                Some(Field::Description)
            }
            DraftEdit::DueDate(due_date) => {
                self.due_date = due_date;
                Some(Field::DueDate)
            }
            DraftEdit::Priority(priority) => {
                self.priority = priority;
                None
            }
            DraftEdit::Status(status) => {
                self.status = status;
                None
            }
        }
    }

    /// Only meaningful once [`validate`] came back empty.
    pub fn to_new_task(&self) -> Option<NewTask> {
        Some(NewTask {
            title: self.title.clone(),
            description: self.description.clone(),
            priority: self.priority,
            due_date: self.due_date?,
        })
    }

    /// Overlay the draft on the task it was copied from.
    pub fn merge_into(&self, base: &Task) -> Option<Task> {
        Some(Task {
            title: self.title.clone(),
            description: self.description.clone(),
            priority: self.priority,
            status: self.status,
            due_date: self.due_date?,
            ..base.clone()
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum DraftEdit {
    Title(String),
    Description(String),
    Priority(Priority),
    Status(Status),
    DueDate(Option<NaiveDate>),
}

pub fn validate(draft: &TaskDraft) -> FieldErrors {
    let mut errors = FieldErrors::default();

    if draft.title.trim().is_empty() {
        errors.insert(Field::Title, "Title is required");
    } else if draft.title.chars().count() > MAX_TITLE_CHARS {
        errors.insert(Field::Title, "Title must be less than 100 characters");
    }

    if draft.description.chars().count() > MAX_DESCRIPTION_CHARS {
        errors.insert(
            Field::Description,
            "Description must be less than 500 characters",
        );
    }

    if draft.due_date.is_none() {
        errors.insert(Field::DueDate, "Due date is required");
    }

    errors
}
