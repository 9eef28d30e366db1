use std::io::{self, BufRead, Write};
use std::sync::Arc;

use anyhow::{Context, anyhow};
use chrono::{DateTime, Utc};
use tracing::{debug, info, instrument};

use crate::calendar::CalendarProjection;
use crate::cli::Command;
use crate::controller::TaskListController;
use crate::datetime::{at_event_start, parse_date_expr, to_local_date};
use crate::error::Error;
use crate::gateway::TaskBackend;
use crate::render::Renderer;
use crate::stats::TaskStats;
use crate::store::{Mutation, TaskStore};
use crate::task::TaskId;
use crate::validate::DraftEdit;

/// Everything one command invocation works against.
pub struct Session {
    store: Arc<TaskStore>,
    controller: Arc<TaskListController>,
    calendar: CalendarProjection,
    renderer: Renderer,
    now: DateTime<Utc>,
}

impl Session {
    pub fn new(backend: Arc<dyn TaskBackend>, renderer: Renderer, now: DateTime<Utc>) -> Self {
        let store = Arc::new(TaskStore::new(backend));
        let controller = Arc::new(TaskListController::new(Arc::clone(&store)));
        let calendar = CalendarProjection::new(Arc::clone(&controller), to_local_date(now));
        Self {
            store,
            controller,
            calendar,
            renderer,
            now,
        }
    }

    pub fn store(&self) -> &Arc<TaskStore> {
        &self.store
    }

    pub fn controller(&self) -> &Arc<TaskListController> {
        &self.controller
    }

    pub fn calendar(&self) -> &CalendarProjection {
        &self.calendar
    }
}

/// Runs one command to completion on a single-threaded runtime.
#[instrument(skip(backend, renderer))]
pub fn dispatch(
    backend: Arc<dyn TaskBackend>,
    renderer: Renderer,
    command: Command,
) -> anyhow::Result<()> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to start async runtime")?;

    let session = Session::new(backend, renderer, Utc::now());
    runtime.block_on(execute(&session, command))
}

pub async fn execute(session: &Session, command: Command) -> anyhow::Result<()> {
    info!(backend = session.store.backend_name(), ?command, "running command");

    session
        .store
        .refresh()
        .await
        .context("failed to load tasks")?;

    match command {
        Command::List { status } => {
            session.controller.set_filter(status);
            session
                .renderer
                .print_task_table(&session.controller.rows(session.now))
        }
        Command::Show { id } => cmd_show(session, TaskId::from(id)).await,
        Command::Add {
            title,
            description,
            priority,
            due,
        } => {
            let mut edits = vec![
                DraftEdit::Title(title),
                DraftEdit::Description(description),
                DraftEdit::Priority(priority),
            ];
            if let Some(raw) = due {
                edits.push(DraftEdit::DueDate(Some(parse_due(&raw, session.now)?)));
            }
            session.controller.open_add(to_local_date(session.now));
            submit_form(session, edits, "created").await
        }
        Command::Edit {
            id,
            title,
            description,
            priority,
            due,
        } => {
            let mut edits = Vec::new();
            edits.extend(title.map(DraftEdit::Title));
            edits.extend(description.map(DraftEdit::Description));
            edits.extend(priority.map(DraftEdit::Priority));
            if let Some(raw) = due {
                edits.push(DraftEdit::DueDate(Some(parse_due(&raw, session.now)?)));
            }
            if edits.is_empty() {
                return Err(anyhow!(
                    "nothing to change; pass --title, --description, --priority or --due"
                ));
            }
            session.controller.open_edit(&TaskId::from(id))?;
            submit_form(session, edits, "updated").await
        }
        Command::Toggle { id } => {
            let id = TaskId::from(id);
            let mutation = session
                .controller
                .toggle_status(&id)
                .await
                .with_context(|| format!("failed to toggle task {id}"))?;
            let task = mutation.value();
            report(
                session,
                &mutation,
                &format!("task {} is now {}", task.id, task.status.as_key()),
            )
        }
        Command::Delete { id, yes } => cmd_delete(session, TaskId::from(id), yes).await,
        Command::Calendar { view, date } => {
            let calendar = &session.calendar;
            calendar.set_view(view);
            if let Some(raw) = date {
                calendar.set_date(parse_due(&raw, session.now)?);
            }
            session.renderer.print_calendar(
                calendar.view(),
                calendar.visible_range(),
                &calendar.events_in_view(),
            )
        }
        Command::Reschedule { id, date } => {
            let id = TaskId::from(id);
            let to = at_event_start(parse_due(&date, session.now)?);
            let mutation = session
                .calendar
                .reschedule(&id, to)
                .await
                .with_context(|| format!("failed to reschedule task {id}"))?;
            let task = mutation.value();
            report(
                session,
                &mutation,
                &format!("task {} is now due {}", task.id, task.formatted_due_date()),
            )
        }
        Command::Stats => {
            let stats = TaskStats::compute(&session.store.tasks(), session.now);
            session.renderer.print_stats(&stats)
        }
    }
}

fn parse_due(raw: &str, now: DateTime<Utc>) -> anyhow::Result<chrono::NaiveDate> {
    parse_date_expr(raw, now).with_context(|| format!("invalid date '{raw}'"))
}

async fn cmd_show(session: &Session, id: TaskId) -> anyhow::Result<()> {
    let task = session
        .store
        .fetch(&id)
        .await
        .with_context(|| format!("failed to fetch task {id}"))?
        .ok_or(Error::TaskNotFound(id))?;
    session.renderer.print_task_detail(&task, session.now)
}

async fn submit_form(session: &Session, edits: Vec<DraftEdit>, verb: &str) -> anyhow::Result<()> {
    for edit in edits {
        session.controller.edit_draft(edit)?;
    }
    let mutation = session.controller.submit().await?;
    let task = mutation.value();
    report(
        session,
        &mutation,
        &format!("{verb} task {}: {}", task.id, task.title),
    )
}

async fn cmd_delete(session: &Session, id: TaskId, yes: bool) -> anyhow::Result<()> {
    let candidate = session.controller.request_delete(&id)?;

    if !yes && !confirm(&format!("Delete task {} '{}'? [y/N] ", id, candidate.title))? {
        session.controller.cancel_delete();
        debug!(id = %id, "delete cancelled");
        return session.renderer.notice("kept task");
    }

    let mutation = session
        .controller
        .confirm_delete()
        .await
        .with_context(|| format!("failed to delete task {id}"))?;
    report(session, &mutation, &format!("deleted task {id}"))
}

fn report<T>(session: &Session, mutation: &Mutation<T>, message: &str) -> anyhow::Result<()> {
    session.renderer.notice(message)?;
    if let Some(refresh_error) = mutation.refresh_error() {
        session.renderer.warning(&format!(
            "saved, but the task list could not be refreshed: {refresh_error}"
        ))?;
    }
    Ok(())
}

fn confirm(prompt: &str) -> anyhow::Result<bool> {
    let mut out = io::stdout().lock();
    write!(out, "{prompt}")?;
    out.flush()?;

    let mut answer = String::new();
    io::stdin().lock().read_line(&mut answer)?;
    Ok(matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes"))
}
