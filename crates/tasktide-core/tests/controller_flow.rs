mod common;

use std::sync::Arc;

use chrono::{TimeZone, Utc};

use common::{Call, ScriptedBackend, pending, task, ymd};
use tasktide_core::controller::{Modal, StatusFilter, TaskListController};
use tasktide_core::error::Error;
use tasktide_core::gateway::TaskBackend;
use tasktide_core::store::TaskStore;
use tasktide_core::task::{Priority, Status, TaskId};
use tasktide_core::validate::{DraftEdit, Field};

async fn controller_for(backend: &Arc<ScriptedBackend>) -> TaskListController {
    let store = Arc::new(TaskStore::new(Arc::clone(backend) as Arc<dyn TaskBackend>));
    store.refresh().await.expect("initial refresh");
    TaskListController::new(store)
}

#[tokio::test]
async fn submitting_an_add_form_creates_a_pending_task() {
    let backend = ScriptedBackend::with_tasks(vec![]);
    let controller = controller_for(&backend).await;

    controller.open_add(ymd(2024, 5, 20));
    controller.edit_draft(DraftEdit::Title("Pay invoice".into())).expect("title");
    controller.edit_draft(DraftEdit::DueDate(Some(ymd(2024, 6, 1)))).expect("due");
    controller.edit_draft(DraftEdit::Priority(Priority::High)).expect("priority");

    let mutation = controller.submit().await.expect("submit");
    assert!(mutation.is_refreshed());

    let tasks = controller.store().tasks();
    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0].title, "Pay invoice");
    assert_eq!(tasks[0].status, Status::Pending);
    assert_eq!(tasks[0].priority, Priority::High);
    assert_eq!(tasks[0].due_date, ymd(2024, 6, 1));
    assert_eq!(controller.modal(), Modal::Closed);
    assert!(controller.draft().is_none());
}

#[tokio::test]
async fn add_form_is_due_tomorrow_by_default() {
    let backend = ScriptedBackend::with_tasks(vec![]);
    let controller = controller_for(&backend).await;

    controller.open_add(ymd(2024, 2, 28));
    let draft = controller.draft().expect("draft");
    assert_eq!(draft.due_date, Some(ymd(2024, 2, 29)));
    assert_eq!(controller.modal(), Modal::Add);
}

#[tokio::test]
async fn invalid_draft_never_reaches_the_backend() {
    let backend = ScriptedBackend::with_tasks(vec![]);
    let controller = controller_for(&backend).await;

    controller.open_add(ymd(2024, 5, 20));
    controller.edit_draft(DraftEdit::DueDate(None)).expect("clear due");

    let err = controller.submit().await.expect_err("invalid");
    let Error::Invalid(errors) = &err else {
        panic!("expected validation errors, got {err:?}");
    };
    assert_eq!(errors.get(Field::Title), Some("Title is required"));
    assert_eq!(errors.get(Field::DueDate), Some("Due date is required"));
    assert_eq!(backend.write_calls(), 0);
    assert!(controller.modal().is_open());

    controller.edit_draft(DraftEdit::Title("fixed".into())).expect("title");
    let remaining = controller.errors();
    assert_eq!(remaining.get(Field::Title), None);
    assert_eq!(remaining.get(Field::DueDate), Some("Due date is required"));
}

#[tokio::test]
async fn failed_save_keeps_the_form_open_with_the_draft() {
    let backend = ScriptedBackend::with_tasks(vec![pending("1", ymd(2024, 6, 1))]);
    let controller = controller_for(&backend).await;

    controller.open_edit(&TaskId::from("1")).expect("open edit");
    controller.edit_draft(DraftEdit::Title("retry me".into())).expect("title");
    backend.fail_writes(true);

    assert!(matches!(controller.submit().await, Err(Error::Rejected(_))));
    assert_eq!(controller.modal(), Modal::Edit(TaskId::from("1")));
    assert_eq!(controller.draft().map(|d| d.title), Some("retry me".to_string()));

    backend.fail_writes(false);
    controller.submit().await.expect("retry succeeds");
    assert_eq!(controller.modal(), Modal::Closed);
    assert_eq!(controller.store().tasks()[0].title, "retry me");
}

#[tokio::test]
async fn edit_form_is_seeded_from_the_task_and_close_discards_it() {
    let mut seeded = task("3", "Water plants", ymd(2024, 6, 9), Status::Completed, Priority::Low);
    seeded.description = "balcony".to_string();
    let backend = ScriptedBackend::with_tasks(vec![seeded]);
    let controller = controller_for(&backend).await;

    controller.open_edit(&TaskId::from("3")).expect("open edit");
    let draft = controller.draft().expect("draft");
    assert_eq!(draft.title, "Water plants");
    assert_eq!(draft.description, "balcony");
    assert_eq!(draft.due_date, Some(ymd(2024, 6, 9)));
    assert_eq!(draft.status, Status::Completed);

    controller.close();
    assert_eq!(controller.modal(), Modal::Closed);
    assert!(controller.draft().is_none());
    assert!(matches!(
        controller.edit_draft(DraftEdit::Title("x".into())),
        Err(Error::NoOpenModal)
    ));
}

#[tokio::test]
async fn only_one_submit_runs_at_a_time() {
    let backend = ScriptedBackend::with_tasks(vec![]);
    let controller = controller_for(&backend).await;
    controller.open_add(ymd(2024, 5, 20));
    controller.edit_draft(DraftEdit::Title("once".into())).expect("title");
    let gate = backend.hold_creates();

    let (first, second) = tokio::join!(controller.submit(), async {
        assert!(controller.is_submitting());
        let second = controller.submit().await;
        gate.notify_one();
        second
    });

    first.expect("first submit");
    assert!(matches!(second, Err(Error::SubmitInFlight)));
    assert!(!controller.is_submitting());
    assert_eq!(backend.write_calls(), 1);
}

#[tokio::test]
async fn save_landing_late_leaves_a_newer_form_open() {
    let backend = ScriptedBackend::with_tasks(vec![pending("1", ymd(2024, 6, 1))]);
    let controller = controller_for(&backend).await;
    controller.open_add(ymd(2024, 5, 20));
    controller.edit_draft(DraftEdit::Title("first".into())).expect("title");
    let gate = backend.hold_creates();

    let (saved, ()) = tokio::join!(controller.submit(), async {
        controller.close();
        controller.open_edit(&TaskId::from("1")).expect("open edit");
        controller
            .edit_draft(DraftEdit::Title("half-typed edit".into()))
            .expect("title");
        gate.notify_one();
    });

    saved.expect("first submit");
    assert_eq!(controller.store().tasks().len(), 2);
    assert_eq!(controller.modal(), Modal::Edit(TaskId::from("1")));
    assert_eq!(
        controller.draft().map(|d| d.title),
        Some("half-typed edit".to_string())
    );
}

#[tokio::test]
async fn toggle_flips_status_both_ways() {
    let backend = ScriptedBackend::with_tasks(vec![pending("1", ymd(2024, 6, 1))]);
    let controller = controller_for(&backend).await;
    let id = TaskId::from("1");

    controller.toggle_status(&id).await.expect("first toggle");
    assert_eq!(controller.store().find(&id).map(|t| t.status), Some(Status::Completed));

    controller.toggle_status(&id).await.expect("second toggle");
    assert_eq!(controller.store().find(&id).map(|t| t.status), Some(Status::Pending));
}

#[tokio::test]
async fn second_toggle_on_the_same_task_is_rejected_while_busy() {
    let backend = ScriptedBackend::with_tasks(vec![pending("1", ymd(2024, 6, 1)), pending("2", ymd(2024, 6, 2))]);
    let controller = controller_for(&backend).await;
    let one = TaskId::from("1");
    let two = TaskId::from("2");
    let gate = backend.hold(&one);
    let now = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).single().expect("now");

    let (first, (second, delete, other)) = tokio::join!(controller.toggle_status(&one), async {
        assert!(controller.is_busy(&one));
        let busy_rows: Vec<bool> = controller.rows(now).iter().map(|row| row.busy).collect();
        assert_eq!(busy_rows, vec![true, false]);

        let second = controller.toggle_status(&one).await;
        controller.request_delete(&one).expect("request delete");
        let delete = controller.confirm_delete().await;
        // Other tasks are not blocked.
        let other = controller.toggle_status(&two).await;
        gate.notify_one();
        (second, delete, other)
    });

    first.expect("first toggle");
    assert!(matches!(second, Err(Error::Busy(ref id)) if *id == one));
    assert!(matches!(delete, Err(Error::Busy(_))));
    other.expect("toggle on another task");
    assert!(!controller.is_busy(&one));

    let updates = backend
        .calls()
        .iter()
        .filter(|call| matches!(call, Call::Update(task) if task.id == one))
        .count();
    assert_eq!(updates, 1);
}

#[tokio::test]
async fn cancelled_delete_makes_no_backend_call() {
    let backend = ScriptedBackend::with_tasks(vec![pending("1", ymd(2024, 6, 1))]);
    let controller = controller_for(&backend).await;
    let id = TaskId::from("1");

    let candidate = controller.request_delete(&id).expect("request");
    assert_eq!(candidate.id, id);
    assert_eq!(controller.pending_delete().map(|t| t.id), Some(id.clone()));

    controller.cancel_delete();
    assert!(controller.pending_delete().is_none());
    assert!(matches!(
        controller.confirm_delete().await,
        Err(Error::NoPendingDelete)
    ));
    assert_eq!(backend.write_calls(), 0);
}

#[tokio::test]
async fn confirmed_delete_removes_the_task() {
    let backend = ScriptedBackend::with_tasks(vec![pending("1", ymd(2024, 6, 1))]);
    let controller = controller_for(&backend).await;
    let id = TaskId::from("1");

    controller.request_delete(&id).expect("request");
    controller.confirm_delete().await.expect("confirm");

    assert!(controller.store().tasks().is_empty());
    assert!(controller.pending_delete().is_none());
    assert!(!controller.is_busy(&id));
}

#[tokio::test]
async fn failed_delete_keeps_candidate_and_releases_the_lock() {
    let backend = ScriptedBackend::with_tasks(vec![pending("1", ymd(2024, 6, 1))]);
    let controller = controller_for(&backend).await;
    let id = TaskId::from("1");

    controller.request_delete(&id).expect("request");
    backend.fail_writes(true);
    assert!(controller.confirm_delete().await.is_err());
    assert!(!controller.is_busy(&id));
    assert_eq!(controller.pending_delete().map(|t| t.id), Some(id.clone()));

    backend.fail_writes(false);
    controller.confirm_delete().await.expect("retry");
    assert!(controller.store().tasks().is_empty());
}

#[tokio::test]
async fn completed_filter_shows_only_completed_tasks() {
    let backend = ScriptedBackend::with_tasks(vec![
        pending("1", ymd(2024, 6, 1)),
        pending("2", ymd(2024, 6, 2)),
        task("3", "done", ymd(2024, 6, 3), Status::Completed, Priority::Medium),
    ]);
    let controller = controller_for(&backend).await;

    controller.set_filter(StatusFilter::Completed);
    let visible: Vec<TaskId> = controller.filtered_tasks().into_iter().map(|t| t.id).collect();
    assert_eq!(visible, vec![TaskId::from("3")]);

    controller.set_filter(StatusFilter::Pending);
    assert_eq!(controller.filtered_tasks().len(), 2);
    assert_eq!(controller.store().tasks().len(), 3);
}

#[tokio::test]
async fn rows_flag_overdue_pending_tasks_only() {
    let backend = ScriptedBackend::with_tasks(vec![
        pending("late", ymd(2024, 6, 9)),
        task("done", "done", ymd(2024, 6, 9), Status::Completed, Priority::High),
        pending("today", ymd(2024, 6, 10)),
    ]);
    let controller = controller_for(&backend).await;
    let now = Utc.with_ymd_and_hms(2024, 6, 10, 12, 0, 0).single().expect("now");

    let flags: Vec<(String, bool)> = controller
        .rows(now)
        .into_iter()
        .map(|row| (row.task.id.to_string(), row.overdue))
        .collect();
    assert_eq!(
        flags,
        vec![
            ("late".to_string(), true),
            ("done".to_string(), false),
            ("today".to_string(), false),
        ]
    );
}
