use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use parking_lot::Mutex;
use serde_json::json;

use tasktide_core::error::Error;
use tasktide_core::gateway::remote::{
    BackendRecord, BatchResponse, DeletePayload, FetchParams, RecordError, RecordId, RecordResult,
    RecordsPayload,
};
use tasktide_core::gateway::{RemoteGateway, RemoteSettings, TaskBackend};
use tasktide_core::store::TaskStore;
use tasktide_core::task::{NewTask, Priority, Status, TaskId};

#[derive(Default)]
struct FakeTable {
    records: Vec<BackendRecord>,
    next_id: i64,
    page_requests: Vec<(usize, usize)>,
    headers: Vec<(Option<String>, Option<String>)>,
    reject_writes: Option<Vec<String>>,
    fail_with_500: bool,
}

type Shared = Arc<Mutex<FakeTable>>;

fn remember_headers(table: &mut FakeTable, headers: &HeaderMap) {
    let read = |name: &str| {
        headers
            .get(name)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string)
    };
    table.headers.push((read("x-project-id"), read("authorization")));
}

async fn query(State(shared): State<Shared>, headers: HeaderMap, Json(params): Json<FetchParams>) -> Response {
    let mut table = shared.lock();
    remember_headers(&mut table, &headers);
    if table.fail_with_500 {
        return (StatusCode::INTERNAL_SERVER_ERROR, "database offline").into_response();
    }
    let paging = params.paging_info;
    table.page_requests.push((paging.limit, paging.offset));

    let mut rows = table.records.clone();
    rows.sort_by(|a, b| a.due_date.cmp(&b.due_date));
    let page: Vec<BackendRecord> = rows.into_iter().skip(paging.offset).take(paging.limit).collect();
    Json(json!({ "success": true, "data": page })).into_response()
}

async fn get_one(State(shared): State<Shared>, Path(id): Path<String>) -> Response {
    let table = shared.lock();
    match table
        .records
        .iter()
        .find(|record| record.id.as_ref().map(ToString::to_string).as_deref() == Some(id.as_str()))
    {
        Some(record) => Json(json!({ "success": true, "data": record })).into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

fn rejected(messages: &[String]) -> Json<BatchResponse> {
    Json(BatchResponse {
        success: true,
        message: None,
        results: Some(vec![RecordResult {
            success: false,
            data: None,
            errors: Some(
                messages
                    .iter()
                    .map(|message| RecordError {
                        message: message.clone(),
                    })
                    .collect(),
            ),
            message: None,
        }]),
    })
}

fn accepted(record: BackendRecord) -> Json<BatchResponse> {
    Json(BatchResponse {
        success: true,
        message: None,
        results: Some(vec![RecordResult {
            success: true,
            data: Some(record),
            errors: None,
            message: None,
        }]),
    })
}

async fn create(State(shared): State<Shared>, headers: HeaderMap, Json(payload): Json<RecordsPayload>) -> Json<BatchResponse> {
    let mut table = shared.lock();
    remember_headers(&mut table, &headers);
    if let Some(messages) = table.reject_writes.clone() {
        return rejected(&messages);
    }
    table.next_id += 1;
    let mut record = payload.records.into_iter().next().unwrap_or_default();
    record.id = Some(RecordId::Number(table.next_id));
    record.created_on = Some("2024-05-01T08:00:00Z".to_string());
    record.modified_on = record.created_on.clone();
    table.records.push(record.clone());
    accepted(record)
}

async fn update(State(shared): State<Shared>, Json(payload): Json<RecordsPayload>) -> Json<BatchResponse> {
    let mut table = shared.lock();
    if let Some(messages) = table.reject_writes.clone() {
        return rejected(&messages);
    }
    let incoming = payload.records.into_iter().next().unwrap_or_default();
    match table.records.iter_mut().find(|record| record.id == incoming.id) {
        Some(slot) => {
            let created_on = slot.created_on.clone();
            *slot = BackendRecord {
                created_on,
                modified_on: Some("2024-05-02T08:00:00Z".to_string()),
                ..incoming
            };
            accepted(slot.clone())
        }
        None => rejected(&["Record not found".to_string()]),
    }
}

async fn delete(State(shared): State<Shared>, Json(payload): Json<DeletePayload>) -> Json<BatchResponse> {
    let mut table = shared.lock();
    table
        .records
        .retain(|record| !payload.record_ids.iter().any(|id| record.id.as_ref() == Some(id)));
    Json(BatchResponse {
        success: true,
        message: None,
        results: Some(vec![RecordResult {
            success: true,
            ..RecordResult::default()
        }]),
    })
}

async fn start_fake(shared: Shared) -> SocketAddr {
    let app = Router::new()
        .route("/tables/task27/records/query", post(query))
        .route("/tables/task27/records/{id}", get(get_one))
        .route("/tables/task27/records", post(create).patch(update).delete(delete))
        .with_state(shared);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind fake backend");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("fake backend");
    });
    addr
}

fn settings(addr: SocketAddr, page_size: usize) -> RemoteSettings {
    let mut settings = RemoteSettings::new(format!("http://{addr}"));
    settings.project_id = Some("proj-1".to_string());
    settings.public_key = Some("pk-test".to_string());
    settings.page_size = page_size;
    settings
}

fn gateway(addr: SocketAddr, page_size: usize) -> RemoteGateway {
    RemoteGateway::new(settings(addr, page_size)).expect("build gateway")
}

fn capped_gateway(addr: SocketAddr, page_size: usize, max_pages: usize) -> RemoteGateway {
    let mut settings = settings(addr, page_size);
    settings.max_pages = max_pages;
    RemoteGateway::new(settings).expect("build gateway")
}

fn record(id: i64, title: &str, due: &str) -> BackendRecord {
    BackendRecord {
        id: Some(RecordId::Number(id)),
        title: Some(title.to_string()),
        due_date: Some(due.to_string()),
        ..BackendRecord::default()
    }
}

#[tokio::test]
async fn create_update_get_delete_against_the_wire_contract() {
    let shared = Shared::default();
    let addr = start_fake(Arc::clone(&shared)).await;
    let gateway = gateway(addr, 100);

    let mut new = NewTask::new("Pay invoice", chrono::NaiveDate::from_ymd_opt(2024, 6, 1).expect("date"));
    new.priority = Priority::High;
    let created = gateway.create(&new).await.expect("create");
    assert_eq!(created.id, TaskId::from("1"));
    assert_eq!(created.status, Status::Pending);
    assert_eq!(created.priority, Priority::High);

    let mut changed = created.clone();
    changed.status = Status::Completed;
    let updated = gateway.update(&changed).await.expect("update");
    assert_eq!(updated.status, Status::Completed);
    assert_eq!(updated.created_at, created.created_at);

    let fetched = gateway.get(&created.id).await.expect("get");
    assert_eq!(fetched.map(|task| task.status), Some(Status::Completed));

    gateway.delete(&created.id).await.expect("delete");
    assert!(gateway.get(&created.id).await.expect("get after delete").is_none());

    let headers = shared.lock().headers.clone();
    assert!(!headers.is_empty());
    assert_eq!(
        headers[0],
        (Some("proj-1".to_string()), Some("Bearer pk-test".to_string()))
    );
}

#[tokio::test]
async fn list_walks_every_page_in_due_order() {
    let shared = Shared::default();
    {
        let mut table = shared.lock();
        table.records = vec![
            record(1, "e", "2024-06-05"),
            record(2, "a", "2024-06-01"),
            record(3, "d", "2024-06-04"),
            record(4, "b", "2024-06-02"),
            record(5, "c", "2024-06-03"),
        ];
    }
    let addr = start_fake(Arc::clone(&shared)).await;

    let tasks = gateway(addr, 2).list().await.expect("list");
    let titles: Vec<String> = tasks.into_iter().map(|task| task.title).collect();
    assert_eq!(titles, vec!["a", "b", "c", "d", "e"]);
    assert_eq!(shared.lock().page_requests, vec![(2, 0), (2, 2), (2, 4)]);
}

#[tokio::test]
async fn list_errors_instead_of_truncating_when_pages_run_out() {
    let shared = Shared::default();
    shared.lock().records = (1..=5).map(|id| record(id, "t", "2024-06-01")).collect();
    let addr = start_fake(Arc::clone(&shared)).await;

    let err = capped_gateway(addr, 2, 2)
        .list().await.expect_err("cap reached with a full last page");
    match err {
        Error::Rejected(message) => assert_eq!(message, "pagination did not terminate after 2 pages"),
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(shared.lock().page_requests, vec![(2, 0), (2, 2)]);
}

#[tokio::test]
async fn list_accepts_an_empty_page_within_the_cap() {
    let shared = Shared::default();
    shared.lock().records = (1..=4).map(|id| record(id, "t", "2024-06-01")).collect();
    let addr = start_fake(Arc::clone(&shared)).await;

    assert_eq!(capped_gateway(addr, 2, 3).list().await.expect("list").len(), 4);
    assert_eq!(shared.lock().page_requests, vec![(2, 0), (2, 2), (2, 4)]);
}

#[tokio::test]
async fn any_failed_record_fails_the_whole_write() {
    let shared = Shared::default();
    shared.lock().reject_writes = Some(vec!["Title too long".to_string(), "Bad date".to_string()]);
    let addr = start_fake(Arc::clone(&shared)).await;

    let err = gateway(addr, 100)
        .create(&NewTask::new("x", chrono::NaiveDate::from_ymd_opt(2024, 6, 1).expect("date")))
        .await
        .expect_err("create rejected");
    match err {
        Error::Rejected(message) => assert_eq!(message, "Title too long, Bad date"),
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn http_failure_keeps_the_store_on_its_last_known_tasks() {
    let shared = Shared::default();
    shared.lock().records = vec![record(9, "kept", "2024-06-01")];
    let addr = start_fake(Arc::clone(&shared)).await;
    let store = TaskStore::new(Arc::new(gateway(addr, 100)));

    store.refresh().await.expect("first refresh");
    shared.lock().fail_with_500 = true;

    let err = store.refresh().await.expect_err("refresh fails");
    assert!(matches!(err, Error::Status { status: 500, .. }));
    assert_eq!(store.tasks().len(), 1);
    assert_eq!(store.tasks()[0].title, "kept");
}

#[tokio::test]
async fn missing_record_is_none_not_an_error() {
    let shared = Shared::default();
    let addr = start_fake(Arc::clone(&shared)).await;

    let found = gateway(addr, 100).get(&TaskId::from("404")).await.expect("get");
    assert!(found.is_none());
}
