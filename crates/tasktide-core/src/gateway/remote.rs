use std::fmt;
use std::time::Duration;

use anyhow::anyhow;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, instrument};

use crate::config::Config;
use crate::datetime::parse_stored_date;
use crate::error::{Error, Result};
use crate::task::{NewTask, Priority, Status, Task, TaskId};

use super::{TaskBackend, sort_by_due_date};

pub const DEFAULT_TABLE: &str = "task27";
pub const DEFAULT_PAGE_SIZE: usize = 100;
pub const DEFAULT_MAX_PAGES: usize = 10_000;

const PROJECT_ID_ENV_VAR: &str = "TASKTIDE_PROJECT_ID";
const PUBLIC_KEY_ENV_VAR: &str = "TASKTIDE_PUBLIC_KEY";
const PROJECT_ID_HEADER: &str = "X-Project-Id";

const RECORD_FIELDS: [&str; 8] = [
    "Id",
    "title",
    "description",
    "priority",
    "status",
    "dueDate",
    "CreatedOn",
    "ModifiedOn",
];

#[derive(Debug, Clone)]
pub struct RemoteSettings {
    pub base_url: String,
    pub table: String,
    pub project_id: Option<String>,
    pub public_key: Option<String>,
    pub page_size: usize,
    /// Upper bound on query pages walked by one `list` call.
    pub max_pages: usize,
    pub timeout: Option<Duration>,
}

impl RemoteSettings {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            table: DEFAULT_TABLE.to_string(),
            project_id: None,
            public_key: None,
            page_size: DEFAULT_PAGE_SIZE,
            max_pages: DEFAULT_MAX_PAGES,
            timeout: None,
        }
    }

    pub fn from_config(cfg: &Config) -> anyhow::Result<Self> {
        let base_url = cfg
            .get("remote.url")
            .filter(|url| !url.trim().is_empty())
            .ok_or_else(|| anyhow!(Error::Config("remote.url is required for the remote backend".into())))?;

        let page_size = match cfg.get("remote.page_size") {
            Some(raw) => raw
                .trim()
                .parse::<usize>()
                .ok()
                .filter(|size| *size > 0)
                .ok_or_else(|| anyhow!(Error::Config(format!("invalid remote.page_size: {raw}"))))?,
            None => DEFAULT_PAGE_SIZE,
        };

        let timeout = match cfg.get("remote.timeout") {
            Some(raw) => Some(
                raw.trim()
                    .parse::<u64>()
                    .map(Duration::from_secs)
                    .map_err(|_| anyhow!(Error::Config(format!("invalid remote.timeout: {raw}"))))?,
            ),
            None => None,
        };

        Ok(Self {
            base_url: base_url.trim().trim_end_matches('/').to_string(),
            table: cfg.get("remote.table").unwrap_or_else(|| DEFAULT_TABLE.to_string()),
            project_id: cfg
                .get("remote.project_id")
                .or_else(|| std::env::var(PROJECT_ID_ENV_VAR).ok()),
            public_key: cfg
                .get("remote.public_key")
                .or_else(|| std::env::var(PUBLIC_KEY_ENV_VAR).ok()),
            page_size,
            max_pages: DEFAULT_MAX_PAGES,
            timeout,
        })
    }

    fn records_url(&self) -> String {
        format!("{}/tables/{}/records", self.base_url, self.table)
    }
}

/// Client for a table-oriented record service speaking JSON over HTTP.
pub struct RemoteGateway {
    client: reqwest::Client,
    settings: RemoteSettings,
}

impl RemoteGateway {
    pub fn new(settings: RemoteSettings) -> Result<Self> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = settings.timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder.build()?;

        info!(
            base_url = %settings.base_url,
            table = %settings.table,
            page_size = settings.page_size,
            "remote gateway ready"
        );

        Ok(Self { client, settings })
    }

    fn request(&self, method: reqwest::Method, url: String) -> reqwest::RequestBuilder {
        let mut request = self
            .client
            .request(method, url)
            .header(reqwest::header::ACCEPT, "application/json");
        if let Some(project_id) = self.settings.project_id.as_deref() {
            request = request.header(PROJECT_ID_HEADER, project_id);
        }
        if let Some(key) = self.settings.public_key.as_deref() {
            request = request.bearer_auth(key);
        }
        request
    }

    #[instrument(skip(self))]
    async fn fetch_page(&self, offset: usize) -> Result<Vec<BackendRecord>> {
        let body = FetchParams {
            fields: RECORD_FIELDS.iter().map(|name| FieldSpec::named(name)).collect(),
            order_by: vec![OrderBy {
                field: "dueDate".to_string(),
                direction: "asc".to_string(),
            }],
            paging_info: PagingInfo {
                limit: self.settings.page_size,
                offset,
            },
        };

        let response = self
            .request(reqwest::Method::POST, format!("{}/query", self.settings.records_url()))
            .json(&body)
            .send()
            .await?;
        let response: FetchResponse = read_json(response).await?;

        if response.success == Some(false) {
            return Err(Error::Rejected(
                response
                    .message
                    .unwrap_or_else(|| "Failed to fetch tasks".to_string()),
            ));
        }

        let records = response.data.unwrap_or_default();
        debug!(offset, count = records.len(), "fetched page");
        Ok(records)
    }

    async fn list_all(&self) -> Result<Vec<Task>> {
        let now = Utc::now();
        let mut tasks = Vec::new();
        let mut offset = 0;

        for _ in 0..self.settings.max_pages {
            let page = self.fetch_page(offset).await?;
            let page_len = page.len();
            for record in page {
                tasks.push(task_from_record(record, now)?);
            }
            if page_len < self.settings.page_size {
                sort_by_due_date(&mut tasks);
                return Ok(tasks);
            }
            offset += self.settings.page_size;
        }

        Err(Error::Rejected(format!(
            "pagination did not terminate after {} pages",
            self.settings.max_pages
        )))
    }

    async fn write_one(&self, method: reqwest::Method, record: BackendRecord, action: &str) -> Result<Task> {
        let response = self
            .request(method, self.settings.records_url())
            .json(&RecordsPayload { records: vec![record] })
            .send()
            .await?;
        let response: BatchResponse = read_json(response).await?;
        let record = first_success(response, action)?;
        task_from_record(record, Utc::now())
    }
}

#[async_trait]
impl TaskBackend for RemoteGateway {
    fn name(&self) -> &'static str {
        "remote"
    }

    #[instrument(skip(self))]
    async fn list(&self) -> Result<Vec<Task>> {
        let result = self.list_all().await;
        match &result {
            Ok(tasks) => debug!(count = tasks.len(), "listed remote tasks"),
            Err(err) => error!(error = %err, "error fetching tasks"),
        }
        result
    }

    #[instrument(skip(self), fields(id = %id))]
    async fn get(&self, id: &TaskId) -> Result<Option<Task>> {
        let url = format!("{}/{}", self.settings.records_url(), id);
        let result: Result<Option<Task>> = async {
            let response = self.request(reqwest::Method::GET, url).send().await?;
            if response.status() == StatusCode::NOT_FOUND {
                return Ok(None);
            }
            let response: GetResponse = read_json(response).await?;
            match response.data {
                Some(record) => task_from_record(record, Utc::now()).map(Some),
                None => Ok(None),
            }
        }
        .await;

        if let Err(err) = &result {
            error!(id = %id, error = %err, "error fetching task");
        }
        result
    }

    #[instrument(skip(self, task), fields(title_len = task.title.len()))]
    async fn create(&self, task: &NewTask) -> Result<Task> {
        let result = self
            .write_one(reqwest::Method::POST, record_from_new(task), "create")
            .await;
        match &result {
            Ok(created) => info!(id = %created.id, "created remote task"),
            Err(err) => error!(error = %err, "error creating task"),
        }
        result
    }

    #[instrument(skip(self, task), fields(id = %task.id))]
    async fn update(&self, task: &Task) -> Result<Task> {
        let result = self
            .write_one(reqwest::Method::PATCH, record_from_task(task), "update")
            .await;
        match &result {
            Ok(updated) => info!(id = %updated.id, "updated remote task"),
            Err(err) => error!(id = %task.id, error = %err, "error updating task"),
        }
        result
    }

    #[instrument(skip(self), fields(id = %id))]
    async fn delete(&self, id: &TaskId) -> Result<()> {
        let result: Result<()> = async {
            let response = self
                .request(reqwest::Method::DELETE, self.settings.records_url())
                .json(&DeletePayload {
                    record_ids: vec![RecordId::from(id)],
                })
                .send()
                .await?;
            let response: BatchResponse = read_json(response).await?;
            check_delete(response)
        }
        .await;

        match &result {
            Ok(()) => info!(id = %id, "deleted remote task"),
            Err(err) => error!(id = %id, error = %err, "error deleting task"),
        }
        result
    }
}

async fn read_json<T: DeserializeOwned>(response: reqwest::Response) -> Result<T> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        debug!(status = status.as_u16(), "task backend returned error status");
        return Err(Error::Status {
            status: status.as_u16(),
            body,
        });
    }
    Ok(response.json::<T>().await?)
}

/// Any failed record fails the whole call; partial success is not modeled.
fn first_success(response: BatchResponse, action: &str) -> Result<BackendRecord> {
    let results = response.results.unwrap_or_default();
    if !response.success || results.is_empty() {
        return Err(Error::Rejected(
            response
                .message
                .unwrap_or_else(|| format!("Failed to {action} task")),
        ));
    }

    if let Some(message) = failure_message(&results) {
        return Err(Error::Rejected(message));
    }

    results
        .into_iter()
        .next()
        .and_then(|result| result.data)
        .ok_or_else(|| Error::MalformedRecord(format!("{action} succeeded without returning a record")))
}

fn check_delete(response: BatchResponse) -> Result<()> {
    if !response.success {
        return Err(Error::Rejected(
            response
                .message
                .unwrap_or_else(|| "Failed to delete task".to_string()),
        ));
    }
    if let Some(message) = response.results.as_deref().and_then(failure_message) {
        return Err(Error::Rejected(message));
    }
    Ok(())
}

fn failure_message(results: &[RecordResult]) -> Option<String> {
    let failed: Vec<&RecordResult> = results.iter().filter(|result| !result.success).collect();
    if failed.is_empty() {
        return None;
    }

    let messages: Vec<String> = failed
        .iter()
        .flat_map(|result| {
            result
                .errors
                .iter()
                .flatten()
                .map(|err| err.message.clone())
                .chain(result.message.clone())
        })
        .filter(|message| !message.trim().is_empty())
        .collect();

    if messages.is_empty() {
        Some("Unknown error occurred".to_string())
    } else {
        Some(messages.join(", "))
    }
}

/// Record ids come back as numbers from most tables, strings from some.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RecordId {
    Number(i64),
    Text(String),
}

impl From<&TaskId> for RecordId {
    fn from(id: &TaskId) -> Self {
        match id.as_str().parse::<i64>() {
            Ok(number) => Self::Number(number),
            Err(_) => Self::Text(id.as_str().to_string()),
        }
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(number) => write!(f, "{number}"),
            Self::Text(text) => f.write_str(text),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BackendRecord {
    #[serde(rename = "Id", default, skip_serializing_if = "Option::is_none")]
    pub id: Option<RecordId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(rename = "dueDate", default, skip_serializing_if = "Option::is_none")]
    pub due_date: Option<String>,
    #[serde(rename = "CreatedOn", default, skip_serializing_if = "Option::is_none")]
    pub created_on: Option<String>,
    #[serde(rename = "ModifiedOn", default, skip_serializing_if = "Option::is_none")]
    pub modified_on: Option<String>,
}

/// Backend fields to domain model. Absent fields fall back to fixed defaults;
/// a record without an id or a readable due date is rejected.
pub fn task_from_record(record: BackendRecord, now: DateTime<Utc>) -> Result<Task> {
    let id = record
        .id
        .map(|id| TaskId::new(id.to_string()))
        .ok_or_else(|| Error::MalformedRecord("record has no Id".to_string()))?;

    let due_date = record
        .due_date
        .as_deref()
        .and_then(parse_stored_date)
        .ok_or_else(|| {
            Error::MalformedRecord(format!(
                "record {id} has no readable dueDate ({:?})",
                record.due_date
            ))
        })?;

    Ok(Task {
        id,
        title: record.title.unwrap_or_default(),
        description: record.description.unwrap_or_default(),
        priority: record
            .priority
            .as_deref()
            .and_then(Priority::from_key)
            .unwrap_or_default(),
        status: record
            .status
            .as_deref()
            .and_then(Status::from_key)
            .unwrap_or_default(),
        due_date,
        created_at: parse_timestamp(record.created_on.as_deref()).unwrap_or(now),
        updated_at: parse_timestamp(record.modified_on.as_deref()).unwrap_or(now),
    })
}

/// Domain model to backend fields. Timestamps stay with the backend.
pub fn record_from_task(task: &Task) -> BackendRecord {
    BackendRecord {
        id: Some(RecordId::from(&task.id)),
        title: Some(task.title.clone()),
        description: Some(task.description.clone()),
        priority: Some(task.priority.as_key().to_string()),
        status: Some(task.status.as_key().to_string()),
        due_date: Some(task.due_date.format("%Y-%m-%d").to_string()),
        created_on: None,
        modified_on: None,
    }
}

pub fn record_from_new(task: &NewTask) -> BackendRecord {
    BackendRecord {
        id: None,
        title: Some(task.title.clone()),
        description: Some(task.description.clone()),
        priority: Some(task.priority.as_key().to_string()),
        status: Some(Status::Pending.as_key().to_string()),
        due_date: Some(task.due_date.format("%Y-%m-%d").to_string()),
        created_on: None,
        modified_on: None,
    }
}

fn parse_timestamp(raw: Option<&str>) -> Option<DateTime<Utc>> {
    raw.and_then(|value| DateTime::parse_from_rfc3339(value.trim()).ok())
        .map(|dt| dt.with_timezone(&Utc))
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldSpec {
    #[serde(rename = "Field")]
    pub field: FieldName,
}

impl FieldSpec {
    fn named(name: &str) -> Self {
        Self {
            field: FieldName {
                name: name.to_string(),
            },
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldName {
    #[serde(rename = "Name")]
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderBy {
    pub field: String,
    pub direction: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PagingInfo {
    pub limit: usize,
    pub offset: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchParams {
    #[serde(rename = "fields")]
    pub fields: Vec<FieldSpec>,
    #[serde(rename = "orderBy")]
    pub order_by: Vec<OrderBy>,
    #[serde(rename = "pagingInfo")]
    pub paging_info: PagingInfo,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FetchResponse {
    #[serde(default)]
    pub success: Option<bool>,
    #[serde(default)]
    pub data: Option<Vec<BackendRecord>>,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GetResponse {
    #[serde(default)]
    pub success: Option<bool>,
    #[serde(default)]
    pub data: Option<BackendRecord>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordsPayload {
    pub records: Vec<BackendRecord>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeletePayload {
    #[serde(rename = "recordIds")]
    pub record_ids: Vec<RecordId>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BatchResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub results: Option<Vec<RecordResult>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RecordResult {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub data: Option<BackendRecord>,
    #[serde(default)]
    pub errors: Option<Vec<RecordError>>,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordError {
    pub message: String,
}
