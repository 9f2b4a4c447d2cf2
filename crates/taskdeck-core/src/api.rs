use std::time::Duration;

use anyhow::{Context, anyhow};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, instrument, warn};

use crate::config::Config;
use crate::datetime::lenient_date_serde;
use crate::task::{Category, Priority, Status, Task};

const GENERIC_ERROR: &str = "An error occurred. Please try again.";

/// Synchronous client for the remote task service. Every method returns
/// `Err` for transport failures and non-2xx responses, which callers can
/// tell apart from an empty-but-successful result.
#[derive(Debug)]
pub struct ApiClient {
    base_url: String,
    http: reqwest::blocking::Client,
}

#[derive(Debug, Clone, Serialize)]
pub struct NewTask {
    #[serde(rename = "task")]
    pub title: String,
    pub priority: Priority,
    pub status: Status,
    #[serde(rename = "userId", skip_serializing_if = "Option::is_none")]
    pub owner_id: Option<String>,
    pub description: String,
    #[serde(with = "lenient_date_serde")]
    pub deadline: Option<DateTime<Utc>>,
    pub category: Category,
}

/// Partial update; absent fields are left untouched by the server.
#[derive(Debug, Clone, Default, Serialize)]
pub struct TaskPatch {
    #[serde(rename = "task", skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<Priority>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<Status>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(
        skip_serializing_if = "Option::is_none",
        serialize_with = "lenient_date_serde::serialize"
    )]
    pub deadline: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<Category>,
}

impl TaskPatch {
    pub fn status(status: Status) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.priority.is_none()
            && self.status.is_none()
            && self.description.is_none()
            && self.deadline.is_none()
            && self.category.is_none()
    }
}

#[derive(Debug, Clone)]
pub struct LoginResponse {
    pub access_token: String,
    pub user: Option<Value>,
}

impl ApiClient {
    pub fn new(cfg: &Config) -> anyhow::Result<Self> {
        let http = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .context("failed to build http client")?;

        Ok(Self {
            base_url: cfg.api_url().trim_end_matches('/').to_string(),
            http,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    #[instrument(skip(self, password))]
    pub fn register(&self, email: &str, password: &str, age: u32, phone: &str) -> anyhow::Result<()> {
        let resp = self
            .http
            .post(self.url("/auth/register"))
            .json(&serde_json::json!({
                "email": email,
                "password": password,
                "age": age,
                "phone": phone,
            }))
            .send()
            .context("register request failed")?;
        ensure_success(resp).map(|_| ())
    }

    #[instrument(skip(self, password))]
    pub fn login(&self, email: &str, password: &str) -> anyhow::Result<LoginResponse> {
        let resp = self
            .http
            .post(self.url("/auth/login"))
            .json(&serde_json::json!({"email": email, "password": password}))
            .send()
            .context("login request failed")?;
        let body = ensure_success(resp)?;

        let access_token = extract_access_token(&body)
            .ok_or_else(|| anyhow!("login succeeded but response carried no access token"))?;
        let user = body.get("data").filter(|v| v.is_object()).cloned();

        debug!("login accepted");
        Ok(LoginResponse { access_token, user })
    }

    #[instrument(skip(self, token))]
    pub fn list_tasks(&self, token: &str) -> anyhow::Result<Vec<Task>> {
        let resp = self
            .http
            .get(self.url("/task"))
            .bearer_auth(token)
            .send()
            .context("task list request failed")?;
        let body = ensure_success(resp)?;
        parse_task_list(body)
    }

    #[instrument(skip(self, token))]
    pub fn list_completed(&self, token: &str) -> anyhow::Result<Vec<Task>> {
        let resp = self
            .http
            .get(self.url("/task"))
            .query(&[("status", "COMPLETED")])
            .bearer_auth(token)
            .send()
            .context("completed task list request failed")?;
        let body = ensure_success(resp)?;
        parse_task_list(body)
    }

    #[instrument(skip(self, token))]
    pub fn get_task(&self, id: &str, token: &str) -> anyhow::Result<Task> {
        let resp = self
            .http
            .get(self.url(&format!("/task/{id}")))
            .bearer_auth(token)
            .send()
            .context("task fetch request failed")?;
        let body = ensure_success(resp)?;
        serde_json::from_value(extract_data(body))
            .with_context(|| format!("failed to parse task {id}"))
    }

    #[instrument(skip(self, new_task, token), fields(title = %new_task.title))]
    pub fn create_task(&self, new_task: &NewTask, token: &str) -> anyhow::Result<()> {
        let resp = self
            .http
            .post(self.url("/task"))
            .bearer_auth(token)
            .json(new_task)
            .send()
            .context("task create request failed")?;
        ensure_success(resp).map(|_| ())
    }

    #[instrument(skip(self, patch, token))]
    pub fn update_task(&self, id: &str, patch: &TaskPatch, token: &str) -> anyhow::Result<()> {
        let resp = self
            .http
            .patch(self.url(&format!("/task/{id}")))
            .bearer_auth(token)
            .json(patch)
            .send()
            .context("task update request failed")?;
        ensure_success(resp).map(|_| ())
    }

    #[instrument(skip(self, token))]
    pub fn delete_task(&self, id: &str, token: &str) -> anyhow::Result<()> {
        let resp = self
            .http
            .delete(self.url(&format!("/task/{id}")))
            .bearer_auth(token)
            .send()
            .context("task delete request failed")?;
        ensure_success(resp).map(|_| ())
    }
}

fn ensure_success(resp: reqwest::blocking::Response) -> anyhow::Result<Value> {
    let status = resp.status();
    let text = resp.text().unwrap_or_default();
    let body: Value = if text.trim().is_empty() {
        Value::Null
    } else {
        serde_json::from_str(&text).unwrap_or(Value::Null)
    };

    if status.is_success() {
        Ok(body)
    } else {
        Err(anyhow!("server responded {status}: {}", error_message(&body)))
    }
}

/// Server error payloads carry a human message either at the top level
/// or inside the data envelope.
fn error_message(body: &Value) -> String {
    body.get("message")
        .and_then(Value::as_str)
        .or_else(|| {
            body.get("data")
                .and_then(|data| data.get("message"))
                .and_then(Value::as_str)
        })
        .unwrap_or(GENERIC_ERROR)
        .to_string()
}

/// Responses wrap the payload in `{"data": ...}`; some endpoints return
/// the payload bare. Accept both.
fn extract_data(body: Value) -> Value {
    match body {
        Value::Object(mut map) if map.contains_key("data") => {
            map.remove("data").unwrap_or(Value::Null)
        }
        other => other,
    }
}

fn extract_access_token(body: &Value) -> Option<String> {
    body.get("data")
        .and_then(|data| data.get("accessToken"))
        .or_else(|| body.get("accessToken"))
        .and_then(Value::as_str)
        .filter(|token| !token.is_empty())
        .map(ToString::to_string)
}

fn parse_task_list(body: Value) -> anyhow::Result<Vec<Task>> {
    match extract_data(body) {
        Value::Null => Ok(Vec::new()),
        data @ Value::Array(_) => {
            serde_json::from_value(data).context("failed to parse task list")
        }
        other => {
            warn!(?other, "unexpected task list payload shape; treating as empty");
            Ok(Vec::new())
        }
    }
}
