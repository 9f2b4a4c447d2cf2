use anyhow::{Context, anyhow};
use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::{debug, info, instrument, warn};

use crate::api::{ApiClient, NewTask, TaskPatch};
use crate::auth;
use crate::cli::Command;
use crate::config::Config;
use crate::datastore::DataStore;
use crate::datetime::parse_deadline_expr;
use crate::render::Renderer;
use crate::task::{Category, Priority, Status, Task, ViewStatus};
use crate::validate::{FieldError, validate_task_fields};
use crate::view::{self, CategoryFilter, FilterState, StatusFilter, TimeFilter};

#[instrument(skip(store, cfg, api, renderer, command))]
pub fn dispatch(
    store: &DataStore,
    cfg: &Config,
    api: &ApiClient,
    renderer: &mut Renderer,
    command: Command,
) -> anyhow::Result<()> {
    let now = Utc::now();
    debug!(command = ?command, "dispatching command");

    match command {
        Command::List {
            status,
            category,
            due,
            search,
            page,
        } => cmd_list(
            store, cfg, api, renderer, status, category, due, search, page, now,
        ),
        Command::Add {
            title,
            description,
            priority,
            category,
            status,
            deadline,
        } => cmd_add(
            store, api, title, description, priority, category, status, deadline, now,
        ),
        Command::Edit {
            id,
            title,
            description,
            priority,
            category,
            status,
            deadline,
        } => cmd_edit(
            store, api, &id, title, description, priority, category, status, deadline, now,
        ),
        Command::Done { id } => cmd_set_status(store, api, &id, Status::Completed),
        Command::Undone { id } => cmd_set_status(store, api, &id, Status::Active),
        Command::Doing { id } => cmd_set_status(store, api, &id, Status::Doing),
        Command::Delete { id } => cmd_delete(store, api, &id),
        Command::ClearCompleted => cmd_clear_completed(store, api),
        Command::Show { id } => cmd_show(store, api, renderer, &id, now),
        Command::Register {
            email,
            password,
            age,
            phone,
        } => cmd_register(api, &email, &password, age, &phone),
        Command::Login { email, password } => cmd_login(store, api, &email, &password),
        Command::Logout => cmd_logout(store),
        Command::Whoami => cmd_whoami(store),
    }
}

fn require_token(store: &DataStore) -> anyhow::Result<String> {
    store
        .load_token()?
        .ok_or_else(|| anyhow!("not logged in; run `taskdeck login` first"))
}

/// Fetches the live task list, falling back to the cached snapshot when
/// the server is unreachable. A successful fetch refreshes the cache;
/// cache write failures are logged but never fail the command.
fn fetch_tasks(store: &DataStore, api: &ApiClient, token: &str) -> anyhow::Result<Vec<Task>> {
    match api.list_tasks(token) {
        Ok(tasks) => {
            if let Err(err) = store.save_snapshot(&tasks) {
                warn!(error = %err, "failed to refresh task snapshot");
            }
            Ok(tasks)
        }
        Err(err) => {
            warn!(error = %err, "task fetch failed, trying cached snapshot");
            let cached = store
                .load_snapshot()?
                .ok_or(err)
                .context("server unreachable and no cached tasks available")?;
            println!("Server unreachable; showing cached tasks.");
            Ok(cached)
        }
    }
}

fn refresh_snapshot(store: &DataStore, api: &ApiClient, token: &str) {
    match api.list_tasks(token) {
        Ok(tasks) => {
            if let Err(err) = store.save_snapshot(&tasks) {
                warn!(error = %err, "failed to refresh task snapshot");
            }
        }
        Err(err) => warn!(error = %err, "failed to refresh task list after change"),
    }
}

/// Email from the login payload saved at login time, used when the
/// session token carries no email claim. The payload is either the user
/// record itself or an envelope with a `user` object inside.
fn stored_user_email(store: &DataStore) -> anyhow::Result<Option<String>> {
    let Some(user) = store.load_user()? else {
        return Ok(None);
    };
    Ok(user
        .get("email")
        .or_else(|| user.get("user").and_then(|inner| inner.get("email")))
        .and_then(Value::as_str)
        .map(ToString::to_string))
}

fn field_errors_to_anyhow(errors: Vec<FieldError>) -> anyhow::Error {
    let joined = errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ");
    anyhow!("{joined}")
}

fn parse_priority(raw: &str) -> anyhow::Result<Priority> {
    Priority::parse(raw)
        .ok_or_else(|| anyhow!("invalid priority: {raw} (expected high, medium, low)"))
}

fn parse_category(raw: &str) -> anyhow::Result<Category> {
    Category::parse(raw).ok_or_else(|| {
        anyhow!("invalid category: {raw} (expected work, personal, shopping, health, education, other)")
    })
}

fn parse_status(raw: &str) -> anyhow::Result<Status> {
    ViewStatus::parse(raw)
        .map(ViewStatus::status)
        .ok_or_else(|| anyhow!("invalid status: {raw} (expected todo, doing, done)"))
}

#[allow(clippy::too_many_arguments)]
#[instrument(skip(store, cfg, api, renderer, now))]
fn cmd_list(
    store: &DataStore,
    cfg: &Config,
    api: &ApiClient,
    renderer: &mut Renderer,
    status: Option<String>,
    category: Option<String>,
    due: Option<String>,
    search: Option<String>,
    page: Option<usize>,
    now: DateTime<Utc>,
) -> anyhow::Result<()> {
    info!("command list");

    let token = require_token(store)?;
    let tasks = fetch_tasks(store, api, &token)?;

    let mut state = FilterState::default().with_page_size(cfg.page_size());
    if let Some(raw) = status {
        let filter = StatusFilter::parse(&raw)
            .ok_or_else(|| anyhow!("invalid status filter: {raw} (expected all, todo, doing, done)"))?;
        state = state.with_status(filter);
    }
    if let Some(raw) = category {
        let filter = CategoryFilter::parse(&raw).ok_or_else(|| {
            anyhow!(
                "invalid category filter: {raw} (expected all, work, personal, shopping, health, education, other)"
            )
        })?;
        state = state.with_category(filter);
    }
    if let Some(raw) = due {
        let filter = TimeFilter::parse(&raw).ok_or_else(|| {
            anyhow!(
                "invalid due filter: {raw} (expected all, overdue, today, next7d, next30d, nodeadline)"
            )
        })?;
        state = state.with_time(filter);
    }
    if let Some(keyword) = search {
        state = state.with_search(keyword);
    }
    // Page is applied last so the filter setters cannot reset it.
    if let Some(page) = page {
        state = state.with_page(page);
    }

    let user_id = auth::current_user_id(store);
    let view = view::build_view(tasks, user_id.as_deref(), &state, now);
    renderer.print_task_page(&view, now)
}

#[allow(clippy::too_many_arguments)]
#[instrument(skip(store, api, now))]
fn cmd_add(
    store: &DataStore,
    api: &ApiClient,
    title: String,
    description: Option<String>,
    priority: Option<String>,
    category: Option<String>,
    status: Option<String>,
    deadline: Option<String>,
    now: DateTime<Utc>,
) -> anyhow::Result<()> {
    info!("command add");

    let token = require_token(store)?;

    let priority = match priority.as_deref() {
        Some(raw) => parse_priority(raw)?,
        None => Priority::Medium,
    };
    let category = match category.as_deref() {
        Some(raw) => parse_category(raw)?,
        None => Category::Work,
    };
    let status = match status.as_deref() {
        Some(raw) => parse_status(raw)?,
        None => Status::Active,
    };
    let deadline = deadline
        .as_deref()
        .map(|expr| parse_deadline_expr(expr, now))
        .transpose()?;

    validate_task_fields(Some(&title), description.as_deref(), deadline, now)
        .map_err(field_errors_to_anyhow)?;

    let new_task = NewTask {
        title,
        priority,
        status,
        owner_id: auth::current_user_id(store),
        description: description.unwrap_or_default(),
        deadline,
        category,
    };

    api.create_task(&new_task, &token)?;
    refresh_snapshot(store, api, &token);

    println!("Created task '{}'.", new_task.title);
    Ok(())
}

#[allow(clippy::too_many_arguments)]
#[instrument(skip(store, api, now))]
fn cmd_edit(
    store: &DataStore,
    api: &ApiClient,
    id: &str,
    title: Option<String>,
    description: Option<String>,
    priority: Option<String>,
    category: Option<String>,
    status: Option<String>,
    deadline: Option<String>,
    now: DateTime<Utc>,
) -> anyhow::Result<()> {
    info!("command edit");

    let token = require_token(store)?;

    let patch = TaskPatch {
        title,
        priority: priority.as_deref().map(parse_priority).transpose()?,
        status: status.as_deref().map(parse_status).transpose()?,
        description,
        deadline: deadline
            .as_deref()
            .map(|expr| parse_deadline_expr(expr, now))
            .transpose()?,
        category: category.as_deref().map(parse_category).transpose()?,
    };

    if patch.is_empty() {
        return Err(anyhow!("nothing to change; pass at least one field flag"));
    }

    validate_task_fields(
        patch.title.as_deref(),
        patch.description.as_deref(),
        patch.deadline,
        now,
    )
    .map_err(field_errors_to_anyhow)?;

    api.update_task(id, &patch, &token)?;
    refresh_snapshot(store, api, &token);

    println!("Updated task {id}.");
    Ok(())
}

#[instrument(skip(store, api))]
fn cmd_set_status(
    store: &DataStore,
    api: &ApiClient,
    id: &str,
    status: Status,
) -> anyhow::Result<()> {
    info!(status = %status.view(), "command set-status");

    let token = require_token(store)?;
    api.update_task(id, &TaskPatch::status(status), &token)?;
    refresh_snapshot(store, api, &token);

    println!("Marked task {id} as {}.", status.view());
    Ok(())
}

#[instrument(skip(store, api))]
fn cmd_delete(store: &DataStore, api: &ApiClient, id: &str) -> anyhow::Result<()> {
    info!("command delete");

    let token = require_token(store)?;
    api.delete_task(id, &token)?;
    refresh_snapshot(store, api, &token);

    println!("Deleted task {id}.");
    Ok(())
}

#[instrument(skip(store, api))]
fn cmd_clear_completed(store: &DataStore, api: &ApiClient) -> anyhow::Result<()> {
    info!("command clear-completed");

    let token = require_token(store)?;
    let user_id = auth::current_user_id(store);
    let completed = view::scope_to_user(api.list_completed(&token)?, user_id.as_deref());

    if completed.is_empty() {
        println!("No completed tasks to clear.");
        return Ok(());
    }

    let mut cleared = 0_usize;
    for task in &completed {
        api.delete_task(&task.id, &token)
            .with_context(|| format!("failed to delete completed task {}", task.id))?;
        cleared += 1;
    }
    refresh_snapshot(store, api, &token);

    println!("Cleared {cleared} completed task(s).");
    Ok(())
}

#[instrument(skip(store, api, renderer, now))]
fn cmd_show(
    store: &DataStore,
    api: &ApiClient,
    renderer: &mut Renderer,
    id: &str,
    now: DateTime<Utc>,
) -> anyhow::Result<()> {
    info!("command show");

    let token = require_token(store)?;
    let task = api.get_task(id, &token)?;
    renderer.print_task_info(&task, now)
}

#[instrument(skip(api, password))]
fn cmd_register(
    api: &ApiClient,
    email: &str,
    password: &str,
    age: u32,
    phone: &str,
) -> anyhow::Result<()> {
    info!("command register");

    auth::validate_registration(email, password, age, phone).map_err(field_errors_to_anyhow)?;
    api.register(email, password, age, phone)?;

    println!("Registered {email}. You can now log in.");
    Ok(())
}

#[instrument(skip(store, api, password))]
fn cmd_login(
    store: &DataStore,
    api: &ApiClient,
    email: &str,
    password: &str,
) -> anyhow::Result<()> {
    info!("command login");

    let response = api.login(email, password)?;
    store.save_token(&response.access_token)?;
    if let Some(user) = &response.user {
        store.save_user(user)?;
    }

    let identity = auth::decode_jwt_claims(&response.access_token)
        .as_ref()
        .and_then(auth::claim_email)
        .unwrap_or_else(|| email.to_string());
    println!("Logged in as {identity}.");
    Ok(())
}

#[instrument(skip(store))]
fn cmd_logout(store: &DataStore) -> anyhow::Result<()> {
    info!("command logout");

    store.clear_session()?;
    println!("Logged out.");
    Ok(())
}

#[instrument(skip(store))]
fn cmd_whoami(store: &DataStore) -> anyhow::Result<()> {
    info!("command whoami");

    let Some(token) = store.load_token()? else {
        println!("Not logged in.");
        return Ok(());
    };

    let claims = auth::decode_jwt_claims(&token);
    let user_id = claims.as_ref().and_then(auth::claim_user_id);
    let email = match claims.as_ref().and_then(auth::claim_email) {
        Some(email) => Some(email),
        None => stored_user_email(store)?,
    };

    match (user_id, email) {
        (Some(id), Some(email)) => println!("{email} ({id})"),
        (Some(id), None) => println!("{id}"),
        (None, Some(email)) => println!("{email}"),
        (None, None) => println!("Logged in, but the session token carries no identity claims."),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::fs;

    use serde_json::json;
    use tempfile::tempdir;

    use super::{fetch_tasks, stored_user_email};
    use crate::api::ApiClient;
    use crate::config::Config;
    use crate::datastore::DataStore;
    use crate::task::{Status, Task};

    fn unreachable_client(dir: &std::path::Path) -> ApiClient {
        let rc = dir.join("rc");
        fs::write(&rc, "api.url = http://127.0.0.1:9\n").expect("write rc");
        let cfg = Config::load(Some(&rc)).expect("load config");
        ApiClient::new(&cfg).expect("build client")
    }

    #[test]
    fn unreachable_server_without_snapshot_propagates() {
        let dir = tempdir().expect("tempdir");
        let api = unreachable_client(dir.path());
        let store = DataStore::open(dir.path()).expect("open datastore");

        let err = fetch_tasks(&store, &api, "tok").expect_err("no snapshot to fall back to");
        assert!(format!("{err:#}").contains("no cached tasks available"));
    }

    #[test]
    fn unreachable_server_falls_back_to_snapshot() {
        let dir = tempdir().expect("tempdir");
        let api = unreachable_client(dir.path());
        let store = DataStore::open(dir.path()).expect("open datastore");

        store
            .save_snapshot(&[Task::new("c1", "Cached chore", Status::Active)])
            .expect("save snapshot");

        let tasks = fetch_tasks(&store, &api, "tok").expect("cached tasks");
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].id, "c1");
    }

    #[test]
    fn stored_user_email_reads_either_payload_shape() {
        let dir = tempdir().expect("tempdir");
        let store = DataStore::open(dir.path()).expect("open datastore");

        assert_eq!(stored_user_email(&store).expect("no user"), None);

        store
            .save_user(&json!({"email": "a@b.co"}))
            .expect("save user");
        assert_eq!(
            stored_user_email(&store).expect("flat payload").as_deref(),
            Some("a@b.co")
        );

        store
            .save_user(&json!({"user": {"email": "c@d.co"}}))
            .expect("save user");
        assert_eq!(
            stored_user_email(&store).expect("nested payload").as_deref(),
            Some("c@d.co")
        );
    }
}
