use std::fs;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, anyhow};
use tempfile::NamedTempFile;
use tracing::{debug, info};

use crate::task::Task;

/// File-backed session and cache store under the data directory: the
/// access token, the login payload, and the last task snapshot fetched
/// from the server (the offline fallback for list views).
#[derive(Debug)]
pub struct DataStore {
    pub data_dir: PathBuf,
    pub token_path: PathBuf,
    pub user_path: PathBuf,
    pub snapshot_path: PathBuf,
}

impl DataStore {
    #[tracing::instrument(skip(data_dir))]
    pub fn open(data_dir: &Path) -> anyhow::Result<Self> {
        let data_dir = data_dir.to_path_buf();
        fs::create_dir_all(&data_dir)
            .with_context(|| format!("failed to create {}", data_dir.display()))?;

        let token_path = data_dir.join("token.data");
        let user_path = data_dir.join("user.data");
        let snapshot_path = data_dir.join("snapshot.data");

        info!(
            data_dir = %data_dir.display(),
            token = %token_path.display(),
            user = %user_path.display(),
            snapshot = %snapshot_path.display(),
            "opened datastore"
        );

        Ok(Self {
            data_dir,
            token_path,
            user_path,
            snapshot_path,
        })
    }

    #[tracing::instrument(skip(self, token))]
    pub fn save_token(&self, token: &str) -> anyhow::Result<()> {
        fs::write(&self.token_path, token)
            .with_context(|| format!("failed writing {}", self.token_path.display()))?;
        Ok(())
    }

    /// `None` means logged out. Placeholder junk some clients persist
    /// ("undefined", "null") counts as logged out too.
    #[tracing::instrument(skip(self))]
    pub fn load_token(&self) -> anyhow::Result<Option<String>> {
        if !self.token_path.exists() {
            return Ok(None);
        }
        let raw = fs::read_to_string(&self.token_path)
            .with_context(|| format!("failed reading {}", self.token_path.display()))?;
        let trimmed = raw.trim();
        if trimmed.is_empty() || trimmed == "undefined" || trimmed == "null" {
            return Ok(None);
        }
        Ok(Some(trimmed.to_string()))
    }

    #[tracing::instrument(skip(self, user))]
    pub fn save_user(&self, user: &serde_json::Value) -> anyhow::Result<()> {
        let serialized = serde_json::to_string(user).context("failed serializing user payload")?;
        fs::write(&self.user_path, serialized)
            .with_context(|| format!("failed writing {}", self.user_path.display()))?;
        Ok(())
    }

    #[tracing::instrument(skip(self))]
    pub fn load_user(&self) -> anyhow::Result<Option<serde_json::Value>> {
        if !self.user_path.exists() {
            return Ok(None);
        }
        let raw = fs::read_to_string(&self.user_path)
            .with_context(|| format!("failed reading {}", self.user_path.display()))?;
        if raw.trim().is_empty() {
            return Ok(None);
        }
        let value = serde_json::from_str(&raw)
            .with_context(|| format!("failed parsing {}", self.user_path.display()))?;
        Ok(Some(value))
    }

    /// Removes every piece of session state, the snapshot included.
    #[tracing::instrument(skip(self))]
    pub fn clear_session(&self) -> anyhow::Result<()> {
        for path in [&self.token_path, &self.user_path, &self.snapshot_path] {
            if path.exists() {
                fs::remove_file(path)
                    .with_context(|| format!("failed removing {}", path.display()))?;
            }
        }
        info!("cleared session state");
        Ok(())
    }

    /// Overwrites the snapshot wholesale; each successful fetch replaces
    /// the previous one.
    #[tracing::instrument(skip(self, tasks))]
    pub fn save_snapshot(&self, tasks: &[Task]) -> anyhow::Result<()> {
        save_jsonl_atomic(&self.snapshot_path, tasks).context("failed to save snapshot.data")
    }

    /// `None` means no snapshot has been written yet; a present but
    /// unreadable snapshot is an error, not an empty result.
    #[tracing::instrument(skip(self))]
    pub fn load_snapshot(&self) -> anyhow::Result<Option<Vec<Task>>> {
        if !self.snapshot_path.exists() {
            return Ok(None);
        }
        let tasks = load_jsonl(&self.snapshot_path).context("failed to load snapshot.data")?;
        Ok(Some(tasks))
    }
}

#[tracing::instrument(skip(path))]
fn load_jsonl(path: &Path) -> anyhow::Result<Vec<Task>> {
    debug!(file = %path.display(), "loading jsonl");
    let file = fs::File::open(path)?;
    let reader = BufReader::new(file);

    let mut out = Vec::new();
    for (idx, line) in reader.lines().enumerate() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        let task: Task = serde_json::from_str(trimmed)
            .with_context(|| format!("failed parsing {} line {}", path.display(), idx + 1))?;
        out.push(task);
    }

    debug!(count = out.len(), "loaded tasks from jsonl");
    Ok(out)
}

#[tracing::instrument(skip(path, tasks))]
fn save_jsonl_atomic(path: &Path, tasks: &[Task]) -> anyhow::Result<()> {
    debug!(file = %path.display(), count = tasks.len(), "saving jsonl atomically");

    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let mut temp = NamedTempFile::new_in(dir)?;
    for task in tasks {
        let serialized = serde_json::to_string(task)?;
        writeln!(temp, "{serialized}")?;
    }
    temp.flush()?;

    temp.persist(path)
        .map_err(|err| anyhow!("failed to persist {}: {}", path.display(), err))?;

    Ok(())
}
