//! Folder-per-intention persistence.
//!
//! ```text
//! <root>/<status>/<id>/manifest.json
//! <root>/<status>/<id>/scratchpad/NNNN-<kind>.json
//! <root>/<status>/<id>/plans/v<N>.json
//! <root>/<status>/<id>/reviews/<plan|outcome>-v<N>.json
//! <root>/<status>/<id>/executions/attempt-<NNN>.json
//! ```
//!
//! Each intention folder is a single-writer log: every write takes that
//! intention's async lock, so scratchpad sequence numbers are assigned
//! exactly once. Manifests are written to a temporary file and renamed into
//! place. A status change that crosses buckets moves the whole folder.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::executor::Execution;
use crate::intent::journal::LifecycleEntry;
use crate::intent::types::{Intention, IntentionId, IntentionStage, IntentionStatus};
use crate::planner::types::{Plan, PlanReview};
use crate::review::OutcomeReview;

pub const MANIFEST_FILE: &str = "manifest.json";
pub const SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid json at {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("intention {0} not found")]
    NotFound(IntentionId),
    #[error("intention {0} already exists")]
    AlreadyExists(IntentionId),
}

fn io_err(path: &Path) -> impl FnOnce(std::io::Error) -> StoreError + '_ {
    move |source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    pub schema_version: u32,
    /// Derived from `intention.status`; written for readers of the folder.
    pub stage: IntentionStage,
    pub intention: Intention,
}

impl Manifest {
    pub fn new(intention: Intention) -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            stage: intention.stage(),
            intention,
        }
    }
}

/// Days a terminal intention is kept after its last update. `None` keeps it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetentionPolicy {
    pub completed_days: Option<u32>,
    pub abandoned_days: Option<u32>,
    pub failed_days: Option<u32>,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self {
            completed_days: Some(30),
            abandoned_days: Some(14),
            failed_days: Some(14),
        }
    }
}

impl RetentionPolicy {
    pub fn days_for(&self, status: IntentionStatus) -> Option<u32> {
        match status {
            IntentionStatus::Completed => self.completed_days,
            IntentionStatus::Abandoned => self.abandoned_days,
            IntentionStatus::Failed => self.failed_days,
            _ => None,
        }
    }
}

async fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<(), StoreError> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await.map_err(io_err(parent))?;
    }
    let json = serde_json::to_vec_pretty(value).map_err(|source| StoreError::Json {
        path: path.to_path_buf(),
        source,
    })?;
    let tmp = path.with_extension("json.tmp");
    tokio::fs::write(&tmp, json).await.map_err(io_err(&tmp))?;
    tokio::fs::rename(&tmp, path).await.map_err(io_err(path))
}

async fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, StoreError> {
    let bytes = tokio::fs::read(path).await.map_err(io_err(path))?;
    serde_json::from_slice(&bytes).map_err(|source| StoreError::Json {
        path: path.to_path_buf(),
        source,
    })
}

pub struct IntentionStore {
    root: PathBuf,
    index: Mutex<HashMap<IntentionId, IntentionStatus>>,
    locks: Mutex<HashMap<IntentionId, Arc<AsyncMutex<()>>>>,
}

impl IntentionStore {
    /// Opens (or creates) a store and rebuilds the id index from disk.
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let root = root.into();
        tokio::fs::create_dir_all(&root).await.map_err(io_err(&root))?;

        let mut index = HashMap::new();
        for status in IntentionStatus::ALL {
            let bucket = root.join(status.label());
            if !tokio::fs::try_exists(&bucket).await.map_err(io_err(&bucket))? {
                continue;
            }
            let mut entries = tokio::fs::read_dir(&bucket).await.map_err(io_err(&bucket))?;
            while let Some(entry) = entries.next_entry().await.map_err(io_err(&bucket))? {
                let name = entry.file_name();
                match name.to_str().and_then(|n| Uuid::parse_str(n).ok()) {
                    Some(uuid) => {
                        index.insert(IntentionId(uuid), status);
                    }
                    None => warn!(path = %entry.path().display(), "ignoring unexpected entry in store"),
                }
            }
        }
        info!(root = %root.display(), intentions = index.len(), "intention store opened");

        Ok(Self {
            root,
            index: Mutex::new(index),
            locks: Mutex::new(HashMap::new()),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn folder(&self, id: IntentionId, status: IntentionStatus) -> PathBuf {
        self.root.join(status.label()).join(id.to_string())
    }

    fn lock_for(&self, id: IntentionId) -> Arc<AsyncMutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        locks.entry(id).or_insert_with(|| Arc::new(AsyncMutex::new(()))).clone()
    }

    pub fn status_of(&self, id: IntentionId) -> Option<IntentionStatus> {
        self.index.lock().unwrap_or_else(|e| e.into_inner()).get(&id).copied()
    }

    pub fn contains(&self, id: IntentionId) -> bool {
        self.status_of(id).is_some()
    }

    pub fn ids_with_status(&self, status: IntentionStatus) -> Vec<IntentionId> {
        let index = self.index.lock().unwrap_or_else(|e| e.into_inner());
        let mut ids: Vec<IntentionId> = index.iter().filter(|(_, s)| **s == status).map(|(id, _)| *id).collect();
        ids.sort();
        ids
    }

    pub fn count_with_status(&self, status: IntentionStatus) -> usize {
        let index = self.index.lock().unwrap_or_else(|e| e.into_inner());
        index.values().filter(|s| **s == status).count()
    }

    fn current_folder(&self, id: IntentionId) -> Result<PathBuf, StoreError> {
        let status = self.status_of(id).ok_or(StoreError::NotFound(id))?;
        Ok(self.folder(id, status))
    }

    async fn load_unlocked(&self, id: IntentionId) -> Result<Intention, StoreError> {
        let path = self.current_folder(id)?.join(MANIFEST_FILE);
        let manifest: Manifest = read_json(&path).await?;
        Ok(manifest.intention)
    }

    async fn relocate_unlocked(&self, id: IntentionId, to: IntentionStatus) -> Result<(), StoreError> {
        let from = self.status_of(id).ok_or(StoreError::NotFound(id))?;
        if from == to {
            return Ok(());
        }
        let source = self.folder(id, from);
        let target = self.folder(id, to);
        let bucket = self.root.join(to.label());
        tokio::fs::create_dir_all(&bucket).await.map_err(io_err(&bucket))?;
        tokio::fs::rename(&source, &target).await.map_err(io_err(&source))?;
        self.index.lock().unwrap_or_else(|e| e.into_inner()).insert(id, to);
        debug!(intention = %id, %from, %to, "intention folder moved");
        Ok(())
    }

    async fn append_unlocked(&self, intention: &mut Intention, entry: &LifecycleEntry) -> Result<u32, StoreError> {
        let sequence = intention.scratchpad.count + 1;
        let name = entry.file_name(sequence);
        let path = self.current_folder(intention.id)?.join("scratchpad").join(&name);
        write_json(&path, entry).await?;
        intention.scratchpad.count = sequence;
        intention.scratchpad.last_entry = Some(name);
        Ok(sequence)
    }

    /// Moves the folder to the intention's status bucket, appends `entries`,
    /// and rewrites the manifest.
    async fn persist_unlocked(&self, intention: &mut Intention, entries: &[LifecycleEntry]) -> Result<(), StoreError> {
        self.relocate_unlocked(intention.id, intention.status).await?;
        for entry in entries {
            self.append_unlocked(intention, entry).await?;
        }
        let path = self.folder(intention.id, intention.status).join(MANIFEST_FILE);
        write_json(&path, &Manifest::new(intention.clone())).await
    }

    pub async fn create(&self, intention: &Intention) -> Result<(), StoreError> {
        let lock = self.lock_for(intention.id);
        let _guard = lock.lock().await;
        if self.contains(intention.id) {
            return Err(StoreError::AlreadyExists(intention.id));
        }
        let path = self.folder(intention.id, intention.status).join(MANIFEST_FILE);
        write_json(&path, &Manifest::new(intention.clone())).await?;
        self.index
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(intention.id, intention.status);
        Ok(())
    }

    pub async fn load(&self, id: IntentionId) -> Result<Intention, StoreError> {
        let lock = self.lock_for(id);
        let _guard = lock.lock().await;
        self.load_unlocked(id).await
    }

    pub async fn save(&self, intention: &Intention) -> Result<(), StoreError> {
        let lock = self.lock_for(intention.id);
        let _guard = lock.lock().await;
        let mut intention = intention.clone();
        self.persist_unlocked(&mut intention, &[]).await
    }

    /// Sets the status and moves the folder to the matching bucket. No
    /// lifecycle rules are applied here.
    pub async fn move_to(&self, id: IntentionId, status: IntentionStatus) -> Result<Intention, StoreError> {
        let lock = self.lock_for(id);
        let _guard = lock.lock().await;
        let mut intention = self.load_unlocked(id).await?;
        intention.status = status;
        intention.updated_at = Utc::now();
        self.persist_unlocked(&mut intention, &[]).await?;
        Ok(intention)
    }

    pub async fn delete(&self, id: IntentionId) -> Result<(), StoreError> {
        let lock = self.lock_for(id);
        let _guard = lock.lock().await;
        let folder = self.current_folder(id)?;
        tokio::fs::remove_dir_all(&folder).await.map_err(io_err(&folder))?;
        self.index.lock().unwrap_or_else(|e| e.into_inner()).remove(&id);
        self.locks.lock().unwrap_or_else(|e| e.into_inner()).remove(&id);
        Ok(())
    }

    /// Intentions in one status bucket, oldest first.
    pub async fn list_by_status(&self, status: IntentionStatus) -> Result<Vec<Intention>, StoreError> {
        let mut intentions = Vec::new();
        for id in self.ids_with_status(status) {
            match self.load(id).await {
                Ok(intention) => intentions.push(intention),
                // Moved by a concurrent writer between listing and loading.
                Err(StoreError::NotFound(_)) => {}
                Err(StoreError::Io { source, .. }) if source.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e),
            }
        }
        intentions.sort_by_key(|i| i.created_at);
        Ok(intentions)
    }

    pub async fn list_non_terminal(&self) -> Result<Vec<Intention>, StoreError> {
        let mut all = Vec::new();
        for status in IntentionStatus::ALL.into_iter().filter(|s| !s.is_terminal()) {
            all.extend(self.list_by_status(status).await?);
        }
        Ok(all)
    }

    /// Returns the sequence number assigned to the entry.
    pub async fn append_scratchpad_entry(&self, id: IntentionId, entry: &LifecycleEntry) -> Result<u32, StoreError> {
        let lock = self.lock_for(id);
        let _guard = lock.lock().await;
        let mut intention = self.load_unlocked(id).await?;
        let sequence = self.append_unlocked(&mut intention, entry).await?;
        let path = self.folder(id, intention.status).join(MANIFEST_FILE);
        write_json(&path, &Manifest::new(intention)).await?;
        Ok(sequence)
    }

    /// Load, mutate, journal and save under the intention's lock. When `f`
    /// returns an error nothing is written.
    pub async fn update<R, E, F>(&self, id: IntentionId, f: F) -> Result<(Intention, R), E>
    where
        F: FnOnce(&mut Intention, &mut Vec<LifecycleEntry>) -> Result<R, E>,
        E: From<StoreError>,
    {
        let lock = self.lock_for(id);
        let _guard = lock.lock().await;
        let mut intention = self.load_unlocked(id).await?;
        let mut entries = Vec::new();
        let result = f(&mut intention, &mut entries)?;
        intention.updated_at = Utc::now();
        self.persist_unlocked(&mut intention, &entries).await?;
        Ok((intention, result))
    }

    /// Journal entries in sequence order.
    pub async fn read_scratchpad(&self, id: IntentionId) -> Result<Vec<LifecycleEntry>, StoreError> {
        let lock = self.lock_for(id);
        let _guard = lock.lock().await;
        let dir = self.current_folder(id)?.join("scratchpad");
        if !tokio::fs::try_exists(&dir).await.map_err(io_err(&dir))? {
            return Ok(Vec::new());
        }
        let mut names = Vec::new();
        let mut entries = tokio::fs::read_dir(&dir).await.map_err(io_err(&dir))?;
        while let Some(entry) = entries.next_entry().await.map_err(io_err(&dir))? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) == Some("json") {
                names.push(path);
            }
        }
        names.sort();
        let mut out = Vec::with_capacity(names.len());
        for path in names {
            out.push(read_json(&path).await?);
        }
        Ok(out)
    }

    async fn write_artifact<T: Serialize>(&self, id: IntentionId, relative: &str, value: &T) -> Result<PathBuf, StoreError> {
        let lock = self.lock_for(id);
        let _guard = lock.lock().await;
        let path = self.current_folder(id)?.join(relative);
        write_json(&path, value).await?;
        Ok(path)
    }

    pub async fn save_plan(&self, id: IntentionId, plan: &Plan) -> Result<PathBuf, StoreError> {
        self.write_artifact(id, &format!("plans/v{}.json", plan.version), plan).await
    }

    pub async fn load_plan(&self, id: IntentionId, version: u32) -> Result<Plan, StoreError> {
        let lock = self.lock_for(id);
        let _guard = lock.lock().await;
        let path = self.current_folder(id)?.join(format!("plans/v{}.json", version));
        read_json(&path).await
    }

    pub async fn save_review(&self, id: IntentionId, review: &PlanReview) -> Result<PathBuf, StoreError> {
        self.write_artifact(id, &format!("reviews/plan-v{}.json", review.plan_version), review)
            .await
    }

    pub async fn save_outcome_review(&self, id: IntentionId, review: &OutcomeReview) -> Result<PathBuf, StoreError> {
        self.write_artifact(id, &format!("reviews/outcome-v{}.json", review.attempt), review)
            .await
    }

    pub async fn save_execution_attempt(&self, id: IntentionId, execution: &Execution) -> Result<PathBuf, StoreError> {
        self.write_artifact(id, &format!("executions/attempt-{:03}.json", execution.attempt), execution)
            .await
    }

    /// Deletes terminal intentions whose retention period has passed.
    pub async fn purge_expired(
        &self,
        retention: &RetentionPolicy,
        now: DateTime<Utc>,
    ) -> Result<Vec<IntentionId>, StoreError> {
        let mut purged = Vec::new();
        for status in IntentionStatus::ALL.into_iter().filter(|s| s.is_terminal()) {
            let Some(days) = retention.days_for(status) else {
                continue;
            };
            let cutoff = now - Duration::days(i64::from(days));
            for intention in self.list_by_status(status).await? {
                if intention.updated_at < cutoff {
                    self.delete(intention.id).await?;
                    purged.push(intention.id);
                }
            }
        }
        if !purged.is_empty() {
            info!(count = purged.len(), "purged expired intentions");
        }
        Ok(purged)
    }
}
