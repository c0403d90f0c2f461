//! JSON file process store.
//!
//! One pretty-printed JSON document per process under a directory. Writes go
//! to a temporary file that is synced and then renamed over the old document,
//! so a crash leaves either the old or the new record, never a torn one.
//!
//! File names are the hex encoding of the correlation id, which keeps arbitrary
//! ids (slashes, dots, unicode) out of path handling.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tracing::warn;

use crate::domain::{
    CorrelationId, ProcessRecord, ProcessResult, ProcessState, StepOutcome, StepRecord, StoreError,
    TransitionError,
};
use crate::ports::ProcessStore;

const EXTENSION: &str = "json";
const TMP_EXTENSION: &str = "json.tmp";

pub struct JsonFileProcessStore {
    dir: PathBuf,
    /// Serializes read-modify-write cycles within this instance.
    write_lock: Mutex<()>,
}

impl JsonFileProcessStore {
    /// Open (and create if needed) a store rooted at `dir`.
    pub async fn open(dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir).await?;
        Ok(Self {
            dir,
            write_lock: Mutex::new(()),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, correlation_id: &CorrelationId) -> PathBuf {
        self.dir
            .join(format!("{}.{EXTENSION}", encode_name(correlation_id)))
    }

    async fn read(&self, correlation_id: &CorrelationId) -> Result<Option<ProcessRecord>, StoreError> {
        read_record(&self.path_for(correlation_id)).await
    }

    async fn write(&self, record: &ProcessRecord) -> Result<(), StoreError> {
        let path = self.path_for(&record.correlation_id);
        let tmp = path.with_extension(TMP_EXTENSION);
        let bytes = serde_json::to_vec_pretty(record)?;
        tokio::fs::write(&tmp, &bytes).await?;
        tokio::fs::File::open(&tmp).await?.sync_all().await?;
        tokio::fs::rename(&tmp, &path).await?;
        Ok(())
    }

    async fn mutate<T>(
        &self,
        correlation_id: &CorrelationId,
        f: impl FnOnce(&mut ProcessRecord) -> Result<T, TransitionError> + Send,
    ) -> Result<T, StoreError> {
        let _guard = self.write_lock.lock().await;
        let mut record = self
            .read(correlation_id)
            .await?
            .ok_or_else(|| StoreError::NotFound(correlation_id.clone()))?;
        let value = f(&mut record).map_err(|source| StoreError::Transition {
            correlation_id: correlation_id.clone(),
            source,
        })?;
        self.write(&record).await?;
        Ok(value)
    }

    /// Every readable record in the directory. Undecodable files are logged and skipped.
    async fn scan(&self) -> Result<Vec<ProcessRecord>, StoreError> {
        let mut records = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(EXTENSION) {
                continue;
            }
            match read_record(&path).await {
                Ok(Some(record)) => records.push(record),
                Ok(None) => {}
                Err(e) => warn!(path = %path.display(), error = %e, "skipping unreadable process file"),
            }
        }
        Ok(records)
    }
}

async fn read_record(path: &Path) -> Result<Option<ProcessRecord>, StoreError> {
    match tokio::fs::read(path).await {
        Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

fn encode_name(correlation_id: &CorrelationId) -> String {
    correlation_id
        .as_str()
        .bytes()
        .map(|b| format!("{b:02x}"))
        .collect()
}

#[async_trait]
impl ProcessStore for JsonFileProcessStore {
    async fn create(&self, record: ProcessRecord) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().await;
        if self.read(&record.correlation_id).await?.is_some() {
            return Err(StoreError::AlreadyExists(record.correlation_id));
        }
        self.write(&record).await
    }

    async fn load(&self, correlation_id: &CorrelationId) -> Result<Option<ProcessRecord>, StoreError> {
        self.read(correlation_id).await
    }

    async fn append_step(
        &self,
        correlation_id: &CorrelationId,
        step: StepRecord,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        self.mutate(correlation_id, |rec| rec.append_step(step, now))
            .await
    }

    async fn complete_forward(
        &self,
        correlation_id: &CorrelationId,
        sequence: u32,
        fragments: ProcessResult,
        now: DateTime<Utc>,
    ) -> Result<ProcessState, StoreError> {
        self.mutate(correlation_id, |rec| {
            rec.complete_forward(sequence, fragments, now)?;
            Ok(rec.state)
        })
        .await
    }

    async fn update_step_outcome(
        &self,
        correlation_id: &CorrelationId,
        sequence: u32,
        outcome: StepOutcome,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        self.mutate(correlation_id, |rec| rec.set_step_outcome(sequence, outcome, now))
            .await
    }

    async fn update_state(
        &self,
        correlation_id: &CorrelationId,
        state: ProcessState,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        self.mutate(correlation_id, |rec| rec.transition(state, now))
            .await
    }

    async fn reset(&self, correlation_id: &CorrelationId, now: DateTime<Utc>) -> Result<(), StoreError> {
        self.mutate(correlation_id, |rec| rec.reset(now)).await
    }

    async fn remove(&self, correlation_id: &CorrelationId) -> Result<bool, StoreError> {
        let _guard = self.write_lock.lock().await;
        match tokio::fs::remove_file(self.path_for(correlation_id)).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn find_unmodified_since(
        &self,
        state: ProcessState,
        before: DateTime<Utc>,
    ) -> Result<Vec<CorrelationId>, StoreError> {
        let mut found: Vec<ProcessRecord> = self
            .scan()
            .await?
            .into_iter()
            .filter(|r| r.state == state && r.updated_at < before)
            .collect();
        found.sort_by_key(|r| r.updated_at);
        Ok(found.into_iter().map(|r| r.correlation_id).collect())
    }

    async fn find_in_state(&self, state: ProcessState) -> Result<Vec<CorrelationId>, StoreError> {
        Ok(self
            .scan()
            .await?
            .into_iter()
            .filter(|r| r.state == state)
            .map(|r| r.correlation_id)
            .collect())
    }
}
