//! Flat JSON array persistence, one file per entity kind.
//!
//! Every mutation loads the whole backing file, rewrites the collection in
//! memory and writes the whole file back. An async mutex serializes
//! writers within this process; a second process writing the same file
//! still races it and the last write wins.

use anyhow::{Context, Result};
use serde::{de::DeserializeOwned, Serialize};
use std::{marker::PhantomData, path::PathBuf};
use tokio::{fs, sync::Mutex};
use uuid::Uuid;

use crate::model::now_ts;

/// A persistable record with a stable identifier.
pub trait Record {
    fn id(&self) -> Uuid;

    /// Stamp the record as modified. Types without an `updated_at` field
    /// keep the default no-op.
    fn touch(&mut self, _now: i64) {}
}

pub struct JsonStore<T> {
    path: PathBuf,
    write_lock: Mutex<()>,
    _record: PhantomData<T>,
}

impl<T> JsonStore<T>
where
    T: Record + Clone + Serialize + DeserializeOwned,
{
    /// Open a store, creating an empty backing file if none exists.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir).await?;
        }
        if fs::metadata(&path).await.is_err() {
            fs::write(&path, b"[]")
                .await
                .with_context(|| format!("create {}", path.display()))?;
        }
        Ok(Self {
            path,
            write_lock: Mutex::new(()),
            _record: PhantomData,
        })
    }

    pub async fn load_all(&self) -> Result<Vec<T>> {
        let bytes = fs::read(&self.path)
            .await
            .with_context(|| format!("read {}", self.path.display()))?;
        serde_json::from_slice(&bytes)
            .with_context(|| format!("parse {}", self.path.display()))
    }

    /// Overwrite the entire backing collection.
    pub async fn save_all(&self, records: &[T]) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        self.write(records).await
    }

    pub async fn find(&self, id: Uuid) -> Result<Option<T>> {
        Ok(self.load_all().await?.into_iter().find(|r| r.id() == id))
    }

    /// Append a record and persist.
    pub async fn insert(&self, record: T) -> Result<T> {
        let _guard = self.write_lock.lock().await;
        let mut records = self.load_all().await?;
        records.push(record.clone());
        self.write(&records).await?;
        Ok(record)
    }

    /// Apply a mutation to the record with the given id, stamp it as
    /// updated and persist. Returns the merged record, or `None` when the
    /// id is unknown.
    pub async fn update(&self, id: Uuid, apply: impl FnOnce(&mut T)) -> Result<Option<T>> {
        let _guard = self.write_lock.lock().await;
        let mut records = self.load_all().await?;
        let Some(record) = records.iter_mut().find(|r| r.id() == id) else {
            return Ok(None);
        };
        apply(record);
        record.touch(now_ts());
        let updated = record.clone();
        self.write(&records).await?;
        Ok(Some(updated))
    }

    /// Rewrite the whole collection under the write lock. Returns the
    /// persisted records.
    pub async fn modify(&self, apply: impl FnOnce(&mut Vec<T>)) -> Result<Vec<T>> {
        let _guard = self.write_lock.lock().await;
        let mut records = self.load_all().await?;
        apply(&mut records);
        self.write(&records).await?;
        Ok(records)
    }

    /// Remove the record with the given id. Returns whether one existed.
    pub async fn delete(&self, id: Uuid) -> Result<bool> {
        let _guard = self.write_lock.lock().await;
        let mut records = self.load_all().await?;
        let before = records.len();
        records.retain(|r| r.id() != id);
        if records.len() == before {
            return Ok(false);
        }
        self.write(&records).await?;
        Ok(true)
    }

    async fn write(&self, records: &[T]) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(records)?;
        fs::write(&self.path, bytes)
            .await
            .with_context(|| format!("write {}", self.path.display()))
    }
}
