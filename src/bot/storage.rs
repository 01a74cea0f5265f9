//! Durable storage for conversation contexts.
//!
//! One pretty-printed JSON file per conversation. Every Ctx lives behind its
//! own mutex; the handler servicing an event is the only writer. The
//! periodic flusher snapshots under the key lock, so a save never tears a
//! Ctx mid-mutation.

use std::collections::{HashMap, HashSet};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use log::{debug, info, warn};
use tokio::sync::{Mutex, RwLock};

use super::ctx::{ConvKey, Ctx, CTX_SCHEMA};

pub struct CtxStore {
    dir: PathBuf,
    map: RwLock<HashMap<ConvKey, Arc<Mutex<Ctx>>>>,
    dirty: Mutex<HashSet<ConvKey>>,
}

impl CtxStore {
    pub fn new(dir: impl Into<PathBuf>) -> io::Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            map: RwLock::new(HashMap::new()),
            dirty: Mutex::new(HashSet::new()),
        })
    }

    fn file_path(&self, key: ConvKey) -> PathBuf {
        self.dir.join(format!("{}.json", key.file_stem()))
    }

    /// Returns the Ctx for a key, creating an empty one if neither memory
    /// nor disk has it. Concurrent calls for the same key get the same
    /// `Arc`.
    pub async fn load_or_init(&self, key: ConvKey) -> Arc<Mutex<Ctx>> {
        if let Some(ctx) = self.map.read().await.get(&key) {
            return ctx.clone();
        }
        let mut map = self.map.write().await;
        // Lost the race to another loader.
        if let Some(ctx) = map.get(&key) {
            return ctx.clone();
        }
        let ctx = match self.read_from_disk(key) {
            Some(ctx) => ctx,
            None => Ctx::new(key),
        };
        let ctx = Arc::new(Mutex::new(ctx));
        map.insert(key, ctx.clone());
        ctx
    }

    fn read_from_disk(&self, key: ConvKey) -> Option<Ctx> {
        let path = self.file_path(key);
        if !path.exists() {
            return None;
        }
        match std::fs::read_to_string(&path)
            .map_err(|e| e.to_string())
            .and_then(|text| serde_json::from_str::<Ctx>(&text).map_err(|e| e.to_string()))
        {
            Ok(ctx) if ctx.schema == CTX_SCHEMA => {
                debug!("Loaded ctx {} from {}", key.file_stem(), path.display());
                Some(ctx)
            }
            Ok(ctx) => {
                warn!(
                    "Ctx {} has unknown schema {}, starting fresh",
                    key.file_stem(),
                    ctx.schema
                );
                None
            }
            Err(err) => {
                warn!("Ctx {} is corrupt ({err}), starting fresh", key.file_stem());
                None
            }
        }
    }

    /// Marks a Ctx for the next periodic flush.
    pub async fn mark_dirty(&self, key: ConvKey) {
        self.dirty.lock().await.insert(key);
    }

    /// Persists one Ctx now. Snapshot is taken under the key lock.
    pub async fn save(&self, key: ConvKey) -> io::Result<()> {
        let Some(ctx) = self.map.read().await.get(&key).cloned() else {
            return Ok(());
        };
        let snapshot = ctx.lock().await.clone();
        write_json(&self.file_path(key), &snapshot)
    }

    /// Flushes every dirty Ctx on a fixed schedule, coalescing repeated
    /// mutations between ticks into one write.
    pub async fn save_forever(&self, period: Duration) {
        loop {
            tokio::time::sleep(period).await;
            self.flush_dirty().await;
        }
    }

    pub async fn flush_dirty(&self) {
        let keys: Vec<ConvKey> = self.dirty.lock().await.drain().collect();
        for key in keys {
            if let Err(err) = self.save(key).await {
                warn!("Failed to save ctx {}: {err}", key.file_stem());
                self.dirty.lock().await.insert(key);
            }
        }
    }

    /// Removes a conversation from memory and disk.
    pub async fn delete(&self, key: ConvKey) -> io::Result<()> {
        self.map.write().await.remove(&key);
        self.dirty.lock().await.remove(&key);
        let path = self.file_path(key);
        if path.exists() {
            std::fs::remove_file(&path)?;
        }
        info!("Deleted ctx {}", key.file_stem());
        Ok(())
    }

    /// Keys of every Ctx currently in memory.
    pub async fn keys(&self) -> Vec<ConvKey> {
        self.map.read().await.keys().copied().collect()
    }

    /// Loads every Ctx file found on disk into memory, for startup.
    pub async fn preload(&self) -> io::Result<usize> {
        let mut count = 0;
        for entry in std::fs::read_dir(&self.dir)? {
            let entry = entry?;
            if entry.path().extension().is_some_and(|ext| ext == "json") {
                if let Some(key) = parse_file_stem(&entry.path()) {
                    self.load_or_init(key).await;
                    count += 1;
                }
            }
        }
        info!("Preloaded {count} ctx files from {}", self.dir.display());
        Ok(count)
    }
}

fn parse_file_stem(path: &Path) -> Option<ConvKey> {
    use super::ctx::Platform;
    let stem = path.file_stem()?.to_str()?;
    let (prefix, peer) = stem.split_once('_')?;
    let platform = match prefix {
        "vk" => Platform::Vk,
        "tg" => Platform::Telegram,
        _ => return None,
    };
    Some(ConvKey::new(platform, peer.parse().ok()?))
}

fn write_json(path: &Path, ctx: &Ctx) -> io::Result<()> {
    let text = serde_json::to_string_pretty(ctx)
        .map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err))?;
    // Write-then-rename so a crash mid-write never leaves a torn file.
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, text)?;
    std::fs::rename(&tmp, path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bot::ctx::{Mode, Platform};

    fn key() -> ConvKey {
        ConvKey::new(Platform::Telegram, 42)
    }

    #[tokio::test]
    async fn load_or_init_returns_one_shared_ctx() {
        let dir = tempfile::tempdir().unwrap();
        let store = CtxStore::new(dir.path()).unwrap();
        let a = store.load_or_init(key()).await;
        let b = store.load_or_init(key()).await;
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[tokio::test]
    async fn save_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = CtxStore::new(dir.path()).unwrap();
        {
            let ctx = store.load_or_init(key()).await;
            let mut guard = ctx.lock().await;
            guard.mode = Some(Mode::Group);
            guard.identifier = Some("1-КДД-69".to_string());
        }
        store.save(key()).await.unwrap();

        let store2 = CtxStore::new(dir.path()).unwrap();
        let ctx = store2.load_or_init(key()).await;
        let guard = ctx.lock().await;
        assert_eq!(guard.mode, Some(Mode::Group));
        assert_eq!(guard.identifier.as_deref(), Some("1-КДД-69"));
    }

    #[tokio::test]
    async fn delete_removes_memory_and_disk() {
        let dir = tempfile::tempdir().unwrap();
        let store = CtxStore::new(dir.path()).unwrap();
        store.load_or_init(key()).await;
        store.save(key()).await.unwrap();
        assert!(dir.path().join("tg_42.json").exists());

        store.delete(key()).await.unwrap();
        assert!(!dir.path().join("tg_42.json").exists());
        assert!(store.keys().await.is_empty());
    }

    #[tokio::test]
    async fn corrupt_file_yields_fresh_ctx() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("tg_42.json"), "{ not json").unwrap();
        let store = CtxStore::new(dir.path()).unwrap();
        let ctx = store.load_or_init(key()).await;
        let guard = ctx.lock().await;
        assert_eq!(guard.identifier, None);
    }

    #[tokio::test]
    async fn flush_dirty_coalesces_writes() {
        let dir = tempfile::tempdir().unwrap();
        let store = CtxStore::new(dir.path()).unwrap();
        store.load_or_init(key()).await;
        store.mark_dirty(key()).await;
        store.mark_dirty(key()).await;
        store.flush_dirty().await;
        assert!(dir.path().join("tg_42.json").exists());
    }
}
