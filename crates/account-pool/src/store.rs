//! Durable pool store
//!
//! Owns the three pool files and a single async mutex guarding all of them.
//! Every read/modify/write sequence runs inside a [`PoolTxn`], so an allocation
//! and a sweep can never interleave mid-mutation. The files are line-oriented
//! text (see [`crate::record`]) and every write uses temp file + fsync + rename,
//! so a crash leaves either the old or the new content, never a torn line.
//!
//! A pool file that does not exist yet loads as empty; it is created on first
//! write.

use std::borrow::Cow;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};

use tokio::io::AsyncWriteExt;
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::record::{Account, CooldownLine, Record};

/// Default file name of the available pool.
pub const DEFAULT_AVAILABLE_FILE: &str = "hits.txt";
/// Default file name of the cooldown pool.
pub const DEFAULT_COOLDOWN_FILE: &str = "temp_used.txt";
/// Default file name of the released pool.
pub const DEFAULT_RELEASED_FILE: &str = "accoun.txt";

/// Locations of the three pool files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolPaths {
    pub available: PathBuf,
    pub cooldown: PathBuf,
    pub released: PathBuf,
}

impl PoolPaths {
    /// Default file names inside `dir`.
    pub fn in_dir(dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref();
        Self {
            available: dir.join(DEFAULT_AVAILABLE_FILE),
            cooldown: dir.join(DEFAULT_COOLDOWN_FILE),
            released: dir.join(DEFAULT_RELEASED_FILE),
        }
    }
}

/// Contents of all three pools read under one lock acquisition.
#[derive(Debug, Clone, Default)]
pub struct PoolSnapshot {
    pub available: Vec<Account>,
    pub cooldown: Vec<CooldownLine>,
    pub released: Vec<Account>,
}

impl PoolSnapshot {
    /// Number of parsed cooldown entries (malformed lines excluded).
    pub fn cooling_down(&self) -> usize {
        self.cooldown.iter().filter(|l| !l.is_malformed()).count()
    }

    pub fn malformed(&self) -> usize {
        self.cooldown.iter().filter(|l| l.is_malformed()).count()
    }
}

struct PoolFile<R> {
    name: &'static str,
    path: PathBuf,
    _record: PhantomData<fn() -> R>,
}

impl<R: Record> PoolFile<R> {
    fn new(name: &'static str, path: PathBuf) -> Self {
        Self {
            name,
            path,
            _record: PhantomData,
        }
    }

    /// Lines are decoded one at a time, so a stray non-UTF-8 byte only
    /// affects its own line. Such a line is read lossily and rewritten with
    /// U+FFFD in place of the bad bytes.
    async fn load(&self) -> Result<Vec<R>> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) => {
                let mut records = Vec::new();
                for (index, raw) in bytes.split(|b| *b == b'\n').enumerate() {
                    let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
                    let line = String::from_utf8_lossy(raw);
                    if let Cow::Owned(_) = line {
                        warn!(
                            pool = self.name,
                            line = index + 1,
                            "pool line is not valid UTF-8, decoding lossily"
                        );
                    }
                    records.extend(R::decode(&line));
                }
                Ok(records)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(Error::store(
                format!("reading {} pool {}", self.name, self.path.display()),
                e,
            )),
        }
    }

    async fn replace(&self, records: &[R]) -> Result<()> {
        let mut contents = String::new();
        for record in records {
            contents.push_str(&record.encode());
            contents.push('\n');
        }
        write_atomic(&self.path, contents.as_bytes())
            .await
            .map_err(|e| {
                Error::store(
                    format!("writing {} pool {}", self.name, self.path.display()),
                    e,
                )
            })?;
        debug!(pool = self.name, records = records.len(), "persisted pool");
        Ok(())
    }
}

/// Handle to one pool, valid only while its [`PoolTxn`] holds the lock.
pub struct PoolHandle<'t, R> {
    file: &'t PoolFile<R>,
}

impl<R: Record> PoolHandle<'_, R> {
    /// Read the pool in file order. A missing file is an empty pool.
    pub async fn load(&self) -> Result<Vec<R>> {
        self.file.load().await
    }

    /// Atomically overwrite the pool with `records`.
    pub async fn replace(&self, records: &[R]) -> Result<()> {
        self.file.replace(records).await
    }

    /// Atomically add `records` after the existing content.
    pub async fn append(&self, records: &[R]) -> Result<()>
    where
        R: Clone,
    {
        if records.is_empty() {
            return Ok(());
        }
        let mut all = self.file.load().await?;
        all.extend_from_slice(records);
        self.file.replace(&all).await
    }
}

/// Exclusive access to all three pools. Dropping it releases the lock.
pub struct PoolTxn<'a> {
    store: &'a PoolStore,
    _guard: MutexGuard<'a, ()>,
}

impl PoolTxn<'_> {
    pub fn available(&self) -> PoolHandle<'_, Account> {
        PoolHandle {
            file: &self.store.available,
        }
    }

    pub fn cooldown(&self) -> PoolHandle<'_, CooldownLine> {
        PoolHandle {
            file: &self.store.cooldown,
        }
    }

    pub fn released(&self) -> PoolHandle<'_, Account> {
        PoolHandle {
            file: &self.store.released,
        }
    }
}

/// File-backed store for the available, cooldown and released pools.
pub struct PoolStore {
    available: PoolFile<Account>,
    cooldown: PoolFile<CooldownLine>,
    released: PoolFile<Account>,
    lock: Mutex<()>,
}

impl PoolStore {
    pub fn new(paths: PoolPaths) -> Self {
        Self {
            available: PoolFile::new("available", paths.available),
            cooldown: PoolFile::new("cooldown", paths.cooldown),
            released: PoolFile::new("released", paths.released),
            lock: Mutex::new(()),
        }
    }

    /// Acquire the global pool lock.
    pub async fn lock(&self) -> PoolTxn<'_> {
        PoolTxn {
            store: self,
            _guard: self.lock.lock().await,
        }
    }

    /// Load all three pools under a single lock acquisition.
    pub async fn snapshot(&self) -> Result<PoolSnapshot> {
        let txn = self.lock().await;
        Ok(PoolSnapshot {
            available: txn.available().load().await?,
            cooldown: txn.cooldown().load().await?,
            released: txn.released().load().await?,
        })
    }
}

/// Write `contents` to `path` atomically.
///
/// Writes a temp file in the same directory, syncs it, then renames it over the
/// target. Permissions are 0600 on unix since pool files hold credentials.
/// Creates the parent directory if needed. The temp file is removed if any
/// step fails.
async fn write_atomic(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    tokio::fs::create_dir_all(dir).await?;

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| std::io::Error::other("pool path has no file name"))?;
    let tmp_path = dir.join(format!(".{file_name}.tmp.{}", std::process::id()));

    let result = write_then_rename(&tmp_path, path, contents).await;
    if result.is_err() {
        let _ = tokio::fs::remove_file(&tmp_path).await;
    }
    result
}

async fn write_then_rename(tmp_path: &Path, path: &Path, contents: &[u8]) -> std::io::Result<()> {
    let mut file = tokio::fs::File::create(tmp_path).await?;
    file.write_all(contents).await?;
    file.sync_all().await?;
    drop(file);

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        tokio::fs::set_permissions(tmp_path, std::fs::Permissions::from_mode(0o600)).await?;
    }

    tokio::fs::rename(tmp_path, path).await
}
