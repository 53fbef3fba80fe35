//! File-backed store using redb.
//!
//! # Table design
//!
//! ```text
//! members : member id (&str)  → JSON-encoded MemberRecord
//! meta    : "revision"        → committed revision (i64)
//!           "next_expiry"     → refresh deadline, ms since epoch (i64)
//! ```
//!
//! Every operation opens the database, runs one transaction and closes it
//! again, so separate `grouping` processes can share the file. A batch is
//! one write transaction: it commits whole or aborts whole.
//!
//! Opens within one process are serialized by a gate shared with the
//! external-change poller. Waiting on a handle held by another process
//! happens inside `block_in_place` when called from a multi-threaded
//! runtime, so the admin session never stalls the other tasks on its worker.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, SystemTime};

use redb::{Database, DatabaseError, ReadableTable, TableDefinition, WriteTransaction};
use tokio::runtime::{Handle, RuntimeFlavor};
use tokio::task::JoinHandle;

use super::{Notifier, Snapshot, Store, StoreWrite, Subscription, WriteBatch};
use crate::error::{GroupingError, Result};
use crate::member::{MemberId, MemberRecord};

// ---------------------------------------------------------------------------
// Table definitions
// ---------------------------------------------------------------------------

const MEMBERS: TableDefinition<&str, &[u8]> = TableDefinition::new("members");
const META: TableDefinition<&str, i64> = TableDefinition::new("meta");

const REVISION_KEY: &str = "revision";
const NEXT_EXPIRY_KEY: &str = "next_expiry";

const OPEN_ATTEMPTS: u32 = 50;
const OPEN_BACKOFF: Duration = Duration::from_millis(20);

// ---------------------------------------------------------------------------
// RedbStore
// ---------------------------------------------------------------------------

pub struct RedbStore {
    path: PathBuf,
    file_gate: Arc<Mutex<()>>,
    notifier: Notifier,
    last_notified: Arc<AtomicU64>,
}

impl RedbStore {
    /// Open or create the store file at `path`, creating both tables.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let revision = blocking(|| {
            let db = open_db(path)?;
            let wt = db.begin_write().map_err(GroupingError::store)?;
            wt.open_table(MEMBERS).map_err(GroupingError::store)?;
            wt.open_table(META).map_err(GroupingError::store)?;
            wt.commit().map_err(GroupingError::store)?;
            Ok::<_, GroupingError>(read_snapshot(&db)?.revision)
        })?;

        Ok(Self {
            path: path.to_path_buf(),
            file_gate: Arc::new(Mutex::new(())),
            notifier: Notifier::new(),
            last_notified: Arc::new(AtomicU64::new(revision)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Poll the file for commits made by other processes and broadcast them.
    /// The file is only reopened when its modification time moves.
    ///
    /// Returns `None` outside a Tokio runtime.
    pub fn watch_external(&self, every: Duration) -> Option<JoinHandle<()>> {
        Handle::try_current().ok()?;
        let path = self.path.clone();
        let gate = Arc::clone(&self.file_gate);
        let notifier = self.notifier.clone();
        let last_notified = Arc::clone(&self.last_notified);

        Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            let mut seen_modified: Option<SystemTime> = None;
            loop {
                ticker.tick().await;
                let modified = tokio::fs::metadata(&path)
                    .await
                    .and_then(|m| m.modified())
                    .ok();
                if modified.is_some() && modified == seen_modified {
                    continue;
                }
                let (p, g) = (path.clone(), Arc::clone(&gate));
                let read = tokio::task::spawn_blocking(move || {
                    let _gate = lock(&g)?;
                    open_db(&p).and_then(|db| read_snapshot(&db))
                })
                .await;
                match read {
                    Ok(Ok(snapshot)) => {
                        seen_modified = modified;
                        let previous = last_notified.fetch_max(snapshot.revision, Ordering::SeqCst);
                        if snapshot.revision > previous {
                            tracing::debug!(revision = snapshot.revision, "external store change");
                            notifier.notify(snapshot);
                        }
                    }
                    Ok(Err(e)) => tracing::debug!("store poll skipped: {e}"),
                    Err(e) => tracing::warn!("store poll task failed: {e}"),
                }
            }
        }))
    }

    /// Run `f` in one write transaction, bump the revision, commit and
    /// broadcast the resulting snapshot. Returns `f`'s output and the
    /// committed revision.
    fn write<T>(&self, f: impl FnOnce(&WriteTransaction) -> Result<T>) -> Result<(T, u64)> {
        let (out, revision, snapshot) = self.with_db(|db| {
            let wt = db.begin_write().map_err(GroupingError::store)?;
            let (out, revision) = match f(&wt).and_then(|out| Ok((out, bump_revision(&wt)?))) {
                Ok(committed) => committed,
                Err(e) => {
                    wt.abort().map_err(GroupingError::store)?;
                    return Err(e);
                }
            };
            wt.commit().map_err(GroupingError::store)?;
            Ok((out, revision, read_snapshot(db)?))
        })?;

        self.last_notified
            .fetch_max(snapshot.revision, Ordering::SeqCst);
        self.notifier.notify(snapshot);
        Ok((out, revision))
    }

    /// Open the file under the in-process gate and run `f` against it.
    fn with_db<T>(&self, f: impl FnOnce(&Database) -> Result<T>) -> Result<T> {
        blocking(|| {
            let _gate = lock(&self.file_gate)?;
            let db = open_db(&self.path)?;
            f(&db)
        })
    }
}

impl Store for RedbStore {
    fn subscribe(&self) -> Result<Subscription> {
        let updates = self.notifier.receiver();
        let initial = self.read_once()?;
        Ok(Subscription { initial, updates })
    }

    fn read_once(&self) -> Result<Snapshot> {
        self.with_db(read_snapshot)
    }

    fn write_atomic(&self, batch: &WriteBatch) -> Result<u64> {
        self.write(|wt| {
            let mut members = wt.open_table(MEMBERS).map_err(GroupingError::store)?;
            let mut meta = wt.open_table(META).map_err(GroupingError::store)?;
            for write in batch.writes() {
                match write {
                    StoreWrite::Group { member, .. } | StoreWrite::Release(member) => {
                        let mut record: MemberRecord = {
                            let guard = members
                                .get(member.as_str())
                                .map_err(GroupingError::store)?
                                .ok_or_else(|| GroupingError::MemberNotFound(member.to_string()))?;
                            serde_json::from_slice(guard.value())?
                        };
                        record.group = match write {
                            StoreWrite::Group { group, .. } => group.to_string(),
                            _ => String::new(),
                        };
                        let value = serde_json::to_vec(&record)?;
                        members
                            .insert(member.as_str(), value.as_slice())
                            .map_err(GroupingError::store)?;
                    }
                    StoreWrite::NextExpiry(ms) => {
                        meta.insert(NEXT_EXPIRY_KEY, *ms)
                            .map_err(GroupingError::store)?;
                    }
                }
            }
            Ok(())
        })
        .map(|(_, revision)| revision)
    }

    fn register_member(&self, name: &str, birth: Option<&str>) -> Result<MemberId> {
        let id = MemberId::generate();
        let value = serde_json::to_vec(&MemberRecord::new(name, birth.map(str::to_string)))?;
        self.write(|wt| {
            let mut members = wt.open_table(MEMBERS).map_err(GroupingError::store)?;
            members
                .insert(id.as_str(), value.as_slice())
                .map_err(GroupingError::store)?;
            Ok(())
        })?;
        Ok(id)
    }

    fn delete_member(&self, id: &MemberId) -> Result<()> {
        self.write(|wt| {
            let mut members = wt.open_table(MEMBERS).map_err(GroupingError::store)?;
            let removed = members
                .remove(id.as_str())
                .map_err(GroupingError::store)?
                .is_some();
            if !removed {
                return Err(GroupingError::MemberNotFound(id.to_string()));
            }
            Ok(())
        })
        .map(|_| ())
    }

    fn clear(&self) -> Result<()> {
        self.write(|wt| {
            let mut members = wt.open_table(MEMBERS).map_err(GroupingError::store)?;
            let keys: Vec<String> = members
                .iter()
                .map_err(GroupingError::store)?
                .map(|entry| entry.map(|(k, _)| k.value().to_string()))
                .collect::<std::result::Result<_, _>>()
                .map_err(GroupingError::store)?;
            for key in keys {
                members.remove(key.as_str()).map_err(GroupingError::store)?;
            }
            let mut meta = wt.open_table(META).map_err(GroupingError::store)?;
            meta.remove(NEXT_EXPIRY_KEY).map_err(GroupingError::store)?;
            Ok(())
        })
        .map(|_| ())
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Run `f`, which may sleep waiting for the file. On a multi-threaded
/// runtime the worker's other tasks are moved off first.
fn blocking<T>(f: impl FnOnce() -> T) -> T {
    match Handle::try_current() {
        Ok(handle) if handle.runtime_flavor() == RuntimeFlavor::MultiThread => {
            tokio::task::block_in_place(f)
        }
        _ => f(),
    }
}

fn lock(gate: &Mutex<()>) -> Result<MutexGuard<'_, ()>> {
    gate.lock()
        .map_err(|_| GroupingError::store("redb file gate poisoned"))
}

/// Open the database, waiting briefly while another handle holds the file.
fn open_db(path: &Path) -> Result<Database> {
    let mut attempt = 0;
    loop {
        match Database::create(path) {
            Ok(db) => return Ok(db),
            Err(DatabaseError::DatabaseAlreadyOpen) if attempt + 1 < OPEN_ATTEMPTS => {
                attempt += 1;
                std::thread::sleep(OPEN_BACKOFF);
            }
            Err(e) => return Err(GroupingError::store(e)),
        }
    }
}

fn bump_revision(wt: &WriteTransaction) -> Result<u64> {
    let mut meta = wt.open_table(META).map_err(GroupingError::store)?;
    let current = meta
        .get(REVISION_KEY)
        .map_err(GroupingError::store)?
        .map(|v| v.value())
        .unwrap_or(0);
    let next = current + 1;
    meta.insert(REVISION_KEY, next).map_err(GroupingError::store)?;
    Ok(next as u64)
}

fn read_snapshot(db: &Database) -> Result<Snapshot> {
    let rt = db.begin_read().map_err(GroupingError::store)?;
    let members_table = rt.open_table(MEMBERS).map_err(GroupingError::store)?;
    let meta = rt.open_table(META).map_err(GroupingError::store)?;

    let mut snapshot = Snapshot::default();
    for entry in members_table.iter().map_err(GroupingError::store)? {
        let (k, v) = entry.map_err(GroupingError::store)?;
        let record: MemberRecord = serde_json::from_slice(v.value())?;
        snapshot
            .members
            .insert(MemberId::new(k.value()), record);
    }
    snapshot.revision = meta
        .get(REVISION_KEY)
        .map_err(GroupingError::store)?
        .map(|v| v.value() as u64)
        .unwrap_or(0);
    snapshot.next_expiry = meta
        .get(NEXT_EXPIRY_KEY)
        .map_err(GroupingError::store)?
        .map(|v| v.value());
    Ok(snapshot)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
