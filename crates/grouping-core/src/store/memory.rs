use super::{Notifier, Snapshot, Store, StoreWrite, Subscription, WriteBatch};
use crate::error::{GroupingError, Result};
use crate::member::{MemberId, MemberRecord};
use std::sync::{Mutex, MutexGuard};

/// In-process store. Writes are staged on a copy and swapped in only when
/// the whole batch applied, so subscribers never see a partial batch.
pub struct MemoryStore {
    inner: Mutex<Inner>,
    notifier: Notifier,
}

#[derive(Default)]
struct Inner {
    snapshot: Snapshot,
    /// Fail the next batch after this many entries were staged.
    fail_after: Option<usize>,
    unavailable: bool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            notifier: Notifier::new(),
        }
    }

    /// Make the next `write_atomic` fail midway, after staging `entries`
    /// writes.
    pub fn fail_next_write_after(&self, entries: usize) -> Result<()> {
        self.lock()?.fail_after = Some(entries);
        Ok(())
    }

    /// Toggle a simulated outage: every call fails with `StoreUnavailable`.
    pub fn set_unavailable(&self, unavailable: bool) -> Result<()> {
        self.lock()?.unavailable = unavailable;
        Ok(())
    }

    fn lock(&self) -> Result<MutexGuard<'_, Inner>> {
        self.inner
            .lock()
            .map_err(|_| GroupingError::store("memory store lock poisoned"))
    }

    fn available(&self) -> Result<MutexGuard<'_, Inner>> {
        let inner = self.lock()?;
        if inner.unavailable {
            return Err(GroupingError::store("memory store is offline"));
        }
        Ok(inner)
    }

    /// Bump the revision, then broadcast while still holding the lock so
    /// notifications leave in revision order.
    fn commit(&self, inner: &mut Inner, staged: Snapshot) -> u64 {
        inner.snapshot = staged;
        inner.snapshot.revision += 1;
        self.notifier.notify(inner.snapshot.clone());
        inner.snapshot.revision
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl Store for MemoryStore {
    fn subscribe(&self) -> Result<Subscription> {
        let inner = self.available()?;
        Ok(Subscription {
            updates: self.notifier.receiver(),
            initial: inner.snapshot.clone(),
        })
    }

    fn read_once(&self) -> Result<Snapshot> {
        Ok(self.available()?.snapshot.clone())
    }

    fn write_atomic(&self, batch: &WriteBatch) -> Result<u64> {
        let mut inner = self.available()?;
        let fail_after = inner.fail_after.take();
        let mut staged = inner.snapshot.clone();

        for (i, write) in batch.writes().iter().enumerate() {
            if fail_after == Some(i) {
                return Err(GroupingError::store(format!(
                    "write interrupted after {i} of {} entries",
                    batch.len()
                )));
            }
            match write {
                StoreWrite::Group { member, .. } | StoreWrite::Release(member) => {
                    let record = staged
                        .members
                        .get_mut(member)
                        .ok_or_else(|| GroupingError::MemberNotFound(member.to_string()))?;
                    record.group = match write {
                        StoreWrite::Group { group, .. } => group.to_string(),
                        _ => String::new(),
                    };
                }
                StoreWrite::NextExpiry(ms) => staged.next_expiry = Some(*ms),
            }
        }

        Ok(self.commit(&mut inner, staged))
    }

    fn register_member(&self, name: &str, birth: Option<&str>) -> Result<MemberId> {
        let mut inner = self.available()?;
        let id = MemberId::generate();
        let mut staged = inner.snapshot.clone();
        staged
            .members
            .insert(id.clone(), MemberRecord::new(name, birth.map(str::to_string)));
        self.commit(&mut inner, staged);
        Ok(id)
    }

    fn delete_member(&self, id: &MemberId) -> Result<()> {
        let mut inner = self.available()?;
        let mut staged = inner.snapshot.clone();
        if staged.members.remove(id).is_none() {
            return Err(GroupingError::MemberNotFound(id.to_string()));
        }
        self.commit(&mut inner, staged);
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        let mut inner = self.available()?;
        let staged = Snapshot {
            revision: inner.snapshot.revision,
            ..Snapshot::default()
        };
        self.commit(&mut inner, staged);
        Ok(())
    }
}
