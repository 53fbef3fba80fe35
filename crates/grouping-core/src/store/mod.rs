//! Store contract.
//!
//! The allocator treats the store as the single source of truth: a member
//! collection plus one scalar holding the next refresh deadline. Every
//! committed change bumps a revision and is broadcast to subscribers as a
//! full snapshot, so a subscriber only ever needs the latest message.
//!
//! ```text
//! id/<member-id>      → { name, birth?, group }
//! nextTime/nexttime   → ms since epoch
//! ```

pub mod disk;
pub mod memory;

pub use disk::RedbStore;
pub use memory::MemoryStore;

use crate::error::Result;
use crate::label::GroupLabel;
use crate::member::{Member, MemberId, MemberRecord};
use crate::partition::Placement;
use serde::Serialize;
use std::collections::BTreeMap;
use tokio::sync::broadcast;

/// Pending notifications each subscriber may fall behind by before it lags.
pub const CHANNEL_CAPACITY: usize = 64;

pub const MEMBERS_PATH: &str = "id";
pub const NEXT_EXPIRY_PATH: &str = "nextTime/nexttime";

// ---------------------------------------------------------------------------
// Snapshot
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Snapshot {
    /// Strictly increases with every committed write.
    pub revision: u64,
    pub members: BTreeMap<MemberId, MemberRecord>,
    pub next_expiry: Option<i64>,
}

impl Snapshot {
    pub fn member_list(&self) -> Vec<Member> {
        self.members
            .iter()
            .map(|(id, record)| Member::from_record(id.clone(), record))
            .collect()
    }
}

// ---------------------------------------------------------------------------
// WriteBatch
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreWrite {
    Group { member: MemberId, group: GroupLabel },
    /// Clear the member's label back to unassigned.
    Release(MemberId),
    NextExpiry(i64),
}

impl StoreWrite {
    pub fn path(&self) -> String {
        match self {
            StoreWrite::Group { member, .. } | StoreWrite::Release(member) => {
                format!("{MEMBERS_PATH}/{member}/group")
            }
            StoreWrite::NextExpiry(_) => NEXT_EXPIRY_PATH.to_string(),
        }
    }
}

/// Multi-key update applied all-or-nothing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteBatch {
    writes: Vec<StoreWrite>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn assign(&mut self, member: MemberId, group: GroupLabel) -> &mut Self {
        self.writes.push(StoreWrite::Group { member, group });
        self
    }

    pub fn release(&mut self, member: MemberId) -> &mut Self {
        self.writes.push(StoreWrite::Release(member));
        self
    }

    pub fn next_expiry(&mut self, ms: i64) -> &mut Self {
        self.writes.push(StoreWrite::NextExpiry(ms));
        self
    }

    pub fn extend_placements<'a>(&mut self, placements: impl IntoIterator<Item = &'a Placement>) {
        for p in placements {
            self.assign(p.member.clone(), p.group.clone());
        }
    }

    pub fn writes(&self) -> &[StoreWrite] {
        &self.writes
    }

    pub fn len(&self) -> usize {
        self.writes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.writes.is_empty()
    }
}

impl From<&[Placement]> for WriteBatch {
    fn from(placements: &[Placement]) -> Self {
        let mut batch = WriteBatch::new();
        batch.extend_placements(placements);
        batch
    }
}

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

/// A live subscription: the snapshot current at subscribe time followed by
/// every later change. Dropping it unsubscribes.
pub struct Subscription {
    pub initial: Snapshot,
    pub updates: broadcast::Receiver<Snapshot>,
}

pub trait Store: Send + Sync {
    fn subscribe(&self) -> Result<Subscription>;

    fn read_once(&self) -> Result<Snapshot>;

    /// Apply every write in `batch` or none of them. Returns the committed
    /// revision. Writes naming an unknown member fail the whole batch.
    fn write_atomic(&self, batch: &WriteBatch) -> Result<u64>;

    fn register_member(&self, name: &str, birth: Option<&str>) -> Result<MemberId>;

    fn delete_member(&self, id: &MemberId) -> Result<()>;

    /// Remove every member and the refresh deadline.
    fn clear(&self) -> Result<()>;
}

// ---------------------------------------------------------------------------
// Notifier
// ---------------------------------------------------------------------------

/// Fan-out of committed snapshots, shared by the store backends.
#[derive(Clone)]
pub(crate) struct Notifier {
    tx: broadcast::Sender<Snapshot>,
}

impl Notifier {
    pub(crate) fn new() -> Self {
        let (tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { tx }
    }

    pub(crate) fn receiver(&self) -> broadcast::Receiver<Snapshot> {
        self.tx.subscribe()
    }

    pub(crate) fn notify(&self, snapshot: Snapshot) {
        // No subscribers is fine.
        let _ = self.tx.send(snapshot);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn batch_paths_match_store_layout() {
        let mut batch = WriteBatch::new();
        batch
            .assign(MemberId::new("abc"), GroupLabel::ordinal(0))
            .release(MemberId::new("xyz"))
            .next_expiry(1_000);
        let paths: Vec<String> = batch.writes().iter().map(StoreWrite::path).collect();
        assert_eq!(paths, ["id/abc/group", "id/xyz/group", "nextTime/nexttime"]);
        assert_eq!(batch.len(), 3);
    }

    #[test]
    fn batch_from_placements() {
        let placements = vec![
            Placement::new(MemberId::new("a"), GroupLabel::ordinal(1)),
            Placement::new(MemberId::new("b"), GroupLabel::ordinal(0)),
        ];
        let batch = WriteBatch::from(placements.as_slice());
        assert_eq!(
            batch.writes()[0],
            StoreWrite::Group {
                member: MemberId::new("a"),
                group: GroupLabel::ordinal(1)
            }
        );
        assert_eq!(batch.len(), 2);
    }
}
