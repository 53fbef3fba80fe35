use crate::label::GroupLabel;
use crate::member::{Member, MemberId};
use crate::partition::Placement;
use crate::store::Snapshot;
use std::collections::{BTreeMap, HashMap};

/// In-memory mirror of the store's member collection.
///
/// Only store snapshots change it, with one exception: after a successful
/// write the written labels are overlaid until a snapshot at least as new
/// as that write arrives. Notifications queued before the write therefore
/// cannot roll the mirror back.
#[derive(Debug, Clone, Default)]
pub struct MemberDirectory {
    members: BTreeMap<MemberId, Member>,
    revision: u64,
    overlay: HashMap<MemberId, (Option<GroupLabel>, u64)>,
}

impl MemberDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_snapshot(snapshot: &Snapshot) -> Self {
        let mut directory = Self::new();
        directory.apply(snapshot);
        directory
    }

    /// Replace the mirror with `snapshot`. Snapshots older than the one
    /// already applied are ignored; returns whether it was applied.
    pub fn apply(&mut self, snapshot: &Snapshot) -> bool {
        if snapshot.revision < self.revision {
            return false;
        }
        self.revision = snapshot.revision;
        self.members = snapshot
            .members
            .iter()
            .map(|(id, record)| (id.clone(), Member::from_record(id.clone(), record)))
            .collect();

        let members = &mut self.members;
        self.overlay.retain(|id, (label, written_at)| {
            if *written_at <= snapshot.revision {
                return false;
            }
            match members.get_mut(id) {
                Some(member) => {
                    member.group = label.clone();
                    true
                }
                None => false,
            }
        });
        true
    }

    /// Optimistically reflect placements and releases committed at
    /// `revision`.
    pub fn record_write(&mut self, placements: &[Placement], released: &[MemberId], revision: u64) {
        if revision <= self.revision {
            return;
        }
        let writes = placements
            .iter()
            .map(|p| (&p.member, Some(p.group.clone())))
            .chain(released.iter().map(|id| (id, None)));
        for (id, group) in writes {
            if let Some(member) = self.members.get_mut(id) {
                member.group = group.clone();
                self.overlay.insert(id.clone(), (group, revision));
            }
        }
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn get(&self, id: &MemberId) -> Option<&Member> {
        self.members.get(id)
    }

    pub fn contains(&self, id: &MemberId) -> bool {
        self.members.contains_key(id)
    }

    /// Members in id order.
    pub fn members(&self) -> impl Iterator<Item = &Member> {
        self.members.values()
    }

    pub fn to_vec(&self) -> Vec<Member> {
        self.members.values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn unassigned(&self) -> impl Iterator<Item = &Member> {
        self.members.values().filter(|m| !m.is_assigned())
    }

    pub fn has_assignments(&self) -> bool {
        self.members.values().any(Member::is_assigned)
    }

    /// Members per existing group label.
    pub fn occupancy(&self) -> BTreeMap<GroupLabel, usize> {
        let mut counts = BTreeMap::new();
        for label in self.members.values().filter_map(|m| m.group.as_ref()) {
            *counts.entry(label.clone()).or_insert(0) += 1;
        }
        counts
    }

    /// Assigned members grouped by label, in label order.
    pub fn grouped(&self) -> BTreeMap<GroupLabel, Vec<Member>> {
        let mut groups: BTreeMap<GroupLabel, Vec<Member>> = BTreeMap::new();
        for member in self.members.values() {
            if let Some(label) = &member.group {
                groups.entry(label.clone()).or_default().push(member.clone());
            }
        }
        groups
    }
}
