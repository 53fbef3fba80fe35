use crate::label::GroupLabel;
use crate::member::{Member, MemberId};
use serde::Serialize;
use std::collections::BTreeMap;

/// A single member → group decision, as written to the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Placement {
    pub member: MemberId,
    pub group: GroupLabel,
}

impl Placement {
    pub fn new(member: MemberId, group: GroupLabel) -> Self {
        Self { member, group }
    }
}

// ---------------------------------------------------------------------------
// Partition
// ---------------------------------------------------------------------------

/// Group label → members, iterated in label order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Partition {
    groups: BTreeMap<GroupLabel, Vec<Member>>,
}

impl Partition {
    pub fn new() -> Self {
        Self::default()
    }

    /// `count` empty ordinal groups.
    pub fn with_empty_groups(count: usize) -> Self {
        Self {
            groups: GroupLabel::first(count).map(|l| (l, Vec::new())).collect(),
        }
    }

    pub fn insert_group(&mut self, label: GroupLabel, members: Vec<Member>) {
        self.groups.insert(label, members);
    }

    pub fn push(&mut self, label: GroupLabel, member: Member) {
        self.groups.entry(label).or_default().push(member);
    }

    pub fn groups(&self) -> impl Iterator<Item = (&GroupLabel, &[Member])> {
        self.groups.iter().map(|(l, m)| (l, m.as_slice()))
    }

    pub fn get(&self, label: &GroupLabel) -> Option<&[Member]> {
        self.groups.get(label).map(Vec::as_slice)
    }

    pub fn group_count(&self) -> usize {
        self.groups.len()
    }

    pub fn member_count(&self) -> usize {
        self.groups.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Group sizes in label order.
    pub fn sizes(&self) -> Vec<usize> {
        self.groups.values().map(Vec::len).collect()
    }

    pub fn placements(&self) -> impl Iterator<Item = Placement> + '_ {
        self.groups.iter().flat_map(|(label, members)| {
            members
                .iter()
                .map(move |m| Placement::new(m.id.clone(), label.clone()))
        })
    }
}

// ---------------------------------------------------------------------------
// Allocation
// ---------------------------------------------------------------------------

/// Allocator output: the proposed partition plus members that did not fit.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Allocation {
    pub partition: Partition,
    pub unassigned: Vec<Member>,
}
