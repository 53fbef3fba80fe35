//! Ad hoc placement of late arrivals in first-come mode.
//!
//! Once a first-come partition is published, every member who shows up
//! ungrouped in a later directory change is dropped straight into a random
//! group that still has a free seat. Groups are the policy's fixed ordinal
//! labels; occupancy is read from the live directory and bumped as each
//! newcomer is placed, so one notification carrying several arrivals never
//! overfills a group.

use crate::directory::MemberDirectory;
use crate::label::GroupLabel;
use crate::member::MemberId;
use crate::partition::Placement;
use crate::policy::Policy;
use rand::seq::SliceRandom;
use rand::Rng;
use std::collections::{BTreeMap, HashSet};

#[derive(Debug, Clone)]
pub struct IncrementalWatcher {
    seen: HashSet<MemberId>,
    group_size: usize,
    group_count: usize,
}

impl IncrementalWatcher {
    /// Arm against the current directory. Members already present are
    /// treated as seen; ungrouped ones among them wait for the next
    /// rebalance.
    pub fn arm(directory: &MemberDirectory, policy: &Policy) -> Self {
        Self {
            seen: directory.members().map(|m| m.id.clone()).collect(),
            group_size: policy.group_size,
            group_count: policy.group_count,
        }
    }

    /// Pick up changed size/count parameters.
    pub fn retarget(&mut self, policy: &Policy) {
        self.group_size = policy.group_size;
        self.group_count = policy.group_count;
    }

    pub fn has_seen(&self, id: &MemberId) -> bool {
        self.seen.contains(id)
    }

    /// Forget placements whose write failed so the next change retries them.
    pub fn forget<'a>(&mut self, ids: impl IntoIterator<Item = &'a MemberId>) {
        for id in ids {
            self.seen.remove(id);
        }
    }

    /// Place every member not seen before that is still ungrouped.
    pub fn on_change<R: Rng + ?Sized>(
        &mut self,
        directory: &MemberDirectory,
        rng: &mut R,
    ) -> Vec<Placement> {
        let mut occupancy: BTreeMap<GroupLabel, usize> =
            GroupLabel::first(self.group_count).map(|l| (l, 0)).collect();
        for (label, count) in directory.occupancy() {
            if let Some(slot) = occupancy.get_mut(&label) {
                *slot = count;
            }
        }

        let mut placements = Vec::new();
        for member in directory.members() {
            if !self.seen.insert(member.id.clone()) || member.is_assigned() {
                continue;
            }
            let open: Vec<&GroupLabel> = occupancy
                .iter()
                .filter(|&(_, &count)| count < self.group_size)
                .map(|(label, _)| label)
                .collect();
            let Some(&target) = open.choose(rng) else {
                tracing::info!(member = %member.id, "no open seat; waiting for next rebalance");
                continue;
            };
            let target = target.clone();
            if let Some(count) = occupancy.get_mut(&target) {
                *count += 1;
            }
            placements.push(Placement::new(member.id.clone(), target));
        }
        placements
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::member::MemberRecord;
    use crate::policy::Mode;
    use crate::store::Snapshot;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::collections::HashMap;

    fn policy(size: usize, count: usize) -> Policy {
        Policy {
            mode: Mode::FirstCome,
            group_size: size,
            group_count: count,
            ..Policy::default()
        }
    }

    struct Feed {
        snapshot: Snapshot,
    }

    impl Feed {
        fn new() -> Self {
            Self {
                snapshot: Snapshot::default(),
            }
        }

        fn arrive(&mut self, id: &str) -> MemberDirectory {
            self.snapshot
                .members
                .insert(MemberId::new(id), MemberRecord::new(id, None));
            self.snapshot.revision += 1;
            MemberDirectory::from_snapshot(&self.snapshot)
        }

        fn commit(&mut self, placements: &[Placement]) -> MemberDirectory {
            for p in placements {
                if let Some(record) = self.snapshot.members.get_mut(&p.member) {
                    record.group = p.group.to_string();
                }
            }
            self.snapshot.revision += 1;
            MemberDirectory::from_snapshot(&self.snapshot)
        }
    }

    #[test]
    fn arrivals_fill_three_pairs_then_wait() {
        let mut rng = StdRng::seed_from_u64(17);
        let mut feed = Feed::new();
        let mut watcher = IncrementalWatcher::arm(&MemberDirectory::new(), &policy(2, 3));

        let mut placed = 0;
        for i in 0..7 {
            let directory = feed.arrive(&format!("m{i}"));
            let placements = watcher.on_change(&directory, &mut rng);
            if i < 6 {
                assert_eq!(placements.len(), 1, "arrival {i} should be placed");
                placed += 1;
            } else {
                assert!(placements.is_empty(), "7th member must stay unassigned");
            }
            feed.commit(&placements);
        }
        assert_eq!(placed, 6);

        let directory = MemberDirectory::from_snapshot(&feed.snapshot);
        let occupancy = directory.occupancy();
        assert_eq!(occupancy.len(), 3);
        assert!(occupancy.values().all(|&c| c == 2));
        assert!(!directory.get(&MemberId::new("m6")).unwrap().is_assigned());
    }

    #[test]
    fn simultaneous_arrivals_never_share_the_last_seat() {
        let mut rng = StdRng::seed_from_u64(3);
        let mut feed = Feed::new();
        let mut watcher = IncrementalWatcher::arm(&MemberDirectory::new(), &policy(2, 2));

        let d = feed.arrive("a");
        let first = watcher.on_change(&d, &mut rng);
        feed.commit(&first);
        feed.arrive("b");
        feed.arrive("c");
        let d = feed.arrive("d");

        let placements = watcher.on_change(&d, &mut rng);
        assert_eq!(placements.len(), 3);
        let mut per_group: HashMap<GroupLabel, usize> = HashMap::new();
        for p in first.iter().chain(placements.iter()) {
            *per_group.entry(p.group.clone()).or_default() += 1;
        }
        assert!(per_group.values().all(|&c| c <= 2), "{per_group:?}");
    }

    #[test]
    fn grouped_members_are_never_replaced() {
        let mut rng = StdRng::seed_from_u64(9);
        let mut snapshot = Snapshot::default();
        snapshot.members.insert(
            MemberId::new("x"),
            MemberRecord {
                name: "X".into(),
                birth: None,
                group: "Group B".into(),
            },
        );
        snapshot.revision = 1;
        let directory = MemberDirectory::from_snapshot(&snapshot);

        let mut watcher = IncrementalWatcher::arm(&MemberDirectory::new(), &policy(3, 2));
        assert!(watcher.on_change(&directory, &mut rng).is_empty());
        assert!(watcher.has_seen(&MemberId::new("x")));
    }

    #[test]
    fn each_member_is_placed_at_most_once() {
        let mut rng = StdRng::seed_from_u64(9);
        let mut feed = Feed::new();
        let mut watcher = IncrementalWatcher::arm(&MemberDirectory::new(), &policy(4, 2));

        let d = feed.arrive("a");
        assert_eq!(watcher.on_change(&d, &mut rng).len(), 1);
        // Same directory again, e.g. a duplicate notification before the write lands.
        assert!(watcher.on_change(&d, &mut rng).is_empty());
    }

    #[test]
    fn members_present_at_arm_time_are_left_alone() {
        let mut rng = StdRng::seed_from_u64(1);
        let mut feed = Feed::new();
        let d = feed.arrive("early");
        let mut watcher = IncrementalWatcher::arm(&d, &policy(2, 2));
        assert!(watcher.on_change(&d, &mut rng).is_empty());

        let d = feed.arrive("late");
        let placements = watcher.on_change(&d, &mut rng);
        assert_eq!(placements.len(), 1);
        assert_eq!(placements[0].member, MemberId::new("late"));
    }

    #[test]
    fn forgotten_members_are_retried() {
        let mut rng = StdRng::seed_from_u64(1);
        let mut feed = Feed::new();
        let mut watcher = IncrementalWatcher::arm(&MemberDirectory::new(), &policy(2, 1));
        let d = feed.arrive("a");
        let placements = watcher.on_change(&d, &mut rng);
        watcher.forget(placements.iter().map(|p| &p.member));
        assert_eq!(watcher.on_change(&d, &mut rng).len(), 1);
    }

    #[test]
    fn foreign_labels_do_not_count_toward_capacity() {
        let mut rng = StdRng::seed_from_u64(4);
        let mut snapshot = Snapshot::default();
        snapshot.members.insert(
            MemberId::new("old"),
            MemberRecord {
                name: "Old".into(),
                birth: None,
                group: "Lobby".into(),
            },
        );
        snapshot
            .members
            .insert(MemberId::new("new"), MemberRecord::new("New", None));
        snapshot.revision = 1;
        let directory = MemberDirectory::from_snapshot(&snapshot);

        let mut watcher = IncrementalWatcher::arm(&MemberDirectory::new(), &policy(1, 1));
        let placements = watcher.on_change(&directory, &mut rng);
        assert_eq!(
            placements,
            vec![Placement::new(MemberId::new("new"), GroupLabel::ordinal(0))]
        );
    }
}
