//! Publication: turning a proposal (or the lack of one) into one atomic
//! store update.

use crate::directory::MemberDirectory;
use crate::error::Result;
use crate::label::GroupLabel;
use crate::member::MemberId;
use crate::partition::{Allocation, Placement};
use crate::policy::{Mode, Policy};
use crate::scheduler::RefreshState;
use crate::store::{Store, WriteBatch};
use rand::seq::SliceRandom;
use rand::Rng;
use std::collections::{BTreeMap, HashSet};

/// Everything one publish will write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishPlan {
    pub placements: Vec<Placement>,
    /// Members left out of the proposal that currently hold a label.
    pub released: Vec<MemberId>,
    pub next_expiry: i64,
}

impl PublishPlan {
    pub fn batch(&self) -> WriteBatch {
        let mut batch = WriteBatch::from(self.placements.as_slice());
        for id in &self.released {
            batch.release(id.clone());
        }
        batch.next_expiry(self.next_expiry);
        batch
    }
}

/// Decide the writes for a publish without touching the store.
///
/// With a proposal, every proposed member still in the directory whose
/// label differs is moved, and members the proposal could not seat lose
/// their label. In first-come mode, members who arrived after the proposal
/// was made take the seats it left open. Without a proposal, assigned
/// members stay put and the unassigned are spread over the existing groups,
/// least loaded first.
pub fn plan_publish<R: Rng + ?Sized>(
    proposal: Option<&Allocation>,
    directory: &MemberDirectory,
    policy: &Policy,
    refresh: &RefreshState,
    now_ms: i64,
    rng: &mut R,
) -> PublishPlan {
    let (placements, released) = match proposal {
        Some(allocation) => {
            let mut placements: Vec<Placement> = allocation
                .partition
                .placements()
                .filter(|p| {
                    directory
                        .get(&p.member)
                        .is_some_and(|m| m.group.as_ref() != Some(&p.group))
                })
                .collect();
            let mut released: Vec<MemberId> = allocation
                .unassigned
                .iter()
                .filter(|m| directory.get(&m.id).is_some_and(|m| m.is_assigned()))
                .map(|m| m.id.clone())
                .collect();
            if policy.mode == Mode::FirstCome {
                let (seated, dropped) = seat_late_arrivals(allocation, directory, policy, rng);
                placements.extend(seated);
                released.extend(dropped);
            }
            (placements, released)
        }
        None => (assign_least_loaded(directory, rng), Vec::new()),
    };
    PublishPlan {
        placements,
        released,
        next_expiry: refresh.next_expiry(policy, now_ms),
    }
}

/// Seat members the proposal does not mention against the occupancy the
/// proposal will leave behind. A member keeps its current label while that
/// group still has room; the rest take a random open seat, and members with
/// a label but no seat left are released.
fn seat_late_arrivals<R: Rng + ?Sized>(
    allocation: &Allocation,
    directory: &MemberDirectory,
    policy: &Policy,
    rng: &mut R,
) -> (Vec<Placement>, Vec<MemberId>) {
    let proposed: HashSet<&MemberId> = allocation
        .partition
        .groups()
        .flat_map(|(_, members)| members.iter().map(|m| &m.id))
        .chain(allocation.unassigned.iter().map(|m| &m.id))
        .collect();
    let mut occupancy: BTreeMap<GroupLabel, usize> = GroupLabel::first(policy.group_count)
        .map(|l| (l, 0))
        .collect();
    for (label, members) in allocation.partition.groups() {
        if let Some(count) = occupancy.get_mut(label) {
            *count += members.iter().filter(|m| directory.contains(&m.id)).count();
        }
    }

    let mut waiting = Vec::new();
    for member in directory.members().filter(|m| !proposed.contains(&m.id)) {
        if let Some(count) = member.group.as_ref().and_then(|l| occupancy.get_mut(l)) {
            if *count < policy.group_size {
                *count += 1;
                continue;
            }
        }
        waiting.push(member);
    }

    let mut placements = Vec::new();
    let mut released = Vec::new();
    for member in waiting {
        let open: Vec<&GroupLabel> = occupancy
            .iter()
            .filter(|&(_, &count)| count < policy.group_size)
            .map(|(label, _)| label)
            .collect();
        match open.choose(rng) {
            Some(&target) => {
                let target = target.clone();
                if let Some(count) = occupancy.get_mut(&target) {
                    *count += 1;
                }
                placements.push(Placement::new(member.id.clone(), target));
            }
            None if member.is_assigned() => released.push(member.id.clone()),
            None => {}
        }
    }
    (placements, released)
}

/// Commit `plan` in one atomic write. On success the directory gets the new
/// labels optimistically and `refresh` folds in the committed deadline; on
/// failure neither is touched, so the same publish can simply be retried.
pub fn commit(
    store: &dyn Store,
    plan: &PublishPlan,
    directory: &mut MemberDirectory,
    refresh: &mut RefreshState,
) -> Result<RefreshState> {
    let revision = store.write_atomic(&plan.batch())?;
    directory.record_write(&plan.placements, &plan.released, revision);
    refresh.commit(plan.next_expiry);
    tracing::info!(
        revision,
        placements = plan.placements.len(),
        released = plan.released.len(),
        next_expiry = plan.next_expiry,
        "published"
    );
    Ok(*refresh)
}

/// Place each unassigned member into the existing group with the fewest
/// members, breaking ties at random and counting each pick immediately.
///
/// With no existing groups there is nowhere to go and nobody is placed.
pub fn assign_least_loaded<R: Rng + ?Sized>(
    directory: &MemberDirectory,
    rng: &mut R,
) -> Vec<Placement> {
    let mut occupancy: BTreeMap<GroupLabel, usize> = directory.occupancy();
    let mut placements = Vec::new();
    if occupancy.is_empty() {
        let waiting = directory.unassigned().count();
        if waiting > 0 {
            tracing::warn!(waiting, "no existing groups to place unassigned members into");
        }
        return placements;
    }

    for member in directory.unassigned() {
        let Some(min) = occupancy.values().copied().min() else {
            break;
        };
        let tied: Vec<&GroupLabel> = occupancy
            .iter()
            .filter(|&(_, &count)| count == min)
            .map(|(label, _)| label)
            .collect();
        let Some(&chosen) = tied.choose(rng) else {
            break;
        };
        let chosen = chosen.clone();
        if let Some(count) = occupancy.get_mut(&chosen) {
            *count += 1;
        }
        placements.push(Placement::new(member.id.clone(), chosen));
    }
    placements
}
