//! Group allocation.
//!
//! Two policies share one entry point, [`allocate`]:
//!
//! - **Batch** shuffles everyone and splits them into near-equal groups,
//!   shrinking the group count until no group would be a singleton.
//! - **First-come (bulk)** fills a fixed number of groups up to capacity,
//!   drawing members and target groups at random. Whoever does not fit is
//!   reported as unassigned.
//!
//! All randomness comes from the caller's `Rng`, so a seeded generator
//! reproduces an allocation exactly.

use crate::error::{GroupingError, Result};
use crate::label::GroupLabel;
use crate::member::Member;
use crate::partition::{Allocation, Partition};
use crate::policy::{Mode, Policy};
use rand::seq::SliceRandom;
use rand::Rng;

pub fn allocate<R: Rng + ?Sized>(
    members: &[Member],
    policy: &Policy,
    rng: &mut R,
) -> Result<Allocation> {
    match policy.mode {
        Mode::Batch => {
            let partition = batch_partition(members, policy.group_size, rng)?;
            Ok(Allocation {
                partition,
                unassigned: Vec::new(),
            })
        }
        Mode::FirstCome => {
            first_come_placement(members, policy.group_size, policy.group_count, rng)
        }
    }
}

// ---------------------------------------------------------------------------
// Batch
// ---------------------------------------------------------------------------

pub fn batch_partition<R: Rng + ?Sized>(
    members: &[Member],
    group_size: usize,
    rng: &mut R,
) -> Result<Partition> {
    if group_size == 0 {
        return Err(GroupingError::InvalidPolicy(
            "group size must be positive".into(),
        ));
    }
    if members.is_empty() {
        return Ok(Partition::new());
    }

    let total = members.len();
    let k = feasible_group_count(total, group_size).ok_or(GroupingError::Infeasible {
        members: total,
        group_size,
    })?;

    let mut shuffled = members.to_vec();
    shuffled.shuffle(rng);

    let mut rest = shuffled.into_iter();
    let mut partition = Partition::new();
    for (ordinal, size) in split_sizes(total, k).into_iter().enumerate() {
        partition.insert_group(GroupLabel::ordinal(ordinal), rest.by_ref().take(size).collect());
    }
    Ok(partition)
}

/// Group count for `total` members: start at `ceil(total / group_size)` and
/// step down until the near-equal split contains no singleton group.
///
/// Returns `None` when no count works, which only happens for one member.
pub fn feasible_group_count(total: usize, group_size: usize) -> Option<usize> {
    if group_size == 0 {
        return None;
    }
    let mut k = total.div_ceil(group_size);
    while k > 0 {
        if split_sizes(total, k).iter().all(|&size| size != 1) {
            return Some(k);
        }
        k -= 1;
    }
    None
}

/// Near-equal split of `total` into `k` groups; the `total % k` lowest
/// ordinals take one extra member.
pub fn split_sizes(total: usize, k: usize) -> Vec<usize> {
    if k == 0 {
        return Vec::new();
    }
    let base = total / k;
    let extra = total % k;
    (0..k).map(|i| base + usize::from(i < extra)).collect()
}

// ---------------------------------------------------------------------------
// First-come (bulk)
// ---------------------------------------------------------------------------

pub fn first_come_placement<R: Rng + ?Sized>(
    members: &[Member],
    group_size: usize,
    group_count: usize,
    rng: &mut R,
) -> Result<Allocation> {
    if group_size == 0 || group_count == 0 {
        return Err(GroupingError::InvalidPolicy(
            "group size and group count must be positive".into(),
        ));
    }

    let mut pool = members.to_vec();
    pool.shuffle(rng);

    let mut groups: Vec<Vec<Member>> = vec![Vec::new(); group_count];
    while !pool.is_empty() {
        let open: Vec<usize> = (0..group_count)
            .filter(|&g| groups[g].len() < group_size)
            .collect();
        let Some(&target) = open.choose(rng) else {
            break;
        };
        let member = pool.swap_remove(rng.gen_range(0..pool.len()));
        groups[target].push(member);
    }

    let mut partition = Partition::new();
    for (ordinal, members) in groups.into_iter().enumerate() {
        partition.insert_group(GroupLabel::ordinal(ordinal), members);
    }
    pool.sort_by(|a, b| a.id.cmp(&b.id));
    Ok(Allocation {
        partition,
        unassigned: pool,
    })
}
