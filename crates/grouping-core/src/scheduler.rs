use crate::policy::{minutes_to_ms, Policy};
use serde::Serialize;

/// Interval between countdown ticks while armed.
pub const TICK_INTERVAL_MS: u64 = 1_000;

// ---------------------------------------------------------------------------
// RefreshState
// ---------------------------------------------------------------------------

/// Published deadline plus an admin-requested one awaiting the next publish.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RefreshState {
    pub expires_at: Option<i64>,
    pub expected_next_expires_at: Option<i64>,
}

impl RefreshState {
    /// Deadline the next publish will commit.
    pub fn next_expiry(&self, policy: &Policy, now_ms: i64) -> i64 {
        self.expected_next_expires_at
            .unwrap_or(now_ms + policy.refresh_interval_ms())
    }

    /// Fold a committed deadline in and drop the pending one.
    pub fn commit(&mut self, expires_at: i64) {
        self.expires_at = Some(expires_at);
        self.expected_next_expires_at = None;
    }
}

// ---------------------------------------------------------------------------
// RefreshScheduler
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SchedulerPhase {
    /// No deadline published yet.
    Idle,
    /// Counting down to `expires_at`.
    Armed,
    /// Deadline hit; a regenerate + publish cycle is in flight.
    Expired,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tick {
    Idle,
    Remaining { secs: u64 },
    /// The deadline elapsed on this tick; the caller must run one cycle and
    /// report back with [`RefreshScheduler::finish`] or
    /// [`RefreshScheduler::abort`].
    Due,
    /// A cycle is already running; this tick is dropped.
    InFlight,
}

/// Countdown to the next regenerate + publish.
///
/// Transitions: `Idle → Armed → Expired → Armed`.
#[derive(Debug, Clone)]
pub struct RefreshScheduler {
    state: RefreshState,
    phase: SchedulerPhase,
}

impl Default for RefreshScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl RefreshScheduler {
    pub fn new() -> Self {
        Self {
            state: RefreshState::default(),
            phase: SchedulerPhase::Idle,
        }
    }

    pub fn state(&self) -> &RefreshState {
        &self.state
    }

    pub fn phase(&self) -> SchedulerPhase {
        self.phase
    }

    pub fn expires_at(&self) -> Option<i64> {
        self.state.expires_at
    }

    /// Whole seconds left, rounded up; `None` while idle.
    pub fn remaining_secs(&self, now_ms: i64) -> Option<u64> {
        let expires_at = self.state.expires_at?;
        let ms = (expires_at - now_ms).max(0) as u64;
        Some(ms.div_ceil(1_000))
    }

    pub fn tick(&mut self, now_ms: i64) -> Tick {
        match self.phase {
            SchedulerPhase::Idle => Tick::Idle,
            SchedulerPhase::Expired => Tick::InFlight,
            SchedulerPhase::Armed => match self.remaining_secs(now_ms) {
                Some(0) => {
                    self.phase = SchedulerPhase::Expired;
                    Tick::Due
                }
                Some(secs) => Tick::Remaining { secs },
                None => {
                    self.phase = SchedulerPhase::Idle;
                    Tick::Idle
                }
            },
        }
    }

    /// A cycle committed `state`; count down to its deadline.
    pub fn finish(&mut self, state: RefreshState) {
        self.state = state;
        self.phase = if state.expires_at.is_some() {
            SchedulerPhase::Armed
        } else {
            SchedulerPhase::Idle
        };
    }

    /// The cycle failed; stay on the same deadline so the next tick retries.
    pub fn abort(&mut self) {
        if self.phase == SchedulerPhase::Expired {
            self.phase = SchedulerPhase::Armed;
        }
    }

    /// Mirror the deadline seen in the store. Returns whether it changed.
    ///
    /// Ignored while a cycle is in flight; the cycle's own commit wins.
    pub fn observe(&mut self, expires_at: Option<i64>) -> bool {
        if self.phase == SchedulerPhase::Expired || self.state.expires_at == expires_at {
            return false;
        }
        self.state.expires_at = expires_at;
        self.phase = match expires_at {
            Some(_) => SchedulerPhase::Armed,
            None => SchedulerPhase::Idle,
        };
        true
    }

    /// Stage a new deadline `minutes` from now. The running countdown is
    /// untouched until the next publish commits it.
    pub fn request_change(&mut self, minutes: u32, now_ms: i64) -> i64 {
        let expected = now_ms + minutes_to_ms(minutes);
        self.state.expected_next_expires_at = Some(expected);
        expected
    }

    /// Drop both deadlines, e.g. after the store was wiped.
    pub fn reset(&mut self) {
        self.state = RefreshState::default();
        self.phase = SchedulerPhase::Idle;
    }
}
