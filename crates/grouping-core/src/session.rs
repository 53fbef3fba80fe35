//! Admin session: the owned context behind the admin surface.
//!
//! One session holds the directory mirror, the policy, the current proposal,
//! the refresh countdown and (in first-come mode) the incremental watcher.
//! [`AdminSession::run`] multiplexes three triggers on one task and handles
//! each to completion before taking the next:
//!
//! - a store notification (full snapshot),
//! - a 1 s countdown tick while a deadline is armed,
//! - an admin command from the request channel.

use std::sync::Arc;
use std::time::Duration;

use rand::RngCore;
use serde::Serialize;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::time::{Interval, MissedTickBehavior};
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt as _;

use crate::allocator::allocate;
use crate::clock::Clock;
use crate::coordinator::{assign_least_loaded, commit, plan_publish};
use crate::directory::MemberDirectory;
use crate::error::{GroupingError, Result};
use crate::member::{Member, MemberId};
use crate::partition::{Allocation, Placement};
use crate::policy::{Mode, Policy};
use crate::scheduler::{RefreshScheduler, RefreshState, SchedulerPhase, Tick, TICK_INTERVAL_MS};
use crate::store::{Snapshot, Store, WriteBatch};
use crate::views::{self, GroupView};
use crate::watcher::IncrementalWatcher;

// ---------------------------------------------------------------------------
// Status, commands, outcomes
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// Nothing proposed since the last publish (or ever).
    Pending,
    /// A proposal is waiting to be published.
    Ready,
    Published,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdminCommand {
    SetGroupSize(usize),
    SetGroupCount(usize),
    SetRefreshMinutes(u32),
    SelectMode(Mode),
    RequestRefreshTimeChange(u32),
    Regenerate,
    Publish,
    AssignNewMembers,
    DeleteMember { id: MemberId, confirmed: bool },
    ResetAll { confirmed: bool },
    Describe,
}

impl AdminCommand {
    fn name(&self) -> &'static str {
        match self {
            AdminCommand::SetGroupSize(_) => "set_group_size",
            AdminCommand::SetGroupCount(_) => "set_group_count",
            AdminCommand::SetRefreshMinutes(_) => "set_refresh_minutes",
            AdminCommand::SelectMode(_) => "select_mode",
            AdminCommand::RequestRefreshTimeChange(_) => "request_refresh_time_change",
            AdminCommand::Regenerate => "regenerate",
            AdminCommand::Publish => "publish",
            AdminCommand::AssignNewMembers => "assign_new_members",
            AdminCommand::DeleteMember { .. } => "delete_member",
            AdminCommand::ResetAll { .. } => "reset_all",
            AdminCommand::Describe => "describe",
        }
    }
}

/// Everything the admin page shows.
#[derive(Debug, Clone, Serialize)]
pub struct SessionOverview {
    pub status: SessionStatus,
    pub policy: Policy,
    pub phase: SchedulerPhase,
    pub refresh: RefreshState,
    pub remaining_secs: Option<u64>,
    pub revision: u64,
    pub groups: Vec<GroupView>,
    pub unassigned: Vec<Member>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub proposal: Option<Allocation>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum CommandOutcome {
    PolicyUpdated { policy: Policy },
    Proposed { allocation: Allocation },
    Published { refresh: RefreshState },
    Assigned { placed: usize },
    RefreshRequested { expected_next_expires_at: i64 },
    Deleted { member: MemberId },
    Reset,
    Overview { overview: Box<SessionOverview> },
}

/// A command plus the channel its result goes back on.
pub struct AdminRequest {
    pub command: AdminCommand,
    pub reply: oneshot::Sender<Result<CommandOutcome>>,
}

impl AdminRequest {
    pub fn new(command: AdminCommand) -> (Self, oneshot::Receiver<Result<CommandOutcome>>) {
        let (reply, rx) = oneshot::channel();
        (Self { command, reply }, rx)
    }
}

// ---------------------------------------------------------------------------
// AdminSession
// ---------------------------------------------------------------------------

pub struct AdminSession {
    store: Arc<dyn Store>,
    policy: Policy,
    directory: MemberDirectory,
    refresh: RefreshScheduler,
    status: SessionStatus,
    proposal: Option<Allocation>,
    watcher: Option<IncrementalWatcher>,
    rng: Box<dyn RngCore + Send>,
    clock: Arc<dyn Clock>,
    updates: Option<broadcast::Receiver<Snapshot>>,
}

impl AdminSession {
    pub fn new(
        store: Arc<dyn Store>,
        policy: Policy,
        rng: Box<dyn RngCore + Send>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            policy,
            directory: MemberDirectory::new(),
            refresh: RefreshScheduler::new(),
            status: SessionStatus::Pending,
            proposal: None,
            watcher: None,
            rng,
            clock,
            updates: None,
        }
    }

    /// Subscribe and load the current snapshot. A store that already holds
    /// grouped members starts the session as `Published`.
    pub fn start(&mut self) -> Result<()> {
        self.policy.validate()?;
        let subscription = self.store.subscribe()?;
        self.directory = MemberDirectory::from_snapshot(&subscription.initial);
        self.refresh.reset();
        self.refresh.observe(subscription.initial.next_expiry);
        self.updates = Some(subscription.updates);

        if self.directory.has_assignments() {
            self.status = SessionStatus::Published;
            self.sync_watcher();
        }
        tracing::info!(
            members = self.directory.len(),
            revision = self.directory.revision(),
            status = ?self.status,
            "admin session started"
        );
        Ok(())
    }

    /// Drop the subscription.
    pub fn shutdown(&mut self) {
        if self.updates.take().is_some() {
            tracing::info!("admin session stopped");
        }
    }

    pub fn status(&self) -> SessionStatus {
        self.status
    }

    pub fn policy(&self) -> &Policy {
        &self.policy
    }

    pub fn proposal(&self) -> Option<&Allocation> {
        self.proposal.as_ref()
    }

    pub fn directory(&self) -> &MemberDirectory {
        &self.directory
    }

    pub fn refresh(&self) -> &RefreshState {
        self.refresh.state()
    }

    pub fn phase(&self) -> SchedulerPhase {
        self.refresh.phase()
    }

    pub fn remaining_secs(&self) -> Option<u64> {
        self.refresh.remaining_secs(self.clock.now_ms())
    }

    pub fn watcher_armed(&self) -> bool {
        self.watcher.is_some()
    }

    pub fn overview(&self) -> SessionOverview {
        SessionOverview {
            status: self.status,
            policy: self.policy.clone(),
            phase: self.refresh.phase(),
            refresh: *self.refresh.state(),
            remaining_secs: self.remaining_secs(),
            revision: self.directory.revision(),
            groups: views::results_view(&self.directory),
            unassigned: views::unassigned(&self.directory),
            proposal: self.proposal.clone(),
        }
    }

    // -----------------------------------------------------------------------
    // Triggers
    // -----------------------------------------------------------------------

    /// Apply one store notification. In first-come mode, newcomers are
    /// placed and written back as one batch.
    pub fn handle_snapshot(&mut self, snapshot: Snapshot) -> Result<()> {
        if !self.directory.apply(&snapshot) {
            tracing::debug!(revision = snapshot.revision, "stale snapshot ignored");
            return Ok(());
        }
        if self.refresh.observe(snapshot.next_expiry) {
            tracing::debug!(expires_at = ?snapshot.next_expiry, "refresh deadline changed in store");
        }

        let Some(watcher) = self.watcher.as_mut() else {
            return Ok(());
        };
        let placements = watcher.on_change(&self.directory, &mut *self.rng);
        if placements.is_empty() {
            return Ok(());
        }
        match self.store.write_atomic(&WriteBatch::from(placements.as_slice())) {
            Ok(revision) => {
                self.directory.record_write(&placements, &[], revision);
                tracing::info!(placed = placements.len(), revision, "placed new arrivals");
                Ok(())
            }
            Err(e) => {
                watcher.forget(placements.iter().map(|p| &p.member));
                Err(e)
            }
        }
    }

    /// Drain notifications already queued on the subscription. A lagged
    /// subscription resyncs from a fresh read.
    pub fn pump(&mut self) -> Result<usize> {
        let mut applied = 0;
        loop {
            let Some(updates) = self.updates.as_mut() else {
                return Ok(applied);
            };
            match updates.try_recv() {
                Ok(snapshot) => self.handle_snapshot(snapshot)?,
                Err(broadcast::error::TryRecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "subscription lagged; resyncing");
                    self.resync()?;
                }
                Err(_) => return Ok(applied),
            }
            applied += 1;
        }
    }

    fn resync(&mut self) -> Result<()> {
        let snapshot = self.store.read_once()?;
        self.handle_snapshot(snapshot)
    }

    /// One countdown tick. When the deadline elapses, regenerate and publish
    /// exactly once; a store failure keeps the same deadline so the next tick
    /// retries.
    pub fn handle_tick(&mut self) -> Result<Tick> {
        let now = self.clock.now_ms();
        let tick = self.refresh.tick(now);
        if tick != Tick::Due {
            return Ok(tick);
        }

        tracing::info!("refresh deadline reached; regenerating");
        let proposal = match allocate(&self.directory.to_vec(), &self.policy, &mut *self.rng) {
            Ok(allocation) => Some(allocation),
            Err(e) => {
                tracing::warn!(error = %e, "regenerate failed; publishing without a proposal");
                None
            }
        };
        match self.publish_with(proposal.as_ref(), now) {
            Ok(state) => {
                self.refresh.finish(state);
                Ok(tick)
            }
            Err(e) => {
                self.refresh.abort();
                Err(e)
            }
        }
    }

    pub fn handle_command(&mut self, command: AdminCommand) -> Result<CommandOutcome> {
        tracing::info!(command = command.name(), "admin command");
        match command {
            AdminCommand::SetGroupSize(size) => {
                let size = positive(size, "group size")?;
                self.update_policy(|p| p.group_size = size)
            }
            AdminCommand::SetGroupCount(count) => {
                let count = positive(count, "group count")?;
                self.update_policy(|p| p.group_count = count)
            }
            AdminCommand::SetRefreshMinutes(minutes) => {
                positive(minutes as usize, "refresh interval")?;
                self.update_policy(|p| p.refresh_minutes = minutes)
            }
            AdminCommand::SelectMode(mode) => self.update_policy(|p| p.mode = mode),
            AdminCommand::RequestRefreshTimeChange(minutes) => {
                positive(minutes as usize, "refresh interval")?;
                let expected = self.refresh.request_change(minutes, self.clock.now_ms());
                Ok(CommandOutcome::RefreshRequested {
                    expected_next_expires_at: expected,
                })
            }
            AdminCommand::Regenerate => {
                let allocation =
                    allocate(&self.directory.to_vec(), &self.policy, &mut *self.rng)?;
                self.proposal = Some(allocation.clone());
                self.status = SessionStatus::Ready;
                Ok(CommandOutcome::Proposed { allocation })
            }
            AdminCommand::Publish => {
                let proposal = self.proposal.clone();
                let state = self.publish_with(proposal.as_ref(), self.clock.now_ms())?;
                self.refresh.finish(state);
                Ok(CommandOutcome::Published { refresh: state })
            }
            AdminCommand::AssignNewMembers => {
                let placements = assign_least_loaded(&self.directory, &mut *self.rng);
                self.write_placements(&placements)?;
                Ok(CommandOutcome::Assigned {
                    placed: placements.len(),
                })
            }
            AdminCommand::DeleteMember { id, confirmed } => {
                if !confirmed {
                    return Err(GroupingError::DestructiveConfirmationRequired(format!(
                        "delete member {id}"
                    )));
                }
                self.store.delete_member(&id)?;
                Ok(CommandOutcome::Deleted { member: id })
            }
            AdminCommand::ResetAll { confirmed } => {
                if !confirmed {
                    return Err(GroupingError::DestructiveConfirmationRequired(
                        "reset all".into(),
                    ));
                }
                self.store.clear()?;
                self.refresh.reset();
                self.proposal = None;
                self.status = SessionStatus::Pending;
                self.watcher = None;
                tracing::warn!("store cleared");
                Ok(CommandOutcome::Reset)
            }
            AdminCommand::Describe => Ok(CommandOutcome::Overview {
                overview: Box::new(self.overview()),
            }),
        }
    }

    // -----------------------------------------------------------------------
    // Event loop
    // -----------------------------------------------------------------------

    /// Serve notifications, ticks and commands until the command channel
    /// closes. Handler errors are logged and the loop keeps going.
    pub async fn run(mut self, mut commands: mpsc::Receiver<AdminRequest>) -> Result<()> {
        if self.updates.is_none() {
            self.start()?;
        }
        let Some(receiver) = self.updates.take() else {
            return Ok(());
        };
        let mut updates = BroadcastStream::new(receiver);
        let mut armed_for = self.refresh.expires_at();
        let mut ticker = countdown(armed_for);

        loop {
            tokio::select! {
                update = updates.next() => match update {
                    Some(Ok(snapshot)) => {
                        if let Err(e) = self.handle_snapshot(snapshot) {
                            tracing::warn!(error = %e, "failed to handle store notification");
                        }
                    }
                    Some(Err(BroadcastStreamRecvError::Lagged(skipped))) => {
                        tracing::warn!(skipped, "subscription lagged; resyncing");
                        if let Err(e) = self.resync() {
                            tracing::warn!(error = %e, "resync failed");
                        }
                    }
                    None => {
                        tracing::info!("store subscription closed");
                        break;
                    }
                },
                _ = next_tick(&mut ticker) => {
                    if let Err(e) = self.handle_tick() {
                        tracing::warn!(error = %e, "refresh cycle failed; retrying next tick");
                    }
                }
                request = commands.recv() => match request {
                    Some(AdminRequest { command, reply }) => {
                        let result = self.handle_command(command);
                        if let Err(e) = &result {
                            tracing::warn!(error = %e, "admin command failed");
                        }
                        let _ = reply.send(result);
                    }
                    None => break,
                },
            }

            let expires_at = self.refresh.expires_at();
            if expires_at != armed_for {
                armed_for = expires_at;
                ticker = countdown(armed_for);
            }
        }

        self.shutdown();
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    /// Publish `proposal` (or place the unassigned when `None`) and return
    /// the committed refresh state. Local state only changes on success.
    fn publish_with(&mut self, proposal: Option<&Allocation>, now_ms: i64) -> Result<RefreshState> {
        let mut state = *self.refresh.state();
        let plan = plan_publish(
            proposal,
            &self.directory,
            &self.policy,
            &state,
            now_ms,
            &mut *self.rng,
        );
        commit(self.store.as_ref(), &plan, &mut self.directory, &mut state)?;

        self.status = SessionStatus::Published;
        self.proposal = None;
        self.sync_watcher();
        Ok(state)
    }

    fn write_placements(&mut self, placements: &[Placement]) -> Result<()> {
        if placements.is_empty() {
            return Ok(());
        }
        let revision = self.store.write_atomic(&WriteBatch::from(placements))?;
        self.directory.record_write(placements, &[], revision);
        Ok(())
    }

    fn update_policy(&mut self, change: impl FnOnce(&mut Policy)) -> Result<CommandOutcome> {
        let mut policy = self.policy.clone();
        change(&mut policy);
        policy.validate()?;
        self.policy = policy;
        // Arming waits for the next first-come publish.
        if self.policy.mode != Mode::FirstCome {
            self.watcher = None;
        } else if let Some(watcher) = self.watcher.as_mut() {
            watcher.retarget(&self.policy);
        }
        Ok(CommandOutcome::PolicyUpdated {
            policy: self.policy.clone(),
        })
    }

    /// The watcher runs only for a published first-come session.
    fn sync_watcher(&mut self) {
        let wanted = self.policy.mode == Mode::FirstCome && self.status == SessionStatus::Published;
        if !wanted {
            self.watcher = None;
        } else if let Some(watcher) = self.watcher.as_mut() {
            watcher.retarget(&self.policy);
        } else {
            self.watcher = Some(IncrementalWatcher::arm(&self.directory, &self.policy));
            tracing::info!("first-come watcher armed");
        }
    }
}

fn positive(value: usize, what: &str) -> Result<usize> {
    if value == 0 {
        return Err(GroupingError::InvalidPolicy(format!("{what} must be positive")));
    }
    Ok(value)
}

fn countdown(expires_at: Option<i64>) -> Option<Interval> {
    expires_at?;
    let mut interval = tokio::time::interval(Duration::from_millis(TICK_INTERVAL_MS));
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    Some(interval)
}

async fn next_tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}
