//! Program invocation frame.
//!
//! The cursor counts applied trace units. A step applies the next unit's
//! stack, scratch and state effects. When the unit just applied spawned inner
//! transactions, the following step pushes their group first, and the
//! `handled` flag keeps that group from being pushed again once it pops.
//!
//! When the trace is exhausted the frame may take one more step to report a
//! failure or a clear state rollback before it pops.

use std::sync::Arc;
use tracing::debug;

use avm_replay_types::{ApplicationStateOperation, ProgramKind, TxnPath};

use super::{describe_txn, Entry, Failure, ReplayContext, ReplayFrame, Transition, TxnGroupFrame};
use crate::app_state::AppState;
use crate::errors::{ReplayError, ReplayResult};
use crate::program_replay::ProgramReplay;
use crate::source::ResolvedLocation;

/// Reported when a clear state program was rolled back without an error message.
pub const CLEAR_STATE_ROLLBACK_MESSAGE: &str =
    "clear state program failed; its state changes were rolled back";

/// Which program a frame runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgramTarget {
    pub group: usize,
    pub txn_path: TxnPath,
    pub kind: ProgramKind,
    /// Group failure this program (or an inner transaction it spawns) caused.
    pub failure: Option<Failure>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ProgramCursor {
    Running { handled: bool },
    /// The failure or rollback has been reported.
    Reported,
    Exited,
}

#[derive(Debug)]
pub struct ProgramFrame {
    target: ProgramTarget,
    app_id: Option<u64>,
    replay: ProgramReplay,
    rollback: Option<String>,
    /// State of the owning app when the frame was first entered.
    entry_state: Option<AppState>,
    cursor: ProgramCursor,
}

impl ProgramFrame {
    pub fn new(
        ctx: &mut ReplayContext<'_>,
        target: ProgramTarget,
        entry: Entry,
    ) -> ReplayResult<Self> {
        let label = describe_txn(target.group, &target.txn_path);
        let view = ctx
            .trace
            .txn(target.group, &target.txn_path)
            .ok_or_else(|| ReplayError::lookup(format!("no transaction at {}", label)))?;
        let exec = view
            .trace
            .ok_or_else(|| ReplayError::lookup(format!("no execution trace for {}", label)))?;
        let (units, hash) = exec.program(target.kind).ok_or_else(|| {
            ReplayError::lookup(format!("no {} trace for {}", target.kind.label(), label))
        })?;

        let app_id = match target.kind {
            ProgramKind::LogicSig => None,
            ProgramKind::Approval | ProgramKind::ClearState => view.result.app_id(),
        };
        let rollback = if target.kind == ProgramKind::ClearState && exec.clear_state_rollback {
            Some(
                exec.clear_state_rollback_error
                    .clone()
                    .unwrap_or_else(|| CLEAR_STATE_ROLLBACK_MESSAGE.to_string()),
            )
        } else {
            None
        };
        let descriptor = hash.and_then(|h| ctx.programs.descriptor(h));
        let replay = ProgramReplay::new(Arc::from(units.to_vec()), descriptor)?;

        let entry_state = match (app_id, entry) {
            (None, _) => None,
            (Some(app), Entry::Forward) => {
                let state = ctx.state.get(&app).cloned().unwrap_or_default();
                ctx.snapshots
                    .record(target.group, &target.txn_path, target.kind, state.clone());
                Some(state)
            }
            (Some(_), Entry::Backward) => {
                let state = ctx
                    .snapshots
                    .get(target.group, &target.txn_path, target.kind)
                    .cloned()
                    .ok_or_else(|| {
                        ReplayError::lookup(format!(
                            "no entry snapshot for the {} of {}",
                            target.kind.label(),
                            label
                        ))
                    })?;
                Some(state)
            }
        };

        Ok(Self {
            target,
            app_id,
            replay,
            rollback,
            entry_state,
            cursor: match entry {
                Entry::Forward => ProgramCursor::Running { handled: false },
                Entry::Backward => ProgramCursor::Exited,
            },
        })
    }

    pub fn kind(&self) -> ProgramKind {
        self.target.kind
    }

    pub fn target(&self) -> &ProgramTarget {
        &self.target
    }

    pub fn app_id(&self) -> Option<u64> {
        self.app_id
    }

    pub fn replay(&self) -> &ProgramReplay {
        &self.replay
    }

    pub fn is_reported(&self) -> bool {
        self.cursor == ProgramCursor::Reported
    }

    fn spawns(&self, unit: usize) -> bool {
        self.replay
            .units()
            .get(unit)
            .map(|u| !u.spawned_inners.is_empty())
            .unwrap_or(false)
    }

    /// Whether one of this program's units spawned the transaction the failure leads into.
    fn spawned_failing_inner(&self, failure: &Failure) -> bool {
        match failure.inner_index(&self.target.txn_path) {
            Some(index) => self
                .replay
                .units()
                .iter()
                .any(|u| u.spawned_inners.contains(&index)),
            None => false,
        }
    }

    /// Message this frame reports once its trace is exhausted.
    fn report_message(&self) -> Option<String> {
        if let Some(failure) = &self.target.failure {
            if failure.targets(&self.target.txn_path) || !self.spawned_failing_inner(failure) {
                return Some(failure.message.clone());
            }
        }
        self.rollback.clone()
    }

    fn inner_group(
        &self,
        ctx: &mut ReplayContext<'_>,
        unit: usize,
        entry: Entry,
    ) -> ReplayResult<Transition> {
        let spawned = self
            .replay
            .units()
            .get(unit)
            .map(|u| u.spawned_inners.as_slice())
            .unwrap_or(&[]);
        let path = &self.target.txn_path;
        let failure = self
            .target
            .failure
            .as_ref()
            .filter(|f| {
                f.inner_index(path)
                    .map(|i| spawned.contains(&i))
                    .unwrap_or(false)
            })
            .cloned();
        debug!(txn = %describe_txn(self.target.group, path), unit, count = spawned.len(), ?entry, "entering inner transactions");
        let frame = TxnGroupFrame::inner(ctx, self.target.group, path, spawned, failure, entry);
        Ok(Transition::push(ReplayFrame::Group(frame)))
    }

    fn apply_next(&mut self, ctx: &mut ReplayContext<'_>) -> ReplayResult<()> {
        let index = self.replay.index();
        self.replay.step()?;
        if let Some(unit) = self.replay.units().get(index) {
            apply_state_changes(ctx, self.app_id, &unit.state_changes)?;
        }
        Ok(())
    }

    /// Put the replay and the owning app's state at `target` applied units.
    fn rewind_to(&mut self, ctx: &mut ReplayContext<'_>, target: usize) -> ReplayResult<()> {
        self.replay.replay_to(target)?;
        if let (Some(app), Some(entry)) = (self.app_id, &self.entry_state) {
            let mut state = entry.clone();
            for unit in self.replay.units().iter().take(target) {
                for op in &unit.state_changes {
                    state.apply(op)?;
                }
            }
            ctx.state.insert(app, state);
        }
        Ok(())
    }

    fn restore_entry_state(&self, ctx: &mut ReplayContext<'_>) {
        if let (Some(app), Some(entry)) = (self.app_id, &self.entry_state) {
            ctx.state.insert(app, entry.clone());
        }
    }

    pub fn forward(&mut self, ctx: &mut ReplayContext<'_>) -> ReplayResult<Transition> {
        let handled = match self.cursor {
            ProgramCursor::Running { handled } => handled,
            ProgramCursor::Reported | ProgramCursor::Exited => {
                self.cursor = ProgramCursor::Exited;
                return Ok(Transition::pop());
            }
        };
        let index = self.replay.index();

        if !handled && index > 0 && self.spawns(index - 1) {
            self.cursor = ProgramCursor::Running { handled: true };
            return self.inner_group(ctx, index - 1, Entry::Forward);
        }

        if index < self.replay.len() {
            self.apply_next(ctx)?;
            self.cursor = ProgramCursor::Running { handled: false };
            return Ok(Transition::step());
        }

        if let Some(message) = self.report_message() {
            if self.rollback.is_some() {
                debug!(app = ?self.app_id, "rolling back clear state program");
                self.restore_entry_state(ctx);
            }
            self.cursor = ProgramCursor::Reported;
            return Ok(Transition::raise(message));
        }

        self.cursor = ProgramCursor::Exited;
        Ok(Transition::pop())
    }

    pub fn backward(&mut self, ctx: &mut ReplayContext<'_>) -> ReplayResult<Transition> {
        let len = self.replay.len();
        match self.cursor {
            ProgramCursor::Exited => {
                if self.report_message().is_some() {
                    self.rewind_to(ctx, len)?;
                    if self.rollback.is_some() {
                        self.restore_entry_state(ctx);
                    }
                    self.cursor = ProgramCursor::Reported;
                    Ok(Transition::step())
                } else {
                    self.land_on(ctx, len)
                }
            }
            ProgramCursor::Reported => self.land_on(ctx, len),
            ProgramCursor::Running { handled: true } => {
                self.cursor = ProgramCursor::Running { handled: false };
                Ok(Transition::step())
            }
            ProgramCursor::Running { handled: false } => match self.replay.index().checked_sub(1) {
                Some(previous) => self.land_on(ctx, previous),
                None => Ok(Transition::pop()),
            },
        }
    }

    /// Move to the forward position with `target` units applied.
    fn land_on(&mut self, ctx: &mut ReplayContext<'_>, target: usize) -> ReplayResult<Transition> {
        self.rewind_to(ctx, target)?;
        if target > 0 && self.spawns(target - 1) {
            self.cursor = ProgramCursor::Running { handled: true };
            return self.inner_group(ctx, target - 1, Entry::Backward);
        }
        self.cursor = ProgramCursor::Running { handled: false };
        if target == 0 {
            Ok(Transition::pop())
        } else {
            Ok(Transition::step())
        }
    }

    /// Source location of `pc` in this program's file.
    pub fn location_at(&self, pc: u64) -> Option<ResolvedLocation> {
        let descriptor = self.replay.descriptor()?;
        Some(ResolvedLocation {
            file: descriptor.file.clone(),
            location: descriptor.location(pc)?,
        })
    }

    pub fn source_location(&self) -> Option<ResolvedLocation> {
        if self.cursor == ProgramCursor::Exited {
            return None;
        }
        self.location_at(self.replay.current_pc()?)
    }

    pub fn display_name(&self) -> String {
        let base = format!(
            "{} of {}",
            self.target.kind.label(),
            describe_txn(self.target.group, &self.target.txn_path)
        );
        match self.app_id {
            Some(app) => format!("{} (app {})", base, app),
            None => base,
        }
    }

    pub fn cursor_summary(&self) -> String {
        format!("{:?} after {} units", self.cursor, self.replay.index())
    }
}

fn apply_state_changes(
    ctx: &mut ReplayContext<'_>,
    app_id: Option<u64>,
    ops: &[ApplicationStateOperation],
) -> ReplayResult<()> {
    if ops.is_empty() {
        return Ok(());
    }
    let app = app_id.ok_or_else(|| {
        ReplayError::malformed("state change recorded outside an application call")
    })?;
    let state = ctx.state.entry(app).or_default();
    for op in ops {
        state.apply(op)?;
    }
    Ok(())
}
