//! Trace replay engine.
//!
//! [`TraceReplayEngine`] owns everything a replay session mutates: the frame
//! stack, the catalog of programs found in the trace, and the two
//! application state maps (*initial*, fixed at load, and *current*, moving
//! with the cursor).
//!
//! `forward`/`backward` hand the top frame to its transition and keep going
//! while the stack depth changes, so every call ends on a position where some
//! frame moved its own cursor.

use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, trace};

use avm_replay_types::{
    AppStateType, AvmValue, PendingTxnResult, ProgramKind, SimulateTrace, StateOperation,
    TxnExecTrace,
};

use crate::app_state::AppState;
use crate::errors::{ReplayError, ReplayResult};
use crate::frames::{
    FrameTransition, GroupListFrame, ReplayContext, ReplayFrame, SnapshotLedger, Transition,
};
use crate::program_replay::NamedVariable;
use crate::source::{ProgramCatalog, ResolvedLocation, SourceRegistry};

/// Outcome of one engine step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepResult {
    Ok,
    /// The frame stack is empty (forward) or the cursor is at the very
    /// beginning (backward).
    End,
    /// A recorded failure or rollback was reached.
    Exception(String),
}

/// One entry of the display call stack.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisplayFrame {
    /// Index of the engine frame this entry belongs to (0 is the bottom).
    pub frame_index: usize,
    pub name: String,
    pub location: Option<ResolvedLocation>,
}

/// Machine state of a program frame at the cursor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgramStateView {
    pub kind: ProgramKind,
    pub app_id: Option<u64>,
    pub pc: Option<u64>,
    pub stack: Vec<AvmValue>,
    /// Non-default scratch slots.
    pub scratch: BTreeMap<u64, AvmValue>,
    pub variables: Vec<NamedVariable>,
}

pub struct TraceReplayEngine {
    trace: Arc<SimulateTrace>,
    programs: ProgramCatalog,
    initial_state: BTreeMap<u64, AppState>,
    current_state: BTreeMap<u64, AppState>,
    snapshots: SnapshotLedger,
    frames: Vec<ReplayFrame>,
}

impl TraceReplayEngine {
    /// Prepare a trace for replay.
    ///
    /// Walks every transaction once to register each program with its source
    /// descriptor and to create local state placeholders for every account a
    /// program writes to. Fails if the simulation ran without execution
    /// tracing or a descriptor does not cover its program.
    pub fn load_resources(
        trace: SimulateTrace,
        registry: &dyn SourceRegistry,
    ) -> ReplayResult<Self> {
        if !trace.trace_enabled() {
            return Err(ReplayError::malformed(
                "simulate response was produced without execution tracing enabled",
            ));
        }

        let mut initial_state = BTreeMap::new();
        for app in trace.app_initial_states() {
            initial_state.insert(app.id, AppState::from_initial_state(app)?);
        }

        let mut programs = ProgramCatalog::new();
        for group in &trace.txn_groups {
            for txn in &group.txn_results {
                discover(
                    Some(&txn.txn_result),
                    txn.exec_trace.as_ref(),
                    &mut programs,
                    &mut initial_state,
                    registry,
                )?;
            }
        }
        debug!(
            groups = trace.txn_groups.len(),
            programs = programs.len(),
            apps = initial_state.len(),
            "loaded execution trace"
        );

        let group_count = trace.txn_groups.len();
        Ok(Self {
            trace: Arc::new(trace),
            programs,
            current_state: initial_state.clone(),
            initial_state,
            snapshots: SnapshotLedger::default(),
            frames: vec![ReplayFrame::Groups(GroupListFrame::new(group_count))],
        })
    }

    pub fn trace(&self) -> &Arc<SimulateTrace> {
        &self.trace
    }

    pub fn programs(&self) -> &ProgramCatalog {
        &self.programs
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    pub fn is_ended(&self) -> bool {
        self.frames.is_empty()
    }

    /// True at the position a fresh engine starts from.
    pub fn is_at_start(&self) -> bool {
        self.frames.len() == 1
            && self
                .frames
                .first()
                .and_then(ReplayFrame::as_group_list)
                .map(GroupListFrame::is_at_start)
                .unwrap_or(false)
    }

    /// `(depth, cursor of the top frame)`, for comparing positions.
    pub fn position(&self) -> (usize, Option<String>) {
        (
            self.frames.len(),
            self.frames.last().map(ReplayFrame::cursor_summary),
        )
    }

    pub fn forward(&mut self) -> ReplayResult<StepResult> {
        loop {
            let depth = self.frames.len();
            let Some(top) = self.frames.last_mut() else {
                return Ok(StepResult::End);
            };
            let mut ctx = ReplayContext {
                trace: self.trace.as_ref(),
                programs: &self.programs,
                state: &mut self.current_state,
                snapshots: &mut self.snapshots,
            };
            let transition = top.forward(&mut ctx)?;
            let exception = self.apply(transition, "forward");

            if let Some(message) = exception {
                return Ok(StepResult::Exception(message));
            }
            if self.frames.is_empty() {
                return Ok(StepResult::End);
            }
            if self.frames.len() == depth {
                return Ok(StepResult::Ok);
            }
        }
    }

    pub fn backward(&mut self) -> ReplayResult<StepResult> {
        if self.frames.is_empty() {
            debug!("re-entering finished replay from its end");
            self.frames.push(ReplayFrame::Groups(GroupListFrame::exited(
                self.trace.txn_groups.len(),
            )));
        } else if self.is_at_start() {
            return Ok(StepResult::End);
        }

        loop {
            let depth = self.frames.len();
            let Some(top) = self.frames.last_mut() else {
                return Ok(StepResult::End);
            };
            let mut ctx = ReplayContext {
                trace: self.trace.as_ref(),
                programs: &self.programs,
                state: &mut self.current_state,
                snapshots: &mut self.snapshots,
            };
            let transition = top.backward(&mut ctx)?;
            self.apply(transition, "backward");

            if self.frames.is_empty() {
                return Ok(StepResult::End);
            }
            if self.frames.len() == depth {
                return Ok(StepResult::Ok);
            }
        }
    }

    fn apply(&mut self, transition: Transition, direction: &str) -> Option<String> {
        match transition.action {
            FrameTransition::Step => {}
            FrameTransition::Push(frame) => {
                trace!(direction, frame = %frame.display_name(), "push frame");
                self.frames.push(frame);
            }
            FrameTransition::Pop => {
                if let Some(frame) = self.frames.pop() {
                    trace!(direction, frame = %frame.display_name(), "pop frame");
                }
            }
        }
        transition.exception
    }

    /// Call stack for display, innermost first. Program frames contribute one
    /// extra entry per active subroutine.
    pub fn call_stack(&self) -> Vec<DisplayFrame> {
        let mut stack = Vec::new();
        for (frame_index, frame) in self.frames.iter().enumerate().rev() {
            let mut location = frame.source_location();
            if let Some(program) = frame.as_program() {
                for sub in program.replay().subroutine_frames() {
                    stack.push(DisplayFrame {
                        frame_index,
                        name: sub.name,
                        location,
                    });
                    location = program.location_at(sub.call_pc);
                }
            }
            stack.push(DisplayFrame {
                frame_index,
                name: frame.display_name(),
                location,
            });
        }
        stack
    }

    /// Stack, scratch and variables of the program frame at `frame_index`.
    pub fn program_state(&self, frame_index: usize) -> ReplayResult<ProgramStateView> {
        let frame = self
            .frames
            .get(frame_index)
            .ok_or_else(|| ReplayError::lookup(format!("no frame at index {}", frame_index)))?;
        let program = frame.as_program().ok_or_else(|| {
            ReplayError::lookup(format!("frame {} is not a program frame", frame_index))
        })?;
        let replay = program.replay();
        Ok(ProgramStateView {
            kind: program.kind(),
            app_id: program.app_id(),
            pc: replay.current_pc(),
            stack: replay.stack().to_vec(),
            scratch: replay.scratch().clone(),
            variables: replay.variables(),
        })
    }

    /// State of the innermost program frame, if any.
    pub fn top_program_state(&self) -> Option<ProgramStateView> {
        let index = self.frames.iter().rposition(|f| f.as_program().is_some())?;
        self.program_state(index).ok()
    }

    pub fn current_source_location(&self) -> Option<ResolvedLocation> {
        self.frames.last().and_then(ReplayFrame::source_location)
    }

    pub fn app_ids(&self) -> Vec<u64> {
        self.current_state.keys().copied().collect()
    }

    pub fn current_app_state(&self, app_id: u64) -> ReplayResult<&AppState> {
        self.current_state
            .get(&app_id)
            .ok_or_else(|| ReplayError::lookup(format!("unknown application {}", app_id)))
    }

    pub fn initial_app_state(&self, app_id: u64) -> ReplayResult<&AppState> {
        self.initial_state
            .get(&app_id)
            .ok_or_else(|| ReplayError::lookup(format!("unknown application {}", app_id)))
    }

    /// All current application state, keyed by app id.
    pub fn current_state(&self) -> &BTreeMap<u64, AppState> {
        &self.current_state
    }
}

/// Load-time walk of one transaction and its inner transactions.
fn discover(
    result: Option<&PendingTxnResult>,
    exec: Option<&TxnExecTrace>,
    programs: &mut ProgramCatalog,
    initial_state: &mut BTreeMap<u64, AppState>,
    registry: &dyn SourceRegistry,
) -> ReplayResult<()> {
    let Some(exec) = exec else {
        return Ok(());
    };
    let app_id = result.and_then(PendingTxnResult::app_id);

    for kind in [
        ProgramKind::LogicSig,
        ProgramKind::Approval,
        ProgramKind::ClearState,
    ] {
        let Some((units, hash)) = exec.program(kind) else {
            continue;
        };
        match hash {
            Some(hash) => programs.register(hash, kind, units, registry)?,
            None => debug!(kind = kind.label(), "program trace without a hash"),
        }
        if kind == ProgramKind::LogicSig {
            continue;
        }
        let Some(app) = app_id else {
            continue;
        };
        let state = initial_state.entry(app).or_insert_with(|| {
            debug!(app, "no initial state reported; starting from empty");
            AppState::new()
        });
        let accounts = units
            .iter()
            .flat_map(|u| u.state_changes.iter())
            .filter(|op| {
                op.app_state_type == AppStateType::Local && op.operation == StateOperation::Write
            })
            .filter_map(|op| op.account.as_deref());
        for account in accounts {
            if state.ensure_local_account(account) {
                debug!(app, account, "created local state placeholder");
            }
        }
    }

    for (index, inner) in exec.inner_trace.iter().enumerate() {
        let inner_result = result.and_then(|r| r.inner_txns.get(index));
        discover(inner_result, Some(inner), programs, initial_state, registry)?;
    }
    Ok(())
}
