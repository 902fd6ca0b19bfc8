//! Frame state machine.
//!
//! The replay cursor is a stack of [`ReplayFrame`]s: one [`GroupListFrame`]
//! at the bottom, a [`TxnGroupFrame`] per transaction group being walked
//! (top-level or spawned by a program), and a [`ProgramFrame`] per program
//! invocation.
//!
//! Frames never touch the stack themselves. `forward`/`backward` move the
//! frame's own cursor and return a [`Transition`] telling the engine whether
//! to keep the frame, push a child, or pop it. Every frame can be entered
//! forward (at its start) or backward (at its end), so the engine's rule of
//! repeating a step while the depth changes stops at the same positions in
//! both directions.

mod groups;
mod program;
mod txn_group;

pub use groups::GroupListFrame;
pub use program::{ProgramFrame, ProgramTarget, CLEAR_STATE_ROLLBACK_MESSAGE};
pub use txn_group::TxnGroupFrame;

use std::collections::BTreeMap;

use avm_replay_types::{format_path, ProgramKind, SimulateTrace, SimulateTxnGroup, TxnPath};

use crate::app_state::AppState;
use crate::errors::ReplayResult;
use crate::source::{ProgramCatalog, ResolvedLocation};

/// A recorded group failure and the transaction that caused it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Failure {
    pub message: String,
    pub path: TxnPath,
}

impl Failure {
    pub fn from_group(group: &SimulateTxnGroup) -> Option<Self> {
        group.failure().map(|(message, path)| Failure {
            message: message.to_string(),
            path: path.to_vec(),
        })
    }

    /// The failure was caused by the transaction at `path` itself.
    pub fn targets(&self, path: &[usize]) -> bool {
        self.path == path
    }

    /// The failure was caused by a transaction nested under `path`.
    pub fn is_within(&self, path: &[usize]) -> bool {
        self.path.len() > path.len() && self.path.starts_with(path)
    }

    /// Index of the inner transaction under `path` that leads to the failure.
    pub fn inner_index(&self, path: &[usize]) -> Option<usize> {
        if self.is_within(path) {
            self.path.get(path.len()).copied()
        } else {
            None
        }
    }
}

/// What the engine does with the frame stack after a transition.
#[derive(Debug)]
pub enum FrameTransition {
    /// The frame moved its own cursor.
    Step,
    Push(ReplayFrame),
    Pop,
}

#[derive(Debug)]
pub struct Transition {
    pub action: FrameTransition,
    /// Exception reached by this transition.
    pub exception: Option<String>,
}

impl Transition {
    pub fn step() -> Self {
        Self {
            action: FrameTransition::Step,
            exception: None,
        }
    }

    pub fn push(frame: ReplayFrame) -> Self {
        Self {
            action: FrameTransition::Push(frame),
            exception: None,
        }
    }

    pub fn pop() -> Self {
        Self {
            action: FrameTransition::Pop,
            exception: None,
        }
    }

    /// A step that stops on an exception.
    pub fn raise(message: impl Into<String>) -> Self {
        Self {
            action: FrameTransition::Step,
            exception: Some(message.into()),
        }
    }

    pub fn changes_depth(&self) -> bool {
        !matches!(self.action, FrameTransition::Step)
    }
}

/// Entry snapshots of application state, recorded each time a program frame
/// is entered forward so it can be re-entered backward from its end.
#[derive(Debug, Clone, Default)]
pub struct SnapshotLedger {
    entries: BTreeMap<(usize, TxnPath, ProgramKind), AppState>,
}

impl SnapshotLedger {
    pub fn record(&mut self, group: usize, path: &[usize], kind: ProgramKind, state: AppState) {
        self.entries.insert((group, path.to_vec(), kind), state);
    }

    pub fn get(&self, group: usize, path: &[usize], kind: ProgramKind) -> Option<&AppState> {
        self.entries.get(&(group, path.to_vec(), kind))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Engine state frames read and update during a transition.
pub struct ReplayContext<'a> {
    pub trace: &'a SimulateTrace,
    pub programs: &'a ProgramCatalog,
    pub state: &'a mut BTreeMap<u64, AppState>,
    pub snapshots: &'a mut SnapshotLedger,
}

/// Whether a frame is being entered at its start or its end.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Entry {
    Forward,
    Backward,
}

#[derive(Debug)]
pub enum ReplayFrame {
    Groups(GroupListFrame),
    Group(TxnGroupFrame),
    Program(ProgramFrame),
}

impl ReplayFrame {
    pub fn forward(&mut self, ctx: &mut ReplayContext<'_>) -> ReplayResult<Transition> {
        match self {
            ReplayFrame::Groups(frame) => frame.forward(ctx),
            ReplayFrame::Group(frame) => frame.forward(ctx),
            ReplayFrame::Program(frame) => frame.forward(ctx),
        }
    }

    pub fn backward(&mut self, ctx: &mut ReplayContext<'_>) -> ReplayResult<Transition> {
        match self {
            ReplayFrame::Groups(frame) => frame.backward(ctx),
            ReplayFrame::Group(frame) => frame.backward(ctx),
            ReplayFrame::Program(frame) => frame.backward(ctx),
        }
    }

    /// Frame title for call stack display.
    pub fn display_name(&self) -> String {
        match self {
            ReplayFrame::Groups(frame) => frame.display_name(),
            ReplayFrame::Group(frame) => frame.display_name(),
            ReplayFrame::Program(frame) => frame.display_name(),
        }
    }

    pub fn source_location(&self) -> Option<ResolvedLocation> {
        match self {
            ReplayFrame::Program(frame) => frame.source_location(),
            _ => None,
        }
    }

    pub fn as_program(&self) -> Option<&ProgramFrame> {
        match self {
            ReplayFrame::Program(frame) => Some(frame),
            _ => None,
        }
    }

    pub fn as_group_list(&self) -> Option<&GroupListFrame> {
        match self {
            ReplayFrame::Groups(frame) => Some(frame),
            _ => None,
        }
    }

    /// Comparable snapshot of the frame's cursor.
    pub fn cursor_summary(&self) -> String {
        match self {
            ReplayFrame::Groups(frame) => frame.cursor_summary(),
            ReplayFrame::Group(frame) => frame.cursor_summary(),
            ReplayFrame::Program(frame) => frame.cursor_summary(),
        }
    }
}

pub(crate) fn describe_txn(group: usize, path: &[usize]) -> String {
    format!("group {} txn {}", group, format_path(path))
}
