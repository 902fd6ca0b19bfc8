//! Transaction group frame.
//!
//! Walks the transactions of one group, top-level or spawned by a program.
//! Each transaction has two slots, the logic sig and the application program,
//! which move through not-started → starting → done. The starting state is a
//! stop of its own so the transaction can be highlighted before its program
//! is entered.

use tracing::trace;

use avm_replay_types::{format_path, ProgramKind, TxnPath};

use super::{
    describe_txn, Entry, Failure, ProgramFrame, ProgramTarget, ReplayContext, ReplayFrame,
    Transition,
};
use crate::errors::ReplayResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotStatus {
    NotStarted,
    Starting,
    Done,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TxnCursor {
    At {
        txn: usize,
        logic_sig: SlotStatus,
        app: SlotStatus,
    },
    Exited,
}

/// What runs for one transaction.
#[derive(Debug, Clone, Default)]
struct TxnSlots {
    logic_sig: bool,
    logic_sig_fails: bool,
    app: Option<ProgramKind>,
    app_fails: bool,
    /// Failure with no program to receive it, raised by this frame.
    raise: Option<String>,
}

impl TxnSlots {
    fn app_active(&self) -> bool {
        self.app.is_some() || self.raise.is_some()
    }

    fn initial(&self) -> (SlotStatus, SlotStatus) {
        let status = |active| {
            if active {
                SlotStatus::NotStarted
            } else {
                SlotStatus::Done
            }
        };
        (status(self.logic_sig), status(self.app_active()))
    }
}

#[derive(Debug, Clone)]
pub struct TxnGroupFrame {
    group: usize,
    /// Path of the spawning transaction for inner groups.
    parent: Option<TxnPath>,
    txn_paths: Vec<TxnPath>,
    failure: Option<Failure>,
    cursor: TxnCursor,
}

impl TxnGroupFrame {
    /// Frame for top-level group `group`.
    pub fn top_level(ctx: &ReplayContext<'_>, group: usize, entry: Entry) -> ReplayResult<Self> {
        let txn_group = ctx.trace.txn_groups.get(group);
        let txn_paths = txn_group
            .map(|g| (0..g.txn_results.len()).map(|i| vec![i]).collect())
            .unwrap_or_default();
        let failure = txn_group.and_then(Failure::from_group);
        Ok(Self::build(ctx, group, None, txn_paths, failure, entry))
    }

    /// Frame for the inner transactions `indices` spawned by the transaction at `parent`.
    pub fn inner(
        ctx: &ReplayContext<'_>,
        group: usize,
        parent: &[usize],
        indices: &[usize],
        failure: Option<Failure>,
        entry: Entry,
    ) -> Self {
        let txn_paths = indices
            .iter()
            .map(|i| {
                let mut path = parent.to_vec();
                path.push(*i);
                path
            })
            .collect();
        Self::build(ctx, group, Some(parent.to_vec()), txn_paths, failure, entry)
    }

    fn build(
        ctx: &ReplayContext<'_>,
        group: usize,
        parent: Option<TxnPath>,
        txn_paths: Vec<TxnPath>,
        failure: Option<Failure>,
        entry: Entry,
    ) -> Self {
        let mut frame = Self {
            group,
            parent,
            txn_paths,
            failure,
            cursor: TxnCursor::Exited,
        };
        if entry == Entry::Forward {
            let (logic_sig, app) = frame.slots(ctx, 0).initial();
            frame.cursor = TxnCursor::At {
                txn: 0,
                logic_sig,
                app,
            };
        }
        frame
    }

    pub fn group(&self) -> usize {
        self.group
    }

    pub fn txn_count(&self) -> usize {
        self.txn_paths.len()
    }

    pub fn current_txn_path(&self) -> Option<&[usize]> {
        match self.cursor {
            TxnCursor::At { txn, .. } => self.txn_paths.get(txn).map(Vec::as_slice),
            TxnCursor::Exited => None,
        }
    }

    fn slots(&self, ctx: &ReplayContext<'_>, txn: usize) -> TxnSlots {
        let Some(path) = self.txn_paths.get(txn) else {
            return TxnSlots::default();
        };
        let exec = ctx.trace.txn(self.group, path).and_then(|view| view.trace);
        let mut slots = TxnSlots {
            logic_sig: exec.map(|t| t.has_logic_sig()).unwrap_or(false),
            app: exec.and_then(|t| t.app_program_kind()),
            ..TxnSlots::default()
        };
        if let Some(failure) = &self.failure {
            if failure.targets(path) {
                // The app program takes the failure over the logic sig.
                if slots.app.is_some() {
                    slots.app_fails = true;
                } else if slots.logic_sig {
                    slots.logic_sig_fails = true;
                } else {
                    slots.raise = Some(failure.message.clone());
                }
            } else if failure.is_within(path) {
                if slots.app.is_some() {
                    slots.app_fails = true;
                } else {
                    slots.raise = Some(failure.message.clone());
                }
            }
        }
        slots
    }

    fn push_program(
        &self,
        ctx: &mut ReplayContext<'_>,
        txn: usize,
        kind: ProgramKind,
        fails: bool,
        entry: Entry,
    ) -> ReplayResult<Transition> {
        let txn_path = self.txn_paths.get(txn).cloned().unwrap_or_default();
        trace!(group = self.group, txn = %format_path(&txn_path), kind = kind.label(), ?entry, "entering program");
        let target = ProgramTarget {
            group: self.group,
            txn_path,
            kind,
            failure: if fails { self.failure.clone() } else { None },
        };
        let frame = ProgramFrame::new(ctx, target, entry)?;
        Ok(Transition::push(ReplayFrame::Program(frame)))
    }

    pub fn forward(&mut self, ctx: &mut ReplayContext<'_>) -> ReplayResult<Transition> {
        let TxnCursor::At {
            txn,
            logic_sig,
            app,
        } = self.cursor
        else {
            return Ok(Transition::pop());
        };
        let slots = self.slots(ctx, txn);

        if slots.logic_sig {
            match logic_sig {
                SlotStatus::NotStarted => {
                    self.set(txn, SlotStatus::Starting, app);
                    return Ok(Transition::step());
                }
                SlotStatus::Starting => {
                    self.set(txn, SlotStatus::Done, app);
                    return self.push_program(
                        ctx,
                        txn,
                        ProgramKind::LogicSig,
                        slots.logic_sig_fails,
                        Entry::Forward,
                    );
                }
                SlotStatus::Done => {}
            }
        }

        if slots.app_active() {
            match app {
                SlotStatus::NotStarted => {
                    self.set(txn, logic_sig, SlotStatus::Starting);
                    return Ok(Transition::step());
                }
                SlotStatus::Starting => {
                    self.set(txn, logic_sig, SlotStatus::Done);
                    return match (slots.app, slots.raise) {
                        (Some(kind), _) => {
                            self.push_program(ctx, txn, kind, slots.app_fails, Entry::Forward)
                        }
                        (None, Some(message)) => Ok(Transition::raise(message)),
                        (None, None) => Ok(Transition::step()),
                    };
                }
                SlotStatus::Done => {}
            }
        }

        let next = txn + 1;
        if next >= self.txn_paths.len() {
            self.cursor = TxnCursor::Exited;
            return Ok(Transition::pop());
        }
        let next_slots = self.slots(ctx, next);
        let (mut logic_sig, mut app) = next_slots.initial();
        if next_slots.logic_sig {
            logic_sig = SlotStatus::Starting;
        } else if next_slots.app_active() {
            app = SlotStatus::Starting;
        }
        self.set(next, logic_sig, app);
        Ok(Transition::step())
    }

    pub fn backward(&mut self, ctx: &mut ReplayContext<'_>) -> ReplayResult<Transition> {
        let (txn, logic_sig, app) = match self.cursor {
            TxnCursor::Exited => {
                let Some(last) = self.txn_paths.len().checked_sub(1) else {
                    return Ok(Transition::pop());
                };
                return self.settle_at_end(ctx, last);
            }
            TxnCursor::At {
                txn,
                logic_sig,
                app,
            } => (txn, logic_sig, app),
        };
        let slots = self.slots(ctx, txn);

        if slots.app_active() {
            match app {
                SlotStatus::Done => {
                    self.set(txn, logic_sig, SlotStatus::Starting);
                    return Ok(Transition::step());
                }
                SlotStatus::Starting => {
                    self.set(txn, logic_sig, SlotStatus::NotStarted);
                    if slots.logic_sig {
                        return self.push_program(
                            ctx,
                            txn,
                            ProgramKind::LogicSig,
                            slots.logic_sig_fails,
                            Entry::Backward,
                        );
                    }
                    return self.leave_txn(ctx, txn);
                }
                SlotStatus::NotStarted => {}
            }
        }

        if slots.logic_sig {
            match logic_sig {
                SlotStatus::Done => {
                    self.set(txn, SlotStatus::Starting, app);
                    return Ok(Transition::step());
                }
                SlotStatus::Starting => {
                    self.set(txn, SlotStatus::NotStarted, app);
                    return self.leave_txn(ctx, txn);
                }
                SlotStatus::NotStarted => {}
            }
        }

        self.leave_txn(ctx, txn)
    }

    /// Step back from the start of `txn` to the end of the previous one.
    fn leave_txn(&mut self, ctx: &mut ReplayContext<'_>, txn: usize) -> ReplayResult<Transition> {
        match txn.checked_sub(1) {
            Some(previous) => self.settle_at_end(ctx, previous),
            None => Ok(Transition::pop()),
        }
    }

    /// Position at the end of `txn`, re-entering its last program if it ran one.
    fn settle_at_end(&mut self, ctx: &mut ReplayContext<'_>, txn: usize) -> ReplayResult<Transition> {
        self.set(txn, SlotStatus::Done, SlotStatus::Done);
        let slots = self.slots(ctx, txn);
        if slots.app_active() {
            match slots.app {
                Some(kind) => self.push_program(ctx, txn, kind, slots.app_fails, Entry::Backward),
                None => Ok(Transition::step()),
            }
        } else if slots.logic_sig {
            self.push_program(
                ctx,
                txn,
                ProgramKind::LogicSig,
                slots.logic_sig_fails,
                Entry::Backward,
            )
        } else if txn == 0 {
            Ok(Transition::pop())
        } else {
            Ok(Transition::step())
        }
    }

    fn set(&mut self, txn: usize, logic_sig: SlotStatus, app: SlotStatus) {
        self.cursor = TxnCursor::At {
            txn,
            logic_sig,
            app,
        };
    }

    pub fn display_name(&self) -> String {
        let title = match &self.parent {
            None => format!("group {}", self.group),
            Some(parent) => format!("inner group of {}", describe_txn(self.group, parent)),
        };
        match self.current_txn_path() {
            Some(path) => format!("{}, txn {}", title, format_path(path)),
            None => title,
        }
    }

    pub fn cursor_summary(&self) -> String {
        format!("{:?}", self.cursor)
    }
}
