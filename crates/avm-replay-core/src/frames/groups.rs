//! Bottom frame: walks the simulated groups in order.

use tracing::trace;

use super::{Entry, ReplayContext, ReplayFrame, Transition, TxnGroupFrame};
use crate::errors::ReplayResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum GroupListCursor {
    /// `entered` is set once the frame for `group` has been pushed.
    At { group: usize, entered: bool },
    Exited,
}

#[derive(Debug, Clone)]
pub struct GroupListFrame {
    group_count: usize,
    cursor: GroupListCursor,
}

impl GroupListFrame {
    pub fn new(group_count: usize) -> Self {
        Self {
            group_count,
            cursor: GroupListCursor::At {
                group: 0,
                entered: false,
            },
        }
    }

    /// Frame positioned after the last group, for re-entering a finished replay.
    pub fn exited(group_count: usize) -> Self {
        Self {
            group_count,
            cursor: GroupListCursor::Exited,
        }
    }

    /// True before the first group has been entered.
    pub fn is_at_start(&self) -> bool {
        self.cursor
            == GroupListCursor::At {
                group: 0,
                entered: false,
            }
    }

    pub fn current_group(&self) -> Option<usize> {
        match self.cursor {
            GroupListCursor::At { group, .. } if group < self.group_count => Some(group),
            _ => None,
        }
    }

    fn enter_group(
        &mut self,
        ctx: &mut ReplayContext<'_>,
        group: usize,
        entry: Entry,
    ) -> ReplayResult<Transition> {
        trace!(group, ?entry, "entering transaction group");
        self.cursor = GroupListCursor::At {
            group,
            entered: true,
        };
        let frame = TxnGroupFrame::top_level(ctx, group, entry)?;
        Ok(Transition::push(ReplayFrame::Group(frame)))
    }

    pub fn forward(&mut self, ctx: &mut ReplayContext<'_>) -> ReplayResult<Transition> {
        match self.cursor {
            GroupListCursor::At {
                group,
                entered: false,
            } if group < self.group_count => self.enter_group(ctx, group, Entry::Forward),
            GroupListCursor::At {
                group,
                entered: true,
            } if group + 1 < self.group_count => self.enter_group(ctx, group + 1, Entry::Forward),
            _ => {
                self.cursor = GroupListCursor::Exited;
                Ok(Transition::pop())
            }
        }
    }

    pub fn backward(&mut self, ctx: &mut ReplayContext<'_>) -> ReplayResult<Transition> {
        match self.cursor {
            GroupListCursor::Exited if self.group_count > 0 => {
                self.enter_group(ctx, self.group_count - 1, Entry::Backward)
            }
            GroupListCursor::At {
                group,
                entered: true,
            } if group > 0 => self.enter_group(ctx, group - 1, Entry::Backward),
            _ => {
                self.cursor = GroupListCursor::At {
                    group: 0,
                    entered: false,
                };
                Ok(Transition::step())
            }
        }
    }

    pub fn display_name(&self) -> String {
        match self.current_group() {
            Some(group) => format!("simulation (group {} of {})", group + 1, self.group_count),
            None => "simulation".to_string(),
        }
    }

    pub fn cursor_summary(&self) -> String {
        format!("{:?}", self.cursor)
    }
}
