//! Source breakpoints.
//!
//! Breakpoints are kept per normalized source path. A breakpoint is verified
//! once some program compiled from its file executed a pc mapped to its
//! line (and column). A breakpoint set without a column snaps to the
//! smallest column reachable on its line.

use std::collections::{BTreeMap, BTreeSet};

use crate::source::{ProgramCatalog, SourceLocation};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Breakpoint {
    pub id: u64,
    pub source: String,
    pub line: u32,
    /// Column after snapping; equals `requested_column` when one was given.
    pub column: Option<u32>,
    pub requested_column: Option<u32>,
    pub verified: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BreakpointRequest {
    pub line: u32,
    pub column: Option<u32>,
}

impl BreakpointRequest {
    pub fn line(line: u32) -> Self {
        Self { line, column: None }
    }

    pub fn at(line: u32, column: u32) -> Self {
        Self {
            line,
            column: Some(column),
        }
    }
}

/// Locations reachable in `source`, for programs whose file resolves to it.
pub fn reachable_locations(
    programs: &ProgramCatalog,
    source: &str,
    resolve: impl Fn(&str) -> String,
) -> BTreeSet<SourceLocation> {
    programs
        .iter()
        .filter(|p| {
            p.descriptor
                .as_ref()
                .map(|d| resolve(&d.file) == source)
                .unwrap_or(false)
        })
        .flat_map(|p| p.reachable_locations().into_iter().map(|(_, loc)| loc))
        .collect()
}

#[derive(Debug, Clone, Default)]
pub struct BreakpointTable {
    by_source: BTreeMap<String, Vec<Breakpoint>>,
    next_id: u64,
}

impl BreakpointTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the breakpoints of `source`. Requests matching an existing
    /// breakpoint keep its id and verification.
    pub fn set(&mut self, source: &str, requests: &[BreakpointRequest]) -> Vec<Breakpoint> {
        let mut existing = self.by_source.remove(source).unwrap_or_default();
        let mut updated: Vec<Breakpoint> = Vec::with_capacity(requests.len());
        for request in requests {
            let duplicate = updated
                .iter()
                .any(|b| b.line == request.line && b.requested_column == request.column);
            if duplicate {
                continue;
            }
            let reused = existing
                .iter()
                .position(|b| b.line == request.line && b.requested_column == request.column)
                .map(|i| existing.swap_remove(i));
            let breakpoint = match reused {
                Some(b) => b,
                None => {
                    self.next_id += 1;
                    Breakpoint {
                        id: self.next_id,
                        source: source.to_string(),
                        line: request.line,
                        column: request.column,
                        requested_column: request.column,
                        verified: false,
                    }
                }
            };
            updated.push(breakpoint);
        }
        self.by_source.insert(source.to_string(), updated.clone());
        updated
    }

    /// Verify pending breakpoints of `source` against `reachable`, returning
    /// the ones that became verified.
    pub fn verify(&mut self, source: &str, reachable: &BTreeSet<SourceLocation>) -> Vec<Breakpoint> {
        let Some(breakpoints) = self.by_source.get_mut(source) else {
            return Vec::new();
        };
        let mut newly_verified = Vec::new();
        for bp in breakpoints.iter_mut().filter(|b| !b.verified) {
            let column = bp.requested_column.or_else(|| {
                reachable
                    .iter()
                    .filter(|loc| loc.line == bp.line)
                    .filter_map(|loc| loc.column)
                    .min()
            });
            if reachable.contains(&SourceLocation::new(bp.line, column)) {
                bp.column = column;
                bp.verified = true;
                newly_verified.push(bp.clone());
            }
        }
        newly_verified
    }

    /// Id of a verified breakpoint at `location` in `source`.
    pub fn hit(&self, source: &str, location: SourceLocation) -> Option<u64> {
        self.by_source.get(source)?.iter().find_map(|bp| {
            let column_matches = bp.column.is_none() || bp.column == location.column;
            (bp.verified && bp.line == location.line && column_matches).then_some(bp.id)
        })
    }

    pub fn breakpoints(&self, source: &str) -> &[Breakpoint] {
        self.by_source.get(source).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn sources(&self) -> Vec<String> {
        self.by_source.keys().cloned().collect()
    }
}
