//! Replay of a single program's opcode trace.
//!
//! [`ProgramReplay`] walks one program's trace units in order and derives the
//! operand stack, the sparse scratch space and, when the program has a source
//! descriptor with call annotations, the subroutine frames and the named
//! variables visible in the innermost one.
//!
//! Moving backward is done by resetting and replaying forward to the target
//! index. Traces are bounded by the opcode budget, so this stays cheap.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use avm_replay_types::{AvmValue, OpcodeTraceUnit};

use crate::errors::{ReplayError, ReplayResult};
use crate::source::{PcEvent, ProgramSourceDescriptor};

/// Number of scratch slots a program can address.
pub const SCRATCH_SLOTS: u64 = 256;

/// Marker for compiler temporaries that are never shown as variables.
const TEMPORARY_MARKER: char = '%';
/// Separator before a variable's version suffix.
const VERSION_SEPARATOR: char = '#';

/// A named value visible at the current position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamedVariable {
    pub name: String,
    pub value: AvmValue,
}

/// A subroutine frame as shown in a call stack.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubroutineFrame {
    pub name: String,
    /// Pc of the instruction that entered the subroutine.
    pub call_pc: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct CallFrame {
    name: String,
    call_pc: Option<u64>,
    /// Stack length when the subroutine was entered.
    base: usize,
    params: Vec<String>,
    defined: BTreeSet<String>,
    stack_names: Vec<String>,
}

impl CallFrame {
    fn root() -> Self {
        Self {
            name: "main".to_string(),
            call_pc: None,
            base: 0,
            params: Vec::new(),
            defined: BTreeSet::new(),
            stack_names: Vec::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ProgramReplay {
    units: Arc<[OpcodeTraceUnit]>,
    descriptor: Option<Arc<ProgramSourceDescriptor>>,
    /// Number of units applied so far.
    index: usize,
    stack: Vec<AvmValue>,
    scratch: BTreeMap<u64, AvmValue>,
    call_frames: Vec<CallFrame>,
}

impl ProgramReplay {
    /// Create a replay positioned before the first unit.
    ///
    /// Fails if `descriptor` does not cover every pc the trace executes.
    pub fn new(
        units: Arc<[OpcodeTraceUnit]>,
        descriptor: Option<Arc<ProgramSourceDescriptor>>,
    ) -> ReplayResult<Self> {
        if let Some(descriptor) = &descriptor {
            descriptor.check_coverage(&units)?;
        }
        Ok(Self {
            units,
            descriptor,
            index: 0,
            stack: Vec::new(),
            scratch: BTreeMap::new(),
            call_frames: vec![CallFrame::root()],
        })
    }

    pub fn units(&self) -> &[OpcodeTraceUnit] {
        &self.units
    }

    pub fn descriptor(&self) -> Option<&Arc<ProgramSourceDescriptor>> {
        self.descriptor.as_ref()
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    /// Units applied so far.
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn is_finished(&self) -> bool {
        self.index >= self.units.len()
    }

    /// Pc of the most recently applied unit.
    pub fn current_pc(&self) -> Option<u64> {
        self.index
            .checked_sub(1)
            .and_then(|i| self.units.get(i))
            .map(|u| u.pc)
    }

    pub fn stack(&self) -> &[AvmValue] {
        &self.stack
    }

    /// Non-default scratch slots.
    pub fn scratch(&self) -> &BTreeMap<u64, AvmValue> {
        &self.scratch
    }

    pub fn scratch_slot(&self, slot: u64) -> AvmValue {
        self.scratch.get(&slot).cloned().unwrap_or_default()
    }

    /// All scratch slots, defaults included.
    pub fn scratch_array(&self) -> Vec<AvmValue> {
        (0..SCRATCH_SLOTS).map(|slot| self.scratch_slot(slot)).collect()
    }

    pub fn reset(&mut self) {
        self.index = 0;
        self.stack.clear();
        self.scratch.clear();
        self.call_frames = vec![CallFrame::root()];
    }

    /// Apply the next unit. Returns false when the trace is exhausted.
    pub fn step(&mut self) -> ReplayResult<bool> {
        let Some(unit) = self.units.get(self.index) else {
            return Ok(false);
        };
        let unit_index = self.index;

        // Nothing is applied unless the whole unit is valid.
        if unit.stack_pop_count > self.stack.len() {
            return Err(ReplayError::malformed(format!(
                "stack underflow at trace unit {} (pc {}): pops {} values from a stack of {}",
                unit_index,
                unit.pc,
                unit.stack_pop_count,
                self.stack.len()
            )));
        }
        if let Some(change) = unit
            .scratch_changes
            .iter()
            .find(|c| c.slot >= SCRATCH_SLOTS)
        {
            return Err(ReplayError::malformed(format!(
                "scratch slot {} out of range at trace unit {} (pc {})",
                change.slot, unit_index, unit.pc
            )));
        }

        let event = self.event_at(unit.pc);
        if let Some(call) = event.as_ref().and_then(|e| e.call.as_ref()) {
            self.call_frames.push(CallFrame {
                name: call.name.clone(),
                call_pc: Some(unit.pc),
                base: self.stack.len(),
                params: call.params.clone(),
                defined: call.params.iter().cloned().collect(),
                stack_names: Vec::new(),
            });
        }

        let remaining = self.stack.len() - unit.stack_pop_count;
        self.stack.truncate(remaining);
        self.stack.extend(unit.stack_additions.iter().cloned());

        for change in &unit.scratch_changes {
            if change.new_value.is_default() {
                self.scratch.remove(&change.slot);
            } else {
                self.scratch.insert(change.slot, change.new_value.clone());
            }
        }

        if let Some(event) = event {
            self.apply_scope_event(&event);
        }

        self.index += 1;
        Ok(true)
    }

    /// Reset and replay forward until `target` units are applied.
    pub fn replay_to(&mut self, target: usize) -> ReplayResult<()> {
        self.reset();
        let target = target.min(self.units.len());
        while self.index < target {
            self.step()?;
        }
        Ok(())
    }

    fn event_at(&self, pc: u64) -> Option<PcEvent> {
        self.descriptor
            .as_ref()
            .and_then(|d| d.event(pc))
            .cloned()
    }

    fn apply_scope_event(&mut self, event: &PcEvent) {
        if event.retsub && self.call_frames.len() > 1 {
            if let Some(finished) = self.call_frames.pop() {
                if let Some(parent) = self.call_frames.last_mut() {
                    parent.defined.extend(finished.defined);
                }
            }
        }
        if let Some(frame) = self.call_frames.last_mut() {
            frame.defined.extend(event.defined_out.iter().cloned());
            if !event.stack_out.is_empty() {
                frame.stack_names = event.stack_out.clone();
            }
        }
    }

    /// Subroutine frames, innermost first. The program's main body is not included.
    pub fn subroutine_frames(&self) -> Vec<SubroutineFrame> {
        self.call_frames
            .iter()
            .rev()
            .filter_map(|f| {
                f.call_pc.map(|call_pc| SubroutineFrame {
                    name: f.name.clone(),
                    call_pc,
                })
            })
            .collect()
    }

    /// Named variables visible in the innermost frame, sorted by name.
    pub fn variables(&self) -> Vec<NamedVariable> {
        let Some(frame) = self.call_frames.last() else {
            return Vec::new();
        };
        let mut visible: BTreeMap<String, AvmValue> = BTreeMap::new();

        let param_start = frame.base.checked_sub(frame.params.len());
        for (i, name) in frame.params.iter().enumerate() {
            let slot = param_start.map(|start| start + i);
            if let Some(value) = slot.and_then(|s| self.stack.get(s)) {
                insert_variable(&mut visible, name, value);
            }
        }
        for (j, name) in frame.stack_names.iter().enumerate() {
            if !frame.defined.contains(name) {
                continue;
            }
            if let Some(value) = self.stack.get(frame.base + j) {
                insert_variable(&mut visible, name, value);
            }
        }

        visible
            .into_iter()
            .map(|(name, value)| NamedVariable { name, value })
            .collect()
    }
}

fn insert_variable(visible: &mut BTreeMap<String, AvmValue>, name: &str, value: &AvmValue) {
    if name.contains(TEMPORARY_MARKER) {
        return;
    }
    visible.insert(display_name(name).to_string(), value.clone());
}

/// Strip a `#<digits>` version suffix.
fn display_name(name: &str) -> &str {
    match name.rsplit_once(VERSION_SEPARATOR) {
        Some((base, version))
            if !base.is_empty() && !version.is_empty() && version.chars().all(|c| c.is_ascii_digit()) =>
        {
            base
        }
        _ => name,
    }
}
