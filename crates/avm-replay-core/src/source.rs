//! Program source descriptors and the registry that serves them.
//!
//! A [`ProgramSourceDescriptor`] ties one compiled program (identified by its
//! content hash) to the file it was compiled from: a pc→location table and
//! optional per-pc annotations describing subroutine calls and named stack
//! slots. Descriptors come from an external [`SourceRegistry`]; the engine
//! only requires that every pc a trace executes past `pc-offset` has a
//! location.
//!
//! The [`ProgramCatalog`] records every distinct program a loaded trace runs,
//! together with the pcs it actually executed, which is what breakpoint
//! verification works from.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::{debug, warn};

use avm_replay_types::encoding::{base64_bytes, program_hash, to_hex_key};
use avm_replay_types::{ByteArrayMap, OpcodeTraceUnit, ProgramKind};

use crate::errors::{ReplayError, ReplayResult};

/// A position in a source file. Lines and columns are 1-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SourceLocation {
    pub line: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub column: Option<u32>,
}

impl SourceLocation {
    pub fn new(line: u32, column: Option<u32>) -> Self {
        Self { line, column }
    }
}

/// A location resolved to its file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedLocation {
    pub file: String,
    pub location: SourceLocation,
}

/// Subroutine entered at a pc.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubroutineCall {
    pub name: String,
    /// Parameter names, first pushed first.
    #[serde(default)]
    pub params: Vec<String>,
}

/// Annotations attached to one pc.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct PcEvent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub call: Option<SubroutineCall>,
    #[serde(default)]
    pub retsub: bool,
    /// Variable names that become defined once this instruction runs.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub defined_out: Vec<String>,
    /// Names of the stack slots above the current subroutine's base after
    /// this instruction runs. Empty means unchanged.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub stack_out: Vec<String>,
}

/// Source information for one compiled program.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ProgramSourceDescriptor {
    /// Source file the program was compiled from.
    pub file: String,
    /// Program content hash, base64 in JSON.
    #[serde(default, with = "base64_bytes")]
    pub hash: Vec<u8>,
    /// Pcs below this value belong to the program header and need no location.
    #[serde(default)]
    pub pc_offset: u64,
    #[serde(default)]
    pub locations: BTreeMap<u64, SourceLocation>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub events: BTreeMap<u64, PcEvent>,
}

impl ProgramSourceDescriptor {
    pub fn from_json_str(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }

    pub fn location(&self, pc: u64) -> Option<SourceLocation> {
        self.locations.get(&pc).copied()
    }

    pub fn event(&self, pc: u64) -> Option<&PcEvent> {
        self.events.get(&pc)
    }

    /// Check that every unit past `pc_offset` has a location.
    pub fn check_coverage(&self, units: &[OpcodeTraceUnit]) -> ReplayResult<()> {
        for (index, unit) in units.iter().enumerate() {
            if unit.pc >= self.pc_offset && !self.locations.contains_key(&unit.pc) {
                return Err(ReplayError::malformed(format!(
                    "{}: no source location for pc {} (trace unit {})",
                    self.file, unit.pc, index
                )));
            }
        }
        Ok(())
    }
}

/// Lookup of source descriptors by program content hash.
pub trait SourceRegistry {
    fn lookup(&self, hash: &[u8]) -> Option<Arc<ProgramSourceDescriptor>>;

    fn has(&self, hash: &[u8]) -> bool {
        self.lookup(hash).is_some()
    }
}

/// Registry backed by an in-memory map.
#[derive(Debug, Clone, Default)]
pub struct InMemorySourceRegistry {
    descriptors: ByteArrayMap<Arc<ProgramSourceDescriptor>>,
}

impl InMemorySourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a descriptor under its own `hash` field.
    pub fn register(&mut self, descriptor: ProgramSourceDescriptor) {
        let hash = descriptor.hash.clone();
        self.descriptors.set(&hash, Arc::new(descriptor));
    }

    /// Register a descriptor for compiled `bytecode`, computing its hash.
    pub fn register_program(&mut self, bytecode: &[u8], mut descriptor: ProgramSourceDescriptor) {
        descriptor.hash = program_hash(bytecode);
        self.register(descriptor);
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }
}

impl SourceRegistry for InMemorySourceRegistry {
    fn lookup(&self, hash: &[u8]) -> Option<Arc<ProgramSourceDescriptor>> {
        self.descriptors.get(hash).cloned()
    }
}

/// Normalize a source path so different spellings of one file compare equal.
///
/// Backslashes become `/`, empty and `.` segments are dropped, and `..`
/// removes the preceding segment where there is one.
pub fn normalize_path(path: &str) -> String {
    let unified = path.replace('\\', "/");
    let absolute = unified.starts_with('/');
    let mut parts: Vec<&str> = Vec::new();
    for segment in unified.split('/') {
        match segment {
            "" | "." => {}
            ".." => match parts.last() {
                Some(last) if *last != ".." => {
                    parts.pop();
                }
                _ if !absolute => parts.push(".."),
                _ => {}
            },
            other => parts.push(other),
        }
    }
    let joined = parts.join("/");
    if absolute {
        format!("/{}", joined)
    } else {
        joined
    }
}

/// A distinct program seen in a loaded trace.
#[derive(Debug, Clone)]
pub struct RegisteredProgram {
    pub hash: Vec<u8>,
    pub kinds: BTreeSet<ProgramKind>,
    pub descriptor: Option<Arc<ProgramSourceDescriptor>>,
    /// Every pc the trace executed in this program.
    pub pcs: BTreeSet<u64>,
}

impl RegisteredProgram {
    /// `(pc, location)` pairs the trace can stop at.
    pub fn reachable_locations(&self) -> Vec<(u64, SourceLocation)> {
        let Some(descriptor) = &self.descriptor else {
            return Vec::new();
        };
        self.pcs
            .iter()
            .filter_map(|pc| descriptor.location(*pc).map(|loc| (*pc, loc)))
            .collect()
    }
}

/// Every program a trace runs, keyed by content hash.
#[derive(Debug, Clone, Default)]
pub struct ProgramCatalog {
    programs: ByteArrayMap<RegisteredProgram>,
}

impl ProgramCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one execution of the program with `hash`.
    ///
    /// The first time a hash is seen its descriptor is fetched from
    /// `registry`. Every execution is checked for location coverage.
    pub fn register(
        &mut self,
        hash: &[u8],
        kind: ProgramKind,
        units: &[OpcodeTraceUnit],
        registry: &dyn SourceRegistry,
    ) -> ReplayResult<()> {
        if self.programs.get(hash).is_none() {
            let descriptor = registry.lookup(hash);
            match &descriptor {
                Some(d) => debug!(hash = %to_hex_key(hash), file = %d.file, kind = kind.label(), "registered program"),
                None => warn!(hash = %to_hex_key(hash), kind = kind.label(), "no source descriptor for program"),
            }
            self.programs.set(
                hash,
                RegisteredProgram {
                    hash: hash.to_vec(),
                    kinds: BTreeSet::new(),
                    descriptor,
                    pcs: BTreeSet::new(),
                },
            );
        }
        let Some(program) = self.programs.get_mut(hash) else {
            return Err(ReplayError::lookup("program vanished from catalog"));
        };
        if let Some(descriptor) = &program.descriptor {
            descriptor.check_coverage(units)?;
        }
        program.kinds.insert(kind);
        program.pcs.extend(units.iter().map(|u| u.pc));
        Ok(())
    }

    pub fn get(&self, hash: &[u8]) -> Option<&RegisteredProgram> {
        self.programs.get(hash)
    }

    pub fn descriptor(&self, hash: &[u8]) -> Option<Arc<ProgramSourceDescriptor>> {
        self.programs.get(hash).and_then(|p| p.descriptor.clone())
    }

    pub fn iter(&self) -> impl Iterator<Item = &RegisteredProgram> + '_ {
        self.programs.values()
    }

    pub fn len(&self) -> usize {
        self.programs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.programs.is_empty()
    }
}
