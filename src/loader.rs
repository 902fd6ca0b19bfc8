//! Loading traces and source descriptors from disk.

use anyhow::{bail, Context, Result};
use std::fs;
use std::path::Path;
use tracing::{debug, warn};

use avm_replay_core::{InMemorySourceRegistry, ProgramSourceDescriptor};
use avm_replay_types::SimulateTrace;

/// Read a simulate response with execution traces.
pub fn load_trace_file(path: impl AsRef<Path>) -> Result<SimulateTrace> {
    let path = path.as_ref();
    let text = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let trace = SimulateTrace::from_json_str(&text)
        .with_context(|| format!("parse simulate trace {}", path.display()))?;
    if !trace.trace_enabled() {
        bail!(
            "{} was simulated without execution tracing; rerun with exec-trace-config enabled",
            path.display()
        );
    }
    Ok(trace)
}

pub fn load_descriptor_file(path: impl AsRef<Path>) -> Result<ProgramSourceDescriptor> {
    let path = path.as_ref();
    let text = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    ProgramSourceDescriptor::from_json_str(&text)
        .with_context(|| format!("parse source descriptor {}", path.display()))
}

/// Load every `*.json` descriptor in `dir` into a registry.
///
/// Descriptors without a program hash cannot be matched to a trace and are
/// skipped.
pub fn load_descriptor_dir(dir: impl AsRef<Path>) -> Result<InMemorySourceRegistry> {
    let dir = dir.as_ref();
    let mut paths = Vec::new();
    for entry in fs::read_dir(dir).with_context(|| format!("read {}", dir.display()))? {
        let path = entry?.path();
        if path.extension().and_then(|e| e.to_str()) == Some("json") {
            paths.push(path);
        }
    }
    paths.sort();

    let mut registry = InMemorySourceRegistry::new();
    for path in paths {
        let descriptor = load_descriptor_file(&path)?;
        if descriptor.hash.is_empty() {
            warn!(path = %path.display(), "source descriptor has no program hash, skipping");
            continue;
        }
        debug!(path = %path.display(), file = %descriptor.file, "loaded source descriptor");
        registry.register(descriptor);
    }
    Ok(registry)
}
