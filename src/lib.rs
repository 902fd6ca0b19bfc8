//! AVM Trace Replay
//!
//! Bidirectional replay of simulated AVM transaction groups:
//!
//! - **Trace model**: the simulate endpoint's execution-trace JSON ([`types`])
//! - **Replay engine**: frame state machine rebuilding stack, scratch and
//!   application state at every opcode ([`replay`])
//! - **Debug session**: stepping in both directions with source breakpoints
//! - **Loading**: reading traces and source descriptors from disk ([`loader`])
//!
//! ```ignore
//! use avm_replay::{loader, DebugSession, ReplayConfig};
//!
//! let trace = loader::load_trace_file("simulate-response.json")?;
//! let sources = loader::load_descriptor_dir("sourcemaps/")?;
//! let mut session = DebugSession::load(trace, &sources, ReplayConfig::from_env())?;
//! session.launch()?;
//! ```

pub mod loader;

pub use avm_replay_core as replay;
pub use avm_replay_types as types;

pub use avm_replay_core::{
    AppState, Breakpoint, BreakpointRequest, DebugEvent, DebugSession, DisplayFrame,
    InMemorySourceRegistry, NamedVariable, ProgramSourceDescriptor, ProgramStateView,
    ReplayConfig, ReplayError, ReplayResult, ResolvedLocation, SourceLocation, SourceRegistry,
    StateEntry, StepResult, StopReason, TraceReplayEngine, CLEAR_STATE_ROLLBACK_MESSAGE,
};
pub use avm_replay_types::{AvmValue, ByteArrayMap, SimulateTrace};
