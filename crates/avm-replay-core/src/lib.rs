//! Replay engine for AVM simulate execution traces.
//!
//! Loads a simulate response recorded with execution tracing, rebuilds the
//! stack, scratch space and application state at every opcode, and lets a
//! debugger step through it in both directions.

pub mod app_state;
pub mod breakpoints;
pub mod config;
pub mod engine;
pub mod errors;
pub mod frames;
pub mod program_replay;
pub mod session;
pub mod source;

pub use app_state::{AppState, StateEntry};
pub use breakpoints::{Breakpoint, BreakpointRequest, BreakpointTable};
pub use config::ReplayConfig;
pub use engine::{DisplayFrame, ProgramStateView, StepResult, TraceReplayEngine};
pub use errors::{ReplayError, ReplayResult};
pub use frames::{Failure, CLEAR_STATE_ROLLBACK_MESSAGE};
pub use program_replay::{NamedVariable, ProgramReplay, SubroutineFrame, SCRATCH_SLOTS};
pub use session::{DebugEvent, DebugSession, StopReason};
pub use source::{
    normalize_path, InMemorySourceRegistry, PcEvent, ProgramCatalog, ProgramSourceDescriptor,
    ResolvedLocation, SourceLocation, SourceRegistry, SubroutineCall,
};
