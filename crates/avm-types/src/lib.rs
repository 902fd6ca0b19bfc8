//! Shared types for the avm-replay workspace.
//!
//! This crate provides the foundational data model used by the replay engine,
//! kept separate so trace producers and consumers can share it without pulling
//! in the engine itself.
//!
//! ## Trace Types
//!
//! The [`trace`] module mirrors the simulate endpoint's execution-trace schema:
//! - [`SimulateTrace`](trace::SimulateTrace) - Top-level simulate response with trace data
//! - [`SimulateTxnGroup`](trace::SimulateTxnGroup) - One simulated transaction group
//! - [`TxnExecTrace`](trace::TxnExecTrace) - Per-transaction program traces
//! - [`OpcodeTraceUnit`](trace::OpcodeTraceUnit) - Recorded effect of one instruction
//!
//! ## Storage Types
//!
//! - [`ByteArrayMap`](byte_map::ByteArrayMap) - Map keyed by arbitrary byte strings
//! - [`AvmValue`](value::AvmValue) - A bytes-or-uint stack/storage value

pub mod byte_map;
pub mod encoding;
pub mod env_utils;
pub mod trace;
pub mod value;

// Re-export commonly used types at crate root
pub use byte_map::ByteArrayMap;
pub use trace::{
    format_path, AppInitialState, AppStateType, ApplicationKvs, ApplicationStateOperation,
    ExecTraceConfig, InitialStates, OpcodeTraceUnit, PendingTxnResult, ProgramKind, ScratchChange,
    SignedTxn, SimulateTrace, SimulateTxnGroup, SimulateTxnResult, StateOperation, TealKeyValue,
    TxnExecTrace, TxnFields, TxnPath, TxnView,
};
pub use value::AvmValue;
