#![allow(dead_code)]
//! Shared test utilities for integration tests.
//!
//! Traces are built from the typed model rather than JSON so each test reads
//! as the shape of the simulation it replays.

use avm_replay::replay::{InMemorySourceRegistry, ProgramSourceDescriptor, SourceLocation};
use avm_replay::types::{
    AppInitialState, AppStateType, ApplicationKvs, ApplicationStateOperation, AvmValue,
    ExecTraceConfig, InitialStates, OpcodeTraceUnit, PendingTxnResult, ScratchChange, SignedTxn,
    SimulateTrace, SimulateTxnGroup, SimulateTxnResult, StateOperation, TealKeyValue,
    TxnExecTrace, TxnFields,
};
use avm_replay::TraceReplayEngine;

/// Assert that a result is Ok and return the inner value.
pub fn assert_ok<T, E: std::fmt::Debug>(result: Result<T, E>, context: &str) -> T {
    match result {
        Ok(v) => v,
        Err(e) => panic!("{} failed: {:?}", context, e),
    }
}

/// Builder for a traced simulate response.
#[derive(Default)]
pub struct TraceBuilder {
    groups: Vec<SimulateTxnGroup>,
    initial: Vec<AppInitialState>,
}

impl TraceBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn group(mut self, txns: Vec<SimulateTxnResult>) -> Self {
        self.groups.push(SimulateTxnGroup {
            txn_results: txns,
            ..SimulateTxnGroup::default()
        });
        self
    }

    pub fn failing_group(
        mut self,
        txns: Vec<SimulateTxnResult>,
        message: &str,
        failed_at: &[usize],
    ) -> Self {
        self.groups.push(SimulateTxnGroup {
            txn_results: txns,
            failure_message: Some(message.to_string()),
            failed_at: Some(failed_at.to_vec()),
        });
        self
    }

    pub fn initial_global(mut self, app: u64, key: &[u8], value: AvmValue) -> Self {
        self.initial.push(AppInitialState {
            id: app,
            app_globals: Some(ApplicationKvs {
                account: None,
                kvs: vec![TealKeyValue {
                    key: key.to_vec(),
                    value,
                }],
            }),
            ..AppInitialState::default()
        });
        self
    }

    pub fn build(self) -> SimulateTrace {
        SimulateTrace {
            version: 2,
            txn_groups: self.groups,
            exec_trace_config: Some(ExecTraceConfig::full()),
            initial_states: Some(InitialStates {
                app_initial_states: self.initial,
            }),
            ..SimulateTrace::default()
        }
    }
}

/// A payment: no programs run.
pub fn pay_txn() -> SimulateTxnResult {
    SimulateTxnResult {
        txn_result: PendingTxnResult {
            txn: SignedTxn {
                txn: TxnFields {
                    txn_type: "pay".to_string(),
                    ..TxnFields::default()
                },
            },
            ..PendingTxnResult::default()
        },
        exec_trace: None,
    }
}

pub fn app_call(app: u64, exec: TxnExecTrace) -> SimulateTxnResult {
    SimulateTxnResult {
        txn_result: PendingTxnResult {
            txn: SignedTxn {
                txn: TxnFields {
                    txn_type: "appl".to_string(),
                    apid: Some(app),
                    ..TxnFields::default()
                },
            },
            ..PendingTxnResult::default()
        },
        exec_trace: Some(exec),
    }
}

/// Attach `inner` as the next inner transaction of `outer`.
pub fn with_inner(mut outer: SimulateTxnResult, inner: SimulateTxnResult) -> SimulateTxnResult {
    outer.txn_result.inner_txns.push(inner.txn_result);
    outer
        .exec_trace
        .get_or_insert_with(TxnExecTrace::default)
        .inner_trace
        .push(inner.exec_trace.unwrap_or_default());
    outer
}

pub fn approval(units: Vec<OpcodeTraceUnit>) -> TxnExecTrace {
    TxnExecTrace {
        approval_program_trace: Some(units),
        ..TxnExecTrace::default()
    }
}

pub fn approval_with_hash(units: Vec<OpcodeTraceUnit>, hash: &[u8]) -> TxnExecTrace {
    TxnExecTrace {
        approval_program_trace: Some(units),
        approval_program_hash: Some(hash.to_vec()),
        ..TxnExecTrace::default()
    }
}

pub fn clear_state(units: Vec<OpcodeTraceUnit>, rollback_error: Option<&str>) -> TxnExecTrace {
    TxnExecTrace {
        clear_state_program_trace: Some(units),
        clear_state_rollback: true,
        clear_state_rollback_error: rollback_error.map(str::to_string),
        ..TxnExecTrace::default()
    }
}

/// `n` units at pcs 1..=n with no effects.
pub fn plain_units(n: u64) -> Vec<OpcodeTraceUnit> {
    (1..=n).map(OpcodeTraceUnit::at).collect()
}

pub fn push_uint(pc: u64, value: u64) -> OpcodeTraceUnit {
    OpcodeTraceUnit {
        stack_additions: vec![AvmValue::uint(value)],
        ..OpcodeTraceUnit::at(pc)
    }
}

pub fn pop(pc: u64, count: usize) -> OpcodeTraceUnit {
    OpcodeTraceUnit {
        stack_pop_count: count,
        ..OpcodeTraceUnit::at(pc)
    }
}

pub fn store(pc: u64, slot: u64, value: u64) -> OpcodeTraceUnit {
    OpcodeTraceUnit {
        stack_pop_count: 1,
        scratch_changes: vec![ScratchChange {
            slot,
            new_value: AvmValue::uint(value),
        }],
        ..OpcodeTraceUnit::at(pc)
    }
}

pub fn global_put(pc: u64, key: &[u8], value: AvmValue) -> OpcodeTraceUnit {
    OpcodeTraceUnit {
        state_changes: vec![ApplicationStateOperation {
            operation: StateOperation::Write,
            app_state_type: AppStateType::Global,
            key: key.to_vec(),
            new_value: Some(value),
            account: None,
        }],
        ..OpcodeTraceUnit::at(pc)
    }
}

pub fn spawn(pc: u64, inners: &[usize]) -> OpcodeTraceUnit {
    OpcodeTraceUnit {
        spawned_inners: inners.to_vec(),
        ..OpcodeTraceUnit::at(pc)
    }
}

/// Descriptor mapping pc `n` to line `n` of `file`.
pub fn line_per_pc(file: &str, hash: &[u8], pcs: &[u64]) -> ProgramSourceDescriptor {
    ProgramSourceDescriptor {
        file: file.to_string(),
        hash: hash.to_vec(),
        locations: pcs
            .iter()
            .map(|pc| (*pc, SourceLocation::new(*pc as u32, Some(1))))
            .collect(),
        ..ProgramSourceDescriptor::default()
    }
}

pub fn load_engine(trace: SimulateTrace) -> TraceReplayEngine {
    assert_ok(
        TraceReplayEngine::load_resources(trace, &InMemorySourceRegistry::new()),
        "load trace",
    )
}

/// Global value of `key` for `app` at the engine's cursor.
pub fn global_value(engine: &TraceReplayEngine, app: u64, key: &[u8]) -> Option<AvmValue> {
    engine
        .current_app_state(app)
        .ok()
        .and_then(|state| state.global().get(key).cloned())
}
