//! Execution-trace data model.
//!
//! These types mirror the JSON the simulate endpoint returns when execution
//! tracing is enabled. Field names follow the endpoint's kebab-case schema and
//! every optional field may be elided, so all containers default to empty.
//!
//! A transaction inside a group is addressed by a [`TxnPath`]: `[i]` is the
//! i-th top-level transaction, `[i, j]` the j-th inner transaction spawned by
//! it, and so on. The same indices are used by a group's `failed-at` field.

use serde::{Deserialize, Serialize};

use crate::encoding::{base64_bytes, option_base64_bytes};
use crate::value::AvmValue;

/// Index path of a transaction within its top-level group.
pub type TxnPath = Vec<usize>;

/// Render a transaction path as `[0, 2, 1]`.
pub fn format_path(path: &[usize]) -> String {
    let parts: Vec<String> = path.iter().map(|i| i.to_string()).collect();
    format!("[{}]", parts.join(", "))
}

// ============================================================================
// Top-level response
// ============================================================================

/// Simulate response carrying execution traces.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct SimulateTrace {
    /// Response format version.
    #[serde(default)]
    pub version: u64,
    /// Round the simulation was evaluated against.
    #[serde(default)]
    pub last_round: u64,
    /// Simulated transaction groups, in submission order.
    #[serde(default)]
    pub txn_groups: Vec<SimulateTxnGroup>,
    /// What the simulation was asked to record.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exec_trace_config: Option<ExecTraceConfig>,
    /// Application state as it was before the first group ran.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initial_states: Option<InitialStates>,
}

impl SimulateTrace {
    /// Parse a simulate response from its JSON text.
    pub fn from_json_str(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }

    /// Whether execution-trace collection was enabled for this simulation.
    pub fn trace_enabled(&self) -> bool {
        self.exec_trace_config
            .as_ref()
            .map(|c| c.enable)
            .unwrap_or(false)
    }

    pub fn app_initial_states(&self) -> &[AppInitialState] {
        self.initial_states
            .as_ref()
            .map(|s| s.app_initial_states.as_slice())
            .unwrap_or(&[])
    }

    /// Resolve the transaction at `path` inside top-level group `group`.
    pub fn txn(&self, group: usize, path: &[usize]) -> Option<TxnView<'_>> {
        let (first, rest) = path.split_first()?;
        let entry = self.txn_groups.get(group)?.txn_results.get(*first)?;
        let mut view = TxnView {
            result: &entry.txn_result,
            trace: entry.exec_trace.as_ref(),
        };
        for index in rest {
            view = TxnView {
                result: view.result.inner_txns.get(*index)?,
                trace: view.trace.and_then(|t| t.inner_trace.get(*index)),
            };
        }
        Some(view)
    }
}

/// Which kinds of effects the simulation recorded.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ExecTraceConfig {
    #[serde(default)]
    pub enable: bool,
    #[serde(default)]
    pub stack_change: bool,
    #[serde(default)]
    pub scratch_change: bool,
    #[serde(default)]
    pub state_change: bool,
}

impl ExecTraceConfig {
    /// Config with every trace category switched on.
    pub fn full() -> Self {
        Self {
            enable: true,
            stack_change: true,
            scratch_change: true,
            state_change: true,
        }
    }
}

// ============================================================================
// Initial application state
// ============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct InitialStates {
    #[serde(default)]
    pub app_initial_states: Vec<AppInitialState>,
}

/// Pre-simulation storage of one application.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct AppInitialState {
    pub id: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_globals: Option<ApplicationKvs>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub app_locals: Vec<ApplicationKvs>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_boxes: Option<ApplicationKvs>,
}

/// A key-value listing, owned by `account` when it describes local state.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ApplicationKvs {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account: Option<String>,
    #[serde(default)]
    pub kvs: Vec<TealKeyValue>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TealKeyValue {
    #[serde(with = "base64_bytes")]
    pub key: Vec<u8>,
    pub value: AvmValue,
}

// ============================================================================
// Groups and transactions
// ============================================================================

/// One simulated transaction group.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct SimulateTxnGroup {
    #[serde(default)]
    pub txn_results: Vec<SimulateTxnResult>,
    /// Why the group failed, if it did.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_message: Option<String>,
    /// Path of the transaction that caused the failure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failed_at: Option<TxnPath>,
}

impl SimulateTxnGroup {
    /// The group's failure as `(message, path)`, when both halves are present.
    pub fn failure(&self) -> Option<(&str, &[usize])> {
        match (&self.failure_message, &self.failed_at) {
            (Some(message), Some(path)) => Some((message.as_str(), path.as_slice())),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct SimulateTxnResult {
    pub txn_result: PendingTxnResult,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exec_trace: Option<TxnExecTrace>,
}

/// Result of one (possibly inner) transaction.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct PendingTxnResult {
    #[serde(default)]
    pub txn: SignedTxn,
    /// Id of the application created by this transaction, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub application_index: Option<u64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub inner_txns: Vec<PendingTxnResult>,
}

impl PendingTxnResult {
    /// Application this transaction calls, or the one it created.
    pub fn app_id(&self) -> Option<u64> {
        match self.txn.txn.apid {
            Some(id) if id != 0 => Some(id),
            _ => self.application_index,
        }
    }

    pub fn txn_type(&self) -> &str {
        &self.txn.txn.txn_type
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SignedTxn {
    #[serde(default)]
    pub txn: TxnFields,
}

/// The subset of transaction fields the replay needs.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TxnFields {
    #[serde(rename = "type", default)]
    pub txn_type: String,
    /// Called application id; absent or zero for creations.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub apid: Option<u64>,
    /// On-completion action of an application call.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub apan: Option<u64>,
    /// Sender address.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snd: Option<String>,
}

/// A transaction result paired with its execution trace.
#[derive(Debug, Clone, Copy)]
pub struct TxnView<'a> {
    pub result: &'a PendingTxnResult,
    pub trace: Option<&'a TxnExecTrace>,
}

// ============================================================================
// Program traces
// ============================================================================

/// The kind of program a trace was recorded for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProgramKind {
    LogicSig,
    Approval,
    ClearState,
}

impl ProgramKind {
    pub fn label(&self) -> &'static str {
        match self {
            ProgramKind::LogicSig => "logic sig",
            ProgramKind::Approval => "approval program",
            ProgramKind::ClearState => "clear state program",
        }
    }
}

/// Program traces recorded for one transaction.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct TxnExecTrace {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approval_program_trace: Option<Vec<OpcodeTraceUnit>>,
    #[serde(
        default,
        with = "option_base64_bytes",
        skip_serializing_if = "Option::is_none"
    )]
    pub approval_program_hash: Option<Vec<u8>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub clear_state_program_trace: Option<Vec<OpcodeTraceUnit>>,
    #[serde(
        default,
        with = "option_base64_bytes",
        skip_serializing_if = "Option::is_none"
    )]
    pub clear_state_program_hash: Option<Vec<u8>>,
    /// Set when the clear state program failed and its writes were discarded.
    #[serde(default)]
    pub clear_state_rollback: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub clear_state_rollback_error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logic_sig_trace: Option<Vec<OpcodeTraceUnit>>,
    #[serde(
        default,
        with = "option_base64_bytes",
        skip_serializing_if = "Option::is_none"
    )]
    pub logic_sig_hash: Option<Vec<u8>>,
    /// Traces of inner transactions, indexed like the result's `inner-txns`.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub inner_trace: Vec<TxnExecTrace>,
}

impl TxnExecTrace {
    /// Units and content hash recorded for one program kind.
    pub fn program(&self, kind: ProgramKind) -> Option<(&[OpcodeTraceUnit], Option<&[u8]>)> {
        let (units, hash) = match kind {
            ProgramKind::LogicSig => (&self.logic_sig_trace, &self.logic_sig_hash),
            ProgramKind::Approval => (&self.approval_program_trace, &self.approval_program_hash),
            ProgramKind::ClearState => (
                &self.clear_state_program_trace,
                &self.clear_state_program_hash,
            ),
        };
        units
            .as_ref()
            .map(|units| (units.as_slice(), hash.as_deref()))
    }

    /// The application program that ran: approval takes precedence over clear state.
    pub fn app_program_kind(&self) -> Option<ProgramKind> {
        if self.approval_program_trace.is_some() {
            Some(ProgramKind::Approval)
        } else if self.clear_state_program_trace.is_some() {
            Some(ProgramKind::ClearState)
        } else {
            None
        }
    }

    pub fn has_logic_sig(&self) -> bool {
        self.logic_sig_trace.is_some()
    }
}

/// Recorded effect of one executed instruction.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct OpcodeTraceUnit {
    pub pc: u64,
    #[serde(default)]
    pub stack_pop_count: usize,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub stack_additions: Vec<AvmValue>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub scratch_changes: Vec<ScratchChange>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub state_changes: Vec<ApplicationStateOperation>,
    /// Indices into the transaction's inner transactions spawned by this instruction.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub spawned_inners: Vec<usize>,
}

impl OpcodeTraceUnit {
    pub fn at(pc: u64) -> Self {
        Self {
            pc,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ScratchChange {
    pub slot: u64,
    pub new_value: AvmValue,
}

/// Write or delete.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StateOperation {
    #[serde(rename = "w")]
    Write,
    #[serde(rename = "d")]
    Delete,
}

/// Which application store an operation targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AppStateType {
    #[serde(rename = "g")]
    Global,
    #[serde(rename = "l")]
    Local,
    #[serde(rename = "b")]
    Box,
}

/// One persistent-state write or delete recorded on an instruction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ApplicationStateOperation {
    pub operation: StateOperation,
    pub app_state_type: AppStateType,
    #[serde(with = "base64_bytes")]
    pub key: Vec<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_value: Option<AvmValue>,
    /// Owner of the local state; only meaningful for local operations.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    const TRACE_JSON: &str = r#"{
        "version": 2,
        "last-round": 10,
        "exec-trace-config": {"enable": true, "state-change": true},
        "initial-states": {"app-initial-states": [
            {"id": 1005, "app-globals": {"kvs": [{"key": "Y250", "value": {"type": 2, "uint": 3}}]}}
        ]},
        "txn-groups": [{
            "failure-message": "logic eval error",
            "failed-at": [0, 1],
            "txn-results": [{
                "txn-result": {
                    "txn": {"txn": {"type": "appl", "apid": 1005}},
                    "inner-txns": [
                        {"txn": {"txn": {"type": "pay"}}},
                        {"txn": {"txn": {"type": "appl", "apid": 1006}}}
                    ]
                },
                "exec-trace": {
                    "approval-program-hash": "AAEC",
                    "approval-program-trace": [
                        {"pc": 1},
                        {"pc": 4, "stack-additions": [{"type": 2, "uint": 1}]},
                        {"pc": 6, "stack-pop-count": 1, "spawned-inners": [0, 1],
                         "state-changes": [{"operation": "w", "app-state-type": "g", "key": "Y250", "new-value": {"type": 2, "uint": 1}}]}
                    ],
                    "inner-trace": [
                        {},
                        {"approval-program-trace": [{"pc": 1}]}
                    ]
                }
            }]
        }]
    }"#;

    #[test]
    fn test_parse_simulate_trace() {
        let trace = SimulateTrace::from_json_str(TRACE_JSON).expect("parse trace");
        assert!(trace.trace_enabled());
        assert_eq!(trace.app_initial_states().len(), 1);
        assert_eq!(trace.app_initial_states()[0].id, 1005);

        let group = &trace.txn_groups[0];
        assert_eq!(group.failure(), Some(("logic eval error", &[0usize, 1][..])));

        let exec = group.txn_results[0].exec_trace.as_ref().expect("exec trace");
        assert_eq!(exec.approval_program_hash.as_deref(), Some(&[0u8, 1, 2][..]));
        assert_eq!(exec.app_program_kind(), Some(ProgramKind::Approval));

        let units = exec.approval_program_trace.as_ref().unwrap();
        assert_eq!(units[2].spawned_inners, vec![0, 1]);
        assert_eq!(units[2].state_changes[0].operation, StateOperation::Write);
        assert_eq!(units[2].state_changes[0].app_state_type, AppStateType::Global);
        assert_eq!(units[2].state_changes[0].key, b"cnt".to_vec());
    }

    #[test]
    fn test_resolve_inner_txn_by_path() {
        let trace = SimulateTrace::from_json_str(TRACE_JSON).expect("parse trace");

        let outer = trace.txn(0, &[0]).expect("outer txn");
        assert_eq!(outer.result.app_id(), Some(1005));

        let payment = trace.txn(0, &[0, 0]).expect("inner payment");
        assert_eq!(payment.result.txn_type(), "pay");
        assert!(payment.trace.unwrap().app_program_kind().is_none());

        let inner_call = trace.txn(0, &[0, 1]).expect("inner app call");
        assert_eq!(inner_call.result.app_id(), Some(1006));
        assert!(inner_call.trace.unwrap().approval_program_trace.is_some());

        assert!(trace.txn(0, &[0, 2]).is_none());
        assert!(trace.txn(1, &[0]).is_none());
        assert!(trace.txn(0, &[]).is_none());
    }

    #[test]
    fn test_disabled_trace_config() {
        let trace = SimulateTrace::from_json_str(r#"{"txn-groups": []}"#).unwrap();
        assert!(!trace.trace_enabled());
    }

    #[test]
    fn test_creation_uses_application_index() {
        let result = PendingTxnResult {
            application_index: Some(77),
            ..PendingTxnResult::default()
        };
        assert_eq!(result.app_id(), Some(77));
    }

    #[test]
    fn test_format_path() {
        assert_eq!(format_path(&[0, 2, 1]), "[0, 2, 1]");
        assert_eq!(format_path(&[]), "[]");
    }
}
