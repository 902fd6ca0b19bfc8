//! Which frame reports a recorded group failure.

mod common;

use avm_replay::types::{AvmValue, ProgramKind, SimulateTrace, TxnExecTrace};
use avm_replay::{StepResult, TraceReplayEngine};
use common::*;

const FAILURE: &str = "transaction rejected by ApprovalProgram";

/// One reported exception: the message, the depth, and the kind of the top program.
#[derive(Debug, PartialEq)]
struct Reported {
    message: String,
    depth: usize,
    kind: Option<ProgramKind>,
}

fn run_to_end(engine: &mut TraceReplayEngine) -> Vec<Reported> {
    let mut reported = Vec::new();
    loop {
        match assert_ok(engine.forward(), "forward") {
            StepResult::End => return reported,
            StepResult::Exception(message) => {
                let top = engine.depth() - 1;
                reported.push(Reported {
                    message,
                    depth: engine.depth(),
                    kind: engine.program_state(top).ok().map(|view| view.kind),
                });
            }
            StepResult::Ok => {}
        }
    }
}

fn run(trace: SimulateTrace) -> Vec<Reported> {
    let mut engine = load_engine(trace);
    run_to_end(&mut engine)
}

fn lsig_and_app() -> TxnExecTrace {
    TxnExecTrace {
        logic_sig_trace: Some(plain_units(2)),
        ..approval(plain_units(2))
    }
}

#[test]
fn test_app_program_takes_failure_over_logic_sig() {
    let trace = TraceBuilder::new()
        .failing_group(vec![app_call(1, lsig_and_app())], FAILURE, &[0])
        .build();
    assert_eq!(
        run(trace),
        vec![Reported {
            message: FAILURE.to_string(),
            depth: 3,
            kind: Some(ProgramKind::Approval),
        }]
    );
}

#[test]
fn test_logic_sig_reports_when_no_app_trace() {
    let exec = TxnExecTrace {
        logic_sig_trace: Some(plain_units(3)),
        ..TxnExecTrace::default()
    };
    let trace = TraceBuilder::new()
        .failing_group(vec![app_call(1, exec)], "rejected by logic", &[0])
        .build();
    let reported = run(trace);
    assert_eq!(reported.len(), 1);
    assert_eq!(reported[0].kind, Some(ProgramKind::LogicSig));
    assert_eq!(reported[0].message, "rejected by logic");
}

#[test]
fn test_failure_without_program_is_raised_by_group() {
    let trace = TraceBuilder::new()
        .failing_group(
            vec![app_call(1, approval(plain_units(1))), pay_txn()],
            "overspend",
            &[1],
        )
        .build();
    assert_eq!(
        run(trace),
        vec![Reported {
            message: "overspend".to_string(),
            depth: 2,
            kind: None,
        }]
    );
}

#[test]
fn test_inner_failure_is_reported_by_inner_program() {
    let outer = app_call(1, approval(vec![spawn(1, &[0]), push_uint(2, 1)]));
    let inner = app_call(2, approval(plain_units(2)));
    let trace = TraceBuilder::new()
        .failing_group(vec![with_inner(outer, inner)], FAILURE, &[0, 0])
        .build();

    let mut engine = load_engine(trace);
    let reported = run_to_end(&mut engine);
    assert_eq!(
        reported,
        vec![Reported {
            message: FAILURE.to_string(),
            depth: 5,
            kind: Some(ProgramKind::Approval),
        }]
    );
}

#[test]
fn test_inner_failure_names_inner_program_in_call_stack() {
    let outer = app_call(1, approval(vec![spawn(1, &[0])]));
    let inner = app_call(2, approval(plain_units(1)));
    let trace = TraceBuilder::new()
        .failing_group(vec![with_inner(outer, inner)], FAILURE, &[0, 0])
        .build();
    let mut engine = load_engine(trace);

    loop {
        match assert_ok(engine.forward(), "forward") {
            StepResult::Exception(_) => break,
            StepResult::End => panic!("failure was never reported"),
            StepResult::Ok => {}
        }
    }
    let names: Vec<String> = engine.call_stack().into_iter().map(|f| f.name).collect();
    assert_eq!(names[0], "approval program of group 0 txn [0, 0] (app 2)");
    assert_eq!(names[2], "approval program of group 0 txn [0] (app 1)");
}

#[test]
fn test_failure_in_unspawned_inner_is_reported_by_parent() {
    let trace = TraceBuilder::new()
        .failing_group(vec![app_call(1, approval(plain_units(2)))], FAILURE, &[0, 3])
        .build();
    let reported = run(trace);
    assert_eq!(reported.len(), 1);
    assert_eq!(reported[0].depth, 3);
    assert_eq!(reported[0].kind, Some(ProgramKind::Approval));
}

#[test]
fn test_failure_reported_again_after_stepping_back() {
    let trace = TraceBuilder::new()
        .failing_group(vec![app_call(1, approval(plain_units(1)))], FAILURE, &[0])
        .build();
    let mut engine = load_engine(trace);

    assert_ok(engine.forward(), "starting");
    assert_ok(engine.forward(), "unit");
    assert_eq!(
        assert_ok(engine.forward(), "report"),
        StepResult::Exception(FAILURE.to_string())
    );
    assert_ok(engine.backward(), "back to unit");
    assert_eq!(
        assert_ok(engine.forward(), "report again"),
        StepResult::Exception(FAILURE.to_string())
    );
    assert_eq!(assert_ok(engine.forward(), "finish"), StepResult::End);
}

#[test]
fn test_failure_on_rolled_back_clear_state_wins_over_rollback() {
    let exec = clear_state(
        vec![global_put(1, b"cnt", AvmValue::uint(9))],
        Some("clear state rejected"),
    );
    let trace = TraceBuilder::new()
        .failing_group(vec![app_call(5, exec)], FAILURE, &[0])
        .build();
    let mut engine = load_engine(trace);

    let reported = run_to_end(&mut engine);
    assert_eq!(
        reported,
        vec![Reported {
            message: FAILURE.to_string(),
            depth: 3,
            kind: Some(ProgramKind::ClearState),
        }]
    );
    assert_eq!(global_value(&engine, 5, b"cnt"), None);
}
