//! Determinism, reversibility and stack safety of the replay.

mod common;

use std::collections::BTreeMap;

use avm_replay::types::{AvmValue, OpcodeTraceUnit, ScratchChange, SimulateTrace, TxnExecTrace};
use avm_replay::{AppState, ProgramStateView, ReplayError, StepResult, TraceReplayEngine};
use common::*;
use proptest::prelude::*;

type Snapshot = (
    (usize, Option<String>),
    Option<ProgramStateView>,
    BTreeMap<u64, AppState>,
);

fn snapshot(engine: &TraceReplayEngine) -> Snapshot {
    (
        engine.position(),
        engine.top_program_state(),
        engine.current_state().clone(),
    )
}

/// Logic sig plus an app call spawning an inner call, then a payment.
fn nested_trace() -> SimulateTrace {
    let outer_exec = TxnExecTrace {
        logic_sig_trace: Some(vec![push_uint(1, 1), OpcodeTraceUnit::at(2)]),
        ..approval(vec![
            push_uint(1, 10),
            store(2, 3, 10),
            global_put(3, b"k", AvmValue::bytes(b"v".to_vec())),
            spawn(4, &[0]),
            push_uint(5, 11),
        ])
    };
    let inner = app_call(
        20,
        approval(vec![
            global_put(1, b"inner", AvmValue::uint(1)),
            push_uint(2, 1),
        ]),
    );
    TraceBuilder::new()
        .group(vec![with_inner(app_call(10, outer_exec), inner), pay_txn()])
        .group(vec![app_call(10, approval(vec![global_put(1, b"k", AvmValue::uint(2))]))])
        .build()
}

/// Snapshots at every forward stop, start included.
fn forward_stops(engine: &mut TraceReplayEngine) -> Vec<Snapshot> {
    let mut stops = vec![snapshot(engine)];
    while assert_ok(engine.forward(), "forward") != StepResult::End {
        stops.push(snapshot(engine));
    }
    stops
}

#[test]
fn test_backward_retraces_forward_stops() {
    let mut engine = load_engine(nested_trace());
    let forward = forward_stops(&mut engine);
    assert!(engine.is_ended());

    let mut backward = Vec::new();
    while assert_ok(engine.backward(), "backward") != StepResult::End {
        backward.push(snapshot(&engine));
    }
    backward.reverse();

    assert_eq!(backward.len(), forward.len());
    for (i, (b, f)) in backward.iter().zip(&forward).enumerate() {
        assert_eq!(b, f, "stop {} differs between directions", i);
    }
}

#[test]
fn test_forward_then_backward_restores_position() {
    let mut engine = load_engine(nested_trace());
    loop {
        let before = snapshot(&engine);
        if assert_ok(engine.forward(), "forward") == StepResult::End {
            break;
        }
        assert_ok(engine.backward(), "backward");
        assert_eq!(snapshot(&engine), before);
        assert_ok(engine.forward(), "forward again");
    }
}

#[test]
fn test_second_pass_matches_first() {
    let mut engine = load_engine(nested_trace());
    let first = forward_stops(&mut engine);
    while assert_ok(engine.backward(), "backward") != StepResult::End {}
    assert!(engine.is_at_start());
    let second = forward_stops(&mut engine);
    assert_eq!(first, second);
}

#[test]
fn test_inner_program_state_is_visible_and_undone() {
    let mut engine = load_engine(nested_trace());
    let mut saw_inner = false;
    while assert_ok(engine.forward(), "forward") != StepResult::End {
        if global_value(&engine, 20, b"inner").is_some() {
            saw_inner = true;
            break;
        }
    }
    assert!(saw_inner);
    let view = engine.top_program_state().expect("inner program on top");
    assert_eq!(view.app_id, Some(20));

    assert_ok(engine.backward(), "backward");
    assert_eq!(global_value(&engine, 20, b"inner"), None);
    // The outer program's write is untouched.
    assert_eq!(
        global_value(&engine, 10, b"k"),
        Some(AvmValue::bytes(b"v".to_vec()))
    );
}

#[test]
fn test_stack_underflow_is_malformed() {
    let trace = TraceBuilder::new()
        .group(vec![app_call(1, approval(vec![push_uint(1, 5), pop(2, 2)]))])
        .build();
    let mut engine = load_engine(trace);
    assert_ok(engine.forward(), "starting");
    assert_ok(engine.forward(), "push");
    match engine.forward() {
        Err(ReplayError::MalformedInput(message)) => {
            assert!(message.contains("trace unit 1"), "{}", message)
        }
        other => panic!("expected stack underflow, got {:?}", other),
    }
}

#[test]
fn test_scratch_slot_out_of_range_is_malformed() {
    let trace = TraceBuilder::new()
        .group(vec![app_call(
            1,
            approval(vec![push_uint(1, 5), store(2, 256, 5)]),
        )])
        .build();
    let mut engine = load_engine(trace);
    assert_ok(engine.forward(), "starting");
    assert_ok(engine.forward(), "push");
    let err = engine.forward().unwrap_err();
    assert!(err.is_fatal());
}

#[test]
fn test_rejected_unit_can_be_retried_without_side_effects() {
    let bad = OpcodeTraceUnit {
        stack_additions: vec![AvmValue::uint(7)],
        scratch_changes: vec![ScratchChange {
            slot: 300,
            new_value: AvmValue::uint(1),
        }],
        ..OpcodeTraceUnit::at(2)
    };
    let trace = TraceBuilder::new()
        .group(vec![app_call(1, approval(vec![OpcodeTraceUnit::at(1), bad]))])
        .build();
    let mut engine = load_engine(trace);
    assert_ok(engine.forward(), "starting");
    assert_ok(engine.forward(), "unit 0");
    let before = snapshot(&engine);

    for _ in 0..2 {
        match engine.forward() {
            Err(ReplayError::MalformedInput(message)) => {
                assert!(message.contains("scratch slot 300"), "{}", message)
            }
            other => panic!("expected bad scratch slot, got {:?}", other),
        }
        assert_eq!(snapshot(&engine), before);
    }
    let view = engine.top_program_state().expect("program on top");
    assert!(view.stack.is_empty());
}

#[derive(Debug, Clone)]
enum Op {
    Push(u64),
    Pop,
    Store(u64, u64),
    Put(u8, u64),
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        any::<u64>().prop_map(Op::Push),
        Just(Op::Pop),
        (0u64..256, any::<u64>()).prop_map(|(slot, v)| Op::Store(slot, v)),
        (any::<u8>(), any::<u64>()).prop_map(|(k, v)| Op::Put(k, v)),
    ]
}

/// Turn ops into units that never underflow.
fn units_from_ops(ops: &[Op]) -> Vec<OpcodeTraceUnit> {
    let mut depth = 0usize;
    let mut units = Vec::new();
    for (i, op) in ops.iter().enumerate() {
        let pc = i as u64 + 1;
        let unit = match op {
            Op::Push(v) => push_uint(pc, *v),
            Op::Pop if depth > 0 => pop(pc, 1),
            Op::Pop => push_uint(pc, 0),
            Op::Store(slot, v) if depth > 0 => store(pc, *slot, *v),
            Op::Store(_, v) => push_uint(pc, *v),
            Op::Put(k, v) => global_put(pc, &[*k], AvmValue::uint(*v)),
        };
        depth = depth + unit.stack_additions.len() - unit.stack_pop_count;
        units.push(unit);
    }
    units
}

proptest! {
    #[test]
    fn replay_is_deterministic(ops in proptest::collection::vec(op_strategy(), 1..40), back in 1usize..48) {
        let trace = TraceBuilder::new()
            .group(vec![app_call(4, approval(units_from_ops(&ops)))])
            .build();
        let mut engine = load_engine(trace);
        let stops = forward_stops(&mut engine);

        // Walk back some way from the end, then forward to the end again.
        let back = back.clamp(1, stops.len());
        for _ in 0..back {
            prop_assert_ne!(engine.backward().unwrap(), StepResult::End);
        }
        prop_assert_eq!(&snapshot(&engine), &stops[stops.len() - back]);
        for i in (stops.len() - back + 1)..stops.len() {
            prop_assert_eq!(engine.forward().unwrap(), StepResult::Ok);
            prop_assert_eq!(&snapshot(&engine), &stops[i]);
        }
    }
}
