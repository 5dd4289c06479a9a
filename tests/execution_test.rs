//! Execution engine integration tests: runs, traces, cycles and invocation.
//!
//! All programs are assembled with `ProgramBuilder`; no loader is involved.

use s_emulator::s_engine::{
    self, Argument, Call, ExecutionError, FunctionTable, Instruction, Program, ProgramBuilder,
    RunHistory, Vm, VmState,
};
use s_emulator::{EngineConfig, Label, Variable};

fn x(n: u32) -> Variable {
    Variable::input(n)
}

fn z(n: u32) -> Variable {
    Variable::work(n)
}

fn l(n: u32) -> Label {
    Label::numbered(n)
}

/// RESULT ← x1 + 1
fn successor() -> Program {
    ProgramBuilder::new("Successor")
        .user_string("S")
        .push(Instruction::Assignment {
            dst: Variable::RESULT,
            src: x(1),
        })
        .push(Instruction::Increase {
            var: Variable::RESULT,
        })
        .build()
}

/// RESULT ← x1 + x2, using work variables z1, z2.
fn plus() -> Program {
    ProgramBuilder::new("Plus")
        .push(Instruction::Assignment {
            dst: Variable::RESULT,
            src: x(1),
        })
        .push(Instruction::Assignment { dst: z(1), src: x(2) })
        .push(Instruction::ConstantAssignment { var: z(2), value: 99 })
        .push_labeled(
            l(1),
            Instruction::JumpZero {
                var: z(1),
                target: Label::EXIT,
            },
        )
        .push(Instruction::Decrease { var: z(1) })
        .push(Instruction::Increase {
            var: Variable::RESULT,
        })
        .push(Instruction::GotoLabel { target: l(1) })
        .build()
}

fn counting_loop() -> Program {
    ProgramBuilder::new("count")
        .push_labeled(l(1), Instruction::Decrease { var: x(1) })
        .push(Instruction::Increase {
            var: Variable::RESULT,
        })
        .push(Instruction::JumpNotZero {
            var: x(1),
            target: l(1),
        })
        .build()
}

#[test]
fn test_single_increment_traces_one_step() {
    let program = ProgramBuilder::new("inc")
        .push(Instruction::Increase { var: x(1) })
        .build();

    let outcome = s_engine::run(&program, &[0]).unwrap();
    assert_eq!(outcome.trace.len(), 1);
    assert_eq!(outcome.trace.step(0).unwrap().snapshot[&x(1)], 1);
    assert_eq!(outcome.cycles, 1);

    let outcome = s_engine::run(&program, &[5]).unwrap();
    assert_eq!(outcome.trace.len(), 1);
    assert_eq!(outcome.trace.last().unwrap().snapshot[&x(1)], 6);
}

#[test]
fn test_jump_not_zero_loop_runs_three_iterations() {
    let outcome = s_engine::run(&counting_loop(), &[3]).unwrap();

    let iterations = outcome.trace.iter().filter(|step| step.index == 0).count();
    assert_eq!(iterations, 3);
    assert_eq!(outcome.trace.len(), 9);
    assert_eq!(outcome.result, 3);
    assert_eq!(outcome.variables[&x(1)], 0);
    // loop body: 1 + 1 + 2 per iteration
    assert_eq!(outcome.cycles, 12);
}

#[test]
fn test_invoke_isolates_callee_variables() {
    let table = FunctionTable::new(vec![successor()]);
    let caller = ProgramBuilder::new("main")
        .push(Instruction::Quote {
            dst: Variable::RESULT,
            call: Call::with_vars("Successor", &[x(1)]),
        })
        .functions(table)
        .build();

    let outcome = caller.run(&[4]).unwrap();
    assert_eq!(outcome.result, 5);

    let keys: Vec<Variable> = outcome.trace.last().unwrap().snapshot.keys().copied().collect();
    assert_eq!(keys, vec![Variable::RESULT, x(1)]);
    // surcharge 5 + callee (assign 4 + inc 1)
    assert_eq!(outcome.cycles, 10);
}

#[test]
fn test_callee_work_variables_do_not_collide_with_caller() {
    let table = FunctionTable::new(vec![plus()]);
    let caller = ProgramBuilder::new("main")
        .push(Instruction::ConstantAssignment { var: z(1), value: 7 })
        .push(Instruction::Quote {
            dst: Variable::RESULT,
            call: Call::with_vars("Plus", &[x(1), x(2)]),
        })
        .functions(table)
        .build();

    let outcome = caller.run(&[2, 3]).unwrap();
    assert_eq!(outcome.result, 5);
    assert_eq!(outcome.variables[&z(1)], 7);
    assert!(!outcome.variables.contains_key(&z(2)));
}

#[test]
fn test_nested_and_missing_call_arguments() {
    let table = FunctionTable::new(vec![successor(), plus()]);
    let caller = ProgramBuilder::new("main")
        .push(Instruction::Quote {
            dst: Variable::RESULT,
            call: Call::new(
                "Plus",
                vec![
                    Argument::Call(Call::with_vars("Successor", &[x(1)])),
                    Argument::Variable(x(2)),
                ],
            ),
        })
        .push(Instruction::Quote {
            dst: z(3),
            call: Call::with_vars("Plus", &[x(1)]),
        })
        .functions(table)
        .build();

    let outcome = caller.run(&[1, 10]).unwrap();
    assert_eq!(outcome.result, 12);
    assert_eq!(outcome.variables[&z(3)], 1);
}

#[test]
fn test_nested_call_argument_costs_like_sequential_calls() {
    let table = FunctionTable::new(vec![successor()]);
    let nested = ProgramBuilder::new("nested")
        .push(Instruction::Quote {
            dst: Variable::RESULT,
            call: Call::new(
                "Successor",
                vec![Argument::Call(Call::with_vars("Successor", &[x(1)]))],
            ),
        })
        .functions(table.clone())
        .build();
    let sequential = ProgramBuilder::new("sequential")
        .push(Instruction::Quote {
            dst: z(1),
            call: Call::with_vars("Successor", &[x(1)]),
        })
        .push(Instruction::Quote {
            dst: Variable::RESULT,
            call: Call::with_vars("Successor", &[z(1)]),
        })
        .functions(table)
        .build();

    let inner = nested.run(&[3]).unwrap();
    let outer = sequential.run(&[3]).unwrap();
    assert_eq!(inner.result, 5);
    assert_eq!(outer.result, 5);
    // two surcharges of 5 plus two callee runs of 4 + 1
    assert_eq!(inner.cycles, 20);
    assert_eq!(inner.cycles, outer.cycles);
}

#[test]
fn test_recursive_invocation() {
    // RESULT ← x1 computed as 1 + Down(x1 - 1)
    let down = ProgramBuilder::new("Down")
        .push(Instruction::JumpZero {
            var: x(1),
            target: Label::EXIT,
        })
        .push(Instruction::Decrease { var: x(1) })
        .push(Instruction::Quote {
            dst: Variable::RESULT,
            call: Call::with_vars("Down", &[x(1)]),
        })
        .push(Instruction::Increase {
            var: Variable::RESULT,
        })
        .build();
    let table = FunctionTable::new(vec![down.clone()]);
    let down = down.with_functions(table);

    assert_eq!(down.run(&[4]).unwrap().result, 4);
    assert_eq!(down.run(&[0]).unwrap().result, 0);
}

#[test]
fn test_jump_equal_function_compares_against_callee_result() {
    let table = FunctionTable::new(vec![successor()]);
    let program = ProgramBuilder::new("is_next")
        .push(Instruction::JumpEqualFunction {
            var: x(2),
            call: Call::with_vars("Successor", &[x(1)]),
            target: l(1),
        })
        .push(Instruction::GotoLabel { target: Label::EXIT })
        .push_labeled(
            l(1),
            Instruction::Increase {
                var: Variable::RESULT,
            },
        )
        .functions(table)
        .build();

    assert_eq!(program.run(&[6, 7]).unwrap().result, 1);
    assert_eq!(program.run(&[6, 8]).unwrap().result, 0);
}

#[test]
fn test_decrement_never_goes_below_zero() {
    let program = ProgramBuilder::new("dec")
        .push(Instruction::Decrease { var: x(1) })
        .push(Instruction::Decrease { var: x(1) })
        .build();

    for input in 0..3 {
        let outcome = program.run(&[input]).unwrap();
        assert_eq!(outcome.variables[&x(1)], input.saturating_sub(2));
        assert_eq!(outcome.trace.step(0).unwrap().snapshot[&x(1)], input.saturating_sub(1));
    }
}

#[test]
fn test_cycles_equal_sum_of_executed_costs() {
    let program = plus();
    for (a, b) in [(0, 0), (2, 3), (5, 1)] {
        let outcome = program.run(&[a, b]).unwrap();
        let charged: u64 = outcome
            .trace
            .iter()
            .map(|step| program.operation_at(step.index).unwrap().cycles())
            .sum();
        assert_eq!(outcome.cycles, charged);
        assert_eq!(outcome.result, a + b);
    }
}

#[test]
fn test_unresolved_label_and_unknown_function() {
    let broken = ProgramBuilder::new("broken")
        .push(Instruction::Increase { var: x(1) })
        .push(Instruction::JumpNotZero {
            var: x(1),
            target: l(5),
        })
        .build();
    assert_eq!(
        broken.run(&[0]).unwrap_err(),
        ExecutionError::UnresolvedLabel(l(5))
    );

    let functions = FunctionTable::default();
    let mut vm = Vm::new(&broken, &functions, &[0]);
    assert!(vm.run_to_halt().is_err());
    assert_eq!(vm.trace().len(), 2);

    let caller = ProgramBuilder::new("caller")
        .push(Instruction::Increase {
            var: Variable::RESULT,
        })
        .push(Instruction::Quote {
            dst: Variable::RESULT,
            call: Call::with_vars("Ghost", &[]),
        })
        .build();
    let mut vm = Vm::new(&caller, &functions, &[]);
    assert_eq!(
        vm.run_to_halt().unwrap_err(),
        ExecutionError::UnknownFunction("Ghost".to_string())
    );
    assert_eq!(vm.trace().len(), 1);
}

#[test]
fn test_step_tracing_config_does_not_change_results() {
    let program = counting_loop();
    let functions = FunctionTable::default();
    let config = EngineConfig {
        trace_steps: true,
        ..EngineConfig::default()
    };

    let mut vm = Vm::new(&program, &functions, &[2]).with_config(config);
    while vm.step().unwrap() == VmState::Running {}
    let outcome = vm.into_outcome();
    assert_eq!(outcome.result, 2);
    assert_eq!(outcome.trace.len(), 6);
}

#[test]
fn test_runs_are_recorded_in_history() {
    let program = counting_loop();
    let mut history = RunHistory::new();
    for input in [1, 4] {
        let outcome = program.run(&[input]).unwrap();
        history.record(&program, &[input], &outcome);
    }

    let last = history.last().unwrap();
    assert_eq!(last.number, 2);
    assert_eq!(last.result, 4);
    assert_eq!(last.inputs, vec![(x(1), 4)]);
    assert_eq!(last.degree, 0);
}
