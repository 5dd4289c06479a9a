//! Expansion/collapse integration tests.
//!
//! Behavioural equivalence is checked on seeded random inputs: every
//! expansion degree of a program must compute the same RESULT as the source,
//! and collapsing back must restore the source instruction list.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use s_emulator::s_engine::{
    self, Call, ExpansionError, FunctionTable, Instruction, OpId, Operand, Program,
    ProgramBuilder,
};
use s_emulator::{Label, Value, Variable};
use std::collections::HashSet;

fn x(n: u32) -> Variable {
    Variable::input(n)
}

fn z(n: u32) -> Variable {
    Variable::work(n)
}

fn l(n: u32) -> Label {
    Label::numbered(n)
}

fn minus() -> Program {
    // RESULT ← max(0, x1 - x2)
    ProgramBuilder::new("Minus")
        .push(Instruction::Assignment {
            dst: Variable::RESULT,
            src: x(1),
        })
        .push(Instruction::Assignment { dst: z(1), src: x(2) })
        .push_labeled(
            l(1),
            Instruction::JumpZero {
                var: z(1),
                target: Label::EXIT,
            },
        )
        .push(Instruction::Decrease {
            var: Variable::RESULT,
        })
        .push(Instruction::Decrease { var: z(1) })
        .push(Instruction::GotoLabel { target: l(1) })
        .build()
}

fn successor() -> Program {
    ProgramBuilder::new("Successor")
        .push(Instruction::Assignment {
            dst: Variable::RESULT,
            src: x(1),
        })
        .push(Instruction::Increase {
            var: Variable::RESULT,
        })
        .build()
}

/// Exercises every synthetic instruction, including both invoke variants.
fn showcase() -> Program {
    let table = FunctionTable::new(vec![minus(), successor()]);
    ProgramBuilder::new("showcase")
        .push(Instruction::ConstantAssignment { var: z(1), value: 2 })
        .push(Instruction::Quote {
            dst: z(2),
            call: Call::with_vars("Minus", &[x(1), z(1)]),
        })
        .push(Instruction::JumpEqual {
            var: z(2),
            rhs: Operand::Constant(1),
            target: l(1),
        })
        .push(Instruction::JumpEqual {
            var: x(1),
            rhs: Operand::Variable(x(2)),
            target: l(2),
        })
        .push(Instruction::JumpEqualFunction {
            var: x(2),
            call: Call::with_vars("Successor", &[x(1)]),
            target: l(3),
        })
        .push(Instruction::Assignment {
            dst: Variable::RESULT,
            src: z(2),
        })
        .push(Instruction::GotoLabel { target: Label::EXIT })
        .push_labeled(
            l(1),
            Instruction::ConstantAssignment {
                var: Variable::RESULT,
                value: 100,
            },
        )
        .push(Instruction::GotoLabel { target: Label::EXIT })
        .push_labeled(
            l(2),
            Instruction::ConstantAssignment {
                var: Variable::RESULT,
                value: 200,
            },
        )
        .push(Instruction::GotoLabel { target: Label::EXIT })
        .push_labeled(l(3), Instruction::ZeroVariable { var: x(1) })
        .push(Instruction::Quote {
            dst: Variable::RESULT,
            call: Call::with_vars("Successor", &[x(1)]),
        })
        .functions(table)
        .build()
}

fn reference(a: Value, b: Value) -> Value {
    let diff = a.saturating_sub(2);
    if diff == 1 {
        100
    } else if a == b {
        200
    } else if b == a + 1 {
        1
    } else {
        diff
    }
}

fn ids(program: &Program) -> Vec<OpId> {
    program.operations().map(|op| op.id()).collect()
}

#[test]
fn test_showcase_reference_semantics() {
    let program = showcase();
    for (a, b) in [(3, 0), (4, 4), (4, 5), (9, 1), (0, 0)] {
        assert_eq!(program.run(&[a, b]).unwrap().result, reference(a, b));
    }
}

#[test]
fn test_every_degree_is_behaviourally_equivalent() {
    let program = showcase();
    let mut rng = StdRng::seed_from_u64(0x5E4D);
    let degree = s_engine::degree(&program);
    assert_eq!(degree, 4);

    for d in 0..=degree {
        let expanded = s_engine::expand_to_degree(&program, d).unwrap();
        assert_eq!(expanded.degree(), degree - d);
        assert_eq!(expanded.inputs(), program.inputs());

        let mut labels = HashSet::new();
        for op in expanded.operations() {
            if !op.label().is_empty() {
                assert!(labels.insert(op.label()), "duplicate label {}", op.label());
            }
        }

        for _ in 0..8 {
            let a = rng.gen_range(0..7);
            let b = rng.gen_range(0..7);
            let inputs = [a, b];
            assert_eq!(
                expanded.run(&inputs).unwrap().result,
                reference(a, b),
                "degree {} inputs {:?}",
                d,
                inputs
            );
        }
    }
}

#[test]
fn test_full_expansion_is_all_basic() {
    let program = showcase();
    let full = s_engine::expand_to_degree(&program, program.degree()).unwrap();
    assert!(full.operations().all(|op| op.instruction().is_basic()));
    assert!(full.operations().all(|op| op.instruction().call().is_none()));
    assert!(full.len() > program.len());
}

#[test]
fn test_collapse_after_expand_restores_source() {
    let program = showcase();
    let source = ids(&program);
    let mut rng = StdRng::seed_from_u64(42);

    for d in 0..=program.degree() {
        let mut current = s_engine::expand_to_degree(&program, d).unwrap();
        for _ in 0..d {
            current = s_engine::collapse(&current).unwrap();
        }
        assert_eq!(ids(&current), source, "degree {}", d);

        let inputs = [rng.gen_range(0..6), rng.gen_range(0..6)];
        assert_eq!(
            current.run(&inputs).unwrap().trace,
            program.run(&inputs).unwrap().trace
        );
    }
}

#[test]
fn test_collapse_matches_shallower_expansion() {
    let program = showcase();
    let two = s_engine::expand_to_degree(&program, 2).unwrap();
    let three = s_engine::expand_to_degree(&program, 3).unwrap();
    let collapsed = s_engine::collapse(&three).unwrap();

    // fresh names are allocated in a different order, so compare shapes
    let shape = |p: &Program| {
        p.operations()
            .map(|op| (op.layer(), op.instruction().name()))
            .collect::<Vec<_>>()
    };
    assert_eq!(collapsed.len(), two.len());
    assert_eq!(shape(&collapsed), shape(&two));
}

#[test]
fn test_expansion_is_idempotent_once_basic() {
    let program = showcase();
    let full = program.expand(program.degree()).unwrap();
    let again = full.expand(3).unwrap();
    assert_eq!(ids(&again), ids(&full));
    assert_eq!(again.listing(), full.listing());
    assert_eq!(s_engine::expand_to_degree(&full, 0).unwrap().listing(), full.listing());
}

#[test]
fn test_invalid_degree_leaves_program_untouched() {
    let program = showcase();
    let before = program.listing();

    assert_eq!(
        s_engine::expand_to_degree(&program, 5).unwrap_err(),
        ExpansionError::InvalidDegree {
            requested: 5,
            max: 4
        }
    );
    assert!(matches!(
        s_engine::collapse(&program),
        Err(ExpansionError::InvalidDegree { requested: -1, .. })
    ));
    assert_eq!(program.listing(), before);
}

#[test]
fn test_single_operation_drill_down() {
    let program = showcase();
    let quote = program.operation_at(1).unwrap().id();

    let opened = s_engine::expand_single(&program, quote, 1).unwrap();
    assert_eq!(opened.operation_at(0).unwrap().id(), program.operation_at(0).unwrap().id());
    let produced = opened.children(quote);
    assert!(!produced.is_empty());
    assert!(produced.iter().all(|op| op.parent() == Some(quote)));
    assert_eq!(opened.len(), program.len() - 1 + produced.len());

    let leaf = produced[0].id();
    let closed = s_engine::collapse_single(&opened, leaf, 1).unwrap();
    assert_eq!(ids(&closed), ids(&program));

    for (a, b) in [(3, 1), (5, 6), (1, 1)] {
        assert_eq!(opened.run(&[a, b]).unwrap().result, reference(a, b));
    }
}

#[test]
fn test_provenance_reaches_source_operation() {
    let program = showcase();
    let full = program.expand(program.degree()).unwrap();
    let source: HashSet<OpId> = ids(&program).into_iter().collect();

    for op in full.operations() {
        let chain = full.provenance(op.id());
        let root = chain.last().unwrap();
        assert!(source.contains(&root.id()));
        assert_eq!(chain.len() as u32, op.layer() + 1);
    }
}

#[test]
fn test_static_cycles_follow_listing() {
    let program = successor();
    assert_eq!(s_engine::cycles(&program), 5);
    let full = program.expand(2).unwrap();
    let listed: u64 = full.listing().iter().map(|row| row.cycles).sum();
    assert_eq!(s_engine::cycles(&full), listed);
}
