//! Public facade for the S-language engine.
//!
//! Programs are built with [`ProgramBuilder`], executed by the [`vm`] and
//! rewritten by the [`expander`]. Every function here is pure over
//! [`Program`] values: transformations return a new program and runs never
//! mutate the one they execute.

pub mod env;
pub mod errors;
pub mod expander;
pub mod history;
pub mod instruction;
pub mod program;
pub mod vm;

pub use env::{RuntimeEnv, Snapshot, TraceStep};
pub use errors::{EngineError, ExecutionError, ExpansionError};
pub use expander::{ExpandContext, MAX_UNROLLED_CONSTANT};
pub use history::{RunHistory, RunRecord};
pub use instruction::{Argument, Call, Flow, Instruction, InstructionKind, Operand};
pub use program::{FunctionTable, InstructionRow, OpId, Operation, Program, ProgramBuilder};
pub use vm::{RunOutcome, Trace, Vm, VmState};

use s_types::Value;

/// Run `program` with its own function table.
pub fn run(program: &Program, inputs: &[Value]) -> Result<RunOutcome, ExecutionError> {
    program.run(inputs)
}

/// Expand `program` by `degree` levels. `degree` must lie in `0..=degree(program)`.
pub fn expand_to_degree(program: &Program, degree: u32) -> Result<Program, ExpansionError> {
    let max = program.degree();
    if degree > max {
        return Err(ExpansionError::InvalidDegree {
            requested: i64::from(degree),
            max,
        });
    }
    program.expand(degree)
}

/// Undo the deepest expansion layer.
pub fn collapse(program: &Program) -> Result<Program, ExpansionError> {
    program.collapse()
}

pub fn expand_single(program: &Program, op: OpId, levels: u32) -> Result<Program, ExpansionError> {
    program.expand_single(op, levels)
}

pub fn collapse_single(
    program: &Program,
    op: OpId,
    levels: u32,
) -> Result<Program, ExpansionError> {
    program.collapse_single(op, levels)
}

pub fn degree(program: &Program) -> u32 {
    program.degree()
}

/// Static cost: sum of the declared cycles of the listed instructions.
pub fn cycles(program: &Program) -> u64 {
    program.static_cycles()
}
