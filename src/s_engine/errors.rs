//! Error types for the S engine.

use crate::s_engine::program::OpId;
use s_types::{Label, Value};
use thiserror::Error;

/// Failures that abort a run. Steps appended before the failing one stay in the trace.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExecutionError {
    #[error("Unresolved label: '{0}' does not label any instruction of this program")]
    UnresolvedLabel(Label),

    #[error("Unknown function: '{0}'")]
    UnknownFunction(String),
}

/// Failures of expand/collapse requests. A rejected request leaves the program untouched.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExpansionError {
    #[error("Invalid degree: requested {requested}, valid range is 0..={max}")]
    InvalidDegree { requested: i64, max: u32 },

    #[error("Unknown function: '{0}'")]
    UnknownFunction(String),

    #[error("Operation {0} is not part of the program's current instruction list")]
    UnknownOperation(OpId),

    #[error("Constant {value} is too large to unroll (limit {limit})")]
    ConstantTooLarge { value: Value, limit: Value },
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Execution failed: {0}")]
    Execution(#[from] ExecutionError),

    #[error("Expansion failed: {0}")]
    Expansion(#[from] ExpansionError),
}
