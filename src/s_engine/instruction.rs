//! Instruction set of the S language.
//!
//! Every operation is one variant of [`Instruction`]. Basic instructions
//! cannot be expanded; synthetic ones are macros over the basic set (see
//! `expander.rs` for their canonical expansions). Execution semantics live
//! here, dispatched by a single `match`, so adding a variant is a compile
//! error until both execute and expand handle it.

use crate::s_engine::env::RuntimeEnv;
use crate::s_engine::errors::ExecutionError;
use crate::s_engine::program::FunctionTable;
use crate::s_engine::vm;
use s_types::{Label, Value, Variable};
use serde::{Deserialize, Serialize};
use std::fmt;

// ─── Cycle costs ──────────────────────────────────────────────

pub const NEUTRAL_CYCLES: u64 = 0;
pub const INCREASE_CYCLES: u64 = 1;
pub const DECREASE_CYCLES: u64 = 1;
pub const JUMP_NOT_ZERO_CYCLES: u64 = 2;
pub const ZERO_VARIABLE_CYCLES: u64 = 1;
pub const GOTO_LABEL_CYCLES: u64 = 1;
pub const ASSIGNMENT_CYCLES: u64 = 4;
pub const CONSTANT_ASSIGNMENT_CYCLES: u64 = 2;
pub const JUMP_ZERO_CYCLES: u64 = 2;
pub const JUMP_EQUAL_CYCLES: u64 = 2;
/// Surcharge of an invocation, on top of the callee's own cycles.
pub const QUOTE_CYCLES: u64 = 5;
pub const JUMP_EQUAL_FUNCTION_CYCLES: u64 = 6;

/// Basic (B) or synthetic (S).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InstructionKind {
    Basic,
    Synthetic,
}

impl InstructionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            InstructionKind::Basic => "B",
            InstructionKind::Synthetic => "S",
        }
    }
}

/// Control transfer requested by an executed instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    FallThrough,
    Goto(Label),
    Exit,
}

impl Flow {
    /// Jump to `target`; jumping to `EXIT` terminates.
    pub fn jump(target: Label) -> Self {
        if target.is_exit() {
            Flow::Exit
        } else {
            Flow::Goto(target)
        }
    }
}

/// Right-hand side of a jump-if-equal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operand {
    Variable(Variable),
    Constant(Value),
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Variable(v) => write!(f, "{}", v),
            Operand::Constant(k) => write!(f, "{}", k),
        }
    }
}

/// One argument of a function call: a variable of the caller, or a nested call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Argument {
    Variable(Variable),
    Call(Call),
}

/// Invocation of a named function with positional arguments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Call {
    pub function: String,
    pub args: Vec<Argument>,
}

impl Call {
    pub fn new(function: impl Into<String>, args: Vec<Argument>) -> Self {
        Self {
            function: function.into(),
            args,
        }
    }

    /// Call whose arguments are all plain variables.
    pub fn with_vars(function: impl Into<String>, vars: &[Variable]) -> Self {
        Self::new(
            function,
            vars.iter().copied().map(Argument::Variable).collect(),
        )
    }

    fn collect_variables(&self, out: &mut Vec<Variable>) {
        for arg in &self.args {
            match arg {
                Argument::Variable(v) => out.push(*v),
                Argument::Call(nested) => nested.collect_variables(out),
            }
        }
    }

    fn renamed(&self, vars: &dyn Fn(Variable) -> Variable) -> Call {
        Call {
            function: self.function.clone(),
            args: self
                .args
                .iter()
                .map(|arg| match arg {
                    Argument::Variable(v) => Argument::Variable(vars(*v)),
                    Argument::Call(nested) => Argument::Call(nested.renamed(vars)),
                })
                .collect(),
        }
    }

    /// Degree contributed by the callee body and nested argument calls.
    fn body_degree(&self, callee_degree: &mut dyn FnMut(&str) -> u32) -> u32 {
        let mut degree = callee_degree(&self.function);
        for arg in &self.args {
            if let Argument::Call(nested) = arg {
                degree = degree.max(1 + nested.body_degree(callee_degree).max(2));
            }
        }
        degree
    }
}

impl fmt::Display for Call {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}", self.function)?;
        for arg in &self.args {
            match arg {
                Argument::Variable(v) => write!(f, ",{}", v)?,
                Argument::Call(nested) => write!(f, ",{}", nested)?,
            }
        }
        write!(f, ")")
    }
}

/// The S-language instruction set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Instruction {
    // Basic
    Neutral {
        var: Variable,
    },
    Increase {
        var: Variable,
    },
    Decrease {
        var: Variable,
    },
    JumpNotZero {
        var: Variable,
        target: Label,
    },

    // Synthetic
    ZeroVariable {
        var: Variable,
    },
    Assignment {
        dst: Variable,
        src: Variable,
    },
    ConstantAssignment {
        var: Variable,
        value: Value,
    },
    GotoLabel {
        target: Label,
    },
    JumpZero {
        var: Variable,
        target: Label,
    },
    JumpEqual {
        var: Variable,
        rhs: Operand,
        target: Label,
    },
    Quote {
        dst: Variable,
        call: Call,
    },
    JumpEqualFunction {
        var: Variable,
        call: Call,
        target: Label,
    },
}

impl Instruction {
    pub fn kind(&self) -> InstructionKind {
        match self {
            Instruction::Neutral { .. }
            | Instruction::Increase { .. }
            | Instruction::Decrease { .. }
            | Instruction::JumpNotZero { .. } => InstructionKind::Basic,
            _ => InstructionKind::Synthetic,
        }
    }

    pub fn is_basic(&self) -> bool {
        self.kind() == InstructionKind::Basic
    }

    pub fn name(&self) -> &'static str {
        match self {
            Instruction::Neutral { .. } => "NEUTRAL",
            Instruction::Increase { .. } => "INCREASE",
            Instruction::Decrease { .. } => "DECREASE",
            Instruction::JumpNotZero { .. } => "JUMP_NOT_ZERO",
            Instruction::ZeroVariable { .. } => "ZERO_VARIABLE",
            Instruction::Assignment { .. } => "ASSIGNMENT",
            Instruction::ConstantAssignment { .. } => "CONSTANT_ASSIGNMENT",
            Instruction::GotoLabel { .. } => "GOTO_LABEL",
            Instruction::JumpZero { .. } => "JUMP_ZERO",
            Instruction::JumpEqual {
                rhs: Operand::Constant(_),
                ..
            } => "JUMP_EQUAL_CONSTANT",
            Instruction::JumpEqual {
                rhs: Operand::Variable(_),
                ..
            } => "JUMP_EQUAL_VARIABLE",
            Instruction::Quote { .. } => "QUOTE",
            Instruction::JumpEqualFunction { .. } => "JUMP_EQUAL_FUNCTION",
        }
    }

    /// Declared cost of one execution. For calls this excludes the callee's own cycles.
    pub fn cycles(&self) -> u64 {
        match self {
            Instruction::Neutral { .. } => NEUTRAL_CYCLES,
            Instruction::Increase { .. } => INCREASE_CYCLES,
            Instruction::Decrease { .. } => DECREASE_CYCLES,
            Instruction::JumpNotZero { .. } => JUMP_NOT_ZERO_CYCLES,
            Instruction::ZeroVariable { .. } => ZERO_VARIABLE_CYCLES,
            Instruction::Assignment { .. } => ASSIGNMENT_CYCLES,
            Instruction::ConstantAssignment { .. } => CONSTANT_ASSIGNMENT_CYCLES,
            Instruction::GotoLabel { .. } => GOTO_LABEL_CYCLES,
            Instruction::JumpZero { .. } => JUMP_ZERO_CYCLES,
            Instruction::JumpEqual { .. } => JUMP_EQUAL_CYCLES,
            Instruction::Quote { .. } => QUOTE_CYCLES,
            Instruction::JumpEqualFunction { .. } => JUMP_EQUAL_FUNCTION_CYCLES,
        }
    }

    /// Jump target, if the instruction can transfer control.
    pub fn target(&self) -> Option<Label> {
        match self {
            Instruction::JumpNotZero { target, .. }
            | Instruction::GotoLabel { target }
            | Instruction::JumpZero { target, .. }
            | Instruction::JumpEqual { target, .. }
            | Instruction::JumpEqualFunction { target, .. } => Some(*target),
            _ => None,
        }
    }

    pub fn call(&self) -> Option<&Call> {
        match self {
            Instruction::Quote { call, .. } | Instruction::JumpEqualFunction { call, .. } => {
                Some(call)
            }
            _ => None,
        }
    }

    /// Every variable the instruction reads or writes, call arguments included.
    pub fn variables(&self) -> Vec<Variable> {
        let mut out = Vec::new();
        match self {
            Instruction::Neutral { var }
            | Instruction::Increase { var }
            | Instruction::Decrease { var }
            | Instruction::JumpNotZero { var, .. }
            | Instruction::ZeroVariable { var }
            | Instruction::ConstantAssignment { var, .. }
            | Instruction::JumpZero { var, .. } => out.push(*var),
            Instruction::Assignment { dst, src } => {
                out.push(*dst);
                out.push(*src);
            }
            Instruction::GotoLabel { .. } => {}
            Instruction::JumpEqual { var, rhs, .. } => {
                out.push(*var);
                if let Operand::Variable(other) = rhs {
                    out.push(*other);
                }
            }
            Instruction::Quote { dst: var, call }
            | Instruction::JumpEqualFunction { var, call, .. } => {
                out.push(*var);
                call.collect_variables(&mut out);
            }
        }
        out
    }

    /// Intrinsic macro depth. `callee_degree` resolves the degree of a called function.
    pub fn degree_with(&self, callee_degree: &mut dyn FnMut(&str) -> u32) -> u32 {
        match self {
            Instruction::Neutral { .. }
            | Instruction::Increase { .. }
            | Instruction::Decrease { .. }
            | Instruction::JumpNotZero { .. } => 0,
            Instruction::ZeroVariable { .. } | Instruction::GotoLabel { .. } => 1,
            // lowers to a single neutral
            Instruction::Assignment { dst, src } if dst == src => 1,
            Instruction::Assignment { .. }
            | Instruction::ConstantAssignment { .. }
            | Instruction::JumpZero { .. } => 2,
            Instruction::JumpEqual { .. } => 3,
            // bindings and the final copy are assignments (degree 2)
            Instruction::Quote { call, .. } => 1 + call.body_degree(callee_degree).max(2),
            // final step is a jump-if-equal (degree 3)
            Instruction::JumpEqualFunction { call, .. } => {
                1 + call.body_degree(callee_degree).max(3)
            }
        }
    }

    /// Copy with every variable and label mapped; function names are kept.
    pub fn renamed(
        &self,
        vars: &dyn Fn(Variable) -> Variable,
        labels: &dyn Fn(Label) -> Label,
    ) -> Instruction {
        match self {
            Instruction::Neutral { var } => Instruction::Neutral { var: vars(*var) },
            Instruction::Increase { var } => Instruction::Increase { var: vars(*var) },
            Instruction::Decrease { var } => Instruction::Decrease { var: vars(*var) },
            Instruction::JumpNotZero { var, target } => Instruction::JumpNotZero {
                var: vars(*var),
                target: labels(*target),
            },
            Instruction::ZeroVariable { var } => Instruction::ZeroVariable { var: vars(*var) },
            Instruction::Assignment { dst, src } => Instruction::Assignment {
                dst: vars(*dst),
                src: vars(*src),
            },
            Instruction::ConstantAssignment { var, value } => Instruction::ConstantAssignment {
                var: vars(*var),
                value: *value,
            },
            Instruction::GotoLabel { target } => Instruction::GotoLabel {
                target: labels(*target),
            },
            Instruction::JumpZero { var, target } => Instruction::JumpZero {
                var: vars(*var),
                target: labels(*target),
            },
            Instruction::JumpEqual { var, rhs, target } => Instruction::JumpEqual {
                var: vars(*var),
                rhs: match rhs {
                    Operand::Variable(other) => Operand::Variable(vars(*other)),
                    Operand::Constant(k) => Operand::Constant(*k),
                },
                target: labels(*target),
            },
            Instruction::Quote { dst, call } => Instruction::Quote {
                dst: vars(*dst),
                call: call.renamed(vars),
            },
            Instruction::JumpEqualFunction { var, call, target } => {
                Instruction::JumpEqualFunction {
                    var: vars(*var),
                    call: call.renamed(vars),
                    target: labels(*target),
                }
            }
        }
    }

    /// Execute one step: at most one variable write, then the declared cost is charged.
    ///
    /// Calls run the callee to completion in a fresh environment; the callee's
    /// cycles are charged here as well, its variables never reach `env`.
    pub fn execute(
        &self,
        env: &mut RuntimeEnv,
        functions: &FunctionTable,
    ) -> Result<Flow, ExecutionError> {
        let flow = match self {
            Instruction::Neutral { .. } => Flow::FallThrough,
            Instruction::Increase { var } => {
                env.set(*var, env.get(*var).saturating_add(1));
                Flow::FallThrough
            }
            Instruction::Decrease { var } => {
                env.set(*var, env.get(*var).saturating_sub(1));
                Flow::FallThrough
            }
            Instruction::JumpNotZero { var, target } => {
                if env.get(*var) != 0 {
                    Flow::jump(*target)
                } else {
                    Flow::FallThrough
                }
            }
            Instruction::ZeroVariable { var } => {
                env.set(*var, 0);
                Flow::FallThrough
            }
            Instruction::Assignment { dst, src } => {
                env.set(*dst, env.get(*src));
                Flow::FallThrough
            }
            Instruction::ConstantAssignment { var, value } => {
                env.set(*var, *value);
                Flow::FallThrough
            }
            Instruction::GotoLabel { target } => Flow::jump(*target),
            Instruction::JumpZero { var, target } => {
                if env.get(*var) == 0 {
                    Flow::jump(*target)
                } else {
                    Flow::FallThrough
                }
            }
            Instruction::JumpEqual { var, rhs, target } => {
                if env.get(*var) == env.operand(rhs) {
                    Flow::jump(*target)
                } else {
                    Flow::FallThrough
                }
            }
            Instruction::Quote { dst, call } => {
                let value = vm::evaluate_call(call, env, functions)?;
                env.set(*dst, value);
                Flow::FallThrough
            }
            Instruction::JumpEqualFunction { var, call, target } => {
                let value = vm::evaluate_call(call, env, functions)?;
                if env.get(*var) == value {
                    Flow::jump(*target)
                } else {
                    Flow::FallThrough
                }
            }
        };
        env.charge(self.cycles());
        Ok(flow)
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Instruction::Neutral { var } => write!(f, "{} ← {}", var, var),
            Instruction::Increase { var } => write!(f, "{} ← {} + 1", var, var),
            Instruction::Decrease { var } => write!(f, "{} ← {} - 1", var, var),
            Instruction::JumpNotZero { var, target } => {
                write!(f, "IF {} ≠ 0 GOTO {}", var, target)
            }
            Instruction::ZeroVariable { var } => write!(f, "{} ← 0", var),
            Instruction::Assignment { dst, src } => write!(f, "{} ← {}", dst, src),
            Instruction::ConstantAssignment { var, value } => write!(f, "{} ← {}", var, value),
            Instruction::GotoLabel { target } => write!(f, "GOTO {}", target),
            Instruction::JumpZero { var, target } => write!(f, "IF {} = 0 GOTO {}", var, target),
            Instruction::JumpEqual { var, rhs, target } => {
                write!(f, "IF {} = {} GOTO {}", var, rhs, target)
            }
            Instruction::Quote { dst, call } => write!(f, "{} ← {}", dst, call),
            Instruction::JumpEqualFunction { var, call, target } => {
                write!(f, "IF {} = {} GOTO {}", var, call, target)
            }
        }
    }
}
