//! Runtime environment for one run of one program.
//!
//! Holds the current bindings, the cycle counter and the recorded steps.
//! Each run (and each nested call) owns its environment exclusively; nothing
//! here is shared between runs or between a caller and its callee.

use crate::s_engine::instruction::Operand;
use s_types::{Value, Variable};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Full variable → value mapping captured after one executed step.
pub type Snapshot = BTreeMap<Variable, Value>;

/// One executed step: the position that ran and the bindings right after it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceStep {
    /// 0-based index into the program's instruction list.
    pub index: usize,
    pub snapshot: Snapshot,
}

#[derive(Debug, Clone, Default)]
pub struct RuntimeEnv {
    values: BTreeMap<Variable, Value>,
    cycles: u64,
    steps: Vec<TraceStep>,
}

impl RuntimeEnv {
    /// Environment with every declared variable at 0 and inputs bound positionally.
    ///
    /// Missing trailing inputs stay at 0; surplus values are ignored.
    pub fn new(variables: &BTreeSet<Variable>, inputs: &[Variable], values: &[Value]) -> Self {
        let mut bindings: BTreeMap<Variable, Value> =
            variables.iter().map(|v| (*v, 0)).collect();
        bindings.insert(Variable::RESULT, 0);
        for (var, value) in inputs.iter().zip(values.iter().chain(std::iter::repeat(&0))) {
            bindings.insert(*var, *value);
        }
        Self {
            values: bindings,
            cycles: 0,
            steps: Vec::new(),
        }
    }

    /// Current value; unknown variables read as 0.
    pub fn get(&self, var: Variable) -> Value {
        self.values.get(&var).copied().unwrap_or(0)
    }

    pub fn set(&mut self, var: Variable, value: Value) {
        self.values.insert(var, value);
    }

    pub fn operand(&self, operand: &Operand) -> Value {
        match operand {
            Operand::Variable(var) => self.get(*var),
            Operand::Constant(k) => *k,
        }
    }

    pub fn charge(&mut self, cycles: u64) {
        self.cycles = self.cycles.saturating_add(cycles);
    }

    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    pub fn values(&self) -> &BTreeMap<Variable, Value> {
        &self.values
    }

    /// Append the snapshot for the step that just ran at `index`.
    pub fn record(&mut self, index: usize) {
        self.steps.push(TraceStep {
            index,
            snapshot: self.values.clone(),
        });
    }

    pub fn steps(&self) -> &[TraceStep] {
        &self.steps
    }

    pub fn into_steps(self) -> Vec<TraceStep> {
        self.steps
    }

    /// Drop bindings, cycles and steps.
    pub fn reset(&mut self) {
        self.values.clear();
        self.cycles = 0;
        self.steps.clear();
    }
}
