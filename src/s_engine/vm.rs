//! Execution engine for S programs.
//!
//! The VM walks a program with an instruction pointer, records one snapshot
//! per executed step and halts on `EXIT` or when the pointer runs past the
//! last instruction. Calls run the callee to completion on the same thread
//! in a fresh [`RuntimeEnv`]; only the callee's result and cycle count flow
//! back to the caller.

use crate::config::EngineConfig;
use crate::s_engine::env::{RuntimeEnv, Snapshot, TraceStep};
use crate::s_engine::errors::ExecutionError;
use crate::s_engine::instruction::{Argument, Call, Flow, QUOTE_CYCLES};
use crate::s_engine::program::{FunctionTable, Program};
use s_types::{Label, Value, Variable};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, info, instrument, trace, warn};

/// Ordered steps of one completed (or aborted) run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trace {
    steps: Vec<TraceStep>,
}

impl Trace {
    pub fn new(steps: Vec<TraceStep>) -> Self {
        Self { steps }
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Random access for replay.
    pub fn step(&self, index: usize) -> Option<&TraceStep> {
        self.steps.get(index)
    }

    pub fn last(&self) -> Option<&TraceStep> {
        self.steps.last()
    }

    pub fn steps(&self) -> &[TraceStep] {
        &self.steps
    }

    pub fn iter(&self) -> impl Iterator<Item = &TraceStep> {
        self.steps.iter()
    }

    /// Snapshot after the last step, if any step ran.
    pub fn final_snapshot(&self) -> Option<&Snapshot> {
        self.steps.last().map(|step| &step.snapshot)
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

/// Result of a run: the trace, the value of `y` and the cycles spent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunOutcome {
    pub trace: Trace,
    pub result: Value,
    pub cycles: u64,
    /// Bindings when the program halted.
    pub variables: Snapshot,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VmState {
    Running,
    Halted,
}

/// Stepwise interpreter over one program.
pub struct Vm<'p> {
    program: &'p Program,
    functions: &'p FunctionTable,
    labels: HashMap<Label, usize>,
    env: RuntimeEnv,
    ip: usize,
    state: VmState,
    recording: bool,
    config: EngineConfig,
}

impl<'p> Vm<'p> {
    /// Ready to run at instruction 0 with `inputs` bound positionally.
    pub fn new(program: &'p Program, functions: &'p FunctionTable, inputs: &[Value]) -> Self {
        let env = RuntimeEnv::new(program.variables(), program.inputs(), inputs);
        let state = if program.is_empty() {
            VmState::Halted
        } else {
            VmState::Running
        };
        Self {
            program,
            functions,
            labels: program.label_positions(),
            env,
            ip: 0,
            state,
            recording: true,
            config: EngineConfig::default(),
        }
    }

    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Nested calls keep no trace; their steps are never visible to the caller.
    fn without_recording(mut self) -> Self {
        self.recording = false;
        self
    }

    pub fn ip(&self) -> usize {
        self.ip
    }

    pub fn state(&self) -> VmState {
        self.state
    }

    pub fn cycles(&self) -> u64 {
        self.env.cycles()
    }

    pub fn value(&self, var: Variable) -> Value {
        self.env.get(var)
    }

    /// Steps recorded so far, including those before a failed step.
    pub fn trace(&self) -> &[TraceStep] {
        self.env.steps()
    }

    /// Execute the instruction at the pointer and apply its control transfer.
    pub fn step(&mut self) -> Result<VmState, ExecutionError> {
        if self.state == VmState::Halted {
            return Ok(VmState::Halted);
        }
        let Some(op) = self.program.operation_at(self.ip) else {
            self.state = VmState::Halted;
            return Ok(VmState::Halted);
        };

        let flow = op.instruction().execute(&mut self.env, self.functions)?;
        if self.recording {
            self.env.record(self.ip);
        }
        if self.config.trace_steps {
            trace!(
                program = self.program.name(),
                ip = self.ip,
                instruction = %op.instruction(),
                cycles = self.env.cycles(),
                "step"
            );
        }

        match flow {
            Flow::FallThrough => self.ip += 1,
            Flow::Goto(label) => {
                self.ip = match self.labels.get(&label) {
                    Some(position) => *position,
                    None => {
                        warn!(program = self.program.name(), %label, "unresolved jump target");
                        return Err(ExecutionError::UnresolvedLabel(label));
                    }
                };
            }
            Flow::Exit => self.state = VmState::Halted,
        }
        if self.ip >= self.program.len() {
            self.state = VmState::Halted;
        }
        Ok(self.state)
    }

    /// Step until halted. No step budget: a program that never exits never returns.
    pub fn run_to_halt(&mut self) -> Result<(), ExecutionError> {
        while self.step()? == VmState::Running {}
        Ok(())
    }

    pub fn into_outcome(self) -> RunOutcome {
        let result = self.env.get(Variable::RESULT);
        let cycles = self.env.cycles();
        let variables = self.env.values().clone();
        RunOutcome {
            trace: Trace::new(self.env.into_steps()),
            result,
            cycles,
            variables,
        }
    }
}

/// Run `program` to completion with `inputs`, resolving calls in `functions`.
///
/// The program itself is never mutated; every run owns a fresh environment.
#[instrument(level = "debug", skip_all, fields(program = program.name()))]
pub fn run(
    program: &Program,
    inputs: &[Value],
    functions: &FunctionTable,
) -> Result<RunOutcome, ExecutionError> {
    run_with_config(program, inputs, functions, EngineConfig::default())
}

pub fn run_with_config(
    program: &Program,
    inputs: &[Value],
    functions: &FunctionTable,
    config: EngineConfig,
) -> Result<RunOutcome, ExecutionError> {
    let mut vm = Vm::new(program, functions, inputs).with_config(config);
    vm.run_to_halt()?;
    let outcome = vm.into_outcome();
    info!(
        program = program.name(),
        result = outcome.result,
        cycles = outcome.cycles,
        steps = outcome.trace.len(),
        "run halted"
    );
    Ok(outcome)
}

/// Evaluate a call on behalf of a caller: arguments left to right, callee in
/// isolation, callee cycles charged to `env`. Returns the callee's `y`.
pub(crate) fn evaluate_call(
    call: &Call,
    env: &mut RuntimeEnv,
    functions: &FunctionTable,
) -> Result<Value, ExecutionError> {
    let callee = functions
        .get(&call.function)
        .ok_or_else(|| ExecutionError::UnknownFunction(call.function.clone()))?;

    let mut args = Vec::with_capacity(call.args.len());
    for arg in &call.args {
        let value = match arg {
            Argument::Variable(var) => env.get(*var),
            Argument::Call(nested) => {
                let value = evaluate_call(nested, env, functions)?;
                env.charge(QUOTE_CYCLES);
                value
            }
        };
        args.push(value);
    }
    debug!(function = %call.function, ?args, "invoke");

    let mut vm = Vm::new(callee, functions, &args).without_recording();
    vm.run_to_halt()?;
    env.charge(vm.cycles());
    Ok(vm.value(Variable::RESULT))
}
