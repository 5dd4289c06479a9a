//! Macro Expander
//!
//! Rewrites synthetic instructions into their canonical lower-level
//! sequences, and collapses those sequences back.
//!
//! ## Pipeline
//!
//! ```text
//! Source:   L1  x1 ← 0
//!     ↓
//! 1. Seed ExpandContext from the program's labels and work variables
//! 2. Lower the operation (macro label lands on the first child)
//! 3. Append children to the arena with parent = macro, layer + 1
//! 4. Recurse into synthetic children with one level less
//!     ↓
//! Expanded: L1  x1 ← x1 - 1
//!               IF x1 ≠ 0 GOTO L1
//! ```
//!
//! Collapse never re-derives anything: it swaps the deepest visible layer
//! back to the parent ids recorded in the arena.

use std::collections::{BTreeMap, HashSet};

use s_types::{Label, Value, Variable};
use tracing::{debug, info, instrument};

use crate::s_engine::errors::ExpansionError;
use crate::s_engine::instruction::{Argument, Call, Instruction, Operand};
use crate::s_engine::program::{FunctionTable, OpId, Program};

/// Largest constant the lowering rules unroll into one instruction per unit.
pub const MAX_UNROLLED_CONSTANT: Value = 1 << 16;

fn unrolled(value: Value) -> Result<Value, ExpansionError> {
    if value > MAX_UNROLLED_CONSTANT {
        return Err(ExpansionError::ConstantTooLarge {
            value,
            limit: MAX_UNROLLED_CONSTANT,
        });
    }
    Ok(value)
}

// ─── Expansion context ────────────────────────────────────────

/// Fresh identifier source and output buffer for one expansion pass.
///
/// Labels and work variables are issued strictly increasing, starting past
/// the largest ones present in the program being expanded.
pub struct ExpandContext<'f> {
    functions: &'f FunctionTable,
    next_label: u32,
    next_work: u32,
    pending_label: Option<Label>,
    emitted: Vec<(Label, Instruction)>,
}

impl<'f> ExpandContext<'f> {
    pub fn for_program(program: &Program, functions: &'f FunctionTable) -> Self {
        let next_label = program
            .labels()
            .iter()
            .filter_map(|label| label.number())
            .max()
            .unwrap_or(0);
        let next_work = program
            .variables()
            .iter()
            .filter(|var| var.is_work())
            .map(|var| var.index())
            .max()
            .unwrap_or(0);
        Self {
            functions,
            next_label,
            next_work,
            pending_label: None,
            emitted: Vec::new(),
        }
    }

    pub fn fresh_label(&mut self) -> Label {
        self.next_label += 1;
        Label::numbered(self.next_label)
    }

    pub fn fresh_work(&mut self) -> Variable {
        self.next_work += 1;
        Variable::work(self.next_work)
    }

    /// Start a new macro body; `label` goes on its first operation.
    fn begin(&mut self, label: Label) {
        self.emitted.clear();
        self.pending_label = (!label.is_empty()).then_some(label);
    }

    fn emit(&mut self, instruction: Instruction) {
        let label = self.pending_label.take().unwrap_or(Label::EMPTY);
        self.emitted.push((label, instruction));
    }

    fn emit_labeled(&mut self, label: Label, instruction: Instruction) {
        if label.is_empty() {
            return self.emit(instruction);
        }
        self.pending_label = None;
        self.emitted.push((label, instruction));
    }

    fn drain(&mut self) -> Vec<(Label, Instruction)> {
        std::mem::take(&mut self.emitted)
    }

    /// Call/return wiring shared by both invoke variants.
    ///
    /// Arguments are bound into fresh copies of the callee's inputs, every
    /// other callee variable is zeroed, the renamed callee body follows and
    /// `final_step`, given the renamed callee result, lands on the return label.
    fn inline_call(
        &mut self,
        call: &Call,
        final_step: impl FnOnce(Variable) -> Instruction,
    ) -> Result<(), ExpansionError> {
        let functions = self.functions;
        let callee = functions
            .get(&call.function)
            .ok_or_else(|| ExpansionError::UnknownFunction(call.function.clone()))?;

        let mut vars = BTreeMap::new();
        for var in callee.variables() {
            vars.insert(*var, self.fresh_work());
        }
        let mut labels = BTreeMap::new();
        for label in callee.labels() {
            if label.number().is_some() {
                labels.insert(*label, self.fresh_label());
            }
        }
        let return_label = self.fresh_label();
        labels.insert(Label::EXIT, return_label);

        let rename = |var: Variable| vars.get(&var).copied().unwrap_or(var);
        let relabel = |label: Label| labels.get(&label).copied().unwrap_or(label);

        let mut bound = HashSet::new();
        for (input, arg) in callee.inputs().iter().zip(&call.args) {
            let dst = rename(*input);
            match arg {
                Argument::Variable(src) => self.emit(Instruction::Assignment { dst, src: *src }),
                Argument::Call(nested) => self.emit(Instruction::Quote {
                    dst,
                    call: nested.clone(),
                }),
            }
            bound.insert(*input);
        }
        for (original, renamed) in &vars {
            if !bound.contains(original) {
                self.emit(Instruction::ZeroVariable { var: *renamed });
            }
        }

        for op in callee.operations() {
            let instruction = op.instruction().renamed(&rename, &relabel);
            self.emit_labeled(relabel(op.label()), instruction);
        }

        self.emit_labeled(return_label, final_step(rename(Variable::RESULT)));
        Ok(())
    }
}

// ─── Lowering rules ───────────────────────────────────────────

impl Instruction {
    /// One level of expansion. Basic instructions lower to themselves.
    pub(crate) fn lower(
        &self,
        label: Label,
        ctx: &mut ExpandContext<'_>,
    ) -> Result<Vec<(Label, Instruction)>, ExpansionError> {
        ctx.begin(label);
        match self {
            Instruction::Neutral { .. }
            | Instruction::Increase { .. }
            | Instruction::Decrease { .. }
            | Instruction::JumpNotZero { .. } => ctx.emit(self.clone()),

            Instruction::ZeroVariable { var } => {
                let head = if label.number().is_some() {
                    label
                } else {
                    ctx.fresh_label()
                };
                ctx.emit_labeled(head, Instruction::Decrease { var: *var });
                ctx.emit(Instruction::JumpNotZero {
                    var: *var,
                    target: head,
                });
            }

            Instruction::GotoLabel { target } => {
                let z = ctx.fresh_work();
                ctx.emit(Instruction::Increase { var: z });
                ctx.emit(Instruction::JumpNotZero {
                    var: z,
                    target: *target,
                });
            }

            Instruction::Assignment { dst, src } if dst == src => {
                ctx.emit(Instruction::Neutral { var: *dst });
            }

            Instruction::Assignment { dst, src } => {
                let (dst, src) = (*dst, *src);
                let z = ctx.fresh_work();
                let drain = ctx.fresh_label();
                let restore = ctx.fresh_label();
                let done = ctx.fresh_label();

                ctx.emit(Instruction::ZeroVariable { var: dst });
                ctx.emit(Instruction::JumpNotZero {
                    var: src,
                    target: drain,
                });
                ctx.emit(Instruction::GotoLabel { target: done });
                ctx.emit_labeled(drain, Instruction::Decrease { var: src });
                ctx.emit(Instruction::Increase { var: z });
                ctx.emit(Instruction::JumpNotZero {
                    var: src,
                    target: drain,
                });
                ctx.emit_labeled(restore, Instruction::Decrease { var: z });
                ctx.emit(Instruction::Increase { var: dst });
                ctx.emit(Instruction::Increase { var: src });
                ctx.emit(Instruction::JumpNotZero {
                    var: z,
                    target: restore,
                });
                ctx.emit_labeled(done, Instruction::Neutral { var: dst });
            }

            Instruction::ConstantAssignment { var, value } => {
                let count = unrolled(*value)?;
                ctx.emit(Instruction::ZeroVariable { var: *var });
                for _ in 0..count {
                    ctx.emit(Instruction::Increase { var: *var });
                }
            }

            Instruction::JumpZero { var, target } => {
                let skip = ctx.fresh_label();
                ctx.emit(Instruction::JumpNotZero {
                    var: *var,
                    target: skip,
                });
                ctx.emit(Instruction::GotoLabel { target: *target });
                ctx.emit_labeled(
                    skip,
                    Instruction::Neutral {
                        var: Variable::RESULT,
                    },
                );
            }

            Instruction::JumpEqual {
                var,
                rhs: Operand::Constant(k),
                target,
            } => {
                let count = unrolled(*k)?;
                let z = ctx.fresh_work();
                let differ = ctx.fresh_label();

                ctx.emit(Instruction::Assignment { dst: z, src: *var });
                for _ in 0..count {
                    ctx.emit(Instruction::JumpZero {
                        var: z,
                        target: differ,
                    });
                    ctx.emit(Instruction::Decrease { var: z });
                }
                ctx.emit(Instruction::JumpNotZero {
                    var: z,
                    target: differ,
                });
                ctx.emit(Instruction::GotoLabel { target: *target });
                ctx.emit_labeled(
                    differ,
                    Instruction::Neutral {
                        var: Variable::RESULT,
                    },
                );
            }

            Instruction::JumpEqual {
                var,
                rhs: Operand::Variable(other),
                target,
            } => {
                let left = ctx.fresh_work();
                let right = ctx.fresh_work();
                let differ = ctx.fresh_label();
                let step = ctx.fresh_label();
                let left_done = ctx.fresh_label();

                ctx.emit(Instruction::Assignment {
                    dst: left,
                    src: *var,
                });
                ctx.emit(Instruction::Assignment {
                    dst: right,
                    src: *other,
                });
                ctx.emit_labeled(
                    step,
                    Instruction::JumpZero {
                        var: left,
                        target: left_done,
                    },
                );
                ctx.emit(Instruction::JumpZero {
                    var: right,
                    target: differ,
                });
                ctx.emit(Instruction::Decrease { var: left });
                ctx.emit(Instruction::Decrease { var: right });
                ctx.emit(Instruction::GotoLabel { target: step });
                ctx.emit_labeled(
                    left_done,
                    Instruction::JumpZero {
                        var: right,
                        target: *target,
                    },
                );
                ctx.emit_labeled(
                    differ,
                    Instruction::Neutral {
                        var: Variable::RESULT,
                    },
                );
            }

            Instruction::Quote { dst, call } => {
                let dst = *dst;
                ctx.inline_call(call, |result| Instruction::Assignment { dst, src: result })?;
            }

            Instruction::JumpEqualFunction { var, call, target } => {
                let (var, target) = (*var, *target);
                ctx.inline_call(call, |result| Instruction::JumpEqual {
                    var,
                    rhs: Operand::Variable(result),
                    target,
                })?;
            }
        }
        Ok(ctx.drain())
    }
}

/// Expand `ids` by up to `levels`, appending children to the arena.
/// Returns the replacement order for `ids`.
fn expand_ids(
    program: &mut Program,
    ids: &[OpId],
    levels: u32,
    ctx: &mut ExpandContext<'_>,
) -> Result<Vec<OpId>, ExpansionError> {
    let mut order = Vec::with_capacity(ids.len());
    for &id in ids {
        let (label, instruction) = match program.operation(id) {
            Some(op) if levels > 0 && !op.instruction().is_basic() => {
                (op.label(), op.instruction().clone())
            }
            _ => {
                order.push(id);
                continue;
            }
        };
        let children: Vec<OpId> = instruction
            .lower(label, ctx)?
            .into_iter()
            .map(|(label, child)| program.push_operation(label, child, Some(id)))
            .collect();
        order.extend(expand_ids(program, &children, levels - 1, ctx)?);
    }
    Ok(order)
}

fn operation_degree(program: &Program, id: OpId, functions: &FunctionTable) -> u32 {
    program
        .operation(id)
        .map(|op| {
            op.instruction()
                .degree_with(&mut |callee| functions.degree_of(callee).unwrap_or(0))
        })
        .unwrap_or(0)
}

// ─── Program transformations ──────────────────────────────────

impl Program {
    /// Expand every operation by `levels`, capped at the program's degree.
    ///
    /// Works on a copy; `self` is untouched. Expanding a program whose degree
    /// is 0 returns an identical instruction list.
    #[instrument(level = "debug", skip(self), fields(program = self.name()))]
    pub fn expand(&self, levels: u32) -> Result<Program, ExpansionError> {
        let functions = self.callable();
        let levels = levels.min(self.degree_in(&functions));
        let mut expanded = self.clone();
        if levels == 0 {
            return Ok(expanded);
        }

        let mut ctx = ExpandContext::for_program(self, &functions);
        let order = expand_ids(&mut expanded, self.order(), levels, &mut ctx)?;
        expanded.set_order(order);

        info!(
            program = self.name(),
            levels,
            before = self.len(),
            after = expanded.len(),
            "program expanded"
        );
        Ok(expanded)
    }

    /// Undo exactly one expansion layer: the deepest visible one.
    #[instrument(level = "debug", skip(self), fields(program = self.name()))]
    pub fn collapse(&self) -> Result<Program, ExpansionError> {
        let level = self.expansion_level();
        if level == 0 {
            return Err(ExpansionError::InvalidDegree {
                requested: -1,
                max: self.degree(),
            });
        }

        let mut restored = HashSet::new();
        let mut order = Vec::with_capacity(self.len());
        for op in self.operations() {
            match op.parent() {
                Some(parent) if op.layer() == level => {
                    if restored.insert(parent) {
                        order.push(parent);
                    }
                }
                _ => order.push(op.id()),
            }
        }

        let mut collapsed = self.clone();
        collapsed.set_order(order);
        collapsed.compact();
        debug!(
            program = self.name(),
            level,
            before = self.len(),
            after = collapsed.len(),
            "program collapsed"
        );
        Ok(collapsed)
    }

    /// Expand one visible operation by `levels`, leaving the rest as is.
    pub fn expand_single(&self, id: OpId, levels: u32) -> Result<Program, ExpansionError> {
        let position = self
            .position_of(id)
            .ok_or(ExpansionError::UnknownOperation(id))?;
        let functions = self.callable();
        let max = operation_degree(self, id, &functions);
        if levels > max {
            return Err(ExpansionError::InvalidDegree {
                requested: i64::from(levels),
                max,
            });
        }

        let mut expanded = self.clone();
        let mut ctx = ExpandContext::for_program(self, &functions);
        let replacement = expand_ids(&mut expanded, &[id], levels, &mut ctx)?;
        let mut order = self.order().to_vec();
        order.splice(position..=position, replacement);
        expanded.set_order(order);

        debug!(program = self.name(), op = %id, levels, "operation expanded");
        Ok(expanded)
    }

    /// Replace the ancestor `levels` steps up from `id`, together with every
    /// visible operation produced from it, by that ancestor.
    pub fn collapse_single(&self, id: OpId, levels: u32) -> Result<Program, ExpansionError> {
        if self.position_of(id).is_none() {
            return Err(ExpansionError::UnknownOperation(id));
        }
        let chain = self.provenance(id);
        let max = chain.len().saturating_sub(1) as u32;
        let ancestor = chain
            .get(levels as usize)
            .map(|op| op.id())
            .ok_or(ExpansionError::InvalidDegree {
                requested: i64::from(levels),
                max,
            })?;

        let mut order = Vec::with_capacity(self.len());
        let mut placed = false;
        for &candidate in self.order() {
            if self.descends_from(candidate, ancestor) {
                if !placed {
                    order.push(ancestor);
                    placed = true;
                }
            } else {
                order.push(candidate);
            }
        }

        let mut collapsed = self.clone();
        collapsed.set_order(order);
        collapsed.compact();
        debug!(program = self.name(), op = %id, ancestor = %ancestor, "operation collapsed");
        Ok(collapsed)
    }
}
