//! Programs, functions and the operation arena.
//!
//! A [`Program`] owns its [`Operation`]s in a flat arena.
//! The visible instruction list is an ordered list of arena ids; expansion
//! appends children to the arena and rewrites the list, collapse rewrites the
//! list back to the parents and drops the children nothing refers to any more. Provenance is a parent id, never a reference, so
//! cloning a program is a structural copy of two vectors.

use crate::s_engine::errors::ExecutionError;
use crate::s_engine::instruction::{Instruction, InstructionKind};
use crate::s_engine::vm::{self, RunOutcome};
use s_types::{Label, Value, Variable};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;

// ─── Operations ───────────────────────────────────────────────

/// Stable identity of an operation within its program's arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OpId(pub u32);

impl fmt::Display for OpId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// An instruction placed in a program: label, declared cost and provenance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Operation {
    id: OpId,
    label: Label,
    instruction: Instruction,
    cycles: u64,
    parent: Option<OpId>,
    /// Expansion depth: 0 for source operations, parent's layer + 1 otherwise.
    layer: u32,
}

impl Operation {
    pub fn id(&self) -> OpId {
        self.id
    }

    pub fn label(&self) -> Label {
        self.label
    }

    pub fn instruction(&self) -> &Instruction {
        &self.instruction
    }

    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    /// The macro this operation was expanded from; `None` for source operations.
    pub fn parent(&self) -> Option<OpId> {
        self.parent
    }

    pub fn layer(&self) -> u32 {
        self.layer
    }

    pub fn kind(&self) -> InstructionKind {
        self.instruction.kind()
    }
}

/// One row of a program listing, ready for a front end table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstructionRow {
    /// 1-based position.
    pub number: usize,
    pub id: OpId,
    pub kind: InstructionKind,
    pub label: String,
    pub text: String,
    pub cycles: u64,
}

// ─── Function table ───────────────────────────────────────────

/// Named callable programs, with degrees memoized per table.
///
/// Entries are shared copy-on-write: cloning a table is cheap and mutating a
/// clone through [`FunctionTable::insert`] never affects the original.
#[derive(Debug, Clone, Default)]
pub struct FunctionTable {
    functions: Arc<BTreeMap<String, Program>>,
    degrees: Arc<BTreeMap<String, u32>>,
}

impl FunctionTable {
    pub fn new(functions: impl IntoIterator<Item = Program>) -> Self {
        let functions: BTreeMap<String, Program> = functions
            .into_iter()
            .map(|program| (program.name.clone(), program))
            .collect();
        let degrees = compute_degrees(&functions);
        Self {
            functions: Arc::new(functions),
            degrees: Arc::new(degrees),
        }
    }

    /// Add or replace a function; degrees are recomputed.
    pub fn insert(&mut self, program: Program) {
        Arc::make_mut(&mut self.functions).insert(program.name.clone(), program);
        self.degrees = Arc::new(compute_degrees(&self.functions));
    }

    pub fn get(&self, name: &str) -> Option<&Program> {
        self.functions.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }

    /// Memoized degree of a function. Recursive call cycles contribute 0.
    pub fn degree_of(&self, name: &str) -> Option<u32> {
        self.degrees.get(name).copied()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.functions.keys().map(|name| name.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = &Program> {
        self.functions.values()
    }

    pub fn len(&self) -> usize {
        self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }
}

fn compute_degrees(functions: &BTreeMap<String, Program>) -> BTreeMap<String, u32> {
    let mut memo = BTreeMap::new();
    let mut visiting = BTreeSet::new();
    for name in functions.keys() {
        visit_degree(name, functions, &mut memo, &mut visiting);
    }
    memo
}

fn visit_degree(
    name: &str,
    functions: &BTreeMap<String, Program>,
    memo: &mut BTreeMap<String, u32>,
    visiting: &mut BTreeSet<String>,
) -> u32 {
    if let Some(degree) = memo.get(name) {
        return *degree;
    }
    let Some(program) = functions.get(name) else {
        return 0;
    };
    if !visiting.insert(name.to_string()) {
        return 0;
    }

    let mut degree = 0;
    for op in program.operations() {
        let op_degree = op
            .instruction()
            .degree_with(&mut |callee| visit_degree(callee, functions, memo, visiting));
        degree = degree.max(op_degree);
    }

    visiting.remove(name);
    memo.insert(name.to_string(), degree);
    degree
}

// ─── Program ──────────────────────────────────────────────────

/// A program or function: ordered operations plus declared identifiers.
#[derive(Debug, Clone)]
pub struct Program {
    name: String,
    user_string: Option<String>,
    arena: Vec<Operation>,
    order: Vec<OpId>,
    inputs: Vec<Variable>,
    variables: BTreeSet<Variable>,
    labels: BTreeSet<Label>,
    functions: Option<FunctionTable>,
}

impl Program {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Display name of a function; falls back to its name.
    pub fn user_string(&self) -> &str {
        self.user_string.as_deref().unwrap_or(&self.name)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Operations in program order.
    pub fn operations(&self) -> impl Iterator<Item = &Operation> + '_ {
        self.order.iter().map(move |id| &self.arena[id.0 as usize])
    }

    pub fn operation_at(&self, index: usize) -> Option<&Operation> {
        self.order
            .get(index)
            .map(|id| &self.arena[id.0 as usize])
    }

    /// Any operation ever produced for this program, visible or not.
    pub fn operation(&self, id: OpId) -> Option<&Operation> {
        self.arena.get(id.0 as usize)
    }

    pub fn position_of(&self, id: OpId) -> Option<usize> {
        self.order.iter().position(|candidate| *candidate == id)
    }

    /// Input variables in calling-convention order.
    pub fn inputs(&self) -> &[Variable] {
        &self.inputs
    }

    pub fn variables(&self) -> &BTreeSet<Variable> {
        &self.variables
    }

    /// Labels defined on instructions or used as jump targets.
    pub fn labels(&self) -> &BTreeSet<Label> {
        &self.labels
    }

    pub fn functions(&self) -> Option<&FunctionTable> {
        self.functions.as_ref()
    }

    pub fn function(&self, name: &str) -> Option<&Program> {
        self.functions.as_ref().and_then(|table| table.get(name))
    }

    /// Functions this program may call; empty for a plain function.
    pub fn callable(&self) -> FunctionTable {
        self.functions.clone().unwrap_or_default()
    }

    pub fn with_functions(mut self, functions: FunctionTable) -> Self {
        self.functions = Some(functions);
        self
    }

    /// Remaining expansion depth, resolving callees in the program's own table.
    pub fn degree(&self) -> u32 {
        self.degree_in(&self.callable())
    }

    /// Remaining expansion depth, resolving callees in `functions`.
    pub fn degree_in(&self, functions: &FunctionTable) -> u32 {
        self.operations()
            .map(|op| {
                op.instruction()
                    .degree_with(&mut |callee| functions.degree_of(callee).unwrap_or(0))
            })
            .max()
            .unwrap_or(0)
    }

    /// Sum of the declared costs of the listed operations.
    pub fn static_cycles(&self) -> u64 {
        self.operations().map(|op| op.cycles()).sum()
    }

    /// Deepest expansion layer currently visible; 0 for a source program.
    pub fn expansion_level(&self) -> u32 {
        self.operations().map(|op| op.layer()).max().unwrap_or(0)
    }

    /// Position of each instruction label.
    pub fn label_positions(&self) -> HashMap<Label, usize> {
        self.operations()
            .enumerate()
            .filter(|(_, op)| !op.label().is_empty())
            .map(|(index, op)| (op.label(), index))
            .collect()
    }

    pub fn listing(&self) -> Vec<InstructionRow> {
        self.operations()
            .enumerate()
            .map(|(index, op)| InstructionRow {
                number: index + 1,
                id: op.id(),
                kind: op.kind(),
                label: op.label().to_string(),
                text: op.instruction().to_string(),
                cycles: op.cycles(),
            })
            .collect()
    }

    /// The operation followed by each ancestor up to a source operation.
    pub fn provenance(&self, id: OpId) -> Vec<&Operation> {
        let mut chain = Vec::new();
        let mut current = self.operation(id);
        while let Some(op) = current {
            chain.push(op);
            current = op.parent().and_then(|parent| self.operation(parent));
        }
        chain
    }

    /// Visible operations produced (directly or transitively) from `id`.
    pub fn children(&self, id: OpId) -> Vec<&Operation> {
        self.operations()
            .filter(|op| op.id() != id && self.descends_from(op.id(), id))
            .collect()
    }

    pub(crate) fn descends_from(&self, id: OpId, ancestor: OpId) -> bool {
        let mut current = Some(id);
        while let Some(candidate) = current {
            if candidate == ancestor {
                return true;
            }
            current = self.operation(candidate).and_then(|op| op.parent());
        }
        false
    }

    /// Run with this program's own function table.
    pub fn run(&self, inputs: &[Value]) -> Result<RunOutcome, ExecutionError> {
        vm::run(self, inputs, &self.callable())
    }

    /// Operations held in the arena, visible or not.
    pub fn arena_len(&self) -> usize {
        self.arena.len()
    }

    pub(crate) fn order(&self) -> &[OpId] {
        &self.order
    }

    /// Drop arena entries that no visible operation reaches through its
    /// provenance chain. Survivors keep their relative order, so ids below the
    /// first dropped entry are unchanged.
    pub(crate) fn compact(&mut self) {
        let mut keep = vec![false; self.arena.len()];
        for id in &self.order {
            let mut current = Some(*id);
            while let Some(candidate) = current {
                let slot = candidate.0 as usize;
                if keep[slot] {
                    break;
                }
                keep[slot] = true;
                current = self.arena[slot].parent;
            }
        }
        if keep.iter().all(|kept| *kept) {
            return;
        }

        // parents precede their children, so a parent is remapped first
        let mut remap: Vec<Option<OpId>> = vec![None; self.arena.len()];
        let mut arena = Vec::with_capacity(keep.iter().filter(|kept| **kept).count());
        for (op, kept) in std::mem::take(&mut self.arena).into_iter().zip(keep) {
            if !kept {
                continue;
            }
            let id = OpId(arena.len() as u32);
            remap[op.id.0 as usize] = Some(id);
            let parent = op.parent.and_then(|parent| remap[parent.0 as usize]);
            arena.push(Operation { id, parent, ..op });
        }

        self.order = self
            .order
            .iter()
            .filter_map(|id| remap[id.0 as usize])
            .collect();
        self.arena = arena;
    }

    pub(crate) fn push_operation(
        &mut self,
        label: Label,
        instruction: Instruction,
        parent: Option<OpId>,
    ) -> OpId {
        let id = OpId(self.arena.len() as u32);
        let layer = parent
            .and_then(|parent| self.operation(parent))
            .map(|parent| parent.layer() + 1)
            .unwrap_or(0);
        let cycles = instruction.cycles();
        self.arena.push(Operation {
            id,
            label,
            instruction,
            cycles,
            parent,
            layer,
        });
        id
    }

    /// Replace the visible instruction list and recompute the identifier sets.
    pub(crate) fn set_order(&mut self, order: Vec<OpId>) {
        self.order = order;
        self.refresh_identifiers();
    }

    fn refresh_identifiers(&mut self) {
        let mut variables: BTreeSet<Variable> = self.inputs.iter().copied().collect();
        variables.insert(Variable::RESULT);
        let mut labels = BTreeSet::new();

        for id in &self.order {
            let op = &self.arena[id.0 as usize];
            variables.extend(op.instruction.variables());
            if !op.label.is_empty() {
                labels.insert(op.label);
            }
            if let Some(target) = op.instruction.target() {
                labels.insert(target);
            }
        }

        self.variables = variables;
        self.labels = labels;
    }
}

// ─── Builder ──────────────────────────────────────────────────

/// Assembles a source program (every operation at layer 0, no parent).
///
/// No structural validation happens here; unresolved labels and unknown
/// functions surface when the program is run or expanded.
#[derive(Debug, Default)]
pub struct ProgramBuilder {
    name: String,
    user_string: Option<String>,
    ops: Vec<(Label, Instruction)>,
    inputs: Option<Vec<Variable>>,
    functions: Option<FunctionTable>,
}

impl ProgramBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn user_string(mut self, user_string: impl Into<String>) -> Self {
        self.user_string = Some(user_string.into());
        self
    }

    /// Explicit calling convention. Defaults to the referenced `x` variables by index.
    pub fn inputs(mut self, inputs: Vec<Variable>) -> Self {
        self.inputs = Some(inputs);
        self
    }

    pub fn functions(mut self, functions: FunctionTable) -> Self {
        self.functions = Some(functions);
        self
    }

    pub fn push(self, instruction: Instruction) -> Self {
        self.push_labeled(Label::EMPTY, instruction)
    }

    pub fn push_labeled(mut self, label: Label, instruction: Instruction) -> Self {
        self.ops.push((label, instruction));
        self
    }

    pub fn build(self) -> Program {
        let inputs = self.inputs.unwrap_or_else(|| {
            let referenced: BTreeSet<Variable> = self
                .ops
                .iter()
                .flat_map(|(_, instruction)| instruction.variables())
                .filter(|var| var.is_input())
                .collect();
            referenced.into_iter().collect()
        });

        let mut program = Program {
            name: self.name,
            user_string: self.user_string,
            arena: Vec::with_capacity(self.ops.len()),
            order: Vec::new(),
            inputs,
            variables: BTreeSet::new(),
            labels: BTreeSet::new(),
            functions: self.functions,
        };

        let order = self
            .ops
            .into_iter()
            .map(|(label, instruction)| program.push_operation(label, instruction, None))
            .collect();
        program.set_order(order);
        program
    }
}
