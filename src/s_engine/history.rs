//! Run statistics kept across runs of a session (in memory only).

use chrono::{DateTime, Utc};
use s_types::{Value, Variable};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::s_engine::program::Program;
use crate::s_engine::vm::RunOutcome;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunRecord {
    /// 1-based, in recording order.
    pub number: usize,
    pub run_id: Uuid,
    /// Degree of the program as it was run.
    pub degree: u32,
    /// Declared inputs with the values they were bound to.
    pub inputs: Vec<(Variable, Value)>,
    pub result: Value,
    pub cycles: u64,
    pub executed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default)]
pub struct RunHistory {
    records: Vec<RunRecord>,
}

impl RunHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a record for a completed run of `program`.
    pub fn record(
        &mut self,
        program: &Program,
        inputs: &[Value],
        outcome: &RunOutcome,
    ) -> &RunRecord {
        let bound = program
            .inputs()
            .iter()
            .enumerate()
            .map(|(i, var)| (*var, inputs.get(i).copied().unwrap_or(0)))
            .collect();
        let number = self.records.len() + 1;
        self.records.push(RunRecord {
            number,
            run_id: Uuid::new_v4(),
            degree: program.degree(),
            inputs: bound,
            result: outcome.result,
            cycles: outcome.cycles,
            executed_at: Utc::now(),
        });
        &self.records[number - 1]
    }

    pub fn records(&self) -> &[RunRecord] {
        &self.records
    }

    pub fn last(&self) -> Option<&RunRecord> {
        self.records.last()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn clear(&mut self) {
        self.records.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::s_engine::instruction::Instruction;
    use crate::s_engine::program::ProgramBuilder;

    #[test]
    fn test_records_are_numbered_and_bind_inputs() {
        let program = ProgramBuilder::new("copy")
            .push(Instruction::Assignment {
                dst: Variable::RESULT,
                src: Variable::input(1),
            })
            .push(Instruction::Neutral {
                var: Variable::input(2),
            })
            .build();
        let mut history = RunHistory::new();

        let first = program.run(&[3]).unwrap();
        history.record(&program, &[3], &first);
        let second = program.run(&[5, 1]).unwrap();
        let record = history.record(&program, &[5, 1], &second).clone();

        assert_eq!(history.len(), 2);
        assert_eq!(history.records()[0].number, 1);
        assert_eq!(
            history.records()[0].inputs,
            vec![(Variable::input(1), 3), (Variable::input(2), 0)]
        );
        assert_eq!(record.number, 2);
        assert_eq!(record.result, 5);
        assert_eq!(record.cycles, 4);
        assert_eq!(record.degree, 2);
        assert_ne!(history.records()[0].run_id, record.run_id);
    }
}
