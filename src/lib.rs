//! S-Emulator - interpreter and macro expander for the S register-machine language
//!
//! Programs are lists of labeled instructions over non-negative integer
//! variables (`y`, `x1..`, `z1..`). Synthetic instructions are macros over
//! four primitives and can be expanded to any degree and collapsed back.
//!
//! ## Architecture
//! Source program -> Program (operation arena) -> expand / collapse -> VM run -> Trace
//!
//! ## Quick Start
//!
//! ```rust
//! use s_emulator::s_engine::{self, Instruction, ProgramBuilder};
//! use s_emulator::Variable;
//!
//! let program = ProgramBuilder::new("Successor")
//!     .push(Instruction::Assignment { dst: Variable::RESULT, src: Variable::input(1) })
//!     .push(Instruction::Increase { var: Variable::RESULT })
//!     .build();
//!
//! let outcome = s_engine::run(&program, &[4]).unwrap();
//! assert_eq!(outcome.result, 5);
//!
//! let basic = s_engine::expand_to_degree(&program, s_engine::degree(&program)).unwrap();
//! assert!(basic.operations().all(|op| op.instruction().is_basic()));
//! assert_eq!(s_engine::run(&basic, &[4]).unwrap().result, 5);
//! ```

// Engine configuration and tracing bootstrap
pub mod config;

// Instruction set, programs, expansion and execution
pub mod s_engine;

pub use config::EngineConfig;
pub use s_types::{IdentifierError, Label, Value, Variable, VariableKind};
