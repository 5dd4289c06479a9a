//! S Types - Level 1 Foundation Types
//!
//! Identifier model shared by the S-language engine and its front ends.
//!
//! ## Contents
//!
//! - [`Variable`]: `y` (the single result), `x{n}` inputs and `z{n}` work variables
//! - [`Label`]: numbered labels `L{n}` plus the `EMPTY` and `EXIT` sentinels
//! - [`Value`]: the integer domain of every variable binding
//!
//! ## Critical Rules
//!
//! 1. **IMMUTABLE** - identifiers never carry values; bindings live in the engine
//! 2. **ORDERED** - variables order by (kind, index) so snapshots display deterministically
//! 3. **SERIALIZABLE** - all types support serde
//! 4. **NO WORKSPACE DEPENDENCIES**

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Value domain of a variable. Decrement clamps at zero, so values never go negative.
pub type Value = u64;

// ============================================================================
// ERRORS
// ============================================================================

/// Failure to read an identifier back from its display form.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdentifierError {
    #[error("Invalid variable '{0}': expected y, x<n> or z<n>")]
    InvalidVariable(String),

    #[error("Invalid label '{0}': expected L<n>, EXIT or an empty string")]
    InvalidLabel(String),
}

// ============================================================================
// VARIABLES
// ============================================================================

/// Role of a variable. Declaration order drives display order: `y`, then inputs, then work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum VariableKind {
    Result,
    Input,
    Work,
}

impl VariableKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            VariableKind::Result => "result",
            VariableKind::Input => "input",
            VariableKind::Work => "work",
        }
    }
}

/// A named register of an S program. Serializes as its display form (`"x1"`),
/// so it can key JSON maps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct Variable {
    kind: VariableKind,
    index: u32,
}

impl Variable {
    /// The distinguished output variable `y`.
    pub const RESULT: Variable = Variable {
        kind: VariableKind::Result,
        index: 0,
    };

    /// Input variable `x{index}`.
    pub const fn input(index: u32) -> Self {
        Self {
            kind: VariableKind::Input,
            index,
        }
    }

    /// Work variable `z{index}`.
    pub const fn work(index: u32) -> Self {
        Self {
            kind: VariableKind::Work,
            index,
        }
    }

    pub fn kind(&self) -> VariableKind {
        self.kind
    }

    /// Index of an input or work variable; always 0 for `y`.
    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn is_result(&self) -> bool {
        self.kind == VariableKind::Result
    }

    pub fn is_input(&self) -> bool {
        self.kind == VariableKind::Input
    }

    pub fn is_work(&self) -> bool {
        self.kind == VariableKind::Work
    }
}

impl fmt::Display for Variable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            VariableKind::Result => write!(f, "y"),
            VariableKind::Input => write!(f, "x{}", self.index),
            VariableKind::Work => write!(f, "z{}", self.index),
        }
    }
}

impl FromStr for Variable {
    type Err = IdentifierError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed == "y" {
            return Ok(Variable::RESULT);
        }

        let invalid = || IdentifierError::InvalidVariable(s.to_string());
        let (kind, digits) = if let Some(rest) = trimmed.strip_prefix('x') {
            (VariableKind::Input, rest)
        } else if let Some(rest) = trimmed.strip_prefix('z') {
            (VariableKind::Work, rest)
        } else {
            return Err(invalid());
        };
        let index = digits.parse::<u32>().map_err(|_| invalid())?;
        Ok(Variable { kind, index })
    }
}

impl From<Variable> for String {
    fn from(var: Variable) -> Self {
        var.to_string()
    }
}

impl TryFrom<String> for Variable {
    type Error = IdentifierError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

// ============================================================================
// LABELS
// ============================================================================

/// Instruction label or jump target.
///
/// `Empty` marks an unlabeled instruction (control falls through in program
/// order); `Exit` is only meaningful as a jump target and terminates the run.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(into = "String", try_from = "String")]
pub enum Label {
    #[default]
    Empty,
    Numbered(u32),
    Exit,
}

impl Label {
    pub const EMPTY: Label = Label::Empty;
    pub const EXIT: Label = Label::Exit;

    pub const fn numbered(n: u32) -> Self {
        Label::Numbered(n)
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Label::Empty)
    }

    pub fn is_exit(&self) -> bool {
        matches!(self, Label::Exit)
    }

    /// Number of an `L{n}` label.
    pub fn number(&self) -> Option<u32> {
        match self {
            Label::Numbered(n) => Some(*n),
            _ => None,
        }
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Label::Empty => Ok(()),
            Label::Numbered(n) => write!(f, "L{}", n),
            Label::Exit => write!(f, "EXIT"),
        }
    }
}

impl FromStr for Label {
    type Err = IdentifierError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Ok(Label::Empty);
        }
        if trimmed.eq_ignore_ascii_case("exit") {
            return Ok(Label::Exit);
        }
        trimmed
            .strip_prefix('L')
            .and_then(|digits| digits.parse::<u32>().ok())
            .map(Label::Numbered)
            .ok_or_else(|| IdentifierError::InvalidLabel(s.to_string()))
    }
}

impl From<Label> for String {
    fn from(label: Label) -> Self {
        label.to_string()
    }
}

impl TryFrom<String> for Label {
    type Error = IdentifierError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}
