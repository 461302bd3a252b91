//! Error types of the solver.

use thiserror::Error;

use crate::types::Number;

/// Everything that can make a solve end in ERROR, plus setup-time
/// rejections. Local conflicts are not errors: they are resolved by
/// backtracking.
#[derive(Debug, Error)]
pub enum SolverError {
    #[error("variable x{index} out of range (the solver has {count} variables)")]
    VariableOutOfRange { index: usize, count: usize },

    #[error("invalid bound {value} for x{var}")]
    InvalidBound { var: usize, value: Number },

    #[error("invalid coefficient {value} at row x{row}, column x{col}")]
    InvalidCoefficient { row: usize, col: usize, value: Number },

    #[error("contradictory bounds for x{var}: lower {lower} exceeds upper {upper}")]
    ContradictoryBounds { var: usize, lower: Number, upper: Number },

    #[error("row x{0} is not owned by a basic variable")]
    RowWithoutBasic(usize),

    #[error("basic variable x{0} has no row")]
    BasicWithoutRow(usize),

    #[error("basic variable x{0} does not occur in its own row")]
    MissingBasicCoefficient(usize),

    #[error("row x{0} is linearly dependent on the other rows")]
    DependentRow(usize),

    #[error("invalid ReLU pair (b: x{b}, f: x{f}): {reason}")]
    InvalidReluPair { b: usize, f: usize, reason: String },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("more than {0} pivots without restoring feasibility")]
    PivotLimit(usize),

    #[error("numerical failure: {0}")]
    Numerical(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("parse error on line {line}: {message}")]
    Parse { line: usize, message: String },
}

impl SolverError {
    /// Stable numeric code, reported together with the message.
    pub fn code(&self) -> u32 {
        match self {
            SolverError::VariableOutOfRange { .. } => 1,
            SolverError::InvalidBound { .. } => 2,
            SolverError::InvalidCoefficient { .. } => 3,
            SolverError::ContradictoryBounds { .. } => 4,
            SolverError::RowWithoutBasic(_) => 5,
            SolverError::BasicWithoutRow(_) => 6,
            SolverError::MissingBasicCoefficient(_) => 7,
            SolverError::DependentRow(_) => 8,
            SolverError::InvalidReluPair { .. } => 9,
            SolverError::InvalidConfig(_) => 10,
            SolverError::PivotLimit(_) => 20,
            SolverError::Numerical(_) => 21,
            SolverError::Io(_) => 30,
            SolverError::Parse { .. } => 31,
        }
    }

    /// True if the query itself is unusable, as opposed to a failure while
    /// searching. Such queries have not been shown to be infeasible.
    pub fn is_malformed_input(&self) -> bool {
        matches!(self.code(), 1..=9 | 31)
    }
}

pub type Result<T> = std::result::Result<T, SolverError>;
