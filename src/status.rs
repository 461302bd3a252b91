use std::fmt::{self, Display};

use crate::{error::SolverError, output::Output};

/// Outcome of a solve.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum FinalStatus {
    Sat,
    Unsat,
    Error,
    /// Cancelled, or not solved yet.
    #[default]
    NotDone,
}

impl Display for FinalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FinalStatus::Sat => write!(f, "SAT"),
            FinalStatus::Unsat => write!(f, "UNSAT"),
            FinalStatus::Error => write!(f, "ERROR"),
            FinalStatus::NotDone => write!(f, "NOT_DONE"),
        }
    }
}

/// Counters of one solve.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Statistics {
    /// Iterations of the search loop.
    pub iterations: usize,
    pub pivots: usize,
    /// Recomputations of basic values from scratch.
    pub recomputations: usize,
    pub conflicts: usize,
    pub eliminations: usize,
    pub repairs: usize,
    pub splits: usize,
    pub backtracks: usize,
    pub max_depth: usize,
}

impl Display for Statistics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "iterations: {}, pivots: {}, recomputations: {}, conflicts: {}, \
             eliminations: {}, repairs: {}, splits: {}, backtracks: {}, max depth: {}",
            self.iterations,
            self.pivots,
            self.recomputations,
            self.conflicts,
            self.eliminations,
            self.repairs,
            self.splits,
            self.backtracks,
            self.max_depth
        )
    }
}

/// Writes the human-readable result of a solve.
pub fn report(
    output: &Output,
    status: FinalStatus,
    error: Option<&SolverError>,
    statistics: &Statistics,
) {
    match (status, error) {
        (FinalStatus::Sat, _) => output.line("Solution found!\n"),
        (FinalStatus::Unsat, _) => output.line("Can't solve!"),
        (FinalStatus::Error, Some(err)) => {
            output.line(&format!("Error! Code: {}. Message: {err}", err.code()))
        }
        (FinalStatus::Error, None) => output.line("Error!"),
        (FinalStatus::NotDone, _) => output.line("Search interrupted"),
    }
    output.line(&format!("Statistics: {statistics}"));
}
