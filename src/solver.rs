use std::{collections::BTreeMap, path::Path};

use tracing::{debug, info};

use crate::{
    bounds::BoundStore,
    cancel::CancellationToken,
    config::SolverConfig,
    error::{Result, SolverError},
    linear_expression::LinearExpression,
    lp_solver::LPSolver,
    output::Output,
    relu::{relu_holds, ReluManager},
    search::{Outcome, Search},
    status::{self, FinalStatus, Statistics},
    tableau::Tableau,
    types::{finite, Bounds, Number},
};

/// Solver for linear equations over bounded real variables combined with
/// ReLU constraints `f = max(0, b)`.
///
/// The instance is described by bounds, tableau cells, basic variables and
/// ReLU pairs. Every call to [`Solver::solve`] works on a fresh copy of that
/// description, so a solver can be modified and solved again.
pub struct Solver {
    bounds: Vec<Bounds>,
    /// Non-zero cells by row and column.
    rows: BTreeMap<usize, BTreeMap<usize, Number>>,
    basic: Vec<bool>,
    relu_pairs: Vec<(usize, usize)>,
    config: SolverConfig,
    cancel: CancellationToken,
    output: Output,
    status: FinalStatus,
    assignment: Option<Vec<Number>>,
    error: Option<SolverError>,
    statistics: Statistics,
}

impl Solver {
    pub fn new(num_variables: usize) -> Solver {
        Solver::with_config(num_variables, SolverConfig::default())
    }

    pub fn with_config(num_variables: usize, config: SolverConfig) -> Solver {
        Solver {
            bounds: vec![Bounds::default(); num_variables],
            rows: BTreeMap::new(),
            basic: vec![false; num_variables],
            relu_pairs: vec![],
            config,
            cancel: CancellationToken::new(),
            output: Output::default(),
            status: FinalStatus::NotDone,
            assignment: None,
            error: None,
            statistics: Statistics::default(),
        }
    }

    pub fn num_variables(&self) -> usize {
        self.bounds.len()
    }

    /// Sets the lower bound of `var`, replacing any previous one.
    /// `-inf` removes it.
    pub fn set_lower_bound(&mut self, var: usize, value: Number) -> Result<()> {
        self.check_variable(var)?;
        if value.is_nan() || value == Number::INFINITY {
            return Err(SolverError::InvalidBound { var, value });
        }
        self.bounds[var].lower = finite(value);
        Ok(())
    }

    /// Sets the upper bound of `var`, replacing any previous one.
    /// `inf` removes it.
    pub fn set_upper_bound(&mut self, var: usize, value: Number) -> Result<()> {
        self.check_variable(var)?;
        if value.is_nan() || value == Number::NEG_INFINITY {
            return Err(SolverError::InvalidBound { var, value });
        }
        self.bounds[var].upper = finite(value);
        Ok(())
    }

    pub fn lower_bound(&self, var: usize) -> Result<Number> {
        self.check_variable(var)?;
        Ok(self.bounds[var].lower.unwrap_or(Number::NEG_INFINITY))
    }

    pub fn upper_bound(&self, var: usize) -> Result<Number> {
        self.check_variable(var)?;
        Ok(self.bounds[var].upper.unwrap_or(Number::INFINITY))
    }

    /// Sets the coefficient of `col` in the equation of row `row`, which
    /// reads `Σ cell(row, c) x_c = 0`. A zero coefficient removes the cell.
    pub fn initialize_cell(&mut self, row: usize, col: usize, coefficient: Number) -> Result<()> {
        self.check_variable(row)?;
        self.check_variable(col)?;
        if !coefficient.is_finite() {
            return Err(SolverError::InvalidCoefficient {
                row,
                col,
                value: coefficient,
            });
        }
        if coefficient == 0.0 {
            if let Some(cells) = self.rows.get_mut(&row) {
                cells.remove(&col);
                if cells.is_empty() {
                    self.rows.remove(&row);
                }
            }
        } else {
            self.rows.entry(row).or_default().insert(col, coefficient);
        }
        Ok(())
    }

    /// Declares `var` basic. Its row is the equation owned by it.
    pub fn mark_basic(&mut self, var: usize) -> Result<()> {
        self.check_variable(var)?;
        self.basic[var] = true;
        Ok(())
    }

    pub fn set_relu_pair(&mut self, b: usize, f: usize) -> Result<()> {
        self.check_variable(b)?;
        self.check_variable(f)?;
        let reason = if b == f {
            Some("input and output are the same variable")
        } else if self.relu_pairs.contains(&(b, f)) {
            Some("pair registered twice")
        } else {
            None
        };
        if let Some(reason) = reason {
            return Err(SolverError::InvalidReluPair {
                b,
                f,
                reason: reason.to_string(),
            });
        }
        self.relu_pairs.push((b, f));
        Ok(())
    }

    pub fn set_logging(&mut self, enabled: bool) {
        self.config.logging = enabled;
    }

    pub fn set_dump_states(&mut self, enabled: bool) {
        self.config.dump_states = enabled;
    }

    pub fn toggle_almost_broken_relu_elimination(&mut self, enabled: bool) {
        self.config.almost_broken_elimination = enabled;
    }

    pub fn config(&self) -> &SolverConfig {
        &self.config
    }

    pub fn config_mut(&mut self) -> &mut SolverConfig {
        &mut self.config
    }

    /// Token that stops a running [`Solver::solve`] when cancelled. The
    /// solver never resets it.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn output(&self) -> &Output {
        &self.output
    }

    pub fn set_output(&mut self, output: Output) {
        self.output = output;
    }

    pub fn solve(&mut self) -> FinalStatus {
        self.assignment = None;
        self.error = None;
        let mut statistics = Statistics::default();
        let outcome = self
            .search(&mut statistics)
            .and_then(|outcome| match outcome {
                Outcome::Sat(values) => self.verify(&values).map(|()| Outcome::Sat(values)),
                outcome => Ok(outcome),
            });
        self.statistics = statistics;
        self.status = match outcome {
            Ok(Outcome::Sat(mut values)) => {
                values.truncate(self.num_variables());
                self.assignment = Some(values);
                FinalStatus::Sat
            }
            Ok(Outcome::Unsat) => FinalStatus::Unsat,
            Ok(Outcome::Cancelled) => FinalStatus::NotDone,
            Err(err) => {
                debug!("solve failed: {err}");
                self.error = Some(err);
                FinalStatus::Error
            }
        };
        info!("{} ({})", self.status, self.statistics);
        status::report(
            &self.output,
            self.status,
            self.error.as_ref(),
            &self.statistics,
        );
        self.status
    }

    /// Solves with all solver output written to `path`. The previous output
    /// destination is restored afterwards.
    pub fn solve_with_output(&mut self, path: &Path) -> Result<FinalStatus> {
        let _capture = self.output.capture_to_file(path)?;
        Ok(self.solve())
    }

    pub fn status(&self) -> FinalStatus {
        self.status
    }

    /// Value of `var` in the solution. Only available after SAT.
    pub fn assignment(&self, var: usize) -> Option<Number> {
        self.assignment.as_ref()?.get(var).copied()
    }

    pub fn assignments(&self) -> Option<&[Number]> {
        self.assignment.as_deref()
    }

    /// The error of the last solve if it ended in ERROR.
    pub fn error(&self) -> Option<&SolverError> {
        self.error.as_ref()
    }

    pub fn statistics(&self) -> &Statistics {
        &self.statistics
    }
}

impl Solver {
    fn check_variable(&self, index: usize) -> Result<()> {
        if index < self.num_variables() {
            Ok(())
        } else {
            Err(SolverError::VariableOutOfRange {
                index,
                count: self.num_variables(),
            })
        }
    }

    fn search(&self, statistics: &mut Statistics) -> Result<Outcome> {
        self.config.validate()?;
        self.validate_setup()?;
        let (lp, relus) = self.build()?;
        debug!(
            "solving {} variables, {} rows, {} ReLU pairs",
            self.num_variables(),
            self.rows.len(),
            self.relu_pairs.len()
        );
        let mut search = Search::new(
            lp,
            relus,
            &self.config,
            &self.cancel,
            &self.output,
            self.num_variables(),
        );
        let outcome = search.run();
        *statistics = *search.statistics();
        outcome
    }

    fn validate_setup(&self) -> Result<()> {
        for (var, bounds) in self.bounds.iter().enumerate() {
            if let Bounds {
                lower: Some(lower),
                upper: Some(upper),
            } = *bounds
            {
                if bounds.are_conflicting(self.config.bound_tolerance) {
                    return Err(SolverError::ContradictoryBounds { var, lower, upper });
                }
            }
        }
        if let Some(&row) = self.rows.keys().find(|row| !self.basic[**row]) {
            return Err(SolverError::RowWithoutBasic(row));
        }
        if let Some(var) =
            (0..self.num_variables()).find(|v| self.basic[*v] && !self.rows.contains_key(v))
        {
            return Err(SolverError::BasicWithoutRow(var));
        }
        Ok(())
    }

    /// Creates the simplex state for a fresh search. Pair `k` gets the
    /// slack variable `n + k` with `s = f - b`, and `f >= 0, s >= 0`.
    fn build(&self) -> Result<(LPSolver, ReluManager)> {
        let n = self.num_variables();
        let total = n + self.relu_pairs.len();
        let mut bounds = BoundStore::new(total, self.config.bound_tolerance);
        for (var, b) in self.bounds.iter().enumerate() {
            bounds.set_lower(var, b.lower);
            bounds.set_upper(var, b.upper);
        }
        let mut relus = ReluManager::new(
            self.config.relu_tolerance,
            self.config
                .almost_broken_elimination
                .then_some(self.config.almost_broken_margin),
        );
        let mut slack_rows = vec![];
        for (k, &(b, f)) in self.relu_pairs.iter().enumerate() {
            let slack = n + k;
            let lower = bounds.lower(f).map_or(0.0, |l| l.max(0.0));
            bounds.set_lower(f, Some(lower));
            bounds.set_lower(slack, Some(0.0));
            relus.add_pair(b, f, slack);
            let equation = LinearExpression::variable(f)
                - LinearExpression::variable(b)
                - LinearExpression::variable(slack);
            slack_rows.push((slack, equation));
        }
        let rows = self
            .rows
            .iter()
            .map(|(row, cells)| {
                let equation = cells.iter().map(|(c, f)| (*c, *f)).collect::<LinearExpression>();
                (*row, equation)
            })
            .chain(slack_rows);
        let tableau = Tableau::build(total, rows, self.config.pivot_tolerance)?;
        let lp = LPSolver::new(
            tableau,
            bounds,
            self.config.pivot_tolerance,
            self.config.recompute_interval,
            self.config.max_pivots,
        );
        Ok((lp, relus))
    }

    /// Checks a solution against the declared equations and bounds and
    /// against the ReLU pairs.
    fn verify(&self, values: &[Number]) -> Result<()> {
        let tolerance = self.config.relu_tolerance;
        for (row, cells) in &self.rows {
            let equation: LinearExpression = cells.iter().map(|(c, f)| (*c, *f)).collect();
            let (sum, magnitude) = equation.evaluate(values);
            if sum.abs() > tolerance * magnitude.max(1.0) {
                return Err(SolverError::Numerical(format!(
                    "row x{row} is violated by {sum} in the solution"
                )));
            }
        }
        for (var, bounds) in self.bounds.iter().enumerate() {
            if !bounds.contains(values[var], tolerance) {
                return Err(SolverError::Numerical(format!(
                    "solution value {} of x{var} is outside {}",
                    values[var],
                    bounds.format(&format!("x{var}"))
                )));
            }
        }
        for &(b, f) in &self.relu_pairs {
            if !relu_holds(values[b], values[f], tolerance) {
                return Err(SolverError::Numerical(format!(
                    "ReLU pair (x{b}, x{f}) is violated in the solution: {} vs {}",
                    values[b], values[f]
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn setup_rejects_bad_input() {
        let mut s = Solver::new(2);
        assert!(matches!(
            s.set_lower_bound(2, 0.0),
            Err(SolverError::VariableOutOfRange { index: 2, count: 2 })
        ));
        assert!(matches!(
            s.set_upper_bound(0, Number::NAN),
            Err(SolverError::InvalidBound { var: 0, .. })
        ));
        assert!(matches!(
            s.initialize_cell(0, 1, Number::INFINITY),
            Err(SolverError::InvalidCoefficient { .. })
        ));
        assert!(matches!(
            s.set_relu_pair(1, 1),
            Err(SolverError::InvalidReluPair { .. })
        ));
        s.set_relu_pair(0, 1).unwrap();
        assert!(s.set_relu_pair(0, 1).is_err());
    }

    #[test]
    fn bounds_round_trip() {
        let mut s = Solver::new(1);
        assert_eq!(s.lower_bound(0).unwrap(), Number::NEG_INFINITY);
        s.set_lower_bound(0, -2.0).unwrap();
        s.set_upper_bound(0, 3.0).unwrap();
        assert_eq!(s.lower_bound(0).unwrap(), -2.0);
        assert_eq!(s.upper_bound(0).unwrap(), 3.0);
        s.set_upper_bound(0, Number::INFINITY).unwrap();
        assert_eq!(s.upper_bound(0).unwrap(), Number::INFINITY);
    }

    #[test]
    fn zero_cell_removes() {
        let mut s = Solver::new(2);
        s.set_output(Output::from_writer(std::io::sink()));
        s.initialize_cell(0, 1, 1.0).unwrap();
        s.initialize_cell(0, 1, 0.0).unwrap();
        assert!(s.rows.is_empty());
        assert_eq!(s.solve(), FinalStatus::Sat);
    }

    #[test]
    fn unowned_rows_are_malformed() {
        let mut s = Solver::new(2);
        s.set_output(Output::from_writer(std::io::sink()));
        s.initialize_cell(0, 0, 1.0).unwrap();
        s.initialize_cell(0, 1, -1.0).unwrap();
        assert_eq!(s.solve(), FinalStatus::Error);
        assert!(matches!(s.error(), Some(SolverError::RowWithoutBasic(0))));
        s.mark_basic(1).unwrap();
        assert_eq!(s.solve(), FinalStatus::Error);
        assert!(matches!(s.error(), Some(SolverError::RowWithoutBasic(0))));
        s.mark_basic(0).unwrap();
        assert_eq!(s.solve(), FinalStatus::Error);
        assert!(matches!(s.error(), Some(SolverError::BasicWithoutRow(1))));
    }
}
