use tracing::trace;

use crate::{
    bounds::{BoundConflict, BoundStore},
    error::{Result, SolverError},
    tableau::Tableau,
    types::Number,
};

/// Outcome of a feasibility restoration.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Feasibility {
    Feasible,
    /// `variable` cannot be brought inside its bounds.
    Infeasible { variable: usize },
}

/// Counters reported by the simplex engine.
#[derive(Clone, Copy, Debug, Default)]
pub struct PivotStats {
    pub pivots: usize,
    pub recomputations: usize,
}

/// Tableau together with the bounds and values of all its variables.
/// Cloning it yields a snapshot that can be restored on backtracking.
#[derive(Clone)]
pub struct LPSolver {
    tableau: Tableau,
    bounds: BoundStore,
    pivot_tolerance: Number,
    recompute_interval: usize,
    max_pivots: usize,
    pivots_since_recompute: usize,
    /// Basic values were updated incrementally since the last recomputation.
    values_dirty: bool,
}

impl LPSolver {
    pub fn new(
        tableau: Tableau,
        bounds: BoundStore,
        pivot_tolerance: Number,
        recompute_interval: usize,
        max_pivots: usize,
    ) -> LPSolver {
        debug_assert_eq!(tableau.num_variables(), bounds.len());
        let mut solver = LPSolver {
            tableau,
            bounds,
            pivot_tolerance,
            recompute_interval,
            max_pivots,
            pivots_since_recompute: 0,
            values_dirty: false,
        };
        solver.recompute_basic_values();
        solver
    }

    pub fn bounds(&self) -> &BoundStore {
        &self.bounds
    }
    pub fn value(&self, var: usize) -> Number {
        self.bounds.value(var)
    }
    pub fn values(&self) -> Vec<Number> {
        self.bounds.values().collect()
    }
    pub fn is_basic(&self, var: usize) -> bool {
        self.tableau.is_basic(var)
    }

    pub fn tighten_lower(
        &mut self,
        var: usize,
        value: Number,
    ) -> std::result::Result<bool, BoundConflict> {
        self.bounds.tighten_lower(var, value)
    }
    pub fn tighten_upper(
        &mut self,
        var: usize,
        value: Number,
    ) -> std::result::Result<bool, BoundConflict> {
        self.bounds.tighten_upper(var, value)
    }

    /// Brings every basic variable within its bounds by pivoting, or finds
    /// a basic variable for which this is impossible. Leaving and entering
    /// variables are chosen by Bland's rule (smallest index first), which
    /// rules out cycling.
    pub fn restore_feasibility(&mut self, stats: &mut PivotStats) -> Result<Feasibility> {
        if let Some(variable) = self.bounds.first_conflicting() {
            return Ok(Feasibility::Infeasible { variable });
        }
        self.correct_nonbasic();
        let mut pivots = 0;
        loop {
            if self.pivots_since_recompute >= self.recompute_interval {
                self.recompute_basic_values();
                stats.recomputations += 1;
            }
            let Some((basic, target)) = self.first_violated_basic() else {
                if !self.values_dirty {
                    return Ok(Feasibility::Feasible);
                }
                // Only trust values computed from scratch.
                self.recompute_basic_values();
                stats.recomputations += 1;
                continue;
            };
            let increasing = target > self.bounds.value(basic);
            let Some(entering) = self.replacement_var(basic, increasing) else {
                if self.values_dirty {
                    // The violation may be drift; check again on fresh values.
                    self.recompute_basic_values();
                    stats.recomputations += 1;
                    continue;
                }
                trace!("x{basic} cannot reach {target}");
                return Ok(Feasibility::Infeasible { variable: basic });
            };
            if pivots >= self.max_pivots {
                return Err(SolverError::PivotLimit(self.max_pivots));
            }
            pivots += 1;
            stats.pivots += 1;
            self.pivot_and_update(basic, target, entering)?;
        }
    }

    /// Sets a non-basic variable to `value` and updates the basic variables
    /// depending on it.
    pub fn update_nonbasic(&mut self, var: usize, value: Number) {
        debug_assert!(!self.tableau.is_basic(var));
        let diff = value - self.bounds.value(var);
        self.bounds.set_value(var, value);
        self.values_dirty = true;
        for (row, _, factor) in self.tableau.iterate_column(var) {
            let basic = self.tableau.basic_of_row(row);
            if basic != var {
                self.bounds
                    .set_value(basic, self.bounds.value(basic) + factor * diff);
            }
        }
    }

    /// Computes all basic values from the non-basic values, which removes
    /// drift accumulated by incremental updates.
    pub fn recompute_basic_values(&mut self) {
        for row in 0..self.tableau.rows() {
            let value = self.tableau.basic_value(row, &self.bounds);
            self.bounds.set_value(self.tableau.basic_of_row(row), value);
        }
        self.pivots_since_recompute = 0;
        self.values_dirty = false;
    }

    pub fn format(&self, name: &dyn Fn(usize) -> String) -> String {
        let formatted_variables = (0..self.bounds.len())
            .map(|var| {
                let kind = if self.tableau.is_basic(var) { "B" } else { "N" };
                format!("{kind} {}", self.bounds.format(var, &name(var)))
            })
            .collect::<Vec<_>>()
            .join("\n");
        let formatted_rows = (0..self.tableau.rows())
            .map(|row| self.tableau.format_row(row, name))
            .collect::<Vec<_>>()
            .join("\n");
        format!("{formatted_variables}\n{formatted_rows}\n")
    }
}

impl LPSolver {
    /// Moves non-basic variables inside their bounds.
    fn correct_nonbasic(&mut self) {
        for var in 0..self.bounds.len() {
            if self.tableau.is_basic(var) {
                continue;
            }
            let value = self.bounds.value(var);
            let clamped = self.bounds.bounds(var).clamp(value);
            if clamped != value {
                self.update_nonbasic(var, clamped);
            }
        }
    }

    /// Finds the basic variable with the smallest index that violates one
    /// of its bounds and returns it together with the violated bound.
    fn first_violated_basic(&self) -> Option<(usize, Number)> {
        self.tableau
            .basic_variables()
            .find_map(|var| self.bounds.out_of_bounds_target(var).map(|t| (var, t)))
    }

    /// Smallest-index non-basic variable of the row of `basic` that can move
    /// `basic` in the required direction. Coefficients not above the pivot
    /// tolerance are never pivoted on.
    fn replacement_var(&self, basic: usize, increasing: bool) -> Option<usize> {
        let row = self.tableau.row_of(basic)?;
        self.tableau
            .iterate_row(row)
            .filter(|&(_, column, factor)| {
                column != basic && factor.abs() > self.pivot_tolerance
            })
            .find(|&(_, column, factor)| {
                if (factor < 0.0) ^ increasing {
                    self.bounds.can_increase(column)
                } else {
                    self.bounds.can_decrease(column)
                }
            })
            .map(|(_, column, _)| column)
    }

    fn pivot_and_update(
        &mut self,
        old_basic: usize,
        target: Number,
        new_basic: usize,
    ) -> Result<()> {
        let row = self
            .tableau
            .row_of(old_basic)
            .ok_or_else(|| SolverError::Numerical(format!("x{old_basic} is not basic")))?;
        let factor = self.tableau.coefficient(row, new_basic);
        if factor == 0.0 {
            return Err(SolverError::Numerical(format!(
                "x{new_basic} does not occur in the row of x{old_basic}"
            )));
        }
        let theta = (target - self.bounds.value(old_basic)) / factor;
        let entering_value = self.bounds.value(new_basic) + theta;
        self.update_nonbasic(new_basic, entering_value);
        self.bounds.set_value(old_basic, target);
        self.tableau.pivot(old_basic, new_basic)?;
        self.pivots_since_recompute += 1;
        trace!("pivot: x{old_basic} leaves, x{new_basic} enters");
        Ok(())
    }
}
