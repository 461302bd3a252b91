use colored::Colorize;

use crate::types::{margin, Bounds, Number, SLACK_EPSILON};

/// Signals that a tightening made the bounds of `variable` cross.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BoundConflict {
    pub variable: usize,
}

#[derive(Clone, Debug, Default)]
struct Variable {
    value: Number,
    bounds: Bounds,
}

impl Variable {
    fn can_be_increased(&self) -> bool {
        self.bounds.upper.map_or(true, |u| self.value < u - SLACK_EPSILON)
    }
    fn can_be_decreased(&self) -> bool {
        self.bounds.lower.map_or(true, |l| self.value > l + SLACK_EPSILON)
    }
    fn format(&self, name: &str, tolerance: Number) -> String {
        let s = format!("{} := {}", self.bounds.format(name), self.value);
        if self.bounds.contains(self.value, tolerance) {
            s
        } else {
            format!("{}", s.red())
        }
    }
}

/// Lower and upper bound and current value of every variable.
#[derive(Clone, Debug)]
pub struct BoundStore {
    variables: Vec<Variable>,
    tolerance: Number,
}

impl BoundStore {
    pub fn new(count: usize, tolerance: Number) -> BoundStore {
        BoundStore {
            variables: vec![Variable::default(); count],
            tolerance,
        }
    }

    pub fn len(&self) -> usize {
        self.variables.len()
    }

    pub fn bounds(&self, var: usize) -> &Bounds {
        &self.variables[var].bounds
    }
    pub fn lower(&self, var: usize) -> Option<Number> {
        self.variables[var].bounds.lower
    }
    pub fn value(&self, var: usize) -> Number {
        self.variables[var].value
    }
    pub fn set_value(&mut self, var: usize, value: Number) {
        self.variables[var].value = value;
    }
    pub fn values(&self) -> impl Iterator<Item = Number> + '_ {
        self.variables.iter().map(|v| v.value)
    }

    /// Replaces the lower bound, used while setting up.
    pub fn set_lower(&mut self, var: usize, value: Option<Number>) {
        self.variables[var].bounds.lower = value;
    }
    /// Replaces the upper bound, used while setting up.
    pub fn set_upper(&mut self, var: usize, value: Option<Number>) {
        self.variables[var].bounds.upper = value;
    }

    /// Raises the lower bound to `value` unless it already is at least as
    /// large. Returns whether the bound changed. If the new bound exceeds
    /// the upper bound by more than the tolerance, it is still recorded
    /// and the conflict is reported.
    pub fn tighten_lower(&mut self, var: usize, value: Number) -> Result<bool, BoundConflict> {
        let tolerance = self.tolerance;
        let bounds = &mut self.variables[var].bounds;
        if bounds.lower.is_some_and(|l| value <= l) {
            return Ok(false);
        }
        match bounds.upper {
            Some(u) if value > u + margin(u, tolerance) => {
                bounds.lower = Some(value);
                Err(BoundConflict { variable: var })
            }
            Some(u) if value > u => {
                bounds.lower = Some(u);
                Ok(true)
            }
            _ => {
                bounds.lower = Some(value);
                Ok(true)
            }
        }
    }

    /// Counterpart of `tighten_lower`.
    pub fn tighten_upper(&mut self, var: usize, value: Number) -> Result<bool, BoundConflict> {
        let tolerance = self.tolerance;
        let bounds = &mut self.variables[var].bounds;
        if bounds.upper.is_some_and(|u| value >= u) {
            return Ok(false);
        }
        match bounds.lower {
            Some(l) if value < l - margin(l, tolerance) => {
                bounds.upper = Some(value);
                Err(BoundConflict { variable: var })
            }
            Some(l) if value < l => {
                bounds.upper = Some(l);
                Ok(true)
            }
            _ => {
                bounds.upper = Some(value);
                Ok(true)
            }
        }
    }

    /// Returns the bound the variable has to be moved to if its value
    /// violates it by more than the tolerance.
    pub fn out_of_bounds_target(&self, var: usize) -> Option<Number> {
        let v = &self.variables[var];
        v.bounds.violation_target(v.value, self.tolerance)
    }

    pub fn can_increase(&self, var: usize) -> bool {
        self.variables[var].can_be_increased()
    }
    pub fn can_decrease(&self, var: usize) -> bool {
        self.variables[var].can_be_decreased()
    }

    /// Returns the first variable whose bounds cross.
    pub fn first_conflicting(&self) -> Option<usize> {
        self.variables
            .iter()
            .position(|v| v.bounds.are_conflicting(self.tolerance))
    }

    pub fn format(&self, var: usize, name: &str) -> String {
        self.variables[var].format(name, self.tolerance)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn tightening_never_widens() {
        let mut store = BoundStore::new(1, 1e-7);
        assert_eq!(store.tighten_lower(0, 1.0), Ok(true));
        assert_eq!(store.tighten_lower(0, 0.0), Ok(false));
        assert_eq!(store.lower(0), Some(1.0));
        assert_eq!(store.tighten_upper(0, 5.0), Ok(true));
        assert_eq!(store.tighten_upper(0, 7.0), Ok(false));
        assert_eq!(store.bounds(0).upper, Some(5.0));
        assert_eq!(store.tighten_upper(0, 3.0), Ok(true));
        assert_eq!(store.bounds(0).upper, Some(3.0));
    }

    #[test]
    fn crossing_bounds() {
        let mut store = BoundStore::new(2, 1e-7);
        store.set_lower(0, Some(0.0));
        store.set_upper(0, Some(1.0));
        assert_eq!(store.tighten_lower(0, 2.0), Err(BoundConflict { variable: 0 }));
        assert_eq!(store.first_conflicting(), Some(0));

        store.set_upper(1, Some(1.0));
        assert_eq!(store.tighten_lower(1, 1.0 + 1e-9), Ok(true));
        assert_eq!(store.lower(1), Some(1.0));
        assert!(!store.bounds(1).are_conflicting(1e-7));
    }

    #[test]
    fn slack() {
        let mut store = BoundStore::new(1, 1e-7);
        store.set_lower(0, Some(0.0));
        store.set_upper(0, Some(1.0));
        assert!(store.can_increase(0));
        assert!(!store.can_decrease(0));
        store.set_value(0, 1.0);
        assert!(!store.can_increase(0));
        assert!(store.can_decrease(0));
        store.set_value(0, 3.0);
        assert_eq!(store.out_of_bounds_target(0), Some(1.0));
    }
}
