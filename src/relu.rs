//! ReLU constraints `f = max(0, b)`.
//!
//! Every pair owns a slack variable `s = f - b`. Together with `f >= 0` and
//! `s >= 0`, which hold for every ReLU, fixing a phase only tightens bounds:
//! the active phase adds `b >= 0, s <= 0`, the inactive phase `b <= 0, f <= 0`.

use std::fmt::{self, Display};

use crate::{
    bounds::{BoundConflict, BoundStore},
    lp_solver::LPSolver,
    types::{margin, Number},
};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Phase {
    #[default]
    Undetermined,
    /// f = b, b >= 0
    Active,
    /// f = 0, b <= 0
    Inactive,
}

impl Phase {
    /// The other fixed phase.
    pub fn alternate(self) -> Phase {
        match self {
            Phase::Active => Phase::Inactive,
            Phase::Inactive => Phase::Active,
            Phase::Undetermined => Phase::Undetermined,
        }
    }
}

impl Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Undetermined => write!(f, "undetermined"),
            Phase::Active => write!(f, "active"),
            Phase::Inactive => write!(f, "inactive"),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ReluPair {
    pub b: usize,
    pub f: usize,
    pub slack: usize,
    pub phase: Phase,
}

/// Classification of all pairs against the current assignment and bounds.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct ReluCheck {
    /// Undetermined pairs whose bounds force a phase.
    pub eliminations: Vec<(usize, Phase)>,
    /// Undetermined pairs that are violated and could go either way.
    pub violated: Vec<usize>,
    /// Fixed pairs that are violated, which only numerical trouble explains.
    pub broken_fixed: Vec<usize>,
}

impl ReluCheck {
    pub fn all_satisfied(&self) -> bool {
        self.eliminations.is_empty() && self.violated.is_empty() && self.broken_fixed.is_empty()
    }
}

pub struct ReluManager {
    pairs: Vec<ReluPair>,
    /// Number of value repairs per pair during the current solve.
    repairs: Vec<usize>,
    tolerance: Number,
    almost_broken_margin: Option<Number>,
}

impl ReluManager {
    pub fn new(tolerance: Number, almost_broken_margin: Option<Number>) -> ReluManager {
        ReluManager {
            pairs: vec![],
            repairs: vec![],
            tolerance,
            almost_broken_margin,
        }
    }

    pub fn add_pair(&mut self, b: usize, f: usize, slack: usize) -> usize {
        self.pairs.push(ReluPair {
            b,
            f,
            slack,
            phase: Phase::Undetermined,
        });
        self.repairs.push(0);
        self.pairs.len() - 1
    }

    pub fn pairs(&self) -> &[ReluPair] {
        &self.pairs
    }

    pub fn phases(&self) -> Vec<Phase> {
        self.pairs.iter().map(|p| p.phase).collect()
    }

    pub fn restore_phases(&mut self, phases: &[Phase]) {
        for (pair, phase) in self.pairs.iter_mut().zip(phases) {
            pair.phase = *phase;
        }
    }

    pub fn is_satisfied(&self, index: usize, lp: &LPSolver) -> bool {
        let pair = &self.pairs[index];
        relu_holds(lp.value(pair.b), lp.value(pair.f), self.tolerance)
    }

    pub fn check(&self, lp: &LPSolver) -> ReluCheck {
        let mut check = ReluCheck::default();
        for (index, pair) in self.pairs.iter().enumerate() {
            if pair.phase != Phase::Undetermined {
                if !self.is_satisfied(index, lp) {
                    check.broken_fixed.push(index);
                }
            } else if let Some(phase) = self.forced_phase(pair, lp.bounds()) {
                check.eliminations.push((index, phase));
            } else if !self.is_satisfied(index, lp) {
                check.violated.push(index);
            }
        }
        check
    }

    /// Fixes the phase of a pair for the rest of the current branch by
    /// tightening bounds.
    pub fn fix_phase(
        &mut self,
        index: usize,
        phase: Phase,
        lp: &mut LPSolver,
    ) -> Result<(), BoundConflict> {
        let pair = &mut self.pairs[index];
        pair.phase = phase;
        match phase {
            Phase::Active => {
                lp.tighten_lower(pair.b, 0.0)?;
                lp.tighten_upper(pair.slack, 0.0)?;
            }
            Phase::Inactive => {
                lp.tighten_upper(pair.f, 0.0)?;
                lp.tighten_upper(pair.b, 0.0)?;
            }
            Phase::Undetermined => {}
        }
        Ok(())
    }

    /// Tries to satisfy a violated pair by moving a non-basic `f` or `b` to
    /// the value the other one demands. Each pair gets at most `threshold`
    /// repairs; afterwards the search has to split on it.
    pub fn repair(&mut self, index: usize, lp: &mut LPSolver, threshold: usize) -> bool {
        if self.repairs[index] >= threshold {
            return false;
        }
        let pair = self.pairs[index];
        let b = lp.value(pair.b);
        let f = lp.value(pair.f);
        let fits = |var: usize, target: Number| lp.bounds().bounds(var).contains(target, 0.0);
        let update = if !lp.is_basic(pair.f) && fits(pair.f, b.max(0.0)) {
            Some((pair.f, b.max(0.0)))
        } else if !lp.is_basic(pair.b) {
            let target = if f > 0.0 { f } else { b.min(0.0) };
            fits(pair.b, target).then_some((pair.b, target))
        } else {
            None
        };
        match update {
            Some((var, target)) => {
                lp.update_nonbasic(var, target);
                self.repairs[index] += 1;
                true
            }
            None => false,
        }
    }

    fn forced_phase(&self, pair: &ReluPair, bounds: &BoundStore) -> Option<Phase> {
        let b = bounds.bounds(pair.b);
        let f = bounds.bounds(pair.f);
        let slack = bounds.bounds(pair.slack);
        if b.lower.is_some_and(|l| l >= 0.0)
            || f.lower.is_some_and(|l| l > 0.0)
            || slack.upper.is_some_and(|u| u <= 0.0)
        {
            return Some(Phase::Active);
        }
        if b.upper.is_some_and(|u| u <= 0.0)
            || f.upper.is_some_and(|u| u <= 0.0)
            || slack.lower.is_some_and(|l| l > 0.0)
        {
            return Some(Phase::Inactive);
        }
        let margin = self.almost_broken_margin?;
        if b.lower.is_some_and(|l| l >= -margin) {
            Some(Phase::Active)
        } else if b.upper.is_some_and(|u| u <= margin) {
            Some(Phase::Inactive)
        } else {
            None
        }
    }
}

/// Whether `f = max(0, b)` up to `tolerance` and rounding proportional to
/// the magnitude of the values.
pub fn relu_holds(b: Number, f: Number, tolerance: Number) -> bool {
    (f - b.max(0.0)).abs() <= margin(b.abs().max(f.abs()), tolerance)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{linear_expression::LinearExpression, lp_solver::Feasibility, tableau::Tableau};

    /// b = x0, f = x1, slack x2 = f - b
    fn setup(b_lower: Number, b_upper: Number, margin: Option<Number>) -> (ReluManager, LPSolver) {
        let row: LinearExpression = vec![(0, -1.0), (1, 1.0), (2, -1.0)].into_iter().collect();
        let tableau = Tableau::build(3, [(2, row)], 1e-9).unwrap();
        let mut bounds = BoundStore::new(3, 1e-7);
        bounds.set_lower(0, Some(b_lower));
        bounds.set_upper(0, Some(b_upper));
        bounds.set_lower(1, Some(0.0));
        bounds.set_lower(2, Some(0.0));
        let lp = LPSolver::new(tableau, bounds, 1e-9, 100, 1000);
        let mut relus = ReluManager::new(1e-5, margin);
        relus.add_pair(0, 1, 2);
        (relus, lp)
    }

    #[test]
    fn bounds_force_phases() {
        let (relus, lp) = setup(1.0, 2.0, None);
        assert_eq!(relus.check(&lp).eliminations, vec![(0, Phase::Active)]);
        let (relus, lp) = setup(-2.0, -1.0, None);
        assert_eq!(relus.check(&lp).eliminations, vec![(0, Phase::Inactive)]);
        let (relus, lp) = setup(-1.0, 1.0, None);
        assert!(relus.check(&lp).all_satisfied());
    }

    #[test]
    fn almost_broken() {
        let (relus, lp) = setup(-1e-5, 1.0, None);
        assert!(relus.check(&lp).eliminations.is_empty());
        let (relus, lp) = setup(-1e-5, 1.0, Some(1e-4));
        assert_eq!(relus.check(&lp).eliminations, vec![(0, Phase::Active)]);
        let (relus, lp) = setup(-1.0, 1e-5, Some(1e-4));
        assert_eq!(relus.check(&lp).eliminations, vec![(0, Phase::Inactive)]);
    }

    #[test]
    fn violation_and_fix() {
        let (mut relus, mut lp) = setup(-1.0, 1.0, None);
        lp.update_nonbasic(0, 0.5);
        let check = relus.check(&lp);
        assert_eq!(check.violated, vec![0]);
        assert!(check.eliminations.is_empty());

        relus.fix_phase(0, Phase::Active, &mut lp).unwrap();
        assert_eq!(relus.phases(), vec![Phase::Active]);
        assert_eq!(
            lp.restore_feasibility(&mut Default::default()).unwrap(),
            Feasibility::Feasible
        );
        assert!(relus.is_satisfied(0, &lp));
        assert!(relus.check(&lp).all_satisfied());

        relus.restore_phases(&[Phase::Undetermined]);
        assert_eq!(relus.pairs()[0].phase, Phase::Undetermined);
    }

    #[test]
    fn inactive_phase_conflicts_with_positive_input() {
        let (mut relus, mut lp) = setup(0.5, 1.0, None);
        assert_eq!(
            relus.fix_phase(0, Phase::Inactive, &mut lp),
            Err(BoundConflict { variable: 0 })
        );
    }

    #[test]
    fn repair_is_limited() {
        let (mut relus, mut lp) = setup(-1.0, 1.0, None);
        lp.update_nonbasic(0, 0.5);
        assert!(relus.repair(0, &mut lp, 1));
        assert_eq!(lp.value(1), 0.5);
        assert!(relus.is_satisfied(0, &lp));
        lp.update_nonbasic(0, 0.75);
        assert!(!relus.repair(0, &mut lp, 1));
    }

    #[test]
    fn tolerance_scales_with_magnitude() {
        let (mut relus, mut lp) = setup(-1e8, 1e8, None);
        relus.fix_phase(0, Phase::Active, &mut lp).unwrap();
        lp.update_nonbasic(0, 9211673.169999998);
        lp.update_nonbasic(1, 9211673.170055212);
        assert!(relus.is_satisfied(0, &lp));
        assert!(relus.check(&lp).all_satisfied());

        lp.update_nonbasic(1, 9212673.17);
        assert_eq!(relus.check(&lp).broken_fixed, vec![0]);

        assert!(relu_holds(-3.0, 5e-6, 1e-5));
        assert!(!relu_holds(-3.0, 5e-5, 1e-5));
    }
}
