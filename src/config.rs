use crate::error::{Result, SolverError};
use crate::relu::Phase;
use crate::types::Number;

/// Configuration of a solver instance.
#[derive(Debug, Clone)]
pub struct SolverConfig {
    /// Verbose tracing of every search step.
    pub logging: bool,
    /// Write the tableau to the solver output on every split and backtrack.
    pub dump_states: bool,
    /// Fix ReLU pairs whose bounds are within `almost_broken_margin` of
    /// forcing a phase. Approximate, hence off by default.
    pub almost_broken_elimination: bool,
    pub almost_broken_margin: Number,
    /// Allowed violation of a variable bound.
    pub bound_tolerance: Number,
    /// Allowed difference between f and max(0, b) for a satisfied pair.
    pub relu_tolerance: Number,
    /// Pivot coefficients below this are only used as a last resort.
    pub pivot_tolerance: Number,
    /// Basic values are recomputed from scratch after this many pivots.
    pub recompute_interval: usize,
    /// Upper limit of pivots within one feasibility restoration.
    pub max_pivots: usize,
    /// How often a violated pair may be repaired by updating a value
    /// before it is split on. Zero splits immediately.
    pub repair_threshold: usize,
    /// Phase tried first on a split.
    pub first_phase: Phase,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            logging: false,
            dump_states: false,
            almost_broken_elimination: false,
            almost_broken_margin: 1e-4,
            bound_tolerance: 1e-7,
            relu_tolerance: 1e-5,
            pivot_tolerance: 1e-9,
            recompute_interval: 100,
            max_pivots: 1_000_000,
            repair_threshold: 5,
            first_phase: Phase::Inactive,
        }
    }
}

impl SolverConfig {
    pub fn validate(&self) -> Result<()> {
        let tolerances = [
            ("almost_broken_margin", self.almost_broken_margin),
            ("bound_tolerance", self.bound_tolerance),
            ("relu_tolerance", self.relu_tolerance),
            ("pivot_tolerance", self.pivot_tolerance),
        ];
        if let Some((name, value)) = tolerances
            .iter()
            .find(|(_, v)| !v.is_finite() || *v < 0.0)
        {
            return Err(SolverError::InvalidConfig(format!(
                "{name} must be a non-negative number, got {value}"
            )));
        }
        if self.relu_tolerance < self.bound_tolerance {
            return Err(SolverError::InvalidConfig(
                "relu_tolerance must not be smaller than bound_tolerance".to_string(),
            ));
        }
        if self.recompute_interval == 0 || self.max_pivots == 0 {
            return Err(SolverError::InvalidConfig(
                "recompute_interval and max_pivots must be positive".to_string(),
            ));
        }
        if self.first_phase == Phase::Undetermined {
            return Err(SolverError::InvalidConfig(
                "first_phase has to be active or inactive".to_string(),
            ));
        }
        Ok(())
    }
}
