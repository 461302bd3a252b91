use std::fmt::{self, Display};

pub type Number = f64;

/// Entries of magnitude below this are dropped from the tableau.
pub const ZERO_TOLERANCE: Number = 1e-12;
/// A sum is taken as zero if it is this small relative to its operands.
pub const CANCELLATION_TOLERANCE: Number = 1e-11;
/// Minimal distance to a bound for a variable to count as movable.
pub const SLACK_EPSILON: Number = 1e-10;

/// Converts a public bound value into the internal representation,
/// where infinite bounds are absent.
pub fn finite(value: Number) -> Option<Number> {
    value.is_finite().then_some(value)
}

/// Part of a tolerance that grows with the magnitude of the compared value.
pub const RELATIVE_TOLERANCE: Number = 1e-9;

/// Tolerance around `bound`: `tolerance` plus rounding proportional to the
/// magnitude of the bound.
pub fn margin(bound: Number, tolerance: Number) -> Number {
    tolerance + RELATIVE_TOLERANCE * bound.abs()
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Bounds {
    pub lower: Option<Number>,
    pub upper: Option<Number>,
}

impl Bounds {
    pub fn are_conflicting(&self, tolerance: Number) -> bool {
        matches!(
            (self.lower, self.upper),
            (Some(l), Some(u)) if l > u + margin(u, tolerance)
        )
    }

    pub fn contains(&self, value: Number, tolerance: Number) -> bool {
        self.lower.map_or(true, |l| value >= l - margin(l, tolerance))
            && self.upper.map_or(true, |u| value <= u + margin(u, tolerance))
    }

    /// Returns the bound `value` has to be moved to if it lies outside
    /// by more than the margin of `tolerance`.
    pub fn violation_target(&self, value: Number, tolerance: Number) -> Option<Number> {
        match *self {
            Bounds { lower: Some(l), .. } if value < l - margin(l, tolerance) => Some(l),
            Bounds { upper: Some(u), .. } if value > u + margin(u, tolerance) => Some(u),
            _ => None,
        }
    }

    /// Moves `value` inside the bounds without tolerance.
    pub fn clamp(&self, value: Number) -> Number {
        match *self {
            Bounds { lower: Some(l), .. } if value < l => l,
            Bounds { upper: Some(u), .. } if value > u => u,
            _ => value,
        }
    }

    pub fn format(&self, name: &str) -> String {
        let lower = self.lower.map_or("-inf".to_string(), |l| l.to_string());
        let upper = self.upper.map_or("inf".to_string(), |u| u.to_string());
        format!("{lower} <= {name} <= {upper}")
    }
}

impl Display for Bounds {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.format("_"))
    }
}
