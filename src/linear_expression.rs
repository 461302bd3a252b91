use std::collections::BTreeMap;
use std::ops::{Add, Mul, Neg, Sub};

use crate::types::Number;

/// Sparse linear combination of variables, sorted by variable index.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct LinearExpression(Vec<(usize, Number)>);

impl LinearExpression {
    pub fn variable(var: usize) -> LinearExpression {
        LinearExpression(vec![(var, 1.0)])
    }
    pub fn coefficient(&self, var: usize) -> Number {
        self.0
            .binary_search_by_key(&var, |(v, _)| *v)
            .map_or(0.0, |i| self.0[i].1)
    }

    /// Value of the expression under `values`, together with the sum of the
    /// magnitudes of its terms (used to scale tolerances).
    pub fn evaluate(&self, values: &[Number]) -> (Number, Number) {
        self.0.iter().fold((0.0, 0.0), |(sum, magnitude), (var, f)| {
            let term = f * values[*var];
            (sum + term, magnitude + term.abs())
        })
    }

    pub fn format(expr: impl IntoIterator<Item = (String, Number)>) -> String {
        expr.into_iter()
            .enumerate()
            .map(|(i, (var, f))| {
                let joiner = if f < 0.0 {
                    " - "
                } else if f > 0.0 && i > 0 {
                    " + "
                } else {
                    " "
                };
                let factor = if f.abs() == 1.0 {
                    String::new()
                } else {
                    format!("{} ", f.abs())
                };
                format!("{joiner}{factor}{var}")
            })
            .collect::<Vec<_>>()
            .join("")
    }
}

impl FromIterator<(usize, Number)> for LinearExpression {
    /// Collects terms, merging duplicates and dropping zero coefficients.
    fn from_iter<I: IntoIterator<Item = (usize, Number)>>(iter: I) -> Self {
        let mut data = BTreeMap::new();
        for (var, f) in iter {
            *data.entry(var).or_insert(0.0) += f;
        }
        LinearExpression(data.into_iter().filter(|(_, f)| *f != 0.0).collect())
    }
}

impl IntoIterator for LinearExpression {
    type Item = (usize, Number);
    type IntoIter = <Vec<(usize, Number)> as IntoIterator>::IntoIter;
    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a> IntoIterator for &'a LinearExpression {
    type Item = &'a (usize, Number);
    type IntoIter = <&'a Vec<(usize, Number)> as IntoIterator>::IntoIter;
    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl Mul<LinearExpression> for Number {
    type Output = LinearExpression;
    fn mul(self, rhs: LinearExpression) -> Self::Output {
        rhs.into_iter().map(|(i, v)| (i, v * self)).collect()
    }
}

impl Add for LinearExpression {
    type Output = LinearExpression;
    fn add(self, rhs: Self) -> Self::Output {
        self.into_iter().chain(rhs).collect()
    }
}

impl Sub for LinearExpression {
    type Output = LinearExpression;
    fn sub(self, rhs: Self) -> Self::Output {
        self + -rhs
    }
}

impl Neg for LinearExpression {
    type Output = Self;

    fn neg(mut self) -> Self {
        for (_, value) in &mut self.0 {
            *value = -*value;
        }
        self
    }
}
