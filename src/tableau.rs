use crate::{
    bounds::BoundStore,
    error::{Result, SolverError},
    linear_expression::LinearExpression,
    sparse_matrix::SparseMatrix,
    types::Number,
};

/// Linear equations in solved form: every row expresses its basic variable
/// as a combination of non-basic variables. The basic variable's own
/// coefficient is stored as -1, so every row reads `Σ a_j x_j = 0`.
#[derive(Clone, Default)]
pub struct Tableau {
    matrix: SparseMatrix<Number>,
    basic_variable_for_row: Vec<usize>,
    /// Mapping from variable id to the row it controls.
    row_of_basic: Vec<Option<usize>>,
}

impl Tableau {
    /// Builds the tableau from equations `Σ c_j x_j = 0`, each owned by a
    /// basic variable with a non-zero coefficient in it. Basic variables
    /// occurring in other rows are eliminated from them.
    pub fn build(
        num_variables: usize,
        rows: impl IntoIterator<Item = (usize, LinearExpression)>,
        pivot_tolerance: Number,
    ) -> Result<Tableau> {
        let mut tableau = Tableau {
            matrix: SparseMatrix::new(),
            basic_variable_for_row: vec![],
            row_of_basic: vec![None; num_variables],
        };
        for (basic, equation) in rows {
            if equation.coefficient(basic) == 0.0 {
                return Err(SolverError::MissingBasicCoefficient(basic));
            }
            let row = tableau.matrix.rows();
            tableau.matrix.append_row(equation.into_iter());
            tableau.basic_variable_for_row.push(basic);
            tableau.row_of_basic[basic] = Some(row);
        }
        debug_assert!(tableau.matrix.columns() <= num_variables);
        for row in 0..tableau.rows() {
            let basic = tableau.basic_variable_for_row[row];
            if !tableau.eliminate(row, basic, pivot_tolerance) {
                return Err(SolverError::DependentRow(basic));
            }
        }
        Ok(tableau)
    }

    pub fn rows(&self) -> usize {
        self.basic_variable_for_row.len()
    }
    pub fn num_variables(&self) -> usize {
        self.row_of_basic.len()
    }
    pub fn is_basic(&self, var: usize) -> bool {
        self.row_of_basic[var].is_some()
    }
    pub fn row_of(&self, var: usize) -> Option<usize> {
        self.row_of_basic[var]
    }
    pub fn basic_of_row(&self, row: usize) -> usize {
        self.basic_variable_for_row[row]
    }
    /// Basic variables in increasing index order.
    pub fn basic_variables(&self) -> impl Iterator<Item = usize> + '_ {
        self.row_of_basic
            .iter()
            .enumerate()
            .filter_map(|(var, row)| row.map(|_| var))
    }
    pub fn coefficient(&self, row: usize, col: usize) -> Number {
        self.matrix.get(row, col).unwrap_or(0.0)
    }
    /// `(row, column, coefficient)` in increasing column order.
    pub fn iterate_row(&self, row: usize) -> impl Iterator<Item = (usize, usize, Number)> + '_ {
        self.matrix.iterate_row(row)
    }
    pub fn iterate_column(&self, col: usize) -> impl Iterator<Item = (usize, usize, Number)> + '_ {
        self.matrix.iterate_column(col)
    }

    /// Value of the basic variable of `row` computed from the current
    /// values of the non-basic variables.
    pub fn basic_value(&self, row: usize, bounds: &BoundStore) -> Number {
        let basic = self.basic_variable_for_row[row];
        self.matrix
            .iterate_row(row)
            .filter(|(_, col, _)| *col != basic)
            .map(|(_, col, f)| f * bounds.value(col))
            .sum()
    }

    /// Makes `entering` the basic variable of the row currently owned by
    /// `leaving`.
    pub fn pivot(&mut self, leaving: usize, entering: usize) -> Result<()> {
        let row = self.row_of_basic[leaving].ok_or_else(|| {
            SolverError::Numerical(format!("pivot on non-basic variable x{leaving}"))
        })?;
        if !self.eliminate(row, entering, 0.0) {
            return Err(SolverError::Numerical(format!(
                "x{entering} does not occur in the row of x{leaving}"
            )));
        }
        self.row_of_basic[leaving] = None;
        self.row_of_basic[entering] = Some(row);
        self.basic_variable_for_row[row] = entering;
        Ok(())
    }

    pub fn format_row(&self, row: usize, name: &dyn Fn(usize) -> String) -> String {
        let basic = self.basic_variable_for_row[row];
        let nonbasic = LinearExpression::format(
            self.matrix
                .iterate_row(row)
                .filter(|(_, col, _)| *col != basic)
                .map(|(_, col, f)| (name(col), f)),
        );
        format!("{:>4} ={nonbasic}", name(basic))
    }

    /// Scales `row` so that `var` has coefficient -1 and removes `var` from
    /// all other rows. Returns false if the coefficient of `var` is not
    /// larger than `min_magnitude`.
    fn eliminate(&mut self, row: usize, var: usize, min_magnitude: Number) -> bool {
        let pivot = self.coefficient(row, var);
        if pivot == 0.0 || pivot.abs() <= min_magnitude {
            return false;
        }
        if pivot != -1.0 {
            self.matrix.multiply_row_by_factor(row, -1.0 / pivot);
        }
        self.matrix.set(row, var, -1.0);
        let factors = self
            .matrix
            .iterate_column(var)
            .filter(|(r, _, _)| *r != row)
            .map(|(r, _, f)| (r, f))
            .collect::<Vec<_>>();
        for (target, factor) in factors {
            self.matrix.add_multiple_of_row(row, target, factor);
            self.matrix.set(target, var, 0.0);
        }
        true
    }
}
