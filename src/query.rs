//! Line-based query format.
//!
//! ```text
//! c x2 = x0 + x1, x3 = max(0, x2)
//! p relu 4
//! lb 0 -1
//! ub 0 1
//! cell 2 0 1
//! cell 2 1 1
//! cell 2 2 -1
//! basic 2
//! relu 2 3
//! ```
//!
//! Lines starting with `c` or `#` are comments. Bounds accept `inf` and
//! `-inf`.

use std::str::FromStr;

use crate::{
    error::{Result, SolverError},
    solver::Solver,
};

/// Largest number of variables a query may declare.
pub const MAX_VARIABLES: usize = 1 << 20;

pub fn parse_query(input: &str) -> Result<Solver> {
    let mut solver: Option<Solver> = None;
    for (index, line) in input.lines().enumerate() {
        let fields = line.split_whitespace().collect::<Vec<_>>();
        let Some(&command) = fields.first() else {
            continue;
        };
        if command == "c" || command.starts_with('#') {
            continue;
        }
        let error = |message: String| SolverError::Parse {
            line: index + 1,
            message,
        };
        match solver.as_mut() {
            None if command == "p" => {
                if fields.get(1) != Some(&"relu") || fields.len() != 3 {
                    return Err(error("expected \"p relu <variables>\"".to_string()));
                }
                let count: usize = field(&fields, 2).map_err(error)?;
                if count > MAX_VARIABLES {
                    return Err(error(format!(
                        "{count} variables exceed the limit of {MAX_VARIABLES}"
                    )));
                }
                solver = Some(Solver::new(count));
            }
            None => return Err(error("expected problem line first".to_string())),
            Some(solver) => {
                apply(solver, &fields).map_err(error)?;
            }
        }
    }
    solver.ok_or_else(|| SolverError::Parse {
        line: input.lines().count(),
        message: "missing problem line".to_string(),
    })
}

fn apply(solver: &mut Solver, fields: &[&str]) -> std::result::Result<(), String> {
    let arity = |n: usize| {
        if fields.len() == n + 1 {
            Ok(())
        } else {
            Err(format!("\"{}\" takes {n} arguments", fields[0]))
        }
    };
    let result = match fields[0] {
        "lb" => {
            arity(2)?;
            solver.set_lower_bound(field(fields, 1)?, field(fields, 2)?)
        }
        "ub" => {
            arity(2)?;
            solver.set_upper_bound(field(fields, 1)?, field(fields, 2)?)
        }
        "cell" => {
            arity(3)?;
            solver.initialize_cell(field(fields, 1)?, field(fields, 2)?, field(fields, 3)?)
        }
        "basic" => {
            arity(1)?;
            solver.mark_basic(field(fields, 1)?)
        }
        "relu" => {
            arity(2)?;
            solver.set_relu_pair(field(fields, 1)?, field(fields, 2)?)
        }
        "p" => return Err("duplicate problem line".to_string()),
        other => return Err(format!("unknown command \"{other}\"")),
    };
    result.map_err(|err| err.to_string())
}

fn field<T: FromStr>(fields: &[&str], index: usize) -> std::result::Result<T, String> {
    let text = fields
        .get(index)
        .ok_or_else(|| format!("missing argument {index}"))?;
    text.parse()
        .map_err(|_| format!("invalid argument \"{text}\""))
}
