mod bounds;
pub mod cancel;
pub mod config;
pub mod error;
mod linear_expression;
mod lp_solver;
pub mod output;
pub mod query;
mod relu;
mod search;
pub mod solver;
mod sparse_matrix;
pub mod status;
mod tableau;
mod types;

pub use cancel::CancellationToken;
pub use config::SolverConfig;
pub use error::{Result, SolverError};
pub use relu::Phase;
pub use solver::Solver;
pub use status::{FinalStatus, Statistics};
pub use types::Number;
