use tracing::debug;

use crate::{
    cancel::CancellationToken,
    config::SolverConfig,
    error::{Result, SolverError},
    lp_solver::{Feasibility, LPSolver, PivotStats},
    output::Output,
    relu::{Phase, ReluManager},
    status::Statistics,
    types::Number,
};

/// Terminal result of a search.
#[derive(Clone, Debug, PartialEq)]
pub enum Outcome {
    /// Values of all variables, internal ones included.
    Sat(Vec<Number>),
    Unsat,
    Cancelled,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum State {
    Restoring,
    CheckingRelu,
    Splitting(usize),
    Backtracking,
    Satisfied,
}

/// Saved state at a case split.
struct Frame {
    lp: LPSolver,
    phases: Vec<Phase>,
    pair: usize,
    /// Phase still to be tried after the current one failed.
    alternate: Option<Phase>,
}

/// Case-splitting search over the phases of the ReLU pairs. The search
/// tree is walked with an explicit stack of frames.
pub struct Search<'a> {
    lp: LPSolver,
    relus: ReluManager,
    config: &'a SolverConfig,
    cancel: &'a CancellationToken,
    output: &'a Output,
    /// Variables from this index on are the slacks of the ReLU pairs.
    user_variables: usize,
    stack: Vec<Frame>,
    statistics: Statistics,
}

impl<'a> Search<'a> {
    pub fn new(
        lp: LPSolver,
        relus: ReluManager,
        config: &'a SolverConfig,
        cancel: &'a CancellationToken,
        output: &'a Output,
        user_variables: usize,
    ) -> Search<'a> {
        Search {
            lp,
            relus,
            config,
            cancel,
            output,
            user_variables,
            stack: vec![],
            statistics: Statistics::default(),
        }
    }

    pub fn statistics(&self) -> &Statistics {
        &self.statistics
    }

    pub fn run(&mut self) -> Result<Outcome> {
        let mut state = State::Restoring;
        loop {
            if self.cancel.is_cancelled() {
                debug!("search cancelled at depth {}", self.stack.len());
                return Ok(Outcome::Cancelled);
            }
            self.statistics.iterations += 1;
            if self.config.logging {
                debug!(
                    "iteration {}: {state:?}, depth {}",
                    self.statistics.iterations,
                    self.stack.len()
                );
            }
            state = match state {
                State::Restoring => self.restore()?,
                State::CheckingRelu => self.check_relus()?,
                State::Splitting(pair) => self.split(pair),
                State::Backtracking => match self.backtrack() {
                    Some(next) => next,
                    None => return Ok(Outcome::Unsat),
                },
                State::Satisfied => return Ok(Outcome::Sat(self.lp.values())),
            };
        }
    }

    fn restore(&mut self) -> Result<State> {
        let mut pivot_stats = PivotStats::default();
        let feasibility = self.lp.restore_feasibility(&mut pivot_stats);
        self.statistics.pivots += pivot_stats.pivots;
        self.statistics.recomputations += pivot_stats.recomputations;
        match feasibility? {
            Feasibility::Feasible => Ok(State::CheckingRelu),
            Feasibility::Infeasible { variable } => {
                if self.config.logging {
                    debug!("conflict on {}", self.name(variable));
                }
                self.statistics.conflicts += 1;
                Ok(State::Backtracking)
            }
        }
    }

    fn check_relus(&mut self) -> Result<State> {
        let check = self.relus.check(&self.lp);
        if check.all_satisfied() {
            return Ok(State::Satisfied);
        }
        if let Some(&pair) = check.broken_fixed.first() {
            let p = self.relus.pairs()[pair];
            return Err(SolverError::Numerical(format!(
                "fixed ReLU pair ({}, {}) is violated: {} vs {}",
                self.name(p.b),
                self.name(p.f),
                self.lp.value(p.b),
                self.lp.value(p.f)
            )));
        }
        if !check.eliminations.is_empty() {
            for (pair, phase) in check.eliminations {
                if self.config.logging {
                    debug!("eliminating pair {pair}: {phase}");
                }
                self.statistics.eliminations += 1;
                if self.relus.fix_phase(pair, phase, &mut self.lp).is_err() {
                    self.statistics.conflicts += 1;
                    return Ok(State::Backtracking);
                }
            }
            return Ok(State::Restoring);
        }
        for &pair in &check.violated {
            if self
                .relus
                .repair(pair, &mut self.lp, self.config.repair_threshold)
            {
                if self.config.logging {
                    debug!("repaired pair {pair}");
                }
                self.statistics.repairs += 1;
                return Ok(State::Restoring);
            }
        }
        Ok(State::Splitting(check.violated[0]))
    }

    fn split(&mut self, pair: usize) -> State {
        let phase = self.config.first_phase;
        self.stack.push(Frame {
            lp: self.lp.clone(),
            phases: self.relus.phases(),
            pair,
            alternate: Some(phase.alternate()),
        });
        self.statistics.splits += 1;
        self.statistics.max_depth = self.statistics.max_depth.max(self.stack.len());
        if self.config.logging {
            debug!("split on pair {pair} at depth {}: {phase}", self.stack.len());
        }
        self.dump_state("split");
        self.apply(pair, phase)
    }

    /// Restores the innermost frame with an untried phase and tries it.
    /// Returns None once the tree is exhausted.
    fn backtrack(&mut self) -> Option<State> {
        while let Some(frame) = self.stack.last_mut() {
            if let Some(phase) = frame.alternate.take() {
                let pair = frame.pair;
                self.lp = frame.lp.clone();
                self.relus.restore_phases(&frame.phases);
                self.statistics.backtracks += 1;
                if self.config.logging {
                    debug!(
                        "backtrack to depth {}: pair {pair} {phase}",
                        self.stack.len()
                    );
                }
                self.dump_state("backtrack");
                return Some(self.apply(pair, phase));
            }
            self.stack.pop();
        }
        None
    }

    fn apply(&mut self, pair: usize, phase: Phase) -> State {
        match self.relus.fix_phase(pair, phase, &mut self.lp) {
            Ok(()) => State::Restoring,
            Err(_) => {
                self.statistics.conflicts += 1;
                State::Backtracking
            }
        }
    }

    fn dump_state(&self, event: &str) {
        if self.config.dump_states {
            self.output.line(&format!("--- {event}, depth {} ---", self.stack.len()));
            self.output.block(&self.lp.format(&|var| self.name(var)));
        }
    }

    fn name(&self, var: usize) -> String {
        if var < self.user_variables {
            format!("x{var}")
        } else {
            format!("s{}", var - self.user_variables)
        }
    }
}
