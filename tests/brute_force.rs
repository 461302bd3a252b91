//! Cross-checks the search against enumerating all phase combinations,
//! each of which is a purely linear problem.

use proptest::prelude::*;
use reluplexr::{output::Output, FinalStatus, Solver};

const MAX_RELUS: usize = 3;

/// Inputs x0, x1 in [-1, 1] and the constant x2 = 1. ReLU k has input
/// `3 + 2k` and output `4 + 2k`; its input is a weighted sum of the inputs,
/// the constant and the earlier outputs. The last variable is a weighted sum
/// of all outputs with a one-sided bound.
#[derive(Clone, Debug)]
struct Network {
    /// Weights of ReLU k: x0, x1, constant, then outputs 0..k.
    layers: Vec<Vec<f64>>,
    output_weights: Vec<f64>,
    threshold: f64,
    at_least: bool,
}

impl Network {
    fn relus(&self) -> usize {
        self.layers.len()
    }

    fn output(&self) -> usize {
        3 + 2 * self.relus()
    }

    /// With `phases`, the ReLUs are replaced by the linear constraints of
    /// the given phases (true is active).
    fn build(&self, phases: Option<&[bool]>) -> Solver {
        let relus = self.relus();
        let extra = if phases.is_some() { relus } else { 0 };
        let mut s = Solver::new(self.output() + 1 + extra);
        s.set_output(Output::from_writer(std::io::sink()));
        for var in [0, 1] {
            s.set_lower_bound(var, -1.0).unwrap();
            s.set_upper_bound(var, 1.0).unwrap();
        }
        s.set_lower_bound(2, 1.0).unwrap();
        s.set_upper_bound(2, 1.0).unwrap();
        for (k, weights) in self.layers.iter().enumerate() {
            let (b, f) = (3 + 2 * k, 4 + 2 * k);
            for (i, w) in weights.iter().enumerate().take(3 + k) {
                let col = if i < 3 { i } else { 4 + 2 * (i - 3) };
                s.initialize_cell(b, col, *w).unwrap();
            }
            s.initialize_cell(b, b, -1.0).unwrap();
            s.mark_basic(b).unwrap();
            s.set_lower_bound(f, 0.0).unwrap();
            match phases {
                None => s.set_relu_pair(b, f).unwrap(),
                Some(phases) if phases[k] => {
                    // e = f - b = 0
                    let e = self.output() + 1 + k;
                    s.set_lower_bound(b, 0.0).unwrap();
                    s.initialize_cell(e, f, 1.0).unwrap();
                    s.initialize_cell(e, b, -1.0).unwrap();
                    s.initialize_cell(e, e, -1.0).unwrap();
                    s.mark_basic(e).unwrap();
                    s.set_lower_bound(e, 0.0).unwrap();
                    s.set_upper_bound(e, 0.0).unwrap();
                }
                Some(_) => {
                    s.set_upper_bound(b, 0.0).unwrap();
                    s.set_upper_bound(f, 0.0).unwrap();
                }
            }
        }
        let y = self.output();
        for (k, w) in self.output_weights.iter().enumerate().take(relus) {
            s.initialize_cell(y, 4 + 2 * k, *w).unwrap();
        }
        s.initialize_cell(y, y, -1.0).unwrap();
        s.mark_basic(y).unwrap();
        if self.at_least {
            s.set_lower_bound(y, self.threshold).unwrap();
        } else {
            s.set_upper_bound(y, self.threshold).unwrap();
        }
        s
    }

    fn brute_force(&self) -> FinalStatus {
        let relus = self.relus();
        let sat = (0..1u32 << relus).any(|mask| {
            let phases = (0..relus).map(|k| mask & (1 << k) != 0).collect::<Vec<_>>();
            let status = self.build(Some(&phases)).solve();
            assert_ne!(status, FinalStatus::Error);
            status == FinalStatus::Sat
        });
        if sat {
            FinalStatus::Sat
        } else {
            FinalStatus::Unsat
        }
    }
}

/// Small integers, which make many vertices degenerate, or arbitrary
/// fractions.
fn weight() -> impl Strategy<Value = f64> {
    prop_oneof![(-3i32..=3).prop_map(f64::from), -3.0f64..3.0]
}

fn network() -> impl Strategy<Value = Network> {
    (1..=MAX_RELUS).prop_flat_map(|relus| {
        (
            prop::collection::vec(prop::collection::vec(weight(), 3 + MAX_RELUS), relus),
            prop::collection::vec(weight(), relus),
            -4i32..=4,
            any::<bool>(),
            prop_oneof![Just(1.0), Just(31.7)],
        )
            .prop_map(|(layers, output_weights, threshold, at_least, scale)| {
                let scaled =
                    |weights: Vec<f64>| -> Vec<f64> { weights.into_iter().map(|w| w * scale).collect() };
                Network {
                    layers: layers.into_iter().map(scaled).collect(),
                    output_weights: scaled(output_weights),
                    // Keeps the threshold away from the small rationals the
                    // output reaches at vertices.
                    threshold: (threshold as f64 + 0.37) * scale,
                    at_least,
                }
            })
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn search_agrees_with_phase_enumeration(network in network()) {
        let mut solver = network.build(None);
        let status = solver.solve();
        prop_assert_ne!(status, FinalStatus::Error, "{:?}", solver.error());
        prop_assert_eq!(status, network.brute_force());
        if status == FinalStatus::Sat {
            let x = solver.assignments().unwrap();
            for k in 0..network.relus() {
                let (b, f) = (x[3 + 2 * k], x[4 + 2 * k]);
                prop_assert!((f - b.max(0.0)).abs() <= 1e-5 * b.abs().max(f.abs()).max(1.0));
            }
            let y = x[network.output()];
            let margin = 1e-5 * network.threshold.abs().max(1.0);
            if network.at_least {
                prop_assert!(y >= network.threshold - margin);
            } else {
                prop_assert!(y <= network.threshold + margin);
            }
        }
    }
}
