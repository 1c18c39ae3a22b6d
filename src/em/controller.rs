//! EM controller: INIT → ITERATING → {CONVERGED, MAX_ITER_REACHED}.
//!
//! Each iteration runs the M-step on the previous posterior, then the E-step
//! with the fresh parameters. The M-before-E order is part of the observable
//! behavior: the first iteration estimates parameters straight from the
//! initial posterior.

use super::counts::CountTensor;
use super::e_step::e_step;
use super::init::initialize;
use super::likelihood::log_likelihood;
use super::m_step::m_step;
use crate::models::{
    EmError, EmOutcome, EmSettings, IterationRecord, LabelType, Parameters, Result, Termination,
};
use ndarray::Array2;
use rand::Rng;
use tracing::{debug, info};

/// Mutable loop state between iterations.
#[derive(Debug, Clone)]
pub struct EmState {
    /// Completed iterations
    pub iteration: usize,

    /// `[items × classes]`, the latest E-step output (or the initial guess)
    pub posterior: Array2<f64>,

    /// Parameters from the latest M-step
    pub parameters: Option<Parameters>,

    pub history: Vec<IterationRecord>,
    pub reviewed_blind_spots: Vec<usize>,
}

/// Drives the EM iterations for one count tensor and label type.
pub struct EmController<'a> {
    counts: &'a CountTensor,
    label_type: &'a LabelType,
    settings: &'a EmSettings,
}

impl<'a> EmController<'a> {
    pub fn new(counts: &'a CountTensor, label_type: &'a LabelType, settings: &'a EmSettings) -> Self {
        Self {
            counts,
            label_type,
            settings,
        }
    }

    /// INIT: build the initial posterior.
    pub fn initialize<R: Rng + ?Sized>(&self, rng: &mut R) -> EmState {
        let init = initialize(self.counts, self.label_type, self.settings.init, rng);
        EmState {
            iteration: 0,
            posterior: init.posterior,
            parameters: None,
            history: Vec::new(),
            reviewed_blind_spots: init.reviewed_blind_spots,
        }
    }

    /// Run one ITERATING step.
    ///
    /// Returns `Some(termination)` once the loop should stop. The convergence
    /// and iteration-bound checks only start once a previous iteration exists.
    pub fn step(&self, state: &mut EmState) -> Result<Option<Termination>> {
        state.iteration += 1;
        let iteration = state.iteration;

        let parameters = m_step(self.counts, &state.posterior, self.label_type)?;
        let posterior = e_step(self.counts, &parameters, self.label_type)?;
        let log_l = log_likelihood(self.counts, &parameters)?;

        let deltas = state
            .parameters
            .as_ref()
            .map(|previous| parameters.deltas(previous));

        let record = IterationRecord {
            iteration,
            log_likelihood: log_l,
            class_marginals_delta: deltas.map(|(cm, _)| cm),
            error_rates_delta: deltas.map(|(_, er)| er),
        };

        let termination = match deltas {
            Some((cm, er)) => {
                info!(
                    iteration,
                    log_likelihood = log_l,
                    delta_cm = %format!("{cm:.6}"),
                    delta_er = %format!("{er:.6}"),
                    "EM iteration"
                );
                if cm < self.settings.tolerance && er < self.settings.tolerance {
                    Some(Termination::Converged)
                } else if iteration > self.settings.max_iterations {
                    Some(Termination::MaxIterations)
                } else {
                    None
                }
            }
            None => {
                info!(iteration, log_likelihood = log_l, "EM iteration");
                None
            }
        };

        state.posterior = posterior;
        state.parameters = Some(parameters);
        state.history.push(record);

        Ok(termination)
    }

    /// Run INIT and iterate until convergence or the iteration bound.
    pub fn run<R: Rng + ?Sized>(&self, rng: &mut R) -> Result<EmOutcome> {
        info!(
            items = self.counts.n_items(),
            observers = self.counts.n_observers(),
            classes = ?self.counts.classes(),
            label_type = %self.label_type.name,
            init = %self.settings.init,
            "Starting EM"
        );

        let mut state = self.initialize(rng);
        let termination = loop {
            if let Some(termination) = self.step(&mut state)? {
                break termination;
            }
        };

        debug!(iterations = state.iteration, %termination, "EM finished");

        let parameters = state
            .parameters
            .ok_or_else(|| EmError::Internal("EM finished without parameters".to_string()))?;

        Ok(EmOutcome {
            parameters,
            posterior: state.posterior,
            termination,
            history: state.history,
            reviewed_blind_spots: state.reviewed_blind_spots,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{InitStrategy, NoiseModel};
    use ndarray::{Array1, Array3, Axis, array, s};
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn tensor(counts: Array3<f64>) -> CountTensor {
        let n = counts.dim().0;
        CountTensor::from_counts(counts, Array1::from_elem(n, false)).unwrap()
    }

    fn run(counts: &CountTensor, noise: u8, settings: &EmSettings) -> EmOutcome {
        let label_type = LabelType::new("test", NoiseModel::from(noise));
        let mut rng = StdRng::seed_from_u64(0);
        EmController::new(counts, &label_type, settings)
            .run(&mut rng)
            .unwrap()
    }

    fn assert_rows_normalized(matrix: ndarray::ArrayView2<'_, f64>) {
        for row in matrix.rows() {
            let sum = row.sum();
            assert!(
                (sum - 1.0).abs() < 1e-9 || row.iter().all(|&p| p == 0.0),
                "row {row} is neither normalized nor all-zero"
            );
        }
    }

    /// Synthetic multi-observer data with known true classes.
    fn synthetic(seed: u64, items: usize, observers: usize, accuracy: f64) -> CountTensor {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut counts = Array3::<f64>::zeros((items, observers, 2));
        for i in 0..items {
            let truth = usize::from(rng.gen_bool(0.4));
            for k in 0..observers {
                let repeats = rng.gen_range(1..=2);
                for _ in 0..repeats {
                    let label = if rng.gen_bool(accuracy) { truth } else { 1 - truth };
                    counts[[i, k, label]] += 1.0;
                }
            }
        }
        tensor(counts)
    }

    #[test]
    fn test_single_item_single_observer() {
        let counts = tensor(array![[[4.0, 0.0]]]);
        let outcome = run(&counts, 1, &EmSettings::default());

        assert_eq!(outcome.termination, Termination::Converged);
        assert_eq!(outcome.iterations(), 2);

        let params = &outcome.parameters;
        assert!((params.class_marginals[0] - 1.0).abs() < 1e-9);
        assert!(params.class_marginals[1].abs() < 1e-9);
        assert!((params.error_rates[[0, 0, 0]] - 1.0).abs() < 1e-9);
        assert!(params.error_rates[[0, 0, 1]].abs() < 1e-9);
        assert!((outcome.posterior[[0, 0]] - 1.0).abs() < 1e-9);
        assert!(outcome.posterior[[0, 1]].abs() < 1e-9);
    }

    #[test]
    fn test_two_items_perfect_agreement() {
        let counts = tensor(array![[[2.0, 0.0]], [[0.0, 2.0]]]);
        let outcome = run(&counts, 1, &EmSettings::default());

        assert_eq!(outcome.termination, Termination::Converged);
        assert!(outcome.iterations() <= 3);

        assert_eq!(outcome.posterior, array![[1.0, 0.0], [0.0, 1.0]]);
        let identity = array![[1.0, 0.0], [0.0, 1.0]];
        let er = outcome.parameters.error_rates.slice(s![0, .., ..]);
        assert!((&er - &identity).mapv(f64::abs).sum() < 1e-9);
        assert_eq!(outcome.log_likelihood(), Some(2.0 * 0.5f64.ln()));
    }

    #[test]
    fn test_iteration_bound() {
        let counts = synthetic(3, 60, 3, 0.7);
        let settings = EmSettings {
            tolerance: 1e-300,
            max_iterations: 4,
            ..EmSettings::default()
        };

        let outcome = run(&counts, 1, &settings);
        assert_eq!(outcome.termination, Termination::MaxIterations);
        // stops once the count exceeds the bound
        assert_eq!(outcome.iterations(), 5);
    }

    #[test]
    fn test_first_iteration_has_no_deltas() {
        let counts = synthetic(5, 20, 2, 0.8);
        let outcome = run(&counts, 1, &EmSettings::default());

        assert!(outcome.history[0].class_marginals_delta.is_none());
        assert!(outcome.history[0].error_rates_delta.is_none());
        for record in &outcome.history[1..] {
            assert!(record.class_marginals_delta.is_some());
            assert!(record.error_rates_delta.is_some());
        }
        let last = outcome.history.last().unwrap();
        if outcome.termination == Termination::Converged {
            assert!(last.class_marginals_delta.unwrap() < 1e-5);
            assert!(last.error_rates_delta.unwrap() < 1e-5);
        }
    }

    #[test]
    fn test_normalization_invariants_hold_every_iteration() {
        let counts = synthetic(11, 50, 4, 0.75);
        let label_type = LabelType::new("test", NoiseModel::Unconstrained);
        let settings = EmSettings::default();
        let controller = EmController::new(&counts, &label_type, &settings);

        let mut state = controller.initialize(&mut StdRng::seed_from_u64(1));
        assert_rows_normalized(state.posterior.view());

        for _ in 0..20 {
            let done = controller.step(&mut state).unwrap();

            let params = state.parameters.as_ref().unwrap();
            assert!((params.class_marginals.sum() - 1.0).abs() < 1e-9);
            for observer in params.error_rates.axis_iter(Axis(0)) {
                assert_rows_normalized(observer);
            }
            assert_rows_normalized(state.posterior.view());

            if done.is_some() {
                break;
            }
        }
    }

    #[test]
    fn test_log_likelihood_does_not_decrease() {
        for seed in 0..8 {
            let counts = synthetic(100 + seed, 80, 3, 0.8);
            let outcome = run(&counts, 1, &EmSettings::default());

            for pair in outcome.history.windows(2) {
                assert!(
                    pair[1].log_likelihood >= pair[0].log_likelihood - 1e-6,
                    "seed {seed}: log-likelihood fell from {} to {} at iteration {}",
                    pair[0].log_likelihood,
                    pair[1].log_likelihood,
                    pair[1].iteration
                );
            }
        }
    }

    #[test]
    fn test_positive_evidence_blind_spots_stay_forced() {
        let counts = synthetic(21, 40, 2, 0.8);
        let label_type = LabelType::new("test", NoiseModel::PositiveEvidence);
        let settings = EmSettings::default();
        let controller = EmController::new(&counts, &label_type, &settings);

        let forced: Vec<usize> = (0..counts.n_items())
            .filter(|&i| counts.counts().slice(s![i, .., 1]).sum() > 0.0)
            .collect();
        assert!(!forced.is_empty());

        let mut state = controller.initialize(&mut StdRng::seed_from_u64(1));
        assert_eq!(state.reviewed_blind_spots, forced);

        loop {
            for &i in &forced {
                assert_eq!(state.posterior.row(i), array![0.0, 1.0]);
            }
            if controller.step(&mut state).unwrap().is_some() {
                break;
            }
        }
        for &i in &forced {
            assert_eq!(state.posterior.row(i), array![0.0, 1.0]);
        }
    }

    #[test]
    fn test_alternative_initializers_converge() {
        let counts = tensor(array![[[3.0, 0.0]], [[0.0, 3.0]], [[2.0, 1.0]]]);
        for init in [InitStrategy::Random, InitStrategy::Majority] {
            let settings = EmSettings {
                init,
                ..EmSettings::default()
            };
            let outcome = run(&counts, 1, &settings);
            assert_rows_normalized(outcome.posterior.view());
            assert!((outcome.parameters.class_marginals.sum() - 1.0).abs() < 1e-9);
        }
    }

    #[test]
    fn test_degenerate_likelihood_aborts_run() {
        // class 0 is pinned to never emit class 1; with every bit of prior
        // mass on class 0 the class-1 label has zero likelihood
        let counts = CountTensor::from_counts(array![[[0.0, 1.0]]], array![false]).unwrap();
        let label_type = LabelType::new("test", NoiseModel::PositiveEvidence);
        let settings = EmSettings::default();
        let controller = EmController::new(&counts, &label_type, &settings);

        // Start from a posterior that puts everything on class 0
        let mut state = controller.initialize(&mut StdRng::seed_from_u64(0));
        state.posterior = array![[1.0, 0.0]];

        let err = controller.step(&mut state).unwrap_err();
        assert!(err.is_numerical());
    }
}
