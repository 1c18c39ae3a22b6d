//! Labeling pipeline.
//!
//! Pipeline flow:
//! Label file → Responses → CountTensor → EM → hard labels → output file (+ JSON report)

use super::emit::{emit_labels, write_labels, write_report};
use super::input::{InputData, read_responses};
use crate::em::{CountTensor, EmController};
use crate::models::{Config, EmOutcome, LabelType, Result, RunReport, nested};
use chrono::Utc;
use ndarray::{ArrayView2, Axis};
use rand::SeedableRng;
use rand::rngs::StdRng;
use std::path::Path;
use std::time::Instant;
use tracing::info;

/// Runs Dawid-Skene estimation for one configured label type.
pub struct LabelingPipeline {
    config: Config,
    label_type: LabelType,
}

impl LabelingPipeline {
    /// Create a pipeline for the named label type.
    pub fn new(config: Config, label_type: &str) -> Result<Self> {
        config.validate()?;
        let label_type = config.label_type(label_type)?.clone();
        Ok(Self { config, label_type })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn label_type(&self) -> &LabelType {
        &self.label_type
    }

    /// Load responses using the configured class list.
    pub fn load_responses(&self, path: &Path) -> Result<InputData> {
        read_responses(path, &self.config.input.classes)
    }

    /// Run EM over the loaded responses and write per-item labels.
    pub fn run(&self, input: &InputData, output_path: &Path) -> Result<RunReport> {
        let start = Instant::now();

        let counts = CountTensor::from_responses(&input.responses, &self.config.input.classes)?;
        let mut rng = match self.config.em.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        let outcome = EmController::new(&counts, &self.label_type, &self.config.em).run(&mut rng)?;
        log_estimates(&counts, &outcome);

        let labels = emit_labels(&counts, &outcome.posterior)?;
        write_labels(output_path, &labels, self.config.output.format)?;

        let report = RunReport {
            label_type: self.label_type.name.clone(),
            am_noise: self.label_type.am_noise,
            items: counts.n_items(),
            observers: counts.n_observers(),
            classes: counts.classes().to_vec(),
            iterations: outcome.iterations(),
            termination: outcome.termination,
            log_likelihood: outcome.log_likelihood(),
            class_marginals: outcome.parameters.class_marginals.to_vec(),
            error_rates: nested(&outcome.parameters.error_rates),
            incidence_of_error_rates: nested(&outcome.parameters.incidence_of_error_rates()),
            review_counts: input.review_counts.clone(),
            reviewed_blind_spots: outcome.reviewed_blind_spots.len(),
            history: outcome.history.clone(),
            runtime_secs: start.elapsed().as_secs_f64(),
            finished_at: Utc::now(),
        };

        if let Some(report_path) = &self.config.output.report {
            write_report(report_path, &report)?;
        }

        info!(
            labels = labels.len(),
            iterations = report.iterations,
            termination = %report.termination,
            output = %output_path.display(),
            "Labeling complete"
        );

        Ok(report)
    }
}

fn log_estimates(counts: &CountTensor, outcome: &EmOutcome) {
    let marginals: Vec<String> = outcome
        .parameters
        .class_marginals
        .iter()
        .map(|p| format!("{p:.2}"))
        .collect();
    info!(classes = ?counts.classes(), marginals = ?marginals, "Class marginals");

    let incidence = outcome.parameters.incidence_of_error_rates();
    for (k, observer) in counts.observers().iter().enumerate() {
        let error_rates = rounded(outcome.parameters.error_rates.index_axis(Axis(0), k));
        let incidence = rounded(incidence.index_axis(Axis(0), k));
        info!(%observer, error_rates = ?error_rates, incidence = ?incidence, "Observer estimates");
    }
}

fn rounded(matrix: ArrayView2<'_, f64>) -> Vec<Vec<String>> {
    matrix
        .rows()
        .into_iter()
        .map(|row| row.iter().map(|p| format!("{p:.2}")).collect())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{EmError, NoiseModel, OutputFormat, Termination};
    use std::fs;
    use tempfile::TempDir;

    const LABELS: &str = "\
(1, 1)=[(1;f),(1;f),(1;f)]
(1, 2)=[(0;f),(0;f),(0;f)]
(1, 3)=[(0;f),(1;t)]
(2, 1)=[(0;f),(0;f),(1;f)]
(2, 2)=[]
";

    fn config() -> Config {
        let mut config = Config::default();
        config.em.seed = Some(11);
        config.label_types = vec![
            LabelType::new("observed", NoiseModel::PositiveEvidence),
            LabelType::new("free", NoiseModel::Unconstrained),
            LabelType::new("reviewed", NoiseModel::GoldEvidence),
        ];
        config
    }

    fn run_pipeline(config: Config, label_type: &str) -> (RunReport, Vec<String>) {
        let temp_dir = TempDir::new().unwrap();
        let input = temp_dir.path().join("labels.txt");
        let output = temp_dir.path().join("out.csv");
        fs::write(&input, LABELS).unwrap();

        let pipeline = LabelingPipeline::new(config, label_type).unwrap();
        let data = pipeline.load_responses(&input).unwrap();
        let report = pipeline.run(&data, &output).unwrap();

        let lines = fs::read_to_string(&output)
            .unwrap()
            .lines()
            .map(str::to_string)
            .collect();
        (report, lines)
    }

    #[test]
    fn test_unknown_label_type() {
        let result = LabelingPipeline::new(config(), "missing");
        assert!(matches!(result, Err(EmError::Config(_))));

        let pipeline = LabelingPipeline::new(config(), "reviewed").unwrap();
        assert_eq!(pipeline.label_type().name, "reviewed");
        assert_eq!(pipeline.label_type().am_noise, NoiseModel::GoldEvidence);
    }

    #[test]
    fn test_positive_evidence_run() {
        let (report, lines) = run_pipeline(config(), "observed");

        assert_eq!(report.items, 5);
        assert_eq!(report.observers, 1);
        assert_eq!(report.review_counts, vec![0, 1]);
        assert_eq!(report.reviewed_blind_spots, 3);
        assert_eq!(report.iterations, report.history.len());
        assert!(report.iterations <= 101);

        // every item with a class-1 label is emitted as 1 with full weight
        assert_eq!(lines.len(), 5);
        assert_eq!(lines[0], "[1, 1],1,1.0");
        assert_eq!(lines[2], "[1, 3],1,1.0");
        assert_eq!(lines[3], "[2, 1],1,1.0");
        assert!(lines[1].starts_with("[1, 2],0,"));
    }

    #[test]
    fn test_report_and_jsonl_output() {
        let temp_dir = TempDir::new().unwrap();
        let input = temp_dir.path().join("labels.txt");
        let output = temp_dir.path().join("out.jsonl");
        let report_path = temp_dir.path().join("report.json");
        fs::write(&input, LABELS).unwrap();

        let mut config = config();
        config.output.format = OutputFormat::Jsonl;
        config.output.report = Some(report_path.clone());

        let pipeline = LabelingPipeline::new(config, "reviewed").unwrap();
        let data = pipeline.load_responses(&input).unwrap();
        let report = pipeline.run(&data, &output).unwrap();

        let content = fs::read_to_string(&output).unwrap();
        assert_eq!(content.lines().count(), 5);
        for line in content.lines() {
            let value: serde_json::Value = serde_json::from_str(line).unwrap();
            assert!(value.get("weight").is_some());
        }

        let written: RunReport =
            serde_json::from_str(&fs::read_to_string(&report_path).unwrap()).unwrap();
        assert_eq!(written.label_type, "reviewed");
        assert_eq!(written.am_noise, NoiseModel::GoldEvidence);
        assert_eq!(written.iterations, report.iterations);
        assert_eq!(written.reviewed_blind_spots, 1);
        assert_eq!(written.error_rates.len(), 1);
        assert_eq!(written.error_rates[0].len(), 2);

        let marginal_sum: f64 = written.class_marginals.iter().sum();
        assert!((marginal_sum - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_iteration_bound_from_config() {
        let mut config = config();
        config.em.max_iterations = 1;
        config.em.tolerance = 1e-300;

        // the bound is only checked once a previous iteration exists
        let (report, _) = run_pipeline(config, "free");
        assert_eq!(report.iterations, 2);
        assert_eq!(report.termination, Termination::MaxIterations);
    }

    #[test]
    fn test_seeded_runs_are_reproducible() {
        let mut config = config();
        config.em.init = crate::models::InitStrategy::Random;

        let (first, first_lines) = run_pipeline(config.clone(), "free");
        let (second, second_lines) = run_pipeline(config, "free");
        assert_eq!(first_lines, second_lines);
        assert_eq!(first.class_marginals, second.class_marginals);
    }
}
