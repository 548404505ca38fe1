use algo_platform_schemas::{Algorithm, AlgorithmId, MetricId, VersionId};
use algo_platform_store::Database;
use serde::Serialize;
use std::time::Duration;
use tracing::{info, warn};

use crate::config::BenchmarkConfig;
use crate::dataset::generate_dataset;
use crate::error::{ExecutionFailure, HarnessError};
use crate::runner::{AlgorithmRunner, BoundAlgorithm, RunSample};

/// A metric persisted during a pass
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecordedMetric {
    pub algorithm_id: AlgorithmId,
    pub version_id: VersionId,
    pub metric_id: MetricId,
    pub input_size: u64,
    pub execution_time: f64,
    pub memory_usage: f64,
}

/// A unit of work that produced no metric
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BenchmarkFailure {
    pub algorithm_id: AlgorithmId,
    pub name: String,
    pub version_id: Option<VersionId>,
    /// `None` when the algorithm could not be prepared at all
    pub input_size: Option<u64>,
    pub reason: String,
}

/// Partial-success summary of a harness pass
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct HarnessReport {
    pub algorithms: usize,
    pub recorded: Vec<RecordedMetric>,
    pub failures: Vec<BenchmarkFailure>,
}

impl HarnessReport {
    pub fn succeeded(&self) -> usize {
        self.recorded.len()
    }

    pub fn failed(&self) -> usize {
        self.failures.len()
    }

    pub fn recorded_for(&self, algorithm_id: AlgorithmId) -> impl Iterator<Item = &RecordedMetric> {
        self.recorded
            .iter()
            .filter(move |m| m.algorithm_id == algorithm_id)
    }

    pub fn failures_for(&self, algorithm_id: AlgorithmId) -> impl Iterator<Item = &BenchmarkFailure> {
        self.failures
            .iter()
            .filter(move |f| f.algorithm_id == algorithm_id)
    }

    fn fail(
        &mut self,
        algorithm: &Algorithm,
        version_id: Option<VersionId>,
        input_size: Option<u64>,
        reason: String,
    ) {
        match input_size {
            Some(size) => warn!(
                "  Error testing {} with input size {}: {}",
                algorithm.name, size, reason
            ),
            None => warn!("  Skipping {}: {}", algorithm.name, reason),
        }
        self.failures.push(BenchmarkFailure {
            algorithm_id: algorithm.id,
            name: algorithm.name.clone(),
            version_id,
            input_size,
            reason,
        });
    }
}

/// Benchmarks the latest version of every algorithm across the size ladder.
///
/// Runs are strictly sequential. Each (algorithm, size) is an isolated unit:
/// a failure is recorded in the report and the pass moves on.
pub struct BenchmarkHarness<R: AlgorithmRunner> {
    config: BenchmarkConfig,
    runner: R,
}

impl<R: AlgorithmRunner> BenchmarkHarness<R> {
    pub fn new(config: BenchmarkConfig, runner: R) -> Result<Self, HarnessError> {
        config.validate()?;
        Ok(Self { config, runner })
    }

    pub fn config(&self) -> &BenchmarkConfig {
        &self.config
    }

    /// Run one pass over every registered algorithm.
    ///
    /// Takes the store mutably for the whole pass so no maintenance can
    /// delete versions while they are being measured.
    pub async fn run(&self, db: &mut Database) -> Result<HarnessReport, HarnessError> {
        let algorithms = db.list_algorithms()?;
        let mut report = HarnessReport {
            algorithms: algorithms.len(),
            ..HarnessReport::default()
        };

        info!("Found {} algorithms", algorithms.len());

        for algorithm in &algorithms {
            self.benchmark_algorithm(db, algorithm, &mut report).await;
        }

        info!(
            "Testing completed: {} metric(s) recorded, {} failure(s)",
            report.succeeded(),
            report.failed()
        );
        Ok(report)
    }

    async fn benchmark_algorithm(
        &self,
        db: &mut Database,
        algorithm: &Algorithm,
        report: &mut HarnessReport,
    ) {
        info!("Testing algorithm: {} (ID: {})", algorithm.name, algorithm.id);

        let version = match db.latest_version(algorithm.id) {
            Ok(version) => version,
            Err(e) => {
                report.fail(algorithm, None, None, e.to_string());
                return;
            }
        };
        info!("Using version ID: {}", version.id);

        let shape = match db.category_for_algorithm(algorithm.id) {
            Ok(category) => category.map(|c| c.dataset_shape()).unwrap_or_default(),
            Err(e) => {
                report.fail(algorithm, Some(version.id), None, e.to_string());
                return;
            }
        };

        let bound = match self.runner.bind(&algorithm.name, &version.code) {
            Ok(bound) => bound,
            Err(e) => {
                report.fail(algorithm, Some(version.id), None, e.to_string());
                return;
            }
        };

        for &size in &self.config.input_sizes {
            info!("  Testing with input size: {}", size);
            let data = generate_dataset(size, shape, self.config.seed);

            let sample = match self.measure(bound.as_ref(), &data).await {
                Ok(sample) => sample,
                Err(e) => {
                    report.fail(algorithm, Some(version.id), Some(size), e.to_string());
                    continue;
                }
            };

            let execution_time = sample.elapsed.as_secs_f64();
            let memory_usage = sample.memory_bytes as f64;
            match db.record_metric(version.id, size, execution_time, memory_usage) {
                Ok(metric_id) => {
                    info!(
                        "  Results saved (ID: {}): {:.6} s, {:.0} bytes",
                        metric_id, execution_time, memory_usage
                    );
                    report.recorded.push(RecordedMetric {
                        algorithm_id: algorithm.id,
                        version_id: version.id,
                        metric_id,
                        input_size: size,
                        execution_time,
                        memory_usage,
                    });
                }
                Err(e) => report.fail(algorithm, Some(version.id), Some(size), e.to_string()),
            }
        }
    }

    /// Mean wall-clock time and peak memory over the configured trials.
    /// Any failing trial fails the whole size.
    async fn measure(
        &self,
        bound: &dyn BoundAlgorithm,
        data: &[i64],
    ) -> Result<RunSample, ExecutionFailure> {
        let trials = self.config.trials_per_size;
        let timeout = self.config.timeout_per_run();

        let mut total = Duration::ZERO;
        let mut peak = 0u64;
        for _ in 0..trials {
            // Runners copy `data` per call
            let sample = bound.call(data, timeout).await?;
            total += sample.elapsed;
            peak = peak.max(sample.memory_bytes);
        }

        Ok(RunSample {
            elapsed: total / trials,
            memory_bytes: peak,
        })
    }
}
