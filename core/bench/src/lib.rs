pub mod config;
pub mod dataset;
pub mod error;
pub mod harness;
pub mod runner;

pub use config::{
    BenchmarkConfig, HarnessFileConfig, ProcessRunnerConfig, CODE_PLACEHOLDER, DRIVER_PLACEHOLDER,
};
pub use dataset::generate_dataset;
pub use error::{ExecutionFailure, HarnessError};
pub use harness::{BenchmarkFailure, BenchmarkHarness, HarnessReport, RecordedMetric};
pub use runner::{AlgorithmRunner, BoundAlgorithm, NativeFn, NativeRunner, ProcessRunner, RunSample};
