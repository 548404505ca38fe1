use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::HarnessError;

/// Placeholder in a runner command that is replaced with the code file path.
pub const CODE_PLACEHOLDER: &str = "{code}";

/// Placeholder replaced with the path of the bundled Python benchmark driver.
pub const DRIVER_PLACEHOLDER: &str = "{driver}";

fn default_input_sizes() -> Vec<u64> {
    vec![100, 1000, 10000]
}

fn default_trials() -> u32 {
    1
}

fn default_seed() -> u64 {
    42
}

fn default_command() -> Vec<String> {
    vec![
        "python3".to_string(),
        DRIVER_PLACEHOLDER.to_string(),
        CODE_PLACEHOLDER.to_string(),
    ]
}

/// Size ladder and repetition settings for a harness pass
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BenchmarkConfig {
    #[serde(default = "default_input_sizes")]
    pub input_sizes: Vec<u64>,
    #[serde(default = "default_trials")]
    pub trials_per_size: u32,
    #[serde(default)]
    pub timeout_per_run_ms: Option<u64>,
    #[serde(default = "default_seed")]
    pub seed: u64,
}

impl Default for BenchmarkConfig {
    fn default() -> Self {
        Self {
            input_sizes: default_input_sizes(),
            trials_per_size: default_trials(),
            timeout_per_run_ms: None,
            seed: default_seed(),
        }
    }
}

impl BenchmarkConfig {
    pub fn timeout_per_run(&self) -> Option<Duration> {
        self.timeout_per_run_ms.map(Duration::from_millis)
    }

    /// Sizes must be positive and strictly ascending; at least one trial.
    pub fn validate(&self) -> Result<(), HarnessError> {
        if self.input_sizes.is_empty() {
            return Err(HarnessError::Config("input_sizes is empty".to_string()));
        }
        if self.input_sizes.iter().any(|&size| size == 0) {
            return Err(HarnessError::Config(
                "input_sizes must be positive".to_string(),
            ));
        }
        if self.input_sizes.windows(2).any(|pair| pair[0] >= pair[1]) {
            return Err(HarnessError::Config(format!(
                "input_sizes must be strictly ascending: {:?}",
                self.input_sizes
            )));
        }
        if self.trials_per_size == 0 {
            return Err(HarnessError::Config(
                "trials_per_size must be at least 1".to_string(),
            ));
        }
        if self.timeout_per_run_ms == Some(0) {
            return Err(HarnessError::Config(
                "timeout_per_run_ms must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// How the process runner launches a version's code.
///
/// The launched program receives the dataset as a JSON array on stdin and
/// must print `{"elapsed": <seconds>, "peak": <bytes>}` as its last stdout line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessRunnerConfig {
    #[serde(default = "default_command")]
    pub command: Vec<String>,
}

impl Default for ProcessRunnerConfig {
    fn default() -> Self {
        Self {
            command: default_command(),
        }
    }
}

/// On-disk harness configuration: benchmark settings plus the runner command
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HarnessFileConfig {
    #[serde(flatten)]
    pub benchmark: BenchmarkConfig,
    #[serde(flatten)]
    pub runner: ProcessRunnerConfig,
}

impl HarnessFileConfig {
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self, HarnessError> {
        let raw = std::fs::read_to_string(path)?;
        let config: HarnessFileConfig = serde_json::from_str(&raw)?;
        config.benchmark.validate()?;
        Ok(config)
    }
}
