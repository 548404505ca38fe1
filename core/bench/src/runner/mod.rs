pub mod native;
pub mod process;

use async_trait::async_trait;
use std::time::Duration;

use crate::error::ExecutionFailure;

pub use native::{NativeFn, NativeRunner};
pub use process::ProcessRunner;

/// One measured execution
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RunSample {
    pub elapsed: Duration,
    pub memory_bytes: u64,
}

/// Turns a version's code into something the harness can call.
pub trait AlgorithmRunner: Send + Sync {
    /// Bind the callable the code defines, without modifying the code.
    /// `name` is the algorithm's registered name, used as an entry-point hint.
    fn bind(&self, name: &str, code: &str) -> Result<Box<dyn BoundAlgorithm>, ExecutionFailure>;
}

/// The only capability benchmarked code exposes: `(input_data) -> result`.
#[async_trait]
pub trait BoundAlgorithm: Send + Sync {
    /// Run once on `input`. A `timeout` is enforced from outside the code.
    async fn call(
        &self,
        input: &[i64],
        timeout: Option<Duration>,
    ) -> Result<RunSample, ExecutionFailure>;
}
