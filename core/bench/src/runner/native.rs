use async_trait::async_trait;
use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::{AlgorithmRunner, BoundAlgorithm, RunSample};
use crate::error::ExecutionFailure;

/// In-process entry point: takes the dataset, returns the result or an error message
pub type NativeFn = Arc<dyn Fn(Vec<i64>) -> Result<Vec<i64>, String> + Send + Sync>;

/// Runs Rust callables registered under a code string.
///
/// Used for built-in baselines and tests. Panics are reported as failures.
/// The timeout only bounds how long the harness waits: a runaway callable
/// keeps its blocking thread, so untrusted code belongs in `ProcessRunner`.
#[derive(Default, Clone)]
pub struct NativeRunner {
    entries: HashMap<String, NativeFn>,
}

impl NativeRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Runner preloaded with `native:sort`, `native:bubble_sort` and `native:binary_search`
    pub fn with_builtins() -> Self {
        let mut runner = Self::new();
        runner.register("native:sort", |mut data| {
            data.sort_unstable();
            Ok(data)
        });
        runner.register("native:bubble_sort", |mut data| {
            let n = data.len();
            for i in 0..n {
                for j in 0..n.saturating_sub(i + 1) {
                    if data[j] > data[j + 1] {
                        data.swap(j, j + 1);
                    }
                }
            }
            Ok(data)
        });
        runner.register("native:binary_search", |data| {
            if data.is_empty() {
                return Ok(vec![-1]);
            }
            if data.windows(2).any(|w| w[0] > w[1]) {
                return Err("input is not sorted".to_string());
            }
            let target = data[data.len() / 2];
            let index = data.binary_search(&target).unwrap_or_else(|i| i);
            Ok(vec![index as i64])
        });
        runner
    }

    pub fn register<F>(&mut self, code: impl Into<String>, entry: F)
    where
        F: Fn(Vec<i64>) -> Result<Vec<i64>, String> + Send + Sync + 'static,
    {
        self.entries.insert(code.into(), Arc::new(entry));
    }
}

impl AlgorithmRunner for NativeRunner {
    fn bind(&self, _name: &str, code: &str) -> Result<Box<dyn BoundAlgorithm>, ExecutionFailure> {
        let key = code.trim();
        let entry = self
            .entries
            .get(key)
            .cloned()
            .ok_or_else(|| ExecutionFailure::UnknownEntry(key.to_string()))?;
        Ok(Box::new(BoundNative { entry }))
    }
}

struct BoundNative {
    entry: NativeFn,
}

#[async_trait]
impl BoundAlgorithm for BoundNative {
    async fn call(
        &self,
        input: &[i64],
        timeout: Option<Duration>,
    ) -> Result<RunSample, ExecutionFailure> {
        let entry = Arc::clone(&self.entry);
        let data = input.to_vec();
        let input_len = data.len();

        let task = tokio::task::spawn_blocking(move || {
            let started = Instant::now();
            let output = entry(data);
            (started.elapsed(), output)
        });

        let joined = match timeout {
            Some(limit) => tokio::time::timeout(limit, task)
                .await
                .map_err(|_| ExecutionFailure::TimedOut(limit))?,
            None => task.await,
        };

        let (elapsed, output) = joined.map_err(|e| {
            if e.is_panic() {
                ExecutionFailure::Panicked(panic_message(e.into_panic()))
            } else {
                ExecutionFailure::Raised(e.to_string())
            }
        })?;
        let output = output.map_err(ExecutionFailure::Raised)?;

        // Working set: the input copy plus the returned buffer
        let memory_bytes = ((input_len + output.len()) * std::mem::size_of::<i64>()) as u64;

        Ok(RunSample {
            elapsed,
            memory_bytes,
        })
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_builtin_sort() {
        let runner = NativeRunner::with_builtins();
        let bound = runner.bind("test", "native:sort").unwrap();
        let sample = bound.call(&[5, 3, 9, 1], None).await.unwrap();
        assert_eq!(sample.memory_bytes, 8 * 8);
    }

    #[tokio::test]
    async fn test_unknown_entry() {
        let runner = NativeRunner::new();
        assert!(matches!(
            runner.bind("test", "print('hi')"),
            Err(ExecutionFailure::UnknownEntry(_))
        ));
    }

    #[tokio::test]
    async fn test_error_and_panic_are_failures() {
        let mut runner = NativeRunner::new();
        runner.register("raise", |_| Err("bad input".to_string()));
        runner.register("panic", |_| panic!("index out of range"));

        let raised = runner.bind("test", "raise").unwrap().call(&[1], None).await;
        assert!(matches!(raised, Err(ExecutionFailure::Raised(ref m)) if m == "bad input"));

        let panicked = runner.bind("test", "panic").unwrap().call(&[1], None).await;
        assert!(
            matches!(panicked, Err(ExecutionFailure::Panicked(ref m)) if m.contains("index out of range"))
        );
    }

    #[tokio::test]
    async fn test_timeout() {
        let mut runner = NativeRunner::new();
        runner.register("slow", |data| {
            std::thread::sleep(Duration::from_millis(500));
            Ok(data)
        });

        let result = runner
            .bind("test", "slow")
            .unwrap()
            .call(&[1], Some(Duration::from_millis(50)))
            .await;
        assert!(matches!(result, Err(ExecutionFailure::TimedOut(_))));
    }

    #[tokio::test]
    async fn test_binary_search_requires_sorted_input() {
        let runner = NativeRunner::with_builtins();
        let bound = runner.bind("test", "native:binary_search").unwrap();
        assert!(bound.call(&[1, 2, 3, 4, 5], None).await.is_ok());
        assert!(bound.call(&[9, 1, 7, 3, 2], None).await.is_err());
    }
}
