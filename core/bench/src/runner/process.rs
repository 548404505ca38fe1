use async_trait::async_trait;
use serde::Deserialize;
use std::io::{self, Write};
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use tempfile::{NamedTempFile, TempPath};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, Command};
use tracing::debug;

use super::{AlgorithmRunner, BoundAlgorithm, RunSample};
use crate::config::{ProcessRunnerConfig, CODE_PLACEHOLDER, DRIVER_PLACEHOLDER};
use crate::error::{ExecutionFailure, HarnessError};

/// Python driver that loads a version, picks its entry callable and times one call
const PYTHON_DRIVER: &str = include_str!("driver.py");

/// Environment variable carrying the algorithm name to the driver
pub const ENTRY_HINT_ENV: &str = "ALGO_ENTRY_HINT";

const STDERR_TAIL_BYTES: usize = 2048;

/// Runs each version in its own child process.
///
/// The code is written to a temporary file and launched with the configured
/// command, by default the bundled Python driver. The dataset arrives on stdin
/// as a JSON array, and the child reports the timing of the entry callable
/// alone as its last stdout line. A crash or hang in the child cannot reach
/// harness or store state; on timeout its whole process group is killed.
pub struct ProcessRunner {
    command: Vec<String>,
    // Present only when the command references `{driver}`
    driver: Option<TempPath>,
}

impl ProcessRunner {
    pub fn new(config: ProcessRunnerConfig) -> Result<Self, HarnessError> {
        if config.command.is_empty() || config.command[0].trim().is_empty() {
            return Err(HarnessError::Config("runner command is empty".to_string()));
        }

        let driver = if config
            .command
            .iter()
            .any(|arg| arg.contains(DRIVER_PLACEHOLDER))
        {
            Some(write_temp("algo-driver-", ".py", PYTHON_DRIVER)?)
        } else {
            None
        };

        Ok(Self {
            command: config.command,
            driver,
        })
    }
}

impl AlgorithmRunner for ProcessRunner {
    fn bind(&self, name: &str, code: &str) -> Result<Box<dyn BoundAlgorithm>, ExecutionFailure> {
        let code_path = write_temp("algo-version-", ".src", code)?;
        let code_str = code_path.to_string_lossy().to_string();
        let driver_str = self
            .driver
            .as_ref()
            .map(|p| p.to_string_lossy().to_string())
            .unwrap_or_default();

        let expand = |arg: &String| {
            arg.replace(DRIVER_PLACEHOLDER, &driver_str)
                .replace(CODE_PLACEHOLDER, &code_str)
        };
        let program = expand(&self.command[0]);
        let mut args: Vec<String> = self.command[1..].iter().map(expand).collect();
        if !self.command.iter().any(|arg| arg.contains(CODE_PLACEHOLDER)) {
            args.push(code_str);
        }

        Ok(Box::new(BoundProcess {
            program,
            args,
            entry_hint: name.to_string(),
            _code_path: code_path,
        }))
    }
}

fn write_temp(prefix: &str, suffix: &str, contents: &str) -> io::Result<TempPath> {
    let mut file: NamedTempFile = tempfile::Builder::new()
        .prefix(prefix)
        .suffix(suffix)
        .tempfile()?;
    file.write_all(contents.as_bytes())?;
    file.flush()?;
    Ok(file.into_temp_path())
}

struct BoundProcess {
    program: String,
    args: Vec<String>,
    entry_hint: String,
    // Removed when the binding is dropped
    _code_path: TempPath,
}

/// Last stdout line of a successful run
#[derive(Debug, Deserialize)]
struct MeasurementReport {
    elapsed: f64,
    peak: u64,
}

#[async_trait]
impl BoundAlgorithm for BoundProcess {
    async fn call(
        &self,
        input: &[i64],
        timeout: Option<Duration>,
    ) -> Result<RunSample, ExecutionFailure> {
        let payload = serde_json::to_vec(input).map_err(io::Error::from)?;

        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .env(ENTRY_HINT_ENV, &self.entry_hint)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        #[cfg(unix)]
        command.process_group(0);

        let mut child = command
            .spawn()
            .map_err(|e| ExecutionFailure::Spawn(format!("{}: {}", self.program, e)))?;

        let run = run_to_exit(&mut child, payload);
        let finished = match timeout {
            Some(limit) => tokio::time::timeout(limit, run).await.map_err(|_| limit),
            None => Ok(run.await),
        };
        let (status, stdout, stderr) = match finished {
            Ok(result) => result?,
            Err(limit) => {
                kill_process_group(&mut child).await;
                return Err(ExecutionFailure::TimedOut(limit));
            }
        };

        if !status.success() {
            return Err(ExecutionFailure::NonZeroExit {
                code: status.code(),
                stderr: tail(&stderr),
            });
        }

        parse_report(&stdout)
    }
}

/// Feed stdin and collect stdout and stderr until the child exits.
async fn run_to_exit(
    child: &mut Child,
    payload: Vec<u8>,
) -> Result<(ExitStatus, Vec<u8>, Vec<u8>), ExecutionFailure> {
    let stdin = child.stdin.take();
    let stdout = child.stdout.take();
    let stderr = child.stderr.take();

    let feed = async move {
        if let Some(mut stdin) = stdin {
            // Code that never reads its input closes the pipe early
            if let Err(e) = stdin.write_all(&payload).await {
                debug!("stdin write stopped: {}", e);
            }
        }
    };

    let drain_stdout = async move {
        let mut buf = Vec::new();
        if let Some(mut stdout) = stdout {
            let _ = stdout.read_to_end(&mut buf).await;
        }
        buf
    };

    let drain_stderr = async move {
        let mut buf = Vec::new();
        if let Some(mut stderr) = stderr {
            let _ = stderr.read_to_end(&mut buf).await;
        }
        buf
    };

    let ((), stdout, stderr, status) =
        tokio::join!(feed, drain_stdout, drain_stderr, child.wait());
    Ok((status?, stdout, stderr))
}

/// Kill the child together with anything it spawned.
async fn kill_process_group(child: &mut Child) {
    if let Some(pid) = child.id() {
        signal_group(pid);
    }
    if let Err(e) = child.kill().await {
        debug!("kill failed: {}", e);
    }
}

#[cfg(unix)]
fn signal_group(pid: u32) {
    use nix::sys::signal::{killpg, Signal};
    use nix::unistd::Pid;

    // The child leads its own group, so its pid is the group id
    if let Err(e) = killpg(Pid::from_raw(pid as i32), Signal::SIGKILL) {
        debug!("killpg {} failed: {}", pid, e);
    }
}

#[cfg(not(unix))]
fn signal_group(_pid: u32) {}

fn parse_report(stdout: &[u8]) -> Result<RunSample, ExecutionFailure> {
    let text = String::from_utf8_lossy(stdout);
    let line = text
        .lines()
        .rev()
        .find(|line| !line.trim().is_empty())
        .ok_or_else(|| ExecutionFailure::MalformedReport("no output".to_string()))?;

    let report: MeasurementReport = serde_json::from_str(line.trim())
        .map_err(|e| ExecutionFailure::MalformedReport(format!("{}: {:?}", e, line)))?;
    if !report.elapsed.is_finite() || report.elapsed < 0.0 {
        return Err(ExecutionFailure::MalformedReport(format!(
            "invalid elapsed time {}",
            report.elapsed
        )));
    }

    Ok(RunSample {
        elapsed: Duration::from_secs_f64(report.elapsed),
        memory_bytes: report.peak,
    })
}

fn tail(stderr: &[u8]) -> String {
    let start = stderr.len().saturating_sub(STDERR_TAIL_BYTES);
    String::from_utf8_lossy(&stderr[start..]).trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_report_uses_last_line() {
        let stdout = b"debug output\n{\"elapsed\": 0.5, \"peak\": 2048}\n\n";
        let sample = parse_report(stdout).unwrap();
        assert_eq!(sample.elapsed, Duration::from_millis(500));
        assert_eq!(sample.memory_bytes, 2048);
    }

    #[test]
    fn test_parse_report_rejects_garbage() {
        assert!(matches!(
            parse_report(b""),
            Err(ExecutionFailure::MalformedReport(_))
        ));
        assert!(matches!(
            parse_report(b"sorted!\n"),
            Err(ExecutionFailure::MalformedReport(_))
        ));
        assert!(matches!(
            parse_report(b"{\"elapsed\": -1.0, \"peak\": 0}"),
            Err(ExecutionFailure::MalformedReport(_))
        ));
    }

    #[test]
    fn test_empty_command_rejected() {
        assert!(ProcessRunner::new(ProcessRunnerConfig { command: vec![] }).is_err());
    }

    #[test]
    fn test_driver_written_only_when_referenced() {
        let plain = ProcessRunner::new(ProcessRunnerConfig {
            command: vec!["sh".to_string(), CODE_PLACEHOLDER.to_string()],
        })
        .unwrap();
        assert!(plain.driver.is_none());

        let driven = ProcessRunner::new(ProcessRunnerConfig::default()).unwrap();
        let path = driven.driver.as_ref().unwrap();
        assert_eq!(std::fs::read_to_string(path).unwrap(), PYTHON_DRIVER);
    }

    #[cfg(unix)]
    mod unix {
        use super::*;
        use std::time::Instant;

        const REPORT: &str = r#"echo '{"elapsed": 0.25, "peak": 4096}'"#;

        fn sh_runner() -> ProcessRunner {
            ProcessRunner::new(ProcessRunnerConfig {
                command: vec!["sh".to_string(), CODE_PLACEHOLDER.to_string()],
            })
            .unwrap()
        }

        #[tokio::test]
        async fn test_reported_measurement_is_used() {
            let script = format!("cat > /dev/null\n{}", REPORT);
            let bound = sh_runner().bind("Reader", &script).unwrap();
            let sample = bound.call(&[3, 1, 2], None).await.unwrap();
            assert_eq!(sample.elapsed, Duration::from_millis(250));
            assert_eq!(sample.memory_bytes, 4096);
        }

        #[tokio::test]
        async fn test_clean_exit_without_report_fails() {
            let bound = sh_runner().bind("Silent", "cat > /dev/null").unwrap();
            assert!(matches!(
                bound.call(&[1], None).await,
                Err(ExecutionFailure::MalformedReport(_))
            ));
        }

        #[tokio::test]
        async fn test_entry_hint_is_exported() {
            let script = format!(
                "[ \"${}\" = \"Bubble Sort\" ] || exit 9\n{}",
                ENTRY_HINT_ENV, REPORT
            );
            let bound = sh_runner().bind("Bubble Sort", &script).unwrap();
            assert!(bound.call(&[1], None).await.is_ok());
        }

        #[tokio::test]
        async fn test_nonzero_exit_reports_stderr() {
            let bound = sh_runner().bind("Crasher", "echo boom >&2\nexit 3").unwrap();
            match bound.call(&[1], None).await {
                Err(ExecutionFailure::NonZeroExit { code, stderr }) => {
                    assert_eq!(code, Some(3));
                    assert_eq!(stderr, "boom");
                }
                other => panic!("expected NonZeroExit, got {:?}", other),
            }
        }

        #[tokio::test]
        async fn test_timeout_kills_child() {
            let bound = sh_runner().bind("Sleeper", "sleep 5").unwrap();
            let started = Instant::now();
            let result = bound.call(&[1], Some(Duration::from_millis(200))).await;
            assert!(matches!(result, Err(ExecutionFailure::TimedOut(_))));
            assert!(started.elapsed() < Duration::from_secs(4));
        }

        #[cfg(target_os = "linux")]
        #[tokio::test]
        async fn test_timeout_kills_grandchildren() {
            let pid_file = tempfile::NamedTempFile::new().unwrap();
            let script = format!(
                "sleep 30 &\necho $! > {}\nwait",
                pid_file.path().display()
            );
            let bound = sh_runner().bind("Spawner", &script).unwrap();
            let result = bound.call(&[1], Some(Duration::from_millis(500))).await;
            assert!(matches!(result, Err(ExecutionFailure::TimedOut(_))));

            let pid = std::fs::read_to_string(pid_file.path()).unwrap();
            let pid: u32 = pid.trim().parse().unwrap();

            // Dead or a zombie waiting to be reaped
            let mut gone = false;
            for _ in 0..50 {
                match std::fs::read_to_string(format!("/proc/{}/status", pid)) {
                    Err(_) => gone = true,
                    Ok(status) => {
                        gone = status
                            .lines()
                            .any(|l| l.starts_with("State:") && l.contains('Z'))
                    }
                }
                if gone {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
            assert!(gone, "grandchild {} survived the timeout", pid);
        }

        #[tokio::test]
        async fn test_missing_program() {
            let runner = ProcessRunner::new(ProcessRunnerConfig {
                command: vec!["definitely-not-a-real-binary-xyz".to_string()],
            })
            .unwrap();
            let bound = runner.bind("Missing", "irrelevant").unwrap();
            assert!(matches!(
                bound.call(&[1], None).await,
                Err(ExecutionFailure::Spawn(_))
            ));
        }
    }
}
