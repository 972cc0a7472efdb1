//! Spawns the external runtime CLI and captures its stdout/stderr/exit code.
//! Invokes the binary directly via `Command::new(...).args([...]).output()`
//! rather than through a PTY.

use async_trait::async_trait;
use tokio::process::Command;

/// Captured result of one CLI invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

impl RunOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Spawns the runtime CLI. No shell interpolation, no argument quoting —
/// arguments pass through unchanged.
#[async_trait]
pub trait RuntimeDriver: Send + Sync {
    async fn run(&self, args: &[String]) -> RunOutput;
}

/// Drives the real runtime binary (e.g. `container`) via `tokio::process`.
pub struct ProcessRuntimeDriver {
    binary: String,
}

impl ProcessRuntimeDriver {
    pub fn new(binary: impl Into<String>) -> Self {
        Self { binary: binary.into() }
    }
}

#[async_trait]
impl RuntimeDriver for ProcessRuntimeDriver {
    async fn run(&self, args: &[String]) -> RunOutput {
        match Command::new(&self.binary).args(args).output().await {
            Ok(output) => RunOutput {
                stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
                exit_code: output.status.code().unwrap_or(1),
            },
            Err(e) => RunOutput {
                stdout: String::new(),
                stderr: e.to_string(),
                exit_code: 1,
            },
        }
    }
}

/// Test driver returning prerecorded `(stdout, stderr, exit_code)` triples
/// matched by the exact argument vector, in call order for duplicate
/// argument vectors.
pub struct FakeRuntimeDriver {
    recordings: std::sync::Mutex<Vec<(Vec<String>, RunOutput)>>,
    calls: std::sync::Mutex<Vec<Vec<String>>>,
}

impl FakeRuntimeDriver {
    pub fn new() -> Self {
        Self {
            recordings: std::sync::Mutex::new(Vec::new()),
            calls: std::sync::Mutex::new(Vec::new()),
        }
    }

    /// Register the output to return the next time `args` is invoked.
    pub fn record(&self, args: &[&str], stdout: &str, stderr: &str, exit_code: i32) {
        self.recordings.lock().unwrap().push((
            args.iter().map(|s| s.to_string()).collect(),
            RunOutput {
                stdout: stdout.to_string(),
                stderr: stderr.to_string(),
                exit_code,
            },
        ));
    }

    pub fn calls(&self) -> Vec<Vec<String>> {
        self.calls.lock().unwrap().clone()
    }
}

impl Default for FakeRuntimeDriver {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RuntimeDriver for FakeRuntimeDriver {
    async fn run(&self, args: &[String]) -> RunOutput {
        self.calls.lock().unwrap().push(args.to_vec());
        let mut recordings = self.recordings.lock().unwrap();
        if let Some(pos) = recordings.iter().position(|(recorded, _)| recorded == args) {
            return recordings.remove(pos).1;
        }
        RunOutput {
            stdout: String::new(),
            stderr: format!("no recording for args {:?}", args),
            exit_code: 1,
        }
    }
}
