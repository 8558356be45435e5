//! Execution boundary for validation steps.

use async_trait::async_trait;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, warn};

use super::guard;
use super::types::StepSpec;
use crate::error::Result;

/// Raw result of running one step. `exit_code` is `None` when the process
/// never produced one (refused, failed to spawn, timed out, killed).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepOutcome {
    pub exit_code: Option<i32>,
    pub output: String,
}

impl StepOutcome {
    pub fn exited(code: i32, output: impl Into<String>) -> Self {
        Self {
            exit_code: Some(code),
            output: output.into(),
        }
    }

    pub fn aborted(output: impl Into<String>) -> Self {
        Self {
            exit_code: None,
            output: output.into(),
        }
    }

    pub fn passed(&self) -> bool {
        self.exit_code == Some(0)
    }
}

#[async_trait]
pub trait StepRunner: Send + Sync {
    async fn run(&self, step: &StepSpec) -> Result<StepOutcome>;
}

/// Runs steps as child processes in the project directory.
#[derive(Debug, Clone)]
pub struct CommandRunner {
    cwd: PathBuf,
    timeout: Duration,
}

impl CommandRunner {
    pub fn new(cwd: PathBuf, timeout: Duration) -> Self {
        Self { cwd, timeout }
    }
}

#[async_trait]
impl StepRunner for CommandRunner {
    async fn run(&self, step: &StepSpec) -> Result<StepOutcome> {
        let command = step.command_line();
        if let Some(reason) = guard::check_command(&command) {
            warn!(step = %step.name, %command, "step refused");
            return Ok(StepOutcome::aborted(reason));
        }

        debug!(step = %step.name, %command, cwd = %self.cwd.display(), "running step");
        let child = Command::new(&step.program)
            .args(&step.args)
            .current_dir(&self.cwd)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output();

        let output = match tokio::time::timeout(self.timeout, child).await {
            Err(_) => {
                warn!(step = %step.name, timeout = ?self.timeout, "step timed out");
                return Ok(StepOutcome::aborted(format!(
                    "{} timed out after {:?}",
                    command, self.timeout
                )));
            }
            Ok(Err(e)) => {
                warn!(step = %step.name, error = %e, "step failed to start");
                return Ok(StepOutcome::aborted(format!(
                    "failed to run {}: {}",
                    step.program, e
                )));
            }
            Ok(Ok(output)) => output,
        };

        let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
        text.push_str(&String::from_utf8_lossy(&output.stderr));
        Ok(match output.status.code() {
            Some(code) => StepOutcome::exited(code, text),
            None => StepOutcome::aborted(text),
        })
    }
}
