//! Worker backed by a headless agent CLI.
//!
//! `AgentCliWorker` runs the agent command in print mode (`-p`) with JSON
//! output, passing the role's model and granted tools on the command line.

use async_trait::async_trait;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tokio::process::Command;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::orchestration::dispatcher::SpawnContext;
use crate::orchestration::worker::{Worker, WorkerRequest, WorkerResponse};
use crate::util;

/// Outcome reported by the agent.
#[derive(Debug, Clone, PartialEq)]
pub enum ResultType {
    Success { output: String },
    Error { message: String },
}

/// Parsed agent reply.
#[derive(Debug, Clone)]
pub struct AgentResponse {
    pub session_id: Option<String>,
    pub result: ResultType,
    pub cost_usd: Option<f64>,
    pub duration_ms: Option<u64>,
    pub num_turns: Option<u32>,
}

impl AgentResponse {
    fn from_result(result: ResultType) -> Self {
        Self {
            session_id: None,
            result,
            cost_usd: None,
            duration_ms: None,
            num_turns: None,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self.result, ResultType::Success { .. })
    }

    pub fn output(&self) -> Option<&str> {
        match &self.result {
            ResultType::Success { output } => Some(output),
            ResultType::Error { .. } => None,
        }
    }

    pub fn error_message(&self) -> Option<&str> {
        match &self.result {
            ResultType::Success { .. } => None,
            ResultType::Error { message } => Some(message),
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawAgentResponse {
    subtype: Option<String>,
    result: Option<String>,
    session_id: Option<String>,
    total_cost_usd: Option<f64>,
    duration_ms: Option<u64>,
    num_turns: Option<u32>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Clone)]
pub struct AgentCliWorker {
    binary: PathBuf,
    cwd: PathBuf,
}

impl AgentCliWorker {
    /// Locate `command` on `PATH`.
    ///
    /// # Errors
    /// Returns `Error::Configuration` if the command cannot be found.
    pub fn new(command: &str) -> Result<Self> {
        let binary = which::which(command).map_err(|_| {
            Error::Configuration(format!("agent command not found: {}", command))
        })?;
        Ok(Self::with_binary(binary))
    }

    pub fn with_binary(binary: PathBuf) -> Self {
        Self {
            binary,
            cwd: PathBuf::from("."),
        }
    }

    pub fn with_cwd(mut self, cwd: PathBuf) -> Self {
        self.cwd = cwd;
        self
    }

    pub fn binary(&self) -> &Path {
        &self.binary
    }

    /// Command-line arguments for one request.
    pub fn args(request: &WorkerRequest) -> Vec<String> {
        let mut args = vec![
            "-p".to_string(),
            request.instruction.clone(),
            "--output-format".to_string(),
            "json".to_string(),
        ];
        if let Some(model) = request.role.capability().model() {
            args.push("--model".to_string());
            args.push(model.to_string());
        }
        let tools: Vec<&str> = request
            .operations
            .iter()
            .flat_map(|op| op.tools().iter().copied())
            .collect();
        if !tools.is_empty() {
            args.push("--allowedTools".to_string());
            args.push(tools.join(","));
        }
        args
    }

    /// Run the agent for one request.
    ///
    /// # Errors
    /// Returns `Error::Timeout` when the request's timeout elapses and
    /// `Error::Io` when the process cannot be spawned.
    pub async fn execute(&self, request: &WorkerRequest) -> Result<AgentResponse> {
        let mut command = Command::new(&self.binary);
        command
            .args(Self::args(request))
            .current_dir(&self.cwd)
            .kill_on_drop(true);
        let output = util::with_timeout(request.timeout, async {
            command.output().await.map_err(Error::Io)
        })
        .await?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);

        if let Ok(response) = Self::parse_json_response(&stdout) {
            return Ok(response);
        }

        if !output.status.success() {
            let message = if stderr.trim().is_empty() {
                format!(
                    "agent exited with code {}",
                    output.status.code().unwrap_or(-1)
                )
            } else {
                stderr.trim().to_string()
            };
            return Ok(AgentResponse::from_result(ResultType::Error { message }));
        }

        Ok(AgentResponse::from_result(ResultType::Success {
            output: stdout.trim().to_string(),
        }))
    }

    pub fn parse_json_response(json_str: &str) -> Result<AgentResponse> {
        let raw: RawAgentResponse = serde_json::from_str(json_str)?;

        let result = match raw.subtype.as_deref() {
            Some("success") => ResultType::Success {
                output: raw.result.unwrap_or_default(),
            },
            Some("error") => ResultType::Error {
                message: raw.error.or(raw.result).unwrap_or_default(),
            },
            _ => match (raw.error, raw.result) {
                (Some(message), _) => ResultType::Error { message },
                (None, Some(output)) => ResultType::Success { output },
                (None, None) => ResultType::Error {
                    message: "unknown response format".to_string(),
                },
            },
        };

        Ok(AgentResponse {
            session_id: raw.session_id,
            result,
            cost_usd: raw.total_cost_usd,
            duration_ms: raw.duration_ms,
            num_turns: raw.num_turns,
        })
    }
}

#[async_trait]
impl Worker for AgentCliWorker {
    async fn invoke(&self, request: WorkerRequest, _ctx: SpawnContext) -> Result<WorkerResponse> {
        debug!(node = %request.node, role = %request.role.id(), "running agent");
        match self.execute(&request).await {
            Ok(response) => {
                if let Some(cost) = response.cost_usd {
                    debug!(node = %request.node, cost_usd = cost, "agent finished");
                }
                Ok(match response.result {
                    ResultType::Success { output } => WorkerResponse::text(output),
                    ResultType::Error { message } => WorkerResponse::failed(message),
                })
            }
            Err(Error::Timeout(_)) => Ok(WorkerResponse::timed_out()),
            Err(e) => {
                warn!(node = %request.node, error = %e, "agent failed to start");
                Ok(WorkerResponse::failed(e.to_string()))
            }
        }
    }
}
