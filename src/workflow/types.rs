//! Validation gate type definitions.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result};

/// Unique identifier for one validation run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(pub Uuid);

impl RunId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// First 8 characters of the UUID for display.
    pub fn short(&self) -> String {
        self.0.to_string()[..8].to_string()
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Phases of the red/green/refactor gate.
///
/// Red -> Green -> Refactor -> (Red | Complete). Green -> Refactor only
/// through a passing validation run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum GatePhase {
    /// No passing implementation yet.
    #[default]
    Red,
    /// Tests pass, full validation pending.
    Green,
    /// Validation passed, cleanup permitted.
    Refactor,
    Complete,
}

impl std::fmt::Display for GatePhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GatePhase::Red => write!(f, "red"),
            GatePhase::Green => write!(f, "green"),
            GatePhase::Refactor => write!(f, "refactor"),
            GatePhase::Complete => write!(f, "complete"),
        }
    }
}

/// What a step checks. Synthesized steps for one ecosystem run in this order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
    TypeCheck,
    Lint,
    Test,
    Doctor,
    Custom,
}

impl std::fmt::Display for StepKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StepKind::TypeCheck => write!(f, "type_check"),
            StepKind::Lint => write!(f, "lint"),
            StepKind::Test => write!(f, "test"),
            StepKind::Doctor => write!(f, "doctor"),
            StepKind::Custom => write!(f, "custom"),
        }
    }
}

/// One configured or synthesized validation step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepSpec {
    pub name: String,
    #[serde(default = "default_kind")]
    pub kind: StepKind,
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
}

fn default_kind() -> StepKind {
    StepKind::Custom
}

impl StepSpec {
    pub fn new(name: &str, kind: StepKind, program: &str, args: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            kind,
            program: program.to_string(),
            args: args.iter().map(|a| a.to_string()).collect(),
        }
    }

    /// The full command line, for display and guarding.
    pub fn command_line(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Pass,
    Fail,
    Skipped,
}

impl std::fmt::Display for StepStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StepStatus::Pass => write!(f, "PASS"),
            StepStatus::Fail => write!(f, "FAIL"),
            StepStatus::Skipped => write!(f, "SKIPPED"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepRecord {
    pub name: String,
    pub kind: StepKind,
    pub command: String,
    pub status: StepStatus,
    /// Captured output, verbatim.
    pub output: String,
    pub exit_code: Option<i32>,
}

impl StepRecord {
    pub fn skipped(spec: &StepSpec) -> Self {
        Self {
            name: spec.name.clone(),
            kind: spec.kind,
            command: spec.command_line(),
            status: StepStatus::Skipped,
            output: String::new(),
            exit_code: None,
        }
    }
}

/// Ordered record of one validation pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationRun {
    pub id: RunId,
    pub steps: Vec<StepRecord>,
    /// Pass or Fail, never Skipped.
    pub overall: StepStatus,
    /// Phase the gate was in when the run finished.
    pub phase: GatePhase,
}

impl ValidationRun {
    pub fn passed(&self) -> bool {
        self.overall == StepStatus::Pass
    }

    /// The step that failed, if any.
    pub fn failure(&self) -> Option<&StepRecord> {
        self.steps.iter().find(|s| s.status == StepStatus::Fail)
    }

    /// Convert a failed run into `Error::ValidationStepFailure` carrying the
    /// failing step's output verbatim.
    pub fn ensure_passed(&self) -> Result<()> {
        match self.failure() {
            Some(step) => Err(Error::ValidationStepFailure {
                step: step.name.clone(),
                output: step.output.clone(),
            }),
            None => Ok(()),
        }
    }
}
