//! Validation gate with phase transition enforcement.
//!
//! `ValidationGate` walks Red -> Green -> Refactor -> (Red | Complete). The
//! only way from Green to Refactor is a passing `ValidationRun`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info, warn};

use super::detect;
use super::runner::StepRunner;
use super::types::{GatePhase, RunId, StepRecord, StepSpec, StepStatus, ValidationRun};
use crate::core::{GraphOutcome, NodeId};
use crate::error::{Error, Result};
use crate::util;

/// A record of a phase transition with timestamp.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhaseHistoryEntry {
    pub phase: GatePhase,
    pub entered_at: DateTime<Utc>,
}

/// What `consume` did with a graph outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateDecision {
    /// The outcome had failures; the gate did not move.
    Held { failed: Vec<NodeId> },
    /// The outcome succeeded and a validation run followed.
    Validated(ValidationRun),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationGate {
    phase: GatePhase,
    phase_history: Vec<PhaseHistoryEntry>,
    /// Configured steps. Empty means synthesize from the project.
    steps: Vec<StepSpec>,
    last_run: Option<ValidationRun>,
}

impl Default for ValidationGate {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

impl ValidationGate {
    pub fn new(steps: Vec<StepSpec>) -> Self {
        Self {
            phase: GatePhase::Red,
            phase_history: vec![PhaseHistoryEntry {
                phase: GatePhase::Red,
                entered_at: Utc::now(),
            }],
            steps,
            last_run: None,
        }
    }

    /// Explicit transitions. Green -> Refactor is deliberately absent; it
    /// only happens inside `validate`.
    pub fn can_transition(&self, target: GatePhase) -> bool {
        matches!(
            (self.phase, target),
            (GatePhase::Red, GatePhase::Green)
                | (GatePhase::Refactor, GatePhase::Red)
                | (GatePhase::Refactor, GatePhase::Complete)
        )
    }

    pub fn transition(&mut self, target: GatePhase) -> Result<()> {
        if !self.can_transition(target) {
            return Err(self.invalid(target));
        }
        self.enter(target);
        Ok(())
    }

    pub fn current_phase(&self) -> GatePhase {
        self.phase
    }

    pub fn phase_history(&self) -> &[PhaseHistoryEntry] {
        &self.phase_history
    }

    pub fn last_run(&self) -> Option<&ValidationRun> {
        self.last_run.as_ref()
    }

    /// Configured steps, or the ones synthesized for `project`.
    pub async fn resolve_steps(&self, project: &Path) -> Result<Vec<StepSpec>> {
        if !self.steps.is_empty() {
            return Ok(self.steps.clone());
        }
        let dir = project.to_path_buf();
        util::blocking(move || detect::detect(&dir)).await
    }

    /// Run every step in order. The first failure skips the rest and holds
    /// the gate in Green; a clean pass advances it to Refactor.
    ///
    /// # Errors
    /// `InvalidPhaseTransition` outside Green, `Configuration` when there are
    /// no steps to run or synthesis fails.
    pub async fn validate(
        &mut self,
        runner: &dyn StepRunner,
        project: &Path,
    ) -> Result<ValidationRun> {
        if self.phase != GatePhase::Green {
            return Err(self.invalid(GatePhase::Refactor));
        }
        let steps = self.resolve_steps(project).await?;
        if steps.is_empty() {
            return Err(Error::Configuration(format!(
                "no validation steps configured or detected in {}",
                project.display()
            )));
        }

        let mut records = Vec::with_capacity(steps.len());
        let mut failed = false;
        for spec in &steps {
            if failed {
                records.push(StepRecord::skipped(spec));
                continue;
            }
            let record = run_step(runner, spec).await;
            failed = record.status == StepStatus::Fail;
            records.push(record);
        }

        let overall = if failed {
            StepStatus::Fail
        } else {
            StepStatus::Pass
        };
        if overall == StepStatus::Pass {
            self.enter(GatePhase::Refactor);
        }
        let run = ValidationRun {
            id: RunId::new(),
            steps: records,
            overall,
            phase: self.phase,
        };
        info!(
            run = %run.id.short(),
            overall = %run.overall,
            phase = %run.phase,
            "validation finished"
        );
        self.last_run = Some(run.clone());
        Ok(run)
    }

    /// Validate and proceed: a failed outcome holds the gate, a successful
    /// one moves Red to Green and then validates.
    pub async fn consume(
        &mut self,
        outcome: &GraphOutcome,
        runner: &dyn StepRunner,
        project: &Path,
    ) -> Result<GateDecision> {
        if !outcome.is_success() {
            let failed: Vec<NodeId> = outcome.failed().map(|r| r.id.clone()).collect();
            warn!(
                count = failed.len(),
                phase = %self.phase,
                "graph outcome has failures, gate held"
            );
            return Ok(GateDecision::Held { failed });
        }
        if self.phase == GatePhase::Red {
            self.transition(GatePhase::Green)?;
        }
        self.validate(runner, project)
            .await
            .map(GateDecision::Validated)
    }

    fn enter(&mut self, phase: GatePhase) {
        debug!(from = %self.phase, to = %phase, "gate transition");
        self.phase = phase;
        self.phase_history.push(PhaseHistoryEntry {
            phase,
            entered_at: Utc::now(),
        });
    }

    fn invalid(&self, target: GatePhase) -> Error {
        Error::InvalidPhaseTransition {
            from: self.phase.to_string(),
            to: target.to_string(),
        }
    }
}

async fn run_step(runner: &dyn StepRunner, spec: &StepSpec) -> StepRecord {
    let (status, output, exit_code) = match runner.run(spec).await {
        Ok(outcome) => {
            let status = if outcome.passed() {
                StepStatus::Pass
            } else {
                StepStatus::Fail
            };
            (status, outcome.output, outcome.exit_code)
        }
        Err(e) => (StepStatus::Fail, e.to_string(), None),
    };
    debug!(step = %spec.name, %status, ?exit_code, "step finished");
    StepRecord {
        name: spec.name.clone(),
        kind: spec.kind,
        command: spec.command_line(),
        status,
        output,
        exit_code,
    }
}
