//! Validation gate for tierflow.
//!
//! Work passes through Red, Green and Refactor phases. Moving out of Green
//! requires an ordered run of quality checks (type check, lint, test,
//! doctor) that are either configured or synthesized from project files.

mod detect;
mod guard;
mod runner;
mod state;
mod types;

pub use detect::detect;
pub use guard::check_command;
pub use runner::{CommandRunner, StepOutcome, StepRunner};
pub use state::{GateDecision, PhaseHistoryEntry, ValidationGate};
pub use types::{GatePhase, RunId, StepKind, StepRecord, StepSpec, StepStatus, ValidationRun};
