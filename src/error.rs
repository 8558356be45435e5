use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("No home directory")]
    NoHomeDir,

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Graph error: {0}")]
    Graph(String),

    #[error("Depth exceeded: role {role} at tier {tier} cannot spawn child tasks")]
    DepthExceeded { role: String, tier: u8 },

    #[error("Operation {operation} is not allowed for role {role}")]
    OperationDenied { role: String, operation: String },

    #[error("Node {node} failed: {cause}")]
    NodeFailure { node: String, cause: String },

    #[error("Validation step '{step}' failed:\n{output}")]
    ValidationStepFailure { step: String, output: String },

    #[error("Invalid phase transition from {from} to {to}")]
    InvalidPhaseTransition { from: String, to: String },

    #[error("Operation timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("Task join error: {0}")]
    TaskJoin(String),
}

impl Error {
    /// Whether this error aborts a whole run instead of degrading to a
    /// reported status.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::Configuration(_)
                | Error::Graph(_)
                | Error::DepthExceeded { .. }
                | Error::OperationDenied { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;
