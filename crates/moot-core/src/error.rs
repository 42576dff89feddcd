use thiserror::Error;

#[derive(Debug, Error)]
pub enum MootError {
    // Request errors
    #[error("Invalid input for step {step}: {message}")]
    InvalidInput { step: String, message: String },

    #[error("Invalid run payload: {0}")]
    InvalidRunPayload(String),

    #[error("Unknown run: {0}")]
    UnknownRun(String),

    #[error("Step {step} is not pending for run {run_id}")]
    UnknownStep { run_id: String, step: String },

    #[error("Malformed message: {0}")]
    MalformedMessage(String),

    // Generation errors
    #[error("Generation rate limited: {0}")]
    RateLimited(String),

    #[error("Generation request failed: {0}")]
    Generation(String),

    #[error("Generation response parse error: {0}")]
    GenerationParse(String),

    // Engine errors
    #[error("State invariant violated: {0}")]
    Invariant(String),

    #[error("Topology error: {0}")]
    Topology(String),

    #[error("Checkpoint error: {0}")]
    Checkpoint(String),

    // Config errors
    #[error("Config error: {0}")]
    Config(String),

    #[error("Config file not found: {0}")]
    ConfigNotFound(String),

    // Gateway errors
    #[error("Gateway error: {0}")]
    Gateway(String),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // JSON errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl MootError {
    /// Stable error code reported to clients in `error` messages.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidInput { .. } => "INVALID_INPUT",
            Self::InvalidRunPayload(_) => "INVALID_RUN_PAYLOAD",
            Self::UnknownRun(_) => "UNKNOWN_RUN",
            Self::UnknownStep { .. } => "UNKNOWN_STEP",
            Self::MalformedMessage(_) => "MALFORMED_MESSAGE",
            Self::RateLimited(_) | Self::Generation(_) | Self::GenerationParse(_) => {
                "GENERATION_FAILED"
            }
            Self::Invariant(_) => "INVARIANT_VIOLATION",
            Self::Topology(_) => "TOPOLOGY_ERROR",
            Self::Checkpoint(_) => "CHECKPOINT_ERROR",
            Self::Config(_) | Self::ConfigNotFound(_) => "CONFIG_ERROR",
            Self::Gateway(_) | Self::Io(_) | Self::Json(_) => "INTERNAL_ERROR",
        }
    }

    /// Only rate-limit failures are worth another attempt.
    pub fn is_rate_limit(&self) -> bool {
        matches!(self, Self::RateLimited(_))
    }
}

pub type Result<T> = std::result::Result<T, MootError>;
