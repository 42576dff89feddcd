use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::state::{CourtState, Evidence, Phase, StateUpdate, Utterance};
use crate::step::StepId;

/// Unique run identifier.
#[derive(Debug, Clone, Hash, Eq, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(pub String);

impl RunId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn from_string(s: &str) -> Self {
        Self(s.to_string())
    }

    /// Key under which this run's checkpoints are stored.
    pub fn checkpoint_key(&self) -> String {
        format!("court:{}", self.0)
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

/// Identifier of a client connection owning zero or more runs.
#[derive(Debug, Clone, Hash, Eq, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionId(pub String);

impl ConnectionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunStatus {
    Active,
    AwaitingInput,
    /// A step failed. The run waits for a retry, or for the resume that led
    /// here to be repeated.
    Stalled,
    Completed,
}

/// Shape of the input a human-input step accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InputKind {
    Boolean,
    Text,
    Evidence,
}

/// Evidence submitted by the defense.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvidenceSubmission {
    pub items: Vec<Evidence>,
    #[serde(default)]
    pub note: String,
}

/// Validated human input, ready to be handed to a step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HumanInput {
    Boolean(bool),
    Text(String),
    Evidence(EvidenceSubmission),
}

impl HumanInput {
    pub fn kind(&self) -> InputKind {
        match self {
            Self::Boolean(_) => InputKind::Boolean,
            Self::Text(_) => InputKind::Text,
            Self::Evidence(_) => InputKind::Evidence,
        }
    }
}

/// Resume pointer persisted with every checkpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "at", content = "step", rename_all = "snake_case")]
pub enum Cursor {
    /// Next step to execute.
    Ready(StepId),
    /// Suspended inside a human-input step.
    Awaiting(StepId),
    Finished,
}

impl Cursor {
    pub fn step(&self) -> Option<StepId> {
        match self {
            Self::Ready(s) | Self::Awaiting(s) => Some(*s),
            Self::Finished => None,
        }
    }
}

/// A persisted snapshot of one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub key: String,
    pub run_id: RunId,
    pub state: CourtState,
    pub cursor: Cursor,
    /// Human step whose input this run last committed. Lets a repeated
    /// resume of that step re-drive a stalled run instead of being refused.
    #[serde(default)]
    pub answered: Option<StepId>,
    pub sequence: u64,
    pub saved_at: DateTime<Utc>,
}

/// Whether a generation call returns prose or a JSON object.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseFormat {
    #[default]
    Text,
    Json,
}

/// A single request to the generation backend.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub step: StepId,
    /// Display name of the role being voiced.
    pub speaker: String,
    pub instruction: String,
    /// Transcript so far, oldest first.
    pub transcript: Vec<Utterance>,
    pub format: ResponseFormat,
}

/// Events published by the engine for a run.
#[derive(Debug, Clone)]
pub struct RunEvent {
    pub run_id: RunId,
    pub kind: RunEventKind,
}

#[derive(Debug, Clone)]
pub enum RunEventKind {
    StepCompleted {
        step_id: StepId,
        state_delta: StateUpdate,
        phase: Phase,
        progress_percent: u8,
        transcript_tail: Vec<Utterance>,
    },
    AwaitingInput {
        step_id: StepId,
        prompt: String,
        input_kind: InputKind,
        phase: Phase,
    },
    RunCompleted {
        final_state: Box<CourtState>,
    },
    RunError {
        code: String,
        message: String,
    },
}
