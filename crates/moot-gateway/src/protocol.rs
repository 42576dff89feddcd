//! Wire messages. Every frame is `{"type": ..., "data": {...}}`.

use serde::{Deserialize, Serialize};

use moot_core::error::MootError;
use moot_core::state::{CaseFacts, CourtState, Evidence, Phase, StateUpdate, Utterance};
use moot_core::step::StepId;
use moot_core::types::{InputKind, RunEvent, RunEventKind, RunId};

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct StartRun {
    pub case_facts: CaseFacts,
    #[serde(default)]
    pub evidence_catalog: Vec<Evidence>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Resume {
    pub run_id: RunId,
    pub step_id: String,
    pub input: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Retry {
    pub run_id: RunId,
}

/// A frame sent by the client.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientMessage {
    StartRun(StartRun),
    Resume(Resume),
    Retry(Retry),
    Ping,
}

#[derive(Deserialize)]
struct Envelope {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    data: serde_json::Value,
}

impl ClientMessage {
    /// Decode a text frame.
    ///
    /// A start_run frame whose payload does not describe a case is an
    /// invalid run payload; anything else that fails to decode is malformed.
    pub fn parse(text: &str) -> Result<Self, MootError> {
        let envelope: Envelope = serde_json::from_str(text)
            .map_err(|e| MootError::MalformedMessage(e.to_string()))?;
        let malformed = |e: serde_json::Error| {
            MootError::MalformedMessage(format!("{}: {}", envelope.kind, e))
        };

        match envelope.kind.as_str() {
            "start_run" => serde_json::from_value(envelope.data.clone())
                .map(Self::StartRun)
                .map_err(|e| MootError::InvalidRunPayload(e.to_string())),
            "resume" => serde_json::from_value(envelope.data.clone())
                .map(Self::Resume)
                .map_err(malformed),
            "retry" => serde_json::from_value(envelope.data.clone())
                .map(Self::Retry)
                .map_err(malformed),
            "ping" => Ok(Self::Ping),
            other => Err(MootError::MalformedMessage(format!(
                "unknown message type '{}'",
                other
            ))),
        }
    }

    pub fn run_id(&self) -> Option<&RunId> {
        match self {
            Self::Resume(r) => Some(&r.run_id),
            Self::Retry(r) => Some(&r.run_id),
            Self::StartRun(_) | Self::Ping => None,
        }
    }
}

/// A frame sent to the client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum ServerMessage {
    RunCreated {
        run_id: RunId,
    },
    StepCompleted {
        run_id: RunId,
        step_id: StepId,
        state_delta: StateUpdate,
        phase: Phase,
        progress_percent: u8,
        transcript_tail: Vec<Utterance>,
    },
    AwaitingInput {
        run_id: RunId,
        step_id: StepId,
        prompt: String,
        input_kind: InputKind,
        phase: Phase,
    },
    RunCompleted {
        run_id: RunId,
        final_state: Box<CourtState>,
    },
    Error {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        run_id: Option<RunId>,
        code: String,
        message: String,
    },
    Pong,
}

impl ServerMessage {
    pub fn error(run_id: Option<RunId>, err: &MootError) -> Self {
        Self::Error {
            run_id,
            code: err.code().to_string(),
            message: err.to_string(),
        }
    }

    pub fn run_id(&self) -> Option<&RunId> {
        match self {
            Self::RunCreated { run_id }
            | Self::StepCompleted { run_id, .. }
            | Self::AwaitingInput { run_id, .. }
            | Self::RunCompleted { run_id, .. } => Some(run_id),
            Self::Error { run_id, .. } => run_id.as_ref(),
            Self::Pong => None,
        }
    }
}

impl From<RunEvent> for ServerMessage {
    fn from(event: RunEvent) -> Self {
        let run_id = event.run_id;
        match event.kind {
            RunEventKind::StepCompleted {
                step_id,
                state_delta,
                phase,
                progress_percent,
                transcript_tail,
            } => Self::StepCompleted {
                run_id,
                step_id,
                state_delta,
                phase,
                progress_percent,
                transcript_tail,
            },
            RunEventKind::AwaitingInput {
                step_id,
                prompt,
                input_kind,
                phase,
            } => Self::AwaitingInput {
                run_id,
                step_id,
                prompt,
                input_kind,
                phase,
            },
            RunEventKind::RunCompleted { final_state } => Self::RunCompleted {
                run_id,
                final_state,
            },
            RunEventKind::RunError { code, message } => Self::Error {
                run_id: Some(run_id),
                code,
                message,
            },
        }
    }
}
