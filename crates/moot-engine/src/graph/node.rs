use serde::{Deserialize, Serialize};

use moot_core::step::StepId;
use moot_core::types::InputKind;

/// What a step does when the engine reaches it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "input", rename_all = "snake_case")]
pub enum StepKind {
    /// Emits scripted utterances.
    Fixed,
    /// Calls the generation backend.
    Generative,
    /// Suspends the run until the human supplies input of the given shape.
    HumanInput(InputKind),
    /// Picks the next step from the state without suspending.
    Routing,
}

impl StepKind {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Fixed => "fixed",
            Self::Generative => "generative",
            Self::HumanInput(_) => "human_input",
            Self::Routing => "routing",
        }
    }
}

/// A node in the trial topology.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    pub id: StepId,
    pub kind: StepKind,
    /// Reported as `progress_percent` once the step completes.
    pub progress: u8,
}

impl Node {
    pub fn new(id: StepId, kind: StepKind, progress: u8) -> Self {
        Self { id, kind, progress }
    }

    pub fn fixed(id: StepId, progress: u8) -> Self {
        Self::new(id, StepKind::Fixed, progress)
    }

    pub fn generative(id: StepId, progress: u8) -> Self {
        Self::new(id, StepKind::Generative, progress)
    }

    pub fn human(id: StepId, input: InputKind, progress: u8) -> Self {
        Self::new(id, StepKind::HumanInput(input), progress)
    }

    pub fn routing(id: StepId, progress: u8) -> Self {
        Self::new(id, StepKind::Routing, progress)
    }

    pub fn input_kind(&self) -> Option<InputKind> {
        match self.kind {
            StepKind::HumanInput(kind) => Some(kind),
            _ => None,
        }
    }
}
