//! Step functions.
//!
//! Every step reads the current state (and, for human-input steps, the
//! validated input) and returns a partial update. Steps never write to the
//! state themselves; the engine merges the update once the step succeeds.

mod fixed;
mod generative;
mod human;
mod routing;

use moot_core::config::BudgetConfig;
use moot_core::error::{MootError, Result};
use moot_core::state::{CourtState, StateUpdate};
use moot_core::step::StepId;
use moot_core::traits::Generator;
use moot_core::types::HumanInput;

/// Everything a step may look at.
pub struct StepContext<'a> {
    pub state: &'a CourtState,
    pub generator: &'a dyn Generator,
    /// Initial budgets, for steps that reset a counter.
    pub budgets: &'a BudgetConfig,
    pub input: Option<HumanInput>,
}

/// Result of a step: follow the static edges, or jump to a declared target.
#[derive(Debug, Clone, PartialEq)]
pub enum StepOutcome {
    Advance(StateUpdate),
    Redirect { update: StateUpdate, next: StepId },
}

impl StepOutcome {
    pub fn update(&self) -> &StateUpdate {
        match self {
            Self::Advance(update) | Self::Redirect { update, .. } => update,
        }
    }

    pub fn into_parts(self) -> (StateUpdate, Option<StepId>) {
        match self {
            Self::Advance(update) => (update, None),
            Self::Redirect { update, next } => (update, Some(next)),
        }
    }
}

/// Execute one step.
pub async fn run_step(step: StepId, ctx: StepContext<'_>) -> Result<StepOutcome> {
    use StepId::*;

    match step {
        ClerkRules => fixed::clerk_rules(&ctx),
        JudgeOpen => fixed::judge_open(&ctx),
        JudgeCheck => generative::judge_check(&ctx).await,
        RightNotify => fixed::right_notify(&ctx),
        ProsIndictment => fixed::pros_indictment(&ctx),
        ObjectionGate => human::objection_gate(&ctx),
        DefenseObjection => human::counsel_speaks(&ctx, step),
        ProsQuestion => generative::pros_question(&ctx).await,
        DefenseReply => generative::defense_reply(&ctx).await,
        ContinueQuestioningGate => human::continue_questioning_gate(&ctx),
        DefenseQuestion => human::counsel_speaks(&ctx, step),
        ProsSummary => generative::pros_summary(&ctx).await,
        DefenseSummary => human::counsel_speaks(&ctx, step),
        JudgeStartEvidence => fixed::judge_start_evidence(&ctx),
        EvidenceDecision => routing::evidence_decision(&ctx).await,
        ProsShowEvidence => generative::pros_show_evidence(&ctx).await,
        DefenseCross => human::counsel_speaks(&ctx, step),
        JudgeConfirm => fixed::judge_confirm(&ctx),
        SupplementalEvidenceGate => human::supplemental_evidence_gate(&ctx),
        DefenseShowEvidence => human::defense_show_evidence(&ctx),
        ProsCross => generative::pros_cross(&ctx).await,
        JudgeStartDebate => fixed::judge_start_debate(&ctx),
        ProsStatement => generative::pros_statement(&ctx).await,
        DefenseSelfStatement => generative::defense_self_statement(&ctx).await,
        DefenseStatement => human::counsel_speaks(&ctx, step),
        JudgeSummary => generative::judge_summary(&ctx).await,
        FocusCursor => routing::focus_cursor(&ctx),
        FocusArgumentGate => routing::focus_argument_gate(&ctx),
        ProsFocus => generative::pros_focus(&ctx).await,
        DefenseFocus => human::defense_focus(&ctx),
        ProsSumup => generative::pros_sumup(&ctx).await,
        DefenseSumup => human::counsel_speaks(&ctx, step),
        DefenseFinalStatement => generative::defense_final_statement(&ctx).await,
        JudgeVerdict => generative::judge_verdict(&ctx).await,
    }
}

fn missing_input(step: StepId, expected: &str) -> MootError {
    MootError::InvalidInput {
        step: step.to_string(),
        message: format!("expected {} input", expected),
    }
}
