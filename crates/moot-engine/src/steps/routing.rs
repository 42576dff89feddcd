use serde::Deserialize;
use tracing::debug;

use moot_core::error::{MootError, Result};
use moot_core::state::{Budget, Evidence, PresentationMode, Role, StateUpdate, Utterance};
use moot_core::step::StepId;

use super::generative::decide;
use super::{StepContext, StepOutcome};
use crate::prompts;

fn redirect(update: StateUpdate, next: StepId) -> Result<StepOutcome> {
    Ok(StepOutcome::Redirect { update, next })
}

#[derive(Debug, Deserialize)]
struct EvidenceChoice {
    #[serde(default)]
    current_evidence: Option<Vec<String>>,
    evidence_show_type: PresentationMode,
}

/// The prosecution picks its next exhibit, or stops presenting.
pub(super) async fn evidence_decision(ctx: &StepContext<'_>) -> Result<StepOutcome> {
    let state = ctx.state;
    // A spent budget ends the presentation without consulting the model, so
    // the recorded mode is withdrawn whatever the model would have picked.
    if state.evidence_budget.get() <= 0 {
        return conclude_evidence(ctx);
    }

    let choice: EvidenceChoice = decide(
        ctx,
        StepId::EvidenceDecision,
        Role::Prosecutor,
        prompts::evidence_decision(&state.evidence_catalog, state.evidence_budget.get()),
    )
    .await?;

    let ids = choice.current_evidence.unwrap_or_default();
    if choice.evidence_show_type == PresentationMode::Withdrawn || ids.is_empty() {
        return conclude_evidence(ctx);
    }

    let mut items: Vec<Evidence> = Vec::with_capacity(ids.len());
    for id in &ids {
        let item = state
            .evidence_catalog
            .iter()
            .find(|e| &e.id == id)
            .ok_or_else(|| {
                MootError::GenerationParse(format!(
                    "evidence decision named unknown evidence '{}'",
                    id
                ))
            })?;
        if !items.iter().any(|e| e.id == item.id) {
            items.push(item.clone());
        }
    }
    if choice.evidence_show_type == PresentationMode::Single && items.len() > 1 {
        debug!(selected = items.len(), "Single presentation keeps the first item");
        items.truncate(1);
    }

    redirect(
        StateUpdate::new()
            .with_pending_evidence(items)
            .with_presentation_mode(choice.evidence_show_type),
        StepId::ProsShowEvidence,
    )
}

fn conclude_evidence(ctx: &StepContext<'_>) -> Result<StepOutcome> {
    let closing = Utterance::new(
        Role::Prosecutor,
        ctx.state.speaker(Role::Prosecutor),
        prompts::EVIDENCE_CONCLUDED,
    );
    redirect(
        StateUpdate::new()
            .say(closing)
            .with_pending_evidence(Vec::new())
            .with_presentation_mode(PresentationMode::Withdrawn),
        StepId::JudgeConfirm,
    )
}

/// Open the next disputed point, or close the debate when none remain.
pub(super) fn focus_cursor(ctx: &StepContext<'_>) -> Result<StepOutcome> {
    let judge = |content: String| {
        Utterance::new(
            Role::PresidingJudge,
            ctx.state.speaker(Role::PresidingJudge),
            content,
        )
    };
    match ctx.state.current_focus() {
        Some(focus) => redirect(
            StateUpdate::new()
                .say(judge(prompts::resolving_focus(focus)))
                .with_focus_round_budget(Budget::new(ctx.budgets.focus_rounds)),
            StepId::FocusArgumentGate,
        ),
        None => redirect(
            StateUpdate::new().say(judge(prompts::DEBATE_CONCLUDED.to_string())),
            StepId::ProsSumup,
        ),
    }
}

/// Another exchange on the current point while rounds remain, otherwise
/// move the cursor on.
pub(super) fn focus_argument_gate(ctx: &StepContext<'_>) -> Result<StepOutcome> {
    if ctx.state.focus_round_budget.get() > 0 {
        redirect(StateUpdate::new(), StepId::ProsFocus)
    } else {
        redirect(
            StateUpdate::new().with_focus_index(ctx.state.focus_index + 1),
            StepId::FocusCursor,
        )
    }
}
