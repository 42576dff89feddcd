use moot_core::error::Result;
use moot_core::state::{Role, StateUpdate, Utterance};
use moot_core::step::StepId;
use moot_core::types::{EvidenceSubmission, HumanInput};

use super::{missing_input, StepContext, StepOutcome};
use crate::prompts;

fn answer(ctx: &StepContext<'_>, step: StepId) -> Result<bool> {
    match &ctx.input {
        Some(HumanInput::Boolean(yes)) => Ok(*yes),
        _ => Err(missing_input(step, "boolean")),
    }
}

fn counsel(ctx: &StepContext<'_>, content: impl Into<String>) -> Utterance {
    Utterance::new(
        Role::DefenseCounsel,
        ctx.state.speaker(Role::DefenseCounsel),
        content,
    )
}

fn redirect(update: StateUpdate, next: StepId) -> Result<StepOutcome> {
    Ok(StepOutcome::Redirect { update, next })
}

pub(super) fn objection_gate(ctx: &StepContext<'_>) -> Result<StepOutcome> {
    if answer(ctx, StepId::ObjectionGate)? {
        redirect(StateUpdate::new(), StepId::DefenseObjection)
    } else {
        redirect(StateUpdate::new(), StepId::ProsQuestion)
    }
}

pub(super) fn continue_questioning_gate(ctx: &StepContext<'_>) -> Result<StepOutcome> {
    if answer(ctx, StepId::ContinueQuestioningGate)? {
        redirect(StateUpdate::new(), StepId::DefenseQuestion)
    } else {
        redirect(
            StateUpdate::new().say(counsel(ctx, prompts::DEFENSE_QUESTIONS_CONCLUDED)),
            StepId::ProsSummary,
        )
    }
}

pub(super) fn supplemental_evidence_gate(ctx: &StepContext<'_>) -> Result<StepOutcome> {
    if answer(ctx, StepId::SupplementalEvidenceGate)? {
        redirect(StateUpdate::new(), StepId::DefenseShowEvidence)
    } else {
        redirect(
            StateUpdate::new().say(counsel(ctx, prompts::NO_SUPPLEMENTAL_EVIDENCE)),
            StepId::JudgeStartDebate,
        )
    }
}

fn spoken(ctx: &StepContext<'_>, step: StepId) -> Result<StateUpdate> {
    match &ctx.input {
        Some(HumanInput::Text(text)) => Ok(StateUpdate::new().say(counsel(ctx, text.clone()))),
        _ => Err(missing_input(step, "text")),
    }
}

/// Free-text turns: the counsel's words go into the transcript verbatim.
pub(super) fn counsel_speaks(ctx: &StepContext<'_>, step: StepId) -> Result<StepOutcome> {
    spoken(ctx, step).map(StepOutcome::Advance)
}

pub(super) fn defense_focus(ctx: &StepContext<'_>) -> Result<StepOutcome> {
    let update = spoken(ctx, StepId::DefenseFocus)?
        .with_focus_round_budget(ctx.state.focus_round_budget.decrement());
    Ok(StepOutcome::Advance(update))
}

pub(super) fn defense_show_evidence(ctx: &StepContext<'_>) -> Result<StepOutcome> {
    let Some(HumanInput::Evidence(EvidenceSubmission { items, note })) = &ctx.input else {
        return Err(missing_input(StepId::DefenseShowEvidence, "evidence"));
    };

    let mut content = format!(
        "The defense submits the following evidence:\n{}",
        prompts::describe_evidence(items)
    );
    if !note.trim().is_empty() {
        content.push('\n');
        content.push_str(note.trim());
    }

    Ok(StepOutcome::Advance(
        StateUpdate::new()
            .say(counsel(ctx, content))
            .with_pending_evidence(items.clone()),
    ))
}

#[cfg(test)]
mod tests {
    use moot_core::config::BudgetConfig;
    use moot_core::state::Budget;
    use moot_test_utils::{defense_evidence, ScriptedGenerator};

    use super::super::test_support::state;
    use super::*;

    fn run(
        step: fn(&StepContext<'_>) -> Result<StepOutcome>,
        input: Option<HumanInput>,
    ) -> Result<StepOutcome> {
        let s = state();
        let gen = ScriptedGenerator::new();
        let budgets = BudgetConfig::default();
        step(&StepContext {
            state: &s,
            generator: &gen,
            budgets: &budgets,
            input,
        })
    }

    #[test]
    fn objection_gate_routes_on_answer() {
        let yes = run(objection_gate, Some(HumanInput::Boolean(true))).unwrap();
        assert_eq!(
            yes,
            StepOutcome::Redirect {
                update: StateUpdate::new(),
                next: StepId::DefenseObjection
            }
        );
        let no = run(objection_gate, Some(HumanInput::Boolean(false))).unwrap();
        assert!(matches!(
            no,
            StepOutcome::Redirect {
                next: StepId::ProsQuestion,
                ..
            }
        ));
    }

    #[test]
    fn declining_more_questions_is_recorded() {
        let outcome = run(continue_questioning_gate, Some(HumanInput::Boolean(false))).unwrap();
        let (update, next) = outcome.into_parts();
        assert_eq!(next, Some(StepId::ProsSummary));
        assert_eq!(update.utterances.len(), 1);
        assert_eq!(update.utterances[0].role, Role::DefenseCounsel);
    }

    #[test]
    fn gate_without_boolean_fails() {
        let err = run(objection_gate, Some(HumanInput::Text("no".into()))).unwrap_err();
        assert_eq!(err.code(), "INVALID_INPUT");
    }

    #[test]
    fn defense_focus_spends_a_round() {
        let outcome = run(defense_focus, Some(HumanInput::Text("Disputed.".into()))).unwrap();
        let update = outcome.update();
        assert_eq!(update.utterances.len(), 1);
        assert_eq!(update.focus_round_budget, Some(Budget::new(1)));
    }

    #[test]
    fn evidence_submission_becomes_pending() {
        let input = HumanInput::Evidence(EvidenceSubmission {
            items: defense_evidence(),
            note: "Alibi.".into(),
        });
        let outcome = run(defense_show_evidence, Some(input)).unwrap();
        let update = outcome.update();
        assert_eq!(update.pending_evidence, Some(defense_evidence()));
        assert!(update.utterances[0].content.ends_with("Alibi."));
    }
}
