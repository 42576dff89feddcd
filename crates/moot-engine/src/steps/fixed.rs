use moot_core::error::Result;
use moot_core::state::{Phase, Role, StateUpdate, Utterance};

use super::{StepContext, StepOutcome};
use crate::prompts;

fn line(ctx: &StepContext<'_>, role: Role, content: impl Into<String>) -> Utterance {
    Utterance::new(role, ctx.state.speaker(role), content)
}

pub(super) fn clerk_rules(ctx: &StepContext<'_>) -> Result<StepOutcome> {
    Ok(StepOutcome::Advance(
        StateUpdate::new()
            .say(line(ctx, Role::Clerk, prompts::CLERK_ATTENDANCE))
            .say(line(ctx, Role::Clerk, prompts::CLERK_RULES))
            .with_phase(Phase::Opening),
    ))
}

pub(super) fn judge_open(ctx: &StepContext<'_>) -> Result<StepOutcome> {
    let text = prompts::judge_open(&ctx.state.case_facts);
    Ok(StepOutcome::Advance(
        StateUpdate::new().say(line(ctx, Role::PresidingJudge, text)),
    ))
}

pub(super) fn right_notify(ctx: &StepContext<'_>) -> Result<StepOutcome> {
    let text = prompts::right_notify(&ctx.state.case_facts);
    Ok(StepOutcome::Advance(
        StateUpdate::new()
            .say(line(ctx, Role::PresidingJudge, text))
            .say(line(ctx, Role::Defendant, prompts::DEFENDANT_NO_RECUSAL)),
    ))
}

pub(super) fn pros_indictment(ctx: &StepContext<'_>) -> Result<StepOutcome> {
    let text = prompts::indictment(&ctx.state.case_facts);
    Ok(StepOutcome::Advance(
        StateUpdate::new()
            .say(line(ctx, Role::Prosecutor, text))
            .with_phase(Phase::Investigation),
    ))
}

pub(super) fn judge_start_evidence(ctx: &StepContext<'_>) -> Result<StepOutcome> {
    Ok(StepOutcome::Advance(StateUpdate::new().say(line(
        ctx,
        Role::PresidingJudge,
        prompts::JUDGE_START_EVIDENCE,
    ))))
}

pub(super) fn judge_confirm(ctx: &StepContext<'_>) -> Result<StepOutcome> {
    Ok(StepOutcome::Advance(StateUpdate::new().say(line(
        ctx,
        Role::PresidingJudge,
        prompts::JUDGE_CONFIRM,
    ))))
}

pub(super) fn judge_start_debate(ctx: &StepContext<'_>) -> Result<StepOutcome> {
    Ok(StepOutcome::Advance(
        StateUpdate::new()
            .say(line(ctx, Role::PresidingJudge, prompts::JUDGE_START_DEBATE))
            .with_phase(Phase::Debate),
    ))
}

#[cfg(test)]
mod tests {
    use moot_core::config::BudgetConfig;
    use moot_test_utils::ScriptedGenerator;

    use super::super::test_support::state;
    use super::*;

    #[test]
    fn clerk_rules_speaks_twice_in_opening() {
        let s = state();
        let gen = ScriptedGenerator::new();
        let ctx = StepContext {
            state: &s,
            generator: &gen,
            budgets: &BudgetConfig::default(),
            input: None,
        };
        let StepOutcome::Advance(update) = clerk_rules(&ctx).unwrap() else {
            panic!("clerk_rules must advance");
        };
        assert_eq!(update.utterances.len(), 2);
        assert!(update.utterances.iter().all(|u| u.role == Role::Clerk));
        assert_eq!(update.utterances[0].speaker, "Clerk Li");
        assert_eq!(update.phase, Some(Phase::Opening));
        assert_eq!(gen.total_calls(), 0);
    }

    #[test]
    fn indictment_moves_to_investigation() {
        let s = state();
        let gen = ScriptedGenerator::new();
        let ctx = StepContext {
            state: &s,
            generator: &gen,
            budgets: &BudgetConfig::default(),
            input: None,
        };
        let outcome = pros_indictment(&ctx).unwrap();
        assert_eq!(outcome.update().phase, Some(Phase::Investigation));
        assert!(outcome.update().utterances[0]
            .content
            .contains(&s.case_facts.indictment));
    }
}
