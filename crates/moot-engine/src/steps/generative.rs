use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::debug;

use moot_core::error::{MootError, Result};
use moot_core::state::{Evidence, Phase, PresentationMode, Role, StateUpdate, Utterance};
use moot_core::step::StepId;
use moot_core::types::{GenerationRequest, ResponseFormat};

use super::{StepContext, StepOutcome};
use crate::prompts;

/// Ask the generator for `role`'s next utterance.
pub(super) async fn speak(
    ctx: &StepContext<'_>,
    step: StepId,
    role: Role,
    instruction: impl Into<String>,
) -> Result<Utterance> {
    let speaker = ctx.state.speaker(role);
    let content = ctx
        .generator
        .generate(GenerationRequest {
            step,
            speaker: speaker.clone(),
            instruction: instruction.into(),
            transcript: ctx.state.transcript.clone(),
            format: ResponseFormat::Text,
        })
        .await?;
    Ok(Utterance::new(role, speaker, content))
}

/// Ask the generator for a JSON decision voiced by `role`.
pub(super) async fn decide<T: DeserializeOwned>(
    ctx: &StepContext<'_>,
    step: StepId,
    role: Role,
    instruction: impl Into<String>,
) -> Result<T> {
    let raw = ctx
        .generator
        .generate(GenerationRequest {
            step,
            speaker: ctx.state.speaker(role),
            instruction: instruction.into(),
            transcript: ctx.state.transcript.clone(),
            format: ResponseFormat::Json,
        })
        .await?;
    parse_structured(step, &raw)
}

/// Parse a JSON answer, tolerating a surrounding markdown code fence.
pub(super) fn parse_structured<T: DeserializeOwned>(step: StepId, raw: &str) -> Result<T> {
    let trimmed = raw.trim();
    let body = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .and_then(|rest| rest.strip_suffix("```"))
        .unwrap_or(trimmed);
    serde_json::from_str(body.trim()).map_err(|e| {
        debug!(step_id = %step, raw = %raw, "Unparseable structured output");
        MootError::GenerationParse(format!("{}: {}", step, e))
    })
}

fn advance(update: StateUpdate) -> Result<StepOutcome> {
    Ok(StepOutcome::Advance(update))
}

pub(super) async fn judge_check(ctx: &StepContext<'_>) -> Result<StepOutcome> {
    let question = speak(
        ctx,
        StepId::JudgeCheck,
        Role::PresidingJudge,
        prompts::judge_check(&ctx.state.case_facts),
    )
    .await?;
    let confirmation = Utterance::new(
        Role::Defendant,
        ctx.state.speaker(Role::Defendant),
        prompts::DEFENDANT_CONFIRMS,
    );
    advance(StateUpdate::new().say(question).say(confirmation))
}

/// One prosecution question per remaining round. Once the rounds are spent the
/// prosecutor closes questioning and the budget drops to the sentinel.
pub(super) async fn pros_question(ctx: &StepContext<'_>) -> Result<StepOutcome> {
    let budget = ctx.state.question_budget;
    if budget.get() > 0 {
        let question = speak(
            ctx,
            StepId::ProsQuestion,
            Role::Prosecutor,
            prompts::pros_question(&ctx.state.case_facts),
        )
        .await?;
        advance(
            StateUpdate::new()
                .say(question)
                .with_question_budget(budget.decrement()),
        )
    } else {
        let closing = Utterance::new(
            Role::Prosecutor,
            ctx.state.speaker(Role::Prosecutor),
            prompts::PROSECUTION_QUESTIONS_CONCLUDED,
        );
        advance(
            StateUpdate::new()
                .say(closing)
                .with_question_budget(moot_core::state::Budget::EXHAUSTED),
        )
    }
}

pub(super) async fn defense_reply(ctx: &StepContext<'_>) -> Result<StepOutcome> {
    let reply = speak(
        ctx,
        StepId::DefenseReply,
        Role::Defendant,
        prompts::DEFENDANT_REPLY,
    )
    .await?;
    advance(StateUpdate::new().say(reply))
}

pub(super) async fn pros_summary(ctx: &StepContext<'_>) -> Result<StepOutcome> {
    let summary = speak(ctx, StepId::ProsSummary, Role::Prosecutor, prompts::PROS_SUMMARY).await?;
    advance(StateUpdate::new().say(summary))
}

fn pending(ctx: &StepContext<'_>, step: StepId) -> Result<Vec<Evidence>> {
    ctx.state
        .pending_evidence
        .clone()
        .filter(|items| !items.is_empty())
        .ok_or_else(|| MootError::Invariant(format!("{} reached with no pending evidence", step)))
}

pub(super) async fn pros_show_evidence(ctx: &StepContext<'_>) -> Result<StepOutcome> {
    let items = pending(ctx, StepId::ProsShowEvidence)?;
    let joint = ctx.state.presentation_mode == PresentationMode::Joint;
    let presentation = speak(
        ctx,
        StepId::ProsShowEvidence,
        Role::Prosecutor,
        prompts::pros_show_evidence(&items, joint),
    )
    .await?;
    advance(
        StateUpdate::new()
            .say(presentation)
            .with_evidence_budget(ctx.state.evidence_budget.decrement()),
    )
}

pub(super) async fn pros_cross(ctx: &StepContext<'_>) -> Result<StepOutcome> {
    let items = pending(ctx, StepId::ProsCross)?;
    let opinion = speak(
        ctx,
        StepId::ProsCross,
        Role::Prosecutor,
        prompts::pros_cross(&items),
    )
    .await?;
    advance(StateUpdate::new().say(opinion))
}

pub(super) async fn pros_statement(ctx: &StepContext<'_>) -> Result<StepOutcome> {
    let statement = speak(
        ctx,
        StepId::ProsStatement,
        Role::Prosecutor,
        prompts::PROS_STATEMENT,
    )
    .await?;
    advance(StateUpdate::new().say(statement))
}

pub(super) async fn defense_self_statement(ctx: &StepContext<'_>) -> Result<StepOutcome> {
    let statement = speak(
        ctx,
        StepId::DefenseSelfStatement,
        Role::Defendant,
        prompts::DEFENDANT_SELF_STATEMENT,
    )
    .await?;
    advance(StateUpdate::new().say(statement))
}

#[derive(Debug, Deserialize)]
struct FocusSummary {
    #[serde(default)]
    focus_points: Vec<String>,
    #[serde(default)]
    explanation: String,
}

/// The judge names the disputed points. They are produced once per run.
pub(super) async fn judge_summary(ctx: &StepContext<'_>) -> Result<StepOutcome> {
    let summary: FocusSummary = decide(
        ctx,
        StepId::JudgeSummary,
        Role::PresidingJudge,
        prompts::JUDGE_SUMMARY,
    )
    .await?;

    let points: Vec<String> = summary
        .focus_points
        .into_iter()
        .map(|p| p.trim().to_string())
        .filter(|p| !p.is_empty())
        .collect();

    let mut content = summary.explanation.trim().to_string();
    if !points.is_empty() {
        if !content.is_empty() {
            content.push('\n');
        }
        content.push_str("The disputed points are:");
        for (i, point) in points.iter().enumerate() {
            content.push_str(&format!("\n{}. {}", i + 1, point));
        }
    }

    let judge = Utterance::new(
        Role::PresidingJudge,
        ctx.state.speaker(Role::PresidingJudge),
        content,
    );
    advance(
        StateUpdate::new()
            .say(judge)
            .with_focus_points(points)
            .with_focus_index(0),
    )
}

pub(super) async fn pros_focus(ctx: &StepContext<'_>) -> Result<StepOutcome> {
    let focus = ctx
        .state
        .current_focus()
        .ok_or_else(|| MootError::Invariant("pros_focus reached with no current focus".into()))?
        .to_string();
    let argument = speak(
        ctx,
        StepId::ProsFocus,
        Role::Prosecutor,
        prompts::pros_focus(&focus),
    )
    .await?;
    advance(StateUpdate::new().say(argument))
}

pub(super) async fn pros_sumup(ctx: &StepContext<'_>) -> Result<StepOutcome> {
    let sumup = speak(ctx, StepId::ProsSumup, Role::Prosecutor, prompts::PROS_SUMUP).await?;
    advance(StateUpdate::new().say(sumup))
}

pub(super) async fn defense_final_statement(ctx: &StepContext<'_>) -> Result<StepOutcome> {
    let last_words = speak(
        ctx,
        StepId::DefenseFinalStatement,
        Role::Defendant,
        prompts::DEFENDANT_FINAL_STATEMENT,
    )
    .await?;
    advance(StateUpdate::new().say(last_words))
}

pub(super) async fn judge_verdict(ctx: &StepContext<'_>) -> Result<StepOutcome> {
    let verdict = speak(
        ctx,
        StepId::JudgeVerdict,
        Role::PresidingJudge,
        prompts::judge_verdict(&ctx.state.case_facts),
    )
    .await?;
    advance(StateUpdate::new().say(verdict).with_phase(Phase::Verdict))
}

#[cfg(test)]
mod tests {
    use moot_core::config::BudgetConfig;
    use moot_core::state::Budget;
    use moot_test_utils::{Failure, ScriptedGenerator};

    use super::super::test_support::state;
    use super::*;

    fn ctx<'a>(
        s: &'a moot_core::state::CourtState,
        gen: &'a ScriptedGenerator,
        budgets: &'a BudgetConfig,
    ) -> StepContext<'a> {
        StepContext {
            state: s,
            generator: gen,
            budgets,
            input: None,
        }
    }

    #[tokio::test]
    async fn pros_question_spends_budget() {
        let s = state();
        let gen = ScriptedGenerator::new();
        let budgets = BudgetConfig::default();
        let outcome = pros_question(&ctx(&s, &gen, &budgets)).await.unwrap();
        let update = outcome.update();
        assert_eq!(update.question_budget, Some(Budget::new(2)));
        assert_eq!(update.utterances.len(), 1);
        assert_eq!(update.utterances[0].role, Role::Prosecutor);
        assert_eq!(gen.calls(StepId::ProsQuestion), 1);
    }

    #[tokio::test]
    async fn pros_question_at_zero_concludes_without_generating() {
        let mut s = state();
        s.question_budget = Budget::new(0);
        let gen = ScriptedGenerator::new();
        let budgets = BudgetConfig::default();
        let outcome = pros_question(&ctx(&s, &gen, &budgets)).await.unwrap();
        let update = outcome.update();
        assert_eq!(update.question_budget, Some(Budget::EXHAUSTED));
        assert_eq!(
            update.utterances[0].content,
            prompts::PROSECUTION_QUESTIONS_CONCLUDED
        );
        assert_eq!(gen.total_calls(), 0);
    }

    #[tokio::test]
    async fn judge_summary_produces_focus_points() {
        let s = state();
        let gen = ScriptedGenerator::new().with_focus_points(["identity", " value ", ""]);
        let budgets = BudgetConfig::default();
        let outcome = judge_summary(&ctx(&s, &gen, &budgets)).await.unwrap();
        let update = outcome.update();
        assert_eq!(
            update.focus_points,
            Some(vec!["identity".to_string(), "value".to_string()])
        );
        assert_eq!(update.focus_index, Some(0));
        assert!(update.utterances[0].content.contains("2. value"));
    }

    #[tokio::test]
    async fn judge_summary_rejects_malformed_json() {
        let s = state();
        let gen = ScriptedGenerator::new();
        gen.fail_next(StepId::JudgeSummary, Failure::Malformed, 1);
        let budgets = BudgetConfig::default();
        let err = judge_summary(&ctx(&s, &gen, &budgets)).await.unwrap_err();
        assert_eq!(err.code(), "GENERATION_FAILED");
    }

    #[tokio::test]
    async fn show_evidence_requires_pending_items() {
        let s = state();
        let gen = ScriptedGenerator::new();
        let budgets = BudgetConfig::default();
        let err = pros_show_evidence(&ctx(&s, &gen, &budgets))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "INVARIANT_VIOLATION");
    }

    #[tokio::test]
    async fn verdict_enters_verdict_phase() {
        let s = state();
        let gen = ScriptedGenerator::new();
        let budgets = BudgetConfig::default();
        let outcome = judge_verdict(&ctx(&s, &gen, &budgets)).await.unwrap();
        assert_eq!(outcome.update().phase, Some(Phase::Verdict));
    }

    #[test]
    fn structured_output_may_be_fenced() {
        #[derive(Deserialize)]
        struct Probe {
            ok: bool,
        }
        let fenced = "```json\n{\"ok\": true}\n```";
        assert!(parse_structured::<Probe>(StepId::JudgeSummary, fenced).unwrap().ok);
        assert!(parse_structured::<Probe>(StepId::JudgeSummary, "{\"ok\": false}").is_ok());
        assert!(parse_structured::<Probe>(StepId::JudgeSummary, "nope").is_err());
    }
}
