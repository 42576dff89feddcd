use std::collections::HashSet;

use serde::Serialize;

use moot_core::error::{MootError, Result};
use moot_core::state::{CourtState, Evidence, Side};
use moot_core::step::StepId;
use moot_core::types::{EvidenceSubmission, HumanInput, InputKind};

/// What a human-input step asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct InputSpec {
    pub step: StepId,
    pub input_kind: InputKind,
    pub prompt: &'static str,
}

impl InputSpec {
    const fn new(step: StepId, input_kind: InputKind, prompt: &'static str) -> Self {
        Self {
            step,
            input_kind,
            prompt,
        }
    }
}

const SPECS: [InputSpec; 11] = [
    InputSpec::new(
        StepId::ObjectionGate,
        InputKind::Boolean,
        "The public prosecutor has finished reading the indictment. Do you object to it?",
    ),
    InputSpec::new(
        StepId::DefenseObjection,
        InputKind::Text,
        "State your objection to the indictment:",
    ),
    InputSpec::new(
        StepId::ContinueQuestioningGate,
        InputKind::Boolean,
        "Do you have further questions for the defendant?",
    ),
    InputSpec::new(
        StepId::DefenseQuestion,
        InputKind::Text,
        "Enter the question you want to put to the defendant:",
    ),
    InputSpec::new(
        StepId::DefenseSummary,
        InputKind::Text,
        "Enter your summary of the questioning:",
    ),
    InputSpec::new(
        StepId::DefenseCross,
        InputKind::Text,
        "Enter your cross-examination opinion on the evidence just presented:",
    ),
    InputSpec::new(
        StepId::SupplementalEvidenceGate,
        InputKind::Boolean,
        "Do you have supplemental evidence to submit?",
    ),
    InputSpec::new(
        StepId::DefenseShowEvidence,
        InputKind::Evidence,
        "Submit the supplemental evidence and your note on it as {\"items\": [...], \"note\": \"...\"}:",
    ),
    InputSpec::new(
        StepId::DefenseStatement,
        InputKind::Text,
        "Enter your first-round defense statement:",
    ),
    InputSpec::new(
        StepId::DefenseFocus,
        InputKind::Text,
        "Enter your response on the current disputed point:",
    ),
    InputSpec::new(
        StepId::DefenseSumup,
        InputKind::Text,
        "Enter your closing defense statement:",
    ),
];

pub fn input_spec(step: StepId) -> Option<&'static InputSpec> {
    SPECS.iter().find(|s| s.step == step)
}

/// Check a raw resume payload against the shape `kind` requires.
///
/// Evidence submissions are also checked against the run's catalog so the
/// step that consumes them cannot fail on a clashing id.
pub fn parse_input(
    step: StepId,
    kind: InputKind,
    raw: &serde_json::Value,
    state: &CourtState,
) -> Result<HumanInput> {
    let invalid = |message: String| MootError::InvalidInput {
        step: step.to_string(),
        message,
    };

    match kind {
        InputKind::Boolean => raw
            .as_bool()
            .map(HumanInput::Boolean)
            .ok_or_else(|| invalid(format!("expected a boolean, got {}", type_name(raw)))),
        InputKind::Text => {
            let text = raw
                .as_str()
                .ok_or_else(|| invalid(format!("expected a string, got {}", type_name(raw))))?;
            if text.trim().is_empty() {
                return Err(invalid("text must not be empty".into()));
            }
            Ok(HumanInput::Text(text.trim().to_string()))
        }
        InputKind::Evidence => {
            if !raw.is_object() {
                return Err(invalid(format!(
                    "expected an object with items and note, got {}",
                    type_name(raw)
                )));
            }
            let submission: EvidenceSubmission = serde_json::from_value(raw.clone())
                .map_err(|e| invalid(format!("malformed evidence submission: {}", e)))?;
            check_submission(&submission, state).map_err(invalid)?;
            Ok(HumanInput::Evidence(submission))
        }
    }
}

fn check_submission(
    submission: &EvidenceSubmission,
    state: &CourtState,
) -> std::result::Result<(), String> {
    if submission.items.is_empty() {
        return Err("submission contains no evidence items".into());
    }
    let catalog: HashSet<&str> = state.evidence_catalog.iter().map(|e| e.id.as_str()).collect();
    let mut seen = HashSet::new();
    for Evidence { id, provider, .. } in &submission.items {
        if id.trim().is_empty() {
            return Err("evidence id must not be empty".into());
        }
        if *provider != Side::Defense {
            return Err(format!("evidence '{}' must be provided by the defense", id));
        }
        if catalog.contains(id.as_str()) {
            return Err(format!("evidence id '{}' is already in the catalog", id));
        }
        if !seen.insert(id.as_str()) {
            return Err(format!("duplicate evidence id '{}'", id));
        }
    }
    Ok(())
}

fn type_name(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "a boolean",
        serde_json::Value::Number(_) => "a number",
        serde_json::Value::String(_) => "a string",
        serde_json::Value::Array(_) => "an array",
        serde_json::Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use moot_core::config::BudgetConfig;
    use moot_test_utils::{sample_case_facts, sample_evidence};
    use serde_json::json;

    use super::*;

    fn state() -> CourtState {
        CourtState::new(sample_case_facts(), sample_evidence(), &BudgetConfig::default()).unwrap()
    }

    #[test]
    fn every_spec_is_unique() {
        let steps: HashSet<StepId> = SPECS.iter().map(|s| s.step).collect();
        assert_eq!(steps.len(), SPECS.len());
    }

    #[test]
    fn boolean_rejects_strings() {
        let s = state();
        let ok = parse_input(StepId::ObjectionGate, InputKind::Boolean, &json!(false), &s);
        assert_eq!(ok.unwrap(), HumanInput::Boolean(false));

        let err = parse_input(StepId::ObjectionGate, InputKind::Boolean, &json!("no"), &s)
            .unwrap_err();
        assert_eq!(err.code(), "INVALID_INPUT");
        assert!(err.to_string().contains("expected a boolean, got a string"));
    }

    #[test]
    fn text_rejects_blank_and_non_strings() {
        let s = state();
        assert!(parse_input(StepId::DefenseCross, InputKind::Text, &json!("   "), &s).is_err());
        assert!(parse_input(StepId::DefenseCross, InputKind::Text, &json!(true), &s).is_err());
        assert_eq!(
            parse_input(StepId::DefenseCross, InputKind::Text, &json!(" No objection. "), &s)
                .unwrap(),
            HumanInput::Text("No objection.".into())
        );
    }

    #[test]
    fn evidence_submission_accepted() {
        let s = state();
        let raw = json!({
            "items": [{"id": "D1", "name": "Log", "content": "app log", "provider": "defense"}],
            "note": "Shows the defendant elsewhere."
        });
        match parse_input(StepId::DefenseShowEvidence, InputKind::Evidence, &raw, &s).unwrap() {
            HumanInput::Evidence(sub) => {
                assert_eq!(sub.items.len(), 1);
                assert_eq!(sub.note, "Shows the defendant elsewhere.");
            }
            other => panic!("unexpected input {:?}", other),
        }
    }

    #[test]
    fn evidence_submission_rejects_catalog_clash_and_wrong_side() {
        let s = state();
        let clash = json!({
            "items": [{"id": "P1", "name": "Log", "content": "x", "provider": "defense"}],
            "note": ""
        });
        assert!(parse_input(StepId::DefenseShowEvidence, InputKind::Evidence, &clash, &s).is_err());

        let wrong_side = json!({
            "items": [{"id": "D9", "name": "Log", "content": "x", "provider": "prosecution"}]
        });
        assert!(
            parse_input(StepId::DefenseShowEvidence, InputKind::Evidence, &wrong_side, &s).is_err()
        );

        let empty = json!({ "items": [], "note": "nothing" });
        assert!(parse_input(StepId::DefenseShowEvidence, InputKind::Evidence, &empty, &s).is_err());

        assert!(
            parse_input(StepId::DefenseShowEvidence, InputKind::Evidence, &json!("D1"), &s)
                .is_err()
        );
    }
}
