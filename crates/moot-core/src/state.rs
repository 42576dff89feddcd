//! The trial state record shared by every step of a run.
//!
//! Steps never mutate a [`CourtState`] directly. They return a [`StateUpdate`]
//! which the engine merges with [`CourtState::apply`]; the merge validates the
//! record's invariants before touching any field, so a rejected update leaves
//! the state exactly as it was.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::config::BudgetConfig;
use crate::error::{MootError, Result};

/// Trial phase. Advances one step at a time and never goes back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Opening,
    Investigation,
    Debate,
    Verdict,
}

impl Phase {
    pub const ALL: [Phase; 4] = [
        Self::Opening,
        Self::Investigation,
        Self::Debate,
        Self::Verdict,
    ];

    pub fn next(self) -> Option<Phase> {
        match self {
            Self::Opening => Some(Self::Investigation),
            Self::Investigation => Some(Self::Debate),
            Self::Debate => Some(Self::Verdict),
            Self::Verdict => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Opening => "opening",
            Self::Investigation => "investigation",
            Self::Debate => "debate",
            Self::Verdict => "verdict",
        }
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A bounded round counter.
///
/// `-1` is the exhausted sentinel that routing keys off; no budget can hold a
/// smaller value, and deserializing one fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "i32", into = "i32")]
pub struct Budget(i32);

impl Budget {
    pub const EXHAUSTED: Budget = Budget(-1);

    pub fn new(initial: u32) -> Self {
        Self(i32::try_from(initial).unwrap_or(i32::MAX))
    }

    pub fn get(self) -> i32 {
        self.0
    }

    /// One round consumed. Saturates at the exhausted sentinel.
    pub fn decrement(self) -> Self {
        Self((self.0 - 1).max(-1))
    }

    pub fn is_exhausted(self) -> bool {
        self.0 == -1
    }
}

impl TryFrom<i32> for Budget {
    type Error = String;

    fn try_from(value: i32) -> std::result::Result<Self, Self::Error> {
        if value < -1 {
            Err(format!("budget {} is below the exhausted sentinel -1", value))
        } else {
            Ok(Self(value))
        }
    }
}

impl From<Budget> for i32 {
    fn from(b: Budget) -> i32 {
        b.0
    }
}

impl std::fmt::Display for Budget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Which side introduced a piece of evidence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    #[serde(alias = "prosecutor")]
    Prosecution,
    #[serde(alias = "defendant")]
    Defense,
}

/// How the prosecution introduces the evidence it selected.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PresentationMode {
    #[default]
    Single,
    #[serde(alias = "union")]
    Joint,
    #[serde(alias = "quit")]
    Withdrawn,
}

/// A single evidence item. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Evidence {
    pub id: String,
    pub name: String,
    pub content: String,
    pub provider: Side,
}

impl Evidence {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        content: impl Into<String>,
        provider: Side,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            content: content.into(),
            provider,
        }
    }
}

/// Personal details of the accused, read by the identity check.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DefendantProfile {
    pub name: String,
    #[serde(default)]
    pub former_name: Option<String>,
    #[serde(default)]
    pub birth_date: String,
    #[serde(default)]
    pub birthplace: String,
    #[serde(default)]
    pub ethnicity: String,
    #[serde(default)]
    pub education: String,
    #[serde(default)]
    pub occupation: String,
    #[serde(default)]
    pub employer: String,
    #[serde(default)]
    pub residence: String,
    #[serde(default)]
    pub id_number: String,
    #[serde(default)]
    pub legal_record: String,
    #[serde(default)]
    pub detention_date: String,
    #[serde(default)]
    pub indictment_received: String,
}

/// Case facts supplied at run creation. Read by many steps, never mutated.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaseFacts {
    #[serde(default)]
    pub summary: String,
    pub case_number: String,
    pub court_name: String,
    pub presiding_judge: String,
    #[serde(default)]
    pub associate_judge: String,
    pub clerk_name: String,
    pub prosecuting_office: String,
    pub prosecutor_name: String,
    pub indictment: String,
    pub charge: String,
    pub defendant: DefendantProfile,
    pub defense_counsel: String,
}

impl CaseFacts {
    /// Reject payloads missing the names every speaker attribution needs.
    pub fn validate(&self) -> Result<()> {
        let required = [
            ("case_number", &self.case_number),
            ("court_name", &self.court_name),
            ("presiding_judge", &self.presiding_judge),
            ("clerk_name", &self.clerk_name),
            ("prosecutor_name", &self.prosecutor_name),
            ("indictment", &self.indictment),
            ("charge", &self.charge),
            ("defendant.name", &self.defendant.name),
            ("defense_counsel", &self.defense_counsel),
        ];
        let missing: Vec<&str> = required
            .iter()
            .filter(|(_, value)| value.trim().is_empty())
            .map(|(field, _)| *field)
            .collect();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(MootError::InvalidRunPayload(format!(
                "case_facts missing required fields: {}",
                missing.join(", ")
            )))
        }
    }

    /// Display name used to attribute an utterance to a role.
    pub fn speaker(&self, role: Role) -> String {
        let name = match role {
            Role::Clerk => &self.clerk_name,
            Role::PresidingJudge => &self.presiding_judge,
            Role::Prosecutor => &self.prosecutor_name,
            Role::Defendant => &self.defendant.name,
            Role::DefenseCounsel => &self.defense_counsel,
        };
        format!("{} {}", role.title(), name)
    }
}

/// Actor kinds that can speak in the transcript.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Clerk,
    PresidingJudge,
    Prosecutor,
    Defendant,
    /// The human participant.
    DefenseCounsel,
}

impl Role {
    pub fn title(self) -> &'static str {
        match self {
            Self::Clerk => "Clerk",
            Self::PresidingJudge => "Presiding Judge",
            Self::Prosecutor => "Prosecutor",
            Self::Defendant => "Defendant",
            Self::DefenseCounsel => "Defense Counsel",
        }
    }

    pub fn is_human(self) -> bool {
        matches!(self, Self::DefenseCounsel)
    }
}

/// One entry of the transcript.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Utterance {
    pub role: Role,
    pub speaker: String,
    pub content: String,
}

impl Utterance {
    pub fn new(role: Role, speaker: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role,
            speaker: speaker.into(),
            content: content.into(),
        }
    }
}

/// The mutable record of one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CourtState {
    pub transcript: Vec<Utterance>,
    pub phase: Phase,
    pub focus_points: Vec<String>,
    pub focus_index: usize,
    pub evidence_catalog: Vec<Evidence>,
    pub pending_evidence: Option<Vec<Evidence>>,
    pub presentation_mode: PresentationMode,
    pub question_budget: Budget,
    pub evidence_budget: Budget,
    pub focus_round_budget: Budget,
    pub case_facts: CaseFacts,
}

impl CourtState {
    /// Fresh record for a new run: opening phase, full budgets, empty transcript.
    pub fn new(
        case_facts: CaseFacts,
        evidence_catalog: Vec<Evidence>,
        budgets: &BudgetConfig,
    ) -> Result<Self> {
        case_facts.validate()?;

        let mut seen = HashSet::new();
        for item in &evidence_catalog {
            if item.id.trim().is_empty() {
                return Err(MootError::InvalidRunPayload(
                    "evidence item with empty id".to_string(),
                ));
            }
            if !seen.insert(item.id.as_str()) {
                return Err(MootError::InvalidRunPayload(format!(
                    "duplicate evidence id '{}'",
                    item.id
                )));
            }
        }

        Ok(Self {
            transcript: Vec::new(),
            phase: Phase::Opening,
            focus_points: Vec::new(),
            focus_index: 0,
            evidence_catalog,
            pending_evidence: None,
            presentation_mode: PresentationMode::Single,
            question_budget: Budget::new(budgets.questions),
            evidence_budget: Budget::new(budgets.evidence),
            focus_round_budget: Budget::new(budgets.focus_rounds),
            case_facts,
        })
    }

    pub fn speaker(&self, role: Role) -> String {
        self.case_facts.speaker(role)
    }

    /// The dispute focus the cursor points at, if any remain.
    pub fn current_focus(&self) -> Option<&str> {
        self.focus_points.get(self.focus_index).map(String::as_str)
    }

    /// The last `n` utterances, oldest first.
    pub fn transcript_tail(&self, n: usize) -> &[Utterance] {
        let start = self.transcript.len().saturating_sub(n);
        &self.transcript[start..]
    }

    /// Merge a step's update. Either every field is applied or none is.
    pub fn apply(&mut self, update: StateUpdate) -> Result<()> {
        self.check(&update)?;

        let StateUpdate {
            utterances,
            phase,
            focus_points,
            focus_index,
            pending_evidence,
            presentation_mode,
            question_budget,
            evidence_budget,
            focus_round_budget,
        } = update;

        self.transcript.extend(utterances);
        if let Some(phase) = phase {
            self.phase = phase;
        }
        if let Some(points) = focus_points {
            self.focus_points = points;
        }
        if let Some(index) = focus_index {
            self.focus_index = index;
        }
        if let Some(items) = pending_evidence {
            self.pending_evidence = if items.is_empty() { None } else { Some(items) };
        }
        if let Some(mode) = presentation_mode {
            self.presentation_mode = mode;
        }
        if let Some(b) = question_budget {
            self.question_budget = b;
        }
        if let Some(b) = evidence_budget {
            self.evidence_budget = b;
        }
        if let Some(b) = focus_round_budget {
            self.focus_round_budget = b;
        }
        Ok(())
    }

    fn check(&self, update: &StateUpdate) -> Result<()> {
        if let Some(phase) = update.phase {
            if phase != self.phase && self.phase.next() != Some(phase) {
                return Err(MootError::Invariant(format!(
                    "phase cannot move from {} to {}",
                    self.phase, phase
                )));
            }
        }

        if update.focus_points.is_some() && !self.focus_points.is_empty() {
            return Err(MootError::Invariant(
                "focus points were already produced for this run".to_string(),
            ));
        }

        let focus_len = update
            .focus_points
            .as_ref()
            .map_or(self.focus_points.len(), Vec::len);
        let focus_index = update.focus_index.unwrap_or(self.focus_index);
        if focus_index < self.focus_index {
            return Err(MootError::Invariant(format!(
                "focus_index cannot decrease from {} to {}",
                self.focus_index, focus_index
            )));
        }
        if focus_index > focus_len {
            return Err(MootError::Invariant(format!(
                "focus_index {} exceeds {} focus points",
                focus_index, focus_len
            )));
        }

        Ok(())
    }
}

/// Partial update returned by a step. Absent fields are left untouched.
///
/// Serialized as the `state_delta` of a `step_completed` event.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StateUpdate {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub utterances: Vec<Utterance>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase: Option<Phase>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub focus_points: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub focus_index: Option<usize>,
    /// `Some(vec![])` clears the pending set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pending_evidence: Option<Vec<Evidence>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub presentation_mode: Option<PresentationMode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub question_budget: Option<Budget>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evidence_budget: Option<Budget>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub focus_round_budget: Option<Budget>,
}

impl StateUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn say(mut self, utterance: Utterance) -> Self {
        self.utterances.push(utterance);
        self
    }

    pub fn with_phase(mut self, phase: Phase) -> Self {
        self.phase = Some(phase);
        self
    }

    pub fn with_focus_points(mut self, points: Vec<String>) -> Self {
        self.focus_points = Some(points);
        self
    }

    pub fn with_focus_index(mut self, index: usize) -> Self {
        self.focus_index = Some(index);
        self
    }

    pub fn with_pending_evidence(mut self, items: Vec<Evidence>) -> Self {
        self.pending_evidence = Some(items);
        self
    }

    pub fn with_presentation_mode(mut self, mode: PresentationMode) -> Self {
        self.presentation_mode = Some(mode);
        self
    }

    pub fn with_question_budget(mut self, budget: Budget) -> Self {
        self.question_budget = Some(budget);
        self
    }

    pub fn with_evidence_budget(mut self, budget: Budget) -> Self {
        self.evidence_budget = Some(budget);
        self
    }

    pub fn with_focus_round_budget(mut self, budget: Budget) -> Self {
        self.focus_round_budget = Some(budget);
        self
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn facts() -> CaseFacts {
        CaseFacts {
            case_number: "(2024) 17".into(),
            court_name: "Eastgate District Court".into(),
            presiding_judge: "Wang".into(),
            clerk_name: "Li".into(),
            prosecuting_office: "Eastgate Procuratorate".into(),
            prosecutor_name: "Zhao".into(),
            indictment: "The defendant is charged with theft.".into(),
            charge: "theft".into(),
            defendant: DefendantProfile {
                name: "Chen".into(),
                ..Default::default()
            },
            defense_counsel: "Sun".into(),
            ..Default::default()
        }
    }

    fn state() -> CourtState {
        CourtState::new(facts(), vec![], &BudgetConfig::default()).unwrap()
    }

    #[test]
    fn budget_saturates_at_sentinel() {
        let b = Budget::new(1);
        assert_eq!(b.decrement().get(), 0);
        assert_eq!(b.decrement().decrement().get(), -1);
        assert!(b.decrement().decrement().decrement().is_exhausted());
    }

    #[test]
    fn budget_rejects_values_below_sentinel() {
        assert!(serde_json::from_str::<Budget>("-2").is_err());
        assert_eq!(serde_json::from_str::<Budget>("-1").unwrap(), Budget::EXHAUSTED);
    }

    #[test]
    fn new_state_uses_configured_budgets() {
        let s = state();
        assert_eq!(s.phase, Phase::Opening);
        assert_eq!(s.question_budget.get(), 3);
        assert_eq!(s.evidence_budget.get(), 3);
        assert_eq!(s.focus_round_budget.get(), 2);
        assert_eq!(s.focus_index, 0);
        assert!(s.transcript.is_empty());
    }

    #[test]
    fn missing_names_are_rejected() {
        let mut f = facts();
        f.defense_counsel = "  ".into();
        let err = CourtState::new(f, vec![], &BudgetConfig::default()).unwrap_err();
        assert_eq!(err.code(), "INVALID_RUN_PAYLOAD");
        assert!(err.to_string().contains("defense_counsel"));
    }

    #[test]
    fn duplicate_evidence_ids_are_rejected() {
        let items = vec![
            Evidence::new("E1", "Receipt", "...", Side::Prosecution),
            Evidence::new("E1", "Video", "...", Side::Prosecution),
        ];
        assert!(CourtState::new(facts(), items, &BudgetConfig::default()).is_err());
    }

    #[test]
    fn phase_advances_one_step_at_a_time() {
        let mut s = state();
        s.apply(StateUpdate::new().with_phase(Phase::Investigation)).unwrap();
        assert!(s.apply(StateUpdate::new().with_phase(Phase::Verdict)).is_err());
        assert!(s.apply(StateUpdate::new().with_phase(Phase::Opening)).is_err());
        assert_eq!(s.phase, Phase::Investigation);
    }

    #[test]
    fn rejected_update_leaves_state_untouched() {
        let mut s = state();
        let before = s.clone();
        let bad = StateUpdate::new()
            .say(Utterance::new(Role::Clerk, "Clerk Li", "All rise."))
            .with_focus_index(1);
        assert!(s.apply(bad).is_err());
        assert_eq!(s, before);
    }

    #[test]
    fn focus_index_is_bounded_and_monotonic() {
        let mut s = state();
        s.apply(
            StateUpdate::new()
                .with_focus_points(vec!["A".into(), "B".into()])
                .with_focus_index(0),
        )
        .unwrap();
        assert_eq!(s.current_focus(), Some("A"));
        s.apply(StateUpdate::new().with_focus_index(2)).unwrap();
        assert_eq!(s.current_focus(), None);
        assert!(s.apply(StateUpdate::new().with_focus_index(3)).is_err());
        assert!(s.apply(StateUpdate::new().with_focus_index(1)).is_err());
    }

    #[test]
    fn focus_points_are_produced_once() {
        let mut s = state();
        s.apply(StateUpdate::new().with_focus_points(vec!["A".into()]))
            .unwrap();
        assert!(s
            .apply(StateUpdate::new().with_focus_points(vec!["B".into()]))
            .is_err());
    }

    #[test]
    fn empty_pending_evidence_clears() {
        let mut s = state();
        let item = Evidence::new("D1", "Alibi", "...", Side::Defense);
        s.apply(StateUpdate::new().with_pending_evidence(vec![item]))
            .unwrap();
        assert!(s.pending_evidence.is_some());
        s.apply(StateUpdate::new().with_pending_evidence(vec![]))
            .unwrap();
        assert!(s.pending_evidence.is_none());
    }

    #[test]
    fn legacy_mode_names_are_accepted() {
        let joint: PresentationMode = serde_json::from_str("\"union\"").unwrap();
        let quit: PresentationMode = serde_json::from_str("\"quit\"").unwrap();
        assert_eq!(joint, PresentationMode::Joint);
        assert_eq!(quit, PresentationMode::Withdrawn);
    }

    #[test]
    fn speaker_names_carry_role_titles() {
        let s = state();
        assert_eq!(s.speaker(Role::PresidingJudge), "Presiding Judge Wang");
        assert_eq!(s.speaker(Role::DefenseCounsel), "Defense Counsel Sun");
    }

    #[test]
    fn delta_omits_untouched_fields() {
        let delta = StateUpdate::new().with_question_budget(Budget::EXHAUSTED);
        let json = serde_json::to_value(&delta).unwrap();
        assert_eq!(json, serde_json::json!({ "question_budget": -1 }));
    }
}
