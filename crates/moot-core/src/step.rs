use serde::{Deserialize, Serialize};

use crate::error::MootError;

/// Identifier of a step in the trial topology.
///
/// The wire name (`snake_case`) doubles as the checkpoint cursor value, so
/// renaming a variant breaks resumption of stored runs.
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepId {
    ClerkRules,
    JudgeOpen,
    JudgeCheck,
    RightNotify,
    ProsIndictment,
    ObjectionGate,
    DefenseObjection,
    ProsQuestion,
    DefenseReply,
    ContinueQuestioningGate,
    DefenseQuestion,
    ProsSummary,
    DefenseSummary,
    JudgeStartEvidence,
    EvidenceDecision,
    ProsShowEvidence,
    DefenseCross,
    JudgeConfirm,
    SupplementalEvidenceGate,
    DefenseShowEvidence,
    ProsCross,
    JudgeStartDebate,
    ProsStatement,
    DefenseSelfStatement,
    DefenseStatement,
    JudgeSummary,
    FocusCursor,
    FocusArgumentGate,
    ProsFocus,
    DefenseFocus,
    ProsSumup,
    DefenseSumup,
    DefenseFinalStatement,
    JudgeVerdict,
}

impl StepId {
    /// Every step, in canonical topology order.
    pub const ALL: [StepId; 34] = [
        Self::ClerkRules,
        Self::JudgeOpen,
        Self::JudgeCheck,
        Self::RightNotify,
        Self::ProsIndictment,
        Self::ObjectionGate,
        Self::DefenseObjection,
        Self::ProsQuestion,
        Self::DefenseReply,
        Self::ContinueQuestioningGate,
        Self::DefenseQuestion,
        Self::ProsSummary,
        Self::DefenseSummary,
        Self::JudgeStartEvidence,
        Self::EvidenceDecision,
        Self::ProsShowEvidence,
        Self::DefenseCross,
        Self::JudgeConfirm,
        Self::SupplementalEvidenceGate,
        Self::DefenseShowEvidence,
        Self::ProsCross,
        Self::JudgeStartDebate,
        Self::ProsStatement,
        Self::DefenseSelfStatement,
        Self::DefenseStatement,
        Self::JudgeSummary,
        Self::FocusCursor,
        Self::FocusArgumentGate,
        Self::ProsFocus,
        Self::DefenseFocus,
        Self::ProsSumup,
        Self::DefenseSumup,
        Self::DefenseFinalStatement,
        Self::JudgeVerdict,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ClerkRules => "clerk_rules",
            Self::JudgeOpen => "judge_open",
            Self::JudgeCheck => "judge_check",
            Self::RightNotify => "right_notify",
            Self::ProsIndictment => "pros_indictment",
            Self::ObjectionGate => "objection_gate",
            Self::DefenseObjection => "defense_objection",
            Self::ProsQuestion => "pros_question",
            Self::DefenseReply => "defense_reply",
            Self::ContinueQuestioningGate => "continue_questioning_gate",
            Self::DefenseQuestion => "defense_question",
            Self::ProsSummary => "pros_summary",
            Self::DefenseSummary => "defense_summary",
            Self::JudgeStartEvidence => "judge_start_evidence",
            Self::EvidenceDecision => "evidence_decision",
            Self::ProsShowEvidence => "pros_show_evidence",
            Self::DefenseCross => "defense_cross",
            Self::JudgeConfirm => "judge_confirm",
            Self::SupplementalEvidenceGate => "supplemental_evidence_gate",
            Self::DefenseShowEvidence => "defense_show_evidence",
            Self::ProsCross => "pros_cross",
            Self::JudgeStartDebate => "judge_start_debate",
            Self::ProsStatement => "pros_statement",
            Self::DefenseSelfStatement => "defense_self_statement",
            Self::DefenseStatement => "defense_statement",
            Self::JudgeSummary => "judge_summary",
            Self::FocusCursor => "focus_cursor",
            Self::FocusArgumentGate => "focus_argument_gate",
            Self::ProsFocus => "pros_focus",
            Self::DefenseFocus => "defense_focus",
            Self::ProsSumup => "pros_sumup",
            Self::DefenseSumup => "defense_sumup",
            Self::DefenseFinalStatement => "defense_final_statement",
            Self::JudgeVerdict => "judge_verdict",
        }
    }
}

impl std::fmt::Display for StepId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for StepId {
    type Err = MootError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|step| step.as_str() == s)
            .ok_or_else(|| MootError::Topology(format!("unknown step '{}'", s)))
    }
}
