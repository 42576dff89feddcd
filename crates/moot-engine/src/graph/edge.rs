use serde::{Deserialize, Serialize};

use moot_core::state::CourtState;
use moot_core::step::StepId;

/// An edge connecting two steps in the topology.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Edge {
    pub from: StepId,
    pub to: StepId,
    #[serde(default)]
    pub condition: EdgeCondition,
}

/// Budget counters an edge condition can test.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Counter {
    QuestionBudget,
    EvidenceBudget,
    FocusRoundBudget,
}

impl Counter {
    fn read(self, state: &CourtState) -> i32 {
        match self {
            Self::QuestionBudget => state.question_budget.get(),
            Self::EvidenceBudget => state.evidence_budget.get(),
            Self::FocusRoundBudget => state.focus_round_budget.get(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Comparison {
    Eq,
    Ne,
    Ge,
    Gt,
    Le,
    Lt,
}

impl Comparison {
    fn symbol(self) -> &'static str {
        match self {
            Self::Eq => "==",
            Self::Ne => "!=",
            Self::Ge => ">=",
            Self::Gt => ">",
            Self::Le => "<=",
            Self::Lt => "<",
        }
    }

    fn holds(self, lhs: i32, rhs: i32) -> bool {
        match self {
            Self::Eq => lhs == rhs,
            Self::Ne => lhs != rhs,
            Self::Ge => lhs >= rhs,
            Self::Gt => lhs > rhs,
            Self::Le => lhs <= rhs,
            Self::Lt => lhs < rhs,
        }
    }
}

/// Condition for traversing an edge.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EdgeCondition {
    /// Always traverse this edge.
    #[default]
    Always,
    /// Traverse if a budget counter compares true against `value`,
    /// evaluated on the state after the step's update is merged.
    Budget {
        counter: Counter,
        op: Comparison,
        value: i32,
    },
    /// Never followed implicitly; the step names it in a redirect.
    Dynamic,
}

impl EdgeCondition {
    pub fn matches(&self, state: &CourtState) -> bool {
        match self {
            Self::Always => true,
            Self::Budget { counter, op, value } => op.holds(counter.read(state), *value),
            Self::Dynamic => false,
        }
    }
}

impl std::fmt::Display for EdgeCondition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Always => write!(f, "always"),
            Self::Budget { counter, op, value } => {
                let name = match counter {
                    Counter::QuestionBudget => "question_budget",
                    Counter::EvidenceBudget => "evidence_budget",
                    Counter::FocusRoundBudget => "focus_round_budget",
                };
                write!(f, "{} {} {}", name, op.symbol(), value)
            }
            Self::Dynamic => write!(f, "dynamic"),
        }
    }
}

impl Edge {
    /// Create an unconditional edge.
    pub fn always(from: StepId, to: StepId) -> Self {
        Self {
            from,
            to,
            condition: EdgeCondition::Always,
        }
    }

    /// Create an edge guarded by a budget comparison.
    pub fn when(from: StepId, to: StepId, counter: Counter, op: Comparison, value: i32) -> Self {
        Self {
            from,
            to,
            condition: EdgeCondition::Budget { counter, op, value },
        }
    }

    /// Create an edge only reachable through an explicit redirect.
    pub fn dynamic(from: StepId, to: StepId) -> Self {
        Self {
            from,
            to,
            condition: EdgeCondition::Dynamic,
        }
    }
}
