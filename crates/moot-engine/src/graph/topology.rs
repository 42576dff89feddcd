use std::collections::{HashMap, HashSet, VecDeque};

use moot_core::error::{MootError, Result};
use moot_core::state::CourtState;
use moot_core::step::StepId;
use moot_core::types::InputKind;

use super::edge::{Comparison, Counter, Edge, EdgeCondition};
use super::node::{Node, StepKind};
use crate::input::input_spec;

/// The validated step graph of a trial.
pub struct Topology {
    nodes: HashMap<StepId, Node>,
    edges: Vec<Edge>,
    entry: StepId,
}

impl Topology {
    /// Build a topology, rejecting graphs the engine could not walk.
    pub fn new(nodes: Vec<Node>, edges: Vec<Edge>, entry: StepId) -> Result<Self> {
        let mut node_map = HashMap::with_capacity(nodes.len());
        for node in nodes {
            if node_map.insert(node.id, node).is_some() {
                return Err(MootError::Topology("duplicate node".into()));
            }
        }
        let topology = Self {
            nodes: node_map,
            edges,
            entry,
        };
        topology.validate()?;
        Ok(topology)
    }

    /// The canonical criminal-trial flow.
    pub fn courtroom() -> Result<Self> {
        use Comparison::*;
        use Counter::*;
        use StepId::*;

        let nodes = vec![
            Node::fixed(ClerkRules, 1),
            Node::fixed(JudgeOpen, 2),
            Node::generative(JudgeCheck, 3),
            Node::fixed(RightNotify, 4),
            Node::fixed(ProsIndictment, 5),
            Node::human(ObjectionGate, InputKind::Boolean, 8),
            Node::human(DefenseObjection, InputKind::Text, 10),
            Node::generative(ProsQuestion, 15),
            Node::generative(DefenseReply, 20),
            Node::human(ContinueQuestioningGate, InputKind::Boolean, 23),
            Node::human(DefenseQuestion, InputKind::Text, 25),
            Node::generative(ProsSummary, 30),
            Node::human(DefenseSummary, InputKind::Text, 35),
            Node::fixed(JudgeStartEvidence, 40),
            Node::routing(EvidenceDecision, 43),
            Node::generative(ProsShowEvidence, 45),
            Node::human(DefenseCross, InputKind::Text, 50),
            Node::fixed(JudgeConfirm, 55),
            Node::human(SupplementalEvidenceGate, InputKind::Boolean, 58),
            Node::human(DefenseShowEvidence, InputKind::Evidence, 60),
            Node::generative(ProsCross, 65),
            Node::fixed(JudgeStartDebate, 70),
            Node::generative(ProsStatement, 75),
            Node::generative(DefenseSelfStatement, 77),
            Node::human(DefenseStatement, InputKind::Text, 80),
            Node::generative(JudgeSummary, 85),
            Node::routing(FocusCursor, 86),
            Node::routing(FocusArgumentGate, 87),
            Node::generative(ProsFocus, 88),
            Node::human(DefenseFocus, InputKind::Text, 90),
            Node::generative(ProsSumup, 93),
            Node::human(DefenseSumup, InputKind::Text, 95),
            Node::generative(DefenseFinalStatement, 98),
            Node::generative(JudgeVerdict, 100),
        ];

        let edges = vec![
            Edge::always(ClerkRules, JudgeOpen),
            Edge::always(JudgeOpen, JudgeCheck),
            Edge::always(JudgeCheck, RightNotify),
            Edge::always(RightNotify, ProsIndictment),
            Edge::always(ProsIndictment, ObjectionGate),
            Edge::dynamic(ObjectionGate, ProsQuestion),
            Edge::dynamic(ObjectionGate, DefenseObjection),
            Edge::always(DefenseObjection, ProsQuestion),
            Edge::when(ProsQuestion, DefenseReply, QuestionBudget, Ge, 0),
            Edge::always(ProsQuestion, DefenseQuestion),
            Edge::when(DefenseReply, ContinueQuestioningGate, QuestionBudget, Eq, -1),
            Edge::always(DefenseReply, ProsQuestion),
            Edge::dynamic(ContinueQuestioningGate, DefenseQuestion),
            Edge::dynamic(ContinueQuestioningGate, ProsSummary),
            Edge::always(DefenseQuestion, DefenseReply),
            Edge::always(ProsSummary, DefenseSummary),
            Edge::always(DefenseSummary, JudgeStartEvidence),
            Edge::always(JudgeStartEvidence, EvidenceDecision),
            Edge::dynamic(EvidenceDecision, ProsShowEvidence),
            Edge::dynamic(EvidenceDecision, JudgeConfirm),
            Edge::always(ProsShowEvidence, DefenseCross),
            Edge::always(DefenseCross, EvidenceDecision),
            Edge::always(JudgeConfirm, SupplementalEvidenceGate),
            Edge::dynamic(SupplementalEvidenceGate, DefenseShowEvidence),
            Edge::dynamic(SupplementalEvidenceGate, JudgeStartDebate),
            Edge::always(DefenseShowEvidence, ProsCross),
            Edge::always(ProsCross, SupplementalEvidenceGate),
            Edge::always(JudgeStartDebate, ProsStatement),
            Edge::always(ProsStatement, DefenseSelfStatement),
            Edge::always(DefenseSelfStatement, DefenseStatement),
            Edge::always(DefenseStatement, JudgeSummary),
            Edge::always(JudgeSummary, FocusCursor),
            Edge::dynamic(FocusCursor, FocusArgumentGate),
            Edge::dynamic(FocusCursor, ProsSumup),
            Edge::dynamic(FocusArgumentGate, ProsFocus),
            Edge::dynamic(FocusArgumentGate, FocusCursor),
            Edge::always(ProsFocus, DefenseFocus),
            Edge::always(DefenseFocus, FocusArgumentGate),
            Edge::always(ProsSumup, DefenseSumup),
            Edge::always(DefenseSumup, DefenseFinalStatement),
            Edge::always(DefenseFinalStatement, JudgeVerdict),
        ];

        Self::new(nodes, edges, ClerkRules)
    }

    pub fn entry(&self) -> StepId {
        self.entry
    }

    pub fn node(&self, id: StepId) -> Result<&Node> {
        self.nodes
            .get(&id)
            .ok_or_else(|| MootError::Topology(format!("step '{}' is not in the topology", id)))
    }

    /// Nodes in canonical step order.
    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        StepId::ALL.iter().filter_map(|id| self.nodes.get(id))
    }

    pub fn edges_from(&self, id: StepId) -> impl Iterator<Item = &Edge> {
        self.edges.iter().filter(move |e| e.from == id)
    }

    pub fn is_terminal(&self, id: StepId) -> bool {
        self.edges_from(id).next().is_none()
    }

    /// Human-input steps in canonical order.
    pub fn human_steps(&self) -> impl Iterator<Item = &Node> {
        self.nodes().filter(|n| n.input_kind().is_some())
    }

    /// Follow the first static edge whose condition holds on `state`.
    /// Returns `None` at the terminal step.
    pub fn successor(&self, from: StepId, state: &CourtState) -> Result<Option<StepId>> {
        if self.is_terminal(from) {
            return Ok(None);
        }
        self.edges_from(from)
            .find(|e| e.condition.matches(state))
            .map(|e| Some(e.to))
            .ok_or_else(|| {
                MootError::Topology(format!("no outgoing edge of '{}' matched", from))
            })
    }

    /// Check that `from` declares a dynamic edge to `to`.
    pub fn check_redirect(&self, from: StepId, to: StepId) -> Result<()> {
        let declared = self
            .edges_from(from)
            .any(|e| e.to == to && e.condition == EdgeCondition::Dynamic);
        if declared {
            Ok(())
        } else {
            Err(MootError::Topology(format!(
                "'{}' cannot redirect to undeclared successor '{}'",
                from, to
            )))
        }
    }

    fn validate(&self) -> Result<()> {
        if !self.nodes.contains_key(&self.entry) {
            return Err(MootError::Topology(format!(
                "entry step '{}' is not in the topology",
                self.entry
            )));
        }

        for edge in &self.edges {
            for end in [edge.from, edge.to] {
                if !self.nodes.contains_key(&end) {
                    return Err(MootError::Topology(format!(
                        "edge {} -> {} references missing step '{}'",
                        edge.from, edge.to, end
                    )));
                }
            }
        }

        let terminals: Vec<StepId> = self
            .nodes()
            .map(|n| n.id)
            .filter(|id| self.is_terminal(*id))
            .collect();
        if terminals.len() != 1 {
            return Err(MootError::Topology(format!(
                "expected exactly one terminal step, found {:?}",
                terminals
            )));
        }

        for node in self.nodes() {
            self.validate_outgoing(node)?;

            if let StepKind::HumanInput(kind) = node.kind {
                match input_spec(node.id) {
                    Some(spec) if spec.input_kind == kind => {}
                    Some(spec) => {
                        return Err(MootError::Topology(format!(
                            "step '{}' accepts {:?} but its input spec says {:?}",
                            node.id, kind, spec.input_kind
                        )))
                    }
                    None => {
                        return Err(MootError::Topology(format!(
                            "human-input step '{}' has no input spec",
                            node.id
                        )))
                    }
                }
            }
        }

        let reachable = self.reachable();
        if let Some(orphan) = self.nodes().find(|n| !reachable.contains(&n.id)) {
            return Err(MootError::Topology(format!(
                "step '{}' is unreachable from '{}'",
                orphan.id, self.entry
            )));
        }

        Ok(())
    }

    fn validate_outgoing(&self, node: &Node) -> Result<()> {
        let outgoing: Vec<&Edge> = self.edges_from(node.id).collect();
        if outgoing.is_empty() {
            return Ok(());
        }

        let dynamic = outgoing
            .iter()
            .filter(|e| e.condition == EdgeCondition::Dynamic)
            .count();

        if dynamic > 0 {
            if dynamic != outgoing.len() {
                return Err(MootError::Topology(format!(
                    "step '{}' mixes redirect and static edges",
                    node.id
                )));
            }
            let redirects = matches!(
                node.kind,
                StepKind::Routing | StepKind::HumanInput(InputKind::Boolean)
            );
            if !redirects {
                return Err(MootError::Topology(format!(
                    "{} step '{}' cannot choose its successor",
                    node.kind.label(),
                    node.id
                )));
            }
            return Ok(());
        }

        if node.kind == StepKind::Routing {
            return Err(MootError::Topology(format!(
                "routing step '{}' declares no redirect targets",
                node.id
            )));
        }

        // The last static edge is the fallback when no condition holds
        match outgoing.last() {
            Some(edge) if edge.condition == EdgeCondition::Always => Ok(()),
            _ => Err(MootError::Topology(format!(
                "conditional edges of '{}' have no unconditional fallback",
                node.id
            ))),
        }
    }

    fn reachable(&self) -> HashSet<StepId> {
        let mut seen = HashSet::from([self.entry]);
        let mut queue = VecDeque::from([self.entry]);
        while let Some(id) = queue.pop_front() {
            for edge in self.edges_from(id) {
                if seen.insert(edge.to) {
                    queue.push_back(edge.to);
                }
            }
        }
        seen
    }
}
