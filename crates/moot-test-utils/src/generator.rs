use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use futures::future::BoxFuture;
use serde_json::json;
use tokio::sync::Notify;

use moot_core::error::{MootError, Result};
use moot_core::step::StepId;
use moot_core::traits::Generator;
use moot_core::types::{GenerationRequest, ResponseFormat};

/// Injected generation failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Failure {
    RateLimited,
    Fatal,
    /// Succeeds with text that is not valid JSON.
    Malformed,
}

/// Handles for pausing a generation call mid-flight.
///
/// `entered` is notified once the call is in progress; the call completes
/// after `release` is notified.
#[derive(Clone)]
pub struct StepHold {
    pub entered: Arc<Notify>,
    pub release: Arc<Notify>,
}

#[derive(Default)]
struct Script {
    focus_points: Vec<String>,
    evidence_decisions: VecDeque<serde_json::Value>,
    failures: HashMap<StepId, VecDeque<Failure>>,
    holds: HashMap<StepId, StepHold>,
    calls: Vec<StepId>,
}

/// Deterministic generator for tests.
///
/// Prose turns echo the speaker and step. The focus summary returns the
/// configured focus points; evidence decisions are popped from a queue and
/// default to withdrawing once it is empty.
#[derive(Default)]
pub struct ScriptedGenerator {
    script: Mutex<Script>,
}

impl ScriptedGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_focus_points<I, S>(self, points: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.lock().focus_points = points.into_iter().map(Into::into).collect();
        self
    }

    /// Queue one evidence decision: the ids to present and the mode name.
    pub fn with_evidence_decision(self, ids: &[&str], mode: &str) -> Self {
        self.lock().evidence_decisions.push_back(json!({
            "current_evidence": ids,
            "evidence_show_type": mode,
        }));
        self
    }

    /// Fail the next `times` calls for `step` with `failure`.
    pub fn fail_next(&self, step: StepId, failure: Failure, times: usize) {
        let mut script = self.lock();
        let queue = script.failures.entry(step).or_default();
        queue.extend(std::iter::repeat(failure).take(times));
    }

    /// Pause the next call for `step` until released.
    pub fn hold_at(&self, step: StepId) -> StepHold {
        let hold = StepHold {
            entered: Arc::new(Notify::new()),
            release: Arc::new(Notify::new()),
        };
        self.lock().holds.insert(step, hold.clone());
        hold
    }

    pub fn calls(&self, step: StepId) -> usize {
        self.lock().calls.iter().filter(|s| **s == step).count()
    }

    pub fn total_calls(&self) -> usize {
        self.lock().calls.len()
    }

    pub fn call_log(&self) -> Vec<StepId> {
        self.lock().calls.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Script> {
        self.script.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn respond(&self, request: &GenerationRequest) -> (Result<String>, Option<StepHold>) {
        let mut script = self.lock();
        script.calls.push(request.step);
        let n = script.calls.len();

        let failure = script
            .failures
            .get_mut(&request.step)
            .and_then(VecDeque::pop_front);
        match failure {
            Some(Failure::RateLimited) => {
                return (Err(MootError::RateLimited("HTTP 429 (scripted)".into())), None)
            }
            Some(Failure::Fatal) => {
                return (Err(MootError::Generation("HTTP 500 (scripted)".into())), None)
            }
            Some(Failure::Malformed) => return (Ok("this is not json".into()), None),
            None => {}
        }

        let hold = script.holds.remove(&request.step);
        let text = match (request.format, request.step) {
            (ResponseFormat::Json, StepId::JudgeSummary) => json!({
                "focus_points": script.focus_points,
                "explanation": "The court has heard both sides.",
            })
            .to_string(),
            (ResponseFormat::Json, StepId::EvidenceDecision) => script
                .evidence_decisions
                .pop_front()
                .unwrap_or_else(|| {
                    json!({ "current_evidence": [], "evidence_show_type": "withdrawn" })
                })
                .to_string(),
            (ResponseFormat::Json, _) => "{}".to_string(),
            (ResponseFormat::Text, step) => {
                format!("{} speaking at {} (#{})", request.speaker, step, n)
            }
        };
        (Ok(text), hold)
    }
}

impl Generator for ScriptedGenerator {
    fn generate(&self, request: GenerationRequest) -> BoxFuture<'_, Result<String>> {
        Box::pin(async move {
            let (result, hold) = self.respond(&request);
            if let Some(hold) = hold {
                hold.entered.notify_one();
                hold.release.notified().await;
            }
            result
        })
    }
}
