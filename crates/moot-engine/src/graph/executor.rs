use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use tracing::{debug, error, info, warn};

use moot_core::config::BudgetConfig;
use moot_core::error::{MootError, Result};
use moot_core::event::EventBus;
use moot_core::state::{CaseFacts, CourtState, Evidence};
use moot_core::step::StepId;
use moot_core::traits::{CheckpointStore, Generator};
use moot_core::types::{
    Checkpoint, ConnectionId, Cursor, HumanInput, RunEvent, RunEventKind, RunId, RunStatus,
};

use super::topology::Topology;
use crate::input::{input_spec, parse_input};
use crate::session::{RunRecord, SessionRegistry};
use crate::steps::{run_step, StepContext};

/// Utterances carried by each `step_completed` event.
const TRANSCRIPT_TAIL: usize = 5;

/// Where a call into the engine left the run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// Waiting for human input at this step.
    Suspended(StepId),
    /// The terminal step has run.
    Completed,
    /// A step failed. The last checkpoint is intact and the run waits for a retry.
    Stalled {
        step: StepId,
        code: &'static str,
        message: String,
    },
    /// The run was removed from the registry while a step was executing.
    Detached,
}

enum Stepped {
    Saved(Checkpoint),
    Detached,
}

/// Drives runs through the courtroom topology, one step at a time,
/// checkpointing after every step.
pub struct RunEngine {
    topology: Topology,
    generator: Arc<dyn Generator>,
    store: Arc<dyn CheckpointStore>,
    sessions: Arc<SessionRegistry>,
    event_bus: Arc<EventBus>,
    budgets: BudgetConfig,
    retain_checkpoints: bool,
}

impl RunEngine {
    pub fn new(
        generator: Arc<dyn Generator>,
        store: Arc<dyn CheckpointStore>,
        sessions: Arc<SessionRegistry>,
        event_bus: Arc<EventBus>,
        budgets: BudgetConfig,
    ) -> Result<Self> {
        Ok(Self {
            topology: Topology::courtroom()?,
            generator,
            store,
            sessions,
            event_bus,
            budgets,
            retain_checkpoints: false,
        })
    }

    /// Keep checkpoints of runs whose connection went away.
    pub fn with_retained_checkpoints(mut self, retain: bool) -> Self {
        self.retain_checkpoints = retain;
        self
    }

    pub fn topology(&self) -> &Topology {
        &self.topology
    }

    pub fn sessions(&self) -> &Arc<SessionRegistry> {
        &self.sessions
    }

    pub fn store(&self) -> &Arc<dyn CheckpointStore> {
        &self.store
    }

    pub fn event_bus(&self) -> &Arc<EventBus> {
        &self.event_bus
    }

    /// Validate the payload, register the run and persist its first checkpoint.
    /// Nothing executes until [`drive`](Self::drive) is called.
    pub fn start_run(
        &self,
        owner: &ConnectionId,
        case_facts: CaseFacts,
        evidence_catalog: Vec<Evidence>,
    ) -> Result<RunId> {
        let state = CourtState::new(case_facts, evidence_catalog, &self.budgets)?;
        let record = self.sessions.create(owner);

        let checkpoint = Checkpoint {
            key: record.checkpoint_key.clone(),
            run_id: record.run_id.clone(),
            state,
            cursor: Cursor::Ready(self.topology.entry()),
            answered: None,
            sequence: 0,
            saved_at: Utc::now(),
        };
        if let Err(e) = self.store.save(&checkpoint) {
            self.sessions.remove(&record.run_id);
            return Err(e);
        }

        info!(run_id = %record.run_id, connection = %owner, "Run created");
        Ok(record.run_id)
    }

    /// The run a repeated `start_run` from `owner` should recover: one started
    /// with the same case that stalled before any human input was committed.
    pub fn stalled_start(
        &self,
        owner: &ConnectionId,
        case_facts: &CaseFacts,
        evidence_catalog: &[Evidence],
    ) -> Option<RunId> {
        self.sessions
            .list()
            .into_iter()
            .filter(|record| &record.owner == owner && record.status == RunStatus::Stalled)
            .filter(|record| {
                matches!(
                    self.store.load(&record.checkpoint_key),
                    Ok(Some(cp)) if cp.answered.is_none()
                        && cp.state.case_facts == *case_facts
                        && cp.state.evidence_catalog == evidence_catalog
                )
            })
            .max_by_key(|record| record.started_at)
            .map(|record| record.run_id)
    }

    /// Continue a run from its latest checkpoint until it suspends,
    /// completes, or stalls.
    pub async fn drive(&self, run_id: &RunId) -> Result<RunOutcome> {
        if !self.sessions.contains(run_id) {
            return Err(MootError::UnknownRun(run_id.to_string()));
        }
        let checkpoint = self.load_checkpoint(run_id)?;
        self.run_from(run_id, checkpoint, None).await
    }

    /// Feed human input to the step a run is suspended at, then continue.
    ///
    /// Fails without touching the run when the step is not the pending one
    /// or the input does not have the shape the step expects.
    ///
    /// A run that stalled after this step's input was committed is driven on
    /// from its checkpoint, so repeating the same resume call recovers it.
    /// The input is not applied a second time.
    pub async fn resume(
        &self,
        run_id: &RunId,
        step_id: &str,
        raw: &serde_json::Value,
    ) -> Result<RunOutcome> {
        let not_pending = || MootError::UnknownStep {
            run_id: run_id.to_string(),
            step: step_id.to_string(),
        };

        let record = self
            .sessions
            .get(run_id)
            .ok_or_else(|| MootError::UnknownRun(run_id.to_string()))?;
        let step: StepId = step_id.parse().map_err(|_| not_pending())?;
        let from = match record.status {
            RunStatus::AwaitingInput | RunStatus::Stalled => record.status,
            RunStatus::Active | RunStatus::Completed => return Err(not_pending()),
        };

        let checkpoint = self.load_checkpoint(run_id)?;
        let input = match checkpoint.cursor {
            Cursor::Awaiting(pending) if pending == step => {
                let kind = self
                    .topology
                    .node(step)?
                    .input_kind()
                    .ok_or_else(not_pending)?;
                Some(parse_input(step, kind, raw, &checkpoint.state)?)
            }
            Cursor::Ready(_)
                if from == RunStatus::Stalled && checkpoint.answered == Some(step) =>
            {
                None
            }
            _ => return Err(not_pending()),
        };

        // Claim the run; a concurrent resume of the same step loses here
        if self.sessions.activate_if(run_id, from).is_none() {
            return Err(not_pending());
        }

        match &input {
            Some(input) => info!(
                run_id = %run_id,
                step_id = %step,
                input_kind = ?input.kind(),
                "Resuming run"
            ),
            None => info!(
                run_id = %run_id,
                step_id = %step,
                cursor = ?checkpoint.cursor,
                "Input already committed, re-driving stalled run"
            ),
        }
        self.run_from(run_id, checkpoint, input).await
    }

    /// Re-drive a stalled run from its last checkpoint.
    pub async fn retry(&self, run_id: &RunId) -> Result<RunOutcome> {
        let record = self
            .sessions
            .get(run_id)
            .ok_or_else(|| MootError::UnknownRun(run_id.to_string()))?;
        let not_stalled = || MootError::UnknownStep {
            run_id: run_id.to_string(),
            step: record
                .pending_step
                .map(|s| s.to_string())
                .unwrap_or_default(),
        };
        if record.status != RunStatus::Stalled {
            return Err(not_stalled());
        }

        let checkpoint = self.load_checkpoint(run_id)?;
        if self
            .sessions
            .activate_if(run_id, RunStatus::Stalled)
            .is_none()
        {
            return Err(not_stalled());
        }

        info!(
            run_id = %run_id,
            step_id = ?record.pending_step,
            cursor = ?checkpoint.cursor,
            "Retrying stalled run"
        );
        self.run_from(run_id, checkpoint, None).await
    }

    /// Bring a persisted run back into the registry under `owner`, e.g. after
    /// a restart. Runs that are already registered are returned unchanged.
    ///
    /// A run interrupted mid-step comes back STALLED and needs a retry.
    pub fn attach(&self, run_id: &RunId, owner: &ConnectionId) -> Result<RunRecord> {
        if let Some(record) = self.sessions.get(run_id) {
            return Ok(record);
        }
        let checkpoint = self
            .store
            .load(&run_id.checkpoint_key())?
            .ok_or_else(|| MootError::UnknownRun(run_id.to_string()))?;

        let (status, pending) = match checkpoint.cursor {
            Cursor::Awaiting(step) => (RunStatus::AwaitingInput, Some(step)),
            Cursor::Ready(step) => (RunStatus::Stalled, Some(step)),
            Cursor::Finished => (RunStatus::Completed, None),
        };
        info!(
            run_id = %run_id,
            connection = %owner,
            sequence = checkpoint.sequence,
            status = ?status,
            "Re-attached persisted run"
        );
        Ok(self
            .sessions
            .register(run_id.clone(), owner, status, pending))
    }

    /// Drop every run owned by a closed connection. Checkpoints go with them
    /// unless retention is enabled. Steps still executing for these runs
    /// finish in the background and their results are discarded.
    pub fn disconnect(&self, owner: &ConnectionId) -> Vec<RunRecord> {
        self.event_bus.disconnect(owner);
        let removed = self.sessions.cleanup(owner);
        if !self.retain_checkpoints {
            for record in &removed {
                if let Err(e) = self.store.delete(&record.checkpoint_key) {
                    warn!(run_id = %record.run_id, error = %e, "Failed to delete checkpoint");
                }
            }
        }
        if !removed.is_empty() {
            info!(connection = %owner, runs = removed.len(), "Released runs of closed connection");
        }
        removed
    }

    fn load_checkpoint(&self, run_id: &RunId) -> Result<Checkpoint> {
        self.store
            .load(&run_id.checkpoint_key())?
            .ok_or_else(|| MootError::Checkpoint(format!("no checkpoint for run {}", run_id)))
    }

    async fn run_from(
        &self,
        run_id: &RunId,
        mut checkpoint: Checkpoint,
        mut input: Option<HumanInput>,
    ) -> Result<RunOutcome> {
        let started = Instant::now();
        loop {
            let step = match checkpoint.cursor {
                Cursor::Finished => {
                    if self
                        .sessions
                        .update(run_id, RunStatus::Completed, None)
                        .is_err()
                    {
                        return Ok(RunOutcome::Detached);
                    }
                    return Ok(RunOutcome::Completed);
                }
                Cursor::Awaiting(step) if input.is_none() => {
                    return Ok(self.suspend(run_id, &checkpoint, step));
                }
                Cursor::Awaiting(step) => step,
                Cursor::Ready(step) => {
                    let human = match self.topology.node(step) {
                        Ok(node) => node.input_kind().is_some(),
                        Err(e) => return Ok(self.stall(run_id, step, e)),
                    };
                    if human && input.is_none() {
                        match self.persist_awaiting(&checkpoint, step) {
                            Ok(saved) => checkpoint = saved,
                            Err(e) => return Ok(self.stall(run_id, step, e)),
                        }
                        continue;
                    }
                    step
                }
            };

            match self.execute(run_id, &checkpoint, step, input.take()).await {
                Ok(Stepped::Saved(next)) => checkpoint = next,
                Ok(Stepped::Detached) => return Ok(RunOutcome::Detached),
                Err(e) => return Ok(self.stall(run_id, step, e)),
            }

            if checkpoint.cursor == Cursor::Finished {
                if self
                    .sessions
                    .update(run_id, RunStatus::Completed, None)
                    .is_err()
                {
                    return Ok(RunOutcome::Detached);
                }
                info!(
                    run_id = %run_id,
                    sequence = checkpoint.sequence,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Run completed"
                );
                self.publish(
                    run_id,
                    RunEventKind::RunCompleted {
                        final_state: Box::new(checkpoint.state),
                    },
                );
                return Ok(RunOutcome::Completed);
            }
        }
    }

    async fn execute(
        &self,
        run_id: &RunId,
        checkpoint: &Checkpoint,
        step: StepId,
        input: Option<HumanInput>,
    ) -> Result<Stepped> {
        let node = self.topology.node(step)?;
        if self
            .sessions
            .update(run_id, RunStatus::Active, None)
            .is_err()
        {
            return Ok(Stepped::Detached);
        }

        let answered = if input.is_some() {
            Some(step)
        } else {
            checkpoint.answered
        };
        debug!(run_id = %run_id, step_id = %step, kind = node.kind.label(), "Executing step");
        let outcome = run_step(
            step,
            StepContext {
                state: &checkpoint.state,
                generator: self.generator.as_ref(),
                budgets: &self.budgets,
                input,
            },
        )
        .await;

        if !self.sessions.contains(run_id) {
            info!(run_id = %run_id, step_id = %step, "Run removed during step, discarding result");
            return Ok(Stepped::Detached);
        }

        let (update, redirect) = outcome?.into_parts();
        let mut state = checkpoint.state.clone();
        state.apply(update.clone())?;

        let next = match redirect {
            Some(target) => {
                self.topology.check_redirect(step, target)?;
                Some(target)
            }
            None => self.topology.successor(step, &state)?,
        };
        let cursor = match next {
            None => Cursor::Finished,
            Some(next) if self.topology.node(next)?.input_kind().is_some() => {
                Cursor::Awaiting(next)
            }
            Some(next) => Cursor::Ready(next),
        };

        let saved = Checkpoint {
            key: checkpoint.key.clone(),
            run_id: run_id.clone(),
            state,
            cursor,
            answered,
            sequence: checkpoint.sequence + 1,
            saved_at: Utc::now(),
        };
        self.store.save(&saved)?;

        // The connection may have closed while we were saving
        if !self.sessions.contains(run_id) {
            if !self.retain_checkpoints {
                self.store.delete(&saved.key)?;
            }
            return Ok(Stepped::Detached);
        }

        debug!(
            run_id = %run_id,
            step_id = %step,
            next = ?saved.cursor,
            sequence = saved.sequence,
            "Step completed"
        );
        self.publish(
            run_id,
            RunEventKind::StepCompleted {
                step_id: step,
                state_delta: update,
                phase: saved.state.phase,
                progress_percent: node.progress,
                transcript_tail: saved.state.transcript_tail(TRANSCRIPT_TAIL).to_vec(),
            },
        );
        Ok(Stepped::Saved(saved))
    }

    fn persist_awaiting(&self, checkpoint: &Checkpoint, step: StepId) -> Result<Checkpoint> {
        let saved = Checkpoint {
            cursor: Cursor::Awaiting(step),
            sequence: checkpoint.sequence + 1,
            saved_at: Utc::now(),
            ..checkpoint.clone()
        };
        self.store.save(&saved)?;
        Ok(saved)
    }

    fn suspend(&self, run_id: &RunId, checkpoint: &Checkpoint, step: StepId) -> RunOutcome {
        let Some(spec) = input_spec(step) else {
            return self.stall(
                run_id,
                step,
                MootError::Topology(format!("'{}' has no input spec", step)),
            );
        };
        if self
            .sessions
            .update(run_id, RunStatus::AwaitingInput, Some(step))
            .is_err()
        {
            return RunOutcome::Detached;
        }

        info!(run_id = %run_id, step_id = %step, "Awaiting input");
        self.publish(
            run_id,
            RunEventKind::AwaitingInput {
                step_id: step,
                prompt: spec.prompt.to_string(),
                input_kind: spec.input_kind,
                phase: checkpoint.state.phase,
            },
        );
        RunOutcome::Suspended(step)
    }

    fn stall(&self, run_id: &RunId, step: StepId, err: MootError) -> RunOutcome {
        error!(run_id = %run_id, step_id = %step, code = err.code(), error = %err, "Step failed, run stalled");
        if self
            .sessions
            .update(run_id, RunStatus::Stalled, Some(step))
            .is_err()
        {
            return RunOutcome::Detached;
        }

        let message = err.to_string();
        self.publish(
            run_id,
            RunEventKind::RunError {
                code: err.code().to_string(),
                message: message.clone(),
            },
        );
        RunOutcome::Stalled {
            step,
            code: err.code(),
            message,
        }
    }

    /// Events go to the connection that owns the run. A released run has no
    /// audience.
    fn publish(&self, run_id: &RunId, kind: RunEventKind) {
        let Some(owner) = self.sessions.owner(run_id) else {
            debug!(run_id = %run_id, "Run released, event dropped");
            return;
        };
        self.event_bus.publish(
            &owner,
            RunEvent {
                run_id: run_id.clone(),
                kind,
            },
        );
    }
}
