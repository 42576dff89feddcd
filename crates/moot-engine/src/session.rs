use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};

use moot_core::error::{MootError, Result};
use moot_core::step::StepId;
use moot_core::types::{ConnectionId, RunId, RunStatus};

/// Bookkeeping for one live run.
#[derive(Debug, Clone)]
pub struct RunRecord {
    pub run_id: RunId,
    pub checkpoint_key: String,
    pub status: RunStatus,
    /// Step the run is waiting at (AWAITING_INPUT) or failed at (STALLED).
    pub pending_step: Option<StepId>,
    pub owner: ConnectionId,
    pub started_at: DateTime<Utc>,
    pub last_active: DateTime<Utc>,
}

/// Tracks live runs and the connection that owns each of them.
pub struct SessionRegistry {
    runs: Mutex<HashMap<RunId, RunRecord>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self {
            runs: Mutex::new(HashMap::new()),
        }
    }

    fn runs(&self) -> MutexGuard<'_, HashMap<RunId, RunRecord>> {
        self.runs.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Allocate a fresh run owned by `owner`.
    pub fn create(&self, owner: &ConnectionId) -> RunRecord {
        self.register(RunId::new(), owner, RunStatus::Active, None)
    }

    /// Register a run under a known id, replacing any previous record.
    pub fn register(
        &self,
        run_id: RunId,
        owner: &ConnectionId,
        status: RunStatus,
        pending_step: Option<StepId>,
    ) -> RunRecord {
        let now = Utc::now();
        let record = RunRecord {
            checkpoint_key: run_id.checkpoint_key(),
            run_id: run_id.clone(),
            status,
            pending_step,
            owner: owner.clone(),
            started_at: now,
            last_active: now,
        };
        self.runs().insert(run_id, record.clone());
        record
    }

    pub fn get(&self, run_id: &RunId) -> Option<RunRecord> {
        self.runs().get(run_id).cloned()
    }

    pub fn contains(&self, run_id: &RunId) -> bool {
        self.runs().contains_key(run_id)
    }

    pub fn owner(&self, run_id: &RunId) -> Option<ConnectionId> {
        self.runs().get(run_id).map(|r| r.owner.clone())
    }

    /// Set status and pending step, refreshing last activity.
    pub fn update(
        &self,
        run_id: &RunId,
        status: RunStatus,
        pending_step: Option<StepId>,
    ) -> Result<RunRecord> {
        let mut runs = self.runs();
        let record = runs
            .get_mut(run_id)
            .ok_or_else(|| MootError::UnknownRun(run_id.to_string()))?;
        record.status = status;
        record.pending_step = pending_step;
        record.last_active = Utc::now();
        Ok(record.clone())
    }

    /// Atomically move a run from `from` to ACTIVE. Returns the prior record,
    /// or `None` when the run is missing or in another status.
    pub fn activate_if(&self, run_id: &RunId, from: RunStatus) -> Option<RunRecord> {
        let mut runs = self.runs();
        let record = runs.get_mut(run_id)?;
        if record.status != from {
            return None;
        }
        let prior = record.clone();
        record.status = RunStatus::Active;
        record.last_active = Utc::now();
        Some(prior)
    }

    pub fn remove(&self, run_id: &RunId) -> Option<RunRecord> {
        self.runs().remove(run_id)
    }

    /// Drop every run owned by `owner`, returning the removed records.
    pub fn cleanup(&self, owner: &ConnectionId) -> Vec<RunRecord> {
        let mut runs = self.runs();
        let ids: Vec<RunId> = runs
            .values()
            .filter(|r| &r.owner == owner)
            .map(|r| r.run_id.clone())
            .collect();
        ids.iter().filter_map(|id| runs.remove(id)).collect()
    }

    pub fn list(&self) -> Vec<RunRecord> {
        self.runs().values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.runs().len()
    }

    pub fn is_empty(&self) -> bool {
        self.runs().is_empty()
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
