//! Run event delivery.
//!
//! Every connection opens a route and receives the events of the runs it
//! owns on its own unbounded queue, so the owner of a run sees every
//! `awaiting_input`, `error` and `run_completed` no matter how many other
//! runs are busy. A broadcast tap mirrors all events for observers; it is
//! bounded and a slow observer may lag.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use tokio::sync::{broadcast, mpsc};
use tracing::debug;

use crate::types::{ConnectionId, RunEvent};

pub type EventReceiver = mpsc::UnboundedReceiver<RunEvent>;

pub struct EventBus {
    routes: Mutex<HashMap<ConnectionId, mpsc::UnboundedSender<RunEvent>>>,
    tap: broadcast::Sender<RunEvent>,
}

impl EventBus {
    /// `tap_capacity` bounds the observer tap only. Routed delivery never drops.
    pub fn new(tap_capacity: usize) -> Self {
        let (tap, _) = broadcast::channel(tap_capacity);
        Self {
            routes: Mutex::new(HashMap::new()),
            tap,
        }
    }

    fn routes(&self) -> MutexGuard<'_, HashMap<ConnectionId, mpsc::UnboundedSender<RunEvent>>> {
        self.routes.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Open the route for a connection, replacing any earlier one.
    pub fn connect(&self, conn: &ConnectionId) -> EventReceiver {
        let (tx, rx) = mpsc::unbounded_channel();
        if self.routes().insert(conn.clone(), tx).is_some() {
            debug!(connection = %conn, "Replaced event route");
        }
        rx
    }

    /// Close a connection's route. Its receiver yields what is queued, then ends.
    pub fn disconnect(&self, conn: &ConnectionId) -> bool {
        self.routes().remove(conn).is_some()
    }

    pub fn is_connected(&self, conn: &ConnectionId) -> bool {
        self.routes().contains_key(conn)
    }

    /// Deliver an event to the connection owning its run, and to observers.
    pub fn publish(&self, owner: &ConnectionId, event: RunEvent) {
        let delivered = match self.routes().get(owner) {
            Some(tx) => tx.send(event.clone()).is_ok(),
            None => false,
        };
        if !delivered {
            debug!(connection = %owner, run_id = %event.run_id, "No open route for run event");
        }
        // No observers is fine
        let _ = self.tap.send(event);
    }

    /// Observe every event. Bounded: a receiver that falls behind lags.
    pub fn subscribe(&self) -> broadcast::Receiver<RunEvent> {
        self.tap.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}
