use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use moot_core::error::{MootError, Result};
use moot_core::types::{ConnectionId, RunId};
use moot_engine::{RunEngine, RunOutcome};

use crate::lane::LaneQueue;
use crate::protocol::{ClientMessage, ServerMessage};

type WsSink = Arc<Mutex<SplitSink<WebSocket, Message>>>;

async fn send(sink: &WsSink, message: &ServerMessage) -> bool {
    let json = match serde_json::to_string(message) {
        Ok(json) => json,
        Err(e) => {
            warn!(error = %e, "Failed to encode server message");
            return true;
        }
    };
    let mut tx = sink.lock().await;
    tx.send(Message::Text(json.into())).await.is_ok()
}

/// Handle a single WebSocket connection (axum WebSocket).
pub async fn handle_connection(ws: WebSocket, engine: Arc<RunEngine>) {
    let conn_id = ConnectionId::new();
    let (ws_tx, mut ws_rx) = ws.split();
    let ws_tx: WsSink = Arc::new(Mutex::new(ws_tx));
    let closed = CancellationToken::new();
    debug!(connection = %conn_id, "Connection opened");

    // Forward events of runs this connection owns
    let mut events = engine.event_bus().connect(&conn_id);
    let event_conn = conn_id.clone();
    let event_ws_tx = ws_tx.clone();
    let event_task = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            if !send(&event_ws_tx, &ServerMessage::from(event)).await {
                debug!(connection = %event_conn, "Event forwarder stopped");
                break;
            }
        }
    });

    // Create a lane for serial request processing
    let (lane, mut lane_rx) = LaneQueue::new(32);

    // Spawn lane processor. It is never aborted: a step already running when
    // the client leaves completes and the engine discards its result.
    let lane_engine = engine.clone();
    let lane_conn = conn_id.clone();
    let lane_ws_tx = ws_tx.clone();
    let lane_closed = closed.clone();
    tokio::spawn(async move {
        while let Some(message) = lane_rx.recv().await {
            if lane_closed.is_cancelled() {
                continue;
            }
            process_request(message, &lane_conn, &lane_engine, &lane_ws_tx).await;
            // A run created while the connection was closing has no owner left
            if lane_closed.is_cancelled() {
                lane_engine.disconnect(&lane_conn);
            }
        }
    });

    // Read incoming frames
    while let Some(msg) = ws_rx.next().await {
        let msg = match msg {
            Ok(m) => m,
            Err(e) => {
                debug!(connection = %conn_id, error = %e, "WebSocket read error");
                break;
            }
        };

        match msg {
            Message::Text(text) => match ClientMessage::parse(&text) {
                Ok(message) => {
                    if !lane.push(message).await {
                        break;
                    }
                }
                Err(e) => {
                    debug!(connection = %conn_id, error = %e, "Rejected client frame");
                    if !send(&ws_tx, &ServerMessage::error(None, &e)).await {
                        break;
                    }
                }
            },
            Message::Close(_) => break,
            Message::Ping(data) => {
                let mut tx = ws_tx.lock().await;
                let _ = tx.send(Message::Pong(data)).await;
            }
            _ => {}
        }
    }

    closed.cancel();
    event_task.abort();
    let released = engine.disconnect(&conn_id);
    info!(connection = %conn_id, runs = released.len(), "Connection closed");
}

async fn process_request(
    message: ClientMessage,
    conn_id: &ConnectionId,
    engine: &RunEngine,
    ws_tx: &WsSink,
) {
    match message {
        ClientMessage::Ping => {
            send(ws_tx, &ServerMessage::Pong).await;
        }
        ClientMessage::StartRun(req) => {
            // Repeating the start of a run that stalled recovers that run
            if let Some(run_id) =
                engine.stalled_start(conn_id, &req.case_facts, &req.evidence_catalog)
            {
                let created = ServerMessage::RunCreated {
                    run_id: run_id.clone(),
                };
                if send(ws_tx, &created).await {
                    report(&run_id, engine.retry(&run_id).await, ws_tx).await;
                }
                return;
            }
            let run_id = match engine.start_run(conn_id, req.case_facts, req.evidence_catalog) {
                Ok(run_id) => run_id,
                Err(e) => {
                    send(ws_tx, &ServerMessage::error(None, &e)).await;
                    return;
                }
            };
            let created = ServerMessage::RunCreated {
                run_id: run_id.clone(),
            };
            if !send(ws_tx, &created).await {
                return;
            }
            report(&run_id, engine.drive(&run_id).await, ws_tx).await;
        }
        ClientMessage::Resume(req) => {
            let result = match claim(engine, &req.run_id, conn_id) {
                Ok(()) => engine.resume(&req.run_id, &req.step_id, &req.input).await,
                Err(e) => Err(e),
            };
            report(&req.run_id, result, ws_tx).await;
        }
        ClientMessage::Retry(req) => {
            let result = match claim(engine, &req.run_id, conn_id) {
                Ok(()) => engine.retry(&req.run_id).await,
                Err(e) => Err(e),
            };
            report(&req.run_id, result, ws_tx).await;
        }
    }
}

/// Make sure this connection owns the run, re-attaching a persisted one.
/// Runs owned by another connection look unknown from here.
fn claim(engine: &RunEngine, run_id: &RunId, conn_id: &ConnectionId) -> Result<()> {
    let record = engine.attach(run_id, conn_id)?;
    if &record.owner != conn_id {
        return Err(MootError::UnknownRun(run_id.to_string()));
    }
    Ok(())
}

/// Request failures are answered directly. Step failures already reached the
/// client as an `error` event, so stalled outcomes need nothing more.
async fn report(run_id: &RunId, result: Result<RunOutcome>, ws_tx: &WsSink) {
    match result {
        Ok(RunOutcome::Detached) => {
            debug!(run_id = %run_id, "Run detached");
        }
        Ok(outcome) => {
            debug!(run_id = %run_id, outcome = ?outcome, "Request handled");
        }
        Err(e) => {
            debug!(run_id = %run_id, code = e.code(), error = %e, "Request failed");
            send(ws_tx, &ServerMessage::error(Some(run_id.clone()), &e)).await;
        }
    }
}
