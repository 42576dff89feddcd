use std::sync::Arc;

use axum::extract::ws::WebSocketUpgrade;
use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use serde_json::json;
use tracing::debug;

use moot_core::state::Phase;
use moot_core::types::RunStatus;
use moot_engine::input_spec;

use crate::connection;
use crate::state::AppState;

// GET /ws
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    debug!("WebSocket upgrade requested");
    let engine = state.engine.clone();
    ws.on_upgrade(move |socket| connection::handle_connection(socket, engine))
}

// GET /api/health
pub async fn health(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    let active_runs = state
        .engine
        .sessions()
        .list()
        .iter()
        .filter(|r| r.status != RunStatus::Completed)
        .count();
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "active_runs": active_runs,
    }))
}

// GET /api/capabilities
pub async fn capabilities(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    let topology = state.engine.topology();
    let human_steps: Vec<serde_json::Value> = topology
        .human_steps()
        .filter_map(|node| input_spec(node.id))
        .map(|spec| {
            json!({
                "step_id": spec.step,
                "input_kind": spec.input_kind,
                "prompt": spec.prompt,
            })
        })
        .collect();
    let steps: Vec<serde_json::Value> = topology
        .nodes()
        .map(|node| {
            json!({
                "step_id": node.id,
                "kind": node.kind.label(),
                "progress_percent": node.progress,
            })
        })
        .collect();

    Json(json!({
        "version": env!("CARGO_PKG_VERSION"),
        "phases": Phase::ALL,
        "human_steps": human_steps,
        "steps": steps,
    }))
}

#[cfg(test)]
mod tests {
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    use moot_core::config::BudgetConfig;
    use moot_core::event::EventBus;
    use moot_core::types::ConnectionId;
    use moot_engine::{MemoryCheckpointStore, RunEngine, SessionRegistry};
    use moot_test_utils::{sample_case_facts, sample_evidence, ScriptedGenerator};

    use super::*;
    use crate::server::router;

    fn app_state() -> Arc<AppState> {
        let engine = RunEngine::new(
            Arc::new(ScriptedGenerator::new()),
            Arc::new(MemoryCheckpointStore::new()),
            Arc::new(SessionRegistry::new()),
            Arc::new(EventBus::default()),
            BudgetConfig::default(),
        )
        .unwrap();
        Arc::new(AppState {
            engine: Arc::new(engine),
        })
    }

    async fn get(state: Arc<AppState>, uri: &str) -> (StatusCode, serde_json::Value) {
        let response = router(state)
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn health_counts_live_runs() {
        let state = app_state();
        let (status, body) = get(state.clone(), "/api/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        assert_eq!(body["active_runs"], 0);

        state
            .engine
            .start_run(&ConnectionId::new(), sample_case_facts(), sample_evidence())
            .unwrap();
        let (_, body) = get(state, "/api/health").await;
        assert_eq!(body["active_runs"], 1);
        assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
    }

    #[tokio::test]
    async fn capabilities_list_human_steps() {
        let (status, body) = get(app_state(), "/api/capabilities").await;
        assert_eq!(status, StatusCode::OK);

        let human = body["human_steps"].as_array().unwrap();
        assert_eq!(human.len(), 11);
        assert_eq!(human[0]["step_id"], "objection_gate");
        assert_eq!(human[0]["input_kind"], "boolean");
        let show = human
            .iter()
            .find(|h| h["step_id"] == "defense_show_evidence")
            .unwrap();
        assert_eq!(show["input_kind"], "evidence");

        assert_eq!(
            body["phases"],
            json!(["opening", "investigation", "debate", "verdict"])
        );
        assert_eq!(body["steps"].as_array().unwrap().len(), 34);
    }

    #[tokio::test]
    async fn unknown_route_is_404() {
        let response = router(app_state())
            .oneshot(Request::builder().uri("/api/nope").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
