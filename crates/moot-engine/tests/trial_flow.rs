use std::sync::Arc;

use serde_json::{json, Value};

use moot_core::config::BudgetConfig;
use moot_core::event::{EventBus, EventReceiver};
use moot_core::state::{Budget, Phase, Role, StateUpdate, Utterance};
use moot_core::step::StepId;
use moot_core::traits::CheckpointStore;
use moot_core::types::{
    ConnectionId, Cursor, EvidenceSubmission, RunEvent, RunEventKind, RunId, RunStatus,
};
use moot_engine::{MemoryCheckpointStore, RunEngine, RunOutcome, SessionRegistry};
use moot_test_utils::{defense_evidence, sample_case_facts, sample_evidence, ScriptedGenerator};

struct Harness {
    engine: Arc<RunEngine>,
    generator: Arc<ScriptedGenerator>,
    store: Arc<MemoryCheckpointStore>,
}

fn harness(generator: ScriptedGenerator) -> Harness {
    let generator = Arc::new(generator);
    let store = Arc::new(MemoryCheckpointStore::new());
    let engine = RunEngine::new(
        generator.clone(),
        store.clone(),
        Arc::new(SessionRegistry::new()),
        Arc::new(EventBus::default()),
        BudgetConfig::default(),
    )
    .unwrap();
    Harness {
        engine: Arc::new(engine),
        generator,
        store,
    }
}

fn start(h: &Harness, conn: &ConnectionId) -> RunId {
    h.engine
        .start_run(conn, sample_case_facts(), sample_evidence())
        .unwrap()
}

/// Answer every suspension with `answer` until the run stops suspending.
/// Returns the final outcome and the steps the run waited at, in order.
async fn play(
    engine: &RunEngine,
    run_id: &RunId,
    mut outcome: RunOutcome,
    mut answer: impl FnMut(StepId) -> Value,
) -> (RunOutcome, Vec<StepId>) {
    let mut waited = Vec::new();
    while let RunOutcome::Suspended(step) = outcome {
        waited.push(step);
        outcome = engine
            .resume(run_id, step.as_str(), &answer(step))
            .await
            .unwrap();
    }
    (outcome, waited)
}

fn decline(step: StepId) -> Value {
    match step {
        StepId::ObjectionGate
        | StepId::ContinueQuestioningGate
        | StepId::SupplementalEvidenceGate => json!(false),
        _ => json!("The defense has nothing to add."),
    }
}

fn drain(rx: &mut EventReceiver) -> Vec<RunEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

#[tokio::test]
async fn declining_everything_reaches_the_verdict() {
    let h = harness(ScriptedGenerator::new());
    let conn = ConnectionId::new();
    let mut rx = h.engine.event_bus().connect(&conn);
    let run_id = start(&h, &conn);

    let first = h.engine.drive(&run_id).await.unwrap();
    let (outcome, waited) = play(&h.engine, &run_id, first, decline).await;
    assert_eq!(outcome, RunOutcome::Completed);
    assert_eq!(
        waited,
        vec![
            StepId::ObjectionGate,
            StepId::DefenseQuestion,
            StepId::ContinueQuestioningGate,
            StepId::DefenseSummary,
            StepId::SupplementalEvidenceGate,
            StepId::DefenseStatement,
            StepId::DefenseSumup,
        ]
    );

    let cp = h.store.load(&run_id.checkpoint_key()).unwrap().unwrap();
    assert_eq!(cp.cursor, Cursor::Finished);
    assert_eq!(cp.state.phase, Phase::Verdict);
    assert_eq!(cp.state.question_budget, Budget::EXHAUSTED);
    assert_eq!(cp.state.evidence_budget, Budget::new(3));
    let last = cp.state.transcript.last().unwrap();
    assert_eq!(last.role, Role::PresidingJudge);
    assert!(last.content.contains("judge_verdict"));

    // Three generated questions; the fourth turn concludes without generation
    assert_eq!(h.generator.calls(StepId::ProsQuestion), 3);
    assert_eq!(h.generator.calls(StepId::EvidenceDecision), 1);
    assert_eq!(h.generator.calls(StepId::ProsShowEvidence), 0);

    let events = drain(&mut rx);
    let completions = events
        .iter()
        .filter(|e| matches!(e.kind, RunEventKind::RunCompleted { .. }))
        .count();
    assert_eq!(completions, 1);

    // The question budget hits the sentinel exactly once
    let exhaustions = events
        .iter()
        .filter(|e| {
            matches!(
                &e.kind,
                RunEventKind::StepCompleted { state_delta, .. }
                    if state_delta.question_budget == Some(Budget::EXHAUSTED)
            )
        })
        .count();
    assert_eq!(exhaustions, 1);

    assert_eq!(
        h.engine.sessions().get(&run_id).unwrap().status,
        RunStatus::Completed
    );

    // Driving a finished run is a no-op
    assert_eq!(h.engine.drive(&run_id).await.unwrap(), RunOutcome::Completed);
    assert!(drain(&mut rx).is_empty());
}

#[tokio::test]
async fn progress_and_phase_follow_the_trial() {
    let h = harness(ScriptedGenerator::new());
    let conn = ConnectionId::new();
    let mut rx = h.engine.event_bus().connect(&conn);
    let run_id = start(&h, &conn);

    let first = h.engine.drive(&run_id).await.unwrap();
    play(&h.engine, &run_id, first, decline).await;

    let mut last_phase = Phase::Opening;
    let mut saw_full_progress = false;
    for event in drain(&mut rx) {
        if let RunEventKind::StepCompleted {
            step_id,
            phase,
            progress_percent,
            transcript_tail,
            ..
        } = event.kind
        {
            assert!(phase >= last_phase, "phase regressed at {}", step_id);
            last_phase = phase;
            assert!(transcript_tail.len() <= 5);
            if step_id == StepId::JudgeVerdict {
                assert_eq!(progress_percent, 100);
                saw_full_progress = true;
            }
            if step_id == StepId::ClerkRules {
                assert_eq!(progress_percent, 1);
                assert_eq!(transcript_tail.len(), 2);
            }
        }
    }
    assert!(saw_full_progress);
    assert_eq!(last_phase, Phase::Verdict);
}

#[tokio::test]
async fn each_focus_point_gets_its_rounds() {
    let h = harness(ScriptedGenerator::new().with_focus_points(["A", "B"]));
    let run_id = start(&h, &ConnectionId::new());

    let first = h.engine.drive(&run_id).await.unwrap();
    let (outcome, waited) = play(&h.engine, &run_id, first, decline).await;
    assert_eq!(outcome, RunOutcome::Completed);

    let focus_turns = waited.iter().filter(|s| **s == StepId::DefenseFocus).count();
    assert_eq!(focus_turns, 4);
    assert_eq!(h.generator.calls(StepId::ProsFocus), 4);

    // Closing summary comes straight after the last focus argument
    let log = h.generator.call_log();
    let last_focus = log.iter().rposition(|s| *s == StepId::ProsFocus).unwrap();
    assert_eq!(log[last_focus + 1], StepId::ProsSumup);

    let cp = h.store.load(&run_id.checkpoint_key()).unwrap().unwrap();
    assert_eq!(cp.state.focus_points, vec!["A", "B"]);
    assert_eq!(cp.state.focus_index, 2);
    let announced: Vec<&Utterance> = cp
        .state
        .transcript
        .iter()
        .filter(|u| u.content.contains('«'))
        .collect();
    assert_eq!(announced.len(), 2);
    assert!(announced[0].content.contains("«A»"));
    assert!(announced[1].content.contains("«B»"));
}

#[tokio::test]
async fn evidence_rounds_and_supplemental_submission() {
    let generator = ScriptedGenerator::new()
        .with_evidence_decision(&["P1", "P2"], "union")
        .with_evidence_decision(&["P3", "P1"], "single");
    let h = harness(generator);
    let run_id = start(&h, &ConnectionId::new());

    let mut supplemented = false;
    let first = h.engine.drive(&run_id).await.unwrap();
    let (outcome, waited) = play(&h.engine, &run_id, first, |step| match step {
        StepId::SupplementalEvidenceGate if !supplemented => {
            supplemented = true;
            json!(true)
        }
        StepId::DefenseShowEvidence => serde_json::to_value(EvidenceSubmission {
            items: defense_evidence(),
            note: "The log places the defendant elsewhere.".into(),
        })
        .unwrap(),
        other => decline(other),
    })
    .await;
    assert_eq!(outcome, RunOutcome::Completed);

    assert_eq!(
        waited.iter().filter(|s| **s == StepId::DefenseCross).count(),
        2
    );
    assert_eq!(
        waited
            .iter()
            .filter(|s| **s == StepId::SupplementalEvidenceGate)
            .count(),
        2
    );
    assert_eq!(h.generator.calls(StepId::ProsShowEvidence), 2);
    assert_eq!(h.generator.calls(StepId::ProsCross), 1);

    let cp = h.store.load(&run_id.checkpoint_key()).unwrap().unwrap();
    assert_eq!(cp.state.evidence_budget, Budget::new(1));
    assert!(cp
        .state
        .transcript
        .iter()
        .any(|u| u.role == Role::DefenseCounsel
            && u.content.contains("places the defendant elsewhere")));
}

#[tokio::test]
async fn interleaved_runs_stay_isolated() {
    let h = harness(ScriptedGenerator::new());
    let a = start(&h, &ConnectionId::new());
    let b = start(&h, &ConnectionId::new());

    assert_eq!(
        h.engine.drive(&a).await.unwrap(),
        RunOutcome::Suspended(StepId::ObjectionGate)
    );
    assert_eq!(
        h.engine.drive(&b).await.unwrap(),
        RunOutcome::Suspended(StepId::ObjectionGate)
    );

    let a_next = h
        .engine
        .resume(&a, "objection_gate", &json!(true))
        .await
        .unwrap();
    assert_eq!(a_next, RunOutcome::Suspended(StepId::DefenseObjection));

    // B declines while A is still waiting for its objection text
    let b_next = h
        .engine
        .resume(&b, "objection_gate", &json!(false))
        .await
        .unwrap();
    assert_eq!(b_next, RunOutcome::Suspended(StepId::DefenseQuestion));

    let a_next = h
        .engine
        .resume(&a, "defense_objection", &json!("Run A objects."))
        .await
        .unwrap();
    assert_eq!(a_next, RunOutcome::Suspended(StepId::DefenseQuestion));

    let cp_a = h.store.load(&a.checkpoint_key()).unwrap().unwrap();
    let cp_b = h.store.load(&b.checkpoint_key()).unwrap().unwrap();
    assert!(cp_a.state.transcript.iter().any(|u| u.content == "Run A objects."));
    assert!(!cp_b.state.transcript.iter().any(|u| u.content == "Run A objects."));
    assert_eq!(cp_a.state.transcript.len(), cp_b.state.transcript.len() + 1);
    assert_eq!(cp_a.state.question_budget, Budget::EXHAUSTED);
    assert_eq!(cp_b.state.question_budget, Budget::EXHAUSTED);

    // Each run only accepts its own pending step
    let err = h
        .engine
        .resume(&b, "defense_objection", &json!("Not mine."))
        .await
        .unwrap_err();
    assert_eq!(err.code(), "UNKNOWN_STEP");
}

#[tokio::test]
async fn text_resume_appends_exactly_one_utterance() {
    let h = harness(ScriptedGenerator::new());
    let conn = ConnectionId::new();
    let mut rx = h.engine.event_bus().connect(&conn);
    let run_id = start(&h, &conn);
    h.engine.drive(&run_id).await.unwrap();
    h.engine
        .resume(&run_id, "objection_gate", &json!(true))
        .await
        .unwrap();
    drain(&mut rx);

    h.engine
        .resume(&run_id, "defense_objection", &json!("  I object.  "))
        .await
        .unwrap();

    let delta = drain(&mut rx)
        .into_iter()
        .find_map(|e| match e.kind {
            RunEventKind::StepCompleted {
                step_id: StepId::DefenseObjection,
                state_delta,
                ..
            } => Some(state_delta),
            _ => None,
        })
        .unwrap();
    assert_eq!(
        delta,
        StateUpdate::new().say(Utterance::new(
            Role::DefenseCounsel,
            "Defense Counsel Sun",
            "I object."
        ))
    );
}

#[tokio::test]
async fn invalid_input_changes_nothing() {
    let h = harness(ScriptedGenerator::new());
    let run_id = start(&h, &ConnectionId::new());
    h.engine.drive(&run_id).await.unwrap();
    let before = h.store.load(&run_id.checkpoint_key()).unwrap().unwrap();

    for bad in [json!("yes"), json!(1), json!(null), json!({ "answer": true })] {
        let err = h
            .engine
            .resume(&run_id, "objection_gate", &bad)
            .await
            .unwrap_err();
        assert_eq!(err.code(), "INVALID_INPUT");
    }

    let after = h.store.load(&run_id.checkpoint_key()).unwrap().unwrap();
    assert_eq!(before, after);
    let record = h.engine.sessions().get(&run_id).unwrap();
    assert_eq!(record.status, RunStatus::AwaitingInput);
    assert_eq!(record.pending_step, Some(StepId::ObjectionGate));

    assert_eq!(
        h.engine
            .resume(&run_id, "objection_gate", &json!(false))
            .await
            .unwrap(),
        RunOutcome::Suspended(StepId::DefenseQuestion)
    );
}

#[tokio::test]
async fn owner_sees_its_suspension_under_heavy_traffic() {
    let h = harness(ScriptedGenerator::new());
    let owner = ConnectionId::new();
    let mut rx = h.engine.event_bus().connect(&owner);
    let mut tap = h.engine.event_bus().subscribe();
    let mine = start(&h, &owner);
    assert_eq!(
        h.engine.drive(&mine).await.unwrap(),
        RunOutcome::Suspended(StepId::ObjectionGate)
    );

    // Fifty more runs, six events each, before the owner reads anything
    for _ in 0..50 {
        let conn = ConnectionId::new();
        let _other_rx = h.engine.event_bus().connect(&conn);
        let run_id = start(&h, &conn);
        h.engine.drive(&run_id).await.unwrap();
    }
    assert!(matches!(
        tap.try_recv(),
        Err(tokio::sync::broadcast::error::TryRecvError::Lagged(_))
    ));

    let events = drain(&mut rx);
    assert!(events.iter().all(|e| e.run_id == mine));
    assert_eq!(events.len(), 6);
    assert!(matches!(
        events.last().map(|e| &e.kind),
        Some(RunEventKind::AwaitingInput {
            step_id: StepId::ObjectionGate,
            ..
        })
    ));
}
