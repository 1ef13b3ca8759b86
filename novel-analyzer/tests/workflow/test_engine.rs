//! Full-pipeline tests: fan-out, fan-in, and the observer contract

use super::common::*;
use novel_analyzer_sdk::{ApprovalResponse, RunStatus, StepStatus};
use std::sync::Arc;
use std::time::Duration;

#[tokio::test]
async fn test_full_run_merges_all_chunks() {
    let dir = temp_manuscripts("full_run");
    write_paragraphs(&dir, "manuscript.txt", &["Alpha", "Bravo", "Charlie"], 600);

    let client = ScriptedClient::default();
    let store = MemoryStore::default();
    let writes = store.writes.clone();
    let engine = engine_with(&dir, client, store, 700);

    let (handle, _rx) = engine.start_with_subscription().await.unwrap();
    wait_for_status(&engine, handle.id(), RunStatus::AwaitingApproval).await;

    let request = latest_approval(&engine, handle.id());
    assert_eq!(request.chunk_count, 3);
    assert_eq!(request.total_characters, 1800);
    assert_eq!(request.files, vec!["manuscript.txt"]);

    engine
        .resume(handle.id(), ApprovalResponse { approved: true })
        .await
        .unwrap();
    wait_for_status(&engine, handle.id(), RunStatus::Completed).await;

    let writes = writes.lock().unwrap();
    assert_eq!(writes.len(), 1, "report must be written exactly once");
    let names: Vec<_> = writes[0].characters.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, vec!["Alpha", "Bravo", "Charlie"]);
    assert_eq!(writes[0].scenes.len(), 3);
    assert!(writes[0].generated_at.is_some());
}

#[tokio::test]
async fn test_large_manuscript_dispatches_one_task_per_chunk() {
    let dir = temp_manuscripts("large_manuscript");
    // One file of ~45k characters against a 20k chunk limit
    let paragraph = "a".repeat(1_000);
    let text = vec![paragraph; 45].join("\n\n");
    std::fs::write(dir.join("manuscript.txt"), text).unwrap();

    let client = ScriptedClient::default();
    let analyze_calls = client.analyze_calls.clone();
    let aggregate_batches = client.aggregate_batches.clone();
    let store = MemoryStore::default();
    let writes = store.writes.clone();
    let engine = engine_with(&dir, client, store, 20_000);

    let (handle, _rx) = engine.start_with_subscription().await.unwrap();
    wait_for_status(&engine, handle.id(), RunStatus::AwaitingApproval).await;

    let request = latest_approval(&engine, handle.id());
    assert_eq!(request.chunk_count, 3);
    assert_eq!(request.files, vec!["manuscript.txt"]);

    engine
        .resume(handle.id(), ApprovalResponse { approved: true })
        .await
        .unwrap();
    wait_for_status(&engine, handle.id(), RunStatus::Completed).await;

    assert_eq!(*analyze_calls.lock().unwrap(), 3);
    assert_eq!(*aggregate_batches.lock().unwrap(), vec![3]);
    assert_eq!(writes.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn test_zero_files_still_persists_empty_report() {
    let dir = temp_manuscripts("zero_files");

    let client = ScriptedClient::default();
    let analyze_calls = client.analyze_calls.clone();
    let store = MemoryStore::default();
    let writes = store.writes.clone();
    let engine = engine_with(&dir, client, store, 20_000);

    let (handle, _rx) = engine.start_with_subscription().await.unwrap();
    wait_for_status(&engine, handle.id(), RunStatus::AwaitingApproval).await;

    let request = latest_approval(&engine, handle.id());
    assert_eq!(request.chunk_count, 0);
    assert!(request.files.is_empty());

    engine
        .resume(handle.id(), ApprovalResponse { approved: true })
        .await
        .unwrap();
    wait_for_status(&engine, handle.id(), RunStatus::Completed).await;

    assert_eq!(*analyze_calls.lock().unwrap(), 0);
    let writes = writes.lock().unwrap();
    assert_eq!(writes.len(), 1);
    assert!(writes[0].characters.is_empty());
    assert!(writes[0].scenes.is_empty());
    assert!(writes[0].generated_at.is_some());
}

#[tokio::test]
async fn test_fan_in_is_order_independent() {
    async fn run_with_delays(
        label: &str,
        delays: Vec<(String, Duration)>,
    ) -> novel_analyzer_sdk::AnalysisReport {
        let dir = temp_manuscripts(label);
        write_paragraphs(&dir, "manuscript.txt", &["Alpha", "Bravo", "Charlie"], 600);

        let client = ScriptedClient {
            delays,
            ..Default::default()
        };
        let store = MemoryStore::default();
        let writes = store.writes.clone();
        let engine = engine_with(&dir, client, store, 700);

        let (handle, _rx) = engine.start_with_subscription().await.unwrap();
        wait_for_status(&engine, handle.id(), RunStatus::AwaitingApproval).await;
        engine
            .resume(handle.id(), ApprovalResponse { approved: true })
            .await
            .unwrap();
        wait_for_status(&engine, handle.id(), RunStatus::Completed).await;

        let report = writes.lock().unwrap()[0].clone();
        report
    }

    // Natural completion order vs. a reversed one
    let forward = run_with_delays("order_forward", Vec::new()).await;
    let reversed = run_with_delays(
        "order_reversed",
        vec![
            ("Alpha".to_string(), Duration::from_millis(120)),
            ("Bravo".to_string(), Duration::from_millis(60)),
        ],
    )
    .await;

    assert_eq!(forward.characters, reversed.characters);
    assert_eq!(forward.scenes, reversed.scenes);
}

#[tokio::test]
async fn test_step_ordering_invariants() {
    let dir = temp_manuscripts("step_ordering");
    write_paragraphs(&dir, "manuscript.txt", &["Alpha", "Bravo"], 600);

    let engine = engine_with(&dir, ScriptedClient::default(), MemoryStore::default(), 700);
    let (handle, _rx) = engine.start_with_subscription().await.unwrap();
    wait_for_status(&engine, handle.id(), RunStatus::AwaitingApproval).await;
    engine
        .resume(handle.id(), ApprovalResponse { approved: true })
        .await
        .unwrap();
    wait_for_status(&engine, handle.id(), RunStatus::Completed).await;

    let history = engine.history(handle.id(), None).unwrap();
    assert!(!history.is_empty());

    for snapshot in &history {
        // Aggregation never starts before analysis has completed
        if snapshot.steps.status_of("aggregate") == Some(StepStatus::Running) {
            assert_eq!(snapshot.steps.status_of("analyze"), Some(StepStatus::Completed));
        }
        // The output location only appears once aggregation has completed
        let has_output = snapshot
            .result
            .as_ref()
            .map(|report| report.output_path.is_some())
            .unwrap_or(false);
        if has_output {
            assert_eq!(
                snapshot.steps.status_of("aggregate"),
                Some(StepStatus::Completed)
            );
        }
    }

    let last = history.last().unwrap();
    let step_names: Vec<_> = last.steps.items().iter().map(|s| s.name.as_str()).collect();
    assert_eq!(step_names, vec!["load_files", "analyze", "aggregate"]);
    assert!(last
        .steps
        .items()
        .iter()
        .all(|step| step.status == StepStatus::Completed));
    assert!(last.result.as_ref().unwrap().output_path.is_some());
}

#[tokio::test]
async fn test_concurrent_runs_are_independent() {
    let dir_a = temp_manuscripts("independent_a");
    let dir_b = temp_manuscripts("independent_b");
    write_paragraphs(&dir_a, "a.txt", &["Alpha"], 100);
    write_paragraphs(&dir_b, "b.txt", &["Bravo", "Charlie"], 600);

    let engine_a = engine_with(&dir_a, ScriptedClient::default(), MemoryStore::default(), 700);
    let engine_b = engine_with(&dir_b, ScriptedClient::default(), MemoryStore::default(), 700);

    let (handle_a, _rx_a) = engine_a.start_with_subscription().await.unwrap();
    let (handle_b, _rx_b) = engine_b.start_with_subscription().await.unwrap();

    wait_for_status(&engine_a, handle_a.id(), RunStatus::AwaitingApproval).await;
    wait_for_status(&engine_b, handle_b.id(), RunStatus::AwaitingApproval).await;

    assert_eq!(latest_approval(&engine_a, handle_a.id()).chunk_count, 1);
    assert_eq!(latest_approval(&engine_b, handle_b.id()).chunk_count, 2);

    // Resolving one run leaves the other suspended
    engine_a
        .resume(handle_a.id(), ApprovalResponse { approved: true })
        .await
        .unwrap();
    wait_for_status(&engine_a, handle_a.id(), RunStatus::Completed).await;
    assert_eq!(
        engine_b.status(handle_b.id()).unwrap(),
        RunStatus::AwaitingApproval
    );

    engine_b
        .resume(handle_b.id(), ApprovalResponse { approved: true })
        .await
        .unwrap();
    wait_for_status(&engine_b, handle_b.id(), RunStatus::Completed).await;
}

#[tokio::test]
async fn test_cleanup_retains_live_runs() {
    let dir = temp_manuscripts("cleanup");
    write_paragraphs(&dir, "manuscript.txt", &["Alpha"], 100);

    let engine = Arc::new(engine_with(
        &dir,
        ScriptedClient::default(),
        MemoryStore::default(),
        700,
    ));

    let (suspended, _rx) = engine.start_with_subscription().await.unwrap();
    wait_for_status(&engine, suspended.id(), RunStatus::AwaitingApproval).await;

    let (finished, _rx) = engine.start_with_subscription().await.unwrap();
    wait_for_status(&engine, finished.id(), RunStatus::AwaitingApproval).await;
    engine
        .resume(finished.id(), ApprovalResponse { approved: true })
        .await
        .unwrap();
    wait_for_status(&engine, finished.id(), RunStatus::Completed).await;

    engine.cleanup_finished_runs();

    // The suspended run survives cleanup, the completed one is dropped
    assert_eq!(
        engine.status(suspended.id()).unwrap(),
        RunStatus::AwaitingApproval
    );
    assert!(engine.status(finished.id()).is_err());
}
