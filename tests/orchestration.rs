//! End-to-end orchestration scenarios against a scripted worker
//!
//! Drives the task coordinator with a mock implementation of the worker
//! surface: scripted progress sequences per device, injectable generate
//! refusals, and simulated process exits.

mod common;

use common::*;
use gridgen::args::GenerationRequest;
use gridgen::error::OrchestratorError;
use gridgen::task::TaskStatus;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::time::Duration;

#[tokio::test]
async fn single_gpu_single_image_happy_path() {
    let h = harness(&[1]);
    h.worker.script(
        0,
        vec![
            report(10, "Loading models"),
            report(50, "Sampling"),
            finished_report(100, &["a.png"]),
        ],
    );
    let (_id, mut rx) = h.bus.subscribe();

    let request =
        GenerationRequest::from_value(json!({ "prompt": "a cat", "image_number": 1 })).unwrap();
    let outcome = h.coordinator.submit(request).await.unwrap();
    assert_eq!(outcome.total_images, 1);
    assert_eq!(outcome.gpus.len(), 1);
    assert_eq!(outcome.gpus[0].device, 0);
    assert_eq!(outcome.gpus[0].images, 1);

    let updates = collect_until_terminal(&mut rx, &outcome.task_id).await;
    let terminal = updates.last().unwrap();
    assert_eq!(terminal.percentage, 100);
    assert!(terminal.finished);
    assert_eq!(terminal.results, vec!["a.png".to_string()]);
    assert_eq!(terminal.status_text, "Finished (1/1 images)");
    assert!(terminal.preview.is_none());

    // Published percentages never decrease, and only the last is terminal.
    let mut last = -1;
    for update in &updates {
        assert!(update.percentage >= last, "regressed: {:?}", update);
        last = update.percentage;
    }
    assert_eq!(updates.iter().filter(|u| u.finished).count(), 1);

    // Slot released after completion.
    assert!(h.scheduler.slots().iter().all(|slot| !slot.busy));
}

#[tokio::test]
async fn weighted_split_fans_out_seeds() {
    let h = harness(&[3, 1]);
    h.worker.script(0, vec![finished_report(100, &["0.png"])]);
    h.worker.script(1, vec![finished_report(100, &["1.png"])]);
    let (_id, mut rx) = h.bus.subscribe();

    let request = GenerationRequest::from_value(json!({
        "prompt": "a cat",
        "image_number": 8,
        "image_seed": 100,
        "seed_random": false
    }))
    .unwrap();
    let outcome = h.coordinator.submit(request).await.unwrap();

    let shares: Vec<(u32, u32)> = outcome.gpus.iter().map(|g| (g.device, g.images)).collect();
    assert_eq!(shares, vec![(0, 6), (1, 2)]);

    collect_until_terminal(&mut rx, &outcome.task_id).await;

    let calls = h.worker.generate_calls();
    assert_eq!(calls.len(), 2);
    let by_device: HashMap<u32, &Vec<Value>> =
        calls.iter().map(|(d, _, args)| (*d, args)).collect();
    // Sub-task 0: 6 images from seed 100; sub-task 1: 2 images from seed 106.
    assert_eq!(by_device[&0][6], json!(6));
    assert_eq!(by_device[&0][8], json!(100));
    assert_eq!(by_device[&0][9], json!(false));
    assert_eq!(by_device[&1][6], json!(2));
    assert_eq!(by_device[&1][8], json!(106));
    assert_eq!(by_device[&1][9], json!(false));

    // Sub-ids derive from the parent id and assignment index.
    assert_eq!(calls[0].1, format!("{}_0", outcome.task_id));
    assert_eq!(calls[1].1, format!("{}_1", outcome.task_id));
}

#[tokio::test]
async fn partial_failure_finishes_with_surviving_results() {
    let h = harness(&[1, 1]);
    h.worker.script(0, vec![failed_report(0, "OOM")]);
    h.worker.script(
        1,
        vec![
            report(50, "Sampling"),
            finished_report(100, &["b1.png", "b2.png"]),
        ],
    );
    let (_id, mut rx) = h.bus.subscribe();

    let request =
        GenerationRequest::from_value(json!({ "prompt": "a cat", "image_number": 4 })).unwrap();
    let outcome = h.coordinator.submit(request).await.unwrap();
    let updates = collect_until_terminal(&mut rx, &outcome.task_id).await;

    let terminal = updates.last().unwrap();
    assert_eq!(terminal.status_text, "Finished (2/4 images)");
    assert_eq!(
        terminal.results,
        vec!["b1.png".to_string(), "b2.png".to_string()]
    );

    let snapshot = h.coordinator.store().snapshot(&outcome.task_id).unwrap();
    assert_eq!(snapshot.status, TaskStatus::Finished);
    assert!(snapshot.errors.iter().any(|e| e.contains("OOM")));
}

#[tokio::test]
async fn total_failure_ends_in_error_state() {
    let h = harness(&[1]);
    h.worker.script(0, vec![failed_report(0, "OOM")]);
    let (_id, mut rx) = h.bus.subscribe();

    let request = GenerationRequest::from_value(json!({ "prompt": "a cat" })).unwrap();
    let outcome = h.coordinator.submit(request).await.unwrap();
    collect_until_terminal(&mut rx, &outcome.task_id).await;

    let snapshot = h.coordinator.store().snapshot(&outcome.task_id).unwrap();
    assert_eq!(snapshot.status, TaskStatus::Error);
    assert!(snapshot.results.is_empty());
}

#[tokio::test]
async fn cancel_is_idempotent_and_sends_one_stop_per_worker() {
    let h = harness(&[1, 1]);
    // Both workers report mid-run progress and never finish on their own.
    h.worker.script(0, vec![report(40, "Sampling")]);
    h.worker.script(1, vec![report(40, "Sampling")]);
    let (_id, mut rx) = h.bus.subscribe();

    let request =
        GenerationRequest::from_value(json!({ "prompt": "a cat", "image_number": 4 })).unwrap();
    let outcome = h.coordinator.submit(request).await.unwrap();

    // Wait until polling has observed the 40% frame.
    loop {
        let update = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("timed out")
            .expect("bus closed");
        if update.task_id == outcome.task_id && update.percentage >= 40 {
            break;
        }
    }

    assert_eq!(h.coordinator.stop_all().await, 1);
    // A second global stop finds the stops already sent.
    h.coordinator.stop_all().await;

    let updates = collect_until_terminal(&mut rx, &outcome.task_id).await;
    let terminal = updates.last().unwrap();
    assert!(terminal.percentage <= 100);
    assert!(terminal.preview.is_none());

    let snapshot = h.coordinator.store().snapshot(&outcome.task_id).unwrap();
    assert_eq!(snapshot.status, TaskStatus::Canceled);

    let mut stops = h.worker.stop_calls();
    stops.sort_unstable();
    assert_eq!(stops, vec![0, 1]);
    assert!(h.scheduler.slots().iter().all(|slot| !slot.busy));
}

#[tokio::test]
async fn worker_exit_fails_its_sub_task_only() {
    let h = harness(&[1, 1]);
    h.worker.script(
        0,
        vec![report(30, "Sampling"), finished_report(100, &["a.png"])],
    );
    h.worker.script(1, vec![report(10, "Loading")]);
    let (_id, mut rx) = h.bus.subscribe();

    let request =
        GenerationRequest::from_value(json!({ "prompt": "a cat", "image_number": 4 })).unwrap();
    let outcome = h.coordinator.submit(request).await.unwrap();

    tokio::time::sleep(Duration::from_millis(30)).await;
    h.worker.kill(1);

    let updates = collect_until_terminal(&mut rx, &outcome.task_id).await;
    assert_eq!(updates.iter().filter(|u| u.finished).count(), 1);

    let snapshot = h.coordinator.store().snapshot(&outcome.task_id).unwrap();
    assert_eq!(snapshot.status, TaskStatus::Finished);
    assert_eq!(snapshot.results, vec!["a.png".to_string()]);
    assert!(snapshot.errors.iter().any(|e| e.contains("worker exited")));
    assert!(h.scheduler.slots().iter().all(|slot| !slot.busy));
}

#[tokio::test]
async fn generate_refusal_stops_accepted_siblings() {
    let h = harness(&[1, 1]);
    h.worker.script(0, vec![report(10, "Loading")]);
    h.worker.refuse(1);
    let (_id, mut rx) = h.bus.subscribe();

    let request =
        GenerationRequest::from_value(json!({ "prompt": "a cat", "image_number": 4 })).unwrap();
    let outcome = h.coordinator.submit(request).await.unwrap();
    collect_until_terminal(&mut rx, &outcome.task_id).await;

    // Device 0 had accepted before device 1 was refused; it got stopped.
    assert_eq!(h.worker.stop_calls(), vec![0]);
    let snapshot = h.coordinator.store().snapshot(&outcome.task_id).unwrap();
    assert!(snapshot.errors.iter().any(|e| e.contains("queue rejected")));
}

#[tokio::test]
async fn generate_refusal_halts_the_rest_of_the_fan_out() {
    let h = harness(&[1, 1, 1]);
    h.worker.script(0, vec![report(10, "Loading")]);
    h.worker.refuse(1);
    h.worker.script(2, vec![report(10, "Loading")]);
    let (_id, mut rx) = h.bus.subscribe();

    let request =
        GenerationRequest::from_value(json!({ "prompt": "a cat", "image_number": 3 })).unwrap();
    let outcome = h.coordinator.submit(request).await.unwrap();
    collect_until_terminal(&mut rx, &outcome.task_id).await;

    // The refusal on device 1 halts dispatch: device 2 never receives a
    // generate, and nothing that was dispatched is left running.
    let dispatched: Vec<u32> = h.worker.generate_calls().iter().map(|(d, _, _)| *d).collect();
    assert!(!dispatched.contains(&2), "dispatched: {:?}", dispatched);
    let stops = h.worker.stop_calls();
    for device in &dispatched {
        assert!(stops.contains(device), "device {} left running", device);
    }
    assert_eq!(stops, vec![0]);

    let snapshot = h.coordinator.store().snapshot(&outcome.task_id).unwrap();
    assert!(snapshot.errors.iter().any(|e| e.contains("queue rejected")));
    assert!(h.scheduler.slots().iter().all(|slot| !slot.busy));
}

#[tokio::test]
async fn cancel_during_dispatch_stops_late_acceptances() {
    let h = harness(&[1, 1]);
    h.worker.script(0, vec![report(10, "Loading")]);
    h.worker.script(1, vec![report(10, "Loading")]);
    // Device 1's acceptance is slow, leaving a window for a cancel to land
    // while dispatch is still in flight.
    h.worker.delay_generate(1, Duration::from_millis(100));
    let (_id, mut rx) = h.bus.subscribe();

    let request =
        GenerationRequest::from_value(json!({ "prompt": "a cat", "image_number": 4 })).unwrap();
    let outcome = h.coordinator.submit(request).await.unwrap();

    // Wait for device 0 to be dispatched, then cancel while device 1's
    // generate call is still pending.
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while h.worker.generate_calls().is_empty() {
        assert!(tokio::time::Instant::now() < deadline, "dispatch never started");
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
    h.coordinator.stop_all().await;

    collect_until_terminal(&mut rx, &outcome.task_id).await;
    let snapshot = h.coordinator.store().snapshot(&outcome.task_id).unwrap();
    assert_eq!(snapshot.status, TaskStatus::Canceled);

    // Every sub-task that was accepted, however late, received a stop.
    let dispatched: Vec<u32> = h.worker.generate_calls().iter().map(|(d, _, _)| *d).collect();
    let stops = h.worker.stop_calls();
    for device in &dispatched {
        assert!(stops.contains(device), "device {} left running", device);
    }
    assert!(h.scheduler.slots().iter().all(|slot| !slot.busy));
}

#[tokio::test]
async fn wrong_length_raw_vector_is_rejected_before_any_rpc() {
    let h = harness(&[1]);
    let request = GenerationRequest::from_value(json!({
        "prompt": "a cat",
        "fooocus_args": [1, 2, 3]
    }))
    .unwrap();

    let err = h.coordinator.submit(request).await.unwrap_err();
    assert!(matches!(err, OrchestratorError::Validation(_)));
    assert!(err.to_string().contains("expected 152"));
    assert!(h.worker.generate_calls().is_empty());
    assert!(h.scheduler.slots().iter().all(|slot| !slot.busy));
}

#[tokio::test]
async fn empty_slot_table_is_a_terminal_no_resource_error() {
    let h = harness(&[]);
    let (_id, mut rx) = h.bus.subscribe();

    let request = GenerationRequest::from_value(json!({ "prompt": "a cat" })).unwrap();
    let err = h.coordinator.submit(request).await.unwrap_err();
    assert!(matches!(err, OrchestratorError::NoResource(_)));

    let update = tokio::time::timeout(Duration::from_secs(1), rx.recv())
        .await
        .expect("timed out")
        .expect("bus closed");
    assert!(update.finished);
    assert!(h.worker.generate_calls().is_empty());
}

#[tokio::test]
async fn sub_task_time_cap_terminates_a_stuck_worker() {
    // Tight cap so the test observes the timeout path. The worker
    // acknowledges progress but never finishes; a stop resets its script to
    // a canceled frame, but the sub-task is already terminal by then.
    let h = harness_with_cap(&[1], Duration::from_millis(50));
    h.worker.script(0, vec![report(20, "Sampling")]);
    let (_id, mut rx) = h.bus.subscribe();

    let request = GenerationRequest::from_value(json!({ "prompt": "a cat" })).unwrap();
    let outcome = h.coordinator.submit(request).await.unwrap();
    let updates = collect_until_terminal(&mut rx, &outcome.task_id).await;
    assert_eq!(updates.iter().filter(|u| u.finished).count(), 1);

    let snapshot = h.coordinator.store().snapshot(&outcome.task_id).unwrap();
    assert_eq!(snapshot.status, TaskStatus::Error);
    assert!(snapshot.errors.iter().any(|e| e.contains("time cap")));
    assert_eq!(h.worker.stop_calls(), vec![0]);
}
