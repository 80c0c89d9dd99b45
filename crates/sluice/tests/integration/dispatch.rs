/*
 *  Copyright 2025-2026 Colliery Software
 *
 *  Licensed under the Apache License, Version 2.0 (the "License");
 *  you may not use this file except in compliance with the License.
 *  You may obtain a copy of the License at
 *
 *      http://www.apache.org/licenses/LICENSE-2.0
 *
 *  Unless required by applicable law or agreed to in writing, software
 *  distributed under the License is distributed on an "AS IS" BASIS,
 *  WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 *  See the License for the specific language governing permissions and
 *  limitations under the License.
 */

//! End-to-end dispatch: matched events reach the runner with extracted
//! parameters, non-matching events are dropped without a trace, and an
//! event that matches but cannot be dispatched lands in the dead letter.

use serde_json::json;

use sluice::{
    DispatchOutcome, DispatcherConfig, JobStatus, ResourceRequest, StorageEvent,
};

use crate::fixtures::{pipeline, pipeline_with, ScriptedRunner};

#[tokio::test]
async fn test_matched_event_runs_job_with_extracted_parameters() {
    let runner = ScriptedRunner::succeeding();
    let pipeline = pipeline(runner.clone(), DispatcherConfig::default());

    let event = StorageEvent::object_created("my-bucket", "data/input.csv");
    let outcome = pipeline.rule.dispatch(event).await.unwrap();

    let mut handle = match outcome {
        DispatchOutcome::Submitted { handle } => handle,
        other => panic!("expected Submitted, got {:?}", other),
    };
    assert_eq!(handle.job_name(), "it-object-created-job");
    assert_eq!(handle.wait().await, JobStatus::Succeeded { attempts: 1 });

    let jobs = runner.jobs_seen();
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0].parameters["bucketName"], "my-bucket");
    assert_eq!(jobs[0].parameters["objectKey"], "data/input.csv");
    assert_eq!(
        jobs[0].command,
        vec!["process", "my-bucket", "data/input.csv"]
    );
}

#[tokio::test]
async fn test_non_matching_event_is_dropped_silently() {
    let runner = ScriptedRunner::succeeding();
    let mut pipeline = pipeline(runner.clone(), DispatcherConfig::default());

    // Wrong bucket: pattern mismatch, not an error.
    let event = StorageEvent::object_created("other-bucket", "a.txt");
    let outcome = pipeline.rule.dispatch(event).await.unwrap();

    assert!(matches!(outcome, DispatchOutcome::NoMatch));
    assert_eq!(runner.attempts(), 0);
    assert!(pipeline.dead_letters.try_recv().is_err());
}

#[tokio::test]
async fn test_matched_event_missing_extraction_field_is_dead_lettered() {
    let runner = ScriptedRunner::succeeding();
    let mut pipeline = pipeline(runner.clone(), DispatcherConfig::default());

    // Matches the pattern but carries no object.key.
    let event = StorageEvent::new(
        "storage",
        "Object Created",
        json!({ "bucket": { "name": "my-bucket" } }),
    );
    let event_id = event.id;
    let outcome = pipeline.rule.dispatch(event).await.unwrap();

    assert!(matches!(outcome, DispatchOutcome::DeadLettered));
    assert_eq!(runner.attempts(), 0);
    let dead = pipeline.dead_letters.recv().await.unwrap();
    assert_eq!(dead.id, event_id);
}

#[tokio::test]
async fn test_submit_failure_dead_letters_the_verbatim_event() {
    let runner = ScriptedRunner::succeeding();
    // Definition asks for more vcpus than any instance shape offers, so
    // every submission is refused as unschedulable.
    let mut pipeline = pipeline_with(
        runner.clone(),
        DispatcherConfig::default(),
        5,
        ResourceRequest::new(64, 2048),
    );

    let event = StorageEvent::object_created("my-bucket", "a.txt");
    let expected = serde_json::to_value(&event).unwrap();
    let outcome = pipeline.rule.dispatch(event).await.unwrap();

    assert!(matches!(outcome, DispatchOutcome::DeadLettered));
    assert_eq!(runner.attempts(), 0);
    let dead = pipeline.dead_letters.recv().await.unwrap();
    assert_eq!(serde_json::to_value(&dead).unwrap(), expected);
}

#[tokio::test]
async fn test_dispatch_after_queue_shutdown_is_dead_lettered() {
    let runner = ScriptedRunner::succeeding();
    let mut pipeline = pipeline(runner, DispatcherConfig::default());
    pipeline.queue.shutdown();

    let event = StorageEvent::object_created("my-bucket", "a.txt");
    let outcome = pipeline.rule.dispatch(event).await.unwrap();

    assert!(matches!(outcome, DispatchOutcome::DeadLettered));
    assert!(pipeline.dead_letters.recv().await.is_some());
}

#[tokio::test]
async fn test_successful_run_leaves_dead_letter_empty() {
    let runner = ScriptedRunner::succeeding();
    let mut pipeline = pipeline(runner, DispatcherConfig::default());

    let event = StorageEvent::object_created("my-bucket", "a.txt");
    let outcome = pipeline.rule.dispatch(event).await.unwrap();
    let mut handle = match outcome {
        DispatchOutcome::Submitted { handle } => handle,
        other => panic!("expected Submitted, got {:?}", other),
    };
    assert!(matches!(handle.wait().await, JobStatus::Succeeded { .. }));

    // The completion watcher only forwards terminal failures.
    tokio::task::yield_now().await;
    assert!(pipeline.dead_letters.try_recv().is_err());
}

#[tokio::test]
async fn test_each_matched_event_yields_exactly_one_run() {
    let runner = ScriptedRunner::succeeding();
    let pipeline = pipeline(runner.clone(), DispatcherConfig::default());

    let mut handles = Vec::new();
    for i in 0..4 {
        let event = StorageEvent::object_created("my-bucket", &format!("obj-{}.txt", i));
        match pipeline.rule.dispatch(event).await.unwrap() {
            DispatchOutcome::Submitted { handle } => handles.push(handle),
            other => panic!("expected Submitted, got {:?}", other),
        }
    }
    for handle in &mut handles {
        assert!(matches!(handle.wait().await, JobStatus::Succeeded { .. }));
    }
    assert_eq!(runner.attempts(), 4);
}
