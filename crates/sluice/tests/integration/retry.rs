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

//! Retry semantics: a retry budget of N allows N + 1 attempts; exhausting
//! it forwards the original trigger event to the dead letter exactly once;
//! permanent errors short-circuit the budget.

use sluice::{DispatchOutcome, DispatcherConfig, JobStatus, ResourceRequest, StorageEvent};

use crate::fixtures::{pipeline, pipeline_with, ScriptedRunner};

#[tokio::test]
async fn test_transient_failure_is_retried_to_success() {
    let runner = ScriptedRunner::failing_transiently(2);
    let pipeline = pipeline(runner.clone(), DispatcherConfig::default());

    let event = StorageEvent::object_created("my-bucket", "a.txt");
    let mut handle = match pipeline.rule.dispatch(event).await.unwrap() {
        DispatchOutcome::Submitted { handle } => handle,
        other => panic!("expected Submitted, got {:?}", other),
    };

    assert_eq!(handle.wait().await, JobStatus::Succeeded { attempts: 3 });
    assert_eq!(runner.attempts(), 3);
}

#[tokio::test]
async fn test_exhausted_retry_budget_dead_letters_once() {
    // Budget of 5 retries: six attempts total, then terminal failure.
    let runner = ScriptedRunner::failing_transiently(6);
    let mut pipeline = pipeline(runner.clone(), DispatcherConfig::default());

    let event = StorageEvent::object_created("my-bucket", "a.txt");
    let event_id = event.id;
    let mut handle = match pipeline.rule.dispatch(event).await.unwrap() {
        DispatchOutcome::Submitted { handle } => handle,
        other => panic!("expected Submitted, got {:?}", other),
    };

    match handle.wait().await {
        JobStatus::Failed {
            attempts,
            terminal: true,
            ..
        } => assert_eq!(attempts, 6),
        other => panic!("expected terminal failure, got {:?}", other),
    }
    assert_eq!(runner.attempts(), 6);

    // Exactly one dead-letter entry, holding the original event.
    let dead = pipeline.dead_letters.recv().await.unwrap();
    assert_eq!(dead.id, event_id);
    tokio::task::yield_now().await;
    assert!(pipeline.dead_letters.try_recv().is_err());
}

#[tokio::test]
async fn test_permanent_failure_is_not_retried() {
    let runner = ScriptedRunner::failing_permanently("bad input object");
    let mut pipeline = pipeline(runner.clone(), DispatcherConfig::default());

    let event = StorageEvent::object_created("my-bucket", "a.txt");
    let mut handle = match pipeline.rule.dispatch(event).await.unwrap() {
        DispatchOutcome::Submitted { handle } => handle,
        other => panic!("expected Submitted, got {:?}", other),
    };

    match handle.wait().await {
        JobStatus::Failed {
            attempts,
            terminal: true,
            message,
        } => {
            assert_eq!(attempts, 1);
            assert!(message.contains("bad input object"));
        }
        other => panic!("expected terminal failure, got {:?}", other),
    }
    assert_eq!(runner.attempts(), 1);
    assert!(pipeline.dead_letters.recv().await.is_some());
}

#[tokio::test]
async fn test_zero_retry_budget_allows_a_single_attempt() {
    let runner = ScriptedRunner::failing_transiently(1);
    let mut pipeline = pipeline_with(
        runner.clone(),
        DispatcherConfig::default(),
        0,
        ResourceRequest::new(1, 2048),
    );

    let event = StorageEvent::object_created("my-bucket", "a.txt");
    let mut handle = match pipeline.rule.dispatch(event).await.unwrap() {
        DispatchOutcome::Submitted { handle } => handle,
        other => panic!("expected Submitted, got {:?}", other),
    };

    match handle.wait().await {
        JobStatus::Failed {
            attempts,
            terminal: true,
            ..
        } => assert_eq!(attempts, 1),
        other => panic!("expected terminal failure, got {:?}", other),
    }
    assert_eq!(runner.attempts(), 1);
    assert!(pipeline.dead_letters.recv().await.is_some());
}

#[tokio::test]
async fn test_attempt_numbers_are_sequential_and_run_id_stable() {
    let runner = ScriptedRunner::failing_transiently(2);
    let pipeline = pipeline(runner.clone(), DispatcherConfig::default());

    let event = StorageEvent::object_created("my-bucket", "a.txt");
    let mut handle = match pipeline.rule.dispatch(event).await.unwrap() {
        DispatchOutcome::Submitted { handle } => handle,
        other => panic!("expected Submitted, got {:?}", other),
    };
    handle.wait().await;

    let jobs = runner.jobs_seen();
    let attempts: Vec<u32> = jobs.iter().map(|job| job.attempt).collect();
    assert_eq!(attempts, vec![1, 2, 3]);
    assert!(jobs.iter().all(|job| job.run_id == jobs[0].run_id));
}
