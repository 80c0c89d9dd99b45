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

//! Scheduling against compute capacity: priority-order placement, the
//! hard capacity ceiling under burst load, and attempt timeouts.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Semaphore;

use sluice::{
    ComputeEnvironment, InstanceShape, JobDefinition, JobQueue, JobRunError, JobRunner, JobStatus,
    JobSubmission, PreparedJob, ResourceRequest,
};

use crate::fixtures::{init_tracing, ScriptedRunner};

/// Runner that parks every attempt until released, tracking the peak
/// number of simultaneously running attempts.
struct GateRunner {
    release: Semaphore,
    running: AtomicU32,
    peak: AtomicU32,
}

impl GateRunner {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            release: Semaphore::new(0),
            running: AtomicU32::new(0),
            peak: AtomicU32::new(0),
        })
    }

    fn running(&self) -> u32 {
        self.running.load(Ordering::SeqCst)
    }

    fn peak(&self) -> u32 {
        self.peak.load(Ordering::SeqCst)
    }

    /// Releases one parked attempt. Releases accumulate, so calling ahead
    /// of the attempt is safe.
    fn release_one(&self) {
        self.release.add_permits(1);
    }

    /// Polls until at least `n` attempts are running simultaneously.
    async fn wait_until_running(&self, n: u32) {
        while self.running() < n {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }
}

#[async_trait]
impl JobRunner for GateRunner {
    async fn run(&self, _job: &PreparedJob) -> Result<(), JobRunError> {
        let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        self.release
            .acquire()
            .await
            .map_err(|e| JobRunError::permanent(e.to_string()))?
            .forget();
        self.running.fetch_sub(1, Ordering::SeqCst);
        Ok(())
    }
}

fn env(name: &str, max_units: u32) -> Arc<ComputeEnvironment> {
    init_tracing();
    Arc::new(
        ComputeEnvironment::builder(name)
            .max_capacity_units(max_units)
            .instance_shape(InstanceShape::new(4, 16384))
            .build()
            .unwrap(),
    )
}

fn definition(vcpus: u32) -> Arc<JobDefinition> {
    Arc::new(
        JobDefinition::builder("sched-def", "img")
            .resources(ResourceRequest::new(vcpus, 1024))
            .build()
            .unwrap(),
    )
}

fn submission(job_name: &str, vcpus: u32) -> JobSubmission {
    JobSubmission {
        job_name: job_name.into(),
        definition: definition(vcpus),
        parameters: HashMap::new(),
        retry_attempts: None,
    }
}

#[tokio::test]
async fn test_lowest_priority_order_environment_is_preferred() {
    let first = env("env-first", 8);
    let second = env("env-second", 8);
    let runner = GateRunner::new();
    let queue = JobQueue::new(
        "prio-queue",
        vec![(second.clone(), 2), (first.clone(), 1)],
        runner.clone(),
    )
    .unwrap();

    let mut handle = queue.submit(submission("prefers-first", 1)).unwrap();
    runner.wait_until_running(1).await;

    // Both environments have room; the order-1 environment wins.
    assert_eq!(first.in_use_units(), 1);
    assert_eq!(second.in_use_units(), 0);

    runner.release_one();
    assert!(matches!(handle.wait().await, JobStatus::Succeeded { .. }));
}

#[tokio::test]
async fn test_full_preferred_environment_spills_to_next_order() {
    let first = env("env-first", 1);
    let second = env("env-second", 8);
    let runner = GateRunner::new();
    let queue = JobQueue::new(
        "spill-queue",
        vec![(first.clone(), 1), (second.clone(), 2)],
        runner.clone(),
    )
    .unwrap();

    let mut blocker = queue.submit(submission("blocker", 1)).unwrap();
    runner.wait_until_running(1).await;
    assert_eq!(first.in_use_units(), 1);

    let mut spilled = queue.submit(submission("spilled", 1)).unwrap();
    runner.wait_until_running(2).await;
    assert_eq!(second.in_use_units(), 1);

    runner.release_one();
    runner.release_one();
    assert!(matches!(blocker.wait().await, JobStatus::Succeeded { .. }));
    assert!(matches!(spilled.wait().await, JobStatus::Succeeded { .. }));
}

#[tokio::test]
async fn test_burst_never_exceeds_capacity_ceiling() {
    let environment = env("env-small", 2);
    let runner = GateRunner::new();
    let queue = JobQueue::new(
        "burst-queue",
        vec![(environment.clone(), 1)],
        runner.clone(),
    )
    .unwrap();

    let mut handles = Vec::new();
    for i in 0..6 {
        handles.push(
            queue
                .submit(submission(&format!("burst-{}", i), 1))
                .unwrap(),
        );
    }

    // Drain the burst one release at a time; concurrency must never pass
    // the 2-unit ceiling.
    runner.wait_until_running(2).await;
    for _ in 0..6 {
        assert!(runner.running() <= 2);
        assert!(environment.in_use_units() <= 2);
        runner.release_one();
        tokio::task::yield_now().await;
    }

    for handle in &mut handles {
        assert!(matches!(handle.wait().await, JobStatus::Succeeded { .. }));
    }
    assert!(runner.peak() <= 2);
    assert_eq!(environment.in_use_units(), 0);
}

#[tokio::test]
async fn test_multi_unit_job_reserves_its_vcpu_count() {
    let environment = env("env-wide", 8);
    let runner = GateRunner::new();
    let queue =
        JobQueue::new("wide-queue", vec![(environment.clone(), 1)], runner.clone()).unwrap();

    let mut handle = queue.submit(submission("wide", 4)).unwrap();
    runner.wait_until_running(1).await;

    assert_eq!(environment.in_use_units(), 4);
    assert_eq!(environment.available_units(), 4);

    runner.release_one();
    assert!(matches!(handle.wait().await, JobStatus::Succeeded { .. }));
    assert_eq!(environment.in_use_units(), 0);
}

#[tokio::test]
async fn test_attempt_timeout_is_retried_as_transient() {
    // Every attempt sleeps past the definition timeout, so the run burns
    // its whole budget on timeouts and fails terminally.
    let runner =
        Arc::new(ScriptedRunner::with_script(Vec::new()).with_delay(Duration::from_millis(250)));
    let environment = env("env-timeout", 4);
    let queue = JobQueue::new("timeout-queue", vec![(environment, 1)], runner.clone()).unwrap();

    let slow_definition = Arc::new(
        JobDefinition::builder("slow-def", "img")
            .timeout(Duration::from_millis(50))
            .retry_attempts(1)
            .resources(ResourceRequest::new(1, 1024))
            .build()
            .unwrap(),
    );
    let mut handle = queue
        .submit(JobSubmission {
            job_name: "slow".into(),
            definition: slow_definition,
            parameters: HashMap::new(),
            retry_attempts: None,
        })
        .unwrap();

    match handle.wait().await {
        JobStatus::Failed {
            attempts,
            terminal: true,
            message,
        } => {
            assert_eq!(attempts, 2);
            assert!(message.contains("timeout"));
        }
        other => panic!("expected terminal failure, got {:?}", other),
    }
    assert_eq!(runner.attempts(), 2);
}
