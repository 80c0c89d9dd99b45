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

//! Job queue: ordered admission and scheduling against compute capacity.
//!
//! The queue admits job-run requests over an unbounded channel and drains
//! them in a scheduler loop, strictly FIFO. Each job is placed on the
//! attached compute environment with the lowest priority-order value that
//! has free capacity; when none has, the scheduler waits FIFO-fair on the
//! lowest-order compatible environment. Placement reserves capacity units
//! for the duration of the run, including retries.
//!
//! Execution attempts run under the definition's timeout. Transient
//! failures and timeouts are resubmitted immediately — flat retry, no
//! backoff — until the retry budget is exhausted; permanent failures and
//! exhausted budgets transition the run to terminal `Failed`, observed by
//! the originating dispatch rule through its [`RunHandle`].

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::compute::{CapacityToken, ComputeEnvironment, ResourceRequest};
use crate::error::{ConfigurationError, JobRunError, QueueError};
use crate::job::handle::run_channel;
use crate::job::{JobDefinition, JobRunner, JobStatus, PreparedJob, RunHandle};

/// A job-run request admitted by [`JobQueue::submit`].
#[derive(Debug, Clone)]
pub struct JobSubmission {
    /// Name the run is submitted under.
    pub job_name: String,
    /// The immutable template describing how the job executes.
    pub definition: Arc<JobDefinition>,
    /// Parameter bindings substituted into the command template.
    pub parameters: HashMap<String, String>,
    /// Retry budget override; defaults to the definition's.
    pub retry_attempts: Option<u32>,
}

struct QueuedJob {
    run_id: Uuid,
    submission: JobSubmission,
    status: watch::Sender<JobStatus>,
}

/// Ordered admission point between job submissions and compute capacity.
///
/// Construct with [`JobQueue::new`]; the scheduler loop runs on the tokio
/// runtime until [`JobQueue::shutdown`] closes admission and the backlog
/// drains.
pub struct JobQueue {
    name: String,
    environments: Vec<(Arc<ComputeEnvironment>, i32)>,
    admission: Mutex<Option<mpsc::UnboundedSender<QueuedJob>>>,
    depth: Arc<AtomicUsize>,
}

impl JobQueue {
    /// Creates a queue over the given `(environment, priority order)`
    /// pairs and spawns its scheduler loop.
    ///
    /// Lower order values are preferred at placement time. Order values
    /// must be distinct so scheduling preference is total.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigurationError`] if no environment is attached or
    /// two environments share an order value.
    pub fn new(
        name: impl Into<String>,
        environments: Vec<(Arc<ComputeEnvironment>, i32)>,
        runner: Arc<dyn JobRunner>,
    ) -> Result<Arc<Self>, ConfigurationError> {
        let name = name.into();
        if environments.is_empty() {
            return Err(ConfigurationError::NoComputeEnvironments { queue: name });
        }

        let mut environments = environments;
        environments.sort_by_key(|(_, order)| *order);
        for pair in environments.windows(2) {
            if pair[0].1 == pair[1].1 {
                return Err(ConfigurationError::DuplicatePriorityOrder {
                    queue: name,
                    order: pair[0].1,
                });
            }
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let depth = Arc::new(AtomicUsize::new(0));

        tokio::spawn(run_scheduler(
            name.clone(),
            environments.clone(),
            runner,
            depth.clone(),
            rx,
        ));

        Ok(Arc::new(Self {
            name,
            environments,
            admission: Mutex::new(Some(tx)),
            depth,
        }))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Jobs admitted but not yet placed on compute capacity.
    ///
    /// Feeds the external pool manager's scale-out decisions via
    /// [`crate::compute::scaling`].
    pub fn depth(&self) -> usize {
        self.depth.load(Ordering::SeqCst)
    }

    /// Attached environments in priority order.
    pub fn environments(&self) -> impl Iterator<Item = &Arc<ComputeEnvironment>> {
        self.environments.iter().map(|(env, _)| env)
    }

    /// Admits a job-run request.
    ///
    /// Returns a [`RunHandle`] for observing the run. Submission is
    /// fire-and-forget: this never waits for capacity.
    ///
    /// # Errors
    ///
    /// [`QueueError::NoCompatibleEnvironment`] if no attached environment
    /// can host the definition's resource request — no instance shape
    /// holds it, or its capacity units exceed every environment's maximum.
    /// A permanent failure, since the job could never be scheduled.
    /// [`QueueError::Closed`] after shutdown.
    pub fn submit(&self, submission: JobSubmission) -> Result<RunHandle, QueueError> {
        let resources = submission.definition.resources();
        if !self
            .environments
            .iter()
            .any(|(env, _)| env.can_host(resources))
        {
            return Err(QueueError::NoCompatibleEnvironment {
                queue: self.name.clone(),
                job_name: submission.job_name,
            });
        }

        let admission = self.admission.lock();
        let tx = admission.as_ref().ok_or_else(|| QueueError::Closed {
            queue: self.name.clone(),
        })?;

        let (status, handle) = run_channel(submission.job_name.clone());
        info!(
            queue = %self.name,
            job_name = %submission.job_name,
            run_id = %handle.run_id(),
            "Job admitted"
        );

        self.depth.fetch_add(1, Ordering::SeqCst);
        tx.send(QueuedJob {
            run_id: handle.run_id(),
            submission,
            status,
        })
        .map_err(|_| {
            self.depth.fetch_sub(1, Ordering::SeqCst);
            QueueError::Closed {
                queue: self.name.clone(),
            }
        })?;

        Ok(handle)
    }

    /// Closes admission. Queued and running jobs complete normally.
    pub fn shutdown(&self) {
        if self.admission.lock().take().is_some() {
            info!(queue = %self.name, "Job queue closed for admission");
        }
    }
}

/// Scheduler loop: drains admissions FIFO, places each job on capacity,
/// and spawns its attempt loop.
async fn run_scheduler(
    queue_name: String,
    environments: Vec<(Arc<ComputeEnvironment>, i32)>,
    runner: Arc<dyn JobRunner>,
    depth: Arc<AtomicUsize>,
    mut rx: mpsc::UnboundedReceiver<QueuedJob>,
) {
    while let Some(job) = rx.recv().await {
        // Waiting for capacity, observable as Runnable.
        job.status.send(JobStatus::Runnable).ok();

        let units = job.submission.definition.resources().vcpus.max(1);
        let token = match place(&environments, job.submission.definition.resources(), units).await
        {
            Ok(token) => token,
            Err(e) => {
                error!(
                    queue = %queue_name,
                    job_name = %job.submission.job_name,
                    error = %e,
                    "Placement failed"
                );
                depth.fetch_sub(1, Ordering::SeqCst);
                job.status
                    .send(JobStatus::Failed {
                        attempts: 0,
                        terminal: true,
                        message: e.to_string(),
                    })
                    .ok();
                continue;
            }
        };

        depth.fetch_sub(1, Ordering::SeqCst);
        info!(
            queue = %queue_name,
            job_name = %job.submission.job_name,
            environment = %token.environment(),
            units = token.units(),
            "Job placed"
        );

        tokio::spawn(run_attempts(queue_name.clone(), runner.clone(), job, token));
    }
    debug!(queue = %queue_name, "Scheduler stopped");
}

/// Reserves capacity for one job: lowest priority-order environment with
/// free capacity wins; if all are full, waits FIFO-fair on the
/// lowest-order compatible environment.
async fn place(
    environments: &[(Arc<ComputeEnvironment>, i32)],
    resources: &ResourceRequest,
    units: u32,
) -> Result<CapacityToken, QueueError> {
    for (env, _) in environments {
        if env.can_host(resources) {
            if let Some(token) = env.try_reserve(units) {
                return Ok(token);
            }
        }
    }

    // submit() guarantees at least one hosting environment exists, and
    // can_host bounds units by its maximum, so this wait always resolves.
    let (env, _) = environments
        .iter()
        .find(|(env, _)| env.can_host(resources))
        .expect("submission admitted without a hosting environment");
    env.reserve(units).await
}

/// Attempt loop for one placed job. Holds the capacity token until the
/// run reaches a terminal state.
async fn run_attempts(
    queue_name: String,
    runner: Arc<dyn JobRunner>,
    job: QueuedJob,
    token: CapacityToken,
) {
    let QueuedJob {
        run_id,
        submission,
        status,
    } = job;
    let definition = submission.definition;
    let max_attempts = submission
        .retry_attempts
        .unwrap_or_else(|| definition.retry_attempts())
        + 1;

    let command = match definition.render_command(&submission.parameters) {
        Ok(command) => command,
        Err(e) => {
            // Unreachable for rule-validated pipelines, but submissions
            // can also be handcrafted.
            error!(
                queue = %queue_name,
                job_name = %submission.job_name,
                error = %e,
                "Command rendering failed"
            );
            status
                .send(JobStatus::Failed {
                    attempts: 0,
                    terminal: true,
                    message: e.to_string(),
                })
                .ok();
            return;
        }
    };

    let mut attempt: u32 = 1;
    let terminal = loop {
        status.send(JobStatus::Running { attempt }).ok();
        info!(
            queue = %queue_name,
            job_name = %submission.job_name,
            run_id = %run_id,
            attempt,
            max_attempts,
            "Job state change: Runnable -> Running"
        );

        let prepared = PreparedJob {
            run_id,
            job_name: submission.job_name.clone(),
            definition_name: definition.name().to_string(),
            image: definition.image().to_string(),
            command: command.clone(),
            parameters: submission.parameters.clone(),
            attempt,
            log_sink: definition.log_sink().clone(),
            execution_identity: definition.execution_identity().to_string(),
        };

        let outcome = match tokio::time::timeout(definition.timeout(), runner.run(&prepared)).await
        {
            Ok(result) => result,
            Err(_) => Err(JobRunError::transient(format!(
                "attempt exceeded timeout of {:?}",
                definition.timeout()
            ))),
        };

        match outcome {
            Ok(()) => {
                info!(
                    queue = %queue_name,
                    job_name = %submission.job_name,
                    run_id = %run_id,
                    attempts = attempt,
                    "Job state change: Running -> Succeeded"
                );
                break JobStatus::Succeeded { attempts: attempt };
            }
            Err(e) if e.is_retryable() && attempt < max_attempts => {
                warn!(
                    queue = %queue_name,
                    job_name = %submission.job_name,
                    run_id = %run_id,
                    attempt,
                    max_attempts,
                    error = %e,
                    "Job failed, resubmitting"
                );
                status
                    .send(JobStatus::Failed {
                        attempts: attempt,
                        terminal: false,
                        message: e.to_string(),
                    })
                    .ok();
                // Flat retry: immediate re-admission, no backoff.
                attempt += 1;
            }
            Err(e) => {
                error!(
                    queue = %queue_name,
                    job_name = %submission.job_name,
                    run_id = %run_id,
                    attempts = attempt,
                    error = %e,
                    "Job state change: Running -> Failed (terminal)"
                );
                break JobStatus::Failed {
                    attempts: attempt,
                    terminal: true,
                    message: e.to_string(),
                };
            }
        }
    };

    // Release capacity before observers see the terminal state.
    drop(token);
    status.send(terminal).ok();
}
