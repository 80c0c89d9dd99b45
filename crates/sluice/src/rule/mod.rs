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

//! Dispatch rule: binds an event router to a job queue and definition.
//!
//! On a matched event the rule builds a [`DispatchRequest`] — extracted
//! fields merged into the definition's parameter slots, a deterministic
//! job name, the definition's retry budget, the configured maximum event
//! age — and submits it. Once an event has matched, it is guaranteed to
//! end in exactly one of: a succeeded job, or a dead-letter entry holding
//! the original event. There is no third path.
//!
//! Stale events (older than the maximum age at submission time) are the
//! one policy-controlled exception: the default drops them without a
//! dead-letter entry, [`StalePolicy::DeadLetter`] forwards them instead.

use std::sync::Arc;

use chrono::{Duration, Utc};
use tracing::{debug, error, info, warn};

use crate::config::{DispatcherConfig, StalePolicy};
use crate::dead_letter::DeadLetterChannel;
use crate::error::{ConfigurationError, DispatchError};
use crate::event::StorageEvent;
use crate::job::{JobDefinition, JobStatus, RunHandle};
use crate::queue::{JobQueue, JobSubmission};
use crate::router::{EventRouter, ExtractedFields};

/// Ephemeral job-run request built from one matched event.
///
/// Never persisted: constructed on pattern match and consumed immediately
/// by the queue. On exhaustion of the retry budget it is the *original
/// triggering event*, not this request, that reaches the dead letter.
#[derive(Debug, Clone)]
pub struct DispatchRequest {
    /// Deterministic job name (rule name prefix plus fixed suffix).
    /// Collisions across concurrent events are acceptable; uniqueness is
    /// the run id's job.
    pub job_name: String,
    /// Resolved parameter bindings, e.g. storage location and object key.
    pub parameters: ExtractedFields,
    /// Retry budget, taken from the job definition.
    pub retry_attempts: u32,
    /// Maximum permissible age at submission time.
    pub max_event_age: Duration,
}

impl DispatchRequest {
    fn into_submission(self, definition: Arc<JobDefinition>) -> JobSubmission {
        JobSubmission {
            job_name: self.job_name,
            definition,
            parameters: self.parameters,
            retry_attempts: Some(self.retry_attempts),
        }
    }
}

/// How the rule disposed of one event.
#[derive(Debug)]
pub enum DispatchOutcome {
    /// The event did not satisfy the match pattern. Intentional filtering:
    /// dropped with no trace.
    NoMatch,
    /// The event exceeded the maximum age and the policy is to drop it.
    Stale,
    /// The original event was forwarded to the dead-letter channel —
    /// either immediately (submit failure, unextractable field, stale
    /// under [`StalePolicy::DeadLetter`]) or is guaranteed to be by the
    /// completion watcher.
    DeadLettered,
    /// The job was submitted; the returned handle observes the run. The
    /// rule keeps its own watcher, so dropping the handle cannot lose the
    /// failure-capture guarantee.
    Submitted { handle: RunHandle },
}

/// Binds an [`EventRouter`] match to a queue/definition pair.
pub struct DispatchRule {
    name: String,
    router: EventRouter,
    queue: Arc<JobQueue>,
    definition: Arc<JobDefinition>,
    dead_letter: Arc<dyn DeadLetterChannel>,
    job_name: String,
    max_event_age: Duration,
    stale_policy: StalePolicy,
}

impl DispatchRule {
    /// Creates a rule wiring router, queue, definition, and dead-letter
    /// channel together.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigurationError::MissingParameterBinding`] if the
    /// router's extractor does not bind every parameter the definition
    /// requires — caught here, at build time, never at dispatch time.
    pub fn new(
        name: impl Into<String>,
        router: EventRouter,
        queue: Arc<JobQueue>,
        definition: Arc<JobDefinition>,
        dead_letter: Arc<dyn DeadLetterChannel>,
        config: &DispatcherConfig,
    ) -> Result<Self, ConfigurationError> {
        let name = name.into();

        for parameter in definition.required_parameters() {
            if !router.binding_names().any(|binding| binding == parameter) {
                return Err(ConfigurationError::MissingParameterBinding {
                    definition: definition.name().to_string(),
                    parameter: parameter.clone(),
                });
            }
        }

        let job_name = format!("{}-job", name);
        Ok(Self {
            name,
            router,
            queue,
            definition,
            dead_letter,
            job_name,
            max_event_age: config.max_event_age(),
            stale_policy: config.stale_policy(),
        })
    }

    /// Overrides the deterministic job name (default `{rule name}-job`).
    pub fn with_job_name(mut self, job_name: impl Into<String>) -> Self {
        self.job_name = job_name.into();
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn queue(&self) -> &Arc<JobQueue> {
        &self.queue
    }

    pub fn definition(&self) -> &Arc<JobDefinition> {
        &self.definition
    }

    /// Routes one event through the pipeline.
    ///
    /// # Errors
    ///
    /// Only a dead-letter write failure is an error here — fatal to the
    /// failure-capture guarantee, propagated for the caller's alerting
    /// path. Every other condition resolves to a [`DispatchOutcome`].
    pub async fn dispatch(&self, event: StorageEvent) -> Result<DispatchOutcome, DispatchError> {
        let fields = match self.router.evaluate(&event) {
            Ok(Some(fields)) => fields,
            Ok(None) => {
                debug!(rule = %self.name, event_id = %event.id, "Event did not match pattern");
                return Ok(DispatchOutcome::NoMatch);
            }
            Err(e) => {
                // Matched but unextractable: the event must not vanish.
                warn!(
                    rule = %self.name,
                    event_id = %event.id,
                    error = %e,
                    "Matched event could not be extracted, dead-lettering"
                );
                self.dead_letter.send(&event).await?;
                return Ok(DispatchOutcome::DeadLettered);
            }
        };

        let age = event.age(Utc::now());
        if age > self.max_event_age {
            return match self.stale_policy {
                StalePolicy::Drop => {
                    debug!(
                        rule = %self.name,
                        event_id = %event.id,
                        age_seconds = age.num_seconds(),
                        "Stale event dropped"
                    );
                    Ok(DispatchOutcome::Stale)
                }
                StalePolicy::DeadLetter => {
                    warn!(
                        rule = %self.name,
                        event_id = %event.id,
                        age_seconds = age.num_seconds(),
                        "Stale event dead-lettered"
                    );
                    self.dead_letter.send(&event).await?;
                    Ok(DispatchOutcome::DeadLettered)
                }
            };
        }

        let request = DispatchRequest {
            job_name: self.job_name.clone(),
            parameters: fields,
            retry_attempts: self.definition.retry_attempts(),
            max_event_age: self.max_event_age,
        };

        let handle = match self
            .queue
            .submit(request.into_submission(self.definition.clone()))
        {
            Ok(handle) => handle,
            Err(e) => {
                warn!(
                    rule = %self.name,
                    event_id = %event.id,
                    error = %e,
                    "Submission failed, dead-lettering trigger event"
                );
                self.dead_letter.send(&event).await?;
                return Ok(DispatchOutcome::DeadLettered);
            }
        };

        info!(
            rule = %self.name,
            event_id = %event.id,
            run_id = %handle.run_id(),
            job_name = %handle.job_name(),
            "Event dispatched"
        );
        self.spawn_completion_watcher(handle.clone(), event);
        Ok(DispatchOutcome::Submitted { handle })
    }

    /// Subscribes to the run's terminal state: a terminal failure forwards
    /// the original trigger event to the dead-letter channel exactly once.
    fn spawn_completion_watcher(&self, mut handle: RunHandle, event: StorageEvent) {
        let rule = self.name.clone();
        let dead_letter = self.dead_letter.clone();
        tokio::spawn(async move {
            if let JobStatus::Failed {
                terminal: true,
                attempts,
                message,
            } = handle.wait().await
            {
                warn!(
                    rule = %rule,
                    event_id = %event.id,
                    run_id = %handle.run_id(),
                    attempts,
                    error = %message,
                    "Run failed terminally, forwarding trigger event to dead letter"
                );
                if let Err(e) = dead_letter.send(&event).await {
                    // No further fallback exists. The external alerting
                    // path watches for this.
                    error!(
                        rule = %rule,
                        event_id = %event.id,
                        error = %e,
                        "Dead-letter write failed, failure-capture guarantee broken"
                    );
                }
            }
        });
    }
}
