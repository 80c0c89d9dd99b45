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

//! Error types for the dispatch pipeline.
//!
//! The taxonomy distinguishes build-time configuration errors (which abort
//! component construction and never reach runtime) from runtime failures,
//! and within runtime failures separates transient conditions (recovered by
//! resubmission) from permanent ones (surfaced through the dead-letter
//! channel). A pattern miss and a stale-event drop are outcomes, not
//! errors — see [`crate::rule::DispatchOutcome`].

use thiserror::Error;

/// Build-time validation failure.
///
/// Raised while constructing a component (job definition, match pattern,
/// queue, rule). Construction aborts; nothing partially configured ever
/// reaches the runtime path.
#[derive(Debug, Error)]
pub enum ConfigurationError {
    #[error("Job definition '{definition}' timeout must be positive")]
    InvalidTimeout { definition: String },

    #[error(
        "Compute environment '{environment}' capacity bounds are inverted: \
         min {min} > max {max}"
    )]
    InvalidCapacityBounds {
        environment: String,
        min: u32,
        max: u32,
    },

    #[error("Compute environment '{environment}' must allow at least one instance shape")]
    NoInstanceShapes { environment: String },

    #[error(
        "Command placeholder '{placeholder}' in job definition '{definition}' \
         is not declared as a required parameter"
    )]
    UnboundPlaceholder {
        definition: String,
        placeholder: String,
    },

    #[error(
        "Required parameter '{parameter}' of job definition '{definition}' \
         has no binding supplied by the dispatch rule"
    )]
    MissingParameterBinding {
        definition: String,
        parameter: String,
    },

    #[error("Field path must not be empty")]
    EmptyFieldPath,

    #[error("Job queue '{queue}' must reference at least one compute environment")]
    NoComputeEnvironments { queue: String },

    #[error("Job queue '{queue}' has duplicate priority order {order}")]
    DuplicatePriorityOrder { queue: String, order: i32 },
}

/// Submission-time failure at the job queue boundary.
#[derive(Debug, Error)]
pub enum QueueError {
    /// No attached compute environment has an instance shape that can hold
    /// the requested resources. Permanent: the job could never be
    /// scheduled, so it is never retried.
    #[error(
        "No compute environment attached to queue '{queue}' can satisfy the \
         resource request of job '{job_name}'"
    )]
    NoCompatibleEnvironment { queue: String, job_name: String },

    /// The queue has been shut down and no longer admits submissions.
    #[error("Job queue '{queue}' is closed")]
    Closed { queue: String },
}

/// Failure reported by a [`crate::job::JobRunner`] for a single attempt.
///
/// The classification drives the retry decision: transient failures are
/// resubmitted while budget remains, permanent failures terminate the run
/// immediately.
#[derive(Debug, Error)]
pub enum JobRunError {
    #[error("Transient execution failure: {message}")]
    Transient { message: String },

    #[error("Permanent execution failure: {message}")]
    Permanent { message: String },
}

impl JobRunError {
    /// Shorthand for a transient failure.
    pub fn transient(message: impl Into<String>) -> Self {
        Self::Transient {
            message: message.into(),
        }
    }

    /// Shorthand for a permanent failure.
    pub fn permanent(message: impl Into<String>) -> Self {
        Self::Permanent {
            message: message.into(),
        }
    }

    /// Whether the queue may resubmit the job after this failure.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient { .. })
    }
}

/// Dead-letter channel write failure.
///
/// Fatal to the pipeline's failure-capture guarantee: there is no further
/// fallback, so callers must propagate this to an external alerting path
/// rather than swallowing it.
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("Dead-letter channel is closed")]
    Closed,
}

/// Failure while dispatching a matched event.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// The event matched the pattern but lacks a field named by an
    /// extraction path. The rule forwards the original event to the
    /// dead-letter channel; this error is surfaced for observability only.
    #[error("Matched event is missing extraction field '{path}'")]
    MissingField { path: String },

    #[error(transparent)]
    Queue(#[from] QueueError),

    #[error(transparent)]
    Sink(#[from] SinkError),
}
