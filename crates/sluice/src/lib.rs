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

//! # Sluice
//!
//! Event-driven job dispatch against a bounded, autoscaling compute pool.
//!
//! Sluice reacts to object-storage creation events: it filters them
//! against a declared match pattern, converts matches into queued compute
//! jobs with bounded retry and timeout semantics, schedules them onto
//! capacity-bounded compute environments, and routes terminally failed
//! jobs to a dead-letter channel. Once an event has matched, it is never
//! silently lost: it ends in either a succeeded job or a dead-letter
//! entry holding the original event for operator replay.
//!
//! ## Control flow
//!
//! ```text
//! storage event
//!   └─> EventRouter (match pattern + field extraction)
//!         └─> DispatchRule (staleness gate, request build)
//!               └─> JobQueue (FIFO admission, priority placement,
//!                   timeout + flat retry on ComputeEnvironment capacity)
//!                     ├─> Succeeded
//!                     └─> Failed (terminal) ─> DeadLetterChannel
//! ```
//!
//! ## Components
//!
//! - [`compute::ComputeEnvironment`]: capacity pool bounded by min/max
//!   capacity units; scaling of the underlying hosts belongs to the
//!   external pool manager, advised by [`compute::scaling`].
//! - [`queue::JobQueue`]: ordered admission over one or more environments
//!   ranked by priority order.
//! - [`job::JobDefinition`]: immutable, construction-validated template
//!   for how a job runs.
//! - [`router::EventRouter`]: pure structural match and field extraction.
//! - [`rule::DispatchRule`]: event-to-submission conversion and the
//!   no-silent-loss guarantee.
//! - [`dead_letter::DeadLetterChannel`]: append-only sink for events
//!   whose dispatch permanently failed.
//!
//! Execution itself is external: implement [`job::JobRunner`] for the
//! backend that actually runs containers.

pub mod compute;
pub mod config;
pub mod dead_letter;
pub mod dispatcher;
pub mod error;
pub mod event;
pub mod job;
pub mod queue;
pub mod router;
pub mod rule;

pub use compute::{
    CapacityToken, ComputeEnvironment, InstanceShape, QueueDepthStrategy, ResourceRequest,
    ScalingContext, ScalingDecision, ScalingStrategy,
};
pub use config::{DispatcherConfig, EnvironmentProfile, StalePolicy};
pub use dead_letter::{DeadLetterChannel, InMemoryDeadLetterChannel};
pub use dispatcher::{Dispatcher, PipelineOutputs};
pub use error::{
    ConfigurationError, DispatchError, JobRunError, QueueError, SinkError,
};
pub use event::StorageEvent;
pub use job::{JobDefinition, JobRunner, JobStatus, LogSink, PreparedJob, RunHandle};
pub use queue::{JobQueue, JobSubmission};
pub use router::{EventRouter, Extractor, ExtractedFields, FieldPath, MatchPattern};
pub use rule::{DispatchOutcome, DispatchRequest, DispatchRule};
