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

//! Top of the construction graph.
//!
//! Components are built dependency-first as plain owned values — compute
//! environment, then queue, then job definition, then the dispatch rule —
//! with no hidden global registry. The [`Dispatcher`] owns the finished
//! rule and feeds it events, either one at a time or from a channel.
//!
//! ```rust,ignore
//! let env = Arc::new(ComputeEnvironment::builder(profile.resource_name("compute-env"))
//!     .instance_shape(InstanceShape::new(4, 16384))
//!     .build()?);
//! let queue = JobQueue::new(profile.resource_name("job-queue"), vec![(env, 1)], runner)?;
//! let definition = Arc::new(JobDefinition::builder(profile.resource_name("job-def"), image)
//!     .command(["process", "Ref::bucketName", "Ref::objectKey"])
//!     .required_parameter("bucketName")
//!     .required_parameter("objectKey")
//!     .build()?);
//! let rule = DispatchRule::new("object-created", router, queue, definition, sink, &config)?;
//! let dispatcher = Dispatcher::new(rule);
//! ```

use tokio::sync::mpsc;
use tracing::{error, info};

use crate::error::DispatchError;
use crate::event::StorageEvent;
use crate::rule::{DispatchOutcome, DispatchRule};

/// Identities surfaced for operator and monitoring use.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineOutputs {
    pub job_queue_name: String,
    pub job_definition_name: String,
}

/// Owns the dispatch rule and drives events through it.
pub struct Dispatcher {
    rule: DispatchRule,
}

impl Dispatcher {
    pub fn new(rule: DispatchRule) -> Self {
        Self { rule }
    }

    /// The resource identities this pipeline exposes.
    pub fn outputs(&self) -> PipelineOutputs {
        PipelineOutputs {
            job_queue_name: self.rule.queue().name().to_string(),
            job_definition_name: self.rule.definition().name().to_string(),
        }
    }

    /// Dispatches a single event.
    pub async fn dispatch(&self, event: StorageEvent) -> Result<DispatchOutcome, DispatchError> {
        self.rule.dispatch(event).await
    }

    /// Consumes storage-creation notifications from a channel until it
    /// closes. Each event is routed independently; a dead-letter write
    /// failure is logged and does not stop the loop.
    pub async fn run(&self, mut events: mpsc::UnboundedReceiver<StorageEvent>) {
        info!(rule = %self.rule.name(), "Dispatcher started");
        while let Some(event) = events.recv().await {
            let event_id = event.id;
            if let Err(e) = self.rule.dispatch(event).await {
                error!(
                    rule = %self.rule.name(),
                    event_id = %event_id,
                    error = %e,
                    "Dispatch failed"
                );
            }
        }
        info!(rule = %self.rule.name(), "Dispatcher stopped");
    }

    /// Closes the underlying queue for admission.
    pub fn shutdown(&self) {
        self.rule.queue().shutdown();
    }
}
