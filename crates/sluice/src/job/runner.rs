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

//! Execution backend seam.
//!
//! The dispatcher treats job execution as an opaque, linearizable external
//! service reached over a network boundary. [`JobRunner`] is that seam:
//! the queue reserves capacity, renders the command, and calls `run` once
//! per attempt; the implementation talks to whatever actually executes
//! containers. Tests script it directly.

use std::collections::HashMap;

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::JobRunError;
use crate::job::definition::LogSink;

/// A fully resolved execution request for one attempt.
#[derive(Debug, Clone)]
pub struct PreparedJob {
    /// Run identifier, stable across retries of the same submission.
    pub run_id: Uuid,
    /// Job name assigned by the dispatch rule.
    pub job_name: String,
    /// Name of the originating job definition.
    pub definition_name: String,
    /// Container image reference.
    pub image: String,
    /// Command with all placeholders substituted.
    pub command: Vec<String>,
    /// The parameter bindings the command was rendered from.
    pub parameters: HashMap<String, String>,
    /// 1-based attempt number.
    pub attempt: u32,
    /// Where the attempt's output goes.
    pub log_sink: LogSink,
    /// Identity the attempt executes under.
    pub execution_identity: String,
}

/// External execution backend.
///
/// `run` performs exactly one execution attempt and classifies any failure
/// as transient (the queue may resubmit) or permanent (it must not). The
/// queue enforces the definition's timeout around this call, so
/// implementations need not time themselves out.
#[async_trait]
pub trait JobRunner: Send + Sync {
    async fn run(&self, job: &PreparedJob) -> Result<(), JobRunError>;
}
