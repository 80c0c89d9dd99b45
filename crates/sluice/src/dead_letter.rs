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

//! Dead-letter channel: durable sink for trigger events whose dispatch
//! permanently failed.
//!
//! The channel is owned externally — a separate durable queue the
//! dispatcher only writes to, never reads or purges. The payload is the
//! original triggering event, verbatim, so an operator can inspect or
//! replay it. A write failure breaks the pipeline's failure-capture
//! guarantee and must reach an external alerting path; it is never
//! swallowed here.

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::debug;

use crate::error::SinkError;
use crate::event::StorageEvent;

/// Append-only write access to the dead-letter queue.
#[async_trait]
pub trait DeadLetterChannel: Send + Sync {
    /// Appends the original event. FIFO-best-effort; no ordering guarantee
    /// relative to other writers.
    async fn send(&self, event: &StorageEvent) -> Result<(), SinkError>;
}

/// In-process dead-letter channel backed by an unbounded mpsc queue.
///
/// The receiver half is the operator side: tests and embedders without an
/// external durable queue consume entries from it.
pub struct InMemoryDeadLetterChannel {
    tx: mpsc::UnboundedSender<StorageEvent>,
}

impl InMemoryDeadLetterChannel {
    /// Creates the channel and returns its operator-side receiver.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<StorageEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

#[async_trait]
impl DeadLetterChannel for InMemoryDeadLetterChannel {
    async fn send(&self, event: &StorageEvent) -> Result<(), SinkError> {
        self.tx
            .send(event.clone())
            .map_err(|_| SinkError::Closed)?;
        debug!(event_id = %event.id, "Event dead-lettered");
        Ok(())
    }
}
