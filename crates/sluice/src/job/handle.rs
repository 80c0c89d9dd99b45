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

//! Run handle and job state machine.
//!
//! A [`RunHandle`] is returned by [`crate::queue::JobQueue::submit`] and
//! observes the run's state through a watch channel: asynchronous
//! notification, never polling, so waiting on one run cannot block
//! unrelated runs.
//!
//! States: `Submitted → Runnable → Running → Succeeded | Failed`.
//! A retryable failure transitions back to `Running` for the next attempt;
//! `Succeeded` and terminal `Failed` are final.

use tokio::sync::watch;
use uuid::Uuid;

/// Observable state of a job run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobStatus {
    /// Admitted by the queue, not yet considered for placement.
    Submitted,
    /// Waiting for compute capacity.
    Runnable,
    /// Executing on reserved capacity.
    Running { attempt: u32 },
    /// Terminal success.
    Succeeded { attempts: u32 },
    /// Execution failure. Non-terminal failures are retried by the queue
    /// and observers only see them as a return to `Running`; a terminal
    /// failure means the retry budget is exhausted or the error was
    /// permanent.
    Failed {
        attempts: u32,
        terminal: bool,
        message: String,
    },
}

impl JobStatus {
    /// Whether this state is final.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Succeeded { .. } | JobStatus::Failed { terminal: true, .. }
        )
    }

    /// Number of attempts consumed so far, if known.
    pub fn attempts(&self) -> Option<u32> {
        match self {
            JobStatus::Running { attempt } => Some(*attempt),
            JobStatus::Succeeded { attempts } | JobStatus::Failed { attempts, .. } => {
                Some(*attempts)
            }
            _ => None,
        }
    }
}

/// Handle to a submitted job run.
///
/// Cheap to clone; every clone observes the same run.
#[derive(Debug, Clone)]
pub struct RunHandle {
    run_id: Uuid,
    job_name: String,
    status: watch::Receiver<JobStatus>,
}

impl RunHandle {
    pub(crate) fn new(job_name: String, status: watch::Receiver<JobStatus>) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            job_name,
            status,
        }
    }

    /// Unique identifier of this run.
    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// Job name the run was submitted under. Not unique across runs — the
    /// run id is.
    pub fn job_name(&self) -> &str {
        &self.job_name
    }

    /// Current state of the run.
    pub fn status(&self) -> JobStatus {
        self.status.borrow().clone()
    }

    /// Waits for the run to reach a terminal state and returns it.
    ///
    /// If the queue is torn down mid-run the last observed state is
    /// returned as-is.
    pub async fn wait(&mut self) -> JobStatus {
        let current = self.status.borrow().clone();
        if current.is_terminal() {
            return current;
        }
        // Clone inside map so the watch ref ends before the fallback
        // borrow below.
        let waited = self
            .status
            .wait_for(JobStatus::is_terminal)
            .await
            .map(|status| status.clone());
        match waited {
            Ok(status) => status,
            Err(_) => self.status.borrow().clone(),
        }
    }
}

/// Creates a connected status channel and handle for a new run.
pub(crate) fn run_channel(job_name: String) -> (watch::Sender<JobStatus>, RunHandle) {
    let (tx, rx) = watch::channel(JobStatus::Submitted);
    (tx, RunHandle::new(job_name, rx))
}
