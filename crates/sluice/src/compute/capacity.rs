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

//! Capacity token for compute environment reservations.
//!
//! `CapacityToken` wraps the semaphore permits that represent a running
//! job's capacity units on a compute environment. Holding the token keeps
//! the units reserved; dropping it returns them to the environment. The
//! wrapper decouples the queue from tokio's permit types and carries the
//! reservation metadata used in scheduling logs.

use tokio::sync::OwnedSemaphorePermit;
use tracing::debug;

/// A held reservation of capacity units on a compute environment.
///
/// Created by [`crate::compute::ComputeEnvironment::try_reserve`] or
/// [`crate::compute::ComputeEnvironment::reserve`]. The units are returned
/// to the environment when the token is dropped, at the end of the job's
/// final attempt. Retries reuse the same token, so a retrying job cannot
/// lose its placement to newer submissions.
pub struct CapacityToken {
    // Held for its Drop: releasing it returns the units.
    _permit: OwnedSemaphorePermit,
    environment: String,
    units: u32,
}

impl CapacityToken {
    pub(crate) fn new(permit: OwnedSemaphorePermit, environment: &str, units: u32) -> Self {
        Self {
            _permit: permit,
            environment: environment.to_string(),
            units,
        }
    }

    /// Name of the environment the units are reserved on.
    pub fn environment(&self) -> &str {
        &self.environment
    }

    /// Number of capacity units this token holds.
    pub fn units(&self) -> u32 {
        self.units
    }
}

impl Drop for CapacityToken {
    fn drop(&mut self) {
        // The permit itself releases on drop; this is just the trace.
        debug!(
            environment = %self.environment,
            units = self.units,
            "Capacity released"
        );
    }
}
