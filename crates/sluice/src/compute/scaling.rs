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

//! Advisory scaling decisions for the external pool manager.
//!
//! The dispatcher never provisions or terminates capacity itself — the
//! pool manager is an external capacity oracle. These types let an
//! embedder translate queue depth into scale-out/scale-in signals while
//! the decision logic stays testable in isolation. Decisions are always
//! clamped to the environment's configured bounds.

use serde::{Deserialize, Serialize};

/// Decision produced by a scaling strategy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScalingDecision {
    /// Capacity is appropriate for current demand.
    Hold,
    /// Request additional capacity units from the pool manager.
    ScaleOut { units: u32, reason: String },
    /// Release idle capacity units back to the pool manager.
    ScaleIn { units: u32, reason: String },
}

/// Snapshot of queue and environment state a decision is made from.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ScalingContext {
    /// Jobs admitted but not yet placed on capacity.
    pub pending_jobs: u32,
    /// Capacity units reserved by running jobs.
    pub running_units: u32,
    /// Capacity units the pool currently has provisioned.
    pub provisioned_units: u32,
    /// Lower capacity bound of the environment.
    pub min_units: u32,
    /// Upper capacity bound of the environment.
    pub max_units: u32,
}

/// A pluggable scaling strategy.
pub trait ScalingStrategy: Send + Sync {
    /// Name of the strategy, for logging.
    fn name(&self) -> &str;

    /// Evaluates the context and returns a decision.
    fn evaluate(&self, context: &ScalingContext) -> ScalingDecision;
}

/// Queue-depth driven strategy: target capacity is running units plus the
/// units pending jobs would need, clamped to `[min, max]`.
#[derive(Debug, Clone)]
pub struct QueueDepthStrategy {
    /// Capacity units assumed per pending job.
    units_per_job: u32,
}

impl QueueDepthStrategy {
    pub fn new(units_per_job: u32) -> Self {
        Self { units_per_job }
    }
}

impl Default for QueueDepthStrategy {
    fn default() -> Self {
        Self::new(1)
    }
}

impl ScalingStrategy for QueueDepthStrategy {
    fn name(&self) -> &str {
        "queue-depth"
    }

    fn evaluate(&self, context: &ScalingContext) -> ScalingDecision {
        let demand = context.running_units + context.pending_jobs * self.units_per_job;
        let target = demand.clamp(context.min_units, context.max_units);

        if target > context.provisioned_units {
            ScalingDecision::ScaleOut {
                units: target - context.provisioned_units,
                reason: format!(
                    "{} pending jobs, {} units running",
                    context.pending_jobs, context.running_units
                ),
            }
        } else if target < context.provisioned_units {
            ScalingDecision::ScaleIn {
                units: context.provisioned_units - target,
                reason: format!("demand {} below provisioned capacity", demand),
            }
        } else {
            ScalingDecision::Hold
        }
    }
}
