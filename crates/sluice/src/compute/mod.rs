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

//! Compute environment: a pool of execution capacity bounded by minimum
//! and maximum capacity units.
//!
//! The environment does not run anything itself — execution is delegated
//! to the external [`crate::job::JobRunner`] backend — it accounts for
//! capacity. One capacity unit corresponds to one vCPU, so a running job
//! reserves as many units as its resource request's vCPU count. A
//! semaphore sized to the maximum enforces the capacity bound: concurrent
//! reservations can never exceed it, even when queue depth does.
//!
//! Scaling the underlying pool between the minimum and maximum is the
//! external pool manager's job; [`scaling`] produces the advisory
//! decisions it consumes.

pub mod capacity;
pub mod scaling;

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tracing::debug;

use crate::error::{ConfigurationError, QueueError};

pub use capacity::CapacityToken;
pub use scaling::{QueueDepthStrategy, ScalingContext, ScalingDecision, ScalingStrategy};

/// Default minimum capacity units for a new environment.
pub const DEFAULT_MIN_CAPACITY_UNITS: u32 = 0;

/// Default maximum capacity units for a new environment.
pub const DEFAULT_MAX_CAPACITY_UNITS: u32 = 32;

/// An instance shape the environment may provision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceShape {
    pub vcpus: u32,
    pub memory_mib: u64,
}

impl InstanceShape {
    pub fn new(vcpus: u32, memory_mib: u64) -> Self {
        Self { vcpus, memory_mib }
    }

    /// Whether a job with this resource request fits on one instance of
    /// this shape.
    pub fn accommodates(&self, request: &ResourceRequest) -> bool {
        request.vcpus <= self.vcpus && request.memory_mib <= self.memory_mib
    }
}

/// CPU and memory requested by a job definition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceRequest {
    pub vcpus: u32,
    pub memory_mib: u64,
}

impl ResourceRequest {
    pub fn new(vcpus: u32, memory_mib: u64) -> Self {
        Self { vcpus, memory_mib }
    }
}

/// A bounded pool of compute capacity.
///
/// Created once at system provisioning and never destroyed during normal
/// operation. Mutation of the underlying pool size is owned by the
/// external autoscaler; this type only accounts for reservations against
/// the configured maximum.
pub struct ComputeEnvironment {
    name: String,
    min_capacity_units: u32,
    max_capacity_units: u32,
    shapes: Vec<InstanceShape>,
    network_placement: Option<String>,
    security_boundary: Option<String>,
    capacity: Arc<Semaphore>,
}

impl ComputeEnvironment {
    /// Creates a builder for an environment with the given name.
    pub fn builder(name: impl Into<String>) -> ComputeEnvironmentBuilder {
        ComputeEnvironmentBuilder {
            name: name.into(),
            min_capacity_units: DEFAULT_MIN_CAPACITY_UNITS,
            max_capacity_units: DEFAULT_MAX_CAPACITY_UNITS,
            shapes: Vec::new(),
            network_placement: None,
            security_boundary: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn min_capacity_units(&self) -> u32 {
        self.min_capacity_units
    }

    pub fn max_capacity_units(&self) -> u32 {
        self.max_capacity_units
    }

    pub fn network_placement(&self) -> Option<&str> {
        self.network_placement.as_deref()
    }

    pub fn security_boundary(&self) -> Option<&str> {
        self.security_boundary.as_deref()
    }

    /// Capacity units not currently reserved.
    pub fn available_units(&self) -> u32 {
        self.capacity.available_permits() as u32
    }

    /// Capacity units reserved by running jobs.
    pub fn in_use_units(&self) -> u32 {
        self.max_capacity_units - self.available_units()
    }

    /// Whether any allowed instance shape can hold the request.
    ///
    /// A request that fits no shape can never be scheduled here: the queue
    /// surfaces that as a permanent failure rather than retrying forever.
    pub fn has_compatible_shape(&self, request: &ResourceRequest) -> bool {
        self.shapes.iter().any(|shape| shape.accommodates(request))
    }

    /// Whether this environment can ever host the request: an allowed
    /// shape accommodates it and its capacity units fit under the
    /// environment's maximum.
    ///
    /// A shape-compatible request whose unit count exceeds the maximum
    /// would wait forever for permits that can never exist, so it is as
    /// unschedulable as a shape mismatch.
    pub fn can_host(&self, request: &ResourceRequest) -> bool {
        self.has_compatible_shape(request)
            && request.vcpus.max(1) <= self.max_capacity_units
    }

    /// Attempts to reserve `units` capacity units without waiting.
    pub fn try_reserve(&self, units: u32) -> Option<CapacityToken> {
        match self.capacity.clone().try_acquire_many_owned(units) {
            Ok(permit) => {
                debug!(environment = %self.name, units, "Capacity reserved");
                Some(CapacityToken::new(permit, &self.name, units))
            }
            Err(_) => None,
        }
    }

    /// Reserves `units` capacity units, waiting until they free up.
    ///
    /// Waiters are served in FIFO order, which gives the queue its
    /// tie-breaking by submission order.
    pub async fn reserve(&self, units: u32) -> Result<CapacityToken, QueueError> {
        let permit = self
            .capacity
            .clone()
            .acquire_many_owned(units)
            .await
            .map_err(|_| QueueError::Closed {
                queue: self.name.clone(),
            })?;
        debug!(environment = %self.name, units, "Capacity reserved after wait");
        Ok(CapacityToken::new(permit, &self.name, units))
    }

    /// Snapshot of this environment for a scaling decision.
    pub fn scaling_context(&self, pending_jobs: u32) -> ScalingContext {
        ScalingContext {
            pending_jobs,
            running_units: self.in_use_units(),
            provisioned_units: self.in_use_units(),
            min_units: self.min_capacity_units,
            max_units: self.max_capacity_units,
        }
    }
}

impl std::fmt::Debug for ComputeEnvironment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComputeEnvironment")
            .field("name", &self.name)
            .field("min_capacity_units", &self.min_capacity_units)
            .field("max_capacity_units", &self.max_capacity_units)
            .field("available_units", &self.available_units())
            .finish()
    }
}

/// Builder for [`ComputeEnvironment`].
pub struct ComputeEnvironmentBuilder {
    name: String,
    min_capacity_units: u32,
    max_capacity_units: u32,
    shapes: Vec<InstanceShape>,
    network_placement: Option<String>,
    security_boundary: Option<String>,
}

impl ComputeEnvironmentBuilder {
    /// Minimum capacity units the pool keeps warm (default 0).
    pub fn min_capacity_units(mut self, units: u32) -> Self {
        self.min_capacity_units = units;
        self
    }

    /// Maximum capacity units the pool may reach (default 32).
    pub fn max_capacity_units(mut self, units: u32) -> Self {
        self.max_capacity_units = units;
        self
    }

    /// Adds an allowed instance shape.
    pub fn instance_shape(mut self, shape: InstanceShape) -> Self {
        self.shapes.push(shape);
        self
    }

    /// Reference to the network placement (subnet group) for the pool.
    pub fn network_placement(mut self, placement: impl Into<String>) -> Self {
        self.network_placement = Some(placement.into());
        self
    }

    /// Reference to the security boundary for the pool.
    pub fn security_boundary(mut self, boundary: impl Into<String>) -> Self {
        self.security_boundary = Some(boundary.into());
        self
    }

    /// Validates and builds the environment.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigurationError`] if `min > max` or no instance
    /// shape was declared.
    pub fn build(self) -> Result<ComputeEnvironment, ConfigurationError> {
        if self.min_capacity_units > self.max_capacity_units {
            return Err(ConfigurationError::InvalidCapacityBounds {
                environment: self.name,
                min: self.min_capacity_units,
                max: self.max_capacity_units,
            });
        }
        if self.shapes.is_empty() {
            return Err(ConfigurationError::NoInstanceShapes {
                environment: self.name,
            });
        }

        let capacity = Arc::new(Semaphore::new(self.max_capacity_units as usize));
        Ok(ComputeEnvironment {
            name: self.name,
            min_capacity_units: self.min_capacity_units,
            max_capacity_units: self.max_capacity_units,
            shapes: self.shapes,
            network_placement: self.network_placement,
            security_boundary: self.security_boundary,
            capacity,
        })
    }
}
