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

//! Provisioning-time configuration.
//!
//! [`EnvironmentProfile`] is the typed per-deployment configuration object
//! supplied by the external provisioning layer: account and region
//! identifiers, a project name from which all resource identities are
//! derived, and the allowed inbound network ranges carried for the network
//! collaborator (not interpreted by the dispatcher itself).
//!
//! [`DispatcherConfig`] holds the dispatch-pipeline knobs: the maximum
//! permissible event age and what to do with events that exceed it.

use chrono::Duration;

/// Policy for events whose age exceeds the configured maximum at dispatch
/// time.
///
/// Dropping loses the work silently, which some deployments cannot
/// accept, so the behavior is configurable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StalePolicy {
    /// Drop the event with a debug log and no dead-letter entry.
    #[default]
    Drop,
    /// Forward the event to the dead-letter channel for operator replay.
    DeadLetter,
}

/// Typed configuration object for one deployment environment.
///
/// All resource identities (queue name, job definition name, job name,
/// dead-letter channel name) derive from [`EnvironmentProfile::name_prefix`].
#[derive(Debug, Clone)]
pub struct EnvironmentProfile {
    project_name: String,
    environment: String,
    account_id: String,
    region: String,
    allowed_ingress_cidrs: Vec<String>,
}

impl EnvironmentProfile {
    /// Creates a profile for the given project and environment.
    pub fn new(
        project_name: impl Into<String>,
        environment: impl Into<String>,
        account_id: impl Into<String>,
        region: impl Into<String>,
    ) -> Self {
        Self {
            project_name: project_name.into(),
            environment: environment.into(),
            account_id: account_id.into(),
            region: region.into(),
            allowed_ingress_cidrs: Vec::new(),
        }
    }

    /// Sets the inbound network ranges allowed by the security boundary.
    ///
    /// Consumed by the external network collaborator; the dispatcher only
    /// carries these through to component construction.
    pub fn allowed_ingress_cidrs<I, S>(mut self, cidrs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed_ingress_cidrs = cidrs.into_iter().map(Into::into).collect();
        self
    }

    pub fn project_name(&self) -> &str {
        &self.project_name
    }

    pub fn environment(&self) -> &str {
        &self.environment
    }

    pub fn account_id(&self) -> &str {
        &self.account_id
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    pub fn ingress_cidrs(&self) -> &[String] {
        &self.allowed_ingress_cidrs
    }

    /// Prefix from which all resource identities are derived.
    pub fn name_prefix(&self) -> String {
        format!("{}-{}", self.project_name, self.environment)
    }

    /// Derives a resource identity by appending `suffix` to the prefix.
    pub fn resource_name(&self, suffix: &str) -> String {
        format!("{}-{}", self.name_prefix(), suffix)
    }
}

/// Dispatch-pipeline configuration.
///
/// # Construction
///
/// ```rust,ignore
/// let config = DispatcherConfig::builder()
///     .max_event_age(Duration::hours(1))
///     .stale_policy(StalePolicy::DeadLetter)
///     .build();
/// ```
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    max_event_age: Duration,
    stale_policy: StalePolicy,
}

impl DispatcherConfig {
    /// Creates a new configuration builder with default values.
    pub fn builder() -> DispatcherConfigBuilder {
        DispatcherConfigBuilder::default()
    }

    /// Maximum age an event may have at submission time before it is
    /// considered stale.
    pub fn max_event_age(&self) -> Duration {
        self.max_event_age
    }

    /// What to do with stale events.
    pub fn stale_policy(&self) -> StalePolicy {
        self.stale_policy
    }
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

/// Builder for [`DispatcherConfig`].
#[derive(Debug, Clone)]
pub struct DispatcherConfigBuilder {
    config: DispatcherConfig,
}

impl Default for DispatcherConfigBuilder {
    fn default() -> Self {
        Self {
            config: DispatcherConfig {
                max_event_age: Duration::hours(2),
                stale_policy: StalePolicy::Drop,
            },
        }
    }
}

impl DispatcherConfigBuilder {
    /// Sets the maximum permissible event age at submission time.
    pub fn max_event_age(mut self, age: Duration) -> Self {
        self.config.max_event_age = age;
        self
    }

    /// Sets the stale-event policy.
    pub fn stale_policy(mut self, policy: StalePolicy) -> Self {
        self.config.stale_policy = policy;
        self
    }

    /// Builds the configuration.
    pub fn build(self) -> DispatcherConfig {
        self.config
    }
}
