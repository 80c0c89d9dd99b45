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

//! Immutable job definition template.
//!
//! A definition describes how a job runs — image, resource shape, command
//! template, timeout, retry budget, log sink, identities — and carries no
//! behavior beyond validation and command rendering. Validation happens at
//! construction: an invalid timeout or a command placeholder without a
//! declared parameter is a [`ConfigurationError`] and never reaches
//! runtime.
//!
//! Command placeholders use the `Ref::name` form, e.g.
//! `["echo", "bucket:", "Ref::bucketName"]`.

use std::collections::HashMap;
use std::time::Duration;

use crate::compute::ResourceRequest;
use crate::error::ConfigurationError;

/// Prefix marking a command argument as a parameter placeholder.
pub const PLACEHOLDER_PREFIX: &str = "Ref::";

/// Log destination for a job's output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogSink {
    pub group: String,
    pub stream_prefix: String,
}

impl LogSink {
    pub fn new(group: impl Into<String>, stream_prefix: impl Into<String>) -> Self {
        Self {
            group: group.into(),
            stream_prefix: stream_prefix.into(),
        }
    }
}

/// Immutable template describing how a job executes.
///
/// Referenced by value from dispatch rules and submissions; never mutated
/// after construction.
#[derive(Debug, Clone)]
pub struct JobDefinition {
    name: String,
    image: String,
    timeout: Duration,
    retry_attempts: u32,
    resources: ResourceRequest,
    command: Vec<String>,
    required_parameters: Vec<String>,
    log_sink: LogSink,
    execution_identity: String,
    job_identity: Option<String>,
}

impl JobDefinition {
    /// Creates a builder for a definition with the given name and image.
    pub fn builder(name: impl Into<String>, image: impl Into<String>) -> JobDefinitionBuilder {
        JobDefinitionBuilder {
            name: name.into(),
            image: image.into(),
            timeout: Duration::from_secs(600),
            retry_attempts: 5,
            resources: ResourceRequest::new(1, 2048),
            command: Vec::new(),
            required_parameters: Vec::new(),
            log_sink: None,
            execution_identity: None,
            job_identity: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn image(&self) -> &str {
        &self.image
    }

    /// Maximum wall-clock time for a single execution attempt.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Number of automatic resubmissions after the first failed attempt.
    pub fn retry_attempts(&self) -> u32 {
        self.retry_attempts
    }

    pub fn resources(&self) -> &ResourceRequest {
        &self.resources
    }

    pub fn command(&self) -> &[String] {
        &self.command
    }

    /// Parameters the dispatch rule must supply at enqueue time.
    pub fn required_parameters(&self) -> &[String] {
        &self.required_parameters
    }

    pub fn log_sink(&self) -> &LogSink {
        &self.log_sink
    }

    /// Identity the running job assumes.
    ///
    /// Distinct from [`JobDefinition::job_identity`]: this one pulls the
    /// image and writes logs.
    pub fn execution_identity(&self) -> &str {
        &self.execution_identity
    }

    /// Optional identity for the job's own workload permissions.
    pub fn job_identity(&self) -> Option<&str> {
        self.job_identity.as_deref()
    }

    /// Substitutes parameter bindings into the command template.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigurationError::MissingParameterBinding`] if a
    /// placeholder has no binding. The rule's construction-time coverage
    /// check makes this unreachable for correctly wired pipelines.
    pub fn render_command(
        &self,
        bindings: &HashMap<String, String>,
    ) -> Result<Vec<String>, ConfigurationError> {
        self.command
            .iter()
            .map(|arg| match arg.strip_prefix(PLACEHOLDER_PREFIX) {
                Some(parameter) => bindings.get(parameter).cloned().ok_or_else(|| {
                    ConfigurationError::MissingParameterBinding {
                        definition: self.name.clone(),
                        parameter: parameter.to_string(),
                    }
                }),
                None => Ok(arg.clone()),
            })
            .collect()
    }
}

/// Builder for [`JobDefinition`].
///
/// Defaults: 10 minute timeout, 5 retry attempts, 1 vCPU / 2048 MiB.
pub struct JobDefinitionBuilder {
    name: String,
    image: String,
    timeout: Duration,
    retry_attempts: u32,
    resources: ResourceRequest,
    command: Vec<String>,
    required_parameters: Vec<String>,
    log_sink: Option<LogSink>,
    execution_identity: Option<String>,
    job_identity: Option<String>,
}

impl JobDefinitionBuilder {
    /// Maximum wall-clock time for a single attempt. Must be positive.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Number of automatic resubmissions after a failed attempt.
    pub fn retry_attempts(mut self, attempts: u32) -> Self {
        self.retry_attempts = attempts;
        self
    }

    /// CPU and memory requested per execution.
    pub fn resources(mut self, resources: ResourceRequest) -> Self {
        self.resources = resources;
        self
    }

    /// Command template; arguments prefixed with `Ref::` are placeholders.
    pub fn command<I, S>(mut self, command: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.command = command.into_iter().map(Into::into).collect();
        self
    }

    /// Declares a parameter the dispatch rule must bind.
    pub fn required_parameter(mut self, name: impl Into<String>) -> Self {
        self.required_parameters.push(name.into());
        self
    }

    /// Log destination for job output.
    pub fn log_sink(mut self, sink: LogSink) -> Self {
        self.log_sink = Some(sink);
        self
    }

    /// Identity used to pull the image and write logs.
    pub fn execution_identity(mut self, identity: impl Into<String>) -> Self {
        self.execution_identity = Some(identity.into());
        self
    }

    /// Identity the job's workload assumes, if different.
    pub fn job_identity(mut self, identity: impl Into<String>) -> Self {
        self.job_identity = Some(identity.into());
        self
    }

    /// Validates and builds the definition.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigurationError`] if the timeout is zero or any
    /// command placeholder is not declared as a required parameter.
    pub fn build(self) -> Result<JobDefinition, ConfigurationError> {
        if self.timeout.is_zero() {
            return Err(ConfigurationError::InvalidTimeout {
                definition: self.name,
            });
        }

        for arg in &self.command {
            if let Some(placeholder) = arg.strip_prefix(PLACEHOLDER_PREFIX) {
                if !self.required_parameters.iter().any(|p| p == placeholder) {
                    return Err(ConfigurationError::UnboundPlaceholder {
                        definition: self.name,
                        placeholder: placeholder.to_string(),
                    });
                }
            }
        }

        let log_sink = self
            .log_sink
            .unwrap_or_else(|| LogSink::new(format!("/{}/logs", self.name), self.name.clone()));
        let execution_identity = self
            .execution_identity
            .unwrap_or_else(|| format!("{}-execution-role", self.name));

        Ok(JobDefinition {
            name: self.name,
            image: self.image,
            timeout: self.timeout,
            retry_attempts: self.retry_attempts,
            resources: self.resources,
            command: self.command,
            required_parameters: self.required_parameters,
            log_sink,
            execution_identity,
            job_identity: self.job_identity,
        })
    }
}
