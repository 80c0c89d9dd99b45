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

//! Event matching and field extraction.
//!
//! The [`EventRouter`] pairs a [`MatchPattern`] (a structural filter over
//! event source, event type, and nested detail fields) with an
//! [`Extractor`] (named field paths resolved against the detail tree).
//! Evaluation is pure and deterministic so it can be re-run safely for
//! testing and replay.
//!
//! Matching is exact-equality per declared field; there are no wildcards.
//! Absence of a required field is a non-match, never an error. A missing
//! field on the *extraction* side of an already-matched event, by
//! contrast, is a dispatch error the rule must not drop silently.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{ConfigurationError, DispatchError};
use crate::event::StorageEvent;

/// Flat mapping of binding name to extracted field value, consumed by the
/// dispatch rule as job parameters.
pub type ExtractedFields = HashMap<String, String>;

/// A dotted path into the event detail tree, e.g. `"bucket.name"`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct FieldPath {
    segments: Vec<String>,
}

impl FieldPath {
    /// Parses a dotted path. Empty paths and empty segments are rejected.
    pub fn parse(path: &str) -> Result<Self, ConfigurationError> {
        if path.is_empty() || path.split('.').any(str::is_empty) {
            return Err(ConfigurationError::EmptyFieldPath);
        }
        Ok(Self {
            segments: path.split('.').map(str::to_string).collect(),
        })
    }

    /// Resolves the path against a JSON tree, descending through objects
    /// segment by segment. Returns `None` if any segment is absent or the
    /// intermediate value is not an object.
    pub fn resolve<'a>(&self, root: &'a Value) -> Option<&'a Value> {
        let mut current = root;
        for segment in &self.segments {
            current = current.as_object()?.get(segment)?;
        }
        Some(current)
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.segments.join("."))
    }
}

impl TryFrom<String> for FieldPath {
    type Error = ConfigurationError;

    fn try_from(path: String) -> Result<Self, Self::Error> {
        Self::parse(&path)
    }
}

impl From<FieldPath> for String {
    fn from(path: FieldPath) -> Self {
        path.to_string()
    }
}

/// Structural filter over inbound events.
///
/// Each declared field must equal the corresponding field in the event for
/// the pattern to match. Undeclared fields are ignored.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MatchPattern {
    #[serde(skip_serializing_if = "Option::is_none")]
    source: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    detail_type: Option<String>,
    #[serde(default)]
    detail: Vec<(FieldPath, Value)>,
}

impl MatchPattern {
    /// Creates an empty pattern that matches every event.
    pub fn new() -> Self {
        Self::default()
    }

    /// Requires the event source to equal `source`.
    pub fn source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    /// Requires the event-type identifier to equal `detail_type`.
    pub fn detail_type(mut self, detail_type: impl Into<String>) -> Self {
        self.detail_type = Some(detail_type.into());
        self
    }

    /// Requires the detail field at `path` to equal `expected`.
    pub fn detail_field(
        mut self,
        path: &str,
        expected: Value,
    ) -> Result<Self, ConfigurationError> {
        self.detail.push((FieldPath::parse(path)?, expected));
        Ok(self)
    }

    /// Evaluates the pattern against an event. Pure and side-effect-free.
    pub fn matches(&self, event: &StorageEvent) -> bool {
        if let Some(source) = &self.source {
            if event.source != *source {
                return false;
            }
        }
        if let Some(detail_type) = &self.detail_type {
            if event.detail_type != *detail_type {
                return false;
            }
        }
        self.detail
            .iter()
            .all(|(path, expected)| path.resolve(&event.detail) == Some(expected))
    }
}

/// Named field paths extracted from matched events.
#[derive(Debug, Clone, Default)]
pub struct Extractor {
    bindings: Vec<(String, FieldPath)>,
}

impl Extractor {
    /// Creates an extractor with no bindings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a binding that resolves `path` into the field named `name`.
    pub fn bind(mut self, name: impl Into<String>, path: &str) -> Result<Self, ConfigurationError> {
        self.bindings.push((name.into(), FieldPath::parse(path)?));
        Ok(self)
    }

    /// Names of all declared bindings.
    pub fn binding_names(&self) -> impl Iterator<Item = &str> {
        self.bindings.iter().map(|(name, _)| name.as_str())
    }

    /// Resolves all bindings against the event's detail tree.
    ///
    /// Scalar values are stringified; a missing path or a composite value
    /// is a [`DispatchError::MissingField`].
    pub fn extract(&self, event: &StorageEvent) -> Result<ExtractedFields, DispatchError> {
        let mut fields = ExtractedFields::with_capacity(self.bindings.len());
        for (name, path) in &self.bindings {
            let value = path.resolve(&event.detail).and_then(scalar_to_string).ok_or(
                DispatchError::MissingField {
                    path: path.to_string(),
                },
            )?;
            fields.insert(name.clone(), value);
        }
        Ok(fields)
    }
}

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}

/// Filters inbound events and extracts structured fields for dispatch.
#[derive(Debug, Clone)]
pub struct EventRouter {
    pattern: MatchPattern,
    extractor: Extractor,
}

impl EventRouter {
    /// Creates a router from a match pattern and an extractor.
    pub fn new(pattern: MatchPattern, extractor: Extractor) -> Self {
        Self { pattern, extractor }
    }

    /// The extractor's binding names, used by the rule to verify parameter
    /// coverage at construction time.
    pub fn binding_names(&self) -> impl Iterator<Item = &str> {
        self.extractor.binding_names()
    }

    /// Evaluates an event against the pattern.
    ///
    /// Returns `Ok(None)` when the event does not match (intentional
    /// filtering, not a failure), `Ok(Some(fields))` on a match, and an
    /// error when a matched event lacks an extraction field.
    pub fn evaluate(
        &self,
        event: &StorageEvent,
    ) -> Result<Option<ExtractedFields>, DispatchError> {
        if !self.pattern.matches(event) {
            return Ok(None);
        }
        self.extractor.extract(event).map(Some)
    }
}
