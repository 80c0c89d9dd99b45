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

//! Inbound storage-creation event.
//!
//! Events arrive from the storage subsystem with a source identifier, an
//! event-type identifier, and a nested detail payload. The detail payload
//! is kept as a generic JSON tree so match patterns and extraction paths
//! can traverse it structurally without a fixed schema.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

/// Source identifier emitted by the storage subsystem.
pub const STORAGE_SOURCE: &str = "storage";

/// Event-type identifier for object creation.
pub const OBJECT_CREATED: &str = "Object Created";

/// A storage-creation notification.
///
/// The dead-letter payload is this value, verbatim and unmodified, so the
/// type round-trips through serde without loss.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageEvent {
    /// Unique identifier assigned by the event source.
    pub id: Uuid,
    /// Source identifier (e.g. `"storage"`).
    pub source: String,
    /// Event-type identifier (e.g. `"Object Created"`).
    #[serde(rename = "detailType")]
    pub detail_type: String,
    /// When the event occurred, used for staleness checks at dispatch time.
    pub time: DateTime<Utc>,
    /// Nested detail payload.
    pub detail: serde_json::Value,
}

impl StorageEvent {
    /// Creates an event with the given source, type, and detail payload,
    /// timestamped now.
    pub fn new(
        source: impl Into<String>,
        detail_type: impl Into<String>,
        detail: serde_json::Value,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            source: source.into(),
            detail_type: detail_type.into(),
            time: Utc::now(),
            detail,
        }
    }

    /// Creates an object-created event for the given bucket and key.
    pub fn object_created(bucket: &str, key: &str) -> Self {
        Self::new(
            STORAGE_SOURCE,
            OBJECT_CREATED,
            json!({
                "bucket": { "name": bucket },
                "object": { "key": key },
            }),
        )
    }

    /// Returns this event with its timestamp replaced, for staleness tests
    /// and replay.
    pub fn at(mut self, time: DateTime<Utc>) -> Self {
        self.time = time;
        self
    }

    /// Age of the event relative to `now`.
    pub fn age(&self, now: DateTime<Utc>) -> chrono::Duration {
        now - self.time
    }
}
