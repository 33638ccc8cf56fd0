//! Persisted per-topic progress record.
//!
//! Stored as a camelCase JSON string:
//!
//! ```json
//! {"topicId":"t1","positionSeconds":42.0,"completed":false,"lastPlayed":"2024-05-01T08:00:00Z","playCount":1}
//! ```
//!
//! Parsing is all-or-nothing. A stored value that fails structural checks is
//! replaced by a freshly defaulted record, never patched field by field.

use crate::error::{ProgressError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressRecord {
    pub topic_id: String,
    pub position_seconds: f64,
    /// Monotonic: ordinary progress writes never clear it.
    pub completed: bool,
    pub last_played: DateTime<Utc>,
    /// Number of play sessions, at least 1.
    pub play_count: u32,
}

/// Outcome of reading a stored record.
#[derive(Debug, Clone, PartialEq)]
pub enum ParsedRecord {
    Valid(ProgressRecord),
    /// The stored value was unusable and has been replaced by defaults.
    Repaired {
        record: ProgressRecord,
        reason: String,
    },
}

impl ParsedRecord {
    pub fn record(&self) -> &ProgressRecord {
        match self {
            ParsedRecord::Valid(record) | ParsedRecord::Repaired { record, .. } => record,
        }
    }

    pub fn into_record(self) -> ProgressRecord {
        match self {
            ParsedRecord::Valid(record) | ParsedRecord::Repaired { record, .. } => record,
        }
    }

    pub fn was_repaired(&self) -> bool {
        matches!(self, ParsedRecord::Repaired { .. })
    }
}

impl ProgressRecord {
    /// A record for a topic's first session: position 0, one play.
    pub fn new(topic_id: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            topic_id: topic_id.into(),
            position_seconds: 0.0,
            completed: false,
            last_played: now,
            play_count: 1,
        }
    }

    /// Strict parse of a stored value.
    pub fn parse(raw: &str) -> Result<Self> {
        let record: ProgressRecord = serde_json::from_str(raw)?;
        record.validate()?;
        Ok(record)
    }

    /// Read the value stored under `topic_id`, replacing it with defaults if
    /// it fails validation.
    ///
    /// `known_completed` comes from the aggregate completed list and survives
    /// the repair so a corrupted record cannot un-complete a topic.
    pub fn parse_or_repair(
        topic_id: &str,
        raw: &str,
        now: DateTime<Utc>,
        known_completed: bool,
    ) -> ParsedRecord {
        let checked = Self::parse(raw).and_then(|record| {
            if record.topic_id == topic_id {
                Ok(record)
            } else {
                Err(ProgressError::InvalidRecord {
                    topic_id: topic_id.to_string(),
                    reason: format!("stored under a different topic ({})", record.topic_id),
                })
            }
        });

        match checked {
            Ok(record) => ParsedRecord::Valid(record),
            Err(e) => {
                let mut record = Self::new(topic_id, now);
                record.completed = known_completed;
                ParsedRecord::Repaired {
                    record,
                    reason: e.to_string(),
                }
            }
        }
    }

    pub fn validate(&self) -> Result<()> {
        let invalid = |reason: &str| ProgressError::InvalidRecord {
            topic_id: self.topic_id.clone(),
            reason: reason.to_string(),
        };

        if self.topic_id.is_empty() {
            return Err(invalid("empty topic id"));
        }
        if !self.position_seconds.is_finite() || self.position_seconds < 0.0 {
            return Err(invalid("position must be a non-negative number"));
        }
        if self.play_count == 0 {
            return Err(invalid("play count must be at least 1"));
        }
        Ok(())
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}
