//! # Progress Store
//!
//! Durable per-topic listening progress on top of the host
//! [`SettingsStore`].
//!
//! ## Key Layout
//!
//! | Key | Value |
//! |---|---|
//! | `progress.topic.<topicId>` | [`ProgressRecord`] as JSON |
//! | `progress.completed_topics` | JSON array of completed topic ids |
//! | `progress.schema_version` | integer, see [`CURRENT_SCHEMA_VERSION`] |
//!
//! ## Repair
//!
//! [`ProgressStore::initialize`] runs once per launch. When the stored schema
//! version is older than [`CURRENT_SCHEMA_VERSION`], every record is checked
//! and unusable ones are rewritten with defaults; a completed list that is not
//! an array is rebuilt from the records. Records read later that still fail
//! validation are repaired the same way on access.
//!
//! All mutating operations are serialized by an internal async mutex so
//! read-modify-write sequences on the same key never interleave.

use crate::error::{ProgressError, Result};
use crate::record::{ParsedRecord, ProgressRecord};
use bridge_traits::{BridgeError, Clock, SettingsStore};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

pub const RECORD_KEY_PREFIX: &str = "progress.topic.";
pub const COMPLETED_TOPICS_KEY: &str = "progress.completed_topics";
pub const SCHEMA_VERSION_KEY: &str = "progress.schema_version";
pub const CURRENT_SCHEMA_VERSION: i64 = 2;

/// What [`ProgressStore::initialize`] did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MigrationReport {
    pub from_version: i64,
    pub to_version: i64,
    /// Topics whose records were replaced with defaults.
    pub repaired_topics: Vec<String>,
    pub completed_list_rebuilt: bool,
}

impl MigrationReport {
    pub fn migrated(&self) -> bool {
        self.from_version != self.to_version
    }
}

enum CompletedList {
    Missing,
    Valid(Vec<String>),
    Malformed(String),
}

pub struct ProgressStore {
    settings: Arc<dyn SettingsStore>,
    clock: Arc<dyn Clock>,
    /// Topics whose current play session has not been counted yet.
    pending_sessions: Mutex<HashSet<String>>,
}

impl ProgressStore {
    pub fn new(settings: Arc<dyn SettingsStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            settings,
            clock,
            pending_sessions: Mutex::new(HashSet::new()),
        }
    }

    pub fn record_key(topic_id: &str) -> String {
        format!("{}{}", RECORD_KEY_PREFIX, topic_id)
    }

    // ========================================================================
    // Migration
    // ========================================================================

    /// Bring stored data up to [`CURRENT_SCHEMA_VERSION`].
    #[instrument(skip(self))]
    pub async fn initialize(&self) -> Result<MigrationReport> {
        let _guard = self.pending_sessions.lock().await;

        let from_version = match self.settings.get_i64(SCHEMA_VERSION_KEY).await {
            Ok(version) => version.unwrap_or(0),
            Err(BridgeError::OperationFailed(reason)) => {
                warn!(%reason, "Unreadable schema version, treating as unversioned");
                0
            }
            Err(e) => return Err(e.into()),
        };

        if from_version >= CURRENT_SCHEMA_VERSION {
            debug!(version = from_version, "Progress schema up to date");
            return Ok(MigrationReport {
                from_version,
                to_version: from_version,
                ..Default::default()
            });
        }

        let mut report = MigrationReport {
            from_version,
            to_version: CURRENT_SCHEMA_VERSION,
            ..Default::default()
        };

        let stored_list = self.read_completed_list().await?;
        let listed: HashSet<String> = match &stored_list {
            CompletedList::Valid(ids) => ids.iter().cloned().collect(),
            _ => HashSet::new(),
        };

        let mut completed_in_records = Vec::new();
        for key in self.settings.list_keys_with_prefix(RECORD_KEY_PREFIX).await? {
            let Some(topic_id) = key.strip_prefix(RECORD_KEY_PREFIX) else {
                continue;
            };
            let parsed = self
                .read_record_with(topic_id, listed.contains(topic_id))
                .await?;
            let Some(parsed) = parsed else {
                continue;
            };
            if parsed.was_repaired() {
                report.repaired_topics.push(topic_id.to_string());
            }
            if parsed.record().completed {
                completed_in_records.push(topic_id.to_string());
            }
        }

        let mut completed = match stored_list {
            CompletedList::Valid(ids) => ids,
            CompletedList::Missing => Vec::new(),
            CompletedList::Malformed(reason) => {
                warn!(%reason, "Completed topic list is malformed, rebuilding");
                report.completed_list_rebuilt = true;
                Vec::new()
            }
        };
        let before = completed.len();
        for topic_id in completed_in_records {
            if !completed.contains(&topic_id) {
                completed.push(topic_id);
            }
        }
        if report.completed_list_rebuilt || completed.len() != before {
            self.write_completed_list(&completed).await?;
        }

        self.settings
            .set_i64(SCHEMA_VERSION_KEY, CURRENT_SCHEMA_VERSION)
            .await?;

        info!(
            from = report.from_version,
            to = report.to_version,
            repaired = report.repaired_topics.len(),
            completed_list_rebuilt = report.completed_list_rebuilt,
            "Progress store migrated"
        );
        Ok(report)
    }

    // ========================================================================
    // Writes
    // ========================================================================

    /// Open a play session for `topic_id`. The next write for the topic
    /// counts one play.
    pub async fn begin_play_session(&self, topic_id: &str) {
        self.pending_sessions
            .lock()
            .await
            .insert(topic_id.to_string());
    }

    /// Upsert the position for `topic_id`, clamped to `[0, duration]`.
    ///
    /// `completed` is left untouched. `play_count` goes up once per play
    /// session; a new record starts at 1.
    #[instrument(skip(self))]
    pub async fn save_progress(
        &self,
        topic_id: &str,
        position_seconds: f64,
        duration_seconds: Option<f64>,
    ) -> Result<ProgressRecord> {
        if !position_seconds.is_finite() {
            return Err(ProgressError::InvalidRecord {
                topic_id: topic_id.to_string(),
                reason: format!("position {} is not a finite number", position_seconds),
            });
        }

        let mut pending = self.pending_sessions.lock().await;
        let now = self.clock.now();
        let position = clamp_position(position_seconds, duration_seconds);

        let record = match self.read_record(topic_id).await? {
            Some(mut record) => {
                record.position_seconds = position;
                record.last_played = now;
                if pending.contains(topic_id) {
                    record.play_count = record.play_count.saturating_add(1);
                }
                record
            }
            None => ProgressRecord {
                position_seconds: position,
                ..ProgressRecord::new(topic_id, now)
            },
        };

        self.write_record(&record).await?;
        pending.remove(topic_id);

        debug!(position, play_count = record.play_count, "Progress saved");
        Ok(record)
    }

    /// Flag `topic_id` as completed, creating its record if needed.
    #[instrument(skip(self))]
    pub async fn mark_completed(&self, topic_id: &str) -> Result<ProgressRecord> {
        let mut pending = self.pending_sessions.lock().await;
        let now = self.clock.now();

        let (mut record, created) = match self.read_record(topic_id).await? {
            Some(record) => (record, false),
            None => (ProgressRecord::new(topic_id, now), true),
        };
        record.completed = true;
        record.last_played = now;

        self.write_record(&record).await?;
        if created {
            pending.remove(topic_id);
        }

        let mut completed = match self.read_completed_list().await? {
            CompletedList::Valid(ids) => ids,
            CompletedList::Missing => Vec::new(),
            CompletedList::Malformed(reason) => {
                warn!(%reason, "Completed topic list is malformed, rebuilding");
                self.completed_from_records().await?
            }
        };
        if !completed.iter().any(|id| id == topic_id) {
            completed.push(topic_id.to_string());
        }
        self.write_completed_list(&completed).await?;

        info!("Topic marked completed");
        Ok(record)
    }

    /// Remove the record for `topic_id` and drop it from the completed list.
    #[instrument(skip(self))]
    pub async fn clear_progress(&self, topic_id: &str) -> Result<()> {
        let mut pending = self.pending_sessions.lock().await;

        self.settings.delete(&Self::record_key(topic_id)).await?;
        pending.remove(topic_id);

        if let CompletedList::Valid(mut ids) = self.read_completed_list().await? {
            let before = ids.len();
            ids.retain(|id| id != topic_id);
            if ids.len() != before {
                self.write_completed_list(&ids).await?;
            }
        }

        debug!("Progress cleared");
        Ok(())
    }

    /// Remove every progress record and the completed list. The schema
    /// marker and unrelated settings are kept.
    #[instrument(skip(self))]
    pub async fn clear_all(&self) -> Result<()> {
        let mut pending = self.pending_sessions.lock().await;

        for key in self.settings.list_keys_with_prefix(RECORD_KEY_PREFIX).await? {
            self.settings.delete(&key).await?;
        }
        self.settings.delete(COMPLETED_TOPICS_KEY).await?;
        pending.clear();

        info!("All progress cleared");
        Ok(())
    }

    // ========================================================================
    // Reads
    // ========================================================================

    /// Stored position for `topic_id`, or 0 when nothing was saved.
    pub async fn get_progress(&self, topic_id: &str) -> Result<f64> {
        Ok(self
            .get_record(topic_id)
            .await?
            .map_or(0.0, |record| record.position_seconds))
    }

    pub async fn get_record(&self, topic_id: &str) -> Result<Option<ProgressRecord>> {
        let _guard = self.pending_sessions.lock().await;
        self.read_record(topic_id).await
    }

    /// Every stored record, ordered by topic id.
    pub async fn get_all_progress_data(&self) -> Result<Vec<ProgressRecord>> {
        let _guard = self.pending_sessions.lock().await;

        let mut records = Vec::new();
        for key in self.settings.list_keys_with_prefix(RECORD_KEY_PREFIX).await? {
            let Some(topic_id) = key.strip_prefix(RECORD_KEY_PREFIX) else {
                continue;
            };
            if let Some(record) = self.read_record(topic_id).await? {
                records.push(record);
            }
        }
        Ok(records)
    }

    /// Ids of completed topics, in completion order.
    pub async fn completed_topics(&self) -> Result<Vec<String>> {
        let _guard = self.pending_sessions.lock().await;

        match self.read_completed_list().await? {
            CompletedList::Valid(ids) => Ok(ids),
            CompletedList::Missing => Ok(Vec::new()),
            CompletedList::Malformed(reason) => {
                warn!(%reason, "Completed topic list is malformed, rebuilding");
                let ids = self.completed_from_records().await?;
                self.write_completed_list(&ids).await?;
                Ok(ids)
            }
        }
    }

    pub async fn is_completed(&self, topic_id: &str) -> Result<bool> {
        Ok(self
            .completed_topics()
            .await?
            .iter()
            .any(|id| id == topic_id))
    }

    // ========================================================================
    // Internals (caller holds the mutex)
    // ========================================================================

    async fn read_record(&self, topic_id: &str) -> Result<Option<ProgressRecord>> {
        Ok(self
            .read_record_with_lookup(topic_id)
            .await?
            .map(ParsedRecord::into_record))
    }

    /// Read and repair, looking up the completed list only when a repair is
    /// needed.
    async fn read_record_with_lookup(&self, topic_id: &str) -> Result<Option<ParsedRecord>> {
        let Some(raw) = self.read_raw_record(topic_id).await? else {
            return Ok(None);
        };

        match ProgressRecord::parse_or_repair(topic_id, &raw, self.clock.now(), false) {
            valid @ ParsedRecord::Valid(_) => Ok(Some(valid)),
            ParsedRecord::Repaired { mut record, reason } => {
                record.completed = match self.read_completed_list().await? {
                    CompletedList::Valid(ids) => ids.iter().any(|id| id == topic_id),
                    _ => false,
                };
                self.persist_repair(record, reason).await.map(Some)
            }
        }
    }

    async fn read_record_with(
        &self,
        topic_id: &str,
        known_completed: bool,
    ) -> Result<Option<ParsedRecord>> {
        let Some(raw) = self.read_raw_record(topic_id).await? else {
            return Ok(None);
        };

        match ProgressRecord::parse_or_repair(topic_id, &raw, self.clock.now(), known_completed) {
            valid @ ParsedRecord::Valid(_) => Ok(Some(valid)),
            ParsedRecord::Repaired { record, reason } => {
                self.persist_repair(record, reason).await.map(Some)
            }
        }
    }

    async fn persist_repair(&self, record: ProgressRecord, reason: String) -> Result<ParsedRecord> {
        warn!(topic_id = %record.topic_id, %reason, "Replacing unusable progress record with defaults");
        self.write_record(&record).await?;
        Ok(ParsedRecord::Repaired { record, reason })
    }

    /// Raw JSON for a record. A value stored with the wrong type reads as an
    /// empty string so it goes through repair.
    async fn read_raw_record(&self, topic_id: &str) -> Result<Option<String>> {
        match self.settings.get_string(&Self::record_key(topic_id)).await {
            Ok(raw) => Ok(raw),
            Err(BridgeError::OperationFailed(reason)) => {
                warn!(topic_id, %reason, "Unreadable progress record");
                Ok(Some(String::new()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn write_record(&self, record: &ProgressRecord) -> Result<()> {
        let json = record.to_json()?;
        self.settings
            .set_string(&Self::record_key(&record.topic_id), &json)
            .await?;
        Ok(())
    }

    async fn read_completed_list(&self) -> Result<CompletedList> {
        let raw = match self.settings.get_string(COMPLETED_TOPICS_KEY).await {
            Ok(Some(raw)) => raw,
            Ok(None) => return Ok(CompletedList::Missing),
            Err(BridgeError::OperationFailed(reason)) => {
                return Ok(CompletedList::Malformed(reason))
            }
            Err(e) => return Err(e.into()),
        };

        Ok(match serde_json::from_str::<Vec<String>>(&raw) {
            Ok(ids) => CompletedList::Valid(ids),
            Err(e) => CompletedList::Malformed(e.to_string()),
        })
    }

    async fn write_completed_list(&self, ids: &[String]) -> Result<()> {
        let json = serde_json::to_string(ids)?;
        self.settings.set_string(COMPLETED_TOPICS_KEY, &json).await?;
        Ok(())
    }

    async fn completed_from_records(&self) -> Result<Vec<String>> {
        let mut ids = Vec::new();
        for key in self.settings.list_keys_with_prefix(RECORD_KEY_PREFIX).await? {
            let Some(topic_id) = key.strip_prefix(RECORD_KEY_PREFIX) else {
                continue;
            };
            if let Some(parsed) = self.read_record_with(topic_id, false).await? {
                if parsed.record().completed {
                    ids.push(topic_id.to_string());
                }
            }
        }
        Ok(ids)
    }
}

/// Clamp to `[0, duration]`; only the lower bound applies when the duration
/// is unknown.
fn clamp_position(position: f64, duration: Option<f64>) -> f64 {
    let position = position.max(0.0);
    match duration.filter(|d| d.is_finite() && *d > 0.0) {
        Some(duration) => position.min(duration),
        None => position,
    }
}
