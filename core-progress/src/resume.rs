//! Resume prompt policy.
//!
//! Decides, from a stored [`ProgressRecord`], whether the UI should ask
//! "continue where you left off?" before starting a topic.

use crate::config::ProgressConfig;
use crate::record::ProgressRecord;
use crate::store::ProgressStore;
use std::sync::Arc;
use tracing::warn;

/// Outcome of evaluating a record.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ResumeDecision {
    /// Offer to continue from `position` seconds.
    Prompt { position: f64 },
    /// Start from the beginning without asking.
    StartFresh,
}

impl ResumeDecision {
    /// Pure decision over an optional record.
    ///
    /// Prompts iff a record exists, is not completed, and its position is at
    /// least `threshold` seconds.
    pub fn evaluate(record: Option<&ProgressRecord>, threshold: f64) -> Self {
        match record {
            Some(record) if !record.completed && record.position_seconds >= threshold => {
                ResumeDecision::Prompt {
                    position: record.position_seconds,
                }
            }
            _ => ResumeDecision::StartFresh,
        }
    }

    pub fn should_prompt(&self) -> bool {
        matches!(self, ResumeDecision::Prompt { .. })
    }
}

/// Store-backed resume queries. Storage failures read as "nothing saved".
#[derive(Clone)]
pub struct ResumePolicy {
    store: Arc<ProgressStore>,
    threshold: f64,
}

impl ResumePolicy {
    pub fn new(store: Arc<ProgressStore>, config: &ProgressConfig) -> Self {
        Self {
            store,
            threshold: config.resume_threshold,
        }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub async fn decide(&self, topic_id: &str) -> ResumeDecision {
        match self.store.get_record(topic_id).await {
            Ok(record) => ResumeDecision::evaluate(record.as_ref(), self.threshold),
            Err(e) => {
                warn!(topic_id, error = %e, "Could not read progress for resume decision");
                ResumeDecision::StartFresh
            }
        }
    }

    pub async fn should_show_resume_dialog(&self, topic_id: &str) -> bool {
        self.decide(topic_id).await.should_prompt()
    }

    /// Stored position, or 0 when there is none.
    pub async fn get_resume_position(&self, topic_id: &str) -> f64 {
        match self.store.get_progress(topic_id).await {
            Ok(position) => position,
            Err(e) => {
                warn!(topic_id, error = %e, "Could not read resume position");
                0.0
            }
        }
    }
}
