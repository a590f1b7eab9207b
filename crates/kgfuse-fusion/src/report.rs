//! Per-pass reports. Recovered failures land here instead of aborting a pass.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// One entity (term, node, relation, candidate) that a pass had to skip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureRecord {
    pub entity: String,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FusionReport {
    pub run_id: Uuid,
    pub pass: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub nodes_created: usize,
    pub nodes_updated: usize,
    pub nodes_removed: usize,
    pub relations_added: usize,
    pub failures: Vec<FailureRecord>,
}

impl FusionReport {
    pub fn new(pass: &str) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            pass: pass.to_string(),
            started_at: Utc::now(),
            finished_at: None,
            nodes_created: 0,
            nodes_updated: 0,
            nodes_removed: 0,
            relations_added: 0,
            failures: Vec::new(),
        }
    }

    pub fn fail(&mut self, entity: impl Into<String>, reason: impl fmt::Display) {
        let entity = entity.into();
        let reason = reason.to_string();
        tracing::warn!(pass = %self.pass, %entity, %reason, "skipped");
        self.failures.push(FailureRecord { entity, reason });
    }

    pub fn relation_added(&mut self, added: bool) {
        if added {
            self.relations_added += 1;
        }
    }

    pub fn finish(&mut self) {
        self.finished_at = Some(Utc::now());
        tracing::info!(
            pass = %self.pass,
            created = self.nodes_created,
            updated = self.nodes_updated,
            removed = self.nodes_removed,
            relations = self.relations_added,
            failures = self.failures.len(),
            "pass finished"
        );
    }
}

impl fmt::Display for FusionReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {} created, {} updated, {} removed, {} relations added, {} failures",
            self.pass,
            self.nodes_created,
            self.nodes_updated,
            self.nodes_removed,
            self.relations_added,
            self.failures.len()
        )
    }
}
