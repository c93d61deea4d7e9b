//! FILENAME: report-engine/src/view.rs
//! Report View - The rendered, cacheable artifact.
//!
//! A Report is what the linking pipeline produces and the surrounding
//! application serves: ordered stages of finished rows plus summaries.
//! It is serializable and persisted to the object store keyed by
//! (project, report definition).

use engine::Value;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// One finished report row: its 1-based position within the stage and the
/// visible column values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportRow {
    pub position: u32,
    pub columns: BTreeMap<String, Value>,
}

/// A labeled, evaluated summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryValue {
    pub label: String,
    pub value: Value,
}

/// A labeled group of finished rows sharing the stage attribute, with its
/// own summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stage {
    pub label: String,
    pub rows: Vec<ReportRow>,
    pub summary: Option<SummaryValue>,
}

/// The assembled report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub report_definition_id: Uuid,
    pub project_id: Uuid,
    pub stages: Vec<Stage>,
    pub summaries: Vec<SummaryValue>,
}

impl Report {
    /// The object-store key for one (project, report definition) pair.
    pub fn storage_key(project_id: Uuid, report_definition_id: Uuid) -> String {
        format!("report/{}/{}", project_id, report_definition_id)
    }

    /// Total row count across all stages.
    pub fn row_count(&self) -> usize {
        self.stages.iter().map(|s| s.rows.len()).sum()
    }
}
