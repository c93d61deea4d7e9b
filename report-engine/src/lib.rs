//! FILENAME: report-engine/src/lib.rs
//! PURPOSE: Main library entry point for the report engine.
//! CONTEXT: Re-exports the definition, row cache builder, linking
//! pipeline, and view types. The pipeline is: refresh_cache() builds the
//! durable seed rows for a report definition; link_report() joins in
//! formula units, computes columns, groups, filters, orders, and
//! assembles the staged Report.

pub mod cache;
pub mod definition;
pub mod engine;
pub mod error;
pub mod row;
pub mod view;

// Re-export commonly used types at the crate root. The linker lives in
// the local engine module; the crate:: prefix keeps it from clashing
// with the engine dependency.
pub use crate::cache::{cache_key, load_cache, refresh_cache};
pub use crate::definition::{
    AttributeRef, ColumnDefinition, ColumnPhase, FormulaJoin, JoinStep, ReportDefinition,
    SummaryDefinition, COLUMNS_ALIAS, FORMULA_ALIAS, UNIT_ALIAS,
};
pub use crate::engine::{link_report, ReportLinker};
pub use crate::error::ReportError;
pub use crate::row::{dedup_rows, AttributeMap, BucketRow};
pub use crate::view::{Report, ReportRow, Stage, SummaryValue};
