//! Export formats for search outcomes.

mod export;

pub use export::{ExportFormat, export_results, render};
