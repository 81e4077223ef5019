//! Presentation of batch results: summary counts plus text and JSON output.

pub mod format;
pub mod summary;

pub use format::{json_report, result_line, summary_line};
pub use summary::Summary;
