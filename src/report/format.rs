//! Text and JSON renderings of batch results.

use serde::Serialize;

use crate::fetch::FetchResult;
use crate::report::Summary;

/// One human-readable line per result.
pub fn result_line(result: &FetchResult) -> String {
    let millis = result.elapsed.as_millis();
    if result.is_success() {
        format!(
            "✅ {} [{}] {} bytes in {}ms",
            result.target,
            result.status_code.unwrap_or_default(),
            result.byte_size.unwrap_or_default(),
            millis
        )
    } else {
        let reason = match (result.error_kind, &result.error, result.status_code) {
            (Some(kind), Some(message), _) => format!("{kind}: {message}"),
            (Some(kind), None, _) => kind.to_string(),
            (None, _, Some(status)) => format!("HTTP {status}"),
            (None, _, None) => "no response".to_string(),
        };
        format!(
            "❌ {} {} after {} attempt(s) in {}ms",
            result.target, reason, result.attempts, millis
        )
    }
}

pub fn summary_line(summary: &Summary) -> String {
    format!(
        "Total: {} URLs in {:.2}s ({} succeeded, {} failed)",
        summary.total,
        summary.total_elapsed.as_secs_f64(),
        summary.success_count,
        summary.failure_count
    )
}

#[derive(Serialize)]
struct JsonReport<'a> {
    total_urls: usize,
    duration_ms: u64,
    results: &'a [FetchResult],
    success_count: usize,
    failure_count: usize,
}

/// The whole batch as a pretty-printed JSON document.
pub fn json_report(results: &[FetchResult], summary: &Summary) -> serde_json::Result<String> {
    let report = JsonReport {
        total_urls: summary.total,
        duration_ms: summary.total_elapsed.as_millis() as u64,
        results,
        success_count: summary.success_count,
        failure_count: summary.failure_count,
    };
    serde_json::to_string_pretty(&report)
}
