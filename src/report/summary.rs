//! Derived counts for a finished batch.

use std::time::Duration;

use crate::fetch::FetchResult;

/// Counts over a batch. `success_count + failure_count == total` always holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Summary {
    pub total: usize,
    pub success_count: usize,
    pub failure_count: usize,
    pub total_elapsed: Duration,
}

impl Summary {
    pub fn from_results(results: &[FetchResult], total_elapsed: Duration) -> Self {
        let success_count = results.iter().filter(|r| r.is_success()).count();
        Self {
            total: results.len(),
            success_count,
            failure_count: results.len() - success_count,
            total_elapsed,
        }
    }

    pub fn all_succeeded(&self) -> bool {
        self.failure_count == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::ErrorKind;

    #[test]
    fn test_counts() {
        let results = vec![
            FetchResult::completed("http://a", 200, 10, Duration::ZERO),
            FetchResult::completed("http://b", 404, 10, Duration::ZERO),
            FetchResult::failed("http://c", ErrorKind::Timeout, "deadline", Duration::ZERO),
            FetchResult::completed("http://d", 301, 0, Duration::ZERO),
        ];
        let summary = Summary::from_results(&results, Duration::from_secs(2));

        assert_eq!(summary.total, 4);
        assert_eq!(summary.success_count, 2);
        assert_eq!(summary.failure_count, 2);
        assert_eq!(summary.total_elapsed, Duration::from_secs(2));
        assert!(!summary.all_succeeded());
    }

    #[test]
    fn test_empty_batch() {
        let summary = Summary::from_results(&[], Duration::ZERO);
        assert_eq!(summary.total, 0);
        assert!(summary.all_succeeded());
    }
}
