pub mod fetcher;
pub mod performance;
pub mod pool;
pub mod record;
pub mod sku;

use std::fmt;

use serde::Serialize;

pub use record::{
    ListingStatus, ListingType, PerformanceSnapshot, ProductRecord, VideoPresence,
};

/// Options controlling a catalog fetch.
#[derive(Debug, Clone)]
pub struct FetchOptions {
    /// Ceiling on outbound requests per second, retries included.
    pub permits_per_second: f64,
    /// Maximum concurrent fetch tasks.
    pub pool_size: usize,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            permits_per_second: 5.0,
            pool_size: 10,
        }
    }
}

/// Stages of a fetch, as reported to [`FetchProgress`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchPhase {
    Items,
    Variations,
    Performance,
}

impl fmt::Display for FetchPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            FetchPhase::Items => "items",
            FetchPhase::Variations => "variations",
            FetchPhase::Performance => "performance",
        })
    }
}

/// Callbacks for long-running fetches. Every method has a no-op default.
pub trait FetchProgress: Send + Sync {
    fn on_ids_listed(&self, _count: usize) {}
    fn on_phase_progress(&self, _phase: FetchPhase, _current: usize, _total: usize) {}
    fn on_fetch_complete(&self, _report: &FetchReport) {}
    fn on_reconcile_progress(&self, _current: usize, _total: usize) {}
}

/// Progress sink that ignores everything.
pub struct NoopProgress;

impl FetchProgress for NoopProgress {}

/// Report returned after a catalog fetch completes.
#[derive(Debug, Clone, Serialize)]
pub struct FetchReport {
    pub user_id: String,
    pub status: FetchStatus,
    pub items_listed: u64,
    pub records: u64,
    pub items_failed: u64,
    pub variations_failed: u64,
    pub skipped_without_sku: u64,
    pub performance_failed: u64,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct FetchCounts {
    pub items_listed: u64,
    pub records: u64,
    pub items_failed: u64,
    pub variations_failed: u64,
    pub skipped_without_sku: u64,
    pub performance_failed: u64,
}

impl FetchReport {
    /// Create a FetchReport with the appropriate status derived from counts.
    pub fn from_counts(user_id: String, counts: FetchCounts) -> Self {
        let failed = counts.items_failed + counts.variations_failed + counts.performance_failed;
        let status = if failed == 0 {
            FetchStatus::Success
        } else if counts.records > 0 {
            FetchStatus::PartialFailure
        } else {
            FetchStatus::Failed
        };
        let error = if failed > 0 {
            Some(format!(
                "{} items, {} variations and {} performance lookups failed",
                counts.items_failed, counts.variations_failed, counts.performance_failed
            ))
        } else {
            None
        };
        Self {
            user_id,
            status,
            items_listed: counts.items_listed,
            records: counts.records,
            items_failed: counts.items_failed,
            variations_failed: counts.variations_failed,
            skipped_without_sku: counts.skipped_without_sku,
            performance_failed: counts.performance_failed,
            error,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum FetchStatus {
    Success,
    PartialFailure,
    Failed,
}
