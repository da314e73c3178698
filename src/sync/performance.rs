use crate::api::types::Performance;
use crate::sync::record::{PerformanceSnapshot, VideoPresence};

const VIDEO_BUCKET: &str = "USER_PRODUCT";
const VIDEO_VARIABLE: &str = "UP_SHORTS";
const VIDEO_RULE: &str = "UP_HAS_SHORTS";

/// Extract the report's quality signals from a performance payload.
pub fn snapshot(perf: &Performance) -> PerformanceSnapshot {
    PerformanceSnapshot {
        score: perf.score,
        level_wording: perf.level_wording.clone(),
        pending_titles: pending_titles(perf),
        has_video: video_presence(perf),
    }
}

/// Titles of every variable still marked `PENDING`, in payload order.
pub fn pending_titles(perf: &Performance) -> Vec<String> {
    perf.buckets
        .iter()
        .flat_map(|b| b.variables.iter())
        .filter(|v| v.status.as_deref() == Some("PENDING"))
        .filter_map(|v| v.title.clone())
        .collect()
}

/// `USER_PRODUCT` bucket → `UP_SHORTS` variable → `UP_HAS_SHORTS` rule.
pub fn video_presence(perf: &Performance) -> VideoPresence {
    let rule = perf
        .buckets
        .iter()
        .filter(|b| b.kind.as_deref() == Some(VIDEO_BUCKET))
        .flat_map(|b| b.variables.iter())
        .filter(|v| v.key.as_deref() == Some(VIDEO_VARIABLE))
        .flat_map(|v| v.rules.iter())
        .find(|r| r.key.as_deref() == Some(VIDEO_RULE));

    match rule {
        Some(r) if r.status.as_deref() == Some("COMPLETED") => VideoPresence::Yes,
        _ => VideoPresence::No,
    }
}
