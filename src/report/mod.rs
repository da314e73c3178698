use serde::Serialize;

use crate::error::Result;
use crate::reconcile::{ConclusionCategory, ReportRow};

/// Colour hint for a report cell. Rendering is left to whoever consumes
/// the report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StyleToken {
    Default,
    Green,
    Yellow,
    Red,
}

impl StyleToken {
    pub fn as_str(&self) -> &'static str {
        match self {
            StyleToken::Default => "default",
            StyleToken::Green => "green",
            StyleToken::Yellow => "yellow",
            StyleToken::Red => "red",
        }
    }
}

pub fn style_for(category: ConclusionCategory) -> StyleToken {
    match category {
        ConclusionCategory::Ok => StyleToken::Green,
        ConclusionCategory::Create => StyleToken::Red,
        ConclusionCategory::Upload => StyleToken::Yellow,
        ConclusionCategory::Error => StyleToken::Default,
    }
}

/// Style for MercadoLibre's quality level wording.
pub fn level_style(level: Option<&str>) -> StyleToken {
    match level.map(|l| l.trim().to_lowercase()).as_deref() {
        Some("profesional") => StyleToken::Green,
        Some("estándar") | Some("estandar") => StyleToken::Yellow,
        Some("básica") | Some("basica") => StyleToken::Red,
        _ => StyleToken::Default,
    }
}

const CSV_HEADER: &str = "status,item_id,listing_id,sku,listing_type,permalink,images_remote,images_local,images_conclusion,video_remote,videos_local,video_conclusion,score,level,pending,images_style,video_style,level_style\n";

/// Render rows as CSV, one line per row in the given order.
pub fn to_csv(rows: &[ReportRow]) -> String {
    let mut out = String::new();
    out.push_str(CSV_HEADER);
    for row in rows {
        let r = &row.record;
        out.push_str(&format!(
            "{},{},{},{},{},{},{},{},{},{},{},{},{},{},{},{},{},{}\n",
            csv_escape(r.status.as_ref().map(|s| s.as_str()).unwrap_or("")),
            csv_escape(&r.primary_id),
            csv_escape(&r.display_id),
            csv_escape(&r.sku),
            r.listing_type.label(),
            csv_escape(r.permalink.as_deref().unwrap_or("")),
            r.image_count_remote,
            row.local_images,
            csv_escape(&row.verdict.images.to_string()),
            r.has_video_remote.label(),
            row.local_videos,
            csv_escape(&row.verdict.video.to_string()),
            r.score.map_or(String::new(), |s| s.to_string()),
            csv_escape(r.level.as_deref().unwrap_or("")),
            csv_escape(&r.pending_titles.join(" | ")),
            style_for(row.verdict.images.category()).as_str(),
            style_for(row.verdict.video.category()).as_str(),
            level_style(r.level.as_deref()).as_str(),
        ));
    }
    out
}

/// Render rows as a pretty-printed JSON array.
pub fn to_json(rows: &[ReportRow]) -> Result<String> {
    Ok(serde_json::to_string_pretty(rows)?)
}

fn csv_escape(s: &str) -> String {
    if s.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", s.replace('"', "\"\""))
    } else {
        s.to_string()
    }
}
