use std::cmp::Ordering;
use std::fmt;

use serde::{Serialize, Serializer};

use crate::api::types::{CatalogItem, VariationRef};

/// Publication status of a listing.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ListingStatus {
    Active,
    Paused,
    Other(String),
}

impl ListingStatus {
    pub fn parse(s: &str) -> Self {
        match s {
            "active" => ListingStatus::Active,
            "paused" => ListingStatus::Paused,
            other => ListingStatus::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            ListingStatus::Active => "active",
            ListingStatus::Paused => "paused",
            ListingStatus::Other(s) => s,
        }
    }
}

impl fmt::Display for ListingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// Ordered by wire value so reports sort the same way the API spells them.
impl Ord for ListingStatus {
    fn cmp(&self, other: &Self) -> Ordering {
        self.as_str().cmp(other.as_str())
    }
}

impl PartialOrd for ListingStatus {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Serialize for ListingStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum ListingType {
    Catalog,
    Traditional,
}

impl ListingType {
    pub fn label(&self) -> &'static str {
        match self {
            ListingType::Catalog => "Catálogo",
            ListingType::Traditional => "Tradicional",
        }
    }
}

/// Whether the listing has a short video, as reported by the performance
/// endpoint. `Unknown` sorts first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize)]
pub enum VideoPresence {
    #[default]
    Unknown,
    No,
    Yes,
}

impl VideoPresence {
    pub fn label(&self) -> &'static str {
        match self {
            VideoPresence::Unknown => "",
            VideoPresence::No => "No",
            VideoPresence::Yes => "Sí",
        }
    }
}

/// Quality signals extracted from `/item/{id}/performance`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PerformanceSnapshot {
    pub score: Option<i64>,
    pub level_wording: Option<String>,
    pub pending_titles: Vec<String>,
    pub has_video: VideoPresence,
}

/// One report line: an item without variations, or one variation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProductRecord {
    pub status: Option<ListingStatus>,
    /// Parent item id (`MLA...`).
    pub primary_id: String,
    /// Item id, or the user-product id for variations.
    pub display_id: String,
    /// Seven-digit SKU key.
    pub sku: String,
    pub permalink: Option<String>,
    pub listing_type: ListingType,
    pub image_count_remote: u32,
    pub has_video_remote: VideoPresence,
    pub score: Option<i64>,
    pub level: Option<String>,
    pub pending_titles: Vec<String>,
    pub is_variation: bool,
    /// Item id to query for performance data.
    pub performance_id: String,
}

impl ProductRecord {
    pub fn from_item(item: &CatalogItem, sku: String) -> Self {
        let performance_id = if item.catalog_listing {
            item.item_relations
                .first()
                .map(|r| r.id.clone())
                .unwrap_or_else(|| item.id.clone())
        } else {
            item.id.clone()
        };
        Self {
            status: item.status.as_deref().map(ListingStatus::parse),
            primary_id: item.id.clone(),
            display_id: item.id.clone(),
            sku,
            permalink: item.permalink.clone(),
            listing_type: listing_type(item),
            image_count_remote: item.pictures.len() as u32,
            has_video_remote: VideoPresence::Unknown,
            score: None,
            level: None,
            pending_titles: Vec::new(),
            is_variation: false,
            performance_id,
        }
    }

    pub fn from_variation(item: &CatalogItem, variation: &VariationRef, sku: String) -> Self {
        let display_id = variation
            .user_product_id
            .clone()
            .unwrap_or_else(|| item.id.clone());
        Self {
            status: item.status.as_deref().map(ListingStatus::parse),
            primary_id: item.id.clone(),
            display_id,
            sku,
            permalink: item.permalink.clone(),
            listing_type: listing_type(item),
            image_count_remote: variation.picture_ids.len() as u32,
            has_video_remote: VideoPresence::Unknown,
            score: None,
            level: None,
            pending_titles: Vec::new(),
            is_variation: true,
            performance_id: item.id.clone(),
        }
    }

    /// A copy of this record carrying `snapshot`'s quality signals.
    pub fn with_performance(&self, snapshot: PerformanceSnapshot) -> Self {
        Self {
            has_video_remote: snapshot.has_video,
            score: snapshot.score,
            level: snapshot.level_wording,
            pending_titles: snapshot.pending_titles,
            ..self.clone()
        }
    }

    /// Report order: status, item, image count, video, SKU.
    pub fn sort_key(&self) -> (Option<&ListingStatus>, &str, u32, VideoPresence, &str) {
        (
            self.status.as_ref(),
            self.primary_id.as_str(),
            self.image_count_remote,
            self.has_video_remote,
            self.sku.as_str(),
        )
    }
}

fn listing_type(item: &CatalogItem) -> ListingType {
    if item.catalog_listing {
        ListingType::Catalog
    } else {
        ListingType::Traditional
    }
}

pub fn sort_records(records: &mut [ProductRecord]) {
    records.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));
}
