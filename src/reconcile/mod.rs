use std::fmt;

use serde::{Serialize, Serializer};

use crate::media::FileIndex;
use crate::sync::{FetchProgress, ProductRecord, VideoPresence};

/// Images a complete listing should carry.
pub const TARGET_IMAGES: u32 = 6;

const PROGRESS_EVERY: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Subject {
    Images,
    Video,
}

/// What the seller has to do for one kind of media.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Conclusion {
    Ok,
    /// Produce new media; nothing suitable exists locally.
    Create { count: u32, subject: Subject },
    /// Media exists locally and only needs uploading. `available` is set
    /// when the folder holds more than the listing needs.
    Upload {
        count: u32,
        subject: Subject,
        available: Option<u32>,
    },
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ConclusionCategory {
    Ok,
    Create,
    Upload,
    Error,
}

impl Conclusion {
    pub fn category(&self) -> ConclusionCategory {
        match self {
            Conclusion::Ok => ConclusionCategory::Ok,
            Conclusion::Create { .. } => ConclusionCategory::Create,
            Conclusion::Upload { .. } => ConclusionCategory::Upload,
            Conclusion::Error => ConclusionCategory::Error,
        }
    }
}

fn images_phrase(count: u32) -> String {
    if count == 1 {
        "1 imagen".to_string()
    } else {
        format!("{count} imágenes")
    }
}

impl fmt::Display for Conclusion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Conclusion::Ok => f.write_str("OK"),
            Conclusion::Error => f.write_str("ERROR"),
            Conclusion::Create {
                subject: Subject::Video,
                ..
            } => f.write_str("CREAR video"),
            Conclusion::Upload {
                subject: Subject::Video,
                ..
            } => f.write_str("SUBIR video"),
            Conclusion::Create { count, .. } => write!(f, "CREAR {}", images_phrase(*count)),
            Conclusion::Upload {
                count,
                available: None,
                ..
            } => write!(f, "SUBIR {}", images_phrase(*count)),
            Conclusion::Upload {
                count,
                available: Some(more),
                ..
            } => write!(
                f,
                "SUBIR {}  (se pueden subir hasta {more} más)",
                images_phrase(*count)
            ),
        }
    }
}

impl Serialize for Conclusion {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Image and video conclusions for one record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Verdict {
    pub images: Conclusion,
    pub video: Conclusion,
}

/// Decide what a listing needs given what it has online and on disk.
pub fn conclude(
    remote_images: u32,
    local_images: u32,
    remote_video: VideoPresence,
    local_videos: u32,
) -> Verdict {
    let images = if remote_images >= TARGET_IMAGES {
        Conclusion::Ok
    } else if local_images < TARGET_IMAGES {
        Conclusion::Create {
            count: TARGET_IMAGES - remote_images.max(local_images),
            subject: Subject::Images,
        }
    } else if local_images == TARGET_IMAGES {
        Conclusion::Upload {
            count: TARGET_IMAGES - remote_images,
            subject: Subject::Images,
            available: None,
        }
    } else {
        Conclusion::Upload {
            count: TARGET_IMAGES - remote_images,
            subject: Subject::Images,
            available: Some(local_images - remote_images),
        }
    };

    let video = match remote_video {
        VideoPresence::Yes => Conclusion::Ok,
        // A failed performance lookup is treated as "no video"
        VideoPresence::No | VideoPresence::Unknown if local_videos > 0 => Conclusion::Upload {
            count: 1,
            subject: Subject::Video,
            available: None,
        },
        VideoPresence::No | VideoPresence::Unknown => Conclusion::Create {
            count: 1,
            subject: Subject::Video,
        },
    };

    Verdict { images, video }
}

/// A record joined with its local media counts and verdict.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReportRow {
    #[serde(flatten)]
    pub record: ProductRecord,
    pub local_images: u32,
    pub local_videos: u32,
    pub verdict: Verdict,
}

/// Join every record with both indexes by SKU key, preserving order.
pub fn reconcile(
    records: &[ProductRecord],
    images: &FileIndex,
    videos: &FileIndex,
    progress: &dyn FetchProgress,
) -> Vec<ReportRow> {
    let total = records.len();
    let mut rows = Vec::with_capacity(total);
    for (i, record) in records.iter().enumerate() {
        let local_images = images.get(&record.sku);
        let local_videos = videos.get(&record.sku);
        let verdict = conclude(
            record.image_count_remote,
            local_images,
            record.has_video_remote,
            local_videos,
        );
        rows.push(ReportRow {
            record: record.clone(),
            local_images,
            local_videos,
            verdict,
        });

        let done = i + 1;
        if done % PROGRESS_EVERY == 0 || done == total {
            log::info!("Reconciled {done}/{total} rows");
            progress.on_reconcile_progress(done, total);
        }
    }
    rows
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::{ListingType, NoopProgress};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn record(sku: &str, images: u32, video: VideoPresence) -> ProductRecord {
        ProductRecord {
            status: None,
            primary_id: format!("MLA{sku}"),
            display_id: format!("MLA{sku}"),
            sku: sku.to_string(),
            permalink: None,
            listing_type: ListingType::Traditional,
            image_count_remote: images,
            has_video_remote: video,
            score: None,
            level: None,
            pending_titles: vec![],
            is_variation: false,
            performance_id: format!("MLA{sku}"),
        }
    }

    fn strings(v: Verdict) -> (String, String) {
        (v.images.to_string(), v.video.to_string())
    }

    #[test]
    fn test_nothing_anywhere() {
        assert_eq!(
            strings(conclude(0, 0, VideoPresence::No, 0)),
            ("CREAR 6 imágenes".to_string(), "CREAR video".to_string())
        );
    }

    #[test]
    fn test_complete_listing() {
        for local in [0, 3, 6, 20] {
            assert_eq!(
                strings(conclude(6, local, VideoPresence::Yes, local)),
                ("OK".to_string(), "OK".to_string())
            );
        }
        assert_eq!(conclude(9, 0, VideoPresence::Yes, 0).images, Conclusion::Ok);
    }

    #[test]
    fn test_create_uses_larger_of_remote_and_local() {
        assert_eq!(conclude(2, 4, VideoPresence::Yes, 0).images.to_string(), "CREAR 2 imágenes");
        assert_eq!(conclude(5, 1, VideoPresence::Yes, 0).images.to_string(), "CREAR 1 imagen");
        assert_eq!(conclude(3, 5, VideoPresence::Yes, 0).images.to_string(), "CREAR 1 imagen");
    }

    #[test]
    fn test_upload_when_folder_is_complete() {
        assert_eq!(conclude(4, 6, VideoPresence::Yes, 0).images.to_string(), "SUBIR 2 imágenes");
        assert_eq!(conclude(5, 6, VideoPresence::Yes, 0).images.to_string(), "SUBIR 1 imagen");
    }

    #[test]
    fn test_upload_with_spare_images() {
        let v = conclude(5, 10, VideoPresence::Yes, 0);
        assert_eq!(
            v.images,
            Conclusion::Upload {
                count: 1,
                subject: Subject::Images,
                available: Some(5)
            }
        );
        assert_eq!(v.images.to_string(), "SUBIR 1 imagen  (se pueden subir hasta 5 más)");
        assert_eq!(
            conclude(0, 8, VideoPresence::Yes, 0).images.to_string(),
            "SUBIR 6 imágenes  (se pueden subir hasta 8 más)"
        );
    }

    #[test]
    fn test_video_conclusions() {
        assert_eq!(conclude(6, 0, VideoPresence::No, 2).video.to_string(), "SUBIR video");
        assert_eq!(conclude(6, 0, VideoPresence::No, 0).video.to_string(), "CREAR video");
    }

    #[test]
    fn test_unknown_video_counts_as_missing() {
        assert_eq!(conclude(6, 0, VideoPresence::Unknown, 2).video.to_string(), "SUBIR video");
        assert_eq!(conclude(6, 0, VideoPresence::Unknown, 0).video.to_string(), "CREAR video");
        assert_eq!(
            conclude(6, 0, VideoPresence::Unknown, 0).video.category(),
            ConclusionCategory::Create
        );
    }

    #[test]
    fn test_categories() {
        let v = conclude(0, 0, VideoPresence::Unknown, 0);
        assert_eq!(v.images.category(), ConclusionCategory::Create);
        assert_eq!(v.video.category(), ConclusionCategory::Create);
        assert_eq!(Conclusion::Error.category(), ConclusionCategory::Error);
        assert_eq!(Conclusion::Error.to_string(), "ERROR");
        assert_eq!(conclude(0, 6, VideoPresence::No, 1).video.category(), ConclusionCategory::Upload);
        assert_eq!(Conclusion::Ok.category(), ConclusionCategory::Ok);
    }

    #[test]
    fn test_reconcile_joins_by_sku() {
        let dir = tempfile::tempdir().unwrap();
        let images_dir = dir.path().join("img");
        let videos_dir = dir.path().join("vid");
        for i in 0..7 {
            let p = images_dir.join(format!("1111111-{i}.jpg"));
            std::fs::create_dir_all(p.parent().unwrap()).unwrap();
            std::fs::write(p, b"x").unwrap();
        }
        std::fs::create_dir_all(videos_dir.join("2222222 demo")).unwrap();
        std::fs::write(videos_dir.join("2222222 demo/clip.mp4"), b"x").unwrap();

        let images = crate::media::index_images(&images_dir);
        let videos = crate::media::index_videos(&videos_dir);
        let records = vec![
            record("1111111", 2, VideoPresence::No),
            record("2222222", 6, VideoPresence::No),
        ];

        let rows = reconcile(&records, &images, &videos, &NoopProgress);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].local_images, 7);
        assert_eq!(
            rows[0].verdict.images.to_string(),
            "SUBIR 4 imágenes  (se pueden subir hasta 5 más)"
        );
        assert_eq!(rows[0].verdict.video.to_string(), "CREAR video");
        assert_eq!(rows[1].local_videos, 1);
        assert_eq!(rows[1].verdict.images, Conclusion::Ok);
        assert_eq!(rows[1].verdict.video.to_string(), "SUBIR video");
    }

    struct CountingProgress(AtomicUsize);

    impl FetchProgress for CountingProgress {
        fn on_reconcile_progress(&self, _current: usize, _total: usize) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_reconcile_reports_progress_every_hundred_rows() {
        let records: Vec<ProductRecord> = (0..250)
            .map(|i| record(&format!("{:07}", i), 0, VideoPresence::Yes))
            .collect();
        let progress = CountingProgress(AtomicUsize::new(0));
        let rows = reconcile(&records, &FileIndex::default(), &FileIndex::default(), &progress);
        assert_eq!(rows.len(), 250);
        // at 100, 200 and the final row
        assert_eq!(progress.0.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_row_serializes_conclusions_as_text() {
        let row = ReportRow {
            record: record("1234567", 0, VideoPresence::No),
            local_images: 0,
            local_videos: 0,
            verdict: conclude(0, 0, VideoPresence::No, 0),
        };
        let json = serde_json::to_value(&row).unwrap();
        assert_eq!(json["sku"], "1234567");
        assert_eq!(json["verdict"]["images"], "CREAR 6 imágenes");
        assert_eq!(json["verdict"]["video"], "CREAR video");
    }
}
