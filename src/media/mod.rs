use std::collections::HashMap;
use std::path::Path;

use serde::Serialize;
use walkdir::WalkDir;

use crate::error::{Error, Result};
use crate::sync::sku::SKU_KEY_LEN;

pub const IMAGE_EXTENSIONS: [&str; 6] = ["JPG", "JPEG", "PNG", "GIF", "BMP", "WEBP"];
pub const VIDEO_EXTENSIONS: [&str; 8] = ["MP4", "AVI", "MOV", "MKV", "WMV", "FLV", "WEBM", "M4V"];

/// Count of media files per seven-character key.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FileIndex {
    entries: HashMap<String, u32>,
    warning: Option<String>,
}

impl FileIndex {
    fn unreadable(warning: String) -> Self {
        log::warn!("{warning}");
        Self {
            entries: HashMap::new(),
            warning: Some(warning),
        }
    }

    fn add(&mut self, key: String, count: u32) {
        *self.entries.entry(key).or_insert(0) += count;
    }

    /// Files indexed under `key`; 0 when none.
    pub fn get(&self, key: &str) -> u32 {
        self.entries.get(key).copied().unwrap_or(0)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn total_files(&self) -> u64 {
        self.entries.values().map(|&c| c as u64).sum()
    }

    /// Set when the folder itself could not be read.
    pub fn warning(&self) -> Option<&str> {
        self.warning.as_deref()
    }
}

/// First `SKU_KEY_LEN` characters of an upper-cased name, when it has that many.
fn key_of(upper: &str) -> Option<String> {
    let key: String = upper.chars().take(SKU_KEY_LEN).collect();
    (key.chars().count() == SKU_KEY_LEN).then_some(key)
}

/// Upper-cased stem and extension, split at the last dot.
fn split_name(file_name: &str) -> Option<(String, String)> {
    let upper = file_name.to_uppercase();
    let dot = upper.rfind('.')?;
    let (stem, ext) = (&upper[..dot], &upper[dot + 1..]);
    Some((stem.to_string(), ext.to_string()))
}

fn image_key(file_name: &str) -> Option<String> {
    let (stem, ext) = split_name(file_name)?;
    if !IMAGE_EXTENSIONS.contains(&ext.as_str()) {
        return None;
    }
    key_of(&stem)
}

fn is_video(file_name: &str) -> bool {
    split_name(file_name).is_some_and(|(_, ext)| VIDEO_EXTENSIONS.contains(&ext.as_str()))
}

fn check_folder(folder: &Path) -> std::result::Result<(), String> {
    match std::fs::metadata(folder) {
        Ok(m) if m.is_dir() => Ok(()),
        Ok(_) => Err(format!("{} is not a directory", folder.display())),
        Err(e) => Err(format!("cannot read {}: {e}", folder.display())),
    }
}

/// Walk `folder` recursively and count image files by the first seven
/// characters of their name.
pub fn index_images(folder: &Path) -> FileIndex {
    if let Err(warning) = check_folder(folder) {
        return FileIndex::unreadable(warning);
    }

    let mut index = FileIndex::default();
    for entry in WalkDir::new(folder).into_iter() {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                log::debug!("Skipping unreadable entry under {}: {e}", folder.display());
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        if let Some(key) = image_key(&entry.file_name().to_string_lossy()) {
            index.add(key, 1);
        }
    }
    log::info!(
        "Indexed {} images under {} keys in {}",
        index.total_files(),
        index.len(),
        folder.display()
    );
    index
}

/// Count video files in each immediate subfolder of `folder`, keyed by the
/// first seven characters of the subfolder name. Files at the top level and
/// deeper nesting are ignored.
pub fn index_videos(folder: &Path) -> FileIndex {
    if let Err(warning) = check_folder(folder) {
        return FileIndex::unreadable(warning);
    }

    let mut index = FileIndex::default();
    let subfolders = WalkDir::new(folder)
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_dir());

    for dir in subfolders {
        let Some(key) = key_of(&dir.file_name().to_string_lossy().to_uppercase()) else {
            continue;
        };
        let count = WalkDir::new(dir.path())
            .min_depth(1)
            .max_depth(1)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file() && is_video(&e.file_name().to_string_lossy()))
            .count() as u32;
        if count > 0 {
            index.add(key, count);
        }
    }
    log::info!(
        "Indexed {} videos under {} keys in {}",
        index.total_files(),
        index.len(),
        folder.display()
    );
    index
}

/// Fail unless `folder` exists, is a directory and can be listed.
pub fn validate_folder(folder: &Path, label: &str) -> Result<()> {
    check_folder(folder).map_err(|reason| Error::Config(format!("{label} folder: {reason}")))?;
    std::fs::read_dir(folder).map_err(|e| {
        Error::Config(format!("{label} folder {} is not readable: {e}", folder.display()))
    })?;
    Ok(())
}
