#![forbid(unsafe_code)]

//! The record of videos handed to the downloader and its JSON receipt.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;

use crate::feed::FeedEntry;

/// Appended when the receipt path given by the user is a directory.
pub const RECEIPT_FILE_NAME: &str = "youtube_feed_download_receipt.json";

/// Video ID -> feed entry for every video that passed all filters.
///
/// Reflects the filtering decision only: an entry may still have failed
/// inside the batched download.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct DownloadManifest(BTreeMap<String, FeedEntry>);

impl DownloadManifest {
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn contains(&self, video_id: &str) -> bool {
        self.0.contains_key(video_id)
    }

    pub fn entries(&self) -> impl Iterator<Item = &FeedEntry> {
        self.0.values()
    }

    pub fn urls(&self) -> Vec<String> {
        self.0.values().map(|entry| entry.url.clone()).collect()
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        serde_json::to_string_pretty(self).context("serializing download manifest")
    }
}

impl FromIterator<FeedEntry> for DownloadManifest {
    fn from_iter<I: IntoIterator<Item = FeedEntry>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|entry| (entry.video_id.clone(), entry))
                .collect(),
        )
    }
}

/// Where a receipt ends up: directories get [`RECEIPT_FILE_NAME`] appended.
pub fn receipt_path(target: &Path) -> PathBuf {
    if target.is_dir() {
        target.join(RECEIPT_FILE_NAME)
    } else {
        target.to_path_buf()
    }
}

/// Writes the manifest as pretty JSON and returns the file written.
pub fn write_receipt(manifest: &DownloadManifest, target: &Path) -> Result<PathBuf> {
    let path = receipt_path(target);
    let body = manifest.to_json_pretty()?;
    fs::write(&path, body).with_context(|| format!("writing receipt {}", path.display()))?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use serde_json::{Value, json};
    use tempfile::tempdir;

    fn entry(video_id: &str) -> FeedEntry {
        FeedEntry {
            video_id: video_id.into(),
            title: format!("Title {video_id}"),
            url: format!("https://www.youtube.com/watch?v={video_id}"),
            publish_time: Utc.with_ymd_and_hms(2024, 10, 11, 11, 0, 0).unwrap(),
        }
    }

    #[test]
    fn manifest_serializes_as_id_keyed_object() -> Result<()> {
        let manifest: DownloadManifest = [entry("b"), entry("a")].into_iter().collect();
        let value: Value = serde_json::from_str(&manifest.to_json_pretty()?)?;
        assert_eq!(
            value,
            json!({
                "a": {
                    "title": "Title a",
                    "url": "https://www.youtube.com/watch?v=a",
                    "publish_time": "2024-10-11T11:00:00Z"
                },
                "b": {
                    "title": "Title b",
                    "url": "https://www.youtube.com/watch?v=b",
                    "publish_time": "2024-10-11T11:00:00Z"
                }
            })
        );
        assert_eq!(
            manifest.urls(),
            vec![
                "https://www.youtube.com/watch?v=a".to_owned(),
                "https://www.youtube.com/watch?v=b".to_owned()
            ]
        );
        Ok(())
    }

    #[test]
    fn receipt_into_directory_uses_fixed_name() -> Result<()> {
        let temp = tempdir()?;
        let manifest: DownloadManifest = [entry("a")].into_iter().collect();

        let written = write_receipt(&manifest, temp.path())?;
        assert_eq!(written, temp.path().join(RECEIPT_FILE_NAME));
        assert!(fs::read_to_string(&written)?.contains("Title a"));

        let explicit = temp.path().join("custom.json");
        assert_eq!(write_receipt(&manifest, &explicit)?, explicit);
        assert!(explicit.is_file());
        Ok(())
    }
}
