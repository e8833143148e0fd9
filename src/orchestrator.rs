#![forbid(unsafe_code)]

//! Glue between the stages: resolve, fetch feeds, probe and filter, then
//! hand the survivors to the downloader in a single batch.

use anyhow::Result;
use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::downloader::Downloader;
use crate::duration::{StartTime, TimeCutoff};
use crate::feed::{FeedFetcher, VideosByChannel};
use crate::filter::{DurationFilter, FilterDecision};
use crate::http::HttpClient;
use crate::manifest::DownloadManifest;
use crate::resolver::{ChannelResolver, Resolution};

#[derive(Debug, Clone, PartialEq)]
pub struct DownloadOutcome {
    pub manifest: DownloadManifest,
    /// `None` when nothing survived and the downloader was not invoked.
    pub exit_code: Option<i32>,
}

/// Probes every entry, keeps the ones the filter accepts and downloads them
/// with one batched call. The manifest is not trimmed when individual
/// downloads fail.
pub fn download_videos(
    downloader: &dyn Downloader,
    videos_by_channel: VideosByChannel,
    filter: &DurationFilter,
) -> Result<DownloadOutcome> {
    let mut selected = Vec::new();
    for (channel_id, videos) in videos_by_channel {
        for entry in videos.into_values() {
            let metadata = match downloader.probe(&entry.url) {
                Ok(metadata) => metadata,
                Err(err) => {
                    warn!(%channel_id, "Skipping {}: probe failed: {err:#}", entry.url);
                    continue;
                }
            };
            match filter.evaluate(&metadata) {
                FilterDecision::Accepted => selected.push(entry),
                FilterDecision::OutOfBounds => {
                    info!(duration = ?metadata.duration, "Skipping {}", entry.url);
                }
                FilterDecision::MissingDuration => {
                    warn!("Skipping {}: no duration in metadata", entry.url);
                }
            }
        }
    }

    let manifest: DownloadManifest = selected.into_iter().collect();
    if manifest.is_empty() {
        info!("No videos left to download");
        return Ok(DownloadOutcome {
            manifest,
            exit_code: None,
        });
    }

    let exit_code = downloader.fetch(&manifest.urls())?;
    if exit_code != 0 {
        warn!(exit_code, "downloader reported failures, see its output");
    }
    Ok(DownloadOutcome {
        manifest,
        exit_code: Some(exit_code),
    })
}

/// Everything one run needs apart from its collaborators.
#[derive(Debug, Clone)]
pub struct RunRequest {
    pub channels: Vec<String>,
    pub start: StartTime,
    pub filter: DurationFilter,
    pub site_base_url: String,
    pub feed_base_url: String,
}

#[derive(Debug, Clone)]
pub struct RunReport {
    pub cutoff: TimeCutoff,
    pub resolution: Resolution,
    pub manifest: DownloadManifest,
    pub exit_code: Option<i32>,
}

/// Runs the whole pipeline. The cutoff is computed from `now` once, before
/// any channel is looked at.
pub fn run(
    request: RunRequest,
    http: &dyn HttpClient,
    downloader: &dyn Downloader,
    now: DateTime<Utc>,
) -> Result<RunReport> {
    let cutoff = TimeCutoff::compute(request.start, now);
    debug!(cutoff = %cutoff.instant(), channels = ?request.channels, "starting run");

    let resolution =
        ChannelResolver::new(http, request.site_base_url).resolve(&request.channels)?;
    debug!(ids = ?resolution.ids, "channels resolved");
    for unresolved in &resolution.unresolved {
        debug!(reference = %unresolved.reference, "channel dropped");
    }

    let videos_by_channel =
        FeedFetcher::new(http, request.feed_base_url).fetch_recent(&resolution.ids, cutoff);
    match serde_json::to_string_pretty(&videos_by_channel) {
        Ok(dump) => debug!("recent uploads:\n{dump}"),
        Err(err) => debug!("could not render recent uploads: {err}"),
    }

    let outcome = download_videos(downloader, videos_by_channel, &request.filter)?;
    Ok(RunReport {
        cutoff,
        resolution,
        manifest: outcome.manifest,
        exit_code: outcome.exit_code,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::downloader::VideoMetadata;
    use crate::feed::tests::{FEED_BASE, entry_xml, feed_xml};
    use crate::filter::build_filter;
    use crate::resolver::tests::{FakeHttp, ID_A, ID_B};
    use anyhow::bail;
    use chrono::TimeZone;
    use std::cell::RefCell;
    use std::collections::HashMap;

    const SITE: &str = "https://youtube.com";

    /// Probe answers keyed by URL; unknown URLs fail to probe.
    #[derive(Default)]
    struct FakeDownloader {
        durations: HashMap<String, Option<f64>>,
        fetched: RefCell<Vec<Vec<String>>>,
        exit_code: i32,
    }

    impl FakeDownloader {
        fn with(mut self, video_id: &str, duration: Option<f64>) -> Self {
            self.durations.insert(watch_url(video_id), duration);
            self
        }
    }

    impl Downloader for FakeDownloader {
        fn probe(&self, url: &str) -> Result<VideoMetadata> {
            match self.durations.get(url) {
                Some(duration) => Ok(VideoMetadata {
                    id: None,
                    title: None,
                    duration: *duration,
                }),
                None => bail!("unavailable"),
            }
        }

        fn fetch(&self, urls: &[String]) -> Result<i32> {
            self.fetched.borrow_mut().push(urls.to_vec());
            Ok(self.exit_code)
        }
    }

    fn watch_url(video_id: &str) -> String {
        format!("https://www.youtube.com/watch?v={video_id}")
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 10, 11, 12, 0, 0).unwrap()
    }

    fn profile_body(id: &str) -> String {
        format!(r#"{{"externalId":"{id}"}}"#)
    }

    fn request(channels: &[&str], filter: DurationFilter) -> RunRequest {
        RunRequest {
            channels: channels.iter().map(|c| c.to_string()).collect(),
            start: StartTime::Since(3600.0),
            filter,
            site_base_url: SITE.into(),
            feed_base_url: FEED_BASE.into(),
        }
    }

    #[test]
    fn run_filters_by_time_and_duration() -> Result<()> {
        let http = FakeHttp::default()
            .with(&format!("{SITE}/@SomeChannel"), 200, &profile_body(ID_B))
            .with(&format!("{SITE}/@ghost"), 404, "")
            .with(&format!("{SITE}/user/ghost"), 404, "")
            .with(
                &format!("{FEED_BASE}?channel_id={ID_A}"),
                200,
                &feed_xml(&[
                    entry_xml("short", "Short", "2024-10-11T11:30:00+00:00"),
                    entry_xml("right", "Right", "2024-10-11T11:00:00+00:00"),
                    entry_xml("old", "Old", "2024-10-11T10:00:00+00:00"),
                ]),
            )
            .with(
                &format!("{FEED_BASE}?channel_id={ID_B}"),
                200,
                &feed_xml(&[
                    entry_xml("nolength", "Live", "2024-10-11T11:45:00+00:00"),
                    entry_xml("gone", "Gone", "2024-10-11T11:50:00+00:00"),
                ]),
            );
        let downloader = FakeDownloader::default()
            .with("short", Some(30.0))
            .with("right", Some(600.0))
            .with("old", Some(600.0))
            .with("nolength", None);

        let report = run(
            request(
                &[ID_A, "https://youtube.com/@SomeChannel", "ghost"],
                build_filter(Some(60.0), Some(3600.0)),
            ),
            &http,
            &downloader,
            now(),
        )?;

        assert_eq!(
            report.cutoff.instant(),
            Utc.with_ymd_and_hms(2024, 10, 11, 11, 0, 0).unwrap()
        );
        assert_eq!(report.resolution.ids.len(), 2);
        assert_eq!(report.resolution.unresolved.len(), 1);
        assert_eq!(report.manifest.len(), 1);
        assert!(report.manifest.contains("right"));
        assert_eq!(report.exit_code, Some(0));
        assert_eq!(*downloader.fetched.borrow(), vec![vec![watch_url("right")]]);
        Ok(())
    }

    #[test]
    fn nothing_selected_skips_the_downloader() -> Result<()> {
        let http = FakeHttp::default().with(
            &format!("{FEED_BASE}?channel_id={ID_A}"),
            200,
            &feed_xml(&[entry_xml("old", "Old", "2020-01-01T00:00:00+00:00")]),
        );
        let downloader = FakeDownloader::default().with("old", Some(10.0));
        let report = run(request(&[ID_A], DurationFilter::default()), &http, &downloader, now())?;
        assert!(report.manifest.is_empty());
        assert_eq!(report.exit_code, None);
        assert!(downloader.fetched.borrow().is_empty());
        Ok(())
    }

    #[test]
    fn manifest_keeps_entries_when_batch_reports_failure() -> Result<()> {
        let http = FakeHttp::default().with(
            &format!("{FEED_BASE}?channel_id={ID_A}"),
            200,
            &feed_xml(&[
                entry_xml("one", "One", "2024-10-11T11:10:00+00:00"),
                entry_xml("two", "Two", "2024-10-11T11:20:00+00:00"),
            ]),
        );
        let downloader = FakeDownloader {
            exit_code: 1,
            ..FakeDownloader::default()
        }
        .with("one", Some(0.0))
        .with("two", Some(5.0));

        let report = run(request(&[ID_A], build_filter(None, None)), &http, &downloader, now())?;
        assert_eq!(report.manifest.len(), 2);
        assert_eq!(report.exit_code, Some(1));
        Ok(())
    }

    #[test]
    fn manifest_entries_passed_every_filter() -> Result<()> {
        let http = FakeHttp::default().with(
            &format!("{FEED_BASE}?channel_id={ID_A}"),
            200,
            &feed_xml(&[
                entry_xml("a", "A", "2024-10-11T11:10:00+00:00"),
                entry_xml("b", "B", "2024-10-11T11:20:00+00:00"),
                entry_xml("c", "C", "2024-10-11T11:30:00+00:00"),
                entry_xml("d", "D", "2024-10-11T09:30:00+00:00"),
            ]),
        );
        let downloader = FakeDownloader::default()
            .with("a", Some(100.0))
            .with("b", Some(250.0))
            .with("c", Some(400.0))
            .with("d", Some(200.0));
        let filter = build_filter(Some(200.0), Some(300.0));
        let report = run(request(&[ID_A], filter.clone()), &http, &downloader, now())?;

        let cutoff = report.cutoff;
        for entry in report.manifest.entries() {
            assert!(cutoff.admits(entry.publish_time));
            let metadata = downloader.probe(&entry.url)?;
            assert_eq!(filter.evaluate(&metadata), FilterDecision::Accepted);
        }
        assert_eq!(report.manifest.len(), 1);
        assert!(report.manifest.contains("b"));
        Ok(())
    }
}
