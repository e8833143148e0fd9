#![forbid(unsafe_code)]

//! Per-channel upload feeds and the publish-time window.
//!
//! Every channel exposes an Atom document listing its latest uploads. Each
//! `<entry>` carries the fields we keep:
//!
//! ```xml
//! <entry>
//!   <yt:videoId>dQw4w9WgXcQ</yt:videoId>
//!   <title>Some upload</title>
//!   <link rel="alternate" href="https://www.youtube.com/watch?v=dQw4w9WgXcQ"/>
//!   <published>2024-10-11T11:00:00+00:00</published>
//! </entry>
//! ```

use std::collections::BTreeMap;

use anyhow::{Context, Result, bail};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, warn};

use crate::duration::TimeCutoff;
use crate::http::HttpClient;
use crate::resolver::ChannelId;

/// One upload listed in a channel feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FeedEntry {
    /// Already the key of every map an entry lives in.
    #[serde(skip_serializing)]
    pub video_id: String,
    pub title: String,
    pub url: String,
    pub publish_time: DateTime<Utc>,
}

/// Entries of one channel keyed by video ID.
pub type ChannelVideos = BTreeMap<String, FeedEntry>;

/// Only channels with at least one qualifying entry appear.
pub type VideosByChannel = BTreeMap<ChannelId, ChannelVideos>;

/// Parses a channel feed. Entries missing a field or carrying an unreadable
/// timestamp are skipped with a warning; an unparsable document is an error.
pub fn parse_feed(xml: &str) -> Result<Vec<FeedEntry>> {
    let document = roxmltree::Document::parse(xml).context("parsing feed XML")?;
    let entries = document
        .descendants()
        .filter(|node| node.has_tag_name("entry"))
        .filter_map(|entry| match parse_entry(entry) {
            Ok(parsed) => Some(parsed),
            Err(err) => {
                warn!("skipping feed entry: {err:#}");
                None
            }
        })
        .collect();
    Ok(entries)
}

fn parse_entry(entry: roxmltree::Node<'_, '_>) -> Result<FeedEntry> {
    let video_id = child_text(entry, "videoId").context("entry has no videoId")?;
    let published = child_text(entry, "published")
        .with_context(|| format!("entry {video_id} has no published time"))?;
    let publish_time = DateTime::parse_from_rfc3339(published.trim())
        .with_context(|| format!("entry {video_id} has malformed published time {published:?}"))?
        .with_timezone(&Utc);
    let title = child_text(entry, "title").unwrap_or_default();

    let links: Vec<_> = entry
        .children()
        .filter(|node| node.has_tag_name("link"))
        .collect();
    let url = links
        .iter()
        .find(|link| link.attribute("rel") == Some("alternate"))
        .or_else(|| links.first())
        .and_then(|link| link.attribute("href"))
        .with_context(|| format!("entry {video_id} has no link"))?;

    Ok(FeedEntry {
        video_id: video_id.trim().to_owned(),
        title: title.to_owned(),
        url: url.to_owned(),
        publish_time,
    })
}

fn child_text<'a>(node: roxmltree::Node<'a, '_>, name: &str) -> Option<&'a str> {
    node.children()
        .find(|child| child.has_tag_name(name))
        .and_then(|child| child.text())
}

/// Keeps entries published at or after the cutoff, keyed by video ID.
pub fn filter_recent(entries: Vec<FeedEntry>, cutoff: TimeCutoff) -> ChannelVideos {
    entries
        .into_iter()
        .filter(|entry| cutoff.admits(entry.publish_time))
        .map(|entry| (entry.video_id.clone(), entry))
        .collect()
}

/// Downloads channel feeds one after another.
pub struct FeedFetcher<'a> {
    http: &'a dyn HttpClient,
    feed_base_url: String,
}

impl<'a> FeedFetcher<'a> {
    pub fn new(http: &'a dyn HttpClient, feed_base_url: impl Into<String>) -> Self {
        Self {
            http,
            feed_base_url: feed_base_url.into(),
        }
    }

    pub fn feed_url(&self, channel_id: &ChannelId) -> String {
        format!("{}?channel_id={channel_id}", self.feed_base_url)
    }

    /// Collects every channel's uploads at or after `cutoff`. A channel whose
    /// feed cannot be fetched or parsed contributes nothing; the rest still
    /// run.
    pub fn fetch_recent<'i, I>(&self, channel_ids: I, cutoff: TimeCutoff) -> VideosByChannel
    where
        I: IntoIterator<Item = &'i ChannelId>,
    {
        let mut videos_by_channel = VideosByChannel::new();
        for channel_id in channel_ids {
            match self.fetch_channel(channel_id) {
                Ok(entries) => {
                    let total = entries.len();
                    let recent = filter_recent(entries, cutoff);
                    debug!(%channel_id, total, recent = recent.len(), "feed filtered");
                    if !recent.is_empty() {
                        videos_by_channel.insert(channel_id.clone(), recent);
                    }
                }
                Err(err) => warn!(%channel_id, "feed unavailable: {err:#}"),
            }
        }
        videos_by_channel
    }

    fn fetch_channel(&self, channel_id: &ChannelId) -> Result<Vec<FeedEntry>> {
        let url = self.feed_url(channel_id);
        let response = self.http.get(&url)?;
        if !response.is_success() {
            bail!("{url} returned status {}", response.status);
        }
        parse_feed(&response.body).with_context(|| format!("reading feed {url}"))
    }
}
