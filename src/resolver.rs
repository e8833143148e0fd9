#![forbid(unsafe_code)]

//! Turns loosely written channel references into canonical channel IDs.
//!
//! A reference can be a canonical ID, a bare handle (`SomeChannel` or
//! `@SomeChannel`), a profile URL (`https://youtube.com/@SomeChannel`) or a
//! legacy user URL (`https://www.youtube.com/user/some`). Anything that is not
//! already an ID is looked up by fetching the profile page and reading the
//! `externalId` embedded in it.

use std::collections::BTreeSet;
use std::fmt;
use std::fs;
use std::path::Path;
use std::sync::LazyLock;

use anyhow::{Context, Result};
use rayon::ThreadPoolBuilder;
use rayon::prelude::*;
use regex::Regex;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::http::HttpClient;

/// Profile lookups run on this many worker threads at most.
pub const RESOLVER_WORKERS: usize = 3;

const DOMAIN_MARKER: &str = "youtube";

static CHANNEL_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"UC[\w-]{22}").expect("channel id pattern compiles"));
static EXTERNAL_ID: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#""externalId":"([^"]+)""#).expect("externalId pattern compiles")
});

/// Canonical 24-character channel identifier (`UC` + 22 word/hyphen chars).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct ChannelId(String);

impl ChannelId {
    /// Accepts `value` only when the whole string is a canonical ID.
    pub fn parse(value: &str) -> Option<Self> {
        let found = CHANNEL_ID.find(value)?;
        (found.start() == 0 && found.end() == value.len()).then(|| Self(value.to_owned()))
    }

    /// Returns the first canonical ID embedded anywhere in `text`.
    pub fn find_in(text: &str) -> Option<Self> {
        CHANNEL_ID.find(text).map(|found| Self(found.as_str().to_owned()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A reference that no lookup could turn into an ID.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnresolvedChannel {
    pub reference: String,
    pub normalized: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Resolution {
    pub ids: BTreeSet<ChannelId>,
    /// In input order.
    pub unresolved: Vec<UnresolvedChannel>,
}

/// Reduces a reference to the part used for ID matching and profile lookups.
///
/// URLs on the platform's domain are cut down to the handle after the last
/// `@`, or to the last path segment. A leading `@` on a bare handle is
/// dropped so that the profile templates can add their own.
pub fn normalize_reference(reference: &str) -> String {
    let trimmed = reference.trim();
    if trimmed.to_ascii_lowercase().contains(DOMAIN_MARKER) {
        let without_query = trimmed.split(['?', '#']).next().unwrap_or(trimmed);
        let path = without_query.trim_end_matches('/');
        let tail = match path.rsplit_once('@') {
            Some((_, handle)) => handle,
            None => path.rsplit_once('/').map_or(path, |(_, segment)| segment),
        };
        tail.to_owned()
    } else {
        trimmed.trim_start_matches('@').to_owned()
    }
}

/// Reads channel references from CLI values.
///
/// A value naming an existing file contributes its non-blank lines (lines
/// starting with `#` are skipped); any other value is a reference itself.
pub fn load_channel_references<S: AsRef<str>>(values: &[S]) -> Result<Vec<String>> {
    let mut references = Vec::new();
    for value in values {
        let value = value.as_ref();
        let path = Path::new(value);
        if path.is_file() {
            let content = fs::read_to_string(path)
                .with_context(|| format!("reading channel list {}", path.display()))?;
            references.extend(
                content
                    .lines()
                    .map(str::trim)
                    .filter(|line| !line.is_empty() && !line.starts_with('#'))
                    .map(str::to_owned),
            );
        } else if !value.trim().is_empty() {
            references.push(value.trim().to_owned());
        }
    }
    Ok(references)
}

/// Resolves references through a small pool of blocking workers.
pub struct ChannelResolver<'a> {
    http: &'a dyn HttpClient,
    site_base_url: String,
}

impl<'a> ChannelResolver<'a> {
    pub fn new(http: &'a dyn HttpClient, site_base_url: impl Into<String>) -> Self {
        let site_base_url = site_base_url.into().trim_end_matches('/').to_owned();
        Self {
            http,
            site_base_url,
        }
    }

    /// Resolves every reference on a pool of [`RESOLVER_WORKERS`] threads.
    /// Duplicates collapse into one ID; names that cannot be resolved are
    /// reported in `unresolved` and never abort the batch. Returns only after
    /// every lookup has finished.
    pub fn resolve<S: AsRef<str> + Sync>(&self, references: &[S]) -> Result<Resolution> {
        let pool = ThreadPoolBuilder::new()
            .num_threads(RESOLVER_WORKERS)
            .thread_name(|index| format!("channel-resolver-{index}"))
            .build()
            .context("building channel resolver pool")?;

        let outcomes: Vec<_> = pool.install(|| {
            references
                .par_iter()
                .map(|reference| self.resolve_one(reference.as_ref()))
                .collect()
        });

        let mut resolution = Resolution::default();
        for outcome in outcomes {
            match outcome {
                Ok(id) => {
                    resolution.ids.insert(id);
                }
                Err(unresolved) => resolution.unresolved.push(unresolved),
            }
        }
        Ok(resolution)
    }

    /// Resolves a single reference, trying the direct ID match first and the
    /// profile templates after that.
    pub fn resolve_one(&self, reference: &str) -> Result<ChannelId, UnresolvedChannel> {
        let normalized = normalize_reference(reference);
        if let Some(id) = ChannelId::find_in(&normalized) {
            debug!(%reference, %id, "reference is already a channel ID");
            return Ok(id);
        }

        for url in self.profile_urls(&normalized) {
            match self.http.get(&url) {
                Ok(response) if response.is_success() => match extract_external_id(&response.body)
                {
                    Some(id) => {
                        info!("{normalized} -> {id}");
                        return Ok(id);
                    }
                    None => debug!(%url, "profile page has no externalId"),
                },
                Ok(response) => debug!(%url, status = response.status, "profile lookup skipped"),
                Err(err) => warn!(%url, "profile lookup failed: {err:#}"),
            }
        }

        warn!("No ID found for {normalized}");
        Err(UnresolvedChannel {
            reference: reference.to_owned(),
            normalized,
        })
    }

    /// Handle-style first, legacy user-style second.
    fn profile_urls(&self, name: &str) -> [String; 2] {
        [
            format!("{}/@{name}", self.site_base_url),
            format!("{}/user/{name}", self.site_base_url),
        ]
    }
}

fn extract_external_id(body: &str) -> Option<ChannelId> {
    let raw = EXTERNAL_ID.captures(body)?.get(1)?.as_str();
    let id = ChannelId::parse(raw);
    if id.is_none() {
        warn!("ignoring malformed externalId {raw:?}");
    }
    id
}
