#![forbid(unsafe_code)]

//! Library behind the `feed_download` tool.
//!
//! Channel references are resolved to canonical IDs, each channel's upload
//! feed is narrowed to entries published since a cutoff, the survivors are
//! probed and filtered by duration, and whatever is left is downloaded in one
//! batch. [`orchestrator::run`] wires the stages together.

pub mod config;
pub mod downloader;
pub mod duration;
pub mod error;
pub mod feed;
pub mod filter;
pub mod http;
pub mod manifest;
pub mod orchestrator;
pub mod resolver;
