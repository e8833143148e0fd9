#![forbid(unsafe_code)]

use anyhow::{Context, Result};
use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

pub const DEFAULT_CONFIG_PATH: &str = "/etc/feedgrab-env";
pub const DEFAULT_OUTPUT_DIR: &str = "videos";
pub const DEFAULT_YTDLP_PATH: &str = "yt-dlp";
pub const DEFAULT_SITE_BASE_URL: &str = "https://youtube.com";
pub const DEFAULT_FEED_BASE_URL: &str = "https://www.youtube.com/feeds/videos.xml";
pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 30;

/// Raw values found in the env file; `None` when a key is absent.
#[derive(Debug, Clone, Default)]
pub struct EnvConfig {
    pub output_dir: Option<PathBuf>,
    pub ytdlp_path: Option<PathBuf>,
    pub site_base_url: Option<String>,
    pub feed_base_url: Option<String>,
    pub http_timeout_secs: Option<u64>,
    pub ytdlp_extra_args: Option<Vec<String>>,
}

/// Effective settings after defaults are applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub output_dir: PathBuf,
    pub ytdlp_path: PathBuf,
    pub site_base_url: String,
    pub feed_base_url: String,
    pub http_timeout: Duration,
    pub ytdlp_extra_args: Vec<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self::from(EnvConfig::default())
    }
}

impl From<EnvConfig> for Settings {
    fn from(cfg: EnvConfig) -> Self {
        Self {
            output_dir: cfg
                .output_dir
                .unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT_DIR)),
            ytdlp_path: cfg
                .ytdlp_path
                .unwrap_or_else(|| PathBuf::from(DEFAULT_YTDLP_PATH)),
            site_base_url: cfg
                .site_base_url
                .unwrap_or_else(|| DEFAULT_SITE_BASE_URL.to_string()),
            feed_base_url: cfg
                .feed_base_url
                .unwrap_or_else(|| DEFAULT_FEED_BASE_URL.to_string()),
            http_timeout: Duration::from_secs(
                cfg.http_timeout_secs.unwrap_or(DEFAULT_HTTP_TIMEOUT_SECS),
            ),
            ytdlp_extra_args: cfg.ytdlp_extra_args.unwrap_or_default(),
        }
    }
}

pub fn read_env_config(path: &Path) -> Result<Option<EnvConfig>> {
    if !path.exists() {
        return Ok(None);
    }
    let content =
        fs::read_to_string(path).with_context(|| format!("Reading {}", path.display()))?;
    let mut cfg = EnvConfig::default();
    for line in content.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        if let Some((key, value_raw)) = trimmed.split_once('=') {
            let value = value_raw.trim().trim_matches('"');
            if value.is_empty() {
                continue;
            }
            match key.trim() {
                "OUTPUT_DIR" => cfg.output_dir = Some(PathBuf::from(value)),
                "YTDLP_PATH" => cfg.ytdlp_path = Some(PathBuf::from(value)),
                "SITE_BASE_URL" => {
                    cfg.site_base_url = Some(value.trim_end_matches('/').to_string())
                }
                "FEED_BASE_URL" => cfg.feed_base_url = Some(value.to_string()),
                "HTTP_TIMEOUT_SECS" => {
                    let secs: u64 = value.parse().with_context(|| {
                        format!("Parsing HTTP_TIMEOUT_SECS from {}", path.display())
                    })?;
                    cfg.http_timeout_secs = Some(secs);
                }
                "YTDLP_EXTRA_ARGS" => {
                    cfg.ytdlp_extra_args =
                        Some(value.split_whitespace().map(str::to_string).collect())
                }
                _ => {}
            }
        }
    }
    Ok(Some(cfg))
}

/// Loads settings from `path`. A missing file yields the defaults.
pub fn load_settings_from(path: impl AsRef<Path>) -> Result<Settings> {
    let cfg = read_env_config(path.as_ref())?.unwrap_or_default();
    Ok(Settings::from(cfg))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn make_config(contents: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "{}", contents).unwrap();
        file
    }

    #[test]
    fn read_env_config_extracts_values() {
        let cfg = make_config(
            "# feedgrab\nOUTPUT_DIR=\"/srv/audio\"\nHTTP_TIMEOUT_SECS=\"5\"\nSITE_BASE_URL=http://localhost:8080/\n",
        );
        let parsed = read_env_config(cfg.path()).unwrap().unwrap();
        assert_eq!(parsed.output_dir, Some(PathBuf::from("/srv/audio")));
        assert_eq!(parsed.http_timeout_secs, Some(5));
        assert_eq!(parsed.site_base_url.as_deref(), Some("http://localhost:8080"));
    }

    #[test]
    fn load_settings_defaults_missing_keys() {
        let cfg = make_config("YTDLP_PATH=\"/opt/yt-dlp\"\n");
        let settings = load_settings_from(cfg.path()).unwrap();
        assert_eq!(settings.ytdlp_path, PathBuf::from("/opt/yt-dlp"));
        assert_eq!(settings.output_dir, PathBuf::from(DEFAULT_OUTPUT_DIR));
        assert_eq!(settings.feed_base_url, DEFAULT_FEED_BASE_URL);
        assert_eq!(
            settings.http_timeout,
            Duration::from_secs(DEFAULT_HTTP_TIMEOUT_SECS)
        );
        assert!(settings.ytdlp_extra_args.is_empty());
    }

    #[test]
    fn load_settings_without_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let settings = load_settings_from(dir.path().join("absent")).unwrap();
        assert_eq!(settings, Settings::default());
    }

    #[test]
    fn extra_args_split_on_whitespace() {
        let cfg = make_config("YTDLP_EXTRA_ARGS=\"--cookies /etc/cookies.txt  --limit-rate 2M\"\n");
        let settings = load_settings_from(cfg.path()).unwrap();
        assert_eq!(
            settings.ytdlp_extra_args,
            vec!["--cookies", "/etc/cookies.txt", "--limit-rate", "2M"]
        );
    }

    #[test]
    fn malformed_timeout_is_an_error() {
        let cfg = make_config("HTTP_TIMEOUT_SECS=soon\n");
        assert!(load_settings_from(cfg.path()).is_err());
    }
}
