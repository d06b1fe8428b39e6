use std::env;
use thiserror::Error;
use url::Url;

/// Per-type cap used when `playlist_max` is unset or zero
pub const PLAYLIST_MAX_DEFAULT: usize = 5;
/// Largest accepted `playlist_max`
pub const PLAYLIST_MAX_LIMIT: usize = 25;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum OptionsError {
    #[error("playlist-max must be a number between 0 and 25, got `{0}`")]
    PlaylistMax(String),
    #[error("playlist-referer must be an absolute http(s) URL, got `{0}`")]
    PlaylistReferer(String),
}

/// User-tunable knobs for one resolution
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PluginOptions {
    pub playlist_max: usize,
    pub playlist_referer: Option<String>,
    pub blacklist_netloc: Vec<String>,
    pub blacklist_path: Vec<String>,
    pub blacklist_filepath: Vec<String>,
    pub whitelist_netloc: Vec<String>,
    pub whitelist_path: Vec<String>,
}

impl PluginOptions {
    /// Defaults from RESOLVE_* environment variables; invalid values are ignored
    pub fn from_env() -> Self {
        let mut options = Self {
            blacklist_netloc: env_list("RESOLVE_BLACKLIST_NETLOC"),
            blacklist_path: env_list("RESOLVE_BLACKLIST_PATH"),
            blacklist_filepath: env_list("RESOLVE_BLACKLIST_FILEPATH"),
            whitelist_netloc: env_list("RESOLVE_WHITELIST_NETLOC"),
            whitelist_path: env_list("RESOLVE_WHITELIST_PATH"),
            ..Self::default()
        };

        if let Ok(raw) = env::var("RESOLVE_PLAYLIST_MAX") {
            if let Err(e) = options.set_playlist_max(&raw) {
                tracing::warn!("Ignoring RESOLVE_PLAYLIST_MAX: {}", e);
            }
        }
        if let Ok(raw) = env::var("RESOLVE_PLAYLIST_REFERER") {
            if let Err(e) = options.set_playlist_referer(&raw) {
                tracing::warn!("Ignoring RESOLVE_PLAYLIST_REFERER: {}", e);
            }
        }

        options
    }

    pub fn set_playlist_max(&mut self, raw: &str) -> Result<(), OptionsError> {
        self.playlist_max = parse_playlist_max(raw)?;
        Ok(())
    }

    pub fn set_playlist_referer(&mut self, raw: &str) -> Result<(), OptionsError> {
        let raw = raw.trim();
        if raw.is_empty() {
            self.playlist_referer = None;
            return Ok(());
        }
        match Url::parse(raw) {
            Ok(url) if matches!(url.scheme(), "http" | "https") => {
                self.playlist_referer = Some(raw.to_string());
                Ok(())
            }
            _ => Err(OptionsError::PlaylistReferer(raw.to_string())),
        }
    }

    /// Effective per-type dispatch cap
    pub fn playlist_cap(&self) -> usize {
        if self.playlist_max == 0 {
            PLAYLIST_MAX_DEFAULT
        } else {
            self.playlist_max
        }
    }
}

/// Split a comma separated option into trimmed, non-empty entries
pub fn comma_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

pub fn parse_playlist_max(raw: &str) -> Result<usize, OptionsError> {
    match raw.trim().parse::<usize>() {
        Ok(value) if value <= PLAYLIST_MAX_LIMIT => Ok(value),
        _ => Err(OptionsError::PlaylistMax(raw.to_string())),
    }
}

fn env_list(key: &str) -> Vec<String> {
    env::var(key).map(|v| comma_list(&v)).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_comma_list() {
        assert_eq!(
            comma_list("example.com, ads.example.net,,"),
            vec!["example.com", "ads.example.net"]
        );
        assert!(comma_list("").is_empty());
    }

    #[test]
    fn test_playlist_max_bounds() {
        assert_eq!(parse_playlist_max("0"), Ok(0));
        assert_eq!(parse_playlist_max("25"), Ok(25));
        assert!(parse_playlist_max("26").is_err());
        assert!(parse_playlist_max("-1").is_err());
        assert!(parse_playlist_max("many").is_err());
    }

    #[test]
    fn test_playlist_cap_defaults_when_zero() {
        let mut options = PluginOptions::default();
        assert_eq!(options.playlist_cap(), PLAYLIST_MAX_DEFAULT);
        options.set_playlist_max("2").unwrap();
        assert_eq!(options.playlist_cap(), 2);
    }

    #[test]
    fn test_playlist_referer_validation() {
        let mut options = PluginOptions::default();
        assert!(options.set_playlist_referer("ftp://example.com").is_err());
        assert!(options.set_playlist_referer("not a url").is_err());
        options
            .set_playlist_referer("https://example.com/player")
            .unwrap();
        assert_eq!(
            options.playlist_referer.as_deref(),
            Some("https://example.com/player")
        );
        options.set_playlist_referer("").unwrap();
        assert_eq!(options.playlist_referer, None);
    }
}
