use serde::{Deserialize, Serialize};
use std::fmt;
use url::Url;

/// Which extractor produced a raw candidate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OriginKind {
    Iframe,
    Playlist,
    UnescapedIframe,
    UnescapedPlaylist,
    JsRedirect,
}

/// Raw string lifted from page text, before repair
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub raw: String,
    pub origin: OriginKind,
}

impl Candidate {
    pub fn new(raw: impl Into<String>, origin: OriginKind) -> Self {
        Self {
            raw: raw.into(),
            origin,
        }
    }
}

/// Selects which rules of the filter chain apply
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterKind {
    Iframe,
    Playlist,
}

/// Reason a candidate URL was dropped by the filter chain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RejectReason {
    SameUrl,
    Scheme,
    WhitelistNetloc,
    WhitelistPath,
    BlacklistStatic,
    BlacklistNetloc,
    BlacklistPath,
    BlacklistEndsWith,
    BlacklistFilepath,
    Ads,
}

impl RejectReason {
    /// Short code used in log lines and metric labels
    pub fn code(self) -> &'static str {
        match self {
            RejectReason::SameUrl => "SAME-URL",
            RejectReason::Scheme => "SCHEME",
            RejectReason::WhitelistNetloc => "WL-netloc",
            RejectReason::WhitelistPath => "WL-path",
            RejectReason::BlacklistStatic => "BL-static",
            RejectReason::BlacklistNetloc => "BL-netloc",
            RejectReason::BlacklistPath => "BL-path",
            RejectReason::BlacklistEndsWith => "BL-ew",
            RejectReason::BlacklistFilepath => "BL-filepath",
            RejectReason::Ads => "ADS",
        }
    }
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Outcome of running one URL through the filter chain
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterVerdict {
    Accepted(String),
    Rejected(String, RejectReason),
}

impl FilterVerdict {
    pub fn reason(&self) -> Option<RejectReason> {
        match self {
            FilterVerdict::Accepted(_) => None,
            FilterVerdict::Rejected(_, reason) => Some(*reason),
        }
    }
}

/// Streaming protocol, derived from the playlist URL suffix
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamKind {
    Hls,
    Hds,
    Dash,
    Progressive,
}

impl StreamKind {
    /// Classify by the suffix of the URL path, falling back to the query string
    pub fn classify(url: &str) -> Option<Self> {
        match Url::parse(url) {
            Ok(parsed) => Self::from_suffix(parsed.path())
                .or_else(|| parsed.query().and_then(Self::from_suffix)),
            Err(_) => {
                let (path, query) = url.split_once('?').unwrap_or((url, ""));
                Self::from_suffix(path).or_else(|| Self::from_suffix(query))
            }
        }
    }

    fn from_suffix(value: &str) -> Option<Self> {
        if value.ends_with(".m3u8") {
            Some(StreamKind::Hls)
        } else if value.ends_with(".f4m") {
            Some(StreamKind::Hds)
        } else if value.ends_with(".mp3") || value.ends_with(".mp4") {
            Some(StreamKind::Progressive)
        } else if value.ends_with(".mpd") {
            Some(StreamKind::Dash)
        } else {
            None
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            StreamKind::Hls => "HLS",
            StreamKind::Hds => "HDS",
            StreamKind::Dash => "DASH",
            StreamKind::Progressive => "HTTP",
        }
    }
}

impl fmt::Display for StreamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Playable stream handed back to the caller
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamDescriptor {
    pub kind: StreamKind,
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub referer: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bandwidth: Option<u64>,
}

impl StreamDescriptor {
    pub fn new(kind: StreamKind, url: impl Into<String>, referer: Option<String>) -> Self {
        Self {
            kind,
            url: url.into(),
            referer,
            bandwidth: None,
        }
    }

    pub fn with_bandwidth(mut self, bandwidth: Option<u64>) -> Self {
        self.bandwidth = bandwidth;
        self
    }
}

/// Stream entry as returned by the HTTP API
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NamedStream {
    pub name: String,
    #[serde(flatten)]
    pub stream: StreamDescriptor,
}

/// Response for GET /api/resolve
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolveResponse {
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub visited: Vec<String>,
    pub streams: Vec<NamedStream>,
}
