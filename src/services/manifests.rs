//! Manifest parsers that expand a playlist URL into named variant streams.

use async_trait::async_trait;
use m3u8_rs::Playlist;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;
use url::Url;

use super::http::{FetchError, FetchRequest, PageFetcher};
use super::url_repair::repair;
use crate::models::{StreamDescriptor, StreamKind};

/// Variant name to stream
pub type StreamMap = BTreeMap<String, StreamDescriptor>;

#[derive(Debug, Error)]
pub enum StreamParseError {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error("invalid {kind} manifest at {url}: {message}")]
    Invalid {
        kind: StreamKind,
        url: String,
        message: String,
    },
}

/// Expands manifests into their variant streams
#[async_trait]
pub trait StreamParser: Send + Sync {
    /// An empty map means a single-rendition (media) playlist
    async fn parse_hls(&self, url: &str, referer: Option<&str>)
        -> Result<StreamMap, StreamParseError>;
    async fn parse_hds(&self, url: &str, referer: Option<&str>)
        -> Result<StreamMap, StreamParseError>;
    async fn parse_dash(&self, url: &str, referer: Option<&str>)
        -> Result<StreamMap, StreamParseError>;
}

/// Default parser: fetches the manifest and reads its variants
pub struct ManifestParser {
    fetcher: Arc<dyn PageFetcher>,
}

impl ManifestParser {
    pub fn new(fetcher: Arc<dyn PageFetcher>) -> Self {
        Self { fetcher }
    }

    async fn fetch(&self, url: &str, referer: Option<&str>) -> Result<String, StreamParseError> {
        let request = FetchRequest::new(url).referer(referer.map(String::from));
        Ok(self.fetcher.fetch(&request).await?.text)
    }
}

#[async_trait]
impl StreamParser for ManifestParser {
    async fn parse_hls(
        &self,
        url: &str,
        referer: Option<&str>,
    ) -> Result<StreamMap, StreamParseError> {
        let text = self.fetch(url, referer).await?;
        hls_variants(url, &text, referer)
    }

    async fn parse_hds(
        &self,
        url: &str,
        referer: Option<&str>,
    ) -> Result<StreamMap, StreamParseError> {
        let text = self.fetch(url, referer).await?;
        hds_variants(url, &text, referer)
    }

    async fn parse_dash(
        &self,
        url: &str,
        referer: Option<&str>,
    ) -> Result<StreamMap, StreamParseError> {
        let text = self.fetch(url, referer).await?;
        dash_variants(url, &text, referer)
    }
}

/// Variants of an HLS master playlist, named `<height>p` or `<kbps>k`
pub fn hls_variants(
    url: &str,
    text: &str,
    referer: Option<&str>,
) -> Result<StreamMap, StreamParseError> {
    let playlist = m3u8_rs::parse_playlist_res(text.as_bytes()).map_err(|e| {
        StreamParseError::Invalid {
            kind: StreamKind::Hls,
            url: url.to_string(),
            message: e.to_string(),
        }
    })?;

    let mut streams = StreamMap::new();
    if let Playlist::MasterPlaylist(master) = playlist {
        let base = manifest_dir(url);
        for variant in master.variants.iter().filter(|v| !v.is_i_frame) {
            let name = match &variant.resolution {
                Some(resolution) if resolution.height > 0 => format!("{}p", resolution.height),
                _ => format!("{}k", variant.bandwidth / 1000),
            };
            let descriptor = StreamDescriptor::new(
                StreamKind::Hls,
                repair(&variant.uri, url, &base),
                referer.map(String::from),
            )
            .with_bandwidth(Some(variant.bandwidth));
            insert_unique(&mut streams, name, descriptor);
        }
    }
    Ok(streams)
}

/// Representations of a DASH manifest, named `<height>p` or `<kbps>k` for audio
pub fn dash_variants(
    url: &str,
    text: &str,
    referer: Option<&str>,
) -> Result<StreamMap, StreamParseError> {
    let mut streams = StreamMap::new();
    for attrs in xml_elements(StreamKind::Dash, url, text, b"Representation")? {
        let height = attr_u64(&attrs, "height");
        let bandwidth = attr_u64(&attrs, "bandwidth");
        let name = match (height, bandwidth) {
            (Some(h), _) => format!("{}p", h),
            (None, Some(bw)) => format!("{}k", bw / 1000),
            (None, None) => continue,
        };
        let descriptor = StreamDescriptor::new(StreamKind::Dash, url, referer.map(String::from))
            .with_bandwidth(bandwidth);
        insert_unique(&mut streams, name, descriptor);
    }
    Ok(streams)
}

/// `<media>` entries of an HDS manifest, named `<bitrate>k`
pub fn hds_variants(
    url: &str,
    text: &str,
    referer: Option<&str>,
) -> Result<StreamMap, StreamParseError> {
    let mut streams = StreamMap::new();
    for attrs in xml_elements(StreamKind::Hds, url, text, b"media")? {
        let bitrate = attr_u64(&attrs, "bitrate");
        let name = match bitrate {
            Some(kbps) => format!("{}k", kbps),
            None => "live".to_string(),
        };
        let descriptor = StreamDescriptor::new(StreamKind::Hds, url, referer.map(String::from))
            .with_bandwidth(bitrate.map(|kbps| kbps * 1000));
        insert_unique(&mut streams, name, descriptor);
    }
    Ok(streams)
}

/// Directory of a manifest URL, used to resolve its sub-resources
fn manifest_dir(url: &str) -> String {
    Url::parse(url)
        .and_then(|u| u.join("./"))
        .map(|u| u.to_string())
        .unwrap_or_default()
}

/// Insert under `name`, falling back to `name_alt`, `name_alt2`, ...
fn insert_unique(streams: &mut StreamMap, name: String, descriptor: StreamDescriptor) {
    if !streams.contains_key(&name) {
        streams.insert(name, descriptor);
        return;
    }
    let mut n = 1;
    loop {
        let candidate = if n == 1 {
            format!("{}_alt", name)
        } else {
            format!("{}_alt{}", name, n)
        };
        if !streams.contains_key(&candidate) {
            streams.insert(candidate, descriptor);
            return;
        }
        n += 1;
    }
}

fn xml_elements(
    kind: StreamKind,
    url: &str,
    text: &str,
    element: &[u8],
) -> Result<Vec<Vec<(String, String)>>, StreamParseError> {
    let invalid = |message: String| StreamParseError::Invalid {
        kind,
        url: url.to_string(),
        message,
    };

    let mut reader = Reader::from_str(text);
    reader.config_mut().trim_text(true);

    let mut found = Vec::new();
    let mut saw_root = false;
    loop {
        match reader.read_event() {
            Ok(Event::Start(ref e)) | Ok(Event::Empty(ref e)) => {
                saw_root = true;
                if e.local_name().as_ref() == element {
                    found.push(attributes(e).map_err(invalid)?);
                }
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => return Err(invalid(e.to_string())),
        }
    }

    if !saw_root {
        return Err(invalid("document has no elements".to_string()));
    }
    Ok(found)
}

fn attributes(e: &BytesStart<'_>) -> Result<Vec<(String, String)>, String> {
    let mut attrs = Vec::new();
    for attr in e.attributes() {
        let attr = attr.map_err(|e| e.to_string())?;
        let key = String::from_utf8_lossy(attr.key.local_name().as_ref()).into_owned();
        let value = attr.unescape_value().map_err(|e| e.to_string())?.into_owned();
        attrs.push((key, value));
    }
    Ok(attrs)
}

fn attr_u64(attrs: &[(String, String)], key: &str) -> Option<u64> {
    attrs
        .iter()
        .find(|(k, _)| k == key)
        .and_then(|(_, v)| v.trim().parse().ok())
}
