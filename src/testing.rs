//! In-memory fakes shared by the unit tests.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use crate::models::{StreamDescriptor, StreamKind};
use crate::services::http::{FetchError, FetchRequest, FetchedPage, PageFetcher};
use crate::services::manifests::{StreamMap, StreamParseError, StreamParser};
use crate::services::plugins::{PluginError, SitePlugin};
use crate::services::selector::{IframeSelector, SelectError};

enum FakePage {
    Html(String),
    Forbidden,
    /// Fails until the request asks for an explicit Accept-Encoding
    BadEncoding(String),
    /// Fails whatever encoding is asked for
    BrokenEncoding,
}

/// Serves canned pages by URL; anything unknown is a 404
#[derive(Default)]
pub struct FakeFetcher {
    pages: HashMap<String, FakePage>,
    requests: Mutex<Vec<FetchRequest>>,
}

impl FakeFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn page(mut self, url: &str, body: &str) -> Self {
        self.pages
            .insert(url.to_string(), FakePage::Html(body.to_string()));
        self
    }

    pub fn forbidden(mut self, url: &str) -> Self {
        self.pages.insert(url.to_string(), FakePage::Forbidden);
        self
    }

    pub fn bad_encoding(mut self, url: &str, body: &str) -> Self {
        self.pages
            .insert(url.to_string(), FakePage::BadEncoding(body.to_string()));
        self
    }

    pub fn broken_encoding(mut self, url: &str) -> Self {
        self.pages.insert(url.to_string(), FakePage::BrokenEncoding);
        self
    }

    pub fn requests(&self) -> Vec<FetchRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl PageFetcher for FakeFetcher {
    async fn fetch(&self, request: &FetchRequest) -> Result<FetchedPage, FetchError> {
        self.requests.lock().unwrap().push(request.clone());
        let text = match self.pages.get(&request.url) {
            Some(FakePage::Html(body)) => body.clone(),
            Some(FakePage::Forbidden) => return Err(FetchError::Forbidden(request.url.clone())),
            Some(FakePage::BadEncoding(body)) => match request.accept_encoding {
                Some(_) => body.clone(),
                None => {
                    return Err(FetchError::TransferEncodingUnsupported(
                        "invalid gzip header".to_string(),
                    ))
                }
            },
            Some(FakePage::BrokenEncoding) => {
                return Err(FetchError::TransferEncodingUnsupported(
                    "corrupt deflate stream".to_string(),
                ))
            }
            None => return Err(FetchError::NotFound(request.url.clone())),
        };
        Ok(FetchedPage {
            url: request.url.clone(),
            text,
        })
    }
}

/// Stream parser that records every call.
///
/// HLS yields nothing unless variants were registered, DASH yields `1080p`
/// and HDS yields `1200k`.
#[derive(Default)]
pub struct RecordingParser {
    attempts: Mutex<Vec<(StreamKind, String)>>,
    failing: HashSet<String>,
    variants: HashMap<String, Vec<String>>,
}

impl RecordingParser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing(mut self, url: &str) -> Self {
        self.failing.insert(url.to_string());
        self
    }

    pub fn with_variants(mut self, url: &str, names: &[&str]) -> Self {
        self.variants.insert(
            url.to_string(),
            names.iter().map(|n| n.to_string()).collect(),
        );
        self
    }

    pub fn attempts(&self) -> Vec<(StreamKind, String)> {
        self.attempts.lock().unwrap().clone()
    }

    fn answer(
        &self,
        kind: StreamKind,
        url: &str,
        referer: Option<&str>,
        defaults: &[&str],
    ) -> Result<StreamMap, StreamParseError> {
        self.attempts.lock().unwrap().push((kind, url.to_string()));
        if self.failing.contains(url) {
            return Err(StreamParseError::Invalid {
                kind,
                url: url.to_string(),
                message: "broken manifest".to_string(),
            });
        }

        let names: Vec<String> = match self.variants.get(url) {
            Some(names) => names.clone(),
            None => defaults.iter().map(|n| n.to_string()).collect(),
        };
        Ok(names
            .into_iter()
            .map(|name| {
                let descriptor = StreamDescriptor::new(
                    kind,
                    format!("{}#{}", url, name),
                    referer.map(String::from),
                );
                (name, descriptor)
            })
            .collect())
    }
}

#[async_trait]
impl StreamParser for RecordingParser {
    async fn parse_hls(
        &self,
        url: &str,
        referer: Option<&str>,
    ) -> Result<StreamMap, StreamParseError> {
        self.answer(StreamKind::Hls, url, referer, &[])
    }

    async fn parse_hds(
        &self,
        url: &str,
        referer: Option<&str>,
    ) -> Result<StreamMap, StreamParseError> {
        self.answer(StreamKind::Hds, url, referer, &["1200k"])
    }

    async fn parse_dash(
        &self,
        url: &str,
        referer: Option<&str>,
    ) -> Result<StreamMap, StreamParseError> {
        self.answer(StreamKind::Dash, url, referer, &["1080p"])
    }
}

/// Claims URLs under one host and returns a fixed stream
pub struct StaticPlugin {
    pub host: &'static str,
}

#[async_trait]
impl SitePlugin for StaticPlugin {
    fn name(&self) -> &'static str {
        "static"
    }

    fn can_handle_url(&self, url: &str) -> bool {
        url.contains(self.host)
    }

    async fn title(&self, _url: &str) -> Option<String> {
        Some("Static channel".to_string())
    }

    async fn streams(&self, url: &str) -> Result<Vec<(String, StreamDescriptor)>, PluginError> {
        Ok(vec![(
            "best".to_string(),
            StreamDescriptor::new(StreamKind::Hls, format!("{}/index.m3u8", url), None),
        )])
    }
}

/// Selector that never answers in time
pub struct SlowSelector;

#[async_trait]
impl IframeSelector for SlowSelector {
    async fn ask(&self, _prompt: &str) -> Result<String, SelectError> {
        tokio::time::sleep(std::time::Duration::from_secs(3600)).await;
        Ok("2".to_string())
    }
}
