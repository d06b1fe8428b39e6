use async_trait::async_trait;
use lazy_static::lazy_static;
use regex::Regex;
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

use super::{PluginError, SitePlugin};
use crate::models::StreamDescriptor;
use crate::services::http::{useragents, FetchRequest, PageFetcher};
use crate::services::manifests::StreamParser;

lazy_static! {
    static ref URL_RE: Regex = Regex::new(
        r"^https?://(\w+\.)?rutube\.ru/(?:play|video)/(?:embed/)?(?P<id>[a-z0-9]+)"
    ).unwrap();
}

/// Play options returned by the RuTube API
#[derive(Debug, Default, Deserialize)]
struct PlayOptions {
    #[serde(default)]
    live_streams: Option<HashMap<String, Vec<LiveStream>>>,
    #[serde(default)]
    video_balancer: Option<HashMap<String, Value>>,
}

#[derive(Debug, Deserialize)]
struct LiveStream {
    url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Named {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct VideoMetadata {
    pub title: String,
    pub author: Named,
    pub category: Named,
}

/// rutube.ru live channels and videos
pub struct RuTube {
    fetcher: Arc<dyn PageFetcher>,
    parser: Arc<dyn StreamParser>,
}

impl RuTube {
    pub fn new(fetcher: Arc<dyn PageFetcher>, parser: Arc<dyn StreamParser>) -> Self {
        Self { fetcher, parser }
    }

    fn video_id(url: &str) -> Option<String> {
        URL_RE
            .captures(url)
            .and_then(|caps| caps.name("id"))
            .map(|m| m.as_str().to_string())
    }

    fn api_play_url(video_id: &str, page_url: &str) -> String {
        format!(
            "https://rutube.ru/api/play/options/{}/?format=json&no_404=true&referer={}",
            video_id,
            urlencoding::encode(page_url)
        )
    }

    fn api_video_url(video_id: &str) -> String {
        format!("https://rutube.ru/api/video/{}/", video_id)
    }

    async fn get_json<T: for<'de> Deserialize<'de>>(&self, url: &str) -> Result<T, PluginError> {
        let request = FetchRequest::new(url).user_agent(useragents::FIREFOX);
        let page = self.fetcher.fetch(&request).await?;
        serde_json::from_str(&page.text).map_err(|e| {
            tracing::error!("Failed to parse RuTube response from {}: {}", url, e);
            PluginError::Api(e.to_string())
        })
    }

    /// Title, author and category of a video
    pub async fn metadata(&self, url: &str) -> Result<VideoMetadata, PluginError> {
        let video_id = Self::video_id(url)
            .ok_or_else(|| PluginError::Api(format!("not a RuTube URL: {}", url)))?;
        self.get_json(&Self::api_video_url(&video_id)).await
    }
}

#[async_trait]
impl SitePlugin for RuTube {
    fn name(&self) -> &'static str {
        "rutube"
    }

    fn can_handle_url(&self, url: &str) -> bool {
        URL_RE.is_match(url)
    }

    async fn title(&self, url: &str) -> Option<String> {
        match self.metadata(url).await {
            Ok(metadata) => Some(metadata.title),
            Err(e) => {
                tracing::debug!("No RuTube metadata for {}: {}", url, e);
                None
            }
        }
    }

    async fn streams(&self, url: &str) -> Result<Vec<(String, StreamDescriptor)>, PluginError> {
        let Some(video_id) = Self::video_id(url) else {
            return Ok(Vec::new());
        };
        tracing::debug!("video_id: {}", video_id);

        let options: PlayOptions = self.get_json(&Self::api_play_url(&video_id, url)).await?;

        let mut hls_urls = Vec::new();
        let mut hds_urls = Vec::new();
        match (options.live_streams, options.video_balancer) {
            (Some(live), _) if !live.is_empty() => {
                tracing::debug!("Found live_data");
                hls_urls.extend(live.get("hls").into_iter().flatten().map(|s| s.url.clone()));
                hds_urls.extend(live.get("hds").into_iter().flatten().map(|s| s.url.clone()));
            }
            (_, Some(vod)) if !vod.is_empty() => {
                tracing::debug!("Found vod_data");
                hls_urls.extend(vod.get("m3u8").and_then(Value::as_str).map(String::from));
                hds_urls.extend(vod.get("default").and_then(Value::as_str).map(String::from));
            }
            _ => {
                tracing::error!("This video is not available in your region.");
                return Err(PluginError::Unavailable(
                    "This video is not available in your region.".to_string(),
                ));
            }
        }

        let mut streams = Vec::new();
        for hls_url in hls_urls {
            tracing::debug!("HLS URL: {}", hls_url);
            streams.extend(self.parser.parse_hls(&hls_url, None).await?);
        }
        for hds_url in hds_urls {
            tracing::debug!("HDS URL: {}", hds_url);
            streams.extend(self.parser.parse_hds(&hds_url, None).await?);
        }
        Ok(streams)
    }
}
