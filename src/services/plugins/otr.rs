use async_trait::async_trait;
use lazy_static::lazy_static;
use quick_xml::events::Event;
use quick_xml::Reader;
use regex::Regex;
use std::sync::Arc;

use super::{PluginError, SitePlugin};
use crate::models::{StreamDescriptor, StreamKind};
use crate::services::http::{useragents, FetchRequest, PageFetcher};
use crate::services::manifests::StreamParser;
use crate::services::patterns::{absolute_redirect, tag_attributes};

lazy_static! {
    static ref URL_RE: Regex = Regex::new(r"^https?://otr-online\.ru/online/?$").unwrap();
    static ref CONFIG_PREFIX_RE: Regex = Regex::new(r"^config=(.*)").unwrap();
}

/// otr-online.ru live channel, served through a webcaster player config
pub struct Otr {
    fetcher: Arc<dyn PageFetcher>,
    parser: Arc<dyn StreamParser>,
}

impl Otr {
    pub fn new(fetcher: Arc<dyn PageFetcher>, parser: Arc<dyn StreamParser>) -> Self {
        Self { fetcher, parser }
    }

    async fn get(&self, url: &str) -> Result<String, PluginError> {
        let request = FetchRequest::new(url).user_agent(useragents::FIREFOX);
        Ok(self.fetcher.fetch(&request).await?.text)
    }
}

#[async_trait]
impl SitePlugin for Otr {
    fn name(&self) -> &'static str {
        "otr"
    }

    fn can_handle_url(&self, url: &str) -> bool {
        URL_RE.is_match(url)
    }

    async fn streams(&self, url: &str) -> Result<Vec<(String, StreamDescriptor)>, PluginError> {
        let page = self.get(url).await?;

        let iframe_src = tag_attributes(&page, "iframe")
            .into_iter()
            .find(|attrs| attrs.get("id").map(String::as_str) == Some("videoFrame"))
            .and_then(|attrs| attrs.get("src").cloned());
        let Some(iframe_src) = iframe_src else {
            tracing::debug!("No iframe found.");
            return Ok(Vec::new());
        };

        let iframe_page = self.get(&absolute_redirect(url, &iframe_src)).await?;
        let xml_url = tag_attributes(&iframe_page, "span")
            .into_iter()
            .find(|attrs| attrs.get("class").map(String::as_str) == Some("webcaster-player"))
            .and_then(|attrs| attrs.get("data-config").cloned())
            .map(|config| CONFIG_PREFIX_RE.replace(&config, "$1").into_owned())
            .filter(|config| !config.is_empty());
        let Some(xml_url) = xml_url else {
            tracing::debug!("No xml_url found.");
            return Ok(Vec::new());
        };

        let config = self.get(&xml_url).await?;
        for hd_url in child_texts(&config, &["video_hd"])? {
            tracing::debug!("Found video_hd");
            let hd_config = self.get(&hd_url).await?;
            if let Some(hls_url) = child_texts(&hd_config, &["iphone", "track"])?.into_iter().next() {
                tracing::debug!("URL={}", hls_url);
                let streams = self.parser.parse_hls(&hls_url, None).await?;
                if streams.is_empty() {
                    return Ok(vec![(
                        "live".to_string(),
                        StreamDescriptor::new(StreamKind::Hls, hls_url, None),
                    )]);
                }
                return Ok(streams.into_iter().collect());
            }
        }

        Ok(Vec::new())
    }
}

/// Text of elements at `path` below the document root, namespaces ignored
fn child_texts(xml: &str, path: &[&str]) -> Result<Vec<String>, PluginError> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut stack: Vec<String> = Vec::new();
    let mut texts = Vec::new();
    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                stack.push(String::from_utf8_lossy(e.local_name().as_ref()).into_owned());
            }
            Ok(Event::End(_)) => {
                stack.pop();
            }
            Ok(Event::Text(t)) if at_path(&stack, path) => {
                let text = t.unescape().map_err(|e| PluginError::Api(e.to_string()))?;
                texts.push(text.trim().to_string());
            }
            Ok(Event::CData(c)) if at_path(&stack, path) => {
                texts.push(String::from_utf8_lossy(&c.into_inner()).trim().to_string());
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => return Err(PluginError::Api(format!("invalid player config: {}", e))),
        }
    }
    Ok(texts)
}

fn at_path(stack: &[String], path: &[&str]) -> bool {
    stack.len() == path.len() + 1 && stack[1..].iter().zip(path).all(|(a, b)| a == b)
}
