//! Site plugins: dedicated extractors for sites the generic page walk cannot handle.

mod otr;
mod rutube;

pub use otr::Otr;
pub use rutube::{RuTube, VideoMetadata};

use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

use super::http::{FetchError, PageFetcher};
use super::manifests::{StreamParseError, StreamParser};
use crate::models::StreamDescriptor;

#[derive(Debug, Error)]
pub enum PluginError {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error(transparent)]
    Parse(#[from] StreamParseError),
    #[error("unexpected API response: {0}")]
    Api(String),
    #[error("{0}")]
    Unavailable(String),
}

#[async_trait]
pub trait SitePlugin: Send + Sync {
    fn name(&self) -> &'static str;

    fn can_handle_url(&self, url: &str) -> bool;

    /// Title of the video or channel, when the site exposes one
    async fn title(&self, _url: &str) -> Option<String> {
        None
    }

    async fn streams(&self, url: &str) -> Result<Vec<(String, StreamDescriptor)>, PluginError>;
}

/// Every built-in site plugin
pub fn default_plugins(
    fetcher: Arc<dyn PageFetcher>,
    parser: Arc<dyn StreamParser>,
) -> Vec<Arc<dyn SitePlugin>> {
    vec![
        Arc::new(RuTube::new(fetcher.clone(), parser.clone())),
        Arc::new(Otr::new(fetcher, parser)),
    ]
}
