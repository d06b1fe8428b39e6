use async_stream::stream;
use futures::stream::BoxStream;
use std::collections::HashMap;
use std::sync::Arc;

use super::manifests::{StreamMap, StreamParseError, StreamParser};
use super::metrics;
use super::patterns::progressive_name;
use crate::models::{StreamDescriptor, StreamKind};

/// Lazily produced `(name, stream)` pairs
pub type StreamSequence = BoxStream<'static, (String, StreamDescriptor)>;

/// Routes accepted playlist URLs to the parser for their stream type
pub struct PlaylistDispatcher {
    parser: Arc<dyn StreamParser>,
    playlist_max: usize,
    referer: Option<String>,
}

impl PlaylistDispatcher {
    pub fn new(parser: Arc<dyn StreamParser>, playlist_max: usize, referer: Option<String>) -> Self {
        Self {
            parser,
            playlist_max,
            referer,
        }
    }

    /// Parse each URL in order, at most `playlist_max` successes per stream type.
    ///
    /// A URL that fails to parse is logged and skipped and does not count
    /// against its type's limit.
    pub fn dispatch(self, urls: Vec<String>) -> StreamSequence {
        Box::pin(stream! {
            let mut parsed: HashMap<StreamKind, usize> = HashMap::new();

            for url in urls {
                let Some(kind) = StreamKind::classify(&url) else {
                    tracing::error!("parsed URL - {}", url);
                    continue;
                };

                if parsed.get(&kind).copied().unwrap_or(0) >= self.playlist_max {
                    tracing::debug!("Skip - {}", url);
                    continue;
                }

                match self.open(kind, &url).await {
                    Ok(streams) => {
                        tracing::debug!("{} URL - {}", kind, url);
                        *parsed.entry(kind).or_default() += 1;
                        metrics::record_dispatch(kind, "ok");
                        for entry in streams {
                            yield entry;
                        }
                    }
                    Err(e) => {
                        tracing::error!("Skip {} with error {}", kind, e);
                        metrics::record_dispatch(kind, "error");
                    }
                }
            }
        })
    }

    async fn open(
        &self,
        kind: StreamKind,
        url: &str,
    ) -> Result<Vec<(String, StreamDescriptor)>, StreamParseError> {
        let referer = self.referer.as_deref();
        let streams: StreamMap = match kind {
            StreamKind::Hls => {
                let streams = self.parser.parse_hls(url, referer).await?;
                if streams.is_empty() {
                    return Ok(vec![(
                        "live".to_string(),
                        StreamDescriptor::new(StreamKind::Hls, url, self.referer.clone()),
                    )]);
                }
                streams
            }
            StreamKind::Hds => self.parser.parse_hds(url, referer).await?,
            StreamKind::Dash => self.parser.parse_dash(url, referer).await?,
            StreamKind::Progressive => {
                return Ok(vec![(
                    progressive_name(url),
                    StreamDescriptor::new(StreamKind::Progressive, url, self.referer.clone()),
                )]);
            }
        };
        Ok(streams.into_iter().collect())
    }
}
