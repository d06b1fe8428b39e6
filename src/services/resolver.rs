//! Walks from a web page through nested player iframes until it reaches
//! playlist URLs, then hands those to the dispatcher.
//!
//! Each page goes through a small state machine:
//! fetch, look for playlists, look for iframes, pick one iframe, follow a
//! script redirect, or give up. Following an iframe or redirect queues the
//! next page; reaching playlists ends the walk.

use futures::stream;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use url::Url;

use super::context::ResolutionContext;
use super::dispatcher::{PlaylistDispatcher, StreamSequence};
use super::filter::filter_candidates;
use super::http::{useragents, FetchError, FetchRequest, PageFetcher};
use super::manifests::StreamParser;
use super::metrics;
use super::patterns;
use super::plugins::{PluginError, SitePlugin};
use super::selector::{parse_selection, IframeSelector, SelectError};
use super::url_repair::{netloc, update_scheme};
use crate::models::{Candidate, FilterKind, PluginOptions};

/// Prefix that forces the generic walk even when a site plugin would match
pub const RESOLVE_PREFIX: &str = "resolve://";

/// Hosts that reject requests carrying a foreign Referer
const REFERER_SENSITIVE_HOSTS: &[&str] = &["dailymotion.com"];
/// Hosts that only serve their player to mobile browsers
const MOBILE_HOSTS: &[&str] = &["bigo.tv"];
/// Hosts with broken certificate chains
const INSECURE_TLS_HOSTS: &[&str] = &[".cdn.bg", "sportal.bg"];

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("website access denied: {url}")]
    Forbidden { url: String },
    #[error("website not found: {url}")]
    NotFound { url: String },
    #[error("failed to fetch {url}: {source}")]
    Fetch {
        url: String,
        #[source]
        source: FetchError,
    },
    #[error("no iframes or playlists found on {url}")]
    NoCandidatesFound { url: String },
    #[error("no resolvable player found on {url}")]
    NoPlayerResolved { url: String },
    #[error("gave up after following {limit} pages")]
    DepthExceeded { limit: usize },
    #[error("{plugin} plugin failed: {source}")]
    Plugin {
        plugin: &'static str,
        #[source]
        source: PluginError,
    },
}

impl ResolveError {
    /// Message shown to API callers
    pub fn user_message(&self) -> String {
        match self {
            ResolveError::Forbidden { .. } => {
                "Website Access Denied/Forbidden, you might be geo-blocked or other params are missing.".to_string()
            }
            ResolveError::NotFound { .. } => {
                "Website was not found, the link is broken or dead.".to_string()
            }
            ResolveError::NoCandidatesFound { .. } | ResolveError::NoPlayerResolved { .. } => {
                "No playable stream found on this website.".to_string()
            }
            ResolveError::Fetch { .. } => "Website could not be loaded.".to_string(),
            ResolveError::DepthExceeded { limit } => {
                format!("Gave up after following {} nested pages.", limit)
            }
            ResolveError::Plugin { source, .. } => source.to_string(),
        }
    }

    fn from_fetch(url: &str, error: FetchError) -> Self {
        match error {
            FetchError::Forbidden(_) => {
                tracing::error!("Website Access Denied/Forbidden, you might be geo-blocked or other params are missing.");
                ResolveError::Forbidden { url: url.to_string() }
            }
            FetchError::NotFound(_) => {
                tracing::error!("Website was not found, the link is broken or dead.");
                ResolveError::NotFound { url: url.to_string() }
            }
            other => ResolveError::Fetch {
                url: url.to_string(),
                source: other,
            },
        }
    }
}

#[derive(Debug, Clone)]
pub struct ResolverSettings {
    pub user_agent: String,
    pub selection_timeout: Duration,
    pub max_depth: usize,
}

impl Default for ResolverSettings {
    fn default() -> Self {
        Self {
            user_agent: useragents::FIREFOX.to_string(),
            selection_timeout: Duration::from_secs(30),
            max_depth: 16,
        }
    }
}

/// Result of a successful resolution; streams are produced lazily
pub struct Resolution {
    pub title: Option<String>,
    pub visited: Vec<String>,
    pub streams: StreamSequence,
}

enum State {
    Fetch,
    ExtractPlaylists,
    ExtractIframes,
    Select(Vec<String>),
    JsRedirect,
    Dispatch(Vec<String>),
    Fail,
}

pub struct Resolver {
    fetcher: Arc<dyn PageFetcher>,
    parser: Arc<dyn StreamParser>,
    plugins: Vec<Arc<dyn SitePlugin>>,
    settings: ResolverSettings,
}

impl Resolver {
    pub fn new(
        fetcher: Arc<dyn PageFetcher>,
        parser: Arc<dyn StreamParser>,
        settings: ResolverSettings,
    ) -> Self {
        Self {
            fetcher,
            parser,
            plugins: Vec::new(),
            settings,
        }
    }

    pub fn with_plugins(mut self, plugins: Vec<Arc<dyn SitePlugin>>) -> Self {
        self.plugins = plugins;
        self
    }

    /// Resolve `target` into a lazy sequence of named streams.
    ///
    /// `selector` is consulted only when a page offers more than one player.
    pub async fn resolve(
        &self,
        target: &str,
        options: &PluginOptions,
        selector: &dyn IframeSelector,
    ) -> Result<Resolution, ResolveError> {
        let result = self.walk(target, options, selector).await;
        metrics::record_resolution(match &result {
            Ok(_) => "resolved",
            Err(ResolveError::NoCandidatesFound { .. } | ResolveError::NoPlayerResolved { .. }) => {
                "no_player"
            }
            Err(_) => "error",
        });
        result
    }

    async fn walk(
        &self,
        target: &str,
        options: &PluginOptions,
        selector: &dyn IframeSelector,
    ) -> Result<Resolution, ResolveError> {
        let (first_url, generic_only) = normalize_target(target);
        let mut ctx = ResolutionContext::new();
        let mut pending = VecDeque::from([first_url]);
        let mut consult_plugins = !generic_only;
        let mut title: Option<String> = None;

        while let Some(url) = pending.pop_front() {
            if ctx.visited_urls().len() >= self.settings.max_depth {
                tracing::error!("Resolve depth limit reached at {}", url);
                return Err(ResolveError::DepthExceeded {
                    limit: self.settings.max_depth,
                });
            }

            let referer = ctx.visit(&url);
            tracing::info!("  {}. URL={}", ctx.visited_urls().len(), url);

            if consult_plugins {
                if let Some(plugin) = self.plugins.iter().find(|p| p.can_handle_url(&url)) {
                    tracing::info!("Found matching plugin {} for URL {}", plugin.name(), url);
                    if title.is_none() {
                        title = plugin.title(&url).await;
                    }
                    let streams = plugin
                        .streams(&url)
                        .await
                        .map_err(|source| ResolveError::Plugin {
                            plugin: plugin.name(),
                            source,
                        })?;
                    return Ok(Resolution {
                        title,
                        visited: ctx.into_visited(),
                        streams: Box::pin(stream::iter(streams)),
                    });
                }
            }
            consult_plugins = true;

            let mut page = String::new();
            let mut found_candidates = false;
            let mut state = State::Fetch;
            loop {
                state = match state {
                    State::Fetch => {
                        page = self.fetch_page(&url, &referer).await?;
                        if title.is_none() {
                            title = Some(patterns::page_title(&page).unwrap_or_else(|| url.clone()));
                        }
                        State::ExtractPlaylists
                    }
                    State::ExtractPlaylists => {
                        let mut candidates: Vec<Candidate> = patterns::playlists(&page).collect();
                        candidates.extend(patterns::unescaped_playlists(&page));
                        if candidates.is_empty() {
                            tracing::trace!("No Playlists");
                            State::ExtractIframes
                        } else {
                            found_candidates = true;
                            tracing::debug!("Found Playlists: {}", candidates.len());
                            let accepted = filter_candidates(
                                &candidates,
                                &url,
                                FilterKind::Playlist,
                                &mut ctx,
                                options,
                            );
                            if accepted.is_empty() {
                                State::ExtractIframes
                            } else {
                                tracing::info!("Found Playlists: {} (valid)", accepted.len());
                                State::Dispatch(accepted)
                            }
                        }
                    }
                    State::ExtractIframes => {
                        let mut candidates: Vec<Candidate> = patterns::iframes(&page).collect();
                        candidates.extend(patterns::unescaped_iframes(&page));
                        if candidates.is_empty() {
                            tracing::trace!("No iframes");
                            State::JsRedirect
                        } else {
                            found_candidates = true;
                            tracing::debug!("Found iframes: {}", candidates.len());
                            let mut accepted = filter_candidates(
                                &candidates,
                                &url,
                                FilterKind::Iframe,
                                &mut ctx,
                                options,
                            );
                            match accepted.len() {
                                0 => State::JsRedirect,
                                1 => {
                                    pending.push_back(accepted.remove(0));
                                    break;
                                }
                                _ => State::Select(accepted),
                            }
                        }
                    }
                    State::Select(iframes) => {
                        let chosen = self.select(iframes, selector).await;
                        pending.push_back(chosen);
                        break;
                    }
                    State::JsRedirect => match patterns::js_redirect(&page) {
                        Some(candidate) => {
                            found_candidates = true;
                            let next = patterns::absolute_redirect(&url, &candidate.raw);
                            if ctx.has_visited(&next) {
                                tracing::warn!("Ignoring redirect to an already visited page: {}", next);
                                State::Fail
                            } else {
                                tracing::debug!("Found window.location.href: {}", next);
                                pending.push_back(next);
                                break;
                            }
                        }
                        None => State::Fail,
                    },
                    State::Dispatch(playlists) => {
                        let referer = options
                            .playlist_referer
                            .clone()
                            .unwrap_or_else(|| url.clone());
                        let dispatcher = PlaylistDispatcher::new(
                            self.parser.clone(),
                            options.playlist_cap(),
                            Some(referer),
                        );
                        return Ok(Resolution {
                            title,
                            visited: ctx.into_visited(),
                            streams: dispatcher.dispatch(playlists),
                        });
                    }
                    State::Fail => {
                        tracing::error!("No playlist or iframe found on {}", url);
                        return Err(if found_candidates {
                            ResolveError::NoPlayerResolved { url }
                        } else {
                            ResolveError::NoCandidatesFound { url }
                        });
                    }
                };
            }
        }

        Err(ResolveError::NoPlayerResolved {
            url: target.to_string(),
        })
    }

    /// Fetch a page, retrying once with plain deflate when the body cannot be decoded
    async fn fetch_page(&self, url: &str, referer: &str) -> Result<String, ResolveError> {
        let request = self.page_request(url, referer);
        match self.fetcher.fetch(&request).await {
            Ok(page) => Ok(page.text),
            Err(FetchError::TransferEncodingUnsupported(reason)) => {
                tracing::debug!("Retrying {} with deflate encoding: {}", url, reason);
                let retry = FetchRequest {
                    user_agent: Some(useragents::FIREFOX.to_string()),
                    accept_encoding: Some("deflate".to_string()),
                    ..request
                };
                self.fetcher
                    .fetch(&retry)
                    .await
                    .map(|page| page.text)
                    .map_err(|e| ResolveError::from_fetch(url, e))
            }
            Err(e) => Err(ResolveError::from_fetch(url, e)),
        }
    }

    fn page_request(&self, url: &str, referer: &str) -> FetchRequest {
        let host = Url::parse(url).map(|u| netloc(&u)).unwrap_or_default();

        let user_agent = if MOBILE_HOSTS.iter().any(|h| host.ends_with(h)) {
            useragents::IPHONE_6
        } else {
            self.settings.user_agent.as_str()
        };

        let verify_tls = !INSECURE_TLS_HOSTS.iter().any(|h| host.ends_with(h));
        if !verify_tls {
            tracing::warn!("SSL Verification disabled.");
        }

        let referer = if REFERER_SENSITIVE_HOSTS.iter().any(|h| host.ends_with(h)) {
            None
        } else {
            Some(referer.to_string())
        };

        FetchRequest {
            verify_tls,
            ..FetchRequest::new(url).referer(referer).user_agent(user_agent)
        }
    }

    /// Pick one of several iframes; anything unusable falls back to the first
    async fn select(&self, iframes: Vec<String>, selector: &dyn IframeSelector) -> String {
        tracing::info!("--- IFRAMES ---");
        for (i, iframe) in iframes.iter().enumerate() {
            tracing::info!("{} - {}", i + 1, iframe);
        }
        tracing::info!("--- IFRAMES ---");

        let prompt = "Choose an iframe number from above";
        let choice = match tokio::time::timeout(self.settings.selection_timeout, selector.ask(prompt)).await {
            Ok(Ok(answer)) => {
                let index = parse_selection(&answer, iframes.len());
                if index.is_none() {
                    tracing::error!("invalid input number");
                }
                index
            }
            Ok(Err(SelectError::NoInteractiveInput)) => {
                tracing::debug!("No interactive input, using the first iframe");
                None
            }
            Err(_) => {
                tracing::error!("invalid input answer");
                None
            }
        };

        let index = choice.unwrap_or(0);
        iframes.into_iter().nth(index).unwrap_or_default()
    }
}

/// Strip the generic-walk prefix and make sure the URL has a scheme
pub fn normalize_target(target: &str) -> (String, bool) {
    let trimmed = target.trim();
    let (rest, generic_only) = match trimmed.strip_prefix(RESOLVE_PREFIX) {
        Some(rest) => (rest, true),
        None => (trimmed, false),
    };
    let url = update_scheme(rest);
    let url = Url::parse(&url).map(|u| u.to_string()).unwrap_or(url);
    (url, generic_only)
}
