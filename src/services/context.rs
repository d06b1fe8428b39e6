use std::collections::HashSet;
use std::sync::OnceLock;

use super::filter::{merge_path_list, PathEntry, STATIC_BLACKLIST_PATH};
use crate::models::PluginOptions;

/// Per-resolution memory: visit history, accepted URLs and merged path tables.
///
/// Lives exactly as long as one top-level resolve call.
#[derive(Debug, Default)]
pub struct ResolutionContext {
    visited_urls: Vec<String>,
    accepted: HashSet<String>,
    blacklist_path: OnceLock<Vec<PathEntry>>,
    whitelist_path: OnceLock<Vec<PathEntry>>,
}

impl ResolutionContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a page visit and return the referer for fetching it.
    ///
    /// URLs accepted on the previous page are forgotten; only visits carry over.
    pub fn visit(&mut self, url: &str) -> String {
        self.accepted.clear();
        self.visited_urls.push(url.to_string());
        let len = self.visited_urls.len();
        if len >= 2 {
            self.visited_urls[len - 2].clone()
        } else {
            url.to_string()
        }
    }

    pub fn visited_urls(&self) -> &[String] {
        &self.visited_urls
    }

    pub fn has_visited(&self, url: &str) -> bool {
        self.visited_urls.iter().any(|u| u == url)
    }

    /// Visited, or already accepted by a filter pass on the current page
    pub fn is_known(&self, url: &str) -> bool {
        self.has_visited(url) || self.accepted.contains(url)
    }

    pub fn record_accepted<'a>(&mut self, urls: impl IntoIterator<Item = &'a String>) {
        self.accepted.extend(urls.into_iter().cloned());
    }

    pub fn blacklist_path(&self, options: &PluginOptions) -> &[PathEntry] {
        self.blacklist_path
            .get_or_init(|| merge_path_list(STATIC_BLACKLIST_PATH, &options.blacklist_path))
    }

    pub fn whitelist_path(&self, options: &PluginOptions) -> &[PathEntry] {
        self.whitelist_path
            .get_or_init(|| merge_path_list(&[], &options.whitelist_path))
    }

    pub fn into_visited(self) -> Vec<String> {
        self.visited_urls
    }
}
