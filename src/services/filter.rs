//! Ordered rule chain that decides which candidate URLs are worth following.
//!
//! Rules run in a fixed order and the first one that matches names the
//! rejection. A user whitelist therefore beats every blacklist, and a URL we
//! have already seen is reported as such before anything else.

use std::collections::BTreeSet;
use url::Url;

use super::context::ResolutionContext;
use super::metrics;
use super::patterns;
use super::url_repair::{netloc, repair, update_scheme};
use crate::models::{Candidate, FilterKind, FilterVerdict, PluginOptions, RejectReason};

pub const STATIC_BLACKLIST_NETLOC: &[&str] = &[
    "127.0.0.1",
    "about:blank",
    "abv.bg",
    "adfox.ru",
    "cbox.ws",
    "googletagmanager.com",
    "javascript:false",
];

pub const STATIC_BLACKLIST_ENDSWITH: &[&str] = &[
    ".gif",
    ".jpg",
    ".png",
    ".svg",
    ".vtt",
    "/chat.html",
    "/chat",
    "/novideo.mp4",
    "/vidthumb.mp4",
];

pub const STATIC_BLACKLIST_PATH: &[(&str, &str)] = &[
    ("bigo.tv", "/show.mp4"),
    ("expressen.se", "/_livetvpreview/"),
    ("facebook.com", "/connect"),
    ("facebook.com", "/plugins"),
    ("haber7.com", "/radyohome/station-widget/"),
    ("static.tvr.by", "/upload/video/atn/promo"),
    ("twitter.com", "/widgets"),
    ("vesti.ru", "/native_widget.html"),
    ("youtube.com", "/["),
];

/// `(netloc suffix, path prefix)` pair from a path list
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathEntry {
    pub netloc: String,
    pub path: String,
}

impl PathEntry {
    pub fn matches(&self, netloc: &str, path: &str) -> bool {
        netloc.ends_with(&self.netloc) && path.starts_with(&self.path)
    }
}

/// Merge built-in pairs with user `host/path` entries.
///
/// User entries get `http://` when they carry no scheme; entries without a
/// path component are dropped.
pub fn merge_path_list(static_entries: &[(&str, &str)], user: &[String]) -> Vec<PathEntry> {
    let mut entries: Vec<PathEntry> = static_entries
        .iter()
        .map(|(netloc, path)| PathEntry {
            netloc: netloc.to_string(),
            path: path.to_string(),
        })
        .collect();

    for raw in user {
        let normalized = update_scheme(raw);

        if normalized.splitn(4, '/').nth(3).is_none() {
            tracing::debug!("Ignoring path entry without a path: {}", raw);
            continue;
        }

        match Url::parse(&normalized) {
            Ok(url) => entries.push(PathEntry {
                netloc: netloc(&url),
                path: url.path().to_string(),
            }),
            Err(e) => tracing::debug!("Ignoring invalid path entry {}: {}", raw, e),
        }
    }

    entries
}

struct RuleInput<'a> {
    url: &'a str,
    parsed: Option<&'a Url>,
    netloc: &'a str,
    path: &'a str,
    kind: FilterKind,
    ctx: &'a ResolutionContext,
    options: &'a PluginOptions,
}

struct Rule {
    reason: RejectReason,
    rejects: fn(&RuleInput<'_>) -> bool,
}

static RULES: [Rule; 10] = [
    Rule { reason: RejectReason::SameUrl, rejects: same_url },
    Rule { reason: RejectReason::Scheme, rejects: bad_scheme },
    Rule { reason: RejectReason::WhitelistNetloc, rejects: outside_whitelist_netloc },
    Rule { reason: RejectReason::WhitelistPath, rejects: outside_whitelist_path },
    Rule { reason: RejectReason::BlacklistStatic, rejects: static_blacklisted },
    Rule { reason: RejectReason::BlacklistNetloc, rejects: user_blacklisted_netloc },
    Rule { reason: RejectReason::BlacklistPath, rejects: blacklisted_path },
    Rule { reason: RejectReason::BlacklistEndsWith, rejects: blacklisted_suffix },
    Rule { reason: RejectReason::BlacklistFilepath, rejects: blacklisted_filepath },
    Rule { reason: RejectReason::Ads, rejects: ad_frame },
];

fn same_url(input: &RuleInput<'_>) -> bool {
    input.ctx.is_known(input.url)
}

fn bad_scheme(input: &RuleInput<'_>) -> bool {
    input
        .parsed
        .map_or(true, |u| !matches!(u.scheme(), "http" | "https"))
}

// whitelists only restrict which player pages are followed
fn outside_whitelist_netloc(input: &RuleInput<'_>) -> bool {
    let whitelist = &input.options.whitelist_netloc;
    input.kind == FilterKind::Iframe
        && !whitelist.is_empty()
        && !whitelist.iter().any(|w| input.netloc.ends_with(w.as_str()))
}

fn outside_whitelist_path(input: &RuleInput<'_>) -> bool {
    if input.kind != FilterKind::Iframe {
        return false;
    }
    let whitelist = input.ctx.whitelist_path(input.options);
    !whitelist.is_empty() && !whitelist.iter().any(|e| e.matches(input.netloc, input.path))
}

fn static_blacklisted(input: &RuleInput<'_>) -> bool {
    STATIC_BLACKLIST_NETLOC
        .iter()
        .any(|b| input.netloc.ends_with(b))
}

fn user_blacklisted_netloc(input: &RuleInput<'_>) -> bool {
    input
        .options
        .blacklist_netloc
        .iter()
        .any(|b| input.netloc.ends_with(b.as_str()))
}

fn blacklisted_path(input: &RuleInput<'_>) -> bool {
    input
        .ctx
        .blacklist_path(input.options)
        .iter()
        .any(|e| e.matches(input.netloc, input.path))
}

fn blacklisted_suffix(input: &RuleInput<'_>) -> bool {
    STATIC_BLACKLIST_ENDSWITH
        .iter()
        .any(|suffix| input.path.ends_with(suffix))
}

fn blacklisted_filepath(input: &RuleInput<'_>) -> bool {
    input
        .options
        .blacklist_filepath
        .iter()
        .any(|suffix| input.path.ends_with(suffix.as_str()))
}

fn ad_frame(input: &RuleInput<'_>) -> bool {
    patterns::is_ad_path(input.path)
}

/// Run one already-repaired URL through the rule chain
pub fn evaluate(
    url: &str,
    kind: FilterKind,
    ctx: &ResolutionContext,
    options: &PluginOptions,
) -> FilterVerdict {
    let parsed = Url::parse(url).ok();
    let host = parsed.as_ref().map(netloc).unwrap_or_default();
    let path = parsed.as_ref().map(|u| u.path()).unwrap_or("");

    let input = RuleInput {
        url,
        parsed: parsed.as_ref(),
        netloc: &host,
        path,
        kind,
        ctx,
        options,
    };

    RULES
        .iter()
        .find(|rule| (rule.rejects)(&input))
        .map(|rule| FilterVerdict::Rejected(url.to_string(), rule.reason))
        .unwrap_or_else(|| FilterVerdict::Accepted(url.to_string()))
}

/// Repair every candidate, drop the rejected ones and return the rest deduplicated.
///
/// Accepted URLs are remembered in `ctx` until the next visit, so a second
/// pass over the same candidates on one page rejects all of them as already seen.
pub fn filter_candidates(
    candidates: &[Candidate],
    base_url: &str,
    kind: FilterKind,
    ctx: &mut ResolutionContext,
    options: &PluginOptions,
) -> Vec<String> {
    let mut accepted = BTreeSet::new();
    let mut count = 0usize;

    for candidate in candidates {
        let url = repair(&candidate.raw, base_url, "");
        match evaluate(&url, kind, ctx, options) {
            FilterVerdict::Accepted(url) => {
                count += 1;
                accepted.insert(url);
            }
            FilterVerdict::Rejected(url, reason) => {
                tracing::debug!("{} - Removed: {}", reason, url);
                metrics::record_rejection(reason);
            }
        }
    }

    tracing::debug!("List length: {} (with duplicates)", count);

    let list: Vec<String> = accepted.into_iter().collect();
    ctx.record_accepted(&list);
    list
}
