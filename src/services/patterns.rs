//! Regex extractors that lift player and playlist URLs out of raw HTML.
//!
//! Every extractor is lazy over its input and can be re-run on the same text.
//! `regex` has no lookaround, so the exclusions around a match are checked
//! on the surrounding text after the fact.

use lazy_static::lazy_static;
use regex::{Captures, Regex};
use std::collections::HashMap;
use url::Url;

use crate::models::{Candidate, OriginKind};

lazy_static! {
    // ============ PLAYER PATTERNS ============
    static ref IFRAME_RE: Regex = Regex::new(
        r#"(?is)<ifr(?:["']\s?\+\s?["'])?ame(?P<attrs>.*?)src=["'](?P<url>[^"'\s<>]+)["'][^<>]*?>"#
    ).unwrap();

    // iframes injected by site frameworks, never players
    static ref FRAMEWORK_IFRAME_RE: Regex = Regex::new(r#"(?i)^\sname=["']g_iFrame"#).unwrap();

    static ref PLAYLIST_RE: Regex = Regex::new(
        r#"(?s)(?:["']|=|&quot;)(?P<url>[^"'<>\s;{}]+\.(?:m3u8|f4m|mp3|mp4|mpd)(?:\?[^"'<>\s\\{}]+)?)(?P<end>\\?["']|\s|>|\\&quot;)"#
    ).unwrap();

    // text right before a playlist URL that marks it as a title, not a source
    static ref TITLE_PREFIX_RE: Regex = Regex::new(r#"(?:title=["']|["']title["']:["'])$"#).unwrap();

    static ref UNESCAPE_IFRAME_RE: Regex = Regex::new(
        r#"(?i)unescape\(["'](?P<data>%3C(?:iframe|%69%66%72%61%6d%65)%20[^"']+)["']"#
    ).unwrap();

    static ref UNESCAPE_PLAYLIST_RE: Regex = Regex::new(
        r#"(?i)unescape\(["'](?P<data>%3C(?:[^"']+m3u8[^"']+)%20[^"']+)["']"#
    ).unwrap();

    static ref WINDOW_LOCATION_RE: Regex = Regex::new(
        r#"(?s)<script[^<]+window\.location\.href\s?=\s?["'](?P<url>[^"']+)["'];[^<>]+"#
    ).unwrap();

    // ============ URL SHAPE PATTERNS ============
    static ref ADS_PATH_RE: Regex = Regex::new(
        r"^(?:/(?:static|\d+))?/ads?/?(?:\w+)?(?:\d+x\d+)?(?:_\w+)?\.(?:html?|php)"
    ).unwrap();

    static ref BITRATE_RE: Regex = Regex::new(
        r"(?:_|\.)(?:(?P<bitrate>\d{1,4})|(?P<resolution>\d{1,4}p))\.mp(?:3|4)"
    ).unwrap();

    static ref TITLE_RE: Regex = Regex::new(r"<title>(?P<title>[^<>]+)</title>").unwrap();

    static ref ATTR_REGEX: Regex = Regex::new(
        r#"([\w-]+)\s*=\s*(?:"([^"]*)"|'([^']*)')"#
    ).unwrap();
}

/// Iframe `src` values, excluding framework-injected frames
pub fn iframes(text: &str) -> impl Iterator<Item = Candidate> + '_ {
    iframe_urls(text).map(|url| Candidate::new(url, OriginKind::Iframe))
}

/// Quoted or attribute-assigned URLs ending in a playlist suffix
pub fn playlists(text: &str) -> impl Iterator<Item = Candidate> + '_ {
    playlist_urls(text).map(|url| Candidate::new(url, OriginKind::Playlist))
}

/// Iframes hidden inside `unescape("...")` calls
pub fn unescaped_iframes(text: &str) -> Vec<Candidate> {
    let decoded = unescape_payloads(&UNESCAPE_IFRAME_RE, text);
    iframe_urls(&decoded)
        .map(|url| Candidate::new(url, OriginKind::UnescapedIframe))
        .collect()
}

/// Playlists hidden inside `unescape("...")` calls
pub fn unescaped_playlists(text: &str) -> Vec<Candidate> {
    let decoded = unescape_payloads(&UNESCAPE_PLAYLIST_RE, text);
    playlist_urls(&decoded)
        .map(|url| Candidate::new(url, OriginKind::UnescapedPlaylist))
        .collect()
}

/// Target of the first `window.location.href = "..."` script
pub fn js_redirect(text: &str) -> Option<Candidate> {
    WINDOW_LOCATION_RE
        .captures(text)
        .and_then(|caps| caps.name("url"))
        .map(|m| Candidate::new(m.as_str(), OriginKind::JsRedirect))
}

/// Contents of the page `<title>` tag
pub fn page_title(text: &str) -> Option<String> {
    TITLE_RE
        .captures(text)
        .and_then(|caps| caps.name("title"))
        .map(|m| m.as_str().trim().to_string())
        .filter(|t| !t.is_empty())
}

/// Whether a URL path looks like an ad frame (`/ads/banner_300x250.html`)
pub fn is_ad_path(path: &str) -> bool {
    ADS_PATH_RE.is_match(path)
}

/// Stream name for a progressive file: bitrate (`320k`), resolution (`720p`) or `vod`
pub fn progressive_name(url: &str) -> String {
    match BITRATE_RE.captures(url) {
        Some(caps) => {
            if let Some(bitrate) = caps.name("bitrate") {
                format!("{}k", bitrate.as_str())
            } else if let Some(resolution) = caps.name("resolution") {
                resolution.as_str().to_string()
            } else {
                "vod".to_string()
            }
        }
        None => "vod".to_string(),
    }
}

/// Attributes of every `<tag ...>` opening tag in the document
pub fn tag_attributes(html: &str, tag: &str) -> Vec<HashMap<String, String>> {
    let pattern = format!(r"(?is)<{}\b(?P<attrs>[^>]*)>", regex::escape(tag));
    let tag_re = match Regex::new(&pattern) {
        Ok(re) => re,
        Err(e) => {
            tracing::warn!("Invalid tag pattern for <{}>: {}", tag, e);
            return Vec::new();
        }
    };

    tag_re
        .captures_iter(html)
        .map(|caps| {
            let attrs = caps.name("attrs").map_or("", |m| m.as_str());
            ATTR_REGEX
                .captures_iter(attrs)
                .map(|attr| {
                    let value = attr.get(2).or_else(|| attr.get(3)).map_or("", |m| m.as_str());
                    (attr[1].to_lowercase(), value.to_string())
                })
                .collect()
        })
        .collect()
}

/// Join a redirect target against the page it was found on
pub fn absolute_redirect(page_url: &str, target: &str) -> String {
    Url::parse(page_url)
        .and_then(|base| base.join(target))
        .map(|u| u.to_string())
        .unwrap_or_else(|_| target.to_string())
}

fn iframe_urls(text: &str) -> impl Iterator<Item = String> + '_ {
    IFRAME_RE.captures_iter(text).filter_map(|caps| {
        let attrs = caps.name("attrs").map_or("", |m| m.as_str());
        if FRAMEWORK_IFRAME_RE.is_match(attrs) {
            return None;
        }
        caps.name("url").map(|m| m.as_str().to_string())
    })
}

fn playlist_urls(text: &str) -> impl Iterator<Item = String> + '_ {
    PLAYLIST_RE
        .captures_iter(text)
        .filter(move |caps| is_playlist_source(text, caps))
        .filter_map(|caps| caps.name("url").map(|m| m.as_str().to_string()))
}

fn is_playlist_source(text: &str, caps: &Captures<'_>) -> bool {
    let Some(url) = caps.name("url") else {
        return false;
    };

    let mut from = url.start().saturating_sub(12);
    while !text.is_char_boundary(from) {
        from -= 1;
    }
    if TITLE_PREFIX_RE.is_match(&text[from..url.start()]) {
        return false;
    }

    // a query ending in `;` before whitespace is script, not a URL
    let ends_on_space = caps
        .name("end")
        .map_or(false, |m| m.as_str().chars().all(char::is_whitespace));
    !(ends_on_space && url.as_str().ends_with(';'))
}

fn unescape_payloads(pattern: &Regex, text: &str) -> String {
    pattern
        .captures_iter(text)
        .filter_map(|caps| caps.name("data"))
        .map(|data| match urlencoding::decode(data.as_str()) {
            Ok(decoded) => decoded.into_owned(),
            Err(_) => {
                String::from_utf8_lossy(&urlencoding::decode_binary(data.as_str().as_bytes()))
                    .into_owned()
            }
        })
        .collect::<Vec<_>>()
        .join(",")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raws(candidates: impl IntoIterator<Item = Candidate>) -> Vec<String> {
        candidates.into_iter().map(|c| c.raw).collect()
    }

    #[test]
    fn test_iframe_basic() {
        let html = r#"<div><iframe width="640" src="//player.example.com/embed/42" allowfullscreen></iframe></div>"#;
        assert_eq!(raws(iframes(html)), vec!["//player.example.com/embed/42"]);
    }

    #[test]
    fn test_iframe_split_tag_and_case() {
        let html = r#"document.write('<IFR' + 'AME SRC="http://a.example.com/p.html"></iframe>');"#;
        assert_eq!(raws(iframes(html)), vec!["http://a.example.com/p.html"]);
    }

    #[test]
    fn test_iframe_skips_framework_frame() {
        let html = r#"<iframe name="g_iFrame1" src="http://tracker.example.com/x"></iframe>
            <iframe src="http://player.example.com/live"></iframe>"#;
        assert_eq!(raws(iframes(html)), vec!["http://player.example.com/live"]);
    }

    #[test]
    fn test_iframe_extractor_restartable() {
        let html = r#"<iframe src="http://a.example.com/1"></iframe><iframe src="http://a.example.com/2"></iframe>"#;
        let first = raws(iframes(html));
        let second = raws(iframes(html));
        assert_eq!(first.len(), 2);
        assert_eq!(first, second);
    }

    #[test]
    fn test_playlist_quoted_and_assigned() {
        let html = r#"var src = "http://cdn.example.com/live/index.m3u8?token=abc";
            <video data-src=/vod/movie.mp4 controls>
            <source src='http://cdn.example.com/radio.mp3'>"#;
        assert_eq!(
            raws(playlists(html)),
            vec![
                "http://cdn.example.com/live/index.m3u8?token=abc",
                "/vod/movie.mp4",
                "http://cdn.example.com/radio.mp3"
            ]
        );
    }

    #[test]
    fn test_playlist_escaped_quote_terminator() {
        let html = r#"{"file":"http:\/\/cdn.example.com\/hls\/live.m3u8\"}"#;
        assert_eq!(
            raws(playlists(html)),
            vec![r"http:\/\/cdn.example.com\/hls\/live.m3u8"]
        );
    }

    #[test]
    fn test_playlist_skips_title_values() {
        let html = r#"<a title="promo.mp4" href="x">
            {"title":"clip.mp4","file":"http://cdn.example.com/clip.mp4"}"#;
        assert_eq!(
            raws(playlists(html)),
            vec!["http://cdn.example.com/clip.mp4"]
        );
    }

    #[test]
    fn test_playlist_skips_script_fragment() {
        let html = "var u =/live/index.m3u8?id=1; next();";
        assert!(raws(playlists(html)).is_empty());
    }

    #[test]
    fn test_playlist_html_entity_delimiters() {
        let html = r#"data-config="{&quot;src&quot;:&quot;http://cdn.example.com/a.mpd\&quot;}""#;
        assert_eq!(raws(playlists(html)), vec!["http://cdn.example.com/a.mpd"]);
    }

    #[test]
    fn test_unescaped_iframe() {
        let html = r#"document.write(unescape("%3Ciframe%20src%3D%22http%3A//player.example.com/e/7%22%3E%3C/iframe%3E"));"#;
        let found = unescaped_iframes(html);
        assert_eq!(raws(found.clone()), vec!["http://player.example.com/e/7"]);
        assert_eq!(found[0].origin, OriginKind::UnescapedIframe);
    }

    #[test]
    fn test_unescaped_playlist() {
        let html = r#"unescape('%3Csource%20src%3D%22http%3A//cdn.example.com/live.m3u8%22%20type%3D%22application/x-mpegURL%22%3E')"#;
        assert_eq!(
            raws(unescaped_playlists(html)),
            vec!["http://cdn.example.com/live.m3u8"]
        );
    }

    #[test]
    fn test_js_redirect() {
        let html = "<script type=\"text/javascript\">\n window.location.href = \"/live/channel1\";\n</script>";
        assert_eq!(
            js_redirect(html).map(|c| c.raw),
            Some("/live/channel1".to_string())
        );
        assert!(js_redirect("<p>nothing</p>").is_none());
    }

    #[test]
    fn test_absolute_redirect() {
        assert_eq!(
            absolute_redirect("http://example.com/a/page.html", "/live/channel1"),
            "http://example.com/live/channel1"
        );
    }

    #[test]
    fn test_is_ad_path() {
        assert!(is_ad_path("/ads/banner_300x250.html"));
        assert!(is_ad_path("/static/ad/728x90.php"));
        assert!(is_ad_path("/123/ads.htm"));
        assert!(!is_ad_path("/player/ads/banner.html"));
        assert!(!is_ad_path("/embed/42"));
    }

    #[test]
    fn test_progressive_name() {
        assert_eq!(progressive_name("http://cdn.example.com/a_320.mp3"), "320k");
        assert_eq!(progressive_name("http://cdn.example.com/a_720p.mp4"), "720p");
        assert_eq!(progressive_name("http://cdn.example.com/video.1080p.mp4"), "1080p");
        assert_eq!(progressive_name("http://cdn.example.com/video.mp4"), "vod");
    }

    #[test]
    fn test_page_title() {
        assert_eq!(
            page_title("<html><head><title> Live TV </title></head>"),
            Some("Live TV".to_string())
        );
        assert_eq!(page_title("<html></html>"), None);
    }

    #[test]
    fn test_tag_attributes() {
        let html = r#"<iframe id="videoFrame" src='//player.example.com/x'></iframe>
            <span class="webcaster-player" data-config="config=http://x/y.xml"></span>"#;
        let frames = tag_attributes(html, "iframe");
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0]["id"], "videoFrame");
        assert_eq!(frames[0]["src"], "//player.example.com/x");

        let spans = tag_attributes(html, "span");
        assert_eq!(spans[0]["data-config"], "config=http://x/y.xml");
    }
}
