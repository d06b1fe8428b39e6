use lazy_static::lazy_static;
use regex::Regex;
use url::Url;

lazy_static! {
    static ref SCHEME_RE: Regex = Regex::new(r"^[a-zA-Z][a-zA-Z0-9+.\-]*://").unwrap();
}

/// Turn a raw candidate into an absolute URL.
///
/// Strips JS escaping backslashes, decodes the `&#58;` entity in the scheme,
/// then joins relative forms against `stream_base` (manifest sub-resources)
/// or `base_url`. Never fails: when joining is impossible the cleaned string
/// is returned as-is.
pub fn repair(raw: &str, base_url: &str, stream_base: &str) -> String {
    let mut url = raw.replace('\\', "");
    if let Some(rest) = url.strip_prefix("http&#58;//") {
        url = format!("http://{}", rest);
    } else if let Some(rest) = url.strip_prefix("https&#58;//") {
        url = format!("https://{}", rest);
    }

    if !stream_base.is_empty() && !has_scheme(&url) {
        let relative = if url.starts_with("//") {
            url.as_str()
        } else {
            url.strip_prefix('/').unwrap_or(&url)
        };
        return join(stream_base, relative);
    }

    join(base_url, &url)
}

/// Host plus `:port` when the URL carries an explicit port
pub fn netloc(url: &Url) -> String {
    match (url.host_str(), url.port()) {
        (Some(host), Some(port)) => format!("{}:{}", host, port),
        (Some(host), None) => host.to_string(),
        _ => String::new(),
    }
}

/// Give scheme-less input a scheme: `//host` gets `http:`, bare hosts get `http://`
pub fn update_scheme(url: &str) -> String {
    if url.starts_with("//") {
        format!("http:{}", url)
    } else if SCHEME_RE.is_match(url) {
        url.to_string()
    } else {
        format!("http://{}", url)
    }
}

fn has_scheme(url: &str) -> bool {
    !url.starts_with("//") && Url::parse(url).is_ok()
}

fn join(base: &str, url: &str) -> String {
    match Url::parse(base).and_then(|b| b.join(url)) {
        Ok(joined) => joined.to_string(),
        Err(e) => {
            tracing::debug!("Could not join {} onto {}: {}", url, base, e);
            url.to_string()
        }
    }
}
