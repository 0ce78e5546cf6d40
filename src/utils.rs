//! Helpers for host normalization, link resolution and log-friendly text.
//!
//! Site URLs are registered by hand and come in every shape
//! (`https://www.lne.es/`, `lne.es`, `http://lne.es/asturias`), so anything
//! that compares hosts goes through [`normalize_host`] first.

use once_cell::sync::Lazy;
use regex::Regex;
use url::Url;

static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

/// Reduce a URL or bare hostname to a lowercase host without scheme,
/// leading `www.`, port or path.
///
/// # Examples
///
/// ```ignore
/// assert_eq!(normalize_host("https://www.Diariodeibiza.es/ibiza"), "diariodeibiza.es");
/// assert_eq!(normalize_host("lne.es"), "lne.es");
/// ```
pub fn normalize_host(input: &str) -> String {
    let trimmed = input.trim();
    let without_scheme = match trimmed.find("://") {
        Some(idx) => &trimmed[idx + 3..],
        None => trimmed,
    };
    let host = without_scheme
        .split(['/', '?', '#'])
        .next()
        .unwrap_or_default();
    let host = host.rsplit('@').next().unwrap_or_default();
    let host = host.split(':').next().unwrap_or_default().to_lowercase();
    match host.strip_prefix("www.") {
        Some(rest) => rest.to_string(),
        None => host,
    }
}

/// True when `host` is `parent` or one of its subdomains. Both are expected
/// normalized; `mundosport.es` is not under `sport.es`.
pub fn is_same_or_subdomain(host: &str, parent: &str) -> bool {
    host == parent
        || host
            .strip_suffix(parent)
            .is_some_and(|prefix| prefix.ends_with('.'))
}

/// `scheme://host[:port]` of a URL, or `None` if it does not parse.
pub fn origin_of(base_url: &str) -> Option<String> {
    let parsed = Url::parse(base_url).ok()?;
    let origin = parsed.origin();
    origin.is_tuple().then(|| origin.ascii_serialization())
}

/// Turn a link target into an absolute URL by prefixing the base origin.
///
/// Absolute `http(s)` targets pass through unchanged, protocol-relative
/// targets borrow the base scheme, and everything else is anchored at the
/// origin root.
pub fn absolutize(href: &str, base_url: &str) -> Option<String> {
    let href = href.trim();
    if href.starts_with("http://") || href.starts_with("https://") {
        return Some(href.to_string());
    }
    if let Some(rest) = href.strip_prefix("//") {
        let scheme = Url::parse(base_url).ok()?.scheme().to_string();
        return Some(format!("{scheme}://{rest}"));
    }
    let origin = origin_of(base_url)?;
    if href.starts_with('/') {
        Some(format!("{origin}{href}"))
    } else {
        Some(format!("{origin}/{href}"))
    }
}

/// Collapse runs of whitespace (including newlines from nested markup) into
/// single spaces and trim the ends.
pub fn collapse_whitespace(s: &str) -> String {
    WHITESPACE.replace_all(s.trim(), " ").into_owned()
}

/// Truncate a string for logging purposes.
///
/// Counts characters rather than bytes, so multi-byte text never splits
/// mid-codepoint.
pub fn truncate_for_log(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        None => s.to_string(),
        Some((cut, _)) => format!("{}…(+{} bytes)", &s[..cut], s.len() - cut),
    }
}
