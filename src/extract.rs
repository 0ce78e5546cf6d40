//! Topic extraction from homepage markup.
//!
//! Given the fetched HTML and a resolved selector, produce the ordered list of
//! `(name, absolute url)` pairs a homepage is currently featuring. The selector
//! may point straight at anchors (`.tags a`) or at a single container
//! (`nav.tagbar`), in which case the container's anchors are used.
//!
//! Filtering is data-driven: see [`BOILERPLATE_LABELS`] and [`MAX_NAME_CHARS`].
//! Extraction never fails; anything unusable degrades to fewer (or zero) topics.

use crate::models::{ExtractedTopic, Site};
use crate::resolver;
use crate::utils::{absolutize, collapse_whitespace, normalize_host};
use itertools::Itertools;
use once_cell::sync::Lazy;
use scraper::{ElementRef, Html, Selector};
use std::collections::HashSet;
use tracing::{debug, info, instrument, warn};

/// Navigation labels that show up inside tag bars but are not topics.
/// Compared against the lowercased name.
pub const BOILERPLATE_LABELS: &[&str] = &[
    "es noticia",
    "es noticia:",
    "últimas noticias",
    "ultimas noticias",
    "todas las noticias",
    "más leídas",
    "más leído",
    "lo más leído",
    "tendencias",
    "temas",
    "última hora",
];

/// Names this long are almost always a mis-selected navigation block.
pub const MAX_NAME_CHARS: usize = 50;

/// Hosts whose tag bar always opens with a generic "in the news" link rather
/// than a real topic. Observed on one page layout; revisit if the markup changes.
pub const SKIP_LEADING_ANCHOR_HOSTS: &[&str] = &["elconfidencial.com"];

static BOILERPLATE: Lazy<HashSet<&'static str>> =
    Lazy::new(|| BOILERPLATE_LABELS.iter().copied().collect());

/// Resolve the rule for `site` against the page and extract its topics.
#[instrument(level = "info", skip_all, fields(site = %site.name))]
pub fn topics_for_site(html: &str, site: &Site) -> Vec<ExtractedTopic> {
    let document = Html::parse_document(html);
    let Some(selector) = resolver::resolve(site, Some(&document)) else {
        info!("No extraction rule for site; nothing to extract");
        return Vec::new();
    };
    let topics = extract_from_document(&document, &selector, &site.url);
    info!(count = topics.len(), %selector, "Extracted topics");
    topics
}

fn extract_from_document(document: &Html, selector: &str, base_url: &str) -> Vec<ExtractedTopic> {
    let parsed = match Selector::parse(selector) {
        Ok(s) => s,
        Err(e) => {
            warn!(%selector, error = %e, "Unparsable extraction rule");
            return Vec::new();
        }
    };

    let anchor = Selector::parse("a").expect("static selector");
    let selected: Vec<ElementRef> = document.select(&parsed).collect();
    let mut anchors: Vec<ElementRef> = match selected.as_slice() {
        [container] if container.value().name() != "a" => container.select(&anchor).collect(),
        _ => selected,
    };
    debug!(candidates = anchors.len(), "Selected anchor candidates");

    if skips_leading_anchor(base_url) && !anchors.is_empty() {
        anchors.remove(0);
    }

    anchors
        .into_iter()
        .filter_map(|anchor| to_topic(anchor, base_url))
        .unique()
        .collect()
}

fn to_topic(anchor: ElementRef, base_url: &str) -> Option<ExtractedTopic> {
    let name = collapse_whitespace(&anchor.text().collect::<String>());
    if !is_topic_name(&name) {
        return None;
    }
    let href = anchor.value().attr("href")?.trim();
    if href.is_empty() || href.starts_with('#') || href.to_lowercase().starts_with("javascript:") {
        return None;
    }
    let url = absolutize(href, base_url)?;
    Some(ExtractedTopic { name, url })
}

/// Non-empty, not boilerplate, shorter than [`MAX_NAME_CHARS`].
pub fn is_topic_name(name: &str) -> bool {
    !name.is_empty()
        && name.chars().count() < MAX_NAME_CHARS
        && !BOILERPLATE.contains(name.to_lowercase().as_str())
}

fn skips_leading_anchor(base_url: &str) -> bool {
    let host = normalize_host(base_url);
    SKIP_LEADING_ANCHOR_HOSTS.iter().any(|h| host == *h)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SiteKind;

    const BASE: &str = "https://a.example/home";

    fn extract_topics(html: &str, selector: &str, base_url: &str) -> Vec<ExtractedTopic> {
        let document = Html::parse_document(html);
        extract_from_document(&document, selector, base_url)
    }

    fn pairs(topics: &[ExtractedTopic]) -> Vec<(&str, &str)> {
        topics.iter().map(|t| (t.name.as_str(), t.url.as_str())).collect()
    }

    #[test]
    fn test_direct_anchor_selection_with_boilerplate() {
        let html = r#"<div class="tags">
            <a href="/x">Es noticia</a>
            <a href="/tema/elecciones">Elecciones</a>
            <a href="https://a.example/tema/futbol">Fútbol</a>
        </div>"#;
        let topics = extract_topics(html, ".tags a", BASE);
        assert_eq!(
            pairs(&topics),
            vec![
                ("Elecciones", "https://a.example/tema/elecciones"),
                ("Fútbol", "https://a.example/tema/futbol"),
            ]
        );
    }

    #[test]
    fn test_single_container_enumerates_descendants() {
        let html = r#"<nav class="tagbar"><ul>
            <li><a href="/tema/a">Alpha</a></li>
            <li><a href="/tema/b">Beta</a></li>
        </ul></nav>"#;
        let topics = extract_topics(html, "nav.tagbar", BASE);
        assert_eq!(topics.len(), 2);
        assert_eq!(topics[1].url, "https://a.example/tema/b");
    }

    #[test]
    fn test_single_anchor_selection_is_kept() {
        let html = r#"<a class="tag" href="/tema/solo">Solo</a>"#;
        let topics = extract_topics(html, "a.tag", BASE);
        assert_eq!(pairs(&topics), vec![("Solo", "https://a.example/tema/solo")]);
    }

    #[test]
    fn test_filters_empty_missing_href_and_long_names() {
        let long = "x".repeat(MAX_NAME_CHARS);
        let just_short = "y".repeat(MAX_NAME_CHARS - 1);
        let html = format!(
            r##"<div class="tags">
                <a href="/empty">   </a>
                <a>Sin enlace</a>
                <a href="#top">Ancla</a>
                <a href="/long">{long}</a>
                <a href="/ok">{just_short}</a>
            </div>"##
        );
        let topics = extract_topics(&html, ".tags a", BASE);
        assert_eq!(topics.len(), 1);
        assert_eq!(topics[0].name, just_short);
    }

    #[test]
    fn test_boilerplate_is_case_insensitive() {
        let html = r#"<div class="tags"><a href="/1">ÚLTIMAS NOTICIAS</a><a href="/2">Tendencias</a></div>"#;
        assert!(extract_topics(html, ".tags a", BASE).is_empty());
    }

    #[test]
    fn test_duplicates_collapse_keeping_order() {
        let html = r#"<div class="tags">
            <a href="/b">Beta</a><a href="/a">Alpha</a><a href="/b">Beta</a>
        </div>"#;
        let topics = extract_topics(html, ".tags a", BASE);
        assert_eq!(
            pairs(&topics),
            vec![("Beta", "https://a.example/b"), ("Alpha", "https://a.example/a")]
        );
    }

    #[test]
    fn test_nested_markup_whitespace_collapses() {
        let html = "<div class=\"tags\"><a href=\"/t\">\n  <span>Guerra</span>\n  <span>en Ucrania</span>\n</a></div>";
        let topics = extract_topics(html, ".tags a", BASE);
        assert_eq!(topics[0].name, "Guerra en Ucrania");
    }

    #[test]
    fn test_invalid_selector_yields_empty() {
        assert!(extract_topics("<a href='/x'>X</a>", "a[[[", BASE).is_empty());
    }

    #[test]
    fn test_quirk_host_drops_first_anchor() {
        let html = r#"<div class="hot-topics">
            <a href="/en-la-noticia">En la noticia</a>
            <a href="/tema/uno">Uno</a>
        </div>"#;
        let topics = extract_topics(html, ".hot-topics a", "https://www.elconfidencial.com/");
        assert_eq!(pairs(&topics), vec![("Uno", "https://www.elconfidencial.com/tema/uno")]);

        let elsewhere = extract_topics(html, ".hot-topics a", BASE);
        assert_eq!(elsewhere.len(), 2);
    }

    #[test]
    fn test_topics_for_site_uses_resolver() {
        let site = Site {
            id: 7,
            name: "A".to_string(),
            url: "https://a.example/".to_string(),
            kind: SiteKind::Competitor,
            selector: None,
        };
        let html = r#"<ul class="tags"><li><a href="/tema/x">Equis</a></li></ul>"#;
        let topics = topics_for_site(html, &site);
        assert_eq!(pairs(&topics), vec![("Equis", "https://a.example/tema/x")]);
    }

    #[test]
    fn test_topics_for_own_site_without_rule_is_empty() {
        let site = Site {
            id: 8,
            name: "B".to_string(),
            url: "https://b.example/".to_string(),
            kind: SiteKind::Own,
            selector: None,
        };
        assert!(topics_for_site("<html><body></body></html>", &site).is_empty());
    }
}
