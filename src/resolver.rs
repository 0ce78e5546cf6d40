//! Extraction rule resolution.
//!
//! Picking the CSS selector for a site is an ordered chain of strategies,
//! each a pure function of the site and (optionally) its parsed homepage.
//! The first strategy that returns a selector wins:
//!
//! 1. [`explicit`]: the selector stored with the site
//! 2. [`known_host`]: a static table keyed by host
//! 3. [`own_template`]: generic group-template selectors, tried against the page
//! 4. [`competitor_fallback`]: a catch-all of common tag class names
//!
//! If nothing applies the site simply yields no topics; that is not an error.

use crate::models::{Site, SiteKind};
use crate::utils::{is_same_or_subdomain, normalize_host};
use scraper::{Html, Selector};
use tracing::{debug, warn};

/// Host → selector for sites whose markup has been checked by hand.
/// Matches the host or any subdomain of it, first hit wins.
pub const KNOWN_HOST_SELECTORS: &[(&str, &str)] = &[
    ("elperiodico.com", ".ft-org-header-tagbar a"),
    ("epe.es", ".ft-org-header-tagbar a"),
    ("sport.es", ".ft-org-header-tagbar a"),
    ("elmundo.es", ".ue-c-main-navigation__tags a"),
    ("elpais.com", "nav.tags a, .sm_tags a"),
    ("lavanguardia.com", ".tags-bar a"),
    ("abc.es", ".voc-topics a"),
    ("20minutos.es", ".tags-header a"),
    ("elconfidencial.com", ".hot-topics a"),
];

/// Generic selectors shared by the own-group regional template, tried in order.
pub const OWN_SITE_CANDIDATES: &[&str] = &[
    ".ft-org-header-regionales-menu-panel__tagbar a",
    ".ft-org-header-tagbar a",
    ".ft-tagbar a",
    ".tagbar a",
];

pub const COMPETITOR_FALLBACK: &str = "a.tag, a.tema, .tags a";

/// A single resolution step.
pub type Strategy = fn(&Site, Option<&Html>) -> Option<String>;

/// Resolution order; see the module docs.
pub const STRATEGIES: &[(&str, Strategy)] = &[
    ("explicit", explicit),
    ("known_host", known_host),
    ("own_template", own_template),
    ("competitor_fallback", competitor_fallback),
];

/// Run the strategy chain and return the first selector found.
pub fn resolve(site: &Site, page: Option<&Html>) -> Option<String> {
    for (name, strategy) in STRATEGIES {
        if let Some(selector) = strategy(site, page) {
            debug!(site = %site.name, strategy = name, %selector, "Resolved extraction rule");
            return Some(selector);
        }
    }
    debug!(site = %site.name, "No extraction rule applies");
    None
}

pub fn explicit(site: &Site, _page: Option<&Html>) -> Option<String> {
    site.selector
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

pub fn known_host(site: &Site, _page: Option<&Html>) -> Option<String> {
    let host = normalize_host(&site.url);
    if host.is_empty() {
        return None;
    }
    KNOWN_HOST_SELECTORS
        .iter()
        .find(|(key, _)| is_same_or_subdomain(&host, key))
        .map(|(_, selector)| selector.to_string())
}

/// Own sites only. Needs the fetched page; short-circuits on the first
/// candidate matching at least one element.
pub fn own_template(site: &Site, page: Option<&Html>) -> Option<String> {
    if site.kind != SiteKind::Own {
        return None;
    }
    let page = page?;
    OWN_SITE_CANDIDATES
        .iter()
        .find(|candidate| matches_any(page, candidate))
        .map(|candidate| candidate.to_string())
}

pub fn competitor_fallback(site: &Site, _page: Option<&Html>) -> Option<String> {
    (site.kind == SiteKind::Competitor).then(|| COMPETITOR_FALLBACK.to_string())
}

fn matches_any(page: &Html, selector: &str) -> bool {
    match Selector::parse(selector) {
        Ok(sel) => page.select(&sel).next().is_some(),
        Err(e) => {
            warn!(%selector, error = %e, "Unparsable template selector");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn site(url: &str, kind: SiteKind, selector: Option<&str>) -> Site {
        Site {
            id: 1,
            name: "Test".to_string(),
            url: url.to_string(),
            kind,
            selector: selector.map(str::to_string),
        }
    }

    #[test]
    fn test_explicit_rule_wins() {
        let s = site("https://www.elmundo.es/", SiteKind::Competitor, Some(".tags a"));
        assert_eq!(resolve(&s, None).as_deref(), Some(".tags a"));
    }

    #[test]
    fn test_blank_explicit_rule_is_ignored() {
        let s = site("https://www.elmundo.es/", SiteKind::Competitor, Some("   "));
        assert_eq!(resolve(&s, None).as_deref(), Some(".ue-c-main-navigation__tags a"));
    }

    #[test]
    fn test_known_host_matches_after_normalization() {
        let s = site("https://WWW.Sport.es/es/", SiteKind::Own, None);
        assert_eq!(known_host(&s, None).as_deref(), Some(".ft-org-header-tagbar a"));
    }

    #[test]
    fn test_known_host_needs_label_boundary() {
        let sub = site("https://deportes.elmundo.es/", SiteKind::Competitor, None);
        assert_eq!(known_host(&sub, None).as_deref(), Some(".ue-c-main-navigation__tags a"));
        let lookalike = site("https://www.mundosport.es/", SiteKind::Competitor, None);
        assert_eq!(known_host(&lookalike, None), None);
        assert_eq!(resolve(&lookalike, None).as_deref(), Some(COMPETITOR_FALLBACK));
    }

    #[test]
    fn test_own_template_picks_first_matching_candidate() {
        let html = Html::parse_document(
            r#"<html><body><div class="tagbar"><a href="/a">A</a></div>
               <div class="ft-tagbar"><a href="/b">B</a></div></body></html>"#,
        );
        let s = site("https://www.lne.es/", SiteKind::Own, None);
        assert_eq!(resolve(&s, Some(&html)).as_deref(), Some(".ft-tagbar a"));
    }

    #[test]
    fn test_own_template_without_page_or_match_yields_none() {
        let s = site("https://www.lne.es/", SiteKind::Own, None);
        assert_eq!(resolve(&s, None), None);
        let html = Html::parse_document("<html><body><p>nothing</p></body></html>");
        assert_eq!(resolve(&s, Some(&html)), None);
    }

    #[test]
    fn test_competitor_falls_back_to_generic() {
        let s = site("https://unknown.example/", SiteKind::Competitor, None);
        assert_eq!(resolve(&s, None).as_deref(), Some(COMPETITOR_FALLBACK));
    }

    #[test]
    fn test_competitor_fallback_not_used_for_own_sites() {
        let s = site("https://unknown.example/", SiteKind::Own, None);
        assert_eq!(competitor_fallback(&s, None), None);
    }

    #[test]
    fn test_all_table_selectors_parse() {
        for (_, selector) in KNOWN_HOST_SELECTORS {
            assert!(Selector::parse(selector).is_ok(), "{selector}");
        }
        for selector in OWN_SITE_CANDIDATES {
            assert!(Selector::parse(selector).is_ok(), "{selector}");
        }
        assert!(Selector::parse(COMPETITOR_FALLBACK).is_ok());
    }
}
