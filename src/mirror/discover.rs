//! Finding the assets a snapshot page depends on.

use std::collections::BTreeMap;
use std::sync::OnceLock;

use regex::Regex;
use scraper::node::Element;
use scraper::{ElementRef, Html};
use tracing::debug;

use super::assets::{AssetKind, AssetSet};
use crate::archive::{resolve, SnapshotReference};

/// How an attribute refers to assets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Slot {
    /// The whole value is one URL.
    Url(AssetKind),
    /// Comma-separated `url [descriptor]` candidates.
    Srcset,
    /// Inline CSS with `url(...)` references.
    Style,
}

/// Attributes that can hold asset references, in scan order.
const SLOT_ATTRIBUTES: [&str; 5] = ["href", "src", "data-src", "srcset", "style"];

/// `url(...)` inside inline CSS, quotes optional.
pub(crate) fn css_url_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r#"(?i)url\(\s*['"]?(.*?)['"]?\s*\)"#).expect("valid css url regex")
    })
}

fn rel_tokens(element: &Element) -> Vec<String> {
    element
        .attr("rel")
        .map(|rel| rel.split_whitespace().map(str::to_ascii_lowercase).collect())
        .unwrap_or_default()
}

/// Favicon or stylesheet, judged by the `rel` tokens of a `<link>`.
fn link_kind(element: &Element) -> Option<AssetKind> {
    let tokens = rel_tokens(element);
    if tokens.iter().any(|t| t == "stylesheet") {
        Some(AssetKind::Stylesheet)
    } else if tokens.iter().any(|t| t == "icon" || t == "apple-touch-icon") {
        Some(AssetKind::Favicon)
    } else {
        None
    }
}

/// Which asset slot, if any, attribute `attr` of `element` is.
pub(crate) fn slot(element: &Element, attr: &str, value: &str) -> Option<Slot> {
    match (element.name(), attr) {
        ("link", "href") => link_kind(element).map(Slot::Url),
        ("script", "src") => Some(Slot::Url(AssetKind::Script)),
        ("img", "src") | ("img", "data-src") => Some(Slot::Url(AssetKind::Image)),
        ("img", "srcset") | ("source", "srcset") => Some(Slot::Srcset),
        (_, "style") if value.to_ascii_lowercase().contains("background") => Some(Slot::Style),
        _ => None,
    }
}

/// Split a `srcset` value into `(url, descriptor)` pairs.
pub(crate) fn srcset_candidates(value: &str) -> impl Iterator<Item = (&str, &str)> {
    value.split(',').filter_map(|candidate| {
        let candidate = candidate.trim();
        if candidate.is_empty() {
            return None;
        }
        Some(match candidate.split_once(char::is_whitespace) {
            Some((url, descriptor)) => (url, descriptor.trim()),
            None => (candidate, ""),
        })
    })
}

/// Every URL referenced by one asset slot.
fn slot_urls(slot: Slot, value: &str) -> Vec<(AssetKind, &str)> {
    match slot {
        Slot::Url(kind) => vec![(kind, value)],
        Slot::Srcset => srcset_candidates(value)
            .map(|(url, _)| (AssetKind::Image, url))
            .collect(),
        Slot::Style => css_url_pattern()
            .captures_iter(value)
            .filter_map(|c| c.get(1))
            .map(|m| (AssetKind::Background, m.as_str()))
            .collect(),
    }
}

/// Scan the page for stylesheets, scripts, images, background images and
/// favicons, returning their archive URLs.
///
/// Assets are grouped by kind (favicons first, backgrounds last) and kept in
/// document order within a kind. A page with no favicon link gets the
/// archive's default `/favicon.ico` for the site.
pub fn discover(document: &Html, snapshot: &SnapshotReference) -> AssetSet {
    let mut by_kind: BTreeMap<AssetKind, Vec<String>> = BTreeMap::new();
    let mut has_favicon_link = false;

    for element in document.tree.root().descendants().filter_map(ElementRef::wrap) {
        let element = element.value();
        for attr in SLOT_ATTRIBUTES {
            let Some(value) = element.attr(attr) else {
                continue;
            };
            let Some(slot) = slot(element, attr, value) else {
                continue;
            };
            if slot == Slot::Url(AssetKind::Favicon) {
                has_favicon_link = true;
            }
            for (kind, raw) in slot_urls(slot, value) {
                match resolve(raw, snapshot) {
                    Some(url) => by_kind.entry(kind).or_default().push(url),
                    None => debug!("skipping {} reference {:.60}", kind, raw),
                }
            }
        }
    }

    if !has_favicon_link {
        by_kind
            .entry(AssetKind::Favicon)
            .or_default()
            .push(snapshot.default_favicon_url());
    }

    let mut assets = AssetSet::new();
    for (kind, urls) in by_kind {
        for url in urls {
            assets.insert(url, kind);
        }
    }
    debug!("discovered {} assets", assets.len());
    assets
}
