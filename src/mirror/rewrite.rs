//! Pointing the page at local asset copies.
//!
//! One traversal decides the new value of every attribute: asset references
//! that were downloaded point at their local copy, asset references that were
//! not are left alone, and every other attribute loses its archive URL
//! prefix. The edits are then applied to the tree and the document is
//! serialized by scraper.

use std::borrow::Cow;

use regex::Captures;
use scraper::node::{Element, Node};
use scraper::Html;

use super::assets::AssetMap;
use super::discover::{css_url_pattern, slot, srcset_candidates, Slot};
use crate::archive::{resolve, strip_archive_prefix, SnapshotReference};

/// Serialize `document`, pointing downloaded assets at their local paths.
pub fn rewrite(mut document: Html, assets: &AssetMap, snapshot: &SnapshotReference) -> String {
    let rewriter = Rewriter { assets, snapshot };

    let mut edits = Vec::new();
    for node in document.tree.root().descendants() {
        let Node::Element(element) = node.value() else {
            continue;
        };
        for (name, value) in element.attrs.iter() {
            let value: &str = value;
            // Namespaced attributes (xlink:href, xmlns:*) are never asset slots.
            let rewritten = if name.prefix.is_none() {
                rewriter.attribute(element, &name.local, value)
            } else {
                strip_archive_prefix(value, snapshot)
            };
            if let Cow::Owned(rewritten) = rewritten {
                if rewritten != value {
                    edits.push((node.id(), name.clone(), rewritten));
                }
            }
        }
    }

    for (id, name, value) in edits {
        let Some(mut node) = document.tree.get_mut(id) else {
            continue;
        };
        if let Node::Element(element) = node.value() {
            if let Some(current) = element.attrs.get_mut(&name) {
                *current = value.into();
            }
        }
    }

    document.html()
}

/// Relative URL of a mirrored file: each path segment percent-encoded.
fn href_for(path: &str) -> String {
    path.split('/')
        .map(urlencoding::encode)
        .collect::<Vec<_>>()
        .join("/")
}

struct Rewriter<'a> {
    assets: &'a AssetMap,
    snapshot: &'a SnapshotReference,
}

impl Rewriter<'_> {
    fn attribute<'v>(&self, element: &Element, name: &str, value: &'v str) -> Cow<'v, str> {
        match slot(element, name, value) {
            Some(Slot::Url(_)) => match self.local(value) {
                Some(href) => Cow::Owned(href),
                None => Cow::Borrowed(value),
            },
            Some(Slot::Srcset) => self.srcset(value),
            Some(Slot::Style) => css_url_pattern().replace_all(value, |caps: &Captures| {
                match self.local(&caps[1]) {
                    Some(href) => format!("url('{}')", href),
                    None => caps[0].to_string(),
                }
            }),
            None => strip_archive_prefix(value, self.snapshot),
        }
    }

    /// Rebuild a `srcset` from the candidates that were downloaded.
    fn srcset<'v>(&self, value: &'v str) -> Cow<'v, str> {
        let rebuilt: Vec<String> = srcset_candidates(value)
            .filter_map(|(url, descriptor)| {
                self.local(url).map(|href| {
                    if descriptor.is_empty() {
                        href
                    } else {
                        format!("{} {}", href, descriptor)
                    }
                })
            })
            .collect();
        if rebuilt.is_empty() {
            Cow::Borrowed(value)
        } else {
            Cow::Owned(rebuilt.join(", "))
        }
    }

    fn local(&self, raw: &str) -> Option<String> {
        resolve(raw, self.snapshot)
            .and_then(|url| self.assets.get(&url).map(href_for))
    }
}
