//! Discovered assets and where they ended up on disk.

use std::collections::{HashMap, HashSet};
use std::fmt;

use sha2::{Digest, Sha256};
use tracing::warn;

/// What kind of reference an asset was discovered through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AssetKind {
    Favicon,
    Stylesheet,
    Script,
    Image,
    Background,
}

impl fmt::Display for AssetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AssetKind::Favicon => "favicon",
            AssetKind::Stylesheet => "stylesheet",
            AssetKind::Script => "script",
            AssetKind::Image => "image",
            AssetKind::Background => "background",
        };
        f.write_str(name)
    }
}

/// An archive-qualified asset URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Asset {
    pub url: String,
    pub kind: AssetKind,
}

/// Insertion-ordered set of assets, unique by URL.
#[derive(Debug, Default, Clone)]
pub struct AssetSet {
    assets: Vec<Asset>,
    seen: HashSet<String>,
}

impl AssetSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an asset. Returns false if the URL was already present.
    pub fn insert(&mut self, url: String, kind: AssetKind) -> bool {
        if !self.seen.insert(url.clone()) {
            return false;
        }
        self.assets.push(Asset { url, kind });
        true
    }

    pub(crate) fn len(&self) -> usize {
        self.assets.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Asset> {
        self.assets.iter()
    }
}

impl IntoIterator for AssetSet {
    type Item = Asset;
    type IntoIter = std::vec::IntoIter<Asset>;

    fn into_iter(self) -> Self::IntoIter {
        self.assets.into_iter()
    }
}

/// Archive URL → local relative path for every asset written to disk.
///
/// Each path is owned by exactly one URL, and no owned path is a directory
/// prefix of another. A URL whose candidate path clashes gets a content-hash
/// suffix instead of overwriting or failing the write.
#[derive(Debug, Default)]
pub struct AssetMap {
    entries: Vec<(String, String)>,
    by_url: HashMap<String, usize>,
    owners: HashMap<String, String>,
    /// Directories implied by owned paths, with the number of paths under each.
    dirs: HashMap<String, usize>,
}

impl AssetMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Local path recorded for an archive URL.
    pub fn get(&self, url: &str) -> Option<&str> {
        self.by_url
            .get(url)
            .map(|&i| self.entries[i].1.as_str())
    }

    /// Pick the path `url` should be written to, given the path mapper's
    /// candidate and the downloaded content.
    pub fn assign_path(&self, url: &str, candidate: &str, content: &[u8]) -> String {
        if self.is_free_for(candidate, url) {
            return candidate.to_string();
        }

        let digest = hex::encode(Sha256::digest(content));
        let mut path = self.relocate(candidate, &digest[..8]);
        let mut n = 2;
        while !self.is_free_for(&path, url) {
            path = self.relocate(candidate, &format!("{}-{}", &digest[..8], n));
            n += 1;
        }

        warn!(
            "{} maps to {} which clashes with an existing file or directory; saving as {}",
            url, candidate, path
        );
        path
    }

    /// Record a written asset. Replaces any earlier path for the same URL.
    pub fn insert(&mut self, url: String, path: String) {
        match self.by_url.get(&url) {
            Some(&i) => {
                let old = std::mem::replace(&mut self.entries[i].1, path.clone());
                self.release(&old);
            }
            None => {
                self.by_url.insert(url.clone(), self.entries.len());
                self.entries.push((url.clone(), path.clone()));
            }
        }
        for dir in ancestors(&path) {
            *self.dirs.entry(dir.to_string()).or_default() += 1;
        }
        self.owners.insert(path, url);
    }

    /// Entries in the order they were recorded.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(u, p)| (u.as_str(), p.as_str()))
    }

    fn release(&mut self, path: &str) {
        self.owners.remove(path);
        for dir in ancestors(path) {
            if let Some(count) = self.dirs.get_mut(dir) {
                *count -= 1;
                if *count == 0 {
                    self.dirs.remove(dir);
                }
            }
        }
    }

    fn is_free_for(&self, path: &str, url: &str) -> bool {
        if let Some(owner) = self.owners.get(path) {
            return owner == url;
        }
        !self.dirs.contains_key(path) && self.file_ancestor(path).is_none()
    }

    /// Length of the longest prefix of `path` that is already an owned file.
    fn file_ancestor(&self, path: &str) -> Option<usize> {
        ancestors(path)
            .filter(|dir| self.owners.contains_key(*dir))
            .map(str::len)
            .last()
    }

    /// Suffix the clashing component: the ancestor that is a file if there is
    /// one, otherwise the file name.
    fn relocate(&self, path: &str, suffix: &str) -> String {
        match self.file_ancestor(path) {
            Some(end) => format!("{}-{}{}", &path[..end], suffix, &path[end..]),
            None => with_suffix(path, suffix),
        }
    }
}

/// Every directory prefix of `path`: `a/b/c.css` → `a`, `a/b`.
fn ancestors(path: &str) -> impl Iterator<Item = &str> {
    path.match_indices('/').map(move |(i, _)| &path[..i])
}

/// `dir/name.ext` + `abc` → `dir/name-abc.ext`.
fn with_suffix(path: &str, suffix: &str) -> String {
    let (dir, file) = match path.rfind('/') {
        Some(i) => path.split_at(i + 1),
        None => ("", path),
    };
    match file.rfind('.') {
        Some(dot) if dot > 0 => format!("{}{}-{}{}", dir, &file[..dot], suffix, &file[dot..]),
        _ => format!("{}{}-{}", dir, file, suffix),
    }
}
