//! Mapping archive URLs to paths inside the mirror directory.

use std::sync::OnceLock;

use regex::Regex;
use thiserror::Error;
use url::Url;

/// An asset URL that cannot be turned into a safe local path.
#[derive(Debug, Error)]
#[error("cannot map {url} to a local path: {reason}")]
pub struct PathResolutionError {
    pub url: String,
    pub reason: String,
}

impl PathResolutionError {
    fn new(url: &str, reason: impl Into<String>) -> Self {
        Self {
            url: url.to_string(),
            reason: reason.into(),
        }
    }
}

/// Matches a capture timestamp with an optional rewrite marker (`im_`, `cs_`, `js_`, ...).
fn timestamp_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^\d+(?:[a-z]{2}_)?$").expect("valid timestamp regex"))
}

fn scheme_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"(?i)^https?:/+").expect("valid scheme regex"))
}

/// Replace characters that are illegal in file names with `_`.
pub fn sanitize_segment(segment: &str) -> String {
    segment
        .chars()
        .map(|c| match c {
            '<' | '>' | ':' | '"' | '|' | '?' | '*' | '\\' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect()
}

/// Convert an archive URL into a relative path for the mirror directory.
///
/// `https://web.archive.org/web/2016im_/http://example.com/img/a.png`
/// becomes `example.com/img/a.png`.
pub fn local_path(asset_url: &str) -> Result<String, PathResolutionError> {
    let parsed = Url::parse(asset_url).map_err(|e| PathResolutionError::new(asset_url, e.to_string()))?;

    let segments: Vec<&str> = parsed
        .path_segments()
        .ok_or_else(|| PathResolutionError::new(asset_url, "URL has no path"))?
        .collect();

    let rest = match segments.as_slice() {
        ["web", timestamp, rest @ ..] if timestamp_pattern().is_match(timestamp) => rest,
        all => all,
    };

    let joined = rest.join("/");
    let stripped = scheme_pattern().replace(&joined, "");
    let trimmed = stripped.trim_start_matches('/');

    if trimmed.is_empty() {
        return Err(PathResolutionError::new(asset_url, "empty path"));
    }
    if trimmed.ends_with('/') {
        return Err(PathResolutionError::new(asset_url, "path names a directory"));
    }

    let mut safe = Vec::new();
    for segment in trimmed.split('/') {
        let decoded = urlencoding::decode(segment)
            .map_err(|e| PathResolutionError::new(asset_url, e.to_string()))?;
        match decoded.as_ref() {
            "" | "." => continue,
            ".." => safe.push("_".to_string()),
            other => safe.push(sanitize_segment(&other.replace('/', "_"))),
        }
    }

    if safe.is_empty() {
        return Err(PathResolutionError::new(asset_url, "empty path"));
    }

    Ok(safe.join("/"))
}
