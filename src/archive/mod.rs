//! Wayback Machine addressing.
//!
//! A snapshot URL looks like `https://web.archive.org/web/<timestamp>/<original-url>`.
//! Everything the page references has to be routed back through that scheme
//! before it can be fetched, and stripped out of it again before the page is
//! saved locally.

pub mod path;

use std::borrow::Cow;

use regex::Regex;
use thiserror::Error;
use tracing::debug;
use url::Url;

pub use path::{local_path, sanitize_segment, PathResolutionError};

/// Errors raised while interpreting a snapshot URL.
#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("malformed snapshot URL {url}: {reason}")]
    Malformed { url: String, reason: String },
}

impl SnapshotError {
    fn malformed(url: &str, reason: impl Into<String>) -> Self {
        SnapshotError::Malformed {
            url: url.to_string(),
            reason: reason.into(),
        }
    }
}

/// The snapshot being mirrored.
///
/// Derived once from the command-line URL and shared read-only by every
/// stage of the run.
#[derive(Debug, Clone)]
pub struct SnapshotReference {
    /// Capture timestamp segment, e.g. `20160328000145`.
    pub timestamp: String,
    /// The archived site's URL, e.g. `http://www.google.com/`.
    pub original_url: String,
    /// Host of the original URL.
    pub domain: String,
    /// `scheme://host[:port]` of the archive serving the snapshot.
    pub archive_origin: String,
    archive_authority: String,
    prefix_pattern: Regex,
}

impl SnapshotReference {
    /// Name of the local mirror directory: `<domain>_<timestamp>`.
    pub fn mirror_dir_name(&self) -> String {
        sanitize_segment(&format!("{}_{}", self.domain, self.timestamp))
    }

    /// Archive URL of the site's default favicon.
    pub fn default_favicon_url(&self) -> String {
        format!(
            "{}/web/{}/http://{}/favicon.ico",
            self.archive_origin, self.timestamp, self.domain
        )
    }

    /// Route an absolute URL through this snapshot's timestamped addressing.
    fn archived(&self, url: &str) -> String {
        format!("{}/web/{}/{}", self.archive_origin, self.timestamp, url)
    }

    fn is_archive_url(&self, url: &Url) -> bool {
        url.host_str().is_some_and(|host| {
            let authority = match url.port() {
                Some(port) => format!("{}:{}", host, port),
                None => host.to_string(),
            };
            authority.eq_ignore_ascii_case(&self.archive_authority)
        })
    }
}

/// Parse a snapshot URL into its timestamp, original URL and domain.
pub fn parse_snapshot(snapshot_url: &str) -> Result<SnapshotReference, SnapshotError> {
    let parsed = Url::parse(snapshot_url.trim())
        .map_err(|e| SnapshotError::malformed(snapshot_url, e.to_string()))?;

    let host = parsed
        .host_str()
        .ok_or_else(|| SnapshotError::malformed(snapshot_url, "missing archive host"))?;
    let archive_authority = match parsed.port() {
        Some(port) => format!("{}:{}", host, port),
        None => host.to_string(),
    };
    let archive_origin = format!("{}://{}", parsed.scheme(), archive_authority);

    // The original URL keeps its own `//`, so split the raw path instead of
    // going through `path_segments()`.
    let rest = parsed
        .path()
        .strip_prefix("/web/")
        .ok_or_else(|| SnapshotError::malformed(snapshot_url, "path does not start with /web/"))?;
    let (timestamp, original) = rest
        .split_once('/')
        .ok_or_else(|| SnapshotError::malformed(snapshot_url, "missing original URL"))?;
    if timestamp.is_empty() {
        return Err(SnapshotError::malformed(snapshot_url, "empty timestamp"));
    }
    if original.is_empty() {
        return Err(SnapshotError::malformed(snapshot_url, "missing original URL"));
    }

    // Schemeless originals are http.
    let mut original_url = if has_http_scheme(original) {
        original.to_string()
    } else {
        format!("http://{}", original)
    };
    if let Some(query) = parsed.query() {
        original_url.push('?');
        original_url.push_str(query);
    }

    let domain = original_host(&original_url).ok_or_else(|| {
        SnapshotError::malformed(snapshot_url, format!("no host in {}", original_url))
    })?;

    let prefix_pattern = Regex::new(&format!(
        r"https?://{}/web/\d+\w*/",
        regex::escape(&archive_authority)
    ))
    .map_err(|e| SnapshotError::malformed(snapshot_url, e.to_string()))?;

    Ok(SnapshotReference {
        timestamp: timestamp.to_string(),
        original_url,
        domain,
        archive_origin,
        archive_authority,
        prefix_pattern,
    })
}

fn has_http_scheme(url: &str) -> bool {
    let lower = url.get(..6).unwrap_or(url).to_ascii_lowercase();
    lower.starts_with("http:") || lower.starts_with("https:")
}

fn original_host(original_url: &str) -> Option<String> {
    Url::parse(original_url)
        .ok()?
        .host_str()
        .filter(|h| !h.is_empty())
        .map(|h| h.to_string())
}

/// Normalize a URL found in the page into a fully-qualified archive URL.
///
/// Returns `None` for values that must not be downloaded (`data:` URLs and
/// empty attributes).
pub fn resolve(raw: &str, snapshot: &SnapshotReference) -> Option<String> {
    let raw = raw.trim();
    if raw.is_empty() || raw.get(..5).is_some_and(|s| s.eq_ignore_ascii_case("data:")) {
        return None;
    }

    let absolute = if let Some(rest) = raw.strip_prefix("//") {
        format!("https://{}", rest)
    } else if raw.starts_with('/') {
        return Some(format!("{}{}", snapshot.archive_origin, raw));
    } else {
        raw.to_string()
    };

    match Url::parse(&absolute) {
        Ok(url) if snapshot.is_archive_url(&url) => Some(absolute),
        Ok(_) => Some(snapshot.archived(&absolute)),
        Err(url::ParseError::RelativeUrlWithoutBase) => {
            // Path-relative reference: anchor it on the archived page first.
            let joined = Url::parse(&snapshot.original_url)
                .and_then(|base| base.join(&absolute))
                .ok()?;
            debug!("resolved relative {} against {}", raw, snapshot.original_url);
            Some(snapshot.archived(joined.as_str()))
        }
        Err(e) => {
            debug!("unresolvable URL {}: {}", raw, e);
            None
        }
    }
}

/// Remove every `https?://<archive-host>/web/<timestamp>/` prefix from a value.
pub fn strip_archive_prefix<'a>(value: &'a str, snapshot: &SnapshotReference) -> Cow<'a, str> {
    snapshot.prefix_pattern.replace_all(value, "")
}

#[cfg(test)]
mod tests {
    use super::*;

    const SNAPSHOT: &str = "https://web.archive.org/web/20160328000145/http://www.google.com/";

    fn snapshot() -> SnapshotReference {
        parse_snapshot(SNAPSHOT).unwrap()
    }

    #[test]
    fn test_parse_snapshot() {
        let snap = snapshot();
        assert_eq!(snap.timestamp, "20160328000145");
        assert_eq!(snap.original_url, "http://www.google.com/");
        assert_eq!(snap.domain, "www.google.com");
        assert_eq!(snap.archive_origin, "https://web.archive.org");
        assert_eq!(snap.mirror_dir_name(), "www.google.com_20160328000145");
    }

    #[test]
    fn test_parse_snapshot_rebuilds_path() {
        let snap = snapshot();
        let rebuilt = format!(
            "{}/web/{}/{}",
            snap.archive_origin, snap.timestamp, snap.original_url
        );
        assert_eq!(rebuilt, SNAPSHOT);
    }

    #[test]
    fn test_parse_snapshot_keeps_query_and_port() {
        let snap =
            parse_snapshot("http://127.0.0.1:8080/web/2020/https://example.com/page?id=4").unwrap();
        assert_eq!(snap.archive_origin, "http://127.0.0.1:8080");
        assert_eq!(snap.archive_authority, "127.0.0.1:8080");
        assert_eq!(snap.original_url, "https://example.com/page?id=4");
        assert_eq!(snap.domain, "example.com");
    }

    #[test]
    fn test_parse_snapshot_schemeless_original() {
        let snap = parse_snapshot("https://web.archive.org/web/2016/example.org/").unwrap();
        assert_eq!(snap.domain, "example.org");
        assert_eq!(snap.original_url, "http://example.org/");
    }

    #[test]
    fn test_resolve_relative_on_schemeless_snapshot() {
        let snap = parse_snapshot("https://web.archive.org/web/2016/example.org/blog/").unwrap();
        assert_eq!(
            resolve("img/a.png", &snap).unwrap(),
            "https://web.archive.org/web/2016/http://example.org/blog/img/a.png"
        );
    }

    #[test]
    fn test_parse_snapshot_rejects_malformed() {
        for bad in [
            "not a url",
            "https://web.archive.org/",
            "https://web.archive.org/save/2016/http://a.com/",
            "https://web.archive.org/web/2016",
            "https://web.archive.org/web//http://a.com/",
            "https://web.archive.org/web/2016/",
        ] {
            assert!(
                matches!(parse_snapshot(bad), Err(SnapshotError::Malformed { .. })),
                "{} should be rejected",
                bad
            );
        }
    }

    #[test]
    fn test_resolve_skips_data_urls() {
        let snap = snapshot();
        assert_eq!(resolve("data:image/png;base64,AAAA", &snap), None);
        assert_eq!(resolve("DATA:text/plain,hi", &snap), None);
        assert_eq!(resolve("   ", &snap), None);
    }

    #[test]
    fn test_resolve_protocol_relative() {
        let snap = snapshot();
        assert_eq!(
            resolve("//cdn.example.com/lib.js", &snap).unwrap(),
            "https://web.archive.org/web/20160328000145/https://cdn.example.com/lib.js"
        );
        assert_eq!(
            resolve("//web.archive.org/web/2016js_/http://a.com/x.js", &snap).unwrap(),
            "https://web.archive.org/web/2016js_/http://a.com/x.js"
        );
    }

    #[test]
    fn test_resolve_root_relative_not_retimestamped() {
        let snap = snapshot();
        assert_eq!(
            resolve("/web/20160328000145cs_/http://www.google.com/a.css", &snap).unwrap(),
            "https://web.archive.org/web/20160328000145cs_/http://www.google.com/a.css"
        );
        assert_eq!(
            resolve("/static/a.css", &snap).unwrap(),
            "https://web.archive.org/static/a.css"
        );
    }

    #[test]
    fn test_resolve_foreign_and_relative() {
        let snap = snapshot();
        assert_eq!(
            resolve("http://www.google.com/logo.png", &snap).unwrap(),
            "https://web.archive.org/web/20160328000145/http://www.google.com/logo.png"
        );
        assert_eq!(
            resolve("images/logo.png", &snap).unwrap(),
            "https://web.archive.org/web/20160328000145/http://www.google.com/images/logo.png"
        );
    }

    #[test]
    fn test_resolve_is_idempotent() {
        let snap = snapshot();
        for raw in [
            "/web/2016im_/http://a.com/b.png",
            "http://a.com/c.css",
            "//a.com/d.js",
            "e/f.gif",
            "https://web.archive.org/web/2016/http://a.com/",
        ] {
            let once = resolve(raw, &snap).unwrap();
            assert_eq!(resolve(&once, &snap).unwrap(), once);
        }
    }

    #[test]
    fn test_strip_archive_prefix() {
        let snap = snapshot();
        assert_eq!(
            strip_archive_prefix(
                "https://web.archive.org/web/20160328000145/http://www.google.com/intl/",
                &snap
            ),
            "http://www.google.com/intl/"
        );
        assert_eq!(
            strip_archive_prefix("http://web.archive.org/web/2016im_/http://a.com/x.png", &snap),
            "http://a.com/x.png"
        );
        assert_eq!(strip_archive_prefix("/relative/path", &snap), "/relative/path");
    }
}
