//! Removing the archive's own markup from a captured page.
//!
//! The Wayback Machine injects its rewrite scripts at the top of `<head>`,
//! a toolbar at the top of `<body>`, and capture metadata comments after
//! `</html>`. None of it belongs in the mirror.

use std::sync::OnceLock;

use regex::Regex;

fn head_injection() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?is)(<head\b[^>]*>).*?<!--\s*End Wayback Rewrite JS Include\s*-->")
            .expect("valid head regex")
    })
}

fn toolbar() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?is)<!--\s*BEGIN WAYBACK TOOLBAR INSERT\s*-->.*?<!--\s*END WAYBACK TOOLBAR INSERT\s*-->")
            .expect("valid toolbar regex")
    })
}

fn after_html() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"(?is)</html\s*>.*$").expect("valid tail regex"))
}

/// Strip archive-injected head content, the toolbar, and anything after `</html>`.
pub fn sanitize(html: &str) -> String {
    let out = head_injection().replace(html, "$1");
    let out = toolbar().replace(&out, "").into_owned();
    after_html().replace(&out, "</html>").into_owned()
}
