//! wayback-mirror - save a Wayback Machine snapshot as a self-contained local copy.
//!
//! The pipeline parses the snapshot URL, downloads the archived page,
//! discovers the stylesheets, scripts, images and favicons it references,
//! downloads each one through the archive, and writes an `index.html` that
//! points at the local files.

pub mod archive;
pub mod config;
pub mod http_client;
pub mod mirror;

pub use archive::{parse_snapshot, resolve, SnapshotReference};
pub use config::MirrorConfig;
pub use mirror::{MirrorError, MirrorEvent, MirrorSummary, MirrorWriter};
