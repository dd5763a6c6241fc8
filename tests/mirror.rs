//! End-to-end mirror runs against a local stand-in for the archive.

use std::path::{Path, PathBuf};

use tempfile::TempDir;
use tokio::sync::mpsc;
use wiremock::matchers::{method, path_regex};
use wiremock::{Mock, MockServer, ResponseTemplate};

use wayback_mirror::{MirrorConfig, MirrorError, MirrorEvent, MirrorWriter};

const TIMESTAMP: &str = "20160328000145";

fn config(output: &Path) -> MirrorConfig {
    MirrorConfig {
        max_attempts: 2,
        retry_delay_ms: 0,
        page_timeout_secs: 5,
        asset_timeout_secs: 5,
        asset_pause_ms: 0,
        output_dir: Some(output.to_path_buf()),
        ..MirrorConfig::default()
    }
}

fn snapshot_url(server: &MockServer) -> String {
    format!("{}/web/{}/http://example.com/", server.uri(), TIMESTAMP)
}

fn mirror_dir(output: &TempDir) -> PathBuf {
    output.path().join(format!("example.com_{}", TIMESTAMP))
}

async fn serve(server: &MockServer, pattern: &str, body: impl Into<Vec<u8>>) {
    Mock::given(method("GET"))
        .and(path_regex(pattern))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(body.into()))
        .mount(server)
        .await;
}

async fn serve_page(server: &MockServer, html: String) {
    Mock::given(method("GET"))
        .and(path_regex(r"^/web/20160328000145/http:/+example\.com/?$"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "text/html; charset=utf-8")
                .set_body_string(html),
        )
        .mount(server)
        .await;
}

/// Page with one stylesheet, one script and one image, all archive-qualified.
fn basic_page(server: &MockServer) -> String {
    let archive = format!("{}/web/{}", server.uri(), TIMESTAMP);
    format!(
        r#"<!DOCTYPE html>
<html><head>
<script src="//archive.org/includes/athena.js"></script>
<!-- End Wayback Rewrite JS Include -->
<title>Example</title>
<link rel="stylesheet" href="{a}cs_/http://example.com/css/site.css">
<script src="{a}js_/http://example.com/js/app.js"></script>
</head><body>
<img src="{a}im_/http://example.com/images/logo.png" alt="logo">
<a href="{a}/http://example.com/about.html">About</a>
</body></html>
<!-- FILE ARCHIVED ON 00:01:45 Mar 28, 2016 -->"#,
        a = archive
    )
}

#[tokio::test]
async fn mirrors_page_and_assets() {
    let server = MockServer::start().await;
    serve_page(&server, basic_page(&server)).await;
    serve(&server, r"/css/site\.css$", "body { color: red }").await;
    serve(&server, r"/js/app\.js$", "console.log('hi');").await;
    serve(&server, r"/images/logo\.png$", vec![0x89u8, b'P', b'N', b'G']).await;
    serve(&server, r"/favicon\.ico$", vec![0u8, 0, 1, 0]).await;

    let output = tempfile::tempdir().unwrap();
    let summary = MirrorWriter::new(config(output.path()))
        .run(&snapshot_url(&server))
        .await
        .unwrap();

    let dir = mirror_dir(&output);
    assert_eq!(summary.output_dir, dir);
    assert_eq!(summary.discovered, 4);
    assert_eq!(summary.downloaded, 4);
    assert_eq!(summary.failed, 0);

    assert_eq!(
        std::fs::read_to_string(dir.join("example.com/css/site.css")).unwrap(),
        "body { color: red }"
    );
    assert_eq!(
        std::fs::read_to_string(dir.join("example.com/js/app.js")).unwrap(),
        "console.log('hi');"
    );
    assert_eq!(
        std::fs::read(dir.join("example.com/images/logo.png")).unwrap(),
        vec![0x89u8, b'P', b'N', b'G']
    );

    let index = std::fs::read_to_string(dir.join("index.html")).unwrap();
    assert!(index.contains(r#"href="example.com/css/site.css""#), "{}", index);
    assert!(index.contains(r#"src="example.com/js/app.js""#), "{}", index);
    assert!(index.contains(r#"src="example.com/images/logo.png""#), "{}", index);
    assert!(index.contains(r#"href="http://example.com/about.html""#), "{}", index);

    // Archive injections are gone and nothing points back at the archive.
    assert!(!index.contains("athena.js"));
    assert!(!index.contains("FILE ARCHIVED ON"));
    assert!(!index.contains(&server.uri()));
}

#[tokio::test]
async fn failed_asset_is_left_pointing_at_archive() {
    let server = MockServer::start().await;
    serve_page(&server, basic_page(&server)).await;
    serve(&server, r"/css/site\.css$", "body {}").await;
    serve(&server, r"/js/app\.js$", "1;").await;
    serve(&server, r"/favicon\.ico$", "ico").await;
    Mock::given(method("GET"))
        .and(path_regex(r"/images/logo\.png$"))
        .respond_with(ResponseTemplate::new(500))
        .expect(2)
        .mount(&server)
        .await;

    let output = tempfile::tempdir().unwrap();
    let summary = MirrorWriter::new(config(output.path()))
        .run(&snapshot_url(&server))
        .await
        .unwrap();

    assert_eq!(summary.downloaded, 3);
    assert_eq!(summary.failed, 1);

    let dir = mirror_dir(&output);
    assert!(!dir.join("example.com/images/logo.png").exists());
    assert!(dir.join("example.com/css/site.css").exists());

    let index = std::fs::read_to_string(dir.join("index.html")).unwrap();
    let original = format!(
        r#"src="{}/web/{}im_/http://example.com/images/logo.png""#,
        server.uri(),
        TIMESTAMP
    );
    assert!(index.contains(&original), "{}", index);
    assert!(index.contains(r#"href="example.com/css/site.css""#));
}

#[tokio::test]
async fn page_without_favicon_gets_default() {
    let server = MockServer::start().await;
    serve_page(
        &server,
        "<html><head><title>No icon</title></head><body><p>hi</p></body></html>".to_string(),
    )
    .await;
    Mock::given(method("GET"))
        .and(path_regex(r"^/web/20160328000145/http:/+example\.com/favicon\.ico$"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![1u8, 2, 3]))
        .expect(1)
        .mount(&server)
        .await;

    let output = tempfile::tempdir().unwrap();
    let summary = MirrorWriter::new(config(output.path()))
        .run(&snapshot_url(&server))
        .await
        .unwrap();

    assert_eq!(summary.downloaded, 1);
    let dir = mirror_dir(&output);
    assert_eq!(
        std::fs::read(dir.join("example.com/favicon.ico")).unwrap(),
        vec![1u8, 2, 3]
    );
    assert!(dir.join("index.html").exists());
}

#[tokio::test]
async fn page_fetch_failure_aborts_run() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(503))
        .expect(2)
        .mount(&server)
        .await;

    let output = tempfile::tempdir().unwrap();
    let err = MirrorWriter::new(config(output.path()))
        .run(&snapshot_url(&server))
        .await
        .unwrap_err();

    assert!(matches!(err, MirrorError::PageFetch(_)), "{}", err);
    // The directory is created up front and never rolled back.
    let dir = mirror_dir(&output);
    assert!(dir.is_dir());
    assert!(!dir.join("index.html").exists());
}

#[tokio::test]
async fn colliding_paths_are_kept_apart() {
    let server = MockServer::start().await;
    let archive = format!("{}/web/{}", server.uri(), TIMESTAMP);
    serve_page(
        &server,
        format!(
            r#"<html><head><link rel="icon" href="{a}im_/http://example.com/i.ico">
<link rel="stylesheet" href="{a}cs_/http://example.com/a.css?v=1">
<link rel="stylesheet" href="{a}cs_/http://example.com/a.css?v=2">
</head><body></body></html>"#,
            a = archive
        ),
    )
    .await;
    serve(&server, r"/i\.ico$", "icon").await;
    Mock::given(method("GET"))
        .and(path_regex(r"/a\.css$"))
        .and(wiremock::matchers::query_param("v", "1"))
        .respond_with(ResponseTemplate::new(200).set_body_string("one"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path_regex(r"/a\.css$"))
        .and(wiremock::matchers::query_param("v", "2"))
        .respond_with(ResponseTemplate::new(200).set_body_string("two"))
        .mount(&server)
        .await;

    let output = tempfile::tempdir().unwrap();
    let summary = MirrorWriter::new(config(output.path()))
        .run(&snapshot_url(&server))
        .await
        .unwrap();
    assert_eq!(summary.downloaded, 3);

    let dir = mirror_dir(&output);
    assert_eq!(
        std::fs::read_to_string(dir.join("example.com/a.css")).unwrap(),
        "one"
    );
    let css_dir: Vec<String> = std::fs::read_dir(dir.join("example.com"))
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .filter(|name| name.starts_with("a-") && name.ends_with(".css"))
        .collect();
    assert_eq!(css_dir.len(), 1);
    assert_eq!(
        std::fs::read_to_string(dir.join("example.com").join(&css_dir[0])).unwrap(),
        "two"
    );

    let index = std::fs::read_to_string(dir.join("index.html")).unwrap();
    assert!(index.contains(r#"href="example.com/a.css""#));
    assert!(index.contains(&format!(r#"href="example.com/{}""#, css_dir[0])));
}

#[tokio::test]
async fn concurrent_downloads_report_events_in_order() {
    let server = MockServer::start().await;
    serve_page(&server, basic_page(&server)).await;
    serve(&server, r"/css/site\.css$", "css").await;
    serve(&server, r"/js/app\.js$", "js").await;
    serve(&server, r"/images/logo\.png$", "png").await;
    serve(&server, r"/favicon\.ico$", "ico").await;

    let output = tempfile::tempdir().unwrap();
    let (tx, mut rx) = mpsc::channel(32);
    let writer = MirrorWriter::new(MirrorConfig {
        concurrency: 3,
        ..config(output.path())
    })
    .with_events(tx);

    let summary = writer.run(&snapshot_url(&server)).await.unwrap();
    drop(writer);
    assert_eq!(summary.downloaded, 4);

    let mut saved = Vec::new();
    let mut finished = false;
    while let Some(event) = rx.recv().await {
        match event {
            MirrorEvent::AssetSaved { path, .. } => saved.push(path),
            MirrorEvent::Finished { .. } => finished = true,
            _ => {}
        }
    }
    assert!(finished);
    assert_eq!(
        saved,
        vec![
            "example.com/favicon.ico",
            "example.com/css/site.css",
            "example.com/js/app.js",
            "example.com/images/logo.png",
        ]
    );
}

#[tokio::test]
async fn file_and_directory_with_same_name_both_mirrored() {
    let server = MockServer::start().await;
    let archive = format!("{}/web/{}", server.uri(), TIMESTAMP);
    serve_page(
        &server,
        format!(
            r#"<html><head>
<script src="{a}js_/http://example.com/js/app/main.js"></script>
<script src="{a}js_/http://example.com/js/app"></script>
</head><body><img src="{a}im_/http://example.com/ok.png"></body></html>"#,
            a = archive
        ),
    )
    .await;
    serve(&server, r"/js/app/main\.js$", "main").await;
    serve(&server, r"/js/app$", "app").await;
    serve(&server, r"/ok\.png$", "png").await;
    serve(&server, r"/favicon\.ico$", "ico").await;

    let output = tempfile::tempdir().unwrap();
    let summary = MirrorWriter::new(config(output.path()))
        .run(&snapshot_url(&server))
        .await
        .unwrap();
    assert_eq!(summary.downloaded, 4);
    assert_eq!(summary.failed, 0);

    let dir = mirror_dir(&output);
    assert_eq!(
        std::fs::read_to_string(dir.join("example.com/js/app/main.js")).unwrap(),
        "main"
    );
    assert!(dir.join("example.com/ok.png").exists());

    let relocated: Vec<String> = std::fs::read_dir(dir.join("example.com/js"))
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .filter(|name| name.starts_with("app-"))
        .collect();
    assert_eq!(relocated.len(), 1);
    assert_eq!(
        std::fs::read_to_string(dir.join("example.com/js").join(&relocated[0])).unwrap(),
        "app"
    );

    let index = std::fs::read_to_string(dir.join("index.html")).unwrap();
    assert!(index.contains(r#"src="example.com/js/app/main.js""#), "{}", index);
    assert!(
        index.contains(&format!(r#"src="example.com/js/{}""#, relocated[0])),
        "{}",
        index
    );
    assert!(index.contains(r#"src="example.com/ok.png""#), "{}", index);
}
