//! Integration tests for the harvester
//!
//! These tests use wiremock to create mock HTTP servers and run the full
//! harvest cycle end-to-end: listing pages, detail pages, validation,
//! deferred downloads, depth limits and finalization.

use std::sync::Arc;
use sumi_harvest::config::parse_config;
use sumi_harvest::storage::{finalize_run, FsStorage, ResultStore, SqliteResultStore};
use sumi_harvest::url::page_location;
use sumi_harvest::{CrawlResult, CrawlRunner};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Mounts an HTML page, optionally asserting how often it is requested
async fn mount_page(server: &MockServer, route: &str, body: &str, expected: Option<u64>) {
    let mock = Mock::given(method("GET")).and(path(route)).respond_with(
        ResponseTemplate::new(200)
            .set_body_string(body)
            .insert_header("content-type", "text/html; charset=utf-8"),
    );
    match expected {
        Some(times) => mock.expect(times).mount(server).await,
        None => mock.mount(server).await,
    }
}

/// Mounts a binary file, asserting how often it is requested
async fn mount_file(server: &MockServer, route: &str, content_type: &str, expected: u64) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_bytes(b"binary-content".to_vec())
                .insert_header("content-type", content_type),
        )
        .expect(expected)
        .mount(server)
        .await;
}

/// Runs a harvest of `spider_toml` against the mock server
///
/// `{base}` in the TOML is replaced by the server URI.
async fn harvest(server: &MockServer, work: &TempDir, spider_toml: &str) -> (CrawlResult, CrawlRunner) {
    let toml = spider_toml.replace("{base}", &server.uri());
    let config = parse_config(&toml).expect("invalid test config");
    let mut runner = CrawlRunner::with_http(
        config.spider,
        config.engine,
        Arc::new(FsStorage::new(work.path())),
        CancellationToken::new(),
    )
    .expect("Failed to create runner");
    let result = runner.run().await.expect("Harvest failed");
    (result, runner)
}

const POSTS_SPIDER: &str = r#"
[spider]
name = "posts"
max-depth = 1

[[spider.urls]]
base = "{base}/list"

[[spider.data-items]]
name = "post"
base = "li.post"

[[spider.data-items.collectors]]
link = "a.more"

[[spider.data-items.collectors.selectors]]
key = "title"
path = "h1"
kind = "text"
black-words = ["embargo"]

[[spider.data-items.collectors.selectors]]
key = "body"
path = "div.body"
kind = "text"
"#;

const POSTS_LISTING: &str = r#"<html><body><ul>
    <li class="post"><a class="more" href="/post/1">one</a></li>
    <li class="post"><a class="more" href="/post/2">two</a></li>
    </ul></body></html>"#;

fn detail_html(title: &str, body: &str) -> String {
    format!(
        r#"<html><body><h1>{}</h1><div class="body">{}</div></body></html>"#,
        title, body
    )
}

#[tokio::test]
async fn test_listing_and_detail_pages() {
    let server = MockServer::start().await;
    mount_page(&server, "/list", POSTS_LISTING, Some(1)).await;
    mount_page(&server, "/post/1", &detail_html("First", "Hello"), Some(1)).await;
    mount_page(&server, "/post/2", &detail_html("Second", "World"), Some(1)).await;

    let work = TempDir::new().unwrap();
    let (result, runner) = harvest(&server, &work, POSTS_SPIDER).await;

    let posts = &result.data["post"];
    assert_eq!(posts.len(), 2);
    assert_eq!(posts[0].values("title"), vec!["First"]);
    assert_eq!(posts[0].values("body"), vec!["Hello"]);
    assert_eq!(posts[1].values("title"), vec!["Second"]);

    let location = page_location(&format!("{}/list", server.uri()));
    assert_eq!(result.locations, vec![location.clone()]);
    let index = std::fs::read_to_string(work.path().join(&location).join("index.json")).unwrap();
    let index: serde_json::Value = serde_json::from_str(&index).unwrap();
    assert_eq!(index["data"]["post"].as_array().unwrap().len(), 2);

    let stats = runner.stats();
    assert_eq!(stats.rounds, 1);
    assert_eq!(stats.listing_fetched, 1);
    assert_eq!(stats.detail_fetched, 2);
    assert_eq!(stats.items_kept, 2);
}

#[tokio::test]
async fn test_black_word_rejects_item() {
    let server = MockServer::start().await;
    mount_page(&server, "/list", POSTS_LISTING, None).await;
    mount_page(&server, "/post/1", &detail_html("Regular news", "Hello"), None).await;
    mount_page(&server, "/post/2", &detail_html("Embargo notice", "Hidden"), None).await;

    let work = TempDir::new().unwrap();
    let (result, runner) = harvest(&server, &work, POSTS_SPIDER).await;

    let posts = &result.data["post"];
    assert_eq!(posts.len(), 1);
    assert_eq!(posts[0].values("title"), vec!["Regular news"]);
    assert_eq!(runner.stats().items_rejected, 1);
}

#[tokio::test]
async fn test_required_word_groups() {
    let spider = r#"
[spider]
name = "required"

[[spider.urls]]
base = "{base}/list"

[[spider.data-items]]
name = "post"
base = "li.post"

[[spider.data-items.collectors]]
link = "a.more"

[[spider.data-items.collectors.selectors]]
key = "body"
path = "div.body"
kind = "text"
required-words = [["alpha", "beta"], "gamma"]
"#;
    let listing = r#"<ul>
        <li class="post"><a class="more" href="/post/1">1</a></li>
        <li class="post"><a class="more" href="/post/2">2</a></li>
        <li class="post"><a class="more" href="/post/3">3</a></li>
        </ul>"#;

    let server = MockServer::start().await;
    mount_page(&server, "/list", listing, None).await;
    mount_page(&server, "/post/1", &detail_html("1", "Beta and ALPHA"), None).await;
    mount_page(&server, "/post/2", &detail_html("2", "alpha alone"), None).await;
    mount_page(&server, "/post/3", &detail_html("3", "just gamma"), None).await;

    let work = TempDir::new().unwrap();
    let (result, runner) = harvest(&server, &work, spider).await;

    let bodies: Vec<&str> = result.data["post"]
        .iter()
        .flat_map(|item| item.values("body"))
        .collect();
    assert_eq!(bodies, vec!["Beta and ALPHA", "just gamma"]);
    assert_eq!(runner.stats().items_rejected, 1);
}

#[tokio::test]
async fn test_collector_without_detail_links_leaves_other_items() {
    let spider = r#"
[spider]
name = "unlinked"

[[spider.urls]]
base = "{base}/list"

[[spider.data-items]]
name = "entry"
base = "li"

[[spider.data-items.collectors]]
[[spider.data-items.collectors.selectors]]
key = "title"
path = "span"
kind = "text"

[[spider.data-items]]
name = "attachment"
base = "li"

[[spider.data-items.collectors]]
link = "a.file"

[[spider.data-items.collectors.selectors]]
key = "name"
path = "h1"
kind = "text"
"#;
    let listing = r#"<ul>
        <li><span>A</span></li>
        <li><span>B</span></li>
        <li><span>C</span></li>
        </ul>"#;

    let server = MockServer::start().await;
    mount_page(&server, "/list", listing, Some(1)).await;

    let work = TempDir::new().unwrap();
    let (result, _) = harvest(&server, &work, spider).await;

    let titles: Vec<&str> = result.data["entry"]
        .iter()
        .flat_map(|item| item.values("title"))
        .collect();
    assert_eq!(titles, vec!["A", "B", "C"]);
    assert!(result.data["attachment"].is_empty());
}

#[tokio::test]
async fn test_max_depth_one_never_expands() {
    let spider = r#"
[spider]
name = "shallow"
max-depth = 1

[[spider.urls]]
base = "{base}/list"

[[spider.data-items]]
name = "entry"
base = "li"

[[spider.data-items.collectors]]
[[spider.data-items.collectors.selectors]]
key = "title"
path = "span"
kind = "text"
"#;
    let listing = r#"<ul><li><span>Only</span></li></ul><a href="/list/2">next</a>"#;

    let server = MockServer::start().await;
    mount_page(&server, "/list", listing, Some(1)).await;
    mount_page(&server, "/list/2", listing, Some(0)).await;

    let work = TempDir::new().unwrap();
    let (result, runner) = harvest(&server, &work, spider).await;

    assert_eq!(result.item_count(), 1);
    assert_eq!(runner.stats().rounds, 1);
}

#[tokio::test]
async fn test_pages_visited_once_at_minimum_depth() {
    let spider = r#"
[spider]
name = "graph"
max-depth = 3
expand-links = ["a.go"]

[[spider.urls]]
base = "{base}/a"

[[spider.data-items]]
name = "page"
base = "main"

[[spider.data-items.collectors]]
[[spider.data-items.collectors.selectors]]
key = "name"
path = "h1"
kind = "text"
"#;

    let server = MockServer::start().await;
    // a -> b, c ; b -> c, d ; c -> a ; d is only reachable at depth 3
    mount_page(
        &server,
        "/a",
        r#"<main><h1>a</h1><a class="go" href="/b">b</a><a class="go" href="/c">c</a></main>"#,
        Some(1),
    )
    .await;
    mount_page(
        &server,
        "/b",
        r#"<main><h1>b</h1><a class="go" href="/c">c</a><a class="go" href="/d">d</a></main>"#,
        Some(1),
    )
    .await;
    mount_page(
        &server,
        "/c",
        r#"<main><h1>c</h1><a class="go" href="/a">a</a></main>"#,
        Some(1),
    )
    .await;
    mount_page(
        &server,
        "/d",
        r#"<main><h1>d</h1><a class="go" href="/e">e</a></main>"#,
        Some(1),
    )
    .await;
    mount_page(&server, "/e", "<main><h1>e</h1></main>", Some(0)).await;

    let work = TempDir::new().unwrap();
    let (result, runner) = harvest(&server, &work, spider).await;

    let mut names: Vec<&str> = result.data["page"]
        .iter()
        .flat_map(|item| item.values("name"))
        .collect();
    names.sort_unstable();
    assert_eq!(names, vec!["a", "b", "c", "d"]);
    assert_eq!(runner.stats().rounds, 3);
    assert_eq!(result.locations.len(), 4);
}

const MEDIA_SPIDER: &str = r#"
[spider]
name = "media"

[[spider.urls]]
base = "{base}/list"

[[spider.data-items]]
name = "post"
base = "li.post"

[[spider.data-items.collectors]]
link = "a.more"

[[spider.data-items.collectors.selectors]]
key = "title"
path = "h1"
kind = "text"
black-words = ["embargo"]

[[spider.data-items.collectors.selectors]]
key = "body"
path = "div.body"
kind = "html"

[[spider.data-items.collectors.selectors]]
key = "file"
path = "a.attachment"
attribute = "href"
kind = "binary"
"#;

#[tokio::test]
async fn test_deferred_downloads_only_for_valid_items() {
    let server = MockServer::start().await;
    mount_page(&server, "/list", POSTS_LISTING, None).await;
    mount_page(
        &server,
        "/post/1",
        r#"<html><body><h1>Public</h1>
        <div class="body"><p>Intro</p><img src="/img/cat.png" alt=" Cat "></div>
        <a class="attachment" href="/files/report.pdf">Report</a></body></html>"#,
        None,
    )
    .await;
    mount_page(
        &server,
        "/post/2",
        r#"<html><body><h1>Embargo</h1>
        <div class="body"><img src="/img/secret.png"></div>
        <a class="attachment" href="/files/secret.pdf">Secret</a></body></html>"#,
        None,
    )
    .await;
    mount_file(&server, "/img/cat.png", "image/png", 1).await;
    mount_file(&server, "/files/report.pdf", "application/pdf", 1).await;
    mount_file(&server, "/img/secret.png", "image/png", 0).await;
    mount_file(&server, "/files/secret.pdf", "application/pdf", 0).await;

    let work = TempDir::new().unwrap();
    let (result, _) = harvest(&server, &work, MEDIA_SPIDER).await;

    let posts = &result.data["post"];
    assert_eq!(posts.len(), 1);
    let post = &posts[0];
    let location = page_location(&format!("{}/list", server.uri()));

    let files = post.values("file");
    assert_eq!(files.len(), 1);
    assert!(files[0].starts_with(&format!("{}/", location)));
    assert!(files[0].ends_with(".pdf"));
    assert_eq!(post.media, vec![files[0].to_string()]);
    assert!(work.path().join(files[0]).exists());

    assert_eq!(post.images.len(), 1);
    assert_eq!(post.images[0].caption, "Cat");
    assert!(post.images[0].path.ends_with(".png"));
    assert!(work.path().join(&post.images[0].path).exists());

    let body = post.values("body");
    assert!(body[0].contains(&format!("src=\"{}\"", post.images[0].path)));
    assert!(!body[0].contains("/img/cat.png"));
}

#[tokio::test]
async fn test_failed_detail_fetch_keeps_other_items() {
    let server = MockServer::start().await;
    mount_page(&server, "/list", POSTS_LISTING, None).await;
    mount_page(&server, "/post/1", &detail_html("First", "Hello"), None).await;
    Mock::given(method("GET"))
        .and(path("/post/2"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let work = TempDir::new().unwrap();
    let (result, runner) = harvest(&server, &work, POSTS_SPIDER).await;

    assert_eq!(result.data["post"].len(), 1);
    assert_eq!(runner.stats().detail_failed, 1);
    assert_eq!(runner.stats().items_dropped, 1);
}

#[tokio::test]
async fn test_finalize_and_store_result() {
    let server = MockServer::start().await;
    mount_page(&server, "/list", POSTS_LISTING, None).await;
    mount_page(&server, "/post/1", &detail_html("First", "Hello"), None).await;
    mount_page(&server, "/post/2", &detail_html("Second", "World"), None).await;

    let work_dir = TempDir::new().unwrap();
    let storage_dir = TempDir::new().unwrap();
    let (result, _) = harvest(&server, &work_dir, POSTS_SPIDER).await;

    let work = FsStorage::new(work_dir.path());
    let storage = FsStorage::new(storage_dir.path());
    let destination = "posts/task-1";
    let target = finalize_run(&work, &storage, destination, &result, &result.locations).unwrap();

    let location = &result.locations[0];
    assert!(target.join("index.json").exists());
    assert!(target.join(location).join("index.json").exists());
    assert!(!work_dir.path().join(location).exists());

    let mut store = SqliteResultStore::new(&storage_dir.path().join("results.db")).unwrap();
    let data = serde_json::to_value(&result.data).unwrap();
    store.save_result("task-1", &data, Some(destination)).unwrap();

    let record = store.get_result("task-1").unwrap().unwrap();
    assert_eq!(record.data["post"].as_array().unwrap().len(), 2);
    assert_eq!(record.local_path.as_deref(), Some(destination));

    assert!(store.delete_result("task-1", &storage).unwrap());
    assert!(store.get_result("task-1").unwrap().is_none());
    assert!(!target.exists());
}
