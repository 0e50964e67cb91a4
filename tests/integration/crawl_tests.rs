//! End-to-end tests for the orchestrator
//!
//! Forum pages and image hosts are served by one wiremock server.

use crate::common::{forum_config, image_bytes};
use forum_loader::crawler::HttpPageFetcher;
use forum_loader::state::{LinkStatus, PageStatus};
use forum_loader::storage::{LinkChanges, NewLink, SqliteStorage, Storage};
use forum_loader::Orchestrator;
use std::path::Path;
use tempfile::TempDir;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn post(title: &str, images: &[String]) -> String {
    let links: String = images
        .iter()
        .map(|url| format!(r#"<a href="{}">img</a>"#, url))
        .collect();
    format!(
        r#"<div class="list-row"><div class="postbody">
             <span class="font-weight-bold">{}</span><br>{}</div></div>"#,
        title, links
    )
}

fn page_html(posts: &[String], next: Option<&str>) -> String {
    let nav = match next {
        Some(href) => format!(
            r#"<nav aria-label="Page navigation"><a class="page-link" href="{}">Next</a></nav>"#,
            href
        ),
        None => String::new(),
    };
    format!("<html><body>{}{}</body></html>", posts.concat(), nav)
}

fn html_response(body: String) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_raw(body.into_bytes(), "text/html")
}

async fn mount_image(server: &MockServer, name: &str, expected: u64) -> Vec<u8> {
    let body = image_bytes(300 + name.len() * 17);
    Mock::given(method("GET"))
        .and(path(format!("/images/{}", name)))
        .respond_with(ResponseTemplate::new(200).set_body_raw(body.clone(), "image/jpeg"))
        .expect(expected)
        .mount(server)
        .await;
    body
}

fn image_url(server: &MockServer, name: &str) -> String {
    format!("{}/images/{}", server.uri(), name)
}

fn host_dir(root: &Path, sub: &str) -> std::path::PathBuf {
    root.join(sub).join("127.0.0.1")
}

#[tokio::test]
async fn test_end_to_end_crawl_with_pagination() {
    let server = MockServer::start().await;
    let a = mount_image(&server, "a.jpg", 1).await;
    mount_image(&server, "b.jpg", 1).await;
    mount_image(&server, "c.png", 1).await;

    let page0 = page_html(
        &[
            post("First post", &[image_url(&server, "a.jpg"), image_url(&server, "b.jpg")]),
            post("Text only", &[]),
        ],
        Some("./viewtopic.php?t=7&start=15"),
    );
    let page1 = page_html(&[post("Second post", &[image_url(&server, "c.png")])], None);

    Mock::given(method("GET"))
        .and(path("/viewtopic.php"))
        .and(query_param("start", "15"))
        .respond_with(html_response(page1))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/viewtopic.php"))
        .respond_with(html_response(page0))
        .expect(1)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let config = forum_config(dir.path(), &server.uri(), "");
    let orchestrator = Orchestrator::new(&config).unwrap();
    let fetcher = HttpPageFetcher::from_config(&config).unwrap();

    let summary = orchestrator.crawl(&fetcher, None).await.unwrap();

    assert_eq!(summary.pages_processed, 2);
    assert_eq!(summary.pages_failed, 0);
    let slugs: Vec<&str> = summary.blocks.iter().map(|b| b.slug.as_str()).collect();
    assert_eq!(slugs, vec!["0001_First post", "0002_Second post"]);
    assert_eq!(summary.done_links(), 3);

    let img = host_dir(dir.path(), "img");
    assert_eq!(std::fs::read(img.join("0001_First post/a.jpg")).unwrap(), a);
    assert!(img.join("0002_Second post/c.png").exists());

    let export = host_dir(dir.path(), "links").join("0001_First post");
    let manifest: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(export.join("manifest.json")).unwrap())
            .unwrap();
    assert_eq!(manifest["total_links"], 2);
    assert_eq!(manifest["done_links"], 2);
    let done = std::fs::read_to_string(export.join("done_links.jsonl")).unwrap();
    assert_eq!(done.lines().count(), 2);

    let storage = orchestrator.storage();
    let storage = storage.lock().unwrap();
    let block = storage.get_block_by_slug("0001_First post").unwrap().unwrap();
    let page0_url = format!("{}/viewtopic.php?t=7", server.uri());
    assert!(block
        .links
        .iter()
        .all(|l| l.referer.as_deref() == Some(page0_url.as_str())));
    assert_eq!(storage.get_last_done_page().unwrap().unwrap().page_number, 1);
}

#[tokio::test]
async fn test_crawl_resumes_after_last_done_page() {
    let server = MockServer::start().await;
    mount_image(&server, "one.jpg", 1).await;
    mount_image(&server, "two.jpg", 1).await;

    let page0 = page_html(
        &[post("One", &[image_url(&server, "one.jpg")])],
        Some("viewtopic.php?t=7&start=15"),
    );
    let page1 = page_html(&[post("Two", &[image_url(&server, "two.jpg")])], None);

    Mock::given(method("GET"))
        .and(path("/viewtopic.php"))
        .and(query_param("start", "15"))
        .respond_with(html_response(page1))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/viewtopic.php"))
        .respond_with(html_response(page0))
        .expect(1)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let config = forum_config(dir.path(), &server.uri(), "");
    let fetcher = HttpPageFetcher::from_config(&config).unwrap();

    {
        let orchestrator = Orchestrator::new(&config).unwrap();
        let summary = orchestrator.crawl(&fetcher, Some(1)).await.unwrap();
        assert_eq!(summary.pages_processed, 1);
        assert_eq!(summary.blocks.len(), 1);
    }

    let orchestrator = Orchestrator::new(&config).unwrap();
    let summary = orchestrator.crawl(&fetcher, None).await.unwrap();
    assert_eq!(summary.pages_processed, 1);
    assert_eq!(summary.blocks[0].slug, "0002_Two");
}

#[tokio::test]
async fn test_reingesting_same_html_is_idempotent() {
    let server = MockServer::start().await;
    mount_image(&server, "x.jpg", 1).await;
    mount_image(&server, "y.jpg", 1).await;

    let html = page_html(
        &[post("Album", &[image_url(&server, "x.jpg"), image_url(&server, "y.jpg")])],
        None,
    );

    let dir = TempDir::new().unwrap();
    let config = forum_config(dir.path(), &server.uri(), "");
    let orchestrator = Orchestrator::new(&config).unwrap();

    let first = orchestrator.process_html(&html, None).await.unwrap();
    let second = orchestrator.process_html(&html, None).await.unwrap();

    assert_eq!(first.len(), 1);
    assert_eq!(second, first);
    assert_eq!(second[0].total_links, 2);
    assert_eq!(second[0].done, 2);

    let storage = orchestrator.storage();
    let storage = storage.lock().unwrap();
    assert_eq!(storage.list_blocks().unwrap().len(), 1);
    let links = storage.get_links_by_block(first[0].block_id).unwrap();
    assert_eq!(links.len(), 2);
    assert!(links.iter().all(|l| l.referer.is_none()));
}

#[tokio::test]
async fn test_startup_recovers_interrupted_state() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let config = forum_config(dir.path(), &server.uri(), "");
    let layout = config.layout();
    let page_url = format!("{}/viewtopic.php?t=7", server.uri());

    {
        let mut storage = SqliteStorage::new(&layout.database_path).unwrap();
        let block_id = storage.create_block("Crash", "0001_Crash").unwrap();
        storage
            .add_links(
                block_id,
                &[
                    NewLink::new(image_url(&server, "p.jpg"), None),
                    NewLink::new(image_url(&server, "q.jpg"), None),
                ],
                LinkStatus::Queued,
            )
            .unwrap();
        let links = storage.get_links_by_block(block_id).unwrap();
        storage
            .update_link_status(links[0].id, LinkStatus::Downloading, &LinkChanges::default())
            .unwrap();
        storage
            .update_link_status(links[1].id, LinkStatus::Done, &LinkChanges::default())
            .unwrap();
        storage.create_page(&page_url, 0).unwrap();
        storage
            .update_page_status(&page_url, PageStatus::Processing, None, None)
            .unwrap();
    }

    let orchestrator = Orchestrator::new(&config).unwrap();
    let storage = orchestrator.storage();
    let storage = storage.lock().unwrap();

    let block = storage.get_block_by_slug("0001_Crash").unwrap().unwrap();
    let statuses: Vec<LinkStatus> = block.links.iter().map(|l| l.status).collect();
    assert!(statuses.contains(&LinkStatus::Queued));
    assert!(statuses.contains(&LinkStatus::Done));
    assert!(!statuses.contains(&LinkStatus::Downloading));
    assert_eq!(
        storage.get_page(&page_url).unwrap().unwrap().status,
        PageStatus::New
    );
}

#[tokio::test]
async fn test_failed_images_are_kept_with_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/images/gone.jpg"))
        .respond_with(ResponseTemplate::new(404))
        .expect(2)
        .mount(&server)
        .await;
    mount_image(&server, "ok.jpg", 1).await;

    let html = page_html(
        &[post("Mixed", &[image_url(&server, "gone.jpg"), image_url(&server, "ok.jpg")])],
        None,
    );

    let dir = TempDir::new().unwrap();
    let config = forum_config(dir.path(), &server.uri(), "");
    let orchestrator = Orchestrator::new(&config).unwrap();
    let reports = orchestrator.process_html(&html, None).await.unwrap();

    assert_eq!(reports[0].done, 1);
    assert_eq!(reports[0].failed, 1);

    let storage = orchestrator.storage();
    let storage = storage.lock().unwrap();
    let failed = storage
        .get_links_by_status(reports[0].block_id, LinkStatus::Failed)
        .unwrap();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].retries, 1);
    assert!(failed[0].error.as_deref().unwrap().contains("404"));

    let export = host_dir(dir.path(), "links").join(&reports[0].slug);
    let all = std::fs::read_to_string(export.join("all_links.jsonl")).unwrap();
    assert_eq!(all.lines().count(), 2);
    assert!(all.contains("\"failed\""));
}
