//! Download engine tests against a mock image host

use crate::common::{fast_download_config, image_bytes, link_record, RecordingSink};
use forum_loader::config::DownloadConfig;
use forum_loader::downloader::{DownloadEngine, LinkEvent, StatusSink};
use forum_loader::state::LinkStatus;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn image_response(body: Vec<u8>) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_raw(body, "image/jpeg")
}

#[tokio::test]
async fn test_wrong_content_type_fails_without_retry() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/img/page.jpg"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(b"<html></html>".to_vec(), "text/html"))
        .expect(1)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let engine = DownloadEngine::new(&fast_download_config()).unwrap();
    let sink = RecordingSink::new();
    let link = link_record(1, &format!("{}/img/page.jpg", server.uri()));

    let status = engine.download_link(&link, dir.path(), sink.as_ref()).await;

    assert_eq!(status, LinkStatus::Failed);
    assert!(!dir.path().join("page.jpg").exists());
    assert!(!dir.path().join("page.jpg.part").exists());

    let events = sink.events();
    assert_eq!(events.len(), 2);
    assert_eq!(events[0].1.status(), LinkStatus::Downloading);
    match &events[1].1 {
        LinkEvent::Failed {
            error,
            increment_retries,
        } => {
            assert!(error.contains("Invalid content type: text/html"), "{}", error);
            assert!(increment_retries);
        }
        other => panic!("unexpected event {:?}", other),
    }
}

#[tokio::test]
async fn test_resume_from_partial_file_is_byte_identical() {
    let server = MockServer::start().await;
    let body = image_bytes(10_000);
    let offset = 4_096;

    Mock::given(method("GET"))
        .and(path("/img/photo.jpg"))
        .and(header("range", format!("bytes={}-", offset).as_str()))
        .respond_with(
            ResponseTemplate::new(206)
                .insert_header(
                    "content-range",
                    format!("bytes {}-{}/{}", offset, body.len() - 1, body.len()).as_str(),
                )
                .set_body_raw(body[offset..].to_vec(), "image/jpeg"),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/img/photo.jpg"))
        .respond_with(image_response(body.clone()))
        .expect(0)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("photo.jpg.part"), &body[..offset]).unwrap();

    let engine = DownloadEngine::new(&fast_download_config()).unwrap();
    let done = engine
        .fetch(
            &format!("{}/img/photo.jpg", server.uri()),
            &dir.path().join("photo.jpg"),
        )
        .await
        .unwrap();

    assert_eq!(done.size, body.len() as u64);
    assert_eq!(std::fs::read(dir.path().join("photo.jpg")).unwrap(), body);
    assert!(!dir.path().join("photo.jpg.part").exists());
}

#[tokio::test]
async fn test_server_ignoring_range_rewrites_file() {
    let server = MockServer::start().await;
    let body = image_bytes(2_000);
    Mock::given(method("GET"))
        .and(path("/img/full.png"))
        .respond_with(image_response(body.clone()))
        .expect(1)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("full.png.part"), b"stale bytes").unwrap();

    let engine = DownloadEngine::new(&fast_download_config()).unwrap();
    engine
        .fetch(
            &format!("{}/img/full.png", server.uri()),
            &dir.path().join("full.png"),
        )
        .await
        .unwrap();

    assert_eq!(std::fs::read(dir.path().join("full.png")).unwrap(), body);
}

#[tokio::test]
async fn test_unsatisfiable_range_restarts_from_zero() {
    let server = MockServer::start().await;
    let body = image_bytes(1_000);

    Mock::given(method("GET"))
        .and(path("/img/r.jpg"))
        .and(header("range", "bytes=5000-"))
        .respond_with(ResponseTemplate::new(416))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/img/r.jpg"))
        .respond_with(image_response(body.clone()))
        .expect(1)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("r.jpg.part"), vec![0u8; 5_000]).unwrap();

    let engine = DownloadEngine::new(&fast_download_config()).unwrap();
    let done = engine
        .fetch(&format!("{}/img/r.jpg", server.uri()), &dir.path().join("r.jpg"))
        .await
        .unwrap();

    assert_eq!(done.size, 1_000);
    assert_eq!(std::fs::read(dir.path().join("r.jpg")).unwrap(), body);
}

#[tokio::test]
async fn test_rate_limit_is_retried() {
    let server = MockServer::start().await;
    let body = image_bytes(512);

    Mock::given(method("GET"))
        .and(path("/img/busy.jpg"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/img/busy.jpg"))
        .respond_with(image_response(body.clone()).insert_header("etag", "\"v1\""))
        .expect(1)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let engine = DownloadEngine::new(&fast_download_config()).unwrap();
    let sink = RecordingSink::new();
    let link = link_record(7, &format!("{}/img/busy.jpg", server.uri()));

    let status = engine.download_link(&link, dir.path(), sink.as_ref()).await;

    assert_eq!(status, LinkStatus::Done);
    assert_eq!(
        sink.statuses_for(7),
        vec![LinkStatus::Downloading, LinkStatus::Done]
    );
    match &sink.events()[1].1 {
        LinkEvent::Done {
            filename,
            size,
            etag,
            ..
        } => {
            assert_eq!(filename, "busy.jpg");
            assert_eq!(*size, 512);
            assert_eq!(etag.as_deref(), Some("\"v1\""));
        }
        other => panic!("unexpected event {:?}", other),
    }
}

#[tokio::test]
async fn test_retries_exhausted_marks_failed() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/img/broken.jpg"))
        .respond_with(ResponseTemplate::new(500))
        .expect(3)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let engine = DownloadEngine::new(&fast_download_config()).unwrap();
    let err = engine
        .fetch(
            &format!("{}/img/broken.jpg", server.uri()),
            &dir.path().join("broken.jpg"),
        )
        .await
        .unwrap_err();

    assert!(err.starts_with("Max retries (3) exceeded"), "{}", err);
    assert!(err.contains("500"), "{}", err);
    assert!(!dir.path().join("broken.jpg").exists());
}

#[tokio::test]
async fn test_batch_completes_every_link() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/img/missing.jpg"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(b"nope".to_vec(), "text/plain"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .respond_with(image_response(image_bytes(256)).set_delay(Duration::from_millis(50)))
        .mount(&server)
        .await;

    let mut links: Vec<_> = (1..=6)
        .map(|i| link_record(i, &format!("{}/img/{}.jpg", server.uri(), i)))
        .collect();
    links.push(link_record(99, &format!("{}/img/missing.jpg", server.uri())));

    let config = DownloadConfig {
        global_limit: 4,
        per_host_limit: 2,
        ..fast_download_config()
    };
    let engine = DownloadEngine::new(&config).unwrap();
    let dir = TempDir::new().unwrap();
    let out = dir.path().join("0001_block");
    let sink = RecordingSink::new();

    let stats = engine
        .download_links(links, &out, Arc::clone(&sink) as Arc<dyn StatusSink>)
        .await;

    assert_eq!(stats.total, 7);
    assert_eq!(stats.done, 6);
    assert_eq!(stats.failed, 1);
    assert_eq!(stats.pending, 0);
    for i in 1..=6 {
        assert!(out.join(format!("{}.jpg", i)).exists());
        assert_eq!(
            sink.statuses_for(i),
            vec![LinkStatus::Downloading, LinkStatus::Done]
        );
    }
    assert_eq!(
        sink.statuses_for(99),
        vec![LinkStatus::Downloading, LinkStatus::Failed]
    );
}

#[tokio::test]
async fn test_same_filename_in_batch_keeps_both_images() {
    let server = MockServer::start().await;
    let first = vec![b'A'; 20_000];
    let second = vec![b'B'; 20_000];
    Mock::given(method("GET"))
        .and(path("/one/x.jpg"))
        .respond_with(image_response(first.clone()))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/two/x.jpg"))
        .respond_with(image_response(second.clone()))
        .mount(&server)
        .await;

    let links = vec![
        link_record(1, &format!("{}/one/x.jpg", server.uri())),
        link_record(2, &format!("{}/two/x.jpg", server.uri())),
    ];
    let engine = DownloadEngine::new(&fast_download_config()).unwrap();
    let dir = TempDir::new().unwrap();
    let sink = RecordingSink::new();

    let stats = engine
        .download_links(links, dir.path(), Arc::clone(&sink) as Arc<dyn StatusSink>)
        .await;
    assert_eq!(stats.done, 2);

    let mut saved = Vec::new();
    for (id, event) in sink.events() {
        if let LinkEvent::Done { filename, .. } = event {
            saved.push((id, filename));
        }
    }
    saved.sort();
    assert_eq!(saved.len(), 2);
    assert_eq!(saved[0].1, "x.jpg");
    assert_ne!(saved[0].1, saved[1].1);

    assert_eq!(std::fs::read(dir.path().join(&saved[0].1)).unwrap(), first);
    assert_eq!(std::fs::read(dir.path().join(&saved[1].1)).unwrap(), second);
    let files = std::fs::read_dir(dir.path()).unwrap().count();
    assert_eq!(files, 2);
}

/// Reads one request head and returns its `Range` header, if any
async fn read_range_header(socket: &mut TcpStream) -> Option<String> {
    let mut head = Vec::new();
    let mut buf = [0u8; 1024];
    while !head.windows(4).any(|w| w == b"\r\n\r\n") {
        let n = socket.read(&mut buf).await.unwrap();
        if n == 0 {
            break;
        }
        head.extend_from_slice(&buf[..n]);
    }

    String::from_utf8_lossy(&head)
        .lines()
        .find(|line| line.to_ascii_lowercase().starts_with("range:"))
        .map(|line| line[line.find(':').unwrap() + 1..].trim().to_string())
}

#[tokio::test]
async fn test_connection_cut_mid_body_resumes_with_range() {
    let body = image_bytes(10_000);
    let cut = 4_000;
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let ranges = Arc::new(Mutex::new(Vec::new()));

    let server = {
        let body = body.clone();
        let ranges = Arc::clone(&ranges);
        tokio::spawn(async move {
            // Full Content-Length announced, connection dropped after `cut` bytes.
            let (mut socket, _) = listener.accept().await.unwrap();
            let range = read_range_header(&mut socket).await;
            ranges.lock().unwrap().push(range);
            let head = format!(
                "HTTP/1.1 200 OK\r\nContent-Type: image/jpeg\r\nContent-Length: {}\r\n\r\n",
                body.len()
            );
            socket.write_all(head.as_bytes()).await.unwrap();
            socket.write_all(&body[..cut]).await.unwrap();
            socket.flush().await.unwrap();
            drop(socket);

            let (mut socket, _) = listener.accept().await.unwrap();
            let range = read_range_header(&mut socket).await;
            ranges.lock().unwrap().push(range);
            let head = format!(
                "HTTP/1.1 206 Partial Content\r\nContent-Type: image/jpeg\r\n\
                 Content-Range: bytes {}-{}/{}\r\nContent-Length: {}\r\n\
                 Connection: close\r\n\r\n",
                cut,
                body.len() - 1,
                body.len(),
                body.len() - cut
            );
            socket.write_all(head.as_bytes()).await.unwrap();
            socket.write_all(&body[cut..]).await.unwrap();
            socket.flush().await.unwrap();
        })
    };

    let dir = TempDir::new().unwrap();
    let engine = DownloadEngine::new(&fast_download_config()).unwrap();
    let done = engine
        .fetch(&format!("http://{}/img/cut.jpg", addr), &dir.path().join("cut.jpg"))
        .await
        .unwrap();
    server.await.unwrap();

    assert_eq!(done.size, body.len() as u64);
    assert_eq!(std::fs::read(dir.path().join("cut.jpg")).unwrap(), body);
    assert!(!dir.path().join("cut.jpg.part").exists());
    assert_eq!(
        *ranges.lock().unwrap(),
        vec![None, Some(format!("bytes={}-", cut))]
    );
}

#[tokio::test]
async fn test_refused_connection_retries_then_fails() {
    let addr = {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap()
    };

    let dir = TempDir::new().unwrap();
    let engine = DownloadEngine::new(&fast_download_config()).unwrap();
    let sink = RecordingSink::new();
    let link = link_record(5, &format!("http://{}/img/gone.jpg", addr));

    let status = engine.download_link(&link, dir.path(), sink.as_ref()).await;

    assert_eq!(status, LinkStatus::Failed);
    match &sink.events()[1].1 {
        LinkEvent::Failed { error, .. } => {
            assert!(error.starts_with("Max retries (3) exceeded"), "{}", error);
            assert!(error.contains("Connection error"), "{}", error);
        }
        other => panic!("unexpected event {:?}", other),
    }
    assert!(!dir.path().join("gone.jpg").exists());
}
