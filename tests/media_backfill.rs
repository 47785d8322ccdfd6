use newscrawl::article::{MediaProbe, RichMedia};
use std::time::Duration;
use wiremock::{
    Mock, MockServer, ResponseTemplate,
    matchers::{method, path},
};

fn probe() -> MediaProbe {
    MediaProbe::new(Duration::from_secs(2)).unwrap()
}

#[tokio::test]
async fn test_backfill_reads_headers_once() {
    let mock_server = MockServer::start().await;

    Mock::given(method("HEAD"))
        .and(path("/images/bus.jpg"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("Content-Type", "image/jpeg")
                .insert_header("ETag", "\"abc123\"")
                .insert_header("Last-Modified", "Thu, 18 Oct 2018 13:41:12 GMT"),
        )
        .expect(1)
        .mount(&mock_server)
        .await;

    let mut media = RichMedia::new(format!("{}/images/bus.jpg", mock_server.uri())).unwrap();
    assert!(media.needs_probe());

    let probe = probe();
    probe.backfill(&mut media).await;
    probe.backfill(&mut media).await;

    assert_eq!(media.mime_type.as_deref(), Some("image/jpeg"));
    assert_eq!(media.etag.as_deref(), Some("\"abc123\""));
    assert_eq!(media.last_modified, Some(1_539_870_072));
    assert!(!media.needs_probe());
}

#[tokio::test]
async fn test_backfill_keeps_known_fields() {
    let mock_server = MockServer::start().await;

    Mock::given(method("HEAD"))
        .and(path("/clip.mp4"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("Content-Type", "application/octet-stream")
                .insert_header("ETag", "\"v2\""),
        )
        .mount(&mock_server)
        .await;

    let mut media = RichMedia::new(format!("{}/clip.mp4", mock_server.uri()))
        .unwrap()
        .with_mime_type(Some("video/mp4"));
    probe().backfill(&mut media).await;

    assert_eq!(media.mime_type.as_deref(), Some("video/mp4"));
    assert_eq!(media.etag.as_deref(), Some("\"v2\""));
}

#[tokio::test]
async fn test_backfill_failure_leaves_fields_unset() {
    let mock_server = MockServer::start().await;

    Mock::given(method("HEAD"))
        .and(path("/missing.png"))
        .respond_with(ResponseTemplate::new(404).insert_header("ETag", "\"gone\""))
        .expect(1)
        .mount(&mock_server)
        .await;

    let mut media = RichMedia::new(format!("{}/missing.png", mock_server.uri())).unwrap();
    let probe = probe();
    probe.backfill(&mut media).await;
    probe.backfill(&mut media).await;

    assert_eq!(media.etag, None);
    assert_eq!(media.mime_type, None);
    assert_eq!(media.size, None);
    assert!(!media.needs_probe());
}
