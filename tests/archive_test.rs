//! Integration tests for complete archive runs against a mocked LinkedIn API.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::Utc;
use linkedin_post_archiver::archiver::{parse_front_matter, ArchiveOrchestrator, RunOptions, RunState};
use linkedin_post_archiver::auth::{save_credential, Credential};
use linkedin_post_archiver::config::Config;
use linkedin_post_archiver::ArchiveError;
use serde_json::{json, Value};
use tempfile::TempDir;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// 2024-01-15T10:00:00Z
const JAN_15_MS: i64 = 1_705_312_800_000;

fn create_test_config(server: &MockServer, work_dir: &Path) -> Config {
    let mut config = Config::for_testing();
    config.linkedin.api_base_url = format!("{}/v2", server.uri());
    config.auth.token_cache_path = work_dir.join("cache/token.json");
    config.output.base_dir = work_dir.join("archive");
    config
}

async fn write_credential(config: &Config, expires_at: chrono::DateTime<Utc>) {
    let credential = Credential {
        access_token: "test-token".to_string(),
        expires_at,
        scope: "openid,profile,w_member_social".to_string(),
    };
    save_credential(&config.auth.token_cache_path, &credential)
        .await
        .expect("Failed to write credential cache");
}

async fn setup(server: &MockServer, work_dir: &Path) -> Config {
    let config = create_test_config(server, work_dir);
    write_credential(&config, Utc::now() + chrono::Duration::days(30)).await;
    config
}

async fn mount_profile(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/v2/userinfo"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "sub": "abc123",
            "name": "Test Member"
        })))
        .mount(server)
        .await;
}

/// Serve `elements` as the only page of posts, expecting `runs` listings.
async fn mount_posts(server: &MockServer, elements: Vec<Value>, runs: u64) {
    Mock::given(method("GET"))
        .and(path("/v2/ugcPosts"))
        .and(query_param("q", "authors"))
        .and(query_param("authors", "List(urn:li:person:abc123)"))
        .and(query_param("start", "0"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "elements": elements })))
        .expect(runs)
        .mount(server)
        .await;
}

fn ugc_post(id: &str, created_ms: i64, text: &str) -> Value {
    json!({
        "id": id,
        "created": { "time": created_ms },
        "specificContent": {
            "com.linkedin.ugc.ShareContent": {
                "shareCommentary": { "text": text },
                "shareMediaCategory": "NONE"
            }
        }
    })
}

fn ugc_post_with_media(id: &str, created_ms: i64, text: &str, urls: &[String]) -> Value {
    let mut post = ugc_post(id, created_ms, text);
    let share = &mut post["specificContent"]["com.linkedin.ugc.ShareContent"];
    share["shareMediaCategory"] = json!("IMAGE");
    share["media"] = urls
        .iter()
        .map(|url| json!({ "status": "READY", "originalUrl": url }))
        .collect();
    post
}

fn png_bytes() -> Vec<u8> {
    let mut bytes = Vec::new();
    image::DynamicImage::new_rgb8(4, 4)
        .write_to(&mut bytes, image::ImageOutputFormat::Png)
        .expect("Failed to encode PNG");
    bytes
}

/// Every file under `root` with its contents, keyed by relative path.
fn snapshot(root: &Path) -> BTreeMap<PathBuf, Vec<u8>> {
    fn walk(root: &Path, dir: &Path, out: &mut BTreeMap<PathBuf, Vec<u8>>) {
        let Ok(entries) = std::fs::read_dir(dir) else {
            return;
        };
        for entry in entries.filter_map(Result::ok) {
            let path = entry.path();
            if path.is_dir() {
                walk(root, &path, out);
            } else {
                let rel = path.strip_prefix(root).unwrap_or(path.as_path()).to_path_buf();
                out.insert(rel, std::fs::read(&path).unwrap_or_default());
            }
        }
    }
    let mut out = BTreeMap::new();
    walk(root, root, &mut out);
    out
}

fn post_dirs(month_dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(month_dir)
        .map(|entries| {
            entries
                .filter_map(Result::ok)
                .map(|e| e.file_name().to_string_lossy().into_owned())
                .collect()
        })
        .unwrap_or_default();
    names.sort();
    names
}

#[tokio::test]
async fn test_first_run_archives_every_post() {
    let mock_server = MockServer::start().await;
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let config = setup(&mock_server, temp_dir.path()).await;
    mount_profile(&mock_server).await;
    mount_posts(
        &mock_server,
        vec![
            ugc_post("urn:li:share:3", JAN_15_MS + 7_200_000, "Shipping the new release today #rust"),
            ugc_post("urn:li:share:2", JAN_15_MS - 86_400_000, "Notes from the conference"),
            ugc_post("urn:li:share:1", JAN_15_MS - 40 * 86_400_000, "Happy new year"),
        ],
        1,
    )
    .await;

    let base_dir = config.output.base_dir.clone();
    let mut orchestrator = ArchiveOrchestrator::new(config);
    let report = orchestrator
        .run(RunOptions::default())
        .await
        .expect("Archive run failed");

    assert_eq!(orchestrator.state(), RunState::Done);
    assert_eq!(report.posts_seen, 3);
    assert_eq!(report.archived, 3);
    assert_eq!(report.skipped, 0);
    assert_eq!(report.failed, 0);
    // One profile lookup plus one page of posts
    assert_eq!(report.api_requests, 2);

    let record = base_dir.join("2024/01/2024-01-15-shipping-the-new-release-today/post.md");
    let text = std::fs::read_to_string(&record).expect("Record should exist");
    let front = parse_front_matter(&text).expect("Record should have front matter");
    assert_eq!(front.id, "urn:li:share:3");
    assert_eq!(front.post_type, "original");
    assert_eq!(front.tags, vec!["rust"]);
    assert!(text.contains("Shipping the new release today #rust"));

    assert!(base_dir.join("2024/01/2024-01-14-notes-from-the-conference/post.md").exists());
    assert!(base_dir.join("2023/12/2023-12-06-happy-new-year/post.md").exists());

    let index = std::fs::read_to_string(base_dir.join("INDEX.md")).expect("Index should exist");
    assert!(index.contains("**Total posts:** 3"));
    let newest = index.find("Shipping the new release").expect("Newest post listed");
    let oldest = index.find("Happy new year").expect("Oldest post listed");
    assert!(newest < oldest, "index should list newest first");
}

#[tokio::test]
async fn test_second_run_is_idempotent() {
    let mock_server = MockServer::start().await;
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let config = setup(&mock_server, temp_dir.path()).await;
    mount_profile(&mock_server).await;
    let image_url = format!("{}/media/photo.png", mock_server.uri());
    Mock::given(method("GET"))
        .and(path("/media/photo.png"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(png_bytes()))
        .expect(1)
        .mount(&mock_server)
        .await;
    mount_posts(
        &mock_server,
        vec![
            ugc_post("urn:li:share:1", JAN_15_MS, "First"),
            ugc_post_with_media("urn:li:share:2", JAN_15_MS + 1000, "Second", &[image_url]),
            ugc_post("urn:li:share:3", JAN_15_MS + 2000, "Third"),
        ],
        2,
    )
    .await;

    let base_dir = config.output.base_dir.clone();
    let mut orchestrator = ArchiveOrchestrator::new(config);

    let first = orchestrator.run(RunOptions::default()).await.expect("First run failed");
    assert_eq!(first.archived, 3);
    assert_eq!(first.media_downloaded, 1);
    let before = snapshot(&base_dir.join("2024"));

    let second = orchestrator.run(RunOptions::default()).await.expect("Second run failed");
    assert_eq!(second.posts_seen, 3);
    assert_eq!(second.archived, 0);
    assert_eq!(second.skipped, 3);
    assert_eq!(second.media_downloaded, 0);

    // Records and media are untouched; only INDEX.md is regenerated
    assert_eq!(snapshot(&base_dir.join("2024")), before);
    assert_eq!(post_dirs(&base_dir.join("2024/01")).len(), 3);
}

#[tokio::test]
async fn test_expired_credential_aborts_without_requests() {
    let mock_server = MockServer::start().await;
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let config = create_test_config(&mock_server, temp_dir.path());
    write_credential(&config, Utc::now() - chrono::Duration::hours(1)).await;
    let base_dir = config.output.base_dir.clone();

    let mut orchestrator = ArchiveOrchestrator::new(config);
    let err = orchestrator.run(RunOptions::default()).await.unwrap_err();

    assert!(matches!(err, ArchiveError::Auth(_)), "unexpected error: {err:?}");
    assert_eq!(err.exit_code(), 2);
    assert_eq!(orchestrator.state(), RunState::Aborted);
    let received = mock_server.received_requests().await.unwrap_or_default();
    assert!(received.is_empty(), "no API request should be made");
    assert!(!base_dir.exists());
}

#[tokio::test]
async fn test_missing_credential_aborts() {
    let mock_server = MockServer::start().await;
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let config = create_test_config(&mock_server, temp_dir.path());

    let mut orchestrator = ArchiveOrchestrator::new(config);
    let err = orchestrator.run(RunOptions::default()).await.unwrap_err();

    assert!(matches!(err, ArchiveError::Auth(_)));
    assert_eq!(err.exit_code(), 2);
}

#[tokio::test]
async fn test_media_failures_do_not_fail_the_post() {
    let mock_server = MockServer::start().await;
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let mut config = setup(&mock_server, temp_dir.path()).await;
    config.media.max_video_size_mb = 1;
    mount_profile(&mock_server).await;

    for name in ["one.png", "two.png"] {
        Mock::given(method("GET"))
            .and(path(format!("/media/{name}")))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(png_bytes()))
            .expect(1)
            .mount(&mock_server)
            .await;
    }
    Mock::given(method("GET"))
        .and(path("/media/talk.mp4"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "video/mp4")
                .set_body_bytes(vec![0u8; 2 * 1024 * 1024]),
        )
        .mount(&mock_server)
        .await;

    let urls: Vec<String> = ["one.png", "two.png", "talk.mp4"]
        .iter()
        .map(|name| format!("{}/media/{name}", mock_server.uri()))
        .collect();
    mount_posts(
        &mock_server,
        vec![ugc_post_with_media("urn:li:share:10", JAN_15_MS, "Meetup recap", &urls)],
        1,
    )
    .await;

    let base_dir = config.output.base_dir.clone();
    let mut orchestrator = ArchiveOrchestrator::new(config);
    let report = orchestrator.run(RunOptions::default()).await.expect("Run failed");

    assert_eq!(report.archived, 1);
    assert_eq!(report.media_downloaded, 2);
    assert_eq!(report.media_skipped, 1);
    assert_eq!(report.media_failed, 0);

    let post_dir = base_dir.join("2024/01/2024-01-15-meetup-recap");
    let mut media: Vec<String> = std::fs::read_dir(post_dir.join("media"))
        .expect("Media dir should exist")
        .filter_map(Result::ok)
        .map(|e| e.file_name().to_string_lossy().into_owned())
        .collect();
    media.sort();
    assert_eq!(media, ["image-1.png", "image-2.png"]);

    let text = std::fs::read_to_string(post_dir.join("post.md")).expect("Record should exist");
    assert!(text.contains("](media/image-1.png)"));
    assert!(text.contains("](media/image-2.png)"));
    assert!(text.contains("not available locally"));
    assert!(text.contains("/media/talk.mp4"));
}

#[tokio::test]
async fn test_slug_collisions_get_suffixes() {
    let mock_server = MockServer::start().await;
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let config = setup(&mock_server, temp_dir.path()).await;
    mount_profile(&mock_server).await;
    mount_posts(
        &mock_server,
        vec![
            ugc_post("urn:li:share:100", JAN_15_MS, "Hello world #rust"),
            ugc_post("urn:li:share:101", JAN_15_MS + 3_600_000, "Hello world! #tokio"),
        ],
        2,
    )
    .await;

    let base_dir = config.output.base_dir.clone();
    let mut orchestrator = ArchiveOrchestrator::new(config);
    orchestrator.run(RunOptions::default()).await.expect("Run failed");

    let month_dir = base_dir.join("2024/01");
    assert_eq!(
        post_dirs(&month_dir),
        ["2024-01-15-hello-world", "2024-01-15-hello-world-2"]
    );
    let ids: Vec<String> = post_dirs(&month_dir)
        .iter()
        .map(|dir| {
            let text = std::fs::read_to_string(month_dir.join(dir).join("post.md")).unwrap();
            parse_front_matter(&text).unwrap().id
        })
        .collect();
    assert_eq!(ids, ["urn:li:share:100", "urn:li:share:101"]);

    // Re-running finds both posts under their suffixed slugs
    let report = orchestrator.run(RunOptions::default()).await.expect("Second run failed");
    assert_eq!(report.skipped, 2);
    assert_eq!(post_dirs(&month_dir).len(), 2);
}

#[tokio::test]
async fn test_invalid_post_is_counted_and_skipped() {
    let mock_server = MockServer::start().await;
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let config = setup(&mock_server, temp_dir.path()).await;
    mount_profile(&mock_server).await;

    let mut elements: Vec<Value> = (0..9)
        .map(|i| {
            ugc_post(
                &format!("urn:li:share:{i}"),
                JAN_15_MS + i * 86_400_000,
                &format!("Daily note number {i}"),
            )
        })
        .collect();
    elements.insert(4, json!({ "id": "urn:li:share:no-timestamp" }));
    mount_posts(&mock_server, elements, 1).await;

    let base_dir = config.output.base_dir.clone();
    let mut orchestrator = ArchiveOrchestrator::new(config);
    let report = orchestrator.run(RunOptions::default()).await.expect("Run should not abort");

    assert_eq!(report.posts_seen, 10);
    assert_eq!(report.archived, 9);
    assert_eq!(report.failed, 1);
    let index = std::fs::read_to_string(base_dir.join("INDEX.md")).expect("Index should exist");
    assert!(index.contains("**Total posts:** 9"));
}

#[tokio::test]
async fn test_limit_caps_archived_posts() {
    let mock_server = MockServer::start().await;
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let config = setup(&mock_server, temp_dir.path()).await;
    mount_profile(&mock_server).await;
    mount_posts(
        &mock_server,
        (0..5)
            .map(|i| ugc_post(&format!("urn:li:share:{i}"), JAN_15_MS + i, &format!("Post {i}")))
            .collect(),
        1,
    )
    .await;

    let mut orchestrator = ArchiveOrchestrator::new(config);
    let report = orchestrator
        .run(RunOptions {
            limit: Some(2),
            reauthorize: false,
        })
        .await
        .expect("Run failed");

    assert_eq!(report.archived, 2);
    assert_eq!(report.posts_seen, 2);
}

#[tokio::test]
async fn test_rate_limit_exhaustion_aborts_run() {
    let mock_server = MockServer::start().await;
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let config = setup(&mock_server, temp_dir.path()).await;
    mount_profile(&mock_server).await;
    Mock::given(method("GET"))
        .and(path("/v2/ugcPosts"))
        .respond_with(ResponseTemplate::new(429))
        .expect(3)
        .mount(&mock_server)
        .await;

    let mut orchestrator = ArchiveOrchestrator::new(config);
    let err = orchestrator.run(RunOptions::default()).await.unwrap_err();

    assert!(matches!(err, ArchiveError::RateLimitExceeded { attempts: 3, .. }));
    assert_eq!(err.exit_code(), 1);
    assert_eq!(orchestrator.state(), RunState::Aborted);
    // Profile request plus three listing attempts
    assert_eq!(orchestrator.report().api_requests, 4);
}

#[tokio::test]
async fn test_existing_record_with_other_id_is_not_overwritten() {
    let mock_server = MockServer::start().await;
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let config = setup(&mock_server, temp_dir.path()).await;
    mount_profile(&mock_server).await;
    mount_posts(
        &mock_server,
        vec![ugc_post("urn:li:share:new", JAN_15_MS, "Hello world")],
        1,
    )
    .await;

    // A hand-edited record that no longer has readable front matter
    let taken = config.output.base_dir.join("2024/01/2024-01-15-hello-world");
    std::fs::create_dir_all(&taken).unwrap();
    std::fs::write(taken.join("post.md"), "just some notes").unwrap();

    let base_dir = config.output.base_dir.clone();
    let mut orchestrator = ArchiveOrchestrator::new(config);
    orchestrator.run(RunOptions::default()).await.expect("Run failed");

    assert_eq!(std::fs::read_to_string(taken.join("post.md")).unwrap(), "just some notes");
    assert!(base_dir.join("2024/01/2024-01-15-hello-world-2/post.md").exists());
}

#[tokio::test]
async fn test_aborted_run_still_indexes_posts_already_written() {
    let mock_server = MockServer::start().await;
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let config = setup(&mock_server, temp_dir.path()).await;
    mount_profile(&mock_server).await;
    // A full first page forces a second listing, which is rate limited
    let first_page: Vec<Value> = (0..50)
        .map(|i| {
            ugc_post(
                &format!("urn:li:share:{i}"),
                JAN_15_MS - i * 3_600_000,
                &format!("Post number {i}"),
            )
        })
        .collect();
    mount_posts(&mock_server, first_page, 1).await;
    Mock::given(method("GET"))
        .and(path("/v2/ugcPosts"))
        .and(query_param("start", "50"))
        .respond_with(ResponseTemplate::new(429))
        .expect(3)
        .mount(&mock_server)
        .await;

    let base_dir = config.output.base_dir.clone();
    let mut orchestrator = ArchiveOrchestrator::new(config);
    let err = orchestrator.run(RunOptions::default()).await.unwrap_err();

    assert!(matches!(err, ArchiveError::RateLimitExceeded { .. }), "unexpected error: {err:?}");
    assert_eq!(orchestrator.state(), RunState::Aborted);
    assert_eq!(orchestrator.report().archived, 50);

    let index = std::fs::read_to_string(base_dir.join("INDEX.md")).expect("Index should exist");
    assert!(index.contains("**Total posts:** 50"));
    assert!(index.contains("Post number 0"));
}

#[tokio::test]
async fn test_abort_before_any_post_writes_no_index() {
    let mock_server = MockServer::start().await;
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let config = setup(&mock_server, temp_dir.path()).await;
    mount_profile(&mock_server).await;
    Mock::given(method("GET"))
        .and(path("/v2/ugcPosts"))
        .respond_with(ResponseTemplate::new(429))
        .mount(&mock_server)
        .await;

    let base_dir = config.output.base_dir.clone();
    let mut orchestrator = ArchiveOrchestrator::new(config);
    orchestrator.run(RunOptions::default()).await.unwrap_err();

    assert!(!base_dir.join("INDEX.md").exists());
}
