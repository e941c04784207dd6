//! End-to-end tests for the catalogue-crawler binary

use assert_cmd::Command;
use serde_json::Value;
use std::path::Path;
use tempfile::TempDir;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Binary under test with a clean environment rooted at `dir`
fn crawler(dir: &Path) -> Command {
    let mut cmd = Command::cargo_bin("catalogue-crawler").unwrap();
    cmd.env_clear().env("RUST_LOG", "off").current_dir(dir);
    cmd
}

fn stdout_json(output: &std::process::Output) -> Value {
    let stdout = String::from_utf8_lossy(&output.stdout);
    serde_json::from_str(stdout.trim()).unwrap_or_else(|e| panic!("{e}: {stdout}"))
}

fn listing_html(slugs: &[&str], last_page: u32) -> String {
    let listings: String = slugs
        .iter()
        .map(|slug| {
            format!(
                r#"<div class="card">
                     <h3 class="h4 mb-0"><a class="text-body" href="/clinic/{slug}"><span>Clinic {slug}</span></a></h3>
                     <span data-test-id="doctor-specializations">Cardiology</span>
                   </div>"#
            )
        })
        .collect();
    let pagination: String = (1..=last_page)
        .map(|p| format!(r#"<li><a href="?page={p}">{p}</a></li>"#))
        .collect();
    format!(r#"<html><body>{listings}<ul class="pagination">{pagination}</ul></body></html>"#)
}

#[test]
fn test_help_lists_subcommands() {
    let dir = TempDir::new().unwrap();
    let output = crawler(dir.path()).arg("--help").output().unwrap();

    assert!(output.status.success());
    let help = String::from_utf8_lossy(&output.stdout);
    for subcommand in ["crawl", "status", "validate"] {
        assert!(help.contains(subcommand), "missing {subcommand} in help");
    }
}

#[test]
fn test_crawl_requires_search_url() {
    let dir = TempDir::new().unwrap();
    crawler(dir.path()).arg("crawl").assert().failure();
}

#[test]
fn test_validate_checkpoints_without_state() {
    let dir = TempDir::new().unwrap();
    crawler(dir.path())
        .args(["validate", "checkpoints", "--state-dir", "missing-state"])
        .assert()
        .success();
}

#[test]
fn test_validate_checkpoints_reports_corruption() {
    let dir = TempDir::new().unwrap();
    let state = dir.path().join("state");
    std::fs::create_dir_all(&state).unwrap();
    std::fs::write(state.join("collection_9.json"), "{ not json").unwrap();

    let output = crawler(dir.path())
        .args(["validate", "checkpoints", "--state-dir"])
        .arg(&state)
        .output()
        .unwrap();

    assert!(!output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("collection_9.json"), "{stdout}");
}

#[test]
fn test_validate_catalogue_rejects_duplicate_ids() {
    let dir = TempDir::new().unwrap();
    let catalogue = dir.path().join("collections.json");
    std::fs::write(&catalogue, r#"[{"id":1,"name":"a"},{"id":1,"name":"b"}]"#).unwrap();

    crawler(dir.path())
        .args(["validate", "catalogue", "--path"])
        .arg(&catalogue)
        .assert()
        .failure();
}

#[test]
fn test_status_on_empty_state_is_read_only() {
    let dir = TempDir::new().unwrap();
    let output = crawler(dir.path())
        .args(["status", "--output-format", "json"])
        .args(["--state-dir", "state", "--records-dir", "records"])
        .output()
        .unwrap();

    assert!(output.status.success());
    let json = stdout_json(&output);
    assert_eq!(json["totals"]["pending"], 0);
    assert_eq!(json["totals"]["done"], 0);
    assert_eq!(json["records"]["listings"], 0);
    assert!(!dir.path().join("state").exists());
    assert!(!dir.path().join("records").exists());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_crawl_then_resume_end_to_end() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/search"))
        .and(query_param("filters[specializations][0]", "7"))
        .and(query_param("page", "1"))
        .respond_with(ResponseTemplate::new(200).set_body_string(listing_html(&["a", "b"], 2)))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/search"))
        .and(query_param("filters[specializations][0]", "7"))
        .and(query_param("page", "2"))
        .respond_with(ResponseTemplate::new(200).set_body_string(listing_html(&["c", "a"], 2)))
        .expect(1)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    std::fs::write(
        dir.path().join("collections.json"),
        r#"[{"id":7,"name":"Cardiology"}]"#,
    )
    .unwrap();

    let search_url = format!("{}/search", server.uri());
    let run = {
        let root = dir.path().to_path_buf();
        move || {
            crawler(&root)
                .env("SEARCH_URL", &search_url)
                .args(["crawl", "--output-format", "json", "--collection-pause-secs", "0"])
                .args(["--state-dir", "state", "--records-dir", "records"])
                .output()
                .unwrap()
        }
    };

    let first = tokio::task::spawn_blocking(run.clone()).await.unwrap();
    assert!(first.status.success(), "{}", String::from_utf8_lossy(&first.stderr));
    let report = stdout_json(&first);
    assert_eq!(report["collections_completed"], 1);
    assert_eq!(report["pages_committed"], 2);
    assert_eq!(report["new_records"], 3);
    assert_eq!(report["duplicate_records"], 1);

    let listings = std::fs::read_to_string(dir.path().join("records/listings.csv")).unwrap();
    // header plus one row per distinct listing
    assert_eq!(listings.lines().count(), 4);
    assert!(listings.contains(&format!("{}/clinic/c", server.uri())));
    assert!(dir.path().join("state/collection_7.json").exists());

    // A finished collection is not fetched again
    let second = tokio::task::spawn_blocking(run).await.unwrap();
    assert!(second.status.success());
    let report = stdout_json(&second);
    assert_eq!(report["pages_committed"], 0);
    assert_eq!(report["new_records"], 0);
}
