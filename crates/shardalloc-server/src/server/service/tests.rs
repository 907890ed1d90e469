use super::handler::router;
use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Request, StatusCode, header},
};
use shardalloc::{AddressSpaceConfig, AllocationService, SeedStore};
use std::path::PathBuf;
use tempfile::TempDir;
use tower::ServiceExt;

fn app(dir: &TempDir) -> (Router, PathBuf) {
    let path = dir.path().join("seeds.db");
    let config = AddressSpaceConfig::with_address_space(16, 4, 0.5).unwrap();
    let service = AllocationService::new(SeedStore::new(&path, config).with_fsync(false));
    (router(service), path)
}

async fn get(app: &Router, uri: &str) -> (StatusCode, String) {
    let response = app
        .clone()
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, String::from_utf8(body.to_vec()).unwrap())
}

#[tokio::test]
async fn first_two_seeds_get_consecutive_chunks() {
    let dir = TempDir::new().unwrap();
    let (app, path) = app(&dir);

    assert_eq!(
        get(&app, "/shard?seed=node-a").await,
        (StatusCode::OK, "-6 0 4\n".to_owned())
    );
    assert_eq!(
        get(&app, "/shard?seed=node-b").await,
        (StatusCode::OK, "-3 0 4\n".to_owned())
    );
    assert_eq!(
        std::fs::read_to_string(&path).unwrap(),
        r#"{"node-a":"-6 0 4","node-b":"-3 0 4"}"#
    );
}

#[tokio::test]
async fn repeated_seed_returns_the_same_body() {
    let dir = TempDir::new().unwrap();
    let (app, _) = app(&dir);

    let first = get(&app, "/shard?seed=node-a").await;
    get(&app, "/shard?seed=node-b").await;
    assert_eq!(get(&app, "/shard?seed=node-a").await, first);
}

#[tokio::test]
async fn body_is_plain_text() {
    let dir = TempDir::new().unwrap();
    let (app, _) = app(&dir);

    let response = app
        .oneshot(
            Request::builder()
                .uri("/shard?seed=node-a")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let content_type = response.headers()[header::CONTENT_TYPE].to_str().unwrap();
    assert!(content_type.starts_with("text/plain"));
}

#[tokio::test]
async fn missing_or_empty_seed_is_unprocessable() {
    let dir = TempDir::new().unwrap();
    let (app, path) = app(&dir);

    for uri in ["/shard", "/shard?seed=", "/shard?seed", "/shard?other=x"] {
        assert_eq!(
            get(&app, uri).await,
            (StatusCode::UNPROCESSABLE_ENTITY, String::new()),
            "{uri}"
        );
    }
    assert!(!path.exists());
}

#[tokio::test]
async fn repeated_seed_parameter_is_unprocessable() {
    let dir = TempDir::new().unwrap();
    let (app, path) = app(&dir);

    // An ambiguous query names no single seed, so nothing is registered.
    assert_eq!(
        get(&app, "/shard?seed=node-a&seed=node-b").await,
        (StatusCode::UNPROCESSABLE_ENTITY, String::new())
    );
    assert!(!path.exists());
}

#[tokio::test]
async fn percent_encoded_seed_is_decoded() {
    let dir = TempDir::new().unwrap();
    let (app, _) = app(&dir);

    get(&app, "/shard?seed=node%20a").await;
    assert_eq!(
        get(&app, "/shard?seed=node+a").await,
        (StatusCode::OK, "-6 0 4\n".to_owned())
    );
}

#[tokio::test]
async fn unknown_paths_are_not_found() {
    let dir = TempDir::new().unwrap();
    let (app, path) = app(&dir);

    for uri in ["/", "/shards?seed=a", "/metrics", "/shard/extra?seed=a"] {
        assert_eq!(get(&app, uri).await.0, StatusCode::NOT_FOUND, "{uri}");
    }
    assert!(!path.exists());
}

#[tokio::test]
async fn corrupt_store_is_unavailable() {
    let dir = TempDir::new().unwrap();
    let (app, path) = app(&dir);

    get(&app, "/shard?seed=node-a").await;
    std::fs::write(&path, "{ definitely not json").unwrap();

    assert_eq!(
        get(&app, "/shard?seed=node-a").await,
        (StatusCode::SERVICE_UNAVAILABLE, String::new())
    );
    assert_eq!(
        get(&app, "/shard?seed=node-b").await.0,
        StatusCode::SERVICE_UNAVAILABLE
    );
    assert_eq!(
        std::fs::read_to_string(&path).unwrap(),
        "{ definitely not json"
    );
}

#[tokio::test]
async fn persist_failure_is_an_internal_error() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("missing").join("seeds.db");
    let config = AddressSpaceConfig::with_address_space(16, 4, 0.5).unwrap();
    let app = router(AllocationService::new(
        SeedStore::new(&path, config).with_fsync(false),
    ));

    assert_eq!(
        get(&app, "/shard?seed=node-a").await,
        (StatusCode::INTERNAL_SERVER_ERROR, String::new())
    );
    assert!(!path.exists());
}
