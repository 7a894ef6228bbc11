//! Registry transport tests: token bootstrap, missing tags, slow registries.

use super::harness::{MockRequest, MockResponse, MockServer};
use futures::future::join_all;
use release_verify::artifact::ImageRef;
use release_verify::checker::{
    BackendChecker, ErrorKind, HttpRegistryTransport, Outcome, RegistryChecker,
};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

const TOKEN: &str = "anon-token";

fn image(name: &str, tag: &str) -> ImageRef {
    ImageRef {
        host: "registry.test".to_string(),
        namespace: "calico".to_string(),
        name: name.to_string(),
        tag: tag.to_string(),
    }
}

fn checker_for(server: &MockServer, call_timeout: Duration) -> RegistryChecker {
    let endpoints = HashMap::from([("registry.test".to_string(), server.url())]);
    let transport = HttpRegistryTransport::new(endpoints, call_timeout).expect("client");
    RegistryChecker::new(Arc::new(transport), call_timeout)
}

/// Registry requiring an anonymous bearer token. Only `node:v3.27.4` exists.
fn token_registry(request: &MockRequest) -> MockResponse {
    if request.path == "/token" {
        return MockResponse::json(format!(r#"{{"token":"{TOKEN}"}}"#));
    }
    if request.header("authorization") != Some(&format!("Bearer {TOKEN}")) {
        let host = request.header("host").unwrap_or("127.0.0.1");
        return MockResponse::status(401).with_header(
            "www-authenticate",
            format!(r#"Bearer realm="http://{host}/token",service="registry.test""#),
        );
    }
    match request.path.as_str() {
        "/v2/calico/node/manifests/v3.27.4" => MockResponse::status(200),
        _ => MockResponse::status(404),
    }
}

#[tokio::test]
async fn test_anonymous_token_bootstrap() {
    let server = MockServer::start(token_registry).await.expect("server");
    let checker = checker_for(&server, Duration::from_secs(5));

    let probe = checker.exists(&image("node", "v3.27.4")).await;
    assert_eq!(probe.outcome, Outcome::Present);
    assert_eq!(server.count("GET", "/token"), 1);
    assert_eq!(server.count("HEAD", "/v2/calico/node/manifests/v3.27.4"), 2);

    let token_request = server
        .requests()
        .into_iter()
        .find(|r| r.path == "/token")
        .expect("token request");
    let query = token_request.query.unwrap_or_default();
    assert!(query.contains("service=registry.test"));
    assert!(query.contains("scope=repository%3Acalico%2Fnode%3Apull"));
}

#[tokio::test]
async fn test_token_reused_for_same_repository() {
    let server = MockServer::start(token_registry).await.expect("server");
    let checker = checker_for(&server, Duration::from_secs(5));

    assert!(checker.exists(&image("node", "v3.27.4")).await.outcome.is_present());
    let second = checker.exists(&image("node", "v3.27.4-arm64")).await;

    assert_eq!(second.outcome, Outcome::Absent);
    assert_eq!(server.count("GET", "/token"), 1);
}

#[tokio::test]
async fn test_concurrent_tags_share_one_token_request() {
    let server = MockServer::start(|request: &MockRequest| {
        let response = token_registry(request);
        if request.path == "/token" {
            response.with_delay(Duration::from_millis(100))
        } else {
            response
        }
    })
    .await
    .expect("server");
    let checker = checker_for(&server, Duration::from_secs(5));

    let tags = [
        "v3.27.4",
        "v3.27.4-amd64",
        "v3.27.4-arm64",
        "v3.27.4-s390x",
        "v3.27.4-ppc64le",
    ];
    let images: Vec<ImageRef> = tags.iter().map(|tag| image("node", tag)).collect();
    let probes = join_all(images.iter().map(|i| checker.exists(i))).await;

    assert_eq!(probes[0].outcome, Outcome::Present);
    assert!(probes[1..].iter().all(|p| p.outcome == Outcome::Absent));
    assert_eq!(server.count("GET", "/token"), 1);
}

#[tokio::test]
async fn test_missing_tag_is_absent() {
    let server = MockServer::start(token_registry).await.expect("server");
    let checker = checker_for(&server, Duration::from_secs(5));

    let probe = checker.exists(&image("ctl", "v3.27.4")).await;
    assert_eq!(probe.outcome, Outcome::Absent);
    assert!(probe.detail.as_deref().unwrap_or_default().contains("HTTP 404"));
}

#[tokio::test]
async fn test_server_error_is_not_absent() {
    let server = MockServer::start(|_: &MockRequest| MockResponse::status(503))
        .await
        .expect("server");
    let checker = checker_for(&server, Duration::from_secs(5));

    let probe = checker.exists(&image("node", "v3.27.4")).await;
    assert_eq!(probe.outcome, Outcome::Errored(ErrorKind::UnexpectedStatus));
}

#[tokio::test]
async fn test_failed_token_endpoint_is_auth_error() {
    let server = MockServer::start(|request: &MockRequest| {
        if request.path == "/token" {
            return MockResponse::status(500);
        }
        let host = request.header("host").unwrap_or("127.0.0.1");
        MockResponse::status(401).with_header(
            "www-authenticate",
            format!(r#"Bearer realm="http://{host}/token""#),
        )
    })
    .await
    .expect("server");
    let checker = checker_for(&server, Duration::from_secs(5));

    let probe = checker.exists(&image("node", "v3.27.4")).await;
    assert_eq!(probe.outcome, Outcome::Errored(ErrorKind::Auth));
}

#[tokio::test]
async fn test_slow_registry_times_out() {
    let server = MockServer::start(|_: &MockRequest| {
        MockResponse::status(200).with_delay(Duration::from_secs(5))
    })
    .await
    .expect("server");
    let checker = checker_for(&server, Duration::from_millis(200));

    let probe = checker.exists(&image("node", "v3.27.4")).await;
    assert_eq!(probe.outcome, Outcome::Errored(ErrorKind::Timeout));
}

#[tokio::test]
async fn test_unreachable_registry_is_transport_error() {
    // Bind then drop to get a port nobody listens on.
    let url = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind");
        format!("http://{}", listener.local_addr().expect("addr"))
    };

    let endpoints = HashMap::from([("registry.test".to_string(), url)]);
    let transport = HttpRegistryTransport::new(endpoints, Duration::from_secs(2)).expect("client");
    let checker = RegistryChecker::new(Arc::new(transport), Duration::from_secs(2));

    let probe = checker.exists(&image("node", "v3.27.4")).await;
    assert_eq!(probe.outcome, Outcome::Errored(ErrorKind::Transport));
}
