//! Package mirror tests.

use super::harness::{MockRequest, MockResponse, MockServer};
use release_verify::artifact::PackageRef;
use release_verify::checker::{
    BackendChecker, ErrorKind, HttpMirror, MirrorTransport, Outcome, PackageMirrorChecker,
    PackageNaming,
};
use std::sync::Arc;
use std::time::Duration;

fn mirror(request: &MockRequest) -> MockResponse {
    match request.path.as_str() {
        "/jammy/calico-felix_3.27.4_amd64.deb" => {
            MockResponse::status(200).with_body("x".repeat(64 * 1024))
        }
        "/jammy/slow_3.27.4_amd64.deb" => {
            MockResponse::status(200).with_delay(Duration::from_secs(5))
        }
        "/jammy/moved_3.27.4_amd64.deb" => MockResponse::status(500),
        _ => MockResponse::status(404),
    }
}

fn package(server: &MockServer, component: &str) -> PackageRef {
    let template = format!("{}/{{os}}/{{component}}_{{version}}_amd64.deb", server.url());
    let naming = PackageNaming::new(template).expect("template");
    PackageRef {
        component: component.to_string(),
        version: "3.27.4".to_string(),
        os_version: "jammy".to_string(),
        url: naming.resolve(component, "3.27.4", "jammy").expect("url"),
    }
}

fn checker(call_timeout: Duration) -> PackageMirrorChecker {
    PackageMirrorChecker::new(
        Arc::new(HttpMirror::new(call_timeout).expect("client")),
        call_timeout,
    )
}

#[tokio::test]
async fn test_transport_uses_get() {
    let server = MockServer::start(mirror).await.expect("server");
    let transport = HttpMirror::new(Duration::from_secs(5)).expect("client");

    let status = tokio_test::assert_ok!(
        transport
            .status(&format!("{}/jammy/calico-felix_3.27.4_amd64.deb", server.url()))
            .await
    );
    assert_eq!(status, 200);
    assert_eq!(server.count("GET", "/jammy/calico-felix_3.27.4_amd64.deb"), 1);
}

#[tokio::test]
async fn test_published_package_is_present() {
    let server = MockServer::start(mirror).await.expect("server");
    let probe = checker(Duration::from_secs(5))
        .exists(&package(&server, "calico-felix"))
        .await;
    assert_eq!(probe.outcome, Outcome::Present);
}

#[tokio::test]
async fn test_non_200_status_is_absent() {
    let server = MockServer::start(mirror).await.expect("server");
    let checker = checker(Duration::from_secs(5));

    let missing = checker.exists(&package(&server, "networking-calico")).await;
    assert_eq!(missing.outcome, Outcome::Absent);
    assert!(missing.detail.as_deref().unwrap_or_default().contains("404"));

    let broken = checker.exists(&package(&server, "moved")).await;
    assert_eq!(broken.outcome, Outcome::Absent);
    assert!(broken.detail.as_deref().unwrap_or_default().contains("500"));
}

#[tokio::test]
async fn test_slow_mirror_times_out() {
    let server = MockServer::start(mirror).await.expect("server");
    let probe = checker(Duration::from_millis(200))
        .exists(&package(&server, "slow"))
        .await;
    assert_eq!(probe.outcome, Outcome::Errored(ErrorKind::Timeout));
}
