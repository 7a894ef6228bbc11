//! Package mirror checker.

use super::registry::classify_send_error;
use super::{with_timeout, BackendChecker, Probe};
use crate::artifact::PackageRef;
use crate::error::{Error, Result};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Placeholders understood by [`PackageNaming`].
const PLACEHOLDERS: [&str; 3] = ["{component}", "{version}", "{os}"];

/// Naming convention mapping a package descriptor to its mirror URL.
///
/// The template may use `{component}`, `{version}` and `{os}`, e.g.
/// `https://mirror.example/{os}/{component}_{version}_amd64.deb`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageNaming {
    url_template: String,
}

impl PackageNaming {
    /// Create a naming convention from a URL template.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the template is not an http(s) URL or uses
    /// a placeholder other than the supported ones.
    pub fn new(url_template: impl Into<String>) -> Result<Self> {
        let url_template = url_template.into();
        if !(url_template.starts_with("https://") || url_template.starts_with("http://")) {
            return Err(Error::Config(format!(
                "package URL template must be an http(s) URL: {url_template}"
            )));
        }
        let naming = Self { url_template };
        // Probe the template once so unknown placeholders fail at load time.
        naming.resolve("component", "version", "os")?;
        Ok(naming)
    }

    /// Resolve the URL for one package.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if a placeholder is left unresolved.
    pub fn resolve(&self, component: &str, version: &str, os_version: &str) -> Result<String> {
        let url = PLACEHOLDERS
            .iter()
            .zip([component, version, os_version])
            .fold(self.url_template.clone(), |url, (placeholder, value)| {
                url.replace(placeholder, value)
            });

        if url.contains('{') || url.contains('}') {
            return Err(Error::Config(format!(
                "unresolved placeholder in package URL template {}",
                self.url_template
            )));
        }
        Ok(url)
    }
}

/// HTTP mirror transport: reports the status of a retrieval.
#[async_trait]
pub trait MirrorTransport: Send + Sync {
    /// Status code returned for `url`. Only the status line is consumed.
    async fn status(&self, url: &str) -> Result<u16>;
}

/// `reqwest`-backed [`MirrorTransport`].
pub struct HttpMirror {
    client: reqwest::Client,
}

impl HttpMirror {
    /// Create a mirror transport.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(call_timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(call_timeout)
            .user_agent(concat!("release-verify/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl MirrorTransport for HttpMirror {
    async fn status(&self, url: &str) -> Result<u16> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| classify_send_error(e, url))?;
        // Dropping the response closes the body stream unread.
        Ok(response.status().as_u16())
    }
}

/// Checks packages by retrieving their resolved URL.
pub struct PackageMirrorChecker {
    transport: Arc<dyn MirrorTransport>,
    call_timeout: Duration,
}

impl PackageMirrorChecker {
    /// Create a checker over `transport`.
    #[must_use]
    pub fn new(transport: Arc<dyn MirrorTransport>, call_timeout: Duration) -> Self {
        Self {
            transport,
            call_timeout,
        }
    }
}

#[async_trait]
impl BackendChecker for PackageMirrorChecker {
    type Reference = PackageRef;

    async fn exists(&self, package: &PackageRef) -> Probe {
        debug!("Checking package {}", package.url);

        match with_timeout(self.call_timeout, self.transport.status(&package.url)).await {
            Ok(200) => Probe::present(),
            Ok(status) => Probe::absent(format!("HTTP {status} from {}", package.url)),
            Err(e) => {
                warn!("Package check failed for {}: {}", package.url, e);
                Probe::from_error(&e)
            }
        }
    }
}
