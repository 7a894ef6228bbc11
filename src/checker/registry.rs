//! Container registry checker.
//!
//! Existence of an image tag is decided with a single manifest `HEAD`.
//! Public registries answer anonymous requests with a `401` carrying a
//! bearer challenge; the transport follows it to the token endpoint once per
//! repository and retries, so callers never see the handshake.

use super::{with_timeout, BackendChecker, ErrorKind, Probe};
use crate::artifact::ImageRef;
use crate::cache::CoalescingCache;
use crate::error::{Error, Result};
use async_trait::async_trait;
use reqwest::header::{ACCEPT, AUTHORIZATION, WWW_AUTHENTICATE};
use reqwest::StatusCode;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Manifest media types accepted from the registry.
const MANIFEST_ACCEPT: &str = "application/vnd.oci.image.index.v1+json, \
    application/vnd.docker.distribution.manifest.list.v2+json, \
    application/vnd.docker.distribution.manifest.v2+json, \
    application/vnd.oci.image.manifest.v1+json";

/// API endpoint for Docker Hub, which is not served from `docker.io` itself.
const DOCKER_HUB_ENDPOINT: &str = "https://registry-1.docker.io";

/// Registry transport: reports the HTTP status of a manifest lookup.
#[async_trait]
pub trait RegistryTransport: Send + Sync {
    /// Status of `HEAD /v2/<namespace>/<name>/manifests/<tag>` after any token bootstrap.
    async fn manifest_status(&self, image: &ImageRef) -> Result<u16>;
}

/// Parsed `WWW-Authenticate: Bearer ...` challenge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BearerChallenge {
    /// Token endpoint.
    pub realm: String,
    /// Service name to request the token for.
    pub service: Option<String>,
    /// Scope requested by the registry.
    pub scope: Option<String>,
}

/// Parse a bearer challenge header value.
///
/// Returns `None` for other schemes or when no realm is given.
#[must_use]
pub fn parse_bearer_challenge(header: &str) -> Option<BearerChallenge> {
    let header = header.trim();
    let (scheme, params) = header.split_once(char::is_whitespace)?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }

    let mut values = HashMap::new();
    let mut rest = params.trim();
    while !rest.is_empty() {
        let (key, after_key) = rest.split_once('=')?;
        let key = key.trim().to_ascii_lowercase();
        let after_key = after_key.trim_start();

        let (value, remainder) = if let Some(quoted) = after_key.strip_prefix('"') {
            let end = quoted.find('"')?;
            (&quoted[..end], &quoted[end + 1..])
        } else {
            after_key.split_once(',').map_or((after_key, ""), |(v, r)| (v, r))
        };

        values.insert(key, value.trim().to_string());
        rest = remainder.trim_start().trim_start_matches(',').trim_start();
    }

    Some(BearerChallenge {
        realm: values.remove("realm")?,
        service: values.remove("service"),
        scope: values.remove("scope"),
    })
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    #[serde(default)]
    token: Option<String>,
    #[serde(default)]
    access_token: Option<String>,
}

/// Token issued for one repository, or the shared reason none was.
type TokenResult = std::result::Result<String, Arc<Error>>;

/// `reqwest`-backed registry transport with anonymous token bootstrap.
pub struct HttpRegistryTransport {
    client: reqwest::Client,
    /// Host → API base URL overrides.
    endpoints: HashMap<String, String>,
    /// Repository (`host/namespace/name`) → bearer token, fetched once per run.
    tokens: CoalescingCache<String, TokenResult>,
}

impl HttpRegistryTransport {
    /// Create a transport.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(endpoints: HashMap<String, String>, call_timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(call_timeout)
            .user_agent(concat!("release-verify/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            endpoints,
            tokens: CoalescingCache::new(),
        })
    }

    /// API base URL for `host`.
    #[must_use]
    pub fn endpoint(&self, host: &str) -> String {
        if let Some(endpoint) = self.endpoints.get(host) {
            return endpoint.trim_end_matches('/').to_string();
        }
        if host == "docker.io" {
            DOCKER_HUB_ENDPOINT.to_string()
        } else {
            format!("https://{host}")
        }
    }

    /// Manifest URL for `image`.
    #[must_use]
    pub fn manifest_url(&self, image: &ImageRef) -> String {
        format!(
            "{}/v2/{}/manifests/{}",
            self.endpoint(&image.host),
            image.repository(),
            image.tag
        )
    }

    async fn head_manifest(&self, url: &str, token: Option<&str>) -> Result<reqwest::Response> {
        let mut request = self.client.head(url).header(ACCEPT, MANIFEST_ACCEPT);
        if let Some(token) = token {
            request = request.header(AUTHORIZATION, format!("Bearer {token}"));
        }
        request
            .send()
            .await
            .map_err(|e| classify_send_error(e, url))
    }

    async fn fetch_token(&self, challenge: &BearerChallenge, image: &ImageRef) -> Result<String> {
        let scope = challenge
            .scope
            .clone()
            .unwrap_or_else(|| format!("repository:{}:pull", image.repository()));
        let mut query = vec![("scope", scope)];
        if let Some(service) = &challenge.service {
            query.push(("service", service.clone()));
        }

        debug!("Requesting anonymous token from {}", challenge.realm);
        let response = self
            .client
            .get(&challenge.realm)
            .query(&query)
            .send()
            .await
            .map_err(|e| classify_send_error(e, &challenge.realm))?;

        if !response.status().is_success() {
            return Err(Error::Auth(format!(
                "token endpoint {} returned HTTP {}",
                challenge.realm,
                response.status().as_u16()
            )));
        }

        let body: TokenResponse = response
            .json()
            .await
            .map_err(|e| Error::Auth(format!("invalid token response: {e}")))?;
        body.token
            .or(body.access_token)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| Error::Auth(format!("no token issued by {}", challenge.realm)))
    }
}

#[async_trait]
impl RegistryTransport for HttpRegistryTransport {
    async fn manifest_status(&self, image: &ImageRef) -> Result<u16> {
        let url = self.manifest_url(image);
        let repository = image.full_path();
        let cached = self.tokens.get(&repository).and_then(std::result::Result::ok);

        let response = self.head_manifest(&url, cached.as_deref()).await?;
        if response.status() != StatusCode::UNAUTHORIZED || cached.is_some() {
            return Ok(response.status().as_u16());
        }

        let challenge = response
            .headers()
            .get(WWW_AUTHENTICATE)
            .and_then(|value| value.to_str().ok())
            .and_then(parse_bearer_challenge)
            .ok_or_else(|| {
                Error::Auth(format!(
                    "{} requires credentials without a bearer challenge",
                    image.host
                ))
            })?;

        // Checks of one repository racing here share a single token request.
        let token = self
            .tokens
            .get_or_compute(repository, || async {
                self.fetch_token(&challenge, image).await.map_err(Arc::new)
            })
            .await
            .map_err(Error::Shared)?;

        let retried = self.head_manifest(&url, Some(&token)).await?;
        Ok(retried.status().as_u16())
    }
}

pub(crate) fn classify_send_error(error: reqwest::Error, url: &str) -> Error {
    if error.is_connect() && !error.is_timeout() {
        Error::Network(format!("could not connect to {url}: {error}"))
    } else {
        Error::Http(error)
    }
}

/// Checks image tags against their registry.
pub struct RegistryChecker {
    transport: Arc<dyn RegistryTransport>,
    call_timeout: Duration,
}

impl RegistryChecker {
    /// Create a checker over `transport`.
    #[must_use]
    pub fn new(transport: Arc<dyn RegistryTransport>, call_timeout: Duration) -> Self {
        Self {
            transport,
            call_timeout,
        }
    }
}

#[async_trait]
impl BackendChecker for RegistryChecker {
    type Reference = ImageRef;

    async fn exists(&self, image: &ImageRef) -> Probe {
        debug!("Checking image {}:{}", image.full_path(), image.tag);

        let status = with_timeout(self.call_timeout, self.transport.manifest_status(image)).await;
        match status {
            Ok(status) if (200..300).contains(&status) => Probe::present(),
            Ok(404) => Probe::absent("manifest lookup returned HTTP 404"),
            Ok(status @ (401 | 403)) => Probe::errored(
                ErrorKind::Auth,
                format!("registry {} refused access (HTTP {status})", image.host),
            ),
            Ok(status) => Probe::errored(
                ErrorKind::UnexpectedStatus,
                format!("registry {} returned HTTP {status}", image.host),
            ),
            Err(e) => {
                warn!("Registry check failed for {}:{}: {}", image.full_path(), image.tag, e);
                Probe::from_error(&e)
            }
        }
    }
}
