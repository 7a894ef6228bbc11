//! Release asset checker.
//!
//! The asset list of a release is fetched once and shared by every asset
//! query against that release, so the API cost does not grow with the number
//! of expected assets. Listing fetches coalesce per release the same way the
//! existence cache coalesces per artifact.

use super::registry::classify_send_error;
use super::{with_timeout, BackendChecker, Probe};
use crate::artifact::AssetRef;
use crate::cache::CoalescingCache;
use crate::error::{Error, Result};
use async_trait::async_trait;
use reqwest::header::{ACCEPT, AUTHORIZATION};
use reqwest::StatusCode;
use serde::Deserialize;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Default GitHub API base URL.
pub const GITHUB_API_URL: &str = "https://api.github.com";

/// Release API: lists the asset names published on a release.
#[async_trait]
pub trait ReleaseApi: Send + Sync {
    /// Names of every asset attached to release `tag` of `owner/repo`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] when the release does not exist, and other
    /// variants when the listing could not be retrieved.
    async fn release_assets(&self, owner: &str, repo: &str, tag: &str) -> Result<Vec<String>>;
}

#[derive(Debug, Deserialize)]
struct Release {
    #[serde(default)]
    assets: Vec<Asset>,
}

#[derive(Debug, Deserialize)]
struct Asset {
    name: String,
}

/// GitHub REST implementation of [`ReleaseApi`].
pub struct GithubReleaseApi {
    client: reqwest::Client,
    api_url: String,
    token: Option<String>,
}

impl GithubReleaseApi {
    /// Create a client for `api_url`, optionally authenticated with `token`.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(api_url: &str, token: Option<String>, call_timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(call_timeout)
            .user_agent(concat!("release-verify/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            api_url: api_url.trim_end_matches('/').to_string(),
            token,
        })
    }

    /// URL of the release-by-tag endpoint.
    #[must_use]
    pub fn release_url(&self, owner: &str, repo: &str, tag: &str) -> String {
        format!("{}/repos/{owner}/{repo}/releases/tags/{tag}", self.api_url)
    }
}

#[async_trait]
impl ReleaseApi for GithubReleaseApi {
    async fn release_assets(&self, owner: &str, repo: &str, tag: &str) -> Result<Vec<String>> {
        let url = self.release_url(owner, repo, tag);
        debug!("Fetching release listing from {}", url);

        let mut request = self
            .client
            .get(&url)
            .header(ACCEPT, "application/vnd.github+json");
        if let Some(token) = &self.token {
            request = request.header(AUTHORIZATION, format!("Bearer {token}"));
        }

        let response = request.send().await.map_err(|e| classify_send_error(e, &url))?;
        match response.status() {
            status if status.is_success() => {
                let release: Release = response
                    .json()
                    .await
                    .map_err(|e| Error::Serialization(format!("invalid release payload: {e}")))?;
                Ok(release.assets.into_iter().map(|a| a.name).collect())
            }
            StatusCode::NOT_FOUND => Err(Error::NotFound(format!(
                "release {tag} is not published in {owner}/{repo}"
            ))),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(Error::Auth(format!(
                "GitHub API refused access to {url} (HTTP {})",
                response.status().as_u16()
            ))),
            status => Err(Error::UnexpectedStatus {
                status: status.as_u16(),
                url,
            }),
        }
    }
}

/// Published asset names of one release, or the probe explaining why they are unknown.
type Listing = std::result::Result<Arc<HashSet<String>>, Probe>;

/// Checks release assets by membership in a once-per-release listing.
pub struct ReleaseAssetChecker {
    api: Arc<dyn ReleaseApi>,
    call_timeout: Duration,
    listings: CoalescingCache<String, Listing>,
}

impl ReleaseAssetChecker {
    /// Create a checker over `api`.
    #[must_use]
    pub fn new(api: Arc<dyn ReleaseApi>, call_timeout: Duration) -> Self {
        Self {
            api,
            call_timeout,
            listings: CoalescingCache::new(),
        }
    }

    /// Number of listing fetches issued so far.
    #[must_use]
    pub fn listing_fetches(&self) -> u64 {
        self.listings.stats().computations
    }

    async fn listing(&self, asset: &AssetRef) -> Listing {
        self.listings
            .get_or_compute(asset.release_id(), || async {
                let fetched = with_timeout(
                    self.call_timeout,
                    self.api
                        .release_assets(&asset.owner, &asset.repo, &asset.release),
                )
                .await;
                match fetched {
                    Ok(names) => {
                        info!(
                            "Release {} lists {} assets",
                            asset.release_id(),
                            names.len()
                        );
                        Ok(Arc::new(names.into_iter().collect()))
                    }
                    Err(e) => {
                        if e.is_transient() {
                            warn!("Release listing failed for {}: {}", asset.release_id(), e);
                        } else {
                            info!("Release {} is not published", asset.release_id());
                        }
                        Err(Probe::from_error(&e))
                    }
                }
            })
            .await
    }
}

#[async_trait]
impl BackendChecker for ReleaseAssetChecker {
    type Reference = AssetRef;

    async fn exists(&self, asset: &AssetRef) -> Probe {
        match self.listing(asset).await {
            Ok(names) if names.contains(&asset.name) => Probe::present(),
            Ok(names) => Probe::absent(format!("release lists {} other assets", names.len())),
            Err(probe) => probe,
        }
    }
}
