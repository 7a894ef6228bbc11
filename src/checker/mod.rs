//! Backend checkers.
//!
//! Each backend kind has one checker that turns a reference into a single
//! [`Probe`]: present, absent, or errored. Checkers delegate the actual
//! network traffic to a transport trait so that tests can substitute it.
//!
//! # Outcome mapping
//!
//! | Backend        | Present | Absent                         | Errored                      |
//! |----------------|---------|--------------------------------|------------------------------|
//! | Registry       | 2xx     | 404                            | timeout, auth, other status  |
//! | Release asset  | listed  | not listed, release 404        | listing failure              |
//! | Package mirror | 200     | any other status               | timeout, transport failure   |

mod mirror;
mod registry;
mod release;

pub use mirror::{HttpMirror, MirrorTransport, PackageMirrorChecker, PackageNaming};
pub use registry::{
    parse_bearer_challenge, BearerChallenge, HttpRegistryTransport, RegistryChecker,
    RegistryTransport,
};
pub use release::{GithubReleaseApi, ReleaseApi, ReleaseAssetChecker, GITHUB_API_URL};

use crate::artifact::ArtifactRef;
use crate::error::{Error, Result};
use async_trait::async_trait;
use serde::Serialize;
use std::fmt;
use std::future::Future;
use std::time::Duration;

/// Why a check could not reach a verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// The call or the whole run ran out of time.
    Timeout,
    /// Connection-level failure.
    Transport,
    /// Access refused.
    Auth,
    /// Status that is neither success nor a definitive miss.
    UnexpectedStatus,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Timeout => "timeout",
            Self::Transport => "transport error",
            Self::Auth => "auth error",
            Self::UnexpectedStatus => "unexpected status",
        };
        f.write_str(name)
    }
}

/// Result of one existence check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "outcome", content = "error")]
pub enum Outcome {
    /// The artifact exists.
    Present,
    /// The backend definitively reported the artifact missing.
    Absent,
    /// The check could not determine whether the artifact exists.
    Errored(ErrorKind),
}

impl Outcome {
    /// Returns true for [`Outcome::Present`].
    #[must_use]
    pub fn is_present(&self) -> bool {
        matches!(self, Self::Present)
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Present => f.write_str("present"),
            Self::Absent => f.write_str("absent"),
            Self::Errored(kind) => write!(f, "errored ({kind})"),
        }
    }
}

/// Outcome plus diagnostic detail, as stored in the existence cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Probe {
    /// The verdict.
    pub outcome: Outcome,
    /// Diagnostic detail for the report.
    pub detail: Option<String>,
}

impl Probe {
    /// The artifact exists.
    #[must_use]
    pub fn present() -> Self {
        Self {
            outcome: Outcome::Present,
            detail: None,
        }
    }

    /// The artifact is missing.
    #[must_use]
    pub fn absent(detail: impl Into<String>) -> Self {
        Self {
            outcome: Outcome::Absent,
            detail: Some(detail.into()),
        }
    }

    /// The check failed without a verdict.
    #[must_use]
    pub fn errored(kind: ErrorKind, detail: impl Into<String>) -> Self {
        Self {
            outcome: Outcome::Errored(kind),
            detail: Some(detail.into()),
        }
    }

    /// Classify an error raised while checking.
    #[must_use]
    pub fn from_error(error: &Error) -> Self {
        let detail = error.to_string();
        match error {
            Error::Shared(inner) => Self::from_error(inner),
            Error::NotFound(_) => Self::absent(detail),
            Error::Timeout(_) => Self::errored(ErrorKind::Timeout, detail),
            Error::Auth(_) => Self::errored(ErrorKind::Auth, detail),
            Error::UnexpectedStatus { .. } => Self::errored(ErrorKind::UnexpectedStatus, detail),
            Error::Http(e) if e.is_timeout() => Self::errored(ErrorKind::Timeout, detail),
            _ => Self::errored(ErrorKind::Transport, detail),
        }
    }
}

/// The `Exists` capability shared by every backend.
///
/// Implementations must not mutate caller-visible state, must be safe to call
/// concurrently for distinct references, and must finish in bounded time.
#[async_trait]
pub trait BackendChecker: Send + Sync {
    /// The reference type this backend understands.
    type Reference: Sync;

    /// Check whether the referenced artifact exists.
    async fn exists(&self, reference: &Self::Reference) -> Probe;
}

/// Run `call` with a per-call deadline, turning a lapse into [`Error::Timeout`].
pub(crate) async fn with_timeout<T, F>(limit: Duration, call: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => Err(Error::Timeout(limit)),
    }
}

/// One checker per backend kind, dispatched by reference variant.
pub struct CheckerSet {
    /// Container registry checker.
    pub registry: RegistryChecker,
    /// Release asset checker.
    pub releases: ReleaseAssetChecker,
    /// Package mirror checker.
    pub mirror: PackageMirrorChecker,
}

impl CheckerSet {
    /// Route `artifact` to the checker for its kind.
    pub async fn exists(&self, artifact: &ArtifactRef) -> Probe {
        match artifact {
            ArtifactRef::Image(image) => self.registry.exists(image).await,
            ArtifactRef::Asset(asset) => self.releases.exists(asset).await,
            ArtifactRef::Package(package) => self.mirror.exists(package).await,
        }
    }
}
