//! Artifact references and their canonical keys.
//!
//! A reference identifies one checkable thing. Its [`CanonicalKey`] is the
//! backend kind plus the fully resolved location, and is what the existence
//! cache deduplicates on. Labels and groups never take part in the key.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The backend a reference is checked against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Container registry (manifest lookup).
    Registry,
    /// Release asset listing on the code-hosting platform.
    ReleaseAsset,
    /// HTTP package mirror.
    PackageMirror,
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Registry => "registry",
            Self::ReleaseAsset => "release-asset",
            Self::PackageMirror => "package-mirror",
        };
        f.write_str(name)
    }
}

/// Deduplication key for existence checks.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct CanonicalKey {
    /// Backend kind.
    pub kind: BackendKind,
    /// Fully resolved location string.
    pub location: String,
}

impl fmt::Display for CanonicalKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.location)
    }
}

/// A container image tag on a specific registry host.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ImageRef {
    /// Registry host as users know it (e.g. `docker.io`).
    pub host: String,
    /// Repository namespace on that host.
    pub namespace: String,
    /// Image name.
    pub name: String,
    /// Tag, including any architecture suffix.
    pub tag: String,
}

impl ImageRef {
    /// Repository path below the host, `namespace/name`.
    #[must_use]
    pub fn repository(&self) -> String {
        format!("{}/{}", self.namespace, self.name)
    }

    /// Full path without the tag, `host/namespace/name`.
    #[must_use]
    pub fn full_path(&self) -> String {
        format!("{}/{}/{}", self.host, self.namespace, self.name)
    }
}

/// One named asset of a release.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AssetRef {
    /// Repository owner.
    pub owner: String,
    /// Repository name.
    pub repo: String,
    /// Release tag.
    pub release: String,
    /// Asset filename, already resolved.
    pub name: String,
}

impl AssetRef {
    /// Identifier of the release this asset belongs to.
    #[must_use]
    pub fn release_id(&self) -> String {
        format!("{}/{}@{}", self.owner, self.repo, self.release)
    }
}

/// A package build published on the mirror.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PackageRef {
    /// Component name.
    pub component: String,
    /// Package version.
    pub version: String,
    /// OS or distribution identifier.
    pub os_version: String,
    /// Resolved download URL.
    pub url: String,
}

/// Reference to one artifact, dispatched on by backend kind.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ArtifactRef {
    /// Container image.
    Image(ImageRef),
    /// Release asset.
    Asset(AssetRef),
    /// OS package.
    Package(PackageRef),
}

impl ArtifactRef {
    /// Backend kind for this reference.
    #[must_use]
    pub fn kind(&self) -> BackendKind {
        match self {
            Self::Image(_) => BackendKind::Registry,
            Self::Asset(_) => BackendKind::ReleaseAsset,
            Self::Package(_) => BackendKind::PackageMirror,
        }
    }

    /// Canonical key used by the existence cache.
    #[must_use]
    pub fn canonical_key(&self) -> CanonicalKey {
        let location = match self {
            Self::Image(image) => format!("{}:{}", image.full_path(), image.tag),
            Self::Asset(asset) => format!("{}/{}", asset.release_id(), asset.name),
            Self::Package(package) => package.url.clone(),
        };
        CanonicalKey {
            kind: self.kind(),
            location,
        }
    }

    /// Sentence naming this artifact as missing.
    #[must_use]
    pub fn missing_description(&self) -> String {
        match self {
            Self::Image(image) => format!(
                "image {}/{}:{} not found at host {}",
                image.namespace, image.name, image.tag, image.host
            ),
            Self::Asset(asset) => format!(
                "missing asset {} in release {} of {}/{}",
                asset.name, asset.release, asset.owner, asset.repo
            ),
            Self::Package(package) => format!(
                "package {} {} for {} not published at {}",
                package.component, package.version, package.os_version, package.url
            ),
        }
    }
}

impl fmt::Display for ArtifactRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Image(image) => write!(f, "{}:{}", image.full_path(), image.tag),
            Self::Asset(asset) => write!(f, "{} {}", asset.release_id(), asset.name),
            Self::Package(package) => write!(
                f,
                "{} {} ({})",
                package.component, package.version, package.os_version
            ),
        }
    }
}
