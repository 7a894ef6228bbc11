//! Verification matrix builder.
//!
//! Expands the compact configuration into the flat, ordered list of artifact
//! references to check. Expansion is pure: no network I/O, and the same
//! configuration always yields the same list in the same order.
//!
//! Order of expansion:
//!
//! 1. per registry host: every image under the release tag, every image under
//!    `<tag>-<arch>` for each architecture, every architecture-specific image
//!    under the release tag;
//! 2. pinned images;
//! 3. release assets;
//! 4. packages.

use crate::artifact::{ArtifactRef, AssetRef, BackendKind, CanonicalKey, ImageRef, PackageRef};
use crate::checker::PackageNaming;
use crate::config::VerifyConfig;
use crate::error::{Error, Result};
use serde::Serialize;
use std::collections::HashSet;
use std::fmt;
use tracing::debug;

/// Placeholder in asset name templates replaced by the release tag.
pub const TAG_PLACEHOLDER: &str = "%s";

/// Reporting group of a planned check.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct CheckGroup {
    /// Backend kind of every check in the group.
    pub kind: BackendKind,
    /// Group name: registry host, release, or mirror.
    pub name: String,
}

impl fmt::Display for CheckGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            BackendKind::Registry => write!(f, "images at registry {}", self.name),
            BackendKind::ReleaseAsset => write!(f, "assets of release {}", self.name),
            BackendKind::PackageMirror => write!(f, "packages on {}", self.name),
        }
    }
}

/// One entry of the matrix.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlannedCheck {
    /// Reporting group.
    pub group: CheckGroup,
    /// Human-readable label.
    pub label: String,
    /// What to check.
    pub artifact: ArtifactRef,
}

/// The full expanded set of references for one run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct VerificationMatrix {
    /// Release tag the matrix was built for.
    pub release_tag: String,
    checks: Vec<PlannedCheck>,
}

impl VerificationMatrix {
    /// Create a matrix from already planned checks.
    #[must_use]
    pub fn new(release_tag: impl Into<String>, checks: Vec<PlannedCheck>) -> Self {
        Self {
            release_tag: release_tag.into(),
            checks,
        }
    }

    /// Planned checks in declaration order.
    #[must_use]
    pub fn checks(&self) -> &[PlannedCheck] {
        &self.checks
    }

    /// Number of planned checks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.checks.len()
    }

    /// Check if nothing is planned.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.checks.is_empty()
    }

    /// Number of distinct canonical keys, i.e. the most backend lookups a run needs.
    #[must_use]
    pub fn distinct_keys(&self) -> usize {
        self.checks
            .iter()
            .map(|c| c.artifact.canonical_key())
            .collect::<HashSet<CanonicalKey>>()
            .len()
    }

    /// Keep only checks against the given backends.
    pub fn retain_groups(&mut self, kinds: &[BackendKind]) {
        self.checks.retain(|check| kinds.contains(&check.group.kind));
    }
}

/// Instantiate an asset name template with the release tag.
///
/// # Errors
///
/// Returns [`Error::Config`] if the template contains any placeholder other
/// than `%s`.
pub fn resolve_asset_name(template: &str, release_tag: &str) -> Result<String> {
    if template.trim().is_empty() {
        return Err(Error::Config("empty asset name template".to_string()));
    }
    let name = template.replace(TAG_PLACEHOLDER, release_tag);
    let mut chars = name.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '%' && chars.peek().is_some_and(char::is_ascii_alphabetic) {
            return Err(Error::Config(format!(
                "unresolved placeholder in asset template {template}"
            )));
        }
    }
    Ok(name)
}

fn resolve_pinned_tag(template: &str, config: &VerifyConfig) -> Result<String> {
    let mut tag = template.replace("{release_tag}", &config.release.tag);
    if tag.contains("{operator_version}") {
        let operator = config.release.operator_version.as_deref().ok_or_else(|| {
            Error::Config(format!(
                "pinned image tag {template} needs release.operator_version"
            ))
        })?;
        tag = tag.replace("{operator_version}", operator);
    }
    if tag.is_empty() || tag.contains('{') || tag.contains('}') {
        return Err(Error::Config(format!(
            "unresolved placeholder in pinned image tag {template}"
        )));
    }
    Ok(tag)
}

fn image_check(
    config: &VerifyConfig,
    host: &str,
    name: &str,
    tag: String,
    label: String,
) -> PlannedCheck {
    PlannedCheck {
        group: CheckGroup {
            kind: BackendKind::Registry,
            name: host.to_string(),
        },
        label,
        artifact: ArtifactRef::Image(ImageRef {
            host: host.to_string(),
            namespace: config.images.namespace_for(host).to_string(),
            name: name.to_string(),
            tag,
        }),
    }
}

fn expand_images(config: &VerifyConfig, checks: &mut Vec<PlannedCheck>) -> Result<()> {
    let tag = &config.release.tag;
    let images = &config.images;

    for host in &images.hosts {
        for name in &images.names {
            let label = format!("image {name} should exist");
            checks.push(image_check(config, host, name, tag.clone(), label));
        }
        for name in &images.names {
            for arch in &images.architectures {
                checks.push(image_check(
                    config,
                    host,
                    name,
                    format!("{tag}-{arch}"),
                    format!("image {name} should have {arch}"),
                ));
            }
        }
        for name in &images.arch_specific {
            checks.push(image_check(
                config,
                host,
                name,
                tag.clone(),
                format!("arch-specific image {name} should exist"),
            ));
        }
    }

    for pinned in &images.pinned {
        let pinned_tag = resolve_pinned_tag(&pinned.tag, config)?;
        let mut check = image_check(
            config,
            &pinned.host,
            &pinned.name,
            pinned_tag,
            format!("image {} should exist", pinned.name),
        );
        if let (Some(namespace), ArtifactRef::Image(image)) =
            (&pinned.namespace, &mut check.artifact)
        {
            image.namespace.clone_from(namespace);
        }
        checks.push(check);
    }
    Ok(())
}

fn expand_assets(config: &VerifyConfig, checks: &mut Vec<PlannedCheck>) -> Result<()> {
    let github = &config.github;
    let tag = &config.release.tag;
    let group = CheckGroup {
        kind: BackendKind::ReleaseAsset,
        name: format!("{}/{}@{tag}", github.owner, github.repo),
    };

    for template in &github.assets {
        let name = resolve_asset_name(template, tag)?;
        checks.push(PlannedCheck {
            group: group.clone(),
            label: format!("asset {name}"),
            artifact: ArtifactRef::Asset(AssetRef {
                owner: github.owner.clone(),
                repo: github.repo.clone(),
                release: tag.clone(),
                name,
            }),
        });
    }
    Ok(())
}

fn expand_packages(config: &VerifyConfig, checks: &mut Vec<PlannedCheck>) -> Result<()> {
    let packages = &config.packages;
    if packages.items.is_empty() {
        return Ok(());
    }

    let naming = PackageNaming::new(packages.url_template.clone())?;
    let group = CheckGroup {
        kind: BackendKind::PackageMirror,
        name: "package mirror".to_string(),
    };

    for item in &packages.items {
        let url = naming.resolve(&item.component, &item.version, &item.os_version)?;
        checks.push(PlannedCheck {
            group: group.clone(),
            label: format!(
                "should have published {} {} for {}",
                item.component, item.version, item.os_version
            ),
            artifact: ArtifactRef::Package(PackageRef {
                component: item.component.clone(),
                version: item.version.clone(),
                os_version: item.os_version.clone(),
                url,
            }),
        });
    }
    Ok(())
}

/// Expand `config` into the verification matrix.
///
/// # Errors
///
/// Returns [`Error::Config`] if the configuration is invalid or a template
/// cannot be fully resolved. No check is planned in that case.
pub fn build_matrix(config: &VerifyConfig) -> Result<VerificationMatrix> {
    config.validate()?;

    let mut checks = Vec::new();
    expand_images(config, &mut checks)?;
    expand_assets(config, &mut checks)?;
    expand_packages(config, &mut checks)?;

    let matrix = VerificationMatrix::new(config.release.tag.clone(), checks);
    debug!(
        "Planned {} checks ({} distinct artifacts) for {}",
        matrix.len(),
        matrix.distinct_keys(),
        matrix.release_tag
    );
    Ok(matrix)
}
