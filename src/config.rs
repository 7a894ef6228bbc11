//! Configuration for release-verify.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Top-level verification configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifyConfig {
    /// Release being verified.
    #[serde(default)]
    pub release: ReleaseConfig,

    /// Container image expectations.
    #[serde(default)]
    pub images: ImagesConfig,

    /// Release asset expectations.
    #[serde(default)]
    pub github: GithubConfig,

    /// Package mirror expectations.
    #[serde(default)]
    pub packages: PackagesConfig,

    /// Execution settings.
    #[serde(default)]
    pub runner: RunnerConfig,
}

/// Release identity.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseConfig {
    /// Release tag, e.g. `v3.27.4`.
    #[serde(default)]
    pub tag: String,

    /// Operator version shipped with the release, e.g. `v1.32.4`.
    #[serde(default)]
    pub operator_version: Option<String>,
}

/// Maps registry hosts with a given suffix to a namespace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamespaceRule {
    /// Host suffix, e.g. `gcr.io` (also matches `us.gcr.io`).
    pub host_suffix: String,
    /// Namespace used on matching hosts.
    pub namespace: String,
}

/// An image checked once under its own tag, outside the host matrix.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PinnedImage {
    /// Image name.
    pub name: String,
    /// Registry host.
    pub host: String,
    /// Namespace override; the namespace rules apply when unset.
    #[serde(default)]
    pub namespace: Option<String>,
    /// Tag. `{operator_version}` and `{release_tag}` are substituted.
    pub tag: String,
}

/// Container image expectations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImagesConfig {
    /// Registry hosts every image is published to.
    #[serde(default)]
    pub hosts: Vec<String>,

    /// Multi-architecture image names.
    #[serde(default)]
    pub names: Vec<String>,

    /// Images published for a single platform; no architecture cross-product.
    #[serde(default)]
    pub arch_specific: Vec<String>,

    /// Architectures every multi-architecture image is tagged for.
    #[serde(default)]
    pub architectures: Vec<String>,

    /// Namespace used when no rule matches.
    #[serde(default = "default_namespace")]
    pub default_namespace: String,

    /// Host suffix → namespace rules, first match wins.
    #[serde(default)]
    pub namespace_rules: Vec<NamespaceRule>,

    /// Host → registry API base URL overrides.
    #[serde(default)]
    pub endpoints: BTreeMap<String, String>,

    /// Images outside the host matrix.
    #[serde(default)]
    pub pinned: Vec<PinnedImage>,
}

/// Release asset expectations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GithubConfig {
    /// GitHub API base URL.
    #[serde(default = "default_github_api")]
    pub api_url: String,

    /// Repository owner.
    #[serde(default)]
    pub owner: String,

    /// Repository name.
    #[serde(default)]
    pub repo: String,

    /// Environment variable holding an optional API token.
    #[serde(default = "default_token_env")]
    pub token_env: String,

    /// Asset name templates; `%s` is replaced with the release tag.
    #[serde(default)]
    pub assets: Vec<String>,
}

/// One package expected on the mirror.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageSpec {
    /// Component name.
    pub component: String,
    /// Package version.
    pub version: String,
    /// OS or distribution identifier.
    pub os_version: String,
}

/// Package mirror expectations.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackagesConfig {
    /// URL template with `{component}`, `{version}` and `{os}` placeholders.
    #[serde(default)]
    pub url_template: String,

    /// Expected packages.
    #[serde(default)]
    pub items: Vec<PackageSpec>,
}

/// Execution settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunnerConfig {
    /// Maximum checks in flight.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Timeout for each network call, in seconds.
    #[serde(default = "default_call_timeout")]
    pub call_timeout_secs: u64,

    /// Timeout for the whole run, in seconds.
    #[serde(default = "default_run_timeout")]
    pub run_timeout_secs: u64,
}

impl Default for ImagesConfig {
    fn default() -> Self {
        Self {
            hosts: Vec::new(),
            names: Vec::new(),
            arch_specific: Vec::new(),
            architectures: Vec::new(),
            default_namespace: default_namespace(),
            namespace_rules: Vec::new(),
            endpoints: BTreeMap::new(),
            pinned: Vec::new(),
        }
    }
}

impl Default for GithubConfig {
    fn default() -> Self {
        Self {
            api_url: default_github_api(),
            owner: String::new(),
            repo: String::new(),
            token_env: default_token_env(),
            assets: Vec::new(),
        }
    }
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            call_timeout_secs: default_call_timeout(),
            run_timeout_secs: default_run_timeout(),
        }
    }
}

fn default_namespace() -> String {
    "calico".to_string()
}

fn default_github_api() -> String {
    crate::checker::GITHUB_API_URL.to_string()
}

fn default_token_env() -> String {
    "GITHUB_TOKEN".to_string()
}

const fn default_concurrency() -> usize {
    16
}

const fn default_call_timeout() -> u64 {
    30
}

const fn default_run_timeout() -> u64 {
    600
}

/// Default configuration file location.
#[must_use]
pub fn default_config_path() -> PathBuf {
    directories::ProjectDirs::from("", "", "release-verify")
        .map(|dirs| dirs.config_dir().join("config.toml"))
        .unwrap_or_else(|| PathBuf::from("release-verify.toml"))
}

impl ImagesConfig {
    /// Namespace for `host`: the first matching rule, else the default.
    #[must_use]
    pub fn namespace_for(&self, host: &str) -> &str {
        self.namespace_rules
            .iter()
            .find(|rule| host.ends_with(&rule.host_suffix))
            .map_or(self.default_namespace.as_str(), |rule| rule.namespace.as_str())
    }
}

impl VerifyConfig {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| Error::Config(e.to_string()))
    }

    /// Save configuration to a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn to_file(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).map_err(|e| Error::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Check the configuration before any network I/O.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] naming the first problem found.
    pub fn validate(&self) -> Result<()> {
        let tag = self.release.tag.trim();
        if tag.is_empty() {
            return Err(Error::Config("release tag is not set".to_string()));
        }
        validate_version("release tag", tag)?;
        if let Some(operator) = &self.release.operator_version {
            validate_version("operator version", operator)?;
        }

        require_names("image host", &self.images.hosts)?;
        require_names("image name", &self.images.names)?;
        require_names("architecture-specific image", &self.images.arch_specific)?;
        require_names("architecture", &self.images.architectures)?;
        if self.images.hosts.iter().any(|h| h.contains("://") || h.contains('/')) {
            return Err(Error::Config(
                "image hosts must be bare host names without scheme or path".to_string(),
            ));
        }
        let has_images = !(self.images.names.is_empty() && self.images.arch_specific.is_empty());
        if has_images && self.images.hosts.is_empty() {
            return Err(Error::Config("images are listed but no hosts are".to_string()));
        }

        if !self.github.assets.is_empty()
            && (self.github.owner.trim().is_empty() || self.github.repo.trim().is_empty())
        {
            return Err(Error::Config(
                "release assets require github.owner and github.repo".to_string(),
            ));
        }

        if !self.packages.items.is_empty() && self.packages.url_template.trim().is_empty() {
            return Err(Error::Config(
                "packages are listed but packages.url_template is not set".to_string(),
            ));
        }

        if self.runner.concurrency == 0 {
            return Err(Error::Config("runner.concurrency must be at least 1".to_string()));
        }
        if self.runner.call_timeout_secs == 0 || self.runner.run_timeout_secs == 0 {
            return Err(Error::Config("runner timeouts must be at least 1 second".to_string()));
        }
        Ok(())
    }
}

fn validate_version(what: &str, tag: &str) -> Result<()> {
    let bare = tag.strip_prefix('v').unwrap_or(tag);
    semver::Version::parse(bare)
        .map(|_| ())
        .map_err(|e| Error::Config(format!("{what} {tag} is not a semantic version: {e}")))
}

fn require_names(what: &str, names: &[String]) -> Result<()> {
    if names.iter().any(|n| n.trim().is_empty()) {
        return Err(Error::Config(format!("empty {what} in configuration")));
    }
    Ok(())
}
