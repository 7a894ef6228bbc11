//! Command-line interface definition.

use clap::{Parser, ValueEnum};
use release_verify::config::{default_config_path, VerifyConfig};
use release_verify::BackendKind;
use std::path::PathBuf;

/// Verify that every artifact of a release was published.
#[derive(Parser, Debug)]
#[command(name = "release-verify")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file.
    #[arg(long, short, env = "RELEASE_VERIFY_CONFIG")]
    pub config: Option<PathBuf>,

    /// Release tag to verify (overrides the config file).
    #[arg(long, short = 't', env = "RELEASE_VERIFY_TAG")]
    pub release_tag: Option<String>,

    /// Operator version shipped with the release (overrides the config file).
    #[arg(long, env = "RELEASE_VERIFY_OPERATOR_VERSION")]
    pub operator_version: Option<String>,

    /// Only check these artifact groups.
    #[arg(long, value_enum)]
    pub only: Vec<CliGroup>,

    /// Maximum checks in flight.
    #[arg(long, env = "RELEASE_VERIFY_CONCURRENCY")]
    pub concurrency: Option<usize>,

    /// Timeout for each network call, in seconds.
    #[arg(long)]
    pub call_timeout_secs: Option<u64>,

    /// Timeout for the whole run, in seconds.
    #[arg(long)]
    pub run_timeout_secs: Option<u64>,

    /// Report format.
    #[arg(long, value_enum, default_value = "text")]
    pub format: CliFormat,

    /// Print the planned checks without contacting any backend.
    #[arg(long)]
    pub plan: bool,

    /// Log level.
    #[arg(long, default_value = "info", env = "RUST_LOG")]
    pub log_level: String,

    /// Log output format.
    #[arg(long, value_enum, default_value = "pretty")]
    pub log_format: CliLogFormat,
}

/// Artifact group CLI enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum CliGroup {
    /// Container images.
    Images,
    /// Release assets.
    Assets,
    /// OS packages.
    Packages,
}

/// Report format CLI enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum CliFormat {
    /// Grouped, human-readable text.
    Text,
    /// Structured JSON.
    Json,
}

/// Log format CLI enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum CliLogFormat {
    /// Human-readable lines.
    Pretty,
    /// One JSON object per line.
    Json,
}

impl Cli {
    /// Backend kinds selected with `--only`; empty means all.
    #[must_use]
    pub fn selected_groups(&self) -> Vec<BackendKind> {
        self.only.iter().map(|&group| group.into()).collect()
    }

    /// Convert CLI arguments into a `VerifyConfig`.
    ///
    /// # Errors
    ///
    /// Returns an error if a config file is specified but cannot be loaded.
    pub fn to_config(&self) -> color_eyre::Result<VerifyConfig> {
        // Start with the given file, then the default location, then defaults
        let mut config = if let Some(ref path) = self.config {
            VerifyConfig::from_file(path)?
        } else {
            let path = default_config_path();
            if path.is_file() {
                VerifyConfig::from_file(&path)?
            } else {
                VerifyConfig::default()
            }
        };

        // Override with CLI arguments
        if let Some(tag) = &self.release_tag {
            config.release.tag.clone_from(tag);
        }
        if let Some(version) = &self.operator_version {
            config.release.operator_version = Some(version.clone());
        }
        if let Some(concurrency) = self.concurrency {
            config.runner.concurrency = concurrency;
        }
        if let Some(secs) = self.call_timeout_secs {
            config.runner.call_timeout_secs = secs;
        }
        if let Some(secs) = self.run_timeout_secs {
            config.runner.run_timeout_secs = secs;
        }

        Ok(config)
    }
}

impl From<CliGroup> for BackendKind {
    fn from(group: CliGroup) -> Self {
        match group {
            CliGroup::Images => BackendKind::Registry,
            CliGroup::Assets => BackendKind::ReleaseAsset,
            CliGroup::Packages => BackendKind::PackageMirror,
        }
    }
}
