//! Verification runner.
//!
//! Drives every planned check through the existence cache and the checker for
//! its backend, with bounded concurrency and a deadline for the whole run.
//!
//! ```text
//! planned check
//!      │  Pending
//!      ▼
//! ┌──────────────────────────┐
//! │ cache.get_or_compute(key)│  Checking
//! └────────────┬─────────────┘
//!              │ miss
//!              ▼
//! ┌──────────────────────────┐
//! │ checker for backend kind │
//! └────────────┬─────────────┘
//!              ▼
//!    Present / Absent / Errored
//! ```
//!
//! A failing check never stops the others: every planned check produces
//! exactly one result.

use crate::cache::{CacheStats, ExistenceCache};
use crate::checker::{
    CheckerSet, ErrorKind, GithubReleaseApi, HttpMirror, HttpRegistryTransport,
    PackageMirrorChecker, Probe, RegistryChecker, ReleaseAssetChecker,
};
use crate::config::{RunnerConfig, VerifyConfig};
use crate::error::Result;
use crate::event::{CheckState, VerifyEvent, VerifyEventsSender};
use crate::matrix::{build_matrix, PlannedCheck, VerificationMatrix};
use crate::report::{CheckResult, VerificationReport};
use chrono::Utc;
use futures::stream::{self, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Execution limits for a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunSettings {
    /// Maximum checks in flight.
    pub concurrency: usize,
    /// Timeout for each network call.
    pub call_timeout: Duration,
    /// Timeout for the whole run.
    pub run_timeout: Duration,
}

impl Default for RunSettings {
    fn default() -> Self {
        Self::from(&RunnerConfig::default())
    }
}

impl From<&RunnerConfig> for RunSettings {
    fn from(config: &RunnerConfig) -> Self {
        Self {
            concurrency: config.concurrency.max(1),
            call_timeout: Duration::from_secs(config.call_timeout_secs),
            run_timeout: Duration::from_secs(config.run_timeout_secs),
        }
    }
}

impl CheckerSet {
    /// Build the HTTP-backed checkers described by `config`.
    ///
    /// # Errors
    ///
    /// Returns an error if an HTTP client cannot be built.
    pub fn from_config(config: &VerifyConfig) -> Result<Self> {
        let call_timeout = RunSettings::from(&config.runner).call_timeout;
        let endpoints = config
            .images
            .endpoints
            .iter()
            .map(|(host, url)| (host.clone(), url.clone()))
            .collect();

        let token = std::env::var(&config.github.token_env)
            .ok()
            .filter(|t| !t.is_empty());
        if token.is_none() {
            debug!(
                "{} not set, using unauthenticated GitHub API access",
                config.github.token_env
            );
        }

        Ok(Self {
            registry: RegistryChecker::new(
                Arc::new(HttpRegistryTransport::new(endpoints, call_timeout)?),
                call_timeout,
            ),
            releases: ReleaseAssetChecker::new(
                Arc::new(GithubReleaseApi::new(&config.github.api_url, token, call_timeout)?),
                call_timeout,
            ),
            mirror: PackageMirrorChecker::new(
                Arc::new(HttpMirror::new(call_timeout)?),
                call_timeout,
            ),
        })
    }
}

/// Runs a verification matrix to completion.
pub struct Verifier {
    checkers: CheckerSet,
    cache: ExistenceCache,
    settings: RunSettings,
    events: Option<VerifyEventsSender>,
}

impl Verifier {
    /// Create a verifier with an empty cache.
    #[must_use]
    pub fn new(checkers: CheckerSet, settings: RunSettings) -> Self {
        Self {
            checkers,
            cache: ExistenceCache::new(),
            settings,
            events: None,
        }
    }

    /// Publish progress on `events`.
    #[must_use]
    pub fn with_events(mut self, events: VerifyEventsSender) -> Self {
        self.events = Some(events);
        self
    }

    /// Existence cache statistics.
    #[must_use]
    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// Checkers used by this verifier.
    #[must_use]
    pub fn checkers(&self) -> &CheckerSet {
        &self.checkers
    }

    fn emit(&self, event: VerifyEvent) {
        if let Some(events) = &self.events {
            // No subscribers is fine.
            let _ = events.send(event);
        }
    }

    fn emit_state(&self, index: usize, check: &PlannedCheck, state: CheckState) {
        self.emit(VerifyEvent::CheckStateChanged {
            index,
            label: check.label.clone(),
            state,
        });
    }

    /// Check every planned reference and build the report.
    pub async fn verify(&self, matrix: &VerificationMatrix) -> VerificationReport {
        let started_at = Utc::now();
        let deadline = Instant::now() + self.settings.run_timeout;
        let total = matrix.len();

        info!(
            "Verifying {} artifacts of release {} ({} distinct, concurrency {})",
            total,
            matrix.release_tag,
            matrix.distinct_keys(),
            self.settings.concurrency
        );
        self.emit(VerifyEvent::RunStarted { total });
        for (index, check) in matrix.checks().iter().enumerate() {
            self.emit_state(index, check, CheckState::Pending);
        }

        let results: Vec<CheckResult> = stream::iter(matrix.checks().iter().enumerate())
            .map(|(index, check)| self.check_one(index, check, deadline))
            .buffer_unordered(self.settings.concurrency)
            .collect()
            .await;

        let report =
            VerificationReport::from_results(matrix.release_tag.clone(), started_at, results);
        let stats = self.cache.stats();
        info!(
            "Verification finished: {} passed, {} missing, {} errored \
             ({} backend lookups, {:.1}% served from cache)",
            report.summary.passed,
            report.summary.failed,
            report.summary.errored,
            stats.computations,
            stats.saved_rate()
        );
        self.emit(VerifyEvent::RunFinished {
            passed: report.summary.passed,
            failed: report.summary.failed,
            errored: report.summary.errored,
        });
        report
    }

    async fn check_one(
        &self,
        index: usize,
        check: &PlannedCheck,
        deadline: Instant,
    ) -> CheckResult {
        let started = Instant::now();
        self.emit_state(index, check, CheckState::Checking);

        let probe = if started >= deadline {
            run_deadline_probe(self.settings.run_timeout)
        } else {
            let key = check.artifact.canonical_key();
            let lookup = self
                .cache
                .get_or_compute(key, || self.checkers.exists(&check.artifact));
            match tokio::time::timeout_at(deadline, lookup).await {
                Ok(probe) => probe,
                Err(_) => run_deadline_probe(self.settings.run_timeout),
            }
        };

        if !probe.outcome.is_present() {
            warn!(
                "{} [{}]: {}",
                check.label,
                probe.outcome,
                probe.detail.as_deref().unwrap_or("no detail")
            );
        }
        self.emit_state(index, check, CheckState::Done(probe.outcome));

        CheckResult {
            index,
            group: check.group.clone(),
            label: check.label.clone(),
            artifact: check.artifact.clone(),
            outcome: probe.outcome,
            detail: probe.detail,
            elapsed: started.elapsed(),
        }
    }
}

fn run_deadline_probe(run_timeout: Duration) -> Probe {
    Probe::errored(
        ErrorKind::Timeout,
        format!("run deadline of {}s reached before the check completed", run_timeout.as_secs()),
    )
}

/// Build the matrix for `config`, check it against the live backends, and report.
///
/// # Errors
///
/// Returns [`crate::Error::Config`] before any network I/O if the
/// configuration is invalid. Check failures never produce an error; they are
/// recorded in the report.
pub async fn run(config: &VerifyConfig) -> Result<VerificationReport> {
    let matrix = build_matrix(config)?;
    let checkers = CheckerSet::from_config(config)?;
    let verifier = Verifier::new(checkers, RunSettings::from(&config.runner));
    Ok(verifier.verify(&matrix).await)
}
