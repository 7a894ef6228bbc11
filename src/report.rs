//! Verification report.
//!
//! Built once from every check result at the end of a run and never mutated
//! afterwards. Results are ordered by their position in the matrix, so the
//! report is identical across runs regardless of completion order.

use crate::artifact::ArtifactRef;
use crate::checker::{ErrorKind, Outcome};
use crate::error::{Error, Result};
use crate::matrix::CheckGroup;
use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};
use std::fmt;
use std::time::Duration;

fn serialize_millis<S: Serializer>(
    elapsed: &Duration,
    serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
    #[allow(clippy::cast_possible_truncation)]
    let millis = elapsed.as_millis() as u64;
    serializer.serialize_u64(millis)
}

/// Recorded result of one planned check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckResult {
    /// Position of the check in the matrix.
    pub index: usize,
    /// Reporting group.
    pub group: CheckGroup,
    /// Human-readable label.
    pub label: String,
    /// What was checked.
    pub artifact: ArtifactRef,
    /// Verdict.
    pub outcome: Outcome,
    /// Diagnostic detail.
    pub detail: Option<String>,
    /// Time spent on the check, including waiting on coalesced lookups.
    #[serde(rename = "elapsed_ms", serialize_with = "serialize_millis")]
    pub elapsed: Duration,
}

impl CheckResult {
    /// Failure description, or `None` when the artifact is present.
    #[must_use]
    pub fn failure_line(&self) -> Option<String> {
        let detail = self
            .detail
            .as_deref()
            .map(|d| format!(": {d}"))
            .unwrap_or_default();
        match self.outcome {
            Outcome::Present => None,
            Outcome::Absent => Some(format!("{}{detail}", self.artifact.missing_description())),
            Outcome::Errored(ErrorKind::Timeout) => {
                Some(format!("timed out verifying {}{detail}", self.artifact))
            }
            Outcome::Errored(kind) => {
                Some(format!("could not verify {} ({kind}){detail}", self.artifact))
            }
        }
    }
}

/// Summary counts by outcome.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Summary {
    /// Number of checks.
    pub total: usize,
    /// Artifacts found.
    pub passed: usize,
    /// Artifacts definitively missing.
    pub failed: usize,
    /// Checks that could not determine existence.
    pub errored: usize,
}

impl Summary {
    fn tally(results: &[CheckResult]) -> Self {
        results.iter().fold(
            Self {
                total: results.len(),
                ..Self::default()
            },
            |mut summary, result| {
                match result.outcome {
                    Outcome::Present => summary.passed += 1,
                    Outcome::Absent => summary.failed += 1,
                    Outcome::Errored(_) => summary.errored += 1,
                }
                summary
            },
        )
    }
}

/// Pass/fail report of one verification run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VerificationReport {
    /// Release tag verified.
    pub release_tag: String,
    /// When the run started.
    pub started_at: DateTime<Utc>,
    /// Counts by outcome.
    pub summary: Summary,
    /// Failure descriptions in declaration order.
    pub failures: Vec<String>,
    /// Every result, in declaration order.
    pub results: Vec<CheckResult>,
}

impl VerificationReport {
    /// Build the report from results in any order.
    #[must_use]
    pub fn from_results(
        release_tag: impl Into<String>,
        started_at: DateTime<Utc>,
        mut results: Vec<CheckResult>,
    ) -> Self {
        results.sort_by_key(|r| r.index);
        let failures = results.iter().filter_map(CheckResult::failure_line).collect();
        Self {
            release_tag: release_tag.into(),
            started_at,
            summary: Summary::tally(&results),
            failures,
            results,
        }
    }

    /// Returns true if every artifact was found.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.summary.passed == self.summary.total
    }

    /// Process exit status for this report.
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        i32::from(!self.is_success())
    }

    /// Serialize the report as pretty-printed JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| Error::Serialization(e.to_string()))
    }
}

impl fmt::Display for VerificationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Release {} verification (started {})",
            self.release_tag,
            self.started_at.format("%Y-%m-%d %H:%M:%S UTC")
        )?;

        let mut current: Option<&CheckGroup> = None;
        for result in &self.results {
            if current != Some(&result.group) {
                writeln!(f)?;
                writeln!(f, "{}", result.group)?;
                current = Some(&result.group);
            }
            let marker = match result.outcome {
                Outcome::Present => "PASS",
                Outcome::Absent => "MISS",
                Outcome::Errored(_) => "ERR ",
            };
            write!(f, "  [{marker}] {}", result.label)?;
            match (&result.outcome, &result.detail) {
                (Outcome::Present, _) | (_, None) => writeln!(f)?,
                (_, Some(detail)) => writeln!(f, " ({detail})")?,
            }
        }

        let s = &self.summary;
        writeln!(f)?;
        writeln!(
            f,
            "Summary: {} total, {} passed, {} missing, {} errored",
            s.total, s.passed, s.failed, s.errored
        )?;

        if !self.failures.is_empty() {
            writeln!(f)?;
            writeln!(f, "Failures:")?;
            for line in &self.failures {
                writeln!(f, "  - {line}")?;
            }
        }
        Ok(())
    }
}
