//! # release-verify
//!
//! Post-release verification: checks that every artifact a release promises
//! was actually published.
//!
//! - container images on every registry host, per architecture
//! - release assets on GitHub
//! - OS packages on the package mirror
//!
//! ## Pipeline
//!
//! ```text
//! VerifyConfig ──► build_matrix ──► VerificationMatrix
//!                                        │
//!                                        ▼
//!                     Verifier (ExistenceCache → CheckerSet)
//!                                        │
//!                                        ▼
//!                               VerificationReport
//! ```
//!
//! Every planned check yields exactly one result. A missing artifact
//! (`Absent`) is kept apart from a check that could not reach a verdict
//! (`Errored`), so an unreachable registry is never reported as an
//! unpublished image.
//!
//! ## Example
//!
//! ```rust,ignore
//! use release_verify::{run, VerifyConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = VerifyConfig::from_file("release.toml".as_ref())?;
//!     let report = run(&config).await?;
//!     println!("{report}");
//!     std::process::exit(report.exit_code());
//! }
//! ```

pub mod artifact;
pub mod cache;
pub mod checker;
pub mod config;
pub mod error;
pub mod event;
pub mod matrix;
pub mod report;
pub mod runner;

pub use artifact::{ArtifactRef, BackendKind, CanonicalKey};
pub use cache::{CacheStats, CoalescingCache, ExistenceCache};
pub use checker::{CheckerSet, Outcome, Probe};
pub use config::VerifyConfig;
pub use error::{Error, Result};
pub use matrix::{build_matrix, VerificationMatrix};
pub use report::{CheckResult, Summary, VerificationReport};
pub use runner::{run, RunSettings, Verifier};
