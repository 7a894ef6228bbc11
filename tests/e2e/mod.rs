//! End-to-end tests for release-verify.
//!
//! These tests drive the real HTTP transports against loopback mock servers
//! standing in for a container registry, the GitHub API and a package mirror.
//!
//! ## Running Tests
//!
//! ```bash
//! cargo test --test e2e
//! ```

#![allow(clippy::unwrap_used, clippy::expect_used)]

mod harness;
mod mirror_tests;
mod registry_tests;

pub use harness::{MockRequest, MockResponse, MockServer};
