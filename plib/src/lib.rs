//! Shared support code for the posixutils command-line binaries: a project
//! name constant used when registering the gettext domain, and an
//! integration test harness that drives a compiled binary as a subprocess.

pub mod testing;

pub use testing::{run_test, run_test_with_checker, TestPlan};

/// Passed to `textdomain` by each binary's `main` so translated messages are
/// looked up under a single, consistent domain name.
pub const PROJECT_NAME: &str = "posixutils-sed";
