//! A small process-spawning test harness shared by the workspace's
//! integration tests.
//!
//! Each `tests/` binary builds a [`TestPlan`] describing a command line, the
//! bytes to feed on stdin, and the stdout/stderr/exit code it expects, then
//! hands it to [`run_test`]. `cmd` is resolved as a sibling of the test
//! harness's own executable (`target/<profile>/<cmd>`), so no extra
//! dependency on a process-assertion crate is needed.

use std::io::Write;
use std::path::PathBuf;
use std::process::{Command, Stdio};

/// A single subprocess invocation and the output it is expected to produce.
#[derive(Debug, Clone, Default)]
pub struct TestPlan {
    /// Name of the binary to run, e.g. `"sed"`.
    pub cmd: String,
    /// Command-line arguments, in order.
    pub args: Vec<String>,
    /// Bytes written to the child's stdin before closing it.
    pub stdin_data: String,
    /// Expected stdout, compared exactly.
    pub expected_out: String,
    /// Expected stderr, compared exactly.
    pub expected_err: String,
    /// Expected process exit code.
    pub expected_exit_code: i32,
}

/// Finds the compiled binary named `cmd` next to the current test
/// executable, walking up from `target/<profile>/deps/test-harness` to
/// `target/<profile>/<cmd>`.
fn resolve_bin_path(cmd: &str) -> PathBuf {
    let mut path = std::env::current_exe().expect("failed to resolve current test executable");
    path.pop(); // drop the test harness binary's own file name
    if path.ends_with("deps") {
        path.pop();
    }
    path.push(cmd);
    if cfg!(windows) {
        path.set_extension("exe");
    }
    path
}

/// Runs `plan`, asserting stdout, stderr, and exit code all match exactly.
pub fn run_test(plan: TestPlan) {
    run_test_with_checker(plan, |plan, output| {
        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        assert_eq!(stdout, plan.expected_out, "stdout mismatch for {:?}", plan.cmd);
        assert_eq!(stderr, plan.expected_err, "stderr mismatch for {:?}", plan.cmd);
        assert_eq!(
            output.status.code(),
            Some(plan.expected_exit_code),
            "exit code mismatch for {:?}",
            plan.cmd
        );
    });
}

/// Runs `plan` and hands the raw [`std::process::Output`] to `checker`
/// instead of applying the default exact-match comparison. Useful when a
/// test needs to check output structurally (e.g. line count, substring)
/// rather than byte-for-byte.
pub fn run_test_with_checker<F>(plan: TestPlan, checker: F)
where
    F: FnOnce(&TestPlan, std::process::Output),
{
    let bin_path = resolve_bin_path(&plan.cmd);
    let mut child = Command::new(&bin_path)
        .args(&plan.args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .unwrap_or_else(|e| panic!("failed to spawn {:?}: {e}", bin_path));

    child
        .stdin
        .take()
        .expect("child stdin was not piped")
        .write_all(plan.stdin_data.as_bytes())
        .expect("failed to write stdin to child process");

    let output = child
        .wait_with_output()
        .expect("failed to wait on child process");

    checker(&plan, output);
}
