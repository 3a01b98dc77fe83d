//! Child-process harness
//!
//! Aborting paths and main-loop tests cannot share the libtest process, so
//! such a test re-runs the test binary filtered to itself with
//! `EVL_TEST_CHILD` set, and the parent inspects the exit status.

use std::os::unix::process::ExitStatusExt;
use std::process::{Command, Output};

const CHILD_ENV: &str = "EVL_TEST_CHILD";

/// Running as the re-executed child
pub(crate) fn in_child() -> bool {
    std::env::var_os(CHILD_ENV).is_some()
}

/// libtest name of `test` in `module` (`module_path!()` minus the crate)
pub(crate) fn test_path(module: &str, test: &str) -> String {
    match module.split_once("::") {
        Some((_, rest)) => format!("{}::{}", rest, test),
        None => test.to_string(),
    }
}

pub(crate) fn run_in_child(test: &str) -> Output {
    let exe = std::env::current_exe().expect("test binary path");
    Command::new(exe)
        .args([test, "--exact", "--nocapture", "--test-threads=1"])
        .env(CHILD_ENV, "1")
        .output()
        .expect("spawn child test")
}

pub(crate) fn assert_aborted(out: &Output, message: &str) {
    let stderr = String::from_utf8_lossy(&out.stderr);
    assert_eq!(out.status.signal(), Some(libc::SIGABRT), "stderr: {}", stderr);
    assert!(stderr.contains("[BUG]"), "stderr: {}", stderr);
    assert!(stderr.contains(message), "stderr: {}", stderr);
}

pub(crate) fn assert_exited_ok(out: &Output) {
    let stdout = String::from_utf8_lossy(&out.stdout);
    assert!(
        out.status.success(),
        "stdout: {}\nstderr: {}",
        stdout,
        String::from_utf8_lossy(&out.stderr)
    );
    // Guard against a filter that matched nothing
    assert!(stdout.contains("1 passed"), "stdout: {}", stdout);
}
