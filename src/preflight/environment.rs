//! Host environment checks (privileges, helper scripts).

use std::os::unix::fs::PermissionsExt;
use std::path::Path;

use crate::config::{DEFAULT_HARDWARE_SETUP, DEFAULT_PASSWD_HELPER};
use crate::process::{Cmd, Runner};

use super::types::CheckResult;

/// Whether the effective user is root, asked through `id -u`.
pub fn is_root(runner: &mut dyn Runner) -> bool {
    runner
        .exec(&Cmd::new("id").arg("-u"))
        .map(|r| r.success() && r.stdout_trimmed() == "0")
        .unwrap_or(false)
}

pub fn check_environment(runner: &mut dyn Runner) -> Vec<CheckResult> {
    let mut results = Vec::new();

    if is_root(runner) {
        results.push(CheckResult::pass("Running as root"));
    } else {
        results.push(CheckResult::fail(
            "Running as root",
            "Mounting, chroot and VirtualBox registration need root. Re-run with sudo.",
        ));
    }

    results.push(check_helper(
        "Hardware setup script",
        Path::new(DEFAULT_HARDWARE_SETUP),
        "Set HARDWARE_SETUP to its location",
    ));
    results.push(check_helper(
        "Password helper",
        Path::new(DEFAULT_PASSWD_HELPER),
        "Set PASSWD_IN_IMAGE to its location",
    ));

    results
}

/// Helpers are only needed by one pipeline each, so a missing one warns.
fn check_helper(name: &str, path: &Path, hint: &str) -> CheckResult {
    match std::fs::metadata(path) {
        Ok(meta) if meta.permissions().mode() & 0o111 != 0 => {
            CheckResult::pass_with(name, &path.display().to_string())
        }
        Ok(_) => CheckResult::warn(name, &format!("{} is not executable", path.display())),
        Err(_) => CheckResult::warn(
            name,
            &format!("{} not found. {}", path.display(), hint),
        ),
    }
}
