//! Preflight checks for fbxmaker.
//!
//! Validates host tools and privileges before touching an image.
//! Run with `fbxmaker preflight` to check everything is ready.

mod environment;
mod host_tools;
mod types;

use std::fmt;

use anyhow::{bail, Result};

use crate::process::{self, Runner};

pub use environment::is_root;
pub use host_tools::{CUSTOMIZE_TOOLS, PACKAGE_TOOLS};
pub use types::{CheckResult, CheckStatus, PreflightReport};

/// Run all preflight checks.
pub fn run_preflight(runner: &mut dyn Runner) -> PreflightReport {
    let mut checks = Vec::new();

    println!("Running preflight checks...\n");

    println!("Checking host tools...");
    checks.extend(host_tools::check_host_tools());

    println!("Checking host environment...");
    checks.extend(environment::check_environment(runner));

    println!();

    PreflightReport { checks }
}

/// Run preflight and bail if any checks fail.
///
/// With `strict`, warnings count as failures too.
pub fn run_preflight_or_fail(runner: &mut dyn Runner, strict: bool) -> Result<()> {
    let report = run_preflight(runner);
    report.print();

    if !report.all_passed() {
        bail!(
            "Preflight failed: {} check(s) failed. Fix the issues above before building.",
            report.fail_count()
        );
    }
    if strict && report.warn_count() > 0 {
        bail!(
            "Preflight failed in strict mode: {} warning(s).",
            report.warn_count()
        );
    }

    println!("All preflight checks passed!\n");
    Ok(())
}

/// The packager refused to start. The CLI maps this to exit status -1.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreconditionFailed {
    pub reason: String,
}

impl fmt::Display for PreconditionFailed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Precondition failed: {}", self.reason)
    }
}

impl std::error::Error for PreconditionFailed {}

/// Root and the VirtualBox/Vagrant tools must be present before any VM is created.
pub fn packaging_preconditions(
    is_root: bool,
    has_tool: impl Fn(&str) -> bool,
) -> std::result::Result<(), PreconditionFailed> {
    if !is_root {
        return Err(PreconditionFailed {
            reason: "vagrant-package must be run as root".to_string(),
        });
    }
    for tool in ["VBoxManage", "vagrant"] {
        if !has_tool(tool) {
            return Err(PreconditionFailed {
                reason: format!("'{}' not found in PATH", tool),
            });
        }
    }
    Ok(())
}

/// Check packaging preconditions against the real host.
pub fn require_packaging_preconditions(runner: &mut dyn Runner) -> Result<()> {
    packaging_preconditions(is_root(runner), process::exists)?;
    Ok(())
}
