//! Preflight command - runs preflight checks.

use anyhow::Result;

use crate::preflight;
use crate::process::HostRunner;

/// Execute the preflight command.
pub fn cmd_preflight(strict: bool) -> Result<()> {
    let mut runner = HostRunner;
    if strict {
        preflight::run_preflight_or_fail(&mut runner, true)?;
    } else {
        let report = preflight::run_preflight(&mut runner);
        report.print();
        if !report.all_passed() {
            println!("Some checks failed. Use --strict to fail on them.");
        }
    }
    Ok(())
}
