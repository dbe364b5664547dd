//! Service start suppression during package installation.
//!
//! `invoke-rc.d` consults `/usr/sbin/policy-rc.d` before starting a service;
//! exit status 101 means "action forbidden". While the script is in place
//! package maintainer scripts cannot launch daemons inside the build chroot.

use anyhow::{Context, Result};
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;

/// Policy script location, relative to the root.
pub const POLICY_RC_D: &str = "usr/sbin/policy-rc.d";

pub const POLICY_SCRIPT: &str = "#!/bin/sh\nexit 101\n";

/// Run `body` with service starts forbidden inside `root`.
///
/// The policy script is removed afterwards whether `body` succeeded or not.
pub fn with_service_start_suppressed<T>(root: &Path, body: impl FnOnce() -> Result<T>) -> Result<T> {
    let path = root.join(POLICY_RC_D);
    install_policy(&path)?;

    let result = body();

    let removed = fs::remove_file(&path)
        .with_context(|| format!("Failed to remove {}", path.display()));
    match (result, removed) {
        (Ok(value), Ok(())) => Ok(value),
        (Ok(_), Err(e)) => Err(e),
        (Err(e), Ok(())) => Err(e),
        (Err(e), Err(cleanup)) => {
            eprintln!("  [WARN] {:#}", cleanup);
            Err(e)
        }
    }
}

fn install_policy(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, POLICY_SCRIPT)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    fs::set_permissions(path, fs::Permissions::from_mode(0o755))
        .with_context(|| format!("Failed to make {} executable", path.display()))?;
    Ok(())
}
