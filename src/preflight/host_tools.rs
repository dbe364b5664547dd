//! Host tool availability checks.

use crate::process;

use super::types::CheckResult;

/// Tools the image customizer shells out to: (tool, package, purpose).
pub const CUSTOMIZE_TOOLS: [(&str, &str, &str); 12] = [
    ("chroot", "coreutils", "Required to run commands inside the image"),
    ("dd", "coreutils", "Required to embed bootloaders"),
    ("tar", "tar", "Required to archive package sources"),
    ("curl", "curl", "Required to download pinned firmware"),
    ("fuser", "psmisc", "Required to stop processes left in the chroot"),
    ("findmnt", "util-linux", "Required to locate the image partitions"),
    ("mountpoint", "util-linux", "Required to confirm the root is a mounted image"),
    ("blkid", "util-linux", "Required to read the firmware partition UUID"),
    ("sfdisk", "fdisk", "Required to reorder partitions"),
    ("parted", "parted", "Required to add the firmware partition"),
    ("kpartx", "kpartx", "Required to refresh partition mappings"),
    ("mkfs.vfat", "dosfstools", "Required to format the firmware partition"),
];

/// Tools the Vagrant packager needs. Missing ones only warn here; the
/// `vagrant-package` command refuses to start without them.
pub const PACKAGE_TOOLS: [(&str, &str, &str); 4] = [
    ("VBoxManage", "virtualbox", "Required for `vagrant-package`"),
    ("vagrant", "vagrant", "Required for `vagrant-package`"),
    ("sshpass", "sshpass", "Required to log into the packaging VM"),
    ("ssh", "openssh-client", "Required to log into the packaging VM"),
];

/// Check host tools are installed.
pub fn check_host_tools() -> Vec<CheckResult> {
    let mut results = Vec::new();

    for (tool, package, purpose) in CUSTOMIZE_TOOLS {
        results.push(check_tool_exists(tool, package, purpose, true));
    }

    for (tool, package, purpose) in PACKAGE_TOOLS {
        results.push(check_tool_exists(tool, package, purpose, false));
    }

    results
}

/// Check if a tool exists in PATH.
fn check_tool_exists(tool: &str, package: &str, purpose: &str, required: bool) -> CheckResult {
    match process::which(tool) {
        Some(path) => CheckResult::pass_with(tool, &path),
        None => {
            let msg = format!("Not found. Install '{}' package. {}", package, purpose);
            if required {
                CheckResult::fail(tool, &msg)
            } else {
                CheckResult::warn(tool, &msg)
            }
        }
    }
}
