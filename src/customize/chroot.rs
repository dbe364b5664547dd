//! Commands executed inside the image's root filesystem.

use anyhow::{bail, Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

use crate::process::{run_best_effort, Cmd, Runner};

/// Environment pinned for every command run inside the chroot.
pub const CHROOT_ENV: [(&str, &str); 3] = [
    ("LC_ALL", "C"),
    ("TMPDIR", "/tmp"),
    ("DEBIAN_FRONTEND", "noninteractive"),
];

/// DHCP interface stanza left behind by the bootstrapper. It fights with
/// network-manager in the finished image.
pub const BOOTSTRAP_NETWORK_CONFIG: &str = "etc/network/interfaces.d/setup";

/// Builds commands that run with their root reassigned to the image.
#[derive(Debug, Clone, Copy)]
pub struct Chroot<'a> {
    root: &'a Path,
}

impl<'a> Chroot<'a> {
    pub fn new(root: &'a Path) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &'a Path {
        self.root
    }

    /// `chroot <root> <program> <args..>` with the pinned environment.
    pub fn cmd<I, S>(&self, program: &str, args: I) -> Cmd
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut cmd = Cmd::new("chroot").arg_path(self.root).arg(program).args(args);
        for (key, value) in CHROOT_ENV {
            cmd = cmd.env(key, value);
        }
        cmd
    }

    /// Host path of an absolute path inside the chroot.
    pub fn host_path(&self, inner: &str) -> PathBuf {
        self.root.join(inner.trim_start_matches('/'))
    }
}

/// Drop the bootstrapper's DHCP configuration if present.
pub fn remove_bootstrap_network_config(root: &Path) -> Result<()> {
    let path = root.join(BOOTSTRAP_NETWORK_CONFIG);
    if path.exists() {
        fs::remove_file(&path)
            .with_context(|| format!("Failed to remove {}", path.display()))?;
        println!("  Removed {}", BOOTSTRAP_NETWORK_CONFIG);
    }
    Ok(())
}

/// Fail unless `root` is itself a mount point.
///
/// `fuser -m` acts on the whole filesystem holding `root`; on a plain
/// directory that is the host's own filesystem.
pub fn require_mount_point(runner: &mut dyn Runner, root: &Path) -> Result<()> {
    let result = runner.exec(&Cmd::new("mountpoint").arg("-q").arg_path(root))?;
    if !result.success() {
        bail!(
            "{} is not a mount point. Mount the image's root filesystem there first.",
            root.display()
        );
    }
    Ok(())
}

/// Kill anything still holding files open under the root.
///
/// Lingering daemons keep the filesystem busy and make unmounting fail.
/// Only call this after [`require_mount_point`] has passed for `root`.
pub fn kill_chroot_processes(runner: &mut dyn Runner, root: &Path) {
    run_best_effort(runner, Cmd::new("fuser").args(["-k", "-m"]).arg_path(root));
}
