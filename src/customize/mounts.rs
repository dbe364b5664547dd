//! Pseudo-filesystem bind mounts scoped to the customization run.

use anyhow::{Context, Result};
use std::path::Path;

use crate::process::{run, run_best_effort, Cmd, Runner};

/// Host pseudo-filesystems bound into the target root, in mount order.
pub const PSEUDO_FILESYSTEMS: [&str; 5] = ["dev", "dev/pts", "proc", "run", "sys"];

/// Bind-mount the pseudo-filesystems, run `body`, then unmount.
///
/// Unmounting happens exactly once on every exit path, including a failed
/// mount halfway through the list. `extra_unmounts` (paths relative to the
/// root, e.g. a firmware partition mounted before this scope opened) are
/// released first. All unmounts are best effort: a filesystem that is
/// already detached is not an error.
pub fn with_pseudo_filesystems<T>(
    runner: &mut dyn Runner,
    root: &Path,
    extra_unmounts: &[&str],
    body: impl FnOnce(&mut dyn Runner) -> Result<T>,
) -> Result<T> {
    let mut mounted: Vec<&'static str> = Vec::new();

    let result = match mount_all(runner, root, &mut mounted) {
        Ok(()) => body(&mut *runner),
        Err(e) => Err(e),
    };

    for target in extra_unmounts {
        run_best_effort(runner, Cmd::new("umount").arg_path(&root.join(target)));
    }
    for fs in mounted.iter().rev() {
        run_best_effort(runner, Cmd::new("umount").arg_path(&root.join(fs)));
    }

    result
}

fn mount_all(runner: &mut dyn Runner, root: &Path, mounted: &mut Vec<&'static str>) -> Result<()> {
    for fs in PSEUDO_FILESYSTEMS {
        let source = Path::new("/").join(fs);
        let target = root.join(fs);
        run(
            runner,
            Cmd::new("mount")
                .arg("--bind")
                .arg_path(&source)
                .arg_path(&target),
        )
        .with_context(|| format!("Failed to bind-mount /{} into {}", fs, root.display()))?;
        mounted.push(fs);
    }
    Ok(())
}
