//! Package sources and package installation inside the chroot.

use anyhow::{Context, Result};
use std::fs;
use std::path::Path;

use super::chroot::Chroot;
use crate::process::{run, Runner};

/// Debian security archive.
pub const SECURITY_MIRROR: &str = "http://security.debian.org/";

/// Path of the source list, relative to the root.
pub const SOURCES_LIST: &str = "etc/apt/sources.list";

/// Default packages installed when no custom build is supplied.
pub const SETUP_PACKAGE: &str = "freedombox-setup";
pub const PLINTH_PACKAGE: &str = "plinth";

/// Component set for the source list.
pub fn components(enable_nonfree: bool) -> &'static str {
    if enable_nonfree {
        "main contrib non-free"
    } else {
        "main"
    }
}

/// Rolling suites get no security or updates archives.
pub fn is_rolling(suite: &str) -> bool {
    matches!(suite, "unstable" | "sid")
}

/// Render `sources.list` for a mirror and suite.
pub fn render_sources_list(mirror: &str, suite: &str, enable_nonfree: bool) -> String {
    let components = components(enable_nonfree);
    let mut archives = vec![(mirror.to_string(), suite.to_string())];
    if !is_rolling(suite) {
        archives.push((SECURITY_MIRROR.to_string(), format!("{}/updates", suite)));
        archives.push((mirror.to_string(), format!("{}-updates", suite)));
    }

    let mut out = String::new();
    for (uri, dist) in archives {
        for kind in ["deb", "deb-src"] {
            out.push_str(&format!("{} {} {} {}\n", kind, uri, dist, components));
        }
    }
    out
}

/// Write the source list into the root.
pub fn write_sources_list(root: &Path, mirror: &str, suite: &str, enable_nonfree: bool) -> Result<()> {
    let path = root.join(SOURCES_LIST);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(&path, render_sources_list(mirror, suite, enable_nonfree))
        .with_context(|| format!("Failed to write {}", path.display()))?;
    println!("  Sources: {} {} ({})", mirror, suite, components(enable_nonfree));
    Ok(())
}

/// Refresh the package index.
pub fn update(runner: &mut dyn Runner, chroot: &Chroot) -> Result<()> {
    run(runner, chroot.cmd("apt-get", ["update"]))?;
    Ok(())
}

/// Install packages by name or by path inside the chroot.
pub fn install(runner: &mut dyn Runner, chroot: &Chroot, packages: &[&str]) -> Result<()> {
    run(
        runner,
        chroot.cmd("apt-get", ["install", "-y"]).args(packages),
    )?;
    Ok(())
}

/// Install a local `.deb` built outside the image.
///
/// The package is copied into the chroot's `/tmp` and installed by path so
/// that its dependencies come from the configured sources.
pub fn install_local(runner: &mut dyn Runner, chroot: &Chroot, package: &Path) -> Result<()> {
    let file_name = package
        .file_name()
        .with_context(|| format!("{} is not a package file", package.display()))?
        .to_string_lossy()
        .into_owned();
    let inner = format!("/tmp/{}", file_name);
    let host_copy = chroot.host_path(&inner);

    if let Some(parent) = host_copy.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::copy(package, &host_copy).with_context(|| {
        format!("Failed to copy {} into the image", package.display())
    })?;

    let installed = install(runner, chroot, &[inner.as_str()]);
    let _ = fs::remove_file(&host_copy);
    installed
}

/// Install either the custom build or the archive package.
pub fn install_package(
    runner: &mut dyn Runner,
    chroot: &Chroot,
    custom: Option<&Path>,
    default: &str,
) -> Result<()> {
    match custom {
        Some(path) => {
            println!("  Installing custom {} from {}", default, path.display());
            install_local(runner, chroot, path)
        }
        None => {
            println!("  Installing {}", default);
            install(runner, chroot, &[default])
        }
    }
}
