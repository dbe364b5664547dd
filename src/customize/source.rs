//! Source package archival for license compliance.

use anyhow::{bail, Context, Result};
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use super::chroot::Chroot;
use crate::process::{run, Cmd, Runner};

/// Source package directory inside the image.
pub const SOURCE_DIR: &str = "/usr/src/packages";

const ARCHIVE_SUFFIX: &str = ".source.tar.gz";

/// Archive path for an image: `foo.img.temp` becomes
/// `foo.img.source.tar.gz`, anything else gets the suffix appended.
pub fn archive_path(image: &Path) -> PathBuf {
    let name = image
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let stem = name.strip_suffix(".temp").unwrap_or(&name);
    image.with_file_name(format!("{}{}", stem, ARCHIVE_SUFFIX))
}

/// Source package names from `dpkg-query -W -f '${source:Package}\n'`.
pub fn parse_source_packages(output: &str) -> Vec<String> {
    output
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(str::to_string)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Download sources for every installed package and archive them next to
/// the image. Returns the archive path.
pub fn archive_sources(
    runner: &mut dyn Runner,
    chroot: &Chroot,
    image: &Path,
    keep_in_image: bool,
) -> Result<PathBuf> {
    let source_dir = chroot.host_path(SOURCE_DIR);
    fs::create_dir_all(&source_dir)
        .with_context(|| format!("Failed to create {}", source_dir.display()))?;

    let listing = run(
        runner,
        chroot.cmd("dpkg-query", ["-W", "-f", "${source:Package}\\n"]),
    )?;
    let packages = parse_source_packages(&listing.stdout);
    if packages.is_empty() {
        bail!("dpkg-query listed no installed packages");
    }
    println!("  Fetching sources for {} packages", packages.len());

    // Package names travel as positional parameters, never spliced into the
    // script text.
    let script = format!("cd {} && exec apt-get source --download-only \"$@\"", SOURCE_DIR);
    run(
        runner,
        chroot
            .cmd("sh", ["-c", script.as_str(), "sh"])
            .args(&packages),
    )?;

    let archive = archive_path(image);
    let parent = source_dir
        .parent()
        .context("Source directory has no parent")?;
    let dir_name = source_dir
        .file_name()
        .context("Source directory has no name")?
        .to_string_lossy()
        .into_owned();
    run(
        runner,
        Cmd::new("tar")
            .arg("-C")
            .arg_path(parent)
            .arg("-czf")
            .arg_path(&archive)
            .arg(&dir_name),
    )?;
    println!(
        "  Archived {} MB of sources to {}",
        dir_size(&source_dir) / 1024 / 1024,
        archive.display()
    );

    if !keep_in_image {
        fs::remove_dir_all(&source_dir)
            .with_context(|| format!("Failed to remove {}", source_dir.display()))?;
    }

    Ok(archive)
}

fn dir_size(path: &Path) -> u64 {
    WalkDir::new(path)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter_map(|e| e.metadata().ok())
        .map(|m| m.len())
        .sum()
}
