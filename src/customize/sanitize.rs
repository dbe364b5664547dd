//! Strip build-host identity from the image.

use anyhow::{Context, Result};
use std::fs;
use std::path::Path;

/// Hostname the finished image answers to.
pub const HOSTNAME: &str = "freedombox";

/// Remove SSH host keys so every device generates its own on first boot.
///
/// Returns the number of files removed.
pub fn remove_ssh_host_keys(root: &Path) -> Result<usize> {
    let ssh_dir = root.join("etc/ssh");
    if !ssh_dir.is_dir() {
        return Ok(0);
    }

    let mut removed = 0;
    for entry in fs::read_dir(&ssh_dir)
        .with_context(|| format!("Failed to read {}", ssh_dir.display()))?
    {
        let entry = entry?;
        let name = entry.file_name();
        if name.to_string_lossy().starts_with("ssh_host_") {
            fs::remove_file(entry.path())
                .with_context(|| format!("Failed to remove {}", entry.path().display()))?;
            removed += 1;
        }
    }
    Ok(removed)
}

/// Rewrite hosts content: `127.0.0.1` maps only to `localhost`, and a
/// `127.0.1.1 <hostname>` entry is added when none exists.
pub fn normalize_hosts(content: &str, hostname: &str) -> String {
    let mut out = String::new();
    let mut has_loopback_host = false;

    for line in content.lines() {
        let address = line.split_whitespace().next();
        match address {
            Some("127.0.0.1") => out.push_str("127.0.0.1\tlocalhost"),
            Some("127.0.1.1") => {
                has_loopback_host = true;
                out.push_str(line);
            }
            _ => out.push_str(line),
        }
        out.push('\n');
    }

    if !has_loopback_host {
        out.push_str(&format!("127.0.1.1\t{}\n", hostname));
    }
    out
}

/// Normalize `/etc/hosts` inside the root.
pub fn sanitize_hosts(root: &Path, hostname: &str) -> Result<()> {
    let path = root.join("etc/hosts");
    let content = if path.exists() {
        fs::read_to_string(&path).with_context(|| format!("Failed to read {}", path.display()))?
    } else {
        String::new()
    };
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(&path, normalize_hosts(&content, hostname))
        .with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(())
}
