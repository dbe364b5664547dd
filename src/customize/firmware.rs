//! Pinned hardware firmware download and installation.
//!
//! The package is fetched on the host, checked against the SHA-256 digest
//! pinned in the configuration and only then handed to dpkg inside the
//! chroot.

use anyhow::{bail, Context, Result};
use sha2::{Digest, Sha256};
use std::fmt;
use std::fs;
use std::io::Read;
use std::path::Path;

use super::chroot::{kill_chroot_processes, Chroot};
use crate::process::{run, Cmd, Runner};

/// Default download: Atheros AR9271 (ath9k_htc) USB Wi-Fi firmware.
///
/// There is no compiled-in digest; `FIRMWARE_SHA256` must name the digest of
/// whatever `FIRMWARE_URL` points at.
pub const FIRMWARE_URL: &str = "https://deb.debian.org/debian/pool/main/o/open-ath9k-htc-firmware/firmware-ath9k-htc_1.4.0-97-g75b3e59+dfsg-2_all.deb";

/// A download that must match a known digest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FirmwarePin {
    pub url: String,
    /// File name of the download inside the chroot's `/tmp`.
    pub file_name: String,
    /// Lowercase hex SHA-256.
    pub sha256: String,
}

impl FirmwarePin {
    /// Pin `url` to `sha256`. The file name is the last URL path segment.
    pub fn new(url: &str, sha256: &str) -> Result<Self> {
        let sha256 = sha256.trim().to_ascii_lowercase();
        if sha256.len() != 64 || !sha256.chars().all(|c| c.is_ascii_hexdigit()) {
            bail!(
                "FIRMWARE_SHA256 must be 64 hex characters, got '{}'",
                sha256
            );
        }

        // scheme://host/.../<file>
        let file_name = url
            .split_once("://")
            .and_then(|(_, rest)| rest.split_once('/'))
            .and_then(|(_, path)| path.rsplit('/').next())
            .filter(|name| !name.is_empty())
            .with_context(|| format!("FIRMWARE_URL '{}' does not name a file", url))?;

        Ok(Self {
            url: url.to_string(),
            file_name: file_name.to_string(),
            sha256,
        })
    }
}

/// Downloaded content does not match its pinned digest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IntegrityError {
    pub file: String,
    pub expected: String,
    pub actual: String,
}

impl fmt::Display for IntegrityError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Checksum mismatch for {}!\n  Expected: {}\n  Got: {}\n\
             The download may be corrupted or tampered with. Deleted the file.",
            self.file, self.expected, self.actual
        )
    }
}

impl std::error::Error for IntegrityError {}

/// Compute the SHA-256 of a file as lowercase hex.
pub fn sha256_file(path: &Path) -> Result<String> {
    let mut file = fs::File::open(path)
        .with_context(|| format!("Failed to open {} for hashing", path.display()))?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 64 * 1024];
    loop {
        let n = file
            .read(&mut buf)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(format!("{:x}", hasher.finalize()))
}

/// Download, verify and install the pinned firmware package.
///
/// On a digest mismatch nothing is installed: lingering chroot processes
/// are killed, the download is deleted and an [`IntegrityError`] is returned.
pub fn install_firmware(runner: &mut dyn Runner, chroot: &Chroot, pin: &FirmwarePin) -> Result<()> {
    let inner = format!("/tmp/{}", pin.file_name);
    let download = chroot.host_path(&inner);
    if let Some(parent) = download.parent() {
        fs::create_dir_all(parent)?;
    }

    println!("  Downloading {}", pin.url);
    run(
        runner,
        Cmd::new("curl")
            .args(["-L", "-f", "-s", "-S", "-o"])
            .arg_path(&download)
            .arg(&pin.url),
    )
    .context("Firmware download failed")?;

    let actual = sha256_file(&download)?;
    if !actual.eq_ignore_ascii_case(&pin.sha256) {
        kill_chroot_processes(runner, chroot.root());
        let _ = fs::remove_file(&download);
        return Err(IntegrityError {
            file: pin.file_name.clone(),
            expected: pin.sha256.clone(),
            actual,
        }
        .into());
    }
    println!("  [OK] Checksum verified");

    run(runner, chroot.cmd("dpkg", ["-i", inner.as_str()]))?;
    let _ = fs::remove_file(&download);
    Ok(())
}
