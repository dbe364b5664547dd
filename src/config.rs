//! Configuration management for fbxmaker.
//!
//! Image customization is configured entirely through environment
//! variables. A `.env` file in the working directory is loaded first by the
//! binary; variables already set in the environment take precedence.

use anyhow::{Context, Result};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::customize::firmware::{FirmwarePin, FIRMWARE_URL};
use crate::machine::Machine;

/// Default Debian mirror for both build time and the final image.
pub const DEFAULT_MIRROR: &str = "http://deb.debian.org/debian";

/// Default distribution suite.
pub const DEFAULT_SUITE: &str = "unstable";

/// Default location of the hardware setup script.
pub const DEFAULT_HARDWARE_SETUP: &str = "bin/hardware-setup";

/// Default location of the password helper used before booting the VM.
pub const DEFAULT_PASSWD_HELPER: &str = "bin/passwd-in-image";

/// Default Vagrant box output path.
pub const DEFAULT_BOX_OUTPUT: &str = "package.box";

/// Settings for one image customization run.
#[derive(Debug, Clone)]
pub struct CustomizeConfig {
    /// Mounted root filesystem of the image.
    pub root: PathBuf,
    /// Raw image file backing `root`.
    pub image: PathBuf,
    pub machine: Machine,
    pub suite: String,
    /// Mirror written into the final image.
    pub mirror: String,
    /// Mirror used while building.
    pub build_mirror: String,
    /// Add `contrib` and `non-free` components.
    pub enable_nonfree: bool,
    pub custom_plinth: Option<PathBuf>,
    pub custom_setup: Option<PathBuf>,
    /// Archive source packages next to the image.
    pub source: bool,
    /// Keep downloaded source packages inside the image.
    pub source_in_image: bool,
    pub hardware_setup: PathBuf,
    pub firmware: FirmwarePin,
}

impl CustomizeConfig {
    /// Load configuration from the process environment.
    pub fn load(root: &Path, image: &Path) -> Result<Self> {
        let vars: HashMap<String, String> = std::env::vars().collect();
        Self::from_vars(root, image, &vars)
    }

    /// Build configuration from an explicit variable map.
    pub fn from_vars(root: &Path, image: &Path, vars: &HashMap<String, String>) -> Result<Self> {
        let get = |key: &str| vars.get(key).map(|v| v.trim()).filter(|v| !v.is_empty());

        let machine = get("MACHINE")
            .context("MACHINE is not set. Set it to the target board, e.g. MACHINE=beaglebone")?
            .parse::<Machine>()?;

        let firmware_sha256 = get("FIRMWARE_SHA256").context(
            "FIRMWARE_SHA256 is not set. Set it to the SHA-256 of the package at FIRMWARE_URL",
        )?;
        let firmware = FirmwarePin::new(
            get("FIRMWARE_URL").unwrap_or(FIRMWARE_URL),
            firmware_sha256,
        )?;

        let mirror = get("MIRROR").unwrap_or(DEFAULT_MIRROR).to_string();
        let build_mirror = get("BUILD_MIRROR")
            .map(str::to_string)
            .unwrap_or_else(|| mirror.clone());

        Ok(Self {
            root: root.to_path_buf(),
            image: image.to_path_buf(),
            machine,
            suite: get("SUITE").unwrap_or(DEFAULT_SUITE).to_string(),
            mirror,
            build_mirror,
            enable_nonfree: get("ENABLE_NONFREE") == Some("yes"),
            custom_plinth: get("CUSTOM_PLINTH").map(PathBuf::from),
            custom_setup: get("CUSTOM_SETUP").map(PathBuf::from),
            source: get("SOURCE") == Some("true"),
            source_in_image: get("SOURCE_IN_IMAGE") == Some("true"),
            hardware_setup: get("HARDWARE_SETUP")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_HARDWARE_SETUP)),
            firmware,
        })
    }

    /// Print configuration for debugging.
    pub fn print(&self) {
        println!("Configuration:");
        println!("  ROOT: {}", self.root.display());
        println!("  IMAGE: {}", self.image.display());
        println!("  MACHINE: {}", self.machine);
        println!("  SUITE: {}", self.suite);
        println!("  MIRROR: {}", self.mirror);
        println!("  BUILD_MIRROR: {}", self.build_mirror);
        println!("  ENABLE_NONFREE: {}", yes_no(self.enable_nonfree));
        println!("  CUSTOM_PLINTH: {}", optional(&self.custom_plinth));
        println!("  CUSTOM_SETUP: {}", optional(&self.custom_setup));
        println!("  SOURCE: {}", yes_no(self.source));
        println!("  SOURCE_IN_IMAGE: {}", yes_no(self.source_in_image));
        println!("  HARDWARE_SETUP: {}", self.hardware_setup.display());
        println!("  FIRMWARE_URL: {}", self.firmware.url);
        println!("  FIRMWARE_SHA256: {}", self.firmware.sha256);
        if self.hardware_setup.exists() {
            println!("  Hardware setup script: FOUND");
        } else {
            println!("  Hardware setup script: NOT FOUND");
        }
    }
}

fn yes_no(flag: bool) -> &'static str {
    if flag {
        "yes"
    } else {
        "no"
    }
}

fn optional(path: &Option<PathBuf>) -> String {
    path.as_ref()
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| "(default package)".to_string())
}

/// Settings for one Vagrant packaging run.
#[derive(Debug, Clone)]
pub struct PackageConfig {
    pub image: PathBuf,
    pub output: PathBuf,
    /// Helper that sets a user's password inside a disk image.
    pub passwd_helper: PathBuf,
}

impl PackageConfig {
    pub fn load(image: &Path, output: &Path) -> Self {
        let passwd_helper = std::env::var("PASSWD_IN_IMAGE")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_PASSWD_HELPER));

        Self {
            image: image.to_path_buf(),
            output: output.to_path_buf(),
            passwd_helper,
        }
    }
}
