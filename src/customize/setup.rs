//! User bootstrap and setup scripts run inside the image.

use anyhow::{bail, Context, Result};
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;

use super::chroot::Chroot;
use crate::machine::Machine;
use crate::process::{check, run, Cmd, Runner};

/// Administrative account created in every image.
pub const ADMIN_USER: &str = "fbx";

/// Marks the system as installed from a disk image rather than a package.
pub const IMAGE_MARKER: &str = "/var/lib/freedombox/is-freedombox-disk-image";

pub const HARDWARE_SETUP_TARGET: &str = "/tmp/hardware-setup";
pub const HARDWARE_SETUP_LOG: &str = "/var/log/hardware-setup.log";

/// Setup script shipped by older freedombox-setup releases.
pub const LEGACY_SETUP: &str = "/usr/lib/freedombox/setup";
pub const LEGACY_SETUP_LOG: &str = "/var/log/freedombox-setup.log";

/// Create the administrative user with a disabled password.
pub fn create_admin_user(runner: &mut dyn Runner, chroot: &Chroot) -> Result<()> {
    run(
        runner,
        chroot.cmd(
            "adduser",
            ["--gecos", ADMIN_USER, "--disabled-password", ADMIN_USER],
        ),
    )?;
    run(runner, chroot.cmd("adduser", [ADMIN_USER, "sudo"]))?;
    println!("  User '{}' added to sudo", ADMIN_USER);
    Ok(())
}

/// Drop the image-installation marker file.
pub fn write_image_marker(chroot: &Chroot) -> Result<()> {
    let marker = chroot.host_path(IMAGE_MARKER);
    if let Some(parent) = marker.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(&marker, "")
        .with_context(|| format!("Failed to create {}", marker.display()))?;
    Ok(())
}

/// Copy the hardware setup script in, run it for `machine` and log its
/// output inside the image.
///
/// The log is written even when the script fails.
pub fn run_hardware_setup(
    runner: &mut dyn Runner,
    chroot: &Chroot,
    script: &Path,
    machine: Machine,
) -> Result<()> {
    if !script.exists() {
        bail!(
            "Hardware setup script not found: {}\nSet HARDWARE_SETUP to its location.",
            script.display()
        );
    }

    let target = chroot.host_path(HARDWARE_SETUP_TARGET);
    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::copy(script, &target)
        .with_context(|| format!("Failed to copy {} into the image", script.display()))?;
    fs::set_permissions(&target, fs::Permissions::from_mode(0o755))?;

    let cmd = chroot
        .cmd(HARDWARE_SETUP_TARGET, [] as [&str; 0])
        .env("MACHINE", machine.name());
    let logged = run_logged(runner, chroot, cmd, HARDWARE_SETUP_LOG);
    let _ = fs::remove_file(&target);
    logged
}

/// Run the legacy setup script if the installed setup package ships one.
///
/// Returns whether it ran.
pub fn run_legacy_setup(runner: &mut dyn Runner, chroot: &Chroot) -> Result<bool> {
    if !chroot.host_path(LEGACY_SETUP).exists() {
        println!("  No legacy setup script; setup runs on first boot");
        return Ok(false);
    }
    run_logged(
        runner,
        chroot,
        chroot.cmd(LEGACY_SETUP, [] as [&str; 0]),
        LEGACY_SETUP_LOG,
    )?;
    Ok(true)
}

/// Run `cmd`, write stdout and stderr to `log` inside the image, then judge
/// the exit status.
fn run_logged(
    runner: &mut dyn Runner,
    chroot: &Chroot,
    cmd: Cmd,
    log: &str,
) -> Result<()> {
    let result = runner.exec(&cmd)?;

    let log_path = chroot.host_path(log);
    if let Some(parent) = log_path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(&log_path, result.combined_output())
        .with_context(|| format!("Failed to write {}", log_path.display()))?;
    println!("  Output logged to {}", log);

    check(&cmd, &result).with_context(|| format!("See {} inside the image", log))
}
