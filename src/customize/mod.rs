//! FreedomBox image customizer.
//!
//! Takes a freshly bootstrapped root filesystem (mounted from the image it
//! lives in) and turns it into a finished FreedomBox image.
//!
//! Stages, each a precondition for the next:
//! 1. Firmware partition (Raspberry Pi only)
//! 2. Bind-mount dev, dev/pts, proc, run, sys (released on every exit path)
//! 3. Drop the bootstrapper's DHCP config
//! 4. Create the administrative user
//! 5. Forbid service starts while packages install
//! 6. Write build-time package sources, refresh the index
//! 7. Install freedombox-setup and plinth (archive or custom builds)
//! 8. Install pinned Wi-Fi firmware after checking its digest
//! 9. Run the hardware setup script
//! 10. Run the legacy setup script if the setup package ships one
//! 11. Archive source packages (optional)
//! 12. Remove SSH host keys, normalize /etc/hosts
//! 13. Embed the bootloader (u-boot boards only)
//! 14. Write final package sources, refresh, kill lingering processes

pub mod apt;
pub mod bootloader;
pub mod chroot;
pub mod firmware;
pub mod mounts;
pub mod partition;
pub mod policy;
pub mod sanitize;
pub mod setup;
pub mod source;

use anyhow::{bail, Context, Result};

use crate::config::CustomizeConfig;
use crate::process::Runner;
use crate::timing::Timer;
use chroot::Chroot;

/// Run one named stage, timing it and naming it in any error.
fn stage<T>(
    runner: &mut dyn Runner,
    name: &str,
    body: impl FnOnce(&mut dyn Runner) -> Result<T>,
) -> Result<T> {
    println!("{}...", name);
    let timer = Timer::start(name);
    let value = body(runner).with_context(|| format!("Stage '{}' failed", name))?;
    timer.finish();
    Ok(value)
}

/// Customize the image described by `config`.
pub fn customize_image(runner: &mut dyn Runner, config: &CustomizeConfig) -> Result<()> {
    println!("=== Customizing FreedomBox image ({}) ===\n", config.machine);

    if !config.root.is_dir() {
        bail!("Root filesystem not found: {}", config.root.display());
    }
    if !config.image.is_file() {
        bail!("Image file not found: {}", config.image.display());
    }
    chroot::require_mount_point(runner, &config.root)?;

    let mut extra_unmounts: Vec<&str> = Vec::new();
    if config.machine.needs_firmware_partition() {
        stage(runner, "Preparing firmware partition", |r| {
            partition::prepare_firmware_partition(r, &config.root, &config.image)
        })?;
        extra_unmounts.push(partition::FIRMWARE_MOUNT);
    }

    mounts::with_pseudo_filesystems(runner, &config.root, &extra_unmounts, |r| {
        customize_mounted(r, config)
    })?;

    println!("\n=== Image Customized ===");
    println!("  Output: {}", config.image.display());
    Ok(())
}

/// Everything that needs the pseudo-filesystems in place.
fn customize_mounted(runner: &mut dyn Runner, config: &CustomizeConfig) -> Result<()> {
    let chroot = Chroot::new(&config.root);

    stage(runner, "Removing bootstrap network config", |_| {
        chroot::remove_bootstrap_network_config(&config.root)
    })?;

    stage(runner, "Creating administrative user", |r| {
        setup::create_admin_user(r, &chroot)
    })?;

    policy::with_service_start_suppressed(&config.root, || install_system(runner, config, &chroot))?;

    stage(runner, "Sanitizing host identity", |_| {
        let removed = sanitize::remove_ssh_host_keys(&config.root)?;
        println!("  Removed {} SSH host key file(s)", removed);
        sanitize::sanitize_hosts(&config.root, sanitize::HOSTNAME)
    })?;

    if !config.machine.bootloader_writes().is_empty() {
        stage(runner, "Embedding bootloader", |r| {
            bootloader::embed_bootloader(r, &config.root, &config.image, config.machine)
        })?;
    }

    stage(runner, "Writing final package sources", |r| {
        apt::write_sources_list(&config.root, &config.mirror, &config.suite, config.enable_nonfree)?;
        apt::update(r, &chroot)?;
        chroot::kill_chroot_processes(r, &config.root);
        Ok(())
    })?;

    Ok(())
}

/// Package installation and setup, run with service starts forbidden.
fn install_system(runner: &mut dyn Runner, config: &CustomizeConfig, chroot: &Chroot) -> Result<()> {
    stage(runner, "Configuring package sources", |r| {
        apt::update(r, chroot)?;
        apt::write_sources_list(
            &config.root,
            &config.build_mirror,
            &config.suite,
            config.enable_nonfree,
        )?;
        apt::update(r, chroot)
    })?;

    stage(runner, "Installing FreedomBox packages", |r| {
        setup::write_image_marker(chroot)?;
        apt::install_package(r, chroot, config.custom_setup.as_deref(), apt::SETUP_PACKAGE)?;
        apt::install_package(r, chroot, config.custom_plinth.as_deref(), apt::PLINTH_PACKAGE)
    })?;

    stage(runner, "Installing pinned firmware", |r| {
        firmware::install_firmware(r, chroot, &config.firmware)
    })?;

    stage(runner, "Running hardware setup", |r| {
        setup::run_hardware_setup(r, chroot, &config.hardware_setup, config.machine)
    })?;

    stage(runner, "Running legacy setup", |r| {
        setup::run_legacy_setup(r, chroot).map(|_| ())
    })?;

    if config.source {
        stage(runner, "Archiving source packages", |r| {
            source::archive_sources(r, chroot, &config.image, config.source_in_image).map(|_| ())
        })?;
    }

    Ok(())
}
