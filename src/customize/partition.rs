//! Firmware partition layout for boards that boot from a separate FAT
//! partition (Raspberry Pi).
//!
//! The bootstrapper leaves the image as `[boot][root]`, mapped through a
//! loop device and mounted at the root path. A FAT partition is added in the
//! gap in front of the first partition, the table is reordered by start
//! sector so the new partition becomes number 1, and everything is mounted
//! again from the shifted device nodes.

use anyhow::{bail, Context, Result};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::Path;

use crate::process::{run, run_best_effort, Cmd, Runner};

/// Mount point of the firmware partition, relative to the root.
pub const FIRMWARE_MOUNT: &str = "boot/firmware";

/// Firmware partition bounds, in front of the bootstrapper's first partition.
pub const FIRMWARE_START: &str = "1MiB";
pub const FIRMWARE_END: &str = "64MiB";

/// A partition device node such as `/dev/mapper/loop0p2`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionNode {
    /// Everything before the partition number (`/dev/mapper/loop0p`).
    pub prefix: String,
    pub number: u32,
}

impl PartitionNode {
    pub fn parse(device: &str) -> Result<Self> {
        let device = device.trim();
        let digits = device
            .chars()
            .rev()
            .take_while(|c| c.is_ascii_digit())
            .count();
        if digits == 0 || digits == device.len() {
            bail!("'{}' does not look like a partition device", device);
        }
        let (prefix, number) = device.split_at(device.len() - digits);
        Ok(Self {
            prefix: prefix.to_string(),
            number: number
                .parse()
                .with_context(|| format!("Bad partition number in '{}'", device))?,
        })
    }

    /// Device node of partition `number` on the same disk.
    pub fn sibling(&self, number: u32) -> String {
        format!("{}{}", self.prefix, number)
    }

    /// Loop device backing the partition mappings.
    ///
    /// `/dev/mapper/loop0p2` and `/dev/loop0p2` both map to `/dev/loop0`.
    pub fn loop_device(&self) -> Result<String> {
        let name = Path::new(&self.prefix)
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let name = name.strip_suffix('p').unwrap_or(&name);
        if !name.starts_with("loop") {
            bail!(
                "Partition {}N is not on a loop device; cannot refresh mappings",
                self.prefix
            );
        }
        Ok(format!("/dev/{}", name))
    }
}

/// Device currently mounted at `mountpoint`.
fn mount_source(runner: &mut dyn Runner, mountpoint: &Path) -> Result<String> {
    let result = run(
        runner,
        Cmd::new("findmnt")
            .args(["-n", "-o", "SOURCE"])
            .arg_path(mountpoint),
    )
    .with_context(|| format!("{} is not a mount point", mountpoint.display()))?;
    let source = result.stdout_trimmed();
    if source.is_empty() {
        bail!("No device mounted at {}", mountpoint.display());
    }
    Ok(source.to_string())
}

/// Add, format and mount the firmware partition.
pub fn prepare_firmware_partition(runner: &mut dyn Runner, root: &Path, image: &Path) -> Result<()> {
    let boot_dir = root.join("boot");

    let root_node = PartitionNode::parse(&mount_source(runner, root)?)?;
    let boot_node = PartitionNode::parse(&mount_source(runner, &boot_dir)?)?;
    if root_node.prefix != boot_node.prefix {
        bail!(
            "Root ({}) and boot ({}) are on different disks",
            root_node.sibling(root_node.number),
            boot_node.sibling(boot_node.number)
        );
    }
    let loop_device = root_node.loop_device()?;

    run(runner, Cmd::new("umount").arg_path(&boot_dir))?;
    run(runner, Cmd::new("umount").arg_path(root))?;

    run(
        runner,
        Cmd::new("parted")
            .arg("-s")
            .arg_path(image)
            .args(["mkpart", "primary", "fat32", FIRMWARE_START, FIRMWARE_END]),
    )?;
    run(runner, Cmd::new("sfdisk").arg("--reorder").arg_path(image))?;
    run(runner, Cmd::new("kpartx").arg("-u").arg(&loop_device))?;

    // New partition sorts first; every existing partition moves up by one.
    let firmware_dev = root_node.sibling(1);
    let root_dev = root_node.sibling(root_node.number + 1);
    let boot_dev = root_node.sibling(boot_node.number + 1);

    run(
        runner,
        Cmd::new("mkfs.vfat").args(["-n", "firmware"]).arg(&firmware_dev),
    )?;

    run(runner, Cmd::new("mount").arg(&root_dev).arg_path(root))?;
    run(runner, Cmd::new("mount").arg(&boot_dev).arg_path(&boot_dir))?;

    let firmware_dir = root.join(FIRMWARE_MOUNT);
    fs::create_dir_all(&firmware_dir)
        .with_context(|| format!("Failed to create {}", firmware_dir.display()))?;
    run(runner, Cmd::new("mount").arg(&firmware_dev).arg_path(&firmware_dir))?;

    // The caller releases the firmware mount only once this function succeeds.
    let registered = register_firmware_partition(runner, root, &firmware_dev);
    if registered.is_err() {
        run_best_effort(runner, Cmd::new("umount").arg_path(&firmware_dir));
    }
    registered
}

/// Record the mounted firmware partition's UUID in the image's fstab.
fn register_firmware_partition(runner: &mut dyn Runner, root: &Path, firmware_dev: &str) -> Result<()> {
    let uuid = run(
        runner,
        Cmd::new("blkid")
            .args(["-s", "UUID", "-o", "value"])
            .arg(firmware_dev),
    )?
    .stdout_trimmed()
    .to_string();
    if uuid.is_empty() {
        bail!("blkid returned no UUID for {}", firmware_dev);
    }

    append_fstab_entry(root, &uuid)?;
    println!("  Firmware partition {} (UUID={})", firmware_dev, uuid);
    Ok(())
}

/// fstab line for the firmware partition.
pub fn fstab_entry(uuid: &str) -> String {
    format!("UUID={} /{} vfat defaults 0 2\n", uuid, FIRMWARE_MOUNT)
}

fn append_fstab_entry(root: &Path, uuid: &str) -> Result<()> {
    let fstab = root.join("etc/fstab");
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&fstab)
        .with_context(|| format!("Failed to open {}", fstab.display()))?;
    file.write_all(fstab_entry(uuid).as_bytes())
        .with_context(|| format!("Failed to write {}", fstab.display()))?;
    Ok(())
}
