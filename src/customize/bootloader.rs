//! Raw bootloader embedding for boards that load u-boot from fixed offsets.

use anyhow::{bail, Result};
use std::path::Path;

use crate::machine::{BootloaderWrite, Machine};
use crate::process::{run, Cmd, Runner};

/// `dd` invocation writing one blob into the image without truncating it.
pub fn dd_command(root: &Path, image: &Path, write: &BootloaderWrite) -> Cmd {
    Cmd::new("dd")
        .arg(format!("if={}", root.join(write.source).display()))
        .arg(format!("of={}", image.display()))
        .arg(format!("bs={}", write.block_size))
        .arg(format!("seek={}", write.seek))
        .arg("conv=notrunc")
}

/// Write the machine's bootloader blobs onto the image.
///
/// Returns the number of blobs written (zero for machines that boot
/// another way).
pub fn embed_bootloader(
    runner: &mut dyn Runner,
    root: &Path,
    image: &Path,
    machine: Machine,
) -> Result<usize> {
    let writes = machine.bootloader_writes();
    for write in &writes {
        let source = root.join(write.source);
        if !source.exists() {
            bail!(
                "Bootloader for {} not found at {}.\n\
                 The hardware setup should have installed the u-boot package.",
                machine,
                source.display()
            );
        }
        println!("  Writing {} at {} x {}", write.source, write.seek, write.block_size);
        run(runner, dd_command(root, image, write))?;
    }
    Ok(writes.len())
}
