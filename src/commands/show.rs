//! Show command - displays information.

use anyhow::Result;
use std::path::{Path, PathBuf};

use crate::config::{CustomizeConfig, PackageConfig, DEFAULT_BOX_OUTPUT};
use crate::machine::Machine;

/// Show target for the show command.
pub enum ShowTarget {
    /// Show configuration resolved from the environment
    Config {
        root: Option<PathBuf>,
        image: Option<PathBuf>,
    },
    /// List supported machine profiles
    Machines,
}

/// Execute the show command.
pub fn cmd_show(target: ShowTarget) -> Result<()> {
    match target {
        ShowTarget::Config { root, image } => {
            let unset = PathBuf::from("(not given)");
            let image = image.unwrap_or_else(|| unset.clone());
            let config = CustomizeConfig::load(&root.unwrap_or(unset), &image)?;
            config.print();

            let package = PackageConfig::load(&image, Path::new(DEFAULT_BOX_OUTPUT));
            println!("  PASSWD_IN_IMAGE: {}", package.passwd_helper.display());
        }
        ShowTarget::Machines => {
            for machine in Machine::ALL {
                let mut notes = Vec::new();
                if machine.needs_firmware_partition() {
                    notes.push("firmware partition".to_string());
                }
                let writes = machine.bootloader_writes();
                if !writes.is_empty() {
                    notes.push(format!("{} bootloader blob(s)", writes.len()));
                }
                if notes.is_empty() {
                    println!("  {}", machine);
                } else {
                    println!("  {} ({})", machine, notes.join(", "));
                }
            }
        }
    }
    Ok(())
}
