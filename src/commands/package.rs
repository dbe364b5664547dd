//! Vagrant package command - turns a VirtualBox image into a box.

use anyhow::Result;
use std::path::Path;

use crate::config::PackageConfig;
use crate::preflight;
use crate::process::HostRunner;
use crate::vagrant::wait::FixedDelay;
use crate::vagrant::{package_vagrant_box, PackageRun};

/// Execute the vagrant-package command.
pub fn cmd_vagrant_package(image: &Path, output: &Path) -> Result<()> {
    let mut runner = HostRunner;
    preflight::require_packaging_preconditions(&mut runner)?;

    let config = PackageConfig::load(image, output);
    let job = PackageRun::new(&config);
    package_vagrant_box(&mut runner, &mut FixedDelay::default(), &job)?;
    Ok(())
}
