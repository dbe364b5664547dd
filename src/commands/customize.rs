//! Customize command - runs the image customization pipeline.

use anyhow::Result;
use std::path::Path;

use crate::config::CustomizeConfig;
use crate::customize;
use crate::process::HostRunner;

/// Execute the customize command.
pub fn cmd_customize(root: &Path, image: &Path) -> Result<()> {
    let config = CustomizeConfig::load(root, image)?;
    config.print();
    println!();

    customize::customize_image(&mut HostRunner, &config)
}
