//! CLI command handlers.
//!
//! Each submodule handles a specific CLI command:
//! - `customize` - Customize a bootstrapped FreedomBox image
//! - `package` - Package a VirtualBox image as a Vagrant box
//! - `preflight` - Run preflight checks
//! - `show` - Display information

mod customize;
mod package;
mod preflight;
pub mod show;

pub use customize::cmd_customize;
pub use package::cmd_vagrant_package;
pub use preflight::cmd_preflight;
pub use show::cmd_show;
