//! fbxmaker - FreedomBox image customizer and Vagrant box packager.
//!
//! Two independent pipelines:
//! - `customize` finishes a bootstrapped root filesystem inside a chroot
//! - `vagrant-package` turns a VirtualBox image into a Vagrant base box

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use fbxmaker::commands;
use fbxmaker::config::DEFAULT_BOX_OUTPUT;
use fbxmaker::preflight::PreconditionFailed;

#[derive(Parser)]
#[command(name = "fbxmaker")]
#[command(about = "FreedomBox image customizer and Vagrant box packager")]
#[command(
    after_help = "QUICK START:\n  fbxmaker preflight                    Check host tools\n  MACHINE=beaglebone fbxmaker customize ROOT IMAGE\n  fbxmaker vagrant-package freedombox.vdi"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Customize a bootstrapped root filesystem (configured via environment)
    Customize {
        /// Mounted root filesystem of the image
        root: PathBuf,
        /// Image file backing the root filesystem
        image: PathBuf,
    },

    /// Package a VirtualBox image as a Vagrant box (requires root)
    VagrantPackage {
        /// VirtualBox disk image
        image: PathBuf,
        /// Output box path
        #[arg(short, long, default_value = DEFAULT_BOX_OUTPUT)]
        output: PathBuf,
    },

    /// Run preflight checks (verify host tools before building)
    Preflight {
        /// Fail if any checks fail or warn (exit code 1)
        #[arg(long)]
        strict: bool,
    },

    /// Show information
    Show {
        #[command(subcommand)]
        what: ShowTarget,
    },
}

#[derive(Subcommand)]
enum ShowTarget {
    /// Show configuration resolved from the environment
    Config {
        root: Option<PathBuf>,
        image: Option<PathBuf>,
    },
    /// List supported machine profiles
    Machines,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load .env if present
    dotenvy::dotenv().ok();

    let result = match cli.command {
        Commands::Customize { root, image } => commands::cmd_customize(&root, &image),

        Commands::VagrantPackage { image, output } => {
            commands::cmd_vagrant_package(&image, &output)
        }

        Commands::Preflight { strict } => commands::cmd_preflight(strict),

        Commands::Show { what } => {
            let show_target = match what {
                ShowTarget::Config { root, image } => {
                    commands::show::ShowTarget::Config { root, image }
                }
                ShowTarget::Machines => commands::show::ShowTarget::Machines,
            };
            commands::cmd_show(show_target)
        }
    };

    if let Err(e) = &result {
        if e.downcast_ref::<PreconditionFailed>().is_some() {
            eprintln!("Error: {}", e);
            std::process::exit(-1);
        }
    }
    result
}
