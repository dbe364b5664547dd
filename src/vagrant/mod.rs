//! Vagrant box packager.
//!
//! Boots a FreedomBox VirtualBox image in a throw-away VM, turns it into a
//! Vagrant base box over SSH and exports it with `vagrant package`.
//!
//! The VM moves through a fixed sequence of states:
//! `Unregistered -> Registered -> DiskAttached -> Configured -> Running ->
//! Customized -> Stopped -> Packaged -> Deleted`.
//!
//! Deletion is attempted at the end of a successful run only. A failure
//! after registration leaves the VM behind; the error names the state it
//! reached and the command that removes it.

pub mod credential;
pub mod remote;
pub mod vbox;
pub mod wait;

use anyhow::{Context, Result};
use std::fmt;
use std::path::PathBuf;

use crate::config::PackageConfig;
use crate::process::{run, run_best_effort, Cmd, Runner};
use crate::timing::Timer;
use credential::Credential;
use remote::{RemoteSession, LOGIN_USER};
use wait::ReadinessWait;

pub const VM_NAME: &str = "freedombox-vagrant-package";
pub const SSH_PORT: u16 = 2222;

pub const VAGRANT_USER: &str = "vagrant";

/// Vagrant's well-known insecure key; replaced by Vagrant on first `up`.
pub const VAGRANT_INSECURE_KEY_URL: &str =
    "https://raw.githubusercontent.com/hashicorp/vagrant/master/keys/vagrant.pub";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum VmState {
    Unregistered,
    Registered,
    DiskAttached,
    Configured,
    Running,
    Customized,
    Stopped,
    Packaged,
    Deleted,
}

impl VmState {
    /// Whether VirtualBox still knows about the VM in this state.
    pub fn is_registered(self) -> bool {
        self >= VmState::Registered && self < VmState::Deleted
    }
}

impl fmt::Display for VmState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            VmState::Unregistered => "unregistered",
            VmState::Registered => "registered",
            VmState::DiskAttached => "disk attached",
            VmState::Configured => "configured",
            VmState::Running => "running",
            VmState::Customized => "customized",
            VmState::Stopped => "stopped",
            VmState::Packaged => "packaged",
            VmState::Deleted => "deleted",
        };
        f.write_str(name)
    }
}

/// Everything one packaging invocation needs, created fresh per run.
#[derive(Debug, Clone)]
pub struct PackageRun {
    pub vm_name: String,
    pub credential: Credential,
    pub image: PathBuf,
    pub output: PathBuf,
    pub ssh_port: u16,
    pub passwd_helper: PathBuf,
}

impl PackageRun {
    pub fn new(config: &PackageConfig) -> Self {
        Self {
            vm_name: VM_NAME.to_string(),
            credential: Credential::generate(),
            image: config.image.clone(),
            output: config.output.clone(),
            ssh_port: SSH_PORT,
            passwd_helper: config.passwd_helper.clone(),
        }
    }
}

/// Commands run as root in the guest to turn it into a Vagrant base box.
pub fn customization_commands() -> Vec<Vec<&'static str>> {
    let ssh_dir = "/home/vagrant/.ssh";
    let authorized_keys = "/home/vagrant/.ssh/authorized_keys";
    vec![
        vec!["adduser", "--disabled-password", "--gecos", "", VAGRANT_USER],
        // FreedomBox only lets members of 'admin' log in.
        vec!["adduser", VAGRANT_USER, "admin"],
        vec!["mkdir", "-p", ssh_dir],
        vec!["wget", "-O", authorized_keys, VAGRANT_INSECURE_KEY_URL],
        vec!["chown", "-R", "vagrant:vagrant", ssh_dir],
        vec!["chmod", "0700", ssh_dir],
        vec!["chmod", "0600", authorized_keys],
        vec!["adduser", VAGRANT_USER, "sudo"],
        vec![
            "sh",
            "-c",
            "echo 'vagrant ALL=(ALL) NOPASSWD: ALL' > /etc/sudoers.d/vagrant \
             && chmod 0440 /etc/sudoers.d/vagrant",
        ],
        vec!["sed", "-i", "s/ main$/ main contrib/", "/etc/apt/sources.list"],
        vec!["apt-get", "update"],
        vec![
            "apt-get",
            "install",
            "-y",
            "virtualbox-guest-dkms",
            "virtualbox-guest-utils",
        ],
        vec!["apt-get", "build-dep", "-y", "plinth", "freedombox-setup"],
        vec![
            "apt-get",
            "install",
            "-y",
            "build-essential",
            "devscripts",
            "git",
            "python3-pip",
        ],
    ]
}

/// Drives one packaging run and remembers how far the VM got.
struct Packager<'a> {
    runner: &'a mut dyn Runner,
    wait: &'a mut dyn ReadinessWait,
    job: &'a PackageRun,
    state: VmState,
}

impl<'a> Packager<'a> {
    fn step(&mut self, name: &str, cmd: Cmd) -> Result<()> {
        println!("{}...", name);
        run(&mut *self.runner, cmd).with_context(|| format!("Step '{}' failed", name))?;
        Ok(())
    }

    fn advance(&mut self, state: VmState) {
        self.state = state;
    }

    fn seed_credential(&mut self) -> Result<()> {
        println!("Setting a one-time password for '{}' in the image...", LOGIN_USER);
        let cmd = Cmd::new(self.job.passwd_helper.to_string_lossy())
            .arg_path(&self.job.image)
            .arg(LOGIN_USER)
            .stdin(format!("{}\n", self.job.credential.expose()))
            .error_msg("Setting the password inside the image failed");
        run(&mut *self.runner, cmd)?;
        Ok(())
    }

    fn create(&mut self) -> Result<()> {
        let job = self.job;
        let name = job.vm_name.as_str();

        self.step("Registering VM", vbox::create_vm(name))?;
        self.advance(VmState::Registered);

        self.step("Adding storage controller", vbox::add_storage_controller(name))?;
        self.step("Attaching disk", vbox::attach_disk(name, &job.image))?;
        self.advance(VmState::DiskAttached);

        self.step("Configuring VM", vbox::configure_vm(name, job.ssh_port))?;
        self.advance(VmState::Configured);
        Ok(())
    }

    fn start(&mut self) -> Result<()> {
        let job = self.job;
        self.step("Starting VM", vbox::start_vm(&job.vm_name))?;
        self.advance(VmState::Running);
        self.wait.wait_until_booted();
        Ok(())
    }

    fn customize(&mut self) -> Result<()> {
        println!("Customizing guest over SSH...");
        let job = self.job;
        let session = RemoteSession::new(job.ssh_port, &job.credential);
        for words in customization_commands() {
            let cmd = session.command(&words);
            println!("  $ {}", words.join(" "));
            run(&mut *self.runner, cmd)
                .with_context(|| format!("Remote command '{}' failed", words.join(" ")))?;
        }
        self.advance(VmState::Customized);
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        println!("Shutting down guest...");
        let job = self.job;
        let session = RemoteSession::new(job.ssh_port, &job.credential);
        run(&mut *self.runner, session.command(&["shutdown", "-h", "now"]))
            .context("Remote shutdown failed")?;
        self.wait.wait_until_powered_off();
        self.advance(VmState::Stopped);
        Ok(())
    }

    fn package(&mut self) -> Result<()> {
        let job = self.job;
        self.step("Packaging box", vbox::package_box(&job.vm_name, &job.output))?;
        self.advance(VmState::Packaged);
        Ok(())
    }

    fn delete(&mut self) {
        println!("Deleting VM...");
        let job = self.job;
        let name = job.vm_name.as_str();
        run_best_effort(&mut *self.runner, vbox::detach_disk(name));
        run_best_effort(&mut *self.runner, vbox::unregister_vm(name));
        self.advance(VmState::Deleted);
    }

    fn drive(&mut self) -> Result<()> {
        self.seed_credential()?;
        self.create()?;
        self.start()?;
        self.customize()?;
        self.stop()?;
        self.package()?;
        self.delete();
        Ok(())
    }
}

/// Build a Vagrant box from `job.image` at `job.output`.
///
/// Returns the state the VM ended in (`Deleted` on success).
pub fn package_vagrant_box(
    runner: &mut dyn Runner,
    wait: &mut dyn ReadinessWait,
    job: &PackageRun,
) -> Result<VmState> {
    println!("=== Packaging Vagrant box ===\n");
    let timer = Timer::start("Vagrant box");

    let mut packager = Packager {
        runner,
        wait,
        job,
        state: VmState::Unregistered,
    };

    if let Err(e) = packager.drive() {
        let state = packager.state;
        if state.is_registered() {
            return Err(e.context(format!(
                "VM '{}' was left {}. Remove it with: VBoxManage unregistervm {} --delete",
                job.vm_name, state, job.vm_name
            )));
        }
        return Err(e);
    }

    timer.finish();
    println!("\n=== Vagrant Box Built ===");
    println!("  Output: {}", job.output.display());
    Ok(packager.state)
}
