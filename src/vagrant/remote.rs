//! Remote commands over SSH into the packaging VM.
//!
//! Every command runs as root through `sudo -S` on a forced pseudo-terminal.
//! The run's password reaches `sshpass` through the `SSHPASS` environment
//! variable and `sudo` through stdin, so it never appears on a command line.
//! Host keys are not checked: the guest is created fresh for every run.

use super::credential::Credential;
use crate::process::{shell_join, Cmd};

/// Account seeded with the run's password before boot.
pub const LOGIN_USER: &str = "fbx";
pub const GUEST_HOST: &str = "127.0.0.1";

#[derive(Debug, Clone)]
pub struct RemoteSession<'a> {
    pub user: &'a str,
    pub host: &'a str,
    pub port: u16,
    credential: &'a Credential,
}

impl<'a> RemoteSession<'a> {
    pub fn new(port: u16, credential: &'a Credential) -> Self {
        Self {
            user: LOGIN_USER,
            host: GUEST_HOST,
            port,
            credential,
        }
    }

    /// Command descriptor running `words` as root inside the guest.
    pub fn command(&self, words: &[&str]) -> Cmd {
        let remote_line = shell_join(["sudo", "-S", "-p", ""].iter().chain(words));

        Cmd::new("sshpass")
            .arg("-e")
            .arg("ssh")
            .arg("-tt")
            .args(["-o", "StrictHostKeyChecking=no"])
            .args(["-o", "UserKnownHostsFile=/dev/null"])
            .args(["-o", "LogLevel=ERROR"])
            .arg("-p")
            .arg(self.port.to_string())
            .arg(format!("{}@{}", self.user, self.host))
            .arg(remote_line)
            .env("SSHPASS", self.credential.expose())
            .stdin(format!("{}\n", self.credential.expose()))
    }
}
