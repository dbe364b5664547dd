//! VirtualBox (`VBoxManage`) command descriptors for the packaging VM.

use std::path::Path;

use crate::process::Cmd;

pub const VBOXMANAGE: &str = "VBoxManage";

pub const OS_TYPE: &str = "Debian_64";
pub const STORAGE_CONTROLLER: &str = "SATA Controller";
pub const MEMORY_MB: u32 = 1024;
pub const VRAM_MB: u32 = 128;

fn vbox() -> Cmd {
    Cmd::new(VBOXMANAGE)
}

pub fn create_vm(name: &str) -> Cmd {
    vbox()
        .args(["createvm", "--name", name, "--ostype", OS_TYPE, "--register"])
}

pub fn add_storage_controller(name: &str) -> Cmd {
    vbox().args([
        "storagectl",
        name,
        "--name",
        STORAGE_CONTROLLER,
        "--add",
        "sata",
        "--controller",
        "IntelAHCI",
    ])
}

fn storage_attach(name: &str) -> Cmd {
    vbox().args([
        "storageattach",
        name,
        "--storagectl",
        STORAGE_CONTROLLER,
        "--port",
        "0",
        "--device",
        "0",
    ])
}

pub fn attach_disk(name: &str, image: &Path) -> Cmd {
    storage_attach(name)
        .args(["--type", "hdd", "--medium"])
        .arg_path(image)
}

pub fn detach_disk(name: &str) -> Cmd {
    storage_attach(name).args(["--medium", "none"])
}

/// NAT port forward rule `<name>,<proto>,<host ip>,<host port>,<guest ip>,<guest port>`.
pub fn ssh_forward_rule(host_port: u16) -> String {
    format!("ssh,tcp,,{},,22", host_port)
}

pub fn configure_vm(name: &str, ssh_port: u16) -> Cmd {
    vbox()
        .args(["modifyvm", name, "--pae", "on"])
        .arg("--memory")
        .arg(MEMORY_MB.to_string())
        .arg("--vram")
        .arg(VRAM_MB.to_string())
        .args(["--nic1", "nat", "--natpf1"])
        .arg(ssh_forward_rule(ssh_port))
}

pub fn start_vm(name: &str) -> Cmd {
    vbox().args(["startvm", name, "--type", "headless"])
}

pub fn unregister_vm(name: &str) -> Cmd {
    vbox().args(["unregistervm", name, "--delete"])
}

/// `vagrant package` exporting the VM as a box.
pub fn package_box(name: &str, output: &Path) -> Cmd {
    Cmd::new("vagrant")
        .args(["package", "--base", name, "--output"])
        .arg_path(output)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_forward_rule() {
        assert_eq!(ssh_forward_rule(2222), "ssh,tcp,,2222,,22");
    }

    #[test]
    fn test_attach_and_detach_share_slot() {
        let attach = attach_disk("vm", Path::new("/tmp/fbx.vdi"));
        let detach = detach_disk("vm");
        assert_eq!(attach.get_args()[..8], detach.get_args()[..8]);
        assert_eq!(attach.arg_after("--medium"), Some("/tmp/fbx.vdi"));
        assert_eq!(detach.arg_after("--medium"), Some("none"));
    }

    #[test]
    fn test_configure_vm() {
        let cmd = configure_vm("vm", 2222);
        assert_eq!(cmd.arg_after("--memory"), Some("1024"));
        assert_eq!(cmd.arg_after("--vram"), Some("128"));
        assert_eq!(cmd.arg_after("--natpf1"), Some("ssh,tcp,,2222,,22"));
    }
}
