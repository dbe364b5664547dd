//! Integration tests for the Vagrant packaging pipeline.

mod helpers;

use std::path::PathBuf;

use fbxmaker::process::Cmd;
use fbxmaker::vagrant::credential::Credential;
use fbxmaker::vagrant::{customization_commands, package_vagrant_box, PackageRun, VmState};
use helpers::{FakeRunner, RecordingWait};
use regex::Regex;

fn job() -> PackageRun {
    PackageRun {
        vm_name: "freedombox-vagrant-package".to_string(),
        credential: Credential::generate(),
        image: PathBuf::from("/srv/images/freedombox-unstable_amd64.vdi"),
        output: PathBuf::from("/srv/images/freedombox.box"),
        ssh_port: 2222,
        passwd_helper: PathBuf::from("/opt/fbx/passwd-in-image"),
    }
}

fn vbox_subcommand(cmd: &Cmd) -> Option<&str> {
    if cmd.program() == "VBoxManage" {
        cmd.get_args().first().map(String::as_str)
    } else {
        None
    }
}

fn is_remote(cmd: &Cmd) -> bool {
    cmd.program() == "sshpass"
}

fn remote_line(cmd: &Cmd) -> &str {
    cmd.get_args().last().map(String::as_str).unwrap_or_default()
}

// =============================================================================
// Ordering
// =============================================================================

#[test]
fn test_lifecycle_runs_in_order() {
    let job = job();
    let mut runner = FakeRunner::new();
    let mut wait = RecordingWait::new(&runner.events);

    let state = package_vagrant_box(&mut runner, &mut wait, &job).unwrap();
    assert_eq!(state, VmState::Deleted);

    let steps: Vec<String> = runner
        .calls
        .iter()
        .map(|c| match vbox_subcommand(c) {
            Some(sub) => sub.to_string(),
            None if is_remote(c) => "ssh".to_string(),
            None => c.program().to_string(),
        })
        .collect();

    let remote_count = customization_commands().len() + 1;
    let mut expected = vec![
        "/opt/fbx/passwd-in-image".to_string(),
        "createvm".to_string(),
        "storagectl".to_string(),
        "storageattach".to_string(),
        "modifyvm".to_string(),
        "startvm".to_string(),
    ];
    expected.extend(std::iter::repeat("ssh".to_string()).take(remote_count));
    expected.extend(
        ["vagrant", "storageattach", "unregistervm"]
            .iter()
            .map(|s| s.to_string()),
    );
    assert_eq!(steps, expected);
}

#[test]
fn test_waits_bracket_remote_session() {
    let job = job();
    let mut runner = FakeRunner::new();
    let mut wait = RecordingWait::new(&runner.events);

    package_vagrant_box(&mut runner, &mut wait, &job).unwrap();

    let events = runner.events.borrow().clone();
    let booted = events.iter().position(|e| e == "wait: booted").unwrap();
    let powered_off = events.iter().position(|e| e == "wait: powered off").unwrap();
    let startvm = events.iter().position(|e| e.contains("startvm")).unwrap();
    let first_remote = events.iter().position(|e| e.starts_with("sshpass")).unwrap();
    let shutdown = events.iter().position(|e| e.contains("shutdown -h now")).unwrap();
    let package = events.iter().position(|e| e.starts_with("vagrant package")).unwrap();

    assert!(startvm < booted && booted < first_remote);
    assert!(shutdown < powered_off && powered_off < package);
}

#[test]
fn test_remote_commands_match_list() {
    let job = job();
    let mut runner = FakeRunner::new();
    let mut wait = RecordingWait::new(&runner.events);

    package_vagrant_box(&mut runner, &mut wait, &job).unwrap();

    let lines: Vec<&str> = runner.calls.iter().filter(|c| is_remote(c)).map(|c| remote_line(c)).collect();
    assert_eq!(lines[0], "sudo -S -p '' adduser --disabled-password --gecos '' vagrant");
    assert_eq!(lines[1], "sudo -S -p '' adduser vagrant admin");
    assert!(lines.iter().any(|l| l.contains("wget -O /home/vagrant/.ssh/authorized_keys")));
    assert!(lines.iter().any(|l| l.contains("NOPASSWD: ALL")));
    assert_eq!(lines.last(), Some(&"sudo -S -p '' shutdown -h now"));
}

#[test]
fn test_vm_parameters() {
    let job = job();
    let mut runner = FakeRunner::new();
    let mut wait = RecordingWait::new(&runner.events);

    package_vagrant_box(&mut runner, &mut wait, &job).unwrap();

    let create = runner.position(|c| vbox_subcommand(c) == Some("createvm")).unwrap();
    let create = &runner.calls[create];
    assert_eq!(create.arg_after("--name"), Some("freedombox-vagrant-package"));
    assert_eq!(create.arg_after("--ostype"), Some("Debian_64"));

    let modify = runner.position(|c| vbox_subcommand(c) == Some("modifyvm")).unwrap();
    let modify = &runner.calls[modify];
    assert_eq!(modify.arg_after("--pae"), Some("on"));
    assert_eq!(modify.arg_after("--memory"), Some("1024"));
    assert_eq!(modify.arg_after("--natpf1"), Some("ssh,tcp,,2222,,22"));

    let package = runner.calls_of("vagrant")[0];
    assert_eq!(package.arg_after("--base"), Some("freedombox-vagrant-package"));
    assert_eq!(package.arg_after("--output"), Some("/srv/images/freedombox.box"));
}

// =============================================================================
// Credential handling
// =============================================================================

#[test]
fn test_password_never_on_command_line() {
    let job = job();
    let password = job.credential.expose().to_string();
    assert!(Regex::new(r"^[A-Za-z0-9]{20}$").unwrap().is_match(&password));

    let mut runner = FakeRunner::new();
    let mut wait = RecordingWait::new(&runner.events);
    package_vagrant_box(&mut runner, &mut wait, &job).unwrap();

    for cmd in &runner.calls {
        assert!(
            !cmd.get_args().iter().any(|a| a.contains(&password)),
            "password leaked into argv of {}",
            cmd.program()
        );
        assert!(!cmd.display().contains(&password));
    }
    for event in runner.events.borrow().iter() {
        assert!(!event.contains(&password));
    }
}

#[test]
fn test_password_seeded_once_and_reused() {
    let job = job();
    let password = job.credential.expose().to_string();
    let mut runner = FakeRunner::new();
    let mut wait = RecordingWait::new(&runner.events);

    package_vagrant_box(&mut runner, &mut wait, &job).unwrap();

    let helper = runner.calls_of("/opt/fbx/passwd-in-image");
    assert_eq!(helper.len(), 1);
    assert_eq!(
        helper[0].get_args(),
        ["/srv/images/freedombox-unstable_amd64.vdi", "fbx"]
    );
    assert_eq!(helper[0].get_stdin(), Some(format!("{}\n", password).as_str()));

    let remote: Vec<&Cmd> = runner.calls.iter().filter(|c| is_remote(c)).collect();
    assert!(!remote.is_empty());
    for cmd in remote {
        assert!(cmd
            .get_envs()
            .contains(&("SSHPASS".to_string(), password.clone())));
        assert_eq!(cmd.get_stdin(), Some(format!("{}\n", password).as_str()));
    }
}

#[test]
fn test_each_run_gets_fresh_credential() {
    let first = job();
    let second = job();
    assert_ne!(first.credential.expose(), second.credential.expose());
}

// =============================================================================
// Failures
// =============================================================================

#[test]
fn test_failure_after_registration_names_leftover_vm() {
    let job = job();
    let mut runner = FakeRunner::new();
    runner.fail_when(
        |c| vbox_subcommand(c) == Some("startvm"),
        "VBoxManage: error: VT-x is not available",
    );
    let mut wait = RecordingWait::new(&runner.events);

    let err = package_vagrant_box(&mut runner, &mut wait, &job).unwrap_err();
    let message = format!("{:#}", err);

    assert!(message.contains("was left configured"));
    assert!(message.contains("VBoxManage unregistervm freedombox-vagrant-package --delete"));
    assert!(message.contains("VT-x is not available"));
    assert!(runner.position(|c| vbox_subcommand(c) == Some("unregistervm")).is_none());
    assert!(runner.events.borrow().iter().all(|e| !e.starts_with("wait:")));
}

#[test]
fn test_remote_failure_stops_before_packaging() {
    let job = job();
    let mut runner = FakeRunner::new();
    runner.fail_when(
        |c| is_remote(c) && remote_line(c).contains("apt-get update"),
        "E: Could not resolve deb.debian.org",
    );
    let mut wait = RecordingWait::new(&runner.events);

    let err = package_vagrant_box(&mut runner, &mut wait, &job).unwrap_err();
    let message = format!("{:#}", err);

    assert!(message.contains("apt-get update"));
    assert!(message.contains("was left running"));
    assert!(runner.calls_of("vagrant").is_empty());
    assert!(!runner
        .calls
        .iter()
        .any(|c| is_remote(c) && remote_line(c).contains("virtualbox-guest-dkms")));
}

#[test]
fn test_helper_failure_leaves_nothing_registered() {
    let job = job();
    let mut runner = FakeRunner::new();
    runner.fail("/opt/fbx/passwd-in-image", "cannot open image");
    let mut wait = RecordingWait::new(&runner.events);

    let err = package_vagrant_box(&mut runner, &mut wait, &job).unwrap_err();

    assert!(!format!("{:#}", err).contains("was left"));
    assert!(runner.calls_of("VBoxManage").is_empty());
}

#[test]
fn test_cleanup_failures_ignored() {
    let job = job();
    let mut runner = FakeRunner::new();
    runner.fail_when(
        |c| vbox_subcommand(c) == Some("unregistervm"),
        "VBoxManage: error: Could not find a registered machine",
    );
    let mut wait = RecordingWait::new(&runner.events);

    let state = package_vagrant_box(&mut runner, &mut wait, &job).unwrap();
    assert_eq!(state, VmState::Deleted);
}
