//! Shared test utilities for fbxmaker tests.
#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use tempfile::TempDir;

use anyhow::Result;
use fbxmaker::config::CustomizeConfig;
use fbxmaker::process::{Cmd, CommandResult, Runner};
use fbxmaker::vagrant::wait::ReadinessWait;

/// Bytes "downloaded" by every fake `curl -o`.
pub const FIRMWARE_PAYLOAD: &[u8] = b"fake ath9k firmware package";

/// Shared, ordered log of commands and waits.
pub type EventLog = Rc<RefCell<Vec<String>>>;

type Predicate = Box<dyn Fn(&Cmd) -> bool>;
type Hook = Box<dyn FnMut(&Cmd)>;

/// Program a command is "about": the program run inside `chroot`, or the
/// program itself.
pub fn key(cmd: &Cmd) -> &str {
    if cmd.program() == "chroot" {
        if let Some(inner) = cmd.get_args().get(1) {
            return inner;
        }
    }
    cmd.program()
}

/// Records every command and answers from a script instead of running it.
///
/// Unscripted commands succeed with empty output.
pub struct FakeRunner {
    pub calls: Vec<Cmd>,
    pub events: EventLog,
    responses: HashMap<String, VecDeque<CommandResult>>,
    failures: Vec<(Predicate, CommandResult)>,
    hooks: Vec<(String, Hook)>,
}

impl FakeRunner {
    pub fn new() -> Self {
        Self {
            calls: Vec::new(),
            events: Rc::new(RefCell::new(Vec::new())),
            responses: HashMap::new(),
            failures: Vec::new(),
            hooks: Vec::new(),
        }
    }

    /// Queue stdout for the next call of `program`.
    pub fn respond(&mut self, program: &str, stdout: &str) -> &mut Self {
        self.responses
            .entry(program.to_string())
            .or_default()
            .push_back(CommandResult::ok(stdout));
        self
    }

    /// Every call of `program` exits 1 with `stderr`.
    pub fn fail(&mut self, program: &str, stderr: &str) -> &mut Self {
        let program = program.to_string();
        self.fail_when(move |cmd| key(cmd) == program, stderr)
    }

    /// Every call matching `pred` exits 1 with `stderr`.
    pub fn fail_when(&mut self, pred: impl Fn(&Cmd) -> bool + 'static, stderr: &str) -> &mut Self {
        self.failures
            .push((Box::new(pred), CommandResult::failed(1, stderr)));
        self
    }

    /// Run `hook` whenever `program` is called, before answering.
    pub fn on(&mut self, program: &str, hook: impl FnMut(&Cmd) + 'static) -> &mut Self {
        self.hooks.push((program.to_string(), Box::new(hook)));
        self
    }

    /// Keys of all recorded calls, in order.
    pub fn programs(&self) -> Vec<String> {
        self.calls.iter().map(|c| key(c).to_string()).collect()
    }

    /// Recorded calls of `program`.
    pub fn calls_of(&self, program: &str) -> Vec<&Cmd> {
        self.calls.iter().filter(|c| key(c) == program).collect()
    }

    /// Index of the first call matching `pred`.
    pub fn position(&self, pred: impl Fn(&Cmd) -> bool) -> Option<usize> {
        self.calls.iter().position(pred)
    }
}

impl Runner for FakeRunner {
    fn exec(&mut self, cmd: &Cmd) -> Result<CommandResult> {
        self.calls.push(cmd.clone());
        self.events.borrow_mut().push(cmd.display());

        // curl -o <path>: write the payload where the download would land.
        if cmd.program() == "curl" {
            if let Some(out) = cmd.arg_after("-o") {
                fs::write(out, FIRMWARE_PAYLOAD)?;
            }
        }

        let k = key(cmd).to_string();
        for (program, hook) in self.hooks.iter_mut() {
            if *program == k {
                hook(cmd);
            }
        }

        if let Some((_, result)) = self.failures.iter().find(|(pred, _)| pred(cmd)) {
            return Ok(result.clone());
        }
        if let Some(result) = self.responses.get_mut(&k).and_then(VecDeque::pop_front) {
            return Ok(result);
        }
        Ok(CommandResult::ok(""))
    }
}

/// Records readiness waits into the shared event log instead of sleeping.
pub struct RecordingWait {
    events: EventLog,
}

impl RecordingWait {
    pub fn new(events: &EventLog) -> Self {
        Self {
            events: Rc::clone(events),
        }
    }
}

impl ReadinessWait for RecordingWait {
    fn wait_until_booted(&mut self) {
        self.events.borrow_mut().push("wait: booted".to_string());
    }

    fn wait_until_powered_off(&mut self) {
        self.events.borrow_mut().push("wait: powered off".to_string());
    }
}

/// Temporary bootstrapped root, image file and hardware setup script.
pub struct TestImage {
    /// Temporary directory (kept alive for lifetime of TestImage)
    pub _temp_dir: TempDir,
    pub root: PathBuf,
    pub image: PathBuf,
    pub hardware_setup: PathBuf,
    pub dir: PathBuf,
}

impl TestImage {
    pub fn new() -> Self {
        Self::with_image_name("freedombox.img")
    }

    pub fn with_image_name(image_name: &str) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let dir = temp_dir.path().to_path_buf();
        let root = dir.join("root");
        create_mock_root(&root);

        let image = dir.join(image_name);
        fs::write(&image, b"").expect("Failed to create image file");

        let hardware_setup = dir.join("hardware-setup");
        fs::write(&hardware_setup, "#!/bin/sh\necho \"setting up $MACHINE\"\n")
            .expect("Failed to create hardware setup script");
        fs::set_permissions(&hardware_setup, fs::Permissions::from_mode(0o755))
            .expect("Failed to chmod hardware setup script");

        Self {
            _temp_dir: temp_dir,
            root,
            image,
            hardware_setup,
            dir,
        }
    }

    /// Config for `machine` with extra variables, pinned to the fake payload.
    pub fn config(&self, machine: &str, extra: &[(&str, &str)]) -> CustomizeConfig {
        let mut vars: HashMap<String, String> = HashMap::new();
        vars.insert("MACHINE".into(), machine.into());
        vars.insert(
            "HARDWARE_SETUP".into(),
            self.hardware_setup.to_string_lossy().into_owned(),
        );
        vars.insert("FIRMWARE_URL".into(), PAYLOAD_URL.into());
        vars.insert("FIRMWARE_SHA256".into(), payload_digest());
        for (k, v) in extra {
            vars.insert(k.to_string(), v.to_string());
        }
        CustomizeConfig::from_vars(&self.root, &self.image, &vars).expect("valid config")
    }

    pub fn path(&self, inner: &str) -> PathBuf {
        self.root.join(inner.trim_start_matches('/'))
    }
}

/// URL the test configs pin; downloads land at `/tmp/firmware.deb`.
pub const PAYLOAD_URL: &str = "https://example.org/pool/firmware.deb";

/// SHA-256 of [`FIRMWARE_PAYLOAD`].
pub fn payload_digest() -> String {
    use sha2::{Digest, Sha256};
    format!("{:x}", Sha256::digest(FIRMWARE_PAYLOAD))
}

/// Minimal debootstrap-like tree.
pub fn create_mock_root(root: &Path) {
    for dir in [
        "dev/pts",
        "proc",
        "run",
        "sys",
        "tmp",
        "boot",
        "etc/ssh",
        "etc/apt",
        "etc/network/interfaces.d",
        "usr/sbin",
    ] {
        fs::create_dir_all(root.join(dir)).expect("Failed to create mock root dir");
    }

    fs::write(
        root.join("etc/hosts"),
        "127.0.0.1\tlocalhost buildhost\n::1\tlocalhost ip6-localhost\n",
    )
    .expect("Failed to create hosts");
    fs::write(root.join("etc/ssh/ssh_host_rsa_key"), "secret").expect("Failed to create key");
    fs::write(root.join("etc/ssh/ssh_host_rsa_key.pub"), "public").expect("Failed to create key");
    fs::write(root.join("etc/ssh/sshd_config"), "PermitRootLogin no\n")
        .expect("Failed to create sshd_config");
    fs::write(
        root.join("etc/network/interfaces.d/setup"),
        "auto eth0\niface eth0 inet dhcp\n",
    )
    .expect("Failed to create bootstrap network config");
}

/// Assert a file exists.
pub fn assert_file_exists(path: &Path) {
    assert!(path.is_file(), "File should exist: {}", path.display());
}

/// Assert a path is gone.
pub fn assert_absent(path: &Path) {
    assert!(!path.exists(), "Path should not exist: {}", path.display());
}

/// Assert a file contains specific content.
pub fn assert_file_contains(path: &Path, content: &str) {
    let actual = fs::read_to_string(path)
        .unwrap_or_else(|_| panic!("Failed to read {}", path.display()));
    assert!(
        actual.contains(content),
        "File {} should contain '{}', but has:\n{}",
        path.display(),
        content,
        actual
    );
}
