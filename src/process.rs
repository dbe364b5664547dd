//! Centralized command execution with consistent error handling.
//!
//! Every external tool the pipelines drive is described by a [`Cmd`] value
//! (program plus ordered arguments, environment and optional stdin) and
//! handed to a [`Runner`]. The real runner spawns processes; tests swap in a
//! recording fake and assert on the sequence of descriptors.
//!
//! Two failure policies exist and are kept apart by signature:
//! - [`run`] propagates a non-zero exit as an error.
//! - [`run_best_effort`] never fails; it reports and carries on.

use anyhow::{bail, Context, Result};
use std::io::Write;
use std::path::Path;
use std::process::{Command, Stdio};

/// Result of a command execution.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandResult {
    /// Exit code, `None` if terminated by signal.
    pub status_code: Option<i32>,
    /// Captured stdout as a string.
    pub stdout: String,
    /// Captured stderr as a string.
    pub stderr: String,
}

impl CommandResult {
    /// A successful result with the given stdout.
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            status_code: Some(0),
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    /// A failed result with the given exit code and stderr.
    pub fn failed(code: i32, stderr: impl Into<String>) -> Self {
        Self {
            status_code: Some(code),
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }

    /// Returns true if the command exited successfully.
    pub fn success(&self) -> bool {
        self.status_code == Some(0)
    }

    /// Get the exit code, or -1 if terminated by signal.
    pub fn code(&self) -> i32 {
        self.status_code.unwrap_or(-1)
    }

    /// Get stdout, trimmed of whitespace.
    pub fn stdout_trimmed(&self) -> &str {
        self.stdout.trim()
    }

    /// Get stderr, trimmed of whitespace.
    pub fn stderr_trimmed(&self) -> &str {
        self.stderr.trim()
    }

    /// Stdout followed by stderr, as a log file would capture `2>&1`.
    pub fn combined_output(&self) -> String {
        let mut out = self.stdout.clone();
        if !self.stderr.is_empty() {
            if !out.is_empty() && !out.ends_with('\n') {
                out.push('\n');
            }
            out.push_str(&self.stderr);
        }
        out
    }
}

/// Structured description of one external tool invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cmd {
    program: String,
    args: Vec<String>,
    envs: Vec<(String, String)>,
    stdin: Option<String>,
    /// Custom error message prefix.
    error_prefix: Option<String>,
}

impl Cmd {
    /// Create a new command builder.
    pub fn new(program: impl AsRef<str>) -> Self {
        Self {
            program: program.as_ref().to_string(),
            args: Vec::new(),
            envs: Vec::new(),
            stdin: None,
            error_prefix: None,
        }
    }

    /// Add a single argument.
    pub fn arg(mut self, arg: impl AsRef<str>) -> Self {
        self.args.push(arg.as_ref().to_string());
        self
    }

    /// Add multiple arguments.
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for arg in args {
            self.args.push(arg.as_ref().to_string());
        }
        self
    }

    /// Add a path as an argument.
    pub fn arg_path(mut self, path: &Path) -> Self {
        self.args.push(path.to_string_lossy().into_owned());
        self
    }

    /// Set an environment variable for the child only.
    pub fn env(mut self, key: impl AsRef<str>, value: impl AsRef<str>) -> Self {
        self.envs
            .push((key.as_ref().to_string(), value.as_ref().to_string()));
        self
    }

    /// Feed this text to the child's stdin.
    pub fn stdin(mut self, input: impl Into<String>) -> Self {
        self.stdin = Some(input.into());
        self
    }

    /// Set a custom error message prefix.
    pub fn error_msg(mut self, msg: impl AsRef<str>) -> Self {
        self.error_prefix = Some(msg.as_ref().to_string());
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn get_args(&self) -> &[String] {
        &self.args
    }

    pub fn get_envs(&self) -> &[(String, String)] {
        &self.envs
    }

    pub fn get_stdin(&self) -> Option<&str> {
        self.stdin.as_deref()
    }

    /// Value of the argument following `flag`, if present.
    pub fn arg_after(&self, flag: &str) -> Option<&str> {
        self.args
            .iter()
            .position(|a| a == flag)
            .and_then(|i| self.args.get(i + 1))
            .map(String::as_str)
    }

    /// Printable command line. Never includes stdin or environment values.
    pub fn display(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .map(shell_quote)
            .collect::<Vec<_>>()
            .join(" ")
    }

    fn failure_prefix(&self) -> String {
        self.error_prefix
            .clone()
            .unwrap_or_else(|| format!("'{}' failed", self.program))
    }
}

/// Executes command descriptors.
///
/// `exec` only fails when the command could not be started; the exit status
/// is reported in the returned [`CommandResult`] and judged by [`run`] or
/// [`run_best_effort`].
pub trait Runner {
    fn exec(&mut self, cmd: &Cmd) -> Result<CommandResult>;
}

/// Runs commands on the host with `std::process`.
#[derive(Debug, Default, Clone, Copy)]
pub struct HostRunner;

impl Runner for HostRunner {
    fn exec(&mut self, cmd: &Cmd) -> Result<CommandResult> {
        let mut command = Command::new(&cmd.program);
        command.args(&cmd.args);
        command.envs(cmd.envs.iter().map(|(k, v)| (k.as_str(), v.as_str())));

        command.stdout(Stdio::piped());
        command.stderr(Stdio::piped());
        command.stdin(if cmd.stdin.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        });

        let mut child = command.spawn().with_context(|| {
            format!("Failed to execute '{}'. Is it installed?", cmd.program)
        })?;

        if let Some(ref input) = cmd.stdin {
            if let Some(mut stdin) = child.stdin.take() {
                // A child that exits without reading stdin closes the pipe;
                // its exit status is what matters.
                let _ = stdin.write_all(input.as_bytes());
            }
        }

        let output = child
            .wait_with_output()
            .with_context(|| format!("Failed to wait for '{}'", cmd.program))?;

        Ok(CommandResult {
            status_code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

/// Run a command and fail with its stderr on a non-zero exit.
pub fn run(runner: &mut dyn Runner, cmd: Cmd) -> Result<CommandResult> {
    let result = runner.exec(&cmd)?;
    check(&cmd, &result)?;
    Ok(result)
}

/// Turn a finished command's non-zero exit into an error.
pub fn check(cmd: &Cmd, result: &CommandResult) -> Result<()> {
    if result.success() {
        return Ok(());
    }

    let prefix = cmd.failure_prefix();
    let stderr = result.stderr_trimmed();
    if stderr.is_empty() {
        bail!("{} (exit code {})", prefix, result.code());
    } else {
        bail!("{} (exit code {}):\n{}", prefix, result.code(), stderr);
    }
}

/// Run a command whose failure must not stop the pipeline.
///
/// Returns the result when the command ran and succeeded, `None` otherwise.
/// Failures are reported as warnings.
pub fn run_best_effort(runner: &mut dyn Runner, cmd: Cmd) -> Option<CommandResult> {
    match runner.exec(&cmd) {
        Ok(result) if result.success() => Some(result),
        Ok(result) => {
            let detail = result.stderr_trimmed();
            eprintln!(
                "  [WARN] {} failed (ignored, exit code {}){}",
                cmd.display(),
                result.code(),
                if detail.is_empty() {
                    String::new()
                } else {
                    format!(": {}", detail)
                }
            );
            None
        }
        Err(e) => {
            eprintln!("  [WARN] {} failed (ignored): {:#}", cmd.display(), e);
            None
        }
    }
}

/// Quote a word for a POSIX shell.
///
/// Words made only of safe characters pass through unchanged; anything else
/// is wrapped in single quotes with embedded quotes escaped.
pub fn shell_quote(word: &str) -> String {
    let safe = !word.is_empty()
        && word.chars().all(|c| {
            c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '/' | ':' | '=' | '@' | ',' | '+')
        });
    if safe {
        word.to_string()
    } else {
        format!("'{}'", word.replace('\'', r"'\''"))
    }
}

/// Join words into one shell command line, quoting each.
pub fn shell_join<I, S>(words: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    words
        .into_iter()
        .map(|w| shell_quote(w.as_ref()))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Check if a program exists in PATH.
///
/// Returns the full path if found, None otherwise.
pub fn which(program: &str) -> Option<String> {
    which::which(program)
        .ok()
        .map(|p| p.to_string_lossy().into_owned())
}

/// Check if a program exists in PATH (bool version).
pub fn exists(program: &str) -> bool {
    which(program).is_some()
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_success() {
        let result = run(&mut HostRunner, Cmd::new("echo").arg("hello")).unwrap();
        assert!(result.success());
        assert_eq!(result.stdout_trimmed(), "hello");
    }

    #[test]
    fn test_run_failure_includes_stderr() {
        let err = run(&mut HostRunner, Cmd::new("ls").arg("/nonexistent_path_12345")).unwrap_err();
        let msg = err.to_string();

        assert!(msg.contains("No such file") || msg.contains("cannot access"));
    }

    #[test]
    fn test_custom_error_message() {
        let err = run(
            &mut HostRunner,
            Cmd::new("false").error_msg("Custom build step failed"),
        )
        .unwrap_err();

        assert!(err.to_string().contains("Custom build step failed"));
    }

    #[test]
    fn test_best_effort_swallows_failure() {
        assert!(run_best_effort(&mut HostRunner, Cmd::new("false")).is_none());
        assert!(run_best_effort(&mut HostRunner, Cmd::new("nonexistent_program_12345")).is_none());
        assert!(run_best_effort(&mut HostRunner, Cmd::new("true")).is_some());
    }

    #[test]
    fn test_stdin_and_env_reach_child() {
        let result = run(
            &mut HostRunner,
            Cmd::new("sh")
                .args(["-c", "read line; echo \"$line-$GREETING\""])
                .env("GREETING", "world")
                .stdin("hello\n"),
        )
        .unwrap();
        assert_eq!(result.stdout_trimmed(), "hello-world");
    }

    #[test]
    fn test_shell_quote() {
        assert_eq!(shell_quote("apt-get"), "apt-get");
        assert_eq!(shell_quote("/home/vagrant/.ssh"), "/home/vagrant/.ssh");
        assert_eq!(shell_quote(""), "''");
        assert_eq!(shell_quote("a b"), "'a b'");
        assert_eq!(shell_quote("it's"), r"'it'\''s'");
        assert_eq!(shell_quote("$HOME"), "'$HOME'");
    }

    #[test]
    fn test_shell_join_round_trips_through_sh() {
        let line = shell_join(["printf", "%s|", "a b", "it's", ""]);
        let result = run(&mut HostRunner, Cmd::new("sh").args(["-c", &line])).unwrap();
        assert_eq!(result.stdout, "a b|it's||");
    }

    #[test]
    fn test_display_hides_stdin_and_env() {
        let cmd = Cmd::new("sshpass")
            .arg("-e")
            .env("SSHPASS", "secret")
            .stdin("secret\n");
        assert_eq!(cmd.display(), "sshpass -e");
    }

    #[test]
    fn test_arg_after() {
        let cmd = Cmd::new("curl").args(["-L", "-o", "/tmp/x", "http://example"]);
        assert_eq!(cmd.arg_after("-o"), Some("/tmp/x"));
        assert_eq!(cmd.arg_after("--nope"), None);
    }

    #[test]
    fn test_combined_output() {
        let result = CommandResult {
            status_code: Some(1),
            stdout: "out".into(),
            stderr: "err\n".into(),
        };
        assert_eq!(result.combined_output(), "out\nerr\n");
    }

    #[test]
    fn test_which_exists() {
        assert!(which("sh").is_some());
        assert!(!exists("nonexistent_program_12345"));
    }
}
