//! Command execution against local or remote targets.
//!
//! Tasks describe commands as [`Cmd`] values; a [`Runner`] executes them.
//! [`SystemRunner`] shells out (`sh -c` locally, `ssh` remotely) while
//! [`RecordingRunner`] only records and answers from scripted replies, for
//! dry runs and tests.

use serde::Serialize;
use std::cell::RefCell;
use std::fmt;

use crate::defaults::SshConfig;
use crate::error::{Error, Result};
use crate::ssh::{self, SshClient};
use crate::utils::shell;

pub use crate::ssh::CommandOutput;

// ============================================================================
// Targets
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    Local,
    Remote {
        host: String,
        user: String,
        port: u16,
        identity_file: Option<String>,
    },
}

impl Target {
    /// Parse a host string (`[user@]host[:port]`). Local
    /// addresses become [`Target::Local`].
    pub fn from_host_string(
        host_string: &str,
        default_user: &str,
        default_port: u16,
        identity_file: Option<&str>,
    ) -> Self {
        let (user, rest) = match host_string.split_once('@') {
            Some((user, rest)) if !user.is_empty() => (user.to_string(), rest),
            _ => (default_user.to_string(), host_string),
        };

        let (host, port) = match rest.rsplit_once(':') {
            Some((host, port)) if !host.contains(':') => match port.parse::<u16>() {
                Ok(port) => (host.to_string(), port),
                Err(_) => (rest.to_string(), default_port),
            },
            _ => (rest.to_string(), default_port),
        };

        if ssh::is_local_host(&host) {
            return Target::Local;
        }

        Target::Remote {
            host,
            user,
            port,
            identity_file: identity_file.map(str::to_string),
        }
    }

    pub fn is_local(&self) -> bool {
        matches!(self, Target::Local)
    }

    pub fn host(&self) -> &str {
        match self {
            Target::Local => "localhost",
            Target::Remote { host, .. } => host,
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Target::Local => f.write_str("local"),
            Target::Remote { host, user, port, .. } if *port != 22 => {
                write!(f, "{}@{}:{}", user, host, port)
            }
            Target::Remote { host, user, .. } => write!(f, "{}@{}", user, host),
        }
    }
}

// ============================================================================
// Commands
// ============================================================================

const MASK: &str = "****";

/// A shell command plus how to run it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Cmd {
    pub line: String,
    pub stdin: Option<Vec<u8>>,
    pub sudo: bool,
    pub user: Option<String>,
    /// Failure is returned to the caller instead of aborting the task.
    pub warn_only: bool,
    /// Attach the terminal (password prompts).
    pub interactive: bool,
    /// Do not echo the command line.
    pub quiet: bool,
    /// Fragments of the line masked in logs and reports.
    pub secrets: Vec<String>,
}

impl Cmd {
    pub fn new(line: impl Into<String>) -> Self {
        Self {
            line: line.into(),
            ..Self::default()
        }
    }

    pub fn sudo(mut self) -> Self {
        self.sudo = true;
        self
    }

    /// Run through sudo as `user`.
    pub fn as_user(mut self, user: impl Into<String>) -> Self {
        self.sudo = true;
        self.user = Some(user.into());
        self
    }

    pub fn use_sudo(mut self, enabled: bool) -> Self {
        self.sudo = self.sudo || enabled;
        self
    }

    pub fn warn_only(mut self) -> Self {
        self.warn_only = true;
        self
    }

    pub fn interactive(mut self) -> Self {
        self.interactive = true;
        self
    }

    pub fn quiet(mut self) -> Self {
        self.quiet = true;
        self
    }

    /// Mask `fragment` wherever the line is shown.
    pub fn secret(mut self, fragment: impl Into<String>) -> Self {
        let fragment = fragment.into();
        if !fragment.is_empty() {
            self.secrets.push(fragment);
        }
        self
    }

    /// `line` with every secret replaced by `****`, also inside a sudo
    /// wrapper.
    pub fn masked(&self, line: &str) -> String {
        self.secrets.iter().fold(line.to_string(), |shown, secret| {
            shown
                .replace(secret.as_str(), MASK)
                .replace(&shell::escape_single_quote_content(secret), MASK)
        })
    }

    pub fn stdin(mut self, bytes: impl Into<Vec<u8>>) -> Self {
        self.stdin = Some(bytes.into());
        self
    }

    /// Final shell line for a session logged in as `login_user`.
    /// `sudo` as the login user itself is dropped.
    pub fn render(&self, login_user: &str) -> String {
        if !self.sudo {
            return self.line.clone();
        }

        match self.user.as_deref() {
            Some(user) if user == login_user => self.line.clone(),
            Some(user) => format!(
                "sudo -u {} -H sh -c {}",
                shell::quote_arg(user),
                shell::escape_command_for_shell(&self.line)
            ),
            None => format!("sudo sh -c {}", shell::escape_command_for_shell(&self.line)),
        }
    }
}

// ============================================================================
// Run report
// ============================================================================

/// One executed command, as reported in the run output.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandRecord {
    pub task: String,
    pub target: String,
    pub command: String,
    pub exit_code: i32,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub stdout: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub stderr: String,
}

// ============================================================================
// Runners
// ============================================================================

pub trait Runner {
    /// Execute an already rendered command line on `target`.
    fn execute(&self, target: &Target, line: &str, cmd: &Cmd) -> Result<CommandOutput>;

    /// Whether commands really run (false for dry runs).
    fn is_live(&self) -> bool {
        true
    }
}

/// Runs commands through `sh -c` locally and `ssh` remotely.
pub struct SystemRunner {
    ssh: SshConfig,
}

impl SystemRunner {
    pub fn new(ssh: SshConfig) -> Self {
        Self { ssh }
    }
}

impl Runner for SystemRunner {
    fn execute(&self, target: &Target, line: &str, cmd: &Cmd) -> Result<CommandOutput> {
        match target {
            Target::Local => {
                if cmd.interactive && cmd.stdin.is_none() {
                    let code = ssh::execute_local_command_interactive(line);
                    return Ok(exit_only(code));
                }
                Ok(ssh::execute_local_command(line, cmd.stdin.as_deref()))
            }
            Target::Remote {
                host,
                user,
                port,
                identity_file,
            } => {
                let client = SshClient::new(host, user, *port, identity_file.as_deref(), &self.ssh)?;

                if cmd.interactive && cmd.stdin.is_none() {
                    let code = client.execute_interactive(line);
                    if code == 255 {
                        return Err(Error::ssh_connect_failed(host.clone(), "ssh exited with 255"));
                    }
                    return Ok(exit_only(code));
                }

                let output = client.execute(line, cmd.stdin.as_deref());
                if output.exit_code == 255 && SshClient::is_connection_failure(&output) {
                    return Err(Error::ssh_connect_failed(
                        host.clone(),
                        output.stderr.trim().to_string(),
                    ));
                }
                Ok(output)
            }
        }
    }
}

fn exit_only(code: i32) -> CommandOutput {
    CommandOutput {
        stdout: String::new(),
        stderr: String::new(),
        success: code == 0,
        exit_code: code,
    }
}

/// A scripted reply: the first reply whose pattern occurs in the command
/// line answers it.
#[derive(Debug, Clone)]
struct Reply {
    pattern: String,
    output: CommandOutput,
    once: bool,
}

/// Records commands instead of running them.
#[derive(Debug, Default)]
pub struct RecordingRunner {
    commands: RefCell<Vec<(Target, String, Cmd)>>,
    replies: RefCell<Vec<Reply>>,
    dry_run: bool,
}

impl RecordingRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Runner used for `--dry-run`: every command succeeds silently.
    pub fn dry_run() -> Self {
        Self {
            dry_run: true,
            ..Self::default()
        }
    }

    /// Answer every command containing `pattern` with `output`.
    pub fn reply(&self, pattern: impl Into<String>, output: CommandOutput) -> &Self {
        self.push_reply(pattern.into(), output, false);
        self
    }

    /// Answer the next command containing `pattern` with `output`.
    pub fn reply_once(&self, pattern: impl Into<String>, output: CommandOutput) -> &Self {
        self.push_reply(pattern.into(), output, true);
        self
    }

    fn push_reply(&self, pattern: String, output: CommandOutput, once: bool) {
        self.replies.borrow_mut().push(Reply {
            pattern,
            output,
            once,
        });
    }

    /// Rendered command lines, in execution order.
    pub fn lines(&self) -> Vec<String> {
        self.commands
            .borrow()
            .iter()
            .map(|(_, line, _)| line.clone())
            .collect()
    }

    /// Rendered command lines together with their targets.
    pub fn executed(&self) -> Vec<(Target, String)> {
        self.commands
            .borrow()
            .iter()
            .map(|(target, line, _)| (target.clone(), line.clone()))
            .collect()
    }

    /// Stdin sent with the first command containing `pattern`.
    pub fn stdin_for(&self, pattern: &str) -> Option<Vec<u8>> {
        self.commands
            .borrow()
            .iter()
            .find(|(_, line, _)| line.contains(pattern))
            .and_then(|(_, _, cmd)| cmd.stdin.clone())
    }

    pub fn ran(&self, pattern: &str) -> bool {
        self.commands
            .borrow()
            .iter()
            .any(|(_, line, _)| line.contains(pattern))
    }

    fn answer(&self, line: &str) -> CommandOutput {
        let mut replies = self.replies.borrow_mut();
        match replies.iter().position(|r| line.contains(&r.pattern)) {
            Some(index) if replies[index].once => replies.remove(index).output,
            Some(index) => replies[index].output.clone(),
            None => CommandOutput::ok(""),
        }
    }
}

impl Runner for RecordingRunner {
    fn execute(&self, target: &Target, line: &str, cmd: &Cmd) -> Result<CommandOutput> {
        self.commands
            .borrow_mut()
            .push((target.clone(), line.to_string(), cmd.clone()));
        Ok(self.answer(line))
    }

    fn is_live(&self) -> bool {
        !self.dry_run
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn host_string_parsing() {
        assert_eq!(
            Target::from_host_string("admin@web1:2222", "deploy", 22, None),
            Target::Remote {
                host: "web1".to_string(),
                user: "admin".to_string(),
                port: 2222,
                identity_file: None,
            }
        );
        assert_eq!(
            Target::from_host_string("web1", "deploy", 22, Some("~/.ssh/id")).to_string(),
            "deploy@web1"
        );
        assert_eq!(Target::from_host_string("localhost", "deploy", 22, None), Target::Local);
        assert!(Target::from_host_string("deploy@127.0.0.1", "x", 22, None).is_local());
    }

    #[test]
    fn secrets_are_masked_in_shown_lines() {
        let cmd = Cmd::new("mysql -u root -p'r00t pw' -e \"SELECT 1\"")
            .secret("'r00t pw'")
            .secret("");
        assert_eq!(cmd.secrets.len(), 1);
        assert_eq!(cmd.masked(&cmd.line), "mysql -u root -p**** -e \"SELECT 1\"");

        let wrapped = cmd.clone().sudo().render("deploy");
        assert!(wrapped.contains("r00t pw"));
        assert!(!cmd.masked(&wrapped).contains("r00t"));
    }

    #[test]
    fn render_plain_and_sudo() {
        assert_eq!(Cmd::new("uptime").render("deploy"), "uptime");
        assert_eq!(
            Cmd::new("service httpd restart").sudo().render("deploy"),
            "sudo sh -c 'service httpd restart'"
        );
        assert_eq!(
            Cmd::new("cd /opt && make install").as_user("apache").render("deploy"),
            "sudo -u apache -H sh -c 'cd /opt && make install'"
        );
    }

    #[test]
    fn sudo_as_login_user_is_elided() {
        assert_eq!(
            Cmd::new("git fetch origin").as_user("deploy").render("deploy"),
            "git fetch origin"
        );
    }

    #[test]
    fn render_escapes_single_quotes() {
        assert_eq!(
            Cmd::new("echo 'x'").sudo().render("deploy"),
            "sudo sh -c 'echo '\\''x'\\'''"
        );
    }

    #[test]
    fn recording_runner_replies() {
        let runner = RecordingRunner::new();
        runner
            .reply_once("diff-index", CommandOutput::failed(1, ""))
            .reply("bibsched status", CommandOutput::ok("running"));

        let cmd = Cmd::new("x");
        let first = runner.execute(&Target::Local, "git diff-index HEAD", &cmd).unwrap();
        let second = runner.execute(&Target::Local, "git diff-index HEAD", &cmd).unwrap();
        assert_eq!(first.exit_code, 1);
        assert!(second.success);

        for _ in 0..2 {
            let out = runner.execute(&Target::Local, "bibsched status", &cmd).unwrap();
            assert_eq!(out.stdout, "running");
        }
        assert_eq!(runner.lines().len(), 4);
        assert!(runner.ran("bibsched"));
        assert!(runner.is_live());
        assert!(!RecordingRunner::dry_run().is_live());
    }
}
