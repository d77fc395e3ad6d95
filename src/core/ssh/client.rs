use crate::defaults::SshConfig;
use crate::error::{Error, Result};
use serde::Serialize;
use std::io::Write;
use std::process::{Command, Stdio};

pub struct SshClient {
    pub host: String,
    pub user: String,
    pub port: u16,
    pub identity_file: Option<String>,
    connect_timeout: u32,
    server_alive_interval: u32,
    server_alive_count_max: u32,
    max_attempts: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub success: bool,
    pub exit_code: i32,
}

impl CommandOutput {
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            stdout: stdout.into(),
            stderr: String::new(),
            success: true,
            exit_code: 0,
        }
    }

    pub fn failed(exit_code: i32, stderr: impl Into<String>) -> Self {
        Self {
            stdout: String::new(),
            stderr: stderr.into(),
            success: false,
            exit_code,
        }
    }
}

impl SshClient {
    pub fn new(
        host: &str,
        user: &str,
        port: u16,
        identity_file: Option<&str>,
        config: &SshConfig,
    ) -> Result<Self> {
        let identity_file = match identity_file {
            Some(path) if !path.is_empty() => {
                let expanded = shellexpand::tilde(path).to_string();
                if !std::path::Path::new(&expanded).exists() {
                    return Err(Error::ssh_identity_file_not_found(host.to_string(), expanded));
                }
                Some(expanded)
            }
            _ => None,
        };

        Ok(Self {
            host: host.to_string(),
            user: user.to_string(),
            port,
            identity_file,
            connect_timeout: config.connect_timeout,
            server_alive_interval: config.server_alive_interval,
            server_alive_count_max: config.server_alive_count_max,
            max_attempts: config.max_attempts.max(1),
        })
    }

    fn build_ssh_args(&self, command: &str, interactive: bool) -> Vec<String> {
        let mut args = Vec::new();

        if let Some(identity_file) = &self.identity_file {
            args.push("-i".to_string());
            args.push(identity_file.clone());
        }

        if self.port != 22 {
            args.push("-p".to_string());
            args.push(self.port.to_string());
        }

        if interactive {
            // Password prompts (sudo, mysql -p) need a terminal on the remote side.
            args.push("-t".to_string());
        } else {
            args.extend([
                "-o".to_string(),
                "BatchMode=yes".to_string(),
                "-o".to_string(),
                format!("ConnectTimeout={}", self.connect_timeout),
                "-o".to_string(),
                format!("ServerAliveInterval={}", self.server_alive_interval),
                "-o".to_string(),
                format!("ServerAliveCountMax={}", self.server_alive_count_max),
            ]);
        }

        args.push(format!("{}@{}", self.user, self.host));
        args.push(command.to_string());

        args
    }

    /// Run a command, feeding `stdin` when given. Connection failures are
    /// retried with backoff; command failures are returned as-is.
    pub fn execute(&self, command: &str, stdin: Option<&[u8]>) -> CommandOutput {
        let backoff_secs = [0, 2, 5];

        for attempt in 0..self.max_attempts {
            let result = self.execute_once(command, stdin);

            if result.success
                || attempt + 1 >= self.max_attempts
                || !is_transient_ssh_error(&result)
            {
                return result;
            }

            let delay = backoff_secs.get(attempt as usize + 1).copied().unwrap_or(5);
            log_status!(
                "ssh",
                "Connection to {} failed (attempt {}/{}), retrying in {}s...",
                self.host,
                attempt + 1,
                self.max_attempts,
                delay
            );
            std::thread::sleep(std::time::Duration::from_secs(delay));
        }

        CommandOutput::failed(-1, "SSH retry exhausted")
    }

    fn execute_once(&self, command: &str, stdin: Option<&[u8]>) -> CommandOutput {
        let args = self.build_ssh_args(command, false);

        let mut cmd = Command::new("ssh");
        cmd.args(&args);

        run_captured(cmd, stdin, "SSH error")
    }

    /// Run with the terminal attached. Returns the exit code.
    pub fn execute_interactive(&self, command: &str) -> i32 {
        let args = self.build_ssh_args(command, true);

        let status = Command::new("ssh")
            .args(&args)
            .stdin(Stdio::inherit())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .status();

        match status {
            Ok(s) => s.code().unwrap_or(-1),
            Err(_) => -1,
        }
    }

    /// Whether a failed output looks like a connection problem rather than
    /// a failing remote command.
    pub fn is_connection_failure(output: &CommandOutput) -> bool {
        !output.success && is_transient_ssh_error(output)
    }
}

pub fn execute_local_command(command: &str, stdin: Option<&[u8]>) -> CommandOutput {
    run_captured(local_shell(command), stdin, "Command error")
}

pub fn execute_local_command_interactive(command: &str) -> i32 {
    let status = local_shell(command)
        .stdin(Stdio::inherit())
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit())
        .status();

    match status {
        Ok(s) => s.code().unwrap_or(-1),
        Err(_) => -1,
    }
}

fn local_shell(command: &str) -> Command {
    let mut cmd = Command::new("sh");
    cmd.args(["-c", command]);
    cmd
}

fn run_captured(mut cmd: Command, stdin: Option<&[u8]>, label: &str) -> CommandOutput {
    cmd.stdout(Stdio::piped()).stderr(Stdio::piped());
    cmd.stdin(if stdin.is_some() {
        Stdio::piped()
    } else {
        Stdio::null()
    });

    let mut child = match cmd.spawn() {
        Ok(child) => child,
        Err(e) => return CommandOutput::failed(-1, format!("{}: {}", label, e)),
    };

    if let (Some(bytes), Some(mut pipe)) = (stdin, child.stdin.take()) {
        if let Err(e) = pipe.write_all(bytes) {
            let _ = child.kill();
            return CommandOutput::failed(-1, format!("Failed to write stdin: {}", e));
        }
    }

    match child.wait_with_output() {
        Ok(out) => CommandOutput {
            stdout: String::from_utf8_lossy(&out.stdout).to_string(),
            stderr: String::from_utf8_lossy(&out.stderr).to_string(),
            success: out.status.success(),
            exit_code: out.status.code().unwrap_or(-1),
        },
        Err(e) => CommandOutput::failed(-1, format!("{}: {}", label, e)),
    }
}

/// Check if a host address refers to the local machine.
pub fn is_local_host(host: &str) -> bool {
    matches!(host, "localhost" | "127.0.0.1" | "::1")
}

/// Check if an SSH failure is a transient connection error worth retrying.
/// Only ssh's own exit status 255 qualifies; a remote command that fails
/// with network words in its stderr is never replayed.
fn is_transient_ssh_error(output: &CommandOutput) -> bool {
    if output.exit_code != 255 {
        return false;
    }
    let stderr = output.stderr.to_lowercase();

    let transient_patterns = [
        "connection refused",
        "connection reset",
        "connection timed out",
        "no route to host",
        "network is unreachable",
        "temporary failure in name resolution",
        "could not resolve hostname",
        "broken pipe",
        "ssh_exchange_identification",
        "connection closed by remote host",
    ];

    transient_patterns.iter().any(|p| stderr.contains(p))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::defaults::Defaults;

    fn client(port: u16) -> SshClient {
        SshClient::new("web1.example.org", "deploy", port, None, &Defaults::default().ssh)
            .unwrap()
    }

    #[test]
    fn batch_args_carry_timeouts() {
        let args = client(22).build_ssh_args("uptime", false);
        assert!(args.contains(&"BatchMode=yes".to_string()));
        assert!(args.contains(&"ConnectTimeout=10".to_string()));
        assert_eq!(args[args.len() - 2], "deploy@web1.example.org");
        assert_eq!(args.last().unwrap(), "uptime");
        assert!(!args.contains(&"-p".to_string()));
    }

    #[test]
    fn interactive_args_request_tty_and_port() {
        let args = client(2222).build_ssh_args("mysql -u root -p", true);
        assert!(args.contains(&"-t".to_string()));
        assert!(args.contains(&"2222".to_string()));
        assert!(!args.contains(&"BatchMode=yes".to_string()));
    }

    #[test]
    fn missing_identity_file_is_reported() {
        let err = SshClient::new(
            "web1",
            "deploy",
            22,
            Some("/nonexistent/id_rsa"),
            &Defaults::default().ssh,
        )
        .err()
        .unwrap();
        assert_eq!(err.code, crate::ErrorCode::SshIdentityFileNotFound);
    }

    #[test]
    fn transient_errors_are_detected() {
        let out = CommandOutput::failed(255, "ssh: connect to host x port 22: Connection refused");
        assert!(SshClient::is_connection_failure(&out));
        let out = CommandOutput::failed(1, "make: *** No rule to make target");
        assert!(!SshClient::is_connection_failure(&out));
    }

    #[test]
    fn remote_failures_mentioning_network_are_not_retried() {
        let out = CommandOutput::failed(
            1,
            "ERROR 2003 (HY000): Can't connect to MySQL server on 'db' (111 Connection refused)",
        );
        assert!(!is_transient_ssh_error(&out));
        let out = CommandOutput::failed(128, "fatal: read error: Connection reset by peer");
        assert!(!is_transient_ssh_error(&out));
    }

    #[test]
    fn ssh_exit_without_network_cause_is_not_retried() {
        let out = CommandOutput::failed(255, "Permission denied (publickey).");
        assert!(!is_transient_ssh_error(&out));
    }

    #[test]
    fn local_command_captures_output_and_stdin() {
        let out = execute_local_command("cat", Some(b"hello"));
        assert!(out.success);
        assert_eq!(out.stdout, "hello");

        let out = execute_local_command("exit 3", None);
        assert_eq!(out.exit_code, 3);
        assert!(!out.success);
    }

    #[test]
    fn local_hosts() {
        assert!(is_local_host("localhost"));
        assert!(is_local_host("127.0.0.1"));
        assert!(!is_local_host("web1"));
    }
}
