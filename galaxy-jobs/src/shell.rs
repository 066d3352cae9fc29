//! Shell command execution
//!
//! Runs commands locally (or over ssh) with a hard timeout. Each command
//! gets its own process group so that everything it spawned can be
//! signalled together: SIGTERM first, SIGKILL if the group is still alive
//! after a grace period.

use anyhow::{Context, Result};
use async_trait::async_trait;
use nix::sys::signal::{Signal, killpg};
use nix::unistd::Pid;
use std::os::unix::process::{CommandExt, ExitStatusExt};
use std::path::PathBuf;
use std::process::{Command as StdCommand, ExitStatus, Stdio};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Return code reported for a command that was killed after its timeout
pub const TIMEOUT_RETURN_CODE: i32 = -1;

/// Stderr text reported for a command that was killed after its timeout
pub const TIMEOUT_ERROR_MESSAGE: &str = "Execution timed out";

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// How long a process group gets to exit after each signal
pub const DEFAULT_KILL_GRACE: Duration = Duration::from_secs(1);

const GROUP_POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Captured result of a command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShellOutput {
    pub stdout: String,
    pub stderr: String,
    /// Exit code, `128 + signal` if the command was killed by a signal, or
    /// [`TIMEOUT_RETURN_CODE`]
    pub return_code: i32,
}

impl ShellOutput {
    pub fn success(&self) -> bool {
        self.return_code == 0
    }

    pub fn timed_out(&self) -> bool {
        self.return_code == TIMEOUT_RETURN_CODE
    }
}

/// Something that can run a command line
#[async_trait]
pub trait Shell: Send + Sync {
    async fn execute(&self, command: &str) -> Result<ShellOutput>;
}

/// Whether any process in group `pgid` is still alive
pub fn check_pg(pgid: i32) -> bool {
    if pgid <= 0 {
        return false;
    }
    killpg(Pid::from_raw(pgid), None::<Signal>).is_ok()
}

/// Terminates process group `pgid`, escalating from SIGTERM to SIGKILL
///
/// Returns quietly if the group is already gone.
pub async fn kill_pg(pgid: i32, grace: Duration) {
    if pgid <= 0 {
        return;
    }
    for signal in [Signal::SIGTERM, Signal::SIGKILL] {
        if killpg(Pid::from_raw(pgid), signal).is_err() {
            return;
        }
        tokio::time::sleep(grace).await;
        if !check_pg(pgid) {
            return;
        }
    }
}

/// A spawned command whose output is being collected
pub struct RunningCommand {
    child: Child,
    pgid: i32,
    stdout: JoinHandle<String>,
    stderr: JoinHandle<String>,
}

impl RunningCommand {
    /// Spawns `command` as the leader of a new process group
    pub fn spawn(mut command: StdCommand) -> Result<Self> {
        command
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .process_group(0);

        let mut child = Command::from(command)
            .spawn()
            .context("Failed to spawn command")?;
        let pgid = child
            .id()
            .context("Spawned command has no process id")? as i32;

        let stdout = tokio::spawn(read_to_string(child.stdout.take()));
        let stderr = tokio::spawn(read_to_string(child.stderr.take()));

        Ok(Self {
            child,
            pgid,
            stdout,
            stderr,
        })
    }

    /// Process group ID (equal to the leader's PID)
    pub fn pgid(&self) -> i32 {
        self.pgid
    }

    /// Waits for the command, killing its process group after `timeout`
    ///
    /// The deadline covers both the leader and the output pipes: a
    /// background child that keeps stdout open counts against the timeout.
    pub async fn finish(mut self, timeout: Duration, grace: Duration) -> Result<ShellOutput> {
        let deadline = Instant::now() + timeout;

        let status = match tokio::time::timeout_at(deadline, self.child.wait()).await {
            Ok(status) => status.context("Failed to wait for command")?,
            Err(_) => return Ok(self.timed_out(timeout, grace).await),
        };

        let output = tokio::time::timeout_at(deadline, async {
            tokio::join!(&mut self.stdout, &mut self.stderr)
        })
        .await;
        let (stdout, stderr) = match output {
            Ok(output) => output,
            Err(_) => return Ok(self.timed_out(timeout, grace).await),
        };

        if check_pg(self.pgid) {
            debug!(
                "Leader of process group {} exited, killing leftover processes",
                self.pgid
            );
            self.terminate(grace).await;
        }

        Ok(ShellOutput {
            stdout: stdout.unwrap_or_default(),
            stderr: stderr.unwrap_or_default(),
            return_code: return_code(status),
        })
    }

    async fn timed_out(mut self, timeout: Duration, grace: Duration) -> ShellOutput {
        warn!(
            "Command exceeded timeout of {:?}, killing process group {}",
            timeout, self.pgid
        );
        self.terminate(grace).await;
        self.stdout.abort();
        self.stderr.abort();

        ShellOutput {
            stdout: String::new(),
            stderr: TIMEOUT_ERROR_MESSAGE.to_string(),
            return_code: TIMEOUT_RETURN_CODE,
        }
    }

    /// SIGTERM, then SIGKILL, reaping the leader in between
    async fn terminate(&mut self, grace: Duration) {
        let pgid = Pid::from_raw(self.pgid);

        for signal in [Signal::SIGTERM, Signal::SIGKILL] {
            if killpg(pgid, signal).is_err() {
                break;
            }
            let deadline = Instant::now() + grace;
            // The leader stays a zombie (and the group alive) until reaped
            let _ = tokio::time::timeout_at(deadline, self.child.wait()).await;
            if wait_for_group_exit(self.pgid, deadline).await {
                break;
            }
        }

        if let Err(e) = self.child.wait().await {
            debug!("Failed to reap process group {}: {}", self.pgid, e);
        }
    }
}

/// Exit code, or `128 + signal` for a command killed by a signal
fn return_code(status: ExitStatus) -> i32 {
    status
        .code()
        .or_else(|| status.signal().map(|signal| 128 + signal))
        .unwrap_or_else(|| status.into_raw())
}

/// Polls until group `pgid` is gone or `deadline` passes
async fn wait_for_group_exit(pgid: i32, deadline: Instant) -> bool {
    loop {
        if !check_pg(pgid) {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(GROUP_POLL_INTERVAL).await;
    }
}

async fn read_to_string<R: AsyncRead + Unpin>(stream: Option<R>) -> String {
    let Some(mut stream) = stream else {
        return String::new();
    };
    let mut buf = Vec::new();
    if let Err(e) = stream.read_to_end(&mut buf).await {
        debug!("Failed to read command output: {}", e);
    }
    String::from_utf8_lossy(&buf).into_owned()
}

/// Runs commands through `/bin/sh -c` on this host
#[derive(Debug, Clone)]
pub struct LocalShell {
    timeout: Duration,
    grace: Duration,
}

impl LocalShell {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            grace: DEFAULT_KILL_GRACE,
        }
    }

    pub fn with_grace(mut self, grace: Duration) -> Self {
        self.grace = grace;
        self
    }

    fn command(&self, command: &str) -> StdCommand {
        let mut cmd = StdCommand::new("/bin/sh");
        cmd.arg("-c").arg(command);
        cmd
    }

    /// Starts `command` without waiting for it
    pub fn spawn(&self, command: &str) -> Result<RunningCommand> {
        RunningCommand::spawn(self.command(command))
    }

    /// Runs an already built command under this shell's timeout
    pub async fn run(&self, command: StdCommand) -> Result<ShellOutput> {
        RunningCommand::spawn(command)?
            .finish(self.timeout, self.grace)
            .await
    }
}

impl Default for LocalShell {
    fn default() -> Self {
        Self::new(DEFAULT_TIMEOUT)
    }
}

#[async_trait]
impl Shell for LocalShell {
    async fn execute(&self, command: &str) -> Result<ShellOutput> {
        debug!("Executing locally: {}", command);
        self.run(self.command(command)).await
    }
}

/// Runs commands on a remote host through the `ssh` binary
///
/// Batch mode is forced so a missing key fails fast instead of prompting.
#[derive(Debug, Clone)]
pub struct SecureShell {
    local: LocalShell,
    host: String,
    user: Option<String>,
    port: Option<u16>,
    identity_file: Option<PathBuf>,
}

impl SecureShell {
    pub fn new(host: impl Into<String>, timeout: Duration) -> Self {
        Self {
            local: LocalShell::new(timeout),
            host: host.into(),
            user: None,
            port: None,
            identity_file: None,
        }
    }

    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    pub fn with_identity_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.identity_file = Some(path.into());
        self
    }

    fn command(&self, command: &str) -> StdCommand {
        let mut cmd = StdCommand::new("ssh");
        cmd.arg("-o").arg("BatchMode=yes");
        if let Some(port) = self.port {
            cmd.arg("-p").arg(port.to_string());
        }
        if let Some(identity) = &self.identity_file {
            cmd.arg("-i").arg(identity);
        }
        let target = match &self.user {
            Some(user) => format!("{}@{}", user, self.host),
            None => self.host.clone(),
        };
        cmd.arg(target).arg("--").arg(command);
        cmd
    }
}

#[async_trait]
impl Shell for SecureShell {
    async fn execute(&self, command: &str) -> Result<ShellOutput> {
        debug!("Executing on {}: {}", self.host, command);
        self.local.run(self.command(command)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[tokio::test]
    async fn test_local_shell_captures_output() {
        let shell = LocalShell::new(Duration::from_secs(10));
        let output = shell.execute("echo hello; echo oops >&2").await.unwrap();

        assert!(output.success());
        assert_eq!(output.stdout.trim(), "hello");
        assert_eq!(output.stderr.trim(), "oops");
    }

    #[tokio::test]
    async fn test_local_shell_reports_exit_code() {
        let shell = LocalShell::new(Duration::from_secs(10));
        let output = shell.execute("exit 3").await.unwrap();

        assert_eq!(output.return_code, 3);
        assert!(!output.success());
        assert!(!output.timed_out());
    }

    #[tokio::test]
    async fn test_timeout_kills_process_group() {
        let shell = LocalShell::new(Duration::from_millis(300)).with_grace(Duration::from_millis(200));
        let running = shell.spawn("exec sleep 30").unwrap();
        let pgid = running.pgid();
        assert!(check_pg(pgid));

        let started = Instant::now();
        let output = running
            .finish(Duration::from_millis(300), Duration::from_millis(200))
            .await
            .unwrap();

        assert_eq!(output.return_code, TIMEOUT_RETURN_CODE);
        assert_eq!(output.stderr, TIMEOUT_ERROR_MESSAGE);
        assert!(output.timed_out());
        assert!(started.elapsed() < Duration::from_secs(10));
        assert!(!check_pg(pgid));
    }

    #[tokio::test]
    async fn test_background_child_holding_output_times_out() {
        let shell = LocalShell::new(Duration::from_millis(300));
        let running = shell.spawn("sleep 30 & echo started").unwrap();
        let pgid = running.pgid();

        let started = Instant::now();
        let output = running
            .finish(Duration::from_millis(300), Duration::from_millis(200))
            .await
            .unwrap();

        assert_eq!(output.return_code, TIMEOUT_RETURN_CODE);
        assert!(output.timed_out());
        assert!(started.elapsed() < Duration::from_secs(3));
        assert!(!check_pg(pgid));
    }

    #[tokio::test]
    async fn test_leftover_background_processes_are_killed() {
        let shell = LocalShell::new(Duration::from_secs(10));
        let running = shell.spawn("sleep 30 >/dev/null 2>&1 & echo started").unwrap();
        let pgid = running.pgid();

        let output = running
            .finish(Duration::from_secs(10), Duration::from_millis(200))
            .await
            .unwrap();

        assert!(output.success());
        assert_eq!(output.stdout.trim(), "started");
        assert!(!check_pg(pgid));
    }

    #[tokio::test]
    async fn test_signalled_command_is_not_a_timeout() {
        let shell = LocalShell::new(Duration::from_secs(10));
        let output = shell.execute("kill -HUP $$").await.unwrap();

        assert_eq!(output.return_code, 128 + Signal::SIGHUP as i32);
        assert!(!output.timed_out());
        assert!(!output.success());
    }

    #[tokio::test]
    async fn test_execute_times_out() {
        let shell = LocalShell::new(Duration::from_millis(200)).with_grace(Duration::from_millis(100));
        let output = shell.execute("exec sleep 30").await.unwrap();
        assert_eq!(output.return_code, TIMEOUT_RETURN_CODE);
    }

    #[tokio::test]
    async fn test_check_pg_false_for_finished_group() {
        let shell = LocalShell::new(Duration::from_secs(10));
        let running = shell.spawn("true").unwrap();
        let pgid = running.pgid();
        running
            .finish(Duration::from_secs(10), DEFAULT_KILL_GRACE)
            .await
            .unwrap();

        assert!(!check_pg(pgid));
    }

    #[tokio::test]
    async fn test_kill_pg_on_dead_group_returns() {
        let shell = LocalShell::new(Duration::from_secs(10));
        let running = shell.spawn("true").unwrap();
        let pgid = running.pgid();
        running
            .finish(Duration::from_secs(10), DEFAULT_KILL_GRACE)
            .await
            .unwrap();

        let started = Instant::now();
        kill_pg(pgid, Duration::from_secs(5)).await;
        // A dead group is detected by the first signal, without any grace wait
        assert!(started.elapsed() < Duration::from_secs(5));
        kill_pg(0, Duration::from_secs(5)).await;
        assert!(!check_pg(-1));
    }

    #[test]
    fn test_secure_shell_command_line() {
        let shell = SecureShell::new("cluster.example.org", Duration::from_secs(5))
            .with_user("galaxy")
            .with_port(2222)
            .with_identity_file("/etc/galaxy/id_rsa");

        let cmd = shell.command("qstat -x");
        let args: Vec<String> = cmd
            .get_args()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();

        assert_eq!(cmd.get_program(), "ssh");
        assert_eq!(
            args,
            vec![
                "-o",
                "BatchMode=yes",
                "-p",
                "2222",
                "-i",
                "/etc/galaxy/id_rsa",
                "galaxy@cluster.example.org",
                "--",
                "qstat -x",
            ]
        );
    }
}
