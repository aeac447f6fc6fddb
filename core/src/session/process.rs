#[cfg(unix)]
use std::os::unix::process::ExitStatusExt;

use std::io;
use std::path::Path;
use std::process::ExitStatus;
use std::process::Stdio;
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::process::ChildStdin;
use tokio::process::ChildStdout;
use tokio::process::Command;
use tokio::sync::watch;
use tracing::debug;
use tracing::warn;

const SHELL_PROGRAM: &str = "/bin/bash";

// Conventional shell encoding for signal deaths: 128 + signal.
const EXIT_CODE_SIGNAL_BASE: i32 = 128;

#[cfg(unix)]
use libc::SIGKILL;
#[cfg(unix)]
use libc::SIGTERM;
#[cfg(not(unix))]
const SIGTERM: i32 = 15;
#[cfg(not(unix))]
const SIGKILL: i32 = 9;

/// Freshly spawned shell process. The pump takes `stdout`; the session keeps
/// the rest.
pub(crate) struct SpawnedProcess {
    pub(crate) process: SessionProcess,
    pub(crate) stdout: ChildStdout,
}

/// The session-owned side of a child process. The `Child` itself lives in a
/// reaper task that publishes the exit code through a watch channel, so no
/// caller ever holds a session lock across `Child::wait`.
#[derive(Debug)]
pub(crate) struct SessionProcess {
    pid: Option<u32>,
    stdin: Option<ChildStdin>,
    exit: ExitWatch,
}

#[derive(Debug, Clone)]
pub(crate) struct ExitWatch {
    rx: watch::Receiver<Option<i32>>,
}

impl ExitWatch {
    pub(crate) fn code(&self) -> Option<i32> {
        *self.rx.borrow()
    }

    /// Resolves with the exit code once the process has exited.
    pub(crate) async fn exited(&self) -> i32 {
        let mut rx = self.rx.clone();
        loop {
            if let Some(code) = *rx.borrow_and_update() {
                return code;
            }
            if rx.changed().await.is_err() {
                // Reaper gone without publishing; treat as a killed process.
                return (*rx.borrow()).unwrap_or(-1);
            }
        }
    }
}

/// Spawns `/bin/bash -c <command>` in `work_dir` with piped stdin/stdout.
/// The shell folds stderr into stdout (`exec 2>&1`) so a single output pump
/// sees the merged stream.
pub(crate) async fn spawn_shell(work_dir: &Path, command: &str) -> io::Result<SpawnedProcess> {
    debug!(%command, work_dir = %work_dir.display(), "spawning shell process");
    let script = format!("exec 2>&1\n{command}");
    let mut child = Command::new(SHELL_PROGRAM)
        .arg("-c")
        .arg(script)
        .current_dir(work_dir)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()?;

    let stdin = child
        .stdin
        .take()
        .ok_or_else(|| io::Error::other("stdin pipe was unexpectedly not available"))?;
    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| io::Error::other("stdout pipe was unexpectedly not available"))?;
    let pid = child.id();

    let (exit_tx, exit_rx) = watch::channel(None);
    tokio::spawn(async move {
        let code = match child.wait().await {
            Ok(status) => exit_code(status),
            Err(err) => {
                warn!(error = %err, "waiting on child process failed");
                -1
            }
        };
        let _ = exit_tx.send(Some(code));
    });

    Ok(SpawnedProcess {
        process: SessionProcess {
            pid,
            stdin: Some(stdin),
            exit: ExitWatch { rx: exit_rx },
        },
        stdout,
    })
}

impl SessionProcess {
    pub(crate) fn exit_code(&self) -> Option<i32> {
        self.exit.code()
    }

    pub(crate) fn is_running(&self) -> bool {
        self.exit.code().is_none()
    }

    pub(crate) fn exit_watch(&self) -> ExitWatch {
        self.exit.clone()
    }

    /// Writes and flushes bytes to the process's stdin. The caller has already
    /// checked the process is alive; a broken pipe still surfaces as an error.
    pub(crate) async fn write_stdin(&mut self, bytes: &[u8]) -> io::Result<()> {
        let stdin = self
            .stdin
            .as_mut()
            .ok_or_else(|| io::Error::other("stdin pipe is no longer available"))?;
        stdin.write_all(bytes).await?;
        stdin.flush().await
    }

    /// Graceful terminate with escalation: SIGTERM, wait up to `grace`, then
    /// SIGKILL. Resolves with the exit code once the process is confirmed
    /// dead. A process that already exited just reports its code.
    pub(crate) async fn terminate(&self, grace: Duration) -> i32 {
        if let Some(code) = self.exit.code() {
            return code;
        }
        self.signal(SIGTERM);
        if let Ok(code) = tokio::time::timeout(grace, self.exit.exited()).await {
            return code;
        }
        warn!(pid = ?self.pid, "graceful terminate timed out, force killing");
        self.signal(SIGKILL);
        self.exit.exited().await
    }

    #[cfg(unix)]
    fn signal(&self, signal: i32) {
        if let Some(pid) = self.pid {
            // The reaper task still owns the Child and will collect the exit
            // status, so a direct signal cannot leave a zombie behind.
            unsafe {
                libc::kill(pid as i32, signal);
            }
        }
    }

    #[cfg(not(unix))]
    fn signal(&self, _signal: i32) {}
}

#[cfg(unix)]
fn exit_code(status: ExitStatus) -> i32 {
    status.code().unwrap_or_else(|| {
        status
            .signal()
            .map(|signal| EXIT_CODE_SIGNAL_BASE + signal)
            .unwrap_or(-1)
    })
}

#[cfg(not(unix))]
fn exit_code(status: ExitStatus) -> i32 {
    status.code().unwrap_or(-1)
}
