use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use sandboxd_protocol::ConsoleRecord;
use sandboxd_protocol::ExecuteOutcome;
use sandboxd_protocol::ExecuteResult;
use sandboxd_protocol::KillResult;
use sandboxd_protocol::KillStatus;
use sandboxd_protocol::ReadResult;
use sandboxd_protocol::SessionId;
use sandboxd_protocol::WaitResult;
use sandboxd_protocol::WriteResult;
use sandboxd_protocol::WriteStatus;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::debug;
use tracing::info;
use tracing::warn;

use crate::ansi::strip_ansi_escapes;
use crate::error::Result;
use crate::error::SandboxErr;
use crate::session::process;
use crate::session::process::SessionProcess;
use crate::session::pump;

/// Grace given to a session's previous process before the replacement spawn.
const REPLACE_GRACE: Duration = Duration::from_secs(1);
/// Grace given to SIGTERM on an explicit kill before escalating to SIGKILL.
const KILL_GRACE: Duration = Duration::from_secs(3);
/// Synchronous wait budget inside execute; past it the command keeps running
/// in the background and the caller polls via read/wait.
const EXEC_WAIT_BUDGET: Duration = Duration::from_secs(5);
/// How long execute lets the pump drain the final chunk of a completed
/// command before snapshotting the buffer.
const OUTPUT_DRAIN_GRACE: Duration = Duration::from_secs(1);
const DEFAULT_WAIT_SECS: u64 = 60;

/// Owns the session table and orchestrates spawn, pump, and escalation. One
/// instance per service; no process-wide state.
#[derive(Default)]
pub struct SessionManager {
    sessions: Mutex<HashMap<SessionId, Arc<Mutex<SessionState>>>>,
}

/// Mutable state of one session, behind its own lock so request handlers and
/// the pump task stay race-free under real parallelism.
pub(crate) struct SessionState {
    work_dir: PathBuf,
    output: String,
    records: Vec<ConsoleRecord>,
    process: SessionProcess,
    pump: Option<JoinHandle<()>>,
}

impl SessionState {
    fn new(work_dir: PathBuf, process: SessionProcess, record: ConsoleRecord) -> Self {
        Self {
            work_dir,
            output: String::new(),
            records: vec![record],
            process,
            pump: None,
        }
    }

    /// Appends pumped text to the cumulative buffer and to the newest console
    /// record. Older records are immutable once a new one has been pushed.
    pub(crate) fn append_output(&mut self, text: &str) {
        self.output.push_str(text);
        if let Some(record) = self.records.last_mut() {
            record.output.push_str(text);
        }
    }
}

impl SessionManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Generates a fresh opaque session token. The session itself is created
    /// lazily by the first `execute` against the id.
    pub fn create_session_id(&self) -> SessionId {
        let session_id = SessionId::fresh();
        info!(%session_id, "created new shell session id");
        session_id
    }

    /// Runs `command` in the session's shell. A new id spawns a fresh
    /// process; an existing id first terminates (escalating to SIGKILL) any
    /// still-running prior process, then replaces it and resets the buffer —
    /// a session never holds two live processes.
    pub async fn execute(
        &self,
        session_id: SessionId,
        work_dir: &str,
        command: &str,
    ) -> Result<ExecuteResult> {
        info!(%session_id, %command, "executing shell command");
        let work_dir = resolve_work_dir(work_dir)?;
        let record = ConsoleRecord {
            ps1: format_ps1(&work_dir),
            command: command.to_string(),
            output: String::new(),
        };

        let session = {
            let mut sessions = self.sessions.lock().await;
            match sessions.entry(session_id) {
                Entry::Occupied(entry) => Some(Arc::clone(entry.get())),
                Entry::Vacant(entry) => {
                    debug!(%session_id, "creating new shell session");
                    let spawned = process::spawn_shell(&work_dir, command)
                        .await
                        .map_err(|err| spawn_error(session_id, &err))?;
                    let state = Arc::new(Mutex::new(SessionState::new(
                        work_dir.clone(),
                        spawned.process,
                        record.clone(),
                    )));
                    state.lock().await.pump =
                        Some(pump::start(session_id, Arc::clone(&state), spawned.stdout));
                    entry.insert(Arc::clone(&state));
                    None
                }
            }
        };

        if let Some(session) = &session {
            let mut state = session.lock().await;
            if state.process.is_running() {
                debug!(%session_id, "terminating previous process before replacement");
                state.process.terminate(REPLACE_GRACE).await;
            }
            // The old pump dies with its process; stop it explicitly before
            // the replacement starts so it can never append to the new
            // buffer.
            if let Some(pump) = state.pump.take() {
                pump.abort();
            }
            let spawned = process::spawn_shell(&work_dir, command)
                .await
                .map_err(|err| spawn_error(session_id, &err))?;
            state.work_dir = work_dir;
            state.output.clear();
            state.records.push(record);
            state.process = spawned.process;
            state.pump = Some(pump::start(session_id, Arc::clone(session), spawned.stdout));
        }

        let session = self.session(session_id).await?;
        let exit = { session.lock().await.process.exit_watch() };
        let outcome = match tokio::time::timeout(EXEC_WAIT_BUDGET, exit.exited()).await {
            Ok(returncode) => {
                debug!(%session_id, returncode, "command completed within wait budget");
                self.drain_pump(&session).await;
                let output = {
                    let state = session.lock().await;
                    strip_ansi_escapes(&state.output)
                };
                ExecuteOutcome::Completed { returncode, output }
            }
            Err(_) => {
                // Expected fork point, not an error: the process and its pump
                // keep running in the background.
                debug!(%session_id, "command still running past wait budget");
                ExecuteOutcome::StillRunning
            }
        };

        Ok(ExecuteResult {
            session_id,
            command: command.to_string(),
            outcome,
        })
    }

    /// Returns the ANSI-stripped cumulative buffer, plus the stripped history
    /// when `include_history` is set.
    pub async fn read_output(
        &self,
        session_id: SessionId,
        include_history: bool,
    ) -> Result<ReadResult> {
        let session = self.session(session_id).await?;
        let state = session.lock().await;
        let output = strip_ansi_escapes(&state.output);
        let console_records = if include_history {
            clean_records(&state.records)
        } else {
            Vec::new()
        };
        Ok(ReadResult {
            session_id,
            output,
            console_records,
        })
    }

    /// Full ANSI-stripped history for a session.
    pub async fn console_records(&self, session_id: SessionId) -> Result<Vec<ConsoleRecord>> {
        let session = self.session(session_id).await?;
        let state = session.lock().await;
        Ok(clean_records(&state.records))
    }

    /// Writes caller input to the session's stdin. The text is synthesized
    /// into the buffer and active record as local echo; we never read the
    /// shell's own echo back, callers just see their input immediately.
    pub async fn write_input(
        &self,
        session_id: SessionId,
        text: &str,
        press_enter: bool,
    ) -> Result<WriteResult> {
        debug!(%session_id, press_enter, "writing to shell session stdin");
        let session = self.session(session_id).await?;
        let mut state = session.lock().await;
        if !state.process.is_running() {
            return Err(SandboxErr::bad_request(
                "process has already exited, cannot write input",
            ));
        }

        let mut payload = text.to_string();
        if press_enter {
            payload.push('\n');
        }
        state.append_output(&payload);
        state
            .process
            .write_stdin(payload.as_bytes())
            .await
            .map_err(|err| {
                warn!(%session_id, error = %err, "writing to process stdin failed");
                SandboxErr::internal(format!("failed to write to process stdin: {err}"))
            })?;
        Ok(WriteResult {
            status: WriteStatus::Success,
        })
    }

    /// Blocks until the session's process exits or `seconds` elapse. Timing
    /// out is a caller-visible failure distinct from exit; the process keeps
    /// running.
    pub async fn wait(&self, session_id: SessionId, seconds: Option<u64>) -> Result<WaitResult> {
        let seconds = match seconds {
            None | Some(0) => DEFAULT_WAIT_SECS,
            Some(seconds) => seconds,
        };
        debug!(%session_id, seconds, "waiting for session process");
        let session = self.session(session_id).await?;
        let exit = { session.lock().await.process.exit_watch() };
        match tokio::time::timeout(Duration::from_secs(seconds), exit.exited()).await {
            Ok(returncode) => {
                info!(%session_id, returncode, "session process completed");
                Ok(WaitResult { returncode })
            }
            Err(_) => Err(SandboxErr::bad_request(format!(
                "timed out waiting for session process after {seconds}s"
            ))),
        }
    }

    /// Terminates the session's process, escalating SIGTERM to SIGKILL after
    /// the grace period. Idempotent: an already-dead process reports
    /// `already_terminated` with the same return code.
    pub async fn kill(&self, session_id: SessionId) -> Result<KillResult> {
        let session = self.session(session_id).await?;
        let mut state = session.lock().await;
        if state.process.is_running() {
            info!(%session_id, "terminating session process");
            let returncode = state.process.terminate(KILL_GRACE).await;
            // The pump drains the final bytes and stops at EOF on its own;
            // only the session replacement path aborts it.
            state.pump.take();
            Ok(KillResult {
                status: KillStatus::Terminated,
                returncode,
            })
        } else {
            let returncode = state.process.exit_code().unwrap_or(-1);
            info!(%session_id, returncode, "session process already terminated");
            Ok(KillResult {
                status: KillStatus::AlreadyTerminated,
                returncode,
            })
        }
    }

    async fn session(&self, session_id: SessionId) -> Result<Arc<Mutex<SessionState>>> {
        self.sessions
            .lock()
            .await
            .get(&session_id)
            .cloned()
            .ok_or_else(|| SandboxErr::not_found(format!("unknown shell session: {session_id}")))
    }

    /// Gives the pump a bounded window to flush the final chunk of a finished
    /// process before the caller snapshots the buffer.
    async fn drain_pump(&self, session: &Arc<Mutex<SessionState>>) {
        let pump = { session.lock().await.pump.take() };
        if let Some(mut pump) = pump {
            if tokio::time::timeout(OUTPUT_DRAIN_GRACE, &mut pump)
                .await
                .is_err()
            {
                // Still reading; put it back and let it finish on its own.
                let mut state = session.lock().await;
                if state.pump.is_none() {
                    state.pump = Some(pump);
                }
            }
        }
    }
}

fn spawn_error(session_id: SessionId, err: &std::io::Error) -> SandboxErr {
    warn!(%session_id, error = %err, "failed to spawn shell process");
    SandboxErr::internal(format!("failed to spawn shell process: {err}"))
}

fn clean_records(records: &[ConsoleRecord]) -> Vec<ConsoleRecord> {
    records
        .iter()
        .map(|record| ConsoleRecord {
            ps1: record.ps1.clone(),
            command: record.command.clone(),
            output: strip_ansi_escapes(&record.output),
        })
        .collect()
}

/// Blank work dirs resolve to the caller's home directory; anything else must
/// already exist on disk.
fn resolve_work_dir(work_dir: &str) -> Result<PathBuf> {
    let trimmed = work_dir.trim();
    let resolved = if trimmed.is_empty() {
        dirs::home_dir().unwrap_or_else(|| PathBuf::from("/"))
    } else {
        PathBuf::from(trimmed)
    };
    if !resolved.exists() {
        return Err(SandboxErr::bad_request(format!(
            "working directory does not exist: {}",
            resolved.display()
        )));
    }
    Ok(resolved)
}

/// `user@host:~/dir $`, with the home directory folded to `~`.
fn format_ps1(work_dir: &Path) -> String {
    format!("{}@{}:{} $", username(), hostname(), display_path(work_dir))
}

fn display_path(path: &Path) -> String {
    if let Some(home) = dirs::home_dir() {
        if let Ok(relative) = path.strip_prefix(&home) {
            return if relative.as_os_str().is_empty() {
                "~".to_string()
            } else {
                format!("~/{}", relative.display())
            };
        }
    }
    path.display().to_string()
}

fn username() -> String {
    std::env::var("USER")
        .or_else(|_| std::env::var("LOGNAME"))
        .unwrap_or_else(|_| "root".to_string())
}

fn hostname() -> String {
    std::fs::read_to_string("/proc/sys/kernel/hostname")
        .or_else(|_| std::fs::read_to_string("/etc/hostname"))
        .map(|raw| raw.trim().to_string())
        .or_else(|_| std::env::var("HOSTNAME"))
        .unwrap_or_else(|_| "sandbox".to_string())
}
