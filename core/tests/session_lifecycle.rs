#![cfg(unix)]

use std::time::Duration;

use assert_matches::assert_matches;
use pretty_assertions::assert_eq;
use sandboxd_core::SandboxErr;
use sandboxd_core::SessionManager;
use sandboxd_protocol::ExecuteOutcome;
use sandboxd_protocol::KillStatus;
use sandboxd_protocol::WriteStatus;

const TMP: &str = "/tmp";

#[tokio::test]
async fn short_command_completes_with_merged_output() {
    let manager = SessionManager::new();
    let session_id = manager.create_session_id();
    let result = manager
        .execute(session_id, TMP, "echo out; echo err >&2")
        .await
        .expect("execute");
    assert_eq!(result.session_id, session_id);
    match result.outcome {
        ExecuteOutcome::Completed { returncode, output } => {
            assert_eq!(returncode, 0);
            assert_eq!(output, "out\nerr\n");
        }
        ExecuteOutcome::StillRunning => panic!("short command must complete"),
    }
}

#[tokio::test]
async fn ansi_escapes_are_stripped_from_results() {
    let manager = SessionManager::new();
    let session_id = manager.create_session_id();
    let result = manager
        .execute(session_id, TMP, r"printf '\033[31mred\033[0m\n'")
        .await
        .expect("execute");
    assert_matches!(
        result.outcome,
        ExecuteOutcome::Completed { returncode: 0, ref output } if output == "red\n"
    );
    let read = manager.read_output(session_id, false).await.expect("read");
    assert_eq!(read.output, "red\n");
}

#[tokio::test]
async fn interactive_session_reports_running_and_accepts_input() {
    let manager = SessionManager::new();
    let session_id = manager.create_session_id();
    let result = manager
        .execute(session_id, TMP, "read -r line && echo \"got:$line\"")
        .await
        .expect("execute");
    assert_matches!(result.outcome, ExecuteOutcome::StillRunning);

    let written = manager
        .write_input(session_id, "ping", true)
        .await
        .expect("write");
    assert_eq!(written.status, WriteStatus::Success);

    // Synthesized local echo lands in the buffer immediately, before the
    // process produces anything.
    let read = manager.read_output(session_id, false).await.expect("read");
    assert!(read.output.contains("ping\n"), "buffer: {:?}", read.output);

    let waited = manager.wait(session_id, Some(10)).await.expect("wait");
    assert_eq!(waited.returncode, 0);
    // Exit is observed by wait before the pump flushes the final chunk.
    tokio::time::sleep(Duration::from_millis(300)).await;
    let read = manager.read_output(session_id, false).await.expect("read");
    assert!(read.output.contains("got:ping"), "buffer: {:?}", read.output);
}

#[tokio::test]
async fn wait_timeout_is_distinct_from_exit_and_kill_is_idempotent() {
    let manager = SessionManager::new();
    let session_id = manager.create_session_id();
    let result = manager
        .execute(session_id, TMP, "sleep 30")
        .await
        .expect("execute");
    assert_matches!(result.outcome, ExecuteOutcome::StillRunning);

    // Timing out the wait must leave the process running.
    let err = manager.wait(session_id, Some(1)).await.expect_err("timeout");
    assert_matches!(err, SandboxErr::BadRequest(_));

    let killed = manager.kill(session_id).await.expect("kill");
    assert_eq!(killed.status, KillStatus::Terminated);
    assert_eq!(killed.returncode, 128 + libc::SIGTERM);

    let again = manager.kill(session_id).await.expect("second kill");
    assert_eq!(again.status, KillStatus::AlreadyTerminated);
    assert_eq!(again.returncode, killed.returncode);
}

#[tokio::test]
async fn replacement_resets_buffer_and_keeps_history() {
    let manager = SessionManager::new();
    let session_id = manager.create_session_id();
    let first = manager
        .execute(session_id, TMP, "echo one")
        .await
        .expect("first execute");
    assert_matches!(
        first.outcome,
        ExecuteOutcome::Completed { ref output, .. } if output == "one\n"
    );

    let second = manager
        .execute(session_id, TMP, "echo two")
        .await
        .expect("second execute");
    assert_matches!(
        second.outcome,
        ExecuteOutcome::Completed { ref output, .. } if output == "two\n"
    );

    let read = manager.read_output(session_id, true).await.expect("read");
    assert_eq!(read.output, "two\n");
    assert_eq!(read.console_records.len(), 2);
    assert_eq!(read.console_records[0].command, "echo one");
    assert_eq!(read.console_records[0].output, "one\n");
    assert_eq!(read.console_records[1].command, "echo two");
}

#[tokio::test]
async fn replacement_terminates_a_still_running_process() {
    let manager = SessionManager::new();
    let session_id = manager.create_session_id();
    let running = manager
        .execute(session_id, TMP, "sleep 30")
        .await
        .expect("first execute");
    assert_matches!(running.outcome, ExecuteOutcome::StillRunning);

    let replaced = manager
        .execute(session_id, TMP, "echo fresh")
        .await
        .expect("replacement execute");
    assert_matches!(
        replaced.outcome,
        ExecuteOutcome::Completed { returncode: 0, ref output } if output == "fresh\n"
    );
}

#[tokio::test]
async fn unknown_session_id_is_not_found() {
    let manager = SessionManager::new();
    let session_id = manager.create_session_id();
    let err = manager
        .read_output(session_id, false)
        .await
        .expect_err("no session yet");
    assert_matches!(err, SandboxErr::NotFound(_));
    let err = manager.wait(session_id, None).await.expect_err("no session");
    assert_matches!(err, SandboxErr::NotFound(_));
    let err = manager.kill(session_id).await.expect_err("no session");
    assert_matches!(err, SandboxErr::NotFound(_));
}

#[tokio::test]
async fn write_to_exited_process_is_rejected() {
    let manager = SessionManager::new();
    let session_id = manager.create_session_id();
    let result = manager
        .execute(session_id, TMP, "true")
        .await
        .expect("execute");
    assert_matches!(result.outcome, ExecuteOutcome::Completed { returncode: 0, .. });
    let err = manager
        .write_input(session_id, "late", true)
        .await
        .expect_err("process is gone");
    assert_matches!(err, SandboxErr::BadRequest(_));
}

#[tokio::test]
async fn missing_work_dir_is_rejected_before_spawn() {
    let manager = SessionManager::new();
    let session_id = manager.create_session_id();
    let err = manager
        .execute(session_id, "/definitely/not/a/dir", "true")
        .await
        .expect_err("must fail");
    assert_matches!(err, SandboxErr::BadRequest(_));
    // The failed execute must not have created the session.
    let err = manager.read_output(session_id, false).await.expect_err("no session");
    assert_matches!(err, SandboxErr::NotFound(_));
}

#[tokio::test]
async fn read_output_grows_monotonically_until_replacement() {
    let manager = SessionManager::new();
    let session_id = manager.create_session_id();
    let result = manager
        .execute(session_id, TMP, "echo first; sleep 6; echo second")
        .await
        .expect("execute");
    assert_matches!(result.outcome, ExecuteOutcome::StillRunning);

    let early = manager.read_output(session_id, false).await.expect("read");
    assert_eq!(early.output, "first\n");

    manager.wait(session_id, Some(10)).await.expect("wait");
    tokio::time::sleep(Duration::from_millis(300)).await;
    let late = manager.read_output(session_id, false).await.expect("read");
    assert!(late.output.starts_with(&early.output));
    assert!(late.output.contains("second\n"));
}
