use std::sync::Arc;

use sandboxd_protocol::SessionId;
use tokio::io::AsyncReadExt;
use tokio::process::ChildStdout;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::debug;
use tracing::warn;

use crate::session::manager::SessionState;
use crate::session::utf8::Utf8Decoder;

// Bytes per read from the merged stdout stream.
const READ_CHUNK_SIZE: usize = 4096;

/// Starts the output pump for one live process: drain stdout in chunks,
/// decode incrementally, append to the session buffer and the newest console
/// record. The task ends silently at EOF and logs-then-exits on read errors;
/// it never propagates failures.
pub(crate) fn start(
    session_id: SessionId,
    state: Arc<Mutex<SessionState>>,
    mut stdout: ChildStdout,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut decoder = Utf8Decoder::default();
        let mut buf = [0u8; READ_CHUNK_SIZE];
        loop {
            match stdout.read(&mut buf).await {
                Ok(0) => break,
                Ok(n) => {
                    let text = decoder.decode(&buf[..n]);
                    if text.is_empty() {
                        continue;
                    }
                    state.lock().await.append_output(&text);
                }
                Err(err) => {
                    warn!(%session_id, error = %err, "reading process output failed");
                    break;
                }
            }
        }
        let tail = decoder.finish();
        if !tail.is_empty() {
            state.lock().await.append_output(&tail);
        }
        debug!(%session_id, "output pump finished");
    })
}
