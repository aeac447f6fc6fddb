//! HTTP-over-Unix-socket transport for the supervisor daemon's RPC endpoint.
//! The `Host` header is a dummy; the real addressing is the filesystem path.

use std::io;
use std::path::Path;
use std::path::PathBuf;
use std::time::Duration;

use tokio::io::AsyncReadExt;
use tokio::io::AsyncWriteExt;
use tokio::net::UnixStream;
use tracing::trace;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
const RESPONSE_TIMEOUT: Duration = Duration::from_secs(30);

pub(crate) struct UnixRpcTransport {
    socket_path: PathBuf,
}

impl UnixRpcTransport {
    pub(crate) fn new(socket_path: &Path) -> Self {
        Self {
            socket_path: socket_path.to_path_buf(),
        }
    }

    /// POSTs `body` to the daemon's RPC endpoint over a fresh connection and
    /// returns the response body. One request per connection; the daemon
    /// closes after replying.
    pub(crate) async fn post(&self, body: &str) -> io::Result<String> {
        let mut stream = tokio::time::timeout(CONNECT_TIMEOUT, UnixStream::connect(&self.socket_path))
            .await
            .map_err(|_| {
                io::Error::new(
                    io::ErrorKind::TimedOut,
                    format!("timed out connecting to {}", self.socket_path.display()),
                )
            })??;
        trace!(socket = %self.socket_path.display(), bytes = body.len(), "sending RPC request");

        let request = format!(
            "POST /RPC2 HTTP/1.1\r\n\
             Host: localhost\r\n\
             Content-Type: text/xml\r\n\
             Content-Length: {}\r\n\
             Connection: close\r\n\
             \r\n\
             {body}",
            body.len()
        );
        stream.write_all(request.as_bytes()).await?;
        stream.flush().await?;

        let mut raw = Vec::new();
        tokio::time::timeout(RESPONSE_TIMEOUT, stream.read_to_end(&mut raw))
            .await
            .map_err(|_| {
                io::Error::new(io::ErrorKind::TimedOut, "timed out awaiting RPC response")
            })??;
        parse_http_response(&raw)
    }
}

/// Splits a `Connection: close` style response into status and body, keeping
/// only as much body as the `Content-Length` header promises.
fn parse_http_response(raw: &[u8]) -> io::Result<String> {
    let text = String::from_utf8_lossy(raw);
    let (head, body) = text.split_once("\r\n\r\n").ok_or_else(|| {
        io::Error::new(io::ErrorKind::InvalidData, "response has no header terminator")
    })?;
    let status_line = head.lines().next().unwrap_or_default();
    let status_code = status_line.split_whitespace().nth(1).unwrap_or_default();
    if status_code != "200" {
        return Err(io::Error::other(format!(
            "RPC endpoint returned: {status_line}"
        )));
    }
    let content_length = head
        .lines()
        .filter_map(|line| line.split_once(':'))
        .find(|(name, _)| name.eq_ignore_ascii_case("content-length"))
        .and_then(|(_, value)| value.trim().parse::<usize>().ok());
    let body = match content_length {
        Some(length) => body.get(..length).unwrap_or(body),
        None => body,
    };
    Ok(body.to_string())
}
