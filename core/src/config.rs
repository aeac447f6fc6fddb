use std::path::PathBuf;

const DEFAULT_SUPERVISOR_SOCKET: &str = "/tmp/supervisor.sock";

/// Environment-driven settings consumed by the core. The sandbox lifetime is
/// optional: leaving `SANDBOXD_TIMEOUT_MINUTES` unset disables the
/// self-destruct feature entirely.
#[derive(Debug, Clone)]
pub struct Config {
    pub run_timeout_minutes: Option<u64>,
    pub supervisor_socket_path: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            run_timeout_minutes: None,
            supervisor_socket_path: PathBuf::from(DEFAULT_SUPERVISOR_SOCKET),
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        let run_timeout_minutes = std::env::var("SANDBOXD_TIMEOUT_MINUTES")
            .ok()
            .and_then(|raw| raw.trim().parse::<u64>().ok());
        let supervisor_socket_path = std::env::var("SANDBOXD_SUPERVISOR_SOCKET")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_SUPERVISOR_SOCKET));
        Self {
            run_timeout_minutes,
            supervisor_socket_path,
        }
    }
}
