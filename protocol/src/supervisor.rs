use chrono::DateTime;
use chrono::Utc;
use serde::Deserialize;
use serde::Serialize;

/// One process entry as reported by the local supervisor daemon's
/// `getAllProcessInfo` call. Field names mirror the daemon's payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessInfo {
    pub name: String,
    pub group: String,
    pub description: String,
    pub start: i64,
    pub stop: i64,
    pub now: i64,
    pub state: i64,
    pub statename: String,
    pub spawnerr: String,
    pub exitstatus: i64,
    pub logfile: String,
    pub stdout_logfile: String,
    pub stderr_logfile: String,
    pub pid: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SupervisorActionResult {
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop_result: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_result: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shutdown_result: Option<serde_json::Value>,
}

impl SupervisorActionResult {
    pub fn with_status(status: &str) -> Self {
        Self {
            status: status.to_string(),
            result: None,
            stop_result: None,
            start_result: None,
            shutdown_result: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeoutEvent {
    TimeoutActivated,
    TimeoutExtended,
    TimeoutCancelled,
    NoTimeoutActive,
}

/// Self-destruct deadline as reported to callers. `shutdown_time` is wall
/// clock for display; the scheduler itself runs on the monotonic clock.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeoutStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<TimeoutEvent>,
    pub active: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shutdown_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_minutes: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remaining_seconds: Option<f64>,
}

impl TimeoutStatus {
    pub fn inactive(status: Option<TimeoutEvent>) -> Self {
        Self {
            status,
            active: false,
            shutdown_time: None,
            timeout_minutes: None,
            remaining_seconds: None,
        }
    }
}
