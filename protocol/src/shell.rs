use serde::Deserialize;
use serde::Serialize;

use crate::session_id::SessionId;

/// One command's audit entry inside a session history: the prompt shown to
/// the caller, the command itself, and whatever the process printed while the
/// record was the newest one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsoleRecord {
    pub ps1: String,
    pub command: String,
    pub output: String,
}

/// Outcome of an `execute` call. A command that outlives the synchronous wait
/// budget is not an error; it is the expected fork point between synchronous
/// and asynchronous completion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ExecuteOutcome {
    Completed { returncode: i32, output: String },
    #[serde(rename = "running")]
    StillRunning,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecuteResult {
    pub session_id: SessionId,
    pub command: String,
    #[serde(flatten)]
    pub outcome: ExecuteOutcome,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadResult {
    pub session_id: SessionId,
    pub output: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub console_records: Vec<ConsoleRecord>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WaitResult {
    pub returncode: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WriteStatus {
    Success,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteResult {
    pub status: WriteStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KillStatus {
    Terminated,
    AlreadyTerminated,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KillResult {
    pub status: KillStatus,
    pub returncode: i32,
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn execute_result_flattens_outcome_status() {
        let result = ExecuteResult {
            session_id: SessionId::fresh(),
            command: "echo hi".to_string(),
            outcome: ExecuteOutcome::Completed {
                returncode: 0,
                output: "hi\n".to_string(),
            },
        };
        let json = serde_json::to_value(&result).expect("serialize");
        assert_eq!(json["status"], "completed");
        assert_eq!(json["returncode"], 0);
        assert_eq!(json["output"], "hi\n");
    }

    #[test]
    fn still_running_omits_returncode() {
        let result = ExecuteResult {
            session_id: SessionId::fresh(),
            command: "sleep 10".to_string(),
            outcome: ExecuteOutcome::StillRunning,
        };
        let json = serde_json::to_value(&result).expect("serialize");
        assert_eq!(json["status"], "running");
        assert!(json.get("returncode").is_none());
    }

    #[test]
    fn kill_status_uses_snake_case_wire_names() {
        let json = serde_json::to_value(KillResult {
            status: KillStatus::AlreadyTerminated,
            returncode: -1,
        })
        .expect("serialize");
        assert_eq!(json["status"], "already_terminated");
    }
}
