//! Wire-facing data model shared between the sandbox control-plane core and
//! the HTTP layer that fronts it. Everything here serializes with serde; the
//! core never depends on how the outer layer frames its envelopes.

mod session_id;
mod shell;
mod supervisor;

pub use session_id::SessionId;
pub use shell::ConsoleRecord;
pub use shell::ExecuteOutcome;
pub use shell::ExecuteResult;
pub use shell::KillResult;
pub use shell::KillStatus;
pub use shell::ReadResult;
pub use shell::WaitResult;
pub use shell::WriteResult;
pub use shell::WriteStatus;
pub use supervisor::ProcessInfo;
pub use supervisor::SupervisorActionResult;
pub use supervisor::TimeoutEvent;
pub use supervisor::TimeoutStatus;
