//! Control-plane core for a remote sandbox: long-lived shell sessions with
//! asynchronously pumped output, a single cancellable self-destruct deadline,
//! and an RPC bridge to the local process-supervisor daemon.
//!
//! The HTTP surface, request validation, and response envelopes live in the
//! service layer on top of this crate; nothing here persists across restarts.

mod ansi;
mod config;
mod error;
pub mod session;
#[cfg(unix)]
pub mod supervisor;
pub mod timeout;

pub use ansi::strip_ansi_escapes;
pub use config::Config;
pub use error::Result;
pub use error::SandboxErr;
pub use session::SessionManager;
#[cfg(unix)]
pub use supervisor::SupervisorBridge;
pub use timeout::ShutdownHook;
pub use timeout::TimeoutScheduler;
