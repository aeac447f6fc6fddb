//! Session/process lifecycle engine: the session table, per-process output
//! pumps, and the terminate/escalate machinery around child shells.

mod manager;
mod process;
mod pump;
mod utf8;

pub use manager::SessionManager;
