#![forbid(unsafe_code)]

//! `inferd` — single-host supervisor for multi-process inference serving
//! sessions.
//!
//! One session bootstraps and supervises a scheduler process (external
//! executable), a serving process (re-executed session binary hosting
//! the queue proxy), and the execution engine running in the calling
//! process. The crate owns process-lifecycle coordination only:
//! deterministic startup handoff, continuous liveness monitoring, and
//! escalating idempotent shutdown. Scheduling, inference, and the HTTP
//! surface are external collaborators behind narrow seams.

pub mod config;
pub mod engine;
pub mod errors;
pub mod handoff;
pub mod ipc;
pub mod serving;
pub mod session;

pub use config::GlobalConfig;
pub use errors::{Result, SessionError};
pub use session::Session;
