//! # evloop-core
//!
//! Core types and traits for the evloop dispatcher.
//!
//! This crate is platform-agnostic and contains no OS-specific code.
//! Backends, timers and the dispatch loop live in `evloop-runtime`.
//!
//! ## Modules
//!
//! - `events` - Readiness interest / trigger mask
//! - `delegate` - Callback delegates dispatched by the loop
//! - `traits` - Frame-readiness and pending-fd collaborator interfaces
//! - `error` - Error types
//! - `kprint` - Kernel-style debug printing macros (and `bug_exit!`)
//! - `env` - Environment variable utilities

pub mod events;
pub mod delegate;
pub mod traits;
pub mod error;
pub mod kprint;
pub mod env;

// Re-exports for convenience
pub use events::PollEvents;
pub use delegate::{CallbackDelegate, PollEventDelegate};
pub use traits::{FrameSource, PendingFd};
pub use error::{LoopError, LoopResult};
pub use env::{env_get, env_get_bool, env_get_opt};

cfg_if::cfg_if! {
    if #[cfg(unix)] {
        /// Raw OS descriptor as handed to the backends
        pub type RawFd = std::os::unix::io::RawFd;
    } else {
        /// Raw OS descriptor as handed to the backends
        pub type RawFd = i32;
    }
}

/// Constants shared by the front end and every backend
pub mod constants {
    use super::RawFd;

    /// Descriptor value of an uninitialized file source
    pub const FD_NONE: RawFd = -1;

    /// Nanoseconds per millisecond
    pub const NSEC_PER_MSEC: u64 = 1_000_000;

    /// Nanoseconds per second
    pub const NSEC_PER_SEC: u64 = 1_000_000_000;
}
