//! # evloop-runtime
//!
//! Platform backends, timers and the dispatch loop for evloop.
//!
//! This crate provides:
//! - `EventLoop`: single-threaded dispatch loop with a high-priority frame
//!   source, fd sources and timers
//! - `Timer` / `TimerFlags`: one-shot and fixed-rate repeating timers
//! - `EventLoopFileSource`: readiness watch on a descriptor
//! - The process-wide main loop (`init_main_event_loop`, `run_main_event_loop`)
//! - `LoopConfig`: dispatcher configuration from the environment
//!
//! The native backend (epoll + timerfd on Linux, poll(2) + a timer heap on
//! other Unix systems or with the `poll-backend` feature) is chosen at
//! build time and is not part of the public API.

pub mod config;
pub mod clock;
mod backend;
pub mod timer;
pub mod event_loop;
pub mod source;
pub mod main_loop;

#[cfg(test)]
mod test_util;

// Re-exports
pub use config::LoopConfig;
pub use event_loop::{EventLoop, LoopState, LoopStats};
pub use timer::{Timer, TimerFlags};
pub use source::EventLoopFileSource;
pub use main_loop::{
    init_main_event_loop, main_event_loop, request_stop, run_main_event_loop,
    try_main_event_loop,
};
