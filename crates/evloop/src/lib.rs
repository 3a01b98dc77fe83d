//! # evloop - single-threaded event loop
//!
//! Multiplexes file-descriptor readiness, one-shot and repeating timers, and
//! a display frame clock on one dispatch thread.
//!
//! ## Features
//!
//! - **Timers**: nanosecond-resolution one-shot and fixed-rate repeating
//!   timers, with an optional hint to keep native resources across reschedules
//! - **File sources**: level-triggered readiness callbacks that can change
//!   their interest mask in place or deregister by returning `false`
//! - **Frame source**: a high-priority frame clock serviced before any I/O
//!   or timer callback of the same pass
//! - **Deterministic teardown**: nothing fires after `deinit`/drop
//!
//! ## Quick Start
//!
//! ```ignore
//! use evloop::{init_main_event_loop, run_main_event_loop, request_stop};
//! use evloop::{EventLoopFileSource, PollEvents, Timer, TimerFlags};
//!
//! fn main() -> Result<(), evloop::LoopError> {
//!     let event_loop = init_main_event_loop()?;
//!
//!     let mut tick = Timer::new();
//!     tick.callback_after_ms(|| println!("tick"), 5, 5, &event_loop, TimerFlags::HINT_NONE)?;
//!
//!     let mut quit = Timer::new();
//!     quit.callback_after_sec(request_stop, 1, 0, &event_loop, TimerFlags::HINT_NONE)?;
//!
//!     let mut stdin = EventLoopFileSource::new();
//!     stdin.init(0, |fd, events| {
//!         println!("fd {} ready: {:?}", fd, events);
//!         false
//!     }, PollEvents::READ, &event_loop)?;
//!
//!     run_main_event_loop(None)
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      User Code                              │
//! │         Timer, EventLoopFileSource, FrameSource             │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      EventLoop                              │
//! │   registration tables, frame band, dispatch pass            │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                   Platform backend                          │
//! │   epoll + timerfd (Linux) │ poll(2) + timer heap (Unix)      │
//! └─────────────────────────────────────────────────────────────┘
//! ```

// Re-export core types
pub use evloop_core::{
    CallbackDelegate,
    FrameSource,
    LoopError,
    LoopResult,
    PendingFd,
    PollEventDelegate,
    PollEvents,
    RawFd,
};
pub use evloop_core::constants::FD_NONE;

// Re-export kprint macros for debug logging
pub use evloop_core::{kprint, kprintln, kerror, kwarn, kinfo, kdebug, ktrace, bug_exit};
pub use evloop_core::kprint::{LogLevel, init as init_logging, set_log_level, set_flush_enabled};

// Re-export env utilities
pub use evloop_core::{env_get, env_get_bool, env_get_opt};

// Re-export runtime types
pub use evloop_runtime::{
    LoopConfig,
    EventLoop,
    LoopState,
    LoopStats,
    Timer,
    TimerFlags,
    EventLoopFileSource,
    init_main_event_loop,
    main_event_loop,
    try_main_event_loop,
    run_main_event_loop,
    request_stop,
};
pub use evloop_runtime::clock::now_ns;

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::rc::Rc;
    use std::time::Duration;

    #[test]
    fn test_facade_timer_and_stop() {
        let event_loop = EventLoop::with_config(LoopConfig::default().max_events(8)).unwrap();
        let fired = Rc::new(Cell::new(0u32));
        let f = fired.clone();
        let stopper = event_loop.clone();

        let mut timer = Timer::new();
        timer
            .callback_after_ms(
                move || {
                    f.set(f.get() + 1);
                    if f.get() == 2 {
                        stopper.request_stop();
                    }
                },
                1,
                1,
                &event_loop,
                TimerFlags::HINT_NONE,
            )
            .unwrap();

        event_loop.run().unwrap();
        assert_eq!(fired.get(), 2);
        timer.deinit();

        assert_eq!(event_loop.dispatch(Some(Duration::from_millis(5))).unwrap(), 0);
    }

    #[test]
    fn test_uninitialized_fd_constant() {
        assert_eq!(EventLoopFileSource::new().fd(), FD_NONE);
    }
}
