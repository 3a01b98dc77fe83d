//! Native dispatcher backends
//!
//! Every platform provides the same capability set behind `Backend`:
//! descriptor registration, timer objects, and a blocking wait that reports
//! what became ready. Exactly one backend is compiled in as
//! `PlatformBackend`; nothing outside this crate can name it.
//!
//! ```text
//!                     EventLoop (front end)
//!                           │
//!                           ▼
//!               ┌───────────────────────┐
//!               │    PlatformBackend    │  ◄── chosen at build time
//!               └───────────────────────┘
//!                           │
//!            ┌──────────────┴──────────────┐
//!            ▼                             ▼
//!      EpollBackend                   PollBackend
//!   epoll + timerfd (Linux)      poll(2) + TimerHeap (Unix)
//! ```

use std::time::{Duration, Instant};

use evloop_core::{LoopResult, PollEvents, RawFd};

use crate::config::LoopConfig;

// Both compile (and are tested) on Linux; only one is `PlatformBackend`
#[cfg(target_os = "linux")]
#[cfg_attr(feature = "poll-backend", allow(dead_code))]
pub(crate) mod epoll;
#[cfg(unix)]
#[cfg_attr(all(target_os = "linux", not(feature = "poll-backend")), allow(dead_code))]
pub(crate) mod poll;

/// Registration token, unique for the lifetime of a loop
pub type Token = u64;

/// One ready condition reported by `Backend::wait`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Readiness {
    Fd { token: Token, events: PollEvents },
    Timer { token: Token },
}

/// Native dispatcher interface
pub(crate) trait Backend: Sized {
    /// Native timer resource owned through the loop's timer table
    type Timer;

    fn new(config: &LoopConfig) -> LoopResult<Self>;

    /// Backend name (for logging)
    fn name(&self) -> &'static str;

    fn add_fd(&mut self, fd: RawFd, token: Token, events: PollEvents) -> LoopResult<()>;

    /// Replace the interest mask of a registered fd in place
    fn modify_fd(&mut self, fd: RawFd, token: Token, events: PollEvents) -> LoopResult<()>;

    fn remove_fd(&mut self, fd: RawFd, token: Token) -> LoopResult<()>;

    /// Allocate a disarmed native timer
    fn create_timer(&mut self, token: Token) -> LoopResult<Self::Timer>;

    /// Arm (or re-arm) a timer; zero `interval` means one-shot
    fn arm_timer(
        &mut self,
        timer: &mut Self::Timer,
        delay: Duration,
        interval: Duration,
    ) -> LoopResult<()>;

    fn disarm_timer(&mut self, timer: &mut Self::Timer);

    /// Free the native timer; it is disarmed first if needed
    fn destroy_timer(&mut self, timer: Self::Timer);

    /// Consume a reported expiry so it is not reported again
    fn acknowledge_timer(&mut self, timer: &mut Self::Timer);

    /// How long until the next timer the backend tracks in userspace
    ///
    /// Backends whose timers are kernel objects return `None`.
    fn next_timeout(&mut self, now: Instant) -> Option<Duration>;

    /// Block up to `timeout` (`None` = forever) and append ready conditions
    ///
    /// An interrupted wait returns `Ok` with nothing appended.
    fn wait(&mut self, timeout: Option<Duration>, ready: &mut Vec<Readiness>) -> LoopResult<()>;
}

cfg_if::cfg_if! {
    if #[cfg(all(target_os = "linux", not(feature = "poll-backend")))] {
        pub(crate) type PlatformBackend = epoll::EpollBackend;
    } else if #[cfg(unix)] {
        pub(crate) type PlatformBackend = poll::PollBackend;
    } else {
        compile_error!("Unsupported platform");
    }
}

/// Millisecond timeout for poll/epoll_wait, rounded up so a wait never
/// ends before the deadline it was computed from
pub(crate) fn timeout_ms(timeout: Option<Duration>) -> libc::c_int {
    match timeout {
        None => -1,
        Some(d) => {
            let ms = (d.as_nanos() + 999_999) / 1_000_000;
            ms.min(libc::c_int::MAX as u128) as libc::c_int
        }
    }
}

/// errno of the last failed libc call
#[inline]
pub(crate) fn last_errno() -> i32 {
    nix::errno::Errno::last() as i32
}
