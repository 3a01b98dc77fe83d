//! Timers dispatched by an `EventLoop`
//!
//! A `Timer` is a caller-owned handle; the native timer and the callback
//! live in the loop's timer table under the handle's token. Dropping or
//! `deinit`-ing the handle removes that entry before returning, so a timer
//! never fires after its handle is gone.
//!
//! ```rust,ignore
//! let mut blink = Timer::new();
//! blink.callback_after_ms(|| toggle_cursor(), 500, 500, &event_loop, TimerFlags::HINT_NONE)?;
//! // ...
//! blink.cancel();
//! ```

#[cfg_attr(all(target_os = "linux", not(feature = "poll-backend")), allow(dead_code))]
pub(crate) mod heap;

use std::fmt;
use std::ops::BitOr;
use std::time::Duration;

use evloop_core::constants::{NSEC_PER_MSEC, NSEC_PER_SEC};
use evloop_core::{CallbackDelegate, LoopResult};

use crate::backend::Token;
use crate::event_loop::{EventLoop, TimerState};

/// Scheduling hints
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct TimerFlags(u32);

impl TimerFlags {
    pub const HINT_NONE: TimerFlags = TimerFlags(0);
    /// Keep the native timer allocated across fire/cancel; use for timers
    /// that are rescheduled often
    pub const HINT_REUSE: TimerFlags = TimerFlags(1);

    #[inline]
    pub const fn bits(self) -> u32 {
        self.0
    }

    #[inline]
    pub const fn contains(self, other: TimerFlags) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for TimerFlags {
    type Output = TimerFlags;

    fn bitor(self, rhs: TimerFlags) -> TimerFlags {
        TimerFlags(self.0 | rhs.0)
    }
}

impl fmt::Debug for TimerFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.contains(TimerFlags::HINT_REUSE) {
            f.write_str("TimerFlags(HINT_REUSE)")
        } else {
            f.write_str("TimerFlags(HINT_NONE)")
        }
    }
}

#[inline]
fn duration_ns(d: Duration) -> u64 {
    d.as_nanos().min(u64::MAX as u128) as u64
}

/// One-shot or repeating timer
#[derive(Default)]
pub struct Timer {
    token: Option<Token>,
    event_loop: Option<EventLoop>,
    flags: TimerFlags,
}

impl Timer {
    pub const fn new() -> Self {
        Self {
            token: None,
            event_loop: None,
            flags: TimerFlags::HINT_NONE,
        }
    }

    /// Fire `callback` after `ns` nanoseconds, then every `repeat_ns`
    /// (`0` = once)
    ///
    /// Scheduling an armed timer replaces its previous arming.
    pub fn callback_after_ns<F>(
        &mut self,
        callback: F,
        ns: u64,
        repeat_ns: u64,
        event_loop: &EventLoop,
        flags: TimerFlags,
    ) -> LoopResult<()>
    where
        F: Into<CallbackDelegate>,
    {
        self.arm(
            callback.into(),
            Duration::from_nanos(ns),
            Duration::from_nanos(repeat_ns),
            event_loop,
            flags,
        )
    }

    pub fn callback_after_ms<F>(
        &mut self,
        callback: F,
        ms: u64,
        repeat_ms: u64,
        event_loop: &EventLoop,
        flags: TimerFlags,
    ) -> LoopResult<()>
    where
        F: Into<CallbackDelegate>,
    {
        self.callback_after_ns(
            callback,
            ms.saturating_mul(NSEC_PER_MSEC),
            repeat_ms.saturating_mul(NSEC_PER_MSEC),
            event_loop,
            flags,
        )
    }

    pub fn callback_after_sec<F>(
        &mut self,
        callback: F,
        sec: u64,
        repeat_sec: u64,
        event_loop: &EventLoop,
        flags: TimerFlags,
    ) -> LoopResult<()>
    where
        F: Into<CallbackDelegate>,
    {
        self.callback_after_ns(
            callback,
            sec.saturating_mul(NSEC_PER_SEC),
            repeat_sec.saturating_mul(NSEC_PER_SEC),
            event_loop,
            flags,
        )
    }

    /// `Duration` form of `callback_after_ns`; `Duration::ZERO` repeat
    /// fires once
    pub fn schedule<F>(
        &mut self,
        callback: F,
        delay: Duration,
        repeat: Duration,
        event_loop: &EventLoop,
        flags: TimerFlags,
    ) -> LoopResult<()>
    where
        F: Into<CallbackDelegate>,
    {
        self.callback_after_ns(
            callback,
            duration_ns(delay),
            duration_ns(repeat),
            event_loop,
            flags,
        )
    }

    /// One-shot without hints
    pub fn callback_once_after<F>(
        &mut self,
        callback: F,
        delay: Duration,
        event_loop: &EventLoop,
    ) -> LoopResult<()>
    where
        F: Into<CallbackDelegate>,
    {
        self.schedule(callback, delay, Duration::ZERO, event_loop, TimerFlags::HINT_NONE)
    }

    fn arm(
        &mut self,
        callback: CallbackDelegate,
        delay: Duration,
        interval: Duration,
        event_loop: &EventLoop,
        flags: TimerFlags,
    ) -> LoopResult<()> {
        if self.event_loop.as_ref().is_some_and(|l| !l.ptr_eq(event_loop)) {
            self.deinit();
        }
        let token = match self.live_token() {
            Some(token) => token,
            None => event_loop.alloc_timer()?,
        };
        self.token = Some(token);
        self.event_loop = Some(event_loop.clone());
        self.flags = flags;

        let reuse = flags.contains(TimerFlags::HINT_REUSE);
        if let Err(e) = event_loop.arm_timer(token, callback, delay, interval, reuse) {
            self.deinit();
            return Err(e);
        }
        Ok(())
    }

    /// Token whose native timer still exists in the loop
    fn live_token(&mut self) -> Option<Token> {
        let token = self.token?;
        let event_loop = self.event_loop.as_ref()?;
        if event_loop.timer_state(token) == TimerState::Released {
            self.token = None;
            self.event_loop = None;
            return None;
        }
        Some(token)
    }

    /// Stop future firings
    ///
    /// With `HINT_REUSE` the native timer stays allocated for the next
    /// schedule; otherwise it is released. No-op on an unscheduled timer.
    pub fn cancel(&mut self) {
        let (Some(token), Some(event_loop)) = (self.token, self.event_loop.as_ref()) else {
            return;
        };
        if event_loop.cancel_timer(token) == TimerState::Released {
            self.token = None;
            self.event_loop = None;
        }
    }

    /// Release everything regardless of flags; idempotent
    pub fn deinit(&mut self) {
        if let (Some(token), Some(event_loop)) = (self.token.take(), self.event_loop.take()) {
            event_loop.release_timer(token);
        }
    }

    /// Scheduled and not yet fired (one-shot) or cancelled
    pub fn is_armed(&self) -> bool {
        match (self.token, self.event_loop.as_ref()) {
            (Some(token), Some(event_loop)) => event_loop.timer_state(token) == TimerState::Armed,
            _ => false,
        }
    }

    /// Flags of the most recent schedule
    pub fn flags(&self) -> TimerFlags {
        self.flags
    }
}

impl Drop for Timer {
    fn drop(&mut self) {
        self.deinit();
    }
}

impl fmt::Debug for Timer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Timer")
            .field("token", &self.token)
            .field("armed", &self.is_armed())
            .field("flags", &self.flags)
            .finish()
    }
}
