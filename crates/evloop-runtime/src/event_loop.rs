//! Dispatch loop front end
//!
//! `EventLoop` owns the registration tables (fd sources, timers, the frame
//! source) and the platform backend. Each dispatch pass:
//!
//! 1. Computes the wait: `0` if the frame source is posted or a pending-fd
//!    source has buffered data, else the earliest userspace timer deadline,
//!    else forever (bounded by the caller's timeout for `dispatch`).
//! 2. Blocks in the backend.
//! 3. Delivers the frame update first, then fd and timer callbacks in the
//!    order the backend reported them.
//!
//! Every queued firing is looked up again in the tables right before its
//! callback runs, so a registration removed or re-armed by an earlier
//! callback of the same pass is never invoked from stale readiness.
//!
//! The loop is `Rc`-based and therefore `!Send`: registrations can only be
//! made on the thread that owns it.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;
use std::time::{Duration, Instant};

use evloop_core::{
    bug_exit, kdebug, kinfo, ktrace, CallbackDelegate, FrameSource, LoopError, LoopResult,
    PendingFd, PollEventDelegate, PollEvents, RawFd,
};

use crate::backend::{Backend, PlatformBackend, Readiness, Token};
use crate::clock;
use crate::config::LoopConfig;

type NativeTimer = <PlatformBackend as Backend>::Timer;

/// Loop lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    /// Created, `run` not called yet
    Ready,
    Running,
    /// `run` returned; it may be called again
    Stopped,
}

/// Dispatch counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoopStats {
    pub passes: u64,
    pub fd_dispatches: u64,
    pub timer_fires: u64,
    pub frame_updates: u64,
}

/// What a registered descriptor dispatches to
#[derive(Clone)]
pub(crate) enum FdHandler {
    Delegate(Rc<RefCell<PollEventDelegate>>),
    Pending(Rc<dyn PendingFd>),
}

struct FdEntry {
    fd: RawFd,
    events: PollEvents,
    handler: FdHandler,
}

/// Native timer plus the arming currently attached to it
struct TimerEntry {
    native: NativeTimer,
    callback: Option<Rc<RefCell<CallbackDelegate>>>,
    armed: bool,
    repeating: bool,
    reuse: bool,
    /// Pass sequence number at the time of the last arming
    armed_seq: u64,
}

/// Registration state of a timer token
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TimerState {
    /// No native timer behind the token
    Released,
    /// Native timer kept for reuse, not armed
    Idle,
    Armed,
}

struct LoopInner {
    backend: RefCell<PlatformBackend>,
    fds: RefCell<HashMap<Token, FdEntry>>,
    timers: RefCell<HashMap<Token, TimerEntry>>,
    frame: RefCell<Option<Rc<dyn FrameSource>>>,
    /// Readiness buffer reused across passes
    ready: RefCell<Vec<Readiness>>,
    next_token: Cell<Token>,
    /// Incremented right before each backend wait
    pass_seq: Cell<u64>,
    state: Cell<LoopState>,
    dispatching: Cell<bool>,
    stop_requested: Cell<bool>,
    stats: Cell<LoopStats>,
    config: LoopConfig,
}

/// Handle to a dispatch loop
///
/// Cloning yields another handle to the same loop.
#[derive(Clone)]
pub struct EventLoop {
    inner: Rc<LoopInner>,
}

/// Clears the dispatching flag when a pass ends, even by unwinding
struct DispatchGuard<'a>(&'a Cell<bool>);

impl Drop for DispatchGuard<'_> {
    fn drop(&mut self) {
        self.0.set(false);
    }
}

impl EventLoop {
    /// Create a loop configured from the process-wide `LoopConfig`
    pub fn new() -> LoopResult<Self> {
        Self::with_config(LoopConfig::global().clone())
    }

    pub fn with_config(config: LoopConfig) -> LoopResult<Self> {
        let backend = PlatformBackend::new(&config)?;
        kdebug!("created {} event loop", backend.name());
        Ok(Self {
            inner: Rc::new(LoopInner {
                backend: RefCell::new(backend),
                fds: RefCell::new(HashMap::new()),
                timers: RefCell::new(HashMap::new()),
                frame: RefCell::new(None),
                ready: RefCell::new(Vec::new()),
                next_token: Cell::new(1),
                pass_seq: Cell::new(0),
                state: Cell::new(LoopState::Ready),
                dispatching: Cell::new(false),
                stop_requested: Cell::new(false),
                stats: Cell::new(LoopStats::default()),
                config,
            }),
        })
    }

    pub fn state(&self) -> LoopState {
        self.inner.state.get()
    }

    pub fn stats(&self) -> LoopStats {
        self.inner.stats.get()
    }

    pub fn config(&self) -> &LoopConfig {
        &self.inner.config
    }

    /// Both handles refer to the same loop
    pub fn ptr_eq(&self, other: &EventLoop) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    /// Attach the high-priority frame source, returning the previous one
    pub fn set_frame_source(&self, source: Rc<dyn FrameSource>) -> Option<Rc<dyn FrameSource>> {
        self.inner.frame.borrow_mut().replace(source)
    }

    pub fn clear_frame_source(&self) -> Option<Rc<dyn FrameSource>> {
        self.inner.frame.borrow_mut().take()
    }

    /// Make `run` return once the current pass completes
    pub fn request_stop(&self) {
        self.inner.stop_requested.set(true);
    }

    /// Dispatch until `request_stop`
    ///
    /// A stop requested while the loop was not running is discarded. Calling
    /// `run` from inside one of this loop's callbacks aborts.
    pub fn run(&self) -> LoopResult<()> {
        let inner = &*self.inner;
        if inner.state.get() == LoopState::Running {
            bug_exit!("event loop run re-entered from a callback");
        }
        inner.stop_requested.set(false);
        inner.state.set(LoopState::Running);
        kinfo!("entering event loop");

        let result = loop {
            if let Err(e) = self.dispatch_pass(None) {
                break Err(e);
            }
            if inner.stop_requested.replace(false) {
                break Ok(());
            }
        };

        inner.state.set(LoopState::Stopped);
        match &result {
            Ok(()) => kinfo!("left event loop"),
            Err(e) => kinfo!("left event loop: {}", e),
        }
        result
    }

    /// Run a single pass, waiting at most `timeout` (`None` = until
    /// something is ready). Returns the number of callbacks invoked.
    pub fn dispatch(&self, timeout: Option<Duration>) -> LoopResult<usize> {
        self.dispatch_pass(timeout)
    }

    fn dispatch_pass(&self, max_wait: Option<Duration>) -> LoopResult<usize> {
        let inner = &*self.inner;
        if inner.dispatching.replace(true) {
            bug_exit!("event loop dispatch re-entered from a callback");
        }
        let _guard = DispatchGuard(&inner.dispatching);

        let frame = inner.frame.borrow().clone();
        let pending = self.pending_sources();

        let frame_posted = frame.as_ref().is_some_and(|f| f.frame_is_posted());
        let timeout = if frame_posted || pending.iter().any(|(_, p)| p.fd_pending()) {
            Some(Duration::ZERO)
        } else {
            let timer_wait = inner.backend.borrow_mut().next_timeout(Instant::now());
            match (max_wait, timer_wait) {
                (Some(a), Some(b)) => Some(a.min(b)),
                (a, b) => a.or(b),
            }
        };

        let mut ready = std::mem::take(&mut *inner.ready.borrow_mut());
        ready.clear();
        inner.pass_seq.set(inner.pass_seq.get() + 1);
        inner.backend.borrow_mut().wait(timeout, &mut ready)?;

        for (token, source) in &pending {
            let reported = ready
                .iter()
                .any(|r| matches!(r, Readiness::Fd { token: t, .. } if t == token));
            if !reported && source.fd_pending() {
                ready.push(Readiness::Fd { token: *token, events: PollEvents::READ });
            }
        }

        let mut dispatched = 0;

        if let Some(frame) = frame {
            if frame.frame_is_posted() {
                let timestamp = frame.take_frame_time().unwrap_or_else(clock::now_ns);
                if inner.config.trace_dispatch {
                    ktrace!("frame update at {}", timestamp);
                }
                frame.frame_update(timestamp);
                self.bump(|s| s.frame_updates += 1);
                dispatched += 1;
            }
        }

        for r in ready.iter() {
            let fired = match *r {
                Readiness::Fd { token, events } => self.dispatch_fd(token, events),
                Readiness::Timer { token } => self.dispatch_timer(token),
            };
            if fired {
                dispatched += 1;
            }
        }

        ready.clear();
        *inner.ready.borrow_mut() = ready;
        self.bump(|s| s.passes += 1);
        Ok(dispatched)
    }

    fn pending_sources(&self) -> Vec<(Token, Rc<dyn PendingFd>)> {
        self.inner
            .fds
            .borrow()
            .iter()
            .filter_map(|(token, entry)| match &entry.handler {
                FdHandler::Pending(source) => Some((*token, source.clone())),
                FdHandler::Delegate(_) => None,
            })
            .collect()
    }

    fn dispatch_fd(&self, token: Token, events: PollEvents) -> bool {
        let (fd, triggered, handler) = {
            let fds = self.inner.fds.borrow();
            // Removed earlier in this pass
            let Some(entry) = fds.get(&token) else {
                return false;
            };
            let triggered = events & (entry.events | PollEvents::ERROR | PollEvents::HANGUP);
            if triggered.is_empty() {
                return false;
            }
            (entry.fd, triggered, entry.handler.clone())
        };

        if self.inner.config.trace_dispatch {
            ktrace!("fd {} ready: {:?}", fd, triggered);
        }
        match handler {
            FdHandler::Delegate(callback) => {
                let keep = callback.borrow_mut().call(fd, triggered);
                if !keep {
                    self.remove_fd(token);
                }
            }
            FdHandler::Pending(source) => source.fd_handler(),
        }
        self.bump(|s| s.fd_dispatches += 1);
        true
    }

    fn dispatch_timer(&self, token: Token) -> bool {
        let callback = {
            let mut timers = self.inner.timers.borrow_mut();
            let Some(entry) = timers.get_mut(&token) else {
                return false;
            };
            // Armed after this pass's wait: the readiness belongs to an
            // earlier arming
            if !entry.armed || entry.armed_seq >= self.inner.pass_seq.get() {
                return false;
            }
            self.inner.backend.borrow_mut().acknowledge_timer(&mut entry.native);

            let callback = entry.callback.clone();
            if !entry.repeating {
                entry.armed = false;
                entry.callback = None;
                if !entry.reuse {
                    if let Some(entry) = timers.remove(&token) {
                        self.inner.backend.borrow_mut().destroy_timer(entry.native);
                    }
                }
            }
            callback
        };

        let Some(callback) = callback else {
            return false;
        };
        if self.inner.config.trace_dispatch {
            ktrace!("timer {} fired", token);
        }
        callback.borrow_mut().call();
        self.bump(|s| s.timer_fires += 1);
        true
    }

    fn bump(&self, f: impl FnOnce(&mut LoopStats)) {
        let mut stats = self.inner.stats.get();
        f(&mut stats);
        self.inner.stats.set(stats);
    }

    fn next_token(&self) -> Token {
        let token = self.inner.next_token.get();
        self.inner.next_token.set(token + 1);
        token
    }

    // ------------------------------------------------------------------
    // Descriptor registrations
    // ------------------------------------------------------------------

    pub(crate) fn add_fd(
        &self,
        fd: RawFd,
        events: PollEvents,
        handler: FdHandler,
    ) -> LoopResult<Token> {
        if self.inner.fds.borrow().values().any(|e| e.fd == fd) {
            return Err(LoopError::FdInUse(fd));
        }
        let token = self.next_token();
        self.inner.backend.borrow_mut().add_fd(fd, token, events)?;
        self.inner
            .fds
            .borrow_mut()
            .insert(token, FdEntry { fd, events, handler });
        Ok(token)
    }

    /// Returns `Ok(false)` when `token` is no longer registered
    pub(crate) fn modify_fd(&self, token: Token, events: PollEvents) -> LoopResult<bool> {
        let mut fds = self.inner.fds.borrow_mut();
        let Some(entry) = fds.get_mut(&token) else {
            return Ok(false);
        };
        self.inner
            .backend
            .borrow_mut()
            .modify_fd(entry.fd, token, events)?;
        entry.events = events;
        Ok(true)
    }

    pub(crate) fn remove_fd(&self, token: Token) -> bool {
        let entry = self.inner.fds.borrow_mut().remove(&token);
        let Some(entry) = entry else {
            return false;
        };
        if let Err(e) = self.inner.backend.borrow_mut().remove_fd(entry.fd, token) {
            // The fd may already be closed, which drops it from the kernel set
            kdebug!("fd {} deregistration: {}", entry.fd, e);
        }
        // Callback (and anything it captured) drops here, outside the borrows
        drop(entry);
        true
    }

    pub(crate) fn fd_registered(&self, token: Token) -> bool {
        self.inner.fds.borrow().contains_key(&token)
    }

    // ------------------------------------------------------------------
    // Timers
    // ------------------------------------------------------------------

    /// Allocate a disarmed native timer
    pub(crate) fn alloc_timer(&self) -> LoopResult<Token> {
        let token = self.next_token();
        let native = self.inner.backend.borrow_mut().create_timer(token)?;
        self.inner.timers.borrow_mut().insert(
            token,
            TimerEntry {
                native,
                callback: None,
                armed: false,
                repeating: false,
                reuse: false,
                armed_seq: 0,
            },
        );
        Ok(token)
    }

    /// Arm (or re-arm) an allocated timer; zero `interval` fires once
    pub(crate) fn arm_timer(
        &self,
        token: Token,
        callback: CallbackDelegate,
        delay: Duration,
        interval: Duration,
        reuse: bool,
    ) -> LoopResult<()> {
        let (previous, result) = {
            let mut timers = self.inner.timers.borrow_mut();
            let Some(entry) = timers.get_mut(&token) else {
                bug_exit!("tried to arm timer {} that was never allocated", token);
            };
            let mut backend = self.inner.backend.borrow_mut();
            if entry.armed {
                backend.disarm_timer(&mut entry.native);
                entry.armed = false;
            }
            let previous = entry.callback.take();
            let result = backend.arm_timer(&mut entry.native, delay, interval);
            if result.is_ok() {
                entry.callback = Some(Rc::new(RefCell::new(callback)));
                entry.armed = true;
                entry.repeating = !interval.is_zero();
                entry.reuse = reuse;
                entry.armed_seq = self.inner.pass_seq.get();
            }
            (previous, result)
        };
        drop(previous);
        result
    }

    /// Stop future firings; the native timer survives only with `reuse`
    pub(crate) fn cancel_timer(&self, token: Token) -> TimerState {
        let (state, callback, released) = {
            let mut timers = self.inner.timers.borrow_mut();
            let Some(entry) = timers.get_mut(&token) else {
                return TimerState::Released;
            };
            if entry.armed {
                self.inner.backend.borrow_mut().disarm_timer(&mut entry.native);
                entry.armed = false;
            }
            let callback = entry.callback.take();
            if entry.reuse {
                (TimerState::Idle, callback, None)
            } else {
                (TimerState::Released, callback, timers.remove(&token))
            }
        };
        if let Some(entry) = released {
            self.inner.backend.borrow_mut().destroy_timer(entry.native);
        }
        drop(callback);
        state
    }

    /// Release the native timer whatever its state
    pub(crate) fn release_timer(&self, token: Token) {
        let entry = self.inner.timers.borrow_mut().remove(&token);
        if let Some(TimerEntry { native, callback, .. }) = entry {
            self.inner.backend.borrow_mut().destroy_timer(native);
            drop(callback);
        }
    }

    pub(crate) fn timer_state(&self, token: Token) -> TimerState {
        match self.inner.timers.borrow().get(&token) {
            None => TimerState::Released,
            Some(entry) if entry.armed => TimerState::Armed,
            Some(_) => TimerState::Idle,
        }
    }

    #[cfg(test)]
    pub(crate) fn timer_count(&self) -> usize {
        self.inner.timers.borrow().len()
    }
}

impl fmt::Debug for EventLoop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventLoop")
            .field("backend", &self.inner.backend.borrow().name())
            .field("state", &self.inner.state.get())
            .field("fds", &self.inner.fds.borrow().len())
            .field("timers", &self.inner.timers.borrow().len())
            .field("stats", &self.inner.stats.get())
            .finish()
    }
}
