//! File descriptor sources
//!
//! An `EventLoopFileSource` watches one descriptor for the conditions in
//! its interest mask. The source never owns (or closes) the descriptor.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use evloop_core::constants::FD_NONE;
use evloop_core::{bug_exit, LoopResult, PendingFd, PollEventDelegate, PollEvents, RawFd};

use crate::backend::Token;
use crate::event_loop::{EventLoop, FdHandler};

/// Readiness watch on a descriptor
pub struct EventLoopFileSource {
    fd: RawFd,
    events: PollEvents,
    token: Option<Token>,
    event_loop: Option<EventLoop>,
}

impl Default for EventLoopFileSource {
    fn default() -> Self {
        Self::new()
    }
}

impl EventLoopFileSource {
    pub const fn new() -> Self {
        Self {
            fd: FD_NONE,
            events: PollEvents::NONE,
            token: None,
            event_loop: None,
        }
    }

    /// Watch `fd` for `events`
    ///
    /// The callback gets the descriptor and the triggered conditions and
    /// returns whether to stay registered. Aborts if the source is already
    /// initialized; a registration the OS rejects returns `Err` and leaves
    /// the source uninitialized.
    pub fn init<F>(
        &mut self,
        fd: RawFd,
        callback: F,
        events: PollEvents,
        event_loop: &EventLoop,
    ) -> LoopResult<()>
    where
        F: FnMut(RawFd, PollEvents) -> bool + 'static,
    {
        let handler = FdHandler::Delegate(Rc::new(RefCell::new(PollEventDelegate::new(callback))));
        self.register(fd, handler, events, event_loop)
    }

    /// Watch a connection that keeps its own read buffer
    ///
    /// `source.fd_handler()` runs when `fd` is readable or when
    /// `source.fd_pending()` reports buffered events.
    pub fn init_pending(
        &mut self,
        fd: RawFd,
        source: Rc<dyn PendingFd>,
        event_loop: &EventLoop,
    ) -> LoopResult<()> {
        self.register(fd, FdHandler::Pending(source), PollEvents::READ, event_loop)
    }

    fn register(
        &mut self,
        fd: RawFd,
        handler: FdHandler,
        events: PollEvents,
        event_loop: &EventLoop,
    ) -> LoopResult<()> {
        if self.fd != FD_NONE {
            bug_exit!("tried to init already initialized source (fd {})", self.fd);
        }
        let token = event_loop.add_fd(fd, events, handler)?;
        self.fd = fd;
        self.events = events;
        self.token = Some(token);
        self.event_loop = Some(event_loop.clone());
        Ok(())
    }

    /// Replace the interest mask
    pub fn set_events(&mut self, events: PollEvents) -> LoopResult<()> {
        let (Some(token), Some(event_loop)) = (self.token, self.event_loop.as_ref()) else {
            bug_exit!("tried to set events on uninitialized source");
        };
        if !event_loop.modify_fd(token, events)? {
            bug_exit!(
                "tried to set events on source fd {} after its callback deregistered it",
                self.fd
            );
        }
        self.events = events;
        Ok(())
    }

    /// Stop watching; the descriptor stays open
    pub fn deinit(&mut self) {
        let (Some(token), Some(event_loop)) = (self.token.take(), self.event_loop.take()) else {
            bug_exit!("tried to destroy uninitialized source");
        };
        event_loop.remove_fd(token);
        self.fd = FD_NONE;
        self.events = PollEvents::NONE;
    }

    /// Watched descriptor, `-1` when uninitialized
    #[inline]
    pub fn fd(&self) -> RawFd {
        self.fd
    }

    #[inline]
    pub fn events(&self) -> PollEvents {
        self.events
    }

    /// Still registered with the loop (a callback returning `false` ends
    /// the registration while the source stays initialized)
    pub fn is_registered(&self) -> bool {
        match (self.token, self.event_loop.as_ref()) {
            (Some(token), Some(event_loop)) => event_loop.fd_registered(token),
            _ => false,
        }
    }
}

impl Drop for EventLoopFileSource {
    fn drop(&mut self) {
        if let (Some(token), Some(event_loop)) = (self.token.take(), self.event_loop.take()) {
            event_loop.remove_fd(token);
        }
    }
}

impl fmt::Debug for EventLoopFileSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventLoopFileSource")
            .field("fd", &self.fd)
            .field("events", &self.events)
            .field("registered", &self.is_registered())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LoopConfig;
    use crate::test_util::{assert_aborted, in_child, run_in_child, test_path};
    use evloop_core::LoopError;
    use std::cell::Cell;
    use std::io::{Read, Write};
    use std::os::fd::AsRawFd;
    use std::os::unix::net::UnixStream;
    use std::time::Duration;

    fn new_loop() -> EventLoop {
        EventLoop::with_config(LoopConfig::default()).expect("event loop")
    }

    #[test]
    fn test_uninitialized_source() {
        let source = EventLoopFileSource::new();
        assert_eq!(source.fd(), FD_NONE);
        assert_eq!(source.events(), PollEvents::NONE);
        assert!(!source.is_registered());
    }

    #[test]
    fn test_read_then_write_interest() {
        let lp = new_loop();
        let (mut a, b) = UnixStream::pair().unwrap();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let s = seen.clone();
        let reader = b.try_clone().unwrap();

        let mut source = EventLoopFileSource::new();
        source
            .init(
                b.as_raw_fd(),
                move |fd, ev| {
                    if ev.is_readable() {
                        let mut buf = [0u8; 16];
                        let _ = (&reader).read(&mut buf);
                    }
                    s.borrow_mut().push((fd, ev));
                    true
                },
                PollEvents::READ,
                &lp,
            )
            .unwrap();
        assert_eq!(source.fd(), b.as_raw_fd());
        assert!(source.is_registered());

        a.write_all(b"ping").unwrap();
        lp.dispatch(Some(Duration::from_millis(100))).unwrap();
        assert_eq!(*seen.borrow(), vec![(b.as_raw_fd(), PollEvents::READ)]);

        source.set_events(PollEvents::WRITE).unwrap();
        assert_eq!(source.events(), PollEvents::WRITE);
        lp.dispatch(Some(Duration::from_millis(100))).unwrap();
        assert_eq!(seen.borrow().len(), 2);
        assert!(seen.borrow()[1].1.is_writable());
        assert!(!seen.borrow()[1].1.is_readable());

        source.deinit();
        assert_eq!(source.fd(), FD_NONE);
        lp.dispatch(Some(Duration::from_millis(5))).unwrap();
        assert_eq!(seen.borrow().len(), 2);
    }

    #[test]
    fn test_idle_read_interest_then_add_write() {
        let lp = new_loop();
        let (_a, b) = UnixStream::pair().unwrap();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let s = seen.clone();

        let mut source = EventLoopFileSource::new();
        source
            .init(
                b.as_raw_fd(),
                move |_fd, ev| {
                    s.borrow_mut().push(ev);
                    true
                },
                PollEvents::READ,
                &lp,
            )
            .unwrap();

        // Nothing to read and the socket is writable, but write is not asked for
        assert_eq!(lp.dispatch(Some(Duration::from_millis(20))).unwrap(), 0);
        assert!(seen.borrow().is_empty());

        source.set_events(PollEvents::READ | PollEvents::WRITE).unwrap();
        assert_eq!(source.events(), PollEvents::READ | PollEvents::WRITE);
        lp.dispatch(Some(Duration::from_millis(100))).unwrap();
        assert_eq!(seen.borrow().len(), 1);
        assert!(seen.borrow()[0].is_writable());
        assert!(!seen.borrow()[0].is_readable());

        source.deinit();
    }

    #[test]
    fn test_hangup_reported() {
        let lp = new_loop();
        let (a, b) = UnixStream::pair().unwrap();
        let got = Rc::new(Cell::new(PollEvents::NONE));
        let g = got.clone();
        let mut source = EventLoopFileSource::new();
        source
            .init(
                b.as_raw_fd(),
                move |_fd, ev| {
                    g.set(ev);
                    false
                },
                PollEvents::READ,
                &lp,
            )
            .unwrap();

        drop(a);
        lp.dispatch(Some(Duration::from_millis(100))).unwrap();
        assert!(got.get().is_closed());
        assert!(!source.is_registered());
    }

    #[test]
    fn test_bad_fd_leaves_source_uninitialized() {
        let lp = new_loop();
        let mut source = EventLoopFileSource::new();
        let err = source
            .init(-7, |_fd, _ev| true, PollEvents::READ, &lp)
            .unwrap_err();
        assert!(matches!(err, LoopError::Register { fd: -7, .. }));
        assert_eq!(source.fd(), FD_NONE);
        assert!(!source.is_registered());
    }

    #[test]
    fn test_reinit_after_deinit() {
        let lp = new_loop();
        let (_a, b) = UnixStream::pair().unwrap();
        let mut source = EventLoopFileSource::new();
        source.init(b.as_raw_fd(), |_fd, _ev| true, PollEvents::READ, &lp).unwrap();
        source.deinit();
        source.init(b.as_raw_fd(), |_fd, _ev| true, PollEvents::WRITE, &lp).unwrap();
        assert_eq!(source.events(), PollEvents::WRITE);
    }

    #[test]
    fn test_drop_deregisters() {
        let lp = new_loop();
        let (_a, b) = UnixStream::pair().unwrap();
        {
            let mut source = EventLoopFileSource::new();
            source.init(b.as_raw_fd(), |_fd, _ev| true, PollEvents::READ, &lp).unwrap();
        }
        // The fd is free for a new registration
        let mut again = EventLoopFileSource::new();
        again.init(b.as_raw_fd(), |_fd, _ev| true, PollEvents::READ, &lp).unwrap();
    }

    #[test]
    fn test_deinit_uninitialized_aborts() {
        if in_child() {
            EventLoopFileSource::new().deinit();
            return;
        }
        let out = run_in_child(&test_path(module_path!(), "test_deinit_uninitialized_aborts"));
        assert_aborted(&out, "tried to destroy uninitialized source");
    }

    #[test]
    fn test_set_events_uninitialized_aborts() {
        if in_child() {
            let _ = EventLoopFileSource::new().set_events(PollEvents::WRITE);
            return;
        }
        let out = run_in_child(&test_path(module_path!(), "test_set_events_uninitialized_aborts"));
        assert_aborted(&out, "tried to set events on uninitialized source");
    }

    #[test]
    fn test_double_init_aborts() {
        if in_child() {
            let lp = new_loop();
            let (_a, b) = UnixStream::pair().unwrap();
            let mut source = EventLoopFileSource::new();
            source.init(b.as_raw_fd(), |_fd, _ev| true, PollEvents::READ, &lp).unwrap();
            let _ = source.init(b.as_raw_fd(), |_fd, _ev| true, PollEvents::READ, &lp);
            return;
        }
        let out = run_in_child(&test_path(module_path!(), "test_double_init_aborts"));
        assert_aborted(&out, "already initialized source");
    }
}
