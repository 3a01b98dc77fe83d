//! Portable Unix backend: poll(2) for descriptors, a userspace heap for timers
//!
//! Timers here are plain heap entries, so "native resources" are just a
//! token slot. The loop bounds each wait by `next_timeout()`; the wait is
//! rounded up to whole milliseconds (plus the configured slack) and expired
//! timers are collected after every wake, whatever woke it.

use std::time::{Duration, Instant};

use evloop_core::{kdebug, LoopError, LoopResult, PollEvents, RawFd};

use super::{last_errno, timeout_ms, Backend, Readiness, Token};
use crate::config::LoopConfig;
use crate::timer::heap::TimerHeap;

/// Heap-backed timer slot
pub(crate) struct HeapTimer {
    token: Token,
}

struct PollEntry {
    fd: RawFd,
    token: Token,
    events: PollEvents,
}

pub(crate) struct PollBackend {
    entries: Vec<PollEntry>,
    /// Scratch array handed to poll(2), rebuilt every wait
    pollfds: Vec<libc::pollfd>,
    timers: TimerHeap,
    expired: Vec<Token>,
    slack: Duration,
}

fn to_poll(events: PollEvents) -> libc::c_short {
    let mut flags = 0;
    if events.intersects(PollEvents::READ) {
        flags |= libc::POLLIN;
    }
    if events.intersects(PollEvents::PRIORITY) {
        flags |= libc::POLLPRI;
    }
    if events.intersects(PollEvents::WRITE) {
        flags |= libc::POLLOUT;
    }
    flags
}

fn from_poll(flags: libc::c_short) -> PollEvents {
    let mut events = PollEvents::NONE;
    if flags & libc::POLLIN != 0 {
        events |= PollEvents::READ;
    }
    if flags & libc::POLLPRI != 0 {
        events |= PollEvents::PRIORITY;
    }
    if flags & libc::POLLOUT != 0 {
        events |= PollEvents::WRITE;
    }
    if flags & (libc::POLLERR | libc::POLLNVAL) != 0 {
        events |= PollEvents::ERROR;
    }
    if flags & libc::POLLHUP != 0 {
        events |= PollEvents::HANGUP;
    }
    events
}

/// fcntl(F_GETFD) to check validity, so bad fds fail at
/// registration the way epoll_ctl does instead of at the next poll
fn check_fd(fd: RawFd) -> Result<(), i32> {
    if fd < 0 {
        return Err(libc::EBADF);
    }
    let ret = unsafe { libc::fcntl(fd, libc::F_GETFD) };
    if ret < 0 {
        return Err(last_errno());
    }
    Ok(())
}

impl PollBackend {
    fn position(&self, token: Token) -> Option<usize> {
        self.entries.iter().position(|e| e.token == token)
    }
}

impl Backend for PollBackend {
    type Timer = HeapTimer;

    fn new(config: &LoopConfig) -> LoopResult<Self> {
        Ok(Self {
            entries: Vec::new(),
            pollfds: Vec::new(),
            timers: TimerHeap::new(),
            expired: Vec::new(),
            slack: config.timer_slack,
        })
    }

    fn name(&self) -> &'static str {
        "poll"
    }

    fn add_fd(&mut self, fd: RawFd, token: Token, events: PollEvents) -> LoopResult<()> {
        kdebug!("adding fd {} to poll set", fd);
        check_fd(fd).map_err(|errno| LoopError::Register { fd, errno })?;
        if self.entries.iter().any(|e| e.fd == fd) {
            return Err(LoopError::FdInUse(fd));
        }
        self.entries.push(PollEntry { fd, token, events });
        Ok(())
    }

    fn modify_fd(&mut self, _fd: RawFd, token: Token, events: PollEvents) -> LoopResult<()> {
        let i = self
            .position(token)
            .ok_or(LoopError::os("poll modify", libc::ENOENT))?;
        self.entries[i].events = events;
        Ok(())
    }

    fn remove_fd(&mut self, fd: RawFd, token: Token) -> LoopResult<()> {
        kdebug!("removing fd {} from poll set", fd);
        match self.position(token) {
            Some(i) => {
                self.entries.swap_remove(i);
                Ok(())
            }
            None => Err(LoopError::os("poll remove", libc::ENOENT)),
        }
    }

    fn create_timer(&mut self, token: Token) -> LoopResult<HeapTimer> {
        Ok(HeapTimer { token })
    }

    fn arm_timer(
        &mut self,
        timer: &mut HeapTimer,
        delay: Duration,
        interval: Duration,
    ) -> LoopResult<()> {
        self.timers.insert(timer.token, Instant::now() + delay, interval);
        Ok(())
    }

    fn disarm_timer(&mut self, timer: &mut HeapTimer) {
        self.timers.cancel(timer.token);
    }

    fn destroy_timer(&mut self, mut timer: HeapTimer) {
        self.disarm_timer(&mut timer);
    }

    fn acknowledge_timer(&mut self, _timer: &mut HeapTimer) {}

    fn next_timeout(&mut self, now: Instant) -> Option<Duration> {
        self.timers
            .next_deadline()
            .map(|deadline| deadline.saturating_duration_since(now))
    }

    fn wait(&mut self, timeout: Option<Duration>, ready: &mut Vec<Readiness>) -> LoopResult<()> {
        let timeout = timeout.map(|t| if t.is_zero() { t } else { t + self.slack });

        self.pollfds.clear();
        self.pollfds.extend(self.entries.iter().map(|e| libc::pollfd {
            fd: e.fd,
            events: to_poll(e.events),
            revents: 0,
        }));

        let n = unsafe {
            libc::poll(
                self.pollfds.as_mut_ptr(),
                self.pollfds.len() as libc::nfds_t,
                timeout_ms(timeout),
            )
        };
        if n < 0 {
            let errno = last_errno();
            if errno != libc::EINTR {
                return Err(LoopError::os("poll", errno));
            }
        } else if n > 0 {
            for (pfd, entry) in self.pollfds.iter().zip(&self.entries) {
                if pfd.revents != 0 {
                    ready.push(Readiness::Fd {
                        token: entry.token,
                        events: from_poll(pfd.revents),
                    });
                }
            }
        }

        self.expired.clear();
        self.timers.poll_expired(Instant::now(), &mut self.expired);
        ready.extend(self.expired.iter().map(|&token| Readiness::Timer { token }));
        Ok(())
    }
}
