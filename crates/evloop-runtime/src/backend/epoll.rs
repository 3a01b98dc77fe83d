//! Linux backend: epoll for descriptors, timerfd for timers
//!
//! Timers are kernel timer objects added to the same epoll set as the
//! application's descriptors, so a single `epoll_wait` covers both and the
//! kernel keeps the (fixed-rate) repeat schedule. The epoll user data holds
//! the loop token, with the top bit marking timer registrations.

use std::os::fd::{AsFd, AsRawFd, FromRawFd, OwnedFd};
use std::time::{Duration, Instant};

use nix::errno::Errno;
use nix::sys::time::TimeSpec;
use nix::sys::timerfd::{ClockId, Expiration, TimerFd, TimerFlags, TimerSetTimeFlags};

use evloop_core::{kdebug, LoopError, LoopResult, PollEvents, RawFd};

use super::{last_errno, timeout_ms, Backend, Readiness, Token};
use crate::config::LoopConfig;

const TIMER_BIT: u64 = 1 << 63;

/// Kernel timer registered in the epoll set
pub(crate) struct EpollTimer {
    fd: TimerFd,
    token: Token,
}

impl EpollTimer {
    #[inline]
    fn raw_fd(&self) -> RawFd {
        self.fd.as_fd().as_raw_fd()
    }
}

pub(crate) struct EpollBackend {
    epfd: OwnedFd,
    events: Vec<libc::epoll_event>,
}

fn to_epoll(events: PollEvents) -> u32 {
    let mut flags = 0;
    if events.intersects(PollEvents::READ) {
        flags |= libc::EPOLLIN;
    }
    if events.intersects(PollEvents::PRIORITY) {
        flags |= libc::EPOLLPRI;
    }
    if events.intersects(PollEvents::WRITE) {
        flags |= libc::EPOLLOUT;
    }
    flags as u32
}

fn from_epoll(flags: u32) -> PollEvents {
    let flags = flags as libc::c_int;
    let mut events = PollEvents::NONE;
    if flags & libc::EPOLLIN != 0 {
        events |= PollEvents::READ;
    }
    if flags & libc::EPOLLPRI != 0 {
        events |= PollEvents::PRIORITY;
    }
    if flags & libc::EPOLLOUT != 0 {
        events |= PollEvents::WRITE;
    }
    if flags & libc::EPOLLERR != 0 {
        events |= PollEvents::ERROR;
    }
    if flags & (libc::EPOLLHUP | libc::EPOLLRDHUP) != 0 {
        events |= PollEvents::HANGUP;
    }
    events
}

/// Kernel one-shot expirations of zero disarm the timer, so clamp to 1ns
fn nonzero(d: Duration) -> TimeSpec {
    TimeSpec::from_duration(d.max(Duration::from_nanos(1)))
}

impl EpollBackend {
    fn ctl(&self, op: libc::c_int, fd: RawFd, flags: u32, data: u64) -> Result<(), i32> {
        let mut event = libc::epoll_event { events: flags, u64: data };
        let ret = unsafe { libc::epoll_ctl(self.epfd.as_raw_fd(), op, fd, &mut event) };
        if ret < 0 {
            return Err(last_errno());
        }
        Ok(())
    }
}

impl Backend for EpollBackend {
    type Timer = EpollTimer;

    fn new(config: &LoopConfig) -> LoopResult<Self> {
        let fd = unsafe { libc::epoll_create1(libc::EPOLL_CLOEXEC) };
        if fd < 0 {
            return Err(LoopError::os("epoll_create1", last_errno()));
        }
        let epfd = unsafe { OwnedFd::from_raw_fd(fd) };
        Ok(Self {
            epfd,
            events: vec![libc::epoll_event { events: 0, u64: 0 }; config.max_events.max(1)],
        })
    }

    fn name(&self) -> &'static str {
        "epoll"
    }

    fn add_fd(&mut self, fd: RawFd, token: Token, events: PollEvents) -> LoopResult<()> {
        kdebug!("adding fd {} to epoll set", fd);
        self.ctl(libc::EPOLL_CTL_ADD, fd, to_epoll(events), token)
            .map_err(|errno| match errno {
                libc::EEXIST => LoopError::FdInUse(fd),
                _ => LoopError::Register { fd, errno },
            })
    }

    fn modify_fd(&mut self, fd: RawFd, token: Token, events: PollEvents) -> LoopResult<()> {
        self.ctl(libc::EPOLL_CTL_MOD, fd, to_epoll(events), token)
            .map_err(|errno| LoopError::os("epoll_ctl(MOD)", errno))
    }

    fn remove_fd(&mut self, fd: RawFd, _token: Token) -> LoopResult<()> {
        kdebug!("removing fd {} from epoll set", fd);
        self.ctl(libc::EPOLL_CTL_DEL, fd, 0, 0)
            .map_err(|errno| LoopError::os("epoll_ctl(DEL)", errno))
    }

    fn create_timer(&mut self, token: Token) -> LoopResult<EpollTimer> {
        let fd = TimerFd::new(
            ClockId::CLOCK_MONOTONIC,
            TimerFlags::TFD_NONBLOCK | TimerFlags::TFD_CLOEXEC,
        )
        .map_err(|e| LoopError::os("timerfd_create", e as i32))?;
        let timer = EpollTimer { fd, token };

        self.ctl(
            libc::EPOLL_CTL_ADD,
            timer.raw_fd(),
            libc::EPOLLIN as u32,
            token | TIMER_BIT,
        )
        .map_err(|errno| LoopError::os("epoll_ctl(ADD timerfd)", errno))?;
        Ok(timer)
    }

    fn arm_timer(
        &mut self,
        timer: &mut EpollTimer,
        delay: Duration,
        interval: Duration,
    ) -> LoopResult<()> {
        // Discard an expiry left over from a previous arming
        let _ = timer.fd.wait();

        let expiration = if interval.is_zero() {
            Expiration::OneShot(nonzero(delay))
        } else {
            Expiration::IntervalDelayed(nonzero(delay), nonzero(interval))
        };
        timer
            .fd
            .set(expiration, TimerSetTimeFlags::empty())
            .map_err(|e| LoopError::os("timerfd_settime", e as i32))
    }

    fn disarm_timer(&mut self, timer: &mut EpollTimer) {
        if let Err(e) = timer.fd.unset() {
            kdebug!("timerfd {} unset failed: {}", timer.token, e);
        }
        let _ = timer.fd.wait();
    }

    fn destroy_timer(&mut self, timer: EpollTimer) {
        if let Err(errno) = self.ctl(libc::EPOLL_CTL_DEL, timer.raw_fd(), 0, 0) {
            kdebug!("timerfd {} removal failed: errno {}", timer.token, errno);
        }
        // TimerFd closes on drop
    }

    fn acknowledge_timer(&mut self, timer: &mut EpollTimer) {
        // Level-triggered: the fd stays readable until the counter is read
        let _ = timer.fd.wait();
    }

    fn next_timeout(&mut self, _now: Instant) -> Option<Duration> {
        None
    }

    fn wait(&mut self, timeout: Option<Duration>, ready: &mut Vec<Readiness>) -> LoopResult<()> {
        let n = unsafe {
            libc::epoll_wait(
                self.epfd.as_raw_fd(),
                self.events.as_mut_ptr(),
                self.events.len() as libc::c_int,
                timeout_ms(timeout),
            )
        };
        if n < 0 {
            let errno = last_errno();
            if errno == Errno::EINTR as i32 {
                return Ok(());
            }
            return Err(LoopError::os("epoll_wait", errno));
        }

        for i in 0..n as usize {
            let event = self.events[i];
            let data = event.u64;
            if data & TIMER_BIT != 0 {
                ready.push(Readiness::Timer {
                    token: data & !TIMER_BIT,
                });
            } else {
                ready.push(Readiness::Fd {
                    token: data,
                    events: from_epoll(event.events),
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::os::unix::net::UnixStream;

    fn backend() -> EpollBackend {
        EpollBackend::new(&LoopConfig::default()).expect("epoll backend")
    }

    #[test]
    fn test_fd_readiness_and_modify() {
        let mut be = backend();
        let (mut a, b) = UnixStream::pair().unwrap();
        be.add_fd(b.as_raw_fd(), 11, PollEvents::READ).unwrap();

        let mut ready = Vec::new();
        be.wait(Some(Duration::ZERO), &mut ready).unwrap();
        assert!(ready.is_empty());

        a.write_all(b"x").unwrap();
        be.wait(Some(Duration::from_millis(100)), &mut ready).unwrap();
        assert_eq!(ready, vec![Readiness::Fd { token: 11, events: PollEvents::READ }]);

        ready.clear();
        be.modify_fd(b.as_raw_fd(), 11, PollEvents::WRITE).unwrap();
        be.wait(Some(Duration::from_millis(100)), &mut ready).unwrap();
        assert_eq!(ready, vec![Readiness::Fd { token: 11, events: PollEvents::WRITE }]);

        be.remove_fd(b.as_raw_fd(), 11).unwrap();
    }

    #[test]
    fn test_duplicate_fd_rejected() {
        let mut be = backend();
        let (_a, b) = UnixStream::pair().unwrap();
        be.add_fd(b.as_raw_fd(), 1, PollEvents::READ).unwrap();
        assert_eq!(
            be.add_fd(b.as_raw_fd(), 2, PollEvents::READ),
            Err(LoopError::FdInUse(b.as_raw_fd()))
        );
    }

    #[test]
    fn test_bad_fd_is_reported() {
        let mut be = backend();
        let err = be.add_fd(-5, 1, PollEvents::READ).unwrap_err();
        assert_eq!(err, LoopError::Register { fd: -5, errno: libc::EBADF });
    }

    #[test]
    fn test_timerfd_one_shot() {
        let mut be = backend();
        let mut timer = be.create_timer(42).unwrap();
        let start = Instant::now();
        be.arm_timer(&mut timer, Duration::from_millis(5), Duration::ZERO).unwrap();

        let mut ready = Vec::new();
        be.wait(Some(Duration::from_millis(500)), &mut ready).unwrap();
        assert!(start.elapsed() >= Duration::from_millis(5));
        assert_eq!(ready, vec![Readiness::Timer { token: 42 }]);
        be.acknowledge_timer(&mut timer);

        ready.clear();
        be.wait(Some(Duration::from_millis(20)), &mut ready).unwrap();
        assert!(ready.is_empty());
        be.destroy_timer(timer);
    }

    #[test]
    fn test_timerfd_disarm() {
        let mut be = backend();
        let mut timer = be.create_timer(3).unwrap();
        be.arm_timer(&mut timer, Duration::from_millis(5), Duration::from_millis(5)).unwrap();
        be.disarm_timer(&mut timer);

        let mut ready = Vec::new();
        be.wait(Some(Duration::from_millis(20)), &mut ready).unwrap();
        assert!(ready.is_empty());
        be.destroy_timer(timer);
    }
}
