//! Error types for the evloop dispatcher
//!
//! Only environmental failures are represented here. Misuse of the API
//! (operating on an uninitialized source, re-entering `run`) is not an
//! error value: it aborts through `bug_exit!`.

use core::fmt;

use crate::RawFd;

/// Result type for loop operations
pub type LoopResult<T> = Result<T, LoopError>;

/// Errors that can occur while talking to the native dispatcher
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoopError {
    /// A native call failed
    Os {
        /// Name of the failing call (`epoll_ctl`, `timerfd_create`, ...)
        op: &'static str,
        /// errno reported by the call
        errno: i32,
    },

    /// Registering a descriptor with the backend failed
    Register {
        fd: RawFd,
        errno: i32,
    },

    /// A descriptor is already registered with this loop
    FdInUse(RawFd),
}

impl LoopError {
    /// Build an `Os` error from a raw errno
    #[inline]
    pub fn os(op: &'static str, errno: i32) -> Self {
        LoopError::Os { op, errno }
    }

    /// The errno carried by this error, if any
    pub fn errno(&self) -> Option<i32> {
        match self {
            LoopError::Os { errno, .. } | LoopError::Register { errno, .. } => Some(*errno),
            _ => None,
        }
    }
}

impl fmt::Display for LoopError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoopError::Os { op, errno } => {
                write!(f, "{} failed: {}", op, std::io::Error::from_raw_os_error(*errno))
            }
            LoopError::Register { fd, errno } => write!(
                f,
                "failed to register fd {}: {}",
                fd,
                std::io::Error::from_raw_os_error(*errno)
            ),
            LoopError::FdInUse(fd) => write!(f, "fd {} already registered with this loop", fd),
        }
    }
}

impl std::error::Error for LoopError {}

impl From<LoopError> for std::io::Error {
    fn from(e: LoopError) -> Self {
        match e.errno() {
            Some(errno) => std::io::Error::from_raw_os_error(errno),
            None => std::io::Error::new(std::io::ErrorKind::Other, e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let e = LoopError::FdInUse(5);
        assert_eq!(format!("{}", e), "fd 5 already registered with this loop");

        let e = LoopError::os("epoll_ctl", 9);
        assert!(format!("{}", e).starts_with("epoll_ctl failed: "));
    }

    #[test]
    fn test_error_errno() {
        assert_eq!(LoopError::Register { fd: 3, errno: 9 }.errno(), Some(9));
        assert_eq!(LoopError::FdInUse(3).errno(), None);

        let io: std::io::Error = LoopError::os("poll", 4).into();
        assert_eq!(io.raw_os_error(), Some(4));

        let io: std::io::Error = LoopError::FdInUse(3).into();
        assert_eq!(io.kind(), std::io::ErrorKind::Other);
    }
}
