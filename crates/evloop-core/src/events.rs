//! Readiness event mask
//!
//! One mask type serves both directions: the interest a file source
//! registers and the conditions a backend reports as triggered. Backends
//! translate to and from their native flags (`POLLIN`, `EPOLLIN`, ...).

use core::fmt;
use core::ops::{BitAnd, BitOr, BitOrAssign, Not};

/// Bit mask of readiness conditions
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct PollEvents(u32);

impl PollEvents {
    /// No conditions
    pub const NONE: PollEvents = PollEvents(0);
    /// Data available to read
    pub const READ: PollEvents = PollEvents(1 << 0);
    /// Urgent/priority data available
    pub const PRIORITY: PollEvents = PollEvents(1 << 1);
    /// Writing will not block
    pub const WRITE: PollEvents = PollEvents(1 << 2);
    /// Error condition (always reported, never needs to be requested)
    pub const ERROR: PollEvents = PollEvents(1 << 3);
    /// Peer hung up (always reported, never needs to be requested)
    pub const HANGUP: PollEvents = PollEvents(1 << 4);

    const ALL: u32 = 0b1_1111;

    /// Build from raw bits, dropping unknown bits
    #[inline]
    pub const fn from_bits_truncate(bits: u32) -> Self {
        PollEvents(bits & Self::ALL)
    }

    #[inline]
    pub const fn bits(self) -> u32 {
        self.0
    }

    #[inline]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// True if every bit of `other` is set in `self`
    #[inline]
    pub const fn contains(self, other: PollEvents) -> bool {
        self.0 & other.0 == other.0
    }

    /// True if any bit of `other` is set in `self`
    #[inline]
    pub const fn intersects(self, other: PollEvents) -> bool {
        self.0 & other.0 != 0
    }

    #[inline]
    pub const fn is_readable(self) -> bool {
        self.intersects(Self::READ)
    }

    #[inline]
    pub const fn is_writable(self) -> bool {
        self.intersects(Self::WRITE)
    }

    /// Error or hangup reported
    #[inline]
    pub const fn is_closed(self) -> bool {
        self.intersects(PollEvents(Self::ERROR.0 | Self::HANGUP.0))
    }
}

impl BitOr for PollEvents {
    type Output = PollEvents;

    fn bitor(self, rhs: PollEvents) -> PollEvents {
        PollEvents(self.0 | rhs.0)
    }
}

impl BitOrAssign for PollEvents {
    fn bitor_assign(&mut self, rhs: PollEvents) {
        self.0 |= rhs.0;
    }
}

impl BitAnd for PollEvents {
    type Output = PollEvents;

    fn bitand(self, rhs: PollEvents) -> PollEvents {
        PollEvents(self.0 & rhs.0)
    }
}

impl Not for PollEvents {
    type Output = PollEvents;

    fn not(self) -> PollEvents {
        PollEvents(!self.0 & Self::ALL)
    }
}

impl fmt::Debug for PollEvents {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const NAMES: [(PollEvents, &str); 5] = [
            (PollEvents::READ, "READ"),
            (PollEvents::PRIORITY, "PRIORITY"),
            (PollEvents::WRITE, "WRITE"),
            (PollEvents::ERROR, "ERROR"),
            (PollEvents::HANGUP, "HANGUP"),
        ];

        if self.is_empty() {
            return write!(f, "PollEvents(NONE)");
        }
        write!(f, "PollEvents(")?;
        let mut first = true;
        for (flag, name) in NAMES {
            if self.contains(flag) {
                if !first {
                    write!(f, " | ")?;
                }
                write!(f, "{}", name)?;
                first = false;
            }
        }
        write!(f, ")")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_combine_and_query() {
        let ev = PollEvents::READ | PollEvents::WRITE;
        assert!(ev.is_readable());
        assert!(ev.is_writable());
        assert!(!ev.is_closed());
        assert!(ev.contains(PollEvents::READ));
        assert!(!ev.contains(PollEvents::READ | PollEvents::HANGUP));
        assert_eq!(ev & PollEvents::WRITE, PollEvents::WRITE);
    }

    #[test]
    fn test_truncate_unknown_bits() {
        let ev = PollEvents::from_bits_truncate(0xffff_ffff);
        assert_eq!(ev.bits(), 0b1_1111);
        assert_eq!(!PollEvents::READ & PollEvents::READ, PollEvents::NONE);
    }

    #[test]
    fn test_debug_names() {
        assert_eq!(format!("{:?}", PollEvents::NONE), "PollEvents(NONE)");
        assert_eq!(
            format!("{:?}", PollEvents::READ | PollEvents::HANGUP),
            "PollEvents(READ | HANGUP)"
        );
    }
}
