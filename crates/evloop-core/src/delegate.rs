//! Callback delegates
//!
//! A delegate is an owning closure: the captured context lives inside the
//! box, so the loop never holds a raw pointer back to the object that
//! registered it. The loop keeps each delegate in its registration table
//! and drops it when the registration is removed.

use core::fmt;

use crate::events::PollEvents;
use crate::RawFd;

/// Work item invoked when a timer fires
pub struct CallbackDelegate(Box<dyn FnMut()>);

impl CallbackDelegate {
    pub fn new<F>(f: F) -> Self
    where
        F: FnMut() + 'static,
    {
        CallbackDelegate(Box::new(f))
    }

    #[inline]
    pub fn call(&mut self) {
        (self.0)()
    }
}

impl<F> From<F> for CallbackDelegate
where
    F: FnMut() + 'static,
{
    fn from(f: F) -> Self {
        CallbackDelegate::new(f)
    }
}

impl fmt::Debug for CallbackDelegate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("CallbackDelegate")
    }
}

/// Work item invoked when a descriptor becomes ready
///
/// Receives the descriptor and the triggered conditions. Returning `false`
/// removes the registration after the call.
pub struct PollEventDelegate(Box<dyn FnMut(RawFd, PollEvents) -> bool>);

impl PollEventDelegate {
    pub fn new<F>(f: F) -> Self
    where
        F: FnMut(RawFd, PollEvents) -> bool + 'static,
    {
        PollEventDelegate(Box::new(f))
    }

    #[inline]
    pub fn call(&mut self, fd: RawFd, events: PollEvents) -> bool {
        (self.0)(fd, events)
    }
}

impl<F> From<F> for PollEventDelegate
where
    F: FnMut(RawFd, PollEvents) -> bool + 'static,
{
    fn from(f: F) -> Self {
        PollEventDelegate::new(f)
    }
}

impl fmt::Debug for PollEventDelegate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("PollEventDelegate")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::rc::Rc;

    #[test]
    fn test_callback_owns_context() {
        let hits = Rc::new(Cell::new(0));
        let h = hits.clone();
        let mut cb = CallbackDelegate::new(move || h.set(h.get() + 1));
        cb.call();
        cb.call();
        assert_eq!(hits.get(), 2);

        drop(cb);
        assert_eq!(Rc::strong_count(&hits), 1);
    }

    #[test]
    fn test_poll_delegate_passes_args() {
        let mut cb: PollEventDelegate = (|fd: RawFd, ev: PollEvents| fd == 7 && ev.is_readable()).into();
        assert!(cb.call(7, PollEvents::READ));
        assert!(!cb.call(7, PollEvents::WRITE));
    }
}
