//! Collaborator traits
//!
//! These traits define the boundary between the dispatch loop and the
//! display/windowing code that drives it. The loop only polls them; it
//! never knows how frames are rendered or how the connection is read.

/// Display frame clock
///
/// Consumed as a recurring high-priority condition: the loop asks
/// `frame_is_posted()` on every dispatch pass and, when it answers `true`,
/// delivers `frame_update()` ahead of ordinary I/O and timer callbacks.
pub trait FrameSource {
    /// Whether a frame is due right now (must not block)
    fn frame_is_posted(&self) -> bool;

    /// Advance the frame clock, `timestamp_ns` on the monotonic clock
    fn frame_update(&self, timestamp_ns: u64);

    /// Timestamp captured by the vsync source for the pending frame
    ///
    /// Taken (and cleared) by the loop before `frame_update()`. When `None`
    /// the loop stamps the frame with the current monotonic time.
    fn take_frame_time(&self) -> Option<u64> {
        None
    }
}

/// Descriptor with its own userspace read buffer (e.g. a display connection)
///
/// Such a connection may hold already-read events that a readiness poll on
/// the fd will never report, so the loop consults `fd_pending()` as an
/// extra readiness predicate in addition to the fd's read condition.
pub trait PendingFd {
    /// Buffered events are waiting to be handled (must not block)
    fn fd_pending(&self) -> bool;

    /// Drain and handle the connection's events
    fn fd_handler(&self);
}
