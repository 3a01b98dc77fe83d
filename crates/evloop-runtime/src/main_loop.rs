//! Process-wide main loop
//!
//! One thread per process owns the main loop. The first call to
//! `init_main_event_loop` claims the calling thread; calling it again from
//! that thread returns the same loop, calling it from any other thread
//! aborts.

use std::cell::OnceCell;
use std::rc::Rc;
use std::sync::OnceLock;
use std::thread::{self, ThreadId};

use evloop_core::{bug_exit, kprint, FrameSource, LoopResult};

use crate::event_loop::EventLoop;

static MAIN_THREAD: OnceLock<ThreadId> = OnceLock::new();

thread_local! {
    static MAIN_LOOP: OnceCell<EventLoop> = const { OnceCell::new() };
}

/// Create (once) and return the main loop
pub fn init_main_event_loop() -> LoopResult<EventLoop> {
    let me = thread::current().id();
    if *MAIN_THREAD.get_or_init(|| me) != me {
        bug_exit!("main event loop initialized from a second thread");
    }
    if let Some(existing) = try_main_event_loop() {
        return Ok(existing);
    }

    kprint::init();
    let event_loop = EventLoop::new()?;
    MAIN_LOOP.with(|cell| {
        let _ = cell.set(event_loop.clone());
    });
    Ok(event_loop)
}

/// The main loop, if this thread initialized one
pub fn try_main_event_loop() -> Option<EventLoop> {
    MAIN_LOOP.with(|cell| cell.get().cloned())
}

/// The main loop; aborts if `init_main_event_loop` has not run on this thread
pub fn main_event_loop() -> EventLoop {
    try_main_event_loop()
        .unwrap_or_else(|| bug_exit!("main event loop used before init_main_event_loop"))
}

/// Initialize the main loop, attach `frame` as its high-priority source and
/// dispatch until `request_stop`
pub fn run_main_event_loop(frame: Option<Rc<dyn FrameSource>>) -> LoopResult<()> {
    let event_loop = init_main_event_loop()?;
    if let Some(frame) = frame {
        event_loop.set_frame_source(frame);
    }
    event_loop.run()
}

/// Ask the main loop to return after its current pass
///
/// No-op when this thread has no main loop.
pub fn request_stop() {
    if let Some(event_loop) = try_main_event_loop() {
        event_loop.request_stop();
    }
}
