//! Basic evloop example
//!
//! Drives the main loop with a repeating timer, a socket pair echoing
//! through a file source, and a simulated 60 Hz frame clock whose vsync
//! ticks come from another timer. Stops after a fixed number of frames.
//!
//! # Environment Variables
//!
//! - `EVL_FLUSH_EPRINT=1` - Flush debug output immediately
//! - `EVL_LOG_LEVEL=debug` - Set log level (off, error, warn, info, debug, trace)
//! - `EVL_TRACE_DISPATCH=1` - Trace every dispatched callback

use evloop::{init_main_event_loop, request_stop, run_main_event_loop};
use evloop::{kdebug, kinfo, now_ns, EventLoopFileSource, FrameSource, PollEvents};
use evloop::{Timer, TimerFlags};
use std::cell::{Cell, RefCell};
use std::error::Error;
use std::io::{Read, Write};
use std::os::fd::AsRawFd;
use std::os::unix::net::UnixStream;
use std::rc::Rc;
use std::time::{Duration, Instant};

const FRAMES: u32 = 30;
const FRAME_INTERVAL: Duration = Duration::from_micros(16_667);

/// Frame clock; a vsync tick posts a frame and captures its timestamp
struct SimulatedVsync {
    posted: Cell<bool>,
    vsync_ns: Cell<Option<u64>>,
    frames: Cell<u32>,
}

impl SimulatedVsync {
    fn vsync(&self) {
        self.posted.set(true);
        self.vsync_ns.set(Some(now_ns()));
    }
}

impl FrameSource for SimulatedVsync {
    fn frame_is_posted(&self) -> bool {
        self.posted.get()
    }

    fn take_frame_time(&self) -> Option<u64> {
        self.vsync_ns.take()
    }

    fn frame_update(&self, timestamp_ns: u64) {
        self.posted.set(false);
        let n = self.frames.get() + 1;
        self.frames.set(n);
        kdebug!("[frame {}] timestamp {} ns", n, timestamp_ns);
        if n == FRAMES {
            kinfo!("{} frames rendered, stopping", n);
            request_stop();
        }
    }
}

// EVL_LOG_LEVEL=debug EVL_FLUSH_EPRINT=1 cargo run -p evloop-basic
fn main() -> Result<(), Box<dyn Error>> {
    println!("=== evloop Basic Example ===\n");

    let event_loop = init_main_event_loop()?;

    // Repeating 100ms heartbeat
    let beats = Rc::new(Cell::new(0u32));
    let b = beats.clone();
    let mut heartbeat = Timer::new();
    heartbeat.callback_after_ms(
        move || {
            b.set(b.get() + 1);
            println!("heartbeat {}", b.get());
        },
        100,
        100,
        &event_loop,
        TimerFlags::HINT_REUSE,
    )?;

    // Socket pair: writer fires from a timer, reader echoes what arrives
    let (writer, reader) = UnixStream::pair()?;
    let received = Rc::new(RefCell::new(Vec::new()));
    let r = received.clone();
    let read_end = reader.try_clone()?;

    let mut source = EventLoopFileSource::new();
    source.init(
        reader.as_raw_fd(),
        move |fd, events| {
            let mut buf = [0u8; 256];
            match (&read_end).read(&mut buf) {
                Ok(0) => {
                    println!("fd {} closed ({:?})", fd, events);
                    false
                }
                Ok(n) => {
                    let msg = String::from_utf8_lossy(&buf[..n]).into_owned();
                    println!("fd {} read {:?}", fd, msg);
                    r.borrow_mut().push(msg);
                    true
                }
                Err(_) => !events.is_closed(),
            }
        },
        PollEvents::READ,
        &event_loop,
    )?;

    let writer = RefCell::new(writer);
    let mut ping = Timer::new();
    ping.callback_once_after(
        move || {
            let _ = writer.borrow_mut().write_all(b"ping over the socket pair");
        },
        Duration::from_millis(50),
        &event_loop,
    )?;

    let vsync = Rc::new(SimulatedVsync {
        posted: Cell::new(false),
        vsync_ns: Cell::new(None),
        frames: Cell::new(0),
    });
    let v = vsync.clone();
    let mut vsync_timer = Timer::new();
    vsync_timer.schedule(
        move || v.vsync(),
        FRAME_INTERVAL,
        FRAME_INTERVAL,
        &event_loop,
        TimerFlags::HINT_NONE,
    )?;

    let start = Instant::now();
    run_main_event_loop(Some(vsync.clone()))?;
    let elapsed = start.elapsed();

    heartbeat.cancel();
    vsync_timer.deinit();
    source.deinit();

    let stats = event_loop.stats();
    println!();
    println!("frames:        {}", vsync.frames.get());
    println!("heartbeats:    {}", beats.get());
    println!("messages:      {:?}", received.borrow());
    println!("passes:        {}", stats.passes);
    println!("timer fires:   {}", stats.timer_fires);
    println!("fd dispatches: {}", stats.fd_dispatches);
    println!("elapsed:       {:?}", elapsed);

    println!("\n=== Example Complete ===");
    Ok(())
}
