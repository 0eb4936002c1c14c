//! Event loop (C8): single-threaded I/O multiplexer over one peer socket.

pub mod reactor;
pub mod timer;

pub use reactor::{EventHandler, EventLoop, StopHandle, DEFAULT_IDLE_TIMEOUT};
pub use timer::{TimerHeap, TimerId, TimerKind};
