//! Dispatch boundary

mod dispatcher;

pub use dispatcher::{Dispatcher, FrameHandler, LoggingHandler};
