//! Long-running event producers. Each source loops until the shared stop
//! signal is set, publishing one event per iteration and sleeping a
//! source-specific interval in between.

mod feed_source;
mod log_source;
mod sensor_source;

pub use feed_source::FeedSource;
pub use log_source::LogSource;
pub use sensor_source::SensorSource;

use crate::error::EngineError;

pub trait Source: Send {
    fn name(&self) -> &str;

    /// Main loop of the source. Must exit cleanly within a bounded grace
    /// once the stop signal is set; the interruptible sleep on `StopSignal`
    /// takes care of that for interval-driven sources.
    fn run(&mut self) -> Result<(), EngineError>;
}
