//! Output destinations for rendered lines
//!
//! Callback sinks are configured on the logger; this module holds the
//! file/stdout sink and its rotation support.

pub mod file;
pub mod rotation;

pub use file::{FileSink, SinkTarget, DEFAULT_FLUSH_BUFFER_SIZE, DEFAULT_FLUSH_DELAY};
pub use rotation::RotationPolicy;
