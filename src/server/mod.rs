//! Daemon-side utilities: signal handling and the background flusher

pub mod flusher;
pub mod signals;

pub use flusher::BackgroundFlusher;
