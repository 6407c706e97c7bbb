//! Live stereo audio visualizer.
//!
//! Audio flows from a selected source (oscillator pair, microphone, or
//! decoded file) through a per-channel gain and analyzer graph, and the
//! render loop draws frequency, waveform, and level panels from the
//! analyzer snapshots each frame.

pub mod analyzer;
pub mod config;
pub(crate) mod debuglog;
pub mod decode;
pub mod error;
pub mod graph;
pub mod host;
pub mod render;
pub mod session;
pub mod surface;
pub mod terminal;

pub use debuglog::DebugLogger;
