use std::fmt;
use std::io;

/// Errors surfaced by graph construction, decoding, and stream setup.
///
/// Acquisition failures (microphone permission, file decode) are recoverable:
/// the session stays in its pre-visualization state and the user may pick a
/// source again. There is no retry logic anywhere in the crate.
#[derive(Debug)]
pub enum VizError {
    /// Microphone capture was refused or no capture device is usable.
    PermissionDenied(String),
    /// File bytes are not valid or decodable audio.
    DecodeFailure(String),
    /// No audio output device is available.
    DeviceUnavailable(String),
    /// An audio stream failed to build or start.
    Stream(String),
    /// Invalid visualizer configuration (e.g. non-power-of-two FFT size).
    Config(String),
}

impl fmt::Display for VizError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VizError::PermissionDenied(msg) => write!(f, "microphone unavailable: {}", msg),
            VizError::DecodeFailure(msg) => write!(f, "failed to decode audio: {}", msg),
            VizError::DeviceUnavailable(msg) => write!(f, "no audio output device: {}", msg),
            VizError::Stream(msg) => write!(f, "audio stream error: {}", msg),
            VizError::Config(msg) => write!(f, "invalid configuration: {}", msg),
        }
    }
}

impl std::error::Error for VizError {}

impl From<VizError> for io::Error {
    fn from(err: VizError) -> Self {
        io::Error::new(io::ErrorKind::Other, err.to_string())
    }
}
