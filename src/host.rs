//! Platform audio seam.
//!
//! [`AudioHost`] is the boundary between the session and the real audio
//! stack: it opens the output stream that drives a [`StereoProcessor`] and
//! the microphone capture stream that fills a [`CaptureRing`]. Streams stop
//! when their handles are dropped, which is how teardown releases the
//! context. [`CpalHost`] is the production implementation; tests substitute
//! a fake host.

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use std::fs::File;
use std::os::unix::io::AsRawFd;
use std::sync::{Arc, Mutex};

use crate::error::VizError;
use crate::graph::{CaptureRing, StereoProcessor};

pub trait AudioHost {
    /// Live output stream; dropping it stops playback.
    type Output;
    /// Live capture stream; dropping it detaches the microphone.
    type Capture;

    /// Open the output sink and start driving the processor produced by
    /// `build`, which receives the negotiated sample rate. Returns the
    /// stream handle and that rate.
    fn open_output(
        &mut self,
        requested_rate: Option<u32>,
        build: impl FnOnce(u32) -> StereoProcessor,
    ) -> Result<(Self::Output, u32), VizError>;

    /// Open the default capture device and start filling `ring`. Returns the
    /// stream handle and the capture sample rate. Refusal or absence of a
    /// capture device surfaces as [`VizError::PermissionDenied`].
    fn open_capture(
        &mut self,
        ring: Arc<Mutex<CaptureRing>>,
    ) -> Result<(Self::Capture, u32), VizError>;
}

/// cpal-backed host.
pub struct CpalHost {
    host: cpal::Host,
}

impl CpalHost {
    pub fn new() -> Self {
        let _quiet = StderrSuppressor::new();
        Self {
            host: cpal::default_host(),
        }
    }
}

impl Default for CpalHost {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioHost for CpalHost {
    type Output = cpal::Stream;
    type Capture = cpal::Stream;

    fn open_output(
        &mut self,
        requested_rate: Option<u32>,
        build: impl FnOnce(u32) -> StereoProcessor,
    ) -> Result<(Self::Output, u32), VizError> {
        let _quiet = StderrSuppressor::new();

        let device = self
            .host
            .default_output_device()
            .ok_or_else(|| VizError::DeviceUnavailable("no default output device".into()))?;

        let default_config = device
            .default_output_config()
            .map_err(|e| VizError::DeviceUnavailable(e.to_string()))?;

        let sample_rate = requested_rate.unwrap_or(default_config.sample_rate().0);
        let stream_config = cpal::StreamConfig {
            channels: 2,
            sample_rate: cpal::SampleRate(sample_rate),
            buffer_size: cpal::BufferSize::Default,
        };

        let mut processor = build(sample_rate);
        let stream = device
            .build_output_stream(
                &stream_config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    processor.process(data);
                },
                |err| eprintln!("audio output error: {}", err),
                None,
            )
            .map_err(|e| VizError::Stream(e.to_string()))?;

        stream
            .play()
            .map_err(|e| VizError::Stream(e.to_string()))?;

        Ok((stream, sample_rate))
    }

    fn open_capture(
        &mut self,
        ring: Arc<Mutex<CaptureRing>>,
    ) -> Result<(Self::Capture, u32), VizError> {
        let _quiet = StderrSuppressor::new();

        let device = self
            .host
            .default_input_device()
            .ok_or_else(|| VizError::PermissionDenied("no capture device available".into()))?;

        let config = device
            .default_input_config()
            .map_err(|e| VizError::PermissionDenied(e.to_string()))?;

        let sample_rate = config.sample_rate().0;
        let channels = config.channels();
        if channels == 0 {
            return Err(VizError::PermissionDenied(
                "capture device reported 0 channels".into(),
            ));
        }

        let stream_config = cpal::StreamConfig {
            channels,
            sample_rate: cpal::SampleRate(sample_rate),
            buffer_size: cpal::BufferSize::Default,
        };

        let stream = device
            .build_input_stream(
                &stream_config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    if let Ok(mut ring) = ring.lock() {
                        ring.push_interleaved(data, channels);
                    }
                },
                |err| eprintln!("audio capture error: {}", err),
                None,
            )
            .map_err(|e| VizError::PermissionDenied(e.to_string()))?;

        stream
            .play()
            .map_err(|e| VizError::PermissionDenied(e.to_string()))?;

        Ok((stream, sample_rate))
    }
}

/// RAII guard silencing ALSA's stderr spam during device setup, so library
/// chatter cannot corrupt the raw-mode terminal. Restores stderr on drop.
struct StderrSuppressor {
    saved_fd: i32,
    _dev_null: File,
}

impl StderrSuppressor {
    fn new() -> Option<Self> {
        let dev_null = File::open("/dev/null").ok()?;

        let saved_fd = unsafe { libc::dup(2) };
        if saved_fd < 0 {
            return None;
        }

        if unsafe { libc::dup2(dev_null.as_raw_fd(), 2) } < 0 {
            unsafe {
                libc::close(saved_fd);
            }
            return None;
        }

        Some(Self {
            saved_fd,
            _dev_null: dev_null,
        })
    }
}

impl Drop for StderrSuppressor {
    fn drop(&mut self) {
        unsafe {
            libc::dup2(self.saved_fd, 2);
            libc::close(self.saved_fd);
        }
    }
}
