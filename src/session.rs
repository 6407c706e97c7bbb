//! Visualization session: singleton audio context and parameter bridge.
//!
//! A session owns at most one live audio graph at a time. Starting a new
//! visualization while one is active tears the old one down first (streams
//! detached, processor dropped), so outputs can never stack. Resource
//! conflicts are unrepresentable rather than reported.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use crate::debuglog::{dbg_log, DebugLogger};
use crate::error::VizError;
use crate::graph::{
    build_capture_graph, build_file_graph, build_oscillator_graph, AudioSource, CaptureRing,
    ChannelRoute, GraphHandles,
};
use crate::host::AudioHost;

/// Logical node names used by the parameter bridge and state maps.
pub const LEFT_GAIN: &str = "left_gain";
pub const RIGHT_GAIN: &str = "right_gain";
pub const LEFT_OSCILLATOR: &str = "left_oscillator";
pub const RIGHT_OSCILLATOR: &str = "right_oscillator";

/// Capacity of the microphone ring in stereo frames (~170 ms at 48 kHz).
const CAPTURE_RING_FRAMES: usize = 8192;

/// Externally observable gain slider state.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GainState {
    pub value: f32,
    pub channel: ChannelRoute,
}

/// Externally observable oscillator slider state.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct OscillatorState {
    pub frequency_hz: f32,
    pub channel: ChannelRoute,
}

/// The live context for one visualization: graph handles plus the platform
/// streams keeping it running. Dropping this releases everything.
struct ActiveGraph<H: AudioHost> {
    handles: GraphHandles,
    sample_rate: u32,
    started_at: Instant,
    _capture: Option<H::Capture>,
    _output: H::Output,
}

/// Session manager owning the singleton audio context.
pub struct Session<H: AudioHost> {
    host: H,
    fft_size: usize,
    active: Option<ActiveGraph<H>>,
    gain_state: HashMap<String, GainState>,
    oscillator_state: HashMap<String, OscillatorState>,
}

impl<H: AudioHost> Session<H> {
    pub fn new(host: H, fft_size: usize) -> Self {
        Self {
            host,
            fft_size,
            active: None,
            gain_state: HashMap::new(),
            oscillator_state: HashMap::new(),
        }
    }

    /// Build and start the graph for `source`, tearing down any live graph
    /// first. On failure nothing stays wired and the session returns to the
    /// pre-visualization selection state.
    pub fn start_visualization(
        &mut self,
        source: AudioSource,
        log: &mut DebugLogger,
    ) -> Result<(), VizError> {
        self.teardown(log);

        let fft_size = self.fft_size;
        let mut handles_slot = None;

        let (capture, output, sample_rate) = match source {
            AudioSource::Oscillator {
                left_freq_hz,
                right_freq_hz,
            } => {
                let (output, rate) = self.host.open_output(None, |rate| {
                    let (processor, handles) =
                        build_oscillator_graph(left_freq_hz, right_freq_hz, rate, fft_size);
                    handles_slot = Some(handles);
                    processor
                })?;
                (None, output, rate)
            }
            AudioSource::Microphone => {
                let ring = Arc::new(Mutex::new(CaptureRing::new(CAPTURE_RING_FRAMES)));
                let (capture, capture_rate) = self.host.open_capture(Arc::clone(&ring))?;
                dbg_log!(log, "capture open at {} Hz", capture_rate);
                let (output, rate) = self.host.open_output(None, |rate| {
                    let (processor, handles) = build_capture_graph(ring, rate, fft_size);
                    handles_slot = Some(handles);
                    processor
                })?;
                (Some(capture), output, rate)
            }
            AudioSource::FileBuffer(pcm) => {
                let requested = Some(pcm.sample_rate);
                let (output, rate) = self.host.open_output(requested, |rate| {
                    let (processor, handles) = build_file_graph(pcm, rate, fft_size);
                    handles_slot = Some(handles);
                    processor
                })?;
                (None, output, rate)
            }
        };

        let handles = handles_slot.expect("wiring closure always runs on success");
        self.mirror_initial_state(&handles);
        dbg_log!(log, "graph live at {} Hz, fft {}", sample_rate, fft_size);

        self.active = Some(ActiveGraph {
            handles,
            sample_rate,
            started_at: Instant::now(),
            _capture: capture,
            _output: output,
        });
        Ok(())
    }

    /// Release the live graph, if any: capture detached, output stopped,
    /// state maps cleared.
    pub fn teardown(&mut self, log: &mut DebugLogger) {
        if let Some(active) = self.active.take() {
            dbg_log!(
                log,
                "teardown after {:.2}s",
                active.started_at.elapsed().as_secs_f64()
            );
            drop(active._capture);
            drop(active._output);
        }
        self.gain_state.clear();
        self.oscillator_state.clear();
    }

    pub fn is_active(&self) -> bool {
        self.active.is_some()
    }

    pub fn handles_mut(&mut self) -> Option<&mut GraphHandles> {
        self.active.as_mut().map(|a| &mut a.handles)
    }

    pub fn sample_rate(&self) -> Option<u32> {
        self.active.as_ref().map(|a| a.sample_rate)
    }

    /// Seconds since the live graph was built.
    pub fn current_time(&self) -> Option<f64> {
        self.active
            .as_ref()
            .map(|a| a.started_at.elapsed().as_secs_f64())
    }

    pub fn gain_state(&self) -> &HashMap<String, GainState> {
        &self.gain_state
    }

    pub fn oscillator_state(&self) -> &HashMap<String, OscillatorState> {
        &self.oscillator_state
    }

    /// Parameter bridge: set the named gain node immediately and mirror the
    /// value. No validation; the input control clamps to [0, 1]. Unknown
    /// names and inactive sessions are ignored.
    pub fn handle_gain_change(&mut self, node_name: &str, value: f32) {
        let Some(active) = self.active.as_ref() else {
            return;
        };
        let node = match node_name {
            LEFT_GAIN => &active.handles.left_gain,
            RIGHT_GAIN => &active.handles.right_gain,
            _ => return,
        };
        node.set(value);
        if let Some(state) = self.gain_state.get_mut(node_name) {
            state.value = value;
        }
    }

    /// Parameter bridge: set the named oscillator's frequency immediately
    /// and mirror the value. Range [200, 22000] Hz is the caller's job.
    pub fn handle_frequency_change(&mut self, node_name: &str, value: f32) {
        let Some(active) = self.active.as_ref() else {
            return;
        };
        let node = match node_name {
            LEFT_OSCILLATOR => active.handles.left_oscillator.as_ref(),
            RIGHT_OSCILLATOR => active.handles.right_oscillator.as_ref(),
            _ => None,
        };
        let Some(node) = node else {
            return;
        };
        node.set_frequency(value);
        if let Some(state) = self.oscillator_state.get_mut(node_name) {
            state.frequency_hz = value;
        }
    }

    fn mirror_initial_state(&mut self, handles: &GraphHandles) {
        self.gain_state.insert(
            LEFT_GAIN.into(),
            GainState {
                value: handles.left_gain.value(),
                channel: ChannelRoute::Left,
            },
        );
        self.gain_state.insert(
            RIGHT_GAIN.into(),
            GainState {
                value: handles.right_gain.value(),
                channel: ChannelRoute::Right,
            },
        );
        if let Some(osc) = &handles.left_oscillator {
            self.oscillator_state.insert(
                LEFT_OSCILLATOR.into(),
                OscillatorState {
                    frequency_hz: osc.frequency(),
                    channel: ChannelRoute::Left,
                },
            );
        }
        if let Some(osc) = &handles.right_oscillator {
            self.oscillator_state.insert(
                RIGHT_OSCILLATOR.into(),
                OscillatorState {
                    frequency_hz: osc.frequency(),
                    channel: ChannelRoute::Right,
                },
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{default_oscillator_source, PcmBuffer, StereoProcessor};
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Test host: counts live streams and lets tests pump the processor.
    struct FakeHost {
        live_outputs: Arc<AtomicUsize>,
        outputs_opened: usize,
        captures_opened: usize,
        deny_capture: bool,
    }

    struct FakeOutput {
        live: Arc<AtomicUsize>,
        processor: Arc<Mutex<StereoProcessor>>,
    }

    impl Drop for FakeOutput {
        fn drop(&mut self) {
            self.live.fetch_sub(1, Ordering::SeqCst);
        }
    }

    struct FakeCapture;

    impl FakeHost {
        fn new() -> Self {
            Self {
                live_outputs: Arc::new(AtomicUsize::new(0)),
                outputs_opened: 0,
                captures_opened: 0,
                deny_capture: false,
            }
        }
    }

    impl AudioHost for FakeHost {
        type Output = FakeOutput;
        type Capture = FakeCapture;

        fn open_output(
            &mut self,
            requested_rate: Option<u32>,
            build: impl FnOnce(u32) -> StereoProcessor,
        ) -> Result<(Self::Output, u32), VizError> {
            let rate = requested_rate.unwrap_or(48_000);
            self.outputs_opened += 1;
            self.live_outputs.fetch_add(1, Ordering::SeqCst);
            Ok((
                FakeOutput {
                    live: Arc::clone(&self.live_outputs),
                    processor: Arc::new(Mutex::new(build(rate))),
                },
                rate,
            ))
        }

        fn open_capture(
            &mut self,
            _ring: Arc<Mutex<CaptureRing>>,
        ) -> Result<(Self::Capture, u32), VizError> {
            self.captures_opened += 1;
            if self.deny_capture {
                return Err(VizError::PermissionDenied("denied by test".into()));
            }
            Ok((FakeCapture, 48_000))
        }
    }

    fn session() -> Session<FakeHost> {
        Session::new(FakeHost::new(), 32)
    }

    fn log() -> DebugLogger {
        DebugLogger::new(false)
    }

    #[test]
    fn oscillator_start_creates_default_nodes() {
        let mut s = session();
        s.start_visualization(default_oscillator_source(), &mut log())
            .unwrap();

        assert!(s.is_active());
        assert_eq!(s.sample_rate(), Some(48_000));
        let handles = s.handles_mut().unwrap();
        assert_eq!(handles.left_gain.value(), 1.0);
        assert_eq!(handles.right_gain.value(), 1.0);
        assert_eq!(
            handles.left_oscillator.as_ref().unwrap().frequency(),
            19_000.0
        );
        assert_eq!(
            handles.right_oscillator.as_ref().unwrap().frequency(),
            19_000.0
        );
        assert_eq!(s.gain_state()[LEFT_GAIN].value, 1.0);
        assert_eq!(s.gain_state()[LEFT_GAIN].channel, ChannelRoute::Left);
        assert_eq!(s.oscillator_state()[RIGHT_OSCILLATOR].frequency_hz, 19_000.0);
    }

    #[test]
    fn double_start_keeps_a_single_live_context() {
        let mut s = session();
        let mut log = log();
        s.start_visualization(default_oscillator_source(), &mut log)
            .unwrap();
        s.start_visualization(default_oscillator_source(), &mut log)
            .unwrap();

        assert_eq!(s.host.outputs_opened, 2);
        assert_eq!(s.host.live_outputs.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn gain_change_updates_node_and_mirror() {
        let mut s = session();
        s.start_visualization(default_oscillator_source(), &mut log())
            .unwrap();

        s.handle_gain_change(LEFT_GAIN, 0.5);
        assert_eq!(s.gain_state()[LEFT_GAIN].value, 0.5);
        assert_eq!(s.handles_mut().unwrap().left_gain.value(), 0.5);
        // The other channel is untouched.
        assert_eq!(s.gain_state()[RIGHT_GAIN].value, 1.0);
    }

    #[test]
    fn gain_change_is_effective_within_one_quantum() {
        let mut s = session();
        s.start_visualization(
            AudioSource::Oscillator {
                left_freq_hz: 1_000.0,
                right_freq_hz: 1_000.0,
            },
            &mut log(),
        )
        .unwrap();
        s.handle_gain_change(LEFT_GAIN, 0.25);

        let processor = Arc::clone(&s.active.as_ref().unwrap()._output.processor);
        let mut out = vec![0.0f32; 512];
        processor.lock().unwrap().process(&mut out);
        let left_peak = out.chunks(2).map(|f| f[0].abs()).fold(0.0f32, f32::max);
        assert!(left_peak > 0.2 && left_peak <= 0.2501, "peak {}", left_peak);
    }

    #[test]
    fn frequency_change_while_running_updates_state_without_teardown() {
        let mut s = session();
        s.start_visualization(default_oscillator_source(), &mut log())
            .unwrap();

        s.handle_frequency_change(LEFT_OSCILLATOR, 5_000.0);
        assert_eq!(s.oscillator_state()[LEFT_OSCILLATOR].frequency_hz, 5_000.0);
        assert_eq!(
            s.handles_mut()
                .unwrap()
                .left_oscillator
                .as_ref()
                .unwrap()
                .frequency(),
            5_000.0
        );
        assert!(s.is_active());
        assert_eq!(s.host.live_outputs.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn unknown_node_names_are_ignored() {
        let mut s = session();
        s.start_visualization(default_oscillator_source(), &mut log())
            .unwrap();
        s.handle_gain_change("center_gain", 0.1);
        s.handle_frequency_change("sub_oscillator", 60.0);
        assert_eq!(s.gain_state().len(), 2);
        assert_eq!(s.oscillator_state().len(), 2);
    }

    #[test]
    fn denied_microphone_reverts_to_selection_state() {
        let mut s = session();
        s.host.deny_capture = true;

        let err = s
            .start_visualization(AudioSource::Microphone, &mut log())
            .unwrap_err();
        assert!(matches!(err, VizError::PermissionDenied(_)));
        assert!(!s.is_active());
        assert!(s.handles_mut().is_none());
        assert!(s.gain_state().is_empty());
        assert_eq!(s.host.captures_opened, 1);
        assert_eq!(s.host.outputs_opened, 0);
        assert_eq!(s.host.live_outputs.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn teardown_releases_everything() {
        let mut s = session();
        let mut log = log();
        s.start_visualization(default_oscillator_source(), &mut log)
            .unwrap();
        s.teardown(&mut log);

        assert!(!s.is_active());
        assert!(s.gain_state().is_empty());
        assert!(s.oscillator_state().is_empty());
        assert_eq!(s.host.live_outputs.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn bridge_is_a_noop_without_a_graph() {
        let mut s = session();
        s.handle_gain_change(LEFT_GAIN, 0.5);
        assert!(s.gain_state().is_empty());
    }

    #[test]
    fn file_source_requests_the_file_rate() {
        let mut s = session();
        let pcm = PcmBuffer {
            sample_rate: 22_050,
            channels: 1,
            data: vec![0.0; 64],
        };
        s.start_visualization(AudioSource::FileBuffer(pcm), &mut log())
            .unwrap();
        assert_eq!(s.sample_rate(), Some(22_050));
        assert!(s.oscillator_state().is_empty());
    }
}
