//! Audio routing graph: sources, per-channel gain, analyzer taps.
//!
//! The graph is wired once per visualization session and then driven by the
//! platform's output callback through [`StereoProcessor::process`]. Node
//! parameters are atomic cells shared with the UI side, read once per
//! processing quantum, so live edits never interrupt the stream.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use crate::analyzer::{AnalyzerTap, ChannelAnalyzer};
use crate::config::DEFAULT_OSC_FREQ_HZ;

/// Stereo signal path identifier.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChannelRoute {
    Left,
    Right,
}

/// Atomic f32 cell shared between the UI and the audio thread.
#[derive(Clone)]
struct ParamCell(Arc<AtomicU32>);

impl ParamCell {
    fn new(value: f32) -> Self {
        Self(Arc::new(AtomicU32::new(value.to_bits())))
    }

    fn set(&self, value: f32) {
        self.0.store(value.to_bits(), Ordering::Relaxed);
    }

    fn get(&self) -> f32 {
        f32::from_bits(self.0.load(Ordering::Relaxed))
    }
}

/// Gain stage for one channel. Value is expected in [0, 1]; clamping is the
/// input control's responsibility, not the node's.
#[derive(Clone)]
pub struct GainNode {
    value: ParamCell,
}

impl GainNode {
    pub fn new(value: f32) -> Self {
        Self {
            value: ParamCell::new(value),
        }
    }

    /// Instantaneous set, honored within one processing quantum.
    pub fn set(&self, value: f32) {
        self.value.set(value);
    }

    pub fn value(&self) -> f32 {
        self.value.get()
    }
}

/// Sine oscillator control handle. Frequency range [200, 22000] Hz is
/// enforced by the input control; the phase state lives in the processor.
#[derive(Clone)]
pub struct OscillatorNode {
    frequency_hz: ParamCell,
}

impl OscillatorNode {
    pub fn new(frequency_hz: f32) -> Self {
        Self {
            frequency_hz: ParamCell::new(frequency_hz),
        }
    }

    pub fn set_frequency(&self, frequency_hz: f32) {
        self.frequency_hz.set(frequency_hz);
    }

    pub fn frequency(&self) -> f32 {
        self.frequency_hz.get()
    }
}

/// Decoded PCM audio, interleaved f32.
#[derive(Debug)]
pub struct PcmBuffer {
    pub sample_rate: u32,
    pub channels: u16,
    pub data: Vec<f32>,
}

impl PcmBuffer {
    pub fn frames(&self) -> usize {
        if self.channels == 0 {
            return 0;
        }
        self.data.len() / self.channels as usize
    }

    /// Split one frame into a stereo pair: mono duplicates to both channels,
    /// wider layouts contribute their first two channels.
    fn split_frame(&self, frame: usize) -> [f32; 2] {
        let base = frame * self.channels as usize;
        match self.channels {
            0 => [0.0, 0.0],
            1 => [self.data[base], self.data[base]],
            _ => [self.data[base], self.data[base + 1]],
        }
    }
}

/// Stereo frames captured from the microphone, shared between the capture
/// callback and the output callback. Oldest frames are dropped on overflow.
pub struct CaptureRing {
    frames: VecDeque<[f32; 2]>,
    capacity: usize,
}

impl CaptureRing {
    pub fn new(capacity: usize) -> Self {
        Self {
            frames: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Push interleaved input of any channel count: mono duplicates, wider
    /// layouts contribute their first two channels.
    pub fn push_interleaved(&mut self, data: &[f32], channels: u16) {
        if channels == 0 {
            return;
        }
        for chunk in data.chunks(channels as usize) {
            let frame = match chunk {
                [] => continue,
                [mono] => [*mono, *mono],
                [l, r, ..] => [*l, *r],
            };
            if self.frames.len() == self.capacity {
                self.frames.pop_front();
            }
            self.frames.push_back(frame);
        }
    }

    fn pop_frame(&mut self) -> Option<[f32; 2]> {
        self.frames.pop_front()
    }
}

/// The audio source chosen for a session. Exactly one is active at a time.
pub enum AudioSource {
    /// Two independent oscillators, one per channel.
    Oscillator {
        left_freq_hz: f32,
        right_freq_hz: f32,
    },
    /// Live microphone capture.
    Microphone,
    /// An already-decoded PCM buffer, played once.
    FileBuffer(PcmBuffer),
}

/// Phase-accumulating sine voice for one channel.
struct OscVoice {
    node: OscillatorNode,
    phase: f32,
    sample_rate: f32,
}

impl OscVoice {
    fn new(node: OscillatorNode, sample_rate: u32) -> Self {
        Self {
            node,
            phase: 0.0,
            sample_rate: sample_rate as f32,
        }
    }

    /// Phase increment for the current block; the frequency parameter is
    /// read once per processing quantum.
    fn step(&self) -> f32 {
        2.0 * std::f32::consts::PI * self.node.frequency() / self.sample_rate
    }

    fn next_sample(&mut self, step: f32) -> f32 {
        let s = self.phase.sin();
        self.phase += step;
        if self.phase > 2.0 * std::f32::consts::PI {
            self.phase -= 2.0 * std::f32::consts::PI;
        }
        s
    }
}

/// Source-specific front end of the graph. The oscillator path feeds the
/// channel strips directly; capture and file paths go through the splitter
/// (deinterleave) first.
enum SourceStage {
    Oscillators { left: OscVoice, right: OscVoice },
    Capture { ring: Arc<Mutex<CaptureRing>> },
    Buffer { pcm: PcmBuffer, cursor: usize },
}

/// One channel's gain stage plus its analyzer tap. The tap observes the
/// post-gain signal, matching gain → analyzer wiring.
struct ChannelStrip {
    gain: GainNode,
    tap: AnalyzerTap,
}

impl ChannelStrip {
    /// Apply the block gain and feed the analyzer tap.
    fn run(&self, sample: f32, gain: f32) -> f32 {
        let out = sample * gain;
        self.tap.push(out);
        out
    }
}

/// The wired graph, executed on the platform's audio thread.
///
/// `process` renders interleaved stereo: left in slot 0, right in slot 1
/// (the merger stage). Both gains are read once per call.
pub struct StereoProcessor {
    stage: SourceStage,
    left: ChannelStrip,
    right: ChannelStrip,
}

impl StereoProcessor {
    pub fn process(&mut self, out: &mut [f32]) {
        let gain_left = self.left.gain.value();
        let gain_right = self.right.gain.value();

        match &mut self.stage {
            SourceStage::Oscillators { left, right } => {
                let step_left = left.step();
                let step_right = right.step();
                for frame in out.chunks_mut(2) {
                    let l = left.next_sample(step_left);
                    let r = right.next_sample(step_right);
                    write_frame(frame, &self.left, &self.right, l, r, gain_left, gain_right);
                }
            }
            SourceStage::Capture { ring } => {
                for frame in out.chunks_mut(2) {
                    let [l, r] = ring
                        .lock()
                        .ok()
                        .and_then(|mut ring| ring.pop_frame())
                        .unwrap_or([0.0, 0.0]);
                    write_frame(frame, &self.left, &self.right, l, r, gain_left, gain_right);
                }
            }
            SourceStage::Buffer { pcm, cursor } => {
                let total = pcm.frames();
                for frame in out.chunks_mut(2) {
                    let [l, r] = if *cursor < total {
                        let f = pcm.split_frame(*cursor);
                        *cursor += 1;
                        f
                    } else {
                        // Past the end of the buffer the source is silent.
                        [0.0, 0.0]
                    };
                    write_frame(frame, &self.left, &self.right, l, r, gain_left, gain_right);
                }
            }
        }
    }
}

fn write_frame(
    frame: &mut [f32],
    left: &ChannelStrip,
    right: &ChannelStrip,
    l: f32,
    r: f32,
    gain_left: f32,
    gain_right: f32,
) {
    let l = left.run(l, gain_left);
    let r = right.run(r, gain_right);
    frame[0] = l;
    if frame.len() > 1 {
        frame[1] = r;
    }
}

/// Handle set returned by graph construction. Oscillator handles are present
/// only for the oscillator source.
pub struct GraphHandles {
    pub left_gain: GainNode,
    pub right_gain: GainNode,
    pub left_analyzer: ChannelAnalyzer,
    pub right_analyzer: ChannelAnalyzer,
    pub left_oscillator: Option<OscillatorNode>,
    pub right_oscillator: Option<OscillatorNode>,
}

/// Common tail of every wiring: two gain nodes at 1.0 and two analyzer taps.
fn wire_strips(sample_rate: u32, fft_size: usize) -> (ChannelStrip, ChannelStrip, GraphHandles) {
    let left_gain = GainNode::new(1.0);
    let right_gain = GainNode::new(1.0);
    let left_tap = AnalyzerTap::new(fft_size);
    let right_tap = AnalyzerTap::new(fft_size);

    let handles = GraphHandles {
        left_gain: left_gain.clone(),
        right_gain: right_gain.clone(),
        left_analyzer: ChannelAnalyzer::new(left_tap.clone(), sample_rate, fft_size),
        right_analyzer: ChannelAnalyzer::new(right_tap.clone(), sample_rate, fft_size),
        left_oscillator: None,
        right_oscillator: None,
    };

    let left = ChannelStrip {
        gain: left_gain,
        tap: left_tap,
    };
    let right = ChannelStrip {
        gain: right_gain,
        tap: right_tap,
    };
    (left, right, handles)
}

/// Oscillator wiring: two independent voices feed their channel's gain
/// directly, no splitter. Intentional asymmetry versus the split-source
/// paths.
pub fn build_oscillator_graph(
    left_freq_hz: f32,
    right_freq_hz: f32,
    sample_rate: u32,
    fft_size: usize,
) -> (StereoProcessor, GraphHandles) {
    let (left, right, mut handles) = wire_strips(sample_rate, fft_size);
    let left_osc = OscillatorNode::new(left_freq_hz);
    let right_osc = OscillatorNode::new(right_freq_hz);
    handles.left_oscillator = Some(left_osc.clone());
    handles.right_oscillator = Some(right_osc.clone());

    let processor = StereoProcessor {
        stage: SourceStage::Oscillators {
            left: OscVoice::new(left_osc, sample_rate),
            right: OscVoice::new(right_osc, sample_rate),
        },
        left,
        right,
    };
    (processor, handles)
}

/// Microphone wiring: capture ring → splitter → gain per channel.
pub fn build_capture_graph(
    ring: Arc<Mutex<CaptureRing>>,
    sample_rate: u32,
    fft_size: usize,
) -> (StereoProcessor, GraphHandles) {
    let (left, right, handles) = wire_strips(sample_rate, fft_size);
    let processor = StereoProcessor {
        stage: SourceStage::Capture { ring },
        left,
        right,
    };
    (processor, handles)
}

/// Decoded-file wiring: PCM buffer → splitter → gain per channel.
pub fn build_file_graph(
    pcm: PcmBuffer,
    sample_rate: u32,
    fft_size: usize,
) -> (StereoProcessor, GraphHandles) {
    let (left, right, handles) = wire_strips(sample_rate, fft_size);
    let processor = StereoProcessor {
        stage: SourceStage::Buffer { pcm, cursor: 0 },
        left,
        right,
    };
    (processor, handles)
}

/// Default oscillator source: both channels at 19 kHz.
pub fn default_oscillator_source() -> AudioSource {
    AudioSource::Oscillator {
        left_freq_hz: DEFAULT_OSC_FREQ_HZ,
        right_freq_hz: DEFAULT_OSC_FREQ_HZ,
    }
}
