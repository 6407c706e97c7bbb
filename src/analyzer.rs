//! Per-channel spectral and waveform analysis.
//!
//! The audio callback pushes raw samples into a small ring tap; the render
//! side quantizes them on demand into 8-bit frequency-domain and time-domain
//! sequences. FFT and windowing come from the `spectrum-analyzer` crate.

use spectrum_analyzer::scaling::divide_by_N_sqrt;
use spectrum_analyzer::windows::hann_window;
use spectrum_analyzer::{samples_fft_to_spectrum, FrequencyLimit};
use std::sync::{Arc, Mutex};

/// Decibel range mapped onto the 0..=255 magnitude scale.
const MIN_DB: f32 = -100.0;
const MAX_DB: f32 = -30.0;

/// Fixed-capacity ring of the most recent samples for one channel.
pub struct TapRing {
    samples: Vec<f32>,
    write_pos: usize,
}

impl TapRing {
    pub fn new(capacity: usize) -> Self {
        Self {
            samples: vec![0.0; capacity],
            write_pos: 0,
        }
    }

    pub fn push(&mut self, sample: f32) {
        self.samples[self.write_pos] = sample;
        self.write_pos = (self.write_pos + 1) % self.samples.len();
    }

    /// Copy the ring into `out` ordered oldest to newest.
    /// `out` must be exactly the ring capacity.
    fn copy_ordered(&self, out: &mut [f32]) {
        let len = self.samples.len();
        for (i, slot) in out.iter_mut().enumerate() {
            *slot = self.samples[(self.write_pos + i) % len];
        }
    }
}

/// Shared handle the audio thread writes through.
#[derive(Clone)]
pub struct AnalyzerTap {
    ring: Arc<Mutex<TapRing>>,
}

impl AnalyzerTap {
    pub fn new(capacity: usize) -> Self {
        Self {
            ring: Arc::new(Mutex::new(TapRing::new(capacity))),
        }
    }

    /// Push one sample from the audio callback.
    pub fn push(&self, sample: f32) {
        if let Ok(mut ring) = self.ring.lock() {
            ring.push(sample);
        }
    }
}

/// Render-side view of one channel's tap.
///
/// Both sampling calls refresh an internal buffer and return a borrow of it,
/// so callers must read the slice before sampling again. The FFT size is
/// frozen for the session.
pub struct ChannelAnalyzer {
    tap: AnalyzerTap,
    sample_rate: u32,
    fft_size: usize,
    scratch: Vec<f32>,
    freq_bytes: Vec<u8>,
    time_bytes: Vec<u8>,
}

impl ChannelAnalyzer {
    pub fn new(tap: AnalyzerTap, sample_rate: u32, fft_size: usize) -> Self {
        let buffer_len = fft_size / 2;
        Self {
            tap,
            sample_rate,
            fft_size,
            scratch: vec![0.0; fft_size],
            freq_bytes: vec![0; buffer_len],
            time_bytes: vec![0; buffer_len],
        }
    }

    /// Number of values produced by each sampling call.
    pub fn buffer_len(&self) -> usize {
        self.fft_size / 2
    }

    /// Refresh and return the log-scaled spectral magnitudes, one byte per
    /// bin. Silence maps to 0; magnitudes at or above -30 dB saturate at 255.
    pub fn sample_frequency_domain(&mut self) -> &[u8] {
        self.snapshot();

        let windowed = hann_window(&self.scratch);
        let spectrum = samples_fft_to_spectrum(
            &windowed,
            self.sample_rate,
            FrequencyLimit::All,
            Some(&divide_by_N_sqrt),
        );

        match spectrum {
            Ok(spectrum) => {
                let data = spectrum.data();
                let bins = data.len().max(1);
                let out_len = self.freq_bytes.len();
                for i in 0..out_len {
                    // Map the spectrum's bins proportionally onto buffer_len
                    // slots so the output length is independent of how the
                    // FFT reports its bins.
                    let idx = (i * bins / out_len).min(bins - 1);
                    let magnitude = data[idx].1.val();
                    self.freq_bytes[i] = quantize_db(magnitude);
                }
            }
            Err(_) => self.freq_bytes.fill(0),
        }

        &self.freq_bytes
    }

    /// Refresh and return the waveform amplitudes, one byte per slot,
    /// centered at 128 for silence.
    pub fn sample_time_domain(&mut self) -> &[u8] {
        self.snapshot();

        let out_len = self.time_bytes.len();
        let start = self.scratch.len() - out_len;
        for (i, &sample) in self.scratch[start..].iter().enumerate() {
            self.time_bytes[i] = quantize_amplitude(sample);
        }

        &self.time_bytes
    }

    fn snapshot(&mut self) {
        if let Ok(ring) = self.tap.ring.lock() {
            ring.copy_ordered(&mut self.scratch);
        } else {
            self.scratch.fill(0.0);
        }
    }
}

/// Spectral magnitude to byte: 20·log10 clamped to [-100, -30] dB.
fn quantize_db(magnitude: f32) -> u8 {
    if magnitude <= 0.0 {
        return 0;
    }
    let db = 20.0 * magnitude.log10();
    let scaled = (db - MIN_DB) / (MAX_DB - MIN_DB) * 255.0;
    scaled.clamp(0.0, 255.0) as u8
}

/// Waveform sample to byte: [-1, 1] mapped around 128.
fn quantize_amplitude(sample: f32) -> u8 {
    (128.0 + sample.clamp(-1.0, 1.0) * 128.0).clamp(0.0, 255.0) as u8
}

/// Arithmetic mean of a level sequence, used by the audio level meters.
pub fn mean_level(bytes: &[u8]) -> f32 {
    if bytes.is_empty() {
        return 0.0;
    }
    bytes.iter().map(|&b| b as f32).sum::<f32>() / bytes.len() as f32
}

#[cfg(test)]
mod tests {
    use super::*;

    fn analyzer_with(samples: &[f32], fft_size: usize) -> ChannelAnalyzer {
        let tap = AnalyzerTap::new(fft_size);
        for &s in samples {
            tap.push(s);
        }
        ChannelAnalyzer::new(tap, 48_000, fft_size)
    }

    #[test]
    fn sequences_have_buffer_len_elements() {
        for fft_size in [16usize, 32, 64, 1024] {
            let mut analyzer = analyzer_with(&vec![0.0; fft_size], fft_size);
            assert_eq!(analyzer.buffer_len(), fft_size / 2);
            assert_eq!(analyzer.sample_frequency_domain().len(), fft_size / 2);
            assert_eq!(analyzer.sample_time_domain().len(), fft_size / 2);
        }
    }

    #[test]
    fn silence_is_zero_magnitude_and_centered_waveform() {
        let mut analyzer = analyzer_with(&[0.0; 32], 32);
        assert!(analyzer.sample_frequency_domain().iter().all(|&b| b == 0));
        assert!(analyzer.sample_time_domain().iter().all(|&b| b == 128));
    }

    #[test]
    fn full_scale_samples_saturate_the_waveform() {
        let mut analyzer = analyzer_with(&[1.0; 32], 32);
        assert!(analyzer.sample_time_domain().iter().all(|&b| b == 255));
        let mut analyzer = analyzer_with(&[-1.0; 32], 32);
        assert!(analyzer.sample_time_domain().iter().all(|&b| b == 0));
    }

    #[test]
    fn tone_peaks_near_its_bin() {
        // 6 kHz sine at 48 kHz with a 32-point FFT: 1.5 kHz per bin, so the
        // energy should land around slot 4 of 16.
        let fft_size = 32;
        let samples: Vec<f32> = (0..fft_size)
            .map(|i| (2.0 * std::f32::consts::PI * 6_000.0 * i as f32 / 48_000.0).sin())
            .collect();
        let mut analyzer = analyzer_with(&samples, fft_size);
        let freq = analyzer.sample_frequency_domain();
        let peak = freq
            .iter()
            .enumerate()
            .max_by_key(|(_, &v)| v)
            .map(|(i, _)| i)
            .unwrap();
        assert!((3..=5).contains(&peak), "peak at slot {}", peak);
    }

    #[test]
    fn mean_level_boundaries() {
        assert_eq!(mean_level(&[0; 16]), 0.0);
        assert_eq!(mean_level(&[255; 16]), 255.0);
        assert_eq!(mean_level(&[10, 20, 30, 40]), 25.0);
        assert_eq!(mean_level(&[]), 0.0);
    }

    #[test]
    fn tap_keeps_the_most_recent_window() {
        let tap = AnalyzerTap::new(4);
        for s in [1.0, 2.0, 3.0, 4.0, 5.0, 6.0] {
            tap.push(s);
        }
        let mut out = [0.0; 4];
        tap.ring.lock().unwrap().copy_ordered(&mut out);
        assert_eq!(out, [3.0, 4.0, 5.0, 6.0]);
    }
}
