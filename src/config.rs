use serde::Deserialize;
use std::fs;
use std::path::PathBuf;

use crate::error::VizError;

/// Default FFT window size (power of two). Sixteen frequency bins.
pub const DEFAULT_FFT_SIZE: usize = 32;
/// Default horizontal gap between bars, in surface units.
pub const DEFAULT_GAP: f32 = 3.0;
/// Default padding split between the left and right edges of the bar panels.
pub const DEFAULT_PADDING: f32 = 20.0;
/// Viewport width (device pixels) above which numeric labels are drawn.
pub const DEFAULT_WIDE_THRESHOLD: f32 = 1024.0;
/// Default frame time in seconds (~60 fps).
pub const DEFAULT_FRAME_TIME: f32 = 0.016;

/// Default oscillator frequency, matching the analyzer's top bins.
pub const DEFAULT_OSC_FREQ_HZ: f32 = 19_000.0;
/// Oscillator frequency range enforced by the input controls.
pub const OSC_FREQ_MIN_HZ: f32 = 200.0;
pub const OSC_FREQ_MAX_HZ: f32 = 22_000.0;

/// Resolved visualizer configuration (CLI over config file over defaults).
#[derive(Clone, Debug)]
pub struct VizConfig {
    /// FFT window size; must be a power of two. Frozen for the session.
    pub fft_size: usize,
    /// Gap between bars in surface units.
    pub gap: f32,
    /// Total horizontal padding around the bar panels.
    pub padding: f32,
    /// Wide-viewport threshold in device pixels for numeric labels.
    pub wide_threshold: f32,
    /// Seconds between frames.
    pub frame_time: f32,
    /// Write diagnostics to the debug log file.
    pub debug: bool,
}

impl Default for VizConfig {
    fn default() -> Self {
        Self {
            fft_size: DEFAULT_FFT_SIZE,
            gap: DEFAULT_GAP,
            padding: DEFAULT_PADDING,
            wide_threshold: DEFAULT_WIDE_THRESHOLD,
            frame_time: DEFAULT_FRAME_TIME,
            debug: false,
        }
    }
}

impl VizConfig {
    /// Number of values in every sampled sequence: half the FFT size.
    pub fn buffer_len(&self) -> usize {
        self.fft_size / 2
    }

    /// Validate parameters the rest of the crate assumes.
    pub fn validate(&self) -> Result<(), VizError> {
        if !self.fft_size.is_power_of_two() || self.fft_size < 4 || self.fft_size > 4096 {
            return Err(VizError::Config(format!(
                "fft size must be a power of two in 4..=4096, got {}",
                self.fft_size
            )));
        }
        if self.gap < 0.0 || self.padding < 0.0 {
            return Err(VizError::Config(
                "gap and padding must be non-negative".into(),
            ));
        }
        if self.frame_time <= 0.0 {
            return Err(VizError::Config("frame time must be positive".into()));
        }
        Ok(())
    }
}

/// Optional user settings loaded from the config directory.
///
/// Missing or malformed files fall back to defaults; the CLI can always
/// override individual values.
#[derive(Debug, Default, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub viz: VizSettings,
}

#[derive(Debug, Default, Deserialize)]
pub struct VizSettings {
    pub fft_size: Option<usize>,
    pub gap: Option<f32>,
    pub padding: Option<f32>,
    pub wide_threshold: Option<f32>,
    pub frame_time: Option<f32>,
}

impl Settings {
    pub fn load() -> Self {
        let path = Self::config_path();
        if !path.exists() {
            return Self::default();
        }

        match fs::read_to_string(&path) {
            Ok(content) => toml::from_str(&content).unwrap_or_default(),
            Err(_) => Self::default(),
        }
    }

    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("twinscope")
            .join("config.toml")
    }

    /// Fold file settings into a config; CLI overrides are applied after.
    pub fn apply(&self, config: &mut VizConfig) {
        if let Some(v) = self.viz.fft_size {
            config.fft_size = v;
        }
        if let Some(v) = self.viz.gap {
            config.gap = v;
        }
        if let Some(v) = self.viz.padding {
            config.padding = v;
        }
        if let Some(v) = self.viz.wide_threshold {
            config.wide_threshold = v;
        }
        if let Some(v) = self.viz.frame_time {
            config.frame_time = v;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = VizConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.fft_size, 32);
        assert_eq!(config.buffer_len(), 16);
    }

    #[test]
    fn buffer_len_is_half_fft_size_for_powers_of_two() {
        for exp in 2..=12 {
            let config = VizConfig {
                fft_size: 1 << exp,
                ..VizConfig::default()
            };
            assert_eq!(config.buffer_len(), config.fft_size / 2);
        }
    }

    #[test]
    fn rejects_non_power_of_two_fft() {
        let config = VizConfig {
            fft_size: 48,
            ..VizConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_negative_geometry() {
        let config = VizConfig {
            gap: -1.0,
            ..VizConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn settings_apply_overrides_only_present_fields() {
        let settings: Settings = toml::from_str("[viz]\ngap = 5.0\n").unwrap();
        let mut config = VizConfig::default();
        settings.apply(&mut config);
        assert_eq!(config.gap, 5.0);
        assert_eq!(config.fft_size, DEFAULT_FFT_SIZE);
    }
}
