//! WAV decoding into a [`PcmBuffer`].
//!
//! The graph only ever sees already-decoded PCM; this is the one place file
//! bytes are interpreted. Anything hound rejects becomes a recoverable
//! [`VizError::DecodeFailure`].

use std::path::Path;

use crate::error::VizError;
use crate::graph::PcmBuffer;

/// Decode a WAV file to interleaved f32 PCM, normalizing integer formats.
pub fn decode_wav(path: &Path) -> Result<PcmBuffer, VizError> {
    let mut reader = hound::WavReader::open(path)
        .map_err(|e| VizError::DecodeFailure(format!("{}: {}", path.display(), e)))?;
    let spec = reader.spec();

    let data: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => reader
            .samples::<f32>()
            .collect::<Result<_, _>>()
            .map_err(|e| VizError::DecodeFailure(e.to_string()))?,
        hound::SampleFormat::Int => {
            let scale = (1i64 << (spec.bits_per_sample - 1)) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 / scale))
                .collect::<Result<_, _>>()
                .map_err(|e| VizError::DecodeFailure(e.to_string()))?
        }
    };

    if spec.channels == 0 || data.is_empty() {
        return Err(VizError::DecodeFailure(format!(
            "{}: no audio frames",
            path.display()
        )));
    }

    Ok(PcmBuffer {
        sample_rate: spec.sample_rate,
        channels: spec.channels,
        data,
    })
}
