//! Sample-rate conversion for playback
//!
//! The monitoring stream arrives at a fixed 16 kHz; the output device runs at
//! whatever rate the host negotiated. Conversion is single-shot per buffer:
//! the converter is offered the entire input once and produces one output
//! chunk, with no filter state carried across buffers. A failed conversion
//! drops that buffer; an occasional miss must not abort a healthy stream.

use rubato::{FftFixedIn, Resampler};

use crate::audio::demux::MonoBuffer;
use crate::error::ConversionError;

/// Capability seam for rate conversion.
///
/// The shipped implementation is stateless across buffers; a persistent
/// filter fits behind the same interface.
pub trait PcmConverter {
    /// Convert one buffer from the source rate to the output rate
    fn convert(&mut self, input: &MonoBuffer) -> Result<Vec<f32>, ConversionError>;

    /// Discard any cross-buffer filter state
    fn reset(&mut self);
}

/// Output allocation for a conversion, with one frame of rounding headroom
pub fn output_capacity(input_frames: usize, input_rate: u32, output_rate: u32) -> usize {
    let scaled = input_frames as u64 * output_rate as u64;
    let ceil = (scaled + input_rate as u64 - 1) / input_rate as u64;
    ceil as usize + 1
}

/// Single-shot converter: a fresh FFT resampler instance per buffer.
pub struct SingleShotConverter {
    input_rate: u32,
    output_rate: u32,
}

impl SingleShotConverter {
    pub fn new(input_rate: u32, output_rate: u32) -> Self {
        Self {
            input_rate,
            output_rate,
        }
    }

    pub fn input_rate(&self) -> u32 {
        self.input_rate
    }

    pub fn output_rate(&self) -> u32 {
        self.output_rate
    }
}

impl PcmConverter for SingleShotConverter {
    fn convert(&mut self, input: &MonoBuffer) -> Result<Vec<f32>, ConversionError> {
        if input.is_empty() {
            return Ok(Vec::new());
        }

        if self.input_rate == self.output_rate {
            return Ok(input.samples().to_vec());
        }

        let mut resampler = FftFixedIn::<f32>::new(
            self.input_rate as usize,
            self.output_rate as usize,
            input.len(),
            1,
            1,
        )
        .map_err(|e| ConversionError::Init(e.to_string()))?;

        let mut output = Vec::with_capacity(output_capacity(
            input.len(),
            self.input_rate,
            self.output_rate,
        ));

        // The entire input is offered in one pull; there is no further data
        // within this conversion, so the filter tail is left behind.
        let chunks = resampler
            .process_partial(Some(&[input.samples()]), None)
            .map_err(|e| ConversionError::Resample(e.to_string()))?;

        if let Some(channel) = chunks.first() {
            output.extend_from_slice(channel);
        }

        Ok(output)
    }

    fn reset(&mut self) {
        // Nothing persists between buffers in the single-shot design
    }
}
