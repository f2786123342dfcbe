//! Mono extraction from interleaved stereo PCM frames
//!
//! The monitoring stream interleaves two s16le channels but only one carries
//! the call audio; the other is silent. Which channel that is depends on the
//! upstream protocol, so the selection is a policy rather than hard-coded.

use serde::{Deserialize, Serialize};

use crate::protocol::{BYTES_PER_SAMPLE_PAIR, SAMPLE_SCALE};

/// Which interleaved channel the mono signal is derived from
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelSelect {
    /// Even-indexed samples of the interleaved stream
    Left,
    /// Odd-indexed samples, the talk channel in the observed protocol
    #[default]
    Right,
}

impl ChannelSelect {
    /// Byte offset of the selected sample within one interleaved pair
    fn byte_offset(self) -> usize {
        match self {
            ChannelSelect::Left => 0,
            ChannelSelect::Right => 2,
        }
    }
}

/// Owned mono float samples in [-1.0, 1.0]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MonoBuffer {
    samples: Vec<f32>,
}

impl MonoBuffer {
    pub fn new(samples: Vec<f32>) -> Self {
        Self { samples }
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn into_samples(self) -> Vec<f32> {
        self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// Converts one raw stream frame into one MonoBuffer
pub struct FrameDemuxer {
    select: ChannelSelect,
}

impl FrameDemuxer {
    pub fn new(select: ChannelSelect) -> Self {
        Self { select }
    }

    /// Extract the selected channel as normalized floats.
    ///
    /// One output sample per complete interleaved pair; a trailing partial
    /// pair is dropped. Undersized input yields an empty buffer, not an
    /// error.
    pub fn demux(&self, frame: &[u8]) -> MonoBuffer {
        let offset = self.select.byte_offset();

        let samples = frame
            .chunks_exact(BYTES_PER_SAMPLE_PAIR)
            .map(|pair| {
                let raw = i16::from_le_bytes([pair[offset], pair[offset + 1]]);
                f32::from(raw) / SAMPLE_SCALE
            })
            .collect();

        MonoBuffer::new(samples)
    }
}

impl Default for FrameDemuxer {
    fn default() -> Self {
        Self::new(ChannelSelect::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    /// Interleave (left, right) s16 pairs into a little-endian byte stream
    fn interleave(pairs: &[(i16, i16)]) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(pairs.len() * 4);
        for &(left, right) in pairs {
            bytes.extend_from_slice(&left.to_le_bytes());
            bytes.extend_from_slice(&right.to_le_bytes());
        }
        bytes
    }

    #[test]
    fn test_right_channel_selected() {
        let frame = interleave(&[(0, 16_384), (-32_768, -16_384), (123, 0)]);
        let mono = FrameDemuxer::new(ChannelSelect::Right).demux(&frame);

        assert_eq!(
            mono.samples(),
            &[16_384.0 / 32_767.0, -16_384.0 / 32_767.0, 0.0]
        );
    }

    #[test]
    fn test_left_channel_selected() {
        let frame = interleave(&[(100, 9_999), (-100, 9_999)]);
        let mono = FrameDemuxer::new(ChannelSelect::Left).demux(&frame);

        assert_eq!(mono.samples(), &[100.0 / 32_767.0, -100.0 / 32_767.0]);
    }

    #[test]
    fn test_seven_byte_frame_yields_one_sample() {
        // 7 bytes = one complete pair plus 3 trailing bytes, which are dropped
        let mut frame = interleave(&[(1, 2)]);
        frame.extend_from_slice(&[0xAA, 0xBB, 0xCC]);
        assert_eq!(frame.len(), 7);

        let mono = FrameDemuxer::default().demux(&frame);
        assert_eq!(mono.len(), 1);
        assert_eq!(mono.samples()[0], 2.0 / 32_767.0);
    }

    #[test]
    fn test_undersized_input_is_empty_not_an_error() {
        let demuxer = FrameDemuxer::default();
        assert!(demuxer.demux(&[]).is_empty());
        assert!(demuxer.demux(&[0x01]).is_empty());
        assert!(demuxer.demux(&[0x01, 0x02, 0x03]).is_empty());
    }

    proptest! {
        #[test]
        fn prop_length_is_floor_of_quarter(frame in proptest::collection::vec(any::<u8>(), 0..1024)) {
            let mono = FrameDemuxer::default().demux(&frame);
            prop_assert_eq!(mono.len(), frame.len() / 4);
        }

        #[test]
        fn prop_output_never_derived_from_left(
            pairs in proptest::collection::vec((any::<i16>(), any::<i16>()), 0..128),
            other_left in any::<i16>(),
        ) {
            let original = interleave(&pairs);
            let rewritten: Vec<(i16, i16)> =
                pairs.iter().map(|&(_, r)| (other_left, r)).collect();

            let demuxer = FrameDemuxer::new(ChannelSelect::Right);
            let a = demuxer.demux(&original);
            let b = demuxer.demux(&interleave(&rewritten));

            // Scrambling the left channel must not change the output,
            // and each sample is exactly R / 32767.0
            prop_assert_eq!(&a, &b);
            for (sample, &(_, r)) in a.samples().iter().zip(&pairs) {
                prop_assert_eq!(*sample, f32::from(r) / 32_767.0);
            }
        }
    }
}
