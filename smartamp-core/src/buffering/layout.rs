//! Conversions between wire order and the engine's channel-block order.
//!
//! Wire order is frame-interleaved: `L0 R0 L1 R1 ...`. The engine only takes
//! contiguous per-channel blocks: `L0 L1 ... | R0 R1 ...`. Sample width is
//! normalised in the same pass.

use serde::{Deserialize, Serialize};

use crate::format::SampleWidth;

/// How the feedback stream packs current and voltage sense per frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum IvLayout {
    /// `[c0, v0, c1, v1]`: current/voltage pairs per channel.
    #[default]
    Interleaved16,
    /// `[c0, c1, v0, v1]`: all currents, then all voltages.
    Deinterleaved16,
    /// Pairs as in `Interleaved16`, but the voltage slot only carries a signed
    /// 8-bit sample in its low byte.
    Voltage8,
}

impl IvLayout {
    /// Feedback slots per frame for `channels` speaker channels.
    pub fn slots_per_frame(self, channels: usize) -> usize {
        channels * 2
    }

    /// Slot offsets of (current, voltage) for channel `ch` inside one frame.
    #[inline]
    fn offsets(self, ch: usize, channels: usize) -> (usize, usize) {
        match self {
            IvLayout::Interleaved16 | IvLayout::Voltage8 => (2 * ch, 2 * ch + 1),
            IvLayout::Deinterleaved16 => (ch, channels + ch),
        }
    }
}

/// Widen an 8-bit voltage code held in the low byte to a 16-bit sample.
#[inline]
fn expand_voltage8(x: i16) -> i16 {
    ((x as u16 & 0x00FF) as u8 as i8 as i16) << 8
}

/// Interleaved host samples → engine channel blocks.
///
/// Reads `frames * channels` values from `src`, writes the same count to `dst`.
pub fn interleaved_to_blocks(
    src: &[i32],
    frames: usize,
    channels: usize,
    width: SampleWidth,
    dst: &mut [i16],
) {
    for ch in 0..channels {
        let block = &mut dst[ch * frames..(ch + 1) * frames];
        for (i, out) in block.iter_mut().enumerate() {
            *out = width.to_engine(src[i * channels + ch]);
        }
    }
}

/// Engine channel blocks → interleaved host samples.
pub fn blocks_to_interleaved(
    src: &[i16],
    frames: usize,
    channels: usize,
    width: SampleWidth,
    dst: &mut [i32],
) {
    for ch in 0..channels {
        let block = &src[ch * frames..(ch + 1) * frames];
        for (i, &s) in block.iter().enumerate() {
            dst[i * channels + ch] = width.from_engine(s);
        }
    }
}

/// Split interleaved feedback frames into current and voltage channel blocks.
///
/// `current` and `voltage` each receive `frames * channels` samples.
pub fn split_iv(
    src: &[i32],
    frames: usize,
    channels: usize,
    layout: IvLayout,
    width: SampleWidth,
    current: &mut [i16],
    voltage: &mut [i16],
) {
    let slots = layout.slots_per_frame(channels);
    for ch in 0..channels {
        let (c_off, v_off) = layout.offsets(ch, channels);
        for i in 0..frames {
            let base = i * slots;
            current[ch * frames + i] = width.to_engine(src[base + c_off]);
            let v = width.to_engine(src[base + v_off]);
            voltage[ch * frames + i] = match layout {
                IvLayout::Voltage8 => expand_voltage8(v),
                _ => v,
            };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interleaved_becomes_channel_blocks() {
        let src = [1, 10, 2, 20, 3, 30];
        let mut dst = [0i16; 6];
        interleaved_to_blocks(&src, 3, 2, SampleWidth::Width16, &mut dst);
        assert_eq!(dst, [1, 2, 3, 10, 20, 30]);
    }

    #[test]
    fn blocks_become_interleaved() {
        let src = [1i16, 2, 3, 10, 20, 30];
        let mut dst = [0i32; 6];
        blocks_to_interleaved(&src, 3, 2, SampleWidth::Width16, &mut dst);
        assert_eq!(dst, [1, 10, 2, 20, 3, 30]);
    }

    #[test]
    fn block_conversion_narrows_and_widens() {
        let src = [0x0001_8000, -0x0002_0000];
        let mut blocks = [0i16; 2];
        interleaved_to_blocks(&src, 1, 2, SampleWidth::Width32Shifted, &mut blocks);
        assert_eq!(blocks, [1, -2]);

        let mut back = [0i32; 2];
        blocks_to_interleaved(&blocks, 1, 2, SampleWidth::Width32Shifted, &mut back);
        assert_eq!(back, [0x0001_0000, -0x0002_0000]);
    }

    #[test]
    fn mono_is_a_plain_copy() {
        let src = [4, 5, 6];
        let mut dst = [0i16; 3];
        interleaved_to_blocks(&src, 3, 1, SampleWidth::Width16, &mut dst);
        assert_eq!(dst, [4, 5, 6]);
    }

    #[test]
    fn iv_quads_split_into_current_and_voltage() {
        let (c0, v0, c1, v1) = (11, 21, 12, 22);
        let mut current = [0i16; 2];
        let mut voltage = [0i16; 2];
        split_iv(
            &[c0, v0, c1, v1],
            1,
            2,
            IvLayout::Interleaved16,
            SampleWidth::Width16,
            &mut current,
            &mut voltage,
        );
        assert_eq!(current, [11, 12]);
        assert_eq!(voltage, [21, 22]);
    }

    #[test]
    fn iv_blocks_span_frames() {
        // Two frames: [c0 v0 c1 v1] [c0' v0' c1' v1']
        let src = [1, 5, 2, 6, 3, 7, 4, 8];
        let mut current = [0i16; 4];
        let mut voltage = [0i16; 4];
        split_iv(
            &src,
            2,
            2,
            IvLayout::Interleaved16,
            SampleWidth::Width16,
            &mut current,
            &mut voltage,
        );
        assert_eq!(current, [1, 3, 2, 4]);
        assert_eq!(voltage, [5, 7, 6, 8]);
    }

    #[test]
    fn deinterleaved_layout_groups_currents_first() {
        let src = [1, 2, 5, 6];
        let mut current = [0i16; 2];
        let mut voltage = [0i16; 2];
        split_iv(
            &src,
            1,
            2,
            IvLayout::Deinterleaved16,
            SampleWidth::Width16,
            &mut current,
            &mut voltage,
        );
        assert_eq!(current, [1, 2]);
        assert_eq!(voltage, [5, 6]);
    }

    #[test]
    fn voltage8_expands_low_byte() {
        let src = [100, 0x7F, -100, 0xFF];
        let mut current = [0i16; 2];
        let mut voltage = [0i16; 2];
        split_iv(
            &src,
            1,
            2,
            IvLayout::Voltage8,
            SampleWidth::Width16,
            &mut current,
            &mut voltage,
        );
        assert_eq!(current, [100, -100]);
        assert_eq!(voltage, [0x7F00, -0x0100]);
    }

    #[test]
    fn iv_split_narrows_32_bit_containers() {
        let src = [0x0003_0000, 0x0004_0000];
        let mut current = [0i16; 1];
        let mut voltage = [0i16; 1];
        split_iv(
            &src,
            1,
            1,
            IvLayout::Interleaved16,
            SampleWidth::Width32Shifted,
            &mut current,
            &mut voltage,
        );
        assert_eq!(current, [3]);
        assert_eq!(voltage, [4]);
    }
}
