//! Moving samples between host streams and flat scratch arrays.
//!
//! `gather` keeps wire order (frame-interleaved). `scatter` writes frames back
//! with a slot mask: slots the engine drives take the next flat value, every
//! other slot gets silence.

use super::AudioStream;
use crate::error::{Result, SmartAmpError};
use crate::format::SampleWidth;

/// Copy `frames * channels` samples from the stream's read cursor into `out`.
///
/// The read cursor itself is not moved; the caller consumes once the tick is
/// done with the data.
pub fn gather(
    stream: &AudioStream,
    frames: usize,
    channels: usize,
    out: &mut [i32],
) -> Result<usize> {
    // Any format the normaliser cannot handle is a configuration bug.
    SampleWidth::try_from(stream.frame_format())?;

    let samples = frames * channels;
    if out.len() < samples {
        return Err(SmartAmpError::InvalidGeometry(format!(
            "gather of {samples} samples into a {} sample scratch",
            out.len()
        )));
    }

    let region = stream.region();
    let mut ptr = stream.read_cursor();
    for slot in &mut out[..samples] {
        ptr = region.wrap(ptr);
        *slot = stream.sample_at(ptr);
        ptr += 1;
    }
    Ok(samples)
}

/// Write `frames` frames of `total_slots` slots at the stream's write cursor.
///
/// For slot `y`, bit `y` of `slot_mask` decides between the next value of
/// `flat` and zero. `flat` therefore holds `popcount(mask)` values per frame.
pub fn scatter(
    flat: &[i32],
    stream: &mut AudioStream,
    frames: usize,
    total_slots: usize,
    slot_mask: u32,
) -> Result<usize> {
    SampleWidth::try_from(stream.frame_format())?;

    let per_frame = driven_slots(slot_mask, total_slots);
    if flat.len() < frames * per_frame {
        return Err(SmartAmpError::InvalidGeometry(format!(
            "scatter needs {} samples, got {}",
            frames * per_frame,
            flat.len()
        )));
    }

    let region = stream.region();
    let mut ptr = stream.write_cursor();
    let mut src = flat.iter();
    for _ in 0..frames {
        for slot in 0..total_slots {
            ptr = region.wrap(ptr);
            let value = if slot < 32 && slot_mask & (1 << slot) != 0 {
                src.next().copied().unwrap_or(0)
            } else {
                0
            };
            stream.set_sample_at(ptr, value);
            ptr += 1;
        }
    }
    Ok(frames * total_slots)
}

/// Number of mask bits that fall inside the first `total_slots` slots.
pub fn driven_slots(slot_mask: u32, total_slots: usize) -> usize {
    let window = if total_slots >= 32 {
        u32::MAX
    } else {
        (1u32 << total_slots) - 1
    };
    (slot_mask & window).count_ones() as usize
}
