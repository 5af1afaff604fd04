//! Fixed-capacity accumulation regions for the reframers.
//!
//! A [`RingRegion`] is a linear buffer with a single write cursor: samples are
//! appended at the cursor and, once a fixed-size frame has been taken from the
//! head, the residue is shifted back to offset 0 through a [`Staging`] slice.
//! All storage is allocated once when the session is created; nothing here
//! allocates on the per-tick path.

pub mod layout;

use crate::error::{Result, SmartAmpError};

/// Allocate a zeroed buffer, surfacing allocator failure instead of aborting.
pub(crate) fn alloc_zeroed<T: Copy + Default>(len: usize, what: &str) -> Result<Vec<T>> {
    let mut buf = Vec::new();
    buf.try_reserve_exact(len)
        .map_err(|e| SmartAmpError::Allocation(format!("{what} ({len} elements): {e}")))?;
    buf.resize(len, T::default());
    Ok(buf)
}

/// Scratch used only while shifting residue to the head of a region.
///
/// Sized to the largest residue any region sharing it can hold; never
/// retained across calls.
#[derive(Debug)]
pub struct Staging {
    buf: Vec<i32>,
}

impl Staging {
    pub fn with_capacity(capacity: usize) -> Result<Self> {
        Ok(Self {
            buf: alloc_zeroed(capacity, "staging buffer")?,
        })
    }

    pub fn capacity(&self) -> usize {
        self.buf.len()
    }
}

/// Fixed-capacity sample region with one write cursor.
///
/// Invariant: `0 <= len() <= capacity()`. A write that would exceed the
/// capacity is rejected whole.
#[derive(Debug)]
pub struct RingRegion {
    buf: Vec<i32>,
    cursor: usize,
}

impl RingRegion {
    pub fn with_capacity(capacity: usize) -> Result<Self> {
        Ok(Self {
            buf: alloc_zeroed(capacity, "ring region")?,
            cursor: 0,
        })
    }

    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    /// Current write cursor, i.e. the number of buffered samples.
    pub fn len(&self) -> usize {
        self.cursor
    }

    pub fn is_empty(&self) -> bool {
        self.cursor == 0
    }

    /// Room left before the cursor hits capacity.
    pub fn free(&self) -> usize {
        self.buf.len() - self.cursor
    }

    fn check_room(&self, requested: usize) -> Result<()> {
        if self.cursor + requested > self.buf.len() {
            return Err(SmartAmpError::Overflow {
                requested,
                cursor: self.cursor,
                capacity: self.buf.len(),
            });
        }
        Ok(())
    }

    /// Append `samples` at the cursor, all or nothing.
    pub fn append(&mut self, samples: &[i32]) -> Result<()> {
        self.check_room(samples.len())?;
        self.buf[self.cursor..self.cursor + samples.len()].copy_from_slice(samples);
        self.cursor += samples.len();
        Ok(())
    }

    /// Append `n` samples produced in place by `fill`, all or nothing.
    pub fn append_with(&mut self, n: usize, fill: impl FnOnce(&mut [i32])) -> Result<()> {
        self.check_room(n)?;
        fill(&mut self.buf[self.cursor..self.cursor + n]);
        self.cursor += n;
        Ok(())
    }

    /// Append `n` zero samples.
    pub fn prefill_silence(&mut self, n: usize) -> Result<()> {
        self.append_with(n, |dst| dst.fill(0))
    }

    /// The first `n` buffered samples (clamped to what is buffered).
    pub fn head(&self, n: usize) -> &[i32] {
        &self.buf[..n.min(self.cursor)]
    }

    /// Drop the first `n` samples and move the residue to offset 0.
    ///
    /// The residue goes out to `stage` and back; source and destination are
    /// never the same slice.
    pub fn consume_front(&mut self, n: usize, stage: &mut Staging) {
        let n = n.min(self.cursor);
        let remain = self.cursor - n;
        debug_assert!(remain <= stage.capacity(), "staging smaller than residue");
        if remain > 0 {
            let tmp = &mut stage.buf[..remain];
            tmp.copy_from_slice(&self.buf[n..self.cursor]);
            self.buf[..remain].copy_from_slice(tmp);
        }
        self.cursor = remain;
    }

    /// Zero the storage and rewind the cursor.
    pub fn clear(&mut self) {
        self.buf.fill(0);
        self.cursor = 0;
    }
}
