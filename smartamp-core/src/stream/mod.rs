//! Host-side circular audio streams.
//!
//! The surrounding pipeline owns a fixed circular buffer per connection and
//! moves read/write cursors over it. The core never owns those cursors: it
//! reads from the read cursor, writes at the write cursor, and leaves
//! `consume_frames` / `produce_frames` to whoever drives the tick.
//!
//! Every single-sample advance goes through [`Region::wrap`], because a
//! host region has no length relationship with the frames copied out of it.

pub mod mux;

use crate::format::FrameFormat;

/// Bounds of a circular region: `[addr, end_addr)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Region {
    pub addr: usize,
    pub end_addr: usize,
}

impl Region {
    pub fn new(addr: usize, len: usize) -> Self {
        Self {
            addr,
            end_addr: addr + len,
        }
    }

    pub fn len(&self) -> usize {
        self.end_addr - self.addr
    }

    pub fn is_empty(&self) -> bool {
        self.end_addr == self.addr
    }

    /// Fold a position that stepped past `end_addr` back to the start.
    #[inline]
    pub fn wrap(&self, ptr: usize) -> usize {
        if ptr >= self.end_addr {
            self.addr + (ptr - self.end_addr)
        } else {
            ptr
        }
    }
}

/// A caller-owned circular sample buffer, as the host pipeline exposes it.
///
/// Samples are stored one per `i32` slot regardless of the declared
/// [`FrameFormat`]; a 16-bit stream simply keeps 16-bit values in each slot.
#[derive(Debug, Clone)]
pub struct AudioStream {
    data: Vec<i32>,
    region: Region,
    r_ptr: usize,
    w_ptr: usize,
    /// Readable samples between `r_ptr` and `w_ptr`.
    avail: usize,
    frame_format: FrameFormat,
    channels: usize,
}

impl AudioStream {
    /// Allocate a stream holding `capacity_frames` frames of `channels` slots.
    pub fn new(capacity_frames: usize, channels: usize, frame_format: FrameFormat) -> Self {
        let len = capacity_frames * channels;
        Self {
            data: vec![0; len],
            region: Region::new(0, len),
            r_ptr: 0,
            w_ptr: 0,
            avail: 0,
            frame_format,
            channels,
        }
    }

    pub fn region(&self) -> Region {
        self.region
    }

    pub fn read_cursor(&self) -> usize {
        self.r_ptr
    }

    pub fn write_cursor(&self) -> usize {
        self.w_ptr
    }

    pub fn frame_format(&self) -> FrameFormat {
        self.frame_format
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    pub fn avail_frames(&self) -> usize {
        if self.channels == 0 {
            return 0;
        }
        self.avail / self.channels
    }

    pub fn free_frames(&self) -> usize {
        if self.channels == 0 {
            return 0;
        }
        (self.region.len() - self.avail) / self.channels
    }

    /// Sample at an absolute position inside the region.
    #[inline]
    pub fn sample_at(&self, ptr: usize) -> i32 {
        self.data[ptr - self.region.addr]
    }

    #[inline]
    pub fn set_sample_at(&mut self, ptr: usize, value: i32) {
        let idx = ptr - self.region.addr;
        self.data[idx] = value;
    }

    /// Advance the read cursor after the samples were copied out.
    pub fn consume_frames(&mut self, frames: usize) {
        let samples = (frames * self.channels).min(self.avail);
        self.r_ptr = self.region.wrap(self.r_ptr + samples);
        self.avail -= samples;
    }

    /// Advance the write cursor after the samples were written in place.
    pub fn produce_frames(&mut self, frames: usize) {
        let samples = (frames * self.channels).min(self.region.len() - self.avail);
        self.w_ptr = self.region.wrap(self.w_ptr + samples);
        self.avail += samples;
    }

    /// Zero the whole buffer. Cursors are left where they are.
    pub fn zero(&mut self) {
        self.data.fill(0);
    }

    /// Upstream side: append interleaved samples and produce them.
    ///
    /// Writes whole frames only and returns the number of frames written.
    pub fn write_interleaved(&mut self, samples: &[i32]) -> usize {
        if self.channels == 0 || self.region.is_empty() {
            return 0;
        }
        let frames = (samples.len() / self.channels).min(self.free_frames());
        let mut ptr = self.w_ptr;
        for &s in &samples[..frames * self.channels] {
            ptr = self.region.wrap(ptr);
            self.set_sample_at(ptr, s);
            ptr += 1;
        }
        self.produce_frames(frames);
        frames
    }

    /// Downstream side: copy out interleaved samples and consume them.
    ///
    /// Returns the number of frames read.
    pub fn read_interleaved(&mut self, out: &mut [i32]) -> usize {
        if self.channels == 0 || self.region.is_empty() {
            return 0;
        }
        let frames = (out.len() / self.channels).min(self.avail_frames());
        let mut ptr = self.r_ptr;
        for slot in &mut out[..frames * self.channels] {
            ptr = self.region.wrap(ptr);
            *slot = self.sample_at(ptr);
            ptr += 1;
        }
        self.consume_frames(frames);
        frames
    }
}
