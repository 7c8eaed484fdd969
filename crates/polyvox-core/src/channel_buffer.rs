//! Multi-channel sample storage shared by voices and the mixer.
//!
//! A [`ChannelBuffer`] owns up to [`MAX_CHANNELS`] channels of `capacity`
//! samples each, allocated and zeroed once at construction. The visible
//! length ([`ChannelBuffer::buffer_size`]) and the number of channels that
//! carry audio ([`ChannelBuffer::num_active_channels`]) can be changed per
//! block without touching the allocation.

#[cfg(not(feature = "std"))]
extern crate alloc;

#[cfg(feature = "std")]
extern crate std as alloc;

use alloc::vec;
use alloc::vec::Vec;

/// Maximum number of channels a [`ChannelBuffer`] can hold.
pub const MAX_CHANNELS: usize = 2;

/// Fixed-capacity block of audio for up to [`MAX_CHANNELS`] channels.
///
/// Voices only ever add into a buffer handed to them; clearing is the
/// owner's job.
///
/// # Example
///
/// ```rust
/// use polyvox_core::ChannelBuffer;
///
/// let mut buf = ChannelBuffer::with_channels(256, 2);
/// buf.set_buffer_size(64);
/// buf.channel_mut(1)[0] = 0.5;
///
/// assert_eq!(buf.channel(1).len(), 64);
/// assert_eq!(buf.channel(0)[0], 0.0);
/// ```
#[derive(Debug, Clone, Default)]
pub struct ChannelBuffer {
    data: Vec<Vec<f32>>,
    buffer_size: usize,
    active_channels: usize,
}

impl ChannelBuffer {
    /// Allocates [`MAX_CHANNELS`] channels of `capacity` samples with one active.
    pub fn new(capacity: usize) -> Self {
        let mut buf = Self::with_channels(capacity, MAX_CHANNELS);
        buf.active_channels = 1;
        buf
    }

    /// Allocates `channels` channels (clamped to `1..=MAX_CHANNELS`), all active.
    pub fn with_channels(capacity: usize, channels: usize) -> Self {
        let channels = channels.clamp(1, MAX_CHANNELS);
        Self {
            data: vec![vec![0.0; capacity]; channels],
            buffer_size: capacity,
            active_channels: channels,
        }
    }

    /// Allocated samples per channel.
    pub fn capacity(&self) -> usize {
        self.data.first().map_or(0, Vec::len)
    }

    /// Visible samples per channel.
    pub fn buffer_size(&self) -> usize {
        self.buffer_size
    }

    /// Sets the visible length, clamped to the capacity.
    pub fn set_buffer_size(&mut self, size: usize) {
        self.buffer_size = size.min(self.capacity());
    }

    /// Channels currently carrying audio.
    pub fn num_active_channels(&self) -> usize {
        self.active_channels
    }

    /// Sets the active channel count, clamped to `1..=num_total_channels()`.
    pub fn set_num_active_channels(&mut self, channels: usize) {
        self.active_channels = channels.clamp(1, self.num_total_channels().max(1));
    }

    /// Channels allocated.
    pub fn num_total_channels(&self) -> usize {
        self.data.len()
    }

    /// Visible samples of channel `ch`.
    ///
    /// # Panics
    ///
    /// Panics if `ch >= num_total_channels()`.
    #[inline]
    pub fn channel(&self, ch: usize) -> &[f32] {
        &self.data[ch][..self.buffer_size]
    }

    /// Mutable visible samples of channel `ch`.
    ///
    /// # Panics
    ///
    /// Panics if `ch >= num_total_channels()`.
    #[inline]
    pub fn channel_mut(&mut self, ch: usize) -> &mut [f32] {
        let size = self.buffer_size;
        &mut self.data[ch][..size]
    }

    /// Zeroes the visible part of every active channel.
    pub fn clear(&mut self) {
        let size = self.buffer_size;
        for ch in self.data.iter_mut().take(self.active_channels) {
            ch[..size].fill(0.0);
        }
    }

    /// Zeroes every allocated sample.
    pub fn clear_all(&mut self) {
        for ch in &mut self.data {
            ch.fill(0.0);
        }
    }

    /// Adds `other` into `self` over the overlapping channels and length.
    pub fn add_from(&mut self, other: &ChannelBuffer) {
        let len = self.buffer_size.min(other.buffer_size);
        let channels = self.active_channels.min(other.active_channels);
        for ch in 0..channels {
            for (dst, src) in self.data[ch][..len].iter_mut().zip(&other.data[ch][..len]) {
                *dst += *src;
            }
        }
    }

    /// Copies `other` into `self` over the overlapping channels and length.
    pub fn copy_from(&mut self, other: &ChannelBuffer) {
        let len = self.buffer_size.min(other.buffer_size);
        let channels = self.active_channels.min(other.active_channels);
        for ch in 0..channels {
            self.data[ch][..len].copy_from_slice(&other.data[ch][..len]);
        }
    }

    /// Decimates the visible block by `factor` and adds it into `out`.
    ///
    /// `factor` must be a power of two; each halving averages neighbouring
    /// pairs in place, so the contents of `self` are consumed. `out` receives
    /// `buffer_size / factor` samples per shared active channel.
    pub fn downsample_add_into(&mut self, out: &mut ChannelBuffer, factor: usize) {
        self.downsample_add_into_at(out, factor, 0);
    }

    /// Like [`downsample_add_into`](Self::downsample_add_into), but mixes the
    /// decimated samples into `out` starting at sample `offset`.
    ///
    /// Samples that would land past `out.buffer_size()` are dropped.
    pub fn downsample_add_into_at(&mut self, out: &mut ChannelBuffer, factor: usize, offset: usize) {
        let factor = factor.max(1);
        let channels = self.active_channels.min(out.active_channels);
        let room = out.buffer_size.saturating_sub(offset);
        if room == 0 {
            return;
        }
        for ch in 0..channels {
            let data = &mut self.data[ch];
            let mut len = self.buffer_size;
            let mut remaining = factor;
            while remaining > 1 && len > 1 {
                len /= 2;
                for i in 0..len {
                    data[i] = (data[i * 2] + data[i * 2 + 1]) * 0.5;
                }
                remaining /= 2;
            }
            let n = len.min(room);
            for (dst, src) in out.data[ch][offset..offset + n].iter_mut().zip(&data[..n]) {
                *dst += *src;
            }
        }
    }
}
