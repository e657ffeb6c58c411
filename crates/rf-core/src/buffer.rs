//! Buffer contract and in-memory buffers
//!
//! Offline jobs never own the buffers they read and write. They reach them
//! through [`BufferAdaptor`], normally behind a cloneable [`SharedBuffer`]
//! handle so the caller and a background job can refer to the same storage.

use std::fmt;
use std::sync::Arc;

use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::error::{RfError, RfResult};

/// Type alias for audio samples (always f64 for offline precision)
pub type Sample = f64;

// ═══════════════════════════════════════════════════════════════════════════════
// BUFFER CONTRACT
// ═══════════════════════════════════════════════════════════════════════════════

/// Read/write access to a host buffer
///
/// Storage is per channel: [`BufferAdaptor::channel`] returns the whole
/// channel as one contiguous slice.
pub trait BufferAdaptor: Send + Sync + fmt::Debug {
    /// Whether the buffer behind this handle still exists
    fn exists(&self) -> bool;

    /// Number of frames (samples per channel)
    fn num_frames(&self) -> usize;

    /// Number of channels
    fn num_chans(&self) -> usize;

    /// Sample rate in Hz
    fn sample_rate(&self) -> f64;

    /// Resize to `(frames, channels)` at `sample_rate`, discarding content
    fn resize(&mut self, frames: usize, channels: usize, sample_rate: f64) -> RfResult<()>;

    /// Full channel, read access
    fn channel(&self, channel: usize) -> RfResult<&[Sample]>;

    /// Full channel, write access
    fn channel_mut(&mut self, channel: usize) -> RfResult<&mut [Sample]>;

    /// `len` samples of `channel` starting at frame `start`
    fn span(&self, start: usize, len: usize, channel: usize) -> RfResult<&[Sample]> {
        let samples = self.channel(channel)?;
        match start.checked_add(len) {
            Some(end) if end <= samples.len() => Ok(&samples[start..end]),
            _ => Err(RfError::OutOfRange(format!(
                "frames {}..{} exceed buffer length {}",
                start,
                start.saturating_add(len),
                samples.len()
            ))),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// MEMORY BUFFER
// ═══════════════════════════════════════════════════════════════════════════════

/// Heap-backed buffer with channel-major storage
#[derive(Debug, Clone, PartialEq)]
pub struct MemoryBuffer {
    data: Vec<Sample>,
    frames: usize,
    channels: usize,
    sample_rate: f64,
    exists: bool,
}

impl MemoryBuffer {
    /// Create a silent buffer
    pub fn new(frames: usize, channels: usize, sample_rate: f64) -> Self {
        Self {
            data: vec![0.0; frames * channels],
            frames,
            channels,
            sample_rate,
            exists: true,
        }
    }

    /// Create from per-channel sample vectors (truncated to the shortest)
    pub fn from_channels(channels: Vec<Vec<Sample>>, sample_rate: f64) -> Self {
        let frames = channels.iter().map(Vec::len).min().unwrap_or(0);
        let mut data = Vec::with_capacity(frames * channels.len());
        for channel in &channels {
            data.extend_from_slice(&channel[..frames]);
        }

        Self {
            data,
            frames,
            channels: channels.len(),
            sample_rate,
            exists: true,
        }
    }

    /// A handle whose buffer does not exist
    pub fn missing() -> Self {
        Self {
            data: Vec::new(),
            frames: 0,
            channels: 0,
            sample_rate: 0.0,
            exists: false,
        }
    }

    /// Release storage; the buffer stops existing
    pub fn free(&mut self) {
        *self = Self::missing();
    }

    /// Snapshot another buffer's content and shape
    pub fn copy_of(source: &dyn BufferAdaptor) -> Self {
        if !source.exists() {
            return Self::missing();
        }

        let frames = source.num_frames();
        let channels = source.num_chans();
        let mut data = Vec::with_capacity(frames * channels);
        for ch in 0..channels {
            match source.channel(ch) {
                Ok(samples) => data.extend_from_slice(&samples[..frames.min(samples.len())]),
                Err(_) => data.resize(data.len() + frames, 0.0),
            }
            // Channels shorter than num_frames() are zero-filled
            data.resize((ch + 1) * frames, 0.0);
        }

        Self {
            data,
            frames,
            channels,
            sample_rate: source.sample_rate(),
            exists: true,
        }
    }

    /// Resize `dest` to this buffer's shape and copy every channel into it
    pub fn write_to(&self, dest: &mut dyn BufferAdaptor) -> RfResult<()> {
        if !self.exists {
            return Err(RfError::BufferMissing);
        }

        dest.resize(self.frames, self.channels, self.sample_rate)?;
        for ch in 0..self.channels {
            dest.channel_mut(ch)?.copy_from_slice(self.channel(ch)?);
        }
        Ok(())
    }

    /// Copy out as per-channel vectors
    pub fn to_channels(&self) -> Vec<Vec<Sample>> {
        if self.frames == 0 {
            return vec![Vec::new(); self.channels];
        }
        self.data.chunks(self.frames).map(<[Sample]>::to_vec).collect()
    }

    /// Wrap in a shared handle
    pub fn into_shared(self) -> SharedBuffer {
        SharedBuffer::new(self)
    }

    fn check_channel(&self, channel: usize) -> RfResult<std::ops::Range<usize>> {
        if !self.exists {
            return Err(RfError::BufferMissing);
        }
        if channel >= self.channels {
            return Err(RfError::OutOfRange(format!(
                "channel {} of {}-channel buffer",
                channel, self.channels
            )));
        }
        let start = channel * self.frames;
        Ok(start..start + self.frames)
    }
}

impl BufferAdaptor for MemoryBuffer {
    fn exists(&self) -> bool {
        self.exists
    }

    fn num_frames(&self) -> usize {
        self.frames
    }

    fn num_chans(&self) -> usize {
        self.channels
    }

    fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    fn resize(&mut self, frames: usize, channels: usize, sample_rate: f64) -> RfResult<()> {
        if !self.exists {
            return Err(RfError::BufferMissing);
        }
        if !sample_rate.is_finite() || sample_rate <= 0.0 {
            return Err(RfError::InvalidResize {
                frames,
                channels,
                sample_rate,
            });
        }

        self.data.clear();
        self.data.resize(frames * channels, 0.0);
        self.frames = frames;
        self.channels = channels;
        self.sample_rate = sample_rate;
        Ok(())
    }

    fn channel(&self, channel: usize) -> RfResult<&[Sample]> {
        let range = self.check_channel(channel)?;
        Ok(&self.data[range])
    }

    fn channel_mut(&mut self, channel: usize) -> RfResult<&mut [Sample]> {
        let range = self.check_channel(channel)?;
        Ok(&mut self.data[range])
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// SHARED HANDLE
// ═══════════════════════════════════════════════════════════════════════════════

/// Cloneable handle to a buffer shared between caller and jobs
#[derive(Clone)]
pub struct SharedBuffer(Arc<RwLock<dyn BufferAdaptor>>);

impl SharedBuffer {
    /// Share a buffer
    pub fn new<B: BufferAdaptor + 'static>(buffer: B) -> Self {
        Self(Arc::new(RwLock::new(buffer)))
    }

    /// Shared silent memory buffer
    pub fn memory(frames: usize, channels: usize, sample_rate: f64) -> Self {
        Self::new(MemoryBuffer::new(frames, channels, sample_rate))
    }

    /// Shared handle to a buffer that does not exist
    pub fn missing() -> Self {
        Self::new(MemoryBuffer::missing())
    }

    /// Lock for reading
    pub fn read(&self) -> RwLockReadGuard<'_, dyn BufferAdaptor> {
        self.0.read()
    }

    /// Lock for writing
    pub fn write(&self) -> RwLockWriteGuard<'_, dyn BufferAdaptor> {
        self.0.write()
    }

    /// Whether both handles point at the same buffer
    pub fn ptr_eq(a: &Self, b: &Self) -> bool {
        std::ptr::addr_eq(Arc::as_ptr(&a.0), Arc::as_ptr(&b.0))
    }

    /// Copy the current content into a standalone memory buffer
    pub fn snapshot(&self) -> MemoryBuffer {
        MemoryBuffer::copy_of(&*self.read())
    }
}

impl PartialEq for SharedBuffer {
    fn eq(&self, other: &Self) -> bool {
        Self::ptr_eq(self, other)
    }
}

impl fmt::Debug for SharedBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0.try_read() {
            Some(buffer) => f
                .debug_struct("SharedBuffer")
                .field("exists", &buffer.exists())
                .field("frames", &buffer.num_frames())
                .field("channels", &buffer.num_chans())
                .field("sample_rate", &buffer.sample_rate())
                .finish(),
            None => f.write_str("SharedBuffer(<locked>)"),
        }
    }
}

impl<B: BufferAdaptor + 'static> From<B> for SharedBuffer {
    fn from(buffer: B) -> Self {
        Self::new(buffer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_buffer_layout() {
        let buffer = MemoryBuffer::from_channels(vec![vec![1.0, 2.0, 3.0], vec![4.0, 5.0, 6.0]], 48000.0);

        assert_eq!(buffer.num_frames(), 3);
        assert_eq!(buffer.num_chans(), 2);
        assert_eq!(buffer.channel(1).unwrap(), &[4.0, 5.0, 6.0]);
        assert_eq!(buffer.span(1, 2, 0).unwrap(), &[2.0, 3.0]);
    }

    #[test]
    fn test_span_out_of_range() {
        let buffer = MemoryBuffer::new(4, 1, 44100.0);

        assert!(matches!(buffer.span(3, 2, 0), Err(RfError::OutOfRange(_))));
        assert!(matches!(buffer.channel(1), Err(RfError::OutOfRange(_))));
    }

    #[test]
    fn test_resize_discards_content() {
        let mut buffer = MemoryBuffer::from_channels(vec![vec![1.0; 8]], 44100.0);
        buffer.resize(3, 2, 22050.0).unwrap();

        assert_eq!(buffer.num_frames(), 3);
        assert_eq!(buffer.num_chans(), 2);
        assert_eq!(buffer.sample_rate(), 22050.0);
        assert!(buffer.channel(1).unwrap().iter().all(|&s| s == 0.0));
    }

    #[test]
    fn test_resize_rejects_bad_rate() {
        let mut buffer = MemoryBuffer::new(1, 1, 44100.0);
        assert!(matches!(
            buffer.resize(4, 1, 0.0),
            Err(RfError::InvalidResize { .. })
        ));
    }

    #[test]
    fn test_missing_buffer() {
        let mut buffer = MemoryBuffer::missing();

        assert!(!buffer.exists());
        assert_eq!(buffer.channel(0), Err(RfError::BufferMissing));
        assert_eq!(buffer.resize(1, 1, 44100.0), Err(RfError::BufferMissing));

        let mut freed = MemoryBuffer::new(16, 2, 48000.0);
        freed.free();
        assert!(!freed.exists());
    }

    #[test]
    fn test_copy_and_write_back() {
        let origin = MemoryBuffer::from_channels(vec![vec![0.5, -0.5], vec![0.25, -0.25]], 48000.0)
            .into_shared();

        let copy = origin.snapshot();
        let mut target = MemoryBuffer::new(1, 1, 44100.0);
        copy.write_to(&mut target).unwrap();

        assert_eq!(target.to_channels(), vec![vec![0.5, -0.5], vec![0.25, -0.25]]);
        assert_eq!(target.sample_rate(), 48000.0);
    }

    #[test]
    fn test_copy_of_missing_is_missing() {
        let copy = MemoryBuffer::copy_of(&MemoryBuffer::missing());
        assert!(!copy.exists());
        assert_eq!(
            copy.write_to(&mut MemoryBuffer::new(1, 1, 44100.0)),
            Err(RfError::BufferMissing)
        );
    }

    #[test]
    fn test_shared_handle_identity() {
        let a = SharedBuffer::memory(8, 1, 44100.0);
        let b = a.clone();
        let c = SharedBuffer::memory(8, 1, 44100.0);

        assert!(SharedBuffer::ptr_eq(&a, &b));
        assert_ne!(a, c);

        b.write().channel_mut(0).unwrap()[3] = 1.0;
        assert_eq!(a.read().channel(0).unwrap()[3], 1.0);
    }
}
