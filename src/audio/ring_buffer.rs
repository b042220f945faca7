//! Lock-free ring buffer for real-time audio
//!
//! A pre-allocated, lock-free SPSC ring buffer of i16 PCM frames. The
//! audio callback MUST NOT allocate or block, so all storage is
//! pre-allocated and every operation is saturating: `write` and `read`
//! move what fits and return the count, nothing ever waits inside the
//! primitive.

use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicUsize, Ordering};

use super::RING_CAPACITY;

/// A lock-free single-producer single-consumer ring buffer of PCM frames.
///
/// Safe between exactly one producer and one consumer at a time; callers
/// with more than one logical actor on a side serialize them externally
/// (the audio callback side is never the serialized one).
pub struct FrameRing {
    /// UnsafeCell allows interior mutability for the frame storage
    buffer: UnsafeCell<Box<[i16]>>,
    mask: usize,
    write_pos: AtomicUsize,
    read_pos: AtomicUsize,
}

// Safety: write_pos/read_pos are atomics and the SPSC discipline ensures
// producer and consumer never touch the same indices simultaneously.
unsafe impl Send for FrameRing {}
unsafe impl Sync for FrameRing {}

impl Default for FrameRing {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameRing {
    /// Create a ring with the default capacity.
    pub fn new() -> Self {
        Self::with_capacity(RING_CAPACITY)
    }

    /// Create a ring with a specific capacity in frames.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is not a power of two.
    pub fn with_capacity(capacity: usize) -> Self {
        assert!(
            capacity.is_power_of_two(),
            "ring capacity must be a power of two, got {}",
            capacity
        );
        Self {
            buffer: UnsafeCell::new(vec![0i16; capacity].into_boxed_slice()),
            mask: capacity - 1,
            write_pos: AtomicUsize::new(0),
            read_pos: AtomicUsize::new(0),
        }
    }

    /// Total capacity of the ring in frames.
    pub fn capacity(&self) -> usize {
        self.mask + 1
    }

    /// Number of frames available for reading.
    pub fn read_available(&self) -> usize {
        let write = self.write_pos.load(Ordering::Acquire);
        let read = self.read_pos.load(Ordering::Acquire);

        if write >= read {
            write - read
        } else {
            self.capacity() - read + write
        }
    }

    /// Number of frames the producer can write without overwriting.
    ///
    /// One slot is kept empty to distinguish full from empty, so this is
    /// at most `capacity() - 1`.
    pub fn write_available(&self) -> usize {
        self.capacity() - self.read_available() - 1
    }

    /// Write frames into the ring (producer side).
    ///
    /// Lock-free and allocation-free; safe to call from the audio
    /// callback. Returns the number of frames actually written, which may
    /// be less than `src.len()` if the ring is nearly full.
    pub fn write(&self, src: &[i16]) -> usize {
        let write = self.write_pos.load(Ordering::Acquire);
        let to_write = src.len().min(self.write_available());

        if to_write == 0 {
            return 0;
        }

        // Safety: single producer; the consumer never reads indices in
        // [write, write + to_write) because write_pos has not advanced yet.
        let buffer_ptr = self.buffer.get();
        for (i, &frame) in src.iter().enumerate().take(to_write) {
            unsafe {
                (*buffer_ptr)[(write + i) & self.mask] = frame;
            }
        }

        // Release so the consumer sees the frames before the new position
        self.write_pos
            .store((write + to_write) & self.mask, Ordering::Release);
        to_write
    }

    /// Read frames from the ring (consumer side).
    ///
    /// Returns the number of frames actually read, which may be less than
    /// `dst.len()` if not enough data is buffered.
    pub fn read(&self, dst: &mut [i16]) -> usize {
        let read = self.read_pos.load(Ordering::Acquire);
        let to_read = dst.len().min(self.read_available());

        if to_read == 0 {
            return 0;
        }

        // Safety: single consumer; the producer never writes indices in
        // [read, read + to_read) until read_pos advances past them.
        let buffer_ptr = self.buffer.get();
        for (i, frame) in dst.iter_mut().enumerate().take(to_read) {
            *frame = unsafe { (*buffer_ptr)[(read + i) & self.mask] };
        }

        self.read_pos
            .store((read + to_read) & self.mask, Ordering::Release);
        to_read
    }

    /// Read all buffered frames into a new Vec.
    ///
    /// Note: this allocates. Only use from non-real-time threads.
    pub fn read_all(&self) -> Vec<i16> {
        let available = self.read_available();
        let mut out = vec![0i16; available];
        let n = self.read(&mut out);
        out.truncate(n);
        out
    }

    /// Discard all buffered frames.
    pub fn flush(&self) {
        self.read_pos
            .store(self.write_pos.load(Ordering::Acquire), Ordering::Release);
    }
}
