//! Still-frame capture on demand.
//!
//! Each call pulls one buffer from the sensor driver's pool, copies it out
//! and hands the buffer straight back. Nothing is queued between calls; a
//! failed capture is reported once and the next call starts fresh.
//!
//! # Components
//!
//! - [`ImageCapture`] - acquire, copy, release
//! - [`FrameSource`] - sensor driver buffer pool
//! - [`SimulatedCamera`] - finite in-memory pool for tests and host runs
//! - `esp` - esp32-camera driver (ESP32 only)

#[cfg(feature = "esp32")]
mod esp;

#[cfg(feature = "esp32")]
pub use esp::{CameraError, EspCamera};

use log::{debug, warn};
use std::time::Instant;

/// Sensor driver frame buffer pool.
pub trait FrameSource {
    /// Driver-owned buffer handle.
    type Buffer: AsRef<[u8]>;

    /// Take one filled buffer, or `None` when the sensor has nothing ready.
    fn acquire(&mut self) -> Option<Self::Buffer>;

    /// Return a buffer to the pool. Consumes the handle so it cannot be
    /// returned twice.
    fn release(&mut self, buffer: Self::Buffer);
}

/// One captured image, owned by the request that asked for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    data: Vec<u8>,
}

impl Frame {
    /// Encoded image bytes.
    pub fn bytes(&self) -> &[u8] {
        &self.data
    }

    /// Size in bytes.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// True for a zero-length frame.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Take the bytes.
    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }
}

/// Capture adapter over a [`FrameSource`].
pub struct ImageCapture<S: FrameSource> {
    source: S,
    captured: u64,
    failed: u64,
}

impl<S: FrameSource> ImageCapture<S> {
    /// Wrap an initialized sensor.
    pub fn new(source: S) -> Self {
        Self {
            source,
            captured: 0,
            failed: 0,
        }
    }

    /// Capture a single frame.
    ///
    /// The driver buffer is released before this returns, so the pool is
    /// never held across requests.
    pub fn capture(&mut self) -> Option<Frame> {
        let started = Instant::now();
        let Some(buffer) = self.source.acquire() else {
            self.failed += 1;
            warn!("Camera capture failed");
            return None;
        };

        let data = buffer.as_ref().to_vec();
        self.source.release(buffer);
        self.captured += 1;

        debug!(
            "JPG: {}B {}ms",
            data.len(),
            started.elapsed().as_millis()
        );
        Some(Frame { data })
    }

    /// Frames captured successfully.
    pub fn captured(&self) -> u64 {
        self.captured
    }

    /// Capture attempts that found no frame.
    pub fn failed(&self) -> u64 {
        self.failed
    }

    /// Borrow the sensor.
    pub fn source(&self) -> &S {
        &self.source
    }

    /// Mutably borrow the sensor.
    pub fn source_mut(&mut self) -> &mut S {
        &mut self.source
    }
}

/// Smallest well-formed JPEG marker pair, used as placeholder image data.
pub const PLACEHOLDER_JPEG: &[u8] = &[0xFF, 0xD8, 0xFF, 0xD9];

/// Buffer handed out by [`SimulatedCamera`].
#[derive(Debug)]
pub struct PoolBuffer {
    data: Vec<u8>,
}

impl AsRef<[u8]> for PoolBuffer {
    fn as_ref(&self) -> &[u8] {
        &self.data
    }
}

/// In-memory sensor with a finite buffer pool.
///
/// Every acquired buffer must come back via `release` or the pool drains and
/// capture starves, as on the real driver.
#[derive(Debug, Clone)]
pub struct SimulatedCamera {
    pool_size: usize,
    outstanding: usize,
    frame: Vec<u8>,
    fail_next: usize,
    acquired: usize,
    released: usize,
}

impl SimulatedCamera {
    /// Sensor with `pool_size` buffers, each returning `frame`.
    pub fn new(pool_size: usize, frame: Vec<u8>) -> Self {
        Self {
            pool_size,
            outstanding: 0,
            frame,
            fail_next: 0,
            acquired: 0,
            released: 0,
        }
    }

    /// Make the next `count` acquisitions return nothing.
    pub fn fail_next(&mut self, count: usize) {
        self.fail_next = count;
    }

    /// Buffers currently out of the pool.
    pub fn outstanding(&self) -> usize {
        self.outstanding
    }

    /// Total buffers handed out.
    pub fn acquired(&self) -> usize {
        self.acquired
    }

    /// Total buffers returned.
    pub fn released(&self) -> usize {
        self.released
    }
}

impl Default for SimulatedCamera {
    fn default() -> Self {
        Self::new(2, PLACEHOLDER_JPEG.to_vec())
    }
}

impl FrameSource for SimulatedCamera {
    type Buffer = PoolBuffer;

    fn acquire(&mut self) -> Option<PoolBuffer> {
        if self.fail_next > 0 {
            self.fail_next -= 1;
            return None;
        }
        if self.outstanding >= self.pool_size {
            return None;
        }
        self.outstanding += 1;
        self.acquired += 1;
        Some(PoolBuffer {
            data: self.frame.clone(),
        })
    }

    fn release(&mut self, _buffer: PoolBuffer) {
        self.outstanding -= 1;
        self.released += 1;
    }
}
