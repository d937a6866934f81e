//! Growable output buffer behind the engine's destination callbacks.
//!
//! The engine writes through a raw cursor and a free-byte count. When the
//! free count hits zero it asks for more room; the buffer then doubles and
//! the cursor moves to the first unwritten byte. On termination the buffer is
//! truncated to the bytes actually written.

/// Capacity of a fresh output buffer.
pub const INITIAL_CAPACITY: usize = 32 * 1024;

/// Output sink for one compressor.
#[derive(Debug)]
pub struct OutputBuffer {
    data: Vec<u8>,
    free: usize,
    growths: u32,
    terminated: bool,
}

impl Default for OutputBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl OutputBuffer {
    pub fn new() -> Self {
        Self::with_capacity(INITIAL_CAPACITY)
    }

    /// Start with a specific capacity (at least one byte).
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            data: vec![0; capacity],
            free: capacity,
            growths: 0,
            terminated: false,
        }
    }

    /// Current capacity.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    /// Bytes still free behind the cursor.
    #[inline]
    pub fn free(&self) -> usize {
        self.free
    }

    /// Bytes written so far.
    #[inline]
    pub fn written(&self) -> usize {
        self.data.len() - self.free
    }

    /// Number of times the buffer doubled.
    #[inline]
    pub fn growths(&self) -> u32 {
        self.growths
    }

    pub fn is_terminated(&self) -> bool {
        self.terminated
    }

    /// Cursor the engine writes through, paired with the free count.
    pub(crate) fn cursor(&mut self) -> (*mut u8, usize) {
        let written = self.written();
        // SAFETY: written <= len, so the offset stays inside the allocation.
        let ptr = unsafe { self.data.as_mut_ptr().add(written) };
        (ptr, self.free)
    }

    /// Record the engine's free count after it wrote through the cursor.
    pub(crate) fn sync_free(&mut self, free: usize) {
        self.free = free.min(self.data.len());
    }

    /// Handle the engine running out of room.
    ///
    /// Doubles the capacity only when no free bytes remain; a spurious call
    /// with room left changes nothing. Always reports success so the engine
    /// retries.
    pub fn grow(&mut self) -> bool {
        if self.free > 0 {
            return true;
        }
        let current = self.data.len();
        self.data.resize(current * 2, 0);
        self.free = current;
        self.growths += 1;
        true
    }

    /// Truncate to the exact number of bytes written.
    pub fn terminate(&mut self) {
        let written = self.written();
        self.data.truncate(written);
        self.free = 0;
        self.terminated = true;
    }

    /// Append bytes using the same protocol the engine follows.
    pub fn write(&mut self, mut bytes: &[u8]) {
        while !bytes.is_empty() {
            if self.free == 0 {
                self.grow();
            }
            let start = self.written();
            let n = bytes.len().min(self.free);
            self.data[start..start + n].copy_from_slice(&bytes[..n]);
            self.free -= n;
            bytes = &bytes[n..];
        }
    }

    /// Take the written bytes, terminating first if needed.
    pub fn into_bytes(mut self) -> Vec<u8> {
        if !self.terminated {
            self.terminate();
        }
        self.data
    }
}


// ============================================================================
// Property-Based Tests
// ============================================================================
