//! Sliding window (spec §3 "Sliding window state", §4.6): a circular buffer
//! shared verbatim between the encoder and decoder so that LZ77 back
//! references and literal history behave identically on both sides.

use crate::bitstream::ByteSink;
use crate::error::{DeflateError, DeflateResult};

/// Largest window the format allows (RFC 1951 §3.2.5: 32 KiB).
pub const MAX_WINDOW_SIZE: usize = 32 * 1024;

/// A circular history buffer of up to `MAX_WINDOW_SIZE` bytes. `pos` is the
/// next write position; `filled` counts valid bytes up to `capacity`, so a
/// distance can be checked against history depth without scanning.
pub struct Window {
    buffer: Vec<u8>,
    capacity: usize,
    pos: usize,
    filled: usize,
}

impl Window {
    /// `window_bits` in `8..=15`, giving a capacity of `2^window_bits` bytes.
    pub fn new(window_bits: u8) -> DeflateResult<Self> {
        if !(8..=15).contains(&window_bits) {
            return Err(DeflateError::InvalidArgument("window_bits out of range 8..=15"));
        }
        let capacity = 1usize << window_bits;
        Ok(Self {
            buffer: vec![0u8; capacity],
            capacity,
            pos: 0,
            filled: 0,
        })
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    #[inline]
    pub fn filled(&self) -> usize {
        self.filled
    }

    pub fn reset(&mut self) {
        self.pos = 0;
        self.filled = 0;
    }

    #[inline]
    fn push_one(&mut self, byte: u8) {
        self.buffer[self.pos] = byte;
        self.pos = (self.pos + 1) % self.capacity;
        if self.filled < self.capacity {
            self.filled += 1;
        }
    }

    /// Append a literal byte to the window and to `out`.
    pub fn push_literal(&mut self, byte: u8, out: &mut impl ByteSink) {
        self.push_one(byte);
        out.put(byte);
    }

    /// Copy `length` bytes starting `distance` bytes back from the current
    /// position, both into the window and into `out`. Handles overlapping
    /// matches (`distance < length`) by copying byte-by-byte, which is the
    /// only correct approach when the source region being read is also being
    /// extended by the write (spec §4.6 "overlapping copy").
    pub fn copy_match(
        &mut self,
        distance: usize,
        length: usize,
        out: &mut impl ByteSink,
    ) -> DeflateResult<()> {
        if distance == 0 || distance > self.filled {
            return Err(DeflateError::Corrupt(format!(
                "match distance {distance} exceeds available history {}",
                self.filled
            )));
        }
        out.reserve_hint(length);
        for _ in 0..length {
            let src = (self.pos + self.capacity - distance) % self.capacity;
            let byte = self.buffer[src];
            self.push_one(byte);
            out.put(byte);
        }
        Ok(())
    }

    /// Append raw bytes (stored blocks / literal runs) to the window and to
    /// `out` in one pass.
    pub fn push_bytes(&mut self, bytes: &[u8], out: &mut impl ByteSink) {
        out.reserve_hint(bytes.len());
        for &b in bytes {
            self.push_one(b);
            out.put(b);
        }
    }

    /// True if a back-reference of `distance` bytes is representable given
    /// the bytes currently held, without touching `out`.
    #[inline]
    pub fn can_reference(&self, distance: usize) -> bool {
        distance >= 1 && distance <= self.filled
    }

    /// Byte `distance` positions back from the write cursor, without
    /// mutating the window. Used by the encoder's match finder to verify
    /// candidate matches before committing to them.
    #[inline]
    pub fn byte_at_distance(&self, distance: usize) -> u8 {
        debug_assert!(distance >= 1 && distance <= self.filled);
        let src = (self.pos + self.capacity - distance) % self.capacity;
        self.buffer[src]
    }
}
