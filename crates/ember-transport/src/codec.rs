//! # Binary Codec
//!
//! Byte-exact, big-endian reader and writer used by every wire type.
//!
//! The two halves are deliberately asymmetric:
//!
//! - [`Parser`] reads **untrusted** network bytes. It never panics on bad
//!   input. The first failure is latched as a sticky [`DecodeError`]; every
//!   later read becomes a no-op, so one malformed field cannot cascade into
//!   out-of-bounds access. The caller checks the error once at the end.
//! - [`Serializer`] writes **trusted**, locally-built values into a buffer
//!   sized from a prior `serialized_length()`. Running out of room is a
//!   programming defect and panics.
//!
//! A parser dropped while still holding an error panics: some code path
//! consumed a decode failure without looking at it.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use thiserror::Error;

use crate::wire::Wire;

// ─── Errors ──────────────────────────────────────────────────────────────────

/// Why a datagram (or any other untrusted byte sequence) failed to decode.
///
/// Always recoverable: the caller drops the offending input and carries on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("truncated input: needed {needed} bytes, {remaining} remaining")]
    Truncated { needed: usize, remaining: usize },
    #[error("length {length} exceeds capacity {capacity}")]
    CapacityExceeded { length: usize, capacity: usize },
    #[error("invalid value {value} for field `{field}`")]
    InvalidValue { field: &'static str, value: u64 },
    #[error("{count} trailing bytes after message")]
    TrailingBytes { count: usize },
}

// ─── Integers ────────────────────────────────────────────────────────────────

/// Fixed-width unsigned integer with a big-endian wire form.
pub trait NetInteger: Copy + Default + Eq + Ord + std::fmt::Debug {
    /// Encoded width in bytes.
    const WIDTH: usize;

    /// Read from `buf`. The caller guarantees `WIDTH` bytes remain.
    fn get(buf: &mut &[u8]) -> Self;

    /// Append to `buf`. Panics if `buf` has fewer than `WIDTH` bytes of room.
    fn put(self, buf: &mut &mut [u8]);

    /// Widen to `u64` (for error reporting).
    fn to_u64(self) -> u64;
}

macro_rules! net_integer {
    ($t:ty, $get:ident, $put:ident) => {
        impl NetInteger for $t {
            const WIDTH: usize = std::mem::size_of::<$t>();

            #[inline]
            fn get(buf: &mut &[u8]) -> Self {
                buf.$get()
            }

            #[inline]
            fn put(self, buf: &mut &mut [u8]) {
                buf.$put(self)
            }

            #[inline]
            fn to_u64(self) -> u64 {
                self as u64
            }
        }
    };
}

net_integer!(u8, get_u8, put_u8);
net_integer!(u16, get_u16, put_u16);
net_integer!(u32, get_u32, put_u32);
net_integer!(u64, get_u64, put_u64);

// ─── Parser ──────────────────────────────────────────────────────────────────

/// Reader over untrusted bytes with a sticky error.
#[derive(Debug)]
pub struct Parser<'a> {
    input: &'a [u8],
    error: Option<DecodeError>,
}

impl<'a> Parser<'a> {
    pub fn new(input: &'a [u8]) -> Self {
        Parser { input, error: None }
    }

    /// Bytes not yet consumed.
    pub fn remaining(&self) -> &'a [u8] {
        self.input
    }

    pub fn has_error(&self) -> bool {
        self.error.is_some()
    }

    /// The latched error, if any.
    pub fn error(&self) -> Option<DecodeError> {
        self.error
    }

    /// Latch an error. Only the first one is kept.
    pub fn set_error(&mut self, error: DecodeError) {
        if self.error.is_none() {
            self.error = Some(error);
        }
    }

    /// Take the latched error, leaving the parser clean.
    pub fn clear_error(&mut self) -> Option<DecodeError> {
        self.error.take()
    }

    fn check_size(&mut self, size: usize) -> bool {
        if self.error.is_some() {
            return false;
        }
        if size > self.input.len() {
            self.set_error(DecodeError::Truncated {
                needed: size,
                remaining: self.input.len(),
            });
            return false;
        }
        true
    }

    /// Read a big-endian integer into `out`. Leaves `out` untouched on error.
    pub fn integer<T: NetInteger>(&mut self, out: &mut T) {
        if self.check_size(T::WIDTH) {
            *out = T::get(&mut self.input);
        }
    }

    /// Read `len` raw bytes. Returns an empty slice on error.
    pub fn string(&mut self, len: usize) -> &'a [u8] {
        if !self.check_size(len) {
            return &[];
        }
        let (head, tail) = self.input.split_at(len);
        self.input = tail;
        head
    }

    /// Parse a nested wire object in place, unless an error is already latched.
    pub fn object<T: Wire + ?Sized>(&mut self, out: &mut T) {
        if self.error.is_none() {
            out.parse(self);
        }
    }

    /// Consume the parser, handing the latched error (if any) to the caller.
    pub fn finish(mut self) -> Result<(), DecodeError> {
        match self.clear_error() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

impl Drop for Parser<'_> {
    fn drop(&mut self) {
        if let Some(e) = self.error {
            if !std::thread::panicking() {
                panic!("Parser dropped without clearing decode error: {e}");
            }
        }
    }
}

// ─── Serializer ──────────────────────────────────────────────────────────────

/// Writer into a caller-sized output buffer.
#[derive(Debug)]
pub struct Serializer<'a> {
    output: &'a mut [u8],
    original_size: usize,
}

impl<'a> Serializer<'a> {
    pub fn new(output: &'a mut [u8]) -> Self {
        let original_size = output.len();
        Serializer {
            output,
            original_size,
        }
    }

    pub fn bytes_written(&self) -> usize {
        self.original_size - self.output.len()
    }

    /// Room left in the output buffer.
    pub fn remaining(&self) -> usize {
        self.output.len()
    }

    fn check_size(&self, size: usize) {
        if size > self.output.len() {
            panic!(
                "no room to serialize: need {size} bytes, {} remaining",
                self.output.len()
            );
        }
    }

    pub fn integer<T: NetInteger>(&mut self, value: T) {
        self.check_size(T::WIDTH);
        value.put(&mut self.output);
    }

    pub fn string(&mut self, bytes: &[u8]) {
        self.check_size(bytes.len());
        self.output.put_slice(bytes);
    }

    pub fn object<T: Wire + ?Sized>(&mut self, obj: &T) {
        self.check_size(obj.serialized_length());
        obj.serialize(self);
    }
}

// ─── Whole-message helpers ───────────────────────────────────────────────────

/// Serialize `obj` into a freshly allocated buffer of exactly its wire length.
pub fn encode<T: Wire + ?Sized>(obj: &T) -> Bytes {
    let len = obj.serialized_length();
    let mut buf = BytesMut::zeroed(len);
    let mut s = Serializer::new(&mut buf);
    s.object(obj);
    let written = s.bytes_written();
    assert_eq!(
        written, len,
        "serialized_length() disagrees with bytes written"
    );
    buf.freeze()
}

/// Parse a complete message. The input must be consumed exactly.
pub fn decode<T: Wire + Default>(input: &[u8]) -> Result<T, DecodeError> {
    let mut out = T::default();
    let mut p = Parser::new(input);
    p.object(&mut out);
    if !p.has_error() && !p.remaining().is_empty() {
        let count = p.remaining().len();
        p.set_error(DecodeError::TrailingBytes { count });
    }
    p.finish().map(|()| out)
}
