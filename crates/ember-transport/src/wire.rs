//! # Wire Types
//!
//! Building blocks that plug into the [`codec`](crate::codec) through one
//! uniform contract, the [`Wire`] triad:
//!
//! ```text
//! serialized_length(): exact number of bytes serialize() will write
//! serialize(writer): trusted path, panics on programmer error
//! parse(reader): untrusted path, latches errors in the reader
//! ```
//!
//! Composite messages implement the triad by delegating to each field, so
//! nesting composes structurally.
//!
//! ## Bounded containers
//!
//! ```text
//! NetArray<T, N>       := count:u8 | T*count                 (count ≤ N)
//! NetBytes<u8, MAX>    := len:u8   | bytes[len]              (len ≤ MAX)
//! NetBytes<u16, MAX>   := len:u16  | bytes[len]              (len ≤ MAX)
//! ```
//!
//! A length field larger than the declared capacity is a decode error, never
//! a buffer overrun: storage beyond capacity is not reachable from a parse.

use bytes::Bytes;
use std::fmt;
use std::marker::PhantomData;
use thiserror::Error;

use crate::codec::{DecodeError, NetInteger, Parser, Serializer};

// ─── Wire contract ───────────────────────────────────────────────────────────

/// A value with a byte-exact wire representation.
pub trait Wire {
    /// Number of bytes `serialize` will write.
    fn serialized_length(&self) -> usize;

    /// Write the value. Panics if the serializer runs out of room.
    fn serialize(&self, s: &mut Serializer<'_>);

    /// Overwrite `self` from the parser. Errors are latched in `p`; the
    /// contents of `self` are unspecified once an error is set.
    fn parse(&mut self, p: &mut Parser<'_>);
}

/// Local construction exceeded a bounded container's capacity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("length {length} exceeds capacity {capacity}")]
pub struct CapacityError {
    pub length: usize,
    pub capacity: usize,
}

// ─── NetInt ──────────────────────────────────────────────────────────────────

/// A plain integer given the wire triad, so it can sit inside containers.
#[derive(Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NetInt<T>(pub T);

impl<T: NetInteger> NetInt<T> {
    pub fn get(self) -> T {
        self.0
    }
}

impl<T: NetInteger> From<T> for NetInt<T> {
    fn from(value: T) -> Self {
        NetInt(value)
    }
}

impl<T: fmt::Debug> fmt::Debug for NetInt<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl<T: NetInteger> Wire for NetInt<T> {
    fn serialized_length(&self) -> usize {
        T::WIDTH
    }

    fn serialize(&self, s: &mut Serializer<'_>) {
        s.integer(self.0);
    }

    fn parse(&mut self, p: &mut Parser<'_>) {
        p.integer(&mut self.0);
    }
}

// ─── NetArray ────────────────────────────────────────────────────────────────

/// Fixed-capacity inline array with a one-byte length prefix.
#[derive(Clone)]
pub struct NetArray<T, const N: usize> {
    elements: [T; N],
    length: u8,
}

impl<T: Default, const N: usize> NetArray<T, N> {
    const CAPACITY_FITS_LENGTH_BYTE: () = assert!(N <= u8::MAX as usize);

    pub fn new() -> Self {
        #[allow(clippy::let_unit_value)]
        let () = Self::CAPACITY_FITS_LENGTH_BYTE;
        NetArray {
            elements: std::array::from_fn(|_| T::default()),
            length: 0,
        }
    }

    /// Build from a slice. Panics if it does not fit.
    pub fn from_slice(items: &[T]) -> Self
    where
        T: Clone,
    {
        let mut out = Self::new();
        for item in items {
            out.push(item.clone());
        }
        out
    }

    /// Append an element. Panics when full.
    pub fn push(&mut self, element: T) {
        if self.try_push(element).is_err() {
            panic!("no room for NetArray::push (capacity {N})");
        }
    }

    /// Append an element, handing it back when full.
    pub fn try_push(&mut self, element: T) -> Result<(), T> {
        if self.is_full() {
            return Err(element);
        }
        self.elements[self.length as usize] = element;
        self.length += 1;
        Ok(())
    }

    pub fn clear(&mut self) {
        for slot in &mut self.elements[..self.length as usize] {
            *slot = T::default();
        }
        self.length = 0;
    }
}

impl<T, const N: usize> NetArray<T, N> {
    pub const CAPACITY: usize = N;

    pub fn capacity(&self) -> usize {
        N
    }

    pub fn len(&self) -> usize {
        self.length as usize
    }

    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    pub fn is_full(&self) -> bool {
        self.len() >= N
    }

    pub fn as_slice(&self) -> &[T] {
        &self.elements[..self.checked_len()]
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.as_slice().iter()
    }

    pub fn first(&self) -> Option<&T> {
        self.as_slice().first()
    }

    pub fn last(&self) -> Option<&T> {
        self.as_slice().last()
    }

    pub fn contains(&self, x: &T) -> bool
    where
        T: PartialEq,
    {
        self.as_slice().contains(x)
    }

    fn checked_len(&self) -> usize {
        let len = self.length as usize;
        if len > N {
            panic!("invalid NetArray: length {len} exceeds capacity {N}");
        }
        len
    }
}

impl<T: Default, const N: usize> Default for NetArray<T, N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: PartialEq, const N: usize> PartialEq for NetArray<T, N> {
    fn eq(&self, other: &Self) -> bool {
        self.as_slice() == other.as_slice()
    }
}

impl<T: Eq, const N: usize> Eq for NetArray<T, N> {}

impl<T: fmt::Debug, const N: usize> fmt::Debug for NetArray<T, N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.as_slice()).finish()
    }
}

impl<'a, T, const N: usize> IntoIterator for &'a NetArray<T, N> {
    type Item = &'a T;
    type IntoIter = std::slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl<T: Wire + Default, const N: usize> Wire for NetArray<T, N> {
    fn serialized_length(&self) -> usize {
        1 + self
            .as_slice()
            .iter()
            .map(Wire::serialized_length)
            .sum::<usize>()
    }

    fn serialize(&self, s: &mut Serializer<'_>) {
        let elements = self.as_slice();
        s.integer(self.length);
        for element in elements {
            s.object(element);
        }
    }

    fn parse(&mut self, p: &mut Parser<'_>) {
        let mut length = 0u8;
        p.integer(&mut length);
        if p.has_error() {
            return;
        }
        if length as usize > N {
            p.set_error(DecodeError::CapacityExceeded {
                length: length as usize,
                capacity: N,
            });
            return;
        }
        for slot in &mut self.elements[..length as usize] {
            *slot = T::default();
            p.object(slot);
        }
        self.length = length;
    }
}

// ─── NetBytes ────────────────────────────────────────────────────────────────

/// Integer type usable as a byte-string length prefix.
pub trait LengthPrefix: NetInteger {
    fn from_len(len: usize) -> Self;
    fn to_len(self) -> usize;
}

impl LengthPrefix for u8 {
    fn from_len(len: usize) -> Self {
        u8::try_from(len).expect("length checked against capacity")
    }

    fn to_len(self) -> usize {
        self as usize
    }
}

impl LengthPrefix for u16 {
    fn from_len(len: usize) -> Self {
        u16::try_from(len).expect("length checked against capacity")
    }

    fn to_len(self) -> usize {
        self as usize
    }
}

/// Bounded opaque byte string with an `L`-typed length prefix.
pub struct NetBytes<L, const MAX: usize> {
    data: Bytes,
    _prefix: PhantomData<L>,
}

/// Side-channel string: one length byte, at most 255 bytes.
pub type NetString = NetBytes<u8, 255>;

impl<L: LengthPrefix, const MAX: usize> NetBytes<L, MAX> {
    pub const MAX_LEN: usize = MAX;

    pub fn new() -> Self {
        NetBytes {
            data: Bytes::new(),
            _prefix: PhantomData,
        }
    }

    pub fn try_new(data: impl Into<Bytes>) -> Result<Self, CapacityError> {
        let data = data.into();
        if data.len() > MAX {
            return Err(CapacityError {
                length: data.len(),
                capacity: MAX,
            });
        }
        Ok(NetBytes {
            data,
            _prefix: PhantomData,
        })
    }

    pub fn as_bytes(&self) -> &Bytes {
        &self.data
    }

    pub fn into_bytes(self) -> Bytes {
        self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl<L: LengthPrefix, const MAX: usize> Default for NetBytes<L, MAX> {
    fn default() -> Self {
        Self::new()
    }
}

impl<L, const MAX: usize> Clone for NetBytes<L, MAX> {
    fn clone(&self) -> Self {
        NetBytes {
            data: self.data.clone(),
            _prefix: PhantomData,
        }
    }
}

impl<L, const MAX: usize> PartialEq for NetBytes<L, MAX> {
    fn eq(&self, other: &Self) -> bool {
        self.data == other.data
    }
}

impl<L, const MAX: usize> Eq for NetBytes<L, MAX> {}

impl<L, const MAX: usize> fmt::Debug for NetBytes<L, MAX> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.data, f)
    }
}

impl<L, const MAX: usize> AsRef<[u8]> for NetBytes<L, MAX> {
    fn as_ref(&self) -> &[u8] {
        &self.data
    }
}

impl<L: LengthPrefix, const MAX: usize> Wire for NetBytes<L, MAX> {
    fn serialized_length(&self) -> usize {
        L::WIDTH + self.data.len()
    }

    fn serialize(&self, s: &mut Serializer<'_>) {
        if self.data.len() > MAX {
            panic!(
                "invalid NetBytes: length {} exceeds capacity {MAX}",
                self.data.len()
            );
        }
        s.integer(L::from_len(self.data.len()));
        s.string(&self.data);
    }

    fn parse(&mut self, p: &mut Parser<'_>) {
        let mut prefix = L::default();
        p.integer(&mut prefix);
        if p.has_error() {
            return;
        }
        let len = prefix.to_len();
        if len > MAX {
            p.set_error(DecodeError::CapacityExceeded {
                length: len,
                capacity: MAX,
            });
            return;
        }
        let raw = p.string(len);
        if !p.has_error() {
            self.data = Bytes::copy_from_slice(raw);
        }
    }
}
