//! # Ring Buffers
//!
//! Three bounded stores built on one typed element store:
//!
//! - [`TypedRingBuffer`]: classic FIFO with cumulative push/pop counters and
//!   contiguous writable/readable regions committed by count.
//! - [`EndlessBuffer`]: an unbounded logical sequence of which only the most
//!   recent `C` elements are kept, addressed by absolute `u64` position. Any
//!   position inside the window `[range_begin, range_begin + C)` may be read
//!   or written in any order. Used by trusted local code: leaving the window
//!   is a bug and panics.
//! - [`SafeEndlessBuffer`]: the same window, but out-of-window reads return
//!   the default value and out-of-window writes are dropped. Used where the
//!   position comes off the network.
//!
//! ## Storage
//!
//! `RingStorage` keeps every slot twice, back to back (`2C` elements). Slot
//! `i` and slot `i + C` always hold the same value once a write is committed,
//! so a run of up to `C` slots starting anywhere in `0..C` is one contiguous
//! slice even when it wraps.

use std::ops::Index;

// ─── RingStorage ─────────────────────────────────────────────────────────────

#[derive(Debug)]
struct RingStorage<T> {
    slots: Box<[T]>,
    capacity: usize,
}

impl<T: Clone + Default> RingStorage<T> {
    fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "ring capacity must be non-zero");
        RingStorage {
            slots: vec![T::default(); 2 * capacity].into_boxed_slice(),
            capacity,
        }
    }

    fn capacity(&self) -> usize {
        self.capacity
    }

    fn check_region(&self, index: usize, len: usize) {
        assert!(
            index < self.capacity && len <= self.capacity,
            "ring region {index}+{len} invalid for capacity {}",
            self.capacity
        );
    }

    fn region(&self, index: usize, len: usize) -> &[T] {
        self.check_region(index, len);
        &self.slots[index..index + len]
    }

    fn region_mut(&mut self, index: usize, len: usize) -> &mut [T] {
        self.check_region(index, len);
        &mut self.slots[index..index + len]
    }

    /// Copy `len` slots written through `region_mut(index, ..)` into their mirrors.
    fn reflect(&mut self, index: usize, len: usize) {
        self.check_region(index, len);
        for i in index..index + len {
            let mirror = if i < self.capacity {
                i + self.capacity
            } else {
                i - self.capacity
            };
            self.slots[mirror] = self.slots[i].clone();
        }
    }

    fn get(&self, index: usize) -> &T {
        &self.slots[index % self.capacity]
    }

    fn set(&mut self, index: usize, value: T) {
        let i = index % self.capacity;
        self.slots[i + self.capacity] = value.clone();
        self.slots[i] = value;
    }
}

// ─── TypedRingBuffer ─────────────────────────────────────────────────────────

/// Bounded FIFO. `0 <= num_stored() <= capacity()` always holds.
#[derive(Debug)]
pub struct TypedRingBuffer<T> {
    storage: RingStorage<T>,
    num_pushed: u64,
    num_popped: u64,
}

impl<T: Clone + Default> TypedRingBuffer<T> {
    /// Panics if `capacity` is zero.
    pub fn new(capacity: usize) -> Self {
        TypedRingBuffer {
            storage: RingStorage::new(capacity),
            num_pushed: 0,
            num_popped: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.storage.capacity()
    }

    pub fn num_pushed(&self) -> u64 {
        self.num_pushed
    }

    pub fn num_popped(&self) -> u64 {
        self.num_popped
    }

    pub fn num_stored(&self) -> usize {
        (self.num_pushed - self.num_popped) as usize
    }

    pub fn is_empty(&self) -> bool {
        self.num_stored() == 0
    }

    pub fn is_full(&self) -> bool {
        self.num_stored() == self.capacity()
    }

    fn next_index_to_write(&self) -> usize {
        (self.num_pushed % self.capacity() as u64) as usize
    }

    fn next_index_to_read(&self) -> usize {
        (self.num_popped % self.capacity() as u64) as usize
    }

    /// Free slots following the last pushed element.
    pub fn writable_region(&mut self) -> &mut [T] {
        let len = self.capacity() - self.num_stored();
        let index = self.next_index_to_write();
        self.storage.region_mut(index, len)
    }

    /// Commit `num_elems` slots written through [`writable_region`](Self::writable_region).
    pub fn push(&mut self, num_elems: usize) {
        let available = self.capacity() - self.num_stored();
        if num_elems > available {
            panic!(
                "TypedRingBuffer::push exceeded size of writable region ({num_elems} > {available})"
            );
        }
        let index = self.next_index_to_write();
        self.storage.reflect(index, num_elems);
        self.num_pushed += num_elems as u64;
    }

    /// Stored elements, oldest first.
    pub fn readable_region(&self) -> &[T] {
        self.storage
            .region(self.next_index_to_read(), self.num_stored())
    }

    /// Release `num_elems` elements from the front.
    pub fn pop(&mut self, num_elems: usize) {
        let stored = self.num_stored();
        if num_elems > stored {
            panic!("TypedRingBuffer::pop exceeded size of readable region ({num_elems} > {stored})");
        }
        self.num_popped += num_elems as u64;
    }

    /// Push one element. Panics when full.
    pub fn push_back(&mut self, value: T) {
        match self.writable_region().first_mut() {
            Some(slot) => *slot = value,
            None => panic!("TypedRingBuffer::push_back on a full buffer"),
        }
        self.push(1);
    }

    pub fn front(&self) -> Option<&T> {
        self.readable_region().first()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.readable_region().iter()
    }
}

// ─── EndlessBuffer ───────────────────────────────────────────────────────────

/// Windowed random-access buffer over absolute positions.
#[derive(Debug)]
pub struct EndlessBuffer<T> {
    storage: RingStorage<T>,
    num_popped: u64,
}

impl<T: Clone + Default> EndlessBuffer<T> {
    /// Panics if `capacity` is zero.
    pub fn new(capacity: usize) -> Self {
        EndlessBuffer {
            storage: RingStorage::new(capacity),
            num_popped: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.storage.capacity()
    }

    /// First retained position.
    pub fn range_begin(&self) -> u64 {
        self.num_popped
    }

    /// One past the last addressable position.
    pub fn range_end(&self) -> u64 {
        self.range_begin() + self.capacity() as u64
    }

    pub fn contains(&self, pos: u64) -> bool {
        pos >= self.range_begin() && pos < self.range_end()
    }

    fn check_bounds(&self, pos: u64, count: usize) {
        if pos < self.range_begin() || pos.saturating_add(count as u64) > self.range_end() {
            panic!(
                "EndlessBuffer: positions {pos}+{count} outside window [{}, {})",
                self.range_begin(),
                self.range_end()
            );
        }
    }

    fn slot(&self, pos: u64) -> usize {
        (pos % self.capacity() as u64) as usize
    }

    /// Evict the oldest `num_elems` positions, resetting their slots.
    pub fn pop(&mut self, num_elems: u64) {
        let cleared = num_elems.min(self.capacity() as u64);
        for pos in self.num_popped..self.num_popped + cleared {
            let slot = self.slot(pos);
            self.storage.set(slot, T::default());
        }
        self.num_popped += num_elems;
    }

    /// Advance the window so it begins at `pos`. No-op unless `pos` is ahead.
    pub fn pop_before(&mut self, pos: u64) {
        if pos <= self.range_begin() {
            return;
        }
        self.pop(pos - self.range_begin());
    }

    /// Element at `pos`. Panics outside the window.
    pub fn at(&self, pos: u64) -> &T {
        self.check_bounds(pos, 1);
        self.storage.get(self.slot(pos))
    }

    /// Store `value` at `pos`. Panics outside the window.
    pub fn set(&mut self, pos: u64, value: T) {
        self.check_bounds(pos, 1);
        let slot = self.slot(pos);
        self.storage.set(slot, value);
    }

    /// Modify the element at `pos` in place. Panics outside the window.
    pub fn update<R>(&mut self, pos: u64, f: impl FnOnce(&mut T) -> R) -> R {
        self.check_bounds(pos, 1);
        let slot = self.slot(pos);
        let out = f(&mut self.storage.region_mut(slot, 1)[0]);
        self.storage.reflect(slot, 1);
        out
    }

    /// `count` consecutive elements starting at `pos`, as one slice.
    pub fn region(&self, pos: u64, count: usize) -> &[T] {
        self.check_bounds(pos, count);
        self.storage.region(self.slot(pos), count)
    }
}

impl<T: Clone + Default> Index<u64> for EndlessBuffer<T> {
    type Output = T;

    fn index(&self, pos: u64) -> &T {
        self.at(pos)
    }
}

// ─── SafeEndlessBuffer ───────────────────────────────────────────────────────

/// [`EndlessBuffer`] that tolerates out-of-window positions.
#[derive(Debug)]
pub struct SafeEndlessBuffer<T> {
    inner: EndlessBuffer<T>,
}

impl<T: Clone + Default> SafeEndlessBuffer<T> {
    pub fn new(capacity: usize) -> Self {
        SafeEndlessBuffer {
            inner: EndlessBuffer::new(capacity),
        }
    }

    pub fn capacity(&self) -> usize {
        self.inner.capacity()
    }

    pub fn range_begin(&self) -> u64 {
        self.inner.range_begin()
    }

    pub fn range_end(&self) -> u64 {
        self.inner.range_end()
    }

    pub fn contains(&self, pos: u64) -> bool {
        self.inner.contains(pos)
    }

    /// Element at `pos`, or `T::default()` outside the window.
    pub fn get(&self, pos: u64) -> T {
        if !self.contains(pos) {
            return T::default();
        }
        self.inner.at(pos).clone()
    }

    /// Store `value` at `pos`. Returns `false` (and drops the value) outside the window.
    pub fn set(&mut self, pos: u64, value: T) -> bool {
        if !self.contains(pos) {
            return false;
        }
        self.inner.set(pos, value);
        true
    }

    pub fn pop_before(&mut self, pos: u64) {
        self.inner.pop_before(pos);
    }

    pub fn inner(&self) -> &EndlessBuffer<T> {
        &self.inner
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ─── TypedRingBuffer ────────────────────────────────────────────────

    #[test]
    fn fifo_regions_and_accounting() {
        let mut rb = TypedRingBuffer::<u32>::new(4);
        assert_eq!(rb.writable_region().len(), 4);
        assert!(rb.readable_region().is_empty());

        rb.writable_region()[..3].copy_from_slice(&[1, 2, 3]);
        rb.push(3);
        assert_eq!(rb.num_stored(), 3);
        assert_eq!(rb.readable_region(), &[1, 2, 3]);
        assert_eq!(rb.writable_region().len(), 1);

        rb.pop(2);
        assert_eq!(rb.readable_region(), &[3]);
        assert_eq!(rb.num_pushed(), 3);
        assert_eq!(rb.num_popped(), 2);
    }

    #[test]
    fn fifo_regions_stay_contiguous_across_wrap() {
        let mut rb = TypedRingBuffer::<u32>::new(4);
        rb.writable_region()[..3].copy_from_slice(&[1, 2, 3]);
        rb.push(3);
        rb.pop(3);

        // Write index is 3; the next three writes wrap past the end.
        let region = rb.writable_region();
        assert_eq!(region.len(), 4);
        region.copy_from_slice(&[10, 11, 12, 13]);
        rb.push(4);
        assert!(rb.is_full());
        assert_eq!(rb.readable_region(), &[10, 11, 12, 13]);

        rb.pop(1);
        rb.push_back(14);
        assert_eq!(rb.readable_region(), &[11, 12, 13, 14]);
        assert_eq!(rb.front(), Some(&11));
        assert_eq!(rb.iter().copied().sum::<u32>(), 50);
    }

    #[test]
    fn fifo_uncommitted_writes_are_invisible() {
        let mut rb = TypedRingBuffer::<u8>::new(3);
        rb.writable_region().copy_from_slice(&[7, 8, 9]);
        rb.push(1);
        assert_eq!(rb.readable_region(), &[7]);
    }

    #[test]
    #[should_panic(expected = "push exceeded size of writable region")]
    fn fifo_overpush_is_fatal() {
        let mut rb = TypedRingBuffer::<u8>::new(2);
        rb.push(3);
    }

    #[test]
    #[should_panic(expected = "pop exceeded size of readable region")]
    fn fifo_overpop_is_fatal() {
        let mut rb = TypedRingBuffer::<u8>::new(2);
        rb.push_back(1);
        rb.pop(2);
    }

    #[test]
    #[should_panic(expected = "push_back on a full buffer")]
    fn fifo_push_back_when_full_is_fatal() {
        let mut rb = TypedRingBuffer::<u8>::new(1);
        rb.push_back(1);
        rb.push_back(2);
    }

    // ─── EndlessBuffer ──────────────────────────────────────────────────

    #[test]
    fn endless_window_and_eviction() {
        let mut eb = EndlessBuffer::<u8>::new(4);
        for pos in 0..4u64 {
            eb.set(pos, pos as u8 + 1);
        }
        eb.pop_before(2);
        assert_eq!(eb.range_begin(), 2);
        assert_eq!(eb.range_end(), 6);
        assert_eq!(*eb.at(2), 3);
        assert_eq!(eb[3], 4);

        // Evicted slots were reset; their positions 4 and 5 read as default.
        assert_eq!(*eb.at(4), 0);
        assert_eq!(*eb.at(5), 0);
    }

    #[test]
    fn endless_pop_before_never_rewinds() {
        let mut eb = EndlessBuffer::<u8>::new(4);
        eb.pop_before(10);
        assert_eq!(eb.range_begin(), 10);
        eb.pop_before(3);
        assert_eq!(eb.range_begin(), 10);
        eb.pop_before(10);
        assert_eq!(eb.range_begin(), 10);
    }

    #[test]
    fn endless_far_pop_clears_everything() {
        let mut eb = EndlessBuffer::<u8>::new(4);
        for pos in 0..4u64 {
            eb.set(pos, 9);
        }
        eb.pop_before(100);
        assert!((100..104u64).all(|pos| *eb.at(pos) == 0));
    }

    #[test]
    fn endless_out_of_order_writes_and_region() {
        let mut eb = EndlessBuffer::<u32>::new(4);
        eb.pop_before(6);
        eb.set(9, 90);
        eb.set(7, 70);
        eb.set(6, 60);
        eb.set(8, 80);
        // Window 6..10 wraps the physical storage at position 8.
        assert_eq!(eb.region(6, 4), &[60, 70, 80, 90]);
        eb.update(7, |v| *v += 1);
        assert_eq!(eb.region(7, 2), &[71, 80]);
    }

    #[test]
    #[should_panic(expected = "outside window")]
    fn endless_at_evicted_position_aborts() {
        let mut eb = EndlessBuffer::<u8>::new(4);
        for pos in 0..4u64 {
            eb.set(pos, 1);
        }
        eb.pop_before(2);
        let _ = eb.at(0);
    }

    #[test]
    #[should_panic(expected = "outside window")]
    fn endless_set_past_window_aborts() {
        let mut eb = EndlessBuffer::<u8>::new(4);
        eb.set(4, 1);
    }

    #[test]
    #[should_panic(expected = "outside window")]
    fn endless_index_uses_same_bounds_check() {
        let eb = EndlessBuffer::<u8>::new(4);
        let _value: u8 = eb[4];
    }

    #[test]
    #[should_panic(expected = "outside window")]
    fn endless_region_overrun_aborts() {
        let eb = EndlessBuffer::<u8>::new(4);
        let _ = eb.region(2, 3);
    }

    // ─── SafeEndlessBuffer ──────────────────────────────────────────────

    #[test]
    fn safe_buffer_tolerates_out_of_window() {
        let mut sb = SafeEndlessBuffer::<u8>::new(4);
        for pos in 0..4u64 {
            assert!(sb.set(pos, pos as u8 + 1));
        }
        sb.pop_before(2);
        assert_eq!(sb.range_begin(), 2);
        assert_eq!(sb.get(0), 0);
        assert_eq!(sb.get(2), 3);

        assert!(!sb.set(1, 42));
        assert!(!sb.set(6, 42));
        assert_eq!(sb.get(6), 0);
        assert_eq!(sb.range_begin(), 2, "rejected writes must not move the window");
        assert_eq!(*sb.inner().at(3), 4);
    }
}
