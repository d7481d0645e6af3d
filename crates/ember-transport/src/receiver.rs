//! # Receiver State Machine
//!
//! Pure logic, no I/O. Accepts raw datagrams, places each chunk at its
//! absolute position in a [`SafeEndlessBuffer`], and linearizes complete NAL
//! units once a contiguous run starting at the watermark ends in a chunk
//! flagged `end_of_nal`.
//!
//! ```text
//!   watermark
//!      ▼
//!     [4] [5] [6]  ·  [8] [9]      window = [4, 4 + C)
//!      └─ NAL 2 ─┘
//!               ▲ end_of_nal: deliver 4..=6, watermark → 7
//! ```
//!
//! Positions come straight off the network, so the store is the tolerant
//! variant: anything the peer sends can only land inside the window or be
//! ignored. A chunk just beyond the window forces the watermark forward; the
//! receiver then drops chunks until the next NAL boundary so it never
//! delivers a NAL with its head missing. A chunk more than a full window
//! beyond is parked instead, and the jump only happens once a chunk from a
//! different datagram lands within a window of it. A lone stray datagram
//! therefore cannot strand the watermark ahead of the real stream.
//!
//! Chunks lost from both packets that carried them leave a permanent hole.
//! Once a later NAL unit is complete behind it, the hole is skipped.
//!
//! Every accepted datagram's sequence number is remembered in a short
//! selective-ack window that [`feedback`](Receiver::feedback) echoes back.

use bytes::{Bytes, BytesMut};
use std::collections::VecDeque;
use tracing::{debug, trace, warn};

use crate::chunk::{Chunk, FRAMES_PER_PACKET};
use crate::codec::DecodeError;
use crate::config::ReceiverConfig;
use crate::packet::{Packet, ReceiverSection, ACK_WINDOW};
use crate::ring::{SafeEndlessBuffer, TypedRingBuffer};
use crate::stats::ReceiverStats;
use crate::wire::{NetArray, NetInt};

// ─── Events ─────────────────────────────────────────────────────────────────

/// A reassembled NAL unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveredNal {
    pub nal_index: u32,
    /// Frame index of the NAL's first chunk.
    pub first_frame_index: u32,
    pub data: Bytes,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReceiverEvent {
    Deliver(DeliveredNal),
    /// Advisory bytes from the peer's side channel.
    SideChannel(Bytes),
}

// ─── Receiver ───────────────────────────────────────────────────────────────

#[derive(Debug)]
struct ParkedChunk {
    sequence_number: u32,
    chunk: Chunk,
}

/// Receiver state machine.
#[derive(Debug)]
pub struct Receiver {
    /// Arrived chunks by `frame_index`. The window always begins at the watermark.
    chunks: SafeEndlessBuffer<Option<Chunk>>,
    next_frame_needed: u64,
    /// Dropping chunks until the next NAL boundary.
    resyncing: bool,
    /// Far-future chunk awaiting a second datagram before the window jumps.
    parked: Option<ParkedChunk>,
    /// Recent distinct sequence numbers, oldest first.
    acks: TypedRingBuffer<u32>,
    events: VecDeque<ReceiverEvent>,
    stats: ReceiverStats,
}

impl Receiver {
    pub fn new(config: ReceiverConfig) -> Self {
        Receiver {
            chunks: SafeEndlessBuffer::new(config.chunk_window.max(FRAMES_PER_PACKET)),
            next_frame_needed: 0,
            resyncing: false,
            parked: None,
            acks: TypedRingBuffer::new(config.ack_window.clamp(1, ACK_WINDOW)),
            events: VecDeque::new(),
            stats: ReceiverStats::default(),
        }
    }

    /// Decode and ingest one datagram. Malformed datagrams are dropped whole.
    pub fn receive(&mut self, datagram: &[u8]) -> Result<(), DecodeError> {
        self.receive_with_feedback(datagram).map(|_| ())
    }

    /// Like [`receive`](Self::receive), returning the feedback section the
    /// datagram carried about this side's own transmissions.
    pub fn receive_with_feedback(
        &mut self,
        datagram: &[u8],
    ) -> Result<ReceiverSection, DecodeError> {
        match Packet::decode(datagram) {
            Ok(packet) => Ok(self.ingest(packet)),
            Err(e) => {
                self.stats.packets_malformed += 1;
                debug!(error = %e, len = datagram.len(), "dropped malformed datagram");
                Err(e)
            }
        }
    }

    /// Process a decoded packet. Returns its receiver section, which
    /// describes the peer's view of this side's transmissions.
    pub fn ingest(&mut self, packet: Packet) -> ReceiverSection {
        let Packet {
            sender_section,
            receiver_section,
            side_channel,
        } = packet;

        self.stats.packets_received += 1;
        self.record_sequence_number(sender_section.sequence_number);

        let seq = sender_section.sequence_number;
        for chunk in &sender_section.frames {
            self.store_chunk(chunk.clone(), seq);
        }

        if !side_channel.is_empty() {
            self.stats.side_channel_messages += 1;
            self.events
                .push_back(ReceiverEvent::SideChannel(side_channel.into_bytes()));
        }

        self.reassemble();
        receiver_section
    }

    /// Feedback describing what this side has received.
    pub fn feedback(&self) -> ReceiverSection {
        let mut packets_received = NetArray::new();
        for &seq in self.acks.iter() {
            packets_received.push(NetInt(seq));
        }
        ReceiverSection {
            next_frame_needed: u32::try_from(self.next_frame_needed).unwrap_or(u32::MAX),
            packets_received,
        }
    }

    /// Lowest chunk index not yet reassembled.
    pub fn next_frame_needed(&self) -> u64 {
        self.next_frame_needed
    }

    pub fn drain_events(&mut self) -> impl Iterator<Item = ReceiverEvent> + '_ {
        self.events.drain(..)
    }

    pub fn pending_events(&self) -> usize {
        self.events.len()
    }

    pub fn stats(&self) -> &ReceiverStats {
        &self.stats
    }

    fn record_sequence_number(&mut self, seq: u32) {
        if self.acks.iter().any(|&s| s == seq) {
            return;
        }
        if self.acks.is_full() {
            self.acks.pop(1);
        }
        self.acks.push_back(seq);
    }

    fn store_chunk(&mut self, chunk: Chunk, seq: u32) {
        self.stats.chunks_received += 1;
        let pos = chunk.position();

        if pos < self.next_frame_needed {
            self.stats.chunks_duplicate += 1;
            return;
        }
        if pos >= self.chunks.range_end() {
            let capacity = self.chunks.capacity() as u64;
            if pos - self.chunks.range_end() < capacity {
                self.jump_to_fit(pos, pos);
            } else {
                match self.parked.take() {
                    Some(parked)
                        if parked.sequence_number != seq
                            && parked.chunk.position().abs_diff(pos) < capacity =>
                    {
                        let held = parked.chunk.position();
                        self.jump_to_fit(held.min(pos), held.max(pos));
                        self.place(parked.chunk);
                    }
                    parked => {
                        self.park(chunk, seq, parked);
                        return;
                    }
                }
            }
        }
        self.place(chunk);
    }

    fn place(&mut self, chunk: Chunk) {
        let pos = chunk.position();
        if pos < self.next_frame_needed || self.chunks.inner().at(pos).is_some() {
            self.stats.chunks_duplicate += 1;
            return;
        }
        trace!(frame = pos, nal = chunk.nal_index, "stored chunk");
        self.chunks.set(pos, Some(chunk));
    }

    /// Hold a far-future chunk until another datagram vouches for its
    /// neighbourhood. The first chunk parked from a datagram is kept.
    fn park(&mut self, chunk: Chunk, seq: u32, previous: Option<ParkedChunk>) {
        self.stats.chunks_out_of_window += 1;
        let parked = match previous {
            Some(previous) if previous.sequence_number == seq => previous,
            _ => ParkedChunk {
                sequence_number: seq,
                chunk,
            },
        };
        debug!(
            frame = parked.chunk.position(),
            watermark = self.next_frame_needed,
            "parked chunk far beyond reassembly window"
        );
        self.parked = Some(parked);
    }

    /// Move the window so `[lowest, highest]` fits, keeping any held chunk
    /// that still can.
    fn jump_to_fit(&mut self, lowest: u64, highest: u64) {
        let floor = highest + 1 - self.chunks.capacity() as u64;
        let new_begin = (floor..self.chunks.range_end())
            .find(|&p| self.chunks.inner().at(p).is_some())
            .unwrap_or(lowest);

        let skipped = (self.next_frame_needed..new_begin.min(self.chunks.range_end()))
            .filter(|&p| self.chunks.inner().at(p).is_some())
            .count() as u64;

        warn!(
            from = self.next_frame_needed,
            to = new_begin,
            frame = highest,
            skipped,
            "chunk beyond reassembly window; resyncing"
        );
        self.stats.chunks_discarded += skipped;
        self.stats.resyncs += 1;
        self.resyncing = true;
        self.advance_to(new_begin);
    }

    fn reassemble(&mut self) {
        loop {
            if self.resyncing {
                if self.discard_until_boundary() {
                    continue;
                }
            } else if let Some(end) = self.complete_run_end() {
                self.deliver_run(end);
                continue;
            }
            match self.boundary_before_complete_nal() {
                Some(boundary) => self.skip_hole(boundary),
                None => return,
            }
        }
    }

    /// Last `end_of_nal` chunk, past a hole, that is directly followed by a
    /// complete NAL unit.
    fn boundary_before_complete_nal(&self) -> Option<u64> {
        let mut gap = false;
        let mut boundary = None;
        for pos in self.next_frame_needed..self.chunks.range_end() {
            match self.chunks.inner().at(pos) {
                None => {
                    gap = true;
                    boundary = None;
                }
                Some(chunk) if gap && chunk.end_of_nal => match boundary {
                    Some(b) => return Some(b),
                    None => boundary = Some(pos),
                },
                Some(_) => {}
            }
        }
        None
    }

    fn skip_hole(&mut self, boundary: u64) {
        let skipped = (self.next_frame_needed..=boundary)
            .filter(|&p| self.chunks.inner().at(p).is_some())
            .count() as u64;
        debug!(
            from = self.next_frame_needed,
            to = boundary + 1,
            skipped,
            "skipping hole before a complete NAL unit"
        );
        self.stats.chunks_discarded += skipped;
        self.stats.holes_skipped += 1;
        self.resyncing = false;
        self.advance_to(boundary + 1);
    }

    /// Position of the `end_of_nal` chunk closing a gap-free run from the watermark.
    fn complete_run_end(&self) -> Option<u64> {
        let mut pos = self.next_frame_needed;
        while pos < self.chunks.range_end() {
            match self.chunks.inner().at(pos) {
                Some(chunk) if chunk.end_of_nal => return Some(pos),
                Some(_) => pos += 1,
                None => return None,
            }
        }
        None
    }

    fn deliver_run(&mut self, end: u64) {
        let start = self.next_frame_needed;
        let count = (end - start + 1) as usize;
        let run = self.chunks.inner().region(start, count);

        if let Some(first) = run.first().and_then(Option::as_ref) {
            let nal_index = first.nal_index;
            if run.iter().flatten().any(|c| c.nal_index != nal_index) {
                debug!(start, end, "discarding run spanning several NAL units");
                self.stats.chunks_discarded += count as u64;
            } else {
                let len = run.iter().flatten().map(|c| c.payload.len()).sum();
                let mut data = BytesMut::with_capacity(len);
                for chunk in run.iter().flatten() {
                    data.extend_from_slice(chunk.payload.as_bytes());
                }
                trace!(nal = nal_index, start, end, len, "delivering NAL");
                self.stats.nals_delivered += 1;
                self.stats.bytes_delivered += len as u64;
                self.events.push_back(ReceiverEvent::Deliver(DeliveredNal {
                    nal_index,
                    first_frame_index: first.frame_index,
                    data: data.freeze(),
                }));
            }
        }

        self.advance_to(end + 1);
    }

    /// Drop chunks up to and including the next `end_of_nal`. Returns `false`
    /// while the chunk at the watermark has not arrived.
    fn discard_until_boundary(&mut self) -> bool {
        loop {
            let pos = self.next_frame_needed;
            let end_of_nal = match self.chunks.inner().at(pos) {
                Some(chunk) => chunk.end_of_nal,
                None => return false,
            };
            self.stats.chunks_discarded += 1;
            self.advance_to(pos + 1);
            if end_of_nal {
                self.resyncing = false;
                return true;
            }
        }
    }

    fn advance_to(&mut self, pos: u64) {
        self.next_frame_needed = pos;
        self.chunks.pop_before(pos);
        self.stats.next_frame_needed = pos;
    }
}

impl Default for Receiver {
    fn default() -> Self {
        Self::new(ReceiverConfig::default())
    }
}
