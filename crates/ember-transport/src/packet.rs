//! # Packet Format
//!
//! Every datagram, in both directions, carries a data half and a feedback
//! half plus a small advisory side channel:
//!
//! ```text
//! SenderSec  := sequence_number:u32 | count:u8(≤2)  | Chunk*count
//! RecvSec    := next_frame_needed:u32 | count:u8(≤32) | (seq:u32)*count
//! Packet     := SenderSec | RecvSec | len:u8 | side_channel:bytes[len]
//! ```
//!
//! ## Redundancy
//!
//! A sender section carries the newest chunk together with the chunk(s) it
//! already sent in the previous packet, so losing any single packet leaves
//! every chunk recoverable from a neighbour without a retransmission
//! round-trip. [`FRAMES_PER_PACKET`] fixes the redundancy factor.
//!
//! ## Feedback
//!
//! The receiver section describes what this peer has received from the other
//! direction: `next_frame_needed` is a cumulative watermark (lowest chunk
//! index not yet reassembled) and `packets_received` is a short selective-ack
//! window of recent sequence numbers.
//!
//! The side channel is neither repeated nor acknowledged.

use bytes::Bytes;

use crate::chunk::{Chunk, CHUNK_HEADER_LEN, FRAMES_PER_PACKET, MAX_CHUNK_PAYLOAD};
use crate::codec::{self, DecodeError, Parser, Serializer};
use crate::wire::{NetArray, NetInt, NetString, Wire};

/// Selective-ack window size.
pub const ACK_WINDOW: usize = 32;

/// Largest side-channel message.
pub const MAX_SIDE_CHANNEL: usize = 255;

/// Upper bound on a serialized packet.
pub const MAX_PACKET_LEN: usize = (4 + 1 + FRAMES_PER_PACKET * (CHUNK_HEADER_LEN + MAX_CHUNK_PAYLOAD))
    + (4 + 1 + ACK_WINDOW * 4)
    + (1 + MAX_SIDE_CHANNEL);

// ─── Record ──────────────────────────────────────────────────────────────────

/// Payload-free digest of a sent sender section.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Record {
    pub sequence_number: u32,
    pub frames: NetArray<NetInt<u32>, FRAMES_PER_PACKET>,
}

impl Record {
    pub fn carries(&self, frame_index: u32) -> bool {
        self.frames.contains(&NetInt(frame_index))
    }
}

// ─── Sender Section ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SenderSection {
    pub sequence_number: u32,
    pub frames: NetArray<Chunk, FRAMES_PER_PACKET>,
}

impl SenderSection {
    pub fn to_record(&self) -> Record {
        let mut record = Record {
            sequence_number: self.sequence_number,
            frames: NetArray::new(),
        };
        for chunk in &self.frames {
            record.frames.push(NetInt(chunk.frame_index));
        }
        record
    }
}

impl Wire for SenderSection {
    fn serialized_length(&self) -> usize {
        4 + self.frames.serialized_length()
    }

    fn serialize(&self, s: &mut Serializer<'_>) {
        s.integer(self.sequence_number);
        s.object(&self.frames);
    }

    fn parse(&mut self, p: &mut Parser<'_>) {
        p.integer(&mut self.sequence_number);
        p.object(&mut self.frames);
    }
}

// ─── Receiver Section ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReceiverSection {
    /// Lowest chunk index not yet fully reassembled.
    pub next_frame_needed: u32,
    /// Recently received sequence numbers, oldest first.
    pub packets_received: NetArray<NetInt<u32>, ACK_WINDOW>,
}

impl ReceiverSection {
    pub fn acknowledges(&self, sequence_number: u32) -> bool {
        self.packets_received.contains(&NetInt(sequence_number))
    }

    /// Highest acknowledged sequence number.
    pub fn highest_acked(&self) -> Option<u32> {
        self.packets_received.iter().map(|n| n.get()).max()
    }

    /// Lowest acknowledged sequence number.
    pub fn lowest_acked(&self) -> Option<u32> {
        self.packets_received.iter().map(|n| n.get()).min()
    }
}

impl Wire for ReceiverSection {
    fn serialized_length(&self) -> usize {
        4 + self.packets_received.serialized_length()
    }

    fn serialize(&self, s: &mut Serializer<'_>) {
        s.integer(self.next_frame_needed);
        s.object(&self.packets_received);
    }

    fn parse(&mut self, p: &mut Parser<'_>) {
        p.integer(&mut self.next_frame_needed);
        p.object(&mut self.packets_received);
    }
}

// ─── Packet ──────────────────────────────────────────────────────────────────

/// One datagram.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Packet {
    pub sender_section: SenderSection,
    pub receiver_section: ReceiverSection,
    pub side_channel: NetString,
}

impl Packet {
    /// Serialize into a new buffer of exactly `serialized_length()` bytes.
    pub fn encode(&self) -> Bytes {
        codec::encode(self)
    }

    /// Parse one datagram. Never panics; any malformation is an error and
    /// the whole datagram should be dropped.
    pub fn decode(datagram: &[u8]) -> Result<Self, DecodeError> {
        codec::decode(datagram)
    }
}

impl Wire for Packet {
    fn serialized_length(&self) -> usize {
        self.sender_section.serialized_length()
            + self.receiver_section.serialized_length()
            + self.side_channel.serialized_length()
    }

    fn serialize(&self, s: &mut Serializer<'_>) {
        s.object(&self.sender_section);
        s.object(&self.receiver_section);
        s.object(&self.side_channel);
    }

    fn parse(&mut self, p: &mut Parser<'_>) {
        p.object(&mut self.sender_section);
        p.object(&mut self.receiver_section);
        p.object(&mut self.side_channel);
    }
}
