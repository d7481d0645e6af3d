//! # Video Chunks
//!
//! A [`Chunk`] is a bounded fragment of one encoded NAL unit and the unit of
//! both transmission and redundancy.
//!
//! ```text
//! Chunk := frame_index:u32 | end_of_nal:u8(0/1) | nal_index:u32 | len:u16 | payload:bytes[len]
//! ```
//!
//! `frame_index` numbers chunks, not video frames: it is a session-wide
//! counter that increases by one per chunk and doubles as the chunk's
//! absolute position in the sender and receiver ring buffers.

use bytes::Bytes;

use crate::codec::{DecodeError, Parser, Serializer};
use crate::wire::{NetBytes, Wire};

/// Largest payload carried by one chunk.
pub const MAX_CHUNK_PAYLOAD: usize = 512;

/// Chunks per packet; fixes the redundancy factor.
pub const FRAMES_PER_PACKET: usize = 2;

/// Fixed part of a chunk's wire form (everything but the payload bytes).
pub const CHUNK_HEADER_LEN: usize = 4 + 1 + 4 + 2;

/// NAL payload bytes, `u16` length prefix.
pub type ChunkPayload = NetBytes<u16, MAX_CHUNK_PAYLOAD>;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Chunk {
    /// Absolute chunk index.
    pub frame_index: u32,
    /// Last chunk of its NAL unit.
    pub end_of_nal: bool,
    /// Ordinal of the NAL unit this chunk belongs to.
    pub nal_index: u32,
    pub payload: ChunkPayload,
}

impl Chunk {
    /// Build a chunk. Fails if `payload` exceeds [`MAX_CHUNK_PAYLOAD`].
    pub fn new(
        frame_index: u32,
        nal_index: u32,
        end_of_nal: bool,
        payload: impl Into<Bytes>,
    ) -> Result<Self, crate::wire::CapacityError> {
        Ok(Chunk {
            frame_index,
            end_of_nal,
            nal_index,
            payload: ChunkPayload::try_new(payload)?,
        })
    }

    /// Absolute ring-buffer position of this chunk.
    pub fn position(&self) -> u64 {
        self.frame_index as u64
    }
}

impl Wire for Chunk {
    fn serialized_length(&self) -> usize {
        4 + 1 + 4 + self.payload.serialized_length()
    }

    fn serialize(&self, s: &mut Serializer<'_>) {
        s.integer(self.frame_index);
        s.integer(self.end_of_nal as u8);
        s.integer(self.nal_index);
        s.object(&self.payload);
    }

    fn parse(&mut self, p: &mut Parser<'_>) {
        p.integer(&mut self.frame_index);

        let mut end_of_nal = 0u8;
        p.integer(&mut end_of_nal);
        match end_of_nal {
            0 => self.end_of_nal = false,
            1 => self.end_of_nal = true,
            other => p.set_error(DecodeError::InvalidValue {
                field: "end_of_nal",
                value: other as u64,
            }),
        }

        p.integer(&mut self.nal_index);
        p.object(&mut self.payload);
    }
}

// ─── Chunker ─────────────────────────────────────────────────────────────────

/// Splits encoder output into chunks, one NAL unit at a time.
#[derive(Debug)]
pub struct Chunker {
    max_payload: usize,
    next_frame_index: u32,
    next_nal_index: u32,
}

impl Chunker {
    /// `max_payload` is clamped to `1..=MAX_CHUNK_PAYLOAD`.
    pub fn new(max_payload: usize) -> Self {
        Chunker {
            max_payload: max_payload.clamp(1, MAX_CHUNK_PAYLOAD),
            next_frame_index: 0,
            next_nal_index: 0,
        }
    }

    pub fn max_payload(&self) -> usize {
        self.max_payload
    }

    /// Index the next produced chunk will carry.
    pub fn next_frame_index(&self) -> u32 {
        self.next_frame_index
    }

    pub fn next_nal_index(&self) -> u32 {
        self.next_nal_index
    }

    /// Fragment one NAL unit. An empty NAL yields nothing and consumes no index.
    pub fn fragment(&mut self, nal: &[u8]) -> Vec<Chunk> {
        if nal.is_empty() {
            return Vec::new();
        }

        let nal_index = self.next_nal_index;
        self.next_nal_index = self.next_nal_index.wrapping_add(1);

        let count = nal.len().div_ceil(self.max_payload);
        let mut chunks = Vec::with_capacity(count);
        for (i, piece) in nal.chunks(self.max_payload).enumerate() {
            chunks.push(Chunk {
                frame_index: self.next_frame_index,
                end_of_nal: i + 1 == count,
                nal_index,
                payload: ChunkPayload::try_new(Bytes::copy_from_slice(piece))
                    .expect("piece bounded by max_payload"),
            });
            self.next_frame_index = self.next_frame_index.wrapping_add(1);
        }
        chunks
    }
}

impl Default for Chunker {
    fn default() -> Self {
        Self::new(MAX_CHUNK_PAYLOAD)
    }
}
