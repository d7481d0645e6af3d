//! # Sender State Machine
//!
//! Pure logic, no I/O. Fragments encoder output into chunks, keeps the most
//! recent ones in an [`EndlessBuffer`] addressed by `frame_index`, and builds
//! sender sections that repeat the previous chunk next to each new one.
//!
//! ```text
//!   chunks:   ... [5] [6] [7] [8] [9]
//!                      ▲       ▲
//!     remote watermark ┘       └ next never-sent chunk
//!
//!   section(seq=n)   = [7]     (first send after a gap)
//!   section(seq=n+1) = [7, 8]
//!   section(seq=n+2) = [8, 9]
//! ```
//!
//! Every built section is logged as a payload-free [`Record`]. Feedback from
//! the peer retires records up to the highest acknowledged sequence number
//! and moves the remote watermark, which both evicts chunks the peer has
//! already reassembled and stops them from being repeated.

use tracing::{debug, trace, warn};

use crate::chunk::{Chunk, Chunker, FRAMES_PER_PACKET};
use crate::config::SenderConfig;
use crate::packet::{ReceiverSection, Record, SenderSection};
use crate::ring::{EndlessBuffer, TypedRingBuffer};
use crate::stats::SenderStats;
use crate::wire::NetArray;

/// Sender state machine.
#[derive(Debug)]
pub struct Sender {
    chunker: Chunker,
    /// Recent chunks by `frame_index`.
    chunks: EndlessBuffer<Chunk>,
    /// One past the newest produced chunk.
    produced: u64,
    /// Oldest chunk never placed in a section.
    next_unsent: u64,
    next_sequence_number: u32,
    /// Highest watermark the peer has reported.
    remote_next_frame_needed: u64,
    /// Sections awaiting feedback, oldest first.
    records: TypedRingBuffer<Record>,
    stats: SenderStats,
}

impl Sender {
    pub fn new(config: SenderConfig) -> Self {
        Sender {
            chunker: Chunker::new(config.max_chunk_payload),
            chunks: EndlessBuffer::new(config.chunk_window.max(FRAMES_PER_PACKET)),
            produced: 0,
            next_unsent: 0,
            next_sequence_number: 0,
            remote_next_frame_needed: 0,
            records: TypedRingBuffer::new(config.record_log_capacity.max(1)),
            stats: SenderStats::default(),
        }
    }

    /// Chunk one NAL unit and queue it. Returns the number of chunks produced.
    ///
    /// When the window is full the oldest chunks are evicted, sent or not.
    pub fn push_nal(&mut self, nal: &[u8]) -> usize {
        let chunks = self.chunker.fragment(nal);
        if chunks.is_empty() {
            return 0;
        }

        let mut dropped = 0u64;
        for chunk in &chunks {
            let pos = chunk.position();
            if pos >= self.chunks.range_end() {
                let new_begin = pos + 1 - self.chunks.capacity() as u64;
                dropped += new_begin.saturating_sub(self.next_unsent);
                self.next_unsent = self.next_unsent.max(new_begin);
                self.chunks.pop_before(new_begin);
            }
            self.chunks.set(pos, chunk.clone());
            self.produced = pos + 1;
        }

        if dropped > 0 {
            warn!(
                dropped,
                window = self.chunks.capacity(),
                "sender window full: evicted chunks that were never sent"
            );
            self.stats.chunks_dropped_unsent += dropped;
        }

        self.stats.nals_pushed += 1;
        self.stats.chunks_produced += chunks.len() as u64;
        chunks.len()
    }

    /// Whether any chunk is waiting for its first transmission.
    pub fn has_pending(&self) -> bool {
        self.next_unsent < self.produced
    }

    pub fn pending_chunks(&self) -> usize {
        (self.produced - self.next_unsent) as usize
    }

    /// Build the next data section, or `None` when every chunk has been sent.
    pub fn next_section(&mut self) -> Option<SenderSection> {
        if !self.has_pending() {
            return None;
        }

        let newest = self.next_unsent;
        self.next_unsent += 1;

        let oldest = newest
            .saturating_sub(FRAMES_PER_PACKET as u64 - 1)
            .max(self.chunks.range_begin())
            .max(self.remote_next_frame_needed.min(newest));

        let mut section = SenderSection {
            sequence_number: self.take_sequence_number(),
            frames: NetArray::new(),
        };
        for pos in oldest..=newest {
            let chunk = self.chunks.at(pos).clone();
            self.stats.chunks_sent += 1;
            self.stats.bytes_sent += chunk.payload.len() as u64;
            if pos < newest {
                self.stats.chunks_repeated += 1;
            }
            section.frames.push(chunk);
        }

        trace!(
            seq = section.sequence_number,
            first = oldest,
            last = newest,
            "built sender section"
        );
        self.log_section(&section);
        Some(section)
    }

    /// Section with no chunks, for packets that only carry feedback.
    pub fn heartbeat_section(&mut self) -> SenderSection {
        let section = SenderSection {
            sequence_number: self.take_sequence_number(),
            frames: NetArray::new(),
        };
        self.log_section(&section);
        section
    }

    /// Apply the peer's feedback about packets this side sent.
    ///
    /// The peer cannot need anything past what was put on the wire, so its
    /// watermark is capped at the oldest never-sent chunk.
    pub fn handle_feedback(&mut self, feedback: &ReceiverSection) {
        let reported = u64::from(feedback.next_frame_needed);
        if reported > self.next_unsent {
            debug!(
                reported,
                next_unsent = self.next_unsent,
                "peer watermark beyond transmitted chunks; capped"
            );
        }
        let watermark = reported.min(self.next_unsent);
        if watermark > self.remote_next_frame_needed {
            self.remote_next_frame_needed = watermark;
            self.stats.remote_next_frame_needed = watermark;
            self.chunks.pop_before(watermark);
        }

        let (Some(highest), Some(lowest)) = (feedback.highest_acked(), feedback.lowest_acked())
        else {
            return;
        };

        while let Some(record) = self.records.front() {
            let seq = record.sequence_number;
            if seq > highest {
                break;
            }
            if feedback.acknowledges(seq) {
                self.stats.packets_acked += 1;
            } else if seq >= lowest {
                self.stats.packets_lost += 1;
            } else {
                self.stats.records_expired += 1;
            }
            self.records.pop(1);
        }
    }

    /// Sections still awaiting a verdict, oldest first.
    pub fn in_flight(&self) -> &[Record] {
        self.records.readable_region()
    }

    pub fn remote_next_frame_needed(&self) -> u64 {
        self.remote_next_frame_needed
    }

    pub fn stats(&self) -> &SenderStats {
        &self.stats
    }

    fn take_sequence_number(&mut self) -> u32 {
        let seq = self.next_sequence_number;
        self.next_sequence_number = self.next_sequence_number.wrapping_add(1);
        self.stats.packets_sent += 1;
        seq
    }

    fn log_section(&mut self, section: &SenderSection) {
        if self.records.is_full() {
            self.records.pop(1);
            self.stats.records_expired += 1;
        }
        self.records.push_back(section.to_record());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::ACK_WINDOW;
    use crate::wire::NetInt;

    fn small_sender() -> Sender {
        Sender::new(SenderConfig {
            chunk_window: 16,
            record_log_capacity: 8,
            max_chunk_payload: 4,
        })
    }

    fn frame_indices(section: &SenderSection) -> Vec<u32> {
        section.frames.iter().map(|c| c.frame_index).collect()
    }

    fn feedback(next_frame_needed: u32, acked: &[u32]) -> ReceiverSection {
        let mut rs = ReceiverSection {
            next_frame_needed,
            packets_received: NetArray::new(),
        };
        for &seq in acked.iter().take(ACK_WINDOW) {
            rs.packets_received.push(NetInt(seq));
        }
        rs
    }

    #[test]
    fn push_nal_counts_chunks() {
        let mut tx = small_sender();
        assert_eq!(tx.push_nal(b"0123456789"), 3);
        assert_eq!(tx.pending_chunks(), 3);
        assert!(tx.has_pending());
        assert_eq!(tx.push_nal(b""), 0);
        assert_eq!(tx.stats().nals_pushed, 1);
        assert_eq!(tx.stats().chunks_produced, 3);
    }

    #[test]
    fn sections_repeat_previous_chunk() {
        let mut tx = small_sender();
        tx.push_nal(b"0123456789");

        let s0 = tx.next_section().unwrap();
        let s1 = tx.next_section().unwrap();
        let s2 = tx.next_section().unwrap();
        assert!(tx.next_section().is_none());

        assert_eq!(frame_indices(&s0), vec![0]);
        assert_eq!(frame_indices(&s1), vec![0, 1]);
        assert_eq!(frame_indices(&s2), vec![1, 2]);
        assert_eq!(
            [s0.sequence_number, s1.sequence_number, s2.sequence_number],
            [0, 1, 2]
        );

        let stats = tx.stats();
        assert_eq!(stats.packets_sent, 3);
        assert_eq!(stats.chunks_sent, 5);
        assert_eq!(stats.chunks_repeated, 2);
        assert_eq!(stats.bytes_sent, 4 + 8 + 6);
    }

    #[test]
    fn heartbeat_consumes_sequence_number() {
        let mut tx = small_sender();
        let hb = tx.heartbeat_section();
        assert!(hb.frames.is_empty());
        tx.push_nal(b"ab");
        assert_eq!(tx.next_section().unwrap().sequence_number, hb.sequence_number + 1);
        assert_eq!(tx.in_flight().len(), 2);
    }

    #[test]
    fn watermark_stops_repetition() {
        let mut tx = small_sender();
        tx.push_nal(b"0123456789");
        while tx.next_section().is_some() {}

        tx.push_nal(b"wxyz");
        tx.handle_feedback(&feedback(3, &[]));
        assert_eq!(frame_indices(&tx.next_section().unwrap()), vec![3]);
        assert_eq!(tx.remote_next_frame_needed(), 3);
    }

    #[test]
    fn watermark_is_monotone() {
        let mut tx = small_sender();
        tx.push_nal(b"0123456789abcdef");
        while tx.next_section().is_some() {}
        tx.handle_feedback(&feedback(3, &[]));
        tx.handle_feedback(&feedback(1, &[]));
        assert_eq!(tx.remote_next_frame_needed(), 3);
        assert_eq!(tx.stats().remote_next_frame_needed, 3);
    }

    #[test]
    fn watermark_is_capped_at_transmitted_chunks() {
        let mut tx = small_sender();
        tx.push_nal(b"0123456789abcdef");
        tx.next_section();
        tx.handle_feedback(&feedback(u32::MAX, &[]));
        assert_eq!(tx.remote_next_frame_needed(), 1);
        assert_eq!(tx.pending_chunks(), 3);

        tx.push_nal(b"0123456789abcdef");
        let mut sizes = Vec::new();
        while let Some(section) = tx.next_section() {
            sizes.push(section.frames.len());
        }
        assert_eq!(sizes, vec![1, 2, 2, 2, 2, 2, 2]);
    }

    #[test]
    fn feedback_retires_records() {
        let mut tx = small_sender();
        tx.push_nal(b"0123456789abcdef");
        for _ in 0..4 {
            tx.next_section();
        }
        assert_eq!(tx.in_flight().len(), 4);

        tx.handle_feedback(&feedback(0, &[0, 2]));
        assert_eq!(tx.stats().packets_acked, 2);
        assert_eq!(tx.stats().packets_lost, 1);
        assert_eq!(tx.in_flight().len(), 1);
        assert_eq!(tx.in_flight()[0].sequence_number, 3);
        assert!(tx.in_flight()[0].carries(3));

        // Stale feedback retires nothing new.
        tx.handle_feedback(&feedback(0, &[1]));
        assert_eq!(tx.in_flight().len(), 1);
        assert!((tx.stats().loss_rate() - 1.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn records_below_ack_window_expire() {
        let mut tx = small_sender();
        for _ in 0..3 {
            tx.heartbeat_section();
        }
        tx.handle_feedback(&feedback(0, &[1, 2]));
        assert_eq!(tx.stats().records_expired, 1);
        assert_eq!(tx.stats().packets_acked, 2);
        assert!(tx.in_flight().is_empty());
    }

    #[test]
    fn full_record_log_drops_oldest() {
        let mut tx = Sender::new(SenderConfig {
            record_log_capacity: 2,
            ..SenderConfig::default()
        });
        for _ in 0..3 {
            tx.heartbeat_section();
        }
        assert_eq!(tx.stats().records_expired, 1);
        let seqs: Vec<u32> = tx.in_flight().iter().map(|r| r.sequence_number).collect();
        assert_eq!(seqs, vec![1, 2]);
    }

    #[test]
    fn full_window_evicts_unsent_chunks() {
        let mut tx = Sender::new(SenderConfig {
            chunk_window: 2,
            record_log_capacity: 4,
            max_chunk_payload: 1,
        });
        assert_eq!(tx.push_nal(b"abcde"), 5);
        assert_eq!(tx.stats().chunks_dropped_unsent, 3);
        assert_eq!(tx.pending_chunks(), 2);
        assert_eq!(frame_indices(&tx.next_section().unwrap()), vec![3]);
        assert_eq!(frame_indices(&tx.next_section().unwrap()), vec![3, 4]);
    }
}
