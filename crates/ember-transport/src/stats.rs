//! # Transport Statistics
//!
//! Plain counters kept by the sender and receiver state machines. Both
//! structs serialize to JSON for the loopback tool and any status endpoint
//! a host application exposes.

use serde::Serialize;

// ─── Sender Stats ───────────────────────────────────────────────────────────

/// Aggregate sender-side statistics.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SenderStats {
    /// NAL units accepted by `push_nal`.
    pub nals_pushed: u64,
    /// Chunks produced by the chunker.
    pub chunks_produced: u64,
    /// Packets built, heartbeats included.
    pub packets_sent: u64,
    /// Chunk copies placed in packets, repeats included.
    pub chunks_sent: u64,
    /// Chunk copies that repeated an earlier transmission.
    pub chunks_repeated: u64,
    /// Payload bytes placed in packets, repeats included.
    pub bytes_sent: u64,
    /// Logged packets the peer acknowledged.
    pub packets_acked: u64,
    /// Logged packets retired without acknowledgement.
    pub packets_lost: u64,
    /// Logged packets retired with no verdict: the log overflowed or the
    /// peer's ack window moved past them.
    pub records_expired: u64,
    /// Chunks evicted from the window before they were ever sent.
    pub chunks_dropped_unsent: u64,
    /// Peer's cumulative watermark as last reported.
    pub remote_next_frame_needed: u64,
}

impl SenderStats {
    /// Fraction of retired packets that were never acknowledged.
    pub fn loss_rate(&self) -> f64 {
        let retired = self.packets_acked + self.packets_lost;
        if retired == 0 {
            0.0
        } else {
            self.packets_lost as f64 / retired as f64
        }
    }

    /// Share of chunk copies that were repeats.
    pub fn redundancy_ratio(&self) -> f64 {
        if self.chunks_sent == 0 {
            0.0
        } else {
            self.chunks_repeated as f64 / self.chunks_sent as f64
        }
    }
}

// ─── Receiver Stats ─────────────────────────────────────────────────────────

/// Aggregate receiver-side statistics.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ReceiverStats {
    /// Datagrams that decoded cleanly.
    pub packets_received: u64,
    /// Datagrams dropped by the decoder.
    pub packets_malformed: u64,
    /// Chunk copies seen, repeats included.
    pub chunks_received: u64,
    /// Chunk copies already held or already delivered.
    pub chunks_duplicate: u64,
    /// Chunks dropped by a watermark jump, a resync, a skipped hole or a
    /// mixed-NAL run.
    pub chunks_discarded: u64,
    /// NAL units handed to the application.
    pub nals_delivered: u64,
    /// Payload bytes handed to the application.
    pub bytes_delivered: u64,
    /// Times the watermark was forced forward by a far-future chunk.
    pub resyncs: u64,
    /// Chunks too far ahead to act on without a second datagram agreeing.
    pub chunks_out_of_window: u64,
    /// Holes given up on because a later NAL unit was already complete.
    pub holes_skipped: u64,
    /// Side-channel messages surfaced.
    pub side_channel_messages: u64,
    /// Current watermark.
    pub next_frame_needed: u64,
}

impl ReceiverStats {
    /// Share of chunk copies that carried nothing new.
    pub fn duplicate_ratio(&self) -> f64 {
        if self.chunks_received == 0 {
            0.0
        } else {
            self.chunks_duplicate as f64 / self.chunks_received as f64
        }
    }
}
