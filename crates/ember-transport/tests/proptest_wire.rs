//! Property-based tests for the ember wire format and ring buffers.
//!
//! Round-trips and length accounting for every message type, decoder safety
//! on truncated and arbitrary input, and the accounting rules of the ring
//! buffer family.

use bytes::Bytes;
use proptest::prelude::*;

use ember_transport::chunk::{Chunk, Chunker, FRAMES_PER_PACKET, MAX_CHUNK_PAYLOAD};
use ember_transport::codec::{decode, encode, DecodeError};
use ember_transport::key::{KeyMessage, KeyMessageId, KeyPair, KEY_LEN};
use ember_transport::packet::{Packet, ReceiverSection, SenderSection, ACK_WINDOW};
use ember_transport::ring::{EndlessBuffer, SafeEndlessBuffer, TypedRingBuffer};
use ember_transport::wire::{NetArray, NetInt, NetString, Wire};

// ─── Strategies ──────────────────────────────────────────────────────────────

fn chunk() -> impl Strategy<Value = Chunk> {
    (
        any::<u32>(),
        any::<u32>(),
        any::<bool>(),
        prop::collection::vec(any::<u8>(), 0..=MAX_CHUNK_PAYLOAD),
    )
        .prop_map(|(frame_index, nal_index, end_of_nal, payload)| {
            Chunk::new(frame_index, nal_index, end_of_nal, payload).unwrap()
        })
}

fn sender_section() -> impl Strategy<Value = SenderSection> {
    (
        any::<u32>(),
        prop::collection::vec(chunk(), 0..=FRAMES_PER_PACKET),
    )
        .prop_map(|(sequence_number, chunks)| SenderSection {
            sequence_number,
            frames: NetArray::from_slice(&chunks),
        })
}

fn receiver_section() -> impl Strategy<Value = ReceiverSection> {
    (
        any::<u32>(),
        prop::collection::vec(any::<u32>(), 0..=ACK_WINDOW),
    )
        .prop_map(|(next_frame_needed, seqs)| {
            let acks: Vec<NetInt<u32>> = seqs.into_iter().map(NetInt).collect();
            ReceiverSection {
                next_frame_needed,
                packets_received: NetArray::from_slice(&acks),
            }
        })
}

fn packet() -> impl Strategy<Value = Packet> {
    (
        sender_section(),
        receiver_section(),
        prop::collection::vec(any::<u8>(), 0..=255),
    )
        .prop_map(|(sender_section, receiver_section, side)| Packet {
            sender_section,
            receiver_section,
            side_channel: NetString::try_new(side).unwrap(),
        })
}

fn key_message() -> impl Strategy<Value = KeyMessage> {
    (any::<bool>(), any::<[u8; KEY_LEN]>(), any::<[u8; KEY_LEN]>()).prop_map(
        |(request, uplink, downlink)| KeyMessage {
            id: if request {
                KeyMessageId::Request
            } else {
                KeyMessageId::ServerResponse
            },
            key_pair: KeyPair { uplink, downlink },
        },
    )
}

// ─── Round-trip and length accounting ────────────────────────────────────────

proptest! {
    #[test]
    fn chunk_roundtrip(c in chunk()) {
        let bytes = encode(&c);
        prop_assert_eq!(bytes.len(), c.serialized_length());
        prop_assert_eq!(bytes.len(), 11 + c.payload.len());
        prop_assert_eq!(decode::<Chunk>(&bytes).unwrap(), c);
    }

    #[test]
    fn packet_roundtrip(pkt in packet()) {
        let bytes = pkt.encode();
        prop_assert_eq!(bytes.len(), pkt.serialized_length());
        prop_assert_eq!(Packet::decode(&bytes).unwrap(), pkt);
    }

    #[test]
    fn key_message_roundtrip(msg in key_message()) {
        let bytes = msg.encode();
        prop_assert_eq!(bytes.len(), KeyMessage::ENCODED_LEN);
        prop_assert_eq!(KeyMessage::decode(&bytes).unwrap(), msg);
    }

    #[test]
    fn chunker_preserves_nal_bytes(
        nal in prop::collection::vec(any::<u8>(), 1..4000),
        max_payload in 1usize..=MAX_CHUNK_PAYLOAD,
    ) {
        let mut chunker = Chunker::new(max_payload);
        let chunks = chunker.fragment(&nal);

        prop_assert_eq!(chunks.len(), nal.len().div_ceil(max_payload));
        prop_assert!(chunks.iter().all(|c| c.payload.len() <= max_payload));
        prop_assert_eq!(chunks.iter().filter(|c| c.end_of_nal).count(), 1);
        prop_assert!(chunks.last().unwrap().end_of_nal);

        let joined: Vec<u8> = chunks.iter().flat_map(|c| c.payload.as_bytes().to_vec()).collect();
        prop_assert_eq!(joined, nal);
    }
}

// ─── Decoder safety ──────────────────────────────────────────────────────────

proptest! {
    #[test]
    fn every_strict_prefix_fails(pkt in packet()) {
        let bytes = pkt.encode();
        for cut in 0..bytes.len() {
            prop_assert!(Packet::decode(&bytes[..cut]).is_err());
        }
    }

    #[test]
    fn arbitrary_bytes_never_panic(data in prop::collection::vec(any::<u8>(), 0..2048)) {
        if let Ok(pkt) = Packet::decode(&data) {
            prop_assert_eq!(&pkt.encode()[..], &data[..]);
        }
        let _ = KeyMessage::decode(&data);
    }

    #[test]
    fn oversized_array_count_is_rejected(count in (FRAMES_PER_PACKET as u8 + 1)..=u8::MAX) {
        let mut input = vec![0u8, 0, 0, 0, count];
        input.extend_from_slice(&[0u8; 64]);
        prop_assert_eq!(
            Packet::decode(&input),
            Err(DecodeError::CapacityExceeded {
                length: count as usize,
                capacity: FRAMES_PER_PACKET,
            })
        );
    }

    #[test]
    fn oversized_string_length_is_rejected(len in (MAX_CHUNK_PAYLOAD as u16 + 1)..=u16::MAX) {
        let mut input = vec![0u8; 9];
        input.extend_from_slice(&len.to_be_bytes());
        let is_capacity_error = matches!(
            decode::<Chunk>(&input),
            Err(DecodeError::CapacityExceeded { .. })
        );
        prop_assert!(is_capacity_error);
    }
}

// ─── Ring buffers ────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
enum FifoOp {
    Push(usize),
    Pop(usize),
}

fn fifo_op() -> impl Strategy<Value = FifoOp> {
    prop_oneof![
        (0usize..8).prop_map(FifoOp::Push),
        (0usize..8).prop_map(FifoOp::Pop),
    ]
}

proptest! {
    #[test]
    fn fifo_accounting_matches_model(
        capacity in 1usize..8,
        ops in prop::collection::vec(fifo_op(), 0..64),
    ) {
        let mut rb = TypedRingBuffer::<u64>::new(capacity);
        let mut model = std::collections::VecDeque::new();
        let mut next = 0u64;

        for op in ops {
            match op {
                FifoOp::Push(n) => {
                    let n = n.min(rb.writable_region().len());
                    for slot in &mut rb.writable_region()[..n] {
                        *slot = next;
                        model.push_back(next);
                        next += 1;
                    }
                    rb.push(n);
                }
                FifoOp::Pop(n) => {
                    let n = n.min(rb.num_stored());
                    rb.pop(n);
                    model.drain(..n).for_each(drop);
                }
            }
            prop_assert!(rb.num_stored() <= rb.capacity());
            prop_assert_eq!(rb.num_pushed() - rb.num_popped(), rb.num_stored() as u64);
            prop_assert_eq!(rb.writable_region().len(), capacity - model.len());
            let stored: Vec<u64> = model.iter().copied().collect();
            prop_assert_eq!(rb.readable_region(), &stored[..]);
        }
    }

    #[test]
    fn endless_window_only_moves_forward(
        capacity in 1usize..16,
        targets in prop::collection::vec(0u64..200, 1..32),
    ) {
        let mut eb = EndlessBuffer::<u64>::new(capacity);
        let mut begin = 0u64;
        for target in targets {
            let pos = eb.range_begin();
            eb.set(pos, pos + 1);
            eb.pop_before(target);
            begin = begin.max(target);
            prop_assert_eq!(eb.range_begin(), begin);
            prop_assert_eq!(eb.range_end(), begin + capacity as u64);
            if target > pos {
                // Evicted slots read back as the default value.
                prop_assert_eq!(*eb.at(eb.range_begin()), 0);
            }
        }
    }

    #[test]
    fn endless_region_is_contiguous(
        capacity in 1usize..16,
        start in 0u64..100,
    ) {
        let mut eb = EndlessBuffer::<u64>::new(capacity);
        eb.pop_before(start);
        for pos in eb.range_begin()..eb.range_end() {
            eb.set(pos, pos);
        }
        for offset in 0..capacity {
            let pos = start + offset as u64;
            let len = capacity - offset;
            let expected: Vec<u64> = (pos..pos + len as u64).collect();
            prop_assert_eq!(eb.region(pos, len), &expected[..]);
        }
    }

    #[test]
    fn safe_buffer_tolerates_any_position(
        capacity in 1usize..16,
        begin in 0u64..50,
        positions in prop::collection::vec(0u64..200, 0..32),
    ) {
        let mut sb = SafeEndlessBuffer::<Option<u64>>::new(capacity);
        sb.pop_before(begin);
        for pos in positions {
            let inside = sb.contains(pos);
            prop_assert_eq!(sb.set(pos, Some(pos)), inside);
            prop_assert_eq!(sb.get(pos), inside.then_some(pos));
        }
    }
}

#[test]
fn net_bytes_capacity_is_enforced() {
    assert!(NetString::try_new(Bytes::from(vec![0u8; 256])).is_err());
    assert!(NetString::try_new(Bytes::from(vec![0u8; 255])).is_ok());
}
