#![no_main]

use ember_transport::config::ReceiverConfig;
use ember_transport::receiver::Receiver;
use libfuzzer_sys::fuzz_target;

/// Fuzz the receiver state machine with arbitrary datagrams.
///
/// The first byte picks a split count so the same input also exercises
/// multi-datagram interactions: window jumps, resyncs, duplicate
/// suppression and reassembly across packets. A small window makes the
/// far-future path reachable.
///
/// The receiver must never panic, and its watermark never moves backwards.
fuzz_target!(|data: &[u8]| {
    let Some((&splits, rest)) = data.split_first() else {
        return;
    };
    let mut rx = Receiver::new(ReceiverConfig {
        chunk_window: 16,
        ack_window: 8,
    });

    let parts = (splits as usize % 8) + 1;
    let step = rest.len().div_ceil(parts).max(1);
    let mut watermark = rx.next_frame_needed();
    for datagram in rest.chunks(step) {
        let _ = rx.receive(datagram);
        for _ in rx.drain_events() {}
        assert!(rx.next_frame_needed() >= watermark);
        watermark = rx.next_frame_needed();
    }

    let feedback = rx.feedback();
    assert!(feedback.packets_received.len() <= 8);
});
