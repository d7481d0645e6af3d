use bytes::Bytes;
use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use ember_transport::config::{ReceiverConfig, SenderConfig};
use ember_transport::packet::Packet;
use ember_transport::receiver::Receiver;
use ember_transport::sender::Sender;
use ember_transport::{Peer, TransportConfig};

/// Pre-encoded datagrams for a run of `count` NAL units.
fn wire_packets(count: usize, nal: &[u8]) -> Vec<Bytes> {
    let mut peer = Peer::new(&TransportConfig::default());
    let mut out = Vec::new();
    for _ in 0..count {
        peer.push_nal(nal);
        while let Some(datagram) = peer.poll_transmit() {
            out.push(datagram);
        }
    }
    out
}

/// Benchmark the codec: Packet::encode and Packet::decode of a full datagram.
fn bench_codec(c: &mut Criterion) {
    let nal = vec![0xABu8; 1024];
    let datagram = wire_packets(1, &nal).pop().unwrap_or_default();
    let packet = Packet::decode(&datagram).unwrap();

    let mut group = c.benchmark_group("codec");
    group.throughput(Throughput::Bytes(datagram.len() as u64));

    group.bench_function("encode_full_packet", |b| {
        b.iter(|| black_box(&packet).encode());
    });

    group.bench_function("decode_full_packet", |b| {
        b.iter(|| Packet::decode(black_box(&datagram)).unwrap());
    });

    group.finish();
}

/// Benchmark the sender hot path: push_nal() + next_section().
fn bench_sender(c: &mut Criterion) {
    let nal = vec![0xABu8; 1400];

    let mut group = c.benchmark_group("sender");
    group.throughput(Throughput::Elements(1));

    group.bench_function("push_and_drain_nal", |b| {
        let mut sender = Sender::new(SenderConfig::default());
        b.iter(|| {
            sender.push_nal(black_box(&nal));
            while let Some(section) = sender.next_section() {
                black_box(section);
            }
        });
    });

    group.finish();
}

/// Benchmark the receiver hot path: receive() + drain_events().
fn bench_receiver(c: &mut Criterion) {
    let nal = vec![0xABu8; 1400];
    let packets = wire_packets(256, &nal);

    let mut group = c.benchmark_group("receiver");
    group.throughput(Throughput::Elements(packets.len() as u64));

    group.bench_function("receive_nal_run", |b| {
        b.iter(|| {
            let mut receiver = Receiver::new(ReceiverConfig::default());
            for pkt in &packets {
                let _ = receiver.receive(black_box(pkt));
            }
            receiver.drain_events().for_each(drop);
        });
    });

    group.finish();
}

/// Benchmark a full peer-to-peer exchange (in-process, no network).
fn bench_peer_roundtrip(c: &mut Criterion) {
    let nal = vec![0xABu8; 1400];

    let mut group = c.benchmark_group("roundtrip");
    group.throughput(Throughput::Elements(1));

    group.bench_function("nal_with_feedback", |b| {
        let config = TransportConfig::default();
        let mut camera = Peer::new(&config);
        let mut display = Peer::new(&config);
        b.iter(|| {
            camera.push_nal(black_box(&nal));
            while let Some(datagram) = camera.poll_transmit() {
                let _ = display.receive(&datagram);
            }
            let _ = camera.receive(&display.heartbeat());
            for event in display.drain_events() {
                black_box(event);
            }
        });
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_codec,
    bench_sender,
    bench_receiver,
    bench_peer_roundtrip
);
criterion_main!(benches);
