#![no_main]

use ember_transport::chunk::Chunk;
use ember_transport::codec::decode;
use ember_transport::packet::{Packet, ReceiverSection, SenderSection};
use ember_transport::wire::Wire;
use libfuzzer_sys::fuzz_target;

/// Fuzz the datagram decoder and its sub-parsers.
///
/// Decoding must never panic (including the parser's drop check), and
/// anything that decodes must re-encode to exactly the input bytes.
fuzz_target!(|data: &[u8]| {
    if let Ok(packet) = Packet::decode(data) {
        assert_eq!(packet.serialized_length(), data.len());
        assert_eq!(&packet.encode()[..], data);
    }

    let _ = decode::<SenderSection>(data);
    let _ = decode::<ReceiverSection>(data);
    let _ = decode::<Chunk>(data);
});
