#![no_main]

use ember_transport::key::KeyMessage;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(msg) = KeyMessage::decode(data) {
        assert_eq!(data.len(), KeyMessage::ENCODED_LEN);
        assert_eq!(&msg.encode()[..], data);
    }
});
