#![no_main]

use libfuzzer_sys::fuzz_target;
use mysql_protocol::{AuthSwitchRequest, HandshakeResponse, HandshakeV10};

fuzz_target!(|data: &[u8]| {
    let _ = HandshakeV10::decode(&mut &data[..]);
    let _ = HandshakeResponse::decode(&mut &data[..]);
    let _ = AuthSwitchRequest::decode(&mut &data[..]);
});
