#![no_main]

use libfuzzer_sys::fuzz_target;
use mysql_protocol::{CapabilityFlags, ColumnDefinition, EofPacket, ErrPacket, OkPacket, PrepareOk};

fuzz_target!(|data: &[u8]| {
    let _ = OkPacket::decode(&mut &data[..], CapabilityFlags::client_default());
    let _ = OkPacket::decode(&mut &data[..], CapabilityFlags::empty());
    let _ = ErrPacket::decode(&mut &data[..]);
    let _ = EofPacket::decode(&mut &data[..]);
    let _ = ColumnDefinition::decode(&mut &data[..]);
    let _ = PrepareOk::decode(&mut &data[..]);
});
