#![no_main]

use bytes::BytesMut;
use libfuzzer_sys::fuzz_target;
use mysql_codec::PacketCodec;
use tokio_util::codec::Decoder;

fuzz_target!(|data: &[u8]| {
    // First byte picks plain or compressed framing, the rest is the stream.
    let Some((&mode, stream)) = data.split_first() else {
        return;
    };
    let mut codec = PacketCodec::with_max_packet_size(1 << 20);
    if mode & 1 == 1 {
        codec.enable_compression();
    }
    let mut buf = BytesMut::from(stream);
    while let Ok(Some(_packet)) = codec.decode(&mut buf) {}
});
