#![no_main]

use arbitrary::Arbitrary;
use bytes::Bytes;
use libfuzzer_sys::fuzz_target;
use mysql_protocol::{ColumnDefinition, ColumnType};

#[derive(Debug, Arbitrary)]
struct FuzzInput {
    type_id: u8,
    unsigned: bool,
    charset: u16,
    data: Vec<u8>,
}

fuzz_target!(|input: FuzzInput| {
    let Ok(ty) = ColumnType::from_u8(input.type_id) else {
        return;
    };

    let mut binary = Bytes::from(input.data.clone());
    let _ = mysql_types::decode_binary_value(&mut binary, ty, input.unsigned, input.charset);

    let column = ColumnDefinition::new("c", ty);
    let _ = mysql_types::decode_text_value(Some(Bytes::from(input.data.clone())), &column);
    let _ = mysql_types::decode_text_row(Bytes::from(input.data), std::slice::from_ref(&column));
});
