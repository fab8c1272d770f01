//! Benchmarks for MySQL protocol encoding and decoding.

#![allow(clippy::unwrap_used, missing_docs)]

use bytes::{Bytes, BytesMut};
use criterion::{Criterion, Throughput, black_box, criterion_group, criterion_main};
use mysql_protocol::{
    CapabilityFlags, ColumnDefinition, ColumnType, OkPacket, PacketHeader, StatusFlags,
    codec::{read_lenenc_int, write_lenenc_int},
    statement::{ExecuteParam, ParamValue, encode_execute},
};

/// Benchmark length-encoded integer encoding across all widths.
fn bench_lenenc_encode(c: &mut Criterion) {
    let values = [7u64, 300, 70_000, 1 << 40];

    c.bench_function("lenenc_encode", |b| {
        b.iter(|| {
            let mut buf = BytesMut::with_capacity(32);
            for v in values {
                write_lenenc_int(&mut buf, black_box(v));
            }
            black_box(buf)
        })
    });
}

/// Benchmark length-encoded integer decoding across all widths.
fn bench_lenenc_decode(c: &mut Criterion) {
    let mut buf = BytesMut::new();
    for v in [7u64, 300, 70_000, 1 << 40] {
        write_lenenc_int(&mut buf, v);
    }
    let encoded = buf.freeze();

    c.bench_function("lenenc_decode", |b| {
        b.iter(|| {
            let mut cursor = encoded.clone();
            let mut sum = 0u64;
            for _ in 0..4 {
                sum = sum.wrapping_add(read_lenenc_int(&mut cursor).unwrap());
            }
            black_box(sum)
        })
    });
}

/// Benchmark packet header encoding and decoding.
fn bench_packet_header(c: &mut Criterion) {
    let header = PacketHeader::new(1000, 3);
    let mut buf = BytesMut::new();
    header.encode(&mut buf);
    let encoded = buf.freeze();

    c.bench_function("packet_header_decode", |b| {
        b.iter(|| {
            let mut cursor = encoded.clone();
            black_box(PacketHeader::decode(&mut cursor).unwrap())
        })
    });
}

/// Benchmark column definition decoding.
fn bench_column_definition(c: &mut Criterion) {
    let col = ColumnDefinition::new("customer_name", ColumnType::VarString).with_table("customers");
    let mut buf = BytesMut::new();
    col.encode(&mut buf);
    let encoded = buf.freeze();

    let mut group = c.benchmark_group("column_definition");
    group.throughput(Throughput::Bytes(encoded.len() as u64));
    group.bench_function("decode", |b| {
        b.iter(|| {
            let mut cursor = encoded.clone();
            black_box(ColumnDefinition::decode(&mut cursor).unwrap())
        })
    });
    group.finish();
}

/// Benchmark OK packet decoding.
fn bench_ok_packet(c: &mut Criterion) {
    let caps = CapabilityFlags::client_default();
    let ok = OkPacket {
        affected_rows: 12,
        last_insert_id: 9001,
        status: StatusFlags::AUTOCOMMIT,
        ..Default::default()
    };
    let mut buf = BytesMut::new();
    ok.encode(&mut buf, caps);
    let encoded = buf.freeze();

    c.bench_function("ok_packet_decode", |b| {
        b.iter(|| {
            let mut cursor = encoded.clone();
            black_box(OkPacket::decode(&mut cursor, caps).unwrap())
        })
    });
}

/// Benchmark COM_STMT_EXECUTE encoding.
fn bench_execute_encode(c: &mut Criterion) {
    let params: Vec<ExecuteParam> = (0..16)
        .map(|i: i64| ExecuteParam {
            column_type: ColumnType::LongLong,
            unsigned: false,
            value: ParamValue::Bytes(Bytes::copy_from_slice(&i.to_le_bytes())),
        })
        .collect();

    c.bench_function("execute_encode_16_params", |b| {
        b.iter(|| black_box(encode_execute(1, black_box(&params))))
    });
}

criterion_group!(
    benches,
    bench_lenenc_encode,
    bench_lenenc_decode,
    bench_packet_header,
    bench_column_definition,
    bench_ok_packet,
    bench_execute_encode,
);
criterion_main!(benches);
