use criterion::{black_box, criterion_group, criterion_main, Criterion};
use mercury_rs::mercury::bcd;
use mercury_rs::mercury::crc::crc16_modbus;
use mercury_rs::mercury::frame::{build_request, parse_response, Command};

fn energy_answer() -> Vec<u8> {
    let body = [
        0x00, 0x12, 0x34, 0x56, 0x00, 0x00, 0x10, 0x01, 0x00, 0x00, 0x00, 0x00, 0x99, 0x99,
        0x99, 0x99,
    ];
    build_request(123456, Command::GetEnergy, &body)
}

fn benchmark_crc(c: &mut Criterion) {
    let data = energy_answer();
    c.bench_function("crc16_modbus", |b| {
        b.iter(|| black_box(crc16_modbus(black_box(&data))))
    });
}

fn benchmark_parse_response(c: &mut Criterion) {
    let data = energy_answer();
    c.bench_function("parse_response", |b| {
        b.iter(|| {
            let result = parse_response(black_box(&data), 123456, Command::GetEnergy, 16);
            let _ = black_box(result);
        })
    });
}

fn benchmark_bcd_decode(c: &mut Criterion) {
    let data = [0x00, 0x12, 0x34, 0x56];
    c.bench_function("bcd_decode", |b| {
        b.iter(|| black_box(bcd::decode(black_box(&data), 2)))
    });
}

criterion_group!(
    benches,
    benchmark_crc,
    benchmark_parse_response,
    benchmark_bcd_decode
);
criterion_main!(benches);
