//! Framing and reassembly benchmarks.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use lockprov_protocol::{crc16, verify_checksum, Command, Frame, KeySlot, ResponseAssembler};

fn pem(size: usize) -> String {
    "M".repeat(size)
}

fn bench_frame_build(c: &mut Criterion) {
    let mut group = c.benchmark_group("frame_build");

    for size in [64, 1000, 4000] {
        let command = Command::forward_key_material(KeySlot::DevicePrivateKey, &pem(size));

        group.throughput(Throughput::Bytes(command.len() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &command, |b, command| {
            b.iter(|| black_box(Frame::build(command.as_bytes()).unwrap()));
        });
    }

    group.finish();
}

fn bench_crc16(c: &mut Criterion) {
    let mut group = c.benchmark_group("crc16");

    for size in [62, 1022, 4094] {
        let data = vec![0xA5u8; size];

        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &data, |b, data| {
            b.iter(|| black_box(crc16(data)));
        });
    }

    group.finish();
}

fn bench_verify_checksum(c: &mut Criterion) {
    let frame = Command::forward_certificate(&pem(1500)).frame().unwrap();

    c.bench_function("verify_checksum_1500", |b| {
        b.iter(|| black_box(verify_checksum(frame.as_bytes()).unwrap()));
    });
}

fn bench_reassembly(c: &mut Criterion) {
    let mut group = c.benchmark_group("reassembly");

    for size in [100, 1000, 4000] {
        let frame = Frame::build(&vec![0x33u8; size]).unwrap();

        group.throughput(Throughput::Bytes(frame.len() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &frame, |b, frame| {
            b.iter(|| {
                let mut assembler = ResponseAssembler::new();
                let mut response = None;
                for report in frame.reports() {
                    response = assembler.push(report).unwrap();
                }
                black_box(response.unwrap())
            });
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_frame_build,
    bench_crc16,
    bench_verify_checksum,
    bench_reassembly
);
criterion_main!(benches);
