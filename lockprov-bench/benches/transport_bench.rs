//! Chunked transport benchmarks against the scripted device.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use lockprov_device::mock::MockDevice;
use lockprov_device::{ChunkedTransport, TransportConfig};
use lockprov_protocol::{Command, Frame};

fn bench_write(c: &mut Criterion) {
    let mut group = c.benchmark_group("transport_write");
    let transport = ChunkedTransport::new(TransportConfig::new());

    for size in [100, 1000, 4000] {
        let frame = Command::forward_certificate(&"C".repeat(size))
            .frame()
            .unwrap();

        group.throughput(Throughput::Bytes(frame.len() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &frame, |b, frame| {
            b.iter(|| {
                let mut device = MockDevice::new();
                transport.write(&mut device, frame).unwrap();
                black_box(device)
            });
        });
    }

    group.finish();
}

fn bench_read(c: &mut Criterion) {
    let mut group = c.benchmark_group("transport_read");
    let transport = ChunkedTransport::new(TransportConfig::new());

    for size in [100, 1000, 4000] {
        let response = Frame::build(&vec![0x44u8; size]).unwrap();

        group.throughput(Throughput::Bytes(response.len() as u64));
        group.bench_with_input(
            BenchmarkId::from_parameter(size),
            &response,
            |b, response| {
                b.iter(|| {
                    let mut device = MockDevice::new().with_response(response.as_bytes());
                    black_box(transport.read(&mut device).unwrap())
                });
            },
        );
    }

    group.finish();
}

criterion_group!(benches, bench_write, bench_read);
criterion_main!(benches);
