use adhoc_mesh::config::RoutingConfig;
use adhoc_mesh::core::bits::{pack_bits, unpack_bits};
use adhoc_mesh::core::packet::{encode_routing_table, MessageHeader, Triplet};
use adhoc_mesh::service::RoutingService;
use adhoc_mesh::NodeAddress;
use criterion::{criterion_group, criterion_main, BatchSize, Criterion, Throughput};
use std::time::Instant;

#[allow(clippy::unwrap_used)]
fn populated_service(routes: u8) -> RoutingService {
    let now = Instant::now();
    let mut service = RoutingService::new(NodeAddress::new(0).unwrap(), &RoutingConfig::default(), 12, now);
    service.start();
    for dest in 1..=routes {
        service.handle_packet(now, &[dest, 0, dest]).unwrap();
    }
    service
}

fn bench_routing_table(c: &mut Criterion) {
    let mut group = c.benchmark_group("routing_table");
    let table_sizes = [4u8, 32, 128, 254];

    for &size in &table_sizes {
        let entries: Vec<Triplet> = (1..=size).map(|d| Triplet::new(d, 1, d)).collect();
        group.throughput(Throughput::Elements(size as u64));
        group.bench_function(format!("encode_{size}_routes"), |b| {
            b.iter(|| encode_routing_table(Triplet::new(0, 0, 0), &entries, 12))
        });

        group.bench_function(format!("tick_{size}_routes"), |b| {
            b.iter_batched(
                || populated_service(size),
                |mut service| service.tick(Instant::now()),
                BatchSize::SmallInput,
            )
        });

        // A neighbour announcing three known destinations
        let packet = [254, 0, 254, 1, 3, 1, 2, 3, 2, 3, 3, 3];
        group.bench_function(format!("handle_packet_{size}_routes"), |b| {
            b.iter_batched(
                || populated_service(size),
                |mut service| service.handle_packet(Instant::now(), &packet),
                BatchSize::SmallInput,
            )
        });
    }

    group.finish();
}

#[allow(clippy::unwrap_used)]
fn bench_bit_packing(c: &mut Criterion) {
    let mut group = c.benchmark_group("bit_packing");

    let header = MessageHeader {
        next_hop: Some(NodeAddress::new(2).unwrap()),
        source: NodeAddress::new(1).unwrap(),
        dest: NodeAddress::new(3).unwrap(),
        id: 42,
    };
    let packet = header.encode(b"payload!");
    group.bench_function("message_header_encode", |b| b.iter(|| header.encode(b"payload!")));
    group.bench_function("message_header_decode", |b| {
        b.iter(|| MessageHeader::decode(&packet).unwrap())
    });

    let widths = [3u32, 7, 13, 1, 8, 17, 5, 10];
    let values = [5u32, 100, 8000, 1, 200, 70000, 31, 1000];
    let words = pack_bits(3, &values, &widths);
    group.bench_function("pack_mixed_widths", |b| b.iter(|| pack_bits(3, &values, &widths)));
    group.bench_function("unpack_mixed_widths", |b| b.iter(|| unpack_bits(&words, &widths)));

    group.finish();
}

criterion_group!(benches, bench_routing_table, bench_bit_packing);
criterion_main!(benches);
