use criterion::{black_box, criterion_group, criterion_main, Criterion};
use pixelvault::codec::{decode, encode, ppm, CanvasGeometry};
use pixelvault::fragment::checksum;

fn bench_encode(c: &mut Criterion) {
    let geometry = CanvasGeometry::default();
    let data = vec![42u8; geometry.max_fragment_bytes];

    c.bench_function("encode_full_fragment", |b| b.iter(|| encode(&geometry, black_box(&data)).unwrap()));

    let canvas = encode(&geometry, &data).unwrap();
    c.bench_function("to_ppm_full_fragment", |b| b.iter(|| ppm::to_ppm(black_box(&canvas))));
}

fn bench_decode(c: &mut Criterion) {
    let geometry = CanvasGeometry::default();
    // Short payload: decode has to walk back over a long zero tail.
    let canvas = encode(&geometry, &[7u8; 1024]).unwrap();
    let image = ppm::to_ppm(&canvas);

    c.bench_function("decode_padded_fragment", |b| b.iter(|| decode(black_box(&canvas))));
    c.bench_function("from_ppm_full_fragment", |b| b.iter(|| ppm::from_ppm(black_box(&image)).unwrap()));
}

fn bench_checksum(c: &mut Criterion) {
    let canvas = encode(&CanvasGeometry::default(), &[1u8; 4096]).unwrap();

    c.bench_function("crc32_full_canvas", |b| b.iter(|| checksum(black_box(canvas.as_bytes()))));
}

criterion_group!(benches, bench_encode, bench_decode, bench_checksum);
criterion_main!(benches);
