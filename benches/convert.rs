use criterion::{criterion_group, criterion_main, Criterion};
use deskcam_core::convert::{bgra_to_i420, i420_size};

fn bench_bgra_to_i420(c: &mut Criterion) {
    let width = 1920u32;
    let height = 1080u32;
    let stride = width as usize * 4;
    let src = vec![128u8; stride * height as usize];
    let mut dst = vec![0u8; i420_size(width, height)];

    c.bench_function("convert_1080p_frame", |b| {
        b.iter(|| {
            bgra_to_i420(&src, stride, width, height, &mut dst);
        })
    });
}

criterion_group!(benches, bench_bgra_to_i420);
criterion_main!(benches);
