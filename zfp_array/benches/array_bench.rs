use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use zfp_array::{Array3d, ArrayConfig};
use zfp_core::Mode;

/// Smooth 3D field, x varying fastest.
fn generate_field(n: usize) -> Vec<f64> {
    let mut data = Vec::with_capacity(n * n * n);
    for z in 0..n {
        for y in 0..n {
            for x in 0..n {
                let (fx, fy, fz) = (x as f64, y as f64, z as f64);
                data.push((0.1 * fx).sin() * (0.07 * fy).cos() + 0.01 * fz);
            }
        }
    }
    data
}

fn filled(n: usize, mode: Mode, cache_blocks: usize) -> Array3d<'static> {
    let mut array = Array3d::with_config([n, n, n], mode, ArrayConfig { cache_blocks }).unwrap();
    array.set_all(&generate_field(n)).unwrap();
    array
}

fn bench_sequential_read(c: &mut Criterion) {
    let mut group = c.benchmark_group("sequential_read");
    let n = 32;
    group.throughput(Throughput::Elements((n * n * n) as u64));

    for rate in [8.0, 16.0, 32.0] {
        let mut array = filled(n, Mode::fixed_rate(rate, zfp_core::ScalarType::Double, 3), 64);
        group.bench_with_input(BenchmarkId::new("rate", rate as u32), &n, |b, &n| {
            b.iter(|| {
                let mut sum = 0.0;
                for k in 0..n {
                    for j in 0..n {
                        for i in 0..n {
                            sum += array.get(i, j, k).unwrap();
                        }
                    }
                }
                black_box(sum)
            });
        });
    }

    group.finish();
}

fn bench_stencil_write(c: &mut Criterion) {
    let mut group = c.benchmark_group("stencil_write");
    let n = 32;
    group.throughput(Throughput::Elements(((n - 2) * (n - 2) * (n - 2)) as u64));

    for (name, mode) in [
        ("rate16", Mode::fixed_rate(16.0, zfp_core::ScalarType::Double, 3)),
        ("precision24", Mode::fixed_precision(24)),
        ("accuracy1e-6", Mode::fixed_accuracy(1e-6)),
    ] {
        let mut array = filled(n, mode, 128);
        group.bench_function(name, |b| {
            b.iter(|| {
                for k in 1..n - 1 {
                    for j in 1..n - 1 {
                        for i in 1..n - 1 {
                            let v = array.get(i - 1, j, k).unwrap() + array.get(i + 1, j, k).unwrap();
                            array.set(i, j, k, 0.5 * v).unwrap();
                        }
                    }
                }
                array.flush().unwrap();
            });
        });
    }

    group.finish();
}

fn bench_bulk(c: &mut Criterion) {
    let mut group = c.benchmark_group("bulk");

    for n in [16, 32, 64] {
        let data = generate_field(n);
        group.throughput(Throughput::Elements((n * n * n) as u64));

        group.bench_with_input(BenchmarkId::new("set_all", n), &data, |b, data| {
            let mut array = Array3d::new([n, n, n], Mode::fixed_accuracy(1e-6)).unwrap();
            b.iter(|| array.set_all(black_box(data)).unwrap());
        });

        let mut array = filled(n, Mode::fixed_accuracy(1e-6), 16);
        group.bench_function(BenchmarkId::new("get_all", n), |b| {
            b.iter(|| black_box(array.get_all().unwrap()));
        });
    }

    group.finish();
}

criterion_group!(benches, bench_sequential_read, bench_stencil_write, bench_bulk);
criterion_main!(benches);
