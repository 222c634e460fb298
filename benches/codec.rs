use criterion::{black_box, criterion_group, criterion_main, Criterion};

use mzproc::spectrum::bindata::{
    ArrayType, CompressionConfig, DataArray, NumericCompression,
};

fn make_mz_array(n: usize) -> DataArray {
    let values: Vec<f64> = (0..n)
        .map(|i| 200.0 + i as f64 * 0.37 + (i as f64 * 0.11).sin() * 0.004)
        .collect();
    DataArray::from_f64(&ArrayType::MZArray, &values)
}

fn encode_benchmark(c: &mut Criterion) {
    let array = make_mz_array(50_000);
    let mut group = c.benchmark_group("encode_mz_50k");
    group.bench_function("plain", |b| {
        b.iter(|| black_box(array.encode_bytestring(CompressionConfig::none()).unwrap()))
    });
    group.bench_function("zlib", |b| {
        b.iter(|| black_box(array.encode_bytestring(CompressionConfig::zlib()).unwrap()))
    });
    group.bench_function("numpress_linear", |b| {
        b.iter(|| {
            black_box(
                array
                    .encode_bytestring(CompressionConfig::numeric(NumericCompression::Linear))
                    .unwrap(),
            )
        })
    });
    group.finish();
}

fn decode_benchmark(c: &mut Criterion) {
    let array = make_mz_array(50_000);
    let (zlib_text, zlib_mode) = array.encode_bytestring(CompressionConfig::zlib()).unwrap();
    let (linear_text, linear_mode) = array
        .encode_bytestring(CompressionConfig::numeric(NumericCompression::Linear))
        .unwrap();

    let mut group = c.benchmark_group("decode_mz_50k");
    group.bench_function("zlib", |b| {
        b.iter(|| {
            let mut back = DataArray::from_name(&ArrayType::MZArray);
            back.compression = zlib_mode;
            back.fill_from_encoded(&zlib_text).unwrap();
            black_box(back)
        })
    });
    group.bench_function("numpress_linear", |b| {
        b.iter(|| {
            let mut back = DataArray::from_name(&ArrayType::MZArray);
            back.compression = linear_mode;
            back.fill_from_encoded(&linear_text).unwrap();
            black_box(back)
        })
    });
    group.finish();
}

criterion_group!(benches, encode_benchmark, decode_benchmark);
criterion_main!(benches);
