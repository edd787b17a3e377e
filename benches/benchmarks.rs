use criterion::{criterion_group, criterion_main, Criterion};
use rastore::{DiskRaster, ImageFormat, PixelFormat, PlaneBuffer, Window};
use tempfile::TempDir;

const SIZE: (usize, usize) = (2048, 2048);

fn bench_write_tile(c: &mut Criterion) {
    let dir = TempDir::new().unwrap();
    let format = ImageFormat::new(4096, 4096, 1, PixelFormat::Scalar);
    let tile = PlaneBuffer::<f32>::zeroed(1, SIZE.1, SIZE.0);
    let mut n = 0u32;
    c.bench_function("write_tile", |b| {
        b.iter(|| {
            let path = dir.path().join(format!("w{n}.rbs"));
            n += 1;
            let mut writer = DiskRaster::create(&path, format).unwrap();
            writer.write(&tile, Window::new((0, 0), SIZE)).unwrap();
            writer.close().unwrap()
        })
    });
}

fn bench_read_tile(c: &mut Criterion) {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("r.rbs");
    let format = ImageFormat::new(4096, 4096, 1, PixelFormat::Scalar);
    let mut writer = DiskRaster::create(&path, format).unwrap();
    let tile = PlaneBuffer::<f32>::zeroed(1, SIZE.1, SIZE.0);
    writer.write(&tile, Window::new((0, 0), SIZE)).unwrap();
    writer.close().unwrap();
    let mut reader = DiskRaster::open(&path).unwrap();
    c.bench_function("read_tile", |b| {
        let mut dest = PlaneBuffer::<f32>::zeroed(1, SIZE.1, SIZE.0);
        b.iter(|| reader.read(&mut dest, Window::new((0, 0), SIZE)).unwrap())
    });
}

criterion_group!(benches, bench_write_tile, bench_read_tile);
criterion_main!(benches);
