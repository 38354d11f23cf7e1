use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use pi_rec as pr;
use pr::candle_core::{DType, Device, Tensor};

fn postprocess(c: &mut Criterion) {
    static DIM: usize = 64;

    let mut group = c.benchmark_group("postprocess");

    for dim in [DIM, 2 * DIM, 4 * DIM, 8 * DIM].iter() {
        let output = Tensor::rand(0f32, 1f32, (1, 3, *dim, *dim), &Device::Cpu)
            .unwrap()
            .to_dtype(DType::F32)
            .unwrap();

        group.bench_with_input(BenchmarkId::from_parameter(dim), &output, |b, output| {
            b.iter(|| {
                let post = pr::postprocess(output).unwrap();
                black_box(pr::to_image(&post.squeeze(0).unwrap()).unwrap())
            });
        });
    }
    group.finish();
}

fn to_tensor(c: &mut Criterion) {
    static DIM: u32 = 64;

    let mut group = c.benchmark_group("to_tensor");

    for dim in [DIM, 2 * DIM, 4 * DIM, 8 * DIM].iter() {
        let img = pr::image::RgbImage::from_fn(*dim, *dim, |x, y| {
            pr::image::Rgb([(x % 256) as u8, (y % 256) as u8, ((x + y) % 256) as u8])
        });

        group.bench_with_input(BenchmarkId::from_parameter(dim), &img, |b, img| {
            b.iter(|| black_box(pr::to_tensor(img).unwrap()));
        });
    }
    group.finish();
}

criterion_group!(benches, postprocess, to_tensor);
criterion_main!(benches);
