use criterion::{black_box, criterion_group, criterion_main, Criterion};
use gridli::{
    invert_2d, invert_timeslice, predict_2d,
    test_common::{centre_point_image, synthetic_image, synthetic_visibility},
    GridConfig, GridConfigBuilder, KernelChoice, SpheroidalKernels,
};

const IMAGE_SIZE: usize = 256;
const NUM_ROWS: usize = 2048;
const CELL: f64 = 1e-5;

fn bench_invert_2d(crt: &mut Criterion) {
    let config = GridConfig::default();
    let vis = synthetic_visibility(NUM_ROWS, 4, 2);
    let template = synthetic_image(4, 2, IMAGE_SIZE, IMAGE_SIZE, CELL);
    crt.bench_function("invert_2d 2048 rows, 4 chans, 256px", |b| {
        b.iter(|| {
            invert_2d(
                black_box(&vis),
                black_box(&template),
                false,
                true,
                &config,
                &SpheroidalKernels,
            )
            .unwrap()
        })
    });
}

fn bench_predict_2d(crt: &mut Criterion) {
    let config = GridConfig::default();
    let model = centre_point_image(4, 2, IMAGE_SIZE, IMAGE_SIZE, CELL, 1.0);
    let vis = synthetic_visibility(NUM_ROWS, 4, 2);
    crt.bench_function("predict_2d 2048 rows, 4 chans, 256px", |b| {
        b.iter(|| {
            let mut work = vis.clone();
            predict_2d(
                black_box(&mut work),
                black_box(&model),
                &config,
                &SpheroidalKernels,
            )
            .unwrap();
        })
    });
}

fn bench_invert_2d_wprojection(crt: &mut Criterion) {
    let config = GridConfigBuilder::default()
        .kernel(KernelChoice::WProjection)
        .wstep(Some(25.0))
        .kernel_width(Some(8))
        .oversampling(4_usize)
        .build()
        .unwrap();
    let vis = synthetic_visibility(NUM_ROWS, 1, 1);
    let template = synthetic_image(1, 1, IMAGE_SIZE, IMAGE_SIZE, CELL);
    crt.bench_function("invert_2d w-projection 2048 rows, 256px", |b| {
        b.iter(|| {
            invert_2d(
                black_box(&vis),
                black_box(&template),
                false,
                true,
                &config,
                &SpheroidalKernels,
            )
            .unwrap()
        })
    });
}

fn bench_invert_timeslice(crt: &mut Criterion) {
    let config = GridConfig::default();
    let vis = synthetic_visibility(NUM_ROWS, 1, 1);
    let template = synthetic_image(1, 1, IMAGE_SIZE, IMAGE_SIZE, CELL);
    crt.bench_function("invert_timeslice 2048 rows, 256px, 4 workers", |b| {
        b.iter(|| {
            invert_timeslice(
                black_box(&vis),
                black_box(&template),
                false,
                true,
                4,
                &config,
                &SpheroidalKernels,
                false,
            )
            .unwrap()
        })
    });
}

criterion_group!(
    name = benches;
    config = Criterion::default().sample_size(10);
    targets =
        bench_invert_2d,
        bench_predict_2d,
        bench_invert_2d_wprojection,
        bench_invert_timeslice,
);
criterion_main!(benches);
