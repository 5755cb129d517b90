use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use std::sync::Arc;
use std::time::Duration;

use gazeval_core::Position;
use gazeval_render::SkiaDisplay;
use gazeval_timing::ManualTimer;
use gazeval_validation::{Display as _, MonitorGeometry, TargetStim, UnitConverter, Units};

fn prepare_display(width: u32, height: u32) -> SkiaDisplay {
    let monitor = MonitorGeometry {
        width_px: width,
        height_px: height,
        ..MonitorGeometry::default()
    };
    let conv = UnitConverter::new(Units::Pix, monitor).expect("monitor");
    SkiaDisplay::new(conv, Arc::new(ManualTimer::new(0.0)), [128, 128, 128, 255]).expect("canvas")
}

/// One full validation frame: target, gaze cursor and flip.
pub fn bench_target_frame(c: &mut Criterion) {
    let mut group = c.benchmark_group("target_frame");
    group
        .sample_size(50)
        .measurement_time(Duration::from_secs(10))
        .warm_up_time(Duration::from_secs(2));

    for (w, h) in [(1280u32, 720u32), (1920, 1080)] {
        group.bench_with_input(BenchmarkId::new("draw_flip", format!("{w}x{h}")), &(w, h), |b, &(w, h)| {
            let mut display = prepare_display(w, h);
            let mut target = TargetStim::default();
            let mut i = 0u32;
            b.iter(|| {
                i = i.wrapping_add(1);
                target.pos = Position::new((i % 200) as f64 - 100.0, 0.0);
                display.draw_target(black_box(&target));
                display.draw_gaze_cursor(black_box(Position::new(5.0, -3.0)));
                black_box(display.flip());
            });
        });
    }

    group.bench_function("results_samples", |b| {
        let mut display = prepare_display(1280, 720);
        let samples: Vec<Position> = (0..500)
            .map(|i| Position::new((i % 50) as f64 * 10.0 - 250.0, (i / 50) as f64 * 10.0 - 50.0))
            .collect();
        b.iter(|| {
            for p in &samples {
                display.draw_sample(*p, 2.0, [0, 255, 0, 255]);
            }
            black_box(display.flip());
        });
    });

    group.finish();
}

criterion_group! {
    name = benches;
    config = Criterion::default()
        .confidence_level(0.95)
        .noise_threshold(0.02)
        .significance_level(0.05);
    targets = bench_target_frame
}

criterion_main!(benches);
