use criterion::{criterion_group, criterion_main, Criterion};
use rand::Rng;
use scanplane::utils::{Coverage, Physical, Rectangle, Region, Size};

fn opaque_coverage(surface: Rectangle<i32, Physical>, opaque: &Region<Physical>) -> Coverage {
    opaque.coverage(surface)
}

fn criterion_benchmark(c: &mut Criterion) {
    let stage: Size<i32, Physical> = Size::from((1920, 1080));
    let element_size: Size<i32, Physical> = Size::from((200, 100));

    let mut rand = rand::thread_rng();
    let rects = (0..256)
        .map(|_| {
            let x = rand.gen_range(0..stage.w - element_size.w);
            let y = rand.gen_range(0..stage.h - element_size.h);
            Rectangle::new((x, y).into(), element_size)
        })
        .collect::<Vec<_>>();

    c.bench_function("Region::union_rect", |b| {
        b.iter(|| Region::from_rects(rects.iter().copied()).area())
    });

    let composited = Region::from_rects(rects.iter().copied());
    let surface = Rectangle::new((800, 400).into(), (320, 240).into());
    c.bench_function("Region::coverage", |b| b.iter(|| opaque_coverage(surface, &composited)));

    c.bench_function("Region::subtract_rect", |b| {
        b.iter(|| {
            let mut damage = Region::from_rect(Rectangle::from_size(stage));
            for rect in &rects[..32] {
                damage.subtract_rect(*rect);
            }
            damage.rects().len()
        })
    });
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
