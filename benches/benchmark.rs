use criterion::{criterion_group, criterion_main, BatchSize, Criterion};
use drm_fourcc::{DrmFourcc, DrmModifier};
use rand::Rng;
use smallvec::smallvec;

use scanplane::backend::qcom::test::{DummyMdp, DummyRenderer};
use scanplane::backend::qcom::{QcomConfig, QcomOutput};
use scanplane::backend::scanout::clip::clip_view;
use scanplane::backend::scanout::{Buffer, BufferKind, DmabufPlane, SurfaceId, View, ViewId, ViewTransform};
use scanplane::utils::{Point, Size};

fn random_views(count: u64) -> Vec<View> {
    let mut rand = rand::thread_rng();
    (0..count)
        .map(|id| {
            let size = Size::from((rand.gen_range(64..800), rand.gen_range(64..600)));
            let mut view = View::new(ViewId(id), (size.w, size.h));
            let scale = rand.gen_range(0.5..2.0);
            view.transform = ViewTransform::scaled(
                Point::from((rand.gen_range(-100.0..1900.0), rand.gen_range(-100.0..1000.0))),
                (scale, scale),
            );
            view.buffer = Some(Buffer::new(BufferKind::Dmabuf {
                handle: SurfaceId(100 + id as u32),
                format: DrmFourcc::Argb8888,
                modifier: DrmModifier::Linear,
                size,
                planes: smallvec![DmabufPlane {
                    offset: 0,
                    stride: size.w as u32 * 4,
                }],
            }));
            view
        })
        .collect()
}

fn criterion_benchmark(c: &mut Criterion) {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();

    let views = random_views(16);
    let output = Size::from((1920, 1080));

    c.bench_function("clip_view", |b| {
        b.iter(|| {
            views
                .iter()
                .filter_map(|view| clip_view(view, output).ok().map(|clip| clip.to_scanout(view, true)))
                .count()
        })
    });

    c.bench_function("QcomOutput::assign_planes", |b| {
        b.iter_batched(
            || QcomOutput::new(DummyMdp::new(), DummyRenderer::default(), QcomConfig::default()).unwrap(),
            |mut output| {
                output.assign_planes(&views);
                output
            },
            BatchSize::SmallInput,
        )
    });
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
