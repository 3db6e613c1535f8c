use criterion::{criterion_group, criterion_main};


criterion_group!(
    benches_render,
    render::bench_render_point,
    render::bench_render_galaxy,
    render::bench_likelihood
);
criterion_main!(benches_render);
