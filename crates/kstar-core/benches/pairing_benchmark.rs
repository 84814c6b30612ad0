use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use kstar_core::{
    data::{test_k0_candidate, test_photon_candidate, test_track},
    build_pairs, Analysis, AnalysisConfig, CandidateBatch, Collision,
};

fn synthetic_batch(n_candidates: usize) -> CandidateBatch {
    fastrand::seed(0);
    let n_tracks = 2 * n_candidates;
    let tracks = (0..n_tracks as u64).map(test_track).collect();
    let candidates = (0..n_candidates)
        .map(|i| {
            let (pos, neg) = (fastrand::usize(..n_tracks), fastrand::usize(..n_tracks));
            if i % 2 == 0 {
                test_k0_candidate(i as u64, pos, neg)
            } else {
                test_photon_candidate(i as u64, pos, neg)
            }
        })
        .collect();
    CandidateBatch::new(Collision::default(), tracks, candidates).unwrap()
}

fn pairing_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("pairing");
    for n_candidates in [16, 128, 1024] {
        let batch = synthetic_batch(n_candidates);
        let k0_like: Vec<bool> = (0..n_candidates).map(|i| i % 2 == 0).collect();
        let photon_like: Vec<bool> = k0_like.iter().map(|k0| !k0).collect();
        group.bench_with_input(
            BenchmarkId::new("build_pairs", n_candidates),
            &batch,
            |b, batch| b.iter(|| black_box(build_pairs(batch, &k0_like, &photon_like).unwrap())),
        );
    }
    group.finish();
}

fn analysis_benchmark(c: &mut Criterion) {
    let analysis = Analysis::new(AnalysisConfig::default());
    let batches: Vec<CandidateBatch> = (0..64).map(|_| synthetic_batch(64)).collect();
    c.bench_function("process 64 collisions", |b| {
        b.iter(|| black_box(analysis.process_all(&batches).unwrap()));
    });
}

criterion_group!(benches, pairing_benchmark, analysis_benchmark);
criterion_main!(benches);
