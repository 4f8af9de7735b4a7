use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use graphrank_core::NodeId;
use graphrank_core::config::AggregationKind;
use graphrank_core::store::Ident;
use graphrank_core::{SqliteStore, TabularStore};
use graphrank_engine::rank::{IterationEngine, PageRankParams, ParallelAggregator, StoreAggregator};
use graphrank_engine::{LoadedGraph, OutDegreeIndex};

/// Synthetic graph sizes: (name, nodes, average out-degree).
const TIERS: &[(&str, usize, usize)] = &[("small", 1_000, 4), ("medium", 20_000, 8), ("large", 100_000, 8)];

fn synthetic_graph(nodes: usize, avg_degree: usize, seed: u64) -> LoadedGraph {
    let mut rng = StdRng::seed_from_u64(seed);
    let edges = (0..nodes * avg_degree).map(|_| {
        let a: i64 = rng.gen_range(0..nodes as i64);
        let b: i64 = rng.gen_range(0..nodes as i64);
        (NodeId::Int(a), NodeId::Int(b))
    });
    LoadedGraph::from_edges(edges.collect::<Vec<_>>()).expect("graph")
}

fn params() -> PageRankParams {
    PageRankParams {
        damping_factor: 0.85,
        max_iter: 20,
        epsilon: Some(1e-12),
    }
}

fn bench_parallel_run(c: &mut Criterion) {
    let mut group = c.benchmark_group("engine.parallel");
    group.sample_size(10);

    for &(name, nodes, degree) in TIERS {
        let graph = synthetic_graph(nodes, degree, 0x5EED_u64);
        group.throughput(Throughput::Elements(graph.edge_count() as u64));
        for shard_size in [1024, 16_384] {
            group.bench_with_input(
                BenchmarkId::new(name, shard_size),
                &shard_size,
                |b, &shard_size| {
                    b.iter(|| {
                        let degrees = OutDegreeIndex::from_graph(&graph);
                        let aggregator = ParallelAggregator::new(&graph, shard_size).expect("agg");
                        let resolved = params().resolve(graph.node_count()).expect("params");
                        let engine = IterationEngine::new(graph.nodes(), degrees, aggregator, resolved)
                            .expect("engine");
                        black_box(engine.run().expect("run").iterations)
                    });
                },
            );
        }
    }

    group.finish();
}

fn bench_store_run(c: &mut Criterion) {
    let mut group = c.benchmark_group("engine.store");
    group.sample_size(10);

    let graph = synthetic_graph(1_000, 4, 0x5EED_u64);
    let store = SqliteStore::open_in_memory().expect("store");
    let prefix = Ident::new("bench").expect("ident");
    group.throughput(Throughput::Elements(graph.edge_count() as u64));
    group.bench_function(
        BenchmarkId::from_parameter(format!("{:?}", AggregationKind::Store)),
        |b| {
            b.iter(|| {
                let aggregator = StoreAggregator::new(&store, &graph, &prefix).expect("agg");
                let (edges, src) = aggregator.edge_relation();
                let degrees = OutDegreeIndex::from_store(&store, edges, src, &graph).expect("degrees");
                let resolved = params().resolve(graph.node_count()).expect("params");
                let engine = IterationEngine::new(graph.nodes(), degrees, aggregator, resolved)
                    .expect("engine");
                black_box(engine.run().expect("run").iterations)
            });
        },
    );
    assert!(!store.relation_exists(&prefix.suffixed("edges").expect("ident")).expect("exists"));

    group.finish();
}

criterion_group!(benches, bench_parallel_run, bench_store_run);
criterion_main!(benches);
