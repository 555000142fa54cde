//! Benchmarks for the graph sorter.

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use atomforge::sort::sort_atoms;
use atomforge::types::{AtomName, DependencyEdge};

fn name(i: usize) -> AtomName {
    AtomName::parse(format!("atom_{i}")).expect("valid name")
}

/// Linear chain: atom_n depends on atom_(n-1).
fn linear_graph(n: usize) -> (Vec<AtomName>, Vec<DependencyEdge>) {
    let nodes: Vec<AtomName> = (0..n).map(name).collect();
    let edges = (1..n)
        .map(|i| DependencyEdge::new(name(i), name(i - 1)))
        .collect();
    (nodes, edges)
}

/// Layered DAG: each atom depends on a handful in the previous layer.
fn layered_graph(layers: usize, width: usize) -> (Vec<AtomName>, Vec<DependencyEdge>) {
    let nodes: Vec<AtomName> = (0..layers * width).map(name).collect();
    let mut edges = Vec::new();
    for layer in 1..layers {
        for slot in 0..width {
            let dependent = layer * width + slot;
            for offset in 0..3usize.min(width) {
                let target = (layer - 1) * width + (slot + offset) % width;
                edges.push(DependencyEdge::new(name(dependent), name(target)));
            }
        }
    }
    (nodes, edges)
}

fn bench_sort(c: &mut Criterion) {
    let (nodes, edges) = linear_graph(1_000);
    c.bench_function("sort_linear_1000", |b| {
        b.iter(|| sort_atoms(black_box(&nodes), black_box(&edges)).unwrap())
    });

    let (nodes, edges) = layered_graph(50, 20);
    c.bench_function("sort_layered_50x20", |b| {
        b.iter(|| sort_atoms(black_box(&nodes), black_box(&edges)).unwrap())
    });
}

criterion_group!(benches, bench_sort);
criterion_main!(benches);
