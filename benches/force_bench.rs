//! Force-kernel benchmarks: direct pair summation vs the linked-cell
//! sweep, plus the grid refresh, over growing cuboid gases.

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use glam::DVec3;
use moldyn::generator::CuboidCluster;
use moldyn::grid::CellGrid;
use moldyn::integrator::ParallelMode;
use moldyn::ljforce::{begin_force_step, force_lj_cells, force_lj_direct, LjTable};
use moldyn::boundary::GhostPool;
use moldyn::particle::ParticleContainer;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::collections::BTreeSet;

const SIZES: [usize; 3] = [1000, 2000, 4000];

fn gas(n: usize) -> ParticleContainer {
    let mut container = ParticleContainer::new();
    let mut rng = StdRng::seed_from_u64(42);
    let width = 100;
    CuboidCluster {
        origin: DVec3::ZERO,
        dim: [width, n / width, 1],
        spacing: 1.1225,
        mass: 1.0,
        velocity: DVec3::ZERO,
        brown_vel: 0.1,
        brown_dim: 2,
        ptype: 1,
    }
    .generate(&mut container, &BTreeSet::new(), &mut rng);
    container
}

fn gas_grid(container: &ParticleContainer, n: usize) -> CellGrid {
    let width = 100.0;
    let height = (n / 100) as f64;
    let mut grid = CellGrid::new(
        DVec3::new(-width / 5.0, -height / 5.0, 0.0),
        DVec3::new(width / 5.0 * 6.0, height / 5.0 * 6.0, 0.0),
        5.0,
    );
    grid.populate(container);
    grid
}

fn bench_lj_direct(c: &mut Criterion) {
    let mut group = c.benchmark_group("lj_direct");
    for n in SIZES {
        group.bench_with_input(BenchmarkId::from_parameter(n), &n, |b, &n| {
            let mut container = gas(n);
            let table = LjTable::uniform([1], 5.0, 1.0);
            b.iter(|| {
                begin_force_step(&mut container, DVec3::ZERO, ParallelMode::Task);
                force_lj_direct(&mut container, &table);
            });
        });
    }
    group.finish();
}

fn bench_lj_linked_cells(c: &mut Criterion) {
    let mut group = c.benchmark_group("lj_linked_cells");
    for n in SIZES {
        group.bench_with_input(BenchmarkId::from_parameter(n), &n, |b, &n| {
            let mut container = gas(n);
            let grid = gas_grid(&container, n);
            let ghosts = GhostPool::new();
            let table = LjTable::uniform([1], 5.0, 1.0);
            b.iter(|| {
                begin_force_step(&mut container, DVec3::ZERO, ParallelMode::Task);
                force_lj_cells(&mut container, &grid, &ghosts, &table, &[]);
            });
        });
    }
    group.finish();
}

fn bench_grid_update(c: &mut Criterion) {
    let mut group = c.benchmark_group("grid_update");
    for n in SIZES {
        group.bench_with_input(BenchmarkId::from_parameter(n), &n, |b, &n| {
            let mut container = gas(n);
            let mut grid = gas_grid(&container, n);
            let mut flip = 1.0;
            b.iter(|| {
                // shuffle everybody across a cell edge so the refresh has
                // real moves to apply
                for p in container.active_mut() {
                    p.x += DVec3::new(flip * 0.6, 0.0, 0.0);
                }
                flip = -flip;
                grid.update_cells(&container);
            });
        });
    }
    group.finish();
}

criterion_group!(
    benches,
    bench_lj_direct,
    bench_lj_linked_cells,
    bench_grid_update
);
criterion_main!(benches);
