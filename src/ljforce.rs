//! Lennard-Jones force kernels: mixed parameter tables, the truncated pair
//! force, and the pair sweeps (direct, linked-cell, planetary gravity).

use crate::cell::{CellEntry, CellKind};
use crate::grid::CellGrid;
use crate::boundary::GhostPool;
use crate::integrator::ParallelMode;
use crate::membrane::MembraneTopology;
use crate::particle::ParticleContainer;
use glam::DVec3;
use log::warn;
use rayon::prelude::*;
use std::collections::BTreeMap;

/// Precomputed Lennard-Jones coefficients for one type pair.
///
/// `alpha = -24ε`, `beta = σ⁶`, `gamma = -2σ¹²`; `wca_r2` is the squared
/// repulsive-only truncation distance `(2^{1/6}σ)²`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LjPair {
    pub epsilon: f64,
    pub sigma: f64,
    pub alpha: f64,
    pub beta: f64,
    pub gamma: f64,
    pub wca_r2: f64,
}

impl LjPair {
    fn new(epsilon: f64, sigma: f64) -> Self {
        LjPair {
            epsilon,
            sigma,
            alpha: -24.0 * epsilon,
            beta: sigma.powi(6),
            gamma: -2.0 * sigma.powi(12),
            wca_r2: 2f64.powf(1.0 / 3.0) * sigma * sigma,
        }
    }
}

/// Symmetric map of mixed Lennard-Jones parameters, keyed by the ordered
/// type pair. Built once from the per-type `(ε, σ)` table with the
/// Lorentz-Berthelot rules: `ε_ij = √(ε_i ε_j)`, `σ_ij = (σ_i + σ_j)/2`.
#[derive(Debug, Clone)]
pub struct LjTable {
    pairs: BTreeMap<(u32, u32), LjPair>,
}

impl LjTable {
    fn key(t1: u32, t2: u32) -> (u32, u32) {
        (t1.min(t2), t1.max(t2))
    }

    pub fn from_type_params(types: &BTreeMap<u32, (f64, f64)>) -> Self {
        let mut pairs = BTreeMap::new();
        for (&t1, &(eps1, sig1)) in types {
            for (&t2, &(eps2, sig2)) in types {
                pairs
                    .entry(Self::key(t1, t2))
                    .or_insert_with(|| LjPair::new((eps1 * eps2).sqrt(), (sig1 + sig2) / 2.0));
            }
        }
        LjTable { pairs }
    }

    /// Table for the single-parameter simulation kinds: every listed type
    /// gets the same `ε` and `σ`.
    pub fn uniform(types: impl IntoIterator<Item = u32>, epsilon: f64, sigma: f64) -> Self {
        let mut map = BTreeMap::new();
        for t in types {
            map.insert(t, (epsilon, sigma));
        }
        if map.is_empty() {
            map.insert(1, (epsilon, sigma));
        }
        Self::from_type_params(&map)
    }

    /// Coefficients for a type pair. A missing entry means a particle type
    /// was never registered, which is a programming error.
    pub fn pair(&self, t1: u32, t2: u32) -> &LjPair {
        self.pairs
            .get(&Self::key(t1, t2))
            .unwrap_or_else(|| panic!("no Lennard-Jones parameters for type pair ({t1}, {t2})"))
    }

    pub fn epsilon(&self, t1: u32, t2: u32) -> f64 {
        self.pair(t1, t2).epsilon
    }

    pub fn sigma(&self, t1: u32, t2: u32) -> f64 {
        self.pair(t1, t2).sigma
    }
}

/// Truncated Lennard-Jones force on the first particle of a pair;
/// the partner receives the negation. `d = b.x - a.x`.
pub fn lj_force(pair: &LjPair, d: DVec3, r2: f64) -> DVec3 {
    let inv_r6 = 1.0 / (r2 * r2 * r2);
    let k = pair.alpha * (pair.beta * inv_r6 + pair.gamma * inv_r6 * inv_r6) / r2;
    -k * d
}

/// Opens a force evaluation: captures `old_f` and seeds the new force with
/// gravity for every active, movable particle. Stationary particles keep
/// their zero state.
pub fn begin_force_step(container: &mut ParticleContainer, gravity: DVec3, mode: ParallelMode) {
    let update = |p: &mut crate::particle::Particle| {
        if p.is_active() && !p.is_stationary() {
            p.old_f = p.f;
            p.f = p.m * gravity;
        }
    };
    match mode {
        ParallelMode::Task => container.particles_mut().par_iter_mut().for_each(update),
        ParallelMode::Static => {
            let chunk = ParallelMode::static_chunk(container.len());
            container
                .particles_mut()
                .par_chunks_mut(chunk)
                .for_each(|c| c.iter_mut().for_each(update));
        }
    }
}

/// Newtonian gravity over all active pairs (planetary simulation kind).
pub fn force_gravity_pairs(container: &mut ParticleContainer) {
    let n = container.len();
    for i in 0..n {
        if !container.get(i).is_active() {
            continue;
        }
        for j in (i + 1)..n {
            if !container.get(j).is_active() {
                continue;
            }
            let (a, b) = container.pair_mut(i, j);
            let d = b.x - a.x;
            let dist = d.length();
            if dist == 0.0 {
                continue;
            }
            let f = (a.m * b.m / (dist * dist * dist)) * d;
            if !a.is_stationary() {
                a.f += f;
            }
            if !b.is_stationary() {
                b.f -= f;
            }
        }
    }
}

/// Untruncated Lennard-Jones over all active pairs (direct simulation kind).
pub fn force_lj_direct(container: &mut ParticleContainer, table: &LjTable) {
    let pairs: Vec<(usize, usize)> = container.active_pairs().collect();
    for (i, j) in pairs {
        let (a, b) = container.pair_mut(i, j);
        let d = b.x - a.x;
        let r2 = d.length_squared();
        if r2 == 0.0 {
            continue;
        }
        let fa = lj_force(table.pair(a.ptype, b.ptype), d, r2);
        if !a.is_stationary() {
            a.f += fa;
        }
        if !b.is_stationary() {
            b.f -= fa;
        }
    }
}

/// Truncated Lennard-Jones over the linked-cell structure.
///
/// Every non-halo cell contributes its internal pairs and the pairs with its
/// stencil neighbors, so each unordered pair within the cutoff is visited
/// exactly once. Halo cells are read-only sources: their ghosts (and any
/// escapees awaiting deletion) exert force on domain particles but never
/// accumulate force themselves.
pub fn force_lj_cells(
    container: &mut ParticleContainer,
    grid: &CellGrid,
    ghosts: &GhostPool,
    table: &LjTable,
    membranes: &[MembraneTopology],
) {
    let cutoff2 = grid.cutoff() * grid.cutoff();

    for flat in 0..grid.cell_count() {
        let cell = grid.cell(flat);
        if cell.kind == CellKind::Halo {
            continue;
        }
        let own: Vec<usize> = cell.bodies().collect();

        for ai in 0..own.len() {
            for bi in (ai + 1)..own.len() {
                symmetric_lj(container, table, membranes, cutoff2, own[ai], own[bi]);
            }
        }

        for &nflat in &cell.stencil {
            for &j in &collect_bodies(grid, nflat) {
                for &i in &own {
                    symmetric_lj(container, table, membranes, cutoff2, i, j);
                }
            }
        }

        for &hflat in &cell.halo_neighbours {
            for entry in grid.cell(hflat).entries() {
                let (src_x, src_type) = match *entry {
                    CellEntry::Ghost(g) => {
                        let g = ghosts.get(g);
                        (g.x, g.ptype)
                    }
                    CellEntry::Body(id) => {
                        let p = container.get(id);
                        (p.x, p.ptype)
                    }
                };
                for &i in &own {
                    one_sided_lj(container, table, cutoff2, i, src_x, src_type);
                }
            }
        }
    }
}

fn collect_bodies(grid: &CellGrid, flat: usize) -> Vec<usize> {
    grid.cell(flat).bodies().collect()
}

fn symmetric_lj(
    container: &mut ParticleContainer,
    table: &LjTable,
    membranes: &[MembraneTopology],
    cutoff2: f64,
    i: usize,
    j: usize,
) {
    let (a, b) = container.pair_mut(i, j);
    if !a.is_active() || !b.is_active() {
        return;
    }
    let d = b.x - a.x;
    let r2 = d.length_squared();
    if r2 == 0.0 {
        return;
    }
    let pair = table.pair(a.ptype, b.ptype);

    match (a.molecule, b.molecule) {
        (Some(ma), Some(mb)) if ma == mb => {
            // intra-molecular: bonds are handled by the harmonic pass, the
            // rest sees only the repulsive branch
            if membranes[ma].bonded(i, j) {
                return;
            }
            if r2 >= pair.wca_r2 {
                return;
            }
        }
        _ => {
            if r2 > cutoff2 {
                return;
            }
        }
    }

    let fa = lj_force(pair, d, r2);
    if !a.is_stationary() {
        a.f += fa;
    }
    if !b.is_stationary() {
        b.f -= fa;
    }
}

fn one_sided_lj(
    container: &mut ParticleContainer,
    table: &LjTable,
    cutoff2: f64,
    i: usize,
    src_x: DVec3,
    src_type: u32,
) {
    let a = container.get_mut(i);
    if !a.is_active() || a.is_stationary() {
        return;
    }
    let d = src_x - a.x;
    let r2 = d.length_squared();
    if r2 == 0.0 || r2 > cutoff2 {
        return;
    }
    let pair = table.pair(a.ptype, src_type);
    a.f += lj_force(pair, d, r2);
}

/// Additive body force for a fixed set of particle ids, active while
/// `time < until` (used e.g. to pull on a membrane).
#[derive(Debug, Clone)]
pub struct ExternalForce {
    pub ids: Vec<usize>,
    pub force: DVec3,
    pub until: f64,
}

pub fn apply_external_forces(
    container: &mut ParticleContainer,
    forces: &[ExternalForce],
    time: f64,
) {
    for ef in forces {
        if time >= ef.until {
            continue;
        }
        for &id in &ef.ids {
            if id >= container.len() {
                warn!("external force targets unknown particle id {id}");
                continue;
            }
            let p = container.get_mut(id);
            if p.is_active() && !p.is_stationary() {
                p.f += ef.force;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::particle::Particle;

    const TOL: f64 = 1e-5;

    fn triangle() -> ParticleContainer {
        let c = 3f64.sqrt() / 4.0;
        ParticleContainer::from_particles(vec![
            Particle::new(DVec3::new(0.0, 0.0, c), DVec3::ZERO, 1.0, 1),
            Particle::new(DVec3::new(0.0, 0.5, -c), DVec3::ZERO, 1.0, 1),
            Particle::new(DVec3::new(0.0, -0.5, -c), DVec3::ZERO, 1.0, 1),
        ])
    }

    fn assert_close(got: DVec3, want: DVec3) {
        assert!(
            (got - want).length() < TOL,
            "expected {want:?}, got {got:?}"
        );
    }

    #[test]
    fn mixing_rules_are_lorentz_berthelot() {
        let mut types = BTreeMap::new();
        types.insert(1, (4.0, 1.0));
        types.insert(2, (9.0, 2.0));
        let table = LjTable::from_type_params(&types);

        assert!((table.epsilon(1, 2) - 6.0).abs() < TOL);
        assert!((table.sigma(1, 2) - 1.5).abs() < TOL);
        // symmetric in its arguments
        assert_eq!(table.epsilon(1, 2), table.epsilon(2, 1));
        assert_eq!(table.sigma(1, 2), table.sigma(2, 1));
        // self pairs reduce to the plain parameters
        assert!((table.epsilon(2, 2) - 9.0).abs() < TOL);
        assert!((table.sigma(1, 1) - 1.0).abs() < TOL);
        // derived coefficients
        let p = table.pair(1, 1);
        assert!((p.alpha + 96.0).abs() < TOL);
        assert!((p.beta - 1.0).abs() < TOL);
        assert!((p.gamma + 2.0).abs() < TOL);
    }

    #[test]
    fn normed_triangle_forces() {
        let c = 3f64.sqrt() / 4.0;
        let mut container = triangle();
        let table = LjTable::uniform([1], 1.0, 1.0);
        force_lj_direct(&mut container, &table);

        assert_close(container.get(0).f, DVec3::new(0.0, 0.0, 96.0 * c));
        assert_close(container.get(1).f, DVec3::new(0.0, 36.0, -48.0 * c));
        assert_close(container.get(2).f, DVec3::new(0.0, -36.0, -48.0 * c));
    }

    #[test]
    fn normed_triangle_forces_linked_cells() {
        let c = 3f64.sqrt() / 4.0;
        let mut container = triangle();
        let mut grid = CellGrid::new(DVec3::splat(-5.0), DVec3::splat(10.0), 2.5);
        grid.populate(&container);
        let table = LjTable::uniform([1], 1.0, 1.0);
        let ghosts = GhostPool::new();
        force_lj_cells(&mut container, &grid, &ghosts, &table, &[]);

        assert_close(container.get(0).f, DVec3::new(0.0, 0.0, 96.0 * c));
        assert_close(container.get(1).f, DVec3::new(0.0, 36.0, -48.0 * c));
        assert_close(container.get(2).f, DVec3::new(0.0, -36.0, -48.0 * c));
    }

    #[test]
    fn equilibrium_triangle_is_force_free() {
        let mut container = triangle();
        let sigma = 2f64.powf(-1.0 / 6.0);
        let table = LjTable::uniform([1], 3.14159, sigma);
        force_lj_direct(&mut container, &table);
        for id in 0..3 {
            assert!(container.get(id).f.length() < TOL);
        }
    }

    #[test]
    fn pair_force_is_zero_at_equilibrium_spacing() {
        let sigma = 1.7;
        let table = LjTable::uniform([1], 2.0, sigma);
        let r = sigma * 2f64.powf(1.0 / 6.0);
        let d = DVec3::new(r, 0.0, 0.0);
        let f = lj_force(table.pair(1, 1), d, d.length_squared());
        assert!(f.length() < TOL);
    }

    #[test]
    fn newtons_third_law_holds_pairwise() {
        let mut container = ParticleContainer::from_particles(vec![
            Particle::new(DVec3::new(0.1, 0.0, 0.2), DVec3::ZERO, 1.0, 1),
            Particle::new(DVec3::new(1.2, 0.3, 0.0), DVec3::ZERO, 2.0, 1),
            Particle::new(DVec3::new(0.4, 1.1, 0.9), DVec3::ZERO, 0.5, 1),
            Particle::new(DVec3::new(1.0, 1.0, 1.0), DVec3::ZERO, 1.5, 1),
        ]);
        let table = LjTable::uniform([1], 1.0, 1.0);
        force_lj_direct(&mut container, &table);
        let total: DVec3 = container.active().map(|p| p.f).sum();
        assert!(total.length() < TOL);
    }

    #[test]
    fn cutoff_suppresses_far_pairs() {
        let mut container = ParticleContainer::from_particles(vec![
            Particle::new(DVec3::new(1.0, 1.0, 1.0), DVec3::ZERO, 1.0, 1),
            Particle::new(DVec3::new(8.0, 8.0, 8.0), DVec3::ZERO, 1.0, 1),
        ]);
        let mut grid = CellGrid::new(DVec3::ZERO, DVec3::splat(10.0), 2.5);
        grid.populate(&container);
        let table = LjTable::uniform([1], 5.0, 1.0);
        let ghosts = GhostPool::new();
        force_lj_cells(&mut container, &grid, &ghosts, &table, &[]);
        assert!(container.get(0).f.length() < TOL);
        assert!(container.get(1).f.length() < TOL);
    }

    #[test]
    fn ghosts_push_but_are_never_pushed() {
        let mut container = ParticleContainer::from_particles(vec![Particle::new(
            DVec3::new(0.4, 5.0, 5.0),
            DVec3::ZERO,
            1.0,
            1,
        )]);
        let mut grid = CellGrid::new(DVec3::ZERO, DVec3::splat(10.0), 2.5);
        grid.populate(&container);
        let mut ghosts = GhostPool::new();
        // mirror just outside the left face, close enough to repel
        let gi = ghosts.acquire(DVec3::new(-0.4, 5.0, 5.0), 1.0, 1);
        ghosts.finish();
        let halo = grid.flat(grid.index_from_position(DVec3::new(-0.4, 5.0, 5.0)));
        grid.cell_mut(halo).push(CellEntry::Ghost(gi));

        let table = LjTable::uniform([1], 1.0, 1.0);
        force_lj_cells(&mut container, &grid, &ghosts, &table, &[]);

        let f = container.get(0).f;
        assert!(f.x > 0.0, "mirror ghost must push the particle inward");
        assert!(f.y.abs() < TOL && f.z.abs() < TOL);
        assert_eq!(ghosts.get(gi).f, DVec3::ZERO);
    }

    #[test]
    fn begin_force_step_rotates_forces_and_seeds_gravity() {
        let mut container = ParticleContainer::from_particles(vec![
            Particle::new(DVec3::ZERO, DVec3::ZERO, 2.0, 1),
            Particle::new(DVec3::ONE, DVec3::ZERO, 1.0, 1),
        ]);
        container.get_mut(0).f = DVec3::new(1.0, 2.0, 3.0);
        container.get_mut(1).make_stationary();

        let g = DVec3::new(0.0, -9.81, 0.0);
        begin_force_step(&mut container, g, ParallelMode::Task);

        assert_eq!(container.get(0).old_f, DVec3::new(1.0, 2.0, 3.0));
        assert_close(container.get(0).f, DVec3::new(0.0, -19.62, 0.0));
        assert_eq!(container.get(1).f, DVec3::ZERO);
        assert_eq!(container.get(1).old_f, DVec3::ZERO);
    }

    #[test]
    fn external_forces_respect_deadline_and_targets() {
        let mut container = ParticleContainer::from_particles(vec![
            Particle::new(DVec3::ZERO, DVec3::ZERO, 1.0, 1),
            Particle::new(DVec3::ONE, DVec3::ZERO, 1.0, 1),
        ]);
        let pull = ExternalForce {
            ids: vec![1, 99],
            force: DVec3::new(0.0, 0.0, 0.8),
            until: 150.0,
        };
        apply_external_forces(&mut container, &[pull.clone()], 0.0);
        assert_eq!(container.get(0).f, DVec3::ZERO);
        assert_close(container.get(1).f, DVec3::new(0.0, 0.0, 0.8));

        apply_external_forces(&mut container, &[pull], 150.0);
        assert_close(container.get(1).f, DVec3::new(0.0, 0.0, 0.8));
    }

    #[test]
    fn planet_kind_attracts_masses() {
        let mut container = ParticleContainer::from_particles(vec![
            Particle::new(DVec3::ZERO, DVec3::ZERO, 2.0, 0),
            Particle::new(DVec3::new(2.0, 0.0, 0.0), DVec3::ZERO, 3.0, 0),
        ]);
        force_gravity_pairs(&mut container);
        // |F| = m1 m2 / r^2 = 6 / 4
        assert_close(container.get(0).f, DVec3::new(1.5, 0.0, 0.0));
        assert_close(container.get(1).f, DVec3::new(-1.5, 0.0, 0.0));
    }
}
