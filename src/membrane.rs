//! Membrane topology: harmonic bonds between lattice neighbors.
//!
//! Each membrane stores half of its neighborhood per particle, always from
//! the lower id: direct bonds point up and right, diagonal bonds point
//! upper-right and lower-right. Summing over the stored half plus Newton's
//! third law yields every bond force exactly once.

use crate::particle::ParticleContainer;
use std::collections::BTreeMap;

#[derive(Debug, Clone)]
pub struct MembraneTopology {
    spring_constant: f64,
    rest_length: f64,
    direct: BTreeMap<usize, Vec<usize>>,
    diagonal: BTreeMap<usize, Vec<usize>>,
}

impl MembraneTopology {
    pub fn new(spring_constant: f64, rest_length: f64) -> Self {
        MembraneTopology {
            spring_constant,
            rest_length,
            direct: BTreeMap::new(),
            diagonal: BTreeMap::new(),
        }
    }

    pub fn spring_constant(&self) -> f64 {
        self.spring_constant
    }

    pub fn rest_length(&self) -> f64 {
        self.rest_length
    }

    /// Registers a direct (up or right) bond. Bonds are stored from the
    /// lower id so no pair can ever be registered twice.
    pub fn add_direct(&mut self, from: usize, to: usize) {
        debug_assert!(from < to, "bonds are registered from the lower id");
        self.direct.entry(from).or_default().push(to);
    }

    /// Registers a diagonal (upper-right or lower-right) bond.
    pub fn add_diagonal(&mut self, from: usize, to: usize) {
        debug_assert!(from < to, "bonds are registered from the lower id");
        self.diagonal.entry(from).or_default().push(to);
    }

    pub fn is_direct(&self, i: usize, j: usize) -> bool {
        let (lo, hi) = (i.min(j), i.max(j));
        self.direct.get(&lo).is_some_and(|v| v.contains(&hi))
    }

    pub fn is_diagonal(&self, i: usize, j: usize) -> bool {
        let (lo, hi) = (i.min(j), i.max(j));
        self.diagonal.get(&lo).is_some_and(|v| v.contains(&hi))
    }

    /// Whether the two particles share a spring.
    pub fn bonded(&self, i: usize, j: usize) -> bool {
        self.is_direct(i, j) || self.is_diagonal(i, j)
    }

    pub fn bond_count(&self) -> usize {
        self.direct.values().map(Vec::len).sum::<usize>()
            + self.diagonal.values().map(Vec::len).sum::<usize>()
    }

    /// Accumulates the harmonic spring force of every bond.
    ///
    /// Direct bonds rest at `r0`, diagonal bonds at `√2·r0`. The force
    /// `k·(‖d‖ - r0)·d̂` pulls the pair together when stretched and pushes
    /// it apart when compressed.
    pub fn apply_harmonic_forces(&self, container: &mut ParticleContainer) {
        for (&from, neighbors) in &self.direct {
            for &to in neighbors {
                harmonic_bond(container, from, to, self.spring_constant, self.rest_length);
            }
        }
        let diagonal_rest = self.rest_length * 2f64.sqrt();
        for (&from, neighbors) in &self.diagonal {
            for &to in neighbors {
                harmonic_bond(container, from, to, self.spring_constant, diagonal_rest);
            }
        }
    }
}

fn harmonic_bond(container: &mut ParticleContainer, i: usize, j: usize, k: f64, r0: f64) {
    let (a, b) = container.pair_mut(i, j);
    if !a.is_active() || !b.is_active() {
        return;
    }
    let d = b.x - a.x;
    let len = d.length();
    if len == 0.0 {
        return;
    }
    let f = k * (len - r0) * (d / len);
    if !a.is_stationary() {
        a.f += f;
    }
    if !b.is_stationary() {
        b.f -= f;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::particle::Particle;
    use glam::DVec3;

    const TOL: f64 = 1e-5;

    fn chain(positions: &[[f64; 3]]) -> ParticleContainer {
        ParticleContainer::from_particles(
            positions
                .iter()
                .map(|&x| Particle::new(DVec3::from_array(x), DVec3::ZERO, 1.0, 3))
                .collect(),
        )
    }

    #[test]
    fn linear_membrane_spring_forces() {
        let mut container = chain(&[[0.0, 0.0, 0.0], [2.0, 0.0, 0.0], [4.0, 0.0, 0.0]]);
        let mut topo = MembraneTopology::new(1.0, 1.0);
        topo.add_direct(0, 1);
        topo.add_direct(1, 2);
        topo.apply_harmonic_forces(&mut container);

        assert!((container.get(0).f - DVec3::new(1.0, 0.0, 0.0)).length() < TOL);
        assert!(container.get(1).f.length() < TOL);
        assert!((container.get(2).f - DVec3::new(-1.0, 0.0, 0.0)).length() < TOL);
    }

    #[test]
    fn diagonal_bonds_rest_at_sqrt_two() {
        let mut container = chain(&[[0.0, 0.0, 0.0], [2.0, 2.0, 0.0], [4.0, 0.0, 0.0]]);
        let mut topo = MembraneTopology::new(1.0, 1.0);
        topo.add_diagonal(0, 1);
        topo.add_diagonal(1, 2);
        topo.apply_harmonic_forces(&mut container);

        assert!((container.get(0).f - DVec3::new(1.0, 1.0, 0.0)).length() < TOL);
        assert!((container.get(1).f - DVec3::new(0.0, -2.0, 0.0)).length() < TOL);
        assert!((container.get(2).f - DVec3::new(-1.0, 1.0, 0.0)).length() < TOL);
    }

    #[test]
    fn half_neighborhood_is_disjoint() {
        let mut topo = MembraneTopology::new(1.0, 1.0);
        topo.add_direct(0, 1);
        topo.add_direct(0, 2);
        topo.add_diagonal(0, 3);

        assert!(topo.bonded(0, 1));
        assert!(topo.bonded(1, 0));
        assert!(topo.is_direct(2, 0));
        assert!(topo.is_diagonal(3, 0));
        assert!(!topo.bonded(1, 2));
        assert_eq!(topo.bond_count(), 3);
    }

    #[test]
    fn stationary_bond_partner_receives_no_force() {
        let mut container = chain(&[[0.0, 0.0, 0.0], [2.0, 0.0, 0.0]]);
        container.get_mut(0).make_stationary();
        let mut topo = MembraneTopology::new(1.0, 1.0);
        topo.add_direct(0, 1);
        topo.apply_harmonic_forces(&mut container);

        assert_eq!(container.get(0).f, DVec3::ZERO);
        assert!((container.get(1).f - DVec3::new(-1.0, 0.0, 0.0)).length() < TOL);
    }
}
