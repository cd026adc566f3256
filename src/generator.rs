//! Geometric particle-cluster generators: cuboid lattices, sphere
//! disc stacks, and membrane lattices with bond topology.

use crate::membrane::MembraneTopology;
use crate::particle::{Particle, ParticleContainer};
use glam::DVec3;
use log::info;
use rand::Rng;
use rand_distr::{Distribution, Normal};
use std::collections::BTreeSet;
use std::f64::consts::PI;

/// Maxwell-Boltzmann distributed velocity contribution: `N(0, mean_v)` in
/// each of the first `dims` components, zero elsewhere.
pub fn maxwell_boltzmann<R: Rng>(mean_v: f64, dims: usize, rng: &mut R) -> DVec3 {
    if mean_v == 0.0 || dims == 0 {
        return DVec3::ZERO;
    }
    let normal = Normal::new(0.0, mean_v).expect("standard deviation is finite and non-negative");
    let mut v = [0.0; 3];
    for item in v.iter_mut().take(dims.min(3)) {
        *item = normal.sample(rng);
    }
    DVec3::from_array(v)
}

fn finish_particle(
    mut p: Particle,
    stationary_types: &BTreeSet<u32>,
    container: &mut ParticleContainer,
) -> usize {
    if stationary_types.contains(&p.ptype) {
        p.make_stationary();
    }
    container.add(p)
}

/// A rectangular lattice of particles.
#[derive(Debug, Clone)]
pub struct CuboidCluster {
    pub origin: DVec3,
    pub dim: [usize; 3],
    pub spacing: f64,
    pub mass: f64,
    pub velocity: DVec3,
    pub brown_vel: f64,
    pub brown_dim: usize,
    pub ptype: u32,
}

impl CuboidCluster {
    pub fn particle_count(&self) -> usize {
        self.dim[0] * self.dim[1] * self.dim[2]
    }

    pub fn generate<R: Rng>(
        &self,
        container: &mut ParticleContainer,
        stationary_types: &BTreeSet<u32>,
        rng: &mut R,
    ) {
        for i in 0..self.dim[0] {
            for j in 0..self.dim[1] {
                for k in 0..self.dim[2] {
                    let position = self.origin
                        + self.spacing * DVec3::new(i as f64, j as f64, k as f64);
                    let velocity =
                        self.velocity + maxwell_boltzmann(self.brown_vel, self.brown_dim, rng);
                    let p = Particle::new(position, velocity, self.mass, self.ptype);
                    finish_particle(p, stationary_types, container);
                }
            }
        }
        info!(
            "generated cuboid cluster: origin {:?}, dim {:?}, spacing {}, type {}",
            self.origin.to_array(),
            self.dim,
            self.spacing,
            self.ptype
        );
    }
}

/// A sphere built from stacked discs of concentric particle rings.
#[derive(Debug, Clone)]
pub struct SphereCluster {
    pub center: DVec3,
    /// Radius in particle counts; the physical radius is `radius * spacing`.
    pub radius: usize,
    /// 2 builds a single disc, 3 a full sphere.
    pub sphere_dim: usize,
    pub spacing: f64,
    pub mass: f64,
    pub velocity: DVec3,
    pub brown_vel: f64,
    pub brown_dim: usize,
    pub ptype: u32,
}

impl SphereCluster {
    fn real_radius(&self, z_offset: f64) -> f64 {
        let r = self.radius as f64 * self.spacing;
        (r * r - z_offset * z_offset).max(0.0).sqrt()
    }

    fn generate_ring<R: Rng>(
        &self,
        container: &mut ParticleContainer,
        stationary_types: &BTreeSet<u32>,
        rng: &mut R,
        real_radius: f64,
        z_offset: f64,
    ) {
        if real_radius < self.spacing {
            // degenerates to a single particle on the axis
            let position = self.center + DVec3::new(0.0, 0.0, z_offset);
            let velocity = self.velocity + maxwell_boltzmann(self.brown_vel, self.brown_dim, rng);
            let p = Particle::new(position, velocity, self.mass, self.ptype);
            finish_particle(p, stationary_types, container);
            return;
        }

        // space the ring so adjacent particles sit at least `spacing` apart
        let raw_step = 2.0 * (self.spacing / (2.0 * real_radius)).asin();
        let count = (2.0 * PI / raw_step) as usize;
        let step = 2.0 * PI / count as f64;
        let mut angle = 0.0;
        while angle + step / 2.0 < 2.0 * PI {
            let position = self.center
                + DVec3::new(
                    angle.cos() * real_radius,
                    angle.sin() * real_radius,
                    z_offset,
                );
            let velocity = self.velocity + maxwell_boltzmann(self.brown_vel, self.brown_dim, rng);
            let p = Particle::new(position, velocity, self.mass, self.ptype);
            finish_particle(p, stationary_types, container);
            angle += step;
        }
    }

    fn generate_disc<R: Rng>(
        &self,
        container: &mut ParticleContainer,
        stationary_types: &BTreeSet<u32>,
        rng: &mut R,
        real_radius: f64,
        z_offset: f64,
    ) {
        if real_radius.abs() < 1e-6 {
            self.generate_ring(container, stationary_types, rng, real_radius, z_offset);
            return;
        }
        let steps = (real_radius / self.spacing) as usize;
        if steps == 0 {
            self.generate_ring(container, stationary_types, rng, real_radius, z_offset);
            return;
        }
        // rings shrinking toward the center
        let step = real_radius / steps as f64;
        let mut r = real_radius;
        while r.abs() > 1e-8 {
            self.generate_ring(container, stationary_types, rng, r, z_offset);
            r -= step;
        }
    }

    pub fn generate<R: Rng>(
        &self,
        container: &mut ParticleContainer,
        stationary_types: &BTreeSet<u32>,
        rng: &mut R,
    ) {
        if self.radius == 0 {
            return;
        }
        self.generate_disc(container, stationary_types, rng, self.real_radius(0.0), 0.0);
        if self.sphere_dim == 3 {
            let mut z_offset = self.spacing;
            for disc_radius in (1..self.radius).rev() {
                // the outermost stack layer gets a cap offset so its radius
                // stays positive
                let cap = if disc_radius == 1 {
                    self.spacing * 0.25
                } else {
                    0.0
                };
                let real = self.real_radius(z_offset - cap);
                self.generate_disc(container, stationary_types, rng, real, z_offset);
                self.generate_disc(container, stationary_types, rng, real, -z_offset);
                z_offset += self.spacing;
            }
        }
        info!(
            "generated sphere cluster: center {:?}, radius {}, dim {}",
            self.center.to_array(),
            self.radius,
            self.sphere_dim
        );
    }
}

/// A w × h particle lattice in the xy plane bonded into a membrane.
#[derive(Debug, Clone)]
pub struct MembraneCluster {
    pub origin: DVec3,
    pub width: usize,
    pub height: usize,
    pub spacing: f64,
    pub mass: f64,
    pub velocity: DVec3,
    pub spring_constant: f64,
    pub rest_length: f64,
    pub ptype: u32,
}

impl MembraneCluster {
    pub fn particle_count(&self) -> usize {
        self.width * self.height
    }

    /// Generates the lattice and returns its bond topology. `molecule_id`
    /// is stamped on every generated particle.
    pub fn generate(
        &self,
        container: &mut ParticleContainer,
        stationary_types: &BTreeSet<u32>,
        molecule_id: usize,
    ) -> MembraneTopology {
        let mut topology = MembraneTopology::new(self.spring_constant, self.rest_length);
        let mut lattice = vec![vec![0usize; self.height]; self.width];

        for i in 0..self.width {
            for j in 0..self.height {
                let position = self.origin + self.spacing * DVec3::new(i as f64, j as f64, 0.0);
                let mut p = Particle::new(position, self.velocity, self.mass, self.ptype);
                p.molecule = Some(molecule_id);
                lattice[i][j] = finish_particle(p, stationary_types, container);
            }
        }

        // half neighborhood per particle: direct = right/up,
        // diagonal = upper-right/lower-right
        for i in 0..self.width {
            for j in 0..self.height {
                let id = lattice[i][j];
                if i + 1 < self.width {
                    topology.add_direct(id, lattice[i + 1][j]);
                }
                if j + 1 < self.height {
                    topology.add_direct(id, lattice[i][j + 1]);
                }
                if i + 1 < self.width && j + 1 < self.height {
                    topology.add_diagonal(id, lattice[i + 1][j + 1]);
                }
                if i + 1 < self.width && j >= 1 {
                    topology.add_diagonal(id, lattice[i + 1][j - 1]);
                }
            }
        }

        info!(
            "generated membrane cluster: origin {:?}, {}x{}, k={}, r0={}",
            self.origin.to_array(),
            self.width,
            self.height,
            self.spring_constant,
            self.rest_length
        );
        topology
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn no_stationary() -> BTreeSet<u32> {
        BTreeSet::new()
    }

    #[test]
    fn cuboid_fills_a_lattice() {
        let cluster = CuboidCluster {
            origin: DVec3::new(1.0, 2.0, 3.0),
            dim: [3, 2, 4],
            spacing: 1.5,
            mass: 2.0,
            velocity: DVec3::new(0.5, 0.0, 0.0),
            brown_vel: 0.0,
            brown_dim: 0,
            ptype: 1,
        };
        let mut container = ParticleContainer::new();
        let mut rng = StdRng::seed_from_u64(1);
        cluster.generate(&mut container, &no_stationary(), &mut rng);

        assert_eq!(container.len(), cluster.particle_count());
        assert_eq!(container.len(), 24);
        let first = container.get(0);
        assert_eq!(first.x, DVec3::new(1.0, 2.0, 3.0));
        assert_eq!(first.v, DVec3::new(0.5, 0.0, 0.0));
        let last = container.get(23);
        assert_eq!(last.x, DVec3::new(1.0 + 3.0, 2.0 + 1.5, 3.0 + 4.5));
    }

    #[test]
    fn cuboid_marks_stationary_types() {
        let cluster = CuboidCluster {
            origin: DVec3::ZERO,
            dim: [2, 1, 1],
            spacing: 1.0,
            mass: 1.0,
            velocity: DVec3::new(1.0, 0.0, 0.0),
            brown_vel: 0.1,
            brown_dim: 3,
            ptype: 7,
        };
        let mut container = ParticleContainer::new();
        let mut rng = StdRng::seed_from_u64(2);
        let stationary: BTreeSet<u32> = [7].into_iter().collect();
        cluster.generate(&mut container, &stationary, &mut rng);

        for p in container.active() {
            assert!(p.is_stationary());
            assert_eq!(p.v, DVec3::ZERO);
        }
    }

    #[test]
    fn sphere_disc_ring_counts() {
        let cluster = SphereCluster {
            center: DVec3::ZERO,
            radius: 1,
            sphere_dim: 2,
            spacing: 1.0,
            mass: 1.0,
            velocity: DVec3::ZERO,
            brown_vel: 0.0,
            brown_dim: 0,
            ptype: 1,
        };
        let mut container = ParticleContainer::new();
        let mut rng = StdRng::seed_from_u64(3);
        cluster.generate(&mut container, &no_stationary(), &mut rng);
        // a single ring of radius `spacing`: step = 2 asin(1/2) = pi/3
        assert_eq!(container.len(), 6);
        for p in container.active() {
            assert!((p.x.length() - 1.0).abs() < 1e-9);
        }
    }

    #[test]
    fn sphere_is_symmetric_about_its_equator() {
        let cluster = SphereCluster {
            center: DVec3::ZERO,
            radius: 3,
            sphere_dim: 3,
            spacing: 1.0,
            mass: 1.0,
            velocity: DVec3::ZERO,
            brown_vel: 0.0,
            brown_dim: 0,
            ptype: 1,
        };
        let mut container = ParticleContainer::new();
        let mut rng = StdRng::seed_from_u64(4);
        cluster.generate(&mut container, &no_stationary(), &mut rng);

        assert!(container.len() > 0);
        let above = container.active().filter(|p| p.x.z > 0.0).count();
        let below = container.active().filter(|p| p.x.z < 0.0).count();
        assert_eq!(above, below);
        // the cap offset lets the outermost layer bulge a little past the
        // nominal radius, never more than the spacing
        for p in container.active() {
            assert!(p.x.length() <= 3.0 + cluster.spacing);
        }
    }

    #[test]
    fn membrane_lattice_and_topology() {
        let cluster = MembraneCluster {
            origin: DVec3::ZERO,
            width: 3,
            height: 2,
            spacing: 2.0,
            mass: 1.0,
            velocity: DVec3::ZERO,
            spring_constant: 1.0,
            rest_length: 2.0,
            ptype: 3,
        };
        let mut container = ParticleContainer::new();
        let topo = cluster.generate(&mut container, &no_stationary(), 0);

        assert_eq!(container.len(), 6);
        for p in container.active() {
            assert_eq!(p.molecule, Some(0));
        }

        // ids: (i, j) -> i * height + j
        assert!(topo.is_direct(0, 2)); // right
        assert!(topo.is_direct(0, 1)); // up
        assert!(topo.is_diagonal(0, 3)); // upper-right
        assert!(topo.is_diagonal(1, 2)); // lower-right
        assert!(!topo.bonded(0, 4));
        // 7 direct bonds + 4 diagonal bonds for a 3x2 lattice
        assert_eq!(topo.bond_count(), 11);
    }
}
