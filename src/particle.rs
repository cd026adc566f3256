//! Particle state and the append-only particle container.

use glam::DVec3;
use std::collections::BTreeSet;

/// State record for a single body.
///
/// A particle carries its kinematic state plus the force of the current and
/// the previous step (needed by the Verlet velocity update). Removal never
/// shuffles the backing storage: a particle is flagged inactive and its id
/// stays valid for the rest of the run.
#[derive(Debug, Clone, PartialEq)]
pub struct Particle {
    pub x: DVec3,
    pub v: DVec3,
    pub f: DVec3,
    pub old_f: DVec3,
    pub m: f64,
    pub ptype: u32,
    /// Stable id, assigned on insertion and never reused.
    id: usize,
    active: bool,
    /// Derived once at creation from the type. Stationary particles keep
    /// `v = f = old_f = 0` and are skipped by integration and thermostats.
    stationary: bool,
    /// Membrane/molecule membership. `None` for free particles.
    pub molecule: Option<usize>,
}

impl Particle {
    pub fn new(x: DVec3, v: DVec3, m: f64, ptype: u32) -> Self {
        Particle {
            x,
            v,
            f: DVec3::ZERO,
            old_f: DVec3::ZERO,
            m,
            ptype,
            id: 0,
            active: true,
            stationary: false,
            molecule: None,
        }
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn is_stationary(&self) -> bool {
        self.stationary
    }

    /// Marks the particle as immovable and clears its kinematic state.
    pub fn make_stationary(&mut self) {
        self.stationary = true;
        self.v = DVec3::ZERO;
        self.f = DVec3::ZERO;
        self.old_f = DVec3::ZERO;
    }
}

/// Owns every particle of the simulation in insertion order.
///
/// Ids double as indices into the backing vector; the vector is append-only
/// so references by id stay valid for the lifetime of the simulation.
/// Deleted ids are kept in an ordered set which maps a stable id to its dense
/// index among the surviving particles.
#[derive(Debug, Default)]
pub struct ParticleContainer {
    particles: Vec<Particle>,
    active_count: usize,
    deleted_ids: BTreeSet<usize>,
}

impl ParticleContainer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a container from pre-made particles, assigning ids by position.
    pub fn from_particles(mut particles: Vec<Particle>) -> Self {
        let mut active_count = 0;
        for (id, p) in particles.iter_mut().enumerate() {
            p.id = id;
            if p.active {
                active_count += 1;
            }
        }
        ParticleContainer {
            particles,
            active_count,
            deleted_ids: BTreeSet::new(),
        }
    }

    /// Appends a particle and returns its id.
    pub fn add(&mut self, mut p: Particle) -> usize {
        let id = self.particles.len();
        p.id = id;
        p.active = true;
        self.particles.push(p);
        self.active_count += 1;
        id
    }

    /// Flags a particle inactive. Removing an already-inactive particle is a
    /// no-op.
    pub fn remove(&mut self, id: usize) {
        let p = &mut self.particles[id];
        if p.active {
            p.active = false;
            self.deleted_ids.insert(id);
            self.active_count -= 1;
        }
    }

    pub fn len(&self) -> usize {
        self.particles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.particles.is_empty()
    }

    pub fn active_count(&self) -> usize {
        self.active_count
    }

    pub fn get(&self, id: usize) -> &Particle {
        &self.particles[id]
    }

    pub fn get_mut(&mut self, id: usize) -> &mut Particle {
        &mut self.particles[id]
    }

    /// Dense index of a surviving particle: its stable id minus the number of
    /// deletions at or below it. O(log n) in the number of deletions.
    pub fn dense_index(&self, id: usize) -> usize {
        id - self.deleted_ids.range(..=id).count()
    }

    /// Number of active particles in the half-open id range `[from, to)`.
    ///
    /// Equals the distance an active-skipping iterator would cover between
    /// the two positions, which is what range partitioning needs.
    pub fn active_between(&self, from: usize, to: usize) -> usize {
        debug_assert!(from <= to);
        (to - from) - self.deleted_ids.range(from..to).count()
    }

    pub fn particles(&self) -> &[Particle] {
        &self.particles
    }

    pub fn particles_mut(&mut self) -> &mut [Particle] {
        &mut self.particles
    }

    /// Iterates over active particles in id order.
    pub fn active(&self) -> impl Iterator<Item = &Particle> {
        self.particles.iter().filter(|p| p.active)
    }

    pub fn active_mut(&mut self) -> impl Iterator<Item = &mut Particle> {
        self.particles.iter_mut().filter(|p| p.active)
    }

    /// Ids of active particles in id order.
    pub fn active_ids(&self) -> impl Iterator<Item = usize> + '_ {
        self.particles
            .iter()
            .filter(|p| p.active)
            .map(|p| p.id)
    }

    /// Yields every unordered pair of active particles exactly once,
    /// as `(i, j)` with `i < j`.
    pub fn active_pairs(&self) -> ActivePairs<'_> {
        ActivePairs {
            container: self,
            first: 0,
            second: 0,
        }
    }

    /// Mutable access to two distinct particles at once.
    pub fn pair_mut(&mut self, i: usize, j: usize) -> (&mut Particle, &mut Particle) {
        assert_ne!(i, j, "pair_mut requires two distinct ids");
        if i < j {
            let (lo, hi) = self.particles.split_at_mut(j);
            (&mut lo[i], &mut hi[0])
        } else {
            let (lo, hi) = self.particles.split_at_mut(i);
            (&mut hi[0], &mut lo[j])
        }
    }
}

/// Iterator over unordered pairs of active particle ids.
pub struct ActivePairs<'a> {
    container: &'a ParticleContainer,
    first: usize,
    second: usize,
}

impl ActivePairs<'_> {
    fn next_active(&self, mut id: usize) -> Option<usize> {
        let n = self.container.len();
        while id < n {
            if self.container.get(id).active {
                return Some(id);
            }
            id += 1;
        }
        None
    }
}

impl Iterator for ActivePairs<'_> {
    type Item = (usize, usize);

    fn next(&mut self) -> Option<(usize, usize)> {
        loop {
            let first = self.next_active(self.first)?;
            self.first = first;
            match self.next_active(self.second.max(first + 1)) {
                Some(second) => {
                    self.second = second + 1;
                    return Some((first, second));
                }
                None => {
                    // first exhausted its partners, advance it
                    self.first = first + 1;
                    self.second = 0;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn particle_at(x: f64) -> Particle {
        Particle::new(DVec3::new(x, 0.0, 0.0), DVec3::ZERO, 1.0, 1)
    }

    #[test]
    fn add_assigns_monotonic_ids() {
        let mut c = ParticleContainer::new();
        for i in 0..5 {
            let id = c.add(particle_at(i as f64));
            assert_eq!(id, i);
        }
        assert_eq!(c.active_count(), 5);
    }

    #[test]
    fn remove_is_idempotent() {
        let mut c = ParticleContainer::new();
        for i in 0..3 {
            c.add(particle_at(i as f64));
        }
        c.remove(1);
        assert_eq!(c.active_count(), 2);
        c.remove(1);
        assert_eq!(c.active_count(), 2);
        assert!(!c.get(1).is_active());
    }

    #[test]
    fn dense_index_accounts_for_deletions() {
        let mut c = ParticleContainer::new();
        for i in 0..6 {
            c.add(particle_at(i as f64));
        }
        c.remove(1);
        c.remove(3);
        assert_eq!(c.dense_index(0), 0);
        assert_eq!(c.dense_index(2), 1);
        assert_eq!(c.dense_index(4), 2);
        assert_eq!(c.dense_index(5), 3);
    }

    #[test]
    fn active_between_matches_iterator_distance() {
        let mut c = ParticleContainer::new();
        for i in 0..10 {
            c.add(particle_at(i as f64));
        }
        c.remove(2);
        c.remove(3);
        c.remove(7);
        let counted = c
            .active()
            .filter(|p| p.id() >= 1 && p.id() < 8)
            .count();
        assert_eq!(c.active_between(1, 8), counted);
    }

    #[test]
    fn pair_iteration_visits_each_pair_once() {
        let mut c = ParticleContainer::new();
        for i in 0..5 {
            c.add(particle_at(i as f64));
        }
        c.remove(2);
        let pairs: Vec<_> = c.active_pairs().collect();
        // 4 active particles -> C(4, 2) pairs
        assert_eq!(pairs.len(), 6);
        for &(i, j) in &pairs {
            assert!(i < j);
            assert!(c.get(i).is_active() && c.get(j).is_active());
        }
        let mut dedup = pairs.clone();
        dedup.sort();
        dedup.dedup();
        assert_eq!(dedup.len(), pairs.len());
    }

    #[test]
    fn stationary_particles_keep_zero_state() {
        let mut p = particle_at(0.0);
        p.v = DVec3::new(1.0, 2.0, 3.0);
        p.make_stationary();
        assert!(p.is_stationary());
        assert_eq!(p.v, DVec3::ZERO);
        assert_eq!(p.f, DVec3::ZERO);
        assert_eq!(p.old_f, DVec3::ZERO);
    }
}
