//! Störmer-Verlet position and velocity sub-steps.

use crate::particle::{Particle, ParticleContainer};
use rayon::prelude::*;

/// How the per-particle sweeps are scheduled on the rayon pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParallelMode {
    /// Fixed contiguous chunks, one per worker.
    Static,
    /// Work-stealing over the default split.
    Task,
}

impl ParallelMode {
    pub fn static_chunk(len: usize) -> usize {
        (len / rayon::current_num_threads()).max(1)
    }
}

fn sweep<F>(container: &mut ParticleContainer, mode: ParallelMode, update: F)
where
    F: Fn(&mut Particle) + Send + Sync,
{
    match mode {
        ParallelMode::Task => container.particles_mut().par_iter_mut().for_each(&update),
        ParallelMode::Static => {
            let chunk = ParallelMode::static_chunk(container.len());
            container
                .particles_mut()
                .par_chunks_mut(chunk)
                .for_each(|c| c.iter_mut().for_each(&update));
        }
    }
}

/// `x ← x + Δt·v + Δt²/(2m)·f` for every active, movable particle.
pub fn position_step(container: &mut ParticleContainer, dt: f64, mode: ParallelMode) {
    sweep(container, mode, |p| {
        if p.is_active() && !p.is_stationary() {
            p.x += dt * p.v + (dt * dt / (2.0 * p.m)) * p.f;
        }
    });
}

/// `v ← v + Δt/(2m)·(f_old + f)` for every active, movable particle.
pub fn velocity_step(container: &mut ParticleContainer, dt: f64, mode: ParallelMode) {
    sweep(container, mode, |p| {
        if p.is_active() && !p.is_stationary() {
            p.v += (dt / (2.0 * p.m)) * (p.old_f + p.f);
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::DVec3;

    const TOL: f64 = 1e-12;

    fn single(m: f64, v: DVec3, f: DVec3) -> ParticleContainer {
        let mut p = Particle::new(DVec3::ZERO, v, m, 1);
        p.f = f;
        ParticleContainer::from_particles(vec![p])
    }

    #[test]
    fn position_step_matches_verlet() {
        let mut c = single(2.0, DVec3::new(1.0, 0.0, 0.0), DVec3::new(0.0, 4.0, 0.0));
        position_step(&mut c, 0.5, ParallelMode::Task);
        // x = dt*v + dt^2/(2m)*f = (0.5, 0.25/4*4, 0) = (0.5, 0.25, 0)
        assert!((c.get(0).x - DVec3::new(0.5, 0.25, 0.0)).length() < TOL);
    }

    #[test]
    fn velocity_step_averages_old_and_new_force() {
        let mut c = single(1.0, DVec3::ZERO, DVec3::new(2.0, 0.0, 0.0));
        c.get_mut(0).old_f = DVec3::new(4.0, 0.0, 0.0);
        velocity_step(&mut c, 0.5, ParallelMode::Static);
        // v = dt/(2m)*(old + new) = 0.25 * 6
        assert!((c.get(0).v - DVec3::new(1.5, 0.0, 0.0)).length() < TOL);
    }

    #[test]
    fn stationary_particles_never_move() {
        let mut c = single(1.0, DVec3::ZERO, DVec3::ZERO);
        c.get_mut(0).v = DVec3::new(3.0, 0.0, 0.0);
        c.get_mut(0).make_stationary();
        c.get_mut(0).f = DVec3::ZERO;
        position_step(&mut c, 1.0, ParallelMode::Task);
        velocity_step(&mut c, 1.0, ParallelMode::Task);
        assert_eq!(c.get(0).x, DVec3::ZERO);
        assert_eq!(c.get(0).v, DVec3::ZERO);
    }

    #[test]
    fn rescaled_timestep_and_velocity_reproduce_positions() {
        // with zero force, scaling dt by c and v by 1/c keeps x fixed
        let scale = 4.0;
        let mut reference = single(1.0, DVec3::new(1.0, 2.0, -0.5), DVec3::ZERO);
        let mut rescaled = single(1.0, DVec3::new(1.0, 2.0, -0.5) / scale, DVec3::ZERO);
        position_step(&mut reference, 0.1, ParallelMode::Task);
        position_step(&mut rescaled, 0.1 * scale, ParallelMode::Task);
        assert!((reference.get(0).x - rescaled.get(0).x).length() < TOL);
    }

    #[test]
    fn inactive_particles_are_skipped() {
        let mut c = single(1.0, DVec3::new(1.0, 0.0, 0.0), DVec3::ZERO);
        c.remove(0);
        position_step(&mut c, 1.0, ParallelMode::Task);
        assert_eq!(c.get(0).x, DVec3::ZERO);
    }
}
