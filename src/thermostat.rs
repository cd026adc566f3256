//! Velocity-rescaling thermostats.
//!
//! The classical variant rescales raw velocities toward the target kinetic
//! temperature; the individual variant first subtracts the mean velocity so
//! a drifting system is not mistaken for a hot one. Both cap the temperature
//! change per update at `max_delta`.

use crate::integrator::ParallelMode;
use crate::particle::ParticleContainer;
use glam::DVec3;
use log::debug;
use rand::Rng;
use rand_distr::{Distribution, Normal};
use rayon::prelude::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThermostatKind {
    Classical,
    Individual,
}

#[derive(Debug, Clone)]
pub struct Thermostat {
    kind: ThermostatKind,
    t_init: f64,
    t_target: f64,
    max_delta: f64,
    /// Effective dimensionality of the simulation (2 or 3).
    dim: usize,
}

impl Thermostat {
    pub fn new(kind: ThermostatKind, t_init: f64, t_target: f64, max_delta: f64, dim: usize) -> Self {
        Thermostat {
            kind,
            t_init,
            t_target,
            max_delta,
            dim,
        }
    }

    pub fn kind(&self) -> ThermostatKind {
        self.kind
    }

    pub fn initial_temperature(&self) -> f64 {
        self.t_init
    }

    pub fn target_temperature(&self) -> f64 {
        self.t_target
    }

    /// Maxwell-Boltzmann initialization: perturbs each movable particle's
    /// velocity by `N(0, √(T_init/m))` in each simulated dimension.
    pub fn init_brownian<R: Rng>(&self, container: &mut ParticleContainer, rng: &mut R) {
        if self.t_init <= 0.0 {
            return;
        }
        for p in container.active_mut() {
            if p.is_stationary() {
                continue;
            }
            let normal = Normal::new(0.0, (self.t_init / p.m).sqrt())
                .expect("standard deviation is finite and non-negative");
            let mut v = p.v.to_array();
            for item in v.iter_mut().take(self.dim) {
                *item += normal.sample(rng);
            }
            p.v = DVec3::from_array(v);
        }
    }

    fn mean_velocity(container: &ParticleContainer) -> DVec3 {
        let n = container.active_count();
        if n == 0 {
            return DVec3::ZERO;
        }
        let sum: DVec3 = container
            .particles()
            .par_iter()
            .filter(|p| p.is_active())
            .map(|p| p.v)
            .reduce(|| DVec3::ZERO, |a, b| a + b);
        sum / n as f64
    }

    /// Twice the kinetic energy, `Σ m·‖v - v̄‖²`, with `v̄ = 0` for the
    /// classical variant.
    fn doubled_kinetic_energy(&self, container: &ParticleContainer, mean: DVec3) -> f64 {
        container
            .particles()
            .par_iter()
            .filter(|p| p.is_active())
            .map(|p| p.m * (p.v - mean).length_squared())
            .sum()
    }

    /// Current kinetic temperature, `2E / (N·d)` over active particles.
    pub fn current_temperature(&self, container: &ParticleContainer) -> f64 {
        let n = container.active_count();
        if n == 0 {
            return 0.0;
        }
        let mean = match self.kind {
            ThermostatKind::Classical => DVec3::ZERO,
            ThermostatKind::Individual => Self::mean_velocity(container),
        };
        self.doubled_kinetic_energy(container, mean) / (n * self.dim) as f64
    }

    /// One thermostat update: rescales velocities toward the target
    /// temperature, moving at most `max_delta` per call.
    pub fn update(&self, container: &mut ParticleContainer, mode: ParallelMode) {
        if container.active_count() == 0 {
            return;
        }
        let mean = match self.kind {
            ThermostatKind::Classical => DVec3::ZERO,
            ThermostatKind::Individual => Self::mean_velocity(container),
        };
        let n = container.active_count();
        let current = self.doubled_kinetic_energy(container, mean) / (n * self.dim) as f64;
        if current <= 0.0 {
            return;
        }

        let t_new = current + (self.t_target - current).clamp(-self.max_delta, self.max_delta);
        let beta = (t_new / current).sqrt();
        debug!("thermostat: T={current:.6} -> {t_new:.6} (beta={beta:.6})");

        let rescale = move |p: &mut crate::particle::Particle| {
            if p.is_active() && !p.is_stationary() {
                p.v = mean + beta * (p.v - mean);
            }
        };
        match mode {
            ParallelMode::Task => container.particles_mut().par_iter_mut().for_each(rescale),
            ParallelMode::Static => {
                let chunk = ParallelMode::static_chunk(container.len());
                container
                    .particles_mut()
                    .par_chunks_mut(chunk)
                    .for_each(|c| c.iter_mut().for_each(rescale));
            }
        }
    }
}
