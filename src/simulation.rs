//! The simulation driver: owns the particle population, the optional grid
//! and boundary capabilities, and runs the fixed-step loop.

use crate::analyzer::Analyzer;
use crate::boundary::{BoundaryConfig, BoundaryHandler, GhostPool};
use crate::cell::CellKind;
use crate::config::InputDocument;
use crate::generator::{CuboidCluster, MembraneCluster, SphereCluster};
use crate::grid::CellGrid;
use crate::integrator::{position_step, velocity_step, ParallelMode};
use crate::ljforce::{
    apply_external_forces, begin_force_step, force_gravity_pairs, force_lj_cells,
    force_lj_direct, ExternalForce, LjTable,
};
use crate::membrane::MembraneTopology;
use crate::output::{Writer, WriterKind};
use crate::particle::{Particle, ParticleContainer};
use crate::thermostat::{Thermostat, ThermostatKind};
use anyhow::{bail, Result};
use glam::DVec3;
use log::{info, warn};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

/// The supported simulation flavors. All share the driver loop; the kind
/// decides the force pass and which capabilities get wired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimKind {
    /// Direct gravitational N-body.
    Planet,
    /// Direct Lennard-Jones over all pairs.
    Lj,
    /// Linked-cell Lennard-Jones without boundary handling.
    LinkedLj,
    /// Linked cells plus boundary conditions.
    DomainLj,
    /// Adds per-type parameter mixing, gravity and the thermostat.
    MixedLj,
    /// Adds membrane topology and harmonic bonds.
    MembraneLj,
}

impl SimKind {
    pub fn parse(name: &str) -> Result<Self> {
        Ok(match name {
            "planet" => SimKind::Planet,
            "lj" => SimKind::Lj,
            "linked-lj" => SimKind::LinkedLj,
            "domain-lj" => SimKind::DomainLj,
            "mixed-lj" => SimKind::MixedLj,
            "membrane-lj" => SimKind::MembraneLj,
            other => bail!("unknown simulation kind '{other}'"),
        })
    }

    pub fn name(self) -> &'static str {
        match self {
            SimKind::Planet => "planet",
            SimKind::Lj => "lj",
            SimKind::LinkedLj => "linked-lj",
            SimKind::DomainLj => "domain-lj",
            SimKind::MixedLj => "mixed-lj",
            SimKind::MembraneLj => "membrane-lj",
        }
    }

    pub fn uses_grid(self) -> bool {
        !matches!(self, SimKind::Planet | SimKind::Lj)
    }

    pub fn uses_boundaries(self) -> bool {
        matches!(self, SimKind::DomainLj | SimKind::MixedLj | SimKind::MembraneLj)
    }

    /// Whether per-type Lorentz-Berthelot mixing applies (otherwise the
    /// single ε/σ pair of the parameter block is used for every type).
    pub fn uses_mixing(self) -> bool {
        matches!(self, SimKind::MixedLj | SimKind::MembraneLj)
    }
}

/// The three physics callables of one step, supplied by value so kinds can
/// swap the force pass without touching the driver.
#[derive(Clone, Copy)]
pub struct PhysicsStrategy {
    pub position: fn(&mut Simulation),
    pub velocity: fn(&mut Simulation),
    pub force: fn(&mut Simulation),
}

pub fn strategy_for(kind: SimKind) -> PhysicsStrategy {
    PhysicsStrategy {
        position: position_pass,
        velocity: velocity_pass,
        force: match kind {
            SimKind::Planet => force_planet_pass,
            SimKind::Lj => force_direct_pass,
            _ => force_linked_pass,
        },
    }
}

fn position_pass(sim: &mut Simulation) {
    position_step(&mut sim.container, sim.settings.delta_t, sim.parallel);
}

fn velocity_pass(sim: &mut Simulation) {
    velocity_step(&mut sim.container, sim.settings.delta_t, sim.parallel);
}

fn force_planet_pass(sim: &mut Simulation) {
    begin_force_step(&mut sim.container, sim.gravity, sim.parallel);
    force_gravity_pairs(&mut sim.container);
}

fn force_direct_pass(sim: &mut Simulation) {
    begin_force_step(&mut sim.container, sim.gravity, sim.parallel);
    force_lj_direct(&mut sim.container, &sim.lj);
}

fn force_linked_pass(sim: &mut Simulation) {
    begin_force_step(&mut sim.container, sim.gravity, sim.parallel);
    let grid = sim
        .grid
        .as_ref()
        .expect("linked-cell force pass requires a grid");
    force_lj_cells(&mut sim.container, grid, &sim.ghosts, &sim.lj, &sim.membranes);
    for membrane in &sim.membranes {
        membrane.apply_harmonic_forces(&mut sim.container);
    }
}

/// Frequencies and time stepping of the driver loop.
#[derive(Debug, Clone)]
pub struct SimulationSettings {
    pub start_time: f64,
    pub delta_t: f64,
    pub end_time: f64,
    pub plot_frequency: u64,
    pub update_frequency: u64,
    pub thermostat_frequency: u64,
    pub analysis_frequency: u64,
}

/// Everything needed to build a simulation besides the input document.
#[derive(Debug, Clone)]
pub struct SimulationOptions {
    pub kind: SimKind,
    pub writer_kind: WriterKind,
    pub output_prefix: String,
    pub parallel: ParallelMode,
    pub seed: u64,
}

pub struct Simulation {
    pub settings: SimulationSettings,
    pub kind: SimKind,
    pub time: f64,
    pub iteration: u64,
    pub container: ParticleContainer,
    pub grid: Option<CellGrid>,
    pub boundary: Option<BoundaryHandler>,
    pub ghosts: GhostPool,
    pub lj: LjTable,
    pub gravity: DVec3,
    pub membranes: Vec<MembraneTopology>,
    pub thermostat: Option<Thermostat>,
    pub external_forces: Vec<ExternalForce>,
    pub writer: Writer,
    pub analyzer: Option<Analyzer>,
    pub parallel: ParallelMode,
    domain_origin: DVec3,
    domain_size: DVec3,
    strategy: PhysicsStrategy,
}

/// Summary of a finished (or interrupted) run.
#[derive(Debug, Clone)]
pub struct RunStats {
    pub iterations: u64,
    pub wall: Duration,
    pub particle_updates: u64,
}

impl RunStats {
    /// Particle updates per second (one update = force + velocity +
    /// position for one particle in one iteration).
    pub fn updates_per_second(&self) -> f64 {
        let secs = self.wall.as_secs_f64();
        if secs > 0.0 {
            self.particle_updates as f64 / secs
        } else {
            0.0
        }
    }
}

impl Simulation {
    /// Builds the full simulation state from a validated input document.
    /// Configuration problems found here abort before the loop.
    pub fn from_document(doc: &InputDocument, opts: &SimulationOptions) -> Result<Self> {
        let p = &doc.parameters;
        let mut rng = StdRng::seed_from_u64(opts.seed);
        let stationary: BTreeSet<u32> = doc.stationary_types.iter().copied().collect();

        let mut container = ParticleContainer::new();
        let mut membranes = Vec::new();

        for c in &doc.clusters.cuboids {
            CuboidCluster {
                origin: DVec3::from_array(c.origin),
                dim: c.dim,
                spacing: c.spacing,
                mass: c.mass,
                velocity: DVec3::from_array(c.vel),
                brown_vel: c.brown_vel,
                brown_dim: c.brown_dim,
                ptype: c.ptype,
            }
            .generate(&mut container, &stationary, &mut rng);
        }
        for s in &doc.clusters.spheres {
            SphereCluster {
                center: DVec3::from_array(s.center),
                radius: s.radius,
                sphere_dim: s.sphere_dim,
                spacing: s.spacing,
                mass: s.mass,
                velocity: DVec3::from_array(s.vel),
                brown_vel: s.brown_vel,
                brown_dim: s.brown_dim,
                ptype: s.ptype,
            }
            .generate(&mut container, &stationary, &mut rng);
        }
        for m in &doc.clusters.membranes {
            let molecule_id = membranes.len();
            let topology = MembraneCluster {
                origin: DVec3::from_array(m.origin),
                width: m.width,
                height: m.height,
                spacing: m.spacing,
                mass: m.mass,
                velocity: DVec3::from_array(m.vel),
                spring_constant: m.k,
                rest_length: m.r0,
                ptype: m.ptype,
            }
            .generate(&mut container, &stationary, molecule_id);
            membranes.push(topology);
        }
        if let Some(raw) = &doc.particles {
            let n = raw.mass_data.len();
            for i in 0..n {
                let at = |data: &[f64], i: usize| {
                    DVec3::new(data[3 * i], data[3 * i + 1], data[3 * i + 2])
                };
                let mut particle = Particle::new(
                    at(&raw.point_data, i),
                    at(&raw.vel_data, i),
                    raw.mass_data[i],
                    raw.type_data[i],
                );
                if !raw.force_data.is_empty() {
                    particle.f = at(&raw.force_data, i);
                }
                if !raw.old_force_data.is_empty() {
                    particle.old_f = at(&raw.old_force_data, i);
                }
                if stationary.contains(&particle.ptype) {
                    particle.make_stationary();
                }
                container.add(particle);
            }
            info!("read {n} particles from raw particle arrays");
        }

        let lj = if opts.kind.uses_mixing() && !doc.types.is_empty() {
            let mut params = BTreeMap::new();
            for t in &doc.types {
                params.insert(t.type_id, (t.epsilon, t.sigma));
            }
            LjTable::from_type_params(&params)
        } else {
            let present: BTreeSet<u32> = container.particles().iter().map(|p| p.ptype).collect();
            LjTable::uniform(present, p.epsilon, p.sigma)
        };

        let (grid, boundary) = if opts.kind.uses_grid() {
            let mut grid = CellGrid::new(
                DVec3::from_array(p.domain_origin),
                DVec3::from_array(p.domain_size),
                p.cutoff,
            );
            grid.populate(&container);
            for particle in container.active() {
                let index = grid.index_from_position(particle.x);
                if grid.classify(index) == CellKind::Halo {
                    warn!(
                        "particle {} generated at {:?} inside a halo cell",
                        particle.id(),
                        particle.x.to_array()
                    );
                }
            }

            let boundary = if opts.kind.uses_boundaries() {
                if p.boundaries.is_empty() {
                    bail!(
                        "simulation kind '{}' needs a boundary configuration",
                        opts.kind.name()
                    );
                }
                let config = BoundaryConfig::from_names(&p.boundaries)?;
                if config.dimensionality() != grid.dimensionality() {
                    bail!(
                        "dimensionality mismatch: boundary configuration is {}-D, domain is {}-D",
                        config.dimensionality(),
                        grid.dimensionality()
                    );
                }
                Some(BoundaryHandler::new(config, &grid))
            } else {
                None
            };
            (Some(grid), boundary)
        } else {
            (None, None)
        };

        let dim = grid.as_ref().map_or(3, CellGrid::dimensionality);
        let thermostat = match &p.thermostat {
            Some(t) if t.thermo_freq > 0 => {
                let kind = if t.variant == "individual" {
                    ThermostatKind::Individual
                } else {
                    ThermostatKind::Classical
                };
                let target = t.target_temp.unwrap_or(t.initial_temp);
                info!(
                    "thermostat: T_init={}, T_target={}, max delta {}, every {} iterations",
                    t.initial_temp, target, t.max_temp_delta, t.thermo_freq
                );
                Some(Thermostat::new(
                    kind,
                    t.initial_temp,
                    target,
                    t.max_temp_delta,
                    dim,
                ))
            }
            _ => {
                info!("thermostat is turned off");
                None
            }
        };
        if let Some(th) = &thermostat {
            th.init_brownian(&mut container, &mut rng);
        }

        let external_forces: Vec<ExternalForce> = doc
            .external_forces
            .iter()
            .map(|e| ExternalForce {
                ids: e.ids.clone(),
                force: DVec3::from_array(e.force),
                until: e.until,
            })
            .collect();

        let analyzer = doc
            .analysis
            .as_ref()
            .map(|a| Analyzer::new(a.bin_count, opts.output_prefix.clone()));
        let analysis_frequency = doc.analysis.as_ref().map_or(0, |a| a.frequency);

        let settings = SimulationSettings {
            start_time: p.start_time,
            delta_t: p.delta_t,
            end_time: p.end_time,
            plot_frequency: p.frequency,
            update_frequency: p.update_freq,
            thermostat_frequency: p.thermostat.as_ref().map_or(0, |t| t.thermo_freq),
            analysis_frequency,
        };

        info!(
            "simulation '{}' with {} particles ({} active)",
            opts.kind.name(),
            container.len(),
            container.active_count()
        );

        Ok(Simulation {
            time: settings.start_time,
            iteration: 0,
            settings,
            kind: opts.kind,
            container,
            grid,
            boundary,
            ghosts: GhostPool::new(),
            lj,
            gravity: DVec3::from_array(p.gravity.as_vector()),
            membranes,
            thermostat,
            external_forces,
            writer: Writer::new(opts.writer_kind, opts.output_prefix.clone()),
            analyzer,
            parallel: opts.parallel,
            domain_origin: DVec3::from_array(p.domain_origin),
            domain_size: DVec3::from_array(p.domain_size),
            strategy: strategy_for(opts.kind),
        })
    }

    pub fn is_done(&self) -> bool {
        self.time >= self.settings.end_time
    }

    /// One step of the fixed-step state machine:
    /// boundary pre, force, velocity, position, boundary post, then the
    /// periodic duties (plot, grid refresh, thermostat, analytics).
    pub fn step(&mut self) -> Result<()> {
        if let Some(handler) = self.boundary.as_ref() {
            let grid = self.grid.as_mut().expect("boundary handling requires a grid");
            handler.pre_update(grid, &self.container, &mut self.ghosts);
        }

        let strategy = self.strategy;
        (strategy.force)(self);
        apply_external_forces(&mut self.container, &self.external_forces, self.time);
        (strategy.velocity)(self);
        (strategy.position)(self);

        if let Some(handler) = self.boundary.as_ref() {
            let grid = self.grid.as_mut().expect("boundary handling requires a grid");
            handler.post_update(grid, &mut self.container);
        }

        self.iteration += 1;

        if self.iteration % self.settings.plot_frequency == 0 {
            self.writer.write(&self.container, self.iteration)?;
        }
        if let Some(grid) = self.grid.as_mut() {
            if self.iteration % self.settings.update_frequency == 0 {
                grid.update_cells(&self.container);
            }
        }
        if let Some(thermostat) = self.thermostat.as_ref() {
            let freq = self.settings.thermostat_frequency;
            if freq > 0 && self.iteration % freq == 0 {
                thermostat.update(&mut self.container, self.parallel);
            }
        }
        if let Some(analyzer) = self.analyzer.as_mut() {
            let freq = self.settings.analysis_frequency;
            if freq > 0 && self.iteration % freq == 0 {
                analyzer.sample(&self.container, self.domain_origin, self.domain_size)?;
            }
        }

        self.time += self.settings.delta_t;
        Ok(())
    }

    /// Runs until `end_time` or until the stop flag is raised. Progress is
    /// reported at roughly one-percent granularity.
    pub fn run(&mut self, stop: &AtomicBool, profile: bool) -> Result<RunStats> {
        let started = Instant::now();
        let total = (((self.settings.end_time - self.time) / self.settings.delta_t).ceil()
            as u64)
            .max(1);
        let mut next_report = (total / 100).max(1);
        let mut particle_updates = 0u64;

        while !self.is_done() {
            if stop.load(Ordering::Relaxed) {
                info!("stop requested, ending run after iteration {}", self.iteration);
                break;
            }
            self.step()?;
            if profile {
                particle_updates += self.container.active_count() as u64;
            }

            if self.iteration >= next_report {
                let elapsed = started.elapsed().as_secs_f64();
                let progress = self.iteration as f64 / total as f64;
                let eta = (elapsed / progress - elapsed).max(0.0);
                info!(
                    "progress {:5.1}%, estimated time left {:.0}s",
                    progress * 100.0,
                    eta
                );
                next_report = ((total as f64 * (progress + 0.01)) as u64).max(next_report + 1);
            }
        }

        Ok(RunStats {
            iterations: self.iteration,
            wall: started.elapsed(),
            particle_updates,
        })
    }
}
