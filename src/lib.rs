//! A molecular-dynamics engine built around a linked-cell spatial
//! decomposition: particle container, cell grid, pluggable per-face
//! boundary conditions, truncated Lennard-Jones forces with
//! Lorentz-Berthelot mixing, Störmer-Verlet integration and velocity
//! rescaling thermostats.

pub mod analyzer;
pub mod boundary;
pub mod cell;
pub mod config;
pub mod generator;
pub mod grid;
pub mod integrator;
pub mod ljforce;
pub mod membrane;
pub mod output;
pub mod particle;
pub mod simulation;
pub mod thermostat;
