//! Density and velocity profile sampling.
//!
//! Each sample appends one row to `<prefix>_density.csv` and
//! `<prefix>_velocity.csv`: `bx·by·bz` comma-separated values in x-major
//! bin order. The density row counts particles per bin, the velocity row
//! averages `‖v‖` over the particles of the bin.

use crate::particle::ParticleContainer;
use anyhow::{Context, Result};
use glam::DVec3;
use log::info;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct Analyzer {
    bin_count: [usize; 3],
    n_bins: usize,
    prefix: String,
    bin_size: [f64; 3],
    origin: DVec3,
    initialized: bool,
}

impl Analyzer {
    pub fn new(bin_count: [usize; 3], prefix: impl Into<String>) -> Self {
        let n_bins = bin_count[0] * bin_count[1] * bin_count[2];
        let prefix = prefix.into();
        info!(
            "analyzer: {} bins configured as {:?}, writing to {}_*.csv",
            n_bins, bin_count, prefix
        );
        Analyzer {
            bin_count,
            n_bins,
            prefix,
            bin_size: [0.0; 3],
            origin: DVec3::ZERO,
            initialized: false,
        }
    }

    pub fn density_path(&self) -> PathBuf {
        PathBuf::from(format!("{}_density.csv", self.prefix))
    }

    pub fn velocity_path(&self) -> PathBuf {
        PathBuf::from(format!("{}_velocity.csv", self.prefix))
    }

    fn bin_of(&self, pos: DVec3) -> usize {
        let rel = (pos - self.origin).to_array();
        let mut index = [0usize; 3];
        for k in 0..3 {
            let raw = if self.bin_size[k] > 0.0 {
                (rel[k] / self.bin_size[k]).floor()
            } else {
                0.0
            };
            // out-of-domain particles accumulate in the edge bins
            index[k] = (raw.max(0.0) as usize).min(self.bin_count[k] - 1);
        }
        index[0] + index[1] * self.bin_count[0] + index[2] * self.bin_count[0] * self.bin_count[1]
    }

    /// Takes one sample and appends it to both profile files.
    pub fn sample(
        &mut self,
        container: &ParticleContainer,
        domain_origin: DVec3,
        domain_size: DVec3,
    ) -> Result<()> {
        if self.n_bins == 0 {
            return Ok(());
        }
        if !self.initialized {
            let size = domain_size.to_array();
            for k in 0..3 {
                self.bin_size[k] = size[k] / self.bin_count[k] as f64;
            }
            self.origin = domain_origin;
            self.initialized = true;
        }

        let mut density = vec![0.0f64; self.n_bins];
        let mut velocity = vec![0.0f64; self.n_bins];
        for p in container.active() {
            let bin = self.bin_of(p.x);
            density[bin] += 1.0;
            velocity[bin] += p.v.length();
        }
        for bin in 0..self.n_bins {
            if density[bin] > 0.0 {
                velocity[bin] /= density[bin];
            }
        }

        append_row(&self.density_path(), &density)?;
        append_row(&self.velocity_path(), &velocity)?;
        Ok(())
    }
}

fn append_row(path: &PathBuf, data: &[f64]) -> Result<()> {
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("could not open profile file {}", path.display()))?;
    let row: Vec<String> = data.iter().map(|v| v.to_string()).collect();
    writeln!(file, "{}", row.join(","))
        .with_context(|| format!("could not append to {}", path.display()))?;
    Ok(())
}
