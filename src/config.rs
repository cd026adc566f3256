//! The structured input document and its validation.
//!
//! The document is JSON (`domainSize`, `updateFreq`, `brownVel`, ...).
//! Everything that can be checked before the loop starts is checked here;
//! a validation failure is a configuration error and aborts the run.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::collections::BTreeSet;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use crate::boundary::BoundaryConfig;

fn default_delta_t() -> f64 {
    0.014
}
fn default_end_time() -> f64 {
    2.8
}
fn default_epsilon() -> f64 {
    5.0
}
fn default_sigma() -> f64 {
    1.0
}
fn default_frequency() -> u64 {
    10
}
fn default_domain_size() -> [f64; 3] {
    [100.0, 100.0, 1.0]
}
fn default_domain_origin() -> [f64; 3] {
    [-50.0, -50.0, 0.0]
}
fn default_cutoff() -> f64 {
    5.0
}
fn default_until() -> f64 {
    f64::INFINITY
}
fn default_thermostat_variant() -> String {
    "classic".to_string()
}
fn default_max_temp_delta() -> f64 {
    f64::INFINITY
}

/// Gravity is either a constant applied along the y axis or a full vector.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(untagged)]
pub enum Gravity {
    Constant(f64),
    Vector([f64; 3]),
}

impl Default for Gravity {
    fn default() -> Self {
        Gravity::Constant(0.0)
    }
}

impl Gravity {
    pub fn as_vector(self) -> [f64; 3] {
        match self {
            Gravity::Constant(g) => [0.0, g, 0.0],
            Gravity::Vector(v) => v,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Parameters {
    #[serde(default)]
    pub start_time: f64,
    #[serde(default = "default_delta_t")]
    pub delta_t: f64,
    #[serde(default = "default_end_time")]
    pub end_time: f64,
    /// Plot frequency in iterations.
    #[serde(default = "default_frequency")]
    pub frequency: u64,
    #[serde(default = "default_epsilon")]
    pub epsilon: f64,
    #[serde(default = "default_sigma")]
    pub sigma: f64,
    #[serde(default = "default_domain_size", rename = "domainSize")]
    pub domain_size: [f64; 3],
    #[serde(default = "default_domain_origin", rename = "domainOrigin")]
    pub domain_origin: [f64; 3],
    #[serde(default = "default_cutoff")]
    pub cutoff: f64,
    /// Grid refresh frequency in iterations.
    #[serde(default = "default_frequency", rename = "updateFreq")]
    pub update_freq: u64,
    #[serde(default)]
    pub gravity: Gravity,
    /// Boundary kinds in face order left, right, top, bottom[, front, back].
    #[serde(default)]
    pub boundaries: Vec<String>,
    #[serde(default)]
    pub thermostat: Option<ThermostatSettings>,
}

impl Default for Parameters {
    fn default() -> Self {
        Parameters {
            start_time: 0.0,
            delta_t: default_delta_t(),
            end_time: default_end_time(),
            frequency: default_frequency(),
            epsilon: default_epsilon(),
            sigma: default_sigma(),
            domain_size: default_domain_size(),
            domain_origin: default_domain_origin(),
            cutoff: default_cutoff(),
            update_freq: default_frequency(),
            gravity: Gravity::default(),
            boundaries: Vec::new(),
            thermostat: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ThermostatSettings {
    #[serde(rename = "initialTemp")]
    pub initial_temp: f64,
    /// Defaults to the initial temperature when omitted.
    #[serde(default, rename = "targetTemp")]
    pub target_temp: Option<f64>,
    #[serde(rename = "thermoFreq")]
    pub thermo_freq: u64,
    #[serde(default = "default_max_temp_delta", rename = "maxTempDelta")]
    pub max_temp_delta: f64,
    /// "classic" or "individual".
    #[serde(default = "default_thermostat_variant")]
    pub variant: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TypeParam {
    pub type_id: u32,
    pub epsilon: f64,
    pub sigma: f64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CuboidEntry {
    pub origin: [f64; 3],
    pub dim: [usize; 3],
    pub spacing: f64,
    pub mass: f64,
    pub vel: [f64; 3],
    #[serde(default, rename = "brownVel")]
    pub brown_vel: f64,
    #[serde(default, rename = "brownDim")]
    pub brown_dim: usize,
    #[serde(default = "default_ptype")]
    pub ptype: u32,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SphereEntry {
    pub center: [f64; 3],
    pub radius: usize,
    #[serde(rename = "sphereDim")]
    pub sphere_dim: usize,
    pub spacing: f64,
    pub mass: f64,
    pub vel: [f64; 3],
    #[serde(default, rename = "brownVel")]
    pub brown_vel: f64,
    #[serde(default, rename = "brownDim")]
    pub brown_dim: usize,
    #[serde(default = "default_ptype")]
    pub ptype: u32,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MembraneEntry {
    pub origin: [f64; 3],
    pub width: usize,
    pub height: usize,
    pub spacing: f64,
    pub mass: f64,
    pub vel: [f64; 3],
    pub k: f64,
    pub r0: f64,
    #[serde(default = "default_ptype")]
    pub ptype: u32,
}

fn default_ptype() -> u32 {
    1
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Clusters {
    #[serde(default, rename = "cuboid")]
    pub cuboids: Vec<CuboidEntry>,
    #[serde(default, rename = "sphere")]
    pub spheres: Vec<SphereEntry>,
    #[serde(default, rename = "membrane")]
    pub membranes: Vec<MembraneEntry>,
}

/// Raw per-particle state arrays, `3N` floats for the vector quantities and
/// `N` entries for the scalars.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawParticles {
    #[serde(rename = "PointData")]
    pub point_data: Vec<f64>,
    #[serde(rename = "VelData")]
    pub vel_data: Vec<f64>,
    #[serde(default, rename = "ForceData")]
    pub force_data: Vec<f64>,
    #[serde(default, rename = "OldForceData")]
    pub old_force_data: Vec<f64>,
    #[serde(rename = "MassData")]
    pub mass_data: Vec<f64>,
    #[serde(rename = "TypeData")]
    pub type_data: Vec<u32>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExternalForceEntry {
    pub ids: Vec<usize>,
    pub force: [f64; 3],
    #[serde(default = "default_until")]
    pub until: f64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AnalysisSettings {
    #[serde(rename = "binCount")]
    pub bin_count: [usize; 3],
    pub frequency: u64,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InputDocument {
    #[serde(default)]
    pub parameters: Parameters,
    #[serde(default)]
    pub types: Vec<TypeParam>,
    #[serde(default)]
    pub clusters: Clusters,
    #[serde(default)]
    pub particles: Option<RawParticles>,
    #[serde(default, rename = "stationaryTypes")]
    pub stationary_types: Vec<u32>,
    #[serde(default, rename = "externalForces")]
    pub external_forces: Vec<ExternalForceEntry>,
    #[serde(default)]
    pub analysis: Option<AnalysisSettings>,
}

impl InputDocument {
    /// Loads and validates a document. Any failure here is a configuration
    /// error; the caller logs it and aborts before the loop.
    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path)
            .with_context(|| format!("could not open input file {}", path.display()))?;
        let doc: InputDocument = serde_json::from_reader(BufReader::new(file))
            .with_context(|| format!("malformed input file {}", path.display()))?;
        doc.validate()?;
        Ok(doc)
    }

    pub fn validate(&self) -> Result<()> {
        let p = &self.parameters;
        if p.delta_t <= 0.0 {
            bail!("delta_t must be positive, got {}", p.delta_t);
        }
        if p.end_time <= p.start_time {
            bail!(
                "end_time ({}) must be after start_time ({})",
                p.end_time,
                p.start_time
            );
        }
        if p.cutoff <= 0.0 {
            bail!("cutoff must be positive, got {}", p.cutoff);
        }
        if p.frequency == 0 || p.update_freq == 0 {
            bail!("frequency and updateFreq must be at least 1");
        }

        if !p.boundaries.is_empty() {
            BoundaryConfig::from_names(&p.boundaries)?;
        }

        if let Some(t) = &p.thermostat {
            if t.initial_temp < 0.0 {
                bail!("initialTemp must not be negative");
            }
            if t.max_temp_delta < 0.0 {
                bail!("maxTempDelta must not be negative");
            }
            if t.variant != "classic" && t.variant != "individual" {
                bail!("unknown thermostat variant '{}'", t.variant);
            }
        }

        let mut registered = BTreeSet::new();
        for t in &self.types {
            if t.type_id == 0 {
                bail!("particle type 0 is reserved");
            }
            if !registered.insert(t.type_id) {
                bail!("particle type {} is defined twice", t.type_id);
            }
            if t.epsilon < 0.0 || t.sigma <= 0.0 {
                bail!("type {} has invalid Lennard-Jones parameters", t.type_id);
            }
        }

        let check_type = |ptype: u32, what: &str| -> Result<()> {
            if !registered.is_empty() && !registered.contains(&ptype) {
                bail!("{what} uses unregistered particle type {ptype}");
            }
            Ok(())
        };

        for c in &self.clusters.cuboids {
            if c.spacing <= 0.0 || c.mass <= 0.0 {
                bail!("cuboid cluster needs positive spacing and mass");
            }
            check_type(c.ptype, "cuboid cluster")?;
        }
        for s in &self.clusters.spheres {
            if s.spacing <= 0.0 || s.mass <= 0.0 {
                bail!("sphere cluster needs positive spacing and mass");
            }
            if s.sphere_dim != 2 && s.sphere_dim != 3 {
                bail!("sphereDim must be 2 or 3, got {}", s.sphere_dim);
            }
            check_type(s.ptype, "sphere cluster")?;
        }
        for m in &self.clusters.membranes {
            if m.width == 0 || m.height == 0 {
                bail!("membrane cluster must be at least 1x1");
            }
            if m.spacing <= 0.0 || m.mass <= 0.0 || m.r0 <= 0.0 || m.k < 0.0 {
                bail!("membrane cluster has invalid geometry or spring parameters");
            }
            check_type(m.ptype, "membrane cluster")?;
        }

        if let Some(raw) = &self.particles {
            let n = raw.mass_data.len();
            let vec_ok = |data: &Vec<f64>, name: &str| -> Result<()> {
                if !data.is_empty() && data.len() != 3 * n {
                    bail!(
                        "{name} has {} entries, expected {} for {} particles",
                        data.len(),
                        3 * n,
                        n
                    );
                }
                Ok(())
            };
            if raw.point_data.len() != 3 * n || raw.vel_data.len() != 3 * n {
                bail!(
                    "PointData/VelData sizes do not match MassData ({} particles)",
                    n
                );
            }
            vec_ok(&raw.force_data, "ForceData")?;
            vec_ok(&raw.old_force_data, "OldForceData")?;
            if raw.type_data.len() != n {
                bail!("TypeData has {} entries, expected {}", raw.type_data.len(), n);
            }
            for &t in &raw.type_data {
                check_type(t, "raw particle array")?;
            }
        }

        if let Some(a) = &self.analysis {
            if a.bin_count.iter().any(|&b| b == 0) {
                bail!("analysis binCount entries must be at least 1");
            }
            if a.frequency == 0 {
                bail!("analysis frequency must be at least 1");
            }
        }

        Ok(())
    }
}
