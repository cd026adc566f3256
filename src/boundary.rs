//! Per-face boundary conditions: outflow, soft-reflective and periodic.
//!
//! Each active face owns one policy. Policies run as pre-step hooks (inject
//! ghost mirrors and periodic images into halo cells) and post-step hooks
//! (delete outflow escapees, translate periodic crossings). Within one step
//! the pre hooks of all faces commute, as do the post hooks: ghosts inserted
//! for one face never land in cells another face reads, and outflow deletion
//! and periodic translation touch disjoint particles.

use crate::cell::{CellEntry, CellIndex, CellKind, Face};
use crate::grid::CellGrid;
use crate::particle::{Particle, ParticleContainer};
use anyhow::{bail, Result};
use glam::DVec3;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoundaryKind {
    Outflow,
    SoftReflective,
    Periodic,
}

impl BoundaryKind {
    pub fn parse(name: &str) -> Result<Self> {
        match name {
            "outflow" => Ok(BoundaryKind::Outflow),
            "soft-reflective" => Ok(BoundaryKind::SoftReflective),
            "periodic" => Ok(BoundaryKind::Periodic),
            other => bail!("unknown boundary kind '{other}'"),
        }
    }
}

/// Mapping from the active faces to their boundary kinds. A 2-D configuration
/// has four faces (left, right, top, bottom), a 3-D one six.
#[derive(Debug, Clone)]
pub struct BoundaryConfig {
    map: BTreeMap<Face, BoundaryKind>,
}

impl BoundaryConfig {
    /// Builds a config from the ordered name list of the input file:
    /// left, right, top, bottom and, in 3-D, front, back.
    pub fn from_names(names: &[String]) -> Result<Self> {
        const ORDER: [Face; 6] = [
            Face::Left,
            Face::Right,
            Face::Top,
            Face::Bottom,
            Face::Front,
            Face::Back,
        ];
        if names.len() != 4 && names.len() != 6 {
            bail!(
                "boundary list must name 4 (2-D) or 6 (3-D) faces, got {}",
                names.len()
            );
        }
        let mut map = BTreeMap::new();
        for (face, name) in ORDER.iter().zip(names) {
            map.insert(*face, BoundaryKind::parse(name)?);
        }
        Ok(BoundaryConfig { map })
    }

    pub fn uniform(kind: BoundaryKind, dimensionality: usize) -> Self {
        let mut map = BTreeMap::new();
        for face in Face::ALL {
            if dimensionality == 2 && face.axis() == 2 {
                continue;
            }
            map.insert(face, kind);
        }
        BoundaryConfig { map }
    }

    pub fn dimensionality(&self) -> usize {
        if self.map.len() == 6 {
            3
        } else {
            2
        }
    }

    pub fn kind(&self, face: Face) -> Option<BoundaryKind> {
        self.map.get(&face).copied()
    }

    pub fn faces(&self) -> impl Iterator<Item = (Face, BoundaryKind)> + '_ {
        self.map.iter().map(|(f, k)| (*f, *k))
    }
}

/// Pool of short-lived ghost particles, rebuilt every step.
///
/// Ghosts are recycled in place: `reset` rewinds the cursor, `acquire`
/// overwrites stale slots before growing, and `finish` truncates whatever
/// the current step did not reuse.
#[derive(Debug, Default)]
pub struct GhostPool {
    ghosts: Vec<Particle>,
    cursor: usize,
}

impl GhostPool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&mut self) {
        self.cursor = 0;
    }

    pub fn acquire(&mut self, x: DVec3, m: f64, ptype: u32) -> usize {
        let index = self.cursor;
        if index < self.ghosts.len() {
            let g = &mut self.ghosts[index];
            g.x = x;
            g.v = DVec3::ZERO;
            g.f = DVec3::ZERO;
            g.old_f = DVec3::ZERO;
            g.m = m;
            g.ptype = ptype;
        } else {
            self.ghosts.push(Particle::new(x, DVec3::ZERO, m, ptype));
        }
        self.cursor += 1;
        index
    }

    pub fn finish(&mut self) {
        self.ghosts.truncate(self.cursor);
    }

    pub fn get(&self, index: usize) -> &Particle {
        &self.ghosts[index]
    }

    pub fn len(&self) -> usize {
        self.cursor
    }

    pub fn is_empty(&self) -> bool {
        self.cursor == 0
    }
}

/// Positional and cell-index translation for one periodic image.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Shift {
    pub dx: DVec3,
    pub di: [i64; 3],
}

enum Policy {
    Outflow,
    SoftReflective,
    Periodic {
        /// Image translations per set of periodic faces of the owning cell,
        /// precomputed once: every non-empty subset of the faces (singles,
        /// pairs, triples).
        table: BTreeMap<Vec<Face>, Vec<Shift>>,
    },
}

pub struct BoundaryHandler {
    rules: Vec<(Face, Policy)>,
    config: BoundaryConfig,
}

impl BoundaryHandler {
    pub fn new(config: BoundaryConfig, grid: &CellGrid) -> Self {
        let mut rules = Vec::new();
        for (face, kind) in config.faces() {
            let policy = match kind {
                BoundaryKind::Outflow => Policy::Outflow,
                BoundaryKind::SoftReflective => Policy::SoftReflective,
                BoundaryKind::Periodic => Policy::Periodic {
                    table: Self::build_translation_table(face, &config, grid),
                },
            };
            rules.push((face, policy));
        }
        BoundaryHandler { rules, config }
    }

    pub fn dimensionality(&self) -> usize {
        self.config.dimensionality()
    }

    pub fn config(&self) -> &BoundaryConfig {
        &self.config
    }

    /// Positional and index shift that maps a particle at one face to its
    /// image on the opposite side of the domain.
    fn face_shift(face: Face, grid: &CellGrid) -> Shift {
        let axis = face.axis();
        let sign: i64 = if face.is_max() { 1 } else { -1 };
        let dx = -face.normal() * grid.size().to_array()[axis];
        let mut di = [0i64; 3];
        di[axis] = -sign * (grid.dims()[axis] as i64 - 2);
        Shift { dx, di }
    }

    /// Periodic faces of a boundary cell, in sorted face order.
    fn periodic_faces(config: &BoundaryConfig, faces: &[Face]) -> Vec<Face> {
        faces
            .iter()
            .copied()
            .filter(|f| config.kind(*f) == Some(BoundaryKind::Periodic))
            .collect()
    }

    fn build_translation_table(
        face: Face,
        config: &BoundaryConfig,
        grid: &CellGrid,
    ) -> BTreeMap<Vec<Face>, Vec<Shift>> {
        let mut table: BTreeMap<Vec<Face>, Vec<Shift>> = BTreeMap::new();
        for &flat in grid.boundary_cells(face) {
            let pfaces = Self::periodic_faces(config, &grid.cell(flat).faces);
            // edge and corner cells are owned by their first periodic face
            if pfaces.first() != Some(&face) || table.contains_key(&pfaces) {
                continue;
            }
            let mut shifts = Vec::new();
            for mask in 1u32..(1 << pfaces.len()) {
                let mut combined = Shift {
                    dx: DVec3::ZERO,
                    di: [0; 3],
                };
                for (bit, &f) in pfaces.iter().enumerate() {
                    if mask & (1 << bit) != 0 {
                        let s = Self::face_shift(f, grid);
                        combined.dx += s.dx;
                        for k in 0..3 {
                            combined.di[k] += s.di[k];
                        }
                    }
                }
                shifts.push(combined);
            }
            table.insert(pfaces, shifts);
        }
        table
    }

    /// Runs all pre-step hooks: rebuilds the ghost population of the halo
    /// layer for reflective and periodic faces.
    pub fn pre_update(
        &self,
        grid: &mut CellGrid,
        container: &ParticleContainer,
        ghosts: &mut GhostPool,
    ) {
        ghosts.reset();
        for (face, policy) in &self.rules {
            match policy {
                Policy::Outflow => {}
                Policy::SoftReflective => {
                    self.pre_soft_reflective(*face, grid, container, ghosts)
                }
                Policy::Periodic { table } => {
                    self.pre_periodic(*face, table, grid, container, ghosts)
                }
            }
        }
        ghosts.finish();
    }

    fn pre_soft_reflective(
        &self,
        face: Face,
        grid: &mut CellGrid,
        container: &ParticleContainer,
        ghosts: &mut GhostPool,
    ) {
        // stale mirrors of the previous step
        let halos: Vec<usize> = grid.halo_cells(face).to_vec();
        for flat in halos {
            grid.cell_mut(flat).clear_ghosts();
        }

        let axis = face.axis();
        let plane = if face.is_max() {
            grid.domain_end().to_array()[axis]
        } else {
            grid.origin().to_array()[axis]
        };
        let halo_layer = if face.is_max() { grid.dims()[axis] - 1 } else { 0 };

        let mut inserts: Vec<(usize, usize)> = Vec::new();
        for &bflat in grid.boundary_cells(face) {
            let cell = grid.cell(bflat);
            for id in cell.bodies() {
                let p = container.get(id);
                if !p.is_active() {
                    continue;
                }
                let mut mirrored = p.x.to_array();
                mirrored[axis] = 2.0 * plane - mirrored[axis];
                let mut halo_index: CellIndex = cell.index;
                halo_index[axis] = halo_layer;
                let ghost = ghosts.acquire(DVec3::from_array(mirrored), p.m, p.ptype);
                inserts.push((grid.flat(halo_index), ghost));
            }
        }
        for (flat, ghost) in inserts {
            grid.cell_mut(flat).push(CellEntry::Ghost(ghost));
        }
    }

    fn pre_periodic(
        &self,
        face: Face,
        table: &BTreeMap<Vec<Face>, Vec<Shift>>,
        grid: &mut CellGrid,
        container: &ParticleContainer,
        ghosts: &mut GhostPool,
    ) {
        let mut inserts: Vec<(usize, usize)> = Vec::new();
        for &bflat in grid.boundary_cells(face) {
            let cell = grid.cell(bflat);
            let pfaces = Self::periodic_faces(&self.config, &cell.faces);
            if pfaces.first() != Some(&face) {
                continue;
            }
            let shifts = table.get(&pfaces).unwrap_or_else(|| {
                panic!("missing translation entry for periodic cell {:?}", cell.index)
            });
            for id in cell.bodies() {
                let p = container.get(id);
                if !p.is_active() {
                    continue;
                }
                for shift in shifts {
                    let mut target: CellIndex = [0; 3];
                    for k in 0..3 {
                        target[k] = (cell.index[k] as i64 + shift.di[k]) as usize;
                    }
                    let ghost = ghosts.acquire(p.x + shift.dx, p.m, p.ptype);
                    inserts.push((grid.flat(target), ghost));
                }
            }
        }
        for (flat, ghost) in inserts {
            grid.cell_mut(flat).push(CellEntry::Ghost(ghost));
        }
    }

    /// Runs all post-step hooks: outflow deletion and periodic translation.
    pub fn post_update(&self, grid: &mut CellGrid, container: &mut ParticleContainer) {
        for (face, policy) in &self.rules {
            match policy {
                Policy::Outflow => Self::post_outflow(*face, grid, container),
                Policy::SoftReflective => {}
                Policy::Periodic { .. } => Self::post_periodic(*face, grid, container),
            }
        }
    }

    fn post_outflow(face: Face, grid: &mut CellGrid, container: &mut ParticleContainer) {
        let halos: Vec<usize> = grid.halo_cells(face).to_vec();
        for flat in halos {
            let ids: Vec<usize> = grid.cell(flat).bodies().collect();
            for id in ids {
                container.remove(id);
            }
            grid.cell_mut(flat).clear();
        }
    }

    fn post_periodic(face: Face, grid: &mut CellGrid, container: &mut ParticleContainer) {
        // ghost images of this face die with the step
        let halos: Vec<usize> = grid.halo_cells(face).to_vec();
        for flat in halos {
            grid.cell_mut(flat).clear_ghosts();
        }

        let axis = face.axis();
        let shift = -face.normal() * grid.size().to_array()[axis];
        let boundary: Vec<usize> = grid.boundary_cells(face).to_vec();
        let mut moves: Vec<(usize, usize, usize)> = Vec::new();

        for bflat in boundary {
            let ids: Vec<usize> = grid.cell(bflat).bodies().collect();
            for id in ids {
                let pos = container.get(id).x;
                let index = grid.index_from_position(pos);
                if grid.classify(index) != CellKind::Halo {
                    continue;
                }
                // only translate crossings through this face; a corner exit
                // is handled one face at a time
                if !grid.cell_at(index).on_face(face) {
                    continue;
                }
                let p = container.get_mut(id);
                p.x += shift;
                let target = grid.index_from_position(p.x);
                if grid.classify(target) != CellKind::Halo {
                    // back inside the domain, reassign immediately
                    moves.push((bflat, id, grid.flat(target)));
                }
            }
        }

        for (from, id, to) in moves {
            grid.cell_mut(from).remove_body(id);
            grid.cell_mut(to).push(CellEntry::Body(id));
        }
    }
}
