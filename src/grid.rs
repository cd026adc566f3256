//! The linked-cell grid: a padded 3-D partition of the simulation domain.
//!
//! Inner cells tile the configured domain with an edge length equal to the
//! cutoff radius. One layer of boundary cells rings the inner region and one
//! layer of halo cells rings the boundary layer. A domain with zero extent on
//! the z axis collapses that axis to a single cell layer (2-D mode).

use crate::cell::{Cell, CellEntry, CellIndex, CellKind, Face};
use crate::particle::ParticleContainer;
use glam::DVec3;
use log::warn;

pub struct CellGrid {
    origin: DVec3,
    size: DVec3,
    cutoff: f64,
    dims: [usize; 3],
    cells: Vec<Cell>,
    boundary_by_face: [Vec<usize>; 6],
    halo_by_face: [Vec<usize>; 6],
}

impl CellGrid {
    pub fn new(origin: DVec3, size: DVec3, cutoff: f64) -> Self {
        assert!(cutoff > 0.0, "cutoff radius must be positive");

        let extents = size.to_array();
        let mut dims = [1usize; 3];
        for k in 0..3 {
            if extents[k] == 0.0 {
                // collapsed axis, no padding layers
                dims[k] = 1;
                continue;
            }
            let mut inner = (extents[k] / cutoff).ceil() as isize;
            if inner < 1 {
                warn!(
                    "domain extent {} on axis {} is not positive, using a single cell",
                    extents[k], k
                );
                inner = 1;
            }
            dims[k] = inner as usize + 2;
        }

        let mut grid = CellGrid {
            origin,
            size,
            cutoff,
            dims,
            cells: Vec::with_capacity(dims[0] * dims[1] * dims[2]),
            boundary_by_face: Default::default(),
            halo_by_face: Default::default(),
        };

        for flat in 0..dims[0] * dims[1] * dims[2] {
            let index = grid.to_index(flat);
            let kind = grid.classify(index);
            let mut cell = Cell::new(kind, index);
            cell.faces = grid.faces_of(index, kind);
            grid.cells.push(cell);
        }

        grid.link_neighbours();
        grid.collect_face_slabs();
        grid
    }

    pub fn origin(&self) -> DVec3 {
        self.origin
    }

    pub fn size(&self) -> DVec3 {
        self.size
    }

    pub fn domain_end(&self) -> DVec3 {
        self.origin + self.size
    }

    pub fn cutoff(&self) -> f64 {
        self.cutoff
    }

    pub fn dims(&self) -> [usize; 3] {
        self.dims
    }

    /// 2 for a collapsed z axis, 3 otherwise.
    pub fn dimensionality(&self) -> usize {
        if self.dims[2] == 1 {
            2
        } else {
            3
        }
    }

    pub fn cell_count(&self) -> usize {
        self.cells.len()
    }

    pub fn flat(&self, index: CellIndex) -> usize {
        assert!(
            index[0] < self.dims[0] && index[1] < self.dims[1] && index[2] < self.dims[2],
            "cell index {index:?} outside grid dimensions {:?}",
            self.dims
        );
        self.dims[0] * self.dims[1] * index[2] + self.dims[0] * index[1] + index[0]
    }

    pub fn to_index(&self, flat: usize) -> CellIndex {
        let x = flat % self.dims[0];
        let y = (flat / self.dims[0]) % self.dims[1];
        let z = flat / (self.dims[0] * self.dims[1]);
        [x, y, z]
    }

    pub fn cell(&self, flat: usize) -> &Cell {
        &self.cells[flat]
    }

    pub fn cell_mut(&mut self, flat: usize) -> &mut Cell {
        &mut self.cells[flat]
    }

    pub fn cell_at(&self, index: CellIndex) -> &Cell {
        &self.cells[self.flat(index)]
    }

    pub fn cells(&self) -> &[Cell] {
        &self.cells
    }

    /// Maps a position onto its cell. Positions outside the padded domain
    /// saturate into the halo layer.
    pub fn index_from_position(&self, pos: DVec3) -> CellIndex {
        let p = pos.to_array();
        let o = self.origin.to_array();
        let s = self.size.to_array();
        let mut index = [0usize; 3];
        for k in 0..3 {
            if self.dims[k] == 1 {
                continue;
            }
            index[k] = if p[k] < o[k] {
                0
            } else if p[k] >= o[k] + s[k] {
                self.dims[k] - 1
            } else {
                (((p[k] - o[k]) / self.cutoff) as usize + 1).min(self.dims[k] - 2)
            };
        }
        index
    }

    /// Cell type as a pure function of the index.
    pub fn classify(&self, index: CellIndex) -> CellKind {
        for k in 0..3 {
            if self.dims[k] == 1 {
                continue;
            }
            if index[k] == 0 || index[k] == self.dims[k] - 1 {
                return CellKind::Halo;
            }
        }
        for k in 0..3 {
            if self.dims[k] == 1 {
                continue;
            }
            if index[k] == 1 || index[k] == self.dims[k] - 2 {
                return CellKind::Boundary;
            }
        }
        CellKind::Inner
    }

    fn faces_of(&self, index: CellIndex, kind: CellKind) -> Vec<Face> {
        let mut faces = Vec::new();
        let layer_offset = match kind {
            CellKind::Halo => 0,
            CellKind::Boundary => 1,
            CellKind::Inner => return faces,
        };
        for face in Face::ALL {
            let k = face.axis();
            if self.dims[k] == 1 {
                continue;
            }
            let layer = if face.is_max() {
                self.dims[k] - 1 - layer_offset
            } else {
                layer_offset
            };
            if index[k] == layer {
                faces.push(face);
            }
        }
        faces.sort();
        faces
    }

    fn link_neighbours(&mut self) {
        let dims = self.dims;
        for flat in 0..self.cells.len() {
            let index = self.to_index(flat);
            let mut neighbours = Vec::new();
            let mut halo_neighbours = Vec::new();
            let mut stencil = Vec::new();
            let own_kind = self.cells[flat].kind;

            for dz in -1i64..=1 {
                for dy in -1i64..=1 {
                    for dx in -1i64..=1 {
                        if dx == 0 && dy == 0 && dz == 0 {
                            continue;
                        }
                        let nx = index[0] as i64 + dx;
                        let ny = index[1] as i64 + dy;
                        let nz = index[2] as i64 + dz;
                        if nx < 0
                            || ny < 0
                            || nz < 0
                            || nx >= dims[0] as i64
                            || ny >= dims[1] as i64
                            || nz >= dims[2] as i64
                        {
                            continue;
                        }
                        let nflat = self.flat([nx as usize, ny as usize, nz as usize]);
                        neighbours.push(nflat);
                        let nkind = self.cells[nflat].kind;
                        if nkind == CellKind::Halo {
                            halo_neighbours.push(nflat);
                        }
                        // forward half-space: every unordered pair of non-halo
                        // cells shows up in exactly one stencil
                        let forward = dz > 0
                            || (dz == 0 && dy > 0)
                            || (dz == 0 && dy == 0 && dx > 0);
                        if forward && own_kind != CellKind::Halo && nkind != CellKind::Halo {
                            stencil.push(nflat);
                        }
                    }
                }
            }

            let cell = &mut self.cells[flat];
            cell.neighbours = neighbours;
            cell.halo_neighbours = halo_neighbours;
            cell.stencil = stencil;
        }
    }

    fn collect_face_slabs(&mut self) {
        let mut boundary_by_face: [Vec<usize>; 6] = Default::default();
        let mut halo_by_face: [Vec<usize>; 6] = Default::default();
        for (flat, cell) in self.cells.iter().enumerate() {
            for &face in &cell.faces {
                match cell.kind {
                    CellKind::Boundary => boundary_by_face[face as usize].push(flat),
                    CellKind::Halo => halo_by_face[face as usize].push(flat),
                    CellKind::Inner => {}
                }
            }
        }
        self.boundary_by_face = boundary_by_face;
        self.halo_by_face = halo_by_face;
    }

    /// Boundary cells abutting the given face.
    pub fn boundary_cells(&self, face: Face) -> &[usize] {
        &self.boundary_by_face[face as usize]
    }

    /// Halo cells of the slab at the given face.
    pub fn halo_cells(&self, face: Face) -> &[usize] {
        &self.halo_by_face[face as usize]
    }

    /// Places a container particle into the cell covering its position.
    pub fn add_body(&mut self, id: usize, pos: DVec3) {
        let flat = self.flat(self.index_from_position(pos));
        self.cells[flat].push(CellEntry::Body(id));
    }

    /// Fills the grid from every active particle of the container.
    pub fn populate(&mut self, container: &ParticleContainer) {
        for p in container.active() {
            self.add_body(p.id(), p.x);
        }
    }

    /// Reassigns every referenced particle to the cell covering its current
    /// position and drops references to inactive particles. Idempotent when
    /// nothing moved.
    pub fn update_cells(&mut self, container: &ParticleContainer) {
        let mut moves: Vec<(usize, usize, usize)> = Vec::new();
        let mut drops: Vec<(usize, usize)> = Vec::new();

        for (flat, cell) in self.cells.iter().enumerate() {
            for id in cell.bodies() {
                let p = container.get(id);
                if !p.is_active() {
                    drops.push((flat, id));
                    continue;
                }
                let target = self.flat(self.index_from_position(p.x));
                if target != flat {
                    moves.push((flat, id, target));
                }
            }
        }

        for (flat, id) in drops {
            self.cells[flat].remove_body(id);
        }
        for (from, id, to) in moves {
            self.cells[from].remove_body(id);
            self.cells[to].push(CellEntry::Body(id));
        }
    }

    /// Container particles in the given cell and its surrounding cells.
    ///
    /// Indexing outside the grid is a programming error and panics.
    pub fn neighboring_particles(&self, index: CellIndex) -> Vec<usize> {
        let flat = self.flat(index);
        let mut ids: Vec<usize> = self.cells[flat].bodies().collect();
        for &n in &self.cells[flat].neighbours {
            ids.extend(self.cells[n].bodies());
        }
        ids
    }
}
