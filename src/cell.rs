//! Cells of the linked-cell grid and the domain face geometry.

use glam::DVec3;
use std::fmt;

/// 3-D index of a cell within the grid.
pub type CellIndex = [usize; 3];

/// One of the six faces of the simulation domain.
///
/// Min faces sit at the domain origin, max faces at origin + size:
/// Left/Right on x, Bottom/Top on y, Back/Front on z.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Face {
    Left,
    Right,
    Bottom,
    Top,
    Back,
    Front,
}

impl Face {
    pub const ALL: [Face; 6] = [
        Face::Left,
        Face::Right,
        Face::Bottom,
        Face::Top,
        Face::Back,
        Face::Front,
    ];

    /// Axis the face is orthogonal to (0 = x, 1 = y, 2 = z).
    pub fn axis(self) -> usize {
        match self {
            Face::Left | Face::Right => 0,
            Face::Bottom | Face::Top => 1,
            Face::Back | Face::Front => 2,
        }
    }

    /// Whether the face sits at the upper end of its axis.
    pub fn is_max(self) -> bool {
        matches!(self, Face::Right | Face::Top | Face::Front)
    }

    /// Outward unit normal.
    pub fn normal(self) -> DVec3 {
        let mut n = [0.0; 3];
        n[self.axis()] = if self.is_max() { 1.0 } else { -1.0 };
        DVec3::from_array(n)
    }
}

impl fmt::Display for Face {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Face::Left => "left",
            Face::Right => "right",
            Face::Bottom => "bottom",
            Face::Top => "top",
            Face::Back => "back",
            Face::Front => "front",
        };
        write!(f, "{name}")
    }
}

/// Classification of a cell within the padded grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CellKind {
    Inner,
    Boundary,
    Halo,
}

/// A cell holds references to container particles by id, or to short-lived
/// ghost particles by index into the boundary ghost pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CellEntry {
    Body(usize),
    Ghost(usize),
}

/// A single node of the cell grid.
///
/// Neighbor topology is precomputed at grid construction: `neighbours` holds
/// every adjacent cell, `halo_neighbours` the adjacent halo cells (read-only
/// ghost sources for the force sweep) and `stencil` the half-space subset of
/// non-halo neighbors that makes the pair sweep visit every unordered cell
/// pair exactly once.
#[derive(Debug)]
pub struct Cell {
    pub kind: CellKind,
    pub index: CellIndex,
    /// Domain faces this cell abuts; empty for inner cells.
    pub faces: Vec<Face>,
    entries: Vec<CellEntry>,
    pub neighbours: Vec<usize>,
    pub halo_neighbours: Vec<usize>,
    pub stencil: Vec<usize>,
}

impl Cell {
    pub fn new(kind: CellKind, index: CellIndex) -> Self {
        Cell {
            kind,
            index,
            faces: Vec::new(),
            entries: Vec::new(),
            neighbours: Vec::new(),
            halo_neighbours: Vec::new(),
            stencil: Vec::new(),
        }
    }

    pub fn entries(&self) -> &[CellEntry] {
        &self.entries
    }

    pub fn push(&mut self, entry: CellEntry) {
        self.entries.push(entry);
    }

    /// Removes a body reference; the entry may be absent (no-op then).
    pub fn remove_body(&mut self, id: usize) {
        self.entries.retain(|e| *e != CellEntry::Body(id));
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Ids of container particles in this cell.
    pub fn bodies(&self) -> impl Iterator<Item = usize> + '_ {
        self.entries.iter().filter_map(|e| match e {
            CellEntry::Body(id) => Some(*id),
            CellEntry::Ghost(_) => None,
        })
    }

    /// Ghost-pool indices referenced by this cell.
    pub fn ghosts(&self) -> impl Iterator<Item = usize> + '_ {
        self.entries.iter().filter_map(|e| match e {
            CellEntry::Ghost(i) => Some(*i),
            CellEntry::Body(_) => None,
        })
    }

    /// Drops ghost references but keeps container particles.
    pub fn clear_ghosts(&mut self) {
        self.entries.retain(|e| matches!(e, CellEntry::Body(_)));
    }

    pub fn on_face(&self, face: Face) -> bool {
        self.faces.contains(&face)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn face_normals_point_outward() {
        assert_eq!(Face::Left.normal(), DVec3::new(-1.0, 0.0, 0.0));
        assert_eq!(Face::Right.normal(), DVec3::new(1.0, 0.0, 0.0));
        assert_eq!(Face::Bottom.normal(), DVec3::new(0.0, -1.0, 0.0));
        assert_eq!(Face::Top.normal(), DVec3::new(0.0, 1.0, 0.0));
        assert_eq!(Face::Back.normal(), DVec3::new(0.0, 0.0, -1.0));
        assert_eq!(Face::Front.normal(), DVec3::new(0.0, 0.0, 1.0));
    }

    #[test]
    fn cell_tracks_bodies_and_ghosts() {
        let mut cell = Cell::new(CellKind::Boundary, [1, 1, 1]);
        cell.push(CellEntry::Body(3));
        cell.push(CellEntry::Ghost(0));
        cell.push(CellEntry::Body(7));
        assert_eq!(cell.bodies().collect::<Vec<_>>(), vec![3, 7]);
        cell.remove_body(3);
        assert_eq!(cell.entries().len(), 2);
        cell.remove_body(3);
        assert_eq!(cell.entries().len(), 2);
        cell.clear();
        assert!(cell.is_empty());
    }
}
