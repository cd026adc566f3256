//! Frame writers: VTK unstructured grids, plain XYZ, or nothing.

use crate::particle::ParticleContainer;
use anyhow::{Context, Result};
use chrono::Utc;
use std::fmt::Write as _;
use std::fs;
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriterKind {
    Vtk,
    Xyz,
    None,
}

/// Writes one frame per call, named `<prefix>_<iteration:04>.<ext>`.
/// Only active particles are emitted.
#[derive(Debug, Clone)]
pub struct Writer {
    kind: WriterKind,
    prefix: String,
}

impl Writer {
    pub fn new(kind: WriterKind, prefix: impl Into<String>) -> Self {
        Writer {
            kind,
            prefix: prefix.into(),
        }
    }

    pub fn kind(&self) -> WriterKind {
        self.kind
    }

    pub fn frame_path(&self, iteration: u64) -> PathBuf {
        let ext = match self.kind {
            WriterKind::Vtk => "vtu",
            WriterKind::Xyz => "xyz",
            WriterKind::None => "out",
        };
        PathBuf::from(format!("{}_{:04}.{ext}", self.prefix, iteration))
    }

    pub fn write(&self, container: &ParticleContainer, iteration: u64) -> Result<()> {
        let body = match self.kind {
            WriterKind::None => return Ok(()),
            WriterKind::Vtk => vtk_frame(container),
            WriterKind::Xyz => xyz_frame(container, iteration),
        };
        let path = self.frame_path(iteration);
        fs::write(&path, body)
            .with_context(|| format!("could not write frame to {}", path.display()))?;
        Ok(())
    }
}

fn vtk_frame(container: &ParticleContainer) -> String {
    let n = container.active_count();
    let mut out = String::new();

    let _ = writeln!(out, r#"<?xml version="1.0"?>"#);
    let _ = writeln!(
        out,
        r#"<VTKFile type="UnstructuredGrid" version="0.1" byte_order="LittleEndian">"#
    );
    let _ = writeln!(out, "  <UnstructuredGrid>");
    let _ = writeln!(
        out,
        r#"    <Piece NumberOfPoints="{n}" NumberOfCells="0">"#
    );

    let _ = writeln!(out, "      <PointData>");
    let _ = writeln!(
        out,
        r#"        <DataArray type="Float32" Name="mass" format="ascii">"#
    );
    for p in container.active() {
        let _ = writeln!(out, "          {}", p.m as f32);
    }
    let _ = writeln!(out, "        </DataArray>");
    let _ = writeln!(
        out,
        r#"        <DataArray type="Float32" Name="velocity" NumberOfComponents="3" format="ascii">"#
    );
    for p in container.active() {
        let _ = writeln!(
            out,
            "          {} {} {}",
            p.v.x as f32, p.v.y as f32, p.v.z as f32
        );
    }
    let _ = writeln!(out, "        </DataArray>");
    let _ = writeln!(
        out,
        r#"        <DataArray type="Float32" Name="force" NumberOfComponents="3" format="ascii">"#
    );
    for p in container.active() {
        let _ = writeln!(
            out,
            "          {} {} {}",
            p.f.x as f32, p.f.y as f32, p.f.z as f32
        );
    }
    let _ = writeln!(out, "        </DataArray>");
    let _ = writeln!(
        out,
        r#"        <DataArray type="Int32" Name="type" format="ascii">"#
    );
    for p in container.active() {
        let _ = writeln!(out, "          {}", p.ptype);
    }
    let _ = writeln!(out, "        </DataArray>");
    let _ = writeln!(out, "      </PointData>");

    let _ = writeln!(out, "      <CellData/>");
    let _ = writeln!(out, "      <Points>");
    let _ = writeln!(
        out,
        r#"        <DataArray type="Float32" Name="points" NumberOfComponents="3" format="ascii">"#
    );
    for p in container.active() {
        let _ = writeln!(
            out,
            "          {} {} {}",
            p.x.x as f32, p.x.y as f32, p.x.z as f32
        );
    }
    let _ = writeln!(out, "        </DataArray>");
    let _ = writeln!(out, "      </Points>");

    // paraview expects the cell arrays even for a pure point cloud
    let _ = writeln!(out, "      <Cells>");
    let _ = writeln!(
        out,
        r#"        <DataArray type="Int32" Name="connectivity" format="ascii"/>"#
    );
    let _ = writeln!(
        out,
        r#"        <DataArray type="Int32" Name="offsets" format="ascii"/>"#
    );
    let _ = writeln!(
        out,
        r#"        <DataArray type="UInt8" Name="types" format="ascii"/>"#
    );
    let _ = writeln!(out, "      </Cells>");

    let _ = writeln!(out, "    </Piece>");
    let _ = writeln!(out, "  </UnstructuredGrid>");
    let _ = writeln!(out, "</VTKFile>");
    out
}

fn xyz_frame(container: &ParticleContainer, iteration: u64) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{}", container.active_count());
    let _ = writeln!(
        out,
        "moldyn frame, iteration {iteration}, written {}",
        Utc::now().to_rfc3339()
    );
    for p in container.active() {
        let _ = writeln!(out, "{} {} {} {}", p.ptype, p.x.x, p.x.y, p.x.z);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::particle::Particle;
    use glam::DVec3;
    use std::fs;

    fn sample_container() -> ParticleContainer {
        let mut c = ParticleContainer::from_particles(vec![
            Particle::new(DVec3::new(1.0, 2.0, 3.0), DVec3::new(0.5, 0.0, 0.0), 2.0, 1),
            Particle::new(DVec3::new(4.0, 5.0, 6.0), DVec3::ZERO, 1.0, 2),
            Particle::new(DVec3::new(7.0, 8.0, 9.0), DVec3::ZERO, 1.0, 1),
        ]);
        c.remove(1);
        c
    }

    #[test]
    fn vtk_frame_lists_active_particles() {
        let dir = std::env::temp_dir().join("moldyn_vtk_writer_test");
        fs::create_dir_all(&dir).unwrap();
        let prefix = dir.join("frame").to_string_lossy().into_owned();

        let writer = Writer::new(WriterKind::Vtk, &prefix);
        let container = sample_container();
        writer.write(&container, 30).unwrap();

        let path = writer.frame_path(30);
        assert!(path.to_string_lossy().ends_with("frame_0030.vtu"));
        let content = fs::read_to_string(&path).unwrap();
        assert!(content.contains(r#"NumberOfPoints="2""#));
        assert!(content.contains("1 2 3"));
        assert!(content.contains("7 8 9"));
        // the removed particle does not show up
        assert!(!content.contains("4 5 6"));

        fs::remove_file(path).unwrap();
    }

    #[test]
    fn xyz_frame_has_count_comment_and_rows() {
        let dir = std::env::temp_dir().join("moldyn_xyz_writer_test");
        fs::create_dir_all(&dir).unwrap();
        let prefix = dir.join("frame").to_string_lossy().into_owned();

        let writer = Writer::new(WriterKind::Xyz, &prefix);
        let container = sample_container();
        writer.write(&container, 7).unwrap();

        let content = fs::read_to_string(writer.frame_path(7)).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines[0], "2");
        assert!(lines[1].contains("iteration 7"));
        assert_eq!(lines.len(), 4);
        assert!(lines[2].starts_with("1 1 2 3"));

        fs::remove_file(writer.frame_path(7)).unwrap();
    }

    #[test]
    fn none_writer_writes_nothing() {
        let writer = Writer::new(WriterKind::None, "/nonexistent/dir/frame");
        let container = sample_container();
        writer.write(&container, 1).unwrap();
    }
}
