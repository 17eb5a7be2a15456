//! VTK legacy export for visualization.
//!
//! Writes an ASCII `UNSTRUCTURED_GRID` file: point coordinates, the
//! tetrahedral cells (VTK cell type 10), then the scalar potential and the
//! magnetization as point data. ParaView opens the result directly.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use umag_mesh::Mesh;

use crate::error::Result;

const VTK_TETRA: usize = 10;

pub struct VtkWriter<'a> {
    mesh: &'a Mesh,
}

impl<'a> VtkWriter<'a> {
    pub fn new(mesh: &'a Mesh) -> Self {
        VtkWriter { mesh }
    }

    /// Write the current node state at simulation time `time`.
    ///
    /// Coordinates are written in meters. Connectivity in the file is
    /// zero-based as VTK requires; the mesh stores it one-based.
    pub fn write(&self, path: &Path, time: f64) -> Result<()> {
        let mut out = BufWriter::new(File::create(path)?);
        self.write_header(&mut out, time)?;
        self.write_points(&mut out)?;
        self.write_cells(&mut out)?;
        self.write_point_data(&mut out)?;
        Ok(())
    }

    fn write_header(&self, out: &mut impl Write, time: f64) -> Result<()> {
        writeln!(out, "# vtk DataFile Version 2.0")?;
        writeln!(out, "time : {time:+.10e}")?;
        writeln!(out, "ASCII")?;
        writeln!(out, "DATASET UNSTRUCTURED_GRID")?;
        Ok(())
    }

    fn write_points(&self, out: &mut impl Write) -> Result<()> {
        writeln!(out, "POINTS {} float", self.mesh.nodes.len())?;
        for n in &self.mesh.nodes {
            let p = n.position;
            writeln!(out, "{:+.10e} {:+.10e} {:+.10e}", p.x, p.y, p.z)?;
        }
        Ok(())
    }

    fn write_cells(&self, out: &mut impl Write) -> Result<()> {
        let ntet = self.mesh.volumes.len();
        writeln!(out, "CELLS {} {}", ntet, 5 * ntet)?;
        for cell in &self.mesh.volumes {
            writeln!(
                out,
                "4 {} {} {} {}",
                cell.ind[0] - 1,
                cell.ind[1] - 1,
                cell.ind[2] - 1,
                cell.ind[3] - 1
            )?;
        }
        writeln!(out, "CELL_TYPES {ntet}")?;
        for _ in 0..ntet {
            writeln!(out, "{VTK_TETRA}")?;
        }
        Ok(())
    }

    fn write_point_data(&self, out: &mut impl Write) -> Result<()> {
        writeln!(out, "POINT_DATA {}", self.mesh.nodes.len())?;
        writeln!(out, "SCALARS phi float 1")?;
        writeln!(out, "LOOKUP_TABLE default")?;
        for n in &self.mesh.nodes {
            writeln!(out, "{:+.10e}", n.phi)?;
        }
        writeln!(out, "VECTORS u float")?;
        for n in &self.mesh.nodes {
            writeln!(out, "{:+.10e} {:+.10e} {:+.10e}", n.u.x, n.u.y, n.u.z)?;
        }
        Ok(())
    }
}
