//! Mesh container: node store plus raw element connectivity.
//!
//! Connectivity is kept exactly as read from the mesh file, i.e. one-based.
//! The solver's element types perform the one-shot zero-based normalization
//! when they are constructed, so the conversion happens in exactly one
//! place.

use std::collections::BTreeMap;

use nalgebra::Vector3;

use crate::error::{MeshError, Result};
use crate::node::Node;

/// Tetrahedron connectivity as read from the mesh file (one-based).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VolumeCell {
    pub ind: [usize; 4],
    pub region: usize,
}

/// Boundary triangle connectivity as read from the mesh file (one-based).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SurfaceCell {
    pub ind: [usize; 3],
    pub region: usize,
}

/// A loaded mesh: nodes with state, raw cells, and region names keyed by
/// physical id.
#[derive(Debug, Clone, Default)]
pub struct Mesh {
    pub nodes: Vec<Node>,
    pub volumes: Vec<VolumeCell>,
    pub surfaces: Vec<SurfaceCell>,
    /// Physical names of dimension-3 regions.
    pub volume_regions: BTreeMap<usize, String>,
    /// Physical names of dimension-2 regions.
    pub surface_regions: BTreeMap<usize, String>,
}

/// Summary counts and extents, for run logs.
#[derive(Debug, Clone)]
pub struct MeshStatistics {
    pub num_nodes: usize,
    pub num_volume_elements: usize,
    pub num_surface_elements: usize,
    pub diameter: f64,
    pub center: Vector3<f64>,
}

impl Mesh {
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Axis-aligned bounding box of the node cloud.
    pub fn bounding_box(&self) -> Result<(Vector3<f64>, Vector3<f64>)> {
        let first = self.nodes.first().ok_or(MeshError::Empty("nodes"))?;
        let mut lo = first.position;
        let mut hi = first.position;
        for n in &self.nodes {
            for d in 0..3 {
                lo[d] = lo[d].min(n.position[d]);
                hi[d] = hi[d].max(n.position[d]);
            }
        }
        Ok((lo, hi))
    }

    /// Center of the bounding box.
    pub fn center(&self) -> Result<Vector3<f64>> {
        let (lo, hi) = self.bounding_box()?;
        Ok(0.5 * (lo + hi))
    }

    /// Largest bounding-box extent, the length that normalizes the demag
    /// octree geometry.
    pub fn diameter(&self) -> Result<f64> {
        let (lo, hi) = self.bounding_box()?;
        let l = hi - lo;
        Ok(l.x.max(l.y).max(l.z))
    }

    /// Check that every cell index is a valid one-based node reference.
    pub fn check_connectivity(&self) -> Result<()> {
        let count = self.nodes.len();
        let check = |ind: &[usize]| -> Result<()> {
            for &i in ind {
                if i == 0 || i > count {
                    return Err(MeshError::NodeIndexOutOfRange { index: i, count });
                }
            }
            Ok(())
        };
        for c in &self.volumes {
            check(&c.ind)?;
        }
        for c in &self.surfaces {
            check(&c.ind)?;
        }
        Ok(())
    }

    pub fn statistics(&self) -> Result<MeshStatistics> {
        Ok(MeshStatistics {
            num_nodes: self.nodes.len(),
            num_volume_elements: self.volumes.len(),
            num_surface_elements: self.surfaces.len(),
            diameter: self.diameter()?,
            center: self.center()?,
        })
    }
}

impl std::fmt::Display for MeshStatistics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "nodes:             {}", self.num_nodes)?;
        writeln!(f, "tetrahedra:        {}", self.num_volume_elements)?;
        writeln!(f, "boundary faces:    {}", self.num_surface_elements)?;
        writeln!(f, "bounding diameter: {:.6e}", self.diameter)?;
        write!(
            f,
            "center:            ({:.6e}, {:.6e}, {:.6e})",
            self.center.x, self.center.y, self.center.z
        )
    }
}
