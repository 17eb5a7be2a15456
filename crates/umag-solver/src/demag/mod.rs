//! Demagnetizing-field solver.
//!
//! The scalar potential of the magnetic charge distribution is evaluated
//! in two parts. A Barnes-Hut octree over the element quadrature points
//! handles the smooth far field with multipole expansions; the analytic
//! near-field correction of each boundary triangle replaces the octree's
//! crude view of the triangle at its own vertices with the closed-form
//! single-layer potential.
//!
//! Geometry is normalized once: positions are scaled about the bounding
//! box center so the whole mesh fits strictly inside the octree root box.
//! Charges stay in physical units; the tree potential is rescaled before
//! the correction is added, and the sum is divided by `4 pi`.

pub mod octree;

pub use octree::Octree;

use nalgebra::Vector3;
use rayon::prelude::*;
use umag_io::settings::DemagSettings;
use umag_mesh::{Mesh, Node};

use crate::elements::{Facette, Tetra};
use crate::error::{Result, SolverError};
use crate::materials::MaterialTable;

/// Root box width of the normalized domain. Scaled coordinates fall in
/// (-1, 1) per axis, strictly inside.
const ROOT_WIDTH: f64 = 2.01;

/// Keeps the longest mesh extent just short of the root box faces.
const SCALE_SAFETY: f64 = 0.999999;

/// Which magnetization snapshot feeds the charge densities, and which
/// potential buffer receives the result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Snapshot {
    /// Charges from `u0`, potential into `phi`.
    Current,
    /// Charges from the velocity `v`, potential into `phi_v`.
    Rate,
}

impl Snapshot {
    fn field(self, node: &Node) -> Vector3<f64> {
        match self {
            Snapshot::Current => node.u0,
            Snapshot::Rate => node.v,
        }
    }
}

/// Demagnetizing-field solver over a fixed mesh geometry.
///
/// Construction precomputes the normalization and the scaled source
/// positions (element quadrature points, volume elements first). Each
/// [`compute`](DemagSolver::compute) call gathers fresh charge densities,
/// owns a fresh octree for the duration of the call, and writes one
/// potential per node.
#[derive(Debug, Clone)]
pub struct DemagSolver {
    theta: f64,
    leaf_capacity: usize,
    max_depth: usize,
    scale: f64,
    center: Vector3<f64>,
    sources: Vec<Vector3<f64>>,
}

impl DemagSolver {
    pub fn new(
        mesh: &Mesh,
        tetras: &[Tetra],
        facettes: &[Facette],
        settings: &DemagSettings,
    ) -> Result<Self> {
        let center = mesh.center()?;
        let diam = mesh.diameter()?;
        if diam <= 0.0 {
            return Err(SolverError::EmptyMesh("spatial extent"));
        }
        let scale = 2.0 / diam * SCALE_SAFETY;

        let mut sources =
            Vec::with_capacity(Tetra::NPI * tetras.len() + Facette::NPI * facettes.len());
        for tet in tetras {
            for p in tet.gauss_points(&mesh.nodes) {
                sources.push((p - center) * scale);
            }
        }
        for fac in facettes {
            for p in fac.gauss_points(&mesh.nodes) {
                sources.push((p - center) * scale);
            }
        }

        Ok(DemagSolver {
            theta: settings.theta,
            leaf_capacity: settings.leaf_capacity,
            max_depth: settings.max_depth,
            scale,
            center,
            sources,
        })
    }

    pub fn source_count(&self) -> usize {
        self.sources.len()
    }

    /// Evaluate the scalar potential of the chosen snapshot at every
    /// node and store it in the matching buffer.
    pub fn compute(
        &self,
        mesh: &mut Mesh,
        tetras: &[Tetra],
        facettes: &[Facette],
        materials: &MaterialTable,
        snapshot: Snapshot,
    ) -> Result<()> {
        let (charges, corr) = self.gather(mesh, tetras, facettes, materials, snapshot)?;
        debug_assert_eq!(charges.len(), self.sources.len());

        let mut tree = Octree::new(
            self.sources.clone(),
            Vector3::zeros(),
            ROOT_WIDTH,
            self.theta,
            self.leaf_capacity,
            self.max_depth,
        );
        tree.set_charges(&charges);
        tree.execute();

        let inv4pi = 0.25 / std::f64::consts::PI;
        let nodes = &mesh.nodes;
        let potentials: Vec<f64> = (0..nodes.len())
            .into_par_iter()
            .map(|i| {
                let p = (nodes[i].position - self.center) * self.scale;
                (tree.evaluate(p) * self.scale + corr[i]) * inv4pi
            })
            .collect();

        match snapshot {
            Snapshot::Current => {
                for (node, phi) in mesh.nodes.iter_mut().zip(potentials) {
                    node.phi = phi;
                }
            }
            Snapshot::Rate => {
                for (node, phi) in mesh.nodes.iter_mut().zip(potentials) {
                    node.phi_v = phi;
                }
            }
        }
        Ok(())
    }

    /// Charge densities in source order plus the per-node near-field
    /// correction, both in physical units.
    fn gather(
        &self,
        mesh: &Mesh,
        tetras: &[Tetra],
        facettes: &[Facette],
        materials: &MaterialTable,
        snapshot: Snapshot,
    ) -> Result<(Vec<f64>, Vec<f64>)> {
        let mut charges = Vec::with_capacity(self.sources.len());
        let mut corr = vec![0.0; mesh.nodes.len()];
        for tet in tetras {
            let ms = materials.volume(tet.region)?.ms();
            tet.charges(&mesh.nodes, ms, |n| snapshot.field(n), &mut charges);
        }
        for fac in facettes {
            fac.charges(&mesh.nodes, |n| snapshot.field(n), &mut charges, &mut corr);
        }
        Ok((charges, corr))
    }
}
