//! Simulation state: mesh, elements, materials and the demag solver,
//! wired together from the settings.
//!
//! Construction is where all orientation bookkeeping happens. Volume
//! cells become oriented tetrahedra and register their outward face
//! windings; boundary cells become triangles whose signed effective
//! magnetization is resolved against that table, so the surface charge
//! comes out right however the mesh file wound the boundary.

use nalgebra::Vector3;
use umag_io::settings::{InitialMagnetization, Settings};
use umag_io::sol::read_sol;
use umag_mesh::{read_msh, Mesh};

use crate::demag::{DemagSolver, Snapshot};
use crate::elements::facette::{FacetteOrientation, WindingTable};
use crate::elements::{Facette, Orientable, Tetra};
use crate::error::{Result, SolverError};
use crate::materials::MaterialTable;

pub struct Simulation {
    pub mesh: Mesh,
    pub tetras: Vec<Tetra>,
    pub facettes: Vec<Facette>,
    pub materials: MaterialTable,
    pub demag: DemagSolver,
    /// Total magnetic volume, m^3.
    pub volume: f64,
    /// Time carried over from a restart file, zero for a fresh start.
    pub start_time: f64,
}

impl Simulation {
    /// Load the mesh named by the settings, apply the initial
    /// magnetization and build the element lists.
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let mut mesh = read_msh(&settings.mesh.filename, settings.mesh.scaling_factor)?;
        let start_time = init_magnetization(&mut mesh, &settings.initial_magnetization)?;
        let mut sim = Self::build(mesh, settings)?;
        sim.start_time = start_time;
        Ok(sim)
    }

    /// Build the element lists over an already initialized mesh.
    pub fn build(mut mesh: Mesh, settings: &Settings) -> Result<Self> {
        if mesh.volumes.is_empty() {
            return Err(SolverError::EmptyMesh("volume elements"));
        }
        let materials = MaterialTable::resolve(&settings.mesh, &mesh)?;

        let mut tetras = Vec::with_capacity(mesh.volumes.len());
        let mut windings = WindingTable::default();
        for (i, cell) in mesh.volumes.iter().enumerate() {
            let tet = Tetra::new(&mesh.nodes, cell, i)?;
            windings.add_tet(&tet.base.ind, materials.volume(tet.region)?.ms());
            tetras.push(tet);
        }

        let mut facettes = Vec::with_capacity(mesh.surfaces.len());
        for (i, cell) in mesh.surfaces.iter().enumerate() {
            let mut fac = Facette::new(&mesh.nodes, cell, i)?;
            let surface_js = materials.surface(fac.region).js;
            fac.orientate(FacetteOrientation {
                nodes: &mesh.nodes,
                windings: &windings,
                surface_js,
            })?;
            facettes.push(fac);
        }

        for node in &mut mesh.nodes {
            node.make_basis();
        }

        let demag = DemagSolver::new(&mesh, &tetras, &facettes, &settings.demag)?;
        let volume = tetras.iter().map(|t| t.volume).sum();

        Ok(Simulation {
            mesh,
            tetras,
            facettes,
            materials,
            demag,
            volume,
            start_time: 0.0,
        })
    }

    /// Evaluate the demag potential of the chosen snapshot into the
    /// matching node buffer.
    pub fn compute_demag(&mut self, snapshot: Snapshot) -> Result<()> {
        self.demag.compute(
            &mut self.mesh,
            &self.tetras,
            &self.facettes,
            &self.materials,
            snapshot,
        )
    }

    /// Volume average of a nodal vector field over the magnetic body.
    pub fn average<F>(&self, getter: F) -> Vector3<f64>
    where
        F: Fn(&umag_mesh::Node) -> Vector3<f64> + Copy,
    {
        let mut sum = Vector3::zeros();
        for tet in &self.tetras {
            let vals = tet.interpolate(&self.mesh.nodes, getter);
            for (g, val) in vals.iter().enumerate() {
                sum += *val * tet.weight[g];
            }
        }
        sum / self.volume
    }

    pub fn mean_magnetization(&self) -> Vector3<f64> {
        self.average(|n| n.u)
    }

    /// Largest nodal magnetization velocity, used for step control.
    pub fn vmax(&self) -> f64 {
        self.mesh
            .nodes
            .iter()
            .map(|n| n.v.norm())
            .fold(0.0, f64::max)
    }

    /// Energies at the current state: exchange, anisotropy, demag,
    /// Zeeman, in joules.
    pub fn energies(&self, hext: &Vector3<f64>) -> Result<[f64; 4]> {
        let nodes = &self.mesh.nodes;
        let mut e = [0.0; 4];
        for tet in &self.tetras {
            let m = self.materials.volume(tet.region)?;
            e[0] += tet.exchange_energy(nodes, m);
            e[1] += tet.anisotropy_energy(nodes, m);
            e[2] += tet.demag_energy(nodes, m.ms());
            e[3] += tet.zeeman_energy(nodes, m.ms(), hext);
        }
        for fac in &self.facettes {
            let sm = self.materials.surface(fac.region);
            e[1] += fac.anisotropy_energy(nodes, &sm);
            e[2] += fac.demag_energy(nodes);
        }
        Ok(e)
    }

    /// Accept the working magnetization as the new reference state and
    /// rebuild the tangent-plane bases around it.
    pub fn evolve(&mut self) {
        for node in &mut self.mesh.nodes {
            node.evolve();
            node.make_basis();
        }
    }

    /// Roll every node back to the last accepted state.
    pub fn reset(&mut self) {
        for node in &mut self.mesh.nodes {
            node.reset();
        }
    }
}

/// Apply the configured initial magnetization. Returns the time stamp of
/// the restart file, or zero for a uniform start.
pub fn init_magnetization(mesh: &mut Mesh, initial: &InitialMagnetization) -> Result<f64> {
    match initial {
        InitialMagnetization::Uniform { direction } => {
            let dir = Vector3::from(*direction);
            for node in &mut mesh.nodes {
                node.set_magnetization(dir);
            }
            Ok(0.0)
        }
        InitialMagnetization::FromFile { filename } => Ok(read_sol(filename, mesh)?),
    }
}
