//! Per-region material constants.
//!
//! Settings name regions by their Gmsh physical names; the mesh carries
//! numeric region ids. This table resolves names to ids once at load, so
//! element code indexes materials by id only.

use std::collections::HashMap;

use nalgebra::Vector3;
use umag_io::settings::MeshSettings;
use umag_mesh::Mesh;

use crate::error::{Result, SolverError};
use crate::NU0;

/// Constants of one magnetic volume region.
#[derive(Debug, Clone)]
pub struct VolumeMaterial {
    /// Gilbert damping.
    pub alpha: f64,
    /// Exchange stiffness, J/m.
    pub a_ex: f64,
    /// Saturation polarization, T.
    pub js: f64,
    /// Uniaxial anisotropy constant, J/m^3.
    pub k: f64,
    /// Easy axis, unit length.
    pub uk: Vector3<f64>,
}

impl VolumeMaterial {
    /// Saturation magnetization in A/m.
    pub fn ms(&self) -> f64 {
        NU0 * self.js
    }
}

/// Constants of one boundary region. `js < 0` switches the region's
/// surface magnetic charge off.
#[derive(Debug, Clone)]
pub struct SurfaceMaterial {
    pub js: f64,
    /// Surface anisotropy constant, J/m^2.
    pub ks: f64,
    pub uk: Vector3<f64>,
}

impl Default for SurfaceMaterial {
    fn default() -> Self {
        SurfaceMaterial {
            js: 1.0,
            ks: 0.0,
            uk: Vector3::z(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct MaterialTable {
    volumes: HashMap<usize, VolumeMaterial>,
    surfaces: HashMap<usize, SurfaceMaterial>,
}

impl MaterialTable {
    /// Register volume parameters for a region id directly, bypassing
    /// name resolution.
    pub fn insert_volume(&mut self, region: usize, material: VolumeMaterial) {
        self.volumes.insert(region, material);
    }

    /// Register surface parameters for a region id directly.
    pub fn insert_surface(&mut self, region: usize, material: SurfaceMaterial) {
        self.surfaces.insert(region, material);
    }

    /// Resolve every region id used by the mesh against the named
    /// parameter sets in the settings.
    ///
    /// Every volume region must have parameters. Boundary regions without
    /// parameters get the default surface material (no surface
    /// anisotropy, charges kept).
    pub fn resolve(settings: &MeshSettings, mesh: &Mesh) -> Result<Self> {
        let mut volumes = HashMap::new();
        for cell in &mesh.volumes {
            if volumes.contains_key(&cell.region) {
                continue;
            }
            let name = mesh
                .volume_regions
                .get(&cell.region)
                .cloned()
                .unwrap_or_else(|| "unnamed".to_string());
            let prm = settings.volume_regions.get(&name).ok_or_else(|| {
                SolverError::UnknownRegion {
                    id: cell.region,
                    name: name.clone(),
                }
            })?;
            volumes.insert(
                cell.region,
                VolumeMaterial {
                    alpha: prm.alpha,
                    a_ex: prm.a_ex,
                    js: prm.js,
                    k: prm.k,
                    uk: unit_or_z(prm.uk),
                },
            );
        }

        let mut surfaces = HashMap::new();
        for cell in &mesh.surfaces {
            if surfaces.contains_key(&cell.region) {
                continue;
            }
            let material = mesh
                .surface_regions
                .get(&cell.region)
                .and_then(|name| settings.surface_regions.get(name))
                .map(|prm| SurfaceMaterial {
                    js: prm.js,
                    ks: prm.ks,
                    uk: unit_or_z(prm.uk),
                })
                .unwrap_or_default();
            surfaces.insert(cell.region, material);
        }

        Ok(MaterialTable { volumes, surfaces })
    }

    pub fn volume(&self, region: usize) -> Result<&VolumeMaterial> {
        self.volumes.get(&region).ok_or(SolverError::UnknownRegion {
            id: region,
            name: "unnamed".to_string(),
        })
    }

    pub fn surface(&self, region: usize) -> SurfaceMaterial {
        self.surfaces
            .get(&region)
            .cloned()
            .unwrap_or_default()
    }
}

fn unit_or_z(axis: [f64; 3]) -> Vector3<f64> {
    let v = Vector3::new(axis[0], axis[1], axis[2]);
    let n = v.norm();
    if n > 0.0 { v / n } else { Vector3::z() }
}
