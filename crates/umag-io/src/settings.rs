//! Simulation settings, deserialized from a JSON file.
//!
//! The file mirrors the problem setup: a mesh section with per-region
//! material constants, the applied field, the time-integration window and
//! tolerances, and the output configuration. Most sections have usable
//! defaults; only the mesh and time sections are mandatory.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{IoError, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    pub mesh: MeshSettings,
    #[serde(default)]
    pub initial_magnetization: InitialMagnetization,
    /// Uniform applied field in A/m.
    #[serde(default)]
    pub applied_field: [f64; 3],
    #[serde(default)]
    pub spin_transfer: SpinTransfer,
    pub time: TimeSettings,
    #[serde(default)]
    pub solver: SolverSettings,
    #[serde(default)]
    pub demag: DemagSettings,
    #[serde(default)]
    pub outputs: OutputSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeshSettings {
    pub filename: PathBuf,
    /// Multiplies every node coordinate on load; a mesh drawn in
    /// nanometers uses `1e-9`.
    #[serde(default = "one")]
    pub scaling_factor: f64,
    pub volume_regions: BTreeMap<String, VolumeRegionSettings>,
    #[serde(default)]
    pub surface_regions: BTreeMap<String, SurfaceRegionSettings>,
}

/// Material constants of one volume region.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VolumeRegionSettings {
    /// Gilbert damping.
    pub alpha: f64,
    /// Exchange stiffness in J/m.
    #[serde(rename = "A")]
    pub a_ex: f64,
    /// Saturation polarization in T (`Ms = Js / mu0`).
    #[serde(rename = "Js")]
    pub js: f64,
    /// Uniaxial anisotropy constant in J/m^3.
    #[serde(rename = "K", default)]
    pub k: f64,
    /// Easy axis.
    #[serde(default = "z_axis")]
    pub uk: [f64; 3],
}

/// Constants of one boundary region. A negative `Js` switches the
/// region's surface magnetic charge off.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SurfaceRegionSettings {
    #[serde(rename = "Js", default = "one")]
    pub js: f64,
    /// Surface anisotropy constant in J/m^2.
    #[serde(rename = "Ks", default)]
    pub ks: f64,
    #[serde(default = "z_axis")]
    pub uk: [f64; 3],
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InitialMagnetization {
    /// Uniform direction, normalized on application.
    Uniform { direction: [f64; 3] },
    /// Resume from a previously written solution file.
    FromFile { filename: PathBuf },
}

impl Default for InitialMagnetization {
    fn default() -> Self {
        InitialMagnetization::Uniform {
            direction: [0.0, 0.0, 1.0],
        }
    }
}

/// Current-driven torque terms; zero velocity disables them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpinTransfer {
    /// Effective drift velocity along z, m/s.
    #[serde(default)]
    pub uz: f64,
    /// Non-adiabaticity ratio.
    #[serde(default)]
    pub beta: f64,
}

impl Default for SpinTransfer {
    fn default() -> Self {
        SpinTransfer { uz: 0.0, beta: 0.0 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeSettings {
    /// Initial time step in seconds.
    pub dt: f64,
    #[serde(default = "default_dt_min")]
    pub dt_min: f64,
    #[serde(default = "default_dt_max")]
    pub dt_max: f64,
    pub final_time: f64,
    /// Implicitness of the scheme, 0.5 for midpoint.
    #[serde(default = "default_theta")]
    pub theta: f64,
    /// Per-step magnetization increment below which the step grows.
    #[serde(default = "default_du_min")]
    pub du_min: f64,
    /// Per-step magnetization increment above which the step is rejected.
    #[serde(default = "default_du_max")]
    pub du_max: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SolverSettings {
    #[serde(default = "default_max_iter")]
    pub max_iter: usize,
    #[serde(default = "default_tolerance")]
    pub tolerance: f64,
}

impl Default for SolverSettings {
    fn default() -> Self {
        SolverSettings {
            max_iter: default_max_iter(),
            tolerance: default_tolerance(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DemagSettings {
    /// Multipole acceptance ratio; smaller is more accurate.
    #[serde(default = "default_mac")]
    pub theta: f64,
    #[serde(default = "default_leaf_capacity")]
    pub leaf_capacity: usize,
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,
}

impl Default for DemagSettings {
    fn default() -> Self {
        DemagSettings {
            theta: default_mac(),
            leaf_capacity: default_leaf_capacity(),
            max_depth: default_max_depth(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputSettings {
    #[serde(default = "default_directory")]
    pub directory: PathBuf,
    #[serde(default = "default_basename")]
    pub file_basename: String,
    /// Accepted steps between solution snapshots; 0 disables them.
    #[serde(default = "default_save_period")]
    pub save_period: usize,
    #[serde(default)]
    pub vtk: bool,
}

impl Default for OutputSettings {
    fn default() -> Self {
        OutputSettings {
            directory: default_directory(),
            file_basename: default_basename(),
            save_period: default_save_period(),
            vtk: false,
        }
    }
}

fn one() -> f64 {
    1.0
}
fn z_axis() -> [f64; 3] {
    [0.0, 0.0, 1.0]
}
fn default_dt_min() -> f64 {
    1e-18
}
fn default_dt_max() -> f64 {
    1e-10
}
fn default_theta() -> f64 {
    0.5
}
fn default_du_min() -> f64 {
    1e-9
}
fn default_du_max() -> f64 {
    0.02
}
fn default_max_iter() -> usize {
    500
}
fn default_tolerance() -> f64 {
    1e-8
}
fn default_mac() -> f64 {
    0.6
}
fn default_leaf_capacity() -> usize {
    32
}
fn default_max_depth() -> usize {
    16
}
fn default_directory() -> PathBuf {
    PathBuf::from(".")
}
fn default_basename() -> String {
    "umag".to_string()
}
fn default_save_period() -> usize {
    100
}

impl Settings {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let bytes = fs::read(path)?;
        let settings: Settings = serde_json::from_slice(&bytes)?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn from_json(text: &str) -> Result<Self> {
        let settings: Settings = serde_json::from_str(text)?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        if self.mesh.scaling_factor <= 0.0 {
            return Err(IoError::Settings("scaling_factor must be positive".into()));
        }
        if self.mesh.volume_regions.is_empty() {
            return Err(IoError::Settings(
                "at least one volume region is required".into(),
            ));
        }
        if let InitialMagnetization::Uniform { direction } = &self.initial_magnetization {
            let norm2: f64 = direction.iter().map(|c| c * c).sum();
            if norm2 <= 0.0 {
                return Err(IoError::Settings(
                    "initial magnetization direction must be nonzero".into(),
                ));
            }
        }
        let t = &self.time;
        if !(t.dt > 0.0 && t.final_time > 0.0) {
            return Err(IoError::Settings("dt and final_time must be positive".into()));
        }
        if !(t.dt_min <= t.dt && t.dt <= t.dt_max) {
            return Err(IoError::Settings(format!(
                "dt {} outside [dt_min, dt_max] = [{}, {}]",
                t.dt, t.dt_min, t.dt_max
            )));
        }
        if !(0.0..=1.0).contains(&t.theta) {
            return Err(IoError::Settings("theta must lie in [0, 1]".into()));
        }
        if !(t.du_min > 0.0 && t.du_min < t.du_max) {
            return Err(IoError::Settings(
                "du_min must be positive and below du_max".into(),
            ));
        }
        if self.solver.max_iter == 0 || self.solver.tolerance <= 0.0 {
            return Err(IoError::Settings(
                "solver max_iter and tolerance must be positive".into(),
            ));
        }
        let d = &self.demag;
        if !(d.theta > 0.0 && d.theta < 1.0) {
            return Err(IoError::Settings(
                "demag theta must lie strictly between 0 and 1".into(),
            ));
        }
        if d.leaf_capacity == 0 || d.max_depth == 0 {
            return Err(IoError::Settings(
                "demag leaf_capacity and max_depth must be positive".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"{
        "mesh": {
            "filename": "cube.msh",
            "scaling_factor": 1e-9,
            "volume_regions": {
                "magnet": { "alpha": 0.05, "A": 1.3e-11, "Js": 1.0 }
            }
        },
        "time": { "dt": 1e-14, "final_time": 1e-11 }
    }"#;

    #[test]
    fn minimal_settings_fill_defaults() {
        let s = Settings::from_json(MINIMAL).unwrap();
        assert_eq!(s.mesh.scaling_factor, 1e-9);
        let mag = s.mesh.volume_regions.get("magnet").unwrap();
        assert_eq!(mag.k, 0.0);
        assert_eq!(mag.uk, [0.0, 0.0, 1.0]);
        assert_eq!(s.applied_field, [0.0, 0.0, 0.0]);
        assert_eq!(s.solver.max_iter, 500);
        assert_eq!(s.time.theta, 0.5);
        assert_eq!(s.time.du_max, 0.02);
        assert!(matches!(
            s.initial_magnetization,
            InitialMagnetization::Uniform { direction: [0.0, 0.0, 1.0] }
        ));
        assert!(!s.outputs.vtk);
    }

    #[test]
    fn full_settings_roundtrip() {
        let s = Settings::from_json(MINIMAL).unwrap();
        let text = serde_json::to_string_pretty(&s).unwrap();
        let back = Settings::from_json(&text).unwrap();
        assert_eq!(back.time.dt, s.time.dt);
        assert_eq!(back.mesh.filename, s.mesh.filename);
    }

    #[test]
    fn tagged_initial_magnetization_variants() {
        let uniform = r#"{ "type": "uniform", "direction": [1, 0, 0] }"#;
        let m: InitialMagnetization = serde_json::from_str(uniform).unwrap();
        assert!(matches!(m, InitialMagnetization::Uniform { .. }));

        let restart = r#"{ "type": "from_file", "filename": "run_0042.sol" }"#;
        let m: InitialMagnetization = serde_json::from_str(restart).unwrap();
        assert!(matches!(m, InitialMagnetization::FromFile { .. }));
    }

    #[test]
    fn rejects_nonpositive_dt() {
        let bad = MINIMAL.replace("\"dt\": 1e-14", "\"dt\": 0.0");
        assert!(matches!(
            Settings::from_json(&bad),
            Err(IoError::Settings(_))
        ));
    }

    #[test]
    fn rejects_theta_out_of_range() {
        let bad = MINIMAL.replace(
            "\"time\": { \"dt\": 1e-14, \"final_time\": 1e-11 }",
            "\"time\": { \"dt\": 1e-14, \"final_time\": 1e-11, \"theta\": 1.5 }",
        );
        assert!(matches!(
            Settings::from_json(&bad),
            Err(IoError::Settings(_))
        ));
    }

    #[test]
    fn rejects_missing_volume_regions() {
        let mut s = Settings::from_json(MINIMAL).unwrap();
        s.mesh.volume_regions.clear();
        assert!(matches!(s.validate(), Err(IoError::Settings(_))));
    }
}
