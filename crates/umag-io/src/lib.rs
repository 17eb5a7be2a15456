//! File formats around the micromagnetic solver.
//!
//! This crate provides:
//! - **JSON settings**: the full simulation configuration with defaults
//! - **`.sol` snapshots**: per-node magnetization/potential, also the
//!   restart path
//! - **`.evol` time series**: one row per accepted step
//! - **VTK legacy export** for ParaView

pub mod error;
pub mod evol;
pub mod settings;
pub mod sol;
pub mod vtk;

pub use error::{IoError, Result};
pub use evol::{EvolRow, EvolWriter};
pub use settings::{
    DemagSettings, InitialMagnetization, MeshSettings, OutputSettings, Settings, SolverSettings,
    SpinTransfer, SurfaceRegionSettings, TimeSettings, VolumeRegionSettings,
};
pub use sol::{read_sol, write_sol};
pub use vtk::VtkWriter;
