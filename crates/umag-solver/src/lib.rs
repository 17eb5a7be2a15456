//! Finite-element core of the micromagnetic solver.
//!
//! The crate integrates the Landau-Lifshitz-Gilbert equation on a
//! tetrahedral mesh. Each time step linearizes the dynamics in the tangent
//! plane of the magnetization, assembles a sparse system from per-element
//! contributions, and solves it with preconditioned BiCGStab. The
//! demagnetizing field comes from a hierarchical multipole evaluation of
//! the magnetic volume and surface charges, sharpened near the surface by
//! the closed-form potential of each boundary triangle.
//!
//! Module map:
//! - [`elements`]: reference element base, tetrahedron and boundary
//!   triangle with their quadrature physics
//! - [`assembly`]: global sparse system and the element scatter driver
//! - [`linear`]: Jacobi-preconditioned BiCGStab on CSR
//! - [`demag`]: octree multipole solver plus analytic near-field correction
//! - [`materials`]: per-region constants resolved from settings
//! - [`sim`]: simulation state, energies, averages
//! - [`llg`]: the adaptive time stepper

pub mod assembly;
pub mod demag;
pub mod elements;
pub mod error;
pub mod linear;
pub mod llg;
pub mod materials;
pub mod sim;

pub use assembly::SparseSystem;
pub use demag::{DemagSolver, Snapshot};
pub use elements::{ElementBase, Facette, Orientable, Tetra};
pub use error::{Result, SolverError};
pub use linear::{BiCgStab, SolveInfo};
pub use llg::{StepOutcome, TimeStepper};
pub use materials::{MaterialTable, SurfaceMaterial, VolumeMaterial};
pub use sim::Simulation;

/// Vacuum permeability, T·m/A.
pub const MU0: f64 = 4.0e-7 * std::f64::consts::PI;

/// Inverse vacuum permeability, A/(T·m); converts polarization J_s in
/// tesla to magnetization M_s in A/m.
pub const NU0: f64 = 1.0 / MU0;

/// Gyromagnetic constant of the electron, m/(A·s).
pub const GAMMA0: f64 = 2.21e5;
