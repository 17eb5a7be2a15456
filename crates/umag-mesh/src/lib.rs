//! Mesh layer for the micromagnetic solver.
//!
//! This crate provides:
//! - **Node** state: position, double-buffered magnetization, tangent-plane
//!   basis and the scalar magnetostatic potential
//! - **Mesh** container: tetrahedral volume cells and triangular boundary
//!   cells with their physical-region ids and names
//! - **Gmsh reader** for MSH 2.2 ASCII files with coordinate scaling
//!
//! Connectivity is stored one-based, exactly as read from the mesh file.
//! The element layer normalizes indices once when it takes ownership of a
//! cell; see `normalize_indices` there.

pub mod error;
pub mod gmsh;
pub mod mesh;
pub mod node;

pub use error::{MeshError, Result};
pub use gmsh::{parse_msh, read_msh};
pub use mesh::{Mesh, MeshStatistics, SurfaceCell, VolumeCell};
pub use node::Node;
