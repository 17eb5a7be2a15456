//! Solver error taxonomy.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, SolverError>;

#[derive(Error, Debug)]
pub enum SolverError {
    #[error(transparent)]
    Mesh(#[from] umag_mesh::MeshError),

    #[error(transparent)]
    Io(#[from] umag_io::IoError),

    /// Zero or near-zero element measure; fails at load, before stepping.
    #[error("degenerate {kind} {index}: measure too small for its extent")]
    DegenerateElement { kind: &'static str, index: usize },

    /// `normalize_indices` called twice on the same element.
    #[error("element indices already normalized")]
    AlreadyNormalized,

    /// A zero index in connectivity that claims to be one-based.
    #[error("node index 0 in one-based connectivity")]
    IndexUnderflow,

    /// A mesh region with no parameters in the settings.
    #[error("volume region {id} ({name}) has no material parameters")]
    UnknownRegion { id: usize, name: String },

    #[error("linear solver stalled after {iterations} iterations, residual {residual:.3e}")]
    NoConvergence { iterations: usize, residual: f64 },

    /// The adaptive loop ran out of retries shrinking the time step.
    #[error("time step rejected down to dt = {dt:.3e} s after {attempts} attempts")]
    StepRejected { attempts: usize, dt: f64 },

    #[error("mesh has no {0}")]
    EmptyMesh(&'static str),

    /// Scatter landed outside the global system; connectivity and system
    /// size disagree.
    #[error("assembly index outside the global system")]
    IndexOutOfBounds,

    /// A node that belongs to no element leaves its rows empty.
    #[error("zero diagonal at system row {0}; a node belongs to no element")]
    ZeroDiagonal(usize),
}
