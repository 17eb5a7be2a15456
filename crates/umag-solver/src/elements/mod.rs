//! Finite elements.
//!
//! [`ElementBase`] carries what a tetrahedron and a boundary triangle
//! share: the node index list, the local matrix/vector pair, one-shot
//! index normalization and the scatter into the global system. The
//! concrete elements add their quadrature physics on top.

pub mod facette;
pub mod tetra;

pub use facette::Facette;
pub use tetra::Tetra;

use nalgebra::{DMatrix, DVector, Vector3};
use umag_mesh::Node;

use crate::assembly::SparseSystem;
use crate::error::{Result, SolverError};

/// Shared local state of an element with `N` nodes.
///
/// The local matrix is `2N x 2N` and the local vector `2N`: each node
/// contributes two tangent-plane degrees of freedom. Rows `[0, N)` test
/// against the second basis vector and scatter to global rows offset by
/// the node count; rows `[N, 2N)` test against the first and scatter to
/// the plain node rows. Columns follow the transposed convention, so the
/// four `N x N` quadrants interleave into the two global blocks.
#[derive(Debug, Clone)]
pub struct ElementBase<const N: usize> {
    /// Node indices; one-based as read from the mesh until
    /// [`ElementBase::normalize_indices`] runs.
    pub ind: [usize; N],
    pub kp: DMatrix<f64>,
    pub lp: DVector<f64>,
    normalized: bool,
}

impl<const N: usize> ElementBase<N> {
    pub fn new(ind: [usize; N]) -> Self {
        ElementBase {
            ind,
            kp: DMatrix::zeros(2 * N, 2 * N),
            lp: DVector::zeros(2 * N),
            normalized: false,
        }
    }

    /// Shift one-based mesh connectivity to zero-based, exactly once.
    ///
    /// A second call is a programming error and fails, as does an index
    /// of zero, which cannot be one-based.
    pub fn normalize_indices(&mut self) -> Result<()> {
        if self.normalized {
            return Err(SolverError::AlreadyNormalized);
        }
        if self.ind.iter().any(|&i| i == 0) {
            return Err(SolverError::IndexUnderflow);
        }
        for i in &mut self.ind {
            *i -= 1;
        }
        self.normalized = true;
        Ok(())
    }

    /// Zero the local matrix and vector before a fresh integration pass.
    pub fn clear_local(&mut self) {
        self.kp.fill(0.0);
        self.lp.fill(0.0);
    }

    /// Scatter the local matrix into the global system. `offset` is the
    /// node count, the row/column offset of the second block.
    pub fn assemble_matrix(&self, offset: usize, system: &mut SparseSystem) {
        for i in 0..N {
            let i_ = self.ind[i];
            for j in 0..N {
                let j_ = self.ind[j];
                system.add(offset + i_, j_, self.kp[(i, j)]);
                system.add(offset + i_, offset + j_, self.kp[(i, N + j)]);
                system.add(i_, j_, self.kp[(N + i, j)]);
                system.add(i_, offset + j_, self.kp[(N + i, N + j)]);
            }
        }
    }

    /// Scatter the local vector into the global right-hand side.
    pub fn assemble_vector(&self, offset: usize, system: &mut SparseSystem) {
        for i in 0..N {
            let i_ = self.ind[i];
            system.add_rhs(offset + i_, self.lp[i]);
            system.add_rhs(i_, self.lp[N + i]);
        }
    }
}

/// Orientation fix-up every concrete element performs at setup. The
/// context differs per element kind: a tetrahedron needs only node
/// positions, a boundary triangle needs the winding table of the volume
/// elements around it.
pub trait Orientable {
    type Context<'a>;
    fn orientate(&mut self, ctx: Self::Context<'_>) -> Result<()>;
}

/// Contract per-node vectors with shape-function values: result `j` is
/// the field at quadrature point `j`.
pub(crate) fn interpolate_vectors<const N: usize, const NPI: usize>(
    a: &[[f64; NPI]; N],
    values: &[Vector3<f64>; N],
) -> [Vector3<f64>; NPI] {
    std::array::from_fn(|j| {
        let mut s = Vector3::zeros();
        for i in 0..N {
            s += a[i][j] * values[i];
        }
        s
    })
}

/// Scalar flavor of [`interpolate_vectors`].
pub(crate) fn interpolate_scalars<const N: usize, const NPI: usize>(
    a: &[[f64; NPI]; N],
    values: &[f64; N],
) -> [f64; NPI] {
    std::array::from_fn(|j| (0..N).map(|i| a[i][j] * values[i]).sum())
}

/// Gather a per-node field over the element's nodes.
pub(crate) fn gather<const N: usize, T, F>(ind: &[usize; N], nodes: &[Node], getter: F) -> [T; N]
where
    F: Fn(&Node) -> T,
{
    std::array::from_fn(|i| getter(&nodes[ind[i]]))
}
