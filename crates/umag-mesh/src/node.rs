//! Mesh node with magnetization state.
//!
//! Each node carries a double-buffered magnetization (`u0` = last accepted
//! state, `u` = working state), the magnetization rate `v` resolved by the
//! time-step solve, the magnetostatic scalar potentials for both snapshots,
//! and the tangent-plane basis `(ep, eq)` in which the linearized update is
//! expressed.

use nalgebra::Vector3;

#[derive(Debug, Clone)]
pub struct Node {
    /// Physical position (already scaled to meters by the mesh reader).
    pub position: Vector3<f64>,
    /// Magnetization at the last accepted time step (unit vector).
    pub u0: Vector3<f64>,
    /// Working magnetization (unit vector).
    pub u: Vector3<f64>,
    /// Magnetization rate du/dt from the last solve (1/s).
    pub v: Vector3<f64>,
    /// Magnetostatic scalar potential for the `u` snapshot.
    pub phi: f64,
    /// Magnetostatic scalar potential for the `v` snapshot.
    pub phi_v: f64,
    /// First tangent-plane basis vector, orthogonal to `u0`.
    pub ep: Vector3<f64>,
    /// Second tangent-plane basis vector, `u0 x ep`.
    pub eq: Vector3<f64>,
}

impl Node {
    pub fn new(position: Vector3<f64>) -> Self {
        Node {
            position,
            u0: Vector3::zeros(),
            u: Vector3::zeros(),
            v: Vector3::zeros(),
            phi: 0.0,
            phi_v: 0.0,
            ep: Vector3::zeros(),
            eq: Vector3::zeros(),
        }
    }

    /// Set both magnetization buffers to the same unit vector.
    pub fn set_magnetization(&mut self, m: Vector3<f64>) {
        let m = m.normalize();
        self.u0 = m;
        self.u = m;
    }

    /// Rebuild the tangent-plane basis from `u0`.
    ///
    /// The seed axis is the coordinate axis least aligned with `u0`, which
    /// keeps the cross products well conditioned for any magnetization
    /// direction.
    pub fn make_basis(&mut self) {
        let m = self.u0;
        let a = [m.x.abs(), m.y.abs(), m.z.abs()];
        let k = if a[0] <= a[1] && a[0] <= a[2] {
            Vector3::x()
        } else if a[1] <= a[2] {
            Vector3::y()
        } else {
            Vector3::z()
        };
        self.ep = k.cross(&m).normalize();
        self.eq = m.cross(&self.ep);
    }

    /// Accept the working state: the current magnetization becomes the new
    /// reference for the next step.
    pub fn evolve(&mut self) {
        self.u0 = self.u;
    }

    /// Roll the working state back to the last accepted step.
    pub fn reset(&mut self) {
        self.u = self.u0;
    }
}
