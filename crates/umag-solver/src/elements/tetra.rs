//! First-order tetrahedral element.
//!
//! Carries the 5-point degree-3 quadrature rule, the constant P1 shape
//! gradients, and the per-step local integration of the linearized
//! dynamics: damping and precession mass terms per quadrature point, the
//! implicit exchange stiffness, and the field terms on the right-hand
//! side. Volume magnetic charges for the demagnetizing solver and the
//! four energy densities are computed here as well.

use nalgebra::{Matrix3, Vector3};
use umag_mesh::{Node, VolumeCell};

use crate::elements::{gather, interpolate_scalars, interpolate_vectors, ElementBase, Orientable};
use crate::error::{Result, SolverError};
use crate::materials::VolumeMaterial;
use crate::{GAMMA0, MU0};

const SIXTH: f64 = 1.0 / 6.0;

/// Shape-function values at the quadrature points, `A[node][point]`.
/// Point 0 is the barycenter, points 1..5 put weight 1/2 on one vertex.
const A: [[f64; 5]; 4] = [
    [0.25, 0.5, SIXTH, SIXTH, SIXTH],
    [0.25, SIXTH, 0.5, SIXTH, SIXTH],
    [0.25, SIXTH, SIXTH, 0.5, SIXTH],
    [0.25, SIXTH, SIXTH, SIXTH, 0.5],
];

/// Reference weights; the barycenter carries a negative one. They sum to
/// one and are scaled by the element volume.
const W: [f64; 5] = [-0.8, 0.45, 0.45, 0.45, 0.45];

/// Per-step integration parameters shared by all elements.
#[derive(Debug, Clone, Copy)]
pub struct StepParams {
    pub dt: f64,
    /// Implicitness of the scheme, 0.5 for midpoint.
    pub theta: f64,
    /// Uniform applied field, A/m.
    pub hext: Vector3<f64>,
    /// Spin-drift velocity along z, m/s; zero disables the torque terms.
    pub uz: f64,
    /// Non-adiabaticity ratio of the spin torque.
    pub beta: f64,
}

#[derive(Debug, Clone)]
pub struct Tetra {
    pub base: ElementBase<4>,
    /// Mesh region id.
    pub region: usize,
    /// Position in the mesh volume list, for diagnostics.
    pub index: usize,
    pub volume: f64,
    /// Absolute quadrature weights; they sum to the volume.
    pub weight: [f64; 5],
    /// Constant P1 shape gradients, one per node.
    da: [Vector3<f64>; 4],
}

impl Tetra {
    pub const N: usize = 4;
    pub const NPI: usize = 5;

    /// Build one element from a mesh cell: normalize the connectivity,
    /// fix the orientation, precompute gradients and weights.
    pub fn new(nodes: &[Node], cell: &VolumeCell, index: usize) -> Result<Self> {
        let mut base = ElementBase::new(cell.ind);
        base.normalize_indices()?;
        let mut tet = Tetra {
            base,
            region: cell.region,
            index,
            volume: 0.0,
            weight: [0.0; 5],
            da: [Vector3::zeros(); 4],
        };
        tet.orientate(nodes)?;
        tet.setup_geometry(nodes)?;
        Ok(tet)
    }

    fn setup_geometry(&mut self, nodes: &[Node]) -> Result<()> {
        let p = gather(&self.base.ind, nodes, |n| n.position);
        let edges = Matrix3::from_columns(&[p[1] - p[0], p[2] - p[0], p[3] - p[0]]);
        let vol = edges.determinant() / 6.0;

        let h = longest_edge(&p);
        if vol <= 1e-12 * h * h * h {
            return Err(SolverError::DegenerateElement {
                kind: "tetrahedron",
                index: self.index,
            });
        }
        let inv = edges
            .try_inverse()
            .ok_or(SolverError::DegenerateElement {
                kind: "tetrahedron",
                index: self.index,
            })?;

        // rows of the inverse edge matrix are the gradients of the last
        // three barycentric coordinates
        for i in 0..3 {
            self.da[i + 1] = inv.row(i).transpose();
        }
        self.da[0] = -(self.da[1] + self.da[2] + self.da[3]);

        self.volume = vol;
        for j in 0..Self::NPI {
            self.weight[j] = vol * W[j];
        }
        Ok(())
    }

    /// Evaluate a per-node vector field at the quadrature points.
    pub fn interpolate<F>(&self, nodes: &[Node], getter: F) -> [Vector3<f64>; 5]
    where
        F: Fn(&Node) -> Vector3<f64>,
    {
        interpolate_vectors(&A, &gather(&self.base.ind, nodes, getter))
    }

    /// Physical coordinates of the quadrature points.
    pub fn gauss_points(&self, nodes: &[Node]) -> [Vector3<f64>; 5] {
        self.interpolate(nodes, |n| n.position)
    }

    /// Spatial gradient of a per-node vector field; constant over the
    /// element. Entry `d` is the derivative along axis `d`.
    fn field_gradient(&self, values: &[Vector3<f64>; 4]) -> [Vector3<f64>; 3] {
        std::array::from_fn(|d| {
            let mut g = Vector3::zeros();
            for i in 0..4 {
                g += self.da[i][d] * values[i];
            }
            g
        })
    }

    fn scalar_gradient(&self, values: &[f64; 4]) -> Vector3<f64> {
        let mut g = Vector3::zeros();
        for i in 0..4 {
            g += self.da[i] * values[i];
        }
        g
    }

    /// Fill the local matrix and vector for one linearized time step.
    ///
    /// The unknown is the magnetization rate expressed in each node's
    /// tangent basis. Damping and precession integrate per quadrature
    /// point; the exchange term is exact for constant P1 gradients and
    /// enters the matrix with the implicitness weight `theta * dt`. The
    /// demagnetizing field uses the potential of the current state plus
    /// the rate correction from the previous step.
    pub fn integrales(
        &mut self,
        nodes: &[Node],
        m: &VolumeMaterial,
        prm: &StepParams,
    ) {
        self.base.clear_local();

        let c_ex = 2.0 * m.a_ex / m.js;
        let kbis = 2.0 * m.k / m.js;

        let ind = self.base.ind;
        let u_nod = gather(&ind, nodes, |n| n.u0);
        let ep = gather(&ind, nodes, |n| n.ep);
        let eq = gather(&ind, nodes, |n| n.eq);
        let u_g = interpolate_vectors(&A, &u_nod);
        let grad_u = self.field_gradient(&u_nod);

        let gphi = self.scalar_gradient(&gather(&ind, nodes, |n| n.phi));
        let gphi_v = self.scalar_gradient(&gather(&ind, nodes, |n| n.phi_v));
        let hd = -(gphi + prm.theta * prm.dt * gphi_v);

        for g in 0..Self::NPI {
            let w = self.weight[g];
            let u = u_g[g];

            let mut h = prm.hext + hd;
            if m.k != 0.0 {
                h += kbis * m.uk.dot(&u) * m.uk;
            }
            let mut r = GAMMA0 * h;
            if prm.uz != 0.0 {
                let dzu = grad_u[2];
                r += -prm.uz * dzu + prm.beta * prm.uz * u.cross(&dzu);
            }

            for i in 0..Self::N {
                let ai = A[i][g] * w;
                self.base.lp[i] += ai * r.dot(&eq[i]);
                self.base.lp[Self::N + i] += ai * r.dot(&ep[i]);

                for j in 0..Self::N {
                    let aij = ai * A[j][g];
                    let kq = |trial: &Vector3<f64>, test: &Vector3<f64>| {
                        aij * (m.alpha * trial.dot(test) + u.dot(&trial.cross(test)))
                    };
                    self.base.kp[(i, j)] += kq(&ep[j], &eq[i]);
                    self.base.kp[(i, Self::N + j)] += kq(&eq[j], &eq[i]);
                    self.base.kp[(Self::N + i, j)] += kq(&ep[j], &ep[i]);
                    self.base.kp[(Self::N + i, Self::N + j)] += kq(&eq[j], &ep[i]);
                }
            }
        }

        // exchange: gradients are constant, integrate exactly
        let re = GAMMA0 * c_ex * self.volume;
        let cg = prm.theta * prm.dt * re;
        for i in 0..Self::N {
            let gi = grad_u[0] * self.da[i].x + grad_u[1] * self.da[i].y + grad_u[2] * self.da[i].z;
            self.base.lp[i] -= re * gi.dot(&eq[i]);
            self.base.lp[Self::N + i] -= re * gi.dot(&ep[i]);

            for j in 0..Self::N {
                let dd = cg * self.da[i].dot(&self.da[j]);
                self.base.kp[(i, j)] += dd * ep[j].dot(&eq[i]);
                self.base.kp[(i, Self::N + j)] += dd * eq[j].dot(&eq[i]);
                self.base.kp[(Self::N + i, j)] += dd * ep[j].dot(&ep[i]);
                self.base.kp[(Self::N + i, Self::N + j)] += dd * eq[j].dot(&ep[i]);
            }
        }
    }

    /// Volume magnetic charges at the quadrature points, appended in
    /// point order: `q = -Ms div(u) * weight`.
    pub fn charges<F>(&self, nodes: &[Node], ms: f64, getter: F, out: &mut Vec<f64>)
    where
        F: Fn(&Node) -> Vector3<f64>,
    {
        let vals = gather(&self.base.ind, nodes, getter);
        let g = self.field_gradient(&vals);
        let div = g[0].x + g[1].y + g[2].z;
        for w in self.weight {
            out.push(-ms * div * w);
        }
    }

    pub fn exchange_energy(&self, nodes: &[Node], m: &VolumeMaterial) -> f64 {
        let u_nod = gather(&self.base.ind, nodes, |n| n.u);
        let g = self.field_gradient(&u_nod);
        let dens: f64 = g.iter().map(|v| v.norm_squared()).sum();
        m.a_ex * dens * self.volume
    }

    pub fn anisotropy_energy(&self, nodes: &[Node], m: &VolumeMaterial) -> f64 {
        if m.k == 0.0 {
            return 0.0;
        }
        let u_g = self.interpolate(nodes, |n| n.u);
        let mut e = 0.0;
        for g in 0..Self::NPI {
            let al = m.uk.dot(&u_g[g]);
            e += self.weight[g] * (-m.k * al * al);
        }
        e
    }

    pub fn demag_energy(&self, nodes: &[Node], ms: f64) -> f64 {
        let u_nod = gather(&self.base.ind, nodes, |n| n.u);
        let g = self.field_gradient(&u_nod);
        let q = -ms * (g[0].x + g[1].y + g[2].z);
        let phi_g = interpolate_scalars(&A, &gather(&self.base.ind, nodes, |n| n.phi));
        let mut e = 0.0;
        for j in 0..Self::NPI {
            e += self.weight[j] * 0.5 * MU0 * q * phi_g[j];
        }
        e
    }

    pub fn zeeman_energy(&self, nodes: &[Node], ms: f64, hext: &Vector3<f64>) -> f64 {
        let u_g = self.interpolate(nodes, |n| n.u);
        let mut e = 0.0;
        for j in 0..Self::NPI {
            e += self.weight[j] * (-MU0 * ms * u_g[j].dot(hext));
        }
        e
    }
}

impl Orientable for Tetra {
    type Context<'a> = &'a [Node];

    /// A negative signed volume swaps the last two vertices.
    fn orientate(&mut self, nodes: &[Node]) -> Result<()> {
        let p = gather(&self.base.ind, nodes, |n| n.position);
        let signed = (p[1] - p[0]).cross(&(p[2] - p[0])).dot(&(p[3] - p[0])) / 6.0;
        if signed < 0.0 {
            self.base.ind.swap(2, 3);
        }
        Ok(())
    }
}

fn longest_edge(p: &[Vector3<f64>; 4]) -> f64 {
    let mut h: f64 = 0.0;
    for i in 0..4 {
        for j in (i + 1)..4 {
            h = h.max((p[j] - p[i]).norm());
        }
    }
    h
}

#[cfg(test)]
mod tests {
    use super::*;
    use umag_mesh::Mesh;

    fn unit_tet_nodes() -> Vec<Node> {
        [
            [0.0, 0.0, 0.0],
            [1.0, 0.0, 0.0],
            [0.0, 1.0, 0.0],
            [0.0, 0.0, 1.0],
        ]
        .iter()
        .map(|p| {
            let mut n = Node::new(Vector3::new(p[0], p[1], p[2]));
            n.set_magnetization(Vector3::new(0.0, 0.0, 1.0));
            n.make_basis();
            n
        })
        .collect()
    }

    fn material() -> VolumeMaterial {
        VolumeMaterial {
            alpha: 0.1,
            a_ex: 1e-11,
            js: 1.0,
            k: 0.0,
            uk: Vector3::z(),
        }
    }

    fn cell(ind: [usize; 4]) -> VolumeCell {
        VolumeCell { ind, region: 300 }
    }

    #[test]
    fn unit_tet_geometry() {
        let nodes = unit_tet_nodes();
        let tet = Tetra::new(&nodes, &cell([1, 2, 3, 4]), 0).unwrap();
        assert!((tet.volume - 1.0 / 6.0).abs() < 1e-15);
        let wsum: f64 = tet.weight.iter().sum();
        assert!((wsum - tet.volume).abs() < 1e-15);
        // gradient of the first barycentric coordinate
        assert!((tet.da[0] - Vector3::new(-1.0, -1.0, -1.0)).norm() < 1e-14);
    }

    #[test]
    fn negative_volume_is_reoriented() {
        let nodes = unit_tet_nodes();
        // swapped last two vertices give a negative signed volume
        let tet = Tetra::new(&nodes, &cell([1, 2, 4, 3]), 0).unwrap();
        assert!(tet.volume > 0.0);
        let mut sorted = tet.base.ind;
        sorted.sort_unstable();
        assert_eq!(sorted, [0, 1, 2, 3]);
    }

    #[test]
    fn coplanar_vertices_are_degenerate() {
        let mut nodes = unit_tet_nodes();
        nodes[3] = Node::new(Vector3::new(0.5, 0.5, 0.0));
        assert!(matches!(
            Tetra::new(&nodes, &cell([1, 2, 3, 4]), 7),
            Err(SolverError::DegenerateElement {
                kind: "tetrahedron",
                index: 7
            })
        ));
    }

    #[test]
    fn linear_field_interpolates_exactly() {
        let nodes = unit_tet_nodes();
        let tet = Tetra::new(&nodes, &cell([1, 2, 3, 4]), 0).unwrap();
        // f(p) = (2x, -y, 3z) is linear, so quadrature points are exact
        let vals = tet.interpolate(&nodes, |n| {
            Vector3::new(2.0 * n.position.x, -n.position.y, 3.0 * n.position.z)
        });
        let pts = tet.gauss_points(&nodes);
        for (v, p) in vals.iter().zip(pts.iter()) {
            let expect = Vector3::new(2.0 * p.x, -p.y, 3.0 * p.z);
            assert!((v - expect).norm() < 1e-14);
        }
    }

    #[test]
    fn uniform_magnetization_has_no_volume_charge() {
        let nodes = unit_tet_nodes();
        let tet = Tetra::new(&nodes, &cell([1, 2, 3, 4]), 0).unwrap();
        let mut q = Vec::new();
        tet.charges(&nodes, 8e5, |n| n.u, &mut q);
        assert_eq!(q.len(), 5);
        for v in q {
            assert!(v.abs() < 1e-10);
        }
    }

    #[test]
    fn uniform_state_zero_field_gives_zero_rhs() {
        let nodes = unit_tet_nodes();
        let mut tet = Tetra::new(&nodes, &cell([1, 2, 3, 4]), 0).unwrap();
        let prm = StepParams {
            dt: 1e-13,
            theta: 0.5,
            hext: Vector3::zeros(),
            uz: 0.0,
            beta: 0.0,
        };
        tet.integrales(&nodes, &material(), &prm);
        for i in 0..8 {
            assert!(tet.base.lp[i].abs() < 1e-15);
            // damping puts positive mass on the diagonal
            assert!(tet.base.kp[(i, diag_col(i))] > 0.0);
        }
    }

    // diagonal of the damping mass term: row i tests eq_i whose trial
    // column is N+i, row N+i tests ep_i whose trial column is i
    fn diag_col(i: usize) -> usize {
        if i < 4 { 4 + i } else { i - 4 }
    }

    #[test]
    fn zeeman_energy_of_uniform_state_is_exact() {
        let nodes = unit_tet_nodes();
        let tet = Tetra::new(&nodes, &cell([1, 2, 3, 4]), 0).unwrap();
        let ms = 8e5;
        let h = Vector3::new(0.0, 0.0, 1e4);
        let e = tet.zeeman_energy(&nodes, ms, &h);
        let expect = -MU0 * ms * 1e4 * tet.volume;
        assert!((e - expect).abs() < 1e-9 * expect.abs());
    }

    #[test]
    fn exchange_energy_vanishes_for_uniform_state() {
        let nodes = unit_tet_nodes();
        let tet = Tetra::new(&nodes, &cell([1, 2, 3, 4]), 0).unwrap();
        assert!(tet.exchange_energy(&nodes, &material()).abs() < 1e-25);
    }

    #[test]
    fn mesh_connectivity_feeds_construction() {
        // all four volume cells of a five-node double tetrahedron
        let mut mesh = Mesh::default();
        for n in unit_tet_nodes() {
            mesh.nodes.push(n);
        }
        mesh.nodes.push({
            let mut n = Node::new(Vector3::new(1.0, 1.0, 1.0));
            n.set_magnetization(Vector3::z());
            n.make_basis();
            n
        });
        let tets = [
            Tetra::new(&mesh.nodes, &cell([1, 2, 3, 4]), 0).unwrap(),
            Tetra::new(&mesh.nodes, &cell([2, 5, 3, 4]), 1).unwrap(),
        ];
        assert!(tets.iter().all(|t| t.volume > 0.0));
    }
}
