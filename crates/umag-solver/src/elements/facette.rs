//! Boundary triangle element.
//!
//! Boundary triangles carry the surface magnetic charge `sigma = Ms (u.n)`
//! feeding the demagnetizing solver, the analytic near-field correction
//! built on the closed-form potential of a linearly varying single layer,
//! and the surface anisotropy contribution to the right-hand side.
//!
//! The effective `Ms` is signed: it compares the triangle's stored winding
//! against the outward-wound faces of the adjoining tetrahedra, so the
//! charge comes out right whichever way the mesh file wound the surface.

use std::collections::HashMap;

use nalgebra::Vector3;
use umag_mesh::{Node, SurfaceCell};

use crate::elements::{gather, interpolate_scalars, interpolate_vectors, ElementBase, Orientable};
use crate::error::{Result, SolverError};
use crate::materials::SurfaceMaterial;
use crate::{GAMMA0, MU0};

const THIRD: f64 = 1.0 / 3.0;

/// Shape-function values at the quadrature points, `A[node][point]`.
/// Point 0 is the centroid, points 1..4 put weight 3/5 on one vertex.
const A: [[f64; 4]; 3] = [
    [THIRD, 0.6, 0.2, 0.2],
    [THIRD, 0.2, 0.6, 0.2],
    [THIRD, 0.2, 0.2, 0.6],
];

/// Reference weights, scaled by the triangle area; they sum to one.
const W: [f64; 4] = [-9.0 / 16.0, 25.0 / 48.0, 25.0 / 48.0, 25.0 / 48.0];

/// Outward-wound faces of the volume elements, keyed by sorted vertex
/// triple. Each entry keeps the face winding as the tetrahedron sees it
/// and the saturation magnetization of the tetrahedron's region.
#[derive(Debug, Clone, Default)]
pub struct WindingTable {
    faces: HashMap<[usize; 3], Vec<([usize; 3], f64)>>,
}

impl WindingTable {
    /// Register the four outward-wound faces of one oriented
    /// tetrahedron. Indices are zero-based.
    pub fn add_tet(&mut self, ind: &[usize; 4], ms: f64) {
        let [a, b, c, d] = *ind;
        for face in [[a, c, b], [b, c, d], [a, d, c], [a, b, d]] {
            self.faces.entry(sorted(face)).or_default().push((face, ms));
        }
    }

    fn matches(&self, key: [usize; 3]) -> &[([usize; 3], f64)] {
        self.faces.get(&key).map_or(&[], |v| v.as_slice())
    }
}

fn sorted(mut f: [usize; 3]) -> [usize; 3] {
    f.sort_unstable();
    f
}

/// Orientation context of a boundary triangle: the winding table of the
/// volume mesh and the charge flag of its own region.
pub struct FacetteOrientation<'a> {
    pub nodes: &'a [Node],
    pub windings: &'a WindingTable,
    /// The region's `Js` setting; negative disables the surface charge.
    pub surface_js: f64,
}

#[derive(Debug, Clone)]
pub struct Facette {
    pub base: ElementBase<3>,
    /// Mesh region id.
    pub region: usize,
    /// Position in the mesh surface list, for diagnostics.
    pub index: usize,
    pub surface: f64,
    /// Unit normal of the stored winding.
    pub normal: Vector3<f64>,
    /// Signed effective saturation magnetization, A/m. Zero until
    /// [`Orientable::orientate`] runs, or permanently for suppressed
    /// regions.
    pub ms: f64,
    /// Absolute quadrature weights; they sum to the area.
    pub weight: [f64; 4],
}

impl Facette {
    pub const N: usize = 3;
    pub const NPI: usize = 4;

    pub fn new(nodes: &[Node], cell: &SurfaceCell, index: usize) -> Result<Self> {
        let mut base = ElementBase::new(cell.ind);
        base.normalize_indices()?;

        let p = gather(&base.ind, nodes, |n| n.position);
        let cross = (p[1] - p[0]).cross(&(p[2] - p[0]));
        let two_area = cross.norm();
        let h = (p[1] - p[0])
            .norm()
            .max((p[2] - p[0]).norm())
            .max((p[2] - p[1]).norm());
        if two_area <= 1e-12 * h * h {
            return Err(SolverError::DegenerateElement {
                kind: "triangle",
                index,
            });
        }

        let surface = 0.5 * two_area;
        let mut fac = Facette {
            base,
            region: cell.region,
            index,
            surface,
            normal: cross / two_area,
            ms: 0.0,
            weight: [0.0; 4],
        };
        for j in 0..Self::NPI {
            fac.weight[j] = surface * W[j];
        }
        Ok(fac)
    }

    pub fn interpolate<F>(&self, nodes: &[Node], getter: F) -> [Vector3<f64>; 4]
    where
        F: Fn(&Node) -> Vector3<f64>,
    {
        interpolate_vectors(&A, &gather(&self.base.ind, nodes, getter))
    }

    pub fn gauss_points(&self, nodes: &[Node]) -> [Vector3<f64>; 4] {
        self.interpolate(nodes, |n| n.position)
    }

    /// Surface anisotropy right-hand side. The triangle contributes no
    /// matrix term; the local vector receives
    /// `gamma0 (2 Ks / Js)(uk.u)(uk.w)` per quadrature point.
    pub fn integrales(&mut self, nodes: &[Node], sm: &SurfaceMaterial) {
        self.base.clear_local();
        if sm.ks == 0.0 || sm.js <= 0.0 {
            return;
        }
        let kbis = 2.0 * sm.ks / sm.js;

        let ind = self.base.ind;
        let u_g = interpolate_vectors(&A, &gather(&ind, nodes, |n| n.u0));
        let ep = gather(&ind, nodes, |n| n.ep);
        let eq = gather(&ind, nodes, |n| n.eq);

        for g in 0..Self::NPI {
            let wuku = GAMMA0 * kbis * self.weight[g] * sm.uk.dot(&u_g[g]);
            for i in 0..Self::N {
                let t = A[i][g] * wuku;
                self.base.lp[i] += t * sm.uk.dot(&eq[i]);
                self.base.lp[Self::N + i] += t * sm.uk.dot(&ep[i]);
            }
        }
    }

    /// Surface charges at the quadrature points, appended in point
    /// order, plus the near-field correction for this triangle's own
    /// vertices: subtract the quadrature approximation of the layer
    /// potential and add its closed form.
    pub fn charges<F>(&self, nodes: &[Node], getter: F, out: &mut Vec<f64>, corr: &mut [f64])
    where
        F: Fn(&Node) -> Vector3<f64> + Copy,
    {
        let u_g = self.interpolate(nodes, getter);
        for j in 0..Self::NPI {
            out.push(self.ms * u_g[j].dot(&self.normal) * self.weight[j]);
        }
        self.correction(nodes, getter, &u_g, corr);
    }

    fn correction<F>(
        &self,
        nodes: &[Node],
        getter: F,
        u_g: &[Vector3<f64>; 4],
        corr: &mut [f64],
    ) where
        F: Fn(&Node) -> Vector3<f64>,
    {
        if self.ms == 0.0 {
            return;
        }
        let gauss = self.gauss_points(nodes);
        for i in 0..Self::N {
            let i_ = self.base.ind[i];
            let pot = self.potential(nodes, &getter, i);
            if !pot.is_finite() {
                // keep the plain multipole estimate for this vertex
                eprintln!(
                    "warning: singular layer potential on boundary triangle {}, node {}",
                    self.index, i_
                );
                continue;
            }
            let p = nodes[i_].position;
            let mut acc = 0.0;
            for j in 0..Self::NPI {
                let sj = self.ms * u_g[j].dot(&self.normal);
                acc -= sj * self.weight[j] / (p - gauss[j]).norm();
            }
            corr[i_] += acc + pot;
        }
    }

    /// Closed-form potential of the triangle's own linearly interpolated
    /// charge, evaluated at vertex `i` (0, 1 or 2).
    ///
    /// Uses in-plane edge coordinates of the opposite edge: `b` the base
    /// length, `t` the projection of the second edge, `h` twice the area
    /// over the base. The charge enters through its three vertex values.
    pub fn potential<F>(&self, nodes: &[Node], getter: &F, i: usize) -> f64
    where
        F: Fn(&Node) -> Vector3<f64>,
    {
        let ii = (i + 1) % 3;
        let iii = (i + 2) % 3;
        let n1 = &nodes[self.base.ind[i]];
        let n2 = &nodes[self.base.ind[ii]];
        let n3 = &nodes[self.base.ind[iii]];

        let p1p2 = n2.position - n1.position;
        let p1p3 = n3.position - n1.position;
        let b = p1p2.norm();
        let t = p1p2.dot(&p1p3) / b;
        let h = 2.0 * self.surface / b;
        let a = t / h;
        let c = (t - b) / h;
        let cc1 = 1.0 + c * c;
        let r = (h * h + (c * h + b) * (c * h + b)).sqrt();
        let log1 = ((cc1 * h + c * b + cc1.sqrt() * r) / (b * (c + cc1.sqrt()))).ln();
        let log2 = (c * h + b + r).ln();

        let s1 = getter(n1).dot(&self.normal);
        let s2 = getter(n2).dot(&self.normal);
        let s3 = getter(n3).dot(&self.normal);
        let j = (s2 - s1) / b;
        let k = t / b / h * (s1 - s2) + (s3 - s1) / h;

        let pot1 =
            b * (b / cc1.powf(1.5) * log1 + c * (r - b) / cc1) + h * (r - (a * a + 1.0).sqrt() * h);
        let pot2 = b * (-c * b / cc1.powf(1.5) * log1 + (r - b) / cc1) + h * h * (log2 - 0.5);
        let pot3 = h * (log2 - 1.0) + b / cc1.sqrt() * log1;

        let pot = 0.5 * (j * pot1 + k * pot2)
            + s1 * pot3
            + h * (k * h / 2.0 + s1) * (1.0 - (h * (a + (a * a + 1.0).sqrt())).ln())
            - 0.25 * k * h * h;

        self.ms * pot
    }

    pub fn demag_energy(&self, nodes: &[Node]) -> f64 {
        if self.ms == 0.0 {
            return 0.0;
        }
        let u_g = self.interpolate(nodes, |n| n.u);
        let phi_g = interpolate_scalars(&A, &gather(&self.base.ind, nodes, |n| n.phi));
        let mut e = 0.0;
        for g in 0..Self::NPI {
            let q = self.ms * u_g[g].dot(&self.normal);
            e += self.weight[g] * 0.5 * MU0 * q * phi_g[g];
        }
        e
    }

    pub fn anisotropy_energy(&self, nodes: &[Node], sm: &SurfaceMaterial) -> f64 {
        if sm.ks == 0.0 {
            return 0.0;
        }
        let u_g = self.interpolate(nodes, |n| n.u);
        let mut e = 0.0;
        for g in 0..Self::NPI {
            let al = sm.uk.dot(&u_g[g]);
            e += self.weight[g] * (-sm.ks * al * al);
        }
        e
    }
}

impl Orientable for Facette {
    type Context<'a> = FacetteOrientation<'a>;

    /// Accumulate the signed effective magnetization from every
    /// adjoining tetrahedron face: same winding adds, opposite winding
    /// subtracts. A suppressed region keeps `Ms = 0`.
    fn orientate(&mut self, ctx: FacetteOrientation<'_>) -> Result<()> {
        self.ms = 0.0;
        if ctx.surface_js < 0.0 {
            return Ok(());
        }
        for &(winding, tet_ms) in ctx.windings.matches(sorted(self.base.ind)) {
            let p0 = ctx.nodes[winding[0]].position;
            let p1 = ctx.nodes[winding[1]].position;
            let p2 = ctx.nodes[winding[2]].position;
            let n = (p1 - p0).cross(&(p2 - p0));
            if n.dot(&self.normal) > 0.0 {
                self.ms += tet_ms;
            } else {
                self.ms -= tet_ms;
            }
        }
        Ok(())
    }
}
