//! Depth-bounded octree over point charges with low-order multipole
//! expansions of the Coulomb kernel.
//!
//! The tree is built once per evaluation from the scaled source
//! positions. `execute` runs the upward pass that accumulates monopole,
//! dipole and second-moment data per cell; `evaluate` traverses with the
//! acceptance criterion `cell width / distance < theta`, falling back to
//! direct sums at the leaves.

use nalgebra::{Matrix3, Vector3};

/// One octree cell. Cells own a contiguous slice of the reordered point
/// index list; internal cells keep the indices of their non-empty
/// children in the arena.
#[derive(Debug, Clone)]
struct Cell {
    center: Vector3<f64>,
    width: f64,
    start: usize,
    end: usize,
    children: Vec<usize>,
    monopole: f64,
    dipole: Vector3<f64>,
    second: Matrix3<f64>,
}

impl Cell {
    fn new(center: Vector3<f64>, width: f64, start: usize, end: usize) -> Self {
        Cell {
            center,
            width,
            start,
            end,
            children: Vec::new(),
            monopole: 0.0,
            dipole: Vector3::zeros(),
            second: Matrix3::zeros(),
        }
    }

    fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct Octree {
    theta: f64,
    cells: Vec<Cell>,
    /// Point indices reordered so each cell owns a contiguous run.
    order: Vec<usize>,
    positions: Vec<Vector3<f64>>,
    charges: Vec<f64>,
}

impl Octree {
    /// Build the spatial partition over `positions`. The root box is
    /// centered at `center` with the given full `width`; every position
    /// must fall inside it.
    pub fn new(
        positions: Vec<Vector3<f64>>,
        center: Vector3<f64>,
        width: f64,
        theta: f64,
        leaf_capacity: usize,
        max_depth: usize,
    ) -> Self {
        let n = positions.len();
        let mut tree = Octree {
            theta,
            cells: Vec::new(),
            order: (0..n).collect(),
            charges: vec![0.0; n],
            positions,
        };
        tree.cells.push(Cell::new(center, width, 0, n));
        if n > 0 {
            tree.split(0, 0, leaf_capacity, max_depth);
        }
        tree
    }

    fn split(&mut self, cell: usize, depth: usize, leaf_capacity: usize, max_depth: usize) {
        let (start, end) = (self.cells[cell].start, self.cells[cell].end);
        if end - start <= leaf_capacity || depth >= max_depth {
            return;
        }
        let center = self.cells[cell].center;
        let half = 0.5 * self.cells[cell].width;

        let octant = |p: &Vector3<f64>| -> usize {
            (usize::from(p.x >= center.x) << 2)
                | (usize::from(p.y >= center.y) << 1)
                | usize::from(p.z >= center.z)
        };
        self.order[start..end].sort_unstable_by_key(|&i| octant(&self.positions[i]));

        let mut run_start = start;
        while run_start < end {
            let code = octant(&self.positions[self.order[run_start]]);
            let mut run_end = run_start;
            while run_end < end && octant(&self.positions[self.order[run_end]]) == code {
                run_end += 1;
            }

            let offset = Vector3::new(
                if code & 4 != 0 { 0.25 } else { -0.25 },
                if code & 2 != 0 { 0.25 } else { -0.25 },
                if code & 1 != 0 { 0.25 } else { -0.25 },
            ) * self.cells[cell].width;
            let child = self.cells.len();
            self.cells
                .push(Cell::new(center + offset, half, run_start, run_end));
            self.cells[cell].children.push(child);
            self.split(child, depth + 1, leaf_capacity, max_depth);

            run_start = run_end;
        }
    }

    /// Attach one charge per source position, in original position order.
    pub fn set_charges(&mut self, charges: &[f64]) {
        debug_assert_eq!(charges.len(), self.charges.len());
        self.charges.copy_from_slice(charges);
    }

    /// Upward pass: leaves accumulate their particles, parents shift and
    /// merge their children's moments. Children sit after their parent in
    /// the arena, so one reverse sweep suffices.
    pub fn execute(&mut self) {
        for c in (0..self.cells.len()).rev() {
            let mut q = 0.0;
            let mut d = Vector3::zeros();
            let mut m = Matrix3::zeros();
            let center = self.cells[c].center;

            if self.cells[c].is_leaf() {
                for &i in &self.order[self.cells[c].start..self.cells[c].end] {
                    let qi = self.charges[i];
                    let dx = self.positions[i] - center;
                    q += qi;
                    d += qi * dx;
                    m += qi * dx * dx.transpose();
                }
            } else {
                for k in 0..self.cells[c].children.len() {
                    let child = &self.cells[self.cells[c].children[k]];
                    let t = child.center - center;
                    q += child.monopole;
                    d += child.dipole + child.monopole * t;
                    m += child.second
                        + t * child.dipole.transpose()
                        + child.dipole * t.transpose()
                        + child.monopole * t * t.transpose();
                }
            }

            let cell = &mut self.cells[c];
            cell.monopole = q;
            cell.dipole = d;
            cell.second = m;
        }
    }

    /// Potential at `target`, in the tree's coordinates. Traversal order
    /// is fixed, so the result does not depend on thread scheduling.
    pub fn evaluate(&self, target: Vector3<f64>) -> f64 {
        if self.positions.is_empty() {
            return 0.0;
        }
        let mut phi = 0.0;
        let mut stack = vec![0usize];
        while let Some(c) = stack.pop() {
            let cell = &self.cells[c];
            if cell.start == cell.end {
                continue;
            }
            let rv = target - cell.center;
            let dist = rv.norm();
            if cell.width < self.theta * dist {
                phi += far_field(cell, &rv, dist);
            } else if cell.is_leaf() {
                phi += self.direct_sum(cell, &target);
            } else {
                stack.extend(cell.children.iter().copied());
            }
        }
        phi
    }

    fn direct_sum(&self, cell: &Cell, target: &Vector3<f64>) -> f64 {
        let mut phi = 0.0;
        for &i in &self.order[cell.start..cell.end] {
            let r = (target - self.positions[i]).norm();
            if r > f64::MIN_POSITIVE {
                phi += self.charges[i] / r;
            }
        }
        phi
    }

    #[cfg(test)]
    fn total_charge(&self) -> f64 {
        self.cells[0].monopole
    }
}

/// Monopole + dipole + quadrupole contribution of a well-separated cell.
fn far_field(cell: &Cell, rv: &Vector3<f64>, dist: f64) -> f64 {
    let r2 = dist * dist;
    let r3 = r2 * dist;
    let r5 = r3 * r2;
    let mut phi = cell.monopole / dist + cell.dipole.dot(rv) / r3;
    let quad = rv.dot(&(cell.second * rv));
    let trace = cell.second.trace();
    phi += 0.5 * (3.0 * quad / r5 - trace / r3);
    phi
}
