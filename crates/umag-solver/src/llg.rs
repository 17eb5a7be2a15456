//! Adaptive integration of the Landau-Lifshitz-Gilbert dynamics.
//!
//! Each step linearizes the equation in the tangent plane of the
//! reference magnetization `u0` and solves for the velocity `v`. The
//! step is accepted when the largest magnetization change `|v|max * dt`
//! stays below `du_max`; otherwise `dt` is halved and the solve redone
//! from the same reference state. Very quiet steps grow `dt` for the
//! next round.
//!
//! Field ordering per step: the potential of `u0` is refreshed first,
//! the assembled right-hand side combines it with the previous step's
//! velocity potential, and the velocity potential is refreshed after
//! acceptance so the next step sees it.

use nalgebra::Vector3;
use umag_io::settings::{Settings, TimeSettings};

use crate::assembly::SparseSystem;
use crate::demag::Snapshot;
use crate::elements::tetra::StepParams;
use crate::error::{Result, SolverError};
use crate::linear::{BiCgStab, SolveInfo};
use crate::sim::Simulation;

/// Attempts per step before the shrinking time step is declared stuck.
const MAX_ATTEMPTS: usize = 32;

/// Report of one accepted time step.
#[derive(Debug, Clone)]
pub struct StepOutcome {
    /// Simulated time after the step.
    pub time: f64,
    /// Step size that was accepted.
    pub dt: f64,
    pub vmax: f64,
    /// Largest magnetization change, `vmax * dt`.
    pub du: f64,
    /// Assembly and solve rounds it took, 1 when nothing was rejected.
    pub attempts: usize,
    pub solve: SolveInfo,
}

pub struct TimeStepper {
    time: f64,
    dt: f64,
    limits: TimeSettings,
    solver: BiCgStab,
    hext: Vector3<f64>,
    uz: f64,
    beta: f64,
}

impl TimeStepper {
    pub fn new(settings: &Settings, start_time: f64) -> Self {
        TimeStepper {
            time: start_time,
            dt: settings.time.dt,
            limits: settings.time.clone(),
            solver: BiCgStab::new(settings.solver.max_iter, settings.solver.tolerance),
            hext: Vector3::from(settings.applied_field),
            uz: settings.spin_transfer.uz,
            beta: settings.spin_transfer.beta,
        }
    }

    pub fn time(&self) -> f64 {
        self.time
    }

    pub fn dt(&self) -> f64 {
        self.dt
    }

    pub fn finished(&self) -> bool {
        self.time >= self.limits.final_time
    }

    /// Advance the simulation by one accepted step.
    pub fn step(&mut self, sim: &mut Simulation) -> Result<StepOutcome> {
        sim.compute_demag(Snapshot::Current)?;

        let nod = sim.mesh.nodes.len();
        let mut attempts = 0;
        loop {
            attempts += 1;
            let (vmax, info) = self.solve_velocity(sim, nod)?;
            let du = vmax * self.dt;

            if du > self.limits.du_max {
                sim.reset();
                if self.dt <= self.limits.dt_min {
                    return Err(SolverError::StepRejected {
                        attempts,
                        dt: self.dt,
                    });
                }
                if attempts >= MAX_ATTEMPTS {
                    return Err(SolverError::StepRejected {
                        attempts,
                        dt: self.dt,
                    });
                }
                self.dt = (0.5 * self.dt).max(self.limits.dt_min);
                continue;
            }

            let dt = self.dt;
            for node in &mut sim.mesh.nodes {
                node.u = (node.u0 + dt * node.v).normalize();
            }
            sim.compute_demag(Snapshot::Rate)?;
            sim.evolve();
            self.time += dt;
            if du < self.limits.du_min {
                self.dt = (1.1 * self.dt).min(self.limits.dt_max);
            }
            return Ok(StepOutcome {
                time: self.time,
                dt,
                vmax,
                du,
                attempts,
                solve: info,
            });
        }
    }

    /// Assemble the tangent-plane system at the current `dt`, solve it
    /// and scatter the velocity back onto the nodes.
    fn solve_velocity(&self, sim: &mut Simulation, nod: usize) -> Result<(f64, SolveInfo)> {
        let params = StepParams {
            dt: self.dt,
            theta: self.limits.theta,
            hext: self.hext,
            uz: self.uz,
            beta: self.beta,
        };

        let mut system = SparseSystem::new(2 * nod);
        for tet in &mut sim.tetras {
            let m = sim.materials.volume(tet.region)?;
            tet.integrales(&sim.mesh.nodes, m, &params);
            tet.base.assemble_matrix(nod, &mut system);
            tet.base.assemble_vector(nod, &mut system);
        }
        for fac in &mut sim.facettes {
            let sm = sim.materials.surface(fac.region);
            fac.integrales(&sim.mesh.nodes, &sm);
            fac.base.assemble_vector(nod, &mut system);
        }
        system.validate()?;

        let matrix = system.to_csr()?;
        let (x, info) = self.solver.solve(&matrix, system.rhs())?;

        for (i, node) in sim.mesh.nodes.iter_mut().enumerate() {
            node.v = x[i] * node.ep + x[nod + i] * node.eq;
        }
        Ok((sim.vmax(), info))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use umag_mesh::{Mesh, Node, SurfaceCell, VolumeCell};

    fn settings(json_extra: &str) -> Settings {
        let json = format!(
            r#"{{
                "mesh": {{
                    "filename": "unused.msh",
                    "scaling_factor": 1.0,
                    "volume_regions": {{
                        "magnet": {{ "alpha": 0.5, "A": 1.3e-11, "Js": 1.0 }}
                    }}
                }},
                "initial_magnetization": {{ "type": "uniform", "direction": [0, 0, 1] }},
                {json_extra}
                "time": {{ "dt": 1e-14, "dt_min": 1e-18, "dt_max": 1e-12,
                          "final_time": 1e-12, "du_min": 1e-9, "du_max": 0.02 }}
            }}"#
        );
        Settings::from_json(&json).unwrap()
    }

    fn tet_sim(settings: &Settings) -> Simulation {
        let nodes: Vec<Node> = [
            [0.0, 0.0, 0.0],
            [50e-9, 0.0, 0.0],
            [0.0, 50e-9, 0.0],
            [0.0, 0.0, 50e-9],
        ]
        .iter()
        .map(|p| Node::new(Vector3::new(p[0], p[1], p[2])))
        .collect();
        let mesh = Mesh {
            nodes,
            volumes: vec![VolumeCell {
                ind: [1, 2, 3, 4],
                region: 300,
            }],
            surfaces: vec![
                SurfaceCell { ind: [1, 3, 2], region: 200 },
                SurfaceCell { ind: [2, 3, 4], region: 200 },
                SurfaceCell { ind: [1, 4, 3], region: 200 },
                SurfaceCell { ind: [1, 2, 4], region: 200 },
            ],
            volume_regions: [(300, "magnet".to_string())].into(),
            surface_regions: Default::default(),
        };
        let mut sim = Simulation::build(mesh, settings).unwrap();
        for n in &mut sim.mesh.nodes {
            n.set_magnetization(Vector3::z());
            n.make_basis();
        }
        sim
    }

    #[test]
    fn step_keeps_unit_magnetization() {
        let settings = settings("");
        let mut sim = tet_sim(&settings);
        let mut stepper = TimeStepper::new(&settings, 0.0);
        let out = stepper.step(&mut sim).unwrap();
        assert!(out.time > 0.0);
        assert!(out.du <= 0.02);
        for n in &sim.mesh.nodes {
            assert!((n.u.norm() - 1.0).abs() < 1e-12);
            assert!((n.u0 - n.u).norm() == 0.0);
        }
    }

    #[test]
    fn applied_field_tilts_the_magnetization() {
        // strong transverse field torques u away from z
        let settings = settings(r#""applied_field": [5e5, 0.0, 0.0],"#);
        let mut sim = tet_sim(&settings);
        let mut stepper = TimeStepper::new(&settings, 0.0);
        let mut vmax = 0.0;
        for _ in 0..20 {
            vmax = stepper.step(&mut sim).unwrap().vmax;
        }
        assert!(vmax > 0.0);
        let mean = sim.mean_magnetization();
        assert!(mean.x.abs() > 1e-6 || mean.y.abs() > 1e-6, "mean = {mean:?}");
        assert!(mean.z < 1.0 - 1e-9);
    }

    #[test]
    fn zero_torque_state_is_stationary() {
        // uniform magnetization along the easy axis of a field-free,
        // anisotropy-free body still feels its own demag field; along z
        // with this symmetric tetrahedron the torque is tiny but not
        // zero, so only require a quiet step
        let settings = settings("");
        let mut sim = tet_sim(&settings);
        let mut stepper = TimeStepper::new(&settings, 0.0);
        let out = stepper.step(&mut sim).unwrap();
        assert!(out.attempts == 1);
        assert!(out.du < 0.02);
    }

    #[test]
    fn quiet_steps_grow_dt_toward_the_cap() {
        // du_min far above the actual change forces the growth path
        let settings = Settings::from_json(
            r#"{
                "mesh": {
                    "filename": "unused.msh",
                    "scaling_factor": 1.0,
                    "volume_regions": {
                        "magnet": { "alpha": 0.5, "A": 1.3e-11, "Js": 1.0 }
                    }
                },
                "time": { "dt": 1e-14, "dt_min": 1e-18, "dt_max": 2e-14,
                          "final_time": 1e-12, "du_min": 1e-2, "du_max": 2e-2 }
            }"#,
        )
        .unwrap();
        let mut sim = tet_sim(&settings);
        let mut stepper = TimeStepper::new(&settings, 0.0);
        let dt0 = stepper.dt();
        let mut out = stepper.step(&mut sim).unwrap();
        assert!(out.du < 1e-2);
        assert!(stepper.dt() > dt0);
        for _ in 0..12 {
            out = stepper.step(&mut sim).unwrap();
        }
        // growth saturates at dt_max
        assert!((stepper.dt() - 2e-14).abs() < 1e-20);
        assert!(out.dt <= 2e-14);
    }

    #[test]
    fn finished_reflects_final_time() {
        let settings = settings("");
        let stepper = TimeStepper::new(&settings, 2e-12);
        assert!(stepper.finished());
        let stepper = TimeStepper::new(&settings, 0.0);
        assert!(!stepper.finished());
    }
}
