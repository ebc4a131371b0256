//! The nonlinear-solver seam.
//!
//! Production runs hand the [`DeviceModel`] callbacks to an external
//! finite-volume Newton solver through [`NonlinearSolver`]. The
//! [`DenseNewtonSolver`] implements the same interface on 1D interval meshes
//! with a dense Jacobian obtained by automatic differentiation, which is
//! enough to drive the continuation on small devices and in tests.

use std::collections::BTreeSet;

use log::{debug, info};
use nalgebra::{DMatrix, DVector};
use num_dual::{DualDVec64, DualNum, jacobian};
use thiserror::Error;

use super::Convergence;
#[allow(unused)]
use super::timing::{finalize_and_report, record_jacobian, record_linear_solve, reset_timing};
use crate::discretization::context::{BoundaryNode, Edge, Node};
use crate::discretization::mesh::Mesh;
use crate::error::{AssemblyError, ConfigurationError};
use crate::physics::DeviceModel;

#[cfg(feature = "timing")]
use std::time::Instant;

/// Boundary factor marking a value as a Dirichlet condition.
pub const DIRICHLET: f64 = 1e30;

/// Default potential step limit in units of U_T.
pub const DEFAULT_POTENTIAL_STEP_LIMIT: f64 = 4.0;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum SolverError {
    #[error("linear solve failed")]
    LinearSolveFailed,
    #[error("Newton's method failed to converge in {iterations} iterations")]
    NonConvergence { iterations: u32 },
    #[error("initial guess has {found} entries, the system has {expected} unknowns")]
    DimensionMismatch { expected: usize, found: usize },
    #[error(transparent)]
    Assembly(#[from] AssemblyError),
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),
}

/// Boundary values and factors indexed by `(species, boundary region)`.
///
/// Each entry adds `factor (u - value)` to the boundary rows of that species.
/// A factor of [`DIRICHLET`] pins the value, a finite factor gives a Robin
/// condition, zero leaves the row untouched.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundaryConditionTables {
    values: DMatrix<f64>,
    factors: DMatrix<f64>,
}

impl BoundaryConditionTables {
    pub fn new(num_species: usize, num_bregions: usize) -> Self {
        Self {
            values: DMatrix::zeros(num_species, num_bregions),
            factors: DMatrix::zeros(num_species, num_bregions),
        }
    }

    pub fn set(&mut self, species: usize, ibreg: usize, value: f64, factor: f64) {
        self.values[(species, ibreg)] = value;
        self.factors[(species, ibreg)] = factor;
    }

    pub fn set_dirichlet(&mut self, species: usize, ibreg: usize, value: f64) {
        self.set(species, ibreg, value, DIRICHLET);
    }

    pub fn value(&self, species: usize, ibreg: usize) -> f64 {
        self.values[(species, ibreg)]
    }

    pub fn factor(&self, species: usize, ibreg: usize) -> f64 {
        self.factors[(species, ibreg)]
    }

    pub fn num_species(&self) -> usize {
        self.values.nrows()
    }

    pub fn num_bregions(&self) -> usize {
        self.values.ncols()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SolverControl {
    pub max_iterations: u32,
    pub convergence: Convergence,
    /// Damping of the first Newton step.
    pub initial_damping: f64,
    /// Factor applied to the damping after every step, capped at 1.
    pub damping_growth: f64,
    /// Largest electrostatic potential change per Newton step, in units of
    /// U_T. Longer updates are scaled down as a whole.
    pub potential_step_limit: Option<f64>,
}

impl Default for SolverControl {
    fn default() -> Self {
        Self {
            max_iterations: 50,
            convergence: Convergence::default(),
            initial_damping: 1.0,
            damping_growth: 1.0,
            potential_step_limit: Some(DEFAULT_POTENTIAL_STEP_LIMIT),
        }
    }
}

impl SolverControl {
    pub fn next_damping(&self, damping: f64) -> f64 {
        (damping * self.damping_growth).min(1.0)
    }

    /// Factor in (0, 1] that keeps the potential entries of the node-major
    /// update `delta` within the step limit.
    pub fn step_scale(
        &self,
        delta: &DVector<f64>,
        num_species: usize,
        potential: usize,
        thermal_voltage: f64,
    ) -> f64 {
        let Some(limit) = self.potential_step_limit else {
            return 1.0;
        };
        let max_step = limit * thermal_voltage;
        let largest = delta
            .iter()
            .skip(potential)
            .step_by(num_species.max(1))
            .fold(0.0_f64, |m, d| m.max(d.abs()));
        if largest > max_step { max_step / largest } else { 1.0 }
    }
}

pub struct SolverResult {
    pub solution: DVector<f64>,
    pub iterations: u32,
    pub final_residual: f64,
}

/// What the physics layer needs from a nonlinear finite-volume solver.
pub trait NonlinearSolver {
    /// Length of the unknown vector.
    fn num_unknowns(&self) -> usize;

    /// Declares that `species` lives on `regions`.
    fn enable_species(&mut self, species: usize, regions: &[usize]);

    /// Boundary values and factors written by the contact setters.
    fn boundary_tables(&mut self) -> &mut BoundaryConditionTables;

    fn solve(
        &mut self,
        model: &DeviceModel,
        initial_guess: DVector<f64>,
        control: &SolverControl,
    ) -> Result<SolverResult, SolverError>;
}

/// Dense Newton solver on a 1D interval mesh. Unknowns are node-major:
/// species `s` of node `k` sits at `k * num_species + s`.
pub struct DenseNewtonSolver {
    mesh: Mesh,
    num_species: usize,
    enabled: Vec<Vec<usize>>,
    tables: BoundaryConditionTables,
    edges: Vec<(Edge, f64)>,
    volumes: Vec<(Node, f64)>,
    bnodes: Vec<BoundaryNode>,
}

impl DenseNewtonSolver {
    /// Precomputes edge factors `1/h` and half-interval control volumes.
    pub fn new(mesh: Mesh, num_species: usize) -> Self {
        let distance = |k: usize, l: usize| {
            let (a, b) = (mesh.coordinates[k], mesh.coordinates[l]);
            (0..3).map(|i| (b[i] - a[i]).powi(2)).sum::<f64>().sqrt()
        };
        let edges = mesh
            .edges()
            .into_iter()
            .map(|edge| {
                let (k, l) = edge.nodes;
                (edge, 1.0 / distance(k, l))
            })
            .collect();
        let mut volumes = Vec::new();
        for cell in &mesh.cells {
            if let [k, l] = cell.nodes[..] {
                let half = 0.5 * distance(k, l);
                volumes.push((Node { index: k, region: cell.region }, half));
                volumes.push((Node { index: l, region: cell.region }, half));
            }
        }
        let bnodes = mesh.boundary_nodes();
        let tables = BoundaryConditionTables::new(num_species, mesh.num_bregions);
        Self {
            num_species,
            enabled: vec![Vec::new(); num_species],
            tables,
            edges,
            volumes,
            bnodes,
            mesh,
        }
    }

    pub fn mesh(&self) -> &Mesh {
        &self.mesh
    }

    /// Whether each unknown belongs to a species enabled on a region adjacent
    /// to its node. Inactive unknowns get the identity residual.
    fn active_mask(&self) -> Vec<bool> {
        let ns = self.num_species;
        let mut mask = vec![false; self.num_unknowns()];
        for node in 0..self.mesh.num_nodes() {
            let regions: BTreeSet<usize> = self.mesh.node_regions(node).into_iter().collect();
            for (s, enabled) in self.enabled.iter().enumerate() {
                mask[node * ns + s] = enabled.iter().any(|r| regions.contains(r));
            }
        }
        mask
    }

    /// Steady-state residual of the whole system.
    pub fn residual<T>(&self, model: &DeviceModel, u: &DVector<T>, active: &[bool]) -> Result<DVector<T>, AssemblyError>
    where
        T: DualNum<f64> + nalgebra::Scalar,
    {
        let ns = self.num_species;
        let values = u.as_slice();
        let local = |node: usize| &values[node * ns..(node + 1) * ns];
        let mut r = DVector::from_element(u.len(), T::from(0.0));
        let mut f = vec![T::from(0.0); ns];

        for (edge, factor) in &self.edges {
            let (k, l) = edge.nodes;
            f.iter_mut().for_each(|v| *v = T::from(0.0));
            model.flux(&mut f, local(k), local(l), edge)?;
            for (s, flux) in f.iter().enumerate() {
                r[k * ns + s] = r[k * ns + s].clone() + flux.clone() * *factor;
                r[l * ns + s] = r[l * ns + s].clone() - flux.clone() * *factor;
            }
        }

        for (node, volume) in &self.volumes {
            f.iter_mut().for_each(|v| *v = T::from(0.0));
            model.reaction(&mut f, local(node.index), node);
            for (s, reaction) in f.iter().enumerate() {
                let i = node.index * ns + s;
                r[i] = r[i].clone() + reaction.clone() * *volume;
            }
        }

        for bnode in &self.bnodes {
            f.iter_mut().for_each(|v| *v = T::from(0.0));
            model.breaction(&mut f, local(bnode.index), bnode);
            for s in 0..ns {
                let i = bnode.index * ns + s;
                let factor = self.tables.factor(s, bnode.bregion);
                let mut contribution = f[s].clone();
                if factor != 0.0 {
                    contribution = contribution + (u[i].clone() - self.tables.value(s, bnode.bregion)) * factor;
                }
                r[i] = r[i].clone() + contribution;
            }
        }

        for (i, &is_active) in active.iter().enumerate() {
            if !is_active {
                r[i] = u[i].clone();
            }
        }
        Ok(r)
    }

    pub fn compute_residual_and_jacobian(
        &self,
        model: &DeviceModel,
        u: &DVector<f64>,
        active: &[bool],
    ) -> Result<(DVector<f64>, DMatrix<f64>), AssemblyError> {
        let mut failure = None;
        let (residual, jac) = jacobian(
            |arg: DVector<DualDVec64>| match self.residual(model, &arg, active) {
                Ok(r) => r,
                Err(e) => {
                    failure = Some(e);
                    DVector::from_element(arg.len(), DualDVec64::from(0.0))
                }
            },
            u.clone(),
        );
        match failure {
            Some(e) => Err(e),
            None => Ok((residual, jac)),
        }
    }
}

impl NonlinearSolver for DenseNewtonSolver {
    fn num_unknowns(&self) -> usize {
        self.mesh.num_nodes() * self.num_species
    }

    fn enable_species(&mut self, species: usize, regions: &[usize]) {
        let enabled = &mut self.enabled[species];
        for &r in regions {
            if !enabled.contains(&r) {
                enabled.push(r);
            }
        }
    }

    fn boundary_tables(&mut self) -> &mut BoundaryConditionTables {
        &mut self.tables
    }

    fn solve(
        &mut self,
        model: &DeviceModel,
        initial_guess: DVector<f64>,
        control: &SolverControl,
    ) -> Result<SolverResult, SolverError> {
        if initial_guess.len() != self.num_unknowns() {
            return Err(SolverError::DimensionMismatch {
                expected: self.num_unknowns(),
                found: initial_guess.len(),
            });
        }
        model.check_mesh(&self.mesh)?;

        reset_timing();
        #[cfg(feature = "timing")]
        let solve_start = Instant::now();

        let active = self.active_mask();
        let convergence = &control.convergence;
        let mut u = initial_guess;
        let mut damping = control.initial_damping;
        let mut initial_norms = None;

        for i in 0..control.max_iterations {
            let (residual, jac) = record_jacobian(|| self.compute_residual_and_jacobian(model, &u, &active))?;

            let delta = record_linear_solve(|| {
                jac
                    .lu()
                    .solve(&-&residual)
                    .filter(|d| d.iter().all(|v| v.is_finite()))
                    .ok_or(SolverError::LinearSolveFailed)
            })?;
            let scale = control.step_scale(
                &delta,
                self.num_species,
                model.layout().potential(),
                model.thermal_voltage(),
            );
            if scale < 1.0 {
                debug!("potential update limited by factor {scale:.3e}");
            }
            u += &delta * (damping * scale);

            let res_norm = convergence.norm(&residual);
            let upd_norm = convergence.norm(&delta);
            let (res_init, upd_init) = *initial_norms.get_or_insert((res_norm, upd_norm));
            debug!("{i:>4}/{} | residual {res_norm:>9.3e} | update {upd_norm:>9.3e} | damping {damping:.2}", control.max_iterations);

            if convergence.check_convergence(&residual, &delta, res_init, upd_init) {
                #[cfg(feature = "timing")]
                finalize_and_report(solve_start.elapsed());
                info!("Newton converged in {} iterations ({} unknowns)", i + 1, u.len());
                return Ok(SolverResult {
                    solution: u,
                    iterations: i + 1,
                    final_residual: res_norm,
                });
            }
            damping = control.next_damping(damping);
        }

        #[cfg(feature = "timing")]
        finalize_and_report(solve_start.elapsed());
        Err(SolverError::NonConvergence {
            iterations: control.max_iterations,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BoundaryModel;
    use crate::physics::flux::FluxScheme;
    use crate::physics::tests::{bipolar_config, bipolar_params};
    use approx::assert_relative_eq;

    fn schottky_slab(num_nodes: usize) -> (DeviceModel, DenseNewtonSolver) {
        let mut config = bipolar_config(FluxScheme::default());
        config.boundary_models = vec![BoundaryModel::SchottkyContact, BoundaryModel::SchottkyContact];
        let mut model =
            DeviceModel::new(&config, bipolar_params(num_nodes).build().expect("params")).expect("model");
        model.set_equilibrium(true);
        let x: Vec<f64> = (0..num_nodes).map(|i| i as f64 * 1e-8).collect();
        let mesh = Mesh::interval(&x, &vec![0; num_nodes - 1]).expect("mesh");
        let mut solver = DenseNewtonSolver::new(mesh, model.num_species());
        model.enable_species(&mut solver);
        (model, solver)
    }

    #[test]
    fn tables_default_to_no_condition() {
        let mut tables = BoundaryConditionTables::new(3, 2);
        assert_eq!((tables.num_species(), tables.num_bregions()), (3, 2));
        assert_eq!(tables.factor(1, 1), 0.0);
        tables.set(1, 1, 0.4, 2.0);
        tables.set_dirichlet(2, 0, -0.1);
        assert_eq!((tables.value(1, 1), tables.factor(1, 1)), (0.4, 2.0));
        assert_eq!((tables.value(2, 0), tables.factor(2, 0)), (-0.1, DIRICHLET));
    }

    #[test]
    fn damping_grows_to_one() {
        let control = SolverControl {
            initial_damping: 0.5,
            damping_growth: 1.5,
            ..SolverControl::default()
        };
        assert_eq!(control.next_damping(0.5), 0.75);
        assert_eq!(control.next_damping(0.9), 1.0);
    }

    #[test]
    fn rejects_guess_of_wrong_length() {
        let (model, mut solver) = schottky_slab(4);
        let err = solver
            .solve(&model, DVector::zeros(5), &SolverControl::default())
            .err()
            .expect("dimension error");
        assert_eq!(err, SolverError::DimensionMismatch { expected: 12, found: 5 });
    }

    #[test]
    fn linear_poisson_gives_linear_potential() {
        let (mut model, mut solver) = schottky_slab(6);
        model.set_lambda1(0.0);
        model.set_schottky_contact(solver.boundary_tables(), 0, 0, 1.2);
        model.set_schottky_contact(solver.boundary_tables(), 1, 0, 0.7);

        let control = SolverControl {
            potential_step_limit: None,
            ..SolverControl::default()
        };
        let result = solver.solve(&model, DVector::zeros(18), &control).expect("linear solve");
        assert!(result.iterations <= 3);
        for node in 0..6 {
            let expected = 1.2 - 0.1 * node as f64;
            assert_relative_eq!(result.solution[node * 3 + 2], expected, epsilon = 1e-10);
            assert!(result.solution[node * 3].abs() < 1e-12);
            assert!(result.solution[node * 3 + 1].abs() < 1e-12);
        }
    }

    #[test]
    fn limited_steps_reach_the_same_linear_potential() {
        let (mut model, mut solver) = schottky_slab(6);
        model.set_lambda1(0.0);
        model.set_schottky_contact(solver.boundary_tables(), 0, 0, 1.2);
        model.set_schottky_contact(solver.boundary_tables(), 1, 0, 0.7);

        let result = solver
            .solve(&model, DVector::zeros(18), &SolverControl::default())
            .expect("linear solve");
        // 1.2 V in steps of at most 4 U_T
        assert!(result.iterations > 10);
        for node in 0..6 {
            assert_relative_eq!(result.solution[node * 3 + 2], 1.2 - 0.1 * node as f64, epsilon = 1e-10);
        }
    }

    #[test]
    fn step_scale_only_looks_at_the_potential() {
        let control = SolverControl {
            potential_step_limit: Some(2.0),
            ..SolverControl::default()
        };
        let delta = DVector::from_vec(vec![5.0, 0.0, 0.1, -5.0, 0.0, -0.4]);
        assert_relative_eq!(control.step_scale(&delta, 3, 2, 0.05), 0.25, max_relative = 1e-15);
        let small = DVector::from_vec(vec![5.0, 0.0, 0.01, -5.0, 0.0, -0.02]);
        assert_eq!(control.step_scale(&small, 3, 2, 0.05), 1.0);
        let unlimited = SolverControl {
            potential_step_limit: None,
            ..SolverControl::default()
        };
        assert_eq!(unlimited.step_scale(&delta, 3, 2, 0.05), 1.0);
    }

    #[test]
    fn rejects_mesh_of_other_size_than_parameters() {
        let (model, _) = schottky_slab(4);
        let x: Vec<f64> = (0..6).map(|i| i as f64 * 1e-8).collect();
        let mesh = Mesh::interval(&x, &[0; 5]).expect("mesh");
        let mut solver = DenseNewtonSolver::new(mesh, model.num_species());
        model.enable_species(&mut solver);
        let err = solver
            .solve(&model, DVector::zeros(18), &SolverControl::default())
            .err()
            .expect("shape error");
        assert_eq!(
            err,
            SolverError::Configuration(ConfigurationError::ShapeMismatch {
                table: "mesh nodes",
                expected: (4, 1),
                found: (6, 1),
            })
        );
    }

    #[test]
    fn inactive_species_keep_identity_rows() {
        let (model, solver) = schottky_slab(3);
        let mut active = solver.active_mask();
        active[3] = false;
        let mut u = DVector::from_element(9, 0.0);
        u[3] = 0.25;
        let residual = solver.residual(&model, &u, &active).expect("residual");
        assert_eq!(residual[3], 0.25);
    }

    #[test]
    fn dual_residual_matches_real_residual() {
        let (model, solver) = schottky_slab(4);
        let active = solver.active_mask();
        let u = DVector::from_fn(12, |i, _| 0.01 * i as f64);
        let plain = solver.residual(&model, &u, &active).expect("residual");
        let (residual, jac) = solver
            .compute_residual_and_jacobian(&model, &u, &active)
            .expect("jacobian");
        assert_eq!(jac.shape(), (12, 12));
        for i in 0..12 {
            assert_relative_eq!(residual[i], plain[i], max_relative = 1e-12);
        }
    }
}
