//! Local charge-neutral potential, used to build physics-aware initial
//! guesses.

use log::{debug, warn};
use nalgebra::DVector;
use num_dual::{Dual64, DualNum, first_derivative};
use thiserror::Error;

use super::DeviceModel;
use crate::discretization::context::Node;
use crate::discretization::mesh::Mesh;

const MAX_ITERATIONS: usize = 100;
const TOLERANCE: f64 = 1e-12;

#[derive(Debug, Clone, PartialEq, Error)]
#[error(
    "no charge-neutral potential at node {node} in region {region}: zero seed ({first}) and Boltzmann seed ({second}) both failed"
)]
pub struct EquilibriumError {
    pub node: usize,
    pub region: usize,
    pub first: String,
    pub second: String,
}

impl DeviceModel {
    /// Net charge `Σ z (N F(η) - C)` at `node` for a common quasi-Fermi
    /// potential `phi`.
    fn net_charge<T: DualNum<f64>>(&self, node: &Node, phi: f64, psi: T) -> T {
        let mut charge = T::from(0.0);
        for icc in 0..self.num_carriers() {
            let z = self.charge(icc);
            let doping = self.params.doping(icc, node.region, node.index);
            charge = if self.layout.is_active(icc, node.region) {
                let density = self.density(icc, node.region, node.index, T::from(phi), psi.clone());
                charge + (density - doping) * z
            } else {
                charge - doping * z
            };
        }
        charge
    }

    /// Closed-form neutral potential assuming Boltzmann statistics for every
    /// carrier, with `|z|` folded into the prefactors.
    fn boltzmann_seed(&self, node: &Node, phi: f64) -> Option<f64> {
        let ut = self.thermal_voltage();
        let q = self.constants.q;
        // density_i = a_i exp(-z_i ψ / U_T)
        let (mut negative, mut positive, mut fixed) = (0.0, 0.0, 0.0);
        for icc in 0..self.num_carriers() {
            let z = self.charge(icc);
            fixed += z * self.params.doping(icc, node.region, node.index);
            if !self.layout.is_active(icc, node.region) {
                continue;
            }
            let band_edge = self.params.band_edge_energy(icc, node.region, node.index);
            let dos = self.params.density_of_states(icc, node.region, node.index);
            let a = dos * (z * (phi + band_edge / q) / ut).exp();
            if z < 0.0 {
                negative += z.abs() * a;
            } else {
                positive += z * a;
            }
        }
        // -A X + B / X - fixed = 0 with X = exp(ψ / U_T)
        let x = if negative > 0.0 {
            let root = (fixed * fixed + 4.0 * negative * positive).sqrt();
            if fixed > 0.0 {
                2.0 * positive / (fixed + root)
            } else {
                (root - fixed) / (2.0 * negative)
            }
        } else if fixed > 0.0 {
            positive / fixed
        } else {
            return None;
        };
        (x.is_finite() && x > 0.0).then(|| ut * x.ln())
    }

    fn neutral_newton(&self, node: &Node, phi: f64, seed: f64) -> Result<f64, String> {
        let mut psi = seed;
        for iteration in 0..MAX_ITERATIONS {
            let (g, dg) = first_derivative(|psi: Dual64| self.net_charge(node, phi, psi), psi);
            if !(g.is_finite() && dg.is_finite()) || dg == 0.0 {
                return Err(format!("non-finite charge or slope at ψ = {psi:e} after {iteration} iterations"));
            }
            let step = g / dg;
            psi -= step;
            if !psi.is_finite() {
                return Err(format!("diverged after {} iterations", iteration + 1));
            }
            if step.abs() <= TOLERANCE * psi.abs().max(1.0) {
                debug!("neutral potential {psi:.6} V at node {} after {} iterations", node.index, iteration + 1);
                return Ok(psi);
            }
        }
        Err(format!("no convergence in {MAX_ITERATIONS} iterations"))
    }

    /// Potential ψ for which the local charge vanishes at `node`, given a
    /// common quasi-Fermi potential `phi`.
    ///
    /// Newton is first started from ψ = 0. If that fails, a second attempt
    /// starts from the Boltzmann closed form.
    pub fn electroneutral_potential(&self, node: &Node, phi: f64) -> Result<f64, EquilibriumError> {
        let first = match self.neutral_newton(node, phi, 0.0) {
            Ok(psi) => return Ok(psi),
            Err(reason) => reason,
        };
        warn!(
            "neutral potential at node {} failed from the zero seed ({first}); retrying from the Boltzmann seed",
            node.index
        );
        let second = match self.boltzmann_seed(node, phi) {
            Some(seed) => match self.neutral_newton(node, phi, seed) {
                Ok(psi) => return Ok(psi),
                Err(reason) => reason,
            },
            None => "no Boltzmann seed for this carrier set".to_string(),
        };
        Err(EquilibriumError {
            node: node.index,
            region: node.region,
            first,
            second,
        })
    }

    /// Node-major initial guess with quasi-Fermi potentials `phi` and the
    /// charge-neutral potential at every node.
    pub fn neutral_initial_guess(&self, mesh: &Mesh, phi: f64) -> crate::Result<DVector<f64>> {
        self.check_mesh(mesh)?;
        let ns = self.num_species();
        let ipsi = self.layout.potential();
        let mut guess = DVector::zeros(mesh.num_nodes() * ns);
        for index in 0..mesh.num_nodes() {
            let regions = mesh.node_regions(index);
            let Some(&region) = regions.first() else {
                continue;
            };
            let psi = self.electroneutral_potential(&Node { index, region }, phi)?;
            guess[index * ns + ipsi] = psi;
            for &ireg in &regions {
                for icc in 0..self.num_carriers() {
                    if let Some(i) = self.layout.index(icc, ireg) {
                        guess[index * ns + i] = phi;
                    }
                }
            }
        }
        Ok(guess)
    }
}
