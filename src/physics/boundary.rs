//! Boundary reaction terms and the contact setters writing boundary values.

use num_dual::DualNum;

use super::DeviceModel;
use crate::config::BoundaryModel;
use crate::discretization::context::BoundaryNode;
use crate::numerics::solver::BoundaryConditionTables;

impl DeviceModel {
    /// Boundary reaction at `bnode`, dispatched on the boundary model of its
    /// boundary region.
    pub fn breaction<T: DualNum<f64>>(&self, f: &mut [T], u: &[T], bnode: &BoundaryNode) {
        match self.boundary_models[bnode.bregion] {
            BoundaryModel::OhmicContact => self.contact_charge_balance(f, u, bnode),
            BoundaryModel::InterfaceDiscontinuousQF => self.interface_transfer(f, u, bnode),
            BoundaryModel::ElectrochemicalReaction => self.electrochemical_reaction(f, u, bnode),
            BoundaryModel::SchottkyContact | BoundaryModel::InterfaceNone | BoundaryModel::InterfaceIonicCharge => {}
        }
    }

    /// Soft charge neutrality `-(λ1/α) q Σ z (N_b F(η_b) - C_b)` on the
    /// potential. Carrier rows stay zero; their values come from
    /// [`set_ohmic_contact`](Self::set_ohmic_contact). Doping of carriers
    /// absent in the region still counts.
    fn contact_charge_balance<T: DualNum<f64>>(&self, f: &mut [T], u: &[T], bnode: &BoundaryNode) {
        let ipsi = self.layout.potential();
        let ibreg = bnode.bregion;
        let mut charge = T::from(0.0);
        for icc in 0..self.num_carriers() {
            let z = self.charge(icc);
            let doping = self.params.b_doping(icc, ibreg);
            charge = match self.layout.index(icc, bnode.region) {
                Some(i) => {
                    let density = self.boundary_density(icc, ibreg, u[i].clone(), u[ipsi].clone());
                    charge + (density - doping) * z
                }
                None => charge - doping * z,
            };
        }
        f[ipsi] = charge * (-self.constants.q * self.embedding.lambda1 / self.penalty_alpha);
    }

    /// Transfer `q v (n_1 - n_2)` between the two sides of an interface for
    /// every carrier that owns distinct unknowns there.
    fn interface_transfer<T: DualNum<f64>>(&self, f: &mut [T], u: &[T], bnode: &BoundaryNode) {
        let Some(outer) = bnode.outer_region else {
            return;
        };
        let ipsi = self.layout.potential();
        let q = self.constants.q;
        for icc in 0..self.num_carriers() {
            let (Some(i1), Some(i2)) = (self.layout.index(icc, bnode.region), self.layout.index(icc, outer)) else {
                continue;
            };
            if i1 == i2 {
                continue;
            }
            let n1 = self.density(icc, bnode.region, bnode.index, u[i1].clone(), u[ipsi].clone());
            let n2 = self.density(icc, outer, bnode.index, u[i2].clone(), u[ipsi].clone());
            let transfer = (n1 - n2) * (q * self.params.b_velocity(icc, bnode.bregion));
            f[i1] = f[i1].clone() + transfer.clone();
            f[i2] = f[i2].clone() - transfer;
        }
    }

    /// Surface reaction `λ3 q z k (n_b - n_ref)` per carrier.
    fn electrochemical_reaction<T: DualNum<f64>>(&self, f: &mut [T], u: &[T], bnode: &BoundaryNode) {
        let lambda3 = self.embedding.lambda3;
        let ipsi = self.layout.potential();
        let ibreg = bnode.bregion;
        for icc in 0..self.num_carriers() {
            let Some(i) = self.layout.index(icc, bnode.region) else {
                continue;
            };
            let density = self.boundary_density(icc, ibreg, u[i].clone(), u[ipsi].clone());
            let rate = self.params.b_reaction_coefficient(icc, ibreg) * self.charge(icc) * self.constants.q * lambda3;
            f[i] = f[i].clone() + (density - self.params.b_reaction_density(icc, ibreg)) * rate;
        }
    }

    /// Dirichlet quasi-Fermi potential `voltage` for every carrier present in
    /// the bulk region `ireg` adjacent to boundary region `ibreg`.
    pub fn set_ohmic_contact(&self, tables: &mut BoundaryConditionTables, ibreg: usize, ireg: usize, voltage: f64) {
        for icc in 0..self.num_carriers() {
            if let Some(i) = self.layout.index(icc, ireg) {
                tables.set_dirichlet(i, ibreg, voltage);
            }
        }
    }

    /// Dirichlet potential `voltage - Φ_B/q` and surface-recombination
    /// boundary values for the carriers.
    pub fn set_schottky_contact(&self, tables: &mut BoundaryConditionTables, ibreg: usize, ireg: usize, voltage: f64) {
        let barrier = self.params.schottky_barrier(ibreg) / self.constants.q;
        tables.set_dirichlet(self.layout.potential(), ibreg, voltage - barrier);
        for icc in 0..self.num_carriers() {
            if let Some(i) = self.layout.index(icc, ireg) {
                tables.set(i, ibreg, voltage, self.params.b_velocity(icc, ibreg));
            }
        }
    }
}
