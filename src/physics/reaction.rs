//! Nodal reaction (Poisson charge density, bulk recombination) and storage.

use num_dual::DualNum;

use super::DeviceModel;
use crate::discretization::context::Node;

impl DeviceModel {
    /// Nodal reaction term at `node`.
    ///
    /// The potential row carries `-q λ1 Σ z (N F(η) - C)`. The two primary
    /// carriers carry `q z (R - λ2 G)` with the configured recombination
    /// kernels, or the fixed-point residual `u - 0` in equilibrium. Ionic
    /// carriers only contribute charge.
    pub fn reaction<T: DualNum<f64>>(&self, f: &mut [T], u: &[T], node: &Node) {
        let ireg = node.region;
        let ipsi = self.layout.potential();
        let q = self.constants.q;
        let psi = u[ipsi].clone();

        let mut charge = T::from(0.0);
        for icc in 0..self.num_carriers() {
            let z = self.charge(icc);
            let doping = self.params.doping(icc, ireg, node.index);
            charge = match self.layout.index(icc, ireg) {
                Some(i) => {
                    let density = self.density(icc, ireg, node.index, u[i].clone(), psi.clone());
                    charge + (density - doping) * z
                }
                None => charge - doping * z,
            };
        }
        f[ipsi] = charge * (-q * self.embedding.lambda1);

        let (electron, hole) = (self.recombination.electron, self.recombination.hole);
        let (Some(i_n), Some(i_p)) = (self.layout.index(electron, ireg), self.layout.index(hole, ireg)) else {
            return;
        };

        if self.in_equilibrium {
            f[i_n] = u[i_n].clone() - 0.0;
            f[i_p] = u[i_p].clone() - 0.0;
            return;
        }

        let n = self.density(electron, ireg, node.index, u[i_n].clone(), psi.clone());
        let p = self.density(hole, ireg, node.index, u[i_p].clone(), psi);
        let rate = self.recombination_rate(ireg, n, p, u[i_n].clone(), u[i_p].clone());
        let net = rate - self.embedding.lambda2 * self.params.generation(ireg);

        f[i_n] = net.clone() * (q * self.charge(electron));
        f[i_p] = net * (q * self.charge(hole));
    }

    /// `(R_rad + R_Auger + R_SRH) n p (1 - exp((φ_n - φ_p) / U_T))`.
    fn recombination_rate<T: DualNum<f64>>(&self, ireg: usize, n: T, p: T, phi_n: T, phi_p: T) -> T {
        let model = self.recombination.model;
        let (electron, hole) = (self.recombination.electron, self.recombination.hole);

        let mut kernel = T::from(0.0);
        if model.radiative() {
            kernel = kernel + self.params.radiative_coefficient(ireg);
        }
        if model.auger() {
            kernel = kernel
                + n.clone() * self.params.auger_coefficient(electron, ireg)
                + p.clone() * self.params.auger_coefficient(hole, ireg);
        }
        if model.srh() {
            let tau_n = self.params.srh_lifetime(electron, ireg);
            let tau_p = self.params.srh_lifetime(hole, ireg);
            let n_trap = self.params.srh_trap_density(electron, ireg);
            let p_trap = self.params.srh_trap_density(hole, ireg);
            kernel = kernel + ((n.clone() + n_trap) * tau_p + (p.clone() + p_trap) * tau_n).recip();
        }

        let exponent = ((phi_n - phi_p) / self.thermal_voltage()).exp();
        kernel * n * p * (T::from(1.0) - exponent)
    }

    /// Storage term `z q N F(η)` per carrier, zero for the potential.
    pub fn storage<T: DualNum<f64>>(&self, f: &mut [T], u: &[T], node: &Node) {
        let ireg = node.region;
        let ipsi = self.layout.potential();
        let q = self.constants.q;
        for icc in 0..self.num_carriers() {
            if let Some(i) = self.layout.index(icc, ireg) {
                let density = self.density(icc, ireg, node.index, u[i].clone(), u[ipsi].clone());
                f[i] = density * (self.charge(icc) * q);
            }
        }
        f[ipsi] = T::from(0.0);
    }
}

#[cfg(test)]
mod tests {
    use crate::config::{CarrierConfig, DeviceConfig, IonicCarrierConfig, RecombinationModel};
    use crate::discretization::context::Node;
    use crate::physics::DeviceModel;
    use crate::physics::distribution::DistributionFunction;
    use crate::physics::flux::FluxScheme;
    use crate::physics::params::ParamsBuilder;
    use crate::physics::tests::{bipolar_config, bipolar_model, bipolar_params};
    use approx::assert_relative_eq;

    const NODE: Node = Node { index: 1, region: 0 };

    #[test]
    fn equilibrium_pins_primary_carriers() {
        let mut model = bipolar_model(FluxScheme::default());
        model.set_equilibrium(true);
        let u = [0.3, -0.2, 0.7];
        let mut f = [0.0; 3];
        model.reaction(&mut f, &u, &NODE);
        assert_eq!(f[0], 0.3);
        assert_eq!(f[1], -0.2);
    }

    #[test]
    fn equilibrium_residual_ignores_recombination_and_generation() {
        let u = [0.3, -0.2, 0.7];
        let mut a = bipolar_params(4);
        a.generation[0] = 1e27;
        a.srh_lifetime[(0, 0)] = 1e-9;
        a.auger_coefficient[(1, 0)] = 1e-42;
        let mut first = DeviceModel::new(&bipolar_config(FluxScheme::default()), a.build().expect("params"))
            .expect("model");
        let mut second = crate::physics::tests::bipolar_model(FluxScheme::default());
        first.set_equilibrium(true);
        second.set_equilibrium(true);
        let (mut fa, mut fb) = ([0.0; 3], [0.0; 3]);
        first.reaction(&mut fa, &u, &NODE);
        second.reaction(&mut fb, &u, &NODE);
        assert_eq!(fa[..2], fb[..2]);
    }

    #[test]
    fn no_net_recombination_at_equal_quasi_fermi_levels() {
        let model = bipolar_model(FluxScheme::default());
        let u = [0.05, 0.05, 0.8];
        let mut f = [0.0; 3];
        model.reaction(&mut f, &u, &NODE);
        assert_eq!(f[0], 0.0);
        assert_eq!(f[1], 0.0);
    }

    #[test]
    fn forward_bias_recombines() {
        let mut b = bipolar_params(4);
        b.srh_lifetime[(0, 0)] = 1e-9;
        b.srh_lifetime[(1, 0)] = 1e-9;
        let model = DeviceModel::new(&bipolar_config(FluxScheme::default()), b.build().expect("params"))
            .expect("model");
        // φ_p > φ_n means n p above its equilibrium value
        let u = [0.0, 0.5, 0.7];
        let mut f = [0.0; 3];
        model.reaction(&mut f, &u, &NODE);
        let q = model.constants().q;
        assert!(f[1] / q > 0.0, "hole residual {}", f[1]);
        assert_relative_eq!(f[0], -f[1], max_relative = 1e-12);
    }

    #[test]
    fn generation_is_scaled_by_lambda2() {
        let mut b = bipolar_params(4);
        b.generation[0] = 1e26;
        let mut config = bipolar_config(FluxScheme::default());
        config.recombination.model = RecombinationModel::None;
        let mut model = DeviceModel::new(&config, b.build().expect("params")).expect("model");
        let u = [0.0, 0.0, 0.7];
        let mut f = [0.0; 3];
        model.reaction(&mut f, &u, &NODE);
        let q = model.constants().q;
        assert_relative_eq!(f[1], -q * 1e26, max_relative = 1e-12);

        let mut embedding = model.embedding();
        embedding.lambda2 = 0.5;
        model.set_embedding(embedding);
        model.reaction(&mut f, &u, &NODE);
        assert_relative_eq!(f[1], -0.5 * q * 1e26, max_relative = 1e-12);
    }

    #[test]
    fn equal_occupation_of_opposite_charges_is_neutral() {
        let config = DeviceConfig {
            carriers: vec![
                CarrierConfig::new(1, DistributionFunction::Boltzmann),
                CarrierConfig::new(-1, DistributionFunction::Boltzmann),
            ],
            num_regions: 1,
            boundary_models: vec![],
            ..bipolar_config(FluxScheme::default())
        };
        let mut b = ParamsBuilder::new(2, 1, 0, 1);
        b.charge_numbers = vec![1, -1];
        b.density_of_states[(0, 0)] = 1e24;
        b.density_of_states[(1, 0)] = 1e24;
        let model = DeviceModel::new(&config, b.build().expect("params")).expect("model");
        // ψ = 0 and φ = 0 for both gives η = 0 for both
        let u = [0.0, 0.0, 0.0];
        let mut f = [0.0; 3];
        model.reaction(&mut f, &u, &Node { index: 0, region: 0 });
        assert_eq!(f[2], 0.0);
    }

    #[test]
    fn poisson_row_scales_with_lambda1() {
        let mut model = bipolar_model(FluxScheme::default());
        let u = [0.0, 0.0, 0.7];
        let mut full = [0.0; 3];
        model.reaction(&mut full, &u, &NODE);
        assert!(full[2] != 0.0);
        model.set_lambda1(1e-3);
        let mut scaled = [0.0; 3];
        model.reaction(&mut scaled, &u, &NODE);
        assert_relative_eq!(scaled[2], 1e-3 * full[2], max_relative = 1e-12);
        model.set_lambda1(0.0);
        model.reaction(&mut scaled, &u, &NODE);
        assert_eq!(scaled[2], 0.0);
    }

    #[test]
    fn ionic_carrier_only_adds_charge() {
        let mut config = bipolar_config(FluxScheme::default());
        config.carriers.push(CarrierConfig::new(1, DistributionFunction::FermiDiracMinusOne));
        config.ionic = IonicCarrierConfig {
            carriers: vec![2],
            regions: vec![0],
        };
        let mut b = ParamsBuilder::new(3, 1, 2, 4);
        b.charge_numbers = vec![-1, 1, 1];
        b.density_of_states[(2, 0)] = 1e26;
        b.doping[(2, 0)] = 5e25;
        let model = DeviceModel::new(&config, b.build().expect("params")).expect("model");
        let u = [0.0, 0.0, 0.0, 0.0];
        let mut f = [0.0; 4];
        model.reaction(&mut f, &u, &NODE);
        assert_eq!(f[2], 0.0);
        // FD(-1) at η = 0 is 1/2, so the vacancy density equals its doping
        let q = model.constants().q;
        assert!(f[3].abs() < 1e-6 * q * 5e25);
    }

    #[test]
    fn storage_is_charge_density() {
        let model = bipolar_model(FluxScheme::default());
        let u = [0.0, 0.0, 0.7];
        let mut f = [1.0; 3];
        model.storage(&mut f, &u, &NODE);
        let q = model.constants().q;
        assert_relative_eq!(f[0], -q * model.density(0, 0, 1, 0.0, 0.7), max_relative = 1e-14);
        assert_relative_eq!(f[1], q * model.density(1, 0, 1, 0.0, 0.7), max_relative = 1e-14);
        assert_eq!(f[2], 0.0);
    }
}
