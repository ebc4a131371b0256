//! Statistics functions F(η) mapping a reduced chemical potential to an
//! occupation probability.

use num_dual::DualNum;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

/// Blakemore constant commonly used for electrons in GaAs.
pub const DEFAULT_BLAKEMORE_GAMMA: f64 = 0.27;

/// The closed set of supported distribution functions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DistributionFunction {
    /// F(η) = e^η
    #[default]
    Boltzmann,
    /// F(η) = 1 / (e^-η + γ)
    Blakemore { gamma: f64 },
    /// F(η) = 1 / (e^-η + 1), the Fermi–Dirac integral of order -1
    FermiDiracMinusOne,
    /// F(η) = ln(1 + e^η), the Fermi–Dirac integral of order 0
    FermiDiracZero,
    /// Bednarczyk & Bednarczyk approximation of the order 1/2 integral
    FermiDiracOneHalf,
}

impl DistributionFunction {
    pub fn blakemore() -> Self {
        DistributionFunction::Blakemore {
            gamma: DEFAULT_BLAKEMORE_GAMMA,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            DistributionFunction::Boltzmann => "Boltzmann",
            DistributionFunction::Blakemore { .. } => "Blakemore",
            DistributionFunction::FermiDiracMinusOne => "Fermi-Dirac(-1)",
            DistributionFunction::FermiDiracZero => "Fermi-Dirac(0)",
            DistributionFunction::FermiDiracOneHalf => "Fermi-Dirac(1/2)",
        }
    }

    /// Evaluate F(η).
    #[inline]
    pub fn eval<T: DualNum<f64>>(&self, eta: T) -> T {
        match *self {
            DistributionFunction::Boltzmann => eta.exp(),
            DistributionFunction::Blakemore { gamma } => ((-eta).exp() + gamma).recip(),
            DistributionFunction::FermiDiracMinusOne => ((-eta).exp() + 1.0).recip(),
            DistributionFunction::FermiDiracZero => {
                // ln(1 + e^η) = η + ln(1 + e^-η) avoids overflow for large η
                if eta.re() > 0.0 {
                    eta.clone() + (-eta).exp().ln_1p()
                } else {
                    eta.exp().ln_1p()
                }
            }
            DistributionFunction::FermiDiracOneHalf => {
                let eta2 = eta.clone() * eta.clone();
                let damping = T::from(1.0) - ((eta.clone() + 1.0) * (eta.clone() + 1.0) * -0.17).exp() * 0.68;
                let a = eta2.clone() * eta2 + eta.clone() * damping * 33.6 + 50.0;
                let b = a.powf(-3.0 / 8.0) * (3.0 * PI.sqrt() / 4.0);
                ((-eta).exp() + b).recip()
            }
        }
    }

    /// Evaluate ln F(η). Exact for Boltzmann statistics.
    #[inline]
    pub fn ln_eval<T: DualNum<f64>>(&self, eta: T) -> T {
        match self {
            DistributionFunction::Boltzmann => eta,
            _ => self.eval(eta).ln(),
        }
    }

    /// e^η / F(η), the diffusion enhancement at a single point. Equals
    /// 1 + γ e^η for Blakemore-type statistics.
    #[inline]
    pub fn enhancement<T: DualNum<f64>>(&self, eta: T) -> T {
        match *self {
            DistributionFunction::Boltzmann => T::from(1.0),
            DistributionFunction::Blakemore { gamma } => eta.exp() * gamma + 1.0,
            DistributionFunction::FermiDiracMinusOne => eta.exp() + 1.0,
            _ => eta.clone().exp() / self.eval(eta),
        }
    }

    /// The γ for which F(η) = 1 / (e^-η + γ), if the statistics have that form.
    pub fn blakemore_gamma(&self) -> Option<f64> {
        match *self {
            DistributionFunction::Boltzmann => Some(0.0),
            DistributionFunction::Blakemore { gamma } => Some(gamma),
            DistributionFunction::FermiDiracMinusOne => Some(1.0),
            DistributionFunction::FermiDiracZero | DistributionFunction::FermiDiracOneHalf => None,
        }
    }
}
