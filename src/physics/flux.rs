//! Two-point edge flux discretizations for the carrier continuity equations.
//!
//! Every scheme computes the carrier flux from node `k` to node `l` in
//! density units, `B(X) n_k - B(-X) n_l` up to a scheme-dependent correction.
//! The caller scales the result with `z q μ U_T`. Inputs are the scaled drift
//! argument `x = z (ψ_l - ψ_k - ΔE/q) / U_T`, the reduced chemical potentials
//! η at both endpoints and the effective densities of states there.

use log::debug;
use num_dual::DualNum;
use serde::{Deserialize, Serialize};

use super::bernoulli::{bernoulli_derivative, bernoulli_pm};
use super::distribution::DistributionFunction;
use crate::error::{AssemblyError, ConfigurationError};

/// Below this relative gap between the two η the diffusion enhancement is
/// taken as the endpoint average.
const ENHANCEMENT_GAP_TOLERANCE: f64 = 1e-13;

const IMPLICIT_MAX_ITERATIONS: usize = 200;
const IMPLICIT_INITIAL_DAMPING: f64 = 0.1;
const IMPLICIT_DAMPING_GROWTH: f64 = 1.2;
const IMPLICIT_ABS_TOLERANCE: f64 = 1e-18;
const IMPLICIT_REL_TOLERANCE: f64 = 1e-14;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FluxScheme {
    /// Classical Scharfetter–Gummel exponential fitting.
    #[default]
    ExponentialFitting,
    /// Bernoulli argument corrected by the excess chemical potential, exact in
    /// thermodynamic equilibrium for any statistics.
    ExcessChemicalPotential,
    /// Diffusion-enhanced variant using the divided difference of ln F.
    DiffusionEnhanced,
    /// Exact two-point flux for Blakemore-type statistics, solved by a damped
    /// scalar Newton iteration.
    GeneralizedScharfetterGummel,
}

/// Per-carrier edge data consumed by [`FluxScheme::carrier_flux`].
#[derive(Debug, Clone)]
pub struct CarrierEdge<T> {
    /// z (Δψ - ΔE/q) / U_T from `k` to `l`.
    pub x: T,
    pub eta_k: T,
    pub eta_l: T,
    pub dos_k: f64,
    pub dos_l: f64,
}

impl FluxScheme {
    pub const ALL: [FluxScheme; 4] = [
        FluxScheme::ExponentialFitting,
        FluxScheme::ExcessChemicalPotential,
        FluxScheme::DiffusionEnhanced,
        FluxScheme::GeneralizedScharfetterGummel,
    ];

    /// Rejects carriers this scheme cannot handle.
    pub fn validate(&self, carrier: usize, distribution: &DistributionFunction) -> Result<(), ConfigurationError> {
        match (self, distribution.blakemore_gamma()) {
            (FluxScheme::GeneralizedScharfetterGummel, None) => Err(ConfigurationError::UnsupportedStatistics {
                carrier,
                statistics: distribution.name(),
            }),
            _ => Ok(()),
        }
    }

    /// Carrier flux from `k` to `l` in density units.
    pub fn carrier_flux<T: DualNum<f64>>(
        &self,
        distribution: &DistributionFunction,
        edge: CarrierEdge<T>,
    ) -> Result<T, AssemblyError> {
        match self {
            FluxScheme::ExponentialFitting => Ok(exponential_fitting(distribution, edge)),
            FluxScheme::ExcessChemicalPotential => Ok(excess_chemical_potential(distribution, edge)),
            FluxScheme::DiffusionEnhanced => Ok(diffusion_enhanced(distribution, edge)),
            FluxScheme::GeneralizedScharfetterGummel => {
                let gamma = distribution
                    .blakemore_gamma()
                    .ok_or(AssemblyError::UnsupportedStatistics {
                        statistics: distribution.name(),
                    })?;
                generalized_scharfetter_gummel(distribution, gamma, edge)
            }
        }
    }
}

#[inline]
fn fitted<T: DualNum<f64>>(argument: T, n_k: T, n_l: T) -> T {
    let (bp, bm) = bernoulli_pm(argument);
    bp * n_k - bm * n_l
}

fn exponential_fitting<T: DualNum<f64>>(f: &DistributionFunction, edge: CarrierEdge<T>) -> T {
    let n_k = f.eval(edge.eta_k) * edge.dos_k;
    let n_l = f.eval(edge.eta_l) * edge.dos_l;
    fitted(edge.x, n_k, n_l)
}

/// The correction (η_l - η_k) - ln(F_l / F_k) vanishes for Boltzmann statistics.
fn excess_chemical_potential<T: DualNum<f64>>(f: &DistributionFunction, edge: CarrierEdge<T>) -> T {
    let CarrierEdge {
        x,
        eta_k,
        eta_l,
        dos_k,
        dos_l,
    } = edge;
    let ln_k = f.ln_eval(eta_k.clone());
    let ln_l = f.ln_eval(eta_l.clone());
    let argument = x + (eta_l - eta_k) - (ln_l.clone() - ln_k.clone());
    fitted(argument, ln_k.exp() * dos_k, ln_l.exp() * dos_l)
}

fn diffusion_enhanced<T: DualNum<f64>>(f: &DistributionFunction, edge: CarrierEdge<T>) -> T {
    let CarrierEdge {
        x,
        eta_k,
        eta_l,
        dos_k,
        dos_l,
    } = edge;
    let d_eta = eta_l.clone() - eta_k.clone();
    let d_ln = f.ln_eval(eta_l.clone()) - f.ln_eval(eta_k.clone());
    let scale = eta_k.re().abs().max(eta_l.re().abs()).max(1.0);
    let g = if d_eta.re().abs() > ENHANCEMENT_GAP_TOLERANCE * scale && d_ln.re() != 0.0 {
        d_eta / d_ln
    } else {
        (f.enhancement(eta_k.clone()) + f.enhancement(eta_l.clone())) * 0.5
    };
    let n_k = f.eval(eta_k) * dos_k;
    let n_l = f.eval(eta_l) * dos_l;
    fitted(x / g.clone(), n_k, n_l) * g
}

/// Solves `j = B(x + γj) e^{η_k} - B(-(x + γj)) e^{η_l}` for the normalized
/// flux `j` and scales it by the edge-averaged density of states. Reduces to
/// exponential fitting for γ = 0.
fn generalized_scharfetter_gummel<T: DualNum<f64>>(
    f: &DistributionFunction,
    gamma: f64,
    edge: CarrierEdge<T>,
) -> Result<T, AssemblyError> {
    let dos = 0.5 * (edge.dos_k + edge.dos_l);
    let exp_k = edge.eta_k.clone().exp();
    let exp_l = edge.eta_l.clone().exp();
    let x = edge.x.clone();

    let guess = excess_chemical_potential(
        f,
        CarrierEdge {
            dos_k: 1.0,
            dos_l: 1.0,
            ..edge
        },
    );
    let j = implicit_flux(x, exp_k, exp_l, gamma, guess)?;
    Ok(j * dos)
}

fn implicit_flux<T: DualNum<f64>>(x: T, exp_k: T, exp_l: T, gamma: f64, guess: T) -> Result<T, AssemblyError> {
    let mut j = guess;
    let mut damping = IMPLICIT_INITIAL_DAMPING;
    let mut last_step = f64::INFINITY;

    for iteration in 0..IMPLICIT_MAX_ITERATIONS {
        let a = x.clone() + j.clone() * gamma;
        let (bp, bm) = bernoulli_pm(a.clone());
        let residual = j.clone() - bp * exp_k.clone() + bm * exp_l.clone();
        let derivative = T::from(1.0)
            - (bernoulli_derivative(a.clone()) * exp_k.clone() + bernoulli_derivative(-a) * exp_l.clone()) * gamma;

        let slope = derivative.re();
        if slope == 0.0 || !slope.is_finite() {
            return Err(AssemblyError::SingularDerivative {
                iteration,
                derivative: slope,
            });
        }

        let step = residual / derivative;
        last_step = step.re().abs();
        j = j - step * damping;

        if last_step <= IMPLICIT_ABS_TOLERANCE + IMPLICIT_REL_TOLERANCE * j.re().abs() {
            debug!("implicit flux converged after {} iterations", iteration + 1);
            return Ok(j);
        }
        damping = (damping * IMPLICIT_DAMPING_GROWTH).min(1.0);
    }

    Err(AssemblyError::IterationLimit {
        iterations: IMPLICIT_MAX_ITERATIONS,
        residual: last_step,
    })
}
