//! Error taxonomy shared by the assembly kernels, the builders and the
//! continuation driver.

use thiserror::Error;

use crate::numerics::continuation::ConvergenceFailure;
use crate::numerics::solver::SolverError;
use crate::physics::equilibrium::EquilibriumError;

/// Raised while building a [`crate::physics::DeviceModel`]. Never retried.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigurationError {
    #[error("table `{table}` has shape {found:?}, expected {expected:?}")]
    ShapeMismatch {
        table: &'static str,
        expected: (usize, usize),
        found: (usize, usize),
    },
    #[error("at least one charge carrier is required")]
    NoCarriers,
    #[error(
        "{carrier_count} carriers cannot be laid out: only two primary carriers plus one ionic group are supported (carrier {carrier} is neither)"
    )]
    UnsupportedCarrierLayout { carrier_count: usize, carrier: usize },
    #[error("recombination model needs two distinct carriers below {carrier_count}, got ({electron}, {hole})")]
    RecombinationCarriers {
        carrier_count: usize,
        electron: usize,
        hole: usize,
    },
    #[error("region {region} is out of range (region count {region_count})")]
    UnknownRegion { region: usize, region_count: usize },
    #[error("carrier {carrier} uses {statistics} statistics which the implicit flux scheme cannot handle")]
    UnsupportedStatistics {
        carrier: usize,
        statistics: &'static str,
    },
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
}

/// Raised inside an assembly callback. Fatal for the whole external solve.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum AssemblyError {
    #[error("implicit flux iteration lost its derivative at iteration {iteration} (derivative = {derivative})")]
    SingularDerivative { iteration: usize, derivative: f64 },
    #[error("implicit flux iteration did not converge in {iterations} iterations (last update {residual:.3e})")]
    IterationLimit { iterations: usize, residual: f64 },
    #[error("the implicit flux scheme needs Blakemore-type statistics, got {statistics}")]
    UnsupportedStatistics { statistics: &'static str },
}

/// Crate-level error.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),
    #[error(transparent)]
    Assembly(#[from] AssemblyError),
    #[error(transparent)]
    Solver(#[from] SolverError),
    #[error(transparent)]
    Convergence(#[from] ConvergenceFailure),
    #[error(transparent)]
    Equilibrium(#[from] EquilibriumError),
}

pub type Result<T> = std::result::Result<T, Error>;
